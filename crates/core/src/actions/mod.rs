//! Action kinds available to recipes

pub mod run;

pub use run::RunAction;
