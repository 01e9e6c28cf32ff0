//! Command construction and execution
//!
//! Actions describe what they want to run as a [`CommandSpec`]: an argument
//! vector, an execution mode (host or chroot), bind mounts and environment.
//! A [`CommandRunner`] turns a [`CommandSpec`] into a process.
//!
//! Chrooted commands are delegated to `systemd-nspawn`; this crate does not
//! implement namespace or chroot primitives itself.

use crate::context::Architecture;
use crate::errors::{ExecError, Result};
use crate::mount::BindMount;
use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};
use std::io::{BufRead, BufReader, ErrorKind, Read};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};

/// Program used to enter the target filesystem
pub const NSPAWN: &str = "systemd-nspawn";

/// Where a command runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Directly in the build process's environment
    Host,
    /// Inside the target filesystem tree
    Chroot {
        /// Root of the target filesystem
        rootdir: PathBuf,
        /// Architecture of the binaries inside the tree
        architecture: Architecture,
    },
}

impl ExecutionMode {
    pub fn is_chroot(&self) -> bool {
        matches!(self, ExecutionMode::Chroot { .. })
    }
}

/// Fully routed description of a command to execute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Human-readable operation label used in logs and errors
    pub label: String,
    /// Argument vector, as seen from inside the execution environment
    pub argv: Vec<OsString>,
    /// Execution environment
    pub mode: ExecutionMode,
    /// Host directories bound into the chroot
    pub binds: Vec<BindMount>,
    /// Extra environment variables for the process
    pub env: BTreeMap<String, OsString>,
}

impl CommandSpec {
    pub fn new(mode: ExecutionMode, label: impl Into<String>, argv: Vec<OsString>) -> Self {
        Self {
            label: label.into(),
            argv,
            mode,
            binds: Vec::new(),
            env: BTreeMap::new(),
        }
    }

    /// Bind a host directory into the chroot
    pub fn with_bind_mount(
        mut self,
        source: impl Into<PathBuf>,
        target: impl Into<String>,
    ) -> Result<Self> {
        self.binds.push(BindMount::new(source, target)?);
        Ok(self)
    }

    /// Add environment variable
    pub fn with_env(mut self, key: impl Into<String>, value: impl AsRef<OsStr>) -> Self {
        self.env.insert(key.into(), value.as_ref().to_os_string());
        self
    }

    /// Look up an injected environment variable
    pub fn env_var(&self, key: &str) -> Option<&OsStr> {
        self.env.get(key).map(OsString::as_os_str)
    }

    /// The argument vector quoted for display
    pub fn display_command(&self) -> String {
        quote_for_display(&self.argv)
    }

    /// Program and arguments to hand to the operating system
    ///
    /// Host commands run as-is. Chrooted commands are wrapped in
    /// `systemd-nspawn`, which also carries the bind mounts and environment.
    pub fn process_argv(&self) -> Vec<OsString> {
        match &self.mode {
            ExecutionMode::Host => self.argv.clone(),
            ExecutionMode::Chroot { rootdir, .. } => {
                let mut directory = OsString::from("--directory=");
                directory.push(rootdir);
                let mut argv = vec![
                    OsString::from(NSPAWN),
                    OsString::from("--quiet"),
                    OsString::from("--register=no"),
                    directory,
                ];
                argv.extend(self.binds.iter().map(BindMount::to_nspawn_arg));
                argv.extend(self.env.iter().map(|(key, value)| {
                    let mut setenv = OsString::from(format!("--setenv={}=", key));
                    setenv.push(value);
                    setenv
                }));
                argv.push(OsString::from("--"));
                argv.extend(self.argv.iter().cloned());
                argv
            }
        }
    }
}

/// Executes routed commands
pub trait CommandRunner {
    /// Run the command to completion
    ///
    /// Fails with [`ExecError::Spawn`] if the process cannot be started and
    /// [`ExecError::Failed`] if it exits unsuccessfully.
    fn run(&self, spec: &CommandSpec) -> Result<()>;
}

impl<T: CommandRunner + ?Sized> CommandRunner for &T {
    fn run(&self, spec: &CommandSpec) -> Result<()> {
        (**self).run(spec)
    }
}

/// Runs commands as local child processes
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

impl CommandRunner for ProcessRunner {
    #[instrument(skip(self, spec), fields(label = %spec.label))]
    fn run(&self, spec: &CommandSpec) -> Result<()> {
        let argv = spec.process_argv();
        let (program, args) = argv.split_first().ok_or_else(|| ExecError::Spawn {
            label: spec.label.clone(),
            source: std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "empty argument vector",
            ),
        })?;

        match &spec.mode {
            ExecutionMode::Chroot { architecture, .. } if architecture.is_foreign() => {
                warn!(
                    "Running {} binaries on a {} host; binfmt emulation must be available",
                    architecture,
                    Architecture::host()
                );
            }
            ExecutionMode::Host if !spec.binds.is_empty() => {
                debug!("Ignoring {} bind mount(s) for host command", spec.binds.len());
            }
            _ => {}
        }

        debug!("Running: {}", quote_for_display(&argv));
        let start_time = Instant::now();

        let mut command = Command::new(program);
        command.args(args);
        if !spec.mode.is_chroot() {
            command.envs(&spec.env);
        }
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command.spawn().map_err(|source| ExecError::Spawn {
            label: spec.label.clone(),
            source,
        })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let label = spec.label.as_str();
        std::thread::scope(|scope| {
            if let Some(stderr) = stderr {
                scope.spawn(move || log_lines(label, stderr));
            }
            if let Some(stdout) = stdout {
                log_lines(label, stdout);
            }
        });

        let status = child.wait().map_err(|source| ExecError::Spawn {
            label: spec.label.clone(),
            source,
        })?;

        debug!(
            "'{}' finished with {:?} in {:?}",
            label,
            status.code(),
            start_time.elapsed()
        );

        if !status.success() {
            error!("'{}' failed with exit status {:?}", label, status.code());
            return Err(ExecError::Failed {
                label: spec.label.clone(),
                code: status.code(),
            }
            .into());
        }

        Ok(())
    }
}

fn quote_for_display(argv: &[OsString]) -> String {
    shell_words::join(argv.iter().map(|arg| arg.to_string_lossy()))
}

/// Log every output line until EOF
///
/// Lines are split on raw bytes and decoded lossily; the pipe must be drained
/// completely or the child may die of SIGPIPE.
fn log_lines(label: &str, reader: impl Read) {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                info!("[{}] {}", label, line.trim_end_matches(|c: char| c == '\n' || c == '\r'));
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                debug!("Stopped reading output of '{}': {}", label, e);
                break;
            }
        }
    }
}

pub mod mock {
    //! Recording runner for tests
    //!
    //! Captures every command it is asked to run instead of spawning a process.

    use super::{CommandRunner, CommandSpec};
    use crate::errors::{ExecError, Result};
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    pub struct RecordingRunner {
        calls: Mutex<Vec<CommandSpec>>,
        exit_code: i32,
    }

    impl RecordingRunner {
        /// A runner whose commands all succeed
        pub fn new() -> Self {
            Self::default()
        }

        /// A runner whose commands all exit with `exit_code`
        pub fn failing(exit_code: i32) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                exit_code,
            }
        }

        /// Specs received so far, in order
        pub fn calls(&self) -> Vec<CommandSpec> {
            self.calls.lock().unwrap().clone()
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    impl CommandRunner for RecordingRunner {
        fn run(&self, spec: &CommandSpec) -> Result<()> {
            self.calls.lock().unwrap().push(spec.clone());
            if self.exit_code != 0 {
                return Err(ExecError::Failed {
                    label: spec.label.clone(),
                    code: Some(self.exit_code),
                }
                .into());
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::RecordingRunner;
    use super::*;
    use crate::errors::ImagesmithError;

    fn chroot_mode() -> ExecutionMode {
        ExecutionMode::Chroot {
            rootdir: PathBuf::from("/build/root"),
            architecture: Architecture::new("arm64"),
        }
    }

    #[test]
    fn test_host_process_argv_is_unchanged() {
        let spec = CommandSpec::new(
            ExecutionMode::Host,
            "echo hi",
            vec!["sh".into(), "-c".into(), "echo hi".into()],
        )
        .with_env("ROOTDIR", "/build/root");

        assert_eq!(spec.process_argv(), vec!["sh", "-c", "echo hi"]);
        assert_eq!(spec.env_var("ROOTDIR"), Some(OsStr::new("/build/root")));
        assert_eq!(spec.display_command(), "sh -c 'echo hi'");
    }

    #[test]
    fn test_chroot_process_argv_wraps_nspawn() {
        let spec = CommandSpec::new(chroot_mode(), "build.sh", vec!["/script/build.sh".into()])
            .with_bind_mount("/recipes/x", "/script")
            .unwrap()
            .with_env("LANG", "C");

        assert_eq!(
            spec.process_argv(),
            vec![
                "systemd-nspawn",
                "--quiet",
                "--register=no",
                "--directory=/build/root",
                "--bind=/recipes/x:/script",
                "--setenv=LANG=C",
                "--",
                "/script/build.sh",
            ]
        );
    }

    #[test]
    fn test_invalid_bind_mount_rejected() {
        let result = CommandSpec::new(chroot_mode(), "x", vec!["x".into()])
            .with_bind_mount("relative", "/script");
        assert!(matches!(
            result,
            Err(ImagesmithError::Exec(ExecError::InvalidMount { .. }))
        ));
    }

    #[test]
    fn test_recording_runner_records_and_fails() {
        let spec = CommandSpec::new(ExecutionMode::Host, "false", vec!["false".into()]);

        let ok = RecordingRunner::new();
        ok.run(&spec).unwrap();
        assert_eq!(ok.calls(), vec![spec.clone()]);

        let failing = RecordingRunner::failing(3);
        let err = failing.run(&spec).unwrap_err();
        assert!(matches!(
            err,
            ImagesmithError::Exec(ExecError::Failed { code: Some(3), .. })
        ));
        assert_eq!(failing.call_count(), 1);
    }

    #[test]
    fn test_empty_argv_is_a_spawn_error() {
        let spec = CommandSpec::new(ExecutionMode::Host, "nothing", Vec::new());
        let err = ProcessRunner::new().run(&spec).unwrap_err();
        assert!(matches!(err, ImagesmithError::Exec(ExecError::Spawn { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_process_runner_success_and_failure() {
        let runner = ProcessRunner::new();

        let ok = CommandSpec::new(
            ExecutionMode::Host,
            "true",
            vec!["sh".into(), "-c".into(), "echo out; echo err >&2".into()],
        );
        runner.run(&ok).unwrap();

        let bad = CommandSpec::new(
            ExecutionMode::Host,
            "exit 7",
            vec!["sh".into(), "-c".into(), "exit 7".into()],
        );
        let err = runner.run(&bad).unwrap_err();
        assert!(matches!(
            err,
            ImagesmithError::Exec(ExecError::Failed { code: Some(7), .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_process_runner_missing_program() {
        let spec = CommandSpec::new(
            ExecutionMode::Host,
            "missing",
            vec!["/nonexistent/imagesmith-test-binary".into()],
        );
        let err = ProcessRunner::new().run(&spec).unwrap_err();
        assert!(matches!(err, ImagesmithError::Exec(ExecError::Spawn { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_process_runner_drains_non_utf8_output() {
        let spec = CommandSpec::new(
            ExecutionMode::Host,
            "binary-output",
            vec![
                "sh".into(),
                "-c".into(),
                "printf 'caf\\351\\n'; printf 'no newline \\377' >&2; sleep 0.2; seq 1 200000; echo done"
                    .into(),
            ],
        );

        ProcessRunner::new().run(&spec).unwrap();
    }

    #[test]
    fn test_log_lines_reads_past_invalid_utf8() {
        let mut input = b"caf\xe9\n".to_vec();
        input.extend(std::iter::repeat(b'x').take(128 * 1024));
        input.extend_from_slice(b"\nlast");
        let mut cursor = std::io::Cursor::new(input);

        log_lines("bytes", &mut cursor);

        assert_eq!(cursor.position() as usize, cursor.get_ref().len());
    }
}
