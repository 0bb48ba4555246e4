// External command execution

use anyhow::{Context, Result};
use std::fmt;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use tracing::debug;

/// A single external command invocation
#[derive(Clone, PartialEq)]
pub(crate) struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    /// Written to the child's stdin, then closed. Never logged.
    pub stdin: Option<String>,
}

impl Invocation {
    pub(crate) fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            stdin: None,
        }
    }

    pub(crate) fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub(crate) fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub(crate) fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub(crate) fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// First argument, usually the subcommand (`init`, `build`, ...)
    pub(crate) fn subcommand(&self) -> Option<&str> {
        self.args.first().map(String::as_str)
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invocation")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("cwd", &self.cwd)
            .field("stdin", &self.stdin.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// How the child's stdout and stderr are wired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OutputMode {
    /// Stream straight to the user's terminal
    Inherit,
    /// Collect into [`CommandOutput`]
    Capture,
}

/// Result of a finished command
#[derive(Debug, Clone, Default)]
pub(crate) struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    /// Empty unless run with [`OutputMode::Capture`]
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Human readable exit status, e.g. "exit code 1" or "terminated by signal"
    pub(crate) fn status_text(&self) -> String {
        match self.code {
            Some(code) => format!("exit code {}", code),
            None => "terminated by signal".to_string(),
        }
    }
}

/// Runs external commands to completion.
///
/// `Err` means the command could not be started or waited on. A command that
/// ran and exited non-zero is `Ok` with `success == false`.
pub(crate) trait CommandRunner: Send + Sync {
    fn run(&self, invocation: &Invocation, mode: OutputMode) -> Result<CommandOutput>;
}

/// Runs commands on the host with `std::process`
pub(crate) struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, invocation: &Invocation, mode: OutputMode) -> Result<CommandOutput> {
        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args);

        if let Some(dir) = &invocation.cwd {
            cmd.current_dir(dir);
        }

        match mode {
            OutputMode::Inherit => {
                cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
            }
            OutputMode::Capture => {
                cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
            }
        }

        if invocation.stdin.is_some() {
            cmd.stdin(Stdio::piped());
        }

        debug!("Executing command: {}", invocation);

        let mut child = cmd.spawn().with_context(|| {
            format!(
                "Failed to execute {} {}",
                invocation.program,
                invocation.subcommand().unwrap_or_default()
            )
        })?;

        let written = match (&invocation.stdin, child.stdin.take()) {
            (Some(input), Some(mut stdin)) => stdin.write_all(input.as_bytes()),
            _ => Ok(()),
        };

        // Reap the child even if it closed its stdin early
        let output = child
            .wait_with_output()
            .with_context(|| format!("Failed to wait for {}", invocation.program))?;

        written.with_context(|| format!("Failed to write stdin of {}", invocation.program))?;

        Ok(CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    impl CommandOutput {
        pub(crate) fn ok(stdout: &str) -> Self {
            Self {
                success: true,
                code: Some(0),
                stdout: stdout.to_string(),
                stderr: String::new(),
            }
        }

        pub(crate) fn failed(code: i32, stderr: &str) -> Self {
            Self {
                success: false,
                code: Some(code),
                stdout: String::new(),
                stderr: stderr.to_string(),
            }
        }
    }

    enum Scripted {
        Output(CommandOutput),
        SpawnError,
    }

    /// Records every invocation and answers from a script keyed by
    /// `(program, subcommand)`. Unscripted commands succeed with no output.
    #[derive(Default)]
    pub(crate) struct ScriptedRunner {
        script: Mutex<Vec<(String, String, Scripted)>>,
        calls: Mutex<Vec<Invocation>>,
    }

    impl ScriptedRunner {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        pub(crate) fn respond(self, program: &str, subcommand: &str, output: CommandOutput) -> Self {
            self.script.lock().unwrap().push((
                program.to_string(),
                subcommand.to_string(),
                Scripted::Output(output),
            ));
            self
        }

        pub(crate) fn fail_to_spawn(self, program: &str, subcommand: &str) -> Self {
            self.script.lock().unwrap().push((
                program.to_string(),
                subcommand.to_string(),
                Scripted::SpawnError,
            ));
            self
        }

        pub(crate) fn calls(&self) -> Vec<Invocation> {
            self.calls.lock().unwrap().clone()
        }

        /// `program subcommand` pairs in call order, e.g. `["terraform init", "docker build"]`
        pub(crate) fn call_names(&self) -> Vec<String> {
            self.calls()
                .iter()
                .map(|c| format!("{} {}", c.program, c.subcommand().unwrap_or_default()))
                .collect()
        }

        pub(crate) fn called(&self, program: &str, subcommand: &str) -> bool {
            self.calls()
                .iter()
                .any(|c| c.program == program && c.subcommand() == Some(subcommand))
        }
    }

    impl CommandRunner for ScriptedRunner {
        fn run(&self, invocation: &Invocation, _mode: OutputMode) -> Result<CommandOutput> {
            self.calls.lock().unwrap().push(invocation.clone());

            let script = self.script.lock().unwrap();
            let entry = script.iter().find(|(program, subcommand, _)| {
                *program == invocation.program && invocation.subcommand() == Some(subcommand)
            });

            match entry {
                Some((_, _, Scripted::Output(output))) => Ok(output.clone()),
                Some((_, _, Scripted::SpawnError)) => {
                    anyhow::bail!("Failed to execute {}", invocation.program)
                }
                None => Ok(CommandOutput::ok("")),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_omits_stdin() {
        let invocation = Invocation::new("docker")
            .args(["login", "--username", "AWS", "--password-stdin"])
            .arg("https://registry.example.com")
            .stdin("super-secret");

        let shown = invocation.to_string();
        assert_eq!(
            shown,
            "docker login --username AWS --password-stdin https://registry.example.com"
        );
        assert!(!format!("{:?}", invocation).contains("super-secret"));
    }

    #[test]
    fn test_status_text() {
        let output = CommandOutput {
            success: false,
            code: Some(2),
            ..Default::default()
        };
        assert_eq!(output.status_text(), "exit code 2");

        let killed = CommandOutput::default();
        assert_eq!(killed.status_text(), "terminated by signal");
    }

    #[test]
    fn test_system_runner_reaps_child_that_ignores_stdin() {
        let invocation = Invocation::new("sh")
            .args(["-c", "exit 3"])
            .stdin("x".repeat(1 << 20));

        match SystemRunner.run(&invocation, OutputMode::Capture) {
            Ok(output) => assert_eq!(output.code, Some(3)),
            Err(e) => assert!(format!("{:#}", e).contains("Failed to write stdin of sh")),
        }
    }

    #[test]
    fn test_system_runner_feeds_stdin() {
        let invocation = Invocation::new("cat").stdin("hello");

        let output = SystemRunner.run(&invocation, OutputMode::Capture).unwrap();

        assert!(output.success);
        assert_eq!(output.stdout, "hello");
    }

    #[test]
    fn test_system_runner_missing_binary() {
        let invocation = Invocation::new("definitely-not-a-real-binary-7f3a");
        let result = SystemRunner.run(&invocation, OutputMode::Capture);
        assert!(result.is_err());
    }
}
