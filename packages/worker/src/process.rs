//! Runnable that executes an external program.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use crate::runnable::{RunFuture, RunOutcome, Runnable};

/// Runs `program [base_args..] [job args..]` and captures its output.
#[derive(Debug, Clone)]
pub struct ProcessRunnable {
    command: String,
    program: PathBuf,
    base_args: Vec<String>,
    current_dir: Option<PathBuf>,
    timeout: Option<Duration>,
}

impl ProcessRunnable {
    /// Expose `program` under the job command name `command`.
    pub fn new(command: impl Into<String>, program: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            program: program.into(),
            base_args: Vec::new(),
            current_dir: None,
            timeout: None,
        }
    }

    /// Arguments placed before the job's own arguments.
    pub fn with_base_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.base_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Working directory of the child process.
    pub fn with_current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Kill the child and report a failure if it runs longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn build(&self, args: &[String]) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.base_args)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }
        cmd
    }
}

impl Runnable for ProcessRunnable {
    fn command(&self) -> &str {
        &self.command
    }

    fn run(&self, args: &[String]) -> RunFuture {
        let mut cmd = self.build(args);
        let program = self.program.display().to_string();
        let timeout = self.timeout;

        Box::pin(async move {
            let result = match timeout {
                // Dropping the timed-out future drops the child, which kills it.
                Some(limit) => match tokio::time::timeout(limit, cmd.output()).await {
                    Ok(result) => result,
                    Err(_elapsed) => {
                        return RunOutcome::raised(format!(
                            "`{}` timed out after {}s",
                            program,
                            limit.as_secs_f64()
                        ));
                    }
                },
                None => cmd.output().await,
            };

            match result {
                Ok(output) => RunOutcome::Exited {
                    return_code: output.status.code(),
                    output: String::from_utf8_lossy(&output.stdout).into_owned(),
                    error: String::from_utf8_lossy(&output.stderr).into_owned(),
                },
                Err(e) => RunOutcome::raised(format!("failed to run `{}`: {}", program, e)),
            }
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn captures_stdout_and_exit_code() {
        let echo = ProcessRunnable::new("echo", "echo");
        match echo.run(&args(&["hello"])).await {
            RunOutcome::Exited {
                return_code,
                output,
                ..
            } => {
                assert_eq!(return_code, Some(0));
                assert_eq!(output.trim(), "hello");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn base_args_come_first() {
        let sh = ProcessRunnable::new("greet", "sh").with_base_args(["-c", "echo \"$0-$1\""]);
        match sh.run(&args(&["a", "b"])).await {
            RunOutcome::Exited { output, .. } => assert_eq!(output.trim(), "a-b"),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn missing_program_is_raised() {
        let missing = ProcessRunnable::new("missing", "/nonexistent/definitely-not-here");
        match missing.run(&[]).await {
            RunOutcome::Raised { error, .. } => {
                assert!(error.contains("/nonexistent/definitely-not-here"), "{}", error);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn timeout_is_raised() {
        let sleepy = ProcessRunnable::new("sleep", "sleep").with_timeout(Duration::from_millis(100));
        match sleepy.run(&args(&["5"])).await {
            RunOutcome::Raised { error, .. } => assert!(error.contains("timed out"), "{}", error),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }
}
