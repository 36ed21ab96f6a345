//! Runnable trait and registry.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// What came out of invoking a runnable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The command ran to completion and produced an exit status.
    ///
    /// `return_code` is `None` when the process was terminated by a signal.
    Exited {
        return_code: Option<i32>,
        output: String,
        error: String,
    },
    /// The command could not be run, or stopped abnormally.
    Raised {
        error: String,
        output: Option<String>,
    },
}

impl RunOutcome {
    /// Normal completion with the given exit code.
    pub fn exited(return_code: i32, output: impl Into<String>, error: impl Into<String>) -> Self {
        RunOutcome::Exited {
            return_code: Some(return_code),
            output: output.into(),
            error: error.into(),
        }
    }

    /// Abnormal termination with no captured output.
    pub fn raised(error: impl Into<String>) -> Self {
        RunOutcome::Raised {
            error: error.into(),
            output: None,
        }
    }

    /// Whether the outcome counts as a successful completion.
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            RunOutcome::Exited {
                return_code: Some(0),
                ..
            }
        )
    }
}

/// Future type for runnables.
pub type RunFuture = Pin<Box<dyn Future<Output = RunOutcome> + Send>>;

/// Trait for runnable job commands.
///
/// Implement this trait to define how jobs naming a specific command are run.
pub trait Runnable: Send + Sync + 'static {
    /// The command name this runnable answers to.
    fn command(&self) -> &str;

    /// Run with the job's arguments.
    fn run(&self, args: &[String]) -> RunFuture;
}

/// Registry for runnables.
///
/// Maps command names to their runnables for dynamic dispatch.
#[derive(Default)]
pub struct RunnableRegistry {
    runnables: HashMap<String, Arc<dyn Runnable>>,
}

impl RunnableRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            runnables: HashMap::new(),
        }
    }

    /// Register a runnable under its command name, replacing any previous one.
    pub fn register<R: Runnable>(&mut self, runnable: R) {
        let command = runnable.command().to_string();
        if self.runnables.insert(command.clone(), Arc::new(runnable)).is_some() {
            tracing::warn!("Runnable for command '{}' replaced", command);
        }
    }

    /// Get the runnable for a command.
    pub fn get(&self, command: &str) -> Option<Arc<dyn Runnable>> {
        self.runnables.get(command).cloned()
    }

    /// Check if a runnable exists for a command.
    pub fn contains(&self, command: &str) -> bool {
        self.runnables.contains_key(command)
    }

    /// List all registered commands, sorted.
    pub fn commands(&self) -> Vec<&str> {
        let mut commands: Vec<&str> = self.runnables.keys().map(|s| s.as_str()).collect();
        commands.sort_unstable();
        commands
    }
}

impl std::fmt::Debug for RunnableRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunnableRegistry")
            .field("commands", &self.commands())
            .finish()
    }
}

/// A simple function-based runnable.
pub struct FnRunnable<F>
where
    F: Fn(&[String]) -> RunFuture + Send + Sync + 'static,
{
    command: String,
    run: F,
}

impl<F> FnRunnable<F>
where
    F: Fn(&[String]) -> RunFuture + Send + Sync + 'static,
{
    /// Create a new function-based runnable.
    pub fn new(command: impl Into<String>, run: F) -> Self {
        Self {
            command: command.into(),
            run,
        }
    }
}

impl<F> Runnable for FnRunnable<F>
where
    F: Fn(&[String]) -> RunFuture + Send + Sync + 'static,
{
    fn command(&self) -> &str {
        &self.command
    }

    fn run(&self, args: &[String]) -> RunFuture {
        (self.run)(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constant(command: &str, code: i32) -> FnRunnable<impl Fn(&[String]) -> RunFuture + Send + Sync + 'static> {
        FnRunnable::new(command, move |args: &[String]| {
            let joined = args.join(",");
            Box::pin(async move { RunOutcome::exited(code, joined, "") })
        })
    }

    #[tokio::test]
    async fn registry_dispatches_by_command() {
        let mut registry = RunnableRegistry::new();
        registry.register(constant("ok", 0));
        registry.register(constant("bad", 2));

        assert_eq!(registry.commands(), vec!["bad", "ok"]);
        assert!(registry.contains("ok"));
        assert!(registry.get("missing").is_none());

        let runnable = registry.get("ok").unwrap();
        let outcome = runnable.run(&["a".to_string(), "b".to_string()]).await;
        assert_eq!(outcome, RunOutcome::exited(0, "a,b", ""));
        assert!(outcome.is_success());

        let outcome = registry.get("bad").unwrap().run(&[]).await;
        assert!(!outcome.is_success());
    }

    #[test]
    fn raised_is_never_success() {
        assert!(!RunOutcome::raised("no such file").is_success());
        let killed = RunOutcome::Exited {
            return_code: None,
            output: String::new(),
            error: String::new(),
        };
        assert!(!killed.is_success());
    }
}
