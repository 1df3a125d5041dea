//! In-memory doubles for the external tool boundary

use std::sync::Mutex;

use async_trait::async_trait;

use crate::process::{CommandOutput, CommandRunner, CommandSpec, ProcessError};

#[derive(Debug, Clone)]
enum Reply {
    Output(CommandOutput),
    NotFound,
}

#[derive(Debug)]
struct Rule {
    prefix: String,
    reply: Reply,
    /// `None` for rules that never run out
    remaining: Option<usize>,
}

/// Runner that replays canned replies keyed by command-line prefix.
///
/// One-shot replies are consumed in registration order and take precedence
/// over standing replies. Unmatched commands succeed with empty output.
/// A command whose cancellation token is already tripped fails as cancelled.
/// Every invocation is recorded.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<CommandSpec>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(self, prefix: &str, reply: Reply, remaining: Option<usize>) -> Self {
        self.rules
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Rule {
                prefix: prefix.to_string(),
                reply,
                remaining,
            });
        self
    }

    /// Always answer `prefix` with `stdout` and exit code 0
    pub fn on(self, prefix: &str, stdout: &str) -> Self {
        self.push(prefix, Reply::Output(ok(stdout)), None)
    }

    /// Answer the next `prefix` call with `stdout` and exit code 0
    pub fn on_once(self, prefix: &str, stdout: &str) -> Self {
        self.push(prefix, Reply::Output(ok(stdout)), Some(1))
    }

    /// Always answer `prefix` with `stderr` and exit code 1
    pub fn fail(self, prefix: &str, stderr: &str) -> Self {
        self.push(prefix, Reply::Output(failed(stderr)), None)
    }

    /// Answer the next `prefix` call with `stderr` and exit code 1
    pub fn fail_once(self, prefix: &str, stderr: &str) -> Self {
        self.push(prefix, Reply::Output(failed(stderr)), Some(1))
    }

    /// Pretend the executable behind `prefix` is not installed
    pub fn missing(self, prefix: &str) -> Self {
        self.push(prefix, Reply::NotFound, None)
    }

    /// Command lines in invocation order
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(CommandSpec::command_line)
            .collect()
    }

    /// Full specs in invocation order
    pub fn specs(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    pub fn invoked(&self, prefix: &str) -> bool {
        self.count(prefix) > 0
    }

    fn reply_for(&self, command_line: &str) -> Option<Reply> {
        let mut rules = self.rules.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(rule) = rules.iter_mut().find(|r| {
            matches!(r.remaining, Some(n) if n > 0) && command_line.starts_with(&r.prefix)
        }) {
            rule.remaining = rule.remaining.map(|n| n - 1);
            return Some(rule.reply.clone());
        }

        rules
            .iter()
            .find(|r| r.remaining.is_none() && command_line.starts_with(&r.prefix))
            .map(|r| r.reply.clone())
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, ProcessError> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(spec.clone());

        let command_line = spec.command_line();
        if spec.cancel.as_ref().is_some_and(|t| t.is_cancelled()) {
            return Err(ProcessError::Cancelled {
                command: command_line,
            });
        }

        match self.reply_for(&command_line) {
            Some(Reply::Output(output)) => Ok(output),
            Some(Reply::NotFound) => Err(ProcessError::Spawn {
                command: command_line,
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "program not found"),
            }),
            None => Ok(ok("")),
        }
    }
}

fn ok(stdout: &str) -> CommandOutput {
    CommandOutput {
        stdout: stdout.to_string(),
        stderr: String::new(),
        exit_code: Some(0),
    }
}

fn failed(stderr: &str) -> CommandOutput {
    CommandOutput {
        stdout: String::new(),
        stderr: stderr.to_string(),
        exit_code: Some(1),
    }
}
