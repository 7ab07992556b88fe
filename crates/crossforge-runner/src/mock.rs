//! Scripted runner for tests
//!
//! Records every invocation and answers from a rule table instead of
//! spawning processes. Rules match on a contiguous run of arguments;
//! the first matching rule wins, otherwise the default response is used.

use std::io;
use std::sync::Mutex;
use std::time::Duration;

use crate::diagnostics::{Diagnostics, ExitSummary};
use crate::error::{RunError, RunResult};
use crate::invocation::{Invocation, RunOutput};
use crate::ProcessRunner;

/// A canned response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedResponse {
    /// Exit 0 with the given stdout.
    Success { stdout: Vec<u8> },
    /// Exit with a non-zero code.
    Failure {
        code: i32,
        stdout: Vec<u8>,
        stderr: Vec<u8>,
    },
    /// The binary could not be started.
    Missing,
    /// The deadline expired.
    TimedOut,
}

impl ScriptedResponse {
    /// Successful run printing `stdout`.
    pub fn ok(stdout: impl Into<Vec<u8>>) -> Self {
        ScriptedResponse::Success {
            stdout: stdout.into(),
        }
    }

    /// Failed run with `code` and `stderr`.
    pub fn exit(code: i32, stderr: impl Into<Vec<u8>>) -> Self {
        ScriptedResponse::Failure {
            code,
            stdout: Vec::new(),
            stderr: stderr.into(),
        }
    }
}

struct Rule {
    pattern: Vec<String>,
    response: ScriptedResponse,
}

/// Test double implementing [`ProcessRunner`].
pub struct ScriptedRunner {
    rules: Mutex<Vec<Rule>>,
    default: ScriptedResponse,
    calls: Mutex<Vec<Invocation>>,
}

impl Default for ScriptedRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedRunner {
    /// Runner answering every call with empty successful output.
    pub fn new() -> Self {
        Self {
            rules: Mutex::new(Vec::new()),
            default: ScriptedResponse::ok(Vec::<u8>::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Set the response used when no rule matches.
    pub fn with_default(mut self, response: ScriptedResponse) -> Self {
        self.default = response;
        self
    }

    /// Answer invocations whose arguments contain `pattern`.
    pub fn respond_to(self, pattern: &[&str], response: ScriptedResponse) -> Self {
        if let Ok(mut rules) = self.rules.lock() {
            rules.push(Rule {
                pattern: pattern.iter().map(|s| s.to_string()).collect(),
                response,
            });
        }
        self
    }

    /// All recorded invocations, oldest first.
    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Number of recorded invocations.
    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }

    /// Recorded invocations whose arguments contain `pattern`.
    pub fn calls_matching(&self, pattern: &[&str]) -> Vec<Invocation> {
        self.calls()
            .into_iter()
            .filter(|inv| inv.has_args(pattern))
            .collect()
    }

    /// The most recent invocation.
    pub fn last_call(&self) -> Option<Invocation> {
        self.calls.lock().ok().and_then(|c| c.last().cloned())
    }

    fn response_for(&self, invocation: &Invocation) -> ScriptedResponse {
        let rules = match self.rules.lock() {
            Ok(rules) => rules,
            Err(_) => return self.default.clone(),
        };
        rules
            .iter()
            .find(|rule| {
                let pattern: Vec<&str> = rule.pattern.iter().map(String::as_str).collect();
                invocation.has_args(&pattern)
            })
            .map(|rule| rule.response.clone())
            .unwrap_or_else(|| self.default.clone())
    }
}

impl ProcessRunner for ScriptedRunner {
    fn run(&self, invocation: &Invocation) -> RunResult<RunOutput> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(invocation.clone());
        }

        let program = invocation.program_name();
        match self.response_for(invocation) {
            ScriptedResponse::Success { stdout } => Ok(RunOutput {
                stdout,
                stderr: Vec::new(),
                elapsed: Duration::ZERO,
            }),
            ScriptedResponse::Failure {
                code,
                stdout,
                stderr,
            } => {
                let exit = ExitSummary::code(code);
                let diagnostics =
                    Diagnostics::capture(invocation, stdout, stderr).with_exit(exit);
                diagnostics.log("command failed");
                Err(RunError::Exit {
                    program,
                    exit,
                    diagnostics: Box::new(diagnostics),
                })
            }
            ScriptedResponse::Missing => {
                let diagnostics = Diagnostics::capture(invocation, Vec::new(), Vec::new());
                diagnostics.log("launch failed");
                Err(RunError::Launch {
                    program,
                    source: io::Error::new(io::ErrorKind::NotFound, "no such file or directory"),
                    diagnostics: Box::new(diagnostics),
                })
            }
            ScriptedResponse::TimedOut => {
                let diagnostics = Diagnostics::capture(invocation, Vec::new(), Vec::new());
                diagnostics.log("command timed out");
                Err(RunError::TimedOut {
                    program,
                    timeout: invocation.timeout.unwrap_or_default(),
                    diagnostics: Box::new(diagnostics),
                })
            }
        }
    }
}
