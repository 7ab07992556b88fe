//! Invocation description and captured output.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// A single process invocation.
///
/// `env` is ordered and complete: nothing from the parent process is
/// inherited unless it appears here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Absolute path (or bare name) of the binary to execute.
    pub program: PathBuf,
    /// Arguments, not including the program itself.
    pub args: Vec<String>,
    /// Working directory for the child.
    pub working_dir: PathBuf,
    /// Complete child environment as ordered `(key, value)` pairs.
    pub env: Vec<(String, String)>,
    /// Wall-clock limit. `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl Invocation {
    /// Create an invocation with no arguments, an empty environment and
    /// the given working directory.
    pub fn new(program: impl Into<PathBuf>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: working_dir.into(),
            env: Vec::new(),
            timeout: None,
        }
    }

    /// Append a single argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Replace the environment.
    pub fn env<I, K, V>(mut self, env: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env = env.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        self
    }

    /// Set the wall-clock limit.
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Program name for messages (file name when available).
    pub fn program_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.display().to_string())
    }

    /// Shell-like rendering of program and arguments, for logs only.
    pub fn command_line(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                line.push('\'');
                line.push_str(arg);
                line.push('\'');
            } else {
                line.push_str(arg);
            }
        }
        line
    }

    /// Look up an environment value by key.
    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Whether `pattern` occurs as a contiguous run inside `args`.
    pub fn has_args(&self, pattern: &[&str]) -> bool {
        if pattern.is_empty() {
            return true;
        }
        self.args
            .windows(pattern.len())
            .any(|w| w.iter().zip(pattern).all(|(a, p)| a == p))
    }

    /// The working directory as a path.
    pub fn dir(&self) -> &Path {
        &self.working_dir
    }
}

/// Output of a successful invocation.
#[derive(Debug, Clone, Default)]
pub struct RunOutput {
    /// Raw stdout bytes.
    pub stdout: Vec<u8>,
    /// Raw stderr bytes (compilers may warn on success).
    pub stderr: Vec<u8>,
    /// Wall-clock duration of the child.
    pub elapsed: Duration,
}

impl RunOutput {
    /// Stdout decoded lossily.
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let inv = Invocation::new("/opt/go/bin/go", "/src")
            .arg("build")
            .args(["-o", "out", "."])
            .env([("GOOS", "linux"), ("PATH", "/opt/go/bin:/usr/bin")])
            .timeout(Some(Duration::from_secs(5)));

        assert_eq!(inv.args, vec!["build", "-o", "out", "."]);
        assert_eq!(inv.env_value("GOOS"), Some("linux"));
        assert_eq!(inv.env_value("HOME"), None);
        assert_eq!(inv.timeout, Some(Duration::from_secs(5)));
        assert_eq!(inv.program_name(), "go");
    }

    #[test]
    fn test_command_line_quotes_whitespace() {
        let inv = Invocation::new("go", ".").args(["build", "-ldflags", "-s -w"]);
        assert_eq!(inv.command_line(), "go build -ldflags '-s -w'");
    }

    #[test]
    fn test_has_args() {
        let inv = Invocation::new("go", ".").args(["tool", "dist", "list"]);
        assert!(inv.has_args(&["dist", "list"]));
        assert!(inv.has_args(&[]));
        assert!(!inv.has_args(&["tool", "list"]));
        assert!(!inv.has_args(&["tool", "dist", "list", "-json"]));
    }
}
