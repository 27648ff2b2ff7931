//! External tool execution.
//!
//! Every call returns a [`ToolOutput`] carrying the exit status, captured
//! output and elapsed time. Calls block their thread until the tool exits;
//! there is no timeout and no retry.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{RegistrationError, Result};

/// A program and its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    program: PathBuf,
    args: Vec<String>,
}

impl ToolInvocation {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn path_arg(self, path: &Path) -> Self {
        self.arg(path.to_string_lossy().into_owned())
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Program file name, used in logs and errors.
    pub fn tool_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.display().to_string())
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    /// Values following every occurrence of `flag`, up to `count` each.
    pub fn values_after(&self, flag: &str, count: usize) -> Vec<&[String]> {
        self.args
            .iter()
            .enumerate()
            .filter(|(_, a)| a.as_str() == flag)
            .filter_map(|(i, _)| self.args.get(i + 1..i + 1 + count))
            .collect()
    }
}

impl fmt::Display for ToolInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Result of running an external tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    /// Exit code; `None` when the process was killed by a signal.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

/// Executes tool invocations.
pub trait ToolRunner: Send + Sync {
    fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutput>;
}

/// Runs tools as blocking child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ToolRunner for ProcessRunner {
    fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutput> {
        let tool = invocation.tool_name();
        debug!(tool = %tool, args = ?invocation.arguments(), "Starting external tool");

        let start = Instant::now();
        let output = Command::new(invocation.program())
            .args(invocation.arguments())
            .output()
            .map_err(|source| RegistrationError::Spawn {
                tool: tool.clone(),
                source,
            })?;
        let elapsed = start.elapsed();

        let result = ToolOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            elapsed,
        };
        info!(
            tool = %tool,
            status = ?result.status,
            elapsed_ms = elapsed.as_millis() as u64,
            "External tool finished"
        );
        Ok(result)
    }
}

/// What to do when a tool exits non-zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExitPolicy {
    /// A non-zero exit is an error.
    #[default]
    Strict,
    /// A non-zero exit is logged; the artifact check still applies.
    Tolerate,
}

impl ExitPolicy {
    pub fn check(&self, invocation: &ToolInvocation, output: &ToolOutput) -> Result<()> {
        if output.success() {
            return Ok(());
        }
        match self {
            ExitPolicy::Strict => Err(RegistrationError::ExternalTool {
                tool: invocation.tool_name(),
                status: output.status,
                stderr: output.stderr.trim().to_string(),
            }),
            ExitPolicy::Tolerate => {
                warn!(
                    tool = %invocation.tool_name(),
                    status = ?output.status,
                    stderr = %output.stderr.trim(),
                    "External tool reported failure, continuing"
                );
                Ok(())
            }
        }
    }
}

/// Run `invocation`, apply `policy`, then require every `expected` file.
pub fn run_checked(
    runner: &dyn ToolRunner,
    invocation: &ToolInvocation,
    policy: ExitPolicy,
    step: &str,
    expected: &[&Path],
) -> Result<ToolOutput> {
    let output = runner.run(invocation)?;
    if !output.stdout.is_empty() {
        debug!(step, stdout = %output.stdout.trim_end(), "Tool output");
    }
    policy.check(invocation, &output)?;

    for path in expected {
        if !path.exists() {
            return Err(RegistrationError::missing_artifact(*path, step));
        }
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingRunner;
    use tempfile::tempdir;

    #[test]
    fn test_values_after() {
        let invocation = ToolInvocation::new("/opt/greedy")
            .args(["-rm", "a.nii", "b.nii", "-rm", "c.nii", "d.nii", "-o"]);
        let pairs = invocation.values_after("-rm", 2);
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[1], &["c.nii".to_string(), "d.nii".to_string()]);
        // dangling flag has no value
        assert!(invocation.values_after("-o", 1).is_empty());
        assert_eq!(invocation.tool_name(), "greedy");
    }

    #[test]
    fn test_strict_policy_fails_on_nonzero() {
        let invocation = ToolInvocation::new("greedy");
        let output = ToolOutput {
            status: Some(1),
            stdout: String::new(),
            stderr: "boom\n".to_string(),
            elapsed: Duration::from_millis(5),
        };
        let err = ExitPolicy::Strict.check(&invocation, &output).unwrap_err();
        assert!(matches!(err, RegistrationError::ExternalTool { ref stderr, .. } if stderr == "boom"));
        assert!(ExitPolicy::Tolerate.check(&invocation, &output).is_ok());
    }

    #[test]
    fn test_run_checked_requires_artifact_under_tolerate() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("never_written.mat");
        let runner = RecordingRunner::new().with_status(2).without_outputs();
        let invocation = ToolInvocation::new("greedy").arg("-o").path_arg(&out);

        let err = run_checked(&runner, &invocation, ExitPolicy::Tolerate, "affine registration", &[out.as_path()])
            .unwrap_err();
        assert!(matches!(err, RegistrationError::MissingArtifact { .. }));
    }

    #[test]
    fn test_process_runner_reports_spawn_failure() {
        let invocation = ToolInvocation::new("/nonexistent/petmux-no-such-tool");
        let err = ProcessRunner.run(&invocation).unwrap_err();
        assert!(matches!(err, RegistrationError::Spawn { .. }));
    }
}
