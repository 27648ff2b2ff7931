//! Tool runner double that records invocations instead of running them.
//!
//! Output files named on the command line are materialised so that the
//! artifact checks downstream see them: `-o` and `-oinv` values get a small
//! placeholder, and `-rm <input> <output>` copies the input to the output.

use std::fs;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use crate::error::{RegistrationError, Result};
use crate::tool::{ToolInvocation, ToolOutput, ToolRunner};

#[derive(Debug)]
pub struct RecordingRunner {
    invocations: Mutex<Vec<ToolInvocation>>,
    status: i32,
    write_outputs: bool,
}

impl Default for RecordingRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self {
            invocations: Mutex::new(Vec::new()),
            status: 0,
            write_outputs: true,
        }
    }

    /// Exit status reported for every call.
    pub fn with_status(mut self, status: i32) -> Self {
        self.status = status;
        self
    }

    /// Do not create any output files.
    pub fn without_outputs(mut self) -> Self {
        self.write_outputs = false;
        self
    }

    pub fn invocations(&self) -> Vec<ToolInvocation> {
        self.invocations.lock().map(|v| v.clone()).unwrap_or_default()
    }

    /// Invocations whose arguments contain `flag`.
    pub fn count_with(&self, flag: &str) -> usize {
        self.invocations()
            .iter()
            .filter(|inv| inv.arguments().iter().any(|a| a == flag))
            .count()
    }

    fn materialise(&self, invocation: &ToolInvocation) -> Result<()> {
        for flag in ["-o", "-oinv"] {
            for value in invocation.values_after(flag, 1) {
                let path = Path::new(&value[0]);
                create_parent(path)?;
                fs::write(path, b"1 0 0 0\n0 1 0 0\n0 0 1 0\n0 0 0 1\n")
                    .map_err(|e| RegistrationError::io(path, e))?;
            }
        }
        for pair in invocation.values_after("-rm", 2) {
            let (input, output) = (Path::new(&pair[0]), Path::new(&pair[1]));
            create_parent(output)?;
            if input.exists() {
                fs::copy(input, output).map_err(|e| RegistrationError::io(output, e))?;
            } else {
                fs::write(output, b"").map_err(|e| RegistrationError::io(output, e))?;
            }
        }
        Ok(())
    }
}

fn create_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(|e| RegistrationError::io(parent, e))
        }
        _ => Ok(()),
    }
}

impl ToolRunner for RecordingRunner {
    fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutput> {
        if let Ok(mut invocations) = self.invocations.lock() {
            invocations.push(invocation.clone());
        }
        if self.write_outputs {
            self.materialise(invocation)?;
        }
        Ok(ToolOutput {
            status: Some(self.status),
            stdout: String::new(),
            stderr: if self.status == 0 {
                String::new()
            } else {
                "simulated failure".to_string()
            },
            elapsed: Duration::from_millis(1),
        })
    }
}
