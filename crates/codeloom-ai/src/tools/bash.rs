//! Shell command execution tool.
//!
//! Commands run through `sh -c` in the session working directory with a
//! timeout and truncated output. Always asks for approval.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::process::Command;
use tokio::time::timeout;

use codeloom_traits::{Tool, ToolError, ToolOutput, ToolResult, ToolRisk};

/// Default timeout for command execution in seconds
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 120;

/// Maximum output size in bytes (100KB)
const DEFAULT_MAX_OUTPUT_BYTES: usize = 100_000;

/// Shell command tool
#[derive(Debug, Clone)]
pub struct RunCommandTool {
    workdir: PathBuf,
    timeout_secs: u64,
    max_output_bytes: usize,
}

impl RunCommandTool {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
            timeout_secs: DEFAULT_COMMAND_TIMEOUT_SECS,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }

    /// Set command timeout in seconds
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Set maximum output size in bytes
    pub fn with_max_output(mut self, bytes: usize) -> Self {
        self.max_output_bytes = bytes;
        self
    }

    async fn run(&self, command: &str) -> std::io::Result<CommandOutput> {
        let started = Instant::now();
        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&self.workdir)
            .kill_on_drop(true)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        let limit = self.max_output_bytes;
        Ok(CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            truncated: output.stdout.len() > limit || output.stderr.len() > limit,
            stdout: clip(&output.stdout, limit),
            stderr: clip(&output.stderr, limit),
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }
}

/// Lossy UTF-8 of at most `limit` bytes, with a marker when clipped.
fn clip(bytes: &[u8], limit: usize) -> String {
    match bytes.get(..limit) {
        Some(head) if head.len() < bytes.len() => format!(
            "{}...\n[Output truncated, {} bytes total]",
            String::from_utf8_lossy(head),
            bytes.len()
        ),
        _ => String::from_utf8_lossy(bytes).into_owned(),
    }
}

#[derive(Debug, Deserialize)]
struct CommandInput {
    #[serde(alias = "cmd")]
    command: String,
    #[serde(default)]
    timeout: Option<u64>,
}

/// Structured result returned to the model
#[derive(Debug, Serialize, Deserialize)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub truncated: bool,
    pub duration_ms: u64,
}

#[async_trait]
impl Tool for RunCommandTool {
    fn name(&self) -> &str {
        "run_command"
    }

    fn description(&self) -> &str {
        "Run a shell command in the working directory and return stdout, stderr, and exit status."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute"
                },
                "timeout": {
                    "type": "integer",
                    "description": "Timeout in seconds"
                }
            },
            "required": ["command"]
        })
    }

    fn risk(&self) -> ToolRisk {
        ToolRisk::High
    }

    async fn execute(&self, input: Value) -> ToolResult<ToolOutput> {
        let input: CommandInput = serde_json::from_value(input)
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;
        let timeout_secs = input.timeout.unwrap_or(self.timeout_secs);

        match timeout(Duration::from_secs(timeout_secs), self.run(&input.command)).await {
            Ok(Ok(output)) if output.exit_code == 0 => {
                Ok(ToolOutput::success(serde_json::to_value(&output)?))
            }
            Ok(Ok(output)) => Ok(ToolOutput {
                success: false,
                error: Some(format!("Command exited with code {}", output.exit_code)),
                result: serde_json::to_value(&output)?,
            }),
            Ok(Err(e)) => Ok(ToolOutput::error(format!("Failed to spawn command: {e}"))),
            Err(_) => {
                tracing::warn!(command = %input.command, timeout_secs, "Command timed out");
                Ok(ToolOutput::error(format!(
                    "Timeout after {timeout_secs} seconds"
                )))
            }
        }
    }
}
