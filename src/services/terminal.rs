//! 终端命令执行
//!
//! 禁止 rm -rf、mkfs、fork bomb 等危险子串；通过 sh -c / cmd /C 执行，
//! 工作目录为工作区根目录（未打开时为 HOME），带超时与 tracing 审计。

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::process::Command;

/// 禁止的命令子串
const FORBIDDEN_SUBSTR: &[&str] = &[
    "rm -rf /",
    "rm -fr /",
    "curl | sh",
    "wget | sh",
    "chmod 777 /",
    "mkfs",
    "dd if=",
    "> /dev/sd",
    ":(){ :|:& };:", // fork bomb
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    Success,
    Error,
}

/// 命令执行结果
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TerminalResponse {
    pub status: CommandStatus,
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl TerminalResponse {
    fn error(message: impl Into<String>, output: String, stderr: Option<String>) -> Self {
        Self {
            status: CommandStatus::Error,
            output,
            stderr,
            message: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == CommandStatus::Success
    }
}

#[async_trait]
pub trait TerminalService: Send + Sync {
    /// 执行命令；cwd 为 None 时使用 HOME
    async fn run(&self, command: &str, cwd: Option<&Path>) -> TerminalResponse;
}

/// 本机 shell
pub struct LocalTerminal {
    timeout: Duration,
}

impl LocalTerminal {
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    fn check_forbidden(command: &str) -> Result<(), String> {
        let lower = command.to_lowercase();
        for forbidden in FORBIDDEN_SUBSTR {
            if lower.contains(forbidden) {
                return Err(format!("Forbidden pattern: {}", forbidden));
            }
        }
        Ok(())
    }

    fn home_dir() -> Option<PathBuf> {
        std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .map(PathBuf::from)
    }
}

#[async_trait]
impl TerminalService for LocalTerminal {
    async fn run(&self, command: &str, cwd: Option<&Path>) -> TerminalResponse {
        let command = command.trim();
        if command.is_empty() {
            return TerminalResponse::error("No command provided.", String::new(), None);
        }
        if let Err(e) = Self::check_forbidden(command) {
            return TerminalResponse::error(e, String::new(), None);
        }

        tracing::info!(command = %command, "terminal execute");

        let mut cmd = if cfg!(target_os = "windows") {
            let mut c = Command::new("cmd");
            c.args(["/C", command]);
            c
        } else {
            let mut c = Command::new("sh");
            c.args(["-c", command]);
            c
        };
        if let Some(dir) = cwd.map(Path::to_path_buf).or_else(Self::home_dir) {
            cmd.current_dir(dir);
        }
        cmd.kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Err(_) => {
                tracing::warn!(command = %command, "terminal command timed out");
                return TerminalResponse::error(
                    "Command execution timed out.",
                    String::new(),
                    None,
                );
            }
            Ok(Err(e)) => {
                return TerminalResponse::error(format!("Command failed: {e}"), String::new(), None)
            }
            Ok(Ok(output)) => output,
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let stderr = (!stderr.trim().is_empty()).then_some(stderr);
        if output.status.success() {
            TerminalResponse {
                status: CommandStatus::Success,
                output: stdout,
                stderr,
                message: None,
            }
        } else {
            let code = output
                .status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            TerminalResponse::error(format!("Command failed with exit code {code}."), stdout, stderr)
        }
    }
}
