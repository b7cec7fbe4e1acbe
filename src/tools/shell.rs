//! 终端工具：执行命令、查询文件的 git 提交历史
//!
//! 命令在工作区根目录（未打开时为 HOME）下运行，超时与危险命令拦截由 TerminalService 负责。

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::services::TerminalResponse;
use crate::tools::{parse_args, string_params, Tool, ToolContext};

#[derive(Deserialize)]
struct CommandArgs {
    command: String,
}

#[derive(Deserialize)]
struct HistoryArgs {
    filename: String,
}

fn failure_message(resp: &TerminalResponse) -> String {
    let mut msg = resp
        .message
        .clone()
        .unwrap_or_else(|| "Command failed.".to_string());
    if let Some(stderr) = resp.stderr.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        msg.push_str("\nstderr: ");
        msg.push_str(stderr);
    }
    msg
}

/// 单引号包裹，避免文件名中的空格与特殊字符被 shell 解释
fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

pub struct RunCommandTool;

#[async_trait]
impl Tool for RunCommandTool {
    fn name(&self) -> &str {
        "run_terminal_command"
    }

    fn description(&self) -> &str {
        "Executes a shell command on the backend and returns the output."
    }

    fn parameters_schema(&self) -> Option<Value> {
        Some(string_params(&["command"]))
    }

    fn mutates_workspace(&self) -> bool {
        true
    }

    async fn execute(&self, args: &Map<String, Value>, ctx: &ToolContext<'_>) -> Result<Value, String> {
        let args: CommandArgs = parse_args(args)?;
        let cwd = ctx.workspace.map(|ws| ws.root());
        let resp = ctx.collab.terminal.run(&args.command, cwd).await;
        if !resp.is_success() {
            return Err(failure_message(&resp));
        }
        let mut out = json!({ "output": resp.output });
        if let Some(stderr) = resp.stderr {
            out["stderr"] = Value::String(stderr);
        }
        Ok(out)
    }
}

pub struct FileHistoryTool;

#[async_trait]
impl Tool for FileHistoryTool {
    fn name(&self) -> &str {
        "get_file_history"
    }

    fn description(&self) -> &str {
        "Retrieves the git commit history for a specific file."
    }

    fn parameters_schema(&self) -> Option<Value> {
        Some(string_params(&["filename"]))
    }

    async fn execute(&self, args: &Map<String, Value>, ctx: &ToolContext<'_>) -> Result<Value, String> {
        let args: HistoryArgs = parse_args(args)?;
        let command = format!(
            "git log --pretty=format:\"%h - %an, %ar : %s\" -- {}",
            shell_quote(&args.filename)
        );
        let cwd = ctx.workspace.map(|ws| ws.root());
        let resp = ctx.collab.terminal.run(&command, cwd).await;
        if !resp.is_success() {
            return Err(failure_message(&resp));
        }
        Ok(json!({ "history": resp.output }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, Mutex};

    use crate::services::{CommandStatus, TerminalService};
    use crate::store::MemoryStore;
    use crate::tools::Collaborators;

    /// 记录命令并返回固定结果的终端
    struct ScriptedTerminal {
        reply: TerminalResponse,
        seen: Mutex<Vec<(String, Option<PathBuf>)>>,
    }

    #[async_trait]
    impl TerminalService for ScriptedTerminal {
        async fn run(&self, command: &str, cwd: Option<&Path>) -> TerminalResponse {
            self.seen
                .lock()
                .unwrap()
                .push((command.to_string(), cwd.map(Path::to_path_buf)));
            self.reply.clone()
        }
    }

    fn collab(reply: TerminalResponse) -> (Arc<ScriptedTerminal>, Collaborators) {
        let term = Arc::new(ScriptedTerminal {
            reply,
            seen: Mutex::new(Vec::new()),
        });
        let collab = Collaborators::with_defaults(Arc::new(MemoryStore::default()))
            .with_terminal(term.clone());
        (term, collab)
    }

    fn ok(output: &str) -> TerminalResponse {
        TerminalResponse {
            status: CommandStatus::Success,
            output: output.to_string(),
            stderr: None,
            message: None,
        }
    }

    #[tokio::test]
    async fn test_file_history_command() {
        let (term, collab) = collab(ok("abc123 - Ann, 2 days ago : init"));
        let ctx = ToolContext {
            workspace: None,
            collab: &collab,
        };
        let args = json!({"filename": "src/my file.js"});
        let out = FileHistoryTool
            .execute(args.as_object().unwrap(), &ctx)
            .await
            .unwrap();
        assert_eq!(out["history"], "abc123 - Ann, 2 days ago : init");
        let seen = term.seen.lock().unwrap();
        assert_eq!(
            seen[0].0,
            "git log --pretty=format:\"%h - %an, %ar : %s\" -- 'src/my file.js'"
        );
        assert_eq!(seen[0].1, None);
    }

    #[tokio::test]
    async fn test_run_command_failure_carries_message() {
        let (_term, collab) = collab(TerminalResponse {
            status: CommandStatus::Error,
            output: String::new(),
            stderr: Some("boom\n".to_string()),
            message: Some("Command failed with exit code 1.".to_string()),
        });
        let ctx = ToolContext {
            workspace: None,
            collab: &collab,
        };
        let args = json!({"command": "false"});
        let err = RunCommandTool
            .execute(args.as_object().unwrap(), &ctx)
            .await
            .unwrap_err();
        assert_eq!(err, "Command failed with exit code 1.\nstderr: boom");
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("it's.js"), r"'it'\''s.js'");
    }
}
