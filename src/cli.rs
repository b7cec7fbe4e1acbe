//! 行式 REPL：把输入行解析为 Command，把 AgentEvent 渲染为可打印文本
//!
//! 以 `/` 开头的是命令（/cancel、/clear、/condense、/model、/mode、/rate、/keys、/open、/attach、/history、/reload、/quit），
//! 其余作为消息提交。/attach 暂存附件，随下一条消息发送。

use std::path::PathBuf;

use crate::core::{AgentEvent, AgentMode, Attachment, Command, LoopState, UserInput};

pub const HELP: &str = "Commands:
  /cancel            stop the current response
  /clear             clear the conversation
  /condense          summarize the conversation into a fresh session
  /model <name>      switch model (e.g. gemini-2.5-pro)
  /mode <code|plan>  switch agent mode
  /rate <secs>       minimum seconds between requests
  /keys <k1> <k2>..  save API keys (space or comma separated)
  /open <path>       open a project folder
  /attach <path>     attach a file to the next message
  /history           print the raw conversation history
  /reload            reload the config file (model, mode, rate limit)
  /quit              exit";

/// 一行输入的解析结果
#[derive(Debug, Clone)]
pub enum CliAction {
    Send(Command),
    /// 暂存附件，随下一条消息发送
    Attach(PathBuf),
    Help,
    /// 空行
    Nothing,
}

pub fn parse_line(line: &str) -> Result<CliAction, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(CliAction::Nothing);
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(CliAction::Send(Command::Submit(UserInput::text(line))));
    };

    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };
    let need = |what: &str| required(name, arg, what);

    let cmd = match name {
        "cancel" => Command::Cancel,
        "clear" => Command::Clear,
        "condense" => Command::Condense,
        "history" => Command::ShowHistory,
        "reload" => Command::Reload,
        "quit" | "exit" => Command::Quit,
        "help" => return Ok(CliAction::Help),
        "model" => Command::SetModel(need("name")?.to_string()),
        "mode" => Command::SetMode(need("code|plan")?.parse::<AgentMode>()?),
        "rate" => {
            let secs = need("secs")?
                .parse::<u64>()
                .map_err(|_| format!("Invalid number of seconds: '{arg}'"))?;
            Command::SetRateLimit(secs)
        }
        "keys" => {
            let keys: Vec<&str> = need("keys")?
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|k| !k.is_empty())
                .collect();
            Command::SaveKeys(keys.join("\n"))
        }
        "open" => Command::OpenWorkspace(PathBuf::from(need("path")?)),
        "attach" => return Ok(CliAction::Attach(PathBuf::from(need("path")?))),
        other => return Err(format!("Unknown command '/{other}'. Type /help.")),
    };
    Ok(CliAction::Send(cmd))
}

/// 暂存的附件随这条提交一起交给编排器；因忙被拒绝的提交连同附件一起丢弃
pub fn submit_with_attachment(mut input: UserInput, pending: &mut Option<Attachment>) -> Command {
    if let Some(attachment) = pending.take() {
        input.attachment = Some(attachment);
    }
    Command::Submit(input)
}

fn required<'a>(name: &str, arg: &'a str, what: &str) -> Result<&'a str, String> {
    if arg.is_empty() {
        Err(format!("Usage: /{name} <{what}>"))
    } else {
        Ok(arg)
    }
}

/// 事件的可打印形式；不需要打印的返回 None
///
/// PartialText 携带的是到目前为止的完整文本，调用方据此只打印新增部分。
pub fn render_event(event: &AgentEvent) -> Option<String> {
    match event {
        AgentEvent::UserMessage { text } => Some(format!("> {text}")),
        AgentEvent::ToolCall { name, args } => Some(format!(
            "[tool] {name} {}",
            serde_json::Value::Object(args.clone())
        )),
        AgentEvent::ToolResult { name, success, response } => {
            let mark = if *success { "ok" } else { "error" };
            let detail = response
                .get("error")
                .or_else(|| response.get("message"))
                .map(|v| v.as_str().map(String::from).unwrap_or_else(|| v.to_string()))
                .unwrap_or_default();
            Some(format!("[tool] {name} -> {mark} {detail}").trim_end().to_string())
        }
        AgentEvent::Notice { message } | AgentEvent::Cancelled { message } => Some(message.clone()),
        AgentEvent::Error { message } => Some(format!("Error: {message}")),
        AgentEvent::Summary { text } => Some(text.clone()),
        AgentEvent::History { json } => Some(json.clone()),
        AgentEvent::LogCleared => Some("--------".to_string()),
        AgentEvent::StateChanged { state: LoopState::ToolExecuting } => {
            Some("[running tools...]".to_string())
        }
        AgentEvent::PartialText { .. }
        | AgentEvent::StateChanged { .. }
        | AgentEvent::WorkspaceChanged
        | AgentEvent::Done { .. } => None,
    }
}
