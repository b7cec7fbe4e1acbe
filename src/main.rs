//! Aide - Gemini 编码智能体
//!
//! 入口：初始化日志、创建 Agent 编排器，在标准输入上运行行式 REPL 并打印事件。

use std::io::Write;

use anyhow::Context;
use aide::cli::{parse_line, render_event, submit_with_attachment, CliAction, HELP};
use aide::core::{create_agent, AgentEvent, Attachment, Command};
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    aide::observability::init();

    let config_path = std::env::args().nth(1).map(Into::into);
    let (cmd_tx, mut event_rx, _handle) = create_agent(config_path)
        .await
        .context("Failed to create agent")?;

    // 事件打印：PartialText 是累计文本，只输出新增部分
    let printer = tokio::spawn(async move {
        let mut printed = 0usize;
        while let Some(event) = event_rx.recv().await {
            match &event {
                AgentEvent::PartialText { text } => {
                    if text.len() > printed {
                        print!("{}", &text[printed..]);
                        let _ = std::io::stdout().flush();
                    }
                    printed = text.len();
                    continue;
                }
                AgentEvent::StateChanged { .. } | AgentEvent::Done { .. } => {
                    if printed > 0 {
                        println!();
                        printed = 0;
                    }
                }
                _ => {}
            }
            if let Some(line) = render_event(&event) {
                println!("{line}");
            }
        }
    });

    println!("aide ready. Type a message, or /help for commands.");
    let mut pending: Option<Attachment> = None;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        match parse_line(&line) {
            Ok(CliAction::Nothing) => {}
            Ok(CliAction::Help) => println!("{HELP}"),
            Ok(CliAction::Attach(path)) => match Attachment::from_path(&path).await {
                Ok(a) => {
                    println!("Attached {} ({}); it will be sent with your next message.", a.name, a.mime_type);
                    pending = Some(a);
                }
                Err(e) => println!("Error: could not read {}: {e}", path.display()),
            },
            Ok(CliAction::Send(Command::Submit(input))) => {
                let _ = cmd_tx.send(submit_with_attachment(input, &mut pending));
            }
            Ok(CliAction::Send(Command::Quit)) => break,
            Ok(CliAction::Send(cmd)) => {
                let _ = cmd_tx.send(cmd);
            }
            Err(msg) => println!("{msg}"),
        }
    }

    let _ = cmd_tx.send(Command::Quit);
    drop(cmd_tx);
    let _ = printer.await;
    Ok(())
}
