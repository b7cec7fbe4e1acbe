//! Agent 编排器：主控循环
//!
//! 负责：加载配置、构建 AgentLoop、建立 命令/事件 两条通道，并在后台任务中消费用户命令。
//! 一轮发送进行中时仍持续接收命令：Cancel 立即生效，Submit 被拒绝并给出提示，其余设置类命令照常处理。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::agent::AgentBuilder;
use crate::config::{load_config, reload_config, AppConfig};
use crate::core::agent_loop::{AgentHandle, AgentLoop, UserInput};
use crate::core::events::{AgentEvent, EventSender};
use crate::core::session::AgentMode;
use crate::workspace::LocalWorkspace;

/// 从前端发往编排器的用户命令
#[derive(Debug, Clone)]
pub enum Command {
    /// 提交用户输入，触发一轮发送
    Submit(UserInput),
    /// 取消当前一轮（Stop generating）
    Cancel,
    /// 清空对话
    Clear,
    /// 压缩历史为摘要并开新会话
    Condense,
    SetModel(String),
    SetMode(AgentMode),
    /// 请求最小间隔（秒）
    SetRateLimit(u64),
    /// 保存换行分隔的 API Key 列表
    SaveKeys(String),
    OpenWorkspace(PathBuf),
    ShowHistory,
    /// 重新加载配置文件，应用其中的模型、模式与限流间隔
    Reload,
    /// 退出应用
    Quit,
}

/// 创建 Agent 运行时：返回命令发送端、事件接收端与控制句柄；后台任务消费命令
pub async fn create_agent(
    config_path: Option<PathBuf>,
) -> anyhow::Result<(
    mpsc::UnboundedSender<Command>,
    mpsc::UnboundedReceiver<AgentEvent>,
    AgentHandle,
)> {
    let cfg = load_config(config_path.clone()).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let agent = AgentBuilder::new(cfg).build(event_tx)?;
    let (cmd_tx, handle, _task) = spawn_driver(agent, config_path);
    Ok((cmd_tx, event_rx, handle))
}

/// 在后台任务中驱动已构建的 AgentLoop；config_path 供 Reload 使用
pub fn spawn_driver(
    agent: AgentLoop,
    config_path: Option<PathBuf>,
) -> (mpsc::UnboundedSender<Command>, AgentHandle, JoinHandle<()>) {
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let handle = agent.handle();
    let task = tokio::spawn(drive(agent, cmd_rx, config_path));
    (cmd_tx, handle, task)
}

async fn drive(
    mut agent: AgentLoop,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
    config_path: Option<PathBuf>,
) {
    let events = agent.events();
    let handle = agent.handle();

    while let Some(cmd) = cmd_rx.recv().await {
        match cmd {
            Command::Submit(input) => {
                let mut quit = false;
                let cycle = agent.send_message(input);
                tokio::pin!(cycle);
                loop {
                    tokio::select! {
                        outcome = &mut cycle => {
                            tracing::debug!(outcome = ?outcome, "cycle returned to driver");
                            break;
                        }
                        Some(cmd) = cmd_rx.recv() => {
                            quit |= handle_while_busy(cmd, &handle, &events);
                        }
                    }
                }
                if quit {
                    break;
                }
            }
            Command::Cancel => {
                // 空闲时无效果
                agent.cancel();
            }
            Command::Clear => agent.clear_history(),
            Command::Condense => agent.condense_history().await,
            Command::SetModel(model) => agent.set_model(model),
            Command::SetMode(mode) => agent.set_mode(mode),
            Command::SetRateLimit(secs) => agent.set_rate_limit(Duration::from_secs(secs)),
            Command::SaveKeys(text) => {
                if let Err(e) = agent.save_credentials(&text) {
                    tracing::warn!(error = %e, "saving API keys failed");
                    let _ = events.send(AgentEvent::Error {
                        message: e.to_string(),
                    });
                }
            }
            Command::OpenWorkspace(path) => match LocalWorkspace::open(&path) {
                Ok(ws) => agent.open_workspace(Arc::new(ws)),
                Err(e) => {
                    let _ = events.send(AgentEvent::Error {
                        message: format!("Could not open '{}': {}", path.display(), e),
                    });
                }
            },
            Command::ShowHistory => {
                let _ = events.send(AgentEvent::History {
                    json: agent.history_json(),
                });
            }
            Command::Reload => match reload_config(config_path.as_deref()) {
                Ok(cfg) => {
                    agent.set_model(cfg.llm.model.clone());
                    agent.set_mode(cfg.llm.mode);
                    agent.set_rate_limit(Duration::from_secs(cfg.rate_limit.min_interval_secs));
                    let _ = events.send(AgentEvent::Notice {
                        message: format!(
                            "Configuration reloaded: model {}, mode {}, {}s between requests.",
                            cfg.llm.model, cfg.llm.mode, cfg.rate_limit.min_interval_secs
                        ),
                    });
                }
                Err(e) => {
                    tracing::warn!(error = %e, "config reload failed");
                    let _ = events.send(AgentEvent::Error {
                        message: format!("Could not reload configuration: {e}"),
                    });
                }
            },
            Command::Quit => break,
        }
    }
    tracing::info!("agent driver stopped");
}

/// 一轮进行中收到的命令；返回是否要求退出
fn handle_while_busy(cmd: Command, handle: &AgentHandle, events: &EventSender) -> bool {
    match cmd {
        Command::Cancel => {
            handle.cancel();
            false
        }
        Command::SetRateLimit(secs) => {
            handle.set_rate_limit(Duration::from_secs(secs));
            false
        }
        Command::Quit => {
            handle.cancel();
            true
        }
        other => {
            tracing::debug!(command = ?other, "command rejected while sending");
            let _ = events.send(AgentEvent::Notice {
                message: "A response is still in progress. Cancel it or wait for it to finish."
                    .to_string(),
            });
            false
        }
    }
}
