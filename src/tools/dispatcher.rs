//! 工具分发器
//!
//! 持有 ToolRegistry、协作者与全局超时。execute 校验前置条件（工具存在、工作区已打开），
//! 在超时内调用工具，把成功载荷或失败信息统一转成 ToolResult；从不向调用方传播错误。
//! 每次调用输出结构化审计日志（JSON）。

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use serde_json::{Map, Value};
use tokio::time::timeout;

use crate::llm::{ToolCallRequest, ToolDeclaration, ToolResult};
use crate::tools::{Collaborators, ToolContext, ToolRegistry, NO_WORKSPACE};
use crate::workspace::Workspace;

pub struct ToolDispatcher {
    registry: ToolRegistry,
    collab: Collaborators,
    timeout: Duration,
}

impl ToolDispatcher {
    pub fn new(registry: ToolRegistry, collab: Collaborators, timeout_secs: u64) -> Self {
        Self {
            registry,
            collab,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.collab
    }

    pub fn declarations(&self) -> Vec<ToolDeclaration> {
        self.registry.declarations()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }

    /// 执行单个工具调用
    pub async fn execute(
        &self,
        call: &ToolCallRequest,
        workspace: Option<&Arc<dyn Workspace>>,
    ) -> ToolResult {
        let start = Instant::now();
        let (result, outcome) = self.run(call, workspace).await;

        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": call.name,
            "ok": result.is_ok(),
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview(&call.args),
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        match result {
            Ok(payload) => ToolResult::success(&call.name, payload),
            Err(msg) => {
                tracing::warn!(tool = %call.name, error = %msg, "tool failed");
                ToolResult::error(
                    &call.name,
                    format!("Error executing tool '{}': {}", call.name, msg),
                )
            }
        }
    }

    /// 并发执行同一轮的全部调用，结果顺序与调用顺序一致
    pub async fn execute_all(
        &self,
        calls: &[ToolCallRequest],
        workspace: Option<&Arc<dyn Workspace>>,
    ) -> Vec<ToolResult> {
        join_all(calls.iter().map(|call| self.execute(call, workspace))).await
    }

    async fn run(
        &self,
        call: &ToolCallRequest,
        workspace: Option<&Arc<dyn Workspace>>,
    ) -> (Result<Value, String>, &'static str) {
        let Some(tool) = self.registry.get(&call.name) else {
            return (Err(format!("Unknown tool '{}'.", call.name)), "unknown_tool");
        };
        if tool.requires_workspace() && workspace.is_none() {
            return (Err(NO_WORKSPACE.to_string()), "no_workspace");
        }

        let ctx = ToolContext {
            workspace,
            collab: &self.collab,
        };
        match timeout(self.timeout, tool.execute(&call.args, &ctx)).await {
            Ok(Ok(payload)) => {
                if tool.mutates_workspace() {
                    if let Err(e) = self.collab.view.refresh_workspace() {
                        tracing::warn!(tool = %call.name, error = %e, "workspace refresh failed");
                    }
                }
                (Ok(payload), "ok")
            }
            Ok(Err(e)) => (Err(e), "error"),
            Err(_) => (
                Err(format!("Timed out after {}s", self.timeout.as_secs())),
                "timeout",
            ),
        }
    }
}

fn args_preview(args: &Map<String, Value>) -> String {
    let s = Value::Object(args.clone()).to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::json;

    use crate::store::MemoryStore;
    use crate::tools::{Tool, WorkspaceView};
    use crate::workspace::LocalWorkspace;

    struct Echo;

    #[async_trait]
    impl Tool for Echo {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echo args"
        }
        async fn execute(&self, args: &Map<String, Value>, _ctx: &ToolContext<'_>) -> Result<Value, String> {
            Ok(Value::Object(args.clone()))
        }
    }

    struct Touch;

    #[async_trait]
    impl Tool for Touch {
        fn name(&self) -> &str {
            "touch"
        }
        fn description(&self) -> &str {
            "touch"
        }
        fn requires_workspace(&self) -> bool {
            true
        }
        fn mutates_workspace(&self) -> bool {
            true
        }
        async fn execute(&self, _args: &Map<String, Value>, ctx: &ToolContext<'_>) -> Result<Value, String> {
            let ws = ctx.workspace()?;
            ws.write_file("t.txt", "", true).await.map_err(|e| e.to_string())?;
            Ok(json!({ "message": "touched" }))
        }
    }

    struct Slow;

    #[async_trait]
    impl Tool for Slow {
        fn name(&self) -> &str {
            "slow"
        }
        fn description(&self) -> &str {
            "sleeps"
        }
        async fn execute(&self, _args: &Map<String, Value>, _ctx: &ToolContext<'_>) -> Result<Value, String> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Value::Null)
        }
    }

    /// 计数并总是失败的视图
    #[derive(Default)]
    struct FailingView(AtomicUsize);

    impl WorkspaceView for FailingView {
        fn refresh_workspace(&self) -> Result<(), String> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err("tree widget gone".to_string())
        }
    }

    fn dispatcher(view: Arc<FailingView>) -> ToolDispatcher {
        let mut registry = ToolRegistry::new();
        registry.register(Echo);
        registry.register(Touch);
        registry.register(Slow);
        let collab = Collaborators::with_defaults(Arc::new(MemoryStore::default())).with_view(view);
        ToolDispatcher::new(registry, collab, 1)
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let d = dispatcher(Arc::default());
        let r = d.execute(&ToolCallRequest::new("nope", json!({})), None).await;
        assert!(!r.is_success());
        assert_eq!(r.error_message(), Some("Error executing tool 'nope': Unknown tool 'nope'."));
    }

    #[tokio::test]
    async fn test_workspace_precondition() {
        let d = dispatcher(Arc::default());
        let r = d.execute(&ToolCallRequest::new("touch", json!({})), None).await;
        assert!(r.error_message().unwrap().ends_with(NO_WORKSPACE));
    }

    #[tokio::test]
    async fn test_refresh_failure_keeps_success() {
        let view = Arc::new(FailingView::default());
        let d = dispatcher(view.clone());
        let dir = tempfile::TempDir::new().unwrap();
        let ws: Arc<dyn Workspace> = Arc::new(LocalWorkspace::open(dir.path()).unwrap());

        let r = d.execute(&ToolCallRequest::new("touch", json!({})), Some(&ws)).await;
        assert!(r.is_success());
        assert_eq!(view.0.load(Ordering::SeqCst), 1);

        // 非变更工具不刷新
        d.execute(&ToolCallRequest::new("echo", json!({"a": 1})), Some(&ws)).await;
        assert_eq!(view.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_becomes_error_result() {
        let d = dispatcher(Arc::default());
        let r = d.execute(&ToolCallRequest::new("slow", json!({})), None).await;
        assert_eq!(r.error_message(), Some("Error executing tool 'slow': Timed out after 1s"));
    }

    #[tokio::test]
    async fn test_execute_all_keeps_call_order() {
        let d = dispatcher(Arc::default());
        let calls = vec![
            ToolCallRequest::new("echo", json!({"n": 1})),
            ToolCallRequest::new("missing", json!({})),
            ToolCallRequest::new("echo", json!({"n": 2})),
        ];
        let results = d.execute_all(&calls, None).await;
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].response.get("n"), Some(&json!(1)));
        assert!(!results[1].is_success());
        assert_eq!(results[2].response.get("n"), Some(&json!(2)));
    }

    #[test]
    fn test_declarations_sorted() {
        let d = dispatcher(Arc::default());
        let names: Vec<_> = d.declarations().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["echo", "slow", "touch"]);
    }
}
