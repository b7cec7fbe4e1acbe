//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / parameters_schema / execute），
//! 由 ToolRegistry 按名注册与查找；按名称有序存储，声明列表顺序稳定。

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};

use crate::llm::ToolDeclaration;
use crate::tools::ToolContext;

/// 工具 trait：名称、描述（供模型理解）、参数 schema、前置条件、异步执行
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（模型 functionCall 中的 name）
    fn name(&self) -> &str;

    /// 工具描述（供模型理解功能）
    fn description(&self) -> &str;

    /// 参数 schema；无参数工具返回 None（声明中省略 parameters）
    fn parameters_schema(&self) -> Option<Value> {
        None
    }

    /// 是否需要已打开的工作区
    fn requires_workspace(&self) -> bool {
        false
    }

    /// 成功后是否需要刷新工作区视图
    fn mutates_workspace(&self) -> bool {
        false
    }

    /// 执行工具：成功返回 JSON 载荷，失败返回错误描述
    async fn execute(&self, args: &Map<String, Value>, ctx: &ToolContext<'_>) -> Result<Value, String>;
}

/// 工具注册表：按名称存储 Arc<dyn Tool>
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        let name = tool.name().to_string();
        self.tools.insert(name, Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// 生成会话配置用的函数声明列表
    pub fn declarations(&self) -> Vec<ToolDeclaration> {
        self.tools
            .values()
            .map(|tool| ToolDeclaration {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters_schema(),
            })
            .collect()
    }
}

/// 全部参数均为字符串且必填的 OBJECT schema
pub fn string_params(names: &[&str]) -> Value {
    let properties: Map<String, Value> = names
        .iter()
        .map(|n| (n.to_string(), json!({ "type": "STRING" })))
        .collect();
    json!({
        "type": "OBJECT",
        "properties": properties,
        "required": names,
    })
}

/// 把参数表反序列化为具体参数结构
pub fn parse_args<T: DeserializeOwned>(args: &Map<String, Value>) -> Result<T, String> {
    serde_json::from_value(Value::Object(args.clone())).map_err(|e| format!("Invalid arguments: {e}"))
}
