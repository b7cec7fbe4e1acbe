//! Aide - 基于 Gemini 的编码智能体
//!
//! 模块划分：
//! - **agent**: AgentLoop 构建器（按配置组装客户端、存储、工具与协作者）
//! - **cli**: 行式 REPL 的命令解析与事件渲染
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 凭据池、限流、会话、恢复策略、主循环与编排器
//! - **editor**: 编辑器协作者（打开的文件、选区）
//! - **llm**: 对话数据模型与生成式服务客户端（Gemini / Mock）
//! - **observability**: tracing 初始化
//! - **services**: 终端、URL 读取、代码格式化
//! - **store**: 键值存储（SQLite / 内存）
//! - **tools**: 工具注册表、分发器与内置工具目录
//! - **workspace**: 项目工作区（沙箱文件系统）

pub mod agent;
pub mod cli;
pub mod config;
pub mod core;
pub mod editor;
pub mod llm;
pub mod observability;
pub mod services;
pub mod store;
pub mod tools;
pub mod workspace;
