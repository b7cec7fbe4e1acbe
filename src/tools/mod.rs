//! 工具箱：注册表、分发器与内置工具目录

pub mod analysis;
pub mod code_index;
pub mod context;
pub mod dispatcher;
pub mod editor_ops;
pub mod filesystem;
pub mod registry;
pub mod shell;
pub mod url;

pub use analysis::{analyze_js, AnalyzeCodeTool, FormatCodeTool};
pub use code_index::{BuildIndexTool, CodeIndex, QueryIndexTool, CODE_INDEX_KEY};
pub use context::{Collaborators, LogView, ToolContext, WorkspaceView, NO_WORKSPACE};
pub use dispatcher::ToolDispatcher;
pub use editor_ops::{OpenFileContentTool, ReplaceSelectedTextTool, SelectedTextTool};
pub use filesystem::{
    CreateFileTool, CreateFolderTool, DeleteFileTool, DeleteFolderTool, ProjectStructureTool,
    ReadFileTool, RenameFileTool, RenameFolderTool, RewriteFileTool, SearchCodeTool,
};
pub use registry::{parse_args, string_params, Tool, ToolRegistry};
pub use shell::{FileHistoryTool, RunCommandTool};
pub use url::ReadUrlTool;

/// 注册完整工具目录
pub fn default_registry() -> ToolRegistry {
    let mut tools = ToolRegistry::new();
    tools.register(CreateFileTool);
    tools.register(DeleteFileTool);
    tools.register(CreateFolderTool);
    tools.register(DeleteFolderTool);
    tools.register(RenameFolderTool);
    tools.register(RenameFileTool);
    tools.register(ReadFileTool);
    tools.register(RewriteFileTool);
    tools.register(ProjectStructureTool);
    tools.register(SearchCodeTool);
    tools.register(BuildIndexTool);
    tools.register(QueryIndexTool);
    tools.register(FormatCodeTool);
    tools.register(AnalyzeCodeTool);
    tools.register(ReadUrlTool);
    tools.register(OpenFileContentTool);
    tools.register(SelectedTextTool);
    tools.register(ReplaceSelectedTextTool);
    tools.register(RunCommandTool);
    tools.register(FileHistoryTool);
    tools
}
