//! 工作区文件工具
//!
//! 文件与目录的增删改名、读写、目录树、全文搜索。路径均相对于工作区根目录，
//! 读取或写入的文件会在编辑器中打开并设为活动文件。

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::tools::{parse_args, string_params, Tool, ToolContext};

#[derive(Deserialize)]
struct FileArgs {
    filename: String,
}

#[derive(Deserialize)]
struct FileContentArgs {
    filename: String,
    content: String,
}

#[derive(Deserialize)]
struct FolderArgs {
    folder_path: String,
}

#[derive(Deserialize)]
struct RenameFolderArgs {
    old_folder_path: String,
    new_folder_path: String,
}

#[derive(Deserialize)]
struct RenameFileArgs {
    old_path: String,
    new_path: String,
}

#[derive(Deserialize)]
struct SearchArgs {
    search_term: String,
}

pub struct CreateFileTool;

#[async_trait]
impl Tool for CreateFileTool {
    fn name(&self) -> &str {
        "create_file"
    }

    fn description(&self) -> &str {
        "Creates a new file. IMPORTANT: File paths must be relative to the project root. Do NOT include the root folder's name in the path. Always use get_project_structure first to check for existing files."
    }

    fn parameters_schema(&self) -> Option<Value> {
        Some(string_params(&["filename", "content"]))
    }

    fn requires_workspace(&self) -> bool {
        true
    }

    fn mutates_workspace(&self) -> bool {
        true
    }

    async fn execute(&self, args: &Map<String, Value>, ctx: &ToolContext<'_>) -> Result<Value, String> {
        let args: FileContentArgs = parse_args(args)?;
        let ws = ctx.workspace()?;
        ws.write_file(&args.filename, &args.content, true)
            .await
            .map_err(|e| e.to_string())?;
        ctx.collab.editor.open_file(&args.filename, &args.content);
        Ok(json!({ "message": format!("File '{}' created successfully.", args.filename) }))
    }
}

pub struct DeleteFileTool;

#[async_trait]
impl Tool for DeleteFileTool {
    fn name(&self) -> &str {
        "delete_file"
    }

    fn description(&self) -> &str {
        "Deletes a file. IMPORTANT: File paths must be relative to the project root. Do NOT include the root folder's name in the path. CRITICAL: Use get_project_structure first to ensure the file exists."
    }

    fn parameters_schema(&self) -> Option<Value> {
        Some(string_params(&["filename"]))
    }

    fn requires_workspace(&self) -> bool {
        true
    }

    fn mutates_workspace(&self) -> bool {
        true
    }

    async fn execute(&self, args: &Map<String, Value>, ctx: &ToolContext<'_>) -> Result<Value, String> {
        let args: FileArgs = parse_args(args)?;
        ctx.workspace()?
            .remove_file(&args.filename)
            .await
            .map_err(|e| e.to_string())?;
        if ctx.collab.editor.is_open(&args.filename) {
            ctx.collab.editor.close_file(&args.filename);
        }
        Ok(json!({ "message": format!("File '{}' deleted successfully.", args.filename) }))
    }
}

pub struct CreateFolderTool;

#[async_trait]
impl Tool for CreateFolderTool {
    fn name(&self) -> &str {
        "create_folder"
    }

    fn description(&self) -> &str {
        "Creates a new folder. IMPORTANT: Folder paths must be relative to the project root. Do NOT include the root folder's name in the path. Can create nested folders."
    }

    fn parameters_schema(&self) -> Option<Value> {
        Some(string_params(&["folder_path"]))
    }

    fn requires_workspace(&self) -> bool {
        true
    }

    fn mutates_workspace(&self) -> bool {
        true
    }

    async fn execute(&self, args: &Map<String, Value>, ctx: &ToolContext<'_>) -> Result<Value, String> {
        let args: FolderArgs = parse_args(args)?;
        ctx.workspace()?
            .create_dir(&args.folder_path)
            .await
            .map_err(|e| e.to_string())?;
        Ok(json!({ "message": format!("Folder '{}' created successfully.", args.folder_path) }))
    }
}

pub struct DeleteFolderTool;

#[async_trait]
impl Tool for DeleteFolderTool {
    fn name(&self) -> &str {
        "delete_folder"
    }

    fn description(&self) -> &str {
        "Deletes a folder and all of its contents recursively."
    }

    fn parameters_schema(&self) -> Option<Value> {
        Some(string_params(&["folder_path"]))
    }

    fn requires_workspace(&self) -> bool {
        true
    }

    fn mutates_workspace(&self) -> bool {
        true
    }

    async fn execute(&self, args: &Map<String, Value>, ctx: &ToolContext<'_>) -> Result<Value, String> {
        let args: FolderArgs = parse_args(args)?;
        ctx.workspace()?
            .remove_dir(&args.folder_path)
            .await
            .map_err(|e| e.to_string())?;
        Ok(json!({ "message": format!("Folder '{}' deleted successfully.", args.folder_path) }))
    }
}

pub struct RenameFolderTool;

#[async_trait]
impl Tool for RenameFolderTool {
    fn name(&self) -> &str {
        "rename_folder"
    }

    fn description(&self) -> &str {
        "Renames a folder. Use this tool for renaming directories."
    }

    fn parameters_schema(&self) -> Option<Value> {
        Some(string_params(&["old_folder_path", "new_folder_path"]))
    }

    fn requires_workspace(&self) -> bool {
        true
    }

    fn mutates_workspace(&self) -> bool {
        true
    }

    async fn execute(&self, args: &Map<String, Value>, ctx: &ToolContext<'_>) -> Result<Value, String> {
        let args: RenameFolderArgs = parse_args(args)?;
        ctx.workspace()?
            .rename(&args.old_folder_path, &args.new_folder_path)
            .await
            .map_err(|e| format!("Failed to rename directory: {e}"))?;
        Ok(json!({
            "message": format!(
                "Folder '{}' renamed to '{}' successfully.",
                args.old_folder_path, args.new_folder_path
            )
        }))
    }
}

pub struct RenameFileTool;

#[async_trait]
impl Tool for RenameFileTool {
    fn name(&self) -> &str {
        "rename_file"
    }

    fn description(&self) -> &str {
        "Renames a file. Use this tool for renaming files, not directories."
    }

    fn parameters_schema(&self) -> Option<Value> {
        Some(string_params(&["old_path", "new_path"]))
    }

    fn requires_workspace(&self) -> bool {
        true
    }

    fn mutates_workspace(&self) -> bool {
        true
    }

    async fn execute(&self, args: &Map<String, Value>, ctx: &ToolContext<'_>) -> Result<Value, String> {
        let args: RenameFileArgs = parse_args(args)?;
        let ws = ctx.workspace()?;
        ws.rename(&args.old_path, &args.new_path)
            .await
            .map_err(|e| format!("Failed to rename file: {e}"))?;

        // 已打开的旧文件换成新路径
        let editor = &ctx.collab.editor;
        if editor.is_open(&args.old_path) {
            editor.close_file(&args.old_path);
            let content = ws.read_file(&args.new_path).await.map_err(|e| e.to_string())?;
            editor.open_file(&args.new_path, &content);
        }
        Ok(json!({
            "message": format!(
                "File '{}' renamed to '{}' successfully.",
                args.old_path, args.new_path
            )
        }))
    }
}

pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Reads the content of an existing file. IMPORTANT: File paths must be relative to the project root. Do NOT include the root folder's name in the path. Always use get_project_structure first to get the correct file path."
    }

    fn parameters_schema(&self) -> Option<Value> {
        Some(string_params(&["filename"]))
    }

    fn requires_workspace(&self) -> bool {
        true
    }

    async fn execute(&self, args: &Map<String, Value>, ctx: &ToolContext<'_>) -> Result<Value, String> {
        let args: FileArgs = parse_args(args)?;
        let content = ctx
            .workspace()?
            .read_file(&args.filename)
            .await
            .map_err(|e| e.to_string())?;
        ctx.collab.editor.open_file(&args.filename, &content);
        Ok(json!({ "content": content }))
    }
}

pub struct RewriteFileTool;

#[async_trait]
impl Tool for RewriteFileTool {
    fn name(&self) -> &str {
        "rewrite_file"
    }

    fn description(&self) -> &str {
        "Rewrites a file with new content. Overwrites the entire existing file content. IMPORTANT: Use this for all file modifications."
    }

    fn parameters_schema(&self) -> Option<Value> {
        Some(string_params(&["filename", "content"]))
    }

    fn requires_workspace(&self) -> bool {
        true
    }

    fn mutates_workspace(&self) -> bool {
        true
    }

    async fn execute(&self, args: &Map<String, Value>, ctx: &ToolContext<'_>) -> Result<Value, String> {
        let args: FileContentArgs = parse_args(args)?;
        ctx.workspace()?
            .write_file(&args.filename, &args.content, false)
            .await
            .map_err(|e| e.to_string())?;
        ctx.collab.editor.update_content(&args.filename, &args.content);
        ctx.collab.editor.open_file(&args.filename, &args.content);
        Ok(json!({ "message": format!("File '{}' rewritten successfully.", args.filename) }))
    }
}

pub struct ProjectStructureTool;

#[async_trait]
impl Tool for ProjectStructureTool {
    fn name(&self) -> &str {
        "get_project_structure"
    }

    fn description(&self) -> &str {
        "Gets the entire file and folder structure of the project. CRITICAL: Always use this tool before attempting to read or create a file to ensure you have the correct file path."
    }

    fn requires_workspace(&self) -> bool {
        true
    }

    async fn execute(&self, _args: &Map<String, Value>, ctx: &ToolContext<'_>) -> Result<Value, String> {
        let tree = ctx
            .workspace()?
            .structure()
            .await
            .map_err(|e| e.to_string())?;
        Ok(json!({ "structure": tree.render() }))
    }
}

pub struct SearchCodeTool;

#[async_trait]
impl Tool for SearchCodeTool {
    fn name(&self) -> &str {
        "search_code"
    }

    fn description(&self) -> &str {
        "Searches for a specific string in all files in the project (like grep)."
    }

    fn parameters_schema(&self) -> Option<Value> {
        Some(string_params(&["search_term"]))
    }

    fn requires_workspace(&self) -> bool {
        true
    }

    async fn execute(&self, args: &Map<String, Value>, ctx: &ToolContext<'_>) -> Result<Value, String> {
        let args: SearchArgs = parse_args(args)?;
        let hits = ctx
            .workspace()?
            .search(&args.search_term)
            .await
            .map_err(|e| e.to_string())?;
        Ok(json!({ "results": hits }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::editor::{Editor, HeadlessEditor};
    use crate::store::MemoryStore;
    use crate::tools::Collaborators;
    use crate::workspace::{LocalWorkspace, Workspace};

    struct Fixture {
        _dir: tempfile::TempDir,
        ws: Arc<dyn Workspace>,
        editor: Arc<HeadlessEditor>,
        collab: Collaborators,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::TempDir::new().unwrap();
            let ws: Arc<dyn Workspace> = Arc::new(LocalWorkspace::open(dir.path()).unwrap());
            let editor = Arc::new(HeadlessEditor::new());
            let collab = Collaborators::with_defaults(Arc::new(MemoryStore::default()))
                .with_editor(editor.clone());
            Self {
                _dir: dir,
                ws,
                editor,
                collab,
            }
        }

        async fn run(&self, tool: &dyn Tool, args: Value) -> Result<Value, String> {
            let ctx = ToolContext {
                workspace: Some(&self.ws),
                collab: &self.collab,
            };
            let Value::Object(map) = args else {
                panic!("args must be an object");
            };
            tool.execute(&map, &ctx).await
        }
    }

    #[tokio::test]
    async fn test_create_read_rewrite() {
        let f = Fixture::new();
        let out = f
            .run(&CreateFileTool, json!({"filename": "src/app.js", "content": "let a;"}))
            .await
            .unwrap();
        assert_eq!(out["message"], "File 'src/app.js' created successfully.");
        assert_eq!(f.editor.active_file().unwrap().path, "src/app.js");

        f.run(&RewriteFileTool, json!({"filename": "src/app.js", "content": "let b;"}))
            .await
            .unwrap();
        let out = f.run(&ReadFileTool, json!({"filename": "src/app.js"})).await.unwrap();
        assert_eq!(out["content"], "let b;");
        assert_eq!(f.editor.active_file().unwrap().content, "let b;");
    }

    #[tokio::test]
    async fn test_rewrite_missing_file_fails() {
        let f = Fixture::new();
        let err = f
            .run(&RewriteFileTool, json!({"filename": "nope.js", "content": ""}))
            .await
            .unwrap_err();
        assert!(err.contains("not found"));
    }

    #[tokio::test]
    async fn test_rename_file_reopens_in_editor() {
        let f = Fixture::new();
        f.run(&CreateFileTool, json!({"filename": "a.txt", "content": "A"}))
            .await
            .unwrap();
        f.run(&RenameFileTool, json!({"old_path": "a.txt", "new_path": "b.txt"}))
            .await
            .unwrap();
        assert!(!f.editor.is_open("a.txt"));
        assert_eq!(f.editor.active_file().unwrap().path, "b.txt");
    }

    #[tokio::test]
    async fn test_folders_and_structure() {
        let f = Fixture::new();
        f.run(&CreateFolderTool, json!({"folder_path": "lib/util"})).await.unwrap();
        f.run(&CreateFileTool, json!({"filename": "lib/util/x.js", "content": "x"}))
            .await
            .unwrap();
        f.run(
            &RenameFolderTool,
            json!({"old_folder_path": "lib", "new_folder_path": "pkg"}),
        )
        .await
        .unwrap();
        let out = f.run(&ProjectStructureTool, json!({})).await.unwrap();
        let structure = out["structure"].as_str().unwrap();
        assert!(structure.contains("└── pkg\n    └── util\n        └── x.js"));

        f.run(&DeleteFolderTool, json!({"folder_path": "pkg"})).await.unwrap();
        let out = f.run(&ProjectStructureTool, json!({})).await.unwrap();
        assert_eq!(out["structure"], format!("{}\n", f.ws.name()));
    }

    #[tokio::test]
    async fn test_delete_file_closes_tab_and_search() {
        let f = Fixture::new();
        f.run(&CreateFileTool, json!({"filename": "a.js", "content": "// TODO fix\nok"}))
            .await
            .unwrap();
        let out = f.run(&SearchCodeTool, json!({"search_term": "todo"})).await.unwrap();
        assert_eq!(out["results"][0]["file"], "a.js");
        assert_eq!(out["results"][0]["matches"][0]["line_number"], 1);

        f.run(&DeleteFileTool, json!({"filename": "a.js"})).await.unwrap();
        assert!(!f.editor.is_open("a.js"));
        let out = f.run(&SearchCodeTool, json!({"search_term": "todo"})).await.unwrap();
        assert_eq!(out["results"], json!([]));
    }

    #[tokio::test]
    async fn test_missing_argument() {
        let f = Fixture::new();
        let err = f.run(&ReadFileTool, json!({})).await.unwrap_err();
        assert!(err.starts_with("Invalid arguments"));
    }
}
