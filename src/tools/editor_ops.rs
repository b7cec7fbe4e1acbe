//! 编辑器工具：活动文件内容、选中文本、替换选区

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::tools::{parse_args, string_params, Tool, ToolContext};

pub struct OpenFileContentTool;

#[async_trait]
impl Tool for OpenFileContentTool {
    fn name(&self) -> &str {
        "get_open_file_content"
    }

    fn description(&self) -> &str {
        "Gets the content of the currently open file in the editor."
    }

    async fn execute(&self, _args: &Map<String, Value>, ctx: &ToolContext<'_>) -> Result<Value, String> {
        let file = ctx
            .collab
            .editor
            .active_file()
            .ok_or("No file is currently open in the editor.")?;
        Ok(json!({ "filename": file.name, "content": file.content }))
    }
}

pub struct SelectedTextTool;

#[async_trait]
impl Tool for SelectedTextTool {
    fn name(&self) -> &str {
        "get_selected_text"
    }

    fn description(&self) -> &str {
        "Gets the text currently selected by the user in the editor."
    }

    async fn execute(&self, _args: &Map<String, Value>, ctx: &ToolContext<'_>) -> Result<Value, String> {
        let text = ctx
            .collab
            .editor
            .selected_text()
            .ok_or("No text is currently selected.")?;
        Ok(json!({ "selected_text": text }))
    }
}

#[derive(Deserialize)]
struct ReplaceArgs {
    new_text: String,
}

pub struct ReplaceSelectedTextTool;

#[async_trait]
impl Tool for ReplaceSelectedTextTool {
    fn name(&self) -> &str {
        "replace_selected_text"
    }

    fn description(&self) -> &str {
        "Replaces the currently selected text in the editor with new text."
    }

    fn parameters_schema(&self) -> Option<Value> {
        Some(string_params(&["new_text"]))
    }

    async fn execute(&self, args: &Map<String, Value>, ctx: &ToolContext<'_>) -> Result<Value, String> {
        let args: ReplaceArgs = parse_args(args)?;
        if !ctx.collab.editor.replace_selection(&args.new_text) {
            return Err("No text is selected to replace.".to_string());
        }
        Ok(json!({ "message": "Replaced the selected text." }))
    }
}
