//! URL 读取工具

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::tools::{parse_args, string_params, Tool, ToolContext};

#[derive(Deserialize)]
struct UrlArgs {
    url: String,
}

pub struct ReadUrlTool;

#[async_trait]
impl Tool for ReadUrlTool {
    fn name(&self) -> &str {
        "read_url"
    }

    fn description(&self) -> &str {
        "Reads and extracts the main content and all links from a given URL. The result will be a JSON object with \"content\" and \"links\" properties."
    }

    fn parameters_schema(&self) -> Option<Value> {
        Some(string_params(&["url"]))
    }

    async fn execute(&self, args: &Map<String, Value>, ctx: &ToolContext<'_>) -> Result<Value, String> {
        let args: UrlArgs = parse_args(args)?;
        let page = ctx.collab.urls.read(&args.url).await?;
        serde_json::to_value(page).map_err(|e| e.to_string())
    }
}
