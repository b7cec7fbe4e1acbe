//! 代码分析与格式化工具
//!
//! analyze_code：仅支持 .js，提取函数声明、类声明（起止行）与 import（来源与本地名）。
//! 以正则定位声明，再做跳过字符串与注释的括号匹配求结束行。
//! format_code：经 CodeFormatter 格式化后写回文件。

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::tools::{parse_args, string_params, Tool, ToolContext};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Declaration {
    pub name: String,
    pub start: usize,
    pub end: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Import {
    pub source: String,
    pub specifiers: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Analysis {
    pub functions: Vec<Declaration>,
    pub classes: Vec<Declaration>,
    pub imports: Vec<Import>,
}

struct Patterns {
    function: Regex,
    class: Regex,
    import: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        function: Regex::new(
            r"(?m)^[ \t]*(?:export[ \t]+)?(?:default[ \t]+)?(?:async[ \t]+)?function[ \t]*\*?[ \t]*([A-Za-z_$][\w$]*)[ \t]*\(",
        )
        .expect("function regex is valid"),
        class: Regex::new(r"(?m)^[ \t]*(?:export[ \t]+)?(?:default[ \t]+)?class[ \t]+([A-Za-z_$][\w$]*)")
            .expect("class regex is valid"),
        import: Regex::new(r#"(?m)^[ \t]*import\s+(?:([\w$*{}\s,]+?)\s+from\s+)?['"]([^'"]+)['"]"#)
            .expect("import regex is valid"),
    })
}

/// 分析 JavaScript 源码结构
pub fn analyze_js(src: &str) -> Result<Analysis, String> {
    let p = patterns();
    let mut analysis = Analysis::default();

    for caps in p.function.captures_iter(src) {
        let whole = caps.get(0).ok_or("regex match without span")?;
        analysis.functions.push(declaration(src, &caps[1], whole.start(), whole.end())?);
    }
    for caps in p.class.captures_iter(src) {
        let whole = caps.get(0).ok_or("regex match without span")?;
        analysis.classes.push(declaration(src, &caps[1], whole.start(), whole.end())?);
    }
    for caps in p.import.captures_iter(src) {
        let specifiers = caps
            .get(1)
            .map(|m| import_specifiers(m.as_str()))
            .unwrap_or_default();
        analysis.imports.push(Import {
            source: caps[2].to_string(),
            specifiers,
        });
    }
    Ok(analysis)
}

fn declaration(src: &str, name: &str, start: usize, search_from: usize) -> Result<Declaration, String> {
    let start_line = line_of(src, start);
    let open = src[search_from..]
        .find('{')
        .map(|i| i + search_from)
        .ok_or_else(|| format!("Unexpected end of input after '{name}' (line {start_line})"))?;
    let close = matching_brace(src, open)
        .ok_or_else(|| format!("Unbalanced braces in '{name}' (line {start_line})"))?;
    Ok(Declaration {
        name: name.to_string(),
        start: start_line,
        end: line_of(src, close),
    })
}

fn line_of(src: &str, offset: usize) -> usize {
    src[..offset].matches('\n').count() + 1
}

/// 从 open 处的 `{` 起找匹配的 `}`，跳过字符串、模板字符串与注释
fn matching_brace(src: &str, open: usize) -> Option<usize> {
    let b = src.as_bytes();
    let mut depth = 0usize;
    let mut i = open;
    while i < b.len() {
        match b[i] {
            b'/' if b.get(i + 1) == Some(&b'/') => {
                while i < b.len() && b[i] != b'\n' {
                    i += 1;
                }
                continue;
            }
            b'/' if b.get(i + 1) == Some(&b'*') => {
                i += 2;
                while i + 1 < b.len() && !(b[i] == b'*' && b[i + 1] == b'/') {
                    i += 1;
                }
                i += 2;
                continue;
            }
            q @ (b'"' | b'\'' | b'`') => {
                i += 1;
                while i < b.len() && b[i] != q {
                    if b[i] == b'\\' {
                        i += 1;
                    }
                    i += 1;
                }
            }
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// import 子句中的本地绑定名：`a`、`{ b, c as d }`、`* as ns`
fn import_specifiers(clause: &str) -> Vec<String> {
    clause
        .split(|c| matches!(c, ',' | '{' | '}'))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.split_whitespace().last())
        .map(String::from)
        .collect()
}

#[derive(Deserialize)]
struct FileArgs {
    filename: String,
}

pub struct AnalyzeCodeTool;

#[async_trait]
impl Tool for AnalyzeCodeTool {
    fn name(&self) -> &str {
        "analyze_code"
    }

    fn description(&self) -> &str {
        "Analyzes the structure of a JavaScript file (.js): functions, classes and imports. CRITICAL: Use this tool only for JavaScript code structure. For reading other file types like HTML, CSS, or plain text, use the 'read_file' tool instead."
    }

    fn parameters_schema(&self) -> Option<Value> {
        Some(string_params(&["filename"]))
    }

    fn requires_workspace(&self) -> bool {
        true
    }

    async fn execute(&self, args: &Map<String, Value>, ctx: &ToolContext<'_>) -> Result<Value, String> {
        let args: FileArgs = parse_args(args)?;
        if !args.filename.ends_with(".js") {
            return Err("This tool can only analyze .js files. Use read_file for others.".to_string());
        }
        let content = ctx
            .workspace()?
            .read_file(&args.filename)
            .await
            .map_err(|e| e.to_string())?;
        let analysis = analyze_js(&content)?;
        Ok(json!({ "analysis": analysis }))
    }
}

pub struct FormatCodeTool;

#[async_trait]
impl Tool for FormatCodeTool {
    fn name(&self) -> &str {
        "format_code"
    }

    fn description(&self) -> &str {
        "Formats a specific file in place."
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
        let ws = ctx.workspace()?;
        let original = ws.read_file(&args.filename).await.map_err(|e| e.to_string())?;
        let formatted = ctx.collab.formatter.format(&args.filename, &original)?;
        if formatted == original {
            return Ok(json!({ "message": format!("File '{}' is already formatted.", args.filename) }));
        }
        ws.write_file(&args.filename, &formatted, false)
            .await
            .map_err(|e| e.to_string())?;
        ctx.collab.editor.update_content(&args.filename, &formatted);
        Ok(json!({ "message": format!("File '{}' formatted successfully.", args.filename) }))
    }
}
