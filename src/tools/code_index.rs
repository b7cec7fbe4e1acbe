//! 代码索引：构建与查询
//!
//! 遍历工作区中 js/html/css/md/json/py/java/ts 文件，用正则提取函数、箭头函数、类与 `// TODO:` 注释，
//! 以 JSON 存入键值存储（`fullCodeIndex`）。查询为名称/内容的大小写不敏感子串匹配。

use std::collections::BTreeMap;
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::store::{KeyValueStore, StoreError};
use crate::tools::{parse_args, string_params, Tool, ToolContext};

/// 代码索引在键值存储中的键名
pub const CODE_INDEX_KEY: &str = "fullCodeIndex";

const INDEXED_EXTENSIONS: [&str; 8] = ["js", "html", "css", "md", "json", "py", "java", "ts"];

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Definition {
    Function { name: String },
    Class { name: String },
    Todo { content: String },
}

impl Definition {
    fn kind(&self) -> &'static str {
        match self {
            Definition::Function { .. } => "function",
            Definition::Class { .. } => "class",
            Definition::Todo { .. } => "todo",
        }
    }

    fn text(&self) -> &str {
        match self {
            Definition::Function { name } | Definition::Class { name } => name.as_str(),
            Definition::Todo { content } => content.as_str(),
        }
    }
}

/// 查询命中
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct IndexHit {
    pub file: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeIndex {
    pub files: BTreeMap<String, Vec<Definition>>,
}

struct Patterns {
    function: Regex,
    arrow: Regex,
    class: Regex,
    todo: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        function: Regex::new(r"function\s+([a-zA-Z0-9_]+)\s*\(").expect("function regex is valid"),
        arrow: Regex::new(r"const\s+([a-zA-Z0-9_]+)\s*=\s*(\(.*\)|async\s*\(.*\))\s*=>")
            .expect("arrow regex is valid"),
        class: Regex::new(r"class\s+([a-zA-Z0-9_]+)").expect("class regex is valid"),
        todo: Regex::new(r"//\s*TODO:(.*)").expect("todo regex is valid"),
    })
}

impl CodeIndex {
    /// 是否属于索引范围（按扩展名）
    pub fn is_indexed(path: &str) -> bool {
        path.rsplit_once('.')
            .map(|(_, ext)| INDEXED_EXTENSIONS.contains(&ext))
            .unwrap_or(false)
    }

    /// 提取定义：函数、箭头函数、类、TODO 依次排列
    pub fn parse_file(content: &str) -> Vec<Definition> {
        let p = patterns();
        let names = |re: &Regex| -> Vec<String> {
            re.captures_iter(content).map(|c| c[1].to_string()).collect()
        };
        let mut defs: Vec<Definition> = names(&p.function)
            .into_iter()
            .chain(names(&p.arrow))
            .map(|name| Definition::Function { name })
            .collect();
        defs.extend(names(&p.class).into_iter().map(|name| Definition::Class { name }));
        defs.extend(
            names(&p.todo)
                .into_iter()
                .map(|c| Definition::Todo { content: c.trim().to_string() }),
        );
        defs
    }

    pub fn query(&self, query: &str) -> Vec<IndexHit> {
        let needle = query.to_lowercase();
        self.files
            .iter()
            .flat_map(|(file, defs)| {
                let needle = needle.clone();
                defs.iter()
                    .filter(move |d| d.text().to_lowercase().contains(&needle))
                    .map(move |d| IndexHit {
                        file: file.clone(),
                        kind: d.kind().to_string(),
                        name: d.text().to_string(),
                    })
            })
            .collect()
    }

    pub fn load(store: &dyn KeyValueStore) -> Result<Option<Self>, StoreError> {
        match store.get(CODE_INDEX_KEY)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn save(&self, store: &dyn KeyValueStore) -> Result<(), StoreError> {
        store.put(CODE_INDEX_KEY, &serde_json::to_string(self)?)
    }
}

pub struct BuildIndexTool;

#[async_trait]
impl Tool for BuildIndexTool {
    fn name(&self) -> &str {
        "build_or_update_codebase_index"
    }

    fn description(&self) -> &str {
        "Scans the entire codebase to build a searchable index. Slow, run once per session."
    }

    fn requires_workspace(&self) -> bool {
        true
    }

    async fn execute(&self, _args: &Map<String, Value>, ctx: &ToolContext<'_>) -> Result<Value, String> {
        let ws = ctx.workspace()?;
        let files = ws.list_files().await.map_err(|e| e.to_string())?;

        let mut index = CodeIndex::default();
        for path in files.into_iter().filter(|p| CodeIndex::is_indexed(p)) {
            match ws.read_file(&path).await {
                Ok(content) => {
                    index.files.insert(path, CodeIndex::parse_file(&content));
                }
                Err(e) => tracing::warn!(file = %path, error = %e, "could not index file"),
            }
        }
        tracing::info!(files = index.files.len(), "codebase index built");
        index
            .save(ctx.collab.store.as_ref())
            .map_err(|e| e.to_string())?;
        Ok(json!({ "message": "Codebase index built successfully." }))
    }
}

#[derive(Deserialize)]
struct QueryArgs {
    query: String,
}

pub struct QueryIndexTool;

#[async_trait]
impl Tool for QueryIndexTool {
    fn name(&self) -> &str {
        "query_codebase"
    }

    fn description(&self) -> &str {
        "Searches the pre-built codebase index."
    }

    fn parameters_schema(&self) -> Option<Value> {
        Some(string_params(&["query"]))
    }

    fn requires_workspace(&self) -> bool {
        true
    }

    async fn execute(&self, args: &Map<String, Value>, ctx: &ToolContext<'_>) -> Result<Value, String> {
        let args: QueryArgs = parse_args(args)?;
        let index = CodeIndex::load(ctx.collab.store.as_ref())
            .map_err(|e| e.to_string())?
            .ok_or("No codebase index. Please run 'build_or_update_codebase_index'.")?;
        Ok(json!({ "results": index.query(&args.query) }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::store::MemoryStore;
    use crate::tools::Collaborators;
    use crate::workspace::{LocalWorkspace, Workspace};

    #[test]
    fn test_parse_file_definitions() {
        let src = "function loadUser(id) {}\n\
                   const save = async (u) => {};\n\
                   const plain = 3;\n\
                   class UserStore {}\n\
                   // TODO: handle errors \n";
        let defs = CodeIndex::parse_file(src);
        assert_eq!(
            defs,
            vec![
                Definition::Function { name: "loadUser".into() },
                Definition::Function { name: "save".into() },
                Definition::Class { name: "UserStore".into() },
                Definition::Todo { content: "handle errors".into() },
            ]
        );
    }

    #[test]
    fn test_query_case_insensitive() {
        let mut index = CodeIndex::default();
        index.files.insert(
            "a.js".into(),
            vec![
                Definition::Function { name: "loadUser".into() },
                Definition::Todo { content: "USER cache".into() },
                Definition::Class { name: "Other".into() },
            ],
        );
        let hits = index.query("user");
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].kind, "function");
        assert_eq!(hits[1].name, "USER cache");
    }

    #[test]
    fn test_is_indexed() {
        assert!(CodeIndex::is_indexed("src/app.ts"));
        assert!(!CodeIndex::is_indexed("main.rs"));
        assert!(!CodeIndex::is_indexed("Makefile"));
    }

    #[tokio::test]
    async fn test_build_then_query_through_store() {
        let dir = tempfile::TempDir::new().unwrap();
        let ws: Arc<dyn Workspace> = Arc::new(LocalWorkspace::open(dir.path()).unwrap());
        ws.write_file("src/app.js", "function startServer() {}", true).await.unwrap();
        ws.write_file("node_modules/x/index.js", "function hidden() {}", true)
            .await
            .unwrap();
        ws.write_file("notes.txt", "function ignored() {}", true).await.unwrap();

        let store = Arc::new(MemoryStore::default());
        let collab = Collaborators::with_defaults(store.clone());
        let ctx = ToolContext {
            workspace: Some(&ws),
            collab: &collab,
        };

        let err = QueryIndexTool
            .execute(json!({"query": "start"}).as_object().unwrap(), &ctx)
            .await
            .unwrap_err();
        assert!(err.starts_with("No codebase index"));

        BuildIndexTool.execute(&Map::new(), &ctx).await.unwrap();
        let index = CodeIndex::load(store.as_ref()).unwrap().unwrap();
        assert_eq!(index.files.keys().collect::<Vec<_>>(), vec!["src/app.js"]);

        let out = QueryIndexTool
            .execute(json!({"query": "SERVER"}).as_object().unwrap(), &ctx)
            .await
            .unwrap();
        assert_eq!(
            out["results"],
            json!([{ "file": "src/app.js", "type": "function", "name": "startServer" }])
        );
    }
}
