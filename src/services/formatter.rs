//! 代码格式化
//!
//! 默认实现只做与语言无关的整理：去除行尾空白、折叠文件末尾空行、保证单个结尾换行。

/// 代码格式化器；filename 用于按扩展名选择规则
pub trait CodeFormatter: Send + Sync {
    fn format(&self, filename: &str, source: &str) -> Result<String, String>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct WhitespaceFormatter;

impl CodeFormatter for WhitespaceFormatter {
    fn format(&self, _filename: &str, source: &str) -> Result<String, String> {
        let mut out: String = source
            .lines()
            .map(str::trim_end)
            .collect::<Vec<_>>()
            .join("\n");
        let trimmed = out.trim_end_matches('\n').len();
        out.truncate(trimmed);
        if !out.is_empty() {
            out.push('\n');
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whitespace_formatter() {
        let f = WhitespaceFormatter;
        let src = "function a() {  \r\n\treturn 1;\t\n}\n\n\n";
        assert_eq!(f.format("a.js", src).unwrap(), "function a() {\n\treturn 1;\n}\n");
        assert_eq!(f.format("empty.js", "\n\n").unwrap(), "");
    }
}
