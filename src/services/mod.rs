//! 外部协作服务：终端、URL 读取、代码格式化

pub mod formatter;
pub mod terminal;
pub mod url_reader;

pub use formatter::{CodeFormatter, WhitespaceFormatter};
pub use terminal::{CommandStatus, LocalTerminal, TerminalResponse, TerminalService};
pub use url_reader::{HttpUrlReader, UrlContent, UrlReader};
