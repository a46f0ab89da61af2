//! 清洗模块：白名单HTML清洗、纯文本转义、聊天消息格式化
pub mod allowlist;
pub mod tree;
pub mod parser;
pub mod sanitize;
pub mod format;

// 导出核心接口
pub use self::allowlist::{Allowlist, ProtocolAllowlist, DEFAULT_ALLOWLIST, DEFAULT_PROTOCOLS_ALLOWLIST};
pub use self::tree::{Element, Fragment, Node};
pub use self::parser::FragmentParser;
pub use self::sanitize::{sanitize_html, Sanitizer};
pub use self::format::{compile_rules, escape_html, format_message, format_rules, FormatRule};
