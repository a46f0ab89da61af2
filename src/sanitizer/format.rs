//! 纯文本转义与聊天消息格式化
//!
//! `format_message` 必须先整体转义，再按固定顺序做字面替换；
//! 替换规则是封闭集合，只会引入 `p`、`br`、`strong`、`em` 四种标签。

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::error;

use crate::error::ShieldResult;

/// 内置规则：双换行 -> 段落，单换行 -> 换行，**粗体**，*斜体*
/// 行内标记不跨越行终止符（\r、\n、U+2028、U+2029）
const BUILTIN_RULES: &[(&str, &str)] = &[
    (r"\n\n", "</p><p>"),
    (r"\n", "<br>"),
    (r"\*\*([^\r\n\x{2028}\x{2029}]*?)\*\*", "<strong>$1</strong>"),
    (r"\*([^\r\n\x{2028}\x{2029}]*?)\*", "<em>$1</em>"),
];

/// 一条格式化规则（模式, 替换）
#[derive(Debug)]
pub struct FormatRule {
    pub pattern: Regex,
    pub replacement: &'static str,
}

impl FormatRule {
    pub fn new(pattern: &str, replacement: &'static str) -> ShieldResult<Self> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
            replacement,
        })
    }
}

/// 按顺序编译规则表
pub fn compile_rules(rules: &[(&str, &'static str)]) -> ShieldResult<Vec<FormatRule>> {
    rules
        .iter()
        .map(|&(pattern, replacement)| FormatRule::new(pattern, replacement))
        .collect()
}

static FORMAT_RULES: Lazy<ShieldResult<Vec<FormatRule>>> = Lazy::new(|| compile_rules(BUILTIN_RULES));

/// 按顺序返回格式化规则
///
/// 规则表编译失败时返回空表：消息仍会整体转义，只是不再有轻量标记
pub fn format_rules() -> &'static [FormatRule] {
    match &*FORMAT_RULES {
        Ok(rules) => rules.as_slice(),
        Err(e) => {
            error!("格式化规则编译失败：{}", e);
            &[]
        }
    }
}

/// 转义所有有HTML含义的字符（不解析、无白名单）
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// 将聊天文本格式化为安全HTML
pub fn format_message(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let mut safe = escape_html(text);
    for rule in format_rules() {
        safe = rule
            .pattern
            .replace_all(&safe, rule.replacement)
            .into_owned();
    }

    format!("<p>{}</p>", safe)
}
