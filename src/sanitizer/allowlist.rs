//! 白名单模型
//! 标签 -> 允许属性 的映射，以及 href 允许的协议集合

use std::collections::HashMap;
use once_cell::sync::Lazy;
use url::Url;

/// 默认标签白名单（标签名, 允许属性）
const DEFAULT_TAGS: &[(&str, &[&str])] = &[
    ("b", &[]),
    ("i", &[]),
    ("em", &[]),
    ("strong", &[]),
    ("a", &["href"]),
    ("p", &[]),
    ("br", &[]),
    ("ul", &[]),
    ("ol", &[]),
    ("li", &[]),
    ("blockquote", &[]),
    ("code", &[]),
    ("pre", &[]),
];

/// 默认允许的链接协议（不含冒号）
const DEFAULT_PROTOCOLS: &[&str] = &["http", "https", "mailto"];

/// 全局默认标签白名单
pub static DEFAULT_ALLOWLIST: Lazy<Allowlist> = Lazy::new(Allowlist::default);

/// 全局默认协议白名单
pub static DEFAULT_PROTOCOLS_ALLOWLIST: Lazy<ProtocolAllowlist> = Lazy::new(ProtocolAllowlist::default);

/// 标签白名单
/// 不在映射中的标签一律丢弃（保留子节点）；标签上不在允许集合中的属性一律丢弃
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allowlist {
    tags: HashMap<String, Vec<String>>,
}

impl Default for Allowlist {
    fn default() -> Self {
        DEFAULT_TAGS
            .iter()
            .fold(Self::empty(), |list, (tag, attrs)| list.with_tag(tag, attrs))
    }
}

impl Allowlist {
    /// 空白名单（所有标签都会被拆除）
    pub fn empty() -> Self {
        Self { tags: HashMap::new() }
    }

    /// 增加一个允许的标签及其允许属性（重复添加时覆盖）
    pub fn with_tag(mut self, tag: &str, attrs: &[&str]) -> Self {
        let mut allowed: Vec<String> = Vec::with_capacity(attrs.len());
        for attr in attrs {
            let attr = attr.to_ascii_lowercase();
            if !allowed.contains(&attr) {
                allowed.push(attr);
            }
        }
        self.tags.insert(tag.to_ascii_lowercase(), allowed);
        self
    }

    /// 标签是否允许
    pub fn allows_tag(&self, tag: &str) -> bool {
        self.tags.contains_key(tag)
    }

    /// 标签允许的属性（按声明顺序）
    pub fn allowed_attributes(&self, tag: &str) -> Option<&[String]> {
        self.tags.get(tag).map(Vec::as_slice)
    }

    /// 所有允许的标签
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.tags.keys().map(String::as_str)
    }

    /// 标签与允许属性
    pub fn entries(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.tags
            .iter()
            .map(|(tag, attrs)| (tag.as_str(), attrs.as_slice()))
    }
}

/// 链接协议白名单（仅作用于 href）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolAllowlist {
    schemes: Vec<String>,
}

impl Default for ProtocolAllowlist {
    fn default() -> Self {
        Self::new(DEFAULT_PROTOCOLS)
    }
}

impl ProtocolAllowlist {
    pub fn new(schemes: &[&str]) -> Self {
        Self {
            schemes: schemes
                .iter()
                .map(|s| s.trim_end_matches(':').to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn schemes(&self) -> impl Iterator<Item = &str> {
        self.schemes.iter().map(String::as_str)
    }

    /// 协议是否允许
    pub fn allows_scheme(&self, scheme: &str) -> bool {
        self.schemes.iter().any(|s| s.eq_ignore_ascii_case(scheme))
    }

    /// 以文档源为基准解析 href，解析成功且协议在白名单内才接受
    pub fn accepts_href(&self, base: &Url, href: &str) -> bool {
        match base.join(href) {
            Ok(resolved) => self.allows_scheme(resolved.scheme()),
            Err(_) => false,
        }
    }
}
