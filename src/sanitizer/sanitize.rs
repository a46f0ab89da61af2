//! 白名单清洗器
//! 基于 ammonia：html5ever 标准解析 -> 按白名单过滤 -> 标准序列化

use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use ammonia::{Builder, UrlRelative, UrlRelativeEvaluate};
use once_cell::sync::Lazy;
use tracing::debug;
use url::Url;

use super::allowlist::{Allowlist, ProtocolAllowlist};
use super::parser::FragmentParser;
use super::tree::Fragment;
use crate::config::{ConfigManager, GlobalConfig};

/// 使用默认配置的全局清洗器
static DEFAULT_SANITIZER: Lazy<Sanitizer> =
    Lazy::new(|| Sanitizer::with_config(&ConfigManager::get_default()));

/// 相对链接：按文档源解析后协议仍在白名单内才保留（原样保留，不改写）
struct RelativeHref<'a> {
    protocols: &'a ProtocolAllowlist,
    origin: &'a Url,
}

impl<'a> UrlRelativeEvaluate<'a> for RelativeHref<'a> {
    fn evaluate<'url>(&self, url: &'url str) -> Option<Cow<'url, str>> {
        if self.protocols.accepts_href(self.origin, url) {
            Some(Cow::Borrowed(url))
        } else {
            debug!("丢弃不安全的href：{}", url);
            None
        }
    }
}

/// 清洗器：无状态，单次调用互不影响
#[derive(Debug, Clone)]
pub struct Sanitizer {
    allowlist: Allowlist,
    protocols: ProtocolAllowlist,
    origin: Url,
}

impl Sanitizer {
    /// 以文档源创建（默认白名单）
    pub fn new(origin: Url) -> Self {
        Self {
            allowlist: Allowlist::default(),
            protocols: ProtocolAllowlist::default(),
            origin,
        }
    }

    pub fn with_config(config: &GlobalConfig) -> Self {
        Self::new(config.document_origin.clone())
    }

    pub fn with_allowlist(mut self, allowlist: Allowlist) -> Self {
        self.allowlist = allowlist;
        self
    }

    pub fn with_protocols(mut self, protocols: ProtocolAllowlist) -> Self {
        self.protocols = protocols;
        self
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    pub fn allowlist(&self) -> &Allowlist {
        &self.allowlist
    }

    /// 按当前白名单配置 ammonia
    ///
    /// 不在白名单内的标签一律拆掉包装、保留子节点（包括 script/style 的文本），
    /// 不附加 rel，不允许任何通用属性，注释一律丢弃
    fn builder(&self) -> Builder<'_> {
        let tags: HashSet<&str> = self.allowlist.tags().collect();
        let tag_attributes: HashMap<&str, HashSet<&str>> = self
            .allowlist
            .entries()
            .map(|(tag, attrs)| (tag, attrs.iter().map(String::as_str).collect()))
            .collect();

        let mut builder = Builder::empty();
        builder
            .tags(tags)
            .tag_attributes(tag_attributes)
            .generic_attributes(HashSet::new())
            .clean_content_tags(HashSet::new())
            .url_schemes(self.protocols.schemes().collect())
            .url_relative(UrlRelative::Custom(Box::new(RelativeHref {
                protocols: &self.protocols,
                origin: &self.origin,
            })))
            .link_rel(None)
            .strip_comments(true);
        builder
    }

    /// 清洗HTML，返回只含白名单子集的标记
    ///
    /// 永不失败：畸形标记按浏览器方式修复，非法 href 直接省略。
    /// 幂等：`sanitize(sanitize(x)) == sanitize(x)`
    pub fn sanitize(&self, input: &str) -> String {
        if input.is_empty() {
            return String::new();
        }
        self.builder().clean(input).to_string()
    }

    /// 清洗并返回片段树
    pub fn sanitize_fragment(&self, input: &str) -> Fragment {
        FragmentParser::parse(&self.sanitize(input))
    }
}

/// 使用默认配置清洗
pub fn sanitize_html(input: &str) -> String {
    DEFAULT_SANITIZER.sanitize(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sanitizer() -> Sanitizer {
        Sanitizer::new(Url::parse("https://app.example").unwrap())
    }

    #[test]
    fn test_allowed_markup_passes_through() {
        let html = "<p>Hello <strong>you</strong> and <em>me</em><br>line</p>\
                    <ul><li>one</li></ul><blockquote><code>x</code></blockquote><pre>y</pre>";
        assert_eq!(sanitizer().sanitize(html), html);
    }

    #[test]
    fn test_script_is_unwrapped_to_inert_text() {
        let out = sanitizer().sanitize("<script>x</script>y");
        assert_eq!(out, "xy");
        assert!(!out.contains("<script"));

        let out = sanitizer().sanitize("<script>alert('<b>')</script>");
        assert_eq!(out, "alert('&lt;b&gt;')");
    }

    #[test]
    fn test_disallowed_tags_unwrap_at_every_level() {
        let out = sanitizer().sanitize(r#"<div onclick="x()"><span><b>bold</b> text</span></div>"#);
        assert_eq!(out, "<b>bold</b> text");

        let out = sanitizer().sanitize("<section><article><div><i>deep</i></div></article></section>");
        assert_eq!(out, "<i>deep</i>");
    }

    #[test]
    fn test_disallowed_attributes_are_dropped() {
        let out = sanitizer().sanitize(r#"<p style="color:red" onclick="x()">hi</p><b class="c">b</b>"#);
        assert_eq!(out, "<p>hi</p><b>b</b>");
    }

    #[test]
    fn test_href_schemes() {
        let s = sanitizer();
        assert_eq!(
            s.sanitize(r#"<a href="https://ok.example/x" title="t">ok</a>"#),
            r#"<a href="https://ok.example/x">ok</a>"#
        );
        assert_eq!(
            s.sanitize(r#"<a href="mailto:help@ok.example">mail</a>"#),
            r#"<a href="mailto:help@ok.example">mail</a>"#
        );
        assert_eq!(s.sanitize(r#"<a href="/help">rel</a>"#), r#"<a href="/help">rel</a>"#);
        assert_eq!(s.sanitize(r#"<a href="javascript:alert(1)">x</a>"#), "<a>x</a>");
        assert_eq!(s.sanitize(r#"<a href="&#106;avascript:alert(1)">x</a>"#), "<a>x</a>");
        assert_eq!(s.sanitize(r#"<a href="data:text/html;base64,PHNjcmlwdD4=">x</a>"#), "<a>x</a>");
        assert_eq!(s.sanitize(r#"<a href="http://[::1">x</a>"#), "<a>x</a>");
    }

    #[test]
    fn test_void_elements_lose_attributes() {
        assert_eq!(sanitizer().sanitize(r#"a<br class="x" id="y">b"#), "a<br>b");
        assert_eq!(sanitizer().sanitize(r#"<img src=x onerror="alert(1)">"#), "");
    }

    #[test]
    fn test_text_is_escaped_on_output() {
        assert_eq!(sanitizer().sanitize("1 &lt; 2 &amp;&amp; 3 > 2"), "1 &lt; 2 &amp;&amp; 3 &gt; 2");
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(sanitizer().sanitize(""), "");
        assert_eq!(sanitizer().sanitize("<!-- only a comment -->"), "");
    }

    #[test]
    fn test_idempotent_on_malformed_input() {
        let s = sanitizer();
        let inputs = [
            "<p>a<p>b<div>c</p>",
            "<b><p>x</b>y</p>",
            "<ul><li>a<li>b<ol><li>c</ul>",
            "<a href='/x'>1<a href='javascript:1'>2",
            "<<b>>&&<i",
            "<style>p{}</style><textarea><b>t</b></textarea>",
        ];
        for input in inputs {
            let once = s.sanitize(input);
            assert_eq!(s.sanitize(&once), once, "input: {}", input);
        }
    }

    #[test]
    fn test_misnested_formatting_matches_browser_tree() {
        let s = sanitizer();
        assert_eq!(s.sanitize("<b>1<p>2</b>3</p>"), "<b>1</b><p><b>2</b>3</p>");
        assert_eq!(s.sanitize("<p><b>a</p>b"), "<p><b>a</b></p><b>b</b>");
        assert_eq!(s.sanitize("<i><b>x</i>y</b>"), "<i><b>x</b></i><b>y</b>");
        assert_eq!(s.sanitize("<pre>\nline</pre>"), "<pre>line</pre>");
        assert_eq!(
            s.sanitize("<table><tr><td><b>cell</b></td></tr></table>"),
            "<b>cell</b>"
        );
    }

    #[test]
    fn test_sanitize_fragment_reparses_clean_output() {
        let fragment = sanitizer().sanitize_fragment(r#"<div><a href="/x" onclick="y()">go</a></div>"#);
        assert_eq!(fragment.element_names(), vec!["a"]);
        assert_eq!(fragment.elements()[0].attrs, vec![("href".to_string(), "/x".to_string())]);
    }

    #[test]
    fn test_custom_allowlist() {
        let s = sanitizer().with_allowlist(Allowlist::empty().with_tag("span", &["title"]));
        assert_eq!(
            s.sanitize(r#"<span title="t" class="c"><b>x</b></span>"#),
            r#"<span title="t">x</span>"#
        );
    }

    #[test]
    fn test_default_sanitize_html() {
        assert_eq!(sanitize_html("<b onclick=x>hi</b>"), "<b>hi</b>");
    }
}
