//! Property-based tests for the allowlist sanitizer
//!
//! Inputs are stitched together from hostile HTML fragments and random text,
//! then the output is re-parsed and checked against the allowlist.

use proptest::prelude::*;
use soulshield::{
    escape_html, format_message, FragmentParser, Sanitizer, DEFAULT_ALLOWLIST, DEFAULT_PROTOCOLS_ALLOWLIST,
};
use url::Url;

fn origin() -> Url {
    Url::parse("https://app.example").expect("valid origin")
}

fn html_piece() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("<script>alert(1)</script>".to_string()),
        Just("<script>".to_string()),
        Just("<img src=x onerror=alert(1)>".to_string()),
        Just("<a href=\"".to_string()),
        Just("<a href='//evil.example/x'>".to_string()),
        Just("<a href=\"mailto:help@example.org\">".to_string()),
        Just("<a href=\"/relative\" onclick=\"x()\">".to_string()),
        Just("javascript:alert(1)".to_string()),
        Just("data:text/html,<b>".to_string()),
        Just("\">".to_string()),
        Just("</a>".to_string()),
        Just("<b>".to_string()),
        Just("</b>".to_string()),
        Just("<em class=\"x\">".to_string()),
        Just("<p>".to_string()),
        Just("</p>".to_string()),
        Just("<ul><li>".to_string()),
        Just("<li>".to_string()),
        Just("</ul>".to_string()),
        Just("<div style=\"color:red\">".to_string()),
        Just("</div>".to_string()),
        Just("<br/>".to_string()),
        Just("</br>".to_string()),
        Just("<pre><code>".to_string()),
        Just("<blockquote>".to_string()),
        Just("<style>".to_string()),
        Just("</style>".to_string()),
        Just("<textarea>".to_string()),
        Just("</textarea>".to_string()),
        Just("<svg><a href=\"javascript:x\">".to_string()),
        Just("<!--".to_string()),
        Just("-->".to_string()),
        Just("&amp;".to_string()),
        Just("&lt;b&gt;".to_string()),
        Just("&nbsp;".to_string()),
        "[a-z <>&\"'=/:]{0,10}",
    ]
}

fn html_input() -> impl Strategy<Value = String> {
    prop::collection::vec(html_piece(), 0..24).prop_map(|pieces| pieces.concat())
}

#[test]
fn prop_output_only_contains_allowed_markup() {
    let sanitizer = Sanitizer::new(origin());
    proptest!(|(input in html_input())| {
        let output = sanitizer.sanitize(&input);
        let reparsed = FragmentParser::parse(&output);

        for element in reparsed.elements() {
            prop_assert!(
                DEFAULT_ALLOWLIST.allows_tag(&element.name),
                "tag <{}> survived in {:?}", element.name, output
            );
            let allowed = DEFAULT_ALLOWLIST.allowed_attributes(&element.name).unwrap_or(&[]);
            for (name, value) in &element.attrs {
                prop_assert!(
                    allowed.iter().any(|a| a == name),
                    "attribute {}={:?} survived on <{}>", name, value, element.name
                );
                if name == "href" {
                    prop_assert!(
                        DEFAULT_PROTOCOLS_ALLOWLIST.accepts_href(&origin(), value),
                        "unsafe href {:?} survived", value
                    );
                }
            }
        }
    });
}

#[test]
fn prop_sanitize_is_idempotent() {
    let sanitizer = Sanitizer::new(origin());
    proptest!(|(input in html_input())| {
        let once = sanitizer.sanitize(&input);
        let twice = sanitizer.sanitize(&once);
        prop_assert_eq!(once, twice);
    });
}

#[test]
fn prop_escaped_text_parses_back_to_itself() {
    proptest!(|(text in "[a-zA-Z0-9 <>&\"'=/;#\n\u{00a0}\u{4f60}]{0,40}")| {
        let escaped = escape_html(&text);
        prop_assert!(!escaped.contains('<'));
        prop_assert!(!escaped.contains('>'));
        prop_assert!(!escaped.contains('"'));
        prop_assert!(!escaped.contains('\''));

        let reparsed = FragmentParser::parse(&escaped);
        prop_assert!(reparsed.elements().is_empty());
        prop_assert_eq!(reparsed.text_content(), text);
    });
}

#[test]
fn prop_formatted_message_uses_fixed_tag_set() {
    proptest!(|(text in "[a-z*\n <>&\"]{0,40}")| {
        let formatted = format_message(&text);
        let reparsed = FragmentParser::parse(&formatted);
        for name in reparsed.element_names() {
            prop_assert!(
                matches!(name, "p" | "br" | "strong" | "em"),
                "unexpected <{}> in {:?}", name, formatted
            );
        }
    });
}
