//! Render gateway behaviour through the public API

use soulshield::{
    Document, HostCapabilities, InsertPosition, MessageThread, Role, SafeRenderer, Sanitizer, ShieldError,
};
use url::Url;

fn origin() -> Url {
    Url::parse("https://app.example").expect("valid origin")
}

#[test]
fn test_enforced_document_only_accepts_gateway_markup() {
    let mut doc = Document::new(origin(), HostCapabilities::enforced());
    let renderer = SafeRenderer::install(&mut doc, Sanitizer::new(origin()));
    assert!(renderer.policy().is_enforced());

    let body = doc.body();
    renderer
        .set_safe_html(&mut doc, body, r#"<a href="javascript:alert(1)">x</a><a href="/help">help</a>"#)
        .unwrap();
    assert_eq!(doc.inner_html(body), r#"<a>x</a><a href="/help">help</a>"#);

    // 绕过网关直接写入会被拒绝，文档保持不变
    for raw in ["<b>raw</b>", ""] {
        let err = doc.insert_adjacent_html(body, InsertPosition::BeforeEnd, raw).unwrap_err();
        assert!(matches!(err, ShieldError::TrustedTypesViolation(_)));
    }
    assert_eq!(doc.inner_html(body), r#"<a>x</a><a href="/help">help</a>"#);
}

#[test]
fn test_position_parsing_and_missing_target() {
    let mut doc = Document::new(origin(), HostCapabilities::legacy());
    let renderer = SafeRenderer::install(&mut doc, Sanitizer::new(origin()));

    let position: InsertPosition = "afterBegin".parse().unwrap();
    assert_eq!(position, InsertPosition::AfterBegin);
    assert!("middle".parse::<InsertPosition>().is_err());

    let err = renderer.set_safe_html(&mut doc, 9_999, "<b>x</b>").unwrap_err();
    assert!(matches!(err, ShieldError::NodeNotFound(9_999)));

    let detached = doc.create_element("div");
    let err = renderer
        .insert_safe_html(&mut doc, detached, InsertPosition::BeforeBegin, "<b>x</b>")
        .unwrap_err();
    assert!(matches!(err, ShieldError::NoParentNode(_)));
}

#[test]
fn test_thread_renders_identically_in_both_modes() {
    let render = |caps: HostCapabilities| {
        let mut doc = Document::new(origin(), caps);
        let renderer = SafeRenderer::install(&mut doc, Sanitizer::new(origin()));
        let container = doc.create_element("div");
        doc.append_child(doc.body(), container).unwrap();
        let thread = MessageThread::new(renderer, container);
        thread
            .add_message(
                &mut doc,
                Role::Assistant,
                "Try this:\n\n*slow* breathing <iframe src=//evil>",
                &["OK".to_string()],
                "12:00",
            )
            .unwrap();
        doc.inner_html(container)
    };

    let enforced = render(HostCapabilities::enforced());
    let legacy = render(HostCapabilities::legacy());
    assert_eq!(enforced, legacy);
    assert!(enforced.contains("<p>Try this:</p><p><em>slow</em> breathing &lt;iframe src=//evil&gt;</p>"));
}
