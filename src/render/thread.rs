//! 消息线程渲染
//! 结构节点一律通过文档元素接口创建（类名为常量），
//! 不可信文本只进入文本节点或经网关清洗后的标记

use chrono::DateTime;
use tracing::debug;

use super::document::{Document, NodeId};
use super::gateway::SafeRenderer;
use crate::client::model::{ConversationSummary, Role};
use crate::error::ShieldResult;
use crate::sanitizer::format_message;

/// 欢迎区的元素ID
pub const WELCOME_STATE_ID: &str = "welcomeState";
/// 快捷发送按钮
pub const QUICK_ACTIONS: [&str; 3] = [
    "I need someone to talk to",
    "I feel stressed lately",
    "Help me calm down",
];
const WELCOME_TITLE: &str = "Welcome to SoulShield";
const NEW_SESSION_TITLE: &str = "New Session Started";
const WELCOME_TEXT: &str = "I'm here to listen and support you. Feel free to share whatever is on your mind.";

/// 摘要列表最多展示条数
pub const MAX_SUMMARIES: usize = 3;
/// 摘要预览字符数
pub const SUMMARY_PREVIEW_CHARS: usize = 100;

/// 消息线程渲染器
#[derive(Debug, Clone)]
pub struct MessageThread {
    renderer: SafeRenderer,
    container: NodeId,
    typing_seq: u64,
}

impl MessageThread {
    pub fn new(renderer: SafeRenderer, container: NodeId) -> Self {
        Self {
            renderer,
            container,
            typing_seq: 0,
        }
    }

    pub fn container(&self) -> NodeId {
        self.container
    }

    pub fn renderer(&self) -> &SafeRenderer {
        &self.renderer
    }

    fn element(document: &mut Document, tag: &str, class: &str) -> ShieldResult<NodeId> {
        let id = document.create_element(tag);
        document.set_attribute(id, "class", class)?;
        Ok(id)
    }

    /// 追加一条消息：头像、格式化后的气泡、候选回复按钮、时间
    pub fn add_message(
        &self,
        document: &mut Document,
        role: Role,
        content: &str,
        options: &[String],
        time: &str,
    ) -> ShieldResult<NodeId> {
        let row = Self::element(document, "div", &format!("message {}", role.as_str()))?;
        let avatar = self
            .renderer
            .create_text_element(document, "div", role.avatar(), Some("message-avatar"))?;
        document.append_child(row, avatar)?;

        let body = Self::element(document, "div", "message-content")?;
        let bubble = self.renderer.create_html_element(
            document,
            "div",
            &format_message(content),
            Some("message-bubble"),
        )?;
        document.append_child(body, bubble)?;

        if !options.is_empty() {
            let list = Self::element(document, "div", "message-options")?;
            for option in options {
                let button = self
                    .renderer
                    .create_text_element(document, "button", option, Some("option-btn"))?;
                document.set_attribute(button, "data-option", option)?;
                document.append_child(list, button)?;
            }
            document.append_child(body, list)?;
        }

        let time = self
            .renderer
            .create_text_element(document, "div", time, Some("message-time"))?;
        document.append_child(body, time)?;
        document.append_child(row, body)?;
        document.append_child(self.container, row)?;
        Ok(row)
    }

    /// 显示“正在输入”指示，返回其唯一ID
    pub fn show_typing_indicator(&mut self, document: &mut Document) -> ShieldResult<String> {
        self.typing_seq += 1;
        let typing_id = format!("typing-{}", self.typing_seq);

        let row = Self::element(document, "div", "message assistant")?;
        document.set_attribute(row, "id", &typing_id)?;
        let avatar = self.renderer.create_text_element(
            document,
            "div",
            Role::Assistant.avatar(),
            Some("message-avatar"),
        )?;
        document.append_child(row, avatar)?;

        let body = Self::element(document, "div", "message-content")?;
        let bubble = Self::element(document, "div", "message-bubble")?;
        let indicator = Self::element(document, "div", "typing-indicator")?;
        for _ in 0..3 {
            let dot = document.create_element("span");
            document.append_child(indicator, dot)?;
        }
        document.append_child(bubble, indicator)?;
        document.append_child(body, bubble)?;
        document.append_child(row, body)?;
        document.append_child(self.container, row)?;
        Ok(typing_id)
    }

    /// 移除指示；已不存在时返回 false
    pub fn remove_typing_indicator(&self, document: &mut Document, typing_id: &str) -> ShieldResult<bool> {
        match document.get_element_by_id(typing_id) {
            Some(node) => {
                document.remove(node)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn show_welcome(&self, document: &mut Document) -> ShieldResult<()> {
        self.render_landing(document, WELCOME_TITLE)
    }

    pub fn show_new_session(&self, document: &mut Document) -> ShieldResult<()> {
        self.render_landing(document, NEW_SESSION_TITLE)
    }

    /// 首条消息发出前移除欢迎区
    pub fn hide_welcome(&self, document: &mut Document) -> ShieldResult<()> {
        if let Some(node) = document.get_element_by_id(WELCOME_STATE_ID) {
            document.remove(node)?;
        }
        Ok(())
    }

    fn render_landing(&self, document: &mut Document, title: &str) -> ShieldResult<()> {
        document.clear_children(self.container)?;

        let state = Self::element(document, "div", "welcome-state")?;
        document.set_attribute(state, "id", WELCOME_STATE_ID)?;
        let heading = self.renderer.create_text_element(document, "h2", title, None)?;
        document.append_child(state, heading)?;
        let text = self.renderer.create_text_element(document, "p", WELCOME_TEXT, None)?;
        document.append_child(state, text)?;

        let actions = Self::element(document, "div", "quick-actions")?;
        for action in QUICK_ACTIONS {
            let button = self
                .renderer
                .create_text_element(document, "button", action, Some("quick-action"))?;
            document.set_attribute(button, "data-message", action)?;
            document.append_child(actions, button)?;
        }
        document.append_child(state, actions)?;
        document.append_child(self.container, state)
    }

    /// 渲染摘要列表（最多三条）；列表为空时保持原样
    pub fn render_summaries(
        &self,
        document: &mut Document,
        list: NodeId,
        summaries: &[ConversationSummary],
    ) -> ShieldResult<usize> {
        if summaries.is_empty() {
            return Ok(0);
        }
        document.clear_children(list)?;

        let shown = summaries.iter().take(MAX_SUMMARIES);
        let mut count = 0;
        for summary in shown {
            let item = Self::element(document, "div", "summary-item")?;
            let date = self.renderer.create_text_element(
                document,
                "div",
                &summary_date(summary.created_at),
                Some("summary-date"),
            )?;
            document.append_child(item, date)?;

            let preview: String = summary.summary.chars().take(SUMMARY_PREVIEW_CHARS).collect();
            let text = document.create_text_node(&format!("{}...", preview));
            document.append_child(item, text)?;
            document.append_child(list, item)?;
            count += 1;
        }
        debug!("渲染会话摘要 {} 条", count);
        Ok(count)
    }
}

/// Unix 秒 → 日期；非法时间戳为空串
fn summary_date(created_at: f64) -> String {
    if !created_at.is_finite() {
        return String::new();
    }
    DateTime::from_timestamp(created_at.trunc() as i64, 0)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::document::HostCapabilities;
    use crate::sanitizer::Sanitizer;
    use url::Url;

    fn setup(caps: HostCapabilities) -> (Document, MessageThread) {
        let origin = Url::parse("https://app.example").unwrap();
        let mut doc = Document::new(origin.clone(), caps);
        let renderer = SafeRenderer::install(&mut doc, Sanitizer::new(origin));
        let container = doc.create_element("div");
        doc.set_attribute(container, "id", "messagesContainer").unwrap();
        doc.append_child(doc.body(), container).unwrap();
        (doc, MessageThread::new(renderer, container))
    }

    #[test]
    fn test_add_message_formats_and_escapes() {
        let (mut doc, thread) = setup(HostCapabilities::enforced());
        let row = thread
            .add_message(&mut doc, Role::User, "a\n**b** <script>x</script>", &[], "10:30")
            .unwrap();
        let expected = format!(
            "<div class=\"message user\"><div class=\"message-avatar\">{}</div><div class=\"message-content\">\
             <div class=\"message-bubble\"><p>a<br><strong>b</strong> &lt;script&gt;x&lt;/script&gt;</p></div>\
             <div class=\"message-time\">10:30</div></div></div>",
            Role::User.avatar()
        );
        assert_eq!(doc.outer_html(row), expected);
    }

    #[test]
    fn test_add_message_options_are_text() {
        let (mut doc, thread) = setup(HostCapabilities::legacy());
        let options = vec!["Tell me \"more\" <3".to_string(), "<img src=x onerror=y>".to_string()];
        thread
            .add_message(&mut doc, Role::Assistant, "hi", &options, "<b>now</b>")
            .unwrap();

        let buttons = doc.elements_by_class("option-btn");
        assert_eq!(buttons.len(), 2);
        assert_eq!(doc.attribute(buttons[0], "data-option"), Some("Tell me \"more\" <3"));
        assert_eq!(
            doc.outer_html(buttons[0]),
            r#"<button class="option-btn" data-option="Tell me &quot;more&quot; &lt;3">Tell me "more" &lt;3</button>"#
        );
        assert_eq!(doc.text_content(buttons[1]), "<img src=x onerror=y>");

        let time = doc.elements_by_class("message-time")[0];
        assert_eq!(doc.inner_html(time), "&lt;b&gt;now&lt;/b&gt;");
    }

    #[test]
    fn test_typing_indicator_lifecycle() {
        let (mut doc, mut thread) = setup(HostCapabilities::enforced());
        let first = thread.show_typing_indicator(&mut doc).unwrap();
        let second = thread.show_typing_indicator(&mut doc).unwrap();
        assert_ne!(first, second);
        assert_eq!(doc.elements_by_class("typing-indicator").len(), 2);

        assert!(thread.remove_typing_indicator(&mut doc, &first).unwrap());
        assert!(!thread.remove_typing_indicator(&mut doc, &first).unwrap());
        assert!(doc.get_element_by_id(&second).is_some());
    }

    #[test]
    fn test_typing_indicator_churn_keeps_document_bounded() {
        let (mut doc, mut thread) = setup(HostCapabilities::enforced());
        let baseline = doc.node_count();
        for _ in 0..200 {
            let id = thread.show_typing_indicator(&mut doc).unwrap();
            assert!(thread.remove_typing_indicator(&mut doc, &id).unwrap());
        }
        assert_eq!(doc.node_count(), baseline);
        assert_eq!(doc.inner_html(thread.container()), "");
    }

    #[test]
    fn test_welcome_and_new_session() {
        let (mut doc, thread) = setup(HostCapabilities::enforced());
        thread.add_message(&mut doc, Role::User, "old", &[], "09:00").unwrap();
        thread.show_welcome(&mut doc).unwrap();

        assert!(doc.elements_by_class("message").is_empty());
        let welcome = doc.get_element_by_id(WELCOME_STATE_ID).unwrap();
        assert!(doc.text_content(welcome).contains(WELCOME_TITLE));
        let actions = doc.elements_by_class("quick-action");
        assert_eq!(actions.len(), 3);
        assert_eq!(doc.attribute(actions[1], "data-message"), Some(QUICK_ACTIONS[1]));

        thread.show_new_session(&mut doc).unwrap();
        let welcome = doc.get_element_by_id(WELCOME_STATE_ID).unwrap();
        assert!(doc.text_content(welcome).contains(NEW_SESSION_TITLE));

        thread.hide_welcome(&mut doc).unwrap();
        assert!(doc.get_element_by_id(WELCOME_STATE_ID).is_none());
        thread.hide_welcome(&mut doc).unwrap();
    }

    #[test]
    fn test_render_summaries_limits_and_truncates() {
        let (mut doc, thread) = setup(HostCapabilities::enforced());
        let list = doc.create_element("div");
        doc.append_child(doc.body(), list).unwrap();

        let summaries: Vec<ConversationSummary> = (0..5)
            .map(|i| ConversationSummary {
                session_id: format!("s{}", i),
                summary: format!("<i>{}</i>{}", i, "x".repeat(200)),
                created_at: 1_700_000_000.0,
            })
            .collect();

        assert_eq!(thread.render_summaries(&mut doc, list, &summaries).unwrap(), 3);
        let items = doc.elements_by_class("summary-item");
        assert_eq!(items.len(), 3);

        let dates = doc.elements_by_class("summary-date");
        assert_eq!(doc.text_content(dates[0]), "2023-11-14");

        let text = doc.text_content(items[0]);
        assert!(text.starts_with("2023-11-14<i>0</i>"));
        assert!(text.ends_with("x..."));
        assert_eq!(text.chars().count(), "2023-11-14".len() + SUMMARY_PREVIEW_CHARS + 3);
        assert!(doc.inner_html(list).contains("&lt;i&gt;0&lt;/i&gt;"));
    }

    #[test]
    fn test_render_summaries_empty_keeps_list() {
        let (mut doc, thread) = setup(HostCapabilities::enforced());
        let list = doc.create_element("div");
        let placeholder = doc.create_text_node("No conversations yet");
        doc.append_child(list, placeholder).unwrap();

        assert_eq!(thread.render_summaries(&mut doc, list, &[]).unwrap(), 0);
        assert_eq!(doc.inner_html(list), "No conversations yet");
    }

    #[test]
    fn test_summary_date_invalid() {
        assert_eq!(summary_date(f64::NAN), "");
        assert_eq!(summary_date(0.0), "1970-01-01");
    }
}
