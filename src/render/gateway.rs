//! 安全渲染网关
//! 所有写入标记的操作都只能经过这里：先由策略清洗签发，再交给文档

use std::sync::Arc;

use super::document::{Document, InsertPosition, NodeId};
use super::policy::{select_policy, RenderPolicy, TrustedScriptUrl};
use crate::error::ShieldResult;
use crate::sanitizer::Sanitizer;

/// 安全渲染器（持有启动时选定的唯一策略实例）
#[derive(Debug, Clone)]
pub struct SafeRenderer {
    policy: Arc<dyn RenderPolicy>,
}

impl SafeRenderer {
    pub fn new(policy: Arc<dyn RenderPolicy>) -> Self {
        Self { policy }
    }

    /// 探测宿主能力、选定策略并构建网关
    pub fn install(document: &mut Document, sanitizer: Sanitizer) -> Self {
        Self::new(select_policy(document, sanitizer))
    }

    pub fn policy(&self) -> &Arc<dyn RenderPolicy> {
        &self.policy
    }

    /// 清洗后替换全部子节点
    pub fn set_safe_html(&self, document: &mut Document, target: NodeId, html: &str) -> ShieldResult<()> {
        let trusted = self.policy.create_html(html);
        document.set_inner_html(target, trusted)
    }

    /// 清洗后追加到末尾
    pub fn append_safe_html(&self, document: &mut Document, target: NodeId, html: &str) -> ShieldResult<()> {
        self.insert_safe_html(document, target, InsertPosition::BeforeEnd, html)
    }

    /// 清洗后按位置插入
    pub fn insert_safe_html(
        &self,
        document: &mut Document,
        target: NodeId,
        position: InsertPosition,
        html: &str,
    ) -> ShieldResult<()> {
        let trusted = self.policy.create_html(html);
        document.insert_adjacent_html(target, position, trusted)
    }

    /// 创建只含纯文本的元素
    pub fn create_text_element(
        &self,
        document: &mut Document,
        tag: &str,
        text: &str,
        class: Option<&str>,
    ) -> ShieldResult<NodeId> {
        let element = document.create_element(tag);
        document.set_text_content(element, text)?;
        if let Some(class) = class {
            document.set_attribute(element, "class", class)?;
        }
        Ok(element)
    }

    /// 创建内容经过清洗的元素
    pub fn create_html_element(
        &self,
        document: &mut Document,
        tag: &str,
        html: &str,
        class: Option<&str>,
    ) -> ShieldResult<NodeId> {
        let element = document.create_element(tag);
        self.set_safe_html(document, element, html)?;
        if let Some(class) = class {
            document.set_attribute(element, "class", class)?;
        }
        Ok(element)
    }

    /// 校验脚本URL
    pub fn trusted_script_url(&self, input: &str) -> ShieldResult<TrustedScriptUrl> {
        self.policy.create_script_url(input)
    }
}
