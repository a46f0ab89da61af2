//! 内存中的“活”文档树
//! 扮演展示层：节点增删、属性读写、innerHTML 序列化，
//! 以及在宿主开启 Trusted Types 强制时拒绝未经策略签发的标记。
//! 节点存放在带空闲链表的节点池中，被移除或替换的子树立即回收

use std::fmt;
use std::io;
use std::str::FromStr;
use markup5ever::serialize::{Serialize, Serializer, TraversalScope};
use markup5ever::{ns, Namespace};
use url::Url;

use super::policy::Markup;
use crate::error::{ShieldError, ShieldResult};
use crate::sanitizer::tree::{attribute_names, qual_name, serialize_to_string, Fragment, Node};
use crate::sanitizer::FragmentParser;

/// 节点句柄（节点被回收后句柄失效，槽位可能被新节点复用）
pub type NodeId = usize;

/// 宿主平台能力（启动时探测一次）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HostCapabilities {
    /// 是否支持并强制 Trusted Types
    pub trusted_types: bool,
}

impl HostCapabilities {
    pub fn enforced() -> Self {
        Self { trusted_types: true }
    }

    pub fn legacy() -> Self {
        Self { trusted_types: false }
    }
}

/// insertAdjacentHTML 插入位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertPosition {
    BeforeBegin,
    AfterBegin,
    BeforeEnd,
    AfterEnd,
}

impl FromStr for InsertPosition {
    type Err = ShieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "beforebegin" => Ok(InsertPosition::BeforeBegin),
            "afterbegin" => Ok(InsertPosition::AfterBegin),
            "beforeend" => Ok(InsertPosition::BeforeEnd),
            "afterend" => Ok(InsertPosition::AfterEnd),
            other => Err(ShieldError::InvalidInput(format!("未知插入位置：{}", other))),
        }
    }
}

impl fmt::Display for InsertPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InsertPosition::BeforeBegin => "beforebegin",
            InsertPosition::AfterBegin => "afterbegin",
            InsertPosition::BeforeEnd => "beforeend",
            InsertPosition::AfterEnd => "afterend",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone)]
enum NodeData {
    Element {
        name: String,
        ns: Namespace,
        attrs: Vec<(String, String)>,
    },
    Text(String),
}

#[derive(Debug, Clone)]
struct DomNode {
    data: NodeData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// 文档
#[derive(Debug)]
pub struct Document {
    /// 节点池，None 为已回收的槽位
    nodes: Vec<Option<DomNode>>,
    /// 可复用的槽位
    free: Vec<NodeId>,
    body: NodeId,
    origin: Url,
    capabilities: HostCapabilities,
    trusted_policy: Option<String>,
}

impl Document {
    pub fn new(origin: Url, capabilities: HostCapabilities) -> Self {
        let body = DomNode {
            data: NodeData::Element {
                name: "body".to_string(),
                ns: ns!(html),
                attrs: Vec::new(),
            },
            parent: None,
            children: Vec::new(),
        };
        Self {
            nodes: vec![Some(body)],
            free: Vec::new(),
            body: 0,
            origin,
            capabilities,
            trusted_policy: None,
        }
    }

    pub fn body(&self) -> NodeId {
        self.body
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    pub fn capabilities(&self) -> HostCapabilities {
        self.capabilities
    }

    /// 平台特性探测
    pub fn supports_trusted_types(&self) -> bool {
        self.capabilities.trusted_types
    }

    /// 注册唯一的 Trusted Types 策略
    pub fn register_trusted_policy(&mut self, name: &str) -> ShieldResult<()> {
        if !self.supports_trusted_types() {
            return Err(ShieldError::PolicyRegistrationError(
                "宿主不支持 Trusted Types".to_string(),
            ));
        }
        if let Some(existing) = &self.trusted_policy {
            return Err(ShieldError::PolicyRegistrationError(format!(
                "已存在策略 {}，拒绝注册 {}",
                existing, name
            )));
        }
        self.trusted_policy = Some(name.to_string());
        Ok(())
    }

    pub fn trusted_policy(&self) -> Option<&str> {
        self.trusted_policy.as_deref()
    }

    // ======== 节点访问 ========

    fn live(&self, id: NodeId) -> Option<&DomNode> {
        self.nodes.get(id).and_then(Option::as_ref)
    }

    fn node(&self, id: NodeId) -> ShieldResult<&DomNode> {
        self.live(id).ok_or(ShieldError::NodeNotFound(id))
    }

    fn node_mut(&mut self, id: NodeId) -> ShieldResult<&mut DomNode> {
        self.nodes
            .get_mut(id)
            .and_then(Option::as_mut)
            .ok_or(ShieldError::NodeNotFound(id))
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.live(id).is_some()
    }

    /// 存活节点数（含 body）
    pub fn node_count(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.live(id).and_then(|n| n.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.live(id)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    /// 元素标签名（文本节点返回 None）
    pub fn tag_name(&self, id: NodeId) -> Option<&str> {
        match &self.live(id)?.data {
            NodeData::Element { name, .. } => Some(name.as_str()),
            NodeData::Text(_) => None,
        }
    }

    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        match &self.live(id)?.data {
            NodeData::Element { attrs, .. } => attrs
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str()),
            NodeData::Text(_) => None,
        }
    }

    /// 节点是否挂在 body 之下
    pub fn is_connected(&self, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(node) = current {
            if node == self.body {
                return true;
            }
            current = self.parent(node);
        }
        false
    }

    /// 深度优先遍历 root 的所有后代
    pub fn descendants(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(root).iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.children(id).iter().rev().copied());
        }
        out
    }

    pub fn get_element_by_id(&self, element_id: &str) -> Option<NodeId> {
        self.descendants(self.body)
            .into_iter()
            .find(|&id| self.attribute(id, "id") == Some(element_id))
    }

    /// 按 class 查找已挂载的元素
    pub fn elements_by_class(&self, class: &str) -> Vec<NodeId> {
        self.descendants(self.body)
            .into_iter()
            .filter(|&id| {
                self.attribute(id, "class")
                    .is_some_and(|c| c.split_ascii_whitespace().any(|t| t == class))
            })
            .collect()
    }

    // ======== 节点创建与变更 ========

    /// 分配节点，优先复用已回收的槽位
    fn alloc(&mut self, data: NodeData) -> NodeId {
        let node = DomNode {
            data,
            parent: None,
            children: Vec::new(),
        };
        match self.free.pop() {
            Some(id) => {
                self.nodes[id] = Some(node);
                id
            }
            None => {
                self.nodes.push(Some(node));
                self.nodes.len() - 1
            }
        }
    }

    /// 回收整棵子树（调用方保证 root 已从父节点摘下）
    fn release(&mut self, root: NodeId) {
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if let Some(node) = self.nodes.get_mut(id).and_then(Option::take) {
                stack.extend(node.children);
                self.free.push(id);
            }
        }
    }

    /// 创建游离元素
    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.alloc(NodeData::Element {
            name: tag.to_ascii_lowercase(),
            ns: ns!(html),
            attrs: Vec::new(),
        })
    }

    pub fn create_text_node(&mut self, text: &str) -> NodeId {
        self.alloc(NodeData::Text(text.to_string()))
    }

    /// 设置属性（值作为纯文本保存，不解析标记）
    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) -> ShieldResult<()> {
        let name = name.to_ascii_lowercase();
        match &mut self.node_mut(id)?.data {
            NodeData::Element { attrs, .. } => {
                match attrs.iter_mut().find(|(k, _)| *k == name) {
                    Some((_, v)) => *v = value.to_string(),
                    None => attrs.push((name, value.to_string())),
                }
                Ok(())
            }
            NodeData::Text(_) => Err(ShieldError::InvalidInput(format!(
                "文本节点 {} 不能设置属性",
                id
            ))),
        }
    }

    /// 将节点从父节点摘下（节点保留，可再次插入）
    fn detach(&mut self, id: NodeId) -> ShieldResult<()> {
        let parent = self.node(id)?.parent;
        if let Some(parent) = parent {
            self.node_mut(parent)?.children.retain(|&c| c != id);
            self.node_mut(id)?.parent = None;
        }
        Ok(())
    }

    /// 移除节点，整棵子树随之回收，原句柄失效
    pub fn remove(&mut self, id: NodeId) -> ShieldResult<()> {
        if id == self.body {
            return Err(ShieldError::InvalidInput("body 不能被移除".to_string()));
        }
        self.detach(id)?;
        self.release(id);
        Ok(())
    }

    /// 清空并回收全部子节点
    pub fn clear_children(&mut self, id: NodeId) -> ShieldResult<()> {
        let children = std::mem::take(&mut self.node_mut(id)?.children);
        for child in children {
            self.release(child);
        }
        Ok(())
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> ShieldResult<()> {
        self.insert_before(parent, child, None)
    }

    /// 在 reference 之前插入（reference 为 None 时追加到末尾）
    pub fn insert_before(
        &mut self,
        parent: NodeId,
        child: NodeId,
        reference: Option<NodeId>,
    ) -> ShieldResult<()> {
        self.node(child)?;
        if matches!(self.node(parent)?.data, NodeData::Text(_)) {
            return Err(ShieldError::InvalidInput(format!("文本节点 {} 不能有子节点", parent)));
        }
        if child == parent || self.is_ancestor(child, parent) {
            return Err(ShieldError::InvalidInput(format!(
                "节点 {} 是 {} 的祖先，不能插入",
                child, parent
            )));
        }

        self.detach(child)?;
        let children = &mut self.node_mut(parent)?.children;
        let index = match reference {
            Some(r) => children
                .iter()
                .position(|&c| c == r)
                .ok_or(ShieldError::NodeNotFound(r))?,
            None => children.len(),
        };
        children.insert(index, child);
        self.node_mut(child)?.parent = Some(parent);
        Ok(())
    }

    fn is_ancestor(&self, ancestor: NodeId, of: NodeId) -> bool {
        let mut current = self.parent(of);
        while let Some(node) = current {
            if node == ancestor {
                return true;
            }
            current = self.parent(node);
        }
        false
    }

    /// 以纯文本替换全部子节点
    pub fn set_text_content(&mut self, id: NodeId, text: &str) -> ShieldResult<()> {
        self.clear_children(id)?;
        if !text.is_empty() {
            let text_node = self.create_text_node(text);
            self.append_child(id, text_node)?;
        }
        Ok(())
    }

    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        for node in std::iter::once(id).chain(self.descendants(id)) {
            if let Some(NodeData::Text(text)) = self.live(node).map(|n| &n.data) {
                out.push_str(text);
            }
        }
        out
    }

    // ======== 标记写入（受 Trusted Types 约束） ========

    /// 检查标记是否允许写入，返回待解析的HTML
    fn accept_markup(&self, markup: Markup) -> ShieldResult<String> {
        if !self.supports_trusted_types() {
            return Ok(markup.into_html());
        }
        match markup {
            Markup::Raw(_) => Err(ShieldError::TrustedTypesViolation(
                "强制模式下拒绝写入原始字符串".to_string(),
            )),
            Markup::Trusted(trusted) => {
                let registered = self.trusted_policy.as_deref();
                if registered.is_some() && trusted.policy_name() == registered {
                    Ok(trusted.into_html())
                } else {
                    Err(ShieldError::TrustedTypesViolation(format!(
                        "标记不是由已注册策略签发（签发者：{}）",
                        trusted.policy_name().unwrap_or("无")
                    )))
                }
            }
        }
    }

    /// innerHTML 赋值
    pub fn set_inner_html(&mut self, id: NodeId, markup: impl Into<Markup>) -> ShieldResult<()> {
        self.node(id)?;
        let html = self.accept_markup(markup.into())?;
        let fragment = FragmentParser::parse(&html);
        self.clear_children(id)?;
        for child in self.import_fragment(&fragment) {
            self.append_child(id, child)?;
        }
        Ok(())
    }

    /// insertAdjacentHTML
    pub fn insert_adjacent_html(
        &mut self,
        id: NodeId,
        position: InsertPosition,
        markup: impl Into<Markup>,
    ) -> ShieldResult<()> {
        self.node(id)?;
        let parent = self.parent(id);
        if matches!(position, InsertPosition::BeforeBegin | InsertPosition::AfterEnd) && parent.is_none() {
            return Err(ShieldError::NoParentNode(id));
        }

        let html = self.accept_markup(markup.into())?;
        let fragment = FragmentParser::parse(&html);
        let nodes = self.import_fragment(&fragment);

        match position {
            InsertPosition::BeforeBegin => {
                let parent = parent.ok_or(ShieldError::NoParentNode(id))?;
                for node in nodes {
                    self.insert_before(parent, node, Some(id))?;
                }
            }
            InsertPosition::AfterBegin => {
                let first = self.children(id).first().copied();
                for node in nodes {
                    self.insert_before(id, node, first)?;
                }
            }
            InsertPosition::BeforeEnd => {
                for node in nodes {
                    self.append_child(id, node)?;
                }
            }
            InsertPosition::AfterEnd => {
                let parent = parent.ok_or(ShieldError::NoParentNode(id))?;
                let siblings = self.children(parent);
                let next = siblings
                    .iter()
                    .position(|&c| c == id)
                    .and_then(|i| siblings.get(i + 1).copied());
                for node in nodes {
                    self.insert_before(parent, node, next)?;
                }
            }
        }
        Ok(())
    }

    /// 将片段树导入为游离节点，返回顶层节点
    fn import_fragment(&mut self, fragment: &Fragment) -> Vec<NodeId> {
        fragment
            .children
            .iter()
            .map(|node| self.import_node(node))
            .collect()
    }

    fn import_node(&mut self, node: &Node) -> NodeId {
        match node {
            Node::Text(text) => self.create_text_node(text),
            Node::Element(el) => {
                let id = self.alloc(NodeData::Element {
                    name: el.name.clone(),
                    ns: el.ns.clone(),
                    attrs: el.attrs.clone(),
                });
                let children: Vec<NodeId> = el.children.iter().map(|child| self.import_node(child)).collect();
                for &child in &children {
                    if let Some(node) = self.nodes[child].as_mut() {
                        node.parent = Some(id);
                    }
                }
                if let Some(node) = self.nodes[id].as_mut() {
                    node.children = children;
                }
                id
            }
        }
    }

    // ======== 序列化 ========

    pub fn inner_html(&self, id: NodeId) -> String {
        match self.live(id).map(|n| &n.data) {
            Some(NodeData::Element { name, ns, .. }) => serialize_to_string(
                &Subtree { document: self, id },
                TraversalScope::ChildrenOnly(Some(qual_name(ns, name))),
            ),
            _ => String::new(),
        }
    }

    pub fn outer_html(&self, id: NodeId) -> String {
        if !self.contains(id) {
            return String::new();
        }
        serialize_to_string(&Subtree { document: self, id }, TraversalScope::IncludeNode)
    }
}

/// 以某个节点为根的子树视图，供 html5ever 序列化器遍历
struct Subtree<'a> {
    document: &'a Document,
    id: NodeId,
}

impl Serialize for Subtree<'_> {
    fn serialize<S: Serializer>(&self, serializer: &mut S, scope: TraversalScope) -> io::Result<()> {
        let Some(node) = self.document.live(self.id) else {
            return Ok(());
        };
        match &node.data {
            NodeData::Text(text) => serializer.write_text(text),
            NodeData::Element { name, ns, attrs } => {
                let include_node = scope == TraversalScope::IncludeNode;
                let name = qual_name(ns, name);
                if include_node {
                    let attrs = attribute_names(attrs);
                    serializer.start_elem(name.clone(), attrs.iter().map(|(k, v)| (k, *v)))?;
                }
                for &child in &node.children {
                    let child = Subtree {
                        document: self.document,
                        id: child,
                    };
                    child.serialize(serializer, TraversalScope::IncludeNode)?;
                }
                if include_node {
                    serializer.end_elem(name)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::policy::TrustedHtml;

    fn legacy_doc() -> Document {
        Document::new(Url::parse("https://app.example").unwrap(), HostCapabilities::legacy())
    }

    #[test]
    fn test_build_and_serialize() {
        let mut doc = legacy_doc();
        let div = doc.create_element("DIV");
        doc.set_attribute(div, "class", "message user").unwrap();
        doc.set_text_content(div, "a < b").unwrap();
        doc.append_child(doc.body(), div).unwrap();

        assert_eq!(doc.inner_html(doc.body()), r#"<div class="message user">a &lt; b</div>"#);
        assert_eq!(doc.text_content(div), "a < b");
        assert_eq!(doc.elements_by_class("user"), vec![div]);
        assert!(doc.is_connected(div));
    }

    #[test]
    fn test_remove_detaches() {
        let mut doc = legacy_doc();
        let div = doc.create_element("div");
        doc.set_attribute(div, "id", "typing-1").unwrap();
        doc.append_child(doc.body(), div).unwrap();
        assert_eq!(doc.get_element_by_id("typing-1"), Some(div));

        doc.remove(div).unwrap();
        assert_eq!(doc.get_element_by_id("typing-1"), None);
        assert!(!doc.is_connected(div));
        assert_eq!(doc.inner_html(doc.body()), "");
    }

    #[test]
    fn test_repeated_inner_html_reuses_slots() {
        let mut doc = legacy_doc();
        let body = doc.body();
        for _ in 0..1000 {
            doc.set_inner_html(body, "<p>a<b>b</b></p>").unwrap();
        }
        assert_eq!(doc.descendants(body).len(), 4);
        assert_eq!(doc.node_count(), 5);
        assert_eq!(doc.nodes.len(), 5);
        assert_eq!(doc.inner_html(body), "<p>a<b>b</b></p>");
    }

    #[test]
    fn test_removed_subtree_is_released() {
        let mut doc = legacy_doc();
        let body = doc.body();
        let row = doc.create_element("div");
        doc.append_child(body, row).unwrap();
        doc.set_inner_html(row, "<em>x</em><strong>y</strong>").unwrap();
        assert_eq!(doc.node_count(), 6);

        doc.remove(row).unwrap();
        assert_eq!(doc.node_count(), 1);
        assert!(!doc.contains(row));
        assert!(matches!(doc.set_inner_html(row, "z"), Err(ShieldError::NodeNotFound(_))));

        // 回收的槽位被新节点复用
        let next = doc.create_element("p");
        assert!(next < 6);
        assert!(matches!(doc.remove(body), Err(ShieldError::InvalidInput(_))));
    }

    #[test]
    fn test_reinserting_keeps_node_alive() {
        let mut doc = legacy_doc();
        let body = doc.body();
        let first = doc.create_element("ul");
        let second = doc.create_element("ol");
        doc.append_child(body, first).unwrap();
        doc.append_child(body, second).unwrap();
        doc.set_text_content(first, "moved").unwrap();

        doc.append_child(second, first).unwrap();
        assert_eq!(doc.inner_html(body), "<ol><ul>moved</ul></ol>");
        assert_eq!(doc.node_count(), 4);
    }

    #[test]
    fn test_set_inner_html_uses_tree_construction() {
        let mut doc = legacy_doc();
        let body = doc.body();
        doc.set_inner_html(body, "<b>1<p>2</b>3</p>").unwrap();
        assert_eq!(doc.inner_html(body), "<b>1</b><p><b>2</b>3</p>");
        assert_eq!(doc.outer_html(body), "<body><b>1</b><p><b>2</b>3</p></body>");
    }

    #[test]
    fn test_insert_adjacent_positions() {
        let mut doc = legacy_doc();
        let target = doc.create_element("ul");
        doc.append_child(doc.body(), target).unwrap();
        doc.set_inner_html(target, "<li>mid</li>").unwrap();

        doc.insert_adjacent_html(target, InsertPosition::AfterBegin, "<li>first</li>").unwrap();
        doc.insert_adjacent_html(target, InsertPosition::BeforeEnd, "<li>last</li>").unwrap();
        doc.insert_adjacent_html(target, InsertPosition::BeforeBegin, "<p>before</p>").unwrap();
        doc.insert_adjacent_html(target, InsertPosition::AfterEnd, "<p>after</p>").unwrap();

        assert_eq!(
            doc.inner_html(doc.body()),
            "<p>before</p><ul><li>first</li><li>mid</li><li>last</li></ul><p>after</p>"
        );
    }

    #[test]
    fn test_outer_positions_need_parent() {
        let mut doc = legacy_doc();
        let orphan = doc.create_element("div");
        let err = doc
            .insert_adjacent_html(orphan, InsertPosition::AfterEnd, "x")
            .unwrap_err();
        assert!(matches!(err, ShieldError::NoParentNode(_)));
    }

    #[test]
    fn test_unknown_node() {
        let mut doc = legacy_doc();
        assert!(matches!(
            doc.set_inner_html(99, "x").unwrap_err(),
            ShieldError::NodeNotFound(99)
        ));
    }

    #[test]
    fn test_cycle_rejected() {
        let mut doc = legacy_doc();
        let outer = doc.create_element("div");
        let inner = doc.create_element("div");
        doc.append_child(outer, inner).unwrap();
        assert!(doc.append_child(inner, outer).is_err());
    }

    #[test]
    fn test_enforced_document_rejects_raw_markup() {
        let mut doc = Document::new(Url::parse("https://app.example").unwrap(), HostCapabilities::enforced());
        let body = doc.body();
        let err = doc.set_inner_html(body, "<b>x</b>").unwrap_err();
        assert!(matches!(err, ShieldError::TrustedTypesViolation(_)));

        // 未注册策略签发的标记同样拒绝
        let err = doc
            .set_inner_html(body, TrustedHtml::new("<b>x</b>".to_string(), None))
            .unwrap_err();
        assert!(matches!(err, ShieldError::TrustedTypesViolation(_)));

        doc.register_trusted_policy("p1").unwrap();
        doc.set_inner_html(body, TrustedHtml::new("<b>x</b>".to_string(), Some("p1")))
            .unwrap();
        assert_eq!(doc.inner_html(body), "<b>x</b>");
    }

    #[test]
    fn test_single_policy_registration() {
        let mut doc = Document::new(Url::parse("https://app.example").unwrap(), HostCapabilities::enforced());
        doc.register_trusted_policy("first").unwrap();
        assert!(doc.register_trusted_policy("second").is_err());
        assert_eq!(doc.trusted_policy(), Some("first"));

        let mut legacy = legacy_doc();
        assert!(legacy.register_trusted_policy("first").is_err());
    }

    #[test]
    fn test_insert_position_parse() {
        assert_eq!("beforeend".parse::<InsertPosition>().unwrap(), InsertPosition::BeforeEnd);
        assert_eq!("AfterBegin".parse::<InsertPosition>().unwrap(), InsertPosition::AfterBegin);
        assert!("middle".parse::<InsertPosition>().is_err());
        assert_eq!(InsertPosition::AfterEnd.to_string(), "afterend");
    }
}
