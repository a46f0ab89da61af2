//! 片段树模型与HTML序列化
//! 解析结果与清洗结果共用同一棵树结构；序列化交给 html5ever 的片段序列化器

use std::io;
use html5ever::serialize::{serialize, SerializeOpts};
use markup5ever::serialize::{Serialize, Serializer, TraversalScope};
use markup5ever::{ns, LocalName, Namespace, QualName};
use tracing::warn;

/// 树节点
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
}

/// 元素节点
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    /// 命名空间（svg / math 内的元素不是 HTML 元素）
    pub ns: Namespace,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ns: ns!(html),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    /// 读取属性
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// 设置属性（已存在则覆盖）
    pub fn set_attr(&mut self, name: &str, value: &str) {
        match self.attrs.iter_mut().find(|(k, _)| k == name) {
            Some((_, v)) => *v = value.to_string(),
            None => self.attrs.push((name.to_string(), value.to_string())),
        }
    }

    pub fn push(&mut self, node: Node) {
        push_node(&mut self.children, node);
    }
}

/// 文档片段（无包装元素的节点序列）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fragment {
    pub children: Vec<Node>,
}

impl Fragment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn push(&mut self, node: Node) {
        push_node(&mut self.children, node);
    }

    /// 序列化片段内部标记（等价于容器元素的 innerHTML）
    pub fn to_html(&self) -> String {
        serialize_to_string(self, TraversalScope::ChildrenOnly(None))
    }

    /// 拼接所有文本节点
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(&mut out, &self.children);
        out
    }

    /// 深度优先列出所有元素标签名
    pub fn element_names(&self) -> Vec<&str> {
        let mut names = Vec::new();
        collect_names(&mut names, &self.children);
        names
    }

    /// 深度优先列出所有元素
    pub fn elements(&self) -> Vec<&Element> {
        let mut elements = Vec::new();
        collect_elements(&mut elements, &self.children);
        elements
    }
}

/// 追加节点，相邻文本节点合并，空文本丢弃
pub(crate) fn push_node(children: &mut Vec<Node>, node: Node) {
    match node {
        Node::Text(text) if text.is_empty() => {}
        Node::Text(text) => match children.last_mut() {
            Some(Node::Text(prev)) => prev.push_str(&text),
            _ => children.push(Node::Text(text)),
        },
        element => children.push(element),
    }
}

fn collect_text(out: &mut String, nodes: &[Node]) {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) => collect_text(out, &el.children),
        }
    }
}

fn collect_names<'a>(names: &mut Vec<&'a str>, nodes: &'a [Node]) {
    for node in nodes {
        if let Node::Element(el) = node {
            names.push(el.name.as_str());
            collect_names(names, &el.children);
        }
    }
}

fn collect_elements<'a>(elements: &mut Vec<&'a Element>, nodes: &'a [Node]) {
    for node in nodes {
        if let Node::Element(el) = node {
            elements.push(el);
            collect_elements(elements, &el.children);
        }
    }
}

impl Serialize for Fragment {
    fn serialize<S: Serializer>(&self, serializer: &mut S, _scope: TraversalScope) -> io::Result<()> {
        for child in &self.children {
            child.serialize(serializer, TraversalScope::IncludeNode)?;
        }
        Ok(())
    }
}

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: &mut S, scope: TraversalScope) -> io::Result<()> {
        match self {
            Node::Text(text) => serializer.write_text(text),
            Node::Element(el) => el.serialize(serializer, scope),
        }
    }
}

impl Serialize for Element {
    fn serialize<S: Serializer>(&self, serializer: &mut S, scope: TraversalScope) -> io::Result<()> {
        let include_node = scope == TraversalScope::IncludeNode;
        let name = qual_name(&self.ns, &self.name);
        if include_node {
            let attrs = attribute_names(&self.attrs);
            serializer.start_elem(name.clone(), attrs.iter().map(|(k, v)| (k, *v)))?;
        }
        for child in &self.children {
            child.serialize(serializer, TraversalScope::IncludeNode)?;
        }
        if include_node {
            serializer.end_elem(name)?;
        }
        Ok(())
    }
}

pub(crate) fn qual_name(ns: &Namespace, local: &str) -> QualName {
    QualName::new(None, ns.clone(), LocalName::from(local))
}

/// 属性名转为无命名空间的限定名（带前缀的属性名原样保留，如 xlink:href）
pub(crate) fn attribute_names(attrs: &[(String, String)]) -> Vec<(QualName, &str)> {
    attrs
        .iter()
        .map(|(k, v)| (qual_name(&ns!(), k), v.as_str()))
        .collect()
}

/// 按HTML片段序列化算法输出
pub(crate) fn serialize_to_string<T: Serialize>(node: &T, scope: TraversalScope) -> String {
    let mut buf = Vec::new();
    let opts = SerializeOpts {
        traversal_scope: scope,
        ..SerializeOpts::default()
    };
    match serialize(&mut buf, node, opts) {
        Ok(()) => String::from_utf8_lossy(&buf).into_owned(),
        Err(e) => {
            warn!("HTML序列化失败：{}", e);
            String::new()
        }
    }
}
