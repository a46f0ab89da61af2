//! HTML片段解析器
//! 使用 html5ever 的完整树构建算法（隐式闭合、格式化元素重建、收养代理、表格寄养），
//! 以 <div> 为上下文元素解析，与浏览器 innerHTML 赋值的结果一致。
//! 树构建器的输出先落在节点池里，结束时再转换为片段树

use std::borrow::Cow;
use std::cell::RefCell;
use std::rc::Rc;
use html5ever::{parse_fragment, ParseOpts};
use markup5ever::interface::tree_builder::{ElementFlags, NodeOrText, QuirksMode, TreeSink};
use markup5ever::{local_name, ns, Attribute, LocalName, QualName};
use tendril::{StrTendril, TendrilSink};

use super::tree::{push_node, Element, Fragment, Node};

/// 最大嵌套深度，更深的元素拆掉包装，文本并入该层
pub const MAX_NESTING_DEPTH: usize = 512;

/// 文档节点固定占用池中第一个位置
const DOCUMENT: usize = 0;

#[derive(Debug)]
enum PoolData {
    Document,
    Element {
        name: QualName,
        attrs: Vec<Attribute>,
        template_contents: Option<usize>,
    },
    Text(String),
    /// 注释与处理指令，转换时丢弃
    Ignored,
}

#[derive(Debug)]
struct PoolNode {
    data: PoolData,
    parent: Option<usize>,
    children: Vec<usize>,
}

/// 树构建期间的节点池
#[derive(Debug)]
struct NodePool {
    nodes: Vec<PoolNode>,
}

impl NodePool {
    fn new() -> Self {
        let mut pool = Self { nodes: Vec::new() };
        pool.alloc(PoolData::Document);
        pool
    }

    fn alloc(&mut self, data: PoolData) -> usize {
        self.nodes.push(PoolNode {
            data,
            parent: None,
            children: Vec::new(),
        });
        self.nodes.len() - 1
    }

    fn detach(&mut self, id: usize) {
        if let Some(parent) = self.nodes[id].parent.take() {
            self.nodes[parent].children.retain(|&c| c != id);
        }
    }

    /// 追加到末尾，文本与末尾文本节点合并
    fn append(&mut self, parent: usize, child: NodeOrText<SinkHandle>) {
        match child {
            NodeOrText::AppendText(text) => {
                if let Some(&last) = self.nodes[parent].children.last() {
                    if let PoolData::Text(existing) = &mut self.nodes[last].data {
                        existing.push_str(&text);
                        return;
                    }
                }
                let id = self.alloc(PoolData::Text(text.to_string()));
                self.nodes[id].parent = Some(parent);
                self.nodes[parent].children.push(id);
            }
            NodeOrText::AppendNode(handle) => {
                self.detach(handle.id);
                self.nodes[handle.id].parent = Some(parent);
                self.nodes[parent].children.push(handle.id);
            }
        }
    }

    /// 插到 sibling 之前，文本与前一个文本节点合并
    fn insert_before(&mut self, sibling: usize, child: NodeOrText<SinkHandle>) {
        if let NodeOrText::AppendNode(handle) = &child {
            self.detach(handle.id);
        }
        let Some(parent) = self.nodes[sibling].parent else {
            return;
        };
        let Some(index) = self.nodes[parent].children.iter().position(|&c| c == sibling) else {
            return;
        };

        let id = match child {
            NodeOrText::AppendText(text) => {
                if index > 0 {
                    let prev = self.nodes[parent].children[index - 1];
                    if let PoolData::Text(existing) = &mut self.nodes[prev].data {
                        existing.push_str(&text);
                        return;
                    }
                }
                self.alloc(PoolData::Text(text.to_string()))
            }
            NodeOrText::AppendNode(handle) => handle.id,
        };
        self.nodes[id].parent = Some(parent);
        self.nodes[parent].children.insert(index, id);
    }

    /// 转换为片段树；显式栈遍历，不受输入嵌套深度影响
    fn into_fragment(self) -> Fragment {
        struct Frame<'p> {
            children: std::slice::Iter<'p, usize>,
            // None：根或超出深度被拆掉包装的元素，子节点写入下方最近的元素
            element: Option<Element>,
        }

        fn output<'a>(stack: &'a mut [Frame<'_>], fragment: &'a mut Fragment) -> &'a mut Vec<Node> {
            match stack.iter_mut().rev().find_map(|frame| frame.element.as_mut()) {
                Some(el) => &mut el.children,
                None => &mut fragment.children,
            }
        }

        let mut fragment = Fragment::new();
        // 片段解析时文档下唯一的子节点是 <html> 根元素，片段内容挂在它下面
        let Some(&root) = self.nodes[DOCUMENT].children.first() else {
            return fragment;
        };

        let mut depth = 0;
        let mut stack = vec![Frame {
            children: self.nodes[root].children.iter(),
            element: None,
        }];

        while let Some(frame) = stack.last_mut() {
            let next = frame.children.next().copied();
            match next {
                None => {
                    if let Some(Frame { element: Some(el), .. }) = stack.pop() {
                        depth -= 1;
                        push_node(output(&mut stack, &mut fragment), Node::Element(el));
                    }
                }
                Some(child) => match &self.nodes[child].data {
                    PoolData::Text(text) => {
                        push_node(output(&mut stack, &mut fragment), Node::Text(text.clone()))
                    }
                    PoolData::Element {
                        name,
                        attrs,
                        template_contents,
                    } => {
                        let element = (depth < MAX_NESTING_DEPTH).then(|| convert_element(name, attrs));
                        if element.is_some() {
                            depth += 1;
                        }
                        let source = template_contents.unwrap_or(child);
                        stack.push(Frame {
                            children: self.nodes[source].children.iter(),
                            element,
                        });
                    }
                    PoolData::Document | PoolData::Ignored => {}
                },
            }
        }
        fragment
    }
}

fn convert_element(name: &QualName, attrs: &[Attribute]) -> Element {
    let mut el = Element::new(name.local.to_string());
    el.ns = name.ns.clone();
    for attr in attrs {
        let key = match &attr.name.prefix {
            Some(prefix) => format!("{}:{}", prefix, attr.name.local),
            None => attr.name.local.to_string(),
        };
        // 分词器已去重，这里再保证一次首个属性优先
        if el.attr(&key).is_none() {
            el.attrs.push((key, attr.value.to_string()));
        }
    }
    el
}

/// 树构建器持有的节点句柄，元素名随句柄携带
#[derive(Debug, Clone)]
struct SinkHandle {
    id: usize,
    name: Rc<QualName>,
}

/// html5ever 树构建器的落地实现
struct FragmentSink {
    pool: RefCell<NodePool>,
    unnamed: Rc<QualName>,
}

impl FragmentSink {
    fn new() -> Self {
        Self {
            pool: RefCell::new(NodePool::new()),
            unnamed: Rc::new(QualName::new(None, ns!(), LocalName::from(""))),
        }
    }

    fn handle(&self, id: usize) -> SinkHandle {
        SinkHandle {
            id,
            name: Rc::clone(&self.unnamed),
        }
    }
}

impl TreeSink for FragmentSink {
    type Handle = SinkHandle;
    type Output = Fragment;
    type ElemName<'a>
        = &'a QualName
    where
        Self: 'a;

    fn finish(self) -> Fragment {
        self.pool.into_inner().into_fragment()
    }

    // 解析错误按浏览器方式恢复，不单独上报
    fn parse_error(&self, _msg: Cow<'static, str>) {}

    fn get_document(&self) -> SinkHandle {
        self.handle(DOCUMENT)
    }

    fn elem_name<'a>(&'a self, target: &'a SinkHandle) -> &'a QualName {
        &target.name
    }

    fn create_element(&self, name: QualName, attrs: Vec<Attribute>, flags: ElementFlags) -> SinkHandle {
        let mut pool = self.pool.borrow_mut();
        let template_contents = flags.template.then(|| pool.alloc(PoolData::Document));
        let id = pool.alloc(PoolData::Element {
            name: name.clone(),
            attrs,
            template_contents,
        });
        SinkHandle {
            id,
            name: Rc::new(name),
        }
    }

    fn create_comment(&self, _text: StrTendril) -> SinkHandle {
        let id = self.pool.borrow_mut().alloc(PoolData::Ignored);
        self.handle(id)
    }

    fn create_pi(&self, _target: StrTendril, _data: StrTendril) -> SinkHandle {
        let id = self.pool.borrow_mut().alloc(PoolData::Ignored);
        self.handle(id)
    }

    fn append(&self, parent: &SinkHandle, child: NodeOrText<SinkHandle>) {
        self.pool.borrow_mut().append(parent.id, child);
    }

    fn append_based_on_parent_node(
        &self,
        element: &SinkHandle,
        prev_element: &SinkHandle,
        child: NodeOrText<SinkHandle>,
    ) {
        let has_parent = self.pool.borrow().nodes[element.id].parent.is_some();
        if has_parent {
            self.append_before_sibling(element, child);
        } else {
            self.append(prev_element, child);
        }
    }

    fn append_doctype_to_document(&self, _name: StrTendril, _public_id: StrTendril, _system_id: StrTendril) {}

    fn get_template_contents(&self, target: &SinkHandle) -> SinkHandle {
        match &self.pool.borrow().nodes[target.id].data {
            PoolData::Element {
                template_contents: Some(contents),
                ..
            } => self.handle(*contents),
            _ => target.clone(),
        }
    }

    fn same_node(&self, x: &SinkHandle, y: &SinkHandle) -> bool {
        x.id == y.id
    }

    fn set_quirks_mode(&self, _mode: QuirksMode) {}

    fn append_before_sibling(&self, sibling: &SinkHandle, new_node: NodeOrText<SinkHandle>) {
        self.pool.borrow_mut().insert_before(sibling.id, new_node);
    }

    fn add_attrs_if_missing(&self, target: &SinkHandle, attrs: Vec<Attribute>) {
        if let PoolData::Element { attrs: existing, .. } = &mut self.pool.borrow_mut().nodes[target.id].data {
            for attr in attrs {
                if !existing.iter().any(|a| a.name == attr.name) {
                    existing.push(attr);
                }
            }
        }
    }

    fn remove_from_parent(&self, target: &SinkHandle) {
        self.pool.borrow_mut().detach(target.id);
    }

    fn reparent_children(&self, node: &SinkHandle, new_parent: &SinkHandle) {
        let mut pool = self.pool.borrow_mut();
        let children = std::mem::take(&mut pool.nodes[node.id].children);
        for &child in &children {
            pool.nodes[child].parent = Some(new_parent.id);
        }
        pool.nodes[new_parent.id].children.extend(children);
    }
}

/// 片段解析器
#[derive(Debug, Clone, Copy, Default)]
pub struct FragmentParser;

impl FragmentParser {
    /// 解析HTML字符串为片段树（永不失败，畸形标记按浏览器方式降级）
    pub fn parse(html: &str) -> Fragment {
        let context = QualName::new(None, ns!(html), local_name!("div"));
        parse_fragment(FragmentSink::new(), ParseOpts::default(), context, Vec::new(), false).one(html)
    }
}
