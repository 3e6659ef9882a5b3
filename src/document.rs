//! Host page model.
//!
//! A thin layer over `markup5ever_rcdom`: the page is parsed with html5ever,
//! component templates are parsed as body-context fragments, and nodes are
//! moved around with the helpers below. Tag and attribute names are ASCII
//! lowercase, as html5ever produces them.

use html5ever::serialize::{serialize, SerializeOpts, TraversalScope};
use tendril::{StrTendril, TendrilSink};
use html5ever::{parse_document, parse_fragment, Attribute, LocalName, Namespace, QualName};
use markup5ever_rcdom::{Node, NodeData, RcDom, SerializableHandle};
use sha2::{Digest, Sha256};
use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;
use thiserror::Error;
use tracing::debug;

pub use markup5ever_rcdom::Handle;

const HTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported selector \"{0}\"")]
pub struct SelectorError(pub String);

// ═══════════════════════════════════════════════════════════════════════════════
// DOCUMENT
// ═══════════════════════════════════════════════════════════════════════════════

pub struct Document {
    dom: RcDom,
    style_element: RefCell<Option<Handle>>,
    style_digests: RefCell<HashSet<Vec<u8>>>,
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("html", &self.to_html())
            .finish()
    }
}

impl Document {
    /// Parses a full page. html5ever never fails; malformed markup is
    /// repaired the way browsers do.
    pub fn parse(html: &str) -> Self {
        let dom = parse_document(RcDom::default(), Default::default()).one(html);
        Document {
            dom,
            style_element: RefCell::new(None),
            style_digests: RefCell::new(HashSet::new()),
        }
    }

    pub fn root(&self) -> Handle {
        self.dom.document.clone()
    }

    pub fn head(&self) -> Option<Handle> {
        self.find_element(|node| tag_name(node).as_deref() == Some("head"))
    }

    pub fn body(&self) -> Option<Handle> {
        self.find_element(|node| tag_name(node).as_deref() == Some("body"))
    }

    fn find_element(&self, predicate: impl Fn(&Handle) -> bool) -> Option<Handle> {
        descendants(&self.dom.document)
            .into_iter()
            .find(|node| is_element(node) && predicate(node))
    }

    /// First element matching `selector` in document order.
    pub fn query_selector(&self, selector: &str) -> Result<Option<Handle>, SelectorError> {
        let list = parse_selector_list(selector)?;
        Ok(self.find_element(|node| list.iter().any(|compound| compound.matches(node))))
    }

    /// Element carrying `name="value"`.
    pub fn find_by_attribute(&self, name: &str, value: &str) -> Option<Handle> {
        self.find_element(|node| get_attribute(node, name).as_deref() == Some(value))
    }

    /// Registers a global stylesheet. Content already registered (by digest)
    /// is ignored; returns whether the sheet was added.
    pub fn inject_style(&self, css: &str) -> bool {
        let digest = Sha256::digest(css.as_bytes()).to_vec();
        if !self.style_digests.borrow_mut().insert(digest) {
            return false;
        }

        let existing = self.style_element.borrow().clone();
        let style = match existing {
            Some(style) => style,
            None => {
                let style = create_element("style");
                let parent = self
                    .head()
                    .or_else(|| self.body())
                    .unwrap_or_else(|| self.root());
                append_child(&parent, &style);
                *self.style_element.borrow_mut() = Some(style.clone());
                style
            }
        };

        let mut text = text_content(&style);
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(css);
        set_text(&style, &text);
        debug!(bytes = css.len(), "registered stylesheet");
        true
    }

    /// Text of the global style element.
    pub fn style_sheet(&self) -> Option<String> {
        self.style_element.borrow().as_ref().map(text_content)
    }

    /// Serializes the whole page.
    pub fn to_html(&self) -> String {
        inner_html(&self.dom.document)
    }
}

/// Parses markup as the children of a `<body>`. The returned nodes are
/// detached.
pub fn parse_fragment_nodes(html: &str) -> Vec<Handle> {
    let context = QualName::new(
        None,
        Namespace::from(HTML_NAMESPACE),
        LocalName::from("body"),
    );
    let dom = parse_fragment(RcDom::default(), Default::default(), context, vec![]).one(html);

    // The fragment lands under a synthetic <html> element.
    let container = dom
        .document
        .children
        .borrow()
        .iter()
        .find(|node| is_element(node))
        .cloned();
    let Some(container) = container else {
        return Vec::new();
    };
    let nodes: Vec<Handle> = container.children.borrow_mut().drain(..).collect();
    for node in &nodes {
        node.parent.set(None);
    }
    nodes
}

// ═══════════════════════════════════════════════════════════════════════════════
// NODES
// ═══════════════════════════════════════════════════════════════════════════════

fn qual_name(name: &str, namespace: &str) -> QualName {
    QualName::new(None, Namespace::from(namespace), LocalName::from(name))
}

pub fn create_element(tag: &str) -> Handle {
    Node::new(NodeData::Element {
        name: qual_name(&tag.to_ascii_lowercase(), HTML_NAMESPACE),
        attrs: RefCell::new(Vec::new()),
        template_contents: RefCell::new(None),
        mathml_annotation_xml_integration_point: false,
    })
}

pub fn create_text(text: &str) -> Handle {
    Node::new(NodeData::Text {
        contents: RefCell::new(StrTendril::from(text)),
    })
}

pub fn is_element(node: &Handle) -> bool {
    matches!(node.data, NodeData::Element { .. })
}

pub fn is_text(node: &Handle) -> bool {
    matches!(node.data, NodeData::Text { .. })
}

pub fn tag_name(node: &Handle) -> Option<String> {
    match &node.data {
        NodeData::Element { name, .. } => Some(name.local.to_string()),
        _ => None,
    }
}

pub fn parent_of(node: &Handle) -> Option<Handle> {
    let weak = node.parent.take();
    let parent = weak.as_ref().and_then(|w| w.upgrade());
    node.parent.set(weak);
    parent
}

pub fn children_of(node: &Handle) -> Vec<Handle> {
    node.children.borrow().clone()
}

/// Preorder descendants, excluding `node`.
pub fn descendants(node: &Handle) -> Vec<Handle> {
    let mut out = Vec::new();
    let mut stack: Vec<Handle> = node.children.borrow().iter().rev().cloned().collect();
    while let Some(next) = stack.pop() {
        stack.extend(next.children.borrow().iter().rev().cloned());
        out.push(next);
    }
    out
}

pub fn detach(node: &Handle) {
    if let Some(parent) = parent_of(node) {
        parent
            .children
            .borrow_mut()
            .retain(|child| !Rc::ptr_eq(child, node));
    }
    node.parent.set(None);
}

pub fn append_child(parent: &Handle, child: &Handle) {
    detach(child);
    child.parent.set(Some(Rc::downgrade(parent)));
    parent.children.borrow_mut().push(child.clone());
}

pub fn clear_children(node: &Handle) {
    for child in node.children.borrow_mut().drain(..) {
        child.parent.set(None);
    }
}

/// Puts `replacements` where `old` is and detaches `old`. Returns false when
/// `old` has no parent.
pub fn replace_with(old: &Handle, replacements: &[Handle]) -> bool {
    let Some(parent) = parent_of(old) else {
        return false;
    };
    for node in replacements {
        detach(node);
    }
    let mut children = parent.children.borrow_mut();
    let Some(index) = children.iter().position(|child| Rc::ptr_eq(child, old)) else {
        return false;
    };
    children.splice(index..=index, replacements.iter().cloned());
    for node in replacements {
        node.parent.set(Some(Rc::downgrade(&parent)));
    }
    old.parent.set(None);
    true
}

pub fn get_attribute(node: &Handle, name: &str) -> Option<String> {
    match &node.data {
        NodeData::Element { attrs, .. } => attrs
            .borrow()
            .iter()
            .find(|attr| (*attr.name.local).eq_ignore_ascii_case(name))
            .map(|attr| attr.value.to_string()),
        _ => None,
    }
}

pub fn attributes(node: &Handle) -> Vec<(String, String)> {
    match &node.data {
        NodeData::Element { attrs, .. } => attrs
            .borrow()
            .iter()
            .map(|attr| (attr.name.local.to_string(), attr.value.to_string()))
            .collect(),
        _ => Vec::new(),
    }
}

pub fn set_attribute(node: &Handle, name: &str, value: &str) {
    let NodeData::Element { attrs, .. } = &node.data else {
        return;
    };
    let mut attrs = attrs.borrow_mut();
    match attrs
        .iter_mut()
        .find(|attr| (*attr.name.local).eq_ignore_ascii_case(name))
    {
        Some(attr) => attr.value = StrTendril::from(value),
        None => attrs.push(Attribute {
            name: qual_name(&name.to_ascii_lowercase(), ""),
            value: StrTendril::from(value),
        }),
    }
}

pub fn remove_attribute(node: &Handle, name: &str) {
    if let NodeData::Element { attrs, .. } = &node.data {
        attrs
            .borrow_mut()
            .retain(|attr| !(*attr.name.local).eq_ignore_ascii_case(name));
    }
}

/// Text nodes get their contents replaced; elements get a single text child.
pub fn set_text(node: &Handle, text: &str) {
    match &node.data {
        NodeData::Text { contents } => *contents.borrow_mut() = StrTendril::from(text),
        NodeData::Element { .. } => {
            clear_children(node);
            append_child(node, &create_text(text));
        }
        _ => {}
    }
}

pub fn text_content(node: &Handle) -> String {
    match &node.data {
        NodeData::Text { contents } => contents.borrow().to_string(),
        _ => descendants(node)
            .iter()
            .filter_map(|child| match &child.data {
                NodeData::Text { contents } => Some(contents.borrow().to_string()),
                _ => None,
            })
            .collect(),
    }
}

fn serialize_node(node: &Handle, scope: TraversalScope) -> String {
    let mut out = Vec::new();
    let opts = SerializeOpts {
        traversal_scope: scope,
        ..Default::default()
    };
    match serialize(&mut out, &SerializableHandle::from(node.clone()), opts) {
        Ok(()) => String::from_utf8_lossy(&out).into_owned(),
        Err(_) => String::new(),
    }
}

pub fn outer_html(node: &Handle) -> String {
    match node.data {
        NodeData::Document => inner_html(node),
        _ => serialize_node(node, TraversalScope::IncludeNode),
    }
}

pub fn inner_html(node: &Handle) -> String {
    serialize_node(node, TraversalScope::ChildrenOnly(None))
}

// ═══════════════════════════════════════════════════════════════════════════════
// SELECTORS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default, PartialEq)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<(String, Option<String>)>,
}

impl Compound {
    fn matches(&self, node: &Handle) -> bool {
        let Some(tag) = tag_name(node) else {
            return false;
        };
        if let Some(expected) = &self.tag {
            if !expected.eq_ignore_ascii_case(&tag) {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if get_attribute(node, "id").as_deref() != Some(id.as_str()) {
                return false;
            }
        }
        if !self.classes.is_empty() {
            let class = get_attribute(node, "class").unwrap_or_default();
            let present: Vec<&str> = class.split_whitespace().collect();
            if !self.classes.iter().all(|c| present.contains(&c.as_str())) {
                return false;
            }
        }
        self.attrs.iter().all(|(name, value)| {
            match (get_attribute(node, name), value) {
                (None, _) => false,
                (Some(_), None) => true,
                (Some(actual), Some(expected)) => &actual == expected,
            }
        })
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_'
}

fn parse_selector_list(selector: &str) -> Result<Vec<Compound>, SelectorError> {
    selector
        .split(',')
        .map(|part| parse_compound(part.trim()).ok_or_else(|| SelectorError(selector.to_string())))
        .collect()
}

fn parse_compound(text: &str) -> Option<Compound> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return None;
    }
    let mut compound = Compound::default();
    let mut i = 0;

    let ident = |i: &mut usize| -> Option<String> {
        let start = *i;
        while *i < chars.len() && is_ident_char(chars[*i]) {
            *i += 1;
        }
        (start < *i).then(|| chars[start..*i].iter().collect())
    };

    if chars[0] == '*' {
        i = 1;
    } else if is_ident_char(chars[0]) {
        compound.tag = Some(ident(&mut i)?);
    }

    while i < chars.len() {
        match chars[i] {
            '#' => {
                i += 1;
                compound.id = Some(ident(&mut i)?);
            }
            '.' => {
                i += 1;
                compound.classes.push(ident(&mut i)?);
            }
            '[' => {
                i += 1;
                let name = ident(&mut i)?;
                let value = if chars.get(i) == Some(&'=') {
                    i += 1;
                    let value: String = match chars.get(i) {
                        Some(&quote) if quote == '"' || quote == '\'' => {
                            let start = i + 1;
                            let end = start + chars[start..].iter().position(|c| *c == quote)?;
                            i = end + 1;
                            chars[start..end].iter().collect()
                        }
                        _ => ident(&mut i)?,
                    };
                    Some(value)
                } else {
                    None
                };
                if chars.get(i) != Some(&']') {
                    return None;
                }
                i += 1;
                compound.attrs.push((name.to_ascii_lowercase(), value));
            }
            _ => return None,
        }
    }
    Some(compound)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<!DOCTYPE html><html><head><title>t</title></head><body><div id="app" class="shell main"><p data-role="x">hi</p></div></body></html>"#;

    #[test]
    fn test_query_selector_forms() {
        let doc = Document::parse(PAGE);
        for selector in ["#app", "div", ".shell", "div.main#app", "[data-role]", "p[data-role=x]", "p[data-role='x']", "*"] {
            assert!(doc.query_selector(selector).unwrap().is_some(), "{}", selector);
        }
        assert!(doc.query_selector("#missing").unwrap().is_none());
        assert_eq!(
            tag_name(&doc.query_selector("#nope, p").unwrap().unwrap()).as_deref(),
            Some("p")
        );
    }

    #[test]
    fn test_unsupported_selector() {
        let doc = Document::parse(PAGE);
        assert!(doc.query_selector("div p").is_err());
        assert!(doc.query_selector("div > p").is_err());
        assert!(doc.query_selector("").is_err());
    }

    #[test]
    fn test_fragment_nodes_are_detached() {
        let nodes = parse_fragment_nodes("<p>a</p> <span>b</span>");
        assert_eq!(nodes.len(), 3);
        assert!(nodes.iter().all(|n| parent_of(n).is_none()));
        assert_eq!(outer_html(&nodes[2]), "<span>b</span>");
    }

    #[test]
    fn test_replace_with_keeps_position() {
        let parent = create_element("div");
        let a = create_element("a");
        let b = create_element("b");
        let c = create_element("i");
        append_child(&parent, &a);
        append_child(&parent, &b);
        assert!(replace_with(&a, &[c.clone()]));
        assert_eq!(inner_html(&parent), "<i></i><b></b>");
        assert!(parent_of(&a).is_none());
        assert!(Rc::ptr_eq(&parent_of(&c).unwrap(), &parent));
    }

    #[test]
    fn test_attributes() {
        let el = create_element("input");
        set_attribute(&el, "value", "1");
        set_attribute(&el, "value", "2");
        assert_eq!(get_attribute(&el, "value").as_deref(), Some("2"));
        set_attribute(&el, "VALUE", "3");
        assert_eq!(get_attribute(&el, "Value").as_deref(), Some("3"));
        assert_eq!(attributes(&el).len(), 1);
        remove_attribute(&el, "vAlUe");
        assert_eq!(outer_html(&el), "<input>");
    }

    #[test]
    fn test_inject_style_dedupes_by_content() {
        let doc = Document::parse(PAGE);
        assert!(doc.inject_style("p { color: red; }"));
        assert!(!doc.inject_style("p { color: red; }"));
        assert!(doc.inject_style("a { color: blue; }"));
        assert_eq!(
            doc.style_sheet().unwrap(),
            "p { color: red; }\na { color: blue; }"
        );
        let head = doc.head().unwrap();
        assert_eq!(
            descendants(&head)
                .iter()
                .filter(|n| tag_name(n).as_deref() == Some("style"))
                .count(),
            1
        );
    }
}
