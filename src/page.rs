//! Live in-memory document tree.
//!
//! The page is owned by its host: the pipeline only ever keeps
//! [`ElementHandle`]s, which stop resolving once the host drops or detaches
//! the element.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use scraper::Html;
use url::Url;

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];

const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

/// Layout box of an element relative to the top of the viewport.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub top: f64,
    pub bottom: f64,
}

#[derive(Debug)]
enum Kind {
    Document,
    Element(String),
    Text(String),
    Comment(String),
}

struct NodeData {
    kind: Kind,
    attrs: RefCell<Vec<(String, String)>>,
    children: RefCell<Vec<Rc<NodeData>>>,
    parent: RefCell<Weak<NodeData>>,
    layout: Cell<Option<Rect>>,
    mutations: Rc<Cell<u64>>,
}

impl NodeData {
    fn new(kind: Kind, attrs: Vec<(String, String)>, mutations: &Rc<Cell<u64>>) -> Rc<Self> {
        Rc::new(Self {
            kind,
            attrs: RefCell::new(attrs),
            children: RefCell::new(Vec::new()),
            parent: RefCell::new(Weak::new()),
            layout: Cell::new(None),
            mutations: Rc::clone(mutations),
        })
    }

    fn element_name(&self) -> Option<&str> {
        match &self.kind {
            Kind::Element(name) => Some(name),
            _ => None,
        }
    }

    fn bump(&self) {
        self.mutations.set(self.mutations.get() + 1);
    }
}

impl fmt::Debug for NodeData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeData")
            .field("kind", &self.kind)
            .field("attrs", &self.attrs.borrow())
            .field("children", &self.children.borrow().len())
            .finish()
    }
}

/// A strong reference to an element. Only the page and short-lived locals
/// should hold these.
#[derive(Debug, Clone)]
pub struct Element(Rc<NodeData>);

/// A weak, non-owning reference to an element.
#[derive(Debug, Clone, Default)]
pub struct ElementHandle(Weak<NodeData>);

impl ElementHandle {
    /// Resolves the handle if the element still exists and is attached to
    /// its document.
    pub fn upgrade(&self) -> Option<Element> {
        self.0
            .upgrade()
            .map(Element)
            .filter(Element::is_connected)
    }

    pub fn is_live(&self) -> bool {
        self.upgrade().is_some()
    }
}

impl PartialEq for Element {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Element {}

impl Element {
    pub fn name(&self) -> &str {
        self.0.element_name().unwrap_or_default()
    }

    pub fn handle(&self) -> ElementHandle {
        ElementHandle(Rc::downgrade(&self.0))
    }

    pub fn attr(&self, name: &str) -> Option<String> {
        self.0
            .attrs
            .borrow()
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.clone())
    }

    /// Writes an attribute unconditionally. Callers that care about churn
    /// compare with [`Element::attr`] first.
    pub fn set_attr(&self, name: &str, value: &str) {
        {
            let mut attrs = self.0.attrs.borrow_mut();
            match attrs.iter_mut().find(|(key, _)| key == name) {
                Some((_, current)) => *current = value.to_string(),
                None => attrs.push((name.to_string(), value.to_string())),
            }
        }
        self.0.bump();
    }

    pub fn remove_attr(&self, name: &str) -> bool {
        let removed = {
            let mut attrs = self.0.attrs.borrow_mut();
            let before = attrs.len();
            attrs.retain(|(key, _)| key != name);
            attrs.len() != before
        };
        if removed {
            self.0.bump();
        }
        removed
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .map(|classes| classes.split_whitespace().any(|c| c == class))
            .unwrap_or(false)
    }

    /// Adds a class unless it is already present.
    pub fn add_class(&self, class: &str) -> bool {
        if self.has_class(class) {
            return false;
        }
        let classes = match self.attr("class") {
            Some(current) if !current.trim().is_empty() => format!("{} {}", current.trim(), class),
            _ => class.to_string(),
        };
        self.set_attr("class", &classes);
        true
    }

    /// Removes a class if it is present.
    pub fn remove_class(&self, class: &str) -> bool {
        if !self.has_class(class) {
            return false;
        }
        let classes = self
            .attr("class")
            .unwrap_or_default()
            .split_whitespace()
            .filter(|c| *c != class)
            .collect::<Vec<_>>()
            .join(" ");
        self.set_attr("class", &classes);
        true
    }

    /// All descendant elements with the given tag, in document order,
    /// excluding `self`.
    pub fn descendants(&self, tag: &str) -> Vec<Element> {
        let mut found = Vec::new();
        collect_elements(&self.0, tag, &mut found);
        found
    }

    pub fn find_descendant(&self, tag: &str, class: &str) -> Option<Element> {
        self.descendants(tag)
            .into_iter()
            .find(|el| el.has_class(class))
    }

    pub fn children(&self) -> Vec<Element> {
        self.0
            .children
            .borrow()
            .iter()
            .filter(|child| child.element_name().is_some())
            .map(|child| Element(Rc::clone(child)))
            .collect()
    }

    pub fn text(&self) -> String {
        let mut out = String::new();
        collect_text(&self.0, &mut out);
        out
    }

    pub fn append_child(&self, child: &Element) {
        child.detach_silently();
        *child.0.parent.borrow_mut() = Rc::downgrade(&self.0);
        self.0.children.borrow_mut().push(Rc::clone(&child.0));
        self.0.bump();
    }

    pub fn append_text(&self, text: &str) {
        let node = NodeData::new(Kind::Text(text.to_string()), Vec::new(), &self.0.mutations);
        *node.parent.borrow_mut() = Rc::downgrade(&self.0);
        self.0.children.borrow_mut().push(node);
        self.0.bump();
    }

    /// Detaches the element from its parent. The page drops its strong
    /// reference, so outstanding handles stop resolving.
    pub fn remove(&self) {
        if self.detach_silently() {
            self.0.bump();
        }
    }

    fn detach_silently(&self) -> bool {
        let parent = self.0.parent.replace(Weak::new()).upgrade();
        match parent {
            Some(parent) => {
                parent
                    .children
                    .borrow_mut()
                    .retain(|child| !Rc::ptr_eq(child, &self.0));
                true
            }
            None => false,
        }
    }

    /// Whether the element is still attached to a document root.
    pub fn is_connected(&self) -> bool {
        let mut current = Rc::clone(&self.0);
        loop {
            if matches!(current.kind, Kind::Document) {
                return true;
            }
            let parent = current.parent.borrow().upgrade();
            match parent {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    pub fn layout(&self) -> Option<Rect> {
        self.0.layout.get()
    }

    pub fn set_layout(&self, rect: Option<Rect>) {
        self.0.layout.set(rect);
    }
}

fn collect_elements(node: &Rc<NodeData>, tag: &str, out: &mut Vec<Element>) {
    for child in node.children.borrow().iter() {
        if child.element_name() == Some(tag) {
            out.push(Element(Rc::clone(child)));
        }
        collect_elements(child, tag, out);
    }
}

fn collect_text(node: &Rc<NodeData>, out: &mut String) {
    for child in node.children.borrow().iter() {
        match &child.kind {
            Kind::Text(text) => out.push_str(text),
            _ => collect_text(child, out),
        }
    }
}

/// The document a user is looking at.
#[derive(Debug, Clone)]
pub struct Page {
    root: Rc<NodeData>,
    base_url: Url,
    viewport_height: Rc<Cell<Option<f64>>>,
    mutations: Rc<Cell<u64>>,
}

impl Page {
    /// Builds a page from an HTML document. `base_url` is the address the
    /// document was loaded from and is used to resolve relative links.
    pub fn parse(source: &str, base_url: Url) -> Self {
        let html = Html::parse_document(source);
        let mutations = Rc::new(Cell::new(0));
        let root = NodeData::new(Kind::Document, Vec::new(), &mutations);

        let mut built = HashMap::new();
        for node in html.tree.root().descendants() {
            let (kind, attrs) = match node.value() {
                scraper::Node::Document => {
                    built.insert(node.id(), Rc::clone(&root));
                    continue;
                }
                scraper::Node::Element(el) => (
                    Kind::Element(el.name().to_string()),
                    el.attrs()
                        .map(|(key, value)| (key.to_string(), value.to_string()))
                        .collect(),
                ),
                scraper::Node::Text(text) => {
                    let text: &str = text;
                    (Kind::Text(text.to_string()), Vec::new())
                }
                scraper::Node::Comment(comment) => {
                    let comment: &str = comment;
                    (Kind::Comment(comment.to_string()), Vec::new())
                }
                _ => continue,
            };
            let Some(parent) = node.parent().and_then(|p| built.get(&p.id()).cloned()) else {
                continue;
            };
            let data = NodeData::new(kind, attrs, &mutations);
            *data.parent.borrow_mut() = Rc::downgrade(&parent);
            parent.children.borrow_mut().push(Rc::clone(&data));
            built.insert(node.id(), data);
        }

        Self {
            root,
            base_url,
            viewport_height: Rc::new(Cell::new(None)),
            mutations,
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolves an href the way a browser reports `link.href`.
    pub fn resolve(&self, href: &str) -> Option<Url> {
        self.base_url.join(href).ok()
    }

    /// All elements with the given tag, in document order.
    pub fn select(&self, tag: &str) -> Vec<Element> {
        let mut found = Vec::new();
        collect_elements(&self.root, tag, &mut found);
        found
    }

    pub fn head(&self) -> Option<Element> {
        self.select("head").into_iter().next()
    }

    pub fn body(&self) -> Option<Element> {
        self.select("body").into_iter().next()
    }

    /// Creates a detached element owned by this document.
    pub fn create_element(&self, name: &str, attrs: &[(&str, &str)]) -> Element {
        let attrs = attrs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        Element(NodeData::new(
            Kind::Element(name.to_string()),
            attrs,
            &self.mutations,
        ))
    }

    pub fn set_viewport_height(&self, height: Option<f64>) {
        self.viewport_height.set(height);
    }

    /// Whether the element is entirely inside the viewport. Without layout
    /// information every element counts as visible.
    pub fn is_fully_visible(&self, element: &Element) -> bool {
        match (element.layout(), self.viewport_height.get()) {
            (Some(rect), Some(height)) => rect.top >= 0.0 && rect.bottom <= height,
            _ => true,
        }
    }

    /// Number of mutations applied to the document since it was parsed.
    pub fn mutation_count(&self) -> u64 {
        self.mutations.get()
    }

    pub fn to_html(&self) -> String {
        let mut out = String::from("<!DOCTYPE html>");
        for child in self.root.children.borrow().iter() {
            write_node(child, false, &mut out);
        }
        out
    }
}

fn write_node(node: &Rc<NodeData>, raw_text: bool, out: &mut String) {
    match &node.kind {
        Kind::Document => {}
        Kind::Text(text) => {
            if raw_text {
                out.push_str(text);
            } else {
                out.push_str(&escape_text(text));
            }
        }
        Kind::Comment(comment) => {
            out.push_str("<!--");
            out.push_str(comment);
            out.push_str("-->");
        }
        Kind::Element(name) => {
            out.push('<');
            out.push_str(name);
            for (key, value) in node.attrs.borrow().iter() {
                out.push(' ');
                out.push_str(key);
                out.push_str("=\"");
                out.push_str(&escape_attr(value));
                out.push('"');
            }
            out.push('>');
            if VOID_ELEMENTS.contains(&name.as_str()) {
                return;
            }
            let raw = RAW_TEXT_ELEMENTS.contains(&name.as_str());
            for child in node.children.borrow().iter() {
                write_node(child, raw, out);
            }
            out.push_str("</");
            out.push_str(name);
            out.push('>');
        }
    }
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn escape_attr(value: &str) -> String {
    value.replace('&', "&amp;").replace('"', "&quot;")
}
