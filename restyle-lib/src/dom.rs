use html5ever::QualName;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

pub mod dom_tree {
    use super::*;

    /// Shared handle to a DOM node.
    pub type NodeHandle = Rc<RefCell<Node>>;

    #[derive(Debug, Clone)]
    pub enum Node {
        DocumentRoot(DocumentRootNode),
        Element(ElementNode),
        Text(String),
        Comment(String),
    }

    #[derive(Debug, Clone, Default)]
    pub struct DocumentRootNode {
        pub children: Vec<NodeHandle>,
    }

    #[derive(Debug, Clone)]
    pub struct ElementNode {
        pub tag: String,
        pub qual_name: QualName,
        /// Attributes in source order. Order matters: a re-serialized
        /// document must come out the same way every time.
        pub attributes: Vec<(String, String)>,
        pub children: Vec<NodeHandle>,
        pub parent: Option<Weak<RefCell<Node>>>,
        pub prev_sibling: Option<Weak<RefCell<Node>>>,
        pub next_sibling: Option<NodeHandle>,
    }

    #[derive(Debug)]
    pub struct Document {
        pub root: NodeHandle,
        pub doctype: RefCell<Option<Doctype>>,
    }

    #[derive(Debug)]
    pub struct Doctype {
        pub name: String,
        pub public_id: String,
        pub system_id: String,
    }

    impl DocumentRootNode {
        pub fn new() -> Self {
            DocumentRootNode {
                children: Vec::new(),
            }
        }
    }

    impl ElementNode {
        pub fn new(tag: String, qual_name: QualName) -> Self {
            ElementNode {
                tag,
                qual_name,
                attributes: Vec::new(),
                children: Vec::new(),
                parent: None,
                prev_sibling: None,
                next_sibling: None,
            }
        }

        pub fn attribute(&self, name: &str) -> Option<&str> {
            self.attributes
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str())
        }

        /// Overwrites an existing attribute in place, otherwise appends.
        pub fn set_attribute(&mut self, name: &str, value: String) {
            if let Some(slot) = self.attributes.iter_mut().find(|(k, _)| k == name) {
                slot.1 = value;
            } else {
                self.attributes.push((name.to_string(), value));
            }
        }

        pub fn remove_attribute(&mut self, name: &str) {
            self.attributes.retain(|(k, _)| k != name);
        }

        pub fn id(&self) -> Option<&str> {
            self.attribute("id").filter(|v| !v.is_empty())
        }

        pub fn class_list(&self) -> Vec<String> {
            self.attribute("class")
                .map(|v| v.split_whitespace().map(|c| c.to_string()).collect())
                .unwrap_or_default()
        }

        /// Inline `style` attribute parsed into (property, value) pairs,
        /// declaration order preserved.
        pub fn style_pairs(&self) -> Vec<(String, String)> {
            let Some(style) = self.attribute("style") else {
                return Vec::new();
            };
            style
                .split(';')
                .filter_map(|decl| {
                    let (prop, value) = decl.split_once(':')?;
                    let prop = prop.trim();
                    if prop.is_empty() {
                        return None;
                    }
                    Some((prop.to_string(), value.trim().to_string()))
                })
                .collect()
        }

        /// Writes one declaration into the inline `style` attribute,
        /// overwriting the property in place when already present.
        pub fn set_style_property(&mut self, property: &str, value: &str) {
            let mut pairs = self.style_pairs();
            if let Some(slot) = pairs.iter_mut().find(|(p, _)| p == property) {
                slot.1 = value.to_string();
            } else {
                pairs.push((property.to_string(), value.to_string()));
            }
            self.set_attribute("style", render_style_pairs(&pairs));
        }

        /// Drops one declaration; removes the attribute when the last
        /// declaration goes away.
        pub fn remove_style_property(&mut self, property: &str) {
            let mut pairs = self.style_pairs();
            pairs.retain(|(p, _)| p != property);
            if pairs.is_empty() {
                self.remove_attribute("style");
            } else {
                self.set_attribute("style", render_style_pairs(&pairs));
            }
        }
    }

    fn render_style_pairs(pairs: &[(String, String)]) -> String {
        pairs
            .iter()
            .map(|(k, v)| format!("{}: {}", k, v))
            .collect::<Vec<_>>()
            .join("; ")
    }

    pub fn new_document() -> Document {
        Document {
            root: Rc::new(RefCell::new(Node::DocumentRoot(DocumentRootNode::new()))),
            doctype: RefCell::new(None),
        }
    }

    /// Concatenated text of the node and all descendants.
    pub fn text_content(node: &NodeHandle) -> String {
        let mut out = String::new();
        collect_text(node, &mut out);
        out
    }

    fn collect_text(node: &NodeHandle, out: &mut String) {
        match &*node.borrow() {
            Node::DocumentRoot(root) => {
                for child in &root.children {
                    collect_text(child, out);
                }
            }
            Node::Element(elem) => {
                for child in &elem.children {
                    collect_text(child, out);
                }
            }
            Node::Text(text) => out.push_str(text),
            Node::Comment(_) => {}
        }
    }

    /// Replaces an element's children with a single text node.
    /// Non-element nodes are left alone.
    pub fn set_text_content(node: &NodeHandle, text: &str) {
        if let Node::Element(ref mut elem) = *node.borrow_mut() {
            elem.children.clear();
            elem.children
                .push(Rc::new(RefCell::new(Node::Text(text.to_string()))));
        }
    }

    /// Pre-order traversal over every element in the document.
    pub fn for_each_element<F: FnMut(&NodeHandle)>(document: &Document, mut visit: F) {
        walk(&document.root, &mut visit);
    }

    fn walk<F: FnMut(&NodeHandle)>(node: &NodeHandle, visit: &mut F) {
        // The borrow is released before `visit` runs so the callback may
        // borrow the node again, mutably or not.
        let children = match &*node.borrow() {
            Node::DocumentRoot(root) => Some(root.children.clone()),
            Node::Element(elem) => Some(elem.children.clone()),
            _ => None,
        };
        let Some(children) = children else {
            return;
        };
        if matches!(&*node.borrow(), Node::Element(_)) {
            visit(node);
        }
        for child in &children {
            walk(child, visit);
        }
    }

    /// First element with the given tag name, in document order.
    pub fn find_element_by_tag(document: &Document, tag: &str) -> Option<NodeHandle> {
        let mut found = None;
        for_each_element(document, |node| {
            if found.is_some() {
                return;
            }
            if let Node::Element(ref elem) = *node.borrow() {
                if elem.tag.eq_ignore_ascii_case(tag) {
                    found = Some(Rc::clone(node));
                }
            }
        });
        found
    }
}

#[cfg(test)]
mod tests {
    use super::dom_tree::*;
    use html5ever::{namespace_url, ns, LocalName, QualName};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn element(tag: &str) -> ElementNode {
        ElementNode::new(
            tag.to_string(),
            QualName::new(None, ns!(html), LocalName::from(tag)),
        )
    }

    #[test]
    fn style_attribute_overwrites_in_place() {
        let mut elem = element("div");
        elem.set_style_property("color", "red");
        elem.set_style_property("font-size", "12px");
        elem.set_style_property("color", "blue");
        assert_eq!(elem.attribute("style"), Some("color: blue; font-size: 12px"));
    }

    #[test]
    fn removing_last_style_property_drops_attribute() {
        let mut elem = element("p");
        elem.set_style_property("color", "red");
        elem.remove_style_property("color");
        assert_eq!(elem.attribute("style"), None);
    }

    #[test]
    fn text_content_concatenates_descendants() {
        let mut parent = element("p");
        let mut strong = element("strong");
        strong
            .children
            .push(Rc::new(RefCell::new(Node::Text("bold".into()))));
        parent
            .children
            .push(Rc::new(RefCell::new(Node::Text("plain ".into()))));
        parent
            .children
            .push(Rc::new(RefCell::new(Node::Element(strong))));
        let handle = Rc::new(RefCell::new(Node::Element(parent)));
        assert_eq!(text_content(&handle), "plain bold");
    }
}
