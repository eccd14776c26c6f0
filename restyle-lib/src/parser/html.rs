//! Markup parsing into the owned DOM tree.
//!
//! html5ever drives a custom TreeSink; the resulting tree keeps parent and
//! sibling pointers so selectors can be matched right-to-left later without
//! re-walking the whole document.

use crate::dom::dom_tree;
use html5ever::tendril::{StrTendril, TendrilSink};
use html5ever::{
    interface::{ElemName, NodeOrText, QuirksMode, TreeSink},
    LocalName, Namespace, QualName,
};
use std::cell::RefCell;
use std::rc::Rc;

/// Parses markup into a Document. html5ever recovers from malformed input,
/// so this never fails; the worst case is a tree that differs from what the
/// author intended.
pub fn parse_markup(markup: &str) -> dom_tree::Document {
    let sink = StyleTreeSink::new();
    html5ever::parse_document(sink, Default::default()).one(markup.to_string())
}

/// TreeSink building the owned DOM used across the engine.
///
/// Holds the Document under construction, a stack of open nodes, and the
/// current quirks mode.
pub struct StyleTreeSink {
    document: dom_tree::Document,
    stack: RefCell<Vec<Rc<RefCell<dom_tree::Node>>>>,
    quirks_mode: RefCell<QuirksMode>,
}

impl StyleTreeSink {
    pub fn new() -> Self {
        let document = dom_tree::new_document();
        let root = document.root.clone();
        Self {
            document,
            stack: RefCell::new(vec![root]),
            quirks_mode: RefCell::new(QuirksMode::NoQuirks),
        }
    }
}

impl Default for StyleTreeSink {
    fn default() -> Self {
        Self::new()
    }
}

/// Element name view handed back to html5ever.
#[derive(Debug)]
pub struct SinkElemName {
    ns: Namespace,
    local: LocalName,
}

impl ElemName for SinkElemName {
    fn local_name(&self) -> &LocalName {
        &self.local
    }

    fn ns(&self) -> &Namespace {
        &self.ns
    }
}

impl TreeSink for StyleTreeSink {
    type Handle = Rc<RefCell<dom_tree::Node>>;
    type Output = dom_tree::Document;
    type ElemName<'a>
        = SinkElemName
    where
        Self: 'a;

    fn finish(self) -> Self::Output {
        self.document
    }

    fn parse_error(&self, msg: std::borrow::Cow<'static, str>) {
        log::debug!("markup parse error: {}", msg);
    }

    fn get_document(&self) -> Self::Handle {
        self.document.root.clone()
    }

    fn elem_name<'a>(&'a self, target: &'a Self::Handle) -> Self::ElemName<'a> {
        if let dom_tree::Node::Element(ref elem) = *target.borrow() {
            SinkElemName {
                ns: elem.qual_name.ns.clone(),
                local: elem.qual_name.local.clone(),
            }
        } else {
            panic!("elem_name called on non-element node")
        }
    }

    fn create_element(
        &self,
        name: QualName,
        attrs: Vec<html5ever::Attribute>,
        _flags: html5ever::interface::ElementFlags,
    ) -> Self::Handle {
        let tag = name.local.to_string();
        let mut element = dom_tree::ElementNode::new(tag, name);
        for attr in attrs {
            let key = attr.name.local.to_string();
            // Duplicate attributes are invalid markup; first one wins,
            // same as the browser.
            if element.attribute(&key).is_none() {
                element.attributes.push((key, attr.value.to_string()));
            }
        }
        Rc::new(RefCell::new(dom_tree::Node::Element(element)))
    }

    fn create_comment(&self, text: html5ever::tendril::StrTendril) -> Self::Handle {
        Rc::new(RefCell::new(dom_tree::Node::Comment(text.to_string())))
    }

    fn create_pi(&self, target: StrTendril, data: StrTendril) -> Self::Handle {
        let combined = format!("{} {}", target, data);
        Rc::new(RefCell::new(dom_tree::Node::Comment(combined)))
    }

    fn append(&self, parent: &Self::Handle, child: NodeOrText<Self::Handle>) {
        let child_node = match child {
            NodeOrText::AppendNode(node) => node,
            NodeOrText::AppendText(text) => {
                // Consecutive text chunks are merged into one node so the
                // serialized output does not fragment runs of text.
                if let Some(merged) = append_text_to_last_child(parent, &text) {
                    if merged {
                        return;
                    }
                }
                Rc::new(RefCell::new(dom_tree::Node::Text(text.to_string())))
            }
        };

        // Wire parent and sibling pointers before pushing into the child
        // list; only elements take part in sibling chains.
        if let dom_tree::Node::Element(ref mut child_elem) = *child_node.borrow_mut() {
            child_elem.parent = Some(Rc::downgrade(parent));
        }
        let mut parent_borrow = parent.borrow_mut();
        let children = match &mut *parent_borrow {
            dom_tree::Node::DocumentRoot(root) => &mut root.children,
            dom_tree::Node::Element(elem) => &mut elem.children,
            _ => return,
        };
        if let Some(prev_element) = children
            .iter()
            .rev()
            .find(|c| matches!(*c.borrow(), dom_tree::Node::Element(_)))
        {
            let both_elements = matches!(*child_node.borrow(), dom_tree::Node::Element(_));
            if both_elements {
                if let dom_tree::Node::Element(ref mut child_elem) = *child_node.borrow_mut() {
                    child_elem.prev_sibling = Some(Rc::downgrade(prev_element));
                }
                if let dom_tree::Node::Element(ref mut prev_elem) = *prev_element.borrow_mut() {
                    prev_elem.next_sibling = Some(child_node.clone());
                }
            }
        }
        children.push(child_node.clone());
        drop(parent_borrow);

        if matches!(*child_node.borrow(), dom_tree::Node::Element(_)) {
            self.stack.borrow_mut().push(child_node);
        }
    }

    fn append_based_on_parent_node(
        &self,
        _element: &Self::Handle,
        _prev_element: &Self::Handle,
        _child: NodeOrText<Self::Handle>,
    ) {
    }

    fn append_doctype_to_document(
        &self,
        name: StrTendril,
        public_id: StrTendril,
        system_id: StrTendril,
    ) {
        *self.document.doctype.borrow_mut() = Some(dom_tree::Doctype {
            name: name.to_string(),
            public_id: public_id.to_string(),
            system_id: system_id.to_string(),
        });
    }

    fn mark_script_already_started(&self, _node: &Self::Handle) {}

    fn pop(&self, _node: &Self::Handle) {
        self.stack.borrow_mut().pop();
    }

    fn get_template_contents(&self, target: &Self::Handle) -> Self::Handle {
        target.clone()
    }

    fn same_node(&self, x: &Self::Handle, y: &Self::Handle) -> bool {
        Rc::ptr_eq(x, y)
    }

    fn set_quirks_mode(&self, mode: QuirksMode) {
        *self.quirks_mode.borrow_mut() = mode;
    }

    fn append_before_sibling(&self, _sibling: &Self::Handle, _child: NodeOrText<Self::Handle>) {}

    fn add_attrs_if_missing(&self, target: &Self::Handle, attrs: Vec<html5ever::Attribute>) {
        if let dom_tree::Node::Element(ref mut elem) = *target.borrow_mut() {
            for attr in attrs {
                let key = attr.name.local.to_string();
                if elem.attribute(&key).is_none() {
                    elem.attributes.push((key, attr.value.to_string()));
                }
            }
        }
    }

    fn remove_from_parent(&self, _target: &Self::Handle) {}

    fn reparent_children(&self, _node: &Self::Handle, _new_parent: &Self::Handle) {}
}

/// Returns Some(true) when the text was merged into an existing trailing
/// text node, Some(false) when the parent can take children but the last
/// child is not text, None when the parent cannot take children.
fn append_text_to_last_child(
    parent: &Rc<RefCell<dom_tree::Node>>,
    text: &str,
) -> Option<bool> {
    let parent_borrow = parent.borrow();
    let children = match &*parent_borrow {
        dom_tree::Node::DocumentRoot(root) => &root.children,
        dom_tree::Node::Element(elem) => &elem.children,
        _ => return None,
    };
    let last = children.last()?.clone();
    drop(parent_borrow);
    if let dom_tree::Node::Text(ref mut existing) = *last.borrow_mut() {
        existing.push_str(text);
        return Some(true);
    }
    Some(false)
}
