//! Serialization of the owned DOM back to markup text.

use crate::dom::dom_tree::{Document, Node, NodeHandle};

/// Void (self-closing) elements; they take no children and no end tag.
const VOID_ELEMENTS: &[&str] = &[
    "meta", "img", "br", "hr", "input", "link", "area", "base", "col", "embed", "param", "source",
    "track", "wbr",
];

/// Elements whose text children are emitted verbatim.
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

/// Renders the whole document, doctype included, to markup text.
///
/// The output is deterministic: the same tree always serializes to the same
/// bytes, which the export path depends on.
pub fn document_to_markup(document: &Document) -> String {
    let mut out = String::new();
    if let Some(doctype) = &*document.doctype.borrow() {
        out.push_str("<!DOCTYPE ");
        out.push_str(&doctype.name);
        out.push_str(">\n");
    }
    write_node(&document.root, &mut out, false);
    out
}

fn write_node(node: &NodeHandle, out: &mut String, raw_text: bool) {
    match &*node.borrow() {
        Node::DocumentRoot(root) => {
            for child in &root.children {
                write_node(child, out, false);
            }
        }
        Node::Element(elem) => {
            out.push('<');
            out.push_str(&elem.tag);
            for (key, value) in &elem.attributes {
                out.push(' ');
                out.push_str(key);
                out.push_str("=\"");
                escape_attribute(value, out);
                out.push('"');
            }
            out.push('>');
            if VOID_ELEMENTS.contains(&elem.tag.as_str()) {
                return;
            }
            let raw = RAW_TEXT_ELEMENTS.contains(&elem.tag.as_str());
            for child in &elem.children {
                write_node(child, out, raw);
            }
            out.push_str("</");
            out.push_str(&elem.tag);
            out.push('>');
        }
        Node::Text(text) => {
            if raw_text {
                out.push_str(text);
            } else {
                escape_text(text, out);
            }
        }
        Node::Comment(text) => {
            out.push_str("<!--");
            out.push_str(text);
            out.push_str("-->");
        }
    }
}

fn escape_text(text: &str, out: &mut String) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
}

fn escape_attribute(value: &str, out: &mut String) {
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
}
