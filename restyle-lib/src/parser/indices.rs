use std::collections::HashMap;
use std::rc::Rc;

use crate::dom::dom_tree::{for_each_element, Document, Node, NodeHandle};

/// Lookup indices over a parsed document.
///
/// Built once per parse; the engine never adds or removes elements after
/// parsing (only attributes and text change), so the indices stay valid for
/// the lifetime of the tree.
#[derive(Debug, Default)]
pub struct DomIndices {
    /// Maps an element's "id" attribute to the corresponding node.
    pub id_map: HashMap<String, NodeHandle>,
    /// Maps a class name to all nodes that have that class.
    pub class_map: HashMap<String, Vec<NodeHandle>>,
    /// Maps a lowercase tag name (e.g., "div") to all nodes with that tag.
    pub tag_map: HashMap<String, Vec<NodeHandle>>,
}

impl DomIndices {
    /// Build the indices for the entire document.
    pub fn build(document: &Document) -> Self {
        let mut indices = DomIndices::default();
        for_each_element(document, |node| indices.index(node));
        indices
    }

    fn index(&mut self, node: &NodeHandle) {
        let Node::Element(ref elem) = *node.borrow() else {
            return;
        };
        self.tag_map
            .entry(elem.tag.to_lowercase())
            .or_default()
            .push(Rc::clone(node));
        if let Some(id_value) = elem.id() {
            self.id_map.insert(id_value.to_string(), Rc::clone(node));
        }
        for class in elem.class_list() {
            self.class_map.entry(class).or_default().push(Rc::clone(node));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::html::parse_markup;

    #[test]
    fn indexes_ids_classes_and_tags() {
        let document = parse_markup(
            "<body><div id=\"top\" class=\"card wide\"></div><div class=\"card\"></div></body>",
        );
        let indices = DomIndices::build(&document);
        assert!(indices.id_map.contains_key("top"));
        assert_eq!(indices.class_map.get("card").map(Vec::len), Some(2));
        assert_eq!(indices.tag_map.get("div").map(Vec::len), Some(2));
    }
}
