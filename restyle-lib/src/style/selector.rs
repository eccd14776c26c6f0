//! Selector parsing, matching, and node identity resolution.
//!
//! Selectors serve double duty here: the resolver hands out a stable selector
//! string for any node the user targets, and both the live surface and the
//! export path re-evaluate those strings against a (possibly re-parsed) tree.
//! Matching proceeds right-to-left over the parent and sibling pointers the
//! parser wires up.

use crate::dom::dom_tree::{Document, Node, NodeHandle};
use crate::parser::indices::DomIndices;
use std::collections::HashSet;
use std::iter::Peekable;
use std::rc::{Rc, Weak};
use std::str::Chars;

/// Reserved selector for the document body scope.
pub const ROOT_BODY: &str = "body";
/// Reserved selector for the outermost markup scope.
pub const ROOT_HTML: &str = "html";

/// True for the two reserved root-scope selectors, which get the
/// inherited-property treatment in the applier and the exporter.
pub fn is_root_scope(selector: &str) -> bool {
    selector == ROOT_BODY || selector == ROOT_HTML
}

/// Supported attribute selector operators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeOperator {
    /// [attr="value"]
    Exact,
    /// [attr~="value"]
    Includes,
    /// [attr^="value"]
    Prefix,
    /// [attr$="value"]
    Suffix,
    /// [attr*="value"]
    Substring,
}

/// Represents one attribute condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeSelector {
    pub name: String,
    pub operator: Option<AttributeOperator>, // None means only existence check
    pub value: Option<String>,
}

/// A compound selector: optional tag, id, classes, attribute conditions,
/// and the positional qualifier the resolver emits for ambiguous siblings.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CompoundSelector {
    pub tag: Option<String>,
    pub id: Option<String>,
    pub classes: HashSet<String>,
    pub attributes: Vec<AttributeSelector>,
    pub nth_of_type: Option<usize>,
}

/// Supported combinators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Combinator {
    /// Descendant combinator (a space).
    Descendant,
    /// Child combinator (`>`).
    Child,
    /// Adjacent sibling combinator (`+`).
    AdjacentSibling,
    /// General sibling combinator (`~`).
    GeneralSibling,
}

/// A complex selector composed of a key compound selector and a list of
/// ancestor parts, right-to-left.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComplexSelector {
    pub key: CompoundSelector,
    pub ancestors: Vec<(Combinator, CompoundSelector)>,
}

/// Parses a selector; on malformed input falls back to treating the whole
/// string as one compound selector, matching nothing rather than erroring.
pub fn parse_selector(selector: &str) -> ComplexSelector {
    parse_complex_selector(selector).unwrap_or_else(|| ComplexSelector {
        key: parse_compound_selector(selector),
        ancestors: Vec::new(),
    })
}

/// Parse a complex selector string (e.g. "body > div > p:nth-of-type(2)").
/// Tokens are separated by whitespace; `>`, `+` and `~` are combinators.
pub fn parse_complex_selector(selector: &str) -> Option<ComplexSelector> {
    let tokens: Vec<&str> = selector.split_whitespace().collect();
    if tokens.is_empty() {
        return None;
    }
    let mut iter = tokens.into_iter();
    let mut key = parse_compound_selector(iter.next()?);
    let mut ancestors = Vec::new();

    while let Some(token) = iter.next() {
        let combinator = match token {
            ">" => Combinator::Child,
            "+" => Combinator::AdjacentSibling,
            "~" => Combinator::GeneralSibling,
            _ => Combinator::Descendant,
        };
        let compound_token = if matches!(token, ">" | "+" | "~") {
            iter.next().unwrap_or(token)
        } else {
            token
        };
        ancestors.push((combinator, key));
        key = parse_compound_selector(compound_token);
    }
    ancestors.reverse();
    Some(ComplexSelector { key, ancestors })
}

/// Parse a compound selector string, e.g. "div.red#header[data-kind=\"x\"]"
/// or "p:nth-of-type(2)".
pub fn parse_compound_selector(selector: &str) -> CompoundSelector {
    let mut compound = CompoundSelector::default();
    let mut chars = selector.chars().peekable();

    // Leading tag name or universal selector.
    if let Some(&ch) = chars.peek() {
        if ch.is_alphabetic() || ch == '*' {
            let tag = read_ident(&mut chars);
            if !tag.is_empty() && tag != "*" {
                compound.tag = Some(tag);
            }
        }
    }

    while let Some(ch) = chars.next() {
        match ch {
            '#' => {
                let ident = read_ident(&mut chars);
                if !ident.is_empty() {
                    compound.id = Some(ident);
                }
            }
            '.' => {
                let ident = read_ident(&mut chars);
                if !ident.is_empty() {
                    compound.classes.insert(ident);
                }
            }
            ':' => {
                read_pseudo(&mut chars, &mut compound);
            }
            '[' => {
                if let Some(attr) = read_attribute(&mut chars) {
                    compound.attributes.push(attr);
                }
            }
            _ => {}
        }
    }
    compound
}

/// Reads an identifier, handling `\xx` character escapes and the
/// fixed-width `\00002e` hex form the resolver emits.
fn read_ident(chars: &mut Peekable<Chars>) -> String {
    let mut buf = String::new();
    while let Some(&ch) = chars.peek() {
        match ch {
            '#' | '.' | '[' | ':' => break,
            '\\' => {
                chars.next();
                let Some(&escaped) = chars.peek() else { break };
                if escaped.is_ascii_hexdigit() {
                    let mut hex = String::new();
                    while let Some(&h) = chars.peek() {
                        if h.is_ascii_hexdigit() && hex.len() < 6 {
                            hex.push(h);
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    // Optional single whitespace terminator after a short
                    // hex escape.
                    if chars.peek().is_some_and(|c| c.is_whitespace()) {
                        chars.next();
                    }
                    if let Some(decoded) =
                        u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32)
                    {
                        buf.push(decoded);
                    }
                } else {
                    buf.push(escaped);
                    chars.next();
                }
            }
            _ => {
                buf.push(ch);
                chars.next();
            }
        }
    }
    buf
}

/// Parses a pseudo-class. Only `:nth-of-type(n)` carries meaning here;
/// anything else is consumed and ignored.
fn read_pseudo(chars: &mut Peekable<Chars>, compound: &mut CompoundSelector) {
    let mut name = String::new();
    while let Some(&ch) = chars.peek() {
        if ch.is_ascii_alphanumeric() || ch == '-' {
            name.push(ch);
            chars.next();
        } else {
            break;
        }
    }
    if chars.peek() != Some(&'(') {
        return;
    }
    chars.next();
    let mut argument = String::new();
    for ch in chars.by_ref() {
        if ch == ')' {
            break;
        }
        argument.push(ch);
    }
    if name == "nth-of-type" {
        if let Ok(n) = argument.trim().parse::<usize>() {
            compound.nth_of_type = Some(n);
        }
    }
}

/// Parses one `[attr]` / `[attr op "value"]` condition up to the closing
/// bracket.
fn read_attribute(chars: &mut Peekable<Chars>) -> Option<AttributeSelector> {
    let mut attr_name = String::new();
    let mut operator: Option<AttributeOperator> = None;
    let mut attr_value: Option<String> = None;

    skip_whitespace(chars);
    while let Some(&ch) = chars.peek() {
        if ch == '=' || ch == ']' || ch == '~' || ch == '^' || ch == '$' || ch == '*' || ch.is_whitespace() {
            break;
        }
        attr_name.push(ch);
        chars.next();
    }
    skip_whitespace(chars);

    if let Some(&ch) = chars.peek() {
        if ch == '=' || ch == '~' || ch == '^' || ch == '$' || ch == '*' {
            let mut op_str = String::new();
            op_str.push(ch);
            chars.next();
            if chars.peek() == Some(&'=') {
                op_str.push('=');
                chars.next();
            }
            operator = match op_str.as_str() {
                "=" => Some(AttributeOperator::Exact),
                "~=" => Some(AttributeOperator::Includes),
                "^=" => Some(AttributeOperator::Prefix),
                "$=" => Some(AttributeOperator::Suffix),
                "*=" => Some(AttributeOperator::Substring),
                _ => None,
            };
            skip_whitespace(chars);
            let quote = chars.peek().copied().filter(|&c| c == '"' || c == '\'');
            let mut value_buf = String::new();
            if let Some(q) = quote {
                chars.next();
                for ch in chars.by_ref() {
                    if ch == q {
                        break;
                    }
                    value_buf.push(ch);
                }
            } else {
                while let Some(&ch) = chars.peek() {
                    if ch.is_whitespace() || ch == ']' {
                        break;
                    }
                    value_buf.push(ch);
                    chars.next();
                }
            }
            attr_value = Some(value_buf);
        }
    }
    for ch in chars.by_ref() {
        if ch == ']' {
            break;
        }
    }
    if attr_name.is_empty() {
        return None;
    }
    Some(AttributeSelector {
        name: attr_name,
        operator,
        value: attr_value,
    })
}

fn skip_whitespace(chars: &mut Peekable<Chars>) {
    while chars.peek().is_some_and(|c| c.is_whitespace()) {
        chars.next();
    }
}

/// ------------------------------
/// Matching
/// ------------------------------

/// Returns true if the node matches the compound selector: tag, id,
/// classes, attribute conditions, and sibling position.
pub fn matches_compound(node: &NodeHandle, compound: &CompoundSelector) -> bool {
    let nth_check;
    {
        let borrowed = node.borrow();
        let Node::Element(ref elem) = *borrowed else {
            return false;
        };
        if let Some(ref tag) = compound.tag {
            if !elem.tag.eq_ignore_ascii_case(tag) {
                return false;
            }
        }
        if let Some(ref id_val) = compound.id {
            if elem.id() != Some(id_val.as_str()) {
                return false;
            }
        }
        if !compound.classes.is_empty() {
            let elem_classes: HashSet<String> = elem.class_list().into_iter().collect();
            if !compound.classes.is_subset(&elem_classes) {
                return false;
            }
        }
        for attr_sel in &compound.attributes {
            let Some(actual) = elem.attribute(&attr_sel.name) else {
                return false;
            };
            if let Some(expected) = &attr_sel.value {
                let ok = match attr_sel.operator {
                    Some(AttributeOperator::Exact) => actual == expected,
                    Some(AttributeOperator::Includes) => {
                        actual.split_whitespace().any(|word| word == expected)
                    }
                    Some(AttributeOperator::Prefix) => actual.starts_with(expected.as_str()),
                    Some(AttributeOperator::Suffix) => actual.ends_with(expected.as_str()),
                    Some(AttributeOperator::Substring) => actual.contains(expected.as_str()),
                    None => true,
                };
                if !ok {
                    return false;
                }
            }
        }
        nth_check = compound.nth_of_type.map(|n| (n, elem.tag.clone()));
    }
    if let Some((n, tag)) = nth_check {
        let Some(parent) = parent_of(node) else {
            return n == 1;
        };
        return nth_of_type_position(node, &tag, &parent) == n;
    }
    true
}

/// Matches a complex selector against a candidate node, right-to-left,
/// following parent and sibling pointers.
pub fn matches_complex(candidate: &NodeHandle, complex: &ComplexSelector) -> bool {
    if !matches_compound(candidate, &complex.key) {
        return false;
    }
    let mut current = Rc::clone(candidate);
    for (combinator, compound) in &complex.ancestors {
        let found = match combinator {
            Combinator::Child => match parent_element(&current) {
                Some(parent) if matches_compound(&parent, compound) => {
                    current = parent;
                    true
                }
                _ => false,
            },
            Combinator::Descendant => {
                let mut matched = false;
                let mut ancestor = parent_element(&current);
                while let Some(node) = ancestor {
                    if matches_compound(&node, compound) {
                        current = node;
                        matched = true;
                        break;
                    }
                    ancestor = parent_element(&node);
                }
                matched
            }
            Combinator::AdjacentSibling => match prev_sibling_element(&current) {
                Some(sibling) if matches_compound(&sibling, compound) => {
                    current = sibling;
                    true
                }
                _ => false,
            },
            Combinator::GeneralSibling => {
                let mut matched = false;
                let mut sibling = prev_sibling_element(&current);
                while let Some(node) = sibling {
                    if matches_compound(&node, compound) {
                        current = node;
                        matched = true;
                        break;
                    }
                    sibling = prev_sibling_element(&node);
                }
                matched
            }
        };
        if !found {
            return false;
        }
    }
    true
}

/// All elements matching the selector, in document order.
pub fn query_all(document: &Document, complex: &ComplexSelector) -> Vec<NodeHandle> {
    let mut matches = Vec::new();
    crate::dom::dom_tree::for_each_element(document, |node| {
        if matches_complex(node, complex) {
            matches.push(Rc::clone(node));
        }
    });
    matches
}

/// Resolves a selector string against the document: the reserved root
/// selectors map straight to their elements, a bare `#id` goes through the
/// id index when one is supplied, anything else is matched tree-wide.
pub fn resolve_targets(
    document: &Document,
    indices: Option<&DomIndices>,
    selector: &str,
) -> Vec<NodeHandle> {
    let trimmed = selector.trim();
    if is_root_scope(trimmed) {
        return crate::dom::dom_tree::find_element_by_tag(document, trimmed)
            .into_iter()
            .collect();
    }
    let complex = parse_selector(trimmed);
    if complex.ancestors.is_empty() {
        let key = &complex.key;
        let plain_id = key.tag.is_none()
            && key.classes.is_empty()
            && key.attributes.is_empty()
            && key.nth_of_type.is_none();
        if plain_id {
            if let (Some(id), Some(indices)) = (&key.id, indices) {
                return indices.id_map.get(id).cloned().into_iter().collect();
            }
        }
    }
    query_all(document, &complex)
}

/// ------------------------------
/// Identity resolution
/// ------------------------------

/// Computes the stable selector for a node: the reserved tokens for the
/// root scopes, `#id` when the author gave the node an identifier, and an
/// anchored positional path otherwise. Pure function of the tree shape, so
/// the same node always yields the same string (and never depends on what
/// was selected before).
pub fn resolve(node: &NodeHandle) -> Option<String> {
    {
        let borrowed = node.borrow();
        let Node::Element(ref elem) = *borrowed else {
            return None;
        };
        if elem.tag.eq_ignore_ascii_case(ROOT_HTML) {
            return Some(ROOT_HTML.to_string());
        }
        if elem.tag.eq_ignore_ascii_case(ROOT_BODY) {
            return Some(ROOT_BODY.to_string());
        }
        if let Some(id) = elem.id() {
            return Some(format!("#{}", escape_ident(id)));
        }
    }

    let mut components = Vec::new();
    let mut current = Rc::clone(node);
    loop {
        let (component, parent) = {
            let borrowed = current.borrow();
            let Node::Element(ref elem) = *borrowed else {
                break;
            };
            let component = match parent_of(&current) {
                Some(parent) => {
                    let position = nth_of_type_position(&current, &elem.tag, &parent);
                    let total = count_of_type(&elem.tag, &parent);
                    if total > 1 {
                        format!("{}:nth-of-type({})", elem.tag, position)
                    } else {
                        elem.tag.clone()
                    }
                }
                None => elem.tag.clone(),
            };
            (component, elem.parent.as_ref().and_then(Weak::upgrade))
        };
        components.push(component);
        let Some(parent) = parent else { break };
        let parent_is_scope = match &*parent.borrow() {
            Node::Element(ref p) => {
                p.tag.eq_ignore_ascii_case(ROOT_BODY) || p.tag.eq_ignore_ascii_case(ROOT_HTML)
            }
            _ => true,
        };
        if parent_is_scope {
            break;
        }
        current = parent;
    }
    components.reverse();
    Some(format!("{} > {}", ROOT_BODY, components.join(" > ")))
}

/// Escapes a string for use as a CSS identifier. Digits that would start
/// the identifier use the fixed-width hex form so the escape needs no
/// whitespace terminator.
pub fn escape_ident(ident: &str) -> String {
    let mut out = String::new();
    let chars: Vec<char> = ident.chars().collect();
    for (i, &ch) in chars.iter().enumerate() {
        let code = ch as u32;
        let leading = i == 0 || (i == 1 && chars[0] == '-');
        if code == 0 {
            out.push('\u{FFFD}');
        } else if ch.is_ascii_digit() && leading {
            out.push_str(&format!("\\{:06x}", code));
        } else if ch == '-' && i == 0 && chars.len() == 1 {
            out.push_str("\\-");
        } else if code >= 0x80 || ch == '-' || ch == '_' || ch.is_ascii_alphanumeric() {
            out.push(ch);
        } else {
            out.push('\\');
            out.push(ch);
        }
    }
    out
}

/// Helper: parent node (element or document root).
fn parent_of(node: &NodeHandle) -> Option<NodeHandle> {
    if let Node::Element(ref elem) = *node.borrow() {
        elem.parent.as_ref().and_then(Weak::upgrade)
    } else {
        None
    }
}

/// Helper: parent, only when it is an element.
fn parent_element(node: &NodeHandle) -> Option<NodeHandle> {
    let parent = parent_of(node)?;
    let is_element = matches!(*parent.borrow(), Node::Element(_));
    is_element.then_some(parent)
}

/// Helper: immediate previous element sibling.
fn prev_sibling_element(node: &NodeHandle) -> Option<NodeHandle> {
    if let Node::Element(ref elem) = *node.borrow() {
        elem.prev_sibling.as_ref().and_then(Weak::upgrade)
    } else {
        None
    }
}

/// 1-based position of the node among same-tag element children of parent.
fn nth_of_type_position(node: &NodeHandle, tag: &str, parent: &NodeHandle) -> usize {
    let mut position = 0;
    for_each_child(parent, |child| {
        if Rc::ptr_eq(child, node) {
            position += 1;
            return false;
        }
        if let Node::Element(ref elem) = *child.borrow() {
            if elem.tag.eq_ignore_ascii_case(tag) {
                position += 1;
            }
        }
        true
    });
    position.max(1)
}

/// Number of element children of parent sharing the tag.
fn count_of_type(tag: &str, parent: &NodeHandle) -> usize {
    let mut count = 0;
    for_each_child(parent, |child| {
        if let Node::Element(ref elem) = *child.borrow() {
            if elem.tag.eq_ignore_ascii_case(tag) {
                count += 1;
            }
        }
        true
    });
    count
}

/// Visits each child until the callback returns false.
fn for_each_child<F: FnMut(&NodeHandle) -> bool>(parent: &NodeHandle, mut visit: F) {
    let borrowed = parent.borrow();
    let children = match &*borrowed {
        Node::DocumentRoot(root) => &root.children,
        Node::Element(elem) => &elem.children,
        _ => return,
    };
    for child in children {
        if !visit(child) {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::html::parse_markup;

    #[test]
    fn parses_compound_with_positional_qualifier() {
        let compound = parse_compound_selector("div.red#header:nth-of-type(3)");
        assert_eq!(compound.tag.as_deref(), Some("div"));
        assert_eq!(compound.id.as_deref(), Some("header"));
        assert!(compound.classes.contains("red"));
        assert_eq!(compound.nth_of_type, Some(3));
    }

    #[test]
    fn parses_attribute_operators() {
        let compound = parse_compound_selector("a[href^=\"https\"][target]");
        assert_eq!(compound.attributes.len(), 2);
        assert_eq!(
            compound.attributes[0].operator,
            Some(AttributeOperator::Prefix)
        );
        assert_eq!(compound.attributes[1].operator, None);
    }

    #[test]
    fn resolver_prefers_reserved_tokens_and_ids() {
        let document = parse_markup("<html><body><p id=\"intro\">Hi</p></body></html>");
        let body = crate::dom::dom_tree::find_element_by_tag(&document, "body").unwrap();
        assert_eq!(resolve(&body).as_deref(), Some("body"));
        let p = crate::dom::dom_tree::find_element_by_tag(&document, "p").unwrap();
        assert_eq!(resolve(&p).as_deref(), Some("#intro"));
    }

    #[test]
    fn resolver_disambiguates_same_tag_siblings() {
        let document = parse_markup("<body><div>first</div><div>second</div></body>");
        let first = crate::dom::dom_tree::find_element_by_tag(&document, "div").unwrap();
        let second = {
            let borrowed = first.borrow();
            match &*borrowed {
                Node::Element(elem) => elem.next_sibling.clone().unwrap(),
                _ => unreachable!(),
            }
        };
        assert_eq!(resolve(&first).as_deref(), Some("body > div:nth-of-type(1)"));
        assert_eq!(
            resolve(&second).as_deref(),
            Some("body > div:nth-of-type(2)")
        );
    }

    #[test]
    fn resolve_is_deterministic() {
        let document =
            parse_markup("<body><section><p>a</p><p>b</p></section></body>");
        let p = crate::dom::dom_tree::find_element_by_tag(&document, "p").unwrap();
        let first = resolve(&p).unwrap();
        let second = resolve(&p).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn resolved_selector_round_trips_to_the_same_node() {
        let document = parse_markup(
            "<body><section><div></div><div><span>x</span></div></section></body>",
        );
        let span = crate::dom::dom_tree::find_element_by_tag(&document, "span").unwrap();
        let selector = resolve(&span).unwrap();
        let matches = query_all(&document, &parse_selector(&selector));
        assert_eq!(matches.len(), 1);
        assert!(Rc::ptr_eq(&matches[0], &span));
    }

    #[test]
    fn escaped_identifiers_round_trip() {
        let document = parse_markup("<body><p id=\"sec.2\">x</p></body>");
        let p = crate::dom::dom_tree::find_element_by_tag(&document, "p").unwrap();
        let selector = resolve(&p).unwrap();
        assert_eq!(selector, "#sec\\.2");
        let matches = query_all(&document, &parse_selector(&selector));
        assert_eq!(matches.len(), 1);
    }

    #[test]
    fn leading_digit_ids_use_hex_escapes() {
        assert_eq!(escape_ident("1up"), "\\000031up");
        let compound = parse_compound_selector("#\\000031up");
        assert_eq!(compound.id.as_deref(), Some("1up"));
    }

    #[test]
    fn child_combinator_requires_direct_parent() {
        let document = parse_markup(
            "<body><div class=\"outer\"><section><p>deep</p></section></div></body>",
        );
        let p = crate::dom::dom_tree::find_element_by_tag(&document, "p").unwrap();
        assert!(matches_complex(&p, &parse_selector("section > p")));
        assert!(!matches_complex(&p, &parse_selector("div > p")));
        assert!(matches_complex(&p, &parse_selector("div p")));
    }

    #[test]
    fn stale_selectors_match_nothing() {
        let document = parse_markup("<body><p>only</p></body>");
        let matches = query_all(&document, &parse_selector("#gone"));
        assert!(matches.is_empty());
    }
}
