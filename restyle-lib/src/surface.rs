//! The sandboxed preview surface and its Live Applier.
//!
//! The surface owns a parsed copy of the active markup plus every loaded
//! stylesheet, and runs on its own thread: the only way in or out is the
//! typed message channel. Uploaded markup is untrusted and must not be
//! able to reach the outer context's state.
//!
//! The document tree is `Rc`-based and deliberately not `Send`; the thread
//! boundary plus the channel enforce the isolation the iframe gave the
//! original.

use crate::channel::{
    channel_pair, CommandSender, EventReceiver, EventSender, Selection, SurfaceCommand,
    SurfaceEvent,
};
use crate::document::SourceFile;
use crate::dom::dom_tree::{self, Document, Node, NodeHandle};
use crate::parser::html::parse_markup;
use crate::parser::indices::DomIndices;
use crate::store::{is_css_property_name, PropertyRecord, TEXT_CONTENT_PROPERTY};
use crate::style::cascade::{self, MatchedRule};
use crate::style::selector::{
    self, is_root_scope, matches_complex, parse_selector, resolve_targets, ComplexSelector,
    ROOT_BODY, ROOT_HTML,
};
use crate::style::sheet;
use std::collections::HashMap;
use std::rc::Weak;
use std::thread;

/// One stylesheet rule, pre-resolved for matching: a rule with several
/// selectors contributes one entry per selector.
struct SheetRule {
    selector: ComplexSelector,
    specificity: (u32, u32, u32),
    source_order: u32,
    declarations: Vec<(String, String, bool)>,
}

/// Handle held by the outer context. Dropping it closes the command
/// channel, which shuts the surface thread down.
pub struct SurfaceHandle {
    pub commands: CommandSender,
    pub events: EventReceiver,
    thread: Option<thread::JoinHandle<()>>,
}

impl Drop for SurfaceHandle {
    fn drop(&mut self) {
        // Close the inward channel first so the blocking receive loop ends.
        let (closed, _) = tokio::sync::mpsc::unbounded_channel();
        self.commands = closed;
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

pub struct PreviewSurface {
    document: Document,
    indices: DomIndices,
    rules: Vec<SheetRule>,
    /// Synthesized override rules, one per root scope, replaced wholesale
    /// on every root-scope style command.
    root_rules: HashMap<String, PropertyRecord>,
    selected: Option<NodeHandle>,
    events: EventSender,
}

impl PreviewSurface {
    /// Spawns the surface on its own thread. The `Ready` event is emitted
    /// once parsing finished; commands sent earlier queue up and are
    /// drained afterwards.
    pub fn spawn(markup: String, stylesheets: Vec<SourceFile>) -> SurfaceHandle {
        let ((cmd_tx, mut cmd_rx), (event_tx, event_rx)) = channel_pair();
        let thread = thread::Builder::new()
            .name("preview-surface".into())
            .spawn(move || {
                let mut surface = PreviewSurface::build(&markup, &stylesheets, event_tx);
                if surface.events.send(SurfaceEvent::Ready).is_err() {
                    return;
                }
                while let Some(command) = cmd_rx.blocking_recv() {
                    surface.handle_command(command);
                }
            })
            .expect("failed to spawn preview surface thread");
        SurfaceHandle {
            commands: cmd_tx,
            events: event_rx,
            thread: Some(thread),
        }
    }

    /// Builds the surface state in place. Stylesheets that fail to parse
    /// are skipped with a warning; the preview stays usable without them.
    pub fn build(markup: &str, stylesheets: &[SourceFile], events: EventSender) -> Self {
        let document = parse_markup(markup);
        let indices = DomIndices::build(&document);

        let mut rules = Vec::new();
        let mut order_base = 0;
        // Document-embedded style blocks come first, then the uploaded
        // stylesheets in upload order, matching where they would sit in
        // the rendered page.
        let mut sheet_sources: Vec<(String, String)> = Vec::new();
        if let Some(style_nodes) = indices.tag_map.get("style") {
            for node in style_nodes {
                sheet_sources.push(("<style>".to_string(), dom_tree::text_content(node)));
            }
        }
        for sheet_file in stylesheets {
            sheet_sources.push((sheet_file.name.clone(), sheet_file.content.clone()));
        }
        for (name, css) in &sheet_sources {
            match sheet::parse_stylesheet(css, order_base) {
                Ok(owned) => {
                    order_base += owned.rules.len() as u32;
                    for rule in owned.rules {
                        for selector_str in &rule.selectors {
                            let complex = parse_selector(selector_str);
                            rules.push(SheetRule {
                                specificity: cascade::complex_specificity(&complex),
                                selector: complex,
                                source_order: rule.source_order,
                                declarations: rule
                                    .declarations
                                    .iter()
                                    .map(|d| (d.property.clone(), d.value.clone(), d.important))
                                    .collect(),
                            });
                        }
                    }
                }
                Err(err) => log::warn!("skipping stylesheet {}: {}", name, err),
            }
        }

        PreviewSurface {
            document,
            indices,
            rules,
            root_rules: HashMap::new(),
            selected: None,
            events,
        }
    }

    pub fn handle_command(&mut self, command: SurfaceCommand) {
        match command {
            SurfaceCommand::Target { query } => self.target(&query),
            SurfaceCommand::Hover { query } => self.hover(&query),
            SurfaceCommand::ApplyStyles { selector, delta } => {
                self.apply_styles(&selector, &delta)
            }
            SurfaceCommand::ApplyText { selector, text } => self.apply_text(&selector, &text),
            SurfaceCommand::Deselect => {
                self.selected = None;
            }
        }
    }

    /// Targets the first node matching the query; replaces the previous
    /// selection. The selection's canonical selector always comes from the
    /// resolver, never from the query string.
    fn target(&mut self, query: &str) {
        let Some(node) = self.first_match(query) else {
            log::debug!("target query {:?} matched nothing", query);
            return;
        };
        let selection = self.selection_for(&node);
        self.selected = Some(node);
        let _ = self.events.send(SurfaceEvent::Selected(selection));
    }

    fn hover(&mut self, query: &str) {
        let Some(node) = self.first_match(query) else {
            return;
        };
        if let Some(selector) = selector::resolve(&node) {
            let _ = self.events.send(SurfaceEvent::Hovered { selector });
        }
    }

    fn first_match(&self, query: &str) -> Option<NodeHandle> {
        resolve_targets(&self.document, Some(&self.indices), query)
            .into_iter()
            .next()
    }

    /// Applies a style delta. Root scopes take the inherited-property
    /// split; everything else is direct inline mutation on every match.
    /// A selector that no longer matches anything is a no-op, not an
    /// error; stale commands are expected under rapid re-renders.
    fn apply_styles(&mut self, selector_str: &str, delta: &PropertyRecord) {
        if is_root_scope(selector_str) {
            self.apply_root_styles(selector_str, delta);
            return;
        }
        let targets = resolve_targets(&self.document, Some(&self.indices), selector_str);
        if targets.is_empty() {
            log::debug!("selector {:?} matches nothing; ignoring styles", selector_str);
            return;
        }
        for node in targets {
            if let Node::Element(ref mut elem) = *node.borrow_mut() {
                for (property, value) in delta.iter() {
                    if property == TEXT_CONTENT_PROPERTY || !is_css_property_name(property) {
                        continue;
                    }
                    if value.is_empty() {
                        elem.remove_style_property(property);
                    } else {
                        elem.set_style_property(property, value);
                    }
                }
            }
        }
    }

    /// Root scope: inheritable properties become the synthesized override
    /// rule (replaced wholesale, so re-applying the same record is
    /// byte-identical); the rest are written inline on the scope node.
    /// Inline copies of the inheritable set are cleared from both root
    /// nodes so nothing shadows the rule.
    fn apply_root_styles(&mut self, scope: &str, record: &PropertyRecord) {
        for root_tag in [ROOT_BODY, ROOT_HTML] {
            if let Some(node) = dom_tree::find_element_by_tag(&self.document, root_tag) {
                if let Node::Element(ref mut elem) = *node.borrow_mut() {
                    for &property in cascade::ROOT_RULE_PROPERTIES {
                        elem.remove_style_property(property);
                    }
                }
            }
        }

        let target = dom_tree::find_element_by_tag(&self.document, scope);
        let mut rule = PropertyRecord::new();
        for (property, value) in record.iter() {
            if property == TEXT_CONTENT_PROPERTY
                || !is_css_property_name(property)
                || value.is_empty()
            {
                continue;
            }
            if cascade::is_root_rule_property(property) {
                rule.set(property, value);
            } else if let Some(ref node) = target {
                if let Node::Element(ref mut elem) = *node.borrow_mut() {
                    elem.set_style_property(property, value);
                }
            }
        }
        if rule.is_empty() {
            self.root_rules.remove(scope);
        } else {
            self.root_rules.insert(scope.to_string(), rule);
        }
    }

    fn apply_text(&mut self, selector_str: &str, text: &str) {
        let targets = resolve_targets(&self.document, Some(&self.indices), selector_str);
        if targets.is_empty() {
            log::debug!("selector {:?} matches nothing; ignoring text", selector_str);
            return;
        }
        for node in targets {
            dom_tree::set_text_content(&node, text);
        }
    }

    /// The synthesized override stylesheet, as it would be injected into
    /// the rendered page. Deterministic: scopes in fixed order, properties
    /// in record order.
    pub fn root_override_css(&self) -> String {
        let mut out = String::new();
        for scope in [ROOT_BODY, ROOT_HTML] {
            let Some(rule) = self.root_rules.get(scope) else {
                continue;
            };
            if rule.is_empty() {
                continue;
            }
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(scope);
            out.push_str(" {");
            for (property, value) in rule.iter() {
                out.push_str(&format!(" {}: {} !important;", property, value));
            }
            out.push_str(" }");
        }
        out
    }

    /// The live document as markup, reflecting every mutation applied so
    /// far (exclusive of the synthesized root rule, which lives in
    /// `root_override_css`).
    pub fn live_markup(&self) -> String {
        crate::parser::serialize::document_to_markup(&self.document)
    }

    pub fn selection(&self) -> Option<Selection> {
        self.selected.as_ref().map(|node| self.selection_for(node))
    }

    fn selection_for(&self, node: &NodeHandle) -> Selection {
        let (tag_name, id, class_name) = match &*node.borrow() {
            Node::Element(elem) => (
                elem.tag.clone(),
                elem.attribute("id").unwrap_or_default().to_string(),
                elem.attribute("class").unwrap_or_default().to_string(),
            ),
            _ => (String::new(), String::new(), String::new()),
        };
        Selection {
            tag_name,
            id,
            class_name,
            selector: selector::resolve(node).unwrap_or_default(),
            text_content: dom_tree::text_content(node),
            computed_styles: self.computed_style_of(node),
        }
    }

    /// Computed-style snapshot: matched rules by specificity and source
    /// order, parent inheritance, inline style, sheet-important
    /// declarations, then the synthesized root rule on the scope nodes.
    pub fn computed_style_of(&self, node: &NodeHandle) -> HashMap<String, String> {
        let parent = {
            match &*node.borrow() {
                Node::Element(elem) => elem.parent.as_ref().and_then(Weak::upgrade),
                _ => None,
            }
        };
        let parent_style = parent
            .filter(|p| matches!(*p.borrow(), Node::Element(_)))
            .map(|p| self.computed_style_of(&p));

        let matched: Vec<MatchedRule> = self
            .rules
            .iter()
            .filter(|rule| matches_complex(node, &rule.selector))
            .map(|rule| MatchedRule {
                specificity: rule.specificity,
                source_order: rule.source_order,
                declarations: rule.declarations.clone(),
            })
            .collect();
        let important: Vec<(String, String)> = matched
            .iter()
            .flat_map(|rule| rule.declarations.iter())
            .filter(|(_, _, important)| *important)
            .map(|(p, v, _)| (p.clone(), v.clone()))
            .collect();

        let mut computed = cascade::computed_style(matched, parent_style.as_ref());

        if let Node::Element(ref elem) = *node.borrow() {
            for (property, value) in elem.style_pairs() {
                computed.insert(property, value);
            }
            for (property, value) in important {
                computed.insert(property, value);
            }
            let tag = elem.tag.to_lowercase();
            if let Some(rule) = self.root_rules.get(tag.as_str()) {
                for (property, value) in rule.iter() {
                    computed.insert(property.to_string(), value.to_string());
                }
            }
        }
        computed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::SurfaceEvent;
    use tokio::sync::mpsc;

    fn build_surface(markup: &str, css: &[(&str, &str)]) -> (PreviewSurface, EventReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sheets: Vec<SourceFile> = css
            .iter()
            .map(|(name, content)| SourceFile {
                name: name.to_string(),
                content: content.to_string(),
            })
            .collect();
        (PreviewSurface::build(markup, &sheets, tx), rx)
    }

    #[test]
    fn targeting_emits_resolved_selection() {
        let (mut surface, mut events) =
            build_surface("<body><p id=\"intro\">Hi</p></body>", &[]);
        surface.handle_command(SurfaceCommand::Target {
            query: "p".to_string(),
        });
        let event = events.try_recv().expect("selection event");
        match event {
            SurfaceEvent::Selected(selection) => {
                assert_eq!(selection.selector, "#intro");
                assert_eq!(selection.tag_name, "p");
                assert_eq!(selection.text_content, "Hi");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn style_commands_mutate_matching_nodes_inline() {
        let (mut surface, _events) =
            build_surface("<body><p id=\"intro\">Hi</p></body>", &[]);
        surface.apply_styles("#intro", &PropertyRecord::from_pairs([("font-size", "20px")]));
        assert!(surface.live_markup().contains("style=\"font-size: 20px\""));
    }

    #[test]
    fn stale_selector_is_a_noop() {
        let (mut surface, _events) = build_surface("<body><p>Hi</p></body>", &[]);
        let before = surface.live_markup();
        surface.apply_styles("#gone", &PropertyRecord::from_pairs([("color", "red")]));
        assert_eq!(surface.live_markup(), before);
    }

    #[test]
    fn root_scope_splits_inherited_properties_into_override_rule() {
        let (mut surface, _events) = build_surface("<body><p>Hi</p></body>", &[]);
        let record =
            PropertyRecord::from_pairs([("color", "#111111"), ("background-color", "#fff")]);
        surface.apply_styles("body", &record);
        assert_eq!(
            surface.root_override_css(),
            "body { color: #111111 !important; }"
        );
        // The inheritable property must not appear inline on the root.
        let markup = surface.live_markup();
        assert!(markup.contains("background-color: #fff"));
        assert!(!markup.contains("color: #111111;"), "{markup}");
        assert!(!markup.contains("style=\"color"), "{markup}");
    }

    #[test]
    fn reapplying_root_record_is_byte_identical() {
        let (mut surface, _events) = build_surface("<body><p>Hi</p></body>", &[]);
        let record = PropertyRecord::from_pairs([("color", "red"), ("font-size", "18px")]);
        surface.apply_styles("body", &record);
        let first = surface.root_override_css();
        let markup_first = surface.live_markup();
        surface.apply_styles("body", &record);
        assert_eq!(surface.root_override_css(), first);
        assert_eq!(surface.live_markup(), markup_first);
    }

    #[test]
    fn text_commands_replace_node_text() {
        let (mut surface, _events) = build_surface("<body><p id=\"x\">old</p></body>", &[]);
        surface.apply_text("#x", "new words");
        assert!(surface.live_markup().contains("<p id=\"x\">new words</p>"));
    }

    #[test]
    fn computed_snapshot_reflects_sheets_inline_and_root_rule() {
        let (mut surface, _events) = build_surface(
            "<html><body><p id=\"x\" style=\"margin: 4px\">Hi</p></body></html>",
            &[("site.css", "p { color: blue; font-size: 12px; }")],
        );
        let node = surface.first_match("#x").unwrap();
        let computed = surface.computed_style_of(&node);
        assert!(computed.contains_key("color"));
        assert_eq!(computed.get("margin"), Some(&"4px".to_string()));

        // A root-scope color override is inherited by the paragraph.
        surface.apply_styles("body", &PropertyRecord::from_pairs([("color", "#ff0000")]));
        let computed = surface.computed_style_of(&node);
        // The sheet still targets the node directly, so its own rule wins
        // for the node itself; the body's snapshot carries the override.
        let body = surface.first_match("body").unwrap();
        let body_computed = surface.computed_style_of(&body);
        assert_eq!(body_computed.get("color"), Some(&"#ff0000".to_string()));
        assert_eq!(computed.get("font-size"), Some(&"12px".to_string()));
    }
}
