//! The export serializer: replays the accumulated modifications onto a
//! fresh parse of each document's original source and produces standalone
//! artifacts.
//!
//! Markup gets two encodings of the same edits: inline style attributes on
//! the matched nodes, plus an injected override block whose declarations
//! are all `!important`, so the artifact holds up visually even where
//! external stylesheet rules would otherwise win. Stylesheets are never rewritten;
//! modifications append a rule block at end-of-file.

use crate::document::{DocumentKind, DocumentRecord, DocumentSet};
use crate::dom::dom_tree::{self, Node};
use crate::error::ExportError;
use crate::parser::html::parse_markup;
use crate::parser::indices::DomIndices;
use crate::parser::serialize::document_to_markup;
use crate::store::{is_css_property_name, PropertyRecord, TEXT_CONTENT_PROPERTY};
use crate::style::cascade::is_root_rule_property;
use crate::style::selector::{is_root_scope, resolve_targets};
use crate::style::sheet;
use rayon::prelude::*;
use serde_json::json;

/// id of the injected override block in exported markup.
pub const OVERRIDE_STYLE_ID: &str = "restyle-overrides";

/// Marker comment heading appended stylesheet rules.
pub const MODIFICATIONS_MARKER: &str = "/* restyle modifications */";

#[derive(Debug, Clone)]
pub struct ExportedFile {
    pub name: String,
    pub content: String,
}

#[derive(Debug, Default)]
pub struct ExportOutcome {
    pub files: Vec<ExportedFile>,
    pub errors: Vec<ExportError>,
}

/// Serializes one document with its modifications applied. Re-running on an
/// unchanged record produces byte-identical output.
pub fn export_document(record: &DocumentRecord) -> Result<String, ExportError> {
    match record.kind {
        DocumentKind::Markup => Ok(export_markup(record)),
        DocumentKind::Stylesheet => export_stylesheet(record),
    }
}

/// Markup export. With no modifications the original source is returned
/// untouched: no parse, no injected block, byte-for-byte.
fn export_markup(record: &DocumentRecord) -> String {
    let modifications = record.modifications();
    if modifications.is_empty() {
        return record.original_source().to_string();
    }

    let document = parse_markup(record.original_source());
    let indices = DomIndices::build(&document);
    let mut override_rules: Vec<String> = Vec::new();

    for (selector, properties) in modifications.iter() {
        let targets = resolve_targets(&document, Some(&indices), selector);
        let root_scope = is_root_scope(selector);
        if targets.is_empty() {
            log::debug!("{}: selector {:?} matches nothing in export", record.name, selector);
        }
        for node in &targets {
            apply_record_to_node(node, properties, root_scope, &record.name);
        }

        let declarations: Vec<String> = properties
            .iter()
            .filter(|&(property, value)| {
                property != TEXT_CONTENT_PROPERTY
                    && !value.is_empty()
                    && is_css_property_name(property)
            })
            .map(|(property, value)| format!("  {}: {} !important;", property, value))
            .collect();
        if !declarations.is_empty() {
            override_rules.push(format!("{} {{\n{}\n}}", selector, declarations.join("\n")));
        }
    }

    let markup = document_to_markup(&document);
    if override_rules.is_empty() {
        markup
    } else {
        inject_override_block(markup, &override_rules)
    }
}

/// Applies one selector's record to one matched node. Best-effort per
/// property: anything that cannot be expressed is skipped, never fatal.
/// Root scopes keep inheritable properties out of the inline attribute so
/// the override rule stays the only source for them.
fn apply_record_to_node(
    node: &dom_tree::NodeHandle,
    properties: &PropertyRecord,
    root_scope: bool,
    document_name: &str,
) {
    for (property, value) in properties.iter() {
        if property == TEXT_CONTENT_PROPERTY {
            // There is no CSS property for text; it goes straight into the
            // node, but never for the root scope, which would wipe the
            // whole page body.
            if !root_scope {
                dom_tree::set_text_content(node, value);
            }
            continue;
        }
        if value.is_empty() {
            continue;
        }
        if !is_css_property_name(property) {
            log::debug!("{}: skipping property {:?}", document_name, property);
            continue;
        }
        if root_scope && is_root_rule_property(property) {
            continue;
        }
        if let Node::Element(ref mut elem) = *node.borrow_mut() {
            elem.set_style_property(property, value);
        }
    }
}

/// Injects the override block immediately before the closing head marker;
/// without a head, a head section is synthesized before the closing
/// document marker; failing both, the block is prepended.
fn inject_override_block(mut markup: String, rules: &[String]) -> String {
    let block = format!(
        "\n<style id=\"{}\">\n{}\n</style>\n",
        OVERRIDE_STYLE_ID,
        rules.join("\n\n")
    );
    if let Some(pos) = markup.find("</head>") {
        markup.insert_str(pos, &block);
    } else if let Some(pos) = markup.find("</html>") {
        markup.insert_str(pos, &format!("<head>{}</head>\n", block));
    } else {
        markup.insert_str(0, &block);
    }
    markup
}

/// Stylesheet export: the original text is never rewritten; modifications
/// append a rule block at end-of-file. A source that does not parse is
/// fatal for this one file.
fn export_stylesheet(record: &DocumentRecord) -> Result<String, ExportError> {
    let modifications = record.modifications();
    if modifications.is_empty() {
        return Ok(record.original_source().to_string());
    }
    sheet::parse_stylesheet(record.original_source(), 0).map_err(|e| ExportError::SourceParse {
        name: record.name.clone(),
        message: e.to_string(),
    })?;

    let rules = plain_rules(modifications.iter());
    if rules.is_empty() {
        return Ok(record.original_source().to_string());
    }
    Ok(format!(
        "{}\n\n{}\n{}\n",
        record.original_source().trim_end(),
        MODIFICATIONS_MARKER,
        rules.join("\n\n")
    ))
}

fn plain_rules<'a>(
    entries: impl Iterator<Item = (&'a str, &'a PropertyRecord)>,
) -> Vec<String> {
    entries
        .filter_map(|(selector, properties)| {
            let declarations: Vec<String> = properties
                .iter()
                .filter(|&(property, value)| {
                    property != TEXT_CONTENT_PROPERTY
                        && !value.is_empty()
                        && is_css_property_name(property)
                })
                .map(|(property, value)| format!("  {}: {};", property, value))
                .collect();
            if declarations.is_empty() {
                None
            } else {
                Some(format!("{} {{\n{}\n}}", selector, declarations.join("\n")))
            }
        })
        .collect()
}

/// Exports every document in the set. Serialization is synchronous per
/// file and files are independent, so they run in parallel. A file that
/// fails is reported and the rest still export; only a batch that yields
/// nothing at all is an error.
pub fn export_all(set: &DocumentSet) -> Result<ExportOutcome, ExportError> {
    if set.is_empty() {
        return Err(ExportError::Empty);
    }
    let results: Vec<Result<ExportedFile, ExportError>> = set
        .documents()
        .par_iter()
        .map(|record| {
            export_document(record).map(|content| ExportedFile {
                name: record.name.clone(),
                content,
            })
        })
        .collect();

    let mut outcome = ExportOutcome::default();
    for result in results {
        match result {
            Ok(file) => outcome.files.push(file),
            Err(err) => {
                log::warn!("export failed: {}", err);
                outcome.errors.push(err);
            }
        }
    }
    if outcome.files.is_empty() {
        return Err(ExportError::Empty);
    }
    Ok(outcome)
}

/// A standalone stylesheet holding only the modifications, grouped per
/// file. `None` when nothing was modified.
pub fn export_modifications_css(set: &DocumentSet) -> Option<String> {
    let mut out = String::from(MODIFICATIONS_MARKER);
    out.push('\n');
    let mut any = false;
    for record in set.documents() {
        if record.modifications().is_empty() {
            continue;
        }
        let rules = plain_rules(record.modifications().iter());
        if rules.is_empty() {
            continue;
        }
        any = true;
        out.push_str(&format!("\n/* {} */\n", record.name));
        out.push_str(&rules.join("\n\n"));
        out.push('\n');
    }
    any.then_some(out)
}

/// JSON project report: file inventory, per-file modification map, and
/// summary counts.
pub fn export_report(set: &DocumentSet) -> serde_json::Value {
    let mut files = serde_json::Map::new();
    let mut modifications = serde_json::Map::new();
    let mut markup_count = 0;
    let mut stylesheet_count = 0;
    let mut total_modifications = 0;

    for record in set.documents() {
        let kind = match record.kind {
            DocumentKind::Markup => {
                markup_count += 1;
                "markup"
            }
            DocumentKind::Stylesheet => {
                stylesheet_count += 1;
                "stylesheet"
            }
        };
        files.insert(
            record.name.clone(),
            json!({
                "kind": kind,
                "size": record.original_source().len(),
                "has_modifications": !record.modifications().is_empty(),
            }),
        );
        if !record.modifications().is_empty() {
            let mut per_selector = serde_json::Map::new();
            for (selector, properties) in record.modifications().iter() {
                total_modifications += 1;
                let mut props = serde_json::Map::new();
                for (property, value) in properties.iter() {
                    props.insert(property.to_string(), json!(value));
                }
                per_selector.insert(selector.to_string(), serde_json::Value::Object(props));
            }
            modifications.insert(
                record.name.clone(),
                serde_json::Value::Object(per_selector),
            );
        }
    }

    json!({
        "files": files,
        "modifications": modifications,
        "summary": {
            "total_files": set.documents().len(),
            "markup_files": markup_count,
            "stylesheet_files": stylesheet_count,
            "modified_selectors": total_modifications,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{DocumentKind, DocumentRecord};
    use crate::store::PropertyRecord;

    fn markup_record(source: &str) -> DocumentRecord {
        DocumentRecord::new("index.html".into(), DocumentKind::Markup, source.into())
    }

    #[test]
    fn stylesheet_append_is_non_destructive() {
        let mut record = DocumentRecord::new(
            "site.css".into(),
            DocumentKind::Stylesheet,
            "p { color: green; }".into(),
        );
        record.merge_modification(".hero", &PropertyRecord::from_pairs([("color", "red")]));
        let exported = export_document(&record).unwrap();
        assert!(exported.starts_with("p { color: green; }"));
        assert!(exported.contains(MODIFICATIONS_MARKER));
        assert!(exported.contains(".hero {\n  color: red;\n}"));
        assert!(!exported.contains("!important"));
    }

    #[test]
    fn malformed_stylesheet_with_modifications_is_fatal_for_that_file() {
        let mut record = DocumentRecord::new(
            "bad.css".into(),
            DocumentKind::Stylesheet,
            "} body {".into(),
        );
        record.merge_modification("p", &PropertyRecord::from_pairs([("color", "red")]));
        assert!(matches!(
            export_document(&record),
            Err(ExportError::SourceParse { .. })
        ));
    }

    #[test]
    fn invalid_property_names_are_skipped_not_fatal() {
        let mut record = markup_record("<html><head></head><body><p id=\"x\">t</p></body></html>");
        record.merge_modification(
            "#x",
            &PropertyRecord::from_pairs([("not a prop", "1"), ("color", "red")]),
        );
        let exported = export_document(&record).unwrap();
        assert!(exported.contains("color: red"));
        assert!(!exported.contains("not a prop: 1"));
        // The override rule also drops it.
        assert!(!exported.contains("not a prop: 1 !important"));
    }

    #[test]
    fn exporting_twice_is_byte_identical() {
        let mut record = markup_record("<html><head></head><body><p id=\"x\">t</p></body></html>");
        record.merge_modification(
            "#x",
            &PropertyRecord::from_pairs([("color", "red"), ("font-size", "20px")]),
        );
        assert_eq!(
            export_document(&record).unwrap(),
            export_document(&record).unwrap()
        );
    }
}
