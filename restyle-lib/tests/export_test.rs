//! End-to-end export behavior: parity with the live preview, the
//! root-scope inheritance split, and the reset baseline.

use pretty_assertions::assert_eq;
use restyle_lib::document::{DocumentKind, DocumentRecord, DocumentSet};
use restyle_lib::export::{export_all, export_document, OVERRIDE_STYLE_ID};
use restyle_lib::store::PropertyRecord;

const PAGE: &str = "<!DOCTYPE html>\n<html><head><title>t</title></head>\
<body><p id=\"intro\">Hi</p></body></html>";

fn markup_record(source: &str) -> DocumentRecord {
    DocumentRecord::new("index.html".into(), DocumentKind::Markup, source.into())
}

#[test]
fn unmodified_document_exports_byte_for_byte() {
    let record = markup_record(PAGE);
    let exported = export_document(&record).unwrap();
    assert_eq!(exported, PAGE);
    assert!(!exported.contains(OVERRIDE_STYLE_ID));
}

#[test]
fn id_selector_edit_lands_inline_and_in_the_override_block() {
    let mut record = markup_record(PAGE);
    record.merge_modification("#intro", &PropertyRecord::from_pairs([("font-size", "20px")]));
    let exported = export_document(&record).unwrap();

    assert!(
        exported.contains("<p id=\"intro\" style=\"font-size: 20px\">"),
        "{exported}"
    );
    assert!(
        exported.contains("#intro {\n  font-size: 20px !important;\n}"),
        "{exported}"
    );
    // Block sits inside head.
    let head_close = exported.find("</head>").unwrap();
    let block = exported.find(OVERRIDE_STYLE_ID).unwrap();
    assert!(block < head_close);
}

#[test]
fn root_scope_color_becomes_an_override_rule_without_inline_duplicate() {
    let mut record = markup_record(PAGE);
    record.merge_modification("body", &PropertyRecord::from_pairs([("color", "#111111")]));
    let exported = export_document(&record).unwrap();

    assert!(
        exported.contains("body {\n  color: #111111 !important;\n}"),
        "{exported}"
    );
    // No inline duplicate on the root node, and nothing else picked up an
    // inline color.
    assert!(!exported.contains("<body style="), "{exported}");
    assert!(!exported.contains("style=\"color"), "{exported}");
}

#[test]
fn root_scope_splits_inheritable_from_direct_properties() {
    let mut record = markup_record(PAGE);
    record.merge_modification(
        "body",
        &PropertyRecord::from_pairs([("color", "#ff0000"), ("background-color", "#eeeeee")]),
    );
    let exported = export_document(&record).unwrap();

    // The non-inheritable property is applied inline; the inheritable one
    // only through the rule.
    assert!(
        exported.contains("<body style=\"background-color: #eeeeee\">"),
        "{exported}"
    );
    assert!(exported.contains("color: #ff0000 !important;"), "{exported}");
    assert!(!exported.contains("style=\"color"), "{exported}");
}

#[test]
fn positional_selectors_only_touch_their_node() {
    let source = "<!DOCTYPE html>\n<html><head></head><body>\
<div>first</div><div>second</div></body></html>";
    let mut record = markup_record(source);
    record.merge_modification(
        "body > div:nth-of-type(2)",
        &PropertyRecord::from_pairs([("color", "red")]),
    );
    let exported = export_document(&record).unwrap();
    assert!(
        exported.contains("<div style=\"color: red\">second</div>"),
        "{exported}"
    );
    assert!(exported.contains("<div>first</div>"), "{exported}");
}

#[test]
fn text_edits_change_node_text_but_never_the_override_block() {
    let mut record = markup_record(PAGE);
    let mut delta = PropertyRecord::new();
    delta.set("text-content", "Hello there");
    delta.set("color", "blue");
    record.merge_modification("#intro", &delta);
    let exported = export_document(&record).unwrap();

    assert!(exported.contains(">Hello there</p>"), "{exported}");
    assert!(!exported.contains("text-content"), "{exported}");
    assert!(exported.contains("color: blue !important;"), "{exported}");
}

#[test]
fn stale_selectors_do_not_break_the_export() {
    let mut record = markup_record(PAGE);
    record.merge_modification("#vanished", &PropertyRecord::from_pairs([("color", "red")]));
    record.merge_modification("#intro", &PropertyRecord::from_pairs([("color", "green")]));
    let exported = export_document(&record).unwrap();
    // The stale selector still gets its rule (it may exist again when the
    // artifact is opened elsewhere), and the live one applied normally.
    assert!(exported.contains("#vanished {\n  color: red !important;\n}"));
    assert!(exported.contains("<p id=\"intro\" style=\"color: green\">"));
}

#[test]
fn reset_then_export_matches_the_untouched_export() {
    let mut record = markup_record(PAGE);
    let baseline = export_document(&record).unwrap();
    record.merge_modification("#intro", &PropertyRecord::from_pairs([("color", "red")]));
    record.merge_modification("body", &PropertyRecord::from_pairs([("color", "blue")]));
    assert_ne!(export_document(&record).unwrap(), baseline);
    record.reset();
    assert!(record.modifications().get("#intro").is_none());
    assert_eq!(export_document(&record).unwrap(), baseline);
}

#[test]
fn selector_order_in_the_block_is_insertion_order() {
    let mut record = markup_record(PAGE);
    record.merge_modification("p", &PropertyRecord::from_pairs([("margin", "0px")]));
    record.merge_modification("#intro", &PropertyRecord::from_pairs([("color", "red")]));
    let exported = export_document(&record).unwrap();
    let p_rule = exported.find("p {\n").unwrap();
    let id_rule = exported.find("#intro {\n").unwrap();
    assert!(p_rule < id_rule);
}

#[test]
fn batch_export_recovers_per_file() {
    let mut set = DocumentSet::new();
    let generation = set.begin_batch();
    let mut bad_css = DocumentRecord::new(
        "broken.css".into(),
        DocumentKind::Stylesheet,
        "} nope {".into(),
    );
    bad_css.merge_modification("p", &PropertyRecord::from_pairs([("color", "red")]));
    set.commit_batch(
        generation,
        vec![markup_record(PAGE), bad_css],
    )
    .unwrap();

    let outcome = export_all(&set).unwrap();
    assert_eq!(outcome.files.len(), 1);
    assert_eq!(outcome.files[0].name, "index.html");
    assert_eq!(outcome.errors.len(), 1);
}

#[test]
fn empty_set_cannot_export() {
    let set = DocumentSet::new();
    assert!(export_all(&set).is_err());
}
