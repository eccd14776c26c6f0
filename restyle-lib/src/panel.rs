//! Control panel state: which controls apply to which element, value
//! normalization for outgoing edits, and the display-value lookup.
//!
//! The visibility table is resolved once at initialization into an explicit
//! tag → ordered-property-keys mapping, so the synchronization path never
//! branches on tag names.

use crate::channel::Selection;
use crate::store::PropertyRecord;
use once_cell::sync::Lazy;
use std::collections::HashMap;

const TYPOGRAPHY: &[&str] = &[
    "font-size",
    "font-weight",
    "color",
    "font-family",
    "line-height",
    "letter-spacing",
    "text-align",
    "text-transform",
];

const BOX: &[&str] = &["margin", "padding", "width", "height", "display", "overflow", "visibility"];

const POSITIONING: &[&str] = &["position", "top", "right", "bottom", "left", "z-index"];

const INTERACTION: &[&str] = &["cursor", "pointer-events", "user-select", "touch-action", "resize"];

const BORDER: &[&str] = &["border-width", "border-style", "border-color", "border-radius"];

const EFFECTS: &[&str] = &["box-shadow", "opacity", "filter", "outline", "transform", "transition", "will-change"];

/// Tags treated as text-bearing: they expose typography controls and allow
/// text-content editing.
const TEXT_TAGS: &[&str] = &[
    "button", "a", "h1", "h2", "h3", "h4", "h5", "h6", "p", "span", "label", "li",
];

const CONTAINER_TAGS: &[&str] = &[
    "div", "ul", "ol", "form", "section", "nav", "footer", "header",
];

fn compose(groups: &[&[&'static str]]) -> Vec<&'static str> {
    let mut keys = Vec::new();
    for group in groups {
        for &key in *group {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
    }
    keys
}

/// tag → ordered applicable property keys, resolved once.
static CONTROL_VISIBILITY: Lazy<HashMap<&'static str, Vec<&'static str>>> = Lazy::new(|| {
    let mut table: HashMap<&'static str, Vec<&'static str>> = HashMap::new();

    let text_controls = compose(&[
        TYPOGRAPHY,
        &["background-color"],
        BOX,
        POSITIONING,
        INTERACTION,
        BORDER,
        EFFECTS,
    ]);
    for &tag in TEXT_TAGS {
        table.insert(tag, text_controls.clone());
    }

    let container_controls = compose(&[
        &["background-color"],
        BORDER,
        BOX,
        POSITIONING,
        INTERACTION,
        EFFECTS,
    ]);
    for &tag in CONTAINER_TAGS {
        table.insert(tag, container_controls.clone());
    }

    table.insert(
        "img",
        compose(&[
            &["width", "height", "margin", "display"],
            POSITIONING,
            INTERACTION,
            BORDER,
            EFFECTS,
        ]),
    );
    table.insert(
        "input",
        compose(&[
            &["background-color"],
            BORDER,
            BOX,
            POSITIONING,
            INTERACTION,
            EFFECTS,
        ]),
    );

    // The body row is the safe subset: no positioning and no interaction
    // controls for the whole page.
    table.insert(
        "body",
        compose(&[
            TYPOGRAPHY,
            &["background-color", "margin", "padding", "overflow"],
            BORDER,
            &["box-shadow", "opacity", "filter"],
        ]),
    );

    table.insert(
        "default",
        compose(&[
            TYPOGRAPHY,
            &["background-color"],
            BOX,
            POSITIONING,
            INTERACTION,
            BORDER,
            EFFECTS,
        ]),
    );
    table
});

/// Ordered property keys applicable to a tag; unknown tags use the
/// default row.
pub fn visible_controls(tag: &str) -> &'static [&'static str] {
    let tag = tag.to_lowercase();
    CONTROL_VISIBILITY
        .get(tag.as_str())
        .or_else(|| CONTROL_VISIBILITY.get("default"))
        .map(|v| v.as_slice())
        .unwrap_or(&[])
}

pub fn supports_text_edit(tag: &str) -> bool {
    TEXT_TAGS.contains(&tag.to_lowercase().as_str())
}

/// Properties whose bare numeric values get a px suffix.
const DEFAULT_PX_PROPERTIES: &[&str] = &[
    "font-size",
    "letter-spacing",
    "border-width",
    "border-radius",
    "top",
    "right",
    "bottom",
    "left",
];

const SIZE_KEYWORDS: &[&str] = &[
    "auto",
    "fit-content",
    "max-content",
    "min-content",
    "inherit",
    "initial",
    "unset",
];

fn is_plain_number(value: &str) -> bool {
    let digits = value.strip_prefix('-').unwrap_or(value);
    if digits.is_empty() {
        return false;
    }
    let mut dots = 0;
    for ch in digits.chars() {
        match ch {
            '0'..='9' => {}
            '.' => {
                dots += 1;
                if dots > 1 {
                    return false;
                }
            }
            _ => return false,
        }
    }
    !digits.starts_with('.') && !digits.ends_with('.')
}

/// camelCase → kebab-case; already-kebab names pass through.
pub fn normalize_property(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut prev_lower = false;
    for ch in name.trim().chars() {
        if ch.is_ascii_uppercase() {
            if prev_lower {
                out.push('-');
            }
            out.push(ch.to_ascii_lowercase());
            prev_lower = false;
        } else {
            prev_lower = ch.is_ascii_lowercase() || ch.is_ascii_digit();
            out.push(ch);
        }
    }
    out
}

/// Normalizes a raw widget value for the wire: bare numbers get the
/// property's default unit, multi-value spacing gets per-token treatment,
/// size keywords pass through. The applier treats whatever comes out of
/// here as an opaque string.
pub fn normalize_value(property: &str, raw: &str) -> String {
    let value = raw.trim();
    if value.is_empty() {
        return String::new();
    }
    match property {
        "margin" | "padding" => value
            .split_whitespace()
            .map(|token| {
                if token == "auto" {
                    token.to_string()
                } else if is_plain_number(token) {
                    format!("{}px", token)
                } else {
                    token.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join(" "),
        "width" | "height" => {
            if SIZE_KEYWORDS.contains(&value) {
                value.to_string()
            } else if is_plain_number(value) {
                format!("{}px", value)
            } else {
                value.to_string()
            }
        }
        "z-index" => {
            if matches!(value, "auto" | "inherit" | "initial" | "unset") {
                value.to_string()
            } else if value.parse::<i64>().is_ok() {
                value.to_string()
            } else {
                value
                    .chars()
                    .take_while(|c| c.is_ascii_digit() || *c == '-')
                    .collect::<String>()
                    .parse::<i64>()
                    .unwrap_or(0)
                    .to_string()
            }
        }
        p if DEFAULT_PX_PROPERTIES.contains(&p) => {
            if is_plain_number(value) {
                format!("{}px", value)
            } else {
                value.to_string()
            }
        }
        _ => value.to_string(),
    }
}

/// Panel-side view of the current targeting state.
#[derive(Debug, Default)]
pub struct ControlPanel {
    selection: Option<Selection>,
}

impl ControlPanel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select(&mut self, selection: Selection) {
        self.selection = Some(selection);
    }

    pub fn clear(&mut self) {
        self.selection = None;
    }

    pub fn selection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }

    /// The value a control should display: the stored modification when
    /// one exists, otherwise the live computed style from the selection.
    pub fn display_value(
        &self,
        record: Option<&PropertyRecord>,
        property: &str,
    ) -> Option<String> {
        if let Some(value) = record.and_then(|r| r.get(property)) {
            return Some(value.to_string());
        }
        self.selection
            .as_ref()
            .and_then(|s| s.computed_styles.get(property).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn bare_numbers_get_default_units() {
        assert_eq!(normalize_value("font-size", "20"), "20px");
        assert_eq!(normalize_value("font-size", "20px"), "20px");
        assert_eq!(normalize_value("letter-spacing", "normal"), "normal");
        assert_eq!(normalize_value("top", "-4"), "-4px");
    }

    #[test]
    fn spacing_values_normalize_per_token() {
        assert_eq!(normalize_value("margin", "10 auto"), "10px auto");
        assert_eq!(normalize_value("padding", "1 2 3 4"), "1px 2px 3px 4px");
        assert_eq!(normalize_value("margin", "1em auto"), "1em auto");
    }

    #[test]
    fn size_keywords_pass_through() {
        assert_eq!(normalize_value("width", "fit-content"), "fit-content");
        assert_eq!(normalize_value("width", "50"), "50px");
        assert_eq!(normalize_value("height", "75%"), "75%");
    }

    #[test]
    fn z_index_is_integer_or_keyword() {
        assert_eq!(normalize_value("z-index", "10"), "10");
        assert_eq!(normalize_value("z-index", "auto"), "auto");
        assert_eq!(normalize_value("z-index", "12abc"), "12");
    }

    #[test]
    fn unitless_properties_stay_untouched() {
        assert_eq!(normalize_value("line-height", "1.5"), "1.5");
        assert_eq!(normalize_value("opacity", "0.5"), "0.5");
    }

    #[test]
    fn camel_case_property_names_become_kebab() {
        assert_eq!(normalize_property("fontSize"), "font-size");
        assert_eq!(normalize_property("backgroundColor"), "background-color");
        assert_eq!(normalize_property("textContent"), "text-content");
        assert_eq!(normalize_property("color"), "color");
        assert_eq!(normalize_property("border-width"), "border-width");
    }

    #[test]
    fn body_row_excludes_positioning_and_interaction() {
        let body = visible_controls("body");
        assert!(body.contains(&"color"));
        assert!(body.contains(&"overflow"));
        assert!(!body.contains(&"position"));
        assert!(!body.contains(&"cursor"));
    }

    #[test]
    fn unknown_tags_use_default_row() {
        assert_eq!(visible_controls("article"), visible_controls("default"));
        assert!(visible_controls("ARTICLE").contains(&"display"));
    }

    #[test]
    fn text_edit_is_limited_to_text_tags() {
        assert!(supports_text_edit("p"));
        assert!(supports_text_edit("H2"));
        assert!(!supports_text_edit("div"));
        assert!(!supports_text_edit("body"));
    }

    #[test]
    fn display_values_prefer_the_store() {
        let mut panel = ControlPanel::new();
        let mut computed = HashMap::new();
        computed.insert("font-size".to_string(), "16px".to_string());
        panel.select(Selection {
            tag_name: "p".into(),
            id: String::new(),
            class_name: String::new(),
            selector: "#x".into(),
            text_content: String::new(),
            computed_styles: computed,
        });
        let record = PropertyRecord::from_pairs([("font-size", "20px")]);
        assert_eq!(
            panel.display_value(Some(&record), "font-size"),
            Some("20px".to_string())
        );
        assert_eq!(
            panel.display_value(None, "font-size"),
            Some("16px".to_string())
        );
        assert_eq!(panel.display_value(None, "margin"), None);
    }
}
