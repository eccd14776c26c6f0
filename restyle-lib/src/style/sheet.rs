//! Owned stylesheet model, parsed once with LightningCSS.
//!
//! LightningCSS keeps borrowed data tied to the input string; everything the
//! engine needs is copied out into owned rules so sheets can live alongside
//! the document for the whole session.

use lightningcss::error::{Error as LcssError, ParserError};
use lightningcss::printer::PrinterOptions;
use lightningcss::rules::{style::StyleRule, CssRule};
use lightningcss::stylesheet::{ParserOptions, StyleSheet as LightningStyleSheet};
use lightningcss::traits::ToCss;
use std::fmt;
use thiserror::Error;

/// A fully-owned stylesheet: style rules only. At-rules that cannot carry
/// style declarations (@font-face, @keyframes, ...) are skipped; @media
/// blocks are flattened, which is as much cascade awareness as this engine
/// claims.
#[derive(Debug, Default)]
pub struct OwnedStylesheet {
    pub rules: Vec<OwnedRule>,
}

#[derive(Debug, Clone)]
pub struct OwnedRule {
    /// e.g. "div", ".red", "#header"
    pub selectors: Vec<String>,
    /// Declarations in source order.
    pub declarations: Vec<OwnedDeclaration>,
    /// Position across every sheet loaded into a surface; ties in the
    /// cascade break on this.
    pub source_order: u32,
}

#[derive(Debug, Clone)]
pub struct OwnedDeclaration {
    pub property: String,
    pub value: String,
    pub important: bool,
}

impl fmt::Display for OwnedRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Selectors: {:?}", self.selectors)?;
        for decl in &self.declarations {
            writeln!(f, "  {}: {}", decl.property, decl.value)?;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
#[error("stylesheet parse failed: {0}")]
pub struct StylesheetParseError(pub String);

/// Parse a raw CSS string and convert it to a fully-owned stylesheet.
/// `order_base` offsets the source order so several sheets keep one global
/// ordering.
pub fn parse_stylesheet(
    css_text: &str,
    order_base: u32,
) -> Result<OwnedStylesheet, StylesheetParseError> {
    let parser_opts = ParserOptions::default();
    let sheet = LightningStyleSheet::parse(css_text, parser_opts)
        .map_err(|e: LcssError<ParserError<'_>>| StylesheetParseError(e.to_string()))?;

    let mut owned_rules = Vec::new();
    let mut order = order_base;
    for rule in &sheet.rules.0 {
        match rule {
            CssRule::Style(style_rule) => {
                owned_rules.push(convert_style_rule(style_rule, order));
                order += 1;
            }
            CssRule::Media(media_rule) => {
                // Flatten nested style rules; media conditions are not
                // evaluated.
                for inner_rule in &media_rule.rules.0 {
                    if let CssRule::Style(sr) = inner_rule {
                        owned_rules.push(convert_style_rule(sr, order));
                        order += 1;
                    }
                }
            }
            _ => {}
        }
    }

    Ok(OwnedStylesheet { rules: owned_rules })
}

/// Copies a single StyleRule's selectors and declarations into an OwnedRule.
fn convert_style_rule(style_rule: &StyleRule<'_>, source_order: u32) -> OwnedRule {
    let mut selectors_vec = Vec::new();
    for selector in &style_rule.selectors.0 {
        if let Ok(sel_str) = selector.to_css_string(Default::default()) {
            selectors_vec.push(sel_str);
        }
    }

    let block = &style_rule.declarations;
    let mut decls_vec = Vec::new();
    for property in &block.declarations {
        if let Some(decl) = convert_declaration(property, false) {
            decls_vec.push(decl);
        }
    }
    for property in &block.important_declarations {
        if let Some(decl) = convert_declaration(property, true) {
            decls_vec.push(decl);
        }
    }

    OwnedRule {
        selectors: selectors_vec,
        declarations: decls_vec,
        source_order,
    }
}

fn convert_declaration(
    property: &lightningcss::properties::Property<'_>,
    important: bool,
) -> Option<OwnedDeclaration> {
    let name = property.property_id().name().to_string();
    let value = property
        .value_to_css_string(PrinterOptions::default())
        .ok()?;
    Some(OwnedDeclaration {
        property: name,
        value,
        important,
    })
}
