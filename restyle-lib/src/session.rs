//! The outer-context editing session: owns the document registry and the
//! panel, talks to the preview surface over the channel, and keeps the
//! modification store in lockstep with what the surface renders.
//!
//! All store writes happen here, synchronously with the edit input; the
//! session is the single writer the registry design calls for.

use crate::channel::{Selection, SurfaceCommand, SurfaceEvent};
use crate::document::{read_batch, validate_batch, DocumentSet, SourceFile};
use crate::error::{ExportError, IngestError};
use crate::export::{self, ExportOutcome};
use crate::panel::{self, ControlPanel};
use crate::store::{EditDelta, PropertyRecord, TEXT_CONTENT_PROPERTY};
use crate::style::selector::is_root_scope;
use crate::surface::{PreviewSurface, SurfaceHandle};
use std::path::PathBuf;

#[derive(Default)]
pub struct EditorSession {
    documents: DocumentSet,
    panel: ControlPanel,
    surface: Option<SurfaceHandle>,
    surface_ready: bool,
}

impl EditorSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ingests an upload batch from disk. Individual rejects come back as
    /// the Ok value; batch-level failures (nothing usable, no markup, a
    /// newer batch superseding this one) are the Err. On success the
    /// previous document set is fully replaced and the preview respawns.
    pub async fn ingest_paths(
        &mut self,
        paths: &[PathBuf],
    ) -> Result<Vec<IngestError>, IngestError> {
        let generation = self.documents.begin_batch();
        let (files, mut rejected) = read_batch(paths).await;
        let outcome = validate_batch(files)?;
        rejected.extend(outcome.rejected);
        self.documents.commit_batch(generation, outcome.records)?;
        self.panel.clear();
        self.render_active();
        Ok(rejected)
    }

    /// Ingests an in-memory batch; same semantics as `ingest_paths`.
    pub fn load(&mut self, files: Vec<SourceFile>) -> Result<Vec<IngestError>, IngestError> {
        let generation = self.documents.begin_batch();
        let outcome = validate_batch(files)?;
        self.documents.commit_batch(generation, outcome.records)?;
        self.panel.clear();
        self.render_active();
        Ok(outcome.rejected)
    }

    /// (Re)spawns the preview surface for the active markup document and
    /// replays the recorded modifications so the fresh surface matches the
    /// store. Without an active document the preview simply stays dark.
    pub fn render_active(&mut self) {
        self.surface = None;
        self.surface_ready = false;
        let Some(active) = self.documents.active_markup() else {
            return;
        };
        let markup = active.original_source().to_string();
        let mut replay = Vec::new();
        for (selector, record) in active.modifications().iter() {
            if let Some(text) = record.get(TEXT_CONTENT_PROPERTY) {
                replay.push(SurfaceCommand::ApplyText {
                    selector: selector.to_string(),
                    text: text.to_string(),
                });
            }
            let mut styles = record.clone();
            styles.remove(TEXT_CONTENT_PROPERTY);
            if !styles.is_empty() {
                replay.push(SurfaceCommand::ApplyStyles {
                    selector: selector.to_string(),
                    delta: styles,
                });
            }
        }
        let stylesheets: Vec<SourceFile> = self
            .documents
            .stylesheets()
            .map(|d| SourceFile {
                name: d.name.clone(),
                content: d.original_source().to_string(),
            })
            .collect();

        let handle = PreviewSurface::spawn(markup, stylesheets);
        for command in replay {
            let _ = handle.commands.send(command);
        }
        self.surface = Some(handle);
    }

    /// Asks the surface to target the first node matching the query; the
    /// resulting `Selected` event comes back through `next_event`.
    pub fn target(&mut self, query: &str) {
        self.send_command(SurfaceCommand::Target {
            query: query.to_string(),
        });
    }

    pub fn hover(&mut self, query: &str) {
        self.send_command(SurfaceCommand::Hover {
            query: query.to_string(),
        });
    }

    /// Records one edit and forwards it to the live surface. The property
    /// name and value are normalized here; the surface treats values as
    /// opaque. Root-scope edits resend the full accumulated record so the
    /// applier can replace its synthesized rule wholesale.
    pub fn edit(&mut self, selector: &str, property: &str, value: &str) {
        let property = panel::normalize_property(property);
        let value = panel::normalize_value(&property, value);
        if property == TEXT_CONTENT_PROPERTY {
            self.set_text(selector, &value);
            return;
        }
        let delta = PropertyRecord::from_pairs([(property.as_str(), value.as_str())]);
        let Some(outgoing) = self.record_edit(selector, delta) else {
            return;
        };
        self.send_command(SurfaceCommand::ApplyStyles {
            selector: selector.to_string(),
            delta: outgoing,
        });
    }

    fn record_edit(&mut self, selector: &str, delta: PropertyRecord) -> Option<PropertyRecord> {
        let Some(doc) = self.documents.active_markup_mut() else {
            log::warn!("edit ignored: no active document");
            return None;
        };
        doc.merge_modification(selector, &delta);
        if is_root_scope(selector) {
            let mut full = doc
                .modifications()
                .get(selector)
                .cloned()
                .unwrap_or_default();
            full.remove(TEXT_CONTENT_PROPERTY);
            Some(full)
        } else {
            Some(delta)
        }
    }

    pub fn apply(&mut self, delta: &EditDelta) {
        self.edit(&delta.selector, &delta.property, &delta.value);
    }

    /// Records an edit against a specific (typically stylesheet) document.
    /// Stylesheet records only surface at export time; the live preview
    /// already carries the sheet's original rules.
    pub fn edit_in(&mut self, file: &str, selector: &str, property: &str, value: &str) {
        let property = panel::normalize_property(property);
        let value = panel::normalize_value(&property, value);
        let Some(doc) = self.documents.document_mut(file) else {
            log::warn!("edit ignored: no document named {}", file);
            return;
        };
        let delta = PropertyRecord::from_pairs([(property.as_str(), value.as_str())]);
        doc.merge_modification(selector, &delta);
    }

    /// Records and applies a text-content edit. The root scopes never take
    /// text edits; replacing the whole page body is not a styling action.
    pub fn set_text(&mut self, selector: &str, text: &str) {
        if is_root_scope(selector) {
            log::warn!("text editing is not available for {}", selector);
            return;
        }
        let Some(doc) = self.documents.active_markup_mut() else {
            log::warn!("text edit ignored: no active document");
            return;
        };
        let mut delta = PropertyRecord::new();
        delta.set(TEXT_CONTENT_PROPERTY, text);
        doc.merge_modification(selector, &delta);
        self.send_command(SurfaceCommand::ApplyText {
            selector: selector.to_string(),
            text: text.to_string(),
        });
    }

    pub fn deselect(&mut self) {
        self.panel.clear();
        self.send_command(SurfaceCommand::Deselect);
    }

    /// Restores the active document to its uploaded baseline: clears the
    /// store, drops the selection, respawns the preview from the original
    /// source.
    pub fn reset_active(&mut self) {
        if let Some(name) = self.documents.active_name().map(str::to_string) {
            self.documents.reset_document(&name);
        }
        self.panel.clear();
        self.render_active();
    }

    pub fn reset_all(&mut self) {
        self.documents.reset_all();
        self.panel.clear();
        self.render_active();
    }

    /// Awaits the next surface event, folding it into panel state first.
    pub async fn next_event(&mut self) -> Option<SurfaceEvent> {
        let event = { self.surface.as_mut()?.events.recv().await }?;
        self.absorb(&event);
        Some(event)
    }

    /// Drains whatever events already arrived; returns how many.
    pub fn pump_events(&mut self) -> usize {
        let mut drained = Vec::new();
        if let Some(handle) = self.surface.as_mut() {
            while let Ok(event) = handle.events.try_recv() {
                drained.push(event);
            }
        }
        let count = drained.len();
        for event in drained {
            self.absorb(&event);
        }
        count
    }

    fn absorb(&mut self, event: &SurfaceEvent) {
        match event {
            SurfaceEvent::Ready => {
                self.surface_ready = true;
            }
            SurfaceEvent::Selected(selection) => {
                self.panel.select(selection.clone());
            }
            SurfaceEvent::Hovered { selector } => {
                // Advisory; nothing in the panel reacts to hover.
                log::debug!("hover over {}", selector);
            }
        }
    }

    fn send_command(&mut self, command: SurfaceCommand) {
        let Some(handle) = &self.surface else {
            log::debug!("no preview surface; command dropped");
            return;
        };
        if handle.commands.send(command).is_err() {
            // The preview degrades to inert; the session carries on.
            log::warn!("preview surface went away; command dropped");
        }
    }

    pub fn export(&self) -> Result<ExportOutcome, ExportError> {
        export::export_all(&self.documents)
    }

    pub fn documents(&self) -> &DocumentSet {
        &self.documents
    }

    pub fn selection(&self) -> Option<&Selection> {
        self.panel.selection()
    }

    pub fn surface_ready(&self) -> bool {
        self.surface_ready
    }

    /// The value a control should display for the current selection:
    /// stored modification first, live computed style as the fallback.
    pub fn display_value(&self, property: &str) -> Option<String> {
        let selector = &self.panel.selection()?.selector;
        let record = self
            .documents
            .active_markup()
            .and_then(|d| d.modifications().get(selector));
        self.panel.display_value(record, property)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn markup_batch() -> Vec<SourceFile> {
        vec![SourceFile {
            name: "index.html".into(),
            content: "<html><head></head><body><p id=\"intro\">Hi</p></body></html>".into(),
        }]
    }

    #[test]
    fn edits_merge_into_the_active_document() {
        let mut session = EditorSession::new();
        session.load(markup_batch()).unwrap();
        session.edit("#intro", "fontSize", "20");
        session.edit("#intro", "color", "#ff0000");
        session.edit("#intro", "fontSize", "24");
        let doc = session.documents().active_markup().unwrap();
        let record = doc.modifications().get("#intro").unwrap();
        assert_eq!(record.get("font-size"), Some("24px"));
        assert_eq!(record.get("color"), Some("#ff0000"));
    }

    #[test]
    fn root_text_edits_are_refused() {
        let mut session = EditorSession::new();
        session.load(markup_batch()).unwrap();
        session.set_text("body", "gone");
        let doc = session.documents().active_markup().unwrap();
        assert!(doc.modifications().get("body").is_none());
    }

    #[test]
    fn reset_clears_modifications_only() {
        let mut session = EditorSession::new();
        session.load(markup_batch()).unwrap();
        session.edit("#intro", "color", "red");
        session.reset_active();
        let doc = session.documents().active_markup().unwrap();
        assert!(doc.modifications().is_empty());
        assert!(doc.original_source().contains("<p id=\"intro\">Hi</p>"));
    }

    #[test]
    fn edits_without_documents_are_ignored() {
        let mut session = EditorSession::new();
        session.edit("#intro", "color", "red");
        assert!(session.documents().is_empty());
    }
}
