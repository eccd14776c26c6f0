//! The synchronization protocol between the control panel context and the
//! sandboxed preview surface.
//!
//! Two unbounded channels, one per direction. Delivery is best-effort and
//! ordered within a direction; there is no acknowledgment and no retry.
//! This is a UI-latency channel, not a durability channel. Every command is
//! level-triggered: it carries everything needed to apply it, so nothing
//! depends on a prior message having arrived.

use crate::store::PropertyRecord;
use std::collections::HashMap;
use tokio::sync::mpsc;

/// The active targeting state, produced inside the surface and consumed by
/// the control panel. At most one selection exists at a time.
#[derive(Debug, Clone)]
pub struct Selection {
    pub tag_name: String,
    pub id: String,
    pub class_name: String,
    pub selector: String,
    pub text_content: String,
    pub computed_styles: HashMap<String, String>,
}

/// Events flowing outward from the preview surface.
#[derive(Debug, Clone)]
pub enum SurfaceEvent {
    /// The surface finished parsing and is processing commands.
    Ready,
    /// The user targeted a node.
    Selected(Selection),
    /// Advisory hover notification; receivers may ignore it.
    Hovered { selector: String },
}

/// Commands flowing inward to the preview surface.
#[derive(Debug, Clone)]
pub enum SurfaceCommand {
    /// Target the first node matching the query. Stand-in for the pointer
    /// event inside the surface; the canonical selector in the resulting
    /// `Selected` event always comes from the resolver, not from the query.
    Target { query: String },
    /// Advisory hover over the first node matching the query.
    Hover { query: String },
    /// Apply a property delta to every node the selector still matches.
    ApplyStyles {
        selector: String,
        delta: PropertyRecord,
    },
    /// Replace the text content of every node the selector still matches.
    ApplyText { selector: String, text: String },
    /// Clear the active selection.
    Deselect,
}

pub type CommandSender = mpsc::UnboundedSender<SurfaceCommand>;
pub type CommandReceiver = mpsc::UnboundedReceiver<SurfaceCommand>;
pub type EventSender = mpsc::UnboundedSender<SurfaceEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<SurfaceEvent>;

/// Builds the two directed channels connecting panel and surface.
pub fn channel_pair() -> ((CommandSender, CommandReceiver), (EventSender, EventReceiver)) {
    (mpsc::unbounded_channel(), mpsc::unbounded_channel())
}
