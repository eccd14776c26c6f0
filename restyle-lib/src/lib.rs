//! Live style editing engine: stable node identity, selector-keyed
//! modification tracking, a message channel to a sandboxed preview
//! surface, and deterministic export of the accumulated edits.

pub mod channel;
pub mod document;
pub mod dom;
pub mod error;
pub mod export;
pub mod panel;
pub mod parser;
pub mod session;
pub mod store;
pub mod style;
pub mod surface;

pub use channel::{Selection, SurfaceCommand, SurfaceEvent};
pub use document::{DocumentKind, DocumentRecord, DocumentSet, SourceFile};
pub use error::{ExportError, IngestError};
pub use session::EditorSession;
pub use store::{EditDelta, PropertyRecord, SelectorMap};
