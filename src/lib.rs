//! # tandem-collab — client-side synchronization for collaborative editing
//!
//! Keeps one participant's view of a shared document and its collaborators'
//! presence consistent with a central relay over an unreliable, asynchronous
//! WebSocket connection.
//!
//! ## Architecture
//!
//! ```text
//! local edit ──► CollabSession ──► OperationSync ──► CollabClient ──► wire
//!                     │                                   │
//!                     ▼                                   ▼
//!               PresenceTracker ◄── dispatch ◄── frame ◄─ reader task
//!                     │
//!                     ▼
//!                OverlaySink (editor adapter)
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] — JSON wire messages (closed tagged enums) and frame
//!   splitting
//! - [`color`] — deterministic participant color slots
//! - [`surface`] — edit-span algebra, position mapping, the text-surface
//!   trait and an in-memory buffer
//! - [`presence`] — roster and remote cursor/selection overlays, maintained
//!   by a plain reducer and remapped across document changes
//! - [`sync`] — sync-version tracking and operation translation
//! - [`client`] — WebSocket lifecycle, non-blocking send path, bounded
//!   exponential-backoff reconnect
//! - [`router`] — per-line frame parsing and exhaustive message dispatch

pub mod client;
pub mod color;
pub mod presence;
pub mod protocol;
pub mod router;
pub mod surface;
pub mod sync;

// Re-exports for convenience
pub use client::{
    ClientConfig, ClientEvent, CollabClient, ConnectionState, ReconnectPolicy, Session,
};
pub use color::{color_for, slot_for, COLOR_COUNT, PARTICIPANT_COLORS};
pub use presence::{
    CaretOverlay, HighlightOverlay, OverlayEvent, OverlayRenderData, OverlaySet, OverlaySink,
    PresenceTracker, RemoteParticipant,
};
pub use protocol::{
    split_frame, ClientMessage, EditPayload, ProtocolError, RosterUser, ServerMessage,
};
pub use router::CollabSession;
pub use surface::{Bias, BufferSurface, EditError, EditList, EditSpan, EditWindow, TextSurface};
pub use sync::{operation_from_payload, Operation, OperationSync};
