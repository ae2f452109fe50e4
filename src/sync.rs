//! Bidirectional translation between local edits and wire operations,
//! plus tracking of the sync version.
//!
//! Synchronization is span-based, decided once: every local change produces
//! an incremental operation derived from the change description, and
//! whole-document replacement exists only as the explicit session
//! establishment path driven by the relay's welcome. The version counter
//! reflects the number of operations applied to this participant's view and
//! never decreases.

use crate::protocol::EditPayload;
use crate::surface::{EditError, EditList, EditSpan, TextSurface};

/// A document transformation tagged with its origin and base version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    /// Relay-assigned identifier of the participant that produced the edit.
    pub origin_id: String,
    /// Sync version of the document the edit applies to.
    pub base_version: u64,
    pub edit: EditList,
}

/// Expand a wire triple into a full-coverage span list for a document of
/// `doc_len` chars.
pub fn operation_from_payload(
    origin_id: &str,
    base_version: u64,
    payload: &EditPayload,
    doc_len: usize,
) -> Result<Operation, EditError> {
    let covered = payload.retain + payload.delete;
    if covered > doc_len {
        return Err(EditError::OutOfBounds { at: covered, len: doc_len });
    }
    let edit = EditList::from_spans(vec![
        EditSpan::Retain(payload.retain),
        EditSpan::Delete(payload.delete),
        EditSpan::Insert(payload.insert.clone()),
        EditSpan::Retain(doc_len - covered),
    ]);
    Ok(Operation { origin_id: origin_id.to_string(), base_version, edit })
}

/// Tracks the sync version and converts edits to and from operations.
#[derive(Debug, Clone, Default)]
pub struct OperationSync {
    version: u64,
}

impl OperationSync {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Adopt the relay's version. Session establishment only; everywhere
    /// else the counter moves through the apply/capture paths.
    pub fn set_version(&mut self, version: u64) {
        self.version = version;
    }

    /// Package a local change as an operation stamped with the current
    /// version, then advance the version. Returns `None` for an identity
    /// edit (nothing to transmit).
    pub fn capture_local_change(
        &mut self,
        self_id: Option<&str>,
        edit: &EditList,
    ) -> Option<Operation> {
        if edit.is_identity() {
            return None;
        }
        let op = Operation {
            origin_id: self_id.unwrap_or_default().to_string(),
            base_version: self.version,
            edit: edit.clone(),
        };
        self.version += 1;
        Some(op)
    }

    /// Apply a remote operation to the local document.
    ///
    /// An echo of our own edit (`origin_id == self_id`) is ignored. On
    /// translation failure the operation is logged and dropped and the
    /// document keeps its last valid state. Returns whether the document
    /// changed.
    pub fn apply_remote_operation(
        &mut self,
        op: &Operation,
        self_id: Option<&str>,
        surface: &mut dyn TextSurface,
    ) -> bool {
        if self_id.is_some() && self_id == Some(op.origin_id.as_str()) {
            log::debug!("ignoring echo of own operation at version {}", op.base_version);
            return false;
        }
        match surface.apply_edit(&op.edit) {
            Ok(()) => {
                self.version += 1;
                true
            }
            Err(e) => {
                log::warn!(
                    "dropping operation from {} (base version {}): {e}",
                    op.origin_id,
                    op.base_version
                );
                false
            }
        }
    }

    /// Replace the whole document with the relay's authoritative copy.
    /// Session establishment only; the version is set separately from the
    /// welcome payload.
    pub fn apply_full_document(&mut self, text: &str, surface: &mut dyn TextSurface) {
        log::info!("replacing local document with authoritative copy ({} bytes)", text.len());
        surface.replace_all(text);
    }
}
