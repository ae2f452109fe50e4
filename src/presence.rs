//! Presence: roster and cursor/selection overlays for remote participants.
//!
//! ```text
//! selection message ──► PresenceTracker ──► OverlayEvent ──► OverlaySet
//!                            │                                   │
//! document change ──────────►│ (remap anchors)                   ▼
//!                            │                             OverlaySink
//! disconnect ───────────────►│ (clear)                   (editor adapter)
//! ```
//!
//! Overlay maintenance is a plain reducer: [`OverlaySet::apply`] folds
//! [`OverlayEvent`]s into the set and knows nothing about any rendering
//! facility. An editor integration implements [`OverlaySink`] and is handed
//! the projected overlay list after every change. Anchors are *remapped*
//! through each document edit, never recomputed, so an overlay at offset `k`
//! still points at the semantically same character after the edit.
//!
//! The local participant never appears here; self-filtering happens at the
//! router.

use std::collections::HashMap;

use crate::color::slot_for;
use crate::surface::{Bias, EditList};

/// Display metadata for one remote participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteParticipant {
    pub username: String,
    /// Stable for the identifier's lifetime; see [`crate::color`].
    pub color_slot: usize,
}

/// A labelled caret marker at one document position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaretOverlay {
    pub pos: usize,
    pub username: String,
}

/// A selection highlight spanning `[from, to)`. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HighlightOverlay {
    pub from: usize,
    pub to: usize,
}

/// Events folded into an [`OverlaySet`].
#[derive(Debug, Clone, PartialEq)]
pub enum OverlayEvent {
    /// Replace the participant's caret (remove-then-add; never a duplicate).
    UpsertCaret { participant_id: String, pos: usize, username: String },
    /// Replace the participant's highlight; `from == to` removes it.
    UpsertHighlight { participant_id: String, from: usize, to: usize },
    /// Drop both overlays for the participant; no-op if none exist.
    Remove(String),
    /// Transform every anchor through a document edit.
    Remap(EditList),
    /// Drop everything; used on disconnect.
    Clear,
}

/// All live overlays, at most one caret and one highlight per participant.
#[derive(Debug, Clone, Default)]
pub struct OverlaySet {
    carets: HashMap<String, CaretOverlay>,
    highlights: HashMap<String, HighlightOverlay>,
}

impl OverlaySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The reducer. Every overlay mutation in the crate goes through here.
    pub fn apply(&mut self, event: OverlayEvent) {
        match event {
            OverlayEvent::UpsertCaret { participant_id, pos, username } => {
                self.carets.remove(&participant_id);
                self.carets.insert(participant_id, CaretOverlay { pos, username });
            }
            OverlayEvent::UpsertHighlight { participant_id, from, to } => {
                self.highlights.remove(&participant_id);
                if from != to {
                    let (from, to) = if from <= to { (from, to) } else { (to, from) };
                    self.highlights.insert(participant_id, HighlightOverlay { from, to });
                }
            }
            OverlayEvent::Remove(participant_id) => {
                self.carets.remove(&participant_id);
                self.highlights.remove(&participant_id);
            }
            OverlayEvent::Remap(edit) => {
                for caret in self.carets.values_mut() {
                    caret.pos = edit.map_pos(caret.pos, Bias::After);
                }
                let mut collapsed = Vec::new();
                for (id, hl) in self.highlights.iter_mut() {
                    hl.from = edit.map_pos(hl.from, Bias::After);
                    hl.to = edit.map_pos(hl.to, Bias::Before);
                    if hl.from >= hl.to {
                        collapsed.push(id.clone());
                    }
                }
                for id in collapsed {
                    self.highlights.remove(&id);
                }
            }
            OverlayEvent::Clear => {
                self.carets.clear();
                self.highlights.clear();
            }
        }
    }

    pub fn caret(&self, participant_id: &str) -> Option<&CaretOverlay> {
        self.carets.get(participant_id)
    }

    pub fn highlight(&self, participant_id: &str) -> Option<&HighlightOverlay> {
        self.highlights.get(participant_id)
    }

    pub fn is_empty(&self) -> bool {
        self.carets.is_empty() && self.highlights.is_empty()
    }

    pub fn caret_count(&self) -> usize {
        self.carets.len()
    }

    pub fn highlight_count(&self) -> usize {
        self.highlights.len()
    }
}

/// One projected overlay, ready for an editor adapter to draw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverlayRenderData {
    Caret { participant_id: String, pos: usize, username: String, color_slot: usize },
    Highlight { participant_id: String, from: usize, to: usize, color_slot: usize },
}

/// Adapter seam to a concrete decoration/rendering facility.
pub trait OverlaySink {
    /// Replace the rendered overlays with this projection.
    fn render(&mut self, overlays: &[OverlayRenderData]);
}

/// Roster plus overlays for every *remote* participant.
#[derive(Debug, Clone, Default)]
pub struct PresenceTracker {
    roster: HashMap<String, RemoteParticipant>,
    overlays: OverlaySet,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or update a roster entry, assigning its color slot.
    pub fn add_participant(&mut self, participant_id: &str, username: impl Into<String>) {
        let username = username.into();
        let color_slot = slot_for(participant_id);
        log::debug!("roster add {participant_id} ({username}) slot {color_slot}");
        self.roster
            .insert(participant_id.to_string(), RemoteParticipant { username, color_slot });
    }

    /// Drop a participant entirely: roster entry and both overlays.
    /// Idempotent for unknown identifiers.
    pub fn remove_participant(&mut self, participant_id: &str) {
        self.roster.remove(participant_id);
        self.overlays.apply(OverlayEvent::Remove(participant_id.to_string()));
    }

    /// Replace the roster wholesale from a snapshot, excluding `self_id`.
    /// Overlays of participants no longer present are dropped.
    pub fn replace_roster<I>(&mut self, users: I, self_id: Option<&str>)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        self.roster.clear();
        for (participant_id, username) in users {
            if Some(participant_id.as_str()) == self_id {
                continue;
            }
            self.add_participant(&participant_id, username);
        }
        let gone: Vec<String> = self
            .overlay_ids()
            .filter(|id| !self.roster.contains_key(id.as_str()))
            .collect();
        for id in gone {
            self.overlays.apply(OverlayEvent::Remove(id));
        }
    }

    /// Replace the participant's caret overlay.
    pub fn upsert_cursor(&mut self, participant_id: &str, pos: usize, username: impl Into<String>) {
        self.overlays.apply(OverlayEvent::UpsertCaret {
            participant_id: participant_id.to_string(),
            pos,
            username: username.into(),
        });
    }

    /// Replace the participant's highlight; an empty range removes it.
    pub fn upsert_selection(&mut self, participant_id: &str, from: usize, to: usize) {
        self.overlays.apply(OverlayEvent::UpsertHighlight {
            participant_id: participant_id.to_string(),
            from,
            to,
        });
    }

    /// Drop both overlays for a participant; no-op when unknown.
    pub fn remove(&mut self, participant_id: &str) {
        self.overlays.apply(OverlayEvent::Remove(participant_id.to_string()));
    }

    /// Remap every overlay anchor through a document edit. Must run before
    /// overlay additions triggered by the same batch of messages.
    pub fn remap_on_change(&mut self, edit: &EditList) {
        self.overlays.apply(OverlayEvent::Remap(edit.clone()));
    }

    /// Clear roster and overlays; used on disconnect.
    pub fn reset(&mut self) {
        self.roster.clear();
        self.overlays.apply(OverlayEvent::Clear);
    }

    pub fn participant(&self, participant_id: &str) -> Option<&RemoteParticipant> {
        self.roster.get(participant_id)
    }

    pub fn roster(&self) -> &HashMap<String, RemoteParticipant> {
        &self.roster
    }

    pub fn participant_count(&self) -> usize {
        self.roster.len()
    }

    pub fn overlays(&self) -> &OverlaySet {
        &self.overlays
    }

    /// Project the overlay set for rendering, deterministically ordered by
    /// participant id, carets before highlights.
    pub fn render_overlays(&self) -> Vec<OverlayRenderData> {
        let slot = |id: &str| {
            self.roster
                .get(id)
                .map(|p| p.color_slot)
                .unwrap_or_else(|| slot_for(id))
        };

        let mut carets: Vec<_> = self.overlays.carets.iter().collect();
        carets.sort_by(|a, b| a.0.cmp(b.0));
        let mut highlights: Vec<_> = self.overlays.highlights.iter().collect();
        highlights.sort_by(|a, b| a.0.cmp(b.0));

        carets
            .into_iter()
            .map(|(id, c)| OverlayRenderData::Caret {
                participant_id: id.clone(),
                pos: c.pos,
                username: c.username.clone(),
                color_slot: slot(id),
            })
            .chain(highlights.into_iter().map(|(id, h)| OverlayRenderData::Highlight {
                participant_id: id.clone(),
                from: h.from,
                to: h.to,
                color_slot: slot(id),
            }))
            .collect()
    }

    /// Push the current projection into a rendering adapter.
    pub fn sync_to(&self, sink: &mut dyn OverlaySink) {
        sink.render(&self.render_overlays());
    }

    fn overlay_ids(&self) -> impl Iterator<Item = String> + '_ {
        self.overlays
            .carets
            .keys()
            .chain(self.overlays.highlights.keys())
            .cloned()
    }
}
