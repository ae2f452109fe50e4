//! Deterministic participant → color slot assignment.
//!
//! Every client derives the same slot for the same participant identifier
//! without any coordination with the relay, so cursor and selection tints
//! agree across all peers and survive reconnects. Two different identifiers
//! may collide on a slot; that is accepted.

/// Number of distinct participant colors.
pub const COLOR_COUNT: usize = 5;

/// Reference palette, indexed by slot.
pub const PARTICIPANT_COLORS: [&str; COLOR_COUNT] =
    ["#ef4444", "#10b981", "#f59e0b", "#8b5cf6", "#06b6d4"];

/// Map a participant identifier to a stable slot in `[0, COLOR_COUNT)`.
///
/// Sums the identifier's character code points and reduces modulo
/// [`COLOR_COUNT`]. The empty identifier maps to slot 0.
pub fn slot_for(participant_id: &str) -> usize {
    let sum = participant_id
        .chars()
        .fold(0u32, |acc, c| acc.wrapping_add(c as u32));
    sum as usize % COLOR_COUNT
}

/// Convenience: the palette entry for an identifier.
pub fn color_for(participant_id: &str) -> &'static str {
    PARTICIPANT_COLORS[slot_for(participant_id)]
}
