//! Text-surface seam: edit spans, position mapping, and the buffer trait.
//!
//! The editing widget is an external collaborator. Everything the
//! synchronization layer needs from it is captured here as plain data and a
//! small trait, so the hard logic stays framework-agnostic:
//!
//! - [`EditSpan`] / [`EditList`] — a total description of one document
//!   transformation as retain/delete/insert spans covering the prior
//!   document exactly once,
//! - [`EditList::map_pos`] — monotone remapping of a position through an
//!   edit, used to keep presence overlays anchored,
//! - [`TextSurface`] — the seam any concrete editor adapts,
//! - [`BufferSurface`] — a plain in-memory implementation used in tests and
//!   headless sessions.
//!
//! All offsets are `char` offsets (Unicode scalar values); the relay applies
//! operations over the same unit.

use std::fmt;

/// One span of a document transformation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditSpan {
    /// Keep the next `n` characters unchanged.
    Retain(usize),
    /// Remove the next `n` characters.
    Delete(usize),
    /// Insert the given text at the current position.
    Insert(String),
}

/// Which side of an insertion a mapped position sticks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bias {
    /// Stay before text inserted exactly at the position.
    Before,
    /// Move after text inserted exactly at the position.
    After,
}

/// An ordered list of spans describing a total document transformation.
///
/// Invariant: the retain and delete spans together cover the prior document
/// length exactly once — no gaps, no overlaps. [`EditList::apply`] enforces
/// this against the live text and refuses to mutate on mismatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditList {
    spans: Vec<EditSpan>,
}

/// The minimal `{retain, delete, insert}` window covering an edit, which is
/// what the wire schema carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditWindow {
    pub retain: usize,
    pub delete: usize,
    pub insert: String,
}

impl EditList {
    pub fn from_spans(spans: Vec<EditSpan>) -> Self {
        Self { spans }
    }

    /// Single-window replacement: keep `at` characters, delete `deleted`,
    /// insert `inserted`, keep the rest of a document of `prior_len` chars.
    pub fn replacement(
        at: usize,
        deleted: usize,
        inserted: &str,
        prior_len: usize,
    ) -> Result<Self, EditError> {
        if at + deleted > prior_len {
            return Err(EditError::OutOfBounds { at: at + deleted, len: prior_len });
        }
        Ok(Self::from_spans(vec![
            EditSpan::Retain(at),
            EditSpan::Delete(deleted),
            EditSpan::Insert(inserted.to_string()),
            EditSpan::Retain(prior_len - at - deleted),
        ]))
    }

    pub fn spans(&self) -> &[EditSpan] {
        &self.spans
    }

    /// Length of the document this edit applies to.
    pub fn prior_len(&self) -> usize {
        self.spans
            .iter()
            .map(|s| match s {
                EditSpan::Retain(n) | EditSpan::Delete(n) => *n,
                EditSpan::Insert(_) => 0,
            })
            .sum()
    }

    /// Length of the document after this edit.
    pub fn final_len(&self) -> usize {
        self.spans
            .iter()
            .map(|s| match s {
                EditSpan::Retain(n) => *n,
                EditSpan::Delete(_) => 0,
                EditSpan::Insert(s) => s.chars().count(),
            })
            .sum()
    }

    /// True when the edit changes nothing (only retains).
    pub fn is_identity(&self) -> bool {
        self.spans.iter().all(|s| match s {
            EditSpan::Retain(_) => true,
            EditSpan::Delete(n) => *n == 0,
            EditSpan::Insert(s) => s.is_empty(),
        })
    }

    /// Apply the edit to `text`, producing the transformed document.
    ///
    /// Fails without side effects if the spans do not cover `text` exactly.
    pub fn apply(&self, text: &str) -> Result<String, EditError> {
        let chars: Vec<char> = text.chars().collect();
        if self.prior_len() != chars.len() {
            return Err(EditError::LengthMismatch {
                expected: self.prior_len(),
                actual: chars.len(),
            });
        }
        let mut out = String::with_capacity(text.len());
        let mut cursor = 0usize;
        for span in &self.spans {
            match span {
                EditSpan::Retain(n) => {
                    out.extend(&chars[cursor..cursor + n]);
                    cursor += n;
                }
                EditSpan::Delete(n) => cursor += n,
                EditSpan::Insert(s) => out.push_str(s),
            }
        }
        Ok(out)
    }

    /// Map a prior-document position to the corresponding post-edit position.
    ///
    /// The mapping is monotone: the relative order of two positions is
    /// preserved unless the text between them is deleted. A position inside a
    /// deleted range clamps to the deletion start. Positions at or beyond the
    /// prior end map to the new end.
    pub fn map_pos(&self, pos: usize, bias: Bias) -> usize {
        let mut old = 0usize;
        let mut new = 0usize;
        for span in &self.spans {
            match span {
                EditSpan::Retain(n) => {
                    if pos < old + n {
                        return new + (pos - old);
                    }
                    old += n;
                    new += n;
                }
                EditSpan::Delete(n) => {
                    if pos < old + n {
                        return new;
                    }
                    old += n;
                }
                EditSpan::Insert(s) => {
                    if pos == old && bias == Bias::Before {
                        return new;
                    }
                    new += s.chars().count();
                }
            }
        }
        new
    }

    /// Coalesce the edit into its minimal covering window, given the document
    /// text *after* the edit.
    ///
    /// Interior retains are folded into the window (their text is re-read
    /// from `text_after`), so a multi-region change still fits the flat wire
    /// triple.
    pub fn to_window(&self, text_after: &str) -> Result<EditWindow, EditError> {
        let final_chars: Vec<char> = text_after.chars().collect();
        if final_chars.len() != self.final_len() {
            return Err(EditError::LengthMismatch {
                expected: self.final_len(),
                actual: final_chars.len(),
            });
        }

        let effective = |s: &EditSpan| match s {
            EditSpan::Retain(_) => false,
            EditSpan::Delete(n) => *n > 0,
            EditSpan::Insert(t) => !t.is_empty(),
        };
        let first = self.spans.iter().position(effective);
        let Some(first) = first else {
            // Identity edit: an empty window at the end of the document.
            return Ok(EditWindow {
                retain: self.prior_len(),
                delete: 0,
                insert: String::new(),
            });
        };
        let last = self.spans.iter().rposition(effective).unwrap_or(first);

        let retain_count = |spans: &[EditSpan]| {
            spans
                .iter()
                .map(|s| match s {
                    EditSpan::Retain(n) => *n,
                    _ => 0,
                })
                .sum::<usize>()
        };
        let leading = retain_count(&self.spans[..first]);
        let trailing = retain_count(&self.spans[last + 1..]);
        let delete = self.prior_len() - leading - trailing;
        let insert: String = final_chars[leading..final_chars.len() - trailing]
            .iter()
            .collect();

        Ok(EditWindow { retain: leading, delete, insert })
    }
}

/// Errors from translating an edit against the live document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditError {
    /// Span coverage disagrees with the document length.
    LengthMismatch { expected: usize, actual: usize },
    /// A referenced position lies outside the document.
    OutOfBounds { at: usize, len: usize },
}

impl fmt::Display for EditError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LengthMismatch { expected, actual } => {
                write!(f, "edit covers {expected} chars but document has {actual}")
            }
            Self::OutOfBounds { at, len } => {
                write!(f, "edit references position {at} in a document of {len} chars")
            }
        }
    }
}

impl std::error::Error for EditError {}

/// The seam to the editing widget.
///
/// A concrete editor adapts this trait over its native buffer; the rest of
/// the crate mutates the document only through it.
pub trait TextSurface {
    /// Current document length in chars.
    fn len_chars(&self) -> usize;

    /// Owned snapshot of the current document.
    fn snapshot(&self) -> String;

    /// Apply an edit atomically. On error the document is unchanged.
    fn apply_edit(&mut self, edit: &EditList) -> Result<(), EditError>;

    /// Replace the whole document.
    fn replace_all(&mut self, text: &str);
}

/// Plain in-memory text surface.
#[derive(Debug, Clone, Default)]
pub struct BufferSurface {
    text: String,
}

impl BufferSurface {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

impl TextSurface for BufferSurface {
    fn len_chars(&self) -> usize {
        self.text.chars().count()
    }

    fn snapshot(&self) -> String {
        self.text.clone()
    }

    fn apply_edit(&mut self, edit: &EditList) -> Result<(), EditError> {
        self.text = edit.apply(&self.text)?;
        Ok(())
    }

    fn replace_all(&mut self, text: &str) {
        self.text = text.to_string();
    }
}
