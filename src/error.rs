use core::fmt;

use crate::{address::Address, persist::PersistError, sync::TransportError};

/// Errors that can occur while reading, editing or synchronizing kit data.
#[derive(Debug, thiserror::Error)]
pub enum KitError {
    /// A proposed value violates the field's type or range contract.
    ///
    /// The store's bytes are left unchanged.
    #[error("invalid value for {field}: {reason}")]
    Validation { field: String, reason: String },

    /// The operation referenced something the schema or store does not define.
    #[error("unknown target: {0}")]
    UnknownTarget(Target),

    /// The external device channel failed.
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),

    /// An internal invariant was broken. Never recovered from locally.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// A kit file could not be written or read.
    #[error(transparent)]
    Persist(#[from] PersistError),
}

impl KitError {
    pub(crate) fn validation(field: &str, reason: impl Into<String>) -> Self {
        KitError::Validation {
            field: field.to_owned(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invariant(message: impl Into<String>) -> Self {
        KitError::InvariantViolation(message.into())
    }

    /// Returns true for errors that reject a value without touching any state.
    pub fn is_validation(&self) -> bool {
        matches!(self, KitError::Validation { .. })
    }
}

/// What an [`KitError::UnknownTarget`] failed to resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Byte range not covered by exactly one segment.
    Range { start: Address, len: usize },
    /// No segment starts at this address.
    Segment(Address),
    /// Kit slot not defined by the schema.
    Kit(u32),
    /// Kit file written for another schema.
    Schema(String),
    /// View node index outside the tree.
    Node(usize),
    /// Detail group or row outside the current page.
    Row { group: usize, row: usize },
    /// View node without a MIDI note binding.
    MidiNote(usize),
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Range { start, len } => write!(f, "range {start}+{len}"),
            Target::Segment(start) => write!(f, "segment at {start}"),
            Target::Kit(number) => write!(f, "kit {number}"),
            Target::Schema(name) => write!(f, "schema {name}"),
            Target::Node(index) => write!(f, "view node {index}"),
            Target::Row { group, row } => write!(f, "detail row {group}/{row}"),
            Target::MidiNote(index) => write!(f, "MIDI note of view node {index}"),
        }
    }
}

pub type Result<T> = core::result::Result<T, KitError>;
