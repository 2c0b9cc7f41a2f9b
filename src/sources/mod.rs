//! Collectors that turn each kind of input into plain text.

pub mod apify;
pub mod drive;
pub mod local;
pub mod text;

/// Per-source character cap applied to extracted file content.
pub const MAX_SOURCE_CHARS: usize = 200_000;
