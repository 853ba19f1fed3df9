//! Aligning grounding supports with the answer text.
//!
//! [`locate`] finds where a cited segment sits in the answer, [`index`] builds
//! the citation/chunk/display lookups and [`annotate`] rewrites the answer with
//! cited-text spans and numbered markers.

pub mod annotate;
pub mod index;
pub mod locate;

pub use annotate::{annotate, Annotated, Modification, Placement};
pub use index::CitationIndex;
pub use locate::{extend_to_boundary, locate, strip_markdown, Located};
