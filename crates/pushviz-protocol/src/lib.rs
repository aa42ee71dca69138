//! pushviz - Protocol Types
//!
//! Wire-level types shared by the transport and the dispatch layer.
//! This crate is the single source of truth for the document codec,
//! the placeholder documents, and the fixed strings exchanged with the
//! browser page.

pub mod document;
pub mod error;
pub mod messages;
pub mod placeholder;

pub use document::Document;
pub use error::CodecError;
pub use messages::{DEFAULT_HOSTNAME, DEFAULT_PORT, Messages};
pub use placeholder::Placeholder;
