//! Core engine for layered-document variants.
//!
//! A category tree decides which leaf layers of a layered document are
//! visible; the handler binds that tree to a document and renders the result.

pub mod document;
pub mod error;
pub mod index;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use document::memory::{MemoryDocument, MemoryDocumentOpener, MemoryLayer};
pub use document::{DocumentError, DocumentNode, DocumentOpener, DocumentOutline, LayeredDocument};
pub use error::ErrorKind;
pub use index::layer_index::{IndexError, IndexedKind, IndexedLayer, LayerIndex};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::category::{CategoryError, CategoryId, CategoryTree, MemberKind};
pub use model::mode::VisibilityMode;
pub use model::record::{CategoryRecord, MemberRecord};
pub use repo::config_repo::{ConfigRepoError, ConfigRepository, HandlerConfig, JsonConfigRepository};
pub use service::outline_import::{parse_outline, OutlineError, OutlineLine};
pub use service::variance_service::{
    split_path, SearchMode, VarianceError, VarianceHandler, VarianceResult,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
