//! Papyrus core library: schema validation, property normalization, and the
//! ingestion engine that synchronizes a remote document database into a
//! content store.

pub mod error;
pub mod ingest;
pub mod models;
pub mod schema;
pub mod store;

pub use error::{Error, Result};
pub use ingest::engine::IngestEngine;
pub use ingest::models::{
    content_digest, IngestReport, NormalizedRecord, PropertyValue, RenderedContent, SkipReason,
    SkippedRecord, StoreEntry,
};
pub use ingest::normalize::PropertyNormalizer;
pub use ingest::traits::{AssetTranscoder, ContentStore, MarkupRenderer, SourceApi};
pub use models::{DatabaseQuery, IngestConfig, SortDirection, SortSpec};
pub use schema::{BlockPage, QueryEnvelope, RemoteProperty, RemoteRecord};
pub use store::memory::MemoryContentStore;
