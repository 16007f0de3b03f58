use crate::ingest::models::StoreEntry;
use crate::models::DatabaseQuery;
use crate::Result;
use async_trait::async_trait;

/// The remote document database, reduced to the two operations ingestion
/// needs. Implementations return raw values; the schema layer owns typing.
#[async_trait]
pub trait SourceApi: Send + Sync {
    /// Query a database for its record list. Filter and sort semantics are
    /// fully delegated to the source.
    async fn query_database(&self, query: &DatabaseQuery) -> Result<serde_json::Value>;

    /// Fetch one page of a record's child blocks.
    async fn list_block_children(
        &self,
        block_id: &str,
        cursor: Option<&str>,
    ) -> Result<serde_json::Value>;
}

/// External asset transcoder. May fail; callers own the degrade policy.
#[async_trait]
pub trait AssetTranscoder: Send + Sync {
    /// Transcode the asset at `source_url` to the target dimensions and
    /// return a reference to the transcoded asset.
    async fn transcode(&self, source_url: &str, width: u32, height: u32) -> Result<String>;
}

/// External block-tree renderer.
#[async_trait]
pub trait MarkupRenderer: Send + Sync {
    async fn render(&self, blocks: &[serde_json::Value]) -> Result<String>;
}

/// Destination content store. The synchronizer exclusively owns entry
/// lifecycle; no other component writes here.
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn clear(&self) -> Result<()>;
    async fn set(&self, entry: StoreEntry) -> Result<()>;
}
