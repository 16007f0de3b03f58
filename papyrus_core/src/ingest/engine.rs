//! The ingestion engine: orchestrates one full synchronization run of a
//! source database into the content store.
//!
//! Run shape: query → validate envelope → clear store → ingest records under
//! a bounded fan-out → write entries → report. The envelope check is
//! fail-closed and happens before any store mutation; everything after it is
//! caught at the per-record boundary so a single bad record never aborts the
//! run.

use crate::ingest::models::{
    IngestReport, NormalizedRecord, PropertyValue, SkipReason, SkippedRecord, StoreEntry,
};
use crate::ingest::normalize::PropertyNormalizer;
use crate::ingest::pages;
use crate::ingest::traits::{AssetTranscoder, ContentStore, MarkupRenderer, SourceApi};
use crate::models::IngestConfig;
use crate::schema::{self, RemoteProperty, RemoteRecord};
use crate::{Error, Result};
use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{info, warn};
use uuid::Uuid;

const TITLE_PROPERTY: &str = "Title";
const SLUG_PROPERTY: &str = "Slug";
const PUBLISH_DATE_PROPERTY: &str = "Publish Date";
const SHARE_DESCRIPTION_PROPERTY: &str = "Sharing Description";
const SHARE_IMAGE_PROPERTY: &str = "Sharing Image";

enum RecordOutcome {
    Entry(Box<StoreEntry>),
    Skipped(SkippedRecord),
}

/// Ingestion engine with all collaborators injected at construction.
#[derive(Clone)]
pub struct IngestEngine {
    api: Arc<dyn SourceApi>,
    renderer: Arc<dyn MarkupRenderer>,
    store: Arc<dyn ContentStore>,
    normalizer: Arc<PropertyNormalizer>,
}

impl IngestEngine {
    pub fn new(
        api: Arc<dyn SourceApi>,
        transcoder: Arc<dyn AssetTranscoder>,
        renderer: Arc<dyn MarkupRenderer>,
        store: Arc<dyn ContentStore>,
    ) -> Self {
        Self {
            api,
            renderer,
            store,
            normalizer: Arc::new(PropertyNormalizer::new(transcoder)),
        }
    }

    /// Execute one full ingestion run.
    ///
    /// Full-replace strategy: the store is cleared and repopulated from
    /// scratch. Callers are responsible for single-run-at-a-time discipline.
    #[tracing::instrument(level = "info", skip(self, config), fields(database_id = %config.database_id))]
    pub async fn run(&self, config: &IngestConfig) -> Result<IngestReport> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();

        let raw = self.api.query_database(&config.query()).await?;
        let envelope = schema::parse_query_envelope(raw)?;
        let records_listed = envelope.results.len() as u64;
        info!(records = records_listed, "listed records from source database");

        // Clear is a barrier: no entry write may happen before it completes.
        self.store.clear().await?;

        let semaphore = Arc::new(Semaphore::new(config.max_in_flight));
        let mut tasks = FuturesUnordered::new();
        for record in envelope.results {
            let semaphore = semaphore.clone();
            let engine = self.clone();
            tasks.push(async move {
                let record_id = record.id.clone();
                let outcome = match semaphore.acquire_owned().await {
                    Ok(_permit) => engine.ingest_record(&record).await,
                    Err(_) => Err(Error::BackendMessage("ingest semaphore closed".to_string())),
                };
                (record_id, outcome)
            });
        }

        let mut entries = Vec::new();
        let mut skipped = Vec::new();
        while let Some((record_id, outcome)) = tasks.next().await {
            match outcome {
                Ok(RecordOutcome::Entry(entry)) => entries.push(*entry),
                Ok(RecordOutcome::Skipped(diag)) => skipped.push(diag),
                Err(e) => {
                    warn!(record_id, error = %e, "record ingestion failed");
                    skipped.push(SkippedRecord {
                        record_id,
                        reason: SkipReason::PipelineFailure,
                        detail: e.to_string(),
                    });
                }
            }
        }

        let mut entries_stored = 0u64;
        for entry in entries {
            self.store.set(entry).await?;
            entries_stored += 1;
        }

        let report = IngestReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            records_listed,
            entries_stored,
            skipped,
        };
        info!(
            ingested = report.entries_stored,
            skipped = report.skipped.len(),
            "ingestion run finished"
        );
        Ok(report)
    }

    /// Run one record through the pipeline: slug gate, concurrent
    /// normalization + block fetch, destination validation, render, emit.
    #[tracing::instrument(level = "debug", skip(self, record), fields(record_id = %record.id))]
    async fn ingest_record(&self, record: &RemoteRecord) -> Result<RecordOutcome> {
        // The slug is the identity key; without it there is nothing to store.
        let Some(slug_text) = slug_identity(record) else {
            warn!(record_id = %record.id, "record has no usable slug, skipping");
            return Ok(RecordOutcome::Skipped(SkippedRecord {
                record_id: record.id.clone(),
                reason: SkipReason::MissingSlug,
                detail: "slug must be a non-empty rich-text value".to_string(),
            }));
        };

        let (blocks, (title, slug, publish_date, share_description, share_image)) = tokio::join!(
            pages::fetch_all_blocks(self.api.as_ref(), &record.id),
            async {
                futures::join!(
                    self.normalize_field(record, TITLE_PROPERTY),
                    self.normalize_field(record, SLUG_PROPERTY),
                    self.normalize_field(record, PUBLISH_DATE_PROPERTY),
                    self.normalize_optional(record, SHARE_DESCRIPTION_PROPERTY),
                    self.normalize_optional(record, SHARE_IMAGE_PROPERTY),
                )
            }
        );
        let blocks = blocks?;

        let data = match NormalizedRecord::from_values(
            title,
            slug,
            publish_date,
            share_description,
            share_image,
        ) {
            Ok(data) => data,
            Err(e) => {
                warn!(record_id = %record.id, error = %e, "record failed destination validation, skipping");
                return Ok(RecordOutcome::Skipped(SkippedRecord {
                    record_id: record.id.clone(),
                    reason: SkipReason::DestinationValidation,
                    detail: e.to_string(),
                }));
            }
        };

        let html = self.renderer.render(&blocks).await?;
        let entry = StoreEntry::new(slug_text, data, &blocks, html)?;
        Ok(RecordOutcome::Entry(Box::new(entry)))
    }

    async fn normalize_field(&self, record: &RemoteRecord, name: &str) -> PropertyValue {
        match record.properties.get(name) {
            Some(property) => self.normalizer.normalize(name, property).await,
            None => PropertyValue::empty(),
        }
    }

    async fn normalize_optional(&self, record: &RemoteRecord, name: &str) -> Option<PropertyValue> {
        match record.properties.get(name) {
            Some(property) => Some(self.normalizer.normalize(name, property).await),
            None => None,
        }
    }
}

/// The identity key: the first plain-text span of the `Slug` rich-text
/// property, when non-empty.
fn slug_identity(record: &RemoteRecord) -> Option<String> {
    match record.properties.get(SLUG_PROPERTY) {
        Some(RemoteProperty::RichText { rich_text, .. }) => rich_text
            .first()
            .map(|span| span.plain_text().to_string())
            .filter(|s| !s.is_empty()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DatabaseQuery, SortDirection, SortSpec};
    use crate::schema::tests::{envelope_fixture, record_fixture, rich_text_span};
    use crate::store::memory::MemoryContentStore;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;

    /// Serves a canned query envelope and one block page per record.
    struct StaticApi {
        envelope: serde_json::Value,
        blocks: HashMap<String, Vec<serde_json::Value>>,
    }

    #[async_trait]
    impl SourceApi for StaticApi {
        async fn query_database(&self, _query: &DatabaseQuery) -> Result<serde_json::Value> {
            Ok(self.envelope.clone())
        }

        async fn list_block_children(
            &self,
            block_id: &str,
            _cursor: Option<&str>,
        ) -> Result<serde_json::Value> {
            let results = self
                .blocks
                .get(block_id)
                .cloned()
                .ok_or_else(|| Error::BackendMessage(format!("no blocks for {block_id}")))?;
            Ok(json!({
                "object": "list",
                "results": results,
                "next_cursor": null,
                "has_more": false,
            }))
        }
    }

    struct OkTranscoder;

    #[async_trait]
    impl AssetTranscoder for OkTranscoder {
        async fn transcode(&self, _source_url: &str, width: u32, height: u32) -> Result<String> {
            Ok(format!("/assets/share-{width}x{height}.webp"))
        }
    }

    struct FailingTranscoder;

    #[async_trait]
    impl AssetTranscoder for FailingTranscoder {
        async fn transcode(&self, _source_url: &str, _width: u32, _height: u32) -> Result<String> {
            Err(Error::BackendMessage("decode failed".to_string()))
        }
    }

    struct CountingRenderer;

    #[async_trait]
    impl MarkupRenderer for CountingRenderer {
        async fn render(&self, blocks: &[serde_json::Value]) -> Result<String> {
            Ok(format!("<article data-blocks=\"{}\"></article>", blocks.len()))
        }
    }

    fn base_properties(slug: &str) -> serde_json::Value {
        json!({
            "Title": { "type": "title", "id": "t", "title": [rich_text_span("Hello World")] },
            "Slug": { "type": "rich_text", "id": "s", "rich_text": [rich_text_span(slug)] },
            "Publish Date": {
                "type": "date", "id": "d",
                "date": { "start": "2024-01-01", "end": null, "time_zone": null },
            },
        })
    }

    fn config() -> IngestConfig {
        IngestConfig::new(
            "db-1",
            Some(json!({ "property": "Status", "select": { "equals": "Published" } })),
            vec![SortSpec::new("Publish Date", SortDirection::Ascending).unwrap()],
            IngestConfig::DEFAULT_MAX_IN_FLIGHT,
        )
        .unwrap()
    }

    fn engine(
        api: StaticApi,
        transcoder: impl AssetTranscoder + 'static,
        store: &MemoryContentStore,
    ) -> IngestEngine {
        IngestEngine::new(
            Arc::new(api),
            Arc::new(transcoder),
            Arc::new(CountingRenderer),
            Arc::new(store.clone()),
        )
    }

    #[tokio::test]
    async fn end_to_end_single_record() {
        let blocks = vec![
            json!({ "object": "block", "id": "b1", "type": "paragraph" }),
            json!({ "object": "block", "id": "b2", "type": "paragraph" }),
        ];
        let api = StaticApi {
            envelope: envelope_fixture(vec![record_fixture(
                "page-1",
                base_properties("hello-world"),
            )]),
            blocks: HashMap::from([("page-1".to_string(), blocks.clone())]),
        };
        let store = MemoryContentStore::new();
        let report = engine(api, OkTranscoder, &store).run(&config()).await.unwrap();

        assert_eq!(report.records_listed, 1);
        assert_eq!(report.entries_stored, 1);
        assert!(report.skipped.is_empty());

        let entries = store.entries().await;
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.id, "hello-world");
        assert_eq!(entry.data.slug, "hello-world");
        assert_eq!(entry.data.title, "Hello World");
        assert_eq!(
            entry.data.publish_date.to_rfc3339(),
            "2024-01-01T00:00:00+00:00"
        );
        assert_eq!(entry.data.share_image, None);
        assert_eq!(entry.body, serde_json::to_string(&blocks).unwrap());
        assert!(!entry.rendered.html.is_empty());
        assert_eq!(entry.digest, crate::content_digest(&entry.data).unwrap());
    }

    #[tokio::test]
    async fn empty_slug_record_is_skipped() {
        let mut empty_slug = base_properties("unused");
        empty_slug["Slug"] = json!({ "type": "rich_text", "id": "s", "rich_text": [] });
        let api = StaticApi {
            envelope: envelope_fixture(vec![
                record_fixture("page-1", empty_slug),
                record_fixture("page-2", base_properties("hello-world")),
            ]),
            blocks: HashMap::from([
                ("page-1".to_string(), vec![]),
                ("page-2".to_string(), vec![json!({ "id": "b1" })]),
            ]),
        };
        let store = MemoryContentStore::new();
        let report = engine(api, OkTranscoder, &store).run(&config()).await.unwrap();

        assert_eq!(report.entries_stored, 1);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].record_id, "page-1");
        assert_eq!(report.skipped[0].reason, SkipReason::MissingSlug);

        let entries = store.entries().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, "hello-world");
    }

    #[tokio::test]
    async fn non_rich_text_slug_is_skipped() {
        let mut props = base_properties("unused");
        props["Slug"] = json!({ "type": "title", "id": "s", "title": [rich_text_span("nope")] });
        let api = StaticApi {
            envelope: envelope_fixture(vec![record_fixture("page-1", props)]),
            blocks: HashMap::from([("page-1".to_string(), vec![])]),
        };
        let store = MemoryContentStore::new();
        let report = engine(api, OkTranscoder, &store).run(&config()).await.unwrap();
        assert_eq!(report.entries_stored, 0);
        assert_eq!(report.skipped[0].reason, SkipReason::MissingSlug);
    }

    #[tokio::test]
    async fn transcoder_failure_still_ingests_with_empty_share_image() {
        let mut props = base_properties("hello-world");
        props["Sharing Image"] = json!({
            "type": "files", "id": "f",
            "files": [{ "type": "external", "external": { "url": "https://img.example/a.png" } }],
        });
        let api = StaticApi {
            envelope: envelope_fixture(vec![record_fixture("page-1", props)]),
            blocks: HashMap::from([("page-1".to_string(), vec![json!({ "id": "b1" })])]),
        };
        let store = MemoryContentStore::new();
        let report = engine(api, FailingTranscoder, &store)
            .run(&config())
            .await
            .unwrap();

        assert_eq!(report.entries_stored, 1);
        assert!(report.skipped.is_empty());
        let entry = store.get("hello-world").await.unwrap();
        assert_eq!(entry.data.share_image, Some(String::new()));
    }

    #[tokio::test]
    async fn missing_title_is_ingested_with_empty_title() {
        let mut untitled = base_properties("hello-world");
        untitled.as_object_mut().unwrap().remove("Title");
        let api = StaticApi {
            envelope: envelope_fixture(vec![record_fixture("page-1", untitled)]),
            blocks: HashMap::from([("page-1".to_string(), vec![])]),
        };
        let store = MemoryContentStore::new();
        let report = engine(api, OkTranscoder, &store).run(&config()).await.unwrap();

        // Only the slug is constrained to be non-empty; a record without a
        // title is still ingested, carrying an empty one.
        assert_eq!(report.entries_stored, 1);
        assert!(report.skipped.is_empty());
        let entry = store.get("hello-world").await.unwrap();
        assert_eq!(entry.data.title, "");
    }

    #[tokio::test]
    async fn missing_publish_date_skips_only_that_record() {
        let mut undated = base_properties("undated");
        undated.as_object_mut().unwrap().remove("Publish Date");
        let api = StaticApi {
            envelope: envelope_fixture(vec![
                record_fixture("page-1", undated),
                record_fixture("page-2", base_properties("hello-world")),
            ]),
            blocks: HashMap::from([
                ("page-1".to_string(), vec![]),
                ("page-2".to_string(), vec![]),
            ]),
        };
        let store = MemoryContentStore::new();
        let report = engine(api, OkTranscoder, &store).run(&config()).await.unwrap();

        assert_eq!(report.entries_stored, 1);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].record_id, "page-1");
        assert_eq!(report.skipped[0].reason, SkipReason::DestinationValidation);
    }

    #[tokio::test]
    async fn block_fetch_failure_drops_only_that_record() {
        let api = StaticApi {
            envelope: envelope_fixture(vec![
                record_fixture("page-1", base_properties("lost-blocks")),
                record_fixture("page-2", base_properties("hello-world")),
            ]),
            // No block page registered for page-1.
            blocks: HashMap::from([("page-2".to_string(), vec![json!({ "id": "b1" })])]),
        };
        let store = MemoryContentStore::new();
        let report = engine(api, OkTranscoder, &store).run(&config()).await.unwrap();

        assert_eq!(report.entries_stored, 1);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].record_id, "page-1");
        assert_eq!(report.skipped[0].reason, SkipReason::PipelineFailure);
        assert!(store.get("lost-blocks").await.is_none());
        assert!(store.get("hello-world").await.is_some());
    }

    #[tokio::test]
    async fn envelope_failure_aborts_before_clear() {
        let store = MemoryContentStore::new();
        let sentinel = StoreEntry::new(
            "existing",
            NormalizedRecord {
                title: "Existing".to_string(),
                slug: "existing".to_string(),
                publish_date: "2023-01-01T00:00:00Z".parse().unwrap(),
                share_description: None,
                share_image: None,
            },
            &[],
            "<p></p>".to_string(),
        )
        .unwrap();
        store.set(sentinel).await.unwrap();

        let api = StaticApi {
            envelope: json!({ "object": "list", "results": [] }),
            blocks: HashMap::new(),
        };
        let err = engine(api, OkTranscoder, &store)
            .run(&config())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        // The prior contents survive a failed envelope check.
        assert!(store.get("existing").await.is_some());
    }

    #[tokio::test]
    async fn run_clears_prior_contents_on_success() {
        let store = MemoryContentStore::new();
        let stale = StoreEntry::new(
            "stale",
            NormalizedRecord {
                title: "Stale".to_string(),
                slug: "stale".to_string(),
                publish_date: "2023-01-01T00:00:00Z".parse().unwrap(),
                share_description: None,
                share_image: None,
            },
            &[],
            "<p></p>".to_string(),
        )
        .unwrap();
        store.set(stale).await.unwrap();

        let api = StaticApi {
            envelope: envelope_fixture(vec![record_fixture(
                "page-1",
                base_properties("hello-world"),
            )]),
            blocks: HashMap::from([("page-1".to_string(), vec![])]),
        };
        engine(api, OkTranscoder, &store).run(&config()).await.unwrap();

        assert!(store.get("stale").await.is_none());
        assert!(store.get("hello-world").await.is_some());
    }
}
