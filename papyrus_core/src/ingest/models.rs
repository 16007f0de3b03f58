use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// One normalized primitive produced from a typed remote property.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Text(String),
    Instant(DateTime<Utc>),
}

impl PropertyValue {
    pub fn empty() -> Self {
        PropertyValue::Text(String::new())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(s) => Some(s),
            PropertyValue::Instant(_) => None,
        }
    }

    pub fn as_instant(&self) -> Option<DateTime<Utc>> {
        match self {
            PropertyValue::Instant(at) => Some(*at),
            PropertyValue::Text(_) => None,
        }
    }
}

/// The flat record shape consumed by the downstream rendering pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub title: String,
    pub slug: String,
    #[serde(rename = "publishDate")]
    pub publish_date: DateTime<Utc>,
    pub share_description: Option<String>,
    pub share_image: Option<String>,
}

impl NormalizedRecord {
    /// Second validation pass: enforce the destination contract on already
    /// normalized values, independent of the source shape.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn from_values(
        title: PropertyValue,
        slug: PropertyValue,
        publish_date: PropertyValue,
        share_description: Option<PropertyValue>,
        share_image: Option<PropertyValue>,
    ) -> Result<Self> {
        let title = title
            .as_text()
            .ok_or_else(|| Error::InvalidInput("title must normalize to text".to_string()))?
            .to_string();
        let slug = slug
            .as_text()
            .ok_or_else(|| Error::InvalidInput("slug must normalize to text".to_string()))?
            .to_string();
        if slug.is_empty() {
            return Err(Error::InvalidInput("slug is empty".to_string()));
        }
        let publish_date = publish_date
            .as_instant()
            .ok_or_else(|| Error::InvalidInput("publish date must normalize to a date".to_string()))?;

        let text_or_none = |name: &str, value: Option<PropertyValue>| -> Result<Option<String>> {
            match value {
                None => Ok(None),
                Some(v) => v
                    .as_text()
                    .map(|s| Some(s.to_string()))
                    .ok_or_else(|| Error::InvalidInput(format!("{name} must normalize to text"))),
            }
        };

        Ok(Self {
            title,
            slug,
            publish_date,
            share_description: text_or_none("share_description", share_description)?,
            share_image: text_or_none("share_image", share_image)?,
        })
    }
}

/// Rendered markup carried alongside the raw body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedContent {
    pub html: String,
}

/// The persisted unit: normalized data, the serialized raw block tree, the
/// rendered markup, and a content digest for change detection downstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreEntry {
    pub id: String,
    pub data: NormalizedRecord,
    pub body: String,
    pub rendered: RenderedContent,
    pub digest: String,
}

impl StoreEntry {
    #[tracing::instrument(level = "debug", skip(data, blocks, html))]
    pub fn new(
        id: impl Into<String> + std::fmt::Debug,
        data: NormalizedRecord,
        blocks: &[serde_json::Value],
        html: String,
    ) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(Error::InvalidInput("store entry id is empty".to_string()));
        }
        let body = serde_json::to_string(blocks)
            .map_err(|e| Error::backend("serialize block tree", e))?;
        let digest = content_digest(&data)?;
        Ok(Self {
            id,
            data,
            body,
            rendered: RenderedContent { html },
            digest,
        })
    }
}

/// Deterministic content hash of a normalized record, used by the downstream
/// consumer to short-circuit unchanged-entry re-rendering across runs.
pub fn content_digest(data: &NormalizedRecord) -> Result<String> {
    let payload =
        serde_json::to_vec(data).map_err(|e| Error::backend("serialize normalized record", e))?;
    Ok(hex::encode(Sha256::digest(&payload)))
}

/// Why a record was left out of the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Slug property missing, not rich text, or empty.
    MissingSlug,
    /// Normalized values failed the destination contract.
    DestinationValidation,
    /// Block fetch, render, or another per-record step failed.
    PipelineFailure,
}

/// Skip diagnostic for one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedRecord {
    pub record_id: String,
    pub reason: SkipReason,
    pub detail: String,
}

/// Summary of one ingestion run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub records_listed: u64,
    pub entries_stored: u64,
    pub skipped: Vec<SkippedRecord>,
}
