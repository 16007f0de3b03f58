//! Typed bindings for remote API payloads.
//!
//! The remote service's schema varies across property types and evolves
//! independently of this system; everything entering the pipeline passes
//! through `parse_query_envelope` / `parse_block_page` first. Validation is
//! structural and fail-closed: a malformed top-level envelope rejects the
//! whole response. Unknown property and file tags deserialize into designated
//! `Unknown` variants so the normalizer (not the validator) owns the degrade
//! path.

use crate::{Error, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;

/// Top-level paginated response wrapper for a database query.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct QueryEnvelope {
    pub object: String,
    pub results: Vec<RemoteRecord>,
    pub next_cursor: Option<String>,
    pub has_more: bool,
    #[serde(rename = "type")]
    pub result_type: String,
    pub page_or_database: serde_json::Value,
    pub request_id: String,
}

/// One page of a block-children listing. Blocks stay opaque to the core;
/// only the pagination envelope is typed.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BlockPage {
    pub object: String,
    pub results: Vec<serde_json::Value>,
    pub next_cursor: Option<String>,
    pub has_more: bool,
}

/// One record ("page") of the source database.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RemoteRecord {
    pub object: String,
    pub id: String,
    pub created_time: DateTime<Utc>,
    pub last_edited_time: DateTime<Utc>,
    pub created_by: UserRef,
    pub last_edited_by: UserRef,
    pub cover: Option<serde_json::Value>,
    pub icon: Option<serde_json::Value>,
    pub parent: ParentRef,
    pub archived: bool,
    pub in_trash: bool,
    pub properties: BTreeMap<String, RemoteProperty>,
    pub url: String,
    pub public_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UserRef {
    pub object: String,
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ParentRef {
    #[serde(rename = "type")]
    pub kind: String,
    pub database_id: String,
}

/// A single typed property on a record, discriminated by its `type` tag.
///
/// New property types appear on the remote side without notice; they land in
/// `Unknown` and the normalizer degrades them to an empty value.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RemoteProperty {
    RichText {
        id: String,
        rich_text: Vec<RichTextSpan>,
    },
    Title {
        id: String,
        title: Vec<RichTextSpan>,
    },
    Date {
        id: String,
        date: DateRange,
    },
    Select {
        id: String,
        select: SelectOption,
    },
    Files {
        id: String,
        files: Vec<FileRef>,
    },
    Button {
        id: String,
    },
    #[serde(other)]
    Unknown,
}

impl RemoteProperty {
    /// The discriminant tag, for logging.
    pub fn tag(&self) -> &'static str {
        match self {
            RemoteProperty::RichText { .. } => "rich_text",
            RemoteProperty::Title { .. } => "title",
            RemoteProperty::Date { .. } => "date",
            RemoteProperty::Select { .. } => "select",
            RemoteProperty::Files { .. } => "files",
            RemoteProperty::Button { .. } => "button",
            RemoteProperty::Unknown => "unknown",
        }
    }
}

/// A rich-text span. Only the `text` flavor is part of the contract; any
/// other span tag is a validation error, not a degrade case.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RichTextSpan {
    Text {
        text: TextContent,
        annotations: Annotations,
        plain_text: String,
        #[serde(default)]
        href: Option<serde_json::Value>,
    },
}

impl RichTextSpan {
    pub fn plain_text(&self) -> &str {
        let RichTextSpan::Text { plain_text, .. } = self;
        plain_text
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TextContent {
    pub content: String,
    #[serde(default)]
    pub link: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Annotations {
    pub bold: bool,
    pub italic: bool,
    pub strikethrough: bool,
    pub underline: bool,
    pub code: bool,
    pub color: String,
}

/// A date range; only `start` is consumed by normalization.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DateRange {
    #[serde(deserialize_with = "date_like")]
    pub start: DateTime<Utc>,
    #[serde(default, deserialize_with = "opt_date_like")]
    pub end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub time_zone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SelectOption {
    pub id: String,
    pub name: String,
    pub color: String,
}

/// A file descriptor attached to a `files` property. Service-hosted and
/// external variants are typed; anything else is `Unknown` and handled by
/// the normalizer's degrade path.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FileRef {
    File {
        file: HostedFile,
    },
    External {
        external: ExternalFile,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HostedFile {
    pub url: String,
    #[serde(deserialize_with = "date_like")]
    pub expiry_time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExternalFile {
    pub url: String,
}

/// Parse and validate a raw database-query response.
///
/// Fail-closed: any missing required field or mismatched literal tag rejects
/// the entire response, since a malformed envelope likely signals a breaking
/// API change rather than a single bad record.
#[tracing::instrument(level = "debug", skip(raw))]
pub fn parse_query_envelope(raw: serde_json::Value) -> Result<QueryEnvelope> {
    let envelope: QueryEnvelope = serde_json::from_value(raw)
        .map_err(|e| Error::Validation(format!("query envelope: {e}")))?;
    expect_literal("envelope object", &envelope.object, "list")?;
    for record in &envelope.results {
        expect_literal("record object", &record.object, "page")?;
        expect_literal("created_by object", &record.created_by.object, "user")?;
        expect_literal(
            "last_edited_by object",
            &record.last_edited_by.object,
            "user",
        )?;
    }
    Ok(envelope)
}

/// Parse and validate one raw block-children page.
#[tracing::instrument(level = "debug", skip(raw))]
pub fn parse_block_page(raw: serde_json::Value) -> Result<BlockPage> {
    let page: BlockPage =
        serde_json::from_value(raw).map_err(|e| Error::Validation(format!("block page: {e}")))?;
    expect_literal("block page object", &page.object, "list")?;
    Ok(page)
}

fn expect_literal(context: &str, actual: &str, expected: &str) -> Result<()> {
    if actual != expected {
        return Err(Error::Validation(format!(
            "{context}: expected '{expected}', got '{actual}'"
        )));
    }
    Ok(())
}

/// Accepts both full RFC 3339 instants and bare dates ("2024-01-01"),
/// the two encodings the source uses for date-valued fields.
pub(crate) fn parse_date_like(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    s.parse::<NaiveDate>()
        .ok()
        .map(|d| d.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc())
}

fn date_like<'de, D>(deserializer: D) -> std::result::Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_date_like(&s)
        .ok_or_else(|| serde::de::Error::custom(format!("unrecognized date value '{s}'")))
}

fn opt_date_like<'de, D>(deserializer: D) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let s: Option<String> = Option::deserialize(deserializer)?;
    match s {
        None => Ok(None),
        Some(s) => parse_date_like(&s)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("unrecognized date value '{s}'"))),
    }
}
