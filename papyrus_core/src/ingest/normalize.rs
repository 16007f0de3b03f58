//! Property normalization: one typed remote property in, one primitive out.
//!
//! Normalization never fails. The only fallible path is transcoding the
//! first descriptor of a `files` property, and that result is degraded to an
//! empty value with a logged cause rather than propagated.

use crate::ingest::models::PropertyValue;
use crate::ingest::traits::AssetTranscoder;
use crate::schema::{FileRef, RemoteProperty, RichTextSpan};
use crate::{Error, Result};
use std::sync::Arc;
use tracing::{debug, warn};

/// Fixed target dimensions for share-image transcoding.
const TARGET_WIDTH: u32 = 1600;
const TARGET_HEIGHT: u32 = 900;

pub struct PropertyNormalizer {
    transcoder: Arc<dyn AssetTranscoder>,
}

impl PropertyNormalizer {
    pub fn new(transcoder: Arc<dyn AssetTranscoder>) -> Self {
        Self { transcoder }
    }

    /// Normalize one property to a primitive value. Infallible: unsupported
    /// shapes and transcoding failures degrade to empty text.
    #[tracing::instrument(level = "debug", skip(self, property), fields(tag = property.tag()))]
    pub async fn normalize(&self, name: &str, property: &RemoteProperty) -> PropertyValue {
        match property {
            RemoteProperty::RichText { rich_text, .. } => first_plain_text(rich_text),
            RemoteProperty::Title { title, .. } => first_plain_text(title),
            RemoteProperty::Date { date, .. } => PropertyValue::Instant(date.start),
            RemoteProperty::Select { select, .. } => PropertyValue::Text(select.name.clone()),
            RemoteProperty::Files { files, .. } => match self.transcode_first(files).await {
                Ok(asset_ref) => PropertyValue::Text(asset_ref),
                Err(e) => {
                    warn!(property = name, error = %e, "file normalization degraded to empty");
                    PropertyValue::empty()
                }
            },
            RemoteProperty::Button { .. } | RemoteProperty::Unknown => {
                debug!(property = name, tag = property.tag(), "unhandled property type");
                PropertyValue::empty()
            }
        }
    }

    /// Transcode the first file descriptor. Only images are expected here;
    /// the transcoder decides what it can actually handle.
    async fn transcode_first(&self, files: &[FileRef]) -> Result<String> {
        let url = match files.first() {
            Some(FileRef::File { file }) => file.url.as_str(),
            Some(FileRef::External { external }) => external.url.as_str(),
            Some(FileRef::Unknown) => {
                return Err(Error::InvalidInput(
                    "unhandled file descriptor type".to_string(),
                ))
            }
            None => return Err(Error::InvalidInput("files property is empty".to_string())),
        };
        debug!(url, "transcoding asset");
        self.transcoder
            .transcode(url, TARGET_WIDTH, TARGET_HEIGHT)
            .await
    }
}

fn first_plain_text(spans: &[RichTextSpan]) -> PropertyValue {
    PropertyValue::Text(
        spans
            .first()
            .map(|s| s.plain_text().to_string())
            .unwrap_or_default(),
    )
}
