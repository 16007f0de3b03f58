//! Cursor-based pagination of a record's child blocks.

use crate::ingest::traits::SourceApi;
use crate::schema;
use crate::Result;
use tracing::debug;

/// Fetch the complete ordered block list for one record.
///
/// Pages are requested with the continuation cursor until the source reports
/// no further pages; concatenation preserves source order across page
/// boundaries, which is the document's visual order. Any page failure fails
/// the whole fetch — partial trees are never returned.
#[tracing::instrument(level = "debug", skip(api))]
pub async fn fetch_all_blocks(
    api: &dyn SourceApi,
    record_id: &str,
) -> Result<Vec<serde_json::Value>> {
    let mut blocks = Vec::new();
    let mut cursor: Option<String> = None;
    loop {
        let raw = api.list_block_children(record_id, cursor.as_deref()).await?;
        let page = schema::parse_block_page(raw)?;
        blocks.extend(page.results);
        if !page.has_more {
            break;
        }
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }
    debug!(record_id, blocks = blocks.len(), "collected block tree");
    Ok(blocks)
}
