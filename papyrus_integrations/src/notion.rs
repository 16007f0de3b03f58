//! Notion source client.
//!
//! Implements the two RPCs ingestion needs: database query and paginated
//! block-children listing. Responses come back as raw JSON; the core's
//! schema layer owns validation and typing.

use async_trait::async_trait;
use papyrus_core::models::DatabaseQuery;
use papyrus_core::{Error, Result, SourceApi};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Client;
use std::time::Duration;
use tracing::instrument;

const NOTION_VERSION: &str = "2022-06-28";
const PAGE_SIZE: u32 = 100;

#[derive(Clone)]
pub struct NotionApi {
    client: Client,
    api_base: String,
    token: String,
}

impl NotionApi {
    pub fn new(token: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .expect("reqwest client");
        Self {
            client,
            api_base: "https://api.notion.com".to_string(),
            token: token.into(),
        }
    }

    /// Point the client at a different base URL (local stubs in tests).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut h = HeaderMap::new();
        h.insert("Notion-Version", HeaderValue::from_static(NOTION_VERSION));
        let auth = format!("Bearer {}", self.token);
        h.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth)
                .map_err(|e| Error::backend("invalid notion auth header", e))?,
        );
        Ok(h)
    }

    fn query_url(&self, database_id: &str) -> String {
        format!("{}/v1/databases/{database_id}/query", self.api_base)
    }

    /// Continuation cursors are opaque strings; they go through the query
    /// serializer, never raw concatenation.
    fn blocks_url(&self, block_id: &str, cursor: Option<&str>) -> Result<reqwest::Url> {
        let mut url =
            reqwest::Url::parse(&format!("{}/v1/blocks/{block_id}/children", self.api_base))
                .map_err(|e| Error::backend("invalid block-children url", e))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("page_size", &PAGE_SIZE.to_string());
            if let Some(cursor) = cursor {
                pairs.append_pair("start_cursor", cursor);
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl SourceApi for NotionApi {
    #[instrument(level = "info", skip(self, query), fields(database_id = %query.database_id))]
    async fn query_database(&self, query: &DatabaseQuery) -> Result<serde_json::Value> {
        let mut body = serde_json::Map::new();
        if let Some(filter) = &query.filter {
            body.insert("filter".to_string(), filter.clone());
        }
        if !query.sorts.is_empty() {
            let sorts = serde_json::to_value(&query.sorts)
                .map_err(|e| Error::backend("serialize sorts", e))?;
            body.insert("sorts".to_string(), sorts);
        }

        let resp = self
            .client
            .post(self.query_url(&query.database_id))
            .headers(self.headers()?)
            .json(&serde_json::Value::Object(body))
            .send()
            .await
            .map_err(Error::backend_reqwest)?
            .error_for_status()
            .map_err(Error::backend_reqwest)?;

        resp.json().await.map_err(Error::backend_reqwest)
    }

    #[instrument(level = "debug", skip(self))]
    async fn list_block_children(
        &self,
        block_id: &str,
        cursor: Option<&str>,
    ) -> Result<serde_json::Value> {
        let resp = self
            .client
            .get(self.blocks_url(block_id, cursor)?)
            .headers(self.headers()?)
            .send()
            .await
            .map_err(Error::backend_reqwest)?
            .error_for_status()
            .map_err(Error::backend_reqwest)?;

        resp.json().await.map_err(Error::backend_reqwest)
    }
}
