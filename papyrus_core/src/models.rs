use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Sort direction understood by the source database.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// One sort clause, passed through verbatim to the source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortSpec {
    pub property: String,
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn new(property: impl Into<String>, direction: SortDirection) -> Result<Self> {
        let property = property.into();
        if property.trim().is_empty() {
            return Err(Error::InvalidInput("sort property is empty".to_string()));
        }
        Ok(Self {
            property,
            direction,
        })
    }
}

/// The query sent to the source database. Filter and sort semantics belong to
/// the source; this side treats the filter as an opaque expression.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatabaseQuery {
    pub database_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sorts: Vec<SortSpec>,
}

/// Configuration for one ingestion source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Identifier of the source database to query.
    pub database_id: String,
    /// Opaque filter expression forwarded verbatim to the source.
    pub filter: Option<serde_json::Value>,
    /// Source-side sort clauses, forwarded verbatim.
    pub sorts: Vec<SortSpec>,
    /// Upper bound on concurrently ingested records.
    pub max_in_flight: usize,
}

impl IngestConfig {
    pub const DEFAULT_MAX_IN_FLIGHT: usize = 8;

    #[tracing::instrument(level = "debug", skip(filter, sorts))]
    pub fn new(
        database_id: impl Into<String> + std::fmt::Debug,
        filter: Option<serde_json::Value>,
        sorts: Vec<SortSpec>,
        max_in_flight: usize,
    ) -> Result<Self> {
        let database_id = database_id.into();
        if database_id.trim().is_empty() {
            return Err(Error::InvalidInput("database_id is empty".to_string()));
        }
        if max_in_flight == 0 {
            return Err(Error::InvalidInput(
                "max_in_flight must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            database_id,
            filter,
            sorts,
            max_in_flight,
        })
    }

    pub fn query(&self) -> DatabaseQuery {
        DatabaseQuery {
            database_id: self.database_id.clone(),
            filter: self.filter.clone(),
            sorts: self.sorts.clone(),
        }
    }
}
