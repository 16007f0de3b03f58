//! The ingestion pipeline: normalization, block pagination, and the engine
//! that synchronizes one source database into the content store.

pub mod engine;
pub mod models;
pub mod normalize;
pub mod pages;
pub mod traits;
