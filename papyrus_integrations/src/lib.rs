//! Optional source clients implementing the core `SourceApi` trait.

#[cfg(feature = "notion")]
pub mod notion;
