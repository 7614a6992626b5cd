//! # contract: tracker-facing seams of the engine
//!
//! The engine never talks HTTP. It reaches both trackers through the three
//! async traits below, implemented by network clients in the CLI crate and by
//! `mockall` mocks in tests.
//!
//! - [`EntrySource`]: reads raw time entries (source tracker).
//! - [`TaxonomyStore`]: reads and extends a client/project taxonomy (the
//!   tracker reconciliation creates entities in).
//! - [`WorklogSink`]: reads the posting catalog and accepts posts (target
//!   tracker).
//!
//! Each call is expected to carry its own timeout. Errors are boxed; the
//! engine treats them as fatal for the call that produced them and never
//! retries.

use async_trait::async_trait;
use chrono::NaiveDate;

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

use crate::error::{CreateError, TransportError};
use crate::model::{Catalog, EntityId, PostConfirmation, PostRequest, RawEntry, TaxonomyEntity};

/// Source of raw time entries.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait EntrySource: Send + Sync {
    /// All entries of `workspace_id` recorded between `since` and `until`,
    /// both inclusive.
    async fn fetch_entries(
        &self,
        workspace_id: &EntityId,
        since: NaiveDate,
        until: NaiveDate,
    ) -> Result<Vec<RawEntry>, TransportError>;
}

/// A taxonomy that reconciliation can add clients and projects to.
///
/// Create calls report an entity that exists already as
/// [`CreateError::AlreadyExists`] rather than as a generic failure.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait TaxonomyStore: Send + Sync {
    /// Fresh snapshot of all clients and projects.
    async fn fetch_catalog(&self) -> Result<Catalog, TransportError>;

    async fn create_client(&self, name: &str) -> Result<TaxonomyEntity, CreateError>;

    async fn create_project(
        &self,
        client_id: &EntityId,
        name: &str,
    ) -> Result<TaxonomyEntity, CreateError>;
}

/// The tracker that receives posts.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait WorklogSink: Send + Sync {
    /// Snapshot of the projects and tasks posts can be filed under.
    async fn fetch_catalog(&self) -> Result<Catalog, TransportError>;

    /// Submits one post.
    async fn add_post(&self, request: &PostRequest) -> Result<PostConfirmation, TransportError>;
}
