//! Fetch module for pulling related entities from the API
//!
//! This module contains:
//! - The `Fetcher` trait the crawler depends on
//! - Records and pages as returned by a fetcher
//! - Lazy cursor pagination on top of `Fetcher::fetch_page`
//! - A retry policy with Fibonacci backoff
//! - The GitHub GraphQL implementation

mod github;
mod pagination;
mod queries;
mod record;
mod retry;

pub use github::{build_http_client, GitHubFetcher, DEFAULT_ENDPOINT};
pub use pagination::related;
pub use queries::is_node_id;
pub use record::{Page, Record};
pub use retry::{with_retry, RetryPolicy};

use crate::state::EntityKind;
use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

/// Errors raised while fetching from the API
#[derive(Debug, Error)]
pub enum FetchError {
    /// Rate limiting, server errors, network failures
    #[error("Transient fetch failure: {0}")]
    Transient(String),

    /// The declared size of a relation is beyond the safety limit
    #[error("{relation} declares {total_count} entries, limit is {limit}")]
    QuotaExceeded {
        relation: Relation,
        total_count: u64,
        limit: u64,
    },

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("API returned errors: {0}")]
    Api(String),

    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl FetchError {
    /// Returns true if repeating the same request may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Which connection of a parent entity to list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relation {
    // ===== Repository connections =====
    AssignableUsers,
    Stargazers,
    Forks,
    RepositoryCommitComments,
    Releases,
    RepositoryIssues,
    Milestones,
    PullRequests,
    Languages,

    // ===== User connections =====
    Followers,
    Following,
    UserCommitComments,
    UserIssues,
    Repositories,
    RepositoriesContributedTo,
    Watching,
}

/// How the items of a connection are laid out in a response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionShape {
    /// `nodes { ... }`: plain entities
    Nodes,
    /// `edges { <edge fields> node { ... } }`: the relation carries attributes
    Edges(&'static [&'static str]),
}

impl Relation {
    /// The GraphQL connection field on the parent type
    pub fn field(&self) -> &'static str {
        match self {
            Self::AssignableUsers => "assignableUsers",
            Self::Stargazers => "stargazers",
            Self::Forks => "forks",
            Self::RepositoryCommitComments | Self::UserCommitComments => "commitComments",
            Self::Releases => "releases",
            Self::RepositoryIssues | Self::UserIssues => "issues",
            Self::Milestones => "milestones",
            Self::PullRequests => "pullRequests",
            Self::Languages => "languages",
            Self::Followers => "followers",
            Self::Following => "following",
            Self::Repositories => "repositories",
            Self::RepositoriesContributedTo => "repositoriesContributedTo",
            Self::Watching => "watching",
        }
    }

    /// Kind of the entity owning the connection
    pub fn owner(&self) -> EntityKind {
        match self {
            Self::AssignableUsers
            | Self::Stargazers
            | Self::Forks
            | Self::RepositoryCommitComments
            | Self::Releases
            | Self::RepositoryIssues
            | Self::Milestones
            | Self::PullRequests
            | Self::Languages => EntityKind::Repository,
            Self::Followers
            | Self::Following
            | Self::UserCommitComments
            | Self::UserIssues
            | Self::Repositories
            | Self::RepositoriesContributedTo
            | Self::Watching => EntityKind::User,
        }
    }

    /// Kind of the listed entities
    pub fn target(&self) -> EntityKind {
        match self {
            Self::AssignableUsers | Self::Stargazers | Self::Followers | Self::Following => {
                EntityKind::User
            }
            Self::Forks
            | Self::Repositories
            | Self::RepositoriesContributedTo
            | Self::Watching => EntityKind::Repository,
            Self::RepositoryCommitComments | Self::UserCommitComments => EntityKind::CommitComment,
            Self::Releases => EntityKind::Release,
            Self::RepositoryIssues | Self::UserIssues => EntityKind::Issue,
            Self::Milestones => EntityKind::Milestone,
            Self::PullRequests => EntityKind::PullRequest,
            Self::Languages => EntityKind::Language,
        }
    }

    pub fn shape(&self) -> ConnectionShape {
        match self {
            Self::Stargazers => ConnectionShape::Edges(&["starredAt"]),
            Self::Languages => ConnectionShape::Edges(&["size"]),
            _ => ConnectionShape::Nodes,
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.owner(), self.field())
    }
}

/// Source of entities for the crawler
///
/// Implementations handle transient failures themselves; an error returned
/// from here has already exhausted its retries.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetches one page of `relation` for the entity `parent`
    ///
    /// `cursor` is the `end_cursor` of the previous page, `None` for the first.
    async fn fetch_page(
        &self,
        parent: &str,
        relation: Relation,
        cursor: Option<&str>,
    ) -> Result<Page, FetchError>;

    /// Fetches a single entity by node ID or resource URL
    async fn fetch_entity(&self, kind: EntityKind, id_or_url: &str) -> Result<Record, FetchError>;

    /// Remaining API calls for the active credential
    async fn remaining_quota(&self) -> Result<u32, FetchError>;

    /// Makes `token` the credential used by subsequent requests
    fn switch_credential(&self, token: &str);
}
