/// Entity kinds stored as node labels in the graph
///
/// Every node carries exactly one of these labels. The set is closed: a label
/// read back from the store that is not listed here is reported as
/// `SpiderError::UnknownEntityKind` instead of being silently skipped.
use crate::SpiderError;
use std::fmt;
use std::str::FromStr;

/// The type of a graph node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    /// A GitHub repository; the main crawl origin
    Repository,

    /// A GitHub user account
    User,

    /// A programming language used by repositories
    Language,

    /// A comment on a commit
    CommitComment,

    /// A published release of a repository
    Release,

    /// An issue opened on a repository
    Issue,

    /// A milestone of a repository
    Milestone,

    /// A pull request opened on a repository
    PullRequest,
}

impl EntityKind {
    /// Returns true if nodes of this kind are expanded further
    ///
    /// Leaf kinds only exist as endpoints of edges created by their parent.
    pub fn is_expandable(&self) -> bool {
        matches!(self, Self::Repository | Self::User)
    }

    /// Converts the kind to the label stored in the database
    pub fn to_label(&self) -> &'static str {
        match self {
            Self::Repository => "repository",
            Self::User => "user",
            Self::Language => "language",
            Self::CommitComment => "commit-comment",
            Self::Release => "release",
            Self::Issue => "issue",
            Self::Milestone => "milestone",
            Self::PullRequest => "pull",
        }
    }

    /// Parses a kind from its stored label
    ///
    /// Returns None if the label doesn't match any known kind.
    pub fn from_label(s: &str) -> Option<Self> {
        match s {
            "repository" => Some(Self::Repository),
            "user" => Some(Self::User),
            "language" => Some(Self::Language),
            "commit-comment" => Some(Self::CommitComment),
            "release" => Some(Self::Release),
            "issue" => Some(Self::Issue),
            "milestone" => Some(Self::Milestone),
            "pull" => Some(Self::PullRequest),
            _ => None,
        }
    }

    /// Returns all entity kinds
    pub fn all_kinds() -> Vec<Self> {
        vec![
            Self::Repository,
            Self::User,
            Self::Language,
            Self::CommitComment,
            Self::Release,
            Self::Issue,
            Self::Milestone,
            Self::PullRequest,
        ]
    }
}

impl FromStr for EntityKind {
    type Err = SpiderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_label(s).ok_or_else(|| SpiderError::UnknownEntityKind(s.to_string()))
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_label())
    }
}
