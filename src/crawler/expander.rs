//! Entity expansion
//!
//! Expanding a node lists every relation its kind has, merges the related
//! entities as nodes and links them to the parent with labelled edges.

use crate::config::CrawlerConfig;
use crate::fetch::{related, Fetcher, Relation};
use crate::state::EntityKind;
use crate::storage::{GraphStore, NodeRef};
use crate::{Result, SpiderError};
use futures::stream::{self, StreamExt, TryStreamExt};
use std::sync::Arc;

/// Which way an edge points relative to the expanded node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// relative -> parent (e.g. a stargazer stars the repository)
    Inbound,
    /// parent -> relative (e.g. a repository uses a language)
    Outbound,
}

impl Direction {
    /// Returns `(start, end)` of the edge between `parent` and `relative`
    pub fn resolve<T>(self, parent: T, relative: T) -> (T, T) {
        match self {
            Self::Inbound => (relative, parent),
            Self::Outbound => (parent, relative),
        }
    }
}

/// One relation followed when expanding a kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpansionRule {
    pub relation: Relation,
    pub edge_label: &'static str,
    pub direction: Direction,
}

impl ExpansionRule {
    const fn new(relation: Relation, edge_label: &'static str, direction: Direction) -> Self {
        Self {
            relation,
            edge_label,
            direction,
        }
    }

    /// Kind of the related entities
    pub fn target(&self) -> EntityKind {
        self.relation.target()
    }
}

const REPOSITORY_RULES: &[ExpansionRule] = &[
    ExpansionRule::new(Relation::AssignableUsers, "assignable", Direction::Inbound),
    ExpansionRule::new(Relation::Stargazers, "stargazer", Direction::Inbound),
    ExpansionRule::new(Relation::Forks, "fork", Direction::Inbound),
    ExpansionRule::new(Relation::RepositoryCommitComments, "describes", Direction::Inbound),
    ExpansionRule::new(Relation::Releases, "describes", Direction::Inbound),
    ExpansionRule::new(Relation::RepositoryIssues, "describes", Direction::Inbound),
    ExpansionRule::new(Relation::Milestones, "describes", Direction::Inbound),
    ExpansionRule::new(Relation::PullRequests, "describes", Direction::Inbound),
    ExpansionRule::new(Relation::Languages, "uses", Direction::Outbound),
];

const USER_RULES: &[ExpansionRule] = &[
    ExpansionRule::new(Relation::Followers, "follows", Direction::Inbound),
    ExpansionRule::new(Relation::Following, "follows", Direction::Outbound),
    ExpansionRule::new(Relation::UserCommitComments, "wrote", Direction::Outbound),
    ExpansionRule::new(Relation::UserIssues, "wrote", Direction::Outbound),
    ExpansionRule::new(Relation::Repositories, "created", Direction::Outbound),
    ExpansionRule::new(Relation::RepositoriesContributedTo, "contributed-to", Direction::Outbound),
    ExpansionRule::new(Relation::Watching, "watches", Direction::Outbound),
];

/// Relations followed when expanding `kind`; empty for leaf kinds
pub fn rules(kind: EntityKind) -> &'static [ExpansionRule] {
    match kind {
        EntityKind::Repository => REPOSITORY_RULES,
        EntityKind::User => USER_RULES,
        EntityKind::Language
        | EntityKind::CommitComment
        | EntityKind::Release
        | EntityKind::Issue
        | EntityKind::Milestone
        | EntityKind::PullRequest => &[],
    }
}

/// Limits applied while expanding
#[derive(Debug, Clone, Copy)]
pub struct ExpanderSettings {
    /// Relatives merged per relation
    pub relatives_cap: usize,
    /// Relations declaring more entries are refused
    pub total_count_limit: u64,
    pub max_concurrent_relations: usize,
}

impl From<&CrawlerConfig> for ExpanderSettings {
    fn from(config: &CrawlerConfig) -> Self {
        Self {
            relatives_cap: config.relatives_cap,
            total_count_limit: config.total_count_limit,
            max_concurrent_relations: config.max_concurrent_relations,
        }
    }
}

/// What one expansion added to the graph
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpansionSummary {
    /// Related entities merged
    pub relatives: u64,
    /// Edges that did not exist before
    pub edges_created: u64,
}

impl ExpansionSummary {
    fn add(&mut self, other: ExpansionSummary) {
        self.relatives += other.relatives;
        self.edges_created += other.edges_created;
    }
}

/// Expands nodes by following the relations of their kind
pub struct EntityExpander {
    store: Arc<dyn GraphStore>,
    fetcher: Arc<dyn Fetcher>,
    settings: ExpanderSettings,
}

impl EntityExpander {
    pub fn new(
        store: Arc<dyn GraphStore>,
        fetcher: Arc<dyn Fetcher>,
        settings: ExpanderSettings,
    ) -> Self {
        Self {
            store,
            fetcher,
            settings,
        }
    }

    /// Follows every relation of `kind` from `node`
    ///
    /// Relations run concurrently and all of them are awaited. Work done by
    /// successful relations stays in the graph when another one fails; the
    /// first failure (a fatal one if any) is returned.
    pub async fn expand(&self, node: &NodeRef, kind: EntityKind) -> Result<ExpansionSummary> {
        let results: Vec<Result<ExpansionSummary>> = stream::iter(rules(kind))
            .map(|rule| self.expand_rule(node, rule))
            .buffer_unordered(self.settings.max_concurrent_relations.max(1))
            .collect()
            .await;

        let mut summary = ExpansionSummary::default();
        let mut failure: Option<SpiderError> = None;

        for result in results {
            match result {
                Ok(partial) => summary.add(partial),
                Err(e) => {
                    let replace = match &failure {
                        None => true,
                        Some(current) => e.is_fatal() && !current.is_fatal(),
                    };
                    if replace {
                        failure = Some(e);
                    }
                }
            }
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(summary),
        }
    }

    async fn expand_rule(&self, node: &NodeRef, rule: &ExpansionRule) -> Result<ExpansionSummary> {
        let mut records = related(
            self.fetcher.as_ref(),
            &node.uri,
            rule.relation,
            self.settings.total_count_limit,
        )
        .take(self.settings.relatives_cap);

        let mut summary = ExpansionSummary::default();

        while let Some(record) = records.try_next().await? {
            let relative = self.store.get_or_create_node(rule.target(), &record.uri)?;
            self.store
                .merge_node_attributes(relative.id, &record.attributes)?;

            let (start, end) = rule.direction.resolve(node.id, relative.id);
            let edge = self.store.get_or_create_edge(rule.edge_label, start, end)?;

            if edge.created {
                summary.edges_created += 1;
                if !record.edge_attributes.is_empty() {
                    self.store
                        .merge_edge_attributes(edge.id, &record.edge_attributes)?;
                }
            }
            summary.relatives += 1;
        }

        if summary.relatives > 0 {
            tracing::debug!(
                "{} of {}: {} relatives, {} new edges",
                rule.relation,
                node.uri,
                summary.relatives,
                summary.edges_created
            );
        }

        Ok(summary)
    }
}
