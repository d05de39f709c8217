//! Integration tests for the crawler
//!
//! These tests drive full passes against an in-memory fetcher and check
//! the resulting graph through the store.

use crate::common::{frontier, memory_store, settings, users, FakeFetcher};
use ghgraph::config::CrawlerConfig;
use ghgraph::crawler::release_all;
use ghgraph::fetch::{FetchError, Record, Relation};
use ghgraph::storage::{GraphStore, PassStatus, Scalar, SqliteGraphStore};
use ghgraph::{EntityKind, NodeState, SpiderError};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_stargazers_after_one_pass() {
    let fetcher = Arc::new(
        FakeFetcher::new()
            .entity("repo:1", Record::new("repo:1").with_attribute("name", "tensorflow"))
            .relation(
                "repo:1",
                Relation::Stargazers,
                vec![
                    Record::new("user:A").with_edge_attribute("starredAt", "2019-05-01T10:00:00Z"),
                    Record::new("user:B").with_edge_attribute("starredAt", "2019-06-01T10:00:00Z"),
                ],
            ),
    );
    let store = memory_store();
    let mut frontier = frontier(&store, &fetcher, settings());

    frontier.seed(EntityKind::Repository, "repo:1").await.unwrap();
    let report = frontier.process().await.unwrap();

    assert_eq!(report.nodes_to_process, 1);
    assert_eq!(report.processed, 1);
    assert_eq!(store.count_nodes().unwrap(), 3);
    assert_eq!(store.count_edges().unwrap(), 2);

    let repo = store.get_node("repo:1").unwrap().unwrap();
    assert!(repo.processed > 0);
    assert_eq!(repo.state(), NodeState::Processed);

    for uri in ["user:A", "user:B"] {
        let user = store.find_by_uri(uri).unwrap().unwrap();
        assert_eq!(user.label, "user");
        let edge = store.find_edge("stargazer", user.id, repo.id).unwrap();
        assert!(edge.is_some(), "missing stargazer edge from {}", uri);
    }

    let a = store.find_by_uri("user:A").unwrap().unwrap();
    let edge = store.find_edge("stargazer", a.id, repo.id).unwrap().unwrap();
    assert_eq!(
        store.edge_attributes(edge.id).unwrap().get("starredAt"),
        Some(&Scalar::from("2019-05-01T10:00:00Z"))
    );
}

#[tokio::test]
async fn test_total_count_over_limit_quarantines_node() {
    let fetcher = Arc::new(
        FakeFetcher::new()
            .entity("repo:1", Record::new("repo:1"))
            .relation("repo:1", Relation::Stargazers, users("user:", 3))
            .declaring("repo:1", Relation::Stargazers, 50_000),
    );
    let store = memory_store();
    let strict = CrawlerConfig {
        skip_errored: false,
        total_count_limit: 10_000,
        ..settings()
    };
    let mut frontier = frontier(&store, &fetcher, strict);

    frontier.seed(EntityKind::Repository, "repo:1").await.unwrap();
    let report = frontier.process().await.unwrap();

    assert_eq!(report.quarantined, 1);
    assert_eq!(store.count_nodes_by_label().unwrap().get("user"), None);

    let repo = store.get_node("repo:1").unwrap().unwrap();
    assert_eq!(repo.state(), NodeState::Quarantined);
    assert!(repo.error.unwrap().contains("declares 50000 entries, limit is 10000"));

    // Still schedulable while errored nodes are not skipped
    assert!(frontier.has_unprocessed().unwrap());
    assert!(store.has_unprocessed(false).unwrap());
    // Excluded once they are
    assert!(!store.has_unprocessed(true).unwrap());

    // Released nodes are schedulable again
    assert_eq!(release_all(store.as_ref()).unwrap(), 1);
    assert!(store.has_unprocessed(true).unwrap());
}

#[tokio::test]
async fn test_run_stops_when_only_quarantined_nodes_remain() {
    let fetcher = Arc::new(
        FakeFetcher::new()
            .entity("repo:1", Record::new("repo:1"))
            .declaring("repo:1", Relation::Forks, 50_000),
    );
    let store = memory_store();
    let strict = CrawlerConfig {
        skip_errored: false,
        ..settings()
    };
    let mut frontier = frontier(&store, &fetcher, strict);

    frontier.seed(EntityKind::Repository, "repo:1").await.unwrap();
    let reports = frontier.run(None).await.unwrap();

    assert_eq!(reports.len(), 1);
    assert!(!reports[0].made_progress());
    assert!(frontier.has_unprocessed().unwrap());
}

#[tokio::test]
async fn test_retried_node_loses_its_error_marker() {
    let fetcher = Arc::new(
        FakeFetcher::new()
            .entity("user:A", Record::new("user:A"))
            .relation("user:A", Relation::Following, users("user:B", 2))
            .flaky("user:A", Relation::Following, 1),
    );
    let store = memory_store();
    let strict = CrawlerConfig {
        skip_errored: false,
        ..settings()
    };
    let mut frontier = frontier(&store, &fetcher, strict);

    frontier.seed(EntityKind::User, "user:A").await.unwrap();

    let first = frontier.process().await.unwrap();
    assert_eq!(first.quarantined, 1);
    assert_eq!(
        store.get_node("user:A").unwrap().unwrap().state(),
        NodeState::Quarantined
    );

    let second = frontier.process().await.unwrap();
    assert_eq!(second.processed, 1);
    assert_eq!(second.quarantined, 0);

    let node = store.get_node("user:A").unwrap().unwrap();
    assert_eq!(node.state(), NodeState::Processed);
    assert!(node.error.is_none());
    assert!(node.error_trace.is_none());
    assert_eq!(store.count_quarantined().unwrap(), 0);
    assert_eq!(release_all(store.as_ref()).unwrap(), 0);
}

#[tokio::test]
async fn test_nodes_found_during_pass_wait_for_next_pass() {
    let fetcher = Arc::new(
        FakeFetcher::new()
            .entity("user:A", Record::new("user:A"))
            .relation("user:A", Relation::Following, users("user:B", 2))
            .relation("user:B0", Relation::Following, users("user:C", 1)),
    );
    let store = memory_store();
    let mut frontier = frontier(&store, &fetcher, settings());

    frontier.seed(EntityKind::User, "user:A").await.unwrap();

    let first = frontier.process().await.unwrap();
    assert_eq!(first.nodes_to_process, 1);
    assert_eq!(first.processed, 1);
    assert_eq!(
        store.get_node("user:B0").unwrap().unwrap().state(),
        NodeState::Unprocessed
    );

    let second = frontier.process().await.unwrap();
    assert_eq!(second.nodes_to_process, 2);
    assert_eq!(second.total_nodes, 3);
    assert_eq!(
        store.get_node("user:C0").unwrap().unwrap().state(),
        NodeState::Unprocessed
    );

    let third = frontier.process().await.unwrap();
    assert_eq!(third.nodes_to_process, 1);
    assert!(!frontier.has_unprocessed().unwrap());
}

#[tokio::test]
async fn test_run_terminates_on_cyclic_graph() {
    let fetcher = Arc::new(
        FakeFetcher::new()
            .entity("user:A", Record::new("user:A"))
            .relation("user:A", Relation::Following, vec![Record::new("user:B")])
            .relation("user:B", Relation::Following, vec![Record::new("user:C")])
            .relation("user:C", Relation::Following, vec![Record::new("user:A")])
            .relation("user:C", Relation::Repositories, vec![Record::new("repo:1")])
            .relation("repo:1", Relation::Languages, vec![Record::new("lang:rust")]),
    );
    let store = memory_store();
    let mut frontier = frontier(&store, &fetcher, settings());

    frontier.seed(EntityKind::User, "user:A").await.unwrap();
    let reports = frontier.run(None).await.unwrap();

    let processed: u64 = reports.iter().map(|r| r.processed).sum();
    assert_eq!(processed, store.count_nodes().unwrap());
    assert_eq!(store.count_nodes().unwrap(), 5);
    assert!(!frontier.has_unprocessed().unwrap());
    assert!(reports.iter().all(|r| r.quarantined == 0));

    assert_eq!(store.count_passes().unwrap(), reports.len() as u64);
    assert_eq!(
        store.latest_pass().unwrap().unwrap().status,
        PassStatus::Completed
    );
}

#[tokio::test]
async fn test_follow_edge_is_unique_across_both_sides() {
    // B follows A: seen from A's followers and from B's following
    let fetcher = Arc::new(
        FakeFetcher::new()
            .entity("user:A", Record::new("user:A"))
            .relation("user:A", Relation::Followers, vec![Record::new("user:B")])
            .relation("user:B", Relation::Following, vec![Record::new("user:A")]),
    );
    let store = memory_store();
    let mut frontier = frontier(&store, &fetcher, settings());

    frontier.seed(EntityKind::User, "user:A").await.unwrap();
    frontier.run(None).await.unwrap();

    let a = store.find_by_uri("user:A").unwrap().unwrap();
    let b = store.find_by_uri("user:B").unwrap().unwrap();
    assert_eq!(store.count_edges().unwrap(), 1);
    assert!(store.find_edge("follows", b.id, a.id).unwrap().is_some());
    assert!(store.find_edge("follows", a.id, b.id).unwrap().is_none());
}

#[tokio::test]
async fn test_shared_relative_is_merged_once() {
    let fetcher = Arc::new(
        FakeFetcher::new()
            .entity("user:A", Record::new("user:A"))
            .relation(
                "user:A",
                Relation::Repositories,
                vec![Record::new("repo:1"), Record::new("repo:2")],
            )
            .relation("repo:1", Relation::Stargazers, vec![Record::new("user:S")])
            .relation("repo:2", Relation::Stargazers, vec![Record::new("user:S")]),
    );
    let store = memory_store();
    let mut frontier = frontier(&store, &fetcher, settings());

    frontier.seed(EntityKind::User, "user:A").await.unwrap();
    frontier.seed(EntityKind::User, "user:A").await.unwrap();
    frontier.run(None).await.unwrap();

    assert_eq!(store.count_nodes().unwrap(), 4);
    let by_label = store.count_edges_by_label().unwrap();
    assert_eq!(by_label.get("created"), Some(&2));
    assert_eq!(by_label.get("stargazer"), Some(&2));
}

#[tokio::test]
async fn test_null_attributes_never_erase() {
    let fetcher = Arc::new(
        FakeFetcher::new()
            .entity("repo:1", Record::new("repo:1"))
            .relation(
                "repo:1",
                Relation::Forks,
                vec![Record::new("repo:2").with_attribute("description", "a fork")],
            )
            .relation(
                "repo:1",
                Relation::AssignableUsers,
                vec![Record::new("user:A")],
            )
            .relation(
                "user:A",
                Relation::Watching,
                vec![Record::new("repo:2")
                    .with_null("description")
                    .with_attribute("forkCount", 3i64)],
            ),
    );
    let store = memory_store();
    let mut frontier = frontier(&store, &fetcher, settings());

    frontier.seed(EntityKind::Repository, "repo:1").await.unwrap();
    frontier.run(None).await.unwrap();

    let fork = store.find_by_uri("repo:2").unwrap().unwrap();
    let attributes = store.node_attributes(fork.id).unwrap();
    assert_eq!(attributes.get("description"), Some(&Scalar::from("a fork")));
    assert_eq!(attributes.get("forkCount"), Some(&Scalar::Integer(3)));
}

#[tokio::test]
async fn test_failed_relation_keeps_sibling_work() {
    let fetcher = Arc::new(
        FakeFetcher::new()
            .entity("repo:1", Record::new("repo:1"))
            .relation("repo:1", Relation::Forks, vec![Record::new("repo:2")])
            .relation("repo:1", Relation::Stargazers, users("user:", 2))
            .failing("repo:1", Relation::RepositoryIssues, "Something went wrong"),
    );
    let store = memory_store();
    let mut frontier = frontier(&store, &fetcher, settings());

    frontier.seed(EntityKind::Repository, "repo:1").await.unwrap();
    let first = frontier.process().await.unwrap();

    assert_eq!(first.quarantined, 1);
    let repo = store.get_node("repo:1").unwrap().unwrap();
    assert_eq!(repo.state(), NodeState::Quarantined);
    assert!(repo.error_trace.unwrap().contains("Something went wrong"));

    let fork = store.find_by_uri("repo:2").unwrap().unwrap();
    assert!(store.find_edge("fork", fork.id, repo.id).unwrap().is_some());
    assert_eq!(store.count_edges_by_label().unwrap().get("stargazer"), Some(&2));

    // The relatives are processed in the next pass; the failed node is skipped
    let second = frontier.process().await.unwrap();
    assert_eq!(second.nodes_to_process, 3);
    assert_eq!(second.processed, 3);
    assert!(!frontier.has_unprocessed().unwrap());
}

#[tokio::test]
async fn test_one_failing_node_does_not_stop_the_pass() {
    let fetcher = Arc::new(
        FakeFetcher::new()
            .entity("user:A", Record::new("user:A"))
            .relation("user:A", Relation::Following, users("user:B", 3))
            .failing("user:B1", Relation::Followers, "Something went wrong"),
    );
    let store = memory_store();
    let mut frontier = frontier(&store, &fetcher, settings());

    frontier.seed(EntityKind::User, "user:A").await.unwrap();
    frontier.process().await.unwrap();
    let second = frontier.process().await.unwrap();

    assert_eq!(second.nodes_to_process, 3);
    assert_eq!(second.processed, 2);
    assert_eq!(second.quarantined, 1);
    assert_eq!(
        store.get_node("user:B1").unwrap().unwrap().state(),
        NodeState::Quarantined
    );
    assert_eq!(
        store.latest_pass().unwrap().unwrap().status,
        PassStatus::Completed
    );
}

#[tokio::test]
async fn test_relatives_cap_limits_pages_fetched() {
    let fetcher = Arc::new(
        FakeFetcher::new()
            .page_size(100)
            .entity("repo:1", Record::new("repo:1"))
            .relation("repo:1", Relation::Stargazers, users("user:", 250)),
    );
    let store = memory_store();
    let capped = CrawlerConfig {
        relatives_cap: 128,
        ..settings()
    };
    let mut frontier = frontier(&store, &fetcher, capped);

    frontier.seed(EntityKind::Repository, "repo:1").await.unwrap();
    frontier.process().await.unwrap();

    assert_eq!(store.count_edges().unwrap(), 128);
    // Two stargazer pages plus one page for each of the other eight relations
    assert_eq!(fetcher.pages_served(), 10);
}

#[tokio::test]
async fn test_oversized_attribute_quarantines_parent() {
    let fetcher = Arc::new(
        FakeFetcher::new()
            .entity("repo:1", Record::new("repo:1"))
            .relation(
                "repo:1",
                Relation::RepositoryIssues,
                vec![Record::new("issue:1").with_attribute("bodyText", "x".repeat(512))],
            ),
    );
    let store = Arc::new(
        SqliteGraphStore::new_in_memory()
            .unwrap()
            .with_max_value_size(256),
    );
    let mut frontier = frontier(&store, &fetcher, settings());

    frontier.seed(EntityKind::Repository, "repo:1").await.unwrap();
    let report = frontier.process().await.unwrap();

    assert_eq!(report.quarantined, 1);
    let repo = store.get_node("repo:1").unwrap().unwrap();
    assert!(repo.error.unwrap().contains("bodyText"));
    let issue = store.find_by_uri("issue:1").unwrap().unwrap();
    assert!(store.node_attributes(issue.id).unwrap().is_empty());
}

#[tokio::test]
async fn test_slow_node_times_out() {
    let fetcher = Arc::new(
        FakeFetcher::new()
            .entity("user:A", Record::new("user:A"))
            .delayed("user:A", Relation::Watching, Duration::from_secs(30)),
    );
    let store = memory_store();
    let impatient = CrawlerConfig {
        node_timeout_secs: 1,
        ..settings()
    };
    let mut frontier = frontier(&store, &fetcher, impatient);

    frontier.seed(EntityKind::User, "user:A").await.unwrap();
    let report = frontier.process().await.unwrap();

    assert_eq!(report.quarantined, 1);
    let user = store.get_node("user:A").unwrap().unwrap();
    assert!(user.error.unwrap().contains("timed out after 1s"));
}

#[tokio::test]
async fn test_unknown_label_is_quarantined() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("graph.db");
    let store = Arc::new(SqliteGraphStore::new(&path).unwrap());
    store.get_or_create_node(EntityKind::Language, "lang:rust").unwrap();

    // A label written by some other tool
    let conn = rusqlite::Connection::open(&path).unwrap();
    conn.execute(
        "INSERT INTO nodes (uri, label, created, processed) VALUES ('gist:1', 'gist', 1, 0)",
        [],
    )
    .unwrap();
    drop(conn);

    let fetcher = Arc::new(FakeFetcher::new());
    let mut frontier = frontier(&store, &fetcher, settings());
    let report = frontier.process().await.unwrap();

    assert_eq!(report.nodes_to_process, 2);
    assert_eq!(report.processed, 1);
    assert_eq!(report.quarantined, 1);
    let gist = store.get_node("gist:1").unwrap().unwrap();
    assert_eq!(gist.error.as_deref(), Some("Unknown entity kind: gist"));
}

#[tokio::test]
async fn test_seed_that_cannot_be_resolved() {
    let fetcher = Arc::new(FakeFetcher::new());
    let store = memory_store();
    let frontier = frontier(&store, &fetcher, settings());

    let result = frontier
        .seed(EntityKind::Repository, "https://github.com/nobody/nothing")
        .await;

    assert!(matches!(result, Err(SpiderError::Fetch(FetchError::Api(_)))));
    assert_eq!(store.count_nodes().unwrap(), 0);
}

#[tokio::test]
async fn test_graph_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("graph.db");
    let fetcher = Arc::new(
        FakeFetcher::new()
            .entity("user:A", Record::new("user:A"))
            .relation("user:A", Relation::Following, users("user:B", 2)),
    );

    {
        let store = Arc::new(SqliteGraphStore::new(&path).unwrap());
        let mut frontier = frontier(&store, &fetcher, settings());
        frontier.seed(EntityKind::User, "user:A").await.unwrap();
        frontier.process().await.unwrap();
    }

    let store = Arc::new(SqliteGraphStore::new(&path).unwrap());
    let mut frontier = frontier(&store, &fetcher, settings());
    assert!(frontier.has_unprocessed().unwrap());

    let report = frontier.process().await.unwrap();
    assert_eq!(report.nodes_to_process, 2);
    assert_eq!(store.count_passes().unwrap(), 2);
    assert!(!frontier.has_unprocessed().unwrap());
}
