//! GraphQL query construction
//!
//! Every query is built from a selector (`node(id:)` or `resource(url:)`)
//! and one fragment per entity kind listing the scalar fields we store.

use crate::fetch::{ConnectionShape, Relation};
use crate::state::EntityKind;
use url::Url;

const REPOSITORY_FIELDS: &[&str] = &[
    "id",
    "name",
    "description",
    "createdAt",
    "diskUsage",
    "forkCount",
    "squashMergeAllowed",
    "pushedAt",
    "isArchived",
    "isDisabled",
    "isFork",
    "isLocked",
    "isMirror",
    "isPrivate",
    "url",
];

const USER_FIELDS: &[&str] = &[
    "id",
    "name",
    "login",
    "bio",
    "company",
    "createdAt",
    "isBountyHunter",
    "isCampusExpert",
    "isDeveloperProgramMember",
    "isEmployee",
    "isHireable",
    "isSiteAdmin",
    "location",
    "updatedAt",
    "url",
];

const LANGUAGE_FIELDS: &[&str] = &["id", "name", "color"];

const COMMIT_COMMENT_FIELDS: &[&str] =
    &["id", "authorAssociation", "bodyText", "createdAt", "url"];

const RELEASE_FIELDS: &[&str] = &[
    "id",
    "name",
    "description",
    "createdAt",
    "isDraft",
    "isPrerelease",
    "publishedAt",
    "updatedAt",
    "url",
];

const ISSUE_FIELDS: &[&str] = &[
    "id",
    "number",
    "title",
    "bodyText",
    "state",
    "closed",
    "closedAt",
    "createdViaEmail",
    "locked",
    "publishedAt",
    "updatedAt",
    "url",
];

const MILESTONE_FIELDS: &[&str] = &[
    "id",
    "number",
    "title",
    "description",
    "state",
    "closed",
    "closedAt",
    "dueOn",
    "updatedAt",
    "url",
];

const PULL_REQUEST_FIELDS: &[&str] = &[
    "id",
    "number",
    "title",
    "bodyText",
    "state",
    "additions",
    "changedFiles",
    "mergeable",
    "merged",
    "mergedAt",
    "closed",
    "closedAt",
    "permalink",
    "updatedAt",
    "url",
];

const PAGE_INFO: &str = "totalCount pageInfo { endCursor hasNextPage }";

const RATE_LIMIT_QUERY: &str = "query { rateLimit { limit cost remaining resetAt } }";

/// Returns true unless `id_or_url` is an http(s) resource URL
///
/// Both the legacy base64 IDs (`MDQ6VXNlcjE=`) and the newer prefixed
/// ones (`U_kgDOBc-9Zw`) are addressed through `node(id:)`.
pub fn is_node_id(id_or_url: &str) -> bool {
    !matches!(
        Url::parse(id_or_url),
        Ok(url) if url.scheme() == "http" || url.scheme() == "https"
    )
}

/// Response field holding the selected entity
pub fn selector_field(id_or_url: &str) -> &'static str {
    if is_node_id(id_or_url) {
        "node"
    } else {
        "resource"
    }
}

fn quote(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

fn selector(id_or_url: &str) -> String {
    if is_node_id(id_or_url) {
        format!("node(id: {})", quote(id_or_url))
    } else {
        format!("resource(url: {})", quote(id_or_url))
    }
}

/// GraphQL object type backing an entity kind
pub fn type_name(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Repository => "Repository",
        EntityKind::User => "User",
        EntityKind::Language => "Language",
        EntityKind::CommitComment => "CommitComment",
        EntityKind::Release => "Release",
        EntityKind::Issue => "Issue",
        EntityKind::Milestone => "Milestone",
        EntityKind::PullRequest => "PullRequest",
    }
}

fn fields(kind: EntityKind) -> &'static [&'static str] {
    match kind {
        EntityKind::Repository => REPOSITORY_FIELDS,
        EntityKind::User => USER_FIELDS,
        EntityKind::Language => LANGUAGE_FIELDS,
        EntityKind::CommitComment => COMMIT_COMMENT_FIELDS,
        EntityKind::Release => RELEASE_FIELDS,
        EntityKind::Issue => ISSUE_FIELDS,
        EntityKind::Milestone => MILESTONE_FIELDS,
        EntityKind::PullRequest => PULL_REQUEST_FIELDS,
    }
}

fn fragment_name(kind: EntityKind) -> String {
    format!("{}Fragment", type_name(kind))
}

fn fragment(kind: EntityKind) -> String {
    format!(
        "fragment {} on {} {{ {} }}",
        fragment_name(kind),
        type_name(kind),
        fields(kind).join(" ")
    )
}

/// Query for a single entity
pub fn entity_query(kind: EntityKind, id_or_url: &str) -> String {
    format!(
        "query {{ {} {{ ... on {} {{ ...{} }} }} }}\n{}",
        selector(id_or_url),
        type_name(kind),
        fragment_name(kind),
        fragment(kind)
    )
}

/// Query for one page of a connection
pub fn connection_query(
    parent: &str,
    relation: Relation,
    page_size: u32,
    cursor: Option<&str>,
) -> String {
    let after = cursor.map(quote).unwrap_or_else(|| "null".to_string());
    let target = relation.target();

    let items = match relation.shape() {
        ConnectionShape::Nodes => format!("nodes {{ ...{} }}", fragment_name(target)),
        ConnectionShape::Edges(edge_fields) => format!(
            "edges {{ {} node {{ ...{} }} }}",
            edge_fields.join(" "),
            fragment_name(target)
        ),
    };

    format!(
        "query {{ {} {{ ... on {} {{ {}(first: {}, after: {}) {{ {} {} }} }} }} }}\n{}",
        selector(parent),
        type_name(relation.owner()),
        relation.field(),
        page_size,
        after,
        PAGE_INFO,
        items,
        fragment(target)
    )
}

pub fn rate_limit_query() -> &'static str {
    RATE_LIMIT_QUERY
}
