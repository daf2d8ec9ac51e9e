use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::types::{Category, CloseReason, Comment, Discussion, LabelId, ReactionContent, Repo};

/// Upper bound GitHub accepts for `first` on a connection.
pub const MAX_PAGE_SIZE: u32 = 100;

// Nested inside comments, so kept small to stay under GitHub's node limit.
const COMMENT_FIELDS: &str = r#"
    fragment CommentFields on DiscussionComment {
        id
        body
        bodyText
        createdAt
        updatedAt
        author {
            login
        }
        reactions(first: 25) {
            nodes {
                content
            }
        }
        thumbsDown: reactions(content: THUMBS_DOWN) {
            totalCount
        }
        confused: reactions(content: CONFUSED) {
            totalCount
        }
        replies(first: 1) {
            totalCount
        }
    }
"#;

const CATEGORIES_QUERY: &str = r#"
    query($owner: String!, $name: String!) {
        repository(owner: $owner, name: $name) {
            discussionCategories(first: 100) {
                nodes {
                    id
                    name
                    isAnswerable
                }
            }
        }
    }
"#;

const DISCUSSIONS_QUERY: &str = r#"
    query($owner: String!, $name: String!, $categoryId: ID!, $first: Int!, $after: String) {
        repository(owner: $owner, name: $name) {
            discussions(categoryId: $categoryId, first: $first, after: $after, states: [OPEN]) {
                nodes {
                    id
                    number
                    title
                    url
                    locked
                    closed
                    updatedAt
                    author {
                        login
                    }
                    answer {
                        id
                    }
                    comments(first: $first) {
                        nodes {
                            ...CommentFields
                        }
                        pageInfo {
                            hasNextPage
                            endCursor
                        }
                    }
                }
                pageInfo {
                    hasNextPage
                    endCursor
                }
            }
        }
    }
"#;

const COMMENTS_QUERY: &str = r#"
    query($owner: String!, $name: String!, $number: Int!, $first: Int!, $after: String) {
        repository(owner: $owner, name: $name) {
            discussion(number: $number) {
                comments(first: $first, after: $after) {
                    nodes {
                        ...CommentFields
                    }
                    pageInfo {
                        hasNextPage
                        endCursor
                    }
                }
            }
        }
    }
"#;

const LABEL_QUERY: &str = r#"
    query($owner: String!, $name: String!, $label: String!) {
        repository(owner: $owner, name: $name) {
            label(name: $label) {
                id
            }
        }
    }
"#;

const ADD_COMMENT_MUTATION: &str = r#"
    mutation($discussionId: ID!, $body: String!) {
        addDiscussionComment(input: {discussionId: $discussionId, body: $body}) {
            comment {
                id
            }
        }
    }
"#;

const UPDATE_COMMENT_MUTATION: &str = r#"
    mutation($commentId: ID!, $body: String!) {
        updateDiscussionComment(input: {commentId: $commentId, body: $body}) {
            comment {
                id
            }
        }
    }
"#;

const MARK_ANSWER_MUTATION: &str = r#"
    mutation($commentId: ID!) {
        markDiscussionCommentAsAnswer(input: {id: $commentId}) {
            discussion {
                id
            }
        }
    }
"#;

const ADD_LABELS_MUTATION: &str = r#"
    mutation($labelableId: ID!, $labelIds: [ID!]!) {
        addLabelsToLabelable(input: {labelableId: $labelableId, labelIds: $labelIds}) {
            clientMutationId
        }
    }
"#;

const CLOSE_DISCUSSION_MUTATION: &str = r#"
    mutation($discussionId: ID!, $reason: DiscussionCloseReason!) {
        closeDiscussion(input: {discussionId: $discussionId, reason: $reason}) {
            discussion {
                id
            }
        }
    }
"#;

pub fn categories_query(repo: &Repo) -> serde_json::Value {
    serde_json::json!({
        "query": CATEGORIES_QUERY,
        "variables": {
            "owner": repo.owner(),
            "name": repo.name(),
        }
    })
}

pub fn discussions_query(
    repo: &Repo,
    category_id: &str,
    first: u32,
    after: Option<&str>,
) -> serde_json::Value {
    serde_json::json!({
        "query": format!("{DISCUSSIONS_QUERY}{COMMENT_FIELDS}"),
        "variables": {
            "owner": repo.owner(),
            "name": repo.name(),
            "categoryId": category_id,
            "first": first,
            "after": after,
        }
    })
}

pub fn comments_query(repo: &Repo, number: u64, first: u32, after: &str) -> serde_json::Value {
    serde_json::json!({
        "query": format!("{COMMENTS_QUERY}{COMMENT_FIELDS}"),
        "variables": {
            "owner": repo.owner(),
            "name": repo.name(),
            "number": number,
            "first": first,
            "after": after,
        }
    })
}

pub fn label_query(repo: &Repo, label: &str) -> serde_json::Value {
    serde_json::json!({
        "query": LABEL_QUERY,
        "variables": {
            "owner": repo.owner(),
            "name": repo.name(),
            "label": label,
        }
    })
}

pub fn add_comment_mutation(discussion_id: &str, body: &str) -> serde_json::Value {
    serde_json::json!({
        "query": ADD_COMMENT_MUTATION,
        "variables": { "discussionId": discussion_id, "body": body }
    })
}

pub fn update_comment_mutation(comment_id: &str, body: &str) -> serde_json::Value {
    serde_json::json!({
        "query": UPDATE_COMMENT_MUTATION,
        "variables": { "commentId": comment_id, "body": body }
    })
}

pub fn mark_answer_mutation(comment_id: &str) -> serde_json::Value {
    serde_json::json!({
        "query": MARK_ANSWER_MUTATION,
        "variables": { "commentId": comment_id }
    })
}

pub fn add_labels_mutation(labelable_id: &str, label: &LabelId) -> serde_json::Value {
    serde_json::json!({
        "query": ADD_LABELS_MUTATION,
        "variables": { "labelableId": labelable_id, "labelIds": [label.0] }
    })
}

pub fn close_discussion_mutation(discussion_id: &str, reason: CloseReason) -> serde_json::Value {
    serde_json::json!({
        "query": CLOSE_DISCUSSION_MUTATION,
        "variables": { "discussionId": discussion_id, "reason": reason.as_graphql() }
    })
}

/// Envelope of every GraphQL response. GitHub reports query failures with
/// HTTP 200 and a populated `errors` array.
#[derive(Debug, Deserialize)]
pub struct GraphQLResponse<T> {
    pub data: Option<T>,
    #[serde(default)]
    pub errors: Vec<GraphQLError>,
}

#[derive(Debug, Deserialize)]
pub struct GraphQLError {
    pub message: String,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

impl<T> GraphQLResponse<T> {
    pub fn into_data(self, operation: &str) -> Result<T> {
        if !self.errors.is_empty() {
            let messages = self
                .errors
                .iter()
                .map(|e| match &e.kind {
                    Some(kind) => format!("{kind}: {}", e.message),
                    None => e.message.clone(),
                })
                .collect::<Vec<_>>()
                .join("; ");
            anyhow::bail!("{operation} failed: {messages}");
        }
        self.data
            .ok_or_else(|| anyhow::anyhow!("{operation} returned no data"))
    }
}

#[derive(Debug, Deserialize)]
pub struct RepositoryData<T> {
    pub repository: Option<T>,
}

impl<T> RepositoryData<T> {
    pub fn into_repository(self, repo: &Repo) -> Result<T> {
        self.repository
            .ok_or_else(|| anyhow::anyhow!("Repository '{repo}' not found"))
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub has_next_page: bool,
    pub end_cursor: Option<String>,
}

impl PageInfo {
    /// Cursor for the next page, if there is one.
    pub fn next_cursor(&self) -> Option<&str> {
        if self.has_next_page {
            self.end_cursor.as_deref()
        } else {
            None
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection<T> {
    #[serde(default = "Vec::new")]
    pub nodes: Vec<Option<T>>,
    #[serde(default)]
    pub page_info: PageInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphQLCount {
    pub total_count: u64,
}

#[derive(Debug, Deserialize)]
pub struct GraphQLActor {
    pub login: String,
}

#[derive(Debug, Deserialize)]
pub struct GraphQLNode {
    pub id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoriesRepository {
    pub discussion_categories: Connection<GraphQLCategory>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphQLCategory {
    pub id: String,
    pub name: String,
    pub is_answerable: bool,
}

#[derive(Debug, Deserialize)]
pub struct DiscussionsRepository {
    pub discussions: Connection<GraphQLDiscussion>,
}

#[derive(Debug, Deserialize)]
pub struct DiscussionRepository {
    pub discussion: Option<DiscussionComments>,
}

#[derive(Debug, Deserialize)]
pub struct DiscussionComments {
    pub comments: Connection<GraphQLComment>,
}

#[derive(Debug, Deserialize)]
pub struct LabelRepository {
    pub label: Option<GraphQLNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphQLDiscussion {
    pub id: String,
    pub number: u64,
    pub title: String,
    pub url: String,
    pub locked: bool,
    pub closed: bool,
    pub updated_at: DateTime<Utc>,
    pub author: Option<GraphQLActor>,
    pub answer: Option<GraphQLNode>,
    pub comments: Connection<GraphQLComment>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphQLComment {
    pub id: String,
    pub body: String,
    pub body_text: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub author: Option<GraphQLActor>,
    pub reactions: Connection<GraphQLReaction>,
    pub thumbs_down: Option<GraphQLCount>,
    pub confused: Option<GraphQLCount>,
    pub replies: GraphQLCount,
}

#[derive(Debug, Deserialize)]
pub struct GraphQLReaction {
    pub content: ReactionContent,
}

/// Keeps the answerable categories, dropping null nodes.
pub fn convert_categories(connection: Connection<GraphQLCategory>) -> Vec<Category> {
    connection
        .nodes
        .into_iter()
        .flatten()
        .filter(|category| category.is_answerable)
        .map(|category| Category {
            id: category.id,
            name: category.name,
            is_answerable: category.is_answerable,
        })
        .collect()
}

/// Sampled reactions, plus any negative kind the sample missed but the
/// per-kind counts report.
fn collect_reactions(comment: &mut GraphQLComment) -> Vec<ReactionContent> {
    let mut reactions: Vec<ReactionContent> = std::mem::take(&mut comment.reactions.nodes)
        .into_iter()
        .flatten()
        .map(|r| r.content)
        .collect();

    let counted = [
        (ReactionContent::ThumbsDown, &comment.thumbs_down),
        (ReactionContent::Confused, &comment.confused),
    ];
    for (content, count) in counted {
        let seen = count.as_ref().is_some_and(|c| c.total_count > 0);
        if seen && !reactions.contains(&content) {
            reactions.push(content);
        }
    }
    reactions
}

pub fn convert_comment(mut comment: GraphQLComment) -> Comment {
    let reactions = collect_reactions(&mut comment);
    Comment {
        id: comment.id,
        author: comment.author.map(|a| a.login),
        body: comment.body,
        body_text: comment.body_text,
        created_at: comment.created_at,
        updated_at: comment.updated_at,
        reactions,
        reply_count: comment.replies.total_count,
    }
}

pub fn convert_comments(nodes: Vec<Option<GraphQLComment>>) -> Vec<Comment> {
    nodes.into_iter().flatten().map(convert_comment).collect()
}

/// Converts a discussion node. Also returns the cursor for the next page of
/// comments when the discussion has more than were embedded.
pub fn convert_discussion(discussion: GraphQLDiscussion) -> (Discussion, Option<String>) {
    let comments_cursor = discussion
        .comments
        .page_info
        .next_cursor()
        .map(str::to_string);

    let converted = Discussion {
        id: discussion.id,
        number: discussion.number,
        title: discussion.title,
        url: discussion.url,
        author: discussion.author.map(|a| a.login),
        locked: discussion.locked,
        closed: discussion.closed,
        answered: discussion.answer.is_some(),
        updated_at: discussion.updated_at,
        comments: convert_comments(discussion.comments.nodes),
    };

    (converted, comments_cursor)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn discussions_fixture() -> serde_json::Value {
        serde_json::json!({
            "data": {
                "repository": {
                    "discussions": {
                        "nodes": [
                            {
                                "id": "D_kwDOA",
                                "number": 12,
                                "title": "How do I configure the cache?",
                                "url": "https://github.com/octo/widgets/discussions/12",
                                "locked": false,
                                "closed": false,
                                "updatedAt": "2024-03-01T10:00:00Z",
                                "author": { "login": "asker" },
                                "answer": null,
                                "comments": {
                                    "nodes": [
                                        {
                                            "id": "DC_kwDOB",
                                            "body": "@bot proposed-answer set `cache.size`",
                                            "bodyText": "@bot proposed-answer set cache.size",
                                            "createdAt": "2024-03-02T10:00:00Z",
                                            "updatedAt": "2024-03-02T11:00:00Z",
                                            "author": null,
                                            "reactions": {
                                                "nodes": [
                                                    { "content": "THUMBS_UP" },
                                                    null,
                                                    { "content": "EYES" }
                                                ]
                                            },
                                            "thumbsDown": { "totalCount": 0 },
                                            "confused": { "totalCount": 0 },
                                            "replies": { "totalCount": 3 }
                                        },
                                        null
                                    ],
                                    "pageInfo": { "hasNextPage": true, "endCursor": "Y3Vyc29y" }
                                }
                            },
                            null
                        ],
                        "pageInfo": { "hasNextPage": false, "endCursor": null }
                    }
                }
            }
        })
    }

    #[test]
    fn test_convert_discussion_from_response() {
        let response: GraphQLResponse<RepositoryData<DiscussionsRepository>> =
            serde_json::from_value(discussions_fixture()).unwrap();
        let repo = Repo::new("octo", "widgets").unwrap();
        let discussions = response
            .into_data("discussions")
            .unwrap()
            .into_repository(&repo)
            .unwrap()
            .discussions;
        assert!(discussions.page_info.next_cursor().is_none());

        let nodes: Vec<GraphQLDiscussion> = discussions.nodes.into_iter().flatten().collect();
        assert_eq!(nodes.len(), 1);

        let (discussion, cursor) = convert_discussion(nodes.into_iter().next().unwrap());
        assert_eq!(cursor.as_deref(), Some("Y3Vyc29y"));
        assert_eq!(discussion.number, 12);
        assert_eq!(discussion.author.as_deref(), Some("asker"));
        assert!(!discussion.answered);
        assert_eq!(discussion.comments.len(), 1);

        let comment = &discussion.comments[0];
        assert_eq!(comment.author, None);
        assert_eq!(comment.reply_count, 3);
        assert_eq!(
            comment.reactions,
            vec![ReactionContent::ThumbsUp, ReactionContent::Eyes]
        );
        assert_eq!(comment.body, "@bot proposed-answer set `cache.size`");
    }

    #[test]
    fn test_negative_reaction_beyond_sample_is_kept() {
        let sampled: Vec<serde_json::Value> = (0..25)
            .map(|_| serde_json::json!({ "content": "THUMBS_UP" }))
            .collect();
        let comment: GraphQLComment = serde_json::from_value(serde_json::json!({
            "id": "DC_busy",
            "body": "@bot proposed-answer pin the version",
            "bodyText": "@bot proposed-answer pin the version",
            "createdAt": "2024-03-02T10:00:00Z",
            "updatedAt": "2024-03-02T10:00:00Z",
            "author": { "login": "helper" },
            "reactions": { "nodes": sampled },
            "thumbsDown": { "totalCount": 1 },
            "confused": { "totalCount": 0 },
            "replies": { "totalCount": 0 }
        }))
        .unwrap();

        let converted = convert_comment(comment);
        assert_eq!(converted.reactions.len(), 26);
        assert_eq!(converted.reactions.last(), Some(&ReactionContent::ThumbsDown));
        assert!(!converted.reactions.contains(&ReactionContent::Confused));
    }

    #[test]
    fn test_answered_discussion() {
        let mut fixture = discussions_fixture();
        fixture["data"]["repository"]["discussions"]["nodes"][0]["answer"] =
            serde_json::json!({ "id": "DC_kwDOB" });
        let response: GraphQLResponse<RepositoryData<DiscussionsRepository>> =
            serde_json::from_value(fixture).unwrap();
        let node = response
            .data
            .unwrap()
            .repository
            .unwrap()
            .discussions
            .nodes
            .into_iter()
            .flatten()
            .next()
            .unwrap();
        let (discussion, _) = convert_discussion(node);
        assert!(discussion.answered);
    }

    #[test]
    fn test_graphql_errors_are_reported() {
        let response: GraphQLResponse<serde_json::Value> = serde_json::from_value(serde_json::json!({
            "data": null,
            "errors": [
                { "type": "NOT_FOUND", "message": "Could not resolve to a node" },
                { "message": "Something else" }
            ]
        }))
        .unwrap();
        let err = response.into_data("closeDiscussion").unwrap_err();
        assert_eq!(
            err.to_string(),
            "closeDiscussion failed: NOT_FOUND: Could not resolve to a node; Something else"
        );
    }

    #[test]
    fn test_missing_data_is_an_error() {
        let response: GraphQLResponse<serde_json::Value> =
            serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(response.into_data("label").is_err());
    }

    #[test]
    fn test_missing_repository() {
        let data: RepositoryData<LabelRepository> =
            serde_json::from_value(serde_json::json!({ "repository": null })).unwrap();
        let repo = Repo::new("octo", "gone").unwrap();
        let err = data.into_repository(&repo).unwrap_err();
        assert_eq!(err.to_string(), "Repository 'octo/gone' not found");
    }

    #[test]
    fn test_convert_categories_keeps_answerable() {
        let connection: Connection<GraphQLCategory> = serde_json::from_value(serde_json::json!({
            "nodes": [
                { "id": "DIC_1", "name": "Q&A", "isAnswerable": true },
                { "id": "DIC_2", "name": "Announcements", "isAnswerable": false },
                null
            ]
        }))
        .unwrap();
        let categories = convert_categories(connection);
        assert_eq!(categories.len(), 1);
        assert_eq!(categories[0].name, "Q&A");
    }

    #[test]
    fn test_request_payloads() {
        let repo = Repo::new("octo", "widgets").unwrap();

        let query = discussions_query(&repo, "DIC_1", 50, None);
        assert!(query["query"].as_str().unwrap().contains("fragment CommentFields"));
        assert_eq!(query["variables"]["after"], serde_json::Value::Null);
        assert_eq!(query["variables"]["first"], 50);

        let close = close_discussion_mutation("D_1", CloseReason::Outdated);
        assert_eq!(close["variables"]["reason"], "OUTDATED");

        let label = add_labels_mutation("D_1", &LabelId("LA_1".to_string()));
        assert_eq!(label["variables"]["labelIds"], serde_json::json!(["LA_1"]));
    }
}
