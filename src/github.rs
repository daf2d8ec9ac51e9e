use std::{collections::HashMap, sync::Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;
use octocrab::Octocrab;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::{
    graphql::*,
    types::{Category, ClientConfig, CloseReason, Discussion, Forge, LabelId, Repo},
};

// Guards against a cursor that never reports the last page.
const MAX_PAGES: usize = 50;

/// Resolves the API token: explicit input, then `GITHUB_TOKEN`, then
/// `GH_TOKEN`, then the gh CLI.
pub async fn get_github_token(explicit: Option<&str>) -> Result<String> {
    if let Some(token) = explicit.map(str::trim).filter(|t| !t.is_empty()) {
        return Ok(token.to_string());
    }

    for var in ["GITHUB_TOKEN", "GH_TOKEN"] {
        if let Ok(token) = std::env::var(var) {
            if !token.trim().is_empty() {
                return Ok(token.trim().to_string());
            }
        }
    }

    let output = tokio::process::Command::new("gh")
        .args(["auth", "token"])
        .output()
        .await
        .context(
            "You must provide a GitHub token with --github-token, the `github-token` input, \
             or the GITHUB_TOKEN environment variable",
        )?;

    if !output.status.success() {
        anyhow::bail!("Failed to get GitHub token from gh CLI. Please run 'gh auth login' first");
    }

    let token = String::from_utf8(output.stdout)?.trim().to_string();

    if token.is_empty() {
        anyhow::bail!("Empty token returned from gh CLI");
    }

    Ok(token)
}

/// GitHub GraphQL backend for triage.
pub struct GitHub {
    client: Octocrab,
    label_ids: Mutex<HashMap<(Repo, String), LabelId>>,
}

impl GitHub {
    /// Creates an authenticated client from the given configuration.
    pub async fn connect(config: &ClientConfig) -> Result<Self> {
        let token = get_github_token(config.token.as_deref())
            .await
            .context("Failed to obtain GitHub authentication token")?;

        let mut builder = Octocrab::builder().personal_token(token);
        if let Some(api_url) = &config.api_url {
            builder = builder
                .base_uri(api_url.as_str())
                .with_context(|| format!("Invalid GitHub API URL: '{api_url}'"))?;
        }

        let client = builder.build().context("Failed to create GitHub client")?;
        Ok(Self::with_client(client))
    }

    pub fn with_client(client: Octocrab) -> Self {
        Self {
            client,
            label_ids: Mutex::new(HashMap::new()),
        }
    }

    fn cached_label(&self, key: &(Repo, String)) -> Result<Option<LabelId>> {
        let cache = self
            .label_ids
            .lock()
            .map_err(|_| anyhow::anyhow!("label cache poisoned"))?;
        Ok(cache.get(key).cloned())
    }

    async fn graphql<T: DeserializeOwned>(
        &self,
        operation: &str,
        payload: &serde_json::Value,
    ) -> Result<T> {
        debug!(operation, "graphql request");
        let response: GraphQLResponse<T> = self
            .client
            .graphql(payload)
            .await
            .with_context(|| format!("{operation} request failed"))?;
        response.into_data(operation)
    }

    async fn mutate(&self, operation: &str, payload: &serde_json::Value) -> Result<()> {
        self.graphql::<serde_json::Value>(operation, payload)
            .await
            .map(|_| ())
    }

    async fn remaining_comments(
        &self,
        repo: &Repo,
        discussion: &mut Discussion,
        first: u32,
        mut cursor: String,
    ) -> Result<()> {
        for _ in 0..MAX_PAGES {
            let data: RepositoryData<DiscussionRepository> = self
                .graphql(
                    "discussion comments",
                    &comments_query(repo, discussion.number, first, &cursor),
                )
                .await?;
            let Some(found) = data.into_repository(repo)?.discussion else {
                anyhow::bail!("Discussion #{} disappeared while paging", discussion.number);
            };

            let comments = found.comments;
            discussion.comments.extend(convert_comments(comments.nodes));

            match comments.page_info.next_cursor() {
                Some(next) => cursor = next.to_string(),
                None => return Ok(()),
            }
        }
        debug!(discussion = discussion.number, "comment page limit reached");
        Ok(())
    }
}

#[async_trait]
impl Forge for GitHub {
    async fn answerable_categories(&self, repo: &Repo) -> Result<Vec<Category>> {
        let data: RepositoryData<CategoriesRepository> = self
            .graphql("discussion categories", &categories_query(repo))
            .await?;
        let categories = convert_categories(data.into_repository(repo)?.discussion_categories);
        debug!(count = categories.len(), "answerable categories");
        Ok(categories)
    }

    async fn discussions(
        &self,
        repo: &Repo,
        category: &Category,
        page_size: u32,
    ) -> Result<Vec<Discussion>> {
        let first = page_size.clamp(1, MAX_PAGE_SIZE);
        let mut discussions = Vec::new();
        let mut after: Option<String> = None;

        for _ in 0..MAX_PAGES {
            let data: RepositoryData<DiscussionsRepository> = self
                .graphql(
                    "discussions",
                    &discussions_query(repo, &category.id, first, after.as_deref()),
                )
                .await?;
            let connection = data.into_repository(repo)?.discussions;

            for node in connection.nodes.into_iter().flatten() {
                let (mut discussion, comments_cursor) = convert_discussion(node);
                if let Some(cursor) = comments_cursor {
                    self.remaining_comments(repo, &mut discussion, first, cursor)
                        .await?;
                }
                discussions.push(discussion);
            }

            after = connection.page_info.next_cursor().map(str::to_string);
            if after.is_none() {
                break;
            }
        }

        debug!(
            category = %category.name,
            count = discussions.len(),
            "fetched discussions"
        );
        Ok(discussions)
    }

    async fn label_id(&self, repo: &Repo, name: &str) -> Result<LabelId> {
        let key = (repo.clone(), name.to_string());
        if let Some(id) = self.cached_label(&key)? {
            return Ok(id);
        }

        let data: RepositoryData<LabelRepository> =
            self.graphql("label", &label_query(repo, name)).await?;
        let label = data
            .into_repository(repo)?
            .label
            .with_context(|| format!("Couldn't find label '{name}' in {repo}"))?;

        let id = LabelId(label.id);
        info!(label = name, id = %id, "resolved label");
        self.label_ids
            .lock()
            .map_err(|_| anyhow::anyhow!("label cache poisoned"))?
            .insert(key, id.clone());
        Ok(id)
    }

    async fn add_comment(&self, discussion_id: &str, body: &str) -> Result<()> {
        if discussion_id.is_empty() {
            anyhow::bail!("Couldn't create comment as discussion id is empty");
        }
        self.mutate(
            "addDiscussionComment",
            &add_comment_mutation(discussion_id, body),
        )
        .await
    }

    async fn update_comment(&self, comment_id: &str, body: &str) -> Result<()> {
        self.mutate(
            "updateDiscussionComment",
            &update_comment_mutation(comment_id, body),
        )
        .await
    }

    async fn mark_answer(&self, comment_id: &str) -> Result<()> {
        self.mutate(
            "markDiscussionCommentAsAnswer",
            &mark_answer_mutation(comment_id),
        )
        .await
    }

    async fn add_label(&self, discussion_id: &str, label: &LabelId) -> Result<()> {
        if discussion_id.is_empty() {
            anyhow::bail!("Invalid discussion id, can not add label");
        }
        self.mutate(
            "addLabelsToLabelable",
            &add_labels_mutation(discussion_id, label),
        )
        .await
    }

    async fn close_discussion(&self, discussion_id: &str, reason: CloseReason) -> Result<()> {
        self.mutate(
            "closeDiscussion",
            &close_discussion_mutation(discussion_id, reason),
        )
        .await
    }
}
