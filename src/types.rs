use std::fmt;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Repository identifier in `owner/name` form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Repo {
    owner: String,
    name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoError {
    Empty,
    InvalidFormat(String),
    InvalidSegment(String),
    InvalidUrl(String),
}

impl fmt::Display for RepoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepoError::Empty => write!(f, "repository must not be empty"),
            RepoError::InvalidFormat(s) => {
                write!(f, "repository must be in format 'owner/repo', got: '{s}'")
            }
            RepoError::InvalidSegment(s) => write!(f, "invalid repository segment: '{s}'"),
            RepoError::InvalidUrl(s) => write!(
                f,
                "URL must be in format https://github.com/owner/repo/discussions/123, got: '{s}'"
            ),
        }
    }
}

impl std::error::Error for RepoError {}

fn valid_segment(segment: &str) -> bool {
    !segment.is_empty() && !segment.chars().any(|c| c.is_whitespace() || c == '/')
}

impl Repo {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Result<Self, RepoError> {
        let owner = owner.into();
        let name = name.into();
        for segment in [&owner, &name] {
            if !valid_segment(segment) {
                return Err(RepoError::InvalidSegment(segment.clone()));
            }
        }
        Ok(Self { owner, name })
    }

    /// Parses the `owner/repo` form used by `GITHUB_REPOSITORY`.
    pub fn parse(s: &str) -> Result<Self, RepoError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(RepoError::Empty);
        }
        match s.split_once('/') {
            Some((owner, name)) if !name.contains('/') => Self::new(owner, name),
            _ => Err(RepoError::InvalidFormat(s.to_string())),
        }
    }

    /// Parses a discussion URL into its repository and discussion number.
    pub fn parse_discussion_url(url_str: &str) -> Result<(Self, u64), RepoError> {
        let invalid = || RepoError::InvalidUrl(url_str.to_string());

        let url = url::Url::parse(url_str).map_err(|_| invalid())?;
        let segments: Vec<&str> = url
            .path_segments()
            .ok_or_else(invalid)?
            .filter(|s| !s.is_empty())
            .collect();

        // ["owner", "repo", "discussions", "123"]
        if segments.len() != 4 || segments[2] != "discussions" {
            return Err(invalid());
        }

        let number = segments[3].parse().map_err(|_| invalid())?;
        Ok((Self::new(segments[0], segments[1])?, number))
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Repo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Emoji reaction as reported by GitHub's `ReactionContent` enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReactionContent {
    ThumbsUp,
    ThumbsDown,
    Laugh,
    Hooray,
    Confused,
    Heart,
    Rocket,
    Eyes,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    Positive,
    Negative,
    Neutral,
}

impl ReactionContent {
    pub fn polarity(self) -> Polarity {
        match self {
            ReactionContent::ThumbsUp
            | ReactionContent::Heart
            | ReactionContent::Hooray
            | ReactionContent::Laugh
            | ReactionContent::Rocket => Polarity::Positive,
            ReactionContent::ThumbsDown | ReactionContent::Confused => Polarity::Negative,
            ReactionContent::Eyes | ReactionContent::Unknown => Polarity::Neutral,
        }
    }

    pub fn is_positive(self) -> bool {
        self.polarity() == Polarity::Positive
    }

    pub fn is_negative(self) -> bool {
        self.polarity() == Polarity::Negative
    }
}

/// Reason passed to GitHub when closing a discussion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    Resolved,
    Outdated,
}

impl CloseReason {
    pub fn as_graphql(&self) -> &'static str {
        match self {
            CloseReason::Resolved => "RESOLVED",
            CloseReason::Outdated => "OUTDATED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelId(pub String);

impl fmt::Display for LabelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub is_answerable: bool,
}

/// Top-level comment on a discussion.
#[derive(Debug, Clone, PartialEq)]
pub struct Comment {
    pub id: String,
    pub author: Option<String>,
    /// Markdown source, used when rewriting the comment.
    pub body: String,
    /// Rendered plain text, used for matching.
    pub body_text: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub reactions: Vec<ReactionContent>,
    pub reply_count: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Discussion {
    pub id: String,
    pub number: u64,
    pub title: String,
    pub url: String,
    pub author: Option<String>,
    pub locked: bool,
    pub closed: bool,
    pub answered: bool,
    pub updated_at: DateTime<Utc>,
    pub comments: Vec<Comment>,
}

/// Day counts driving the staleness branches of the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub days_until_stale: u32,
    pub days_until_close: u32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            days_until_stale: 7,
            days_until_close: 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveCause {
    Locked,
    Answered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttentionCause {
    NegativeReaction,
    Reply,
}

/// A single triage step for one discussion. Bodies are fully rendered.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    CloseAsResolved { cause: ResolveCause },
    AddAttentionLabel { comment_id: String, cause: AttentionCause },
    AcceptAnswer { comment_id: String, body: String },
    PostInstructions { body: String },
    RemindAuthor { body: String },
    CloseAsOutdated { body: String },
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::CloseAsResolved { .. } => "close-resolved",
            Action::AddAttentionLabel { .. } => "add-attention-label",
            Action::AcceptAnswer { .. } => "accept-answer",
            Action::PostInstructions { .. } => "post-instructions",
            Action::RemindAuthor { .. } => "remind-author",
            Action::CloseAsOutdated { .. } => "close-outdated",
        }
    }

    /// Terminal actions close the discussion; nothing is planned after them.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Action::CloseAsResolved { .. }
                | Action::AcceptAnswer { .. }
                | Action::CloseAsOutdated { .. }
        )
    }

    pub fn detail(&self) -> String {
        match self {
            Action::CloseAsResolved {
                cause: ResolveCause::Locked,
            } => "discussion is locked".to_string(),
            Action::CloseAsResolved {
                cause: ResolveCause::Answered,
            } => "discussion already has an answer".to_string(),
            Action::AddAttentionLabel {
                comment_id,
                cause: AttentionCause::NegativeReaction,
            } => format!("negative reaction on {comment_id}"),
            Action::AddAttentionLabel {
                comment_id,
                cause: AttentionCause::Reply,
            } => format!("reply to proposed answer {comment_id}"),
            Action::AcceptAnswer { comment_id, .. } => {
                format!("positive reaction on {comment_id}")
            }
            Action::PostInstructions { .. } => "proposed answer awaiting feedback".to_string(),
            Action::RemindAuthor { .. } => "no feedback before stale threshold".to_string(),
            Action::CloseAsOutdated { .. } => "no feedback after reminder".to_string(),
        }
    }
}

/// A planned action bound to the discussion it applies to.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub repo: Repo,
    pub discussion_id: String,
    pub discussion_number: u64,
    pub title: String,
    pub updated_at: DateTime<Utc>,
    pub action: Action,
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}#{} {} ({})",
            self.repo,
            self.discussion_number,
            self.action.name(),
            self.action.detail()
        )
    }
}

/// Failure attributed to a discussion, or to the run when `discussion` is
/// `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct TriageError {
    pub discussion: Option<u64>,
    pub message: String,
}

impl fmt::Display for TriageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.discussion {
            Some(number) => write!(f, "discussion #{number}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// What to triage and how.
#[derive(Debug, Clone)]
pub struct TriageSpec {
    pub repo: Repo,
    pub attention_label: String,
    pub thresholds: Thresholds,
    pub page_size: u32,
    pub limit: Option<usize>,
    /// Restrict the run to these discussion numbers; empty means all.
    pub discussions: Vec<u64>,
    pub dry_run: bool,
}

impl TriageSpec {
    pub fn new(repo: Repo) -> Self {
        Self {
            repo,
            attention_label: crate::policy::DEFAULT_ATTENTION_LABEL.to_string(),
            thresholds: Thresholds::default(),
            page_size: 50,
            limit: None,
            discussions: Vec::new(),
            dry_run: false,
        }
    }

    pub fn wants_discussion(&self, number: u64) -> bool {
        self.discussions.is_empty() || self.discussions.contains(&number)
    }
}

/// Connection settings for the GitHub client.
#[derive(Clone, Default)]
pub struct ClientConfig {
    pub token: Option<String>,
    pub api_url: Option<url::Url>,
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("api_url", &self.api_url.as_ref().map(|u| u.as_str()))
            .finish()
    }
}

/// Source of discussions and sink for triage mutations.
#[async_trait]
pub trait Forge: Send + Sync {
    /// Categories of `repo` that accept answers.
    async fn answerable_categories(&self, repo: &Repo) -> Result<Vec<Category>>;

    /// Open discussions in `category`, each with all of its top-level comments.
    async fn discussions(
        &self,
        repo: &Repo,
        category: &Category,
        page_size: u32,
    ) -> Result<Vec<Discussion>>;

    async fn label_id(&self, repo: &Repo, name: &str) -> Result<LabelId>;

    async fn add_comment(&self, discussion_id: &str, body: &str) -> Result<()>;

    async fn update_comment(&self, comment_id: &str, body: &str) -> Result<()>;

    async fn mark_answer(&self, comment_id: &str) -> Result<()>;

    async fn add_label(&self, discussion_id: &str, label: &LabelId) -> Result<()>;

    async fn close_discussion(&self, discussion_id: &str, reason: CloseReason) -> Result<()>;
}
