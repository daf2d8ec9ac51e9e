use std::collections::HashSet;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::{
    policy::{DiscussionVerdict, assess_discussion, plan_discussion},
    types::{Action, CloseReason, Forge, Task, TriageError, TriageSpec},
};

/// Ordered tasks for a run, plus the failures met while gathering them.
#[derive(Debug, Default)]
pub struct TriagePlan {
    pub tasks: Vec<Task>,
    pub discussions_seen: usize,
    pub errors: Vec<TriageError>,
}

#[derive(Debug, Default)]
pub struct TriageReport {
    pub applied: Vec<Task>,
    /// Tasks not attempted because an earlier task for the same discussion
    /// failed.
    pub skipped: Vec<Task>,
    pub errors: Vec<TriageError>,
}

impl TriageReport {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Fetches every open discussion in the answerable categories and plans the
/// triage actions for it.
///
/// Categories are walked one after another. A category whose discussions
/// cannot be fetched is recorded as an error and the run carries on with the
/// next one.
pub async fn plan_triage<F>(spec: &TriageSpec, forge: &F, now: DateTime<Utc>) -> Result<TriagePlan>
where
    F: Forge + ?Sized,
{
    let mut plan = TriagePlan::default();

    let categories = forge
        .answerable_categories(&spec.repo)
        .await
        .with_context(|| format!("Failed to read discussion categories of {}", spec.repo))?;

    if categories.is_empty() {
        warn!(repo = %spec.repo, "no answerable discussion categories");
        return Ok(plan);
    }

    'categories: for category in &categories {
        let discussions = match forge
            .discussions(&spec.repo, category, spec.page_size)
            .await
        {
            Ok(discussions) => discussions,
            Err(err) => {
                warn!(category = %category.name, "failed to fetch discussions: {err:#}");
                plan.errors.push(TriageError {
                    discussion: None,
                    message: format!("category '{}': {err:#}", category.name),
                });
                continue;
            }
        };

        for discussion in discussions {
            if !spec.wants_discussion(discussion.number) {
                continue;
            }
            if spec.limit.is_some_and(|limit| plan.discussions_seen >= limit) {
                break 'categories;
            }
            plan.discussions_seen += 1;

            info!(
                discussion = discussion.number,
                title = %discussion.title,
                comments = discussion.comments.len(),
                "processing discussion"
            );
            if assess_discussion(&discussion) == DiscussionVerdict::Invalid {
                warn!("cannot check discussion without id or number, skipping");
                continue;
            }

            for action in plan_discussion(&discussion, &spec.thresholds, now) {
                plan.tasks.push(Task {
                    repo: spec.repo.clone(),
                    discussion_id: discussion.id.clone(),
                    discussion_number: discussion.number,
                    title: discussion.title.clone(),
                    updated_at: discussion.updated_at,
                    action,
                });
            }
        }
    }

    info!(
        discussions = plan.discussions_seen,
        tasks = plan.tasks.len(),
        "triage planned"
    );
    Ok(plan)
}

/// Performs the mutations behind a single task, in order.
pub async fn execute_task<F>(task: &Task, spec: &TriageSpec, forge: &F) -> Result<()>
where
    F: Forge + ?Sized,
{
    let discussion_id = task.discussion_id.as_str();

    match &task.action {
        Action::CloseAsResolved { .. } => {
            forge
                .close_discussion(discussion_id, CloseReason::Resolved)
                .await?;
        }
        Action::AddAttentionLabel { .. } => {
            let label = forge
                .label_id(&task.repo, &spec.attention_label)
                .await
                .context("Failed to resolve attention label")?;
            forge.add_label(discussion_id, &label).await?;
        }
        Action::AcceptAnswer { comment_id, body } => {
            forge.update_comment(comment_id, body).await?;
            forge.mark_answer(comment_id).await?;
            forge
                .close_discussion(discussion_id, CloseReason::Resolved)
                .await?;
        }
        Action::PostInstructions { body } | Action::RemindAuthor { body } => {
            forge.add_comment(discussion_id, body).await?;
        }
        Action::CloseAsOutdated { body } => {
            forge.add_comment(discussion_id, body).await?;
            forge
                .close_discussion(discussion_id, CloseReason::Outdated)
                .await?;
        }
    }

    Ok(())
}

/// Applies a plan sequentially.
///
/// A failing task is logged and recorded; the remaining tasks of the same
/// discussion are skipped while other discussions proceed.
pub async fn apply_plan<F>(plan: TriagePlan, spec: &TriageSpec, forge: &F) -> TriageReport
where
    F: Forge + ?Sized,
{
    let mut report = TriageReport {
        errors: plan.errors,
        ..Default::default()
    };
    let mut failed: HashSet<u64> = HashSet::new();

    for task in plan.tasks {
        if failed.contains(&task.discussion_number) {
            report.skipped.push(task);
            continue;
        }

        info!(
            discussion = task.discussion_number,
            action = task.action.name(),
            "{}",
            task.action.detail()
        );
        match execute_task(&task, spec, forge).await {
            Ok(()) => report.applied.push(task),
            Err(err) => {
                warn!(
                    discussion = task.discussion_number,
                    action = task.action.name(),
                    "task failed: {err:#}"
                );
                failed.insert(task.discussion_number);
                report.errors.push(TriageError {
                    discussion: Some(task.discussion_number),
                    message: format!("{}: {err:#}", task.action.name()),
                });
            }
        }
    }

    report
}
