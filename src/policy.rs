//! Triage decision table for answerable discussions.
//!
//! Everything here is pure: callers pass the fetched discussion and the
//! current time, and get back the ordered list of actions to perform. All
//! durable state lives in GitHub and is re-read on every run, so the policy
//! keeps nothing between invocations.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::types::{Action, AttentionCause, Comment, Discussion, ResolveCause, Thresholds};

pub const PROPOSED_ANSWER_MARKER: &str = "@bot proposed-answer";
pub const ANSWER_PREFIX: &str = "Answer: ";
pub const DEFAULT_ATTENTION_LABEL: &str = "attention";

pub const INSTRUCTIONS_TEXT: &str = "Please give a positive reaction (such as a thumbs up) to the \
proposed answer if it helped. If not, leave a negative reaction (such as a thumbs down) and leave \
a comment explaining why it did not help.";

pub const REMINDER_TEXT: &str =
    "a proposed answer in this discussion has not received any feedback yet.";

pub const CLOSE_FOR_STALENESS_TEXT: &str = "Closing the discussion for staleness.";

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Outcome of looking at a discussion before its comments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscussionVerdict {
    /// Missing id or number; nothing can be done with it.
    Invalid,
    /// Already closed.
    Skip,
    /// Open but locked or answered.
    CloseAsResolved(ResolveCause),
    /// Open, unlocked and unanswered.
    ProcessComments,
}

pub fn assess_discussion(discussion: &Discussion) -> DiscussionVerdict {
    if discussion.id.is_empty() || discussion.number == 0 {
        DiscussionVerdict::Invalid
    } else if discussion.closed {
        DiscussionVerdict::Skip
    } else if discussion.locked {
        DiscussionVerdict::CloseAsResolved(ResolveCause::Locked)
    } else if discussion.answered {
        DiscussionVerdict::CloseAsResolved(ResolveCause::Answered)
    } else {
        DiscussionVerdict::ProcessComments
    }
}

/// Facts about the bot's own earlier comments in a discussion.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DiscussionContext {
    pub author: Option<String>,
    pub instructions_posted: bool,
    /// Creation times of every reminder posted in the discussion.
    pub reminders: Vec<DateTime<Utc>>,
}

impl DiscussionContext {
    pub fn from_discussion(discussion: &Discussion) -> Self {
        let instructions_posted = discussion
            .comments
            .iter()
            .any(|c| c.body_text.contains(INSTRUCTIONS_TEXT));

        let reminders = discussion
            .comments
            .iter()
            .filter(|c| c.body_text.contains(REMINDER_TEXT))
            .map(|c| c.created_at)
            .collect();

        Self {
            author: discussion.author.clone(),
            instructions_posted,
            reminders,
        }
    }

    /// Latest reminder posted at or after `since`. Reminders from before a
    /// proposal was last edited belong to an earlier proposal.
    pub fn reminder_since(&self, since: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.reminders.iter().copied().filter(|at| *at >= since).max()
    }
}

pub fn contains_marker(comment: &Comment) -> bool {
    comment.body_text.contains(PROPOSED_ANSWER_MARKER)
}

pub fn has_negative_reaction(comment: &Comment) -> bool {
    comment.reactions.iter().any(|r| r.is_negative())
}

pub fn has_positive_reaction(comment: &Comment) -> bool {
    comment.reactions.iter().any(|r| r.is_positive())
}

pub fn has_reply(comment: &Comment) -> bool {
    comment.reply_count > 0
}

/// Fractional days between `then` and `now`; negative if `then` is ahead.
pub fn days_since(then: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    (now - then).num_seconds() as f64 / SECONDS_PER_DAY
}

pub fn exceeds_days(then: DateTime<Utc>, now: DateTime<Utc>, days: u32) -> bool {
    days_since(then, now) >= f64::from(days)
}

/// Replaces the first marker occurrence with the answer prefix.
pub fn rewrite_answer_body(comment: &Comment) -> String {
    let source = if comment.body.contains(PROPOSED_ANSWER_MARKER) {
        &comment.body
    } else {
        &comment.body_text
    };
    source.replacen(PROPOSED_ANSWER_MARKER, ANSWER_PREFIX, 1)
}

pub fn instructions_body(thresholds: &Thresholds) -> String {
    format!(
        "{INSTRUCTIONS_TEXT} Without any feedback, this discussion will be closed after {} days.",
        thresholds.days_until_stale
    )
}

pub fn reminder_body(author: Option<&str>, thresholds: &Thresholds) -> String {
    let greeting = author.map_or_else(|| "Hi".to_string(), |login| format!("@{login}"));
    format!(
        "{greeting}, {REMINDER_TEXT} {INSTRUCTIONS_TEXT} This discussion will be closed in {} days \
if there is still no response.",
        thresholds.days_until_close
    )
}

/// Decides what to do about a single top-level comment.
pub fn decide(
    comment: &Comment,
    context: &DiscussionContext,
    thresholds: &Thresholds,
    now: DateTime<Utc>,
) -> Option<Action> {
    if !contains_marker(comment) {
        return None;
    }

    if has_negative_reaction(comment) {
        return Some(Action::AddAttentionLabel {
            comment_id: comment.id.clone(),
            cause: AttentionCause::NegativeReaction,
        });
    }

    if has_positive_reaction(comment) {
        return Some(Action::AcceptAnswer {
            comment_id: comment.id.clone(),
            body: rewrite_answer_body(comment),
        });
    }

    if has_reply(comment) {
        return Some(Action::AddAttentionLabel {
            comment_id: comment.id.clone(),
            cause: AttentionCause::Reply,
        });
    }

    if exceeds_days(comment.updated_at, now, thresholds.days_until_stale) {
        return match context.reminder_since(comment.updated_at) {
            None => Some(Action::RemindAuthor {
                body: reminder_body(context.author.as_deref(), thresholds),
            }),
            Some(reminded) if exceeds_days(reminded, now, thresholds.days_until_close) => {
                Some(Action::CloseAsOutdated {
                    body: CLOSE_FOR_STALENESS_TEXT.to_string(),
                })
            }
            Some(_) => None,
        };
    }

    if !context.instructions_posted {
        return Some(Action::PostInstructions {
            body: instructions_body(thresholds),
        });
    }

    None
}

/// Plans every action for a discussion, in execution order.
///
/// Every comment is evaluated and at most one action of each kind is kept.
/// A discussion closes at most once, and an accepted answer outranks closing
/// as outdated. Only attention labels are kept ahead of a planned close.
pub fn plan_discussion(
    discussion: &Discussion,
    thresholds: &Thresholds,
    now: DateTime<Utc>,
) -> Vec<Action> {
    match assess_discussion(discussion) {
        DiscussionVerdict::Invalid | DiscussionVerdict::Skip => Vec::new(),
        DiscussionVerdict::CloseAsResolved(cause) => vec![Action::CloseAsResolved { cause }],
        DiscussionVerdict::ProcessComments => {
            let context = DiscussionContext::from_discussion(discussion);
            let mut actions: Vec<Action> = Vec::new();

            for comment in &discussion.comments {
                let Some(action) = decide(comment, &context, thresholds, now) else {
                    continue;
                };
                debug!(
                    discussion = discussion.number,
                    comment = %comment.id,
                    action = action.name(),
                    "comment decision"
                );

                if !actions.iter().any(|a| a.name() == action.name()) {
                    actions.push(action);
                }
            }

            let closing = actions
                .iter()
                .position(|a| matches!(a, Action::AcceptAnswer { .. }))
                .or_else(|| actions.iter().position(Action::is_terminal));

            if let Some(index) = closing {
                let close = actions.remove(index);
                actions.retain(|a| matches!(a, Action::AddAttentionLabel { .. }));
                actions.push(close);
            }

            actions
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::types::ReactionContent;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 20, 12, 0, 0).unwrap()
    }

    fn comment(id: &str, body: &str, age_days: i64) -> Comment {
        let at = now() - Duration::days(age_days);
        Comment {
            id: id.to_string(),
            author: Some("helper".to_string()),
            body: body.to_string(),
            body_text: body.to_string(),
            created_at: at,
            updated_at: at,
            reactions: vec![],
            reply_count: 0,
        }
    }

    fn proposed(id: &str, age_days: i64) -> Comment {
        comment(
            id,
            &format!("{PROPOSED_ANSWER_MARKER} try restarting the daemon"),
            age_days,
        )
    }

    fn discussion(comments: Vec<Comment>) -> Discussion {
        Discussion {
            id: "D_1".to_string(),
            number: 7,
            title: "Daemon hangs on start".to_string(),
            url: "https://github.com/octo/widgets/discussions/7".to_string(),
            author: Some("asker".to_string()),
            locked: false,
            closed: false,
            answered: false,
            updated_at: now(),
            comments,
        }
    }

    fn ctx() -> DiscussionContext {
        DiscussionContext {
            author: Some("asker".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_assess_discussion() {
        let mut d = discussion(vec![]);
        assert_eq!(assess_discussion(&d), DiscussionVerdict::ProcessComments);

        d.answered = true;
        assert_eq!(
            assess_discussion(&d),
            DiscussionVerdict::CloseAsResolved(ResolveCause::Answered)
        );

        d.locked = true;
        assert_eq!(
            assess_discussion(&d),
            DiscussionVerdict::CloseAsResolved(ResolveCause::Locked)
        );

        d.closed = true;
        assert_eq!(assess_discussion(&d), DiscussionVerdict::Skip);

        d.number = 0;
        assert_eq!(assess_discussion(&d), DiscussionVerdict::Invalid);
    }

    #[test]
    fn test_no_marker_no_action() {
        let mut c = comment("C_1", "have you tried turning it off", 30);
        c.reactions = vec![ReactionContent::ThumbsUp];
        assert_eq!(decide(&c, &ctx(), &Thresholds::default(), now()), None);
    }

    #[test]
    fn test_negative_reaction_wins_over_positive() {
        let mut c = proposed("C_1", 1);
        c.reactions = vec![ReactionContent::ThumbsUp, ReactionContent::Confused];
        assert_eq!(
            decide(&c, &ctx(), &Thresholds::default(), now()),
            Some(Action::AddAttentionLabel {
                comment_id: "C_1".to_string(),
                cause: AttentionCause::NegativeReaction,
            })
        );
    }

    #[test]
    fn test_positive_reaction_accepts_answer() {
        let mut c = proposed("C_1", 1);
        c.reactions = vec![ReactionContent::Rocket];
        assert_eq!(
            decide(&c, &ctx(), &Thresholds::default(), now()),
            Some(Action::AcceptAnswer {
                comment_id: "C_1".to_string(),
                body: "Answer:  try restarting the daemon".to_string(),
            })
        );
    }

    #[test]
    fn test_neutral_reaction_counts_as_no_feedback() {
        let mut c = proposed("C_1", 1);
        c.reactions = vec![ReactionContent::Eyes];
        assert!(matches!(
            decide(&c, &ctx(), &Thresholds::default(), now()),
            Some(Action::PostInstructions { .. })
        ));
    }

    #[test]
    fn test_reply_without_reaction_needs_attention() {
        let mut c = proposed("C_1", 30);
        c.reply_count = 2;
        assert_eq!(
            decide(&c, &ctx(), &Thresholds::default(), now()),
            Some(Action::AddAttentionLabel {
                comment_id: "C_1".to_string(),
                cause: AttentionCause::Reply,
            })
        );
    }

    #[test]
    fn test_fresh_proposal_gets_instructions_once() {
        let c = proposed("C_1", 1);
        let action = decide(&c, &ctx(), &Thresholds::default(), now());
        assert!(matches!(action, Some(Action::PostInstructions { ref body }) if body.starts_with(INSTRUCTIONS_TEXT)));

        let posted = DiscussionContext {
            instructions_posted: true,
            ..ctx()
        };
        assert_eq!(decide(&c, &posted, &Thresholds::default(), now()), None);
    }

    #[test]
    fn test_stale_proposal_reminds_author() {
        let c = proposed("C_1", 7);
        let action = decide(&c, &ctx(), &Thresholds::default(), now());
        let Some(Action::RemindAuthor { body }) = action else {
            panic!("expected reminder, got {action:?}");
        };
        assert!(body.starts_with("@asker, "));
        assert!(body.contains(REMINDER_TEXT));
    }

    #[test]
    fn test_stale_threshold_is_inclusive_and_configurable() {
        let thresholds = Thresholds {
            days_until_stale: 3,
            days_until_close: 1,
        };
        let c = proposed("C_1", 3);
        assert!(matches!(
            decide(&c, &ctx(), &thresholds, now()),
            Some(Action::RemindAuthor { .. })
        ));

        let c = proposed("C_1", 2);
        assert!(matches!(
            decide(&c, &ctx(), &thresholds, now()),
            Some(Action::PostInstructions { .. })
        ));
    }

    #[test]
    fn test_closes_after_reminder_ages_out() {
        let c = proposed("C_1", 20);
        let recent = DiscussionContext {
            reminders: vec![now() - Duration::days(2)],
            ..ctx()
        };
        assert_eq!(decide(&c, &recent, &Thresholds::default(), now()), None);

        let old = DiscussionContext {
            reminders: vec![now() - Duration::days(4)],
            ..ctx()
        };
        assert_eq!(
            decide(&c, &old, &Thresholds::default(), now()),
            Some(Action::CloseAsOutdated {
                body: CLOSE_FOR_STALENESS_TEXT.to_string(),
            })
        );
    }

    #[test]
    fn test_reminder_without_author() {
        let body = reminder_body(None, &Thresholds::default());
        assert!(body.starts_with("Hi, "));
    }

    #[test]
    fn test_context_reads_bot_comments() {
        let mut reminder = comment("C_r", &reminder_body(Some("asker"), &Thresholds::default()), 2);
        reminder.created_at = now() - Duration::days(2);
        let d = discussion(vec![
            proposed("C_1", 10),
            comment("C_i", &instructions_body(&Thresholds::default()), 9),
            reminder,
        ]);
        let context = DiscussionContext::from_discussion(&d);
        assert!(context.instructions_posted);
        assert_eq!(context.reminders, vec![now() - Duration::days(2)]);
        assert_eq!(
            context.reminder_since(now() - Duration::days(10)),
            Some(now() - Duration::days(2))
        );
        assert_eq!(context.reminder_since(now() - Duration::days(1)), None);
        assert_eq!(context.author.as_deref(), Some("asker"));
    }

    #[test]
    fn test_rewrite_prefers_markdown_body() {
        let mut c = proposed("C_1", 1);
        c.body = format!("**Fix**: {PROPOSED_ANSWER_MARKER} restart, then {PROPOSED_ANSWER_MARKER}");
        assert_eq!(
            rewrite_answer_body(&c),
            format!("**Fix**: Answer:  restart, then {PROPOSED_ANSWER_MARKER}")
        );
    }

    #[test]
    fn test_days_since() {
        let then = now() - Duration::hours(36);
        assert!((days_since(then, now()) - 1.5).abs() < f64::EPSILON);
        assert!(!exceeds_days(then, now(), 2));
        assert!(exceeds_days(then, now(), 1));
    }

    #[test]
    fn test_plan_locked_discussion_closes_without_comments() {
        let mut d = discussion(vec![proposed("C_1", 1)]);
        d.locked = true;
        assert_eq!(
            plan_discussion(&d, &Thresholds::default(), now()),
            vec![Action::CloseAsResolved {
                cause: ResolveCause::Locked
            }]
        );
    }

    #[test]
    fn test_plan_collapses_duplicates_and_closes_once() {
        let mut negative = proposed("C_1", 1);
        negative.reactions = vec![ReactionContent::ThumbsDown];
        let mut replied = proposed("C_2", 1);
        replied.reply_count = 1;
        let mut accepted = proposed("C_3", 1);
        accepted.reactions = vec![ReactionContent::Heart];
        let fresh = proposed("C_4", 1);

        let d = discussion(vec![negative, replied, accepted, fresh]);
        let actions = plan_discussion(&d, &Thresholds::default(), now());
        let names: Vec<&str> = actions.iter().map(Action::name).collect();
        assert_eq!(names, vec!["add-attention-label", "accept-answer"]);
    }

    fn reminder_at(age_days: i64) -> Comment {
        comment(
            "C_reminder",
            &reminder_body(Some("asker"), &Thresholds::default()),
            age_days,
        )
    }

    #[test]
    fn test_accept_outranks_outdated_close() {
        let mut liked = proposed("C_liked", 1);
        liked.reactions = vec![ReactionContent::ThumbsUp];
        let d = discussion(vec![proposed("C_stale", 20), liked, reminder_at(5)]);

        let actions = plan_discussion(&d, &Thresholds::default(), now());
        assert_eq!(
            actions,
            vec![Action::AcceptAnswer {
                comment_id: "C_liked".to_string(),
                body: "Answer:  try restarting the daemon".to_string(),
            }]
        );
    }

    #[test]
    fn test_old_reminder_does_not_cover_new_proposal() {
        let mut disputed = proposed("C_old", 30);
        disputed.reply_count = 1;
        let d = discussion(vec![disputed, reminder_at(20), proposed("C_new", 8)]);

        let actions = plan_discussion(&d, &Thresholds::default(), now());
        let names: Vec<&str> = actions.iter().map(Action::name).collect();
        assert_eq!(names, vec!["add-attention-label", "remind-author"]);
    }

    #[test]
    fn test_label_kept_ahead_of_outdated_close() {
        let mut disputed = proposed("C_disputed", 1);
        disputed.reactions = vec![ReactionContent::ThumbsDown];
        let d = discussion(vec![
            proposed("C_stale", 20),
            reminder_at(5),
            disputed,
            proposed("C_fresh", 1),
        ]);

        let actions = plan_discussion(&d, &Thresholds::default(), now());
        let names: Vec<&str> = actions.iter().map(Action::name).collect();
        assert_eq!(names, vec!["add-attention-label", "close-outdated"]);
    }

    #[test]
    fn test_plan_skips_closed_and_invalid() {
        let mut d = discussion(vec![proposed("C_1", 1)]);
        d.closed = true;
        assert!(plan_discussion(&d, &Thresholds::default(), now()).is_empty());

        let mut d = discussion(vec![proposed("C_1", 1)]);
        d.id.clear();
        assert!(plan_discussion(&d, &Thresholds::default(), now()).is_empty());
    }
}
