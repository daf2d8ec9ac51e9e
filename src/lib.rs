//! answerbot: triage for answerable GitHub Discussions.
//!
//! Finds comments flagged as proposed answers, reacts to the community's
//! emoji feedback on them, reminds authors who go quiet, and closes
//! discussions once they are resolved or stale. All state is read back from
//! GitHub on every run; the decision table lives in [`policy`] and is free of
//! I/O, while [`Forge`] is the seam to the GraphQL API.

pub mod cli;
pub mod github;
pub mod graphql;
pub mod policy;
pub mod triage;
pub mod types;

pub use cli::parse_args;
pub use github::GitHub;
pub use triage::{TriagePlan, TriageReport, apply_plan, execute_task, plan_triage};
pub use types::{
    Action, AttentionCause, Category, ClientConfig, CloseReason, Comment, Discussion, Forge,
    LabelId, Polarity, ReactionContent, Repo, RepoError, ResolveCause, Task, Thresholds,
    TriageError, TriageSpec,
};
