use std::io::Write;

use answerbot::{Task, TriageError, TriagePlan, TriageReport};
use anyhow::Result;
use chrono::{DateTime, Utc};

fn format_relative_time(time: DateTime<Utc>, now: DateTime<Utc>) -> String {
    use chrono_humanize::HumanTime;
    HumanTime::from(time - now).to_string()
}

/// Splits tasks into runs that share a discussion, keeping plan order.
fn group_by_discussion(tasks: &[Task]) -> Vec<&[Task]> {
    tasks
        .chunk_by(|a, b| a.discussion_number == b.discussion_number)
        .collect()
}

fn write_task_tree<W: Write>(tasks: &[Task], now: DateTime<Utc>, writer: &mut W) -> Result<()> {
    for group in group_by_discussion(tasks) {
        let first = &group[0];
        writeln!(
            writer,
            "● {}#{} {} (updated {})",
            first.repo,
            first.discussion_number,
            first.title,
            format_relative_time(first.updated_at, now)
        )?;
        for (i, task) in group.iter().enumerate() {
            let prefix = if i + 1 == group.len() { "└─" } else { "├─" };
            writeln!(
                writer,
                "{prefix}{}: {}",
                task.action.name(),
                task.action.detail()
            )?;
        }
    }
    Ok(())
}

fn write_errors<W: Write>(errors: &[TriageError], writer: &mut W) -> Result<()> {
    for error in errors {
        writeln!(writer, "Error: {error}")?;
    }
    Ok(())
}

pub fn write_plan<W: Write>(plan: &TriagePlan, now: DateTime<Utc>, writer: &mut W) -> Result<()> {
    write_task_tree(&plan.tasks, now, writer)?;
    write_errors(&plan.errors, writer)?;
    writeln!(
        writer,
        "Dry run: {} discussions checked, {} actions planned",
        plan.discussions_seen,
        plan.tasks.len()
    )?;
    Ok(())
}

pub fn write_report<W: Write>(
    report: &TriageReport,
    now: DateTime<Utc>,
    writer: &mut W,
) -> Result<()> {
    write_task_tree(&report.applied, now, writer)?;
    if !report.skipped.is_empty() {
        writeln!(writer, "Skipped after earlier failure:")?;
        write_task_tree(&report.skipped, now, writer)?;
    }
    write_errors(&report.errors, writer)?;
    writeln!(
        writer,
        "{} actions applied, {} skipped, {} errors",
        report.applied.len(),
        report.skipped.len(),
        report.errors.len()
    )?;
    Ok(())
}
