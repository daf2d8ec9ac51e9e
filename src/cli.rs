use anyhow::{Context, Result};
use clap::Parser;

use crate::{
    graphql::MAX_PAGE_SIZE,
    policy::DEFAULT_ATTENTION_LABEL,
    types::{ClientConfig, Repo, Thresholds, TriageSpec},
};

const BUILD_INFO_HUMAN: &str = env!("BUILD_INFO_HUMAN");

const DEFAULT_PAGE_SIZE: u32 = 50;

// Action inputs reach the process as INPUT_<NAME> variables and arrive as
// empty strings when unset, so every input is read as an optional string and
// defaulted by hand.
#[derive(Parser, Default, Debug)]
#[command(
    name = "answerbot",
    about = "Triage answerable GitHub Discussions: accept proposed answers that get positive reactions, flag disputed ones for a maintainer, and close stale threads"
)]
#[command(long_version = BUILD_INFO_HUMAN)]
struct CliArgs {
    /// GitHub repository in format 'owner/repo'
    #[arg(short = 'r', long, env = "GITHUB_REPOSITORY", value_name = "OWNER/REPO")]
    pub repo: Option<String>,

    /// DISCUSSION-NUMBER|DISCUSSION-URL ... (default: every open discussion)
    pub discussions: Vec<String>,

    /// Token used for the GraphQL API (falls back to GITHUB_TOKEN, GH_TOKEN, then gh)
    #[arg(long, env = "INPUT_GITHUB-TOKEN", value_name = "TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,

    /// Label added to discussions that need a maintainer
    #[arg(long, env = "INPUT_ATTENTION-LABEL", value_name = "NAME")]
    pub attention_label: Option<String>,

    /// Days without feedback on a proposed answer before the author is reminded [default: 7]
    #[arg(long, env = "INPUT_DAYS-UNTIL-STALE", value_name = "DAYS")]
    pub days_until_stale: Option<String>,

    /// Days after the reminder before the discussion is closed as outdated [default: 4]
    #[arg(long, env = "INPUT_DAYS-UNTIL-CLOSE", value_name = "DAYS")]
    pub days_until_close: Option<String>,

    /// Discussions and comments fetched per GraphQL request, 1-100 [default: 50]
    #[arg(long, env = "INPUT_PAGE-SIZE", value_name = "NUM")]
    pub page_size: Option<String>,

    /// Limit the number of discussions to process
    #[arg(short = 'L', long, value_name = "NUM")]
    pub limit: Option<usize>,

    /// Print the planned actions without changing anything
    #[arg(
        short = 'n',
        long,
        env = "INPUT_DRY-RUN",
        value_name = "BOOL",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true"
    )]
    pub dry_run: Option<String>,

    /// Base URL of the GitHub API (for GitHub Enterprise Server)
    #[arg(long, env = "GITHUB_API_URL", value_name = "URL")]
    pub api_url: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn parse_days(name: &str, value: &Option<String>, default: u32) -> Result<u32> {
    let Some(raw) = non_empty(value) else {
        return Ok(default);
    };
    let days: u32 = raw
        .parse()
        .with_context(|| format!("Invalid {name}: '{raw}' (expected a whole number of days)"))?;
    if days == 0 {
        anyhow::bail!("{name} must be at least 1 day");
    }
    Ok(days)
}

fn parse_page_size(value: &Option<String>) -> Result<u32> {
    let Some(raw) = non_empty(value) else {
        return Ok(DEFAULT_PAGE_SIZE);
    };
    let size: u32 = raw
        .parse()
        .with_context(|| format!("Invalid page-size: '{raw}'"))?;
    if !(1..=MAX_PAGE_SIZE).contains(&size) {
        anyhow::bail!("page-size must be between 1 and {MAX_PAGE_SIZE}, got {size}");
    }
    Ok(size)
}

fn parse_bool(name: &str, value: &Option<String>) -> Result<bool> {
    let Some(raw) = non_empty(value) else {
        return Ok(false);
    };
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => anyhow::bail!("Invalid {name}: '{raw}' (expected true or false)"),
    }
}

fn parse_discussion_args(repo: &Repo, args: &[String]) -> Result<Vec<u64>> {
    let mut numbers = Vec::new();

    for arg in args {
        let arg = arg.trim();
        if arg.is_empty() {
            continue;
        }
        if arg.starts_with("https://") {
            let (url_repo, number) = Repo::parse_discussion_url(arg)?;
            if &url_repo != repo {
                anyhow::bail!(
                    "Discussion URL {} is from {} but --repo specifies {}",
                    arg,
                    url_repo,
                    repo
                );
            }
            numbers.push(number);
        } else {
            let number: u64 = arg
                .parse()
                .with_context(|| format!("Invalid discussion number: '{arg}'"))?;
            numbers.push(number);
        }
    }

    Ok(numbers)
}

fn build_spec_from_cli(cli: CliArgs) -> Result<(TriageSpec, ClientConfig)> {
    let repo_arg = non_empty(&cli.repo)
        .context("Repository is required: pass --repo or set GITHUB_REPOSITORY")?;
    let repo = Repo::parse(repo_arg)
        .map_err(|e| anyhow::anyhow!("Invalid repository format '{}': {}", repo_arg, e))?;

    let thresholds = Thresholds {
        days_until_stale: parse_days("days-until-stale", &cli.days_until_stale, 7)?,
        days_until_close: parse_days("days-until-close", &cli.days_until_close, 4)?,
    };

    let api_url = non_empty(&cli.api_url)
        .map(|u| url::Url::parse(u).with_context(|| format!("Invalid API URL: '{u}'")))
        .transpose()?;

    let spec = TriageSpec {
        discussions: parse_discussion_args(&repo, &cli.discussions)?,
        attention_label: non_empty(&cli.attention_label)
            .unwrap_or(DEFAULT_ATTENTION_LABEL)
            .to_string(),
        thresholds,
        page_size: parse_page_size(&cli.page_size)?,
        limit: cli.limit,
        dry_run: parse_bool("dry-run", &cli.dry_run)?,
        repo,
    };

    let client = ClientConfig {
        token: non_empty(&cli.github_token).map(str::to_string),
        api_url,
    };

    Ok((spec, client))
}

/// Parses command-line arguments (and Action inputs from the environment)
/// into a triage specification and client configuration.
pub fn parse_args<I, T>(args: I) -> Result<(TriageSpec, ClientConfig)>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let cli = CliArgs::try_parse_from(args)?;
    build_spec_from_cli(cli)
}
