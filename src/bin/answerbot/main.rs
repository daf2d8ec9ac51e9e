mod display;

use answerbot::{GitHub, apply_plan, parse_args, plan_triage};
use chrono::Utc;
use display::{write_plan, write_report};

fn handle_clap_help_version(clap_err: &clap::Error) -> ! {
    use clap::error::ErrorKind;
    match clap_err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
            print!("{clap_err}");
            std::process::exit(0);
        }
        _ => {
            eprint!("{clap_err}");
            std::process::exit(2);
        }
    }
}

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    // RUNNER_DEBUG is set when an Actions run is re-run with debug logging.
    let default_level = match std::env::var("RUNNER_DEBUG").as_deref() {
        Ok("1") => "debug",
        _ => "info",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let (spec, client_config) = match parse_args(std::env::args()) {
        Ok(result) => result,
        Err(err) => {
            if let Some(clap_err) = err.downcast_ref::<clap::Error>() {
                handle_clap_help_version(clap_err);
            } else {
                return Err(err);
            }
        }
    };

    let github = GitHub::connect(&client_config).await?;
    let now = Utc::now();
    let plan = plan_triage(&spec, &github, now).await?;
    let mut stdout = std::io::stdout();

    if spec.dry_run {
        write_plan(&plan, now, &mut stdout)?;
        if !plan.errors.is_empty() {
            std::process::exit(1);
        }
        return Ok(());
    }

    let report = apply_plan(plan, &spec, &github).await;
    write_report(&report, now, &mut stdout)?;

    if !report.is_success() {
        std::process::exit(1);
    }

    Ok(())
}
