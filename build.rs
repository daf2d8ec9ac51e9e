//! Build script for answerbot: embeds a version string in `BUILD_INFO_HUMAN`.
//!
//! The version comes from the first source that answers:
//!
//! 1. `git describe --tags --dirty` when a tag is reachable, e.g.
//!    `v0.3.0` or `v0.3.0-4-g1a2b3c4d5e6f-dirty`.
//! 2. The commit the build is running on, from `git rev-parse` or, inside an
//!    Actions runner without a git checkout, `GITHUB_SHA`. This yields
//!    `v{CARGO_PKG_VERSION}-{commit}`, with `+dirty` for local edits.
//! 3. `v{CARGO_PKG_VERSION}-{build date}` when neither is available.
//!
//! The rustc version is appended so bug reports say which toolchain built
//! the binary.

use std::{env, process::Command};

use chrono::Utc;

const SHORT_SHA_LEN: usize = 12;

fn main() {
    for path in ["src", "build.rs", "Cargo.toml", "Cargo.lock"] {
        println!("cargo:rerun-if-changed={path}");
    }
    println!("cargo:rerun-if-env-changed=GITHUB_SHA");

    println!("cargo:rustc-env=BUILD_INFO_HUMAN={}", build_info());
}

fn run(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8(output.stdout).ok()?;
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn tagged_version() -> Option<String> {
    let abbrev = format!("--abbrev={SHORT_SHA_LEN}");
    run("git", &["describe", "--tags", "--dirty", &abbrev])
}

fn has_local_changes() -> bool {
    run("git", &["status", "--porcelain"]).is_some_and(|status| {
        // `cargo install --git` drops .cargo-ok into the checkout.
        status.lines().any(|line| line.get(3..) != Some(".cargo-ok"))
    })
}

fn commit_version() -> Option<String> {
    let version = env!("CARGO_PKG_VERSION");

    let short = format!("--short={SHORT_SHA_LEN}");
    if let Some(commit) = run("git", &["rev-parse", &short, "HEAD"]) {
        let dirty = if has_local_changes() { "+dirty" } else { "" };
        return Some(format!("v{version}-{commit}{dirty}"));
    }

    let sha = env::var("GITHUB_SHA").ok()?;
    let commit = sha.get(..SHORT_SHA_LEN).unwrap_or(&sha);
    Some(format!("v{version}-{commit}"))
}

fn fallback_version() -> String {
    format!(
        "v{}-{}",
        env!("CARGO_PKG_VERSION"),
        Utc::now().format("%Y%m%d")
    )
}

fn build_info() -> String {
    let source = tagged_version()
        .or_else(commit_version)
        .unwrap_or_else(fallback_version);

    let mut info = format!("{} ({source})", env!("CARGO_PKG_VERSION"));
    if let Some(rustc) = run("rustc", &["--version"]) {
        info.push(' ');
        info.push_str(&rustc);
    }
    info
}
