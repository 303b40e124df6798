use git_version::git_version;

// include -modified if the working tree has uncommitted changes
const COMMIT: &str = git_version!(
    args = ["--abbrev=10", "--always", "--dirty=-modified"],
    fallback = "unknown"
);

/// Version string derived from the git tags seen by `build.rs`.
pub fn version() -> String {
    let latest = option_env!("LATEST_TAG").unwrap_or("");
    let ahead = option_env!("COMMITS_AHEAD").unwrap_or("");
    match option_env!("RELEASE_VERSION") {
        Some(tag) if !tag.is_empty() => format!("release {tag}"),
        _ if !latest.is_empty() && !ahead.is_empty() => {
            format!("development, {ahead} commits ahead of {latest}")
        }
        _ if !latest.is_empty() => format!("development, ahead of {latest}"),
        _ => format!("development {}", env!("CARGO_PKG_VERSION")),
    }
}

/// One-line description of this build for the startup log.
pub fn build_info() -> String {
    let profile = if cfg!(debug_assertions) {
        "dev"
    } else {
        "release"
    };
    format!(
        "{} {} (commit {}, {} build, opencv {})",
        env!("CARGO_PKG_NAME"),
        version(),
        COMMIT,
        profile,
        if cfg!(feature = "opencv") { "on" } else { "off" }
    )
}
