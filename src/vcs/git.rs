//! git backend.

use anyhow::Result;

use super::{CliRepo, VcsRepo};

pub(super) async fn get(repo: &CliRepo) -> Result<()> {
    repo.parent_cmd()?
        .args(["clone", repo.remote(), repo.local_arg().as_str()])
        .execute_success()
        .await
}

pub(super) async fn update(repo: &CliRepo) -> Result<()> {
    repo.cmd().args(["fetch", "--tags", "origin"]).execute_success().await?;

    // A detached HEAD (tag or commit checkout) has nothing to pull into
    if current_branch(repo).await?.is_none() {
        return Ok(());
    }
    repo.cmd().arg("pull").execute_success().await
}

/// Check out `reference`. A branch is then moved to its fetched upstream,
/// which a local branch lags behind after updates made on a detached HEAD.
pub(super) async fn update_version(repo: &CliRepo, reference: &str) -> Result<()> {
    repo.cmd().args(["checkout", reference]).execute_success().await?;

    if current_branch(repo).await?.as_deref() != Some(reference) {
        return Ok(());
    }
    let upstream = format!("refs/remotes/origin/{reference}");
    if !repo
        .cmd()
        .args(["show-ref", "--verify", "--quiet", upstream.as_str()])
        .succeeds()
        .await?
    {
        return Ok(());
    }
    repo.cmd()
        .args(["reset", "--hard", "-q", upstream.as_str()])
        .execute_success()
        .await
}

pub(super) async fn version(repo: &CliRepo) -> Result<String> {
    repo.cmd().args(["rev-parse", "HEAD"]).execute_stdout().await
}

async fn show_ref(repo: &CliRepo) -> Result<String> {
    // show-ref exits 1 when the repository has no refs at all
    let output = repo.cmd().arg("show-ref").run().await?;
    Ok(output.stdout)
}

/// Names under `prefix` in `git show-ref` output.
pub(super) fn parse_refs(output: &str, prefix: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| line.split_whitespace().nth(1))
        .filter_map(|name| name.strip_prefix(prefix))
        .filter(|name| *name != "HEAD" && !name.ends_with("^{}"))
        .map(str::to_string)
        .collect()
}

pub(super) async fn tags(repo: &CliRepo) -> Result<Vec<String>> {
    Ok(parse_refs(&show_ref(repo).await?, "refs/tags/"))
}

pub(super) async fn branches(repo: &CliRepo) -> Result<Vec<String>> {
    let output = show_ref(repo).await?;
    let mut names = parse_refs(&output, "refs/remotes/origin/");
    for local in parse_refs(&output, "refs/heads/") {
        if !names.contains(&local) {
            names.push(local);
        }
    }
    Ok(names)
}

pub(super) async fn is_reference(repo: &CliRepo, reference: &str) -> Result<bool> {
    if repo
        .cmd()
        .args(["rev-parse", "--verify", "--quiet", reference])
        .succeeds()
        .await?
    {
        return Ok(true);
    }
    // Remote branches that were never checked out fail rev-parse
    repo.cmd().args(["show-ref", reference]).succeeds().await
}

pub(super) async fn is_dirty(repo: &CliRepo) -> Result<bool> {
    let status = repo
        .cmd()
        .args(["status", "--porcelain", "--untracked-files=no"])
        .execute_stdout()
        .await?;
    Ok(!status.is_empty())
}

pub(super) async fn current_branch(repo: &CliRepo) -> Result<Option<String>> {
    let output = repo.cmd().args(["symbolic-ref", "--short", "-q", "HEAD"]).run().await?;
    let branch = output.stdout.trim();
    Ok((output.success && !branch.is_empty()).then(|| branch.to_string()))
}

/// The commit `reference` names. Branches resolve to their fetched upstream
/// so a stale local branch is never mistaken for the current revision.
pub(super) async fn commit_id(repo: &CliRepo, reference: &str) -> Result<String> {
    let mut candidates = vec![format!("{reference}^{{commit}}")];
    if reference != "HEAD" {
        candidates.insert(0, format!("refs/remotes/origin/{reference}^{{commit}}"));
    }
    for candidate in &candidates {
        let output = repo
            .cmd()
            .args(["rev-parse", "--verify", "--quiet", candidate.as_str()])
            .run()
            .await?;
        if output.success {
            return Ok(output.stdout.trim().to_string());
        }
    }
    repo.cmd()
        .args(["rev-parse", "--verify", format!("origin/{reference}^{{commit}}").as_str()])
        .execute_stdout()
        .await
}

pub(super) async fn remote_url(repo: &CliRepo) -> Result<Option<String>> {
    let output = repo.cmd().args(["config", "--get", "remote.origin.url"]).run().await?;
    let url = output.stdout.trim();
    Ok((output.success && !url.is_empty()).then(|| url.to_string()))
}
