//! Mercurial backend.

use anyhow::Result;

use super::{CliRepo, VcsRepo, first_column};

pub(super) async fn get(repo: &CliRepo) -> Result<()> {
    repo.parent_cmd()?
        .args(["clone", repo.remote(), repo.local_arg().as_str()])
        .execute_success()
        .await
}

/// Pull, then move the working copy to the head of its branch.
pub(super) async fn update(repo: &CliRepo) -> Result<()> {
    repo.cmd().arg("pull").execute_success().await?;
    repo.cmd().arg("update").execute_success().await
}

pub(super) async fn update_version(repo: &CliRepo, reference: &str) -> Result<()> {
    repo.cmd().args(["update", reference]).execute_success().await
}

pub(super) async fn version(repo: &CliRepo) -> Result<String> {
    let out = repo.cmd().arg("identify").execute_stdout().await?;
    // A trailing `+` marks local modifications
    Ok(out
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .trim_end_matches('+')
        .to_string())
}

pub(super) async fn tags(repo: &CliRepo) -> Result<Vec<String>> {
    let out = repo.cmd().arg("tags").execute_stdout().await?;
    Ok(first_column(&out).into_iter().filter(|t| t != "tip").collect())
}

pub(super) async fn branches(repo: &CliRepo) -> Result<Vec<String>> {
    let out = repo.cmd().arg("branches").execute_stdout().await?;
    Ok(first_column(&out))
}

pub(super) async fn is_reference(repo: &CliRepo, reference: &str) -> Result<bool> {
    repo.cmd().args(["log", "-r", reference]).succeeds().await
}

pub(super) async fn is_dirty(repo: &CliRepo) -> Result<bool> {
    let out = repo.cmd().arg("diff").execute_stdout().await?;
    Ok(!out.is_empty())
}

pub(super) async fn current_branch(repo: &CliRepo) -> Result<Option<String>> {
    let out = repo.cmd().arg("branch").execute_stdout().await?;
    Ok((!out.is_empty()).then_some(out))
}

pub(super) async fn commit_id(repo: &CliRepo, reference: &str) -> Result<String> {
    repo.cmd()
        .args(["log", "-r", reference, "--template", "{node}"])
        .execute_stdout()
        .await
}

pub(super) async fn remote_url(repo: &CliRepo) -> Result<Option<String>> {
    let output = repo.cmd().args(["paths", "default"]).run().await?;
    let url = output.stdout.trim();
    Ok((output.success && !url.is_empty()).then(|| url.to_string()))
}
