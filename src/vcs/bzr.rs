//! Bazaar backend. Revisions are revision numbers; there are no branches
//! within a single bzr branch.

use anyhow::Result;

use super::{CliRepo, VcsRepo, first_column};

pub(super) async fn get(repo: &CliRepo) -> Result<()> {
    repo.parent_cmd()?
        .args(["branch", repo.remote(), repo.local_arg().as_str()])
        .execute_success()
        .await
}

pub(super) async fn update(repo: &CliRepo) -> Result<()> {
    repo.cmd().arg("pull").execute_success().await?;
    repo.cmd().arg("update").execute_success().await
}

pub(super) async fn update_version(repo: &CliRepo, reference: &str) -> Result<()> {
    repo.cmd().args(["update", "-r", reference]).execute_success().await
}

pub(super) async fn version(repo: &CliRepo) -> Result<String> {
    repo.cmd().args(["revno", "--tree"]).execute_stdout().await
}

pub(super) async fn tags(repo: &CliRepo) -> Result<Vec<String>> {
    let out = repo.cmd().arg("tags").execute_stdout().await?;
    Ok(first_column(&out))
}

pub(super) async fn is_reference(repo: &CliRepo, reference: &str) -> Result<bool> {
    repo.cmd().args(["revno", "-r", reference]).succeeds().await
}

pub(super) async fn is_dirty(repo: &CliRepo) -> Result<bool> {
    // bzr diff exits 1 when there are changes
    let output = repo.cmd().arg("diff").run().await?;
    Ok(!output.stdout.trim().is_empty())
}

pub(super) async fn commit_id(repo: &CliRepo, reference: &str) -> Result<String> {
    repo.cmd().args(["revno", "-r", reference]).execute_stdout().await
}
