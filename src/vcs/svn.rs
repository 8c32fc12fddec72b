//! Subversion backend. Tags and branches are paths in svn, so both lists are
//! always empty and references are revision numbers.

use anyhow::Result;

use super::{CliRepo, VcsRepo};

pub(super) async fn get(repo: &CliRepo) -> Result<()> {
    repo.parent_cmd()?
        .args(["checkout", repo.remote(), repo.local_arg().as_str()])
        .execute_success()
        .await
}

pub(super) async fn update(repo: &CliRepo) -> Result<()> {
    repo.cmd().arg("update").execute_success().await
}

pub(super) async fn update_version(repo: &CliRepo, reference: &str) -> Result<()> {
    repo.cmd().args(["update", "-r", reference]).execute_success().await
}

pub(super) async fn version(repo: &CliRepo) -> Result<String> {
    let output = repo.cmd().args(["info", "--show-item", "revision"]).run().await?;
    if output.success && !output.stdout.trim().is_empty() {
        return Ok(output.stdout.trim().to_string());
    }
    // Clients before 1.9 lack --show-item
    repo.cmd().program("svnversion").arg(".").execute_stdout().await
}

/// Value of a `Key: value` line in `svn info` output.
pub(super) fn parse_info_field(info: &str, key: &str) -> Option<String> {
    info.lines()
        .find_map(|line| line.strip_prefix(key)?.strip_prefix(':'))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub(super) async fn is_reference(repo: &CliRepo, reference: &str) -> Result<bool> {
    let output = repo.cmd().args(["log", "-r", reference]).run().await?;
    // An unknown revision prints only the separator line
    Ok(output.success && output.stdout.lines().count() > 2)
}

pub(super) async fn is_dirty(repo: &CliRepo) -> Result<bool> {
    let out = repo.cmd().arg("diff").execute_stdout().await?;
    Ok(!out.is_empty())
}

pub(super) async fn commit_id(repo: &CliRepo, reference: &str) -> Result<String> {
    let info = repo.cmd().args(["info", "-r", reference]).execute_stdout().await?;
    parse_info_field(&info, "Last Changed Rev")
        .or_else(|| parse_info_field(&info, "Revision"))
        .ok_or_else(|| anyhow::anyhow!("svn info did not report a revision for {reference}"))
}

pub(super) async fn remote_url(repo: &CliRepo) -> Result<Option<String>> {
    let output = repo.cmd().arg("info").run().await?;
    if !output.success {
        return Ok(None);
    }
    Ok(parse_info_field(&output.stdout, "URL"))
}
