//! Network lookups about remote repositories.
//!
//! Two questions need the network:
//!
//! - where the repository root of a vanity import path is, answered by the
//!   `go-import` meta tag served for `https://<path>?go-get=1`;
//! - what the default branch of a hosted repository is, answered by the
//!   GitHub and Bitbucket REST APIs.
//!
//! Both are memoized for the life of the [`ImportDiscovery`], which the
//! binary keeps for one process. An offline instance answers every question
//! with "unknown" and never opens a connection.

use anyhow::Result;
use dashmap::DashMap;
use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;

use super::VcsKind;
use super::detect::{self, root_from_table};
use crate::constants::HTTP_TIMEOUT;
use crate::core::GroveError;

/// A parsed `<meta name="go-import" content="prefix vcs repo">` tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoImport {
    pub prefix: String,
    pub vcs: VcsKind,
    pub repo: String,
}

static META_TAG: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"(?is)<meta\s[^>]*>").ok());
static ATTRIBUTE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"(?is)([a-z][a-z0-9_\-]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).ok());

/// Memoizing client for remote metadata.
#[derive(Debug)]
pub struct ImportDiscovery {
    client: Option<reqwest::Client>,
    go_imports: DashMap<String, Option<GoImport>>,
    default_branches: DashMap<String, Option<String>>,
}

impl Default for ImportDiscovery {
    fn default() -> Self {
        Self::new()
    }
}

impl ImportDiscovery {
    /// A discovery client that may query the network.
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent(concat!("grove/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| tracing::warn!("HTTP client unavailable, remote discovery disabled: {}", e))
            .ok();
        Self {
            client,
            go_imports: DashMap::new(),
            default_branches: DashMap::new(),
        }
    }

    /// A discovery client that never touches the network.
    pub fn offline() -> Self {
        Self {
            client: None,
            go_imports: DashMap::new(),
            default_branches: DashMap::new(),
        }
    }

    pub const fn is_offline(&self) -> bool {
        self.client.is_none()
    }

    /// Repository root of an import path.
    ///
    /// Well-known hosts are answered from the pattern table; anything else
    /// goes through `go-get` discovery. When nothing is known the path is its
    /// own root.
    pub async fn root_of(&self, pkg: &str) -> String {
        let pkg = pkg.replace('\\', "/");
        if let Some(root) = root_from_table(&pkg) {
            return root;
        }
        match self.go_import(&pkg).await {
            Some(found) => found.prefix,
            None => pkg,
        }
    }

    /// Backend for a dependency whose remote did not reveal it.
    pub async fn detect_vcs(&self, name: &str, remote: &str) -> Result<VcsKind> {
        let path = remote
            .split_once("://")
            .map_or(remote, |(_, rest)| rest)
            .trim_end_matches('/');
        for candidate in [path, name] {
            if let Some(found) = self.go_import(candidate).await {
                return Ok(found.vcs);
            }
        }
        Err(GroveError::CannotDetectVcs {
            remote: remote.to_string(),
        }
        .into())
    }

    /// The `go-import` declaration covering `pkg`, fetched at most once per prefix.
    pub async fn go_import(&self, pkg: &str) -> Option<GoImport> {
        if let Some(hit) = self.go_imports.get(pkg) {
            return hit.clone();
        }
        let covered = self.go_imports.iter().find_map(|entry| {
            entry
                .value()
                .as_ref()
                .filter(|gi| is_path_prefix(&gi.prefix, pkg))
                .cloned()
        });
        if covered.is_some() {
            return covered;
        }

        let found = self.fetch_go_import(pkg).await;
        self.go_imports.insert(pkg.to_string(), found.clone());
        found
    }

    async fn fetch_go_import(&self, pkg: &str) -> Option<GoImport> {
        let client = self.client.as_ref()?;
        let url = if pkg.contains('?') {
            format!("https://{pkg}&go-get=1")
        } else {
            format!("https://{pkg}?go-get=1")
        };
        tracing::debug!("Looking up go-import for {}", pkg);

        let response = match client.get(&url).send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::debug!("go-get lookup of {} failed: {}", url, e);
                return None;
            }
        };
        let body = response.text().await.ok()?;
        parse_go_import(&body, pkg)
    }

    /// Default branch reported by the hosting service for `remote`.
    ///
    /// GitHub and Bitbucket are supported. Any failure yields `None`.
    pub async fn hosted_default_branch(&self, remote: &str) -> Option<String> {
        if let Some(hit) = self.default_branches.get(remote) {
            return hit.clone();
        }
        let found = self.fetch_default_branch(remote).await;
        self.default_branches.insert(remote.to_string(), found.clone());
        found
    }

    async fn fetch_default_branch(&self, remote: &str) -> Option<String> {
        let client = self.client.as_ref()?;
        let (host, owner, repo) = hosted_repo(remote)?;

        #[derive(Deserialize)]
        struct GitHubRepo {
            default_branch: String,
        }
        #[derive(Deserialize)]
        struct BitbucketBranch {
            name: String,
        }

        let result: Result<String, reqwest::Error> = match host.as_str() {
            "github.com" => {
                let url = format!("https://api.github.com/repos/{owner}/{repo}");
                async {
                    let body: GitHubRepo = client.get(&url).send().await?.error_for_status()?.json().await?;
                    Ok::<_, reqwest::Error>(body.default_branch)
                }
                .await
            }
            "bitbucket.org" => {
                let url = format!("https://bitbucket.org/api/1.0/repositories/{owner}/{repo}/main-branch/");
                async {
                    let body: BitbucketBranch =
                        client.get(&url).send().await?.error_for_status()?.json().await?;
                    Ok::<_, reqwest::Error>(body.name)
                }
                .await
            }
            _ => return None,
        };

        match result {
            Ok(branch) if !branch.is_empty() => Some(branch),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!("Default branch lookup for {} failed: {}", remote, e);
                None
            }
        }
    }
}

fn is_path_prefix(prefix: &str, pkg: &str) -> bool {
    pkg == prefix || pkg.strip_prefix(prefix).is_some_and(|rest| rest.starts_with('/'))
}

/// `(host, owner, repo)` for GitHub and Bitbucket remotes.
fn hosted_repo(remote: &str) -> Option<(String, String, String)> {
    let (_, host_path) = detect::split_remote(remote);
    let mut parts = host_path.trim_end_matches('/').splitn(4, '/');
    let host = parts.next()?.to_ascii_lowercase();
    let owner = parts.next()?.to_string();
    let repo = parts.next()?.trim_end_matches(".git").to_string();
    if owner.is_empty() || repo.is_empty() {
        return None;
    }
    Some((host, owner, repo))
}

/// Find the `go-import` meta tag in `html` whose prefix covers `pkg`.
///
/// Only the document head is considered.
pub fn parse_go_import(html: &str, pkg: &str) -> Option<GoImport> {
    let (meta_re, attr_re) = (META_TAG.as_ref()?, ATTRIBUTE.as_ref()?);
    let lower = html.to_ascii_lowercase();
    let end = ["</head", "<body"]
        .iter()
        .filter_map(|marker| lower.find(marker))
        .min()
        .unwrap_or(html.len());
    let head = &html[..end];

    meta_re.find_iter(head).find_map(|tag| {
        let mut name = None;
        let mut content = None;
        for caps in attr_re.captures_iter(tag.as_str()) {
            let value = caps.get(2).or_else(|| caps.get(3)).map(|m| m.as_str());
            match caps[1].to_ascii_lowercase().as_str() {
                "name" => name = value,
                "content" => content = value,
                _ => {}
            }
        }
        if name != Some("go-import") {
            return None;
        }
        let fields: Vec<&str> = content?.split_whitespace().collect();
        let [prefix, vcs, repo] = fields.as_slice() else {
            return None;
        };
        if !is_path_prefix(prefix, pkg) {
            return None;
        }
        Some(GoImport {
            prefix: (*prefix).to_string(),
            vcs: VcsKind::parse(vcs)?,
            repo: (*repo).to_string(),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta http-equiv="Content-Type" content="text/html; charset=utf-8"/>
<meta name="go-import" content="golang.org/x/net git https://go.googlesource.com/net">
<meta name="go-source" content="golang.org/x/net https://github.com/golang/net/ https://github.com/golang/net/tree/master{/dir} https://github.com/golang/net/blob/master{/dir}/{file}#L{line}">
</head>
<body>
<meta name="go-import" content="golang.org/x/evil git https://evil.example.com">
</body>
</html>"#;

    #[test]
    fn test_parse_go_import() {
        let found = parse_go_import(PAGE, "golang.org/x/net/context").unwrap();
        assert_eq!(found.prefix, "golang.org/x/net");
        assert_eq!(found.vcs, VcsKind::Git);
        assert_eq!(found.repo, "https://go.googlesource.com/net");
    }

    #[test]
    fn test_parse_go_import_ignores_body_and_foreign_prefix() {
        assert!(parse_go_import(PAGE, "golang.org/x/evil").is_none());
        assert!(parse_go_import(PAGE, "golang.org/x/network").is_none());
    }

    #[test]
    fn test_parse_go_import_attribute_order() {
        let html = "<head><meta content='example.org/pkg hg https://hg.example.org/pkg' name='go-import'></head>";
        let found = parse_go_import(html, "example.org/pkg").unwrap();
        assert_eq!(found.vcs, VcsKind::Hg);
    }

    #[test]
    fn test_hosted_repo() {
        assert_eq!(
            hosted_repo("https://github.com/pkg/errors.git"),
            Some(("github.com".into(), "pkg".into(), "errors".into()))
        );
        assert_eq!(
            hosted_repo("git@bitbucket.org:ww/goautoneg"),
            Some(("bitbucket.org".into(), "ww".into(), "goautoneg".into()))
        );
        assert_eq!(hosted_repo("https://example.com"), None);
    }

    #[tokio::test]
    async fn test_offline_root_of() {
        let discovery = ImportDiscovery::offline();
        assert_eq!(discovery.root_of("github.com/a/b/c").await, "github.com/a/b");
        assert_eq!(discovery.root_of("example.com/vanity/pkg").await, "example.com/vanity/pkg");
        assert!(discovery.hosted_default_branch("https://github.com/a/b").await.is_none());
    }

    #[tokio::test]
    async fn test_offline_detect_vcs_fails() {
        let discovery = ImportDiscovery::offline();
        let err = discovery.detect_vcs("example.com/x", "https://example.com/x").await.unwrap_err();
        assert!(matches!(err.downcast_ref::<GroveError>(), Some(GroveError::CannotDetectVcs { .. })));
    }
}
