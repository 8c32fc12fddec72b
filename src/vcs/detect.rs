//! Static VCS detection: checkout metadata, URL shapes and well-known hosts.

use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

use super::VcsKind;

/// A known hosting pattern. `root` captures the repository root of an import path.
struct HostPattern {
    root: Regex,
    vcs: Option<VcsKind>,
}

fn pattern(re: &str, vcs: Option<VcsKind>) -> Option<HostPattern> {
    match Regex::new(re) {
        Ok(root) => Some(HostPattern { root, vcs }),
        Err(e) => {
            tracing::error!("Invalid host pattern {}: {}", re, e);
            None
        }
    }
}

static HOST_PATTERNS: LazyLock<Vec<HostPattern>> = LazyLock::new(|| {
    [
        pattern(
            r"^(?P<root>github\.com/[A-Za-z0-9_.\-]+/[A-Za-z0-9_.\-]+)(/[A-Za-z0-9_.\-]+)*$",
            Some(VcsKind::Git),
        ),
        // Bitbucket hosts both git and hg; the remote decides
        pattern(
            r"^(?P<root>bitbucket\.org/[A-Za-z0-9_.\-]+/[A-Za-z0-9_.\-]+)(/[A-Za-z0-9_.\-]+)*$",
            None,
        ),
        pattern(
            r"^(?P<root>git\.launchpad\.net/(([A-Za-z0-9_.\-]+)|~[A-Za-z0-9_.\-]+/(\+git|[A-Za-z0-9_.\-]+)/[A-Za-z0-9_.\-]+))$",
            Some(VcsKind::Git),
        ),
        pattern(
            r"^(?P<root>launchpad\.net/(([A-Za-z0-9_.\-]+)(/[A-Za-z0-9_.\-]+)?|~[A-Za-z0-9_.\-]+/(\+junk|[A-Za-z0-9_.\-]+)/[A-Za-z0-9_.\-]+))(/[A-Za-z0-9_.\-]+)*$",
            Some(VcsKind::Bzr),
        ),
        pattern(
            r"^(?P<root>hub\.jazz\.net/git/[a-z0-9]+/[A-Za-z0-9_.\-]+)(/[A-Za-z0-9_.\-]+)*$",
            Some(VcsKind::Git),
        ),
        pattern(
            r"^(?P<root>go\.googlesource\.com/[A-Za-z0-9_.\-]+)/?$",
            Some(VcsKind::Git),
        ),
        pattern(
            r"^(?P<root>([a-z0-9.\-]+\.)+[a-z0-9.\-]+(:[0-9]+)?/[A-Za-z0-9_.\-/]*?\.(?P<vcs>bzr|git|hg|svn))(/[A-Za-z0-9_.\-]+)*$",
            None,
        ),
    ]
    .into_iter()
    .flatten()
    .collect()
});

static SCP_URL: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^(?P<user>[A-Za-z0-9_]+)@(?P<host>[A-Za-z0-9._\-]+):(?P<path>.*)$").ok());

/// Repository root of an import path, from the well-known host table.
pub fn root_from_table(pkg: &str) -> Option<String> {
    let pkg = pkg.replace('\\', "/");
    HOST_PATTERNS
        .iter()
        .find_map(|p| p.root.captures(&pkg)?.name("root").map(|m| m.as_str().trim_end_matches('/').to_string()))
}

/// The VCS of an existing checkout at `local`, from its metadata directory.
pub fn detect_local(local: &Path) -> Option<VcsKind> {
    VcsKind::ALL
        .into_iter()
        .find(|kind| local.join(kind.metadata_dir()).exists())
}

/// Infer the VCS from a remote URL without touching the network.
pub fn detect_remote(remote: &str) -> Option<VcsKind> {
    let lower = remote.to_ascii_lowercase();

    for (scheme, kind) in [
        ("git://", VcsKind::Git),
        ("git+ssh://", VcsKind::Git),
        ("svn://", VcsKind::Svn),
        ("svn+ssh://", VcsKind::Svn),
        ("bzr://", VcsKind::Bzr),
        ("bzr+ssh://", VcsKind::Bzr),
    ] {
        if lower.starts_with(scheme) {
            return Some(kind);
        }
    }

    let (user, host_and_path) = split_remote(&lower);

    for (suffix, kind) in [
        (".git", VcsKind::Git),
        (".hg", VcsKind::Hg),
        (".svn", VcsKind::Svn),
        (".bzr", VcsKind::Bzr),
    ] {
        if host_and_path.trim_end_matches('/').ends_with(suffix) {
            return Some(kind);
        }
    }

    if host_and_path.starts_with("bitbucket.org/") {
        return Some(if user.as_deref() == Some("hg") {
            VcsKind::Hg
        } else {
            VcsKind::Git
        });
    }

    HOST_PATTERNS.iter().find_map(|p| {
        let caps = p.root.captures(&host_and_path)?;
        p.vcs.or_else(|| caps.name("vcs").and_then(|m| VcsKind::parse(m.as_str())))
    })
}

/// Split a remote into its user (if any) and `host/path`.
pub(crate) fn split_remote(remote: &str) -> (Option<String>, String) {
    if let Some(re) = SCP_URL.as_ref()
        && !remote.contains("://")
        && let Some(caps) = re.captures(remote)
    {
        return (
            Some(caps["user"].to_string()),
            format!("{}/{}", &caps["host"], caps["path"].trim_start_matches('/')),
        );
    }

    let rest = remote.split_once("://").map_or(remote, |(_, rest)| rest);
    match rest.split_once('@') {
        Some((user, host_path)) if !user.contains('/') => (Some(user.to_string()), host_path.to_string()),
        _ => (None, rest.to_string()),
    }
}
