//! Turning declared references into concrete revisions.
//!
//! A dependency's `reference` is one of:
//!
//! - empty, meaning "whatever the default branch is";
//! - an exact VCS reference: a tag, branch or revision;
//! - a semantic version constraint such as `^1.2.0` (see [`constraint`]).
//!
//! [`pin`] checks out the matching revision in a working copy and records it
//! on the dependency. [`determine_dependency`] reconciles two manifests that
//! both declare the same dependency with different references.
//!
//! # Version Resolution Strategy
//!
//! 1. Empty reference: pin whatever is checked out.
//! 2. A reference the repository knows, not starting with `^`: use it as is.
//! 3. Otherwise parse a constraint, list tags and branches, keep those that
//!    parse as versions, sort descending and take the first match.
//! 4. Check out the choice and read back the revision.

pub mod constraint;

pub use constraint::{Constraints, parse_version, select_version};

use anyhow::Result;
use tracing::debug;

use crate::core::{GroveError, OperationContext};
use crate::manifest::Dependency;
use crate::vcs::VcsRepo;

/// The reference to check out for `dep`, resolving constraints against the
/// repository's tags and branches.
pub async fn resolve_reference<R: VcsRepo>(repo: &R, dep: &Dependency) -> Result<String> {
    let reference = &dep.reference;
    if !reference.starts_with('^') && repo.is_reference(reference).await? {
        return Ok(reference.clone());
    }

    let constraints = Constraints::parse(reference)?;
    let mut refs = repo.branches().await?;
    refs.extend(repo.tags().await?);

    select_version(&constraints, &refs).ok_or_else(|| {
        GroveError::InvalidVersionConstraint {
            constraint: reference.clone(),
            reason: format!("no tag or branch of {} satisfies it", dep.name),
        }
        .into()
    })
}

/// Check out the revision `dep` asks for and record it in `dep.pin`.
///
/// A dependency that is already pinned is left alone. When the working copy
/// already sits on the chosen revision nothing is checked out.
pub async fn pin<R: VcsRepo>(repo: &R, dep: &mut Dependency) -> Result<()> {
    if !dep.pin.is_empty() {
        return Ok(());
    }

    if dep.reference.is_empty() {
        dep.pin = repo.version().await?;
        debug!("Pinned {} to current checkout {}", dep.name, dep.pin);
        return Ok(());
    }

    let selected = resolve_reference(repo, dep).await?;
    let current = repo.version().await?;
    let target = repo.commit_id(&selected).await.ok();

    if target.as_deref() == Some(current.as_str()) {
        dep.pin = current;
    } else {
        debug!("Setting version for {} to {}", dep.name, selected);
        repo.update_version(&selected).await?;
        dep.pin = repo.version().await?;
    }
    Ok(())
}

/// Choose between the reference already recorded for a dependency and one
/// requested by another manifest (`source`).
///
/// | Existing   | Requested  | Result                                     |
/// |------------|------------|--------------------------------------------|
/// | ref        | ref        | existing                                   |
/// | ref        | constraint | existing                                   |
/// | constraint | ref        | requested, if it satisfies the constraint  |
/// | constraint | constraint | both joined with `, ` unless one has `\|\|` |
///
/// Conflicts are reported through `ops`, once per run.
pub async fn determine_dependency<R: VcsRepo>(
    repo: &R,
    existing: &Dependency,
    requested: &Dependency,
    source: &str,
    ops: &OperationContext,
) -> Dependency {
    let name = &existing.name;
    let (have, want) = (existing.reference.as_str(), requested.reference.as_str());
    let adopt = |reference: String| {
        let mut dep = existing.clone();
        dep.reference = reference;
        dep.pin.clear();
        dep
    };

    let have_is_ref = !have.starts_with('^') && repo.is_reference(have).await.unwrap_or(false);
    let want_is_ref = !want.starts_with('^') && repo.is_reference(want).await.unwrap_or(false);

    match (have_is_ref, want_is_ref) {
        (true, true) => {
            let same = match (repo.commit_id(have).await, repo.commit_id(want).await) {
                (Ok(a), Ok(b)) => a == b,
                _ => false,
            };
            if !same {
                ops.warn_once(format!(
                    "Conflict: {name} rev is currently {have}, but {source} wants {want}"
                ));
            }
            existing.clone()
        }
        (true, false) => {
            match Constraints::parse(want) {
                Ok(c) if c.matches_ref(have) => {
                    ops.info_once(format!("Keeping {name} {have} because it fits constraint '{want}'"));
                }
                Ok(_) => ops.warn_once(format!(
                    "Conflict: {name} version is {have}, but also asked for {want} by {source}"
                )),
                Err(_) => ops.warn_once(format!(
                    "Ignoring version {want} of {name} from {source}: not a reference or a valid constraint"
                )),
            }
            existing.clone()
        }
        (false, true) => match Constraints::parse(have) {
            Ok(c) if c.matches_ref(want) => {
                ops.info_once(format!("Using {name} {want} because it fits constraint '{have}'"));
                adopt(want.to_string())
            }
            Ok(_) => {
                ops.warn_once(format!(
                    "Conflict: {name} is constrained to {have}, but {source} wants {want}"
                ));
                existing.clone()
            }
            Err(_) => {
                ops.warn_once(format!("Replacing unusable version {have} of {name} with {want} from {source}"));
                adopt(want.to_string())
            }
        },
        (false, false) => match (Constraints::parse(have), Constraints::parse(want)) {
            (Err(_), _) => {
                ops.warn_once(format!("Replacing unusable version {have} of {name} with {want} from {source}"));
                adopt(want.to_string())
            }
            (Ok(_), Err(_)) => {
                ops.warn_once(format!(
                    "Ignoring version {want} of {name} from {source}: not a reference or a valid constraint"
                ));
                existing.clone()
            }
            (Ok(_), Ok(_)) if have == want => existing.clone(),
            (Ok(_), Ok(_)) if have.contains("||") || want.contains("||") => {
                ops.warn_once(format!(
                    "Conflict: cannot merge constraints '{have}' and '{want}' for {name}, keeping '{have}'"
                ));
                existing.clone()
            }
            (Ok(_), Ok(_)) => {
                let merged = format!("{have}, {want}");
                ops.info_once(format!("Merging constraints for {name} into '{merged}'"));
                adopt(merged)
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{FakeRemote, FakeVcs};
    use crate::vcs::VcsProvider;
    use tempfile::TempDir;

    const REMOTE: &str = "https://github.com/acme/lib";

    async fn cloned(vcs: &FakeVcs, temp: &TempDir) -> crate::test_utils::FakeRepo {
        let dep = Dependency::new("github.com/acme/lib");
        let repo = vcs.open(&dep, &temp.path().join("lib")).await.unwrap();
        repo.get().await.unwrap();
        repo
    }

    fn fake() -> FakeVcs {
        let vcs = FakeVcs::new();
        vcs.add_remote(
            REMOTE,
            FakeRemote::new().with_tags(&["v1.0.0", "v1.2.0", "v2.0.0"]).with_branches(&["develop"]),
        );
        vcs
    }

    #[tokio::test]
    async fn test_pin_caret_selects_highest_match() {
        let vcs = fake();
        let temp = TempDir::new().unwrap();
        let repo = cloned(&vcs, &temp).await;

        let mut dep = Dependency::new("github.com/acme/lib").with_reference("^1.0.0");
        pin(&repo, &mut dep).await.unwrap();
        assert_eq!(dep.pin, FakeVcs::revision(REMOTE, "v1.2.0"));
        assert_eq!(vcs.calls("update_version", REMOTE), 1);
    }

    #[tokio::test]
    async fn test_pin_empty_reference_uses_checkout() {
        let vcs = fake();
        let temp = TempDir::new().unwrap();
        let repo = cloned(&vcs, &temp).await;

        let mut dep = Dependency::new("github.com/acme/lib");
        pin(&repo, &mut dep).await.unwrap();
        assert_eq!(dep.pin, FakeVcs::revision(REMOTE, "master"));
        assert_eq!(vcs.calls("update_version", REMOTE), 0);
    }

    #[tokio::test]
    async fn test_pin_exact_revision_skips_constraint_parsing() {
        let vcs = fake();
        let temp = TempDir::new().unwrap();
        let repo = cloned(&vcs, &temp).await;
        let sha = FakeVcs::revision(REMOTE, "v1.0.0");

        let mut dep = Dependency::new("github.com/acme/lib").with_reference(sha.clone());
        pin(&repo, &mut dep).await.unwrap();
        assert_eq!(dep.pin, sha);
        assert_eq!(vcs.calls("tags", REMOTE), 0);
        assert_eq!(vcs.calls("branches", REMOTE), 0);
    }

    #[tokio::test]
    async fn test_pin_is_stable_and_skips_checkout_when_current() {
        let vcs = fake();
        let temp = TempDir::new().unwrap();
        let repo = cloned(&vcs, &temp).await;

        let mut dep = Dependency::new("github.com/acme/lib").with_reference("v2.0.0");
        pin(&repo, &mut dep).await.unwrap();
        let first = dep.pin.clone();

        // Already pinned
        pin(&repo, &mut dep).await.unwrap();
        assert_eq!(vcs.calls("update_version", REMOTE), 1);

        dep.pin.clear();
        pin(&repo, &mut dep).await.unwrap();
        assert_eq!(dep.pin, first);
        assert_eq!(vcs.calls("update_version", REMOTE), 1);
    }

    #[tokio::test]
    async fn test_pin_failures_leave_dep_unpinned() {
        let vcs = fake();
        let temp = TempDir::new().unwrap();
        let repo = cloned(&vcs, &temp).await;

        let mut invalid = Dependency::new("github.com/acme/lib").with_reference("no-such-branch");
        let err = pin(&repo, &mut invalid).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GroveError>(),
            Some(GroveError::InvalidVersionConstraint { .. })
        ));
        assert!(invalid.pin.is_empty());

        let mut unmatched = Dependency::new("github.com/acme/lib").with_reference("^3.0");
        assert!(pin(&repo, &mut unmatched).await.is_err());
        assert!(unmatched.pin.is_empty());
    }

    async fn decide(existing: &str, requested: &str) -> (Dependency, OperationContext) {
        let vcs = fake();
        let temp = TempDir::new().unwrap();
        let repo = vcs.open(&Dependency::new("github.com/acme/lib"), &temp.path().join("lib")).await.unwrap();
        let ops = OperationContext::new();
        let mut have = Dependency::new("github.com/acme/lib").with_reference(existing);
        have.pin = "stale".to_string();
        let want = Dependency::new("github.com/acme/lib").with_reference(requested);
        let chosen = determine_dependency(&repo, &have, &want, "github.com/other/app", &ops).await;
        (chosen, ops)
    }

    #[tokio::test]
    async fn test_determine_ref_vs_ref_keeps_existing() {
        let (chosen, ops) = decide("v1.0.0", "develop").await;
        assert_eq!(chosen.reference, "v1.0.0");
        assert_eq!(ops.warning_count(), 1);
    }

    #[tokio::test]
    async fn test_determine_ref_vs_constraint_keeps_existing() {
        let (chosen, ops) = decide("v1.2.0", "^1.0").await;
        assert_eq!(chosen.reference, "v1.2.0");
        assert_eq!(ops.warning_count(), 0);

        let (chosen, ops) = decide("v2.0.0", "^1.0").await;
        assert_eq!(chosen.reference, "v2.0.0");
        assert_eq!(ops.warning_count(), 1);
    }

    #[tokio::test]
    async fn test_determine_constraint_vs_ref_adopts_satisfying_ref() {
        let (chosen, _) = decide("^1.0", "v1.2.0").await;
        assert_eq!(chosen.reference, "v1.2.0");
        assert!(chosen.pin.is_empty());

        let (chosen, ops) = decide("^1.0", "v2.0.0").await;
        assert_eq!(chosen.reference, "^1.0");
        assert_eq!(ops.warning_count(), 1);
    }

    #[tokio::test]
    async fn test_determine_constraint_vs_constraint_merges() {
        let (chosen, _) = decide("^1.0", ">=1.1").await;
        assert_eq!(chosen.reference, "^1.0, >=1.1");
        assert!(chosen.pin.is_empty());

        let (chosen, ops) = decide("^1.0 || ^2.0", ">=1.1").await;
        assert_eq!(chosen.reference, "^1.0 || ^2.0");
        assert_eq!(ops.warning_count(), 1);
    }

    #[tokio::test]
    async fn test_determine_invalid_references() {
        let (chosen, _) = decide("not a version", "^1.0").await;
        assert_eq!(chosen.reference, "^1.0");

        let (chosen, _) = decide("^1.0", "also not a version").await;
        assert_eq!(chosen.reference, "^1.0");
    }
}
