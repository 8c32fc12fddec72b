use grove::constants::{LOCK_FILE, MANIFEST_FILE};
use grove::core::GroveContext;
use grove::installer::{Installer, project};
use grove::lockfile::Lockfile;
use grove::manifest::{Config, Dependency};
use grove::test_utils::{FakeRemote, FakeVcs, go_source, init_test_logging};
use std::time::Duration;

use super::Project;

fn context(project: &Project) -> GroveContext {
    GroveContext::new(&project.home, &project.root).with_verbosity(true, false)
}

fn installer(project: &Project, vcs: &FakeVcs) -> Installer<FakeVcs> {
    Installer::new(context(project), vcs.clone()).with_retry_delay(Duration::from_millis(1))
}

fn manifest(project: &Project, deps: &[Dependency]) -> Config {
    let mut config = Config::new("proj");
    config.imports.extend(deps.iter().cloned());
    config.save(&project.root.join(MANIFEST_FILE)).unwrap();
    config
}

#[tokio::test]
async fn test_default_branch_is_locked() {
    init_test_logging(None);
    let project = Project::new();
    let vcs = FakeVcs::new();
    vcs.add_remote("https://example.com/a", FakeRemote::new().with_tags(&["v1.0.0", "v1.1.0"]));
    manifest(&project, &[Dependency::new("example.com/a")]);

    project::update(&installer(&project, &vcs)).await.unwrap();

    let lock = Lockfile::load(&project.root.join(LOCK_FILE)).unwrap().unwrap();
    assert_eq!(lock.imports.len(), 1);
    assert_eq!(lock.imports[0].name, "example.com/a");
    assert_eq!(lock.imports[0].version, FakeVcs::revision("https://example.com/a", "master"));
}

#[tokio::test]
async fn test_second_run_changes_nothing() {
    init_test_logging(None);
    let project = Project::new();
    let vcs = FakeVcs::new();
    vcs.add_remote("https://example.com/a", FakeRemote::new().with_file("a.go", &go_source("a", &[])));
    vcs.add_remote(
        "https://example.com/b",
        FakeRemote::new().with_tags(&["v1.0.0", "v1.2.0", "v2.0.0"]),
    );
    manifest(
        &project,
        &[
            Dependency::new("example.com/a"),
            Dependency::new("example.com/b").with_reference("^1.0.0"),
        ],
    );
    let installer = installer(&project, &vcs);

    project::update(&installer).await.unwrap();
    let first = project.read(LOCK_FILE);

    vcs.reset_calls();
    let outcome = project::install(&installer).await.unwrap();

    assert!(outcome.failures.is_empty());
    assert!(!outcome.lock_written);
    assert_eq!(vcs.mutation_count(), 0);
    assert_eq!(project.read(LOCK_FILE), first);
    assert!(project.root.join("vendor/example.com/a/a.go").is_file());
    assert!(project.root.join("vendor/example.com/b").is_dir());
}

#[tokio::test]
async fn test_duplicate_declarations_collapse() {
    init_test_logging(None);
    let project = Project::new();
    project.write(
        MANIFEST_FILE,
        "package: proj\nimport:\n  - package: example.com/a\n    subpackages: [x]\n  - package: example.com/a\n    subpackages: [y, x]\n",
    );
    let vcs = FakeVcs::new();
    vcs.add_remote("https://example.com/a", FakeRemote::new());

    project::update(&installer(&project, &vcs)).await.unwrap();

    let lock = Lockfile::load(&project.root.join(LOCK_FILE)).unwrap().unwrap();
    assert_eq!(lock.imports.len(), 1);
    assert_eq!(lock.imports[0].subpackages, vec!["x", "y"]);
    assert_eq!(vcs.calls("get", "https://example.com/a"), 1);
}

#[tokio::test]
async fn test_many_dependencies_fetch_once_each() {
    init_test_logging(None);
    let project = Project::new();
    let vcs = FakeVcs::new().with_delay(Duration::from_millis(2));
    let deps: Vec<Dependency> = (0..25).map(|i| Dependency::new(format!("example.com/d{i}"))).collect();
    for dep in &deps {
        vcs.add_remote(&dep.remote(), FakeRemote::new());
    }
    manifest(&project, &deps);
    let installer = Installer::new(context(&project).with_concurrency(6), vcs.clone());

    let outcome = project::update(&installer).await.unwrap();

    assert!(outcome.failures.is_empty());
    for dep in &deps {
        assert_eq!(vcs.calls("get", &dep.remote()), 1, "{}", dep.name);
    }
    assert_eq!(outcome.lock.unwrap().imports.len(), deps.len());
}

#[tokio::test]
async fn test_skip_test_leaves_dev_imports_out() {
    init_test_logging(None);
    let project = Project::new();
    let vcs = FakeVcs::new();
    vcs.add_remote("https://example.com/a", FakeRemote::new());
    vcs.add_remote("https://example.com/testing", FakeRemote::new());
    let mut config = Config::new("proj");
    config.imports.push(Dependency::new("example.com/a"));
    config.dev_imports.push(Dependency::new("example.com/testing"));
    config.save(&project.root.join(MANIFEST_FILE)).unwrap();

    let installer = Installer::new(context(&project).with_resolve_test(false), vcs.clone());
    let outcome = project::update(&installer).await.unwrap();

    let lock = outcome.lock.unwrap();
    assert_eq!(lock.imports.len(), 1);
    assert!(lock.dev_imports.is_empty());
    assert_eq!(vcs.calls("get", "https://example.com/testing"), 0);
}

#[tokio::test]
async fn test_one_broken_dependency_does_not_block_others() {
    init_test_logging(None);
    let project = Project::new();
    let vcs = FakeVcs::new();
    vcs.add_remote("https://example.com/a", FakeRemote::new().with_file("a.go", &go_source("a", &[])));
    vcs.add_remote("https://example.com/broken", FakeRemote::new().failing());
    manifest(
        &project,
        &[Dependency::new("example.com/broken"), Dependency::new("example.com/a")],
    );

    let outcome = project::update(&installer(&project, &vcs)).await.unwrap();

    let failed: Vec<&str> = outcome.failures.iter().map(|(name, _)| name.as_str()).collect();
    assert!(failed.contains(&"example.com/broken"));
    assert!(!failed.contains(&"example.com/a"));
    assert!(project.root.join("vendor/example.com/a/a.go").is_file());
}
