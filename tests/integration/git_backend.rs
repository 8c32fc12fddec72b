use grove::lockfile::Lockfile;
use grove::test_utils::{TestGit, go_source};
use predicates::prelude::*;

use super::Project;

fn git_available() -> bool {
    which::which("git").is_ok()
}

/// A library repository with tags v1.0.0, v1.1.0 and v2.0.0.
fn tagged_library(project: &Project) -> TestGit {
    let git = TestGit::init_repo(project.scratch().join("remotes/lib")).unwrap();
    git.write_file("lib.go", &go_source("lib", &[])).unwrap();
    for tag in ["v1.0.0", "v1.1.0", "v2.0.0"] {
        git.write_file("VERSION", tag).unwrap();
        git.add_all().unwrap();
        git.commit(&format!("release {tag}")).unwrap();
        git.tag(tag).unwrap();
    }
    git
}

fn manifest(project: &Project, git: &TestGit, version: &str) {
    project.write(
        "grove.yaml",
        &format!(
            "package: example.com/proj\nimport:\n  - package: example.com/lib\n    repo: {}\n    vcs: git\n    version: \"{}\"\n",
            git.url(),
            version
        ),
    );
}

#[test]
fn test_update_selects_highest_matching_tag() {
    if !git_available() {
        return;
    }
    let project = Project::new();
    let git = tagged_library(&project);
    manifest(&project, &git, "^1.0.0");
    project.write("main.go", &go_source("main", &["example.com/lib"]));

    project.grove().arg("update").assert().success();

    let lock = Lockfile::from_yaml(&project.read("grove.lock")).unwrap();
    assert_eq!(lock.imports[0].name, "example.com/lib");
    assert_eq!(lock.imports[0].version, git.rev_parse("v1.1.0^{commit}").unwrap());
    assert_eq!(project.read("vendor/example.com/lib/VERSION"), "v1.1.0");
    assert!(!project.root.join("vendor/example.com/lib/.git").exists());
}

#[test]
fn test_install_reproduces_lock() {
    if !git_available() {
        return;
    }
    let project = Project::new();
    let git = tagged_library(&project);
    manifest(&project, &git, "v1.0.0");

    project.grove().arg("update").assert().success();
    std::fs::remove_dir_all(project.root.join("vendor")).unwrap();

    // New commits upstream do not move a locked install
    git.commit_file("extra.go", &go_source("lib", &[]), "after lock").unwrap();
    project.grove().arg("install").assert().success();

    assert_eq!(project.read("vendor/example.com/lib/VERSION"), "v1.0.0");
    assert!(!project.root.join("vendor/example.com/lib/extra.go").exists());
}

#[test]
fn test_unsatisfiable_constraint_is_reported() {
    if !git_available() {
        return;
    }
    let project = Project::new();
    let git = tagged_library(&project);
    manifest(&project, &git, "^3.0.0");

    project
        .grove()
        .arg("update")
        .assert()
        .success()
        .stderr(predicate::str::contains("example.com/lib"));
}

#[test]
fn test_dropping_version_after_tag_locks_upstream_head() {
    if !git_available() {
        return;
    }
    let project = Project::new();
    let git = tagged_library(&project);
    git.commit_file("mid.go", &go_source("lib", &[]), "mid").unwrap();
    project.write("main.go", &go_source("main", &["example.com/lib"]));

    manifest(&project, &git, "v1.0.0");
    project.grove().arg("update").assert().success();

    let head = git.commit_file("new.go", &go_source("lib", &[]), "upstream").unwrap();
    manifest(&project, &git, "");
    project.grove().arg("update").assert().success();

    let lock = Lockfile::from_yaml(&project.read("grove.lock")).unwrap();
    assert_eq!(lock.imports[0].version, head);
    assert!(project.root.join("vendor/example.com/lib/new.go").exists());
}
