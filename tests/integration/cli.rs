use predicates::prelude::*;

use super::Project;

#[test]
fn test_help_lists_commands() {
    let project = Project::new();
    project
        .grove()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("install"))
        .stdout(predicate::str::contains("update"))
        .stdout(predicate::str::contains("cache-clear"));
}

#[test]
fn test_missing_manifest_fails() {
    let project = Project::new();
    project
        .grove()
        .arg("install")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("grove.yaml not found"));
}

#[test]
fn test_unparsable_manifest_fails() {
    let project = Project::new();
    project.write("grove.yaml", "package: [unterminated\n");
    project
        .grove()
        .arg("update")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid manifest"));
}

#[test]
fn test_conflicting_duplicates_fail() {
    let project = Project::new();
    project.write(
        "grove.yaml",
        "package: proj\nimport:\n  - package: example.com/a\n    version: v1.0.0\n  - package: example.com/a\n    version: v2.0.0\n",
    );
    project
        .grove()
        .arg("update")
        .assert()
        .failure()
        .stderr(predicate::str::contains("example.com/a"));
}

#[test]
fn test_cache_clear_creates_empty_layout() {
    let project = Project::new();
    let stale = project.home.join("cache/src/https-example.com-a");
    std::fs::create_dir_all(&stale).unwrap();

    project.grove().arg("cache-clear").assert().success();

    assert!(!stale.exists());
    assert!(project.home.join("cache").is_dir());
}

#[test]
fn test_home_flag_overrides_environment() {
    let project = Project::new();
    let other = project.scratch().join("other-home");
    std::fs::create_dir_all(other.join("cache/src/x")).unwrap();

    project
        .grove()
        .arg("--home")
        .arg(&other)
        .arg("cache-clear")
        .assert()
        .success();

    assert!(!other.join("cache/src/x").exists());
}

#[test]
fn test_list_without_dependencies() {
    let project = Project::new();
    project.write("grove.yaml", "package: proj\n");
    project.write("main.go", "package main\n\nimport \"fmt\"\n\nfunc main() { fmt.Println() }\n");

    project
        .grove()
        .args(["list", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"missing\": []"));
}

#[test]
fn test_update_with_nothing_to_do() {
    let project = Project::new();
    project.write("grove.yaml", "package: proj\n");

    project.grove().arg("update").assert().success();

    let lock = project.read("grove.lock");
    assert!(lock.contains("hash:"));
    assert!(project.root.join("vendor").is_dir());
}
