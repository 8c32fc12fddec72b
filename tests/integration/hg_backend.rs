use grove::lockfile::Lockfile;
use grove::test_utils::{TestHg, go_source};

use super::Project;

#[test]
fn test_unversioned_hg_dependency_locks_tip() {
    if which::which("hg").is_err() {
        return;
    }
    let project = Project::new();
    let hg = TestHg::init_repo(project.scratch().join("remotes/lib")).unwrap();
    let tip = hg.commit_file("lib.go", &go_source("lib", &[]), "initial").unwrap();

    project.write(
        "grove.yaml",
        &format!(
            "package: example.com/proj\nimport:\n  - package: example.com/lib\n    repo: {}\n    vcs: hg\n",
            hg.url()
        ),
    );
    project.write("main.go", &go_source("main", &["example.com/lib"]));
    project.grove().arg("update").assert().success();

    let lock = Lockfile::from_yaml(&project.read("grove.lock")).unwrap();
    let version = &lock.imports[0].version;
    assert!(!version.chars().all(|c| c == '0'));
    assert!(tip.starts_with(version.as_str()));
    assert!(project.root.join("vendor/example.com/lib/lib.go").exists());
}
