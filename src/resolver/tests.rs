use super::*;
use crate::test_utils::go_source;
use tempfile::TempDir;

const PROJECT: &str = "github.com/acme/proj";

/// A project directory with a vendor tree and a private GOPATH.
struct Sandbox {
    _dir: TempDir,
    project: PathBuf,
    gopath: PathBuf,
    home: PathBuf,
}

impl Sandbox {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let project = dir.path().join("proj");
        let gopath = dir.path().join("gopath");
        let home = dir.path().join("home");
        for d in [&project, &gopath, &home] {
            std::fs::create_dir_all(d).unwrap();
        }
        Self {
            _dir: dir,
            project,
            gopath,
            home,
        }
    }

    fn write(&self, rel: &str, content: &str) {
        let path = self.project.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn vendor(&self, pkg: &str, imports: &[&str]) {
        let name = pkg.rsplit('/').next().unwrap();
        self.write(&format!("vendor/{pkg}/{name}.go"), &go_source(name, imports));
    }

    fn on_gopath(&self, pkg: &str) {
        let dir = self.gopath.join("src").join(pkg);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("x.go"), go_source("x", &[])).unwrap();
    }

    fn context(&self) -> GroveContext {
        GroveContext::new(&self.home, &self.project)
    }

    fn build(&self) -> BuildContext {
        BuildContext {
            goroot: None,
            gopath: vec![self.gopath.clone()],
        }
    }
}

fn resolver<'a>(
    sb: &Sandbox,
    ctx: &GroveContext,
    discovery: &'a ImportDiscovery,
) -> Resolver<'a, DefaultMissingPackageHandler, DefaultVersionHandler> {
    Resolver::new(
        ctx,
        discovery,
        DefaultMissingPackageHandler::new(ctx.vendor_dir()),
        DefaultVersionHandler,
    )
    .with_build_context(sb.build())
}

fn names(deps: &[Dependency]) -> Vec<&str> {
    deps.iter().map(|d| d.name.as_str()).collect()
}

#[test]
fn test_find_pkg_classification() {
    let sb = Sandbox::new();
    sb.vendor("github.com/v/pkg", &[]);
    sb.on_gopath("github.com/g/pkg");
    let ctx = sb.context();
    let discovery = ImportDiscovery::offline();
    let mut r = resolver(&sb, &ctx, &discovery);
    let config = Config::new(PROJECT);

    assert_eq!(r.find_pkg(&config, "C").loc, PkgLoc::Cgo);
    assert_eq!(r.find_pkg(&config, "./internal").loc, PkgLoc::Relative);
    assert_eq!(r.find_pkg(&config, "../sibling").loc, PkgLoc::Relative);
    assert_eq!(r.find_pkg(&config, "appengine/datastore").loc, PkgLoc::Appengine);
    assert_eq!(r.find_pkg(&config, "appengine_internal").loc, PkgLoc::Appengine);
    assert_eq!(r.find_pkg(&config, "github.com/acme/proj/sub").loc, PkgLoc::Local);
    assert_eq!(r.find_pkg(&config, "github.com/v/pkg").loc, PkgLoc::Vendor);
    assert_eq!(r.find_pkg(&config, "github.com/g/pkg").loc, PkgLoc::Gopath);
    assert_eq!(r.find_pkg(&config, "net/http").loc, PkgLoc::Goroot);
    assert_eq!(r.find_pkg(&config, "github.com/nowhere/pkg").loc, PkgLoc::Unknown);

    let info = r.find_pkg(&config, "github.com/v/pkg");
    assert_eq!(info.path, Some(sb.project.join("vendor/github.com/v/pkg")));
}

#[test]
fn test_vendor_wins_over_gopath() {
    let sb = Sandbox::new();
    sb.vendor("github.com/both/pkg", &[]);
    sb.on_gopath("github.com/both/pkg");
    let ctx = sb.context();
    let discovery = ImportDiscovery::offline();
    let mut r = resolver(&sb, &ctx, &discovery);

    let info = r.find_pkg(&Config::new(PROJECT), "github.com/both/pkg");
    assert_eq!(info.loc, PkgLoc::Vendor);
}

#[test]
fn test_unknown_is_not_memoized() {
    let sb = Sandbox::new();
    let ctx = sb.context();
    let discovery = ImportDiscovery::offline();
    let mut r = resolver(&sb, &ctx, &discovery);
    let config = Config::new(PROJECT);

    assert_eq!(r.find_pkg(&config, "github.com/late/pkg").loc, PkgLoc::Unknown);
    sb.vendor("github.com/late/pkg", &[]);
    assert_eq!(r.find_pkg(&config, "github.com/late/pkg").loc, PkgLoc::Vendor);
}

#[tokio::test]
async fn test_resolve_local_shallow() {
    let sb = Sandbox::new();
    sb.write("main.go", &go_source("main", &["fmt", "github.com/a/b", "github.com/acme/proj/internal", "C"]));
    sb.write("internal/in.go", &go_source("internal", &["github.com/c/d"]));
    sb.write("main_test.go", &go_source("main", &["testing", "github.com/t/x", "github.com/a/b"]));
    sb.write("testdata/fixture.go", &go_source("fixture", &["github.com/skip/testdata"]));
    sb.write("_scratch/s.go", &go_source("s", &["github.com/skip/underscore"]));
    sb.write(".hidden/h.go", &go_source("h", &["github.com/skip/dot"]));
    sb.write("tools/gen.go", &go_source("tools", &["github.com/skip/excluded"]));
    sb.vendor("github.com/skip/vendored", &["github.com/skip/from/vendor"]);

    let ctx = sb.context().with_resolve_test(true);
    let discovery = ImportDiscovery::offline();
    let mut r = resolver(&sb, &ctx, &discovery);
    let mut config = Config::new(PROJECT);
    config.exclude_dirs = vec!["tools".to_string()];

    let (deps, test_deps) = r.resolve_local(&mut config, false).await.unwrap();
    assert_eq!(deps, vec!["github.com/a/b", "github.com/c/d"]);
    assert_eq!(test_deps, vec!["github.com/t/x"]);
    // Shallow mode leaves the manifest alone
    assert!(config.imports.is_empty());
}

#[tokio::test]
async fn test_resolve_local_skips_tests_unless_asked() {
    let sb = Sandbox::new();
    sb.write("main.go", &go_source("main", &["github.com/a/b"]));
    sb.write("main_test.go", &go_source("main", &["github.com/t/x"]));

    let ctx = sb.context().with_resolve_test(false);
    let discovery = ImportDiscovery::offline();
    let mut r = resolver(&sb, &ctx, &discovery);
    let mut config = Config::new(PROJECT);

    let (deps, test_deps) = r.resolve_local(&mut config, false).await.unwrap();
    assert_eq!(deps, vec!["github.com/a/b"]);
    assert!(test_deps.is_empty());
}

#[tokio::test]
async fn test_resolve_local_deep_follows_vendor() {
    let sb = Sandbox::new();
    sb.write("main.go", &go_source("main", &["github.com/a/b"]));
    sb.write("main_test.go", &go_source("main", &["github.com/t/x"]));
    sb.vendor("github.com/a/b", &["github.com/e/f/sub", "github.com/g/missing", "os"]);
    sb.vendor("github.com/e/f/sub", &[]);
    sb.vendor("github.com/t/x", &[]);

    let ctx = sb.context().with_resolve_test(true);
    let discovery = ImportDiscovery::offline();
    let mut r = resolver(&sb, &ctx, &discovery);
    let mut config = Config::new(PROJECT);

    let (deps, test_deps) = r.resolve_local(&mut config, true).await.unwrap();
    assert_eq!(deps, vec!["github.com/a/b", "github.com/e/f/sub"]);
    assert_eq!(test_deps, vec!["github.com/t/x"]);

    assert_eq!(names(&config.imports), vec!["github.com/a/b", "github.com/e/f"]);
    assert_eq!(config.imports.get_dep("github.com/e/f").unwrap().subpackages, vec!["sub"]);
    assert_eq!(names(&config.dev_imports), vec!["github.com/t/x"]);

    let (handler, _) = r.into_handlers();
    assert_eq!(handler.missing, vec!["github.com/g/missing"]);
}

#[tokio::test]
async fn test_resolve_all_queues_subpackages() {
    let sb = Sandbox::new();
    sb.vendor("github.com/a/b", &[]);
    sb.vendor("github.com/a/b/sub", &["github.com/h/i"]);
    sb.vendor("github.com/h/i", &["github.com/a/b"]);

    let ctx = sb.context();
    let discovery = ImportDiscovery::offline();
    let mut r = resolver(&sb, &ctx, &discovery);
    let mut config = Config::new(PROJECT);
    let mut dep = Dependency::new("github.com/a/b");
    dep.add_subpackage("sub");
    config.imports.push(dep.clone());

    let reached = r.resolve_all(&mut config, &[dep], false).await.unwrap();
    assert_eq!(reached, vec!["github.com/a/b", "github.com/a/b/sub", "github.com/h/i"]);
    assert_eq!(names(&config.imports), vec!["github.com/a/b", "github.com/h/i"]);
    assert_eq!(config.imports[0].subpackages, vec!["sub"]);
}

#[tokio::test]
async fn test_ignored_packages_are_not_followed() {
    let sb = Sandbox::new();
    sb.vendor("github.com/a/b", &["github.com/private/thing/sub"]);
    sb.vendor("github.com/private/thing/sub", &[]);

    let ctx = sb.context();
    let discovery = ImportDiscovery::offline();
    let mut r = resolver(&sb, &ctx, &discovery);
    let mut config = Config::new(PROJECT);
    config.ignore = vec!["github.com/private/thing".to_string()];

    let reached = r
        .resolve_all(&mut config, &[Dependency::new("github.com/a/b")], false)
        .await
        .unwrap();
    assert_eq!(reached, vec!["github.com/a/b"]);
    assert_eq!(names(&config.imports), vec!["github.com/a/b"]);
}

/// Materializes missing packages into vendor, counting calls.
struct FetchingHandler {
    inner: DefaultMissingPackageHandler,
    vendor: PathBuf,
    not_found_calls: Vec<String>,
}

impl MissingPackageHandler for FetchingHandler {
    async fn not_found(&mut self, _config: &mut Config, pkg: &str, _add_test: bool) -> Result<bool> {
        self.not_found_calls.push(pkg.to_string());
        let dir = self.vendor.join(pkg);
        std::fs::create_dir_all(&dir)?;
        std::fs::write(dir.join("f.go"), go_source("f", &[]))?;
        Ok(true)
    }

    async fn on_gopath(&mut self, config: &mut Config, pkg: &str, add_test: bool) -> Result<bool> {
        self.inner.on_gopath(config, pkg, add_test).await
    }

    async fn in_vendor(&mut self, config: &mut Config, pkg: &str, add_test: bool) -> Result<bool> {
        self.inner.in_vendor(config, pkg, add_test).await
    }

    fn pkg_path(&self, config: &Config, pkg: &str) -> PathBuf {
        self.inner.pkg_path(config, pkg)
    }
}

/// Counts the packages it is told about.
#[derive(Default)]
struct RecordingVersions {
    processed: Vec<String>,
    set: Vec<String>,
}

impl VersionHandler for RecordingVersions {
    async fn process(&mut self, _config: &mut Config, pkg: &str) -> Result<()> {
        self.processed.push(pkg.to_string());
        Ok(())
    }

    async fn set_version(&mut self, _config: &mut Config, pkg: &str, _add_test: bool) -> Result<()> {
        self.set.push(pkg.to_string());
        Ok(())
    }
}

#[tokio::test]
async fn test_handler_fetch_requeues_once() {
    let sb = Sandbox::new();
    sb.write("main.go", &go_source("main", &["github.com/fetch/me", "github.com/a/b"]));
    sb.vendor("github.com/a/b", &["github.com/fetch/me"]);

    let ctx = sb.context();
    let discovery = ImportDiscovery::offline();
    let handler = FetchingHandler {
        inner: DefaultMissingPackageHandler::new(ctx.vendor_dir()),
        vendor: ctx.vendor_dir().to_path_buf(),
        not_found_calls: Vec::new(),
    };
    let mut r = Resolver::new(&ctx, &discovery, handler, RecordingVersions::default()).with_build_context(sb.build());
    let mut config = Config::new(PROJECT);

    let (deps, _) = r.resolve_local(&mut config, true).await.unwrap();
    assert_eq!(deps, vec!["github.com/a/b", "github.com/fetch/me"]);

    let (handler, versions) = r.into_handlers();
    assert_eq!(handler.not_found_calls, vec!["github.com/fetch/me"]);
    assert_eq!(versions.processed, vec!["github.com/a/b", "github.com/fetch/me"]);
    assert!(versions.set.is_empty());
}

#[tokio::test]
async fn test_version_handler_sees_discovered_imports() {
    let sb = Sandbox::new();
    sb.vendor("github.com/a/b", &["github.com/c/d"]);
    sb.vendor("github.com/c/d", &[]);

    let ctx = sb.context();
    let discovery = ImportDiscovery::offline();
    let mut r = Resolver::new(
        &ctx,
        &discovery,
        DefaultMissingPackageHandler::new(ctx.vendor_dir()),
        RecordingVersions::default(),
    )
    .with_build_context(sb.build());
    let mut config = Config::new(PROJECT);

    r.resolve_all(&mut config, &[Dependency::new("github.com/a/b")], false)
        .await
        .unwrap();
    let (_, versions) = r.into_handlers();
    assert_eq!(versions.set, vec!["github.com/c/d"]);
}

#[tokio::test]
async fn test_all_files_mode_walks_dependency_tree() {
    let sb = Sandbox::new();
    sb.vendor("github.com/a/b", &[]);
    sb.vendor("github.com/a/b/cmd/tool", &["github.com/only/in/tool"]);
    sb.vendor("github.com/only/in/tool", &[]);
    let deps = [Dependency::new("github.com/a/b")];
    let discovery = ImportDiscovery::offline();

    let ctx = sb.context();
    let mut r = resolver(&sb, &ctx, &discovery);
    let reached = r.resolve_all(&mut Config::new(PROJECT), &deps, false).await.unwrap();
    assert_eq!(reached, vec!["github.com/a/b"]);

    let ctx = sb.context().with_resolve_all_files(true);
    let mut r = resolver(&sb, &ctx, &discovery);
    let reached = r.resolve_all(&mut Config::new(PROJECT), &deps, false).await.unwrap();
    assert!(reached.contains(&"github.com/only/in/tool".to_string()));
}

#[tokio::test]
async fn test_normalize_name_prefers_declared_roots() {
    let discovery = ImportDiscovery::offline();
    let mut config = Config::new(PROJECT);
    config.imports.push(Dependency::new("example.com/a"));

    assert_eq!(
        normalize_name(&discovery, &config, "example.com/a/x/y").await,
        ("example.com/a".to_string(), "x/y".to_string())
    );
    assert_eq!(
        normalize_name(&discovery, &config, "github.com/o/r/sub").await,
        ("github.com/o/r".to_string(), "sub".to_string())
    );
    assert_eq!(
        normalize_name(&discovery, &config, "github.com/o/r").await,
        ("github.com/o/r".to_string(), String::new())
    );
}
