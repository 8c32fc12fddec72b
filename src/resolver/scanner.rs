//! Static import analysis of Go source directories.
//!
//! Only the file header is read: leading comments (for build constraints),
//! the package clause and the import declarations. Scanning stops at the
//! first top-level declaration that is not an import.

use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::debug;

use super::build::{Constraint, Target, matches_file_name};
use crate::constants::{GO_ARCH_LIST, GO_OS_LIST};

/// What a directory's Go files declare.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageScan {
    pub name: String,
    pub imports: BTreeSet<String>,
    /// Imports only seen in `_test.go` files.
    pub test_imports: BTreeSet<String>,
}

/// Header of one Go file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    pub package: String,
    pub imports: Vec<String>,
    pub constraint: Constraint,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Tok {
    Ident(String),
    Str(String),
    Open,
    Close,
    Semi,
    Dot,
    Other,
    Eof,
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    comments: Vec<String>,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            chars: src.chars().peekable(),
            comments: Vec::new(),
        }
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.chars.peek() {
                Some(c) if c.is_whitespace() => {
                    self.chars.next();
                }
                Some('/') => {
                    let mut ahead = self.chars.clone();
                    ahead.next();
                    match ahead.peek() {
                        Some('/') => {
                            let line: String = self.chars.by_ref().take_while(|&c| c != '\n').collect();
                            self.comments.push(line);
                        }
                        Some('*') => {
                            self.chars.next();
                            self.chars.next();
                            let mut prev = '\0';
                            for c in self.chars.by_ref() {
                                if prev == '*' && c == '/' {
                                    break;
                                }
                                prev = c;
                            }
                        }
                        _ => return,
                    }
                }
                _ => return,
            }
        }
    }

    fn next(&mut self) -> Tok {
        self.skip_trivia();
        let Some(c) = self.chars.next() else {
            return Tok::Eof;
        };
        match c {
            '(' => Tok::Open,
            ')' => Tok::Close,
            ';' => Tok::Semi,
            '.' => Tok::Dot,
            '"' => {
                let mut value = String::new();
                while let Some(c) = self.chars.next() {
                    match c {
                        '"' | '\n' => break,
                        '\\' => {
                            if let Some(escaped) = self.chars.next() {
                                value.push(escaped);
                            }
                        }
                        c => value.push(c),
                    }
                }
                Tok::Str(value)
            }
            '`' => Tok::Str(self.chars.by_ref().take_while(|&c| c != '`').collect()),
            c if c.is_alphabetic() || c == '_' => {
                let mut ident = String::from(c);
                while let Some(&c) = self.chars.peek() {
                    if c.is_alphanumeric() || c == '_' {
                        ident.push(c);
                        self.chars.next();
                    } else {
                        break;
                    }
                }
                Tok::Ident(ident)
            }
            _ => Tok::Other,
        }
    }
}

/// Parse the header of a Go file. Returns `None` when there is no package clause.
pub fn parse_file(src: &str) -> Option<FileHeader> {
    let mut lexer = Lexer::new(src);
    if lexer.next() != Tok::Ident("package".into()) {
        return None;
    }
    let header_comments = std::mem::take(&mut lexer.comments);
    let Tok::Ident(package) = lexer.next() else {
        return None;
    };

    let mut imports = Vec::new();
    loop {
        match lexer.next() {
            Tok::Semi => continue,
            Tok::Ident(kw) if kw == "import" => match lexer.next() {
                Tok::Open => loop {
                    match lexer.next() {
                        Tok::Close | Tok::Eof => break,
                        Tok::Str(path) => imports.push(path),
                        Tok::Ident(_) | Tok::Dot | Tok::Semi => {}
                        _ => break,
                    }
                },
                Tok::Str(path) => imports.push(path),
                Tok::Ident(_) | Tok::Dot => {
                    if let Tok::Str(path) = lexer.next() {
                        imports.push(path);
                    }
                }
                _ => break,
            },
            _ => break,
        }
    }

    Some(FileHeader {
        package,
        imports,
        constraint: Constraint::from_header(&header_comments),
    })
}

/// Scan outcome for one evaluation target.
enum DirScan {
    Empty,
    Package(PackageScan),
    /// More than one non-test package name survived the constraints.
    Conflict(Vec<String>),
}

struct SourceFile {
    name: String,
    header: FileHeader,
}

fn read_sources(dir: &Path) -> Result<Vec<SourceFile>> {
    let mut files = Vec::new();
    let entries = std::fs::read_dir(dir).with_context(|| format!("Failed to read directory {}", dir.display()))?;
    for entry in entries {
        let entry = entry.with_context(|| format!("Failed to read directory {}", dir.display()))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.ends_with(".go") || name.starts_with('_') || name.starts_with('.') {
            continue;
        }
        if !entry.file_type()?.is_file() {
            continue;
        }
        let path = entry.path();
        let src = std::fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))?;
        match parse_file(&src) {
            Some(header) if header.package != "documentation" => files.push(SourceFile { name, header }),
            Some(_) => {}
            None => debug!("No package clause in {}, skipping", path.display()),
        }
    }
    files.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(files)
}

fn scan_files(files: &[SourceFile], target: Target<'_>) -> DirScan {
    let mut names = BTreeSet::new();
    let mut scan = PackageScan::default();
    let mut any = false;

    for file in files {
        if !matches_file_name(&file.name, target) || !file.header.constraint.matches(target) {
            continue;
        }
        any = true;
        let is_test = file.name.ends_with("_test.go");
        if is_test {
            scan.test_imports.extend(file.header.imports.iter().cloned());
        } else {
            names.insert(file.header.package.clone());
            scan.imports.extend(file.header.imports.iter().cloned());
        }
    }

    if !any {
        return DirScan::Empty;
    }
    if names.len() > 1 {
        return DirScan::Conflict(names.into_iter().collect());
    }
    scan.name = names.into_iter().next().unwrap_or_default();
    scan.test_imports.retain(|imp| !scan.imports.contains(imp));
    DirScan::Package(scan)
}

/// Scan the Go package in `dir`.
///
/// Every file except those tagged `ignore` is considered. When that leaves
/// more than one package name, the directory is rescanned once per supported
/// OS and architecture and the import sets are unioned. `Ok(None)` means the
/// directory has no buildable source.
pub fn scan_dir(dir: &Path) -> Result<Option<PackageScan>> {
    let files = read_sources(dir)?;
    match scan_files(&files, Target::AllFiles) {
        DirScan::Empty => Ok(None),
        DirScan::Package(scan) => Ok(Some(scan)),
        DirScan::Conflict(names) => {
            debug!(
                "Found packages {} in {}, scanning each platform",
                names.join(", "),
                dir.display()
            );
            iterative_scan(&files, dir)
        }
    }
}

fn iterative_scan(files: &[SourceFile], dir: &Path) -> Result<Option<PackageScan>> {
    let mut merged: Option<PackageScan> = None;
    for goos in GO_OS_LIST {
        for goarch in GO_ARCH_LIST {
            let target = Target::Platform { goos, goarch };
            let DirScan::Package(scan) = scan_files(files, target) else {
                continue;
            };
            match merged.as_mut() {
                None => merged = Some(scan),
                Some(all) => {
                    all.imports.extend(scan.imports);
                    all.test_imports.extend(scan.test_imports);
                }
            }
        }
    }
    match merged {
        Some(mut scan) => {
            let imports = scan.imports.clone();
            scan.test_imports.retain(|imp| !imports.contains(imp));
            Ok(Some(scan))
        }
        None => anyhow::bail!("Multiple packages in {} on every platform", dir.display()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::go_source;
    use tempfile::TempDir;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_file_import_forms() {
        let src = r#"// Package a does things.
//go:build linux

package a // trailing

import "fmt"
import alias "github.com/acme/one"
import . `github.com/acme/two`
import (
    // grouped
    "github.com/acme/three" /* inline */
    _ "github.com/acme/four"; "os"
)

import "github.com/acme/five"

func A() {}
"#;
        let header = parse_file(src).unwrap();
        assert_eq!(header.package, "a");
        assert_eq!(
            header.imports,
            vec![
                "fmt",
                "github.com/acme/one",
                "github.com/acme/two",
                "github.com/acme/three",
                "github.com/acme/four",
                "os",
                "github.com/acme/five",
            ]
        );
        assert!(!header.constraint.matches(Target::Platform {
            goos: "windows",
            goarch: "amd64"
        }));
    }

    #[test]
    fn test_parse_file_stops_at_first_declaration() {
        let src = "package b\nimport \"fmt\"\nvar x = 1\nimport \"late\"\n";
        assert_eq!(parse_file(src).unwrap().imports, vec!["fmt"]);
        assert!(parse_file("// no package here\n").is_none());
    }

    #[test]
    fn test_scan_dir_splits_test_imports() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.go"), go_source("a", &["github.com/x/y", "fmt"])).unwrap();
        std::fs::write(dir.path().join("a_test.go"), go_source("a_test", &["github.com/x/y", "github.com/t/z"])).unwrap();
        std::fs::write(dir.path().join("_skip.go"), go_source("a", &["github.com/skip/me"])).unwrap();
        std::fs::write(dir.path().join("README.md"), "not go").unwrap();

        let scan = scan_dir(dir.path()).unwrap().unwrap();
        assert_eq!(scan.name, "a");
        assert_eq!(scan.imports, set(&["fmt", "github.com/x/y"]));
        assert_eq!(scan.test_imports, set(&["github.com/t/z"]));
    }

    #[test]
    fn test_scan_dir_without_source() {
        let dir = TempDir::new().unwrap();
        assert_eq!(scan_dir(dir.path()).unwrap(), None);

        std::fs::write(dir.path().join("gen.go"), "// +build ignore\n\npackage main\n").unwrap();
        assert_eq!(scan_dir(dir.path()).unwrap(), None);
    }

    #[test]
    fn test_ignored_example_does_not_conflict() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("lib.go"), go_source("lib", &["github.com/a/b"])).unwrap();
        std::fs::write(
            dir.path().join("example.go"),
            "//go:build ignore\n\npackage main\n\nimport \"github.com/ignored/dep\"\n",
        )
        .unwrap();
        let scan = scan_dir(dir.path()).unwrap().unwrap();
        assert_eq!(scan.name, "lib");
        assert_eq!(scan.imports, set(&["github.com/a/b"]));
    }

    #[test]
    fn test_iterative_scan_unions_platforms() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("lib.go"), go_source("lib", &["github.com/common/dep"])).unwrap();
        std::fs::write(
            dir.path().join("lib_windows.go"),
            "package lib\n\nimport \"github.com/win/dep\"\n",
        )
        .unwrap();
        // A second package name only on plan9 forces the per-platform scan
        std::fs::write(
            dir.path().join("tool_plan9.go"),
            "package main\n\nimport \"github.com/plan9/tool\"\n",
        )
        .unwrap();

        let scan = scan_dir(dir.path()).unwrap().unwrap();
        assert_eq!(scan.name, "lib");
        assert!(scan.imports.contains("github.com/common/dep"));
        assert!(scan.imports.contains("github.com/win/dep"));
        assert!(!scan.imports.contains("github.com/plan9/tool"));
    }

    #[test]
    fn test_conflict_on_every_platform_is_an_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.go"), go_source("a", &[])).unwrap();
        std::fs::write(dir.path().join("b.go"), go_source("b", &[])).unwrap();
        assert!(scan_dir(dir.path()).is_err());
    }
}
