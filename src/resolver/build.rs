//! Go build constraints: `//go:build` expressions, legacy `// +build` lines
//! and `_GOOS`/`_GOARCH` file name suffixes.
//!
//! Files are evaluated in one of two modes. [`Target::AllFiles`] is the
//! default scan and keeps every file except those tagged `ignore`.
//! [`Target::Platform`] evaluates constraints the way the Go toolchain would
//! for one operating system and architecture.

use std::path::PathBuf;
use std::process::Command;

use crate::constants::{GO_ARCH_LIST, GO_OS_LIST};

/// Newest `go1.N` release tag considered satisfied.
const NEWEST_GO_MINOR: u32 = 23;

const UNIX_OS: &[&str] = &[
    "aix", "android", "darwin", "dragonfly", "freebsd", "hurd", "illumos", "ios", "linux", "netbsd", "openbsd",
    "solaris",
];

/// How build constraints are evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target<'a> {
    /// Every file counts unless tagged `ignore`.
    AllFiles,
    /// Evaluate for one `GOOS`/`GOARCH` pair.
    Platform { goos: &'a str, goarch: &'a str },
}

impl Target<'_> {
    /// Whether `tag` is satisfied on this platform.
    fn has_tag(&self, tag: &str) -> bool {
        let Self::Platform { goos, goarch } = *self else {
            return tag != "ignore";
        };
        if tag == goos || tag == goarch || tag == "gc" || tag == "cgo" {
            return true;
        }
        if tag == "unix" {
            return UNIX_OS.contains(&goos);
        }
        if goos == "android" && tag == "linux" {
            return true;
        }
        tag.strip_prefix("go1.")
            .and_then(|minor| minor.parse::<u32>().ok())
            .is_some_and(|minor| (1..=NEWEST_GO_MINOR).contains(&minor))
    }
}

/// A boolean build expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Tag(String),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

impl Expr {
    fn eval(&self, has: &dyn Fn(&str) -> bool) -> bool {
        match self {
            Self::Tag(tag) => has(tag),
            Self::Not(inner) => !inner.eval(has),
            Self::And(a, b) => a.eval(has) && b.eval(has),
            Self::Or(a, b) => a.eval(has) || b.eval(has),
        }
    }

    /// Whether `tag` appears without negation.
    fn mentions_positively(&self, tag: &str) -> bool {
        match self {
            Self::Tag(t) => t == tag,
            Self::Not(_) => false,
            Self::And(a, b) | Self::Or(a, b) => a.mentions_positively(tag) || b.mentions_positively(tag),
        }
    }

    /// Parse a `//go:build` expression. Malformed input gives `None`.
    pub fn parse(input: &str) -> Option<Self> {
        let tokens = lex(input)?;
        let mut parser = ExprParser { tokens, pos: 0 };
        let expr = parser.or()?;
        (parser.pos == parser.tokens.len()).then_some(expr)
    }

    /// Convert legacy `// +build` lines: space-separated options are ORed,
    /// comma-separated terms ANDed, and separate lines ANDed.
    fn from_plus_build(lines: &[String]) -> Option<Self> {
        let mut line_exprs = Vec::new();
        for line in lines {
            let options = line.split_whitespace().map(|option| {
                option
                    .split(',')
                    .map(|term| match term.strip_prefix('!') {
                        Some(tag) => Self::Not(Box::new(Self::Tag(tag.to_string()))),
                        None => Self::Tag(term.to_string()),
                    })
                    .reduce(|a, b| Self::And(Box::new(a), Box::new(b)))
            });
            let line_expr = options.flatten().reduce(|a, b| Self::Or(Box::new(a), Box::new(b)))?;
            line_exprs.push(line_expr);
        }
        line_exprs.into_iter().reduce(|a, b| Self::And(Box::new(a), Box::new(b)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Tag(String),
    Not,
    And,
    Or,
    Open,
    Close,
}

fn lex(input: &str) -> Option<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' => {
                chars.next();
            }
            '!' => {
                chars.next();
                tokens.push(Token::Not);
            }
            '(' => {
                chars.next();
                tokens.push(Token::Open);
            }
            ')' => {
                chars.next();
                tokens.push(Token::Close);
            }
            '&' | '|' => {
                chars.next();
                if chars.next() != Some(c) {
                    return None;
                }
                tokens.push(if c == '&' { Token::And } else { Token::Or });
            }
            c if c.is_alphanumeric() || c == '_' || c == '.' => {
                let mut tag = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' || c == '.' {
                        tag.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Tag(tag));
            }
            _ => return None,
        }
    }
    Some(tokens)
}

struct ExprParser {
    tokens: Vec<Token>,
    pos: usize,
}

impl ExprParser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn or(&mut self) -> Option<Expr> {
        let mut left = self.and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            left = Expr::Or(Box::new(left), Box::new(self.and()?));
        }
        Some(left)
    }

    fn and(&mut self) -> Option<Expr> {
        let mut left = self.not()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            left = Expr::And(Box::new(left), Box::new(self.not()?));
        }
        Some(left)
    }

    fn not(&mut self) -> Option<Expr> {
        match self.peek()?.clone() {
            Token::Not => {
                self.pos += 1;
                Some(Expr::Not(Box::new(self.not()?)))
            }
            Token::Open => {
                self.pos += 1;
                let inner = self.or()?;
                if self.peek() != Some(&Token::Close) {
                    return None;
                }
                self.pos += 1;
                Some(inner)
            }
            Token::Tag(tag) => {
                self.pos += 1;
                Some(Expr::Tag(tag))
            }
            _ => None,
        }
    }
}

/// Build constraint declared in a file header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Constraint {
    expr: Option<Expr>,
}

impl Constraint {
    /// Extract the constraint from the comment lines preceding the package
    /// clause. `//go:build` wins over `// +build`.
    pub fn from_header(lines: &[String]) -> Self {
        let mut plus_build = Vec::new();
        for line in lines {
            let Some(text) = line.trim().strip_prefix("//") else {
                continue;
            };
            if let Some(expr) = text.strip_prefix("go:build") {
                return Self {
                    expr: Expr::parse(expr.trim()),
                };
            }
            if let Some(rest) = text.trim_start().strip_prefix("+build")
                && (rest.is_empty() || rest.starts_with([' ', '\t']))
            {
                plus_build.push(rest.trim().to_string());
            }
        }
        Self {
            expr: Expr::from_plus_build(&plus_build),
        }
    }

    /// Whether a file with this constraint is part of the build for `target`.
    pub fn matches(&self, target: Target<'_>) -> bool {
        let Some(expr) = &self.expr else {
            return true;
        };
        match target {
            Target::AllFiles => !expr.mentions_positively("ignore"),
            Target::Platform { .. } => expr.eval(&|tag| target.has_tag(tag)),
        }
    }
}

/// Whether the `_GOOS`, `_GOARCH` or `_GOOS_GOARCH` suffix of `file_name`
/// allows it on `target`. Names without a known suffix always match.
pub fn matches_file_name(file_name: &str, target: Target<'_>) -> bool {
    if target == Target::AllFiles {
        return true;
    }
    let stem = file_name.strip_suffix(".go").unwrap_or(file_name);
    // Everything before the first underscore is the free-form name
    let Some(index) = stem.find('_') else {
        return true;
    };
    let stem = &stem[index..];
    let stem = stem.strip_suffix("_test").unwrap_or(stem);

    let parts: Vec<&str> = stem.split('_').collect();
    let n = parts.len();
    let known_os = |s: &str| GO_OS_LIST.contains(&s) || s == "illumos" || s == "ios" || s == "aix";
    let known_arch = |s: &str| GO_ARCH_LIST.contains(&s) || s == "wasm" || s == "riscv64" || s == "loong64";

    if n >= 2 && known_os(parts[n - 2]) && known_arch(parts[n - 1]) {
        return target.has_tag(parts[n - 2]) && target.has_tag(parts[n - 1]);
    }
    if n >= 1 && (known_os(parts[n - 1]) || known_arch(parts[n - 1])) {
        return target.has_tag(parts[n - 1]);
    }
    true
}

/// Locations of the Go standard library and `GOPATH` workspaces.
#[derive(Debug, Clone, Default)]
pub struct BuildContext {
    pub goroot: Option<PathBuf>,
    pub gopath: Vec<PathBuf>,
}

impl BuildContext {
    /// Read `GOROOT` and `GOPATH` from the environment, asking the `go` tool
    /// for `GOROOT` when it is unset. `GOPATH` defaults to `~/go`.
    pub fn from_env() -> Self {
        let goroot = std::env::var_os("GOROOT")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .or_else(go_env_goroot);

        let gopath = match std::env::var_os("GOPATH").filter(|v| !v.is_empty()) {
            Some(value) => std::env::split_paths(&value).collect(),
            None => dirs::home_dir().map(|home| vec![home.join("go")]).unwrap_or_default(),
        };

        Self { goroot, gopath }
    }

    /// A context with no standard library or workspaces on disk.
    pub fn empty() -> Self {
        Self::default()
    }
}

fn go_env_goroot() -> Option<PathBuf> {
    let go = which::which("go").ok()?;
    let output = Command::new(go).args(["env", "GOROOT"]).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let root = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!root.is_empty()).then(|| PathBuf::from(root))
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINUX: Target<'static> = Target::Platform {
        goos: "linux",
        goarch: "amd64",
    };
    const WINDOWS: Target<'static> = Target::Platform {
        goos: "windows",
        goarch: "386",
    };

    fn header(lines: &[&str]) -> Constraint {
        Constraint::from_header(&lines.iter().map(|l| l.to_string()).collect::<Vec<_>>())
    }

    #[test]
    fn test_go_build_expressions() {
        let c = header(&["//go:build (linux || darwin) && !386"]);
        assert!(c.matches(LINUX));
        assert!(!c.matches(WINDOWS));
        assert!(c.matches(Target::AllFiles));

        assert!(header(&["//go:build unix"]).matches(LINUX));
        assert!(!header(&["//go:build unix"]).matches(WINDOWS));
        assert!(header(&["//go:build go1.18"]).matches(LINUX));
        assert!(header(&["//go:build linux"]).matches(Target::Platform {
            goos: "android",
            goarch: "arm"
        }));
    }

    #[test]
    fn test_plus_build_lines() {
        // Space is OR, comma is AND, lines are ANDed
        let c = header(&["// +build linux,amd64 windows", "// +build !386"]);
        assert!(c.matches(LINUX));
        assert!(!c.matches(WINDOWS));
        assert!(!c.matches(Target::Platform {
            goos: "darwin",
            goarch: "amd64"
        }));
    }

    #[test]
    fn test_go_build_wins_over_plus_build() {
        let c = header(&["//go:build windows", "// +build linux"]);
        assert!(c.matches(WINDOWS));
        assert!(!c.matches(LINUX));
    }

    #[test]
    fn test_ignore_tag_excludes_in_all_files_mode() {
        assert!(!header(&["// +build ignore"]).matches(Target::AllFiles));
        assert!(!header(&["//go:build ignore"]).matches(LINUX));
        assert!(header(&["//go:build !ignore"]).matches(Target::AllFiles));
        assert!(header(&["// just a comment"]).matches(Target::AllFiles));
        assert!(header(&[]).matches(WINDOWS));
    }

    #[test]
    fn test_malformed_expression() {
        assert_eq!(Expr::parse("linux &&"), None);
        assert_eq!(Expr::parse("(linux"), None);
        assert_eq!(Expr::parse("linux & amd64"), None);
        assert!(Expr::parse("!(a||b)&&c").is_some());
    }

    #[test]
    fn test_file_name_suffixes() {
        assert!(matches_file_name("sys_linux.go", LINUX));
        assert!(!matches_file_name("sys_linux.go", WINDOWS));
        assert!(matches_file_name("sys_windows_386.go", WINDOWS));
        assert!(!matches_file_name("sys_windows_amd64.go", WINDOWS));
        assert!(matches_file_name("sys_amd64_test.go", LINUX));
        assert!(matches_file_name("plain.go", WINDOWS));
        // No free-form prefix: the whole name is the prefix
        assert!(matches_file_name("linux.go", WINDOWS));
        assert!(matches_file_name("sys_linux.go", Target::AllFiles));
    }
}
