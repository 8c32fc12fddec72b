//! Global constants used throughout the grove codebase.
//!
//! Timeout durations, retry parameters, file names and platform tables that
//! are shared by more than one module live here.

use std::time::Duration;

/// Manifest file name.
pub const MANIFEST_FILE: &str = "grove.yaml";

/// Lock file name.
pub const LOCK_FILE: &str = "grove.lock";

/// Vendor directory name, relative to the project root.
pub const VENDOR_DIR: &str = "vendor";

/// Environment variable overriding the grove home directory.
pub const HOME_ENV: &str = "GROVE_HOME";

/// Default grove home directory name under the user's home.
pub const HOME_DIR_NAME: &str = ".grove";

/// Number of workers in the installer pool.
///
/// Repository fetches are network bound, so this is independent of CPU count.
pub const CONCURRENT_WORKERS: usize = 20;

/// Default timeout for a single VCS command (5 minutes).
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(300);

/// Timeout for hosted-API and `go-get` discovery requests.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for cache lock acquisition (120 seconds).
///
/// A lock is held across a full fetch and update of one repository, so this
/// has to cover a slow clone.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(120);

/// Starting delay for exponential backoff (100ms).
pub const STARTING_BACKOFF_DELAY_MS: u64 = 100;

/// Maximum backoff delay (2s).
pub const MAX_BACKOFF_DELAY_MS: u64 = 2_000;

/// Attempts made for a network-bound VCS fetch.
pub const FETCH_RETRY_ATTEMPTS: usize = 3;

/// Operating systems tried by the iterative import scan.
pub const GO_OS_LIST: &[&str] = &[
    "android",
    "darwin",
    "dragonfly",
    "freebsd",
    "linux",
    "nacl",
    "netbsd",
    "openbsd",
    "plan9",
    "solaris",
    "windows",
];

/// Architectures tried by the iterative import scan.
pub const GO_ARCH_LIST: &[&str] = &[
    "386",
    "amd64",
    "amd64p32",
    "arm",
    "armbe",
    "arm64",
    "arm64be",
    "ppc64",
    "ppc64le",
    "mips",
    "mipsle",
    "mips64",
    "mips64le",
    "mips64p32",
    "mips64p32le",
    "ppc",
    "s390",
    "s390x",
    "sparc",
    "sparc64",
];
