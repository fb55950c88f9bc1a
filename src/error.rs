//! Error types for the jail launchers.
//!
//! Three classes exist and they never mix:
//! - [`SetupError`]: the sandbox could not be established. Always fatal, the process aborts.
//! - [`ConfigError`]: bad command line, input or settings file. Exit code 1, no sandbox step has run yet.
//! - [`GuestError`]: classification of what the sandboxed script did, reported by the runtime bootstrap.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failure while building the sandbox. Never recovered from.
#[derive(Error, Debug)]
pub enum SetupError {
    #[error("capability restriction (CAP_SETPCAP) is not supported by this kernel")]
    CapabilityUnsupported,

    #[error("{op}: {source}")]
    Capability {
        op: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("prctl(PR_SET_NO_NEW_PRIVS, 1): {0}")]
    NoNewPrivs(#[source] io::Error),

    #[error("{op}({name}): {source}")]
    Rlimit {
        op: &'static str,
        name: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("rlimit catalog does not match the kernel: {0}")]
    RlimitCatalog(String),

    #[error("landlock ABI {found} is too old, need at least ABI {required}")]
    LandlockUnsupported { found: u32, required: u32 },

    #[error("{op}: {source}")]
    Landlock {
        op: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("{op}({}): {source}", .path.display())]
    LandlockPath {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("seccomp(SECCOMP_SET_MODE_FILTER): {0}")]
    Seccomp(#[source] io::Error),

    #[error("{op}: {source}")]
    Bootstrap {
        op: String,
        #[source]
        source: io::Error,
    },
}

/// Errors from parsing a `NAME=VALUE` resource limit override.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RlimitParseError {
    #[error("unable to parse: {0} (unexpected end)")]
    MalformedInput(String),

    #[error("unable to parse: {0} (no such limit found)")]
    NoSuchLimit(String),

    #[error("unable to parse: {0} (value not an unsigned int)")]
    MalformedValue(String),
}

/// Configuration problems detected before any sandbox step. Exit code 1.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("no input file specified")]
    MissingInput,

    #[error("unable to access input file: {}: {source}", .path.display())]
    InputInaccessible {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Rlimit(#[from] RlimitParseError),

    #[error("input is not a regular file: {}", .path.display())]
    InputNotFile { path: PathBuf },

    #[error("settings file {}: {reason}", .path.display())]
    ConfigFile { path: PathBuf, reason: String },
}

/// How a guest program ended, as classified at the runtime-bootstrap boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuestError {
    None,
    Syntax,
    Runtime,
    HostInit,
}

impl GuestError {
    /// Exit code for a guest outcome; `None` for classes that must abort instead.
    pub fn exit_code(self) -> Option<u8> {
        match self {
            GuestError::None => Some(0),
            GuestError::Syntax | GuestError::Runtime => Some(EXIT_GUEST_ERROR),
            GuestError::HostInit => None,
        }
    }
}

/// Exit code for usage and configuration errors.
pub const EXIT_USAGE: u8 = 1;

/// Exit code for a load-time or run-time error inside the guest program.
pub const EXIT_GUEST_ERROR: u8 = 2;

/// What the orchestrator hands back to `main` when it does not reach the guest.
#[derive(Error, Debug)]
pub enum LaunchError {
    /// Clean exit before the sandbox was built (help, version, configuration errors).
    #[error("{message}")]
    Exit { code: u8, message: String, to_stderr: bool },

    #[error(transparent)]
    Setup(#[from] SetupError),
}

impl From<ConfigError> for LaunchError {
    fn from(err: ConfigError) -> Self {
        LaunchError::Exit {
            code: EXIT_USAGE,
            message: format!("error: {err}"),
            to_stderr: true,
        }
    }
}

pub type Result<T> = std::result::Result<T, SetupError>;

/// Report a setup failure and abort. Nothing unwinds past this point.
pub fn fatal(err: &SetupError) -> ! {
    tracing::error!(error = %err, "sandbox setup failed");
    eprintln!("fatal: {err}");
    std::process::abort()
}
