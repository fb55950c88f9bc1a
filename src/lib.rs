//! script-jail - least-privilege launchers for untrusted scripts.
//!
//! Each launcher seals the calling process before the script runtime starts:
//! - capabilities dropped, no_new_privs set
//! - resource limits clamped
//! - filesystem restricted with landlock to the script and a few fixed paths
//! - syscalls restricted with a compiled-in seccomp allow-list
//!
//! Linux only.

#[cfg(not(target_os = "linux"))]
compile_error!("script-jail relies on landlock and seccomp and only builds for Linux");

pub mod cli;
pub mod config;
pub mod error;
pub mod launcher;
pub mod rlimit;
pub mod sandbox;
pub mod utils;

pub use config::LauncherConfig;
pub use error::{ConfigError, GuestError, LaunchError, Result, SetupError};
pub use launcher::{Launcher, Orchestrator, SealedSandbox};

/// Re-export commonly used items.
pub mod prelude {
    pub use crate::error::{LaunchError, Result, SetupError};
    pub use crate::launcher::{GuestOutcome, Launcher, Orchestrator, RuntimeBootstrap};
    pub use crate::sandbox::{AccessFs, LinuxKernel, PolicyKernel};
}
