//! Helpers for tests that seal a real process.
//!
//! Sealing is irreversible, so every such test runs in a forked child and the
//! parent only inspects how the child ended.

#![allow(dead_code, unused_macros)]

use std::panic::{catch_unwind, AssertUnwindSafe};

use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{fork, ForkResult};
use script_jail::sandbox::{LinuxKernel, PolicyKernel};

/// Run `check` in a forked child and return how the child ended.
///
/// The child exits 0 when `check` returns `Ok`, 1 with the message on stderr
/// when it returns `Err`, and 101 when it panics.
pub fn in_child<F>(check: F) -> WaitStatus
where
    F: FnOnce() -> Result<(), String>,
{
    match unsafe { fork() }.expect("fork") {
        ForkResult::Child => {
            let code = match catch_unwind(AssertUnwindSafe(check)) {
                Ok(Ok(())) => 0,
                Ok(Err(message)) => {
                    eprintln!("child: {message}");
                    1
                }
                Err(_) => 101,
            };
            unsafe { libc::_exit(code) }
        }
        ForkResult::Parent { child } => waitpid(child, None).expect("waitpid"),
    }
}

/// Assert the child exited 0.
pub fn assert_child_ok(status: WaitStatus) {
    match status {
        WaitStatus::Exited(_, 0) => {}
        other => panic!("child failed: {other:?}"),
    }
}

pub fn landlock_available() -> bool {
    matches!(LinuxKernel.landlock_abi_version(), Ok(abi) if abi >= 1)
}

/// Skip the calling test when the kernel has no landlock.
macro_rules! require_landlock {
    () => {
        if !common::landlock_available() {
            eprintln!("skipping: landlock is not available on this kernel");
            return;
        }
    };
}

pub fn denied(result: std::io::Result<impl Sized>) -> bool {
    matches!(result, Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied)
}
