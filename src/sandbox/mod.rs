//! Self-restriction primitives and the kernel interface they are built on.
//!
//! Every primitive talks to the kernel only through [`PolicyKernel`]. The real
//! implementation is [`linux::LinuxKernel`]; tests substitute a recording kernel
//! so sequencing can be checked without sealing the test process.

pub mod linux;
pub mod privilege;

#[cfg(test)]
pub(crate) mod recording;

use std::io;
use std::os::fd::{BorrowedFd, OwnedFd};
use std::path::Path;

use nix::sys::resource::Resource;

pub use linux::landlock::{AccessFs, Ruleset, SealedRuleset};
pub use linux::seccomp::{SeccompProgram, SockFilter};
pub use linux::LinuxKernel;
pub use privilege::{CapabilityDropper, DropOutcome, PrivilegeLock};

/// Raw kernel entry points used to build the sandbox.
///
/// Implementations do no logging and no policy; they translate one call into one
/// syscall (or one library call) and report the OS error.
pub trait PolicyKernel {
    /// Whether the running kernel knows `CAP_SETPCAP`.
    fn capability_restriction_supported(&self) -> io::Result<bool>;

    /// Whether `CAP_SETPCAP` is in the effective set of the calling thread.
    fn has_effective_setpcap(&self) -> io::Result<bool>;

    /// Lock the securebits and empty every capability set. Irreversible.
    ///
    /// The error carries the name of the step that failed.
    fn enter_no_privilege_mode(&self) -> Result<(), (&'static str, io::Error)>;

    fn set_no_new_privs(&self) -> io::Result<()>;

    /// Current `(soft, hard)` limits.
    fn get_rlimit(&self, resource: Resource) -> io::Result<(u64, u64)>;

    fn set_rlimit(&self, resource: Resource, soft: u64, hard: u64) -> io::Result<()>;

    fn landlock_abi_version(&self) -> io::Result<u32>;

    fn landlock_create_ruleset(&self, handled: AccessFs) -> io::Result<OwnedFd>;

    fn landlock_add_path_rule(
        &self,
        ruleset: BorrowedFd<'_>,
        parent: BorrowedFd<'_>,
        access: AccessFs,
    ) -> io::Result<()>;

    fn landlock_restrict_self(&self, ruleset: BorrowedFd<'_>) -> io::Result<()>;

    /// `open(path, O_PATH | O_CLOEXEC)`.
    fn open_path(&self, path: &Path) -> io::Result<OwnedFd>;

    fn seccomp_set_mode_filter(&self, program: &SeccompProgram) -> io::Result<()>;
}
