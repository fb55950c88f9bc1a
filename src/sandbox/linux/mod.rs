//! Linux implementation of the sandbox primitives.
//!
//! - [`kernel`]: the `PolicyKernel` backed by real syscalls
//! - [`landlock`]: filesystem allow-list
//! - [`seccomp`]: syscall allow-list application

pub mod kernel;
pub mod landlock;
pub mod seccomp;

pub use kernel::LinuxKernel;
