//! `PolicyKernel` backed by the running Linux kernel.
//!
//! Landlock and seccomp have no libc wrappers, so they go through
//! `libc::syscall` by number. Everything else uses `caps` and `nix`.

use std::io;
use std::os::fd::{AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};
use std::path::Path;

use caps::{CapSet, Capability};
use nix::fcntl::{self, OFlag};
use nix::sys::resource::{self, Resource};
use nix::sys::stat::Mode;

use super::landlock::AccessFs;
use super::seccomp::SeccompProgram;
use crate::sandbox::PolicyKernel;

const SYS_LANDLOCK_CREATE_RULESET: libc::c_long = 444;
const SYS_LANDLOCK_ADD_RULE: libc::c_long = 445;
const SYS_LANDLOCK_RESTRICT_SELF: libc::c_long = 446;

const LANDLOCK_CREATE_RULESET_VERSION: u32 = 1 << 0;
const LANDLOCK_RULE_PATH_BENEATH: u32 = 1;

const SECCOMP_SET_MODE_FILTER: libc::c_uint = 1;

// <linux/securebits.h>
const SECBIT_NOROOT: libc::c_ulong = 1 << 0;
const SECBIT_NOROOT_LOCKED: libc::c_ulong = 1 << 1;
const SECBIT_NO_SETUID_FIXUP: libc::c_ulong = 1 << 2;
const SECBIT_NO_SETUID_FIXUP_LOCKED: libc::c_ulong = 1 << 3;
const SECBIT_KEEP_CAPS_LOCKED: libc::c_ulong = 1 << 5;
const SECBIT_NO_CAP_AMBIENT_RAISE: libc::c_ulong = 1 << 6;
const SECBIT_NO_CAP_AMBIENT_RAISE_LOCKED: libc::c_ulong = 1 << 7;

/// ABI 1 layout. Later ABIs append fields; passing the short size stays valid.
#[repr(C)]
struct LandlockRulesetAttr {
    handled_access_fs: u64,
}

#[repr(C, packed)]
struct LandlockPathBeneathAttr {
    allowed_access: u64,
    parent_fd: i32,
}

fn errno_to_io(errno: nix::errno::Errno) -> io::Error {
    io::Error::from_raw_os_error(errno as i32)
}

fn caps_to_io(err: caps::errors::CapsError) -> io::Error {
    io::Error::new(io::ErrorKind::Other, err.to_string())
}

fn check(ret: libc::c_long) -> io::Result<libc::c_long> {
    if ret < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(ret)
    }
}

/// The real kernel. Stateless.
#[derive(Debug, Default, Clone, Copy)]
pub struct LinuxKernel;

impl PolicyKernel for LinuxKernel {
    fn capability_restriction_supported(&self) -> io::Result<bool> {
        let supported = caps::runtime::thread_all_supported();
        Ok(supported.contains(&Capability::CAP_SETPCAP))
    }

    fn has_effective_setpcap(&self) -> io::Result<bool> {
        caps::has_cap(None, CapSet::Effective, Capability::CAP_SETPCAP).map_err(caps_to_io)
    }

    fn enter_no_privilege_mode(&self) -> Result<(), (&'static str, io::Error)> {
        let bits = SECBIT_NOROOT
            | SECBIT_NOROOT_LOCKED
            | SECBIT_NO_SETUID_FIXUP
            | SECBIT_NO_SETUID_FIXUP_LOCKED
            | SECBIT_KEEP_CAPS_LOCKED
            | SECBIT_NO_CAP_AMBIENT_RAISE
            | SECBIT_NO_CAP_AMBIENT_RAISE_LOCKED;

        let ret = unsafe { libc::prctl(libc::PR_SET_SECUREBITS, bits, 0, 0, 0) };
        if ret != 0 {
            return Err(("prctl(PR_SET_SECUREBITS)", io::Error::last_os_error()));
        }

        // Bounding needs CAP_SETPCAP, so it goes before effective is emptied.
        let steps = [
            ("clear bounding set", CapSet::Bounding),
            ("clear ambient set", CapSet::Ambient),
            ("clear inheritable set", CapSet::Inheritable),
            ("clear effective set", CapSet::Effective),
            ("clear permitted set", CapSet::Permitted),
        ];
        for (op, set) in steps {
            caps::clear(None, set).map_err(|e| (op, caps_to_io(e)))?;
        }
        Ok(())
    }

    fn set_no_new_privs(&self) -> io::Result<()> {
        let ret = unsafe { libc::prctl(libc::PR_SET_NO_NEW_PRIVS, 1, 0, 0, 0) };
        if ret != 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }

    fn get_rlimit(&self, resource: Resource) -> io::Result<(u64, u64)> {
        let (soft, hard) = resource::getrlimit(resource).map_err(errno_to_io)?;
        Ok((soft as u64, hard as u64))
    }

    fn set_rlimit(&self, resource: Resource, soft: u64, hard: u64) -> io::Result<()> {
        resource::setrlimit(resource, soft as libc::rlim_t, hard as libc::rlim_t)
            .map_err(errno_to_io)
    }

    fn landlock_abi_version(&self) -> io::Result<u32> {
        // SAFETY: a null attribute with size 0 and the VERSION flag only queries the ABI.
        let ret = unsafe {
            libc::syscall(
                SYS_LANDLOCK_CREATE_RULESET,
                std::ptr::null::<LandlockRulesetAttr>(),
                0usize,
                LANDLOCK_CREATE_RULESET_VERSION,
            )
        };
        check(ret).map(|v| v as u32)
    }

    fn landlock_create_ruleset(&self, handled: AccessFs) -> io::Result<OwnedFd> {
        let attr = LandlockRulesetAttr {
            handled_access_fs: handled.bits(),
        };
        // SAFETY: attr is valid for the size passed.
        let ret = unsafe {
            libc::syscall(
                SYS_LANDLOCK_CREATE_RULESET,
                &attr as *const LandlockRulesetAttr,
                std::mem::size_of::<LandlockRulesetAttr>(),
                0u32,
            )
        };
        let fd = check(ret)?;
        // SAFETY: on success the kernel returned a fresh descriptor we now own.
        Ok(unsafe { OwnedFd::from_raw_fd(fd as RawFd) })
    }

    fn landlock_add_path_rule(
        &self,
        ruleset: BorrowedFd<'_>,
        parent: BorrowedFd<'_>,
        access: AccessFs,
    ) -> io::Result<()> {
        let attr = LandlockPathBeneathAttr {
            allowed_access: access.bits(),
            parent_fd: parent.as_raw_fd(),
        };
        // SAFETY: both descriptors are borrowed for the duration of the call.
        let ret = unsafe {
            libc::syscall(
                SYS_LANDLOCK_ADD_RULE,
                ruleset.as_raw_fd(),
                LANDLOCK_RULE_PATH_BENEATH,
                &attr as *const LandlockPathBeneathAttr,
                0u32,
            )
        };
        check(ret).map(|_| ())
    }

    fn landlock_restrict_self(&self, ruleset: BorrowedFd<'_>) -> io::Result<()> {
        // SAFETY: ruleset is a valid landlock ruleset descriptor.
        let ret = unsafe { libc::syscall(SYS_LANDLOCK_RESTRICT_SELF, ruleset.as_raw_fd(), 0u32) };
        check(ret).map(|_| ())
    }

    fn open_path(&self, path: &Path) -> io::Result<OwnedFd> {
        let fd = fcntl::open(path, OFlag::O_PATH | OFlag::O_CLOEXEC, Mode::empty())
            .map_err(errno_to_io)?;
        // SAFETY: open returned a fresh descriptor we now own.
        Ok(unsafe { OwnedFd::from_raw_fd(fd) })
    }

    fn seccomp_set_mode_filter(&self, program: &SeccompProgram) -> io::Result<()> {
        let prog = libc::sock_fprog {
            len: program.len() as libc::c_ushort,
            filter: program.instructions().as_ptr() as *mut libc::sock_filter,
        };
        // SAFETY: prog points at a static instruction array whose layout matches sock_filter.
        let ret = unsafe {
            libc::syscall(
                libc::SYS_seccomp,
                SECCOMP_SET_MODE_FILTER,
                0u32,
                &prog as *const libc::sock_fprog,
            )
        };
        check(ret).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_attr_layout() {
        assert_eq!(std::mem::size_of::<LandlockRulesetAttr>(), 8);
        assert_eq!(std::mem::size_of::<LandlockPathBeneathAttr>(), 12);
    }

    #[test]
    fn test_get_rlimit_reads_current_limits() {
        let (soft, hard) = LinuxKernel.get_rlimit(Resource::RLIMIT_NOFILE).unwrap();
        assert!(soft <= hard);
        assert!(soft > 0);
    }

    #[test]
    fn test_open_path_missing_file() {
        let err = LinuxKernel
            .open_path(Path::new("/nonexistent/script-jail-test"))
            .unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::ENOENT));
    }

    #[test]
    fn test_open_path_directory() {
        let dir = tempfile::tempdir().unwrap();
        let fd = LinuxKernel.open_path(dir.path()).unwrap();
        assert!(fd.as_raw_fd() >= 0);
    }
}
