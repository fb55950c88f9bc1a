//! Filesystem allow-list enforced by landlock.
//!
//! A [`Ruleset`] owns the kernel ruleset descriptor while rules are added.
//! [`Ruleset::restrict_self`] consumes it, seals the domain onto the calling
//! process and closes the descriptor. What comes back is a [`SealedRuleset`],
//! which has no way to add rules, so a sealed sandbox can never be widened.
//!
//! Only ABI 1 access rights are used; they cover every category this crate grants.

use std::fmt;
use std::ops::{BitAnd, BitOr};
use std::os::fd::{AsFd, OwnedFd};
use std::path::{Path, PathBuf};

use crate::error::{Result, SetupError};
use crate::sandbox::PolicyKernel;

/// Landlock filesystem access rights (`LANDLOCK_ACCESS_FS_*`).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AccessFs(u64);

impl AccessFs {
    pub const EXECUTE: Self = Self(1 << 0);
    pub const WRITE_FILE: Self = Self(1 << 1);
    pub const READ_FILE: Self = Self(1 << 2);
    pub const READ_DIR: Self = Self(1 << 3);
    pub const REMOVE_DIR: Self = Self(1 << 4);
    pub const REMOVE_FILE: Self = Self(1 << 5);
    pub const MAKE_CHAR: Self = Self(1 << 6);
    pub const MAKE_DIR: Self = Self(1 << 7);
    pub const MAKE_REG: Self = Self(1 << 8);
    pub const MAKE_SOCK: Self = Self(1 << 9);
    pub const MAKE_FIFO: Self = Self(1 << 10);
    pub const MAKE_BLOCK: Self = Self(1 << 11);
    pub const MAKE_SYM: Self = Self(1 << 12);

    /// Every category a ruleset created here arbitrates.
    pub const HANDLED: Self = Self((1 << 13) - 1);

    /// Granted by [`Ruleset::allow_read`].
    pub const READ: Self = Self::READ_FILE;

    /// Granted by [`Ruleset::allow_read_write`].
    pub const READ_WRITE: Self = Self::READ_FILE
        .union(Self::WRITE_FILE)
        .union(Self::MAKE_REG)
        .union(Self::REMOVE_FILE);

    const NAMES: [(&'static str, AccessFs); 13] = [
        ("execute", Self::EXECUTE),
        ("write_file", Self::WRITE_FILE),
        ("read_file", Self::READ_FILE),
        ("read_dir", Self::READ_DIR),
        ("remove_dir", Self::REMOVE_DIR),
        ("remove_file", Self::REMOVE_FILE),
        ("make_char", Self::MAKE_CHAR),
        ("make_dir", Self::MAKE_DIR),
        ("make_reg", Self::MAKE_REG),
        ("make_sock", Self::MAKE_SOCK),
        ("make_fifo", Self::MAKE_FIFO),
        ("make_block", Self::MAKE_BLOCK),
        ("make_sym", Self::MAKE_SYM),
    ];

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn bits(self) -> u64 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for AccessFs {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl BitAnd for AccessFs {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl fmt::Debug for AccessFs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = Self::NAMES
            .iter()
            .filter(|(_, bit)| self.contains(*bit))
            .map(|(name, _)| *name)
            .collect();
        if names.is_empty() {
            f.write_str("(none)")
        } else {
            f.write_str(&names.join("|"))
        }
    }
}

/// One allow rule as it was handed to the kernel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LandlockRule {
    pub path: PathBuf,
    pub access: AccessFs,
}

/// An unsealed landlock ruleset.
///
/// Sealing consumes the ruleset, so adding a rule afterwards or sealing a
/// second time does not compile:
///
/// ```compile_fail
/// use script_jail::sandbox::{LinuxKernel, Ruleset};
///
/// let kernel = LinuxKernel;
/// let ruleset = Ruleset::create(&kernel).unwrap();
/// let _sealed = ruleset.restrict_self().unwrap();
/// ruleset.restrict_self().unwrap();
/// ```
pub struct Ruleset<'k, K: PolicyKernel> {
    kernel: &'k K,
    fd: OwnedFd,
    handled: AccessFs,
    rules: Vec<LandlockRule>,
}

impl<'k, K: PolicyKernel> Ruleset<'k, K> {
    /// Oldest landlock ABI accepted.
    pub const MIN_ABI: u32 = 1;

    /// Create a ruleset handling [`AccessFs::HANDLED`].
    ///
    /// Fails when landlock is missing or older than [`Self::MIN_ABI`].
    pub fn create(kernel: &'k K) -> Result<Self> {
        let abi = kernel
            .landlock_abi_version()
            .map_err(|source| SetupError::Landlock {
                op: "landlock ABI version",
                source,
            })?;
        if abi < Self::MIN_ABI {
            return Err(SetupError::LandlockUnsupported {
                found: abi,
                required: Self::MIN_ABI,
            });
        }
        tracing::debug!(abi, "landlock available");

        let handled = AccessFs::HANDLED;
        let fd = kernel
            .landlock_create_ruleset(handled)
            .map_err(|source| SetupError::Landlock {
                op: "landlock_create_ruleset",
                source,
            })?;

        Ok(Self {
            kernel,
            fd,
            handled,
            rules: Vec::new(),
        })
    }

    /// Allow `access` at and beneath `path`.
    ///
    /// The path is resolved with `O_PATH` and the descriptor is closed before
    /// returning. A path that does not resolve is an error.
    pub fn allow(&mut self, path: impl AsRef<Path>, access: AccessFs) -> Result<()> {
        let path = path.as_ref();
        let access = access & self.handled;

        let parent = self
            .kernel
            .open_path(path)
            .map_err(|source| SetupError::LandlockPath {
                op: "open",
                path: path.to_path_buf(),
                source,
            })?;

        self.kernel
            .landlock_add_path_rule(self.fd.as_fd(), parent.as_fd(), access)
            .map_err(|source| SetupError::LandlockPath {
                op: "landlock_add_rule",
                path: path.to_path_buf(),
                source,
            })?;
        drop(parent);

        tracing::debug!(path = %path.display(), ?access, "landlock rule added");
        self.rules.push(LandlockRule {
            path: path.to_path_buf(),
            access,
        });
        Ok(())
    }

    pub fn allow_read(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.allow(path, AccessFs::READ)
    }

    pub fn allow_read_write(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.allow(path, AccessFs::READ_WRITE)
    }

    pub fn handled(&self) -> AccessFs {
        self.handled
    }

    pub fn rules(&self) -> &[LandlockRule] {
        &self.rules
    }

    /// Seal the ruleset onto the calling process and close its descriptor.
    pub fn restrict_self(self) -> Result<SealedRuleset> {
        self.kernel
            .landlock_restrict_self(self.fd.as_fd())
            .map_err(|source| SetupError::Landlock {
                op: "landlock_restrict_self",
                source,
            })?;
        drop(self.fd);

        tracing::debug!(rules = self.rules.len(), "landlock ruleset sealed");
        Ok(SealedRuleset { rules: self.rules })
    }
}

/// A ruleset that is in force. Only remembers what it granted.
#[derive(Debug)]
pub struct SealedRuleset {
    rules: Vec<LandlockRule>,
}

impl SealedRuleset {
    pub fn rules(&self) -> &[LandlockRule] {
        &self.rules
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::recording::{Call, RecordingKernel};

    #[test]
    fn test_handled_covers_every_category() {
        for (_, bit) in AccessFs::NAMES {
            assert!(AccessFs::HANDLED.contains(bit));
        }
        assert_eq!(AccessFs::HANDLED.bits(), 0x1fff);
    }

    #[test]
    fn test_read_write_set() {
        let rw = AccessFs::READ_WRITE;
        assert!(rw.contains(AccessFs::READ_FILE));
        assert!(rw.contains(AccessFs::WRITE_FILE));
        assert!(rw.contains(AccessFs::MAKE_REG));
        assert!(rw.contains(AccessFs::REMOVE_FILE));
        assert!(!rw.contains(AccessFs::EXECUTE));
        assert!(!rw.contains(AccessFs::MAKE_DIR));
    }

    #[test]
    fn test_debug_lists_names() {
        let access = AccessFs::READ_FILE | AccessFs::EXECUTE;
        assert_eq!(format!("{access:?}"), "execute|read_file");
        assert_eq!(format!("{:?}", AccessFs::empty()), "(none)");
    }

    #[test]
    fn test_create_rejects_missing_landlock() {
        let kernel = RecordingKernel::new().with_landlock_abi(0);
        match Ruleset::create(&kernel) {
            Err(SetupError::LandlockUnsupported { found, required }) => {
                assert_eq!(found, 0);
                assert_eq!(required, 1);
            }
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
        assert!(!kernel.calls().contains(&Call::LandlockCreateRuleset(AccessFs::HANDLED)));
    }

    #[test]
    fn test_allow_masks_to_handled_and_records_rule() {
        let kernel = RecordingKernel::new();
        let mut ruleset = Ruleset::create(&kernel).unwrap();
        ruleset.allow_read("/etc/localtime").unwrap();
        ruleset.allow_read_write("/tmp").unwrap();

        assert_eq!(ruleset.rules().len(), 2);
        assert_eq!(ruleset.rules()[0].access, AccessFs::READ);
        assert_eq!(ruleset.rules()[1].access, AccessFs::READ_WRITE);

        let sealed = ruleset.restrict_self().unwrap();
        assert_eq!(sealed.rules()[1].path, PathBuf::from("/tmp"));

        assert_eq!(
            kernel.calls(),
            vec![
                Call::LandlockAbiVersion,
                Call::LandlockCreateRuleset(AccessFs::HANDLED),
                Call::OpenPath(PathBuf::from("/etc/localtime")),
                Call::LandlockAddRule(PathBuf::from("/etc/localtime"), AccessFs::READ),
                Call::OpenPath(PathBuf::from("/tmp")),
                Call::LandlockAddRule(PathBuf::from("/tmp"), AccessFs::READ_WRITE),
                Call::LandlockRestrictSelf,
            ]
        );
    }

    #[test]
    fn test_allow_unresolvable_path_is_error() {
        let kernel = RecordingKernel::new().with_missing_path("/nope");
        let mut ruleset = Ruleset::create(&kernel).unwrap();
        let err = ruleset.allow_read("/nope").unwrap_err();
        assert!(matches!(err, SetupError::LandlockPath { op: "open", .. }));
        assert!(err.to_string().starts_with("open(/nope): "));
        assert!(ruleset.rules().is_empty());
    }
}
