//! A `PolicyKernel` that records calls instead of making them.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs::File;
use std::io;
use std::mem::discriminant;
use std::os::fd::{AsRawFd, BorrowedFd, OwnedFd, RawFd};
use std::path::{Path, PathBuf};

use nix::sys::resource::Resource;

use super::{AccessFs, PolicyKernel, SeccompProgram};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    CapabilityRestrictionSupported,
    HasEffectiveSetpcap,
    EnterNoPrivilegeMode,
    SetNoNewPrivs,
    GetRlimit(Resource),
    SetRlimit(Resource, u64, u64),
    LandlockAbiVersion,
    LandlockCreateRuleset(AccessFs),
    OpenPath(PathBuf),
    LandlockAddRule(PathBuf, AccessFs),
    LandlockRestrictSelf,
    SeccompSetModeFilter(&'static str),
}

pub struct RecordingKernel {
    calls: RefCell<Vec<Call>>,
    open: RefCell<HashMap<RawFd, PathBuf>>,
    rlimits: RefCell<HashMap<Resource, (u64, u64)>>,
    landlock_abi: u32,
    capability_support: bool,
    setpcap: bool,
    missing: Vec<PathBuf>,
    failing: Option<Call>,
}

impl RecordingKernel {
    pub const DEFAULT_LIMITS: (u64, u64) = (1024, 4096);

    pub fn new() -> Self {
        Self {
            calls: RefCell::new(Vec::new()),
            open: RefCell::new(HashMap::new()),
            rlimits: RefCell::new(HashMap::new()),
            landlock_abi: 3,
            capability_support: true,
            setpcap: false,
            missing: Vec::new(),
            failing: None,
        }
    }

    pub fn with_landlock_abi(mut self, abi: u32) -> Self {
        self.landlock_abi = abi;
        self
    }

    pub fn with_capability_support(mut self, supported: bool) -> Self {
        self.capability_support = supported;
        self
    }

    pub fn with_setpcap(mut self, setpcap: bool) -> Self {
        self.setpcap = setpcap;
        self
    }

    /// `open_path` on this path fails with `ENOENT`.
    pub fn with_missing_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.missing.push(path.into());
        self
    }

    /// Every call of the same kind as `call` fails with `EPERM`.
    pub fn failing(mut self, call: Call) -> Self {
        self.failing = Some(call);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn limits(&self, resource: Resource) -> (u64, u64) {
        self.rlimits
            .borrow()
            .get(&resource)
            .copied()
            .unwrap_or(Self::DEFAULT_LIMITS)
    }

    fn record(&self, call: Call) -> io::Result<()> {
        let fail = self
            .failing
            .as_ref()
            .is_some_and(|f| discriminant(f) == discriminant(&call));
        self.calls.borrow_mut().push(call);
        if fail {
            Err(io::Error::from_raw_os_error(libc::EPERM))
        } else {
            Ok(())
        }
    }

    fn fresh_fd(&self, path: &Path) -> io::Result<OwnedFd> {
        let fd: OwnedFd = File::open("/dev/null")?.into();
        self.open.borrow_mut().insert(fd.as_raw_fd(), path.to_path_buf());
        Ok(fd)
    }
}

impl PolicyKernel for RecordingKernel {
    fn capability_restriction_supported(&self) -> io::Result<bool> {
        self.record(Call::CapabilityRestrictionSupported)?;
        Ok(self.capability_support)
    }

    fn has_effective_setpcap(&self) -> io::Result<bool> {
        self.record(Call::HasEffectiveSetpcap)?;
        Ok(self.setpcap)
    }

    fn enter_no_privilege_mode(&self) -> Result<(), (&'static str, io::Error)> {
        self.record(Call::EnterNoPrivilegeMode)
            .map_err(|e| ("prctl(PR_SET_SECUREBITS)", e))
    }

    fn set_no_new_privs(&self) -> io::Result<()> {
        self.record(Call::SetNoNewPrivs)
    }

    fn get_rlimit(&self, resource: Resource) -> io::Result<(u64, u64)> {
        self.record(Call::GetRlimit(resource))?;
        Ok(self.limits(resource))
    }

    fn set_rlimit(&self, resource: Resource, soft: u64, hard: u64) -> io::Result<()> {
        self.record(Call::SetRlimit(resource, soft, hard))?;
        self.rlimits.borrow_mut().insert(resource, (soft, hard));
        Ok(())
    }

    fn landlock_abi_version(&self) -> io::Result<u32> {
        self.record(Call::LandlockAbiVersion)?;
        Ok(self.landlock_abi)
    }

    fn landlock_create_ruleset(&self, handled: AccessFs) -> io::Result<OwnedFd> {
        self.record(Call::LandlockCreateRuleset(handled))?;
        self.fresh_fd(Path::new("landlock-ruleset"))
    }

    fn landlock_add_path_rule(
        &self,
        _ruleset: BorrowedFd<'_>,
        parent: BorrowedFd<'_>,
        access: AccessFs,
    ) -> io::Result<()> {
        let path = self
            .open
            .borrow()
            .get(&parent.as_raw_fd())
            .cloned()
            .unwrap_or_default();
        self.record(Call::LandlockAddRule(path, access))
    }

    fn landlock_restrict_self(&self, _ruleset: BorrowedFd<'_>) -> io::Result<()> {
        self.record(Call::LandlockRestrictSelf)
    }

    fn open_path(&self, path: &Path) -> io::Result<OwnedFd> {
        self.record(Call::OpenPath(path.to_path_buf()))?;
        if self.missing.iter().any(|m| m == path) {
            return Err(io::Error::from_raw_os_error(libc::ENOENT));
        }
        self.fresh_fd(path)
    }

    fn seccomp_set_mode_filter(&self, program: &SeccompProgram) -> io::Result<()> {
        self.record(Call::SeccompSetModeFilter(program.name()))
    }
}
