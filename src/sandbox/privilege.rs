//! Capability dropping and the no_new_privs lock.
//!
//! Both transitions are one-way. They run first in every launcher, before
//! anything else touches the environment.

use crate::error::{Result, SetupError};
use crate::sandbox::PolicyKernel;

/// What [`CapabilityDropper::drop_all`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropOutcome {
    /// The process entered no-privilege mode: every capability set is empty
    /// and the securebits are locked.
    Dropped,
    /// Nothing to drop with; the reason says why.
    NotApplicable(String),
}

/// Irreversibly empties the process's capability sets when it is able to.
pub struct CapabilityDropper<'k, K: PolicyKernel> {
    kernel: &'k K,
}

impl<'k, K: PolicyKernel> CapabilityDropper<'k, K> {
    pub fn new(kernel: &'k K) -> Self {
        Self { kernel }
    }

    /// Drop all capabilities.
    ///
    /// A kernel without `CAP_SETPCAP` is an error. A process that does not
    /// hold `CAP_SETPCAP` in its effective set cannot drop anything and gets
    /// [`DropOutcome::NotApplicable`].
    pub fn drop_all(&self) -> Result<DropOutcome> {
        let supported = self
            .kernel
            .capability_restriction_supported()
            .map_err(|source| SetupError::Capability {
                op: "probe supported capabilities",
                source,
            })?;
        if !supported {
            return Err(SetupError::CapabilityUnsupported);
        }

        let allowed = self
            .kernel
            .has_effective_setpcap()
            .map_err(|source| SetupError::Capability {
                op: "read effective capabilities",
                source,
            })?;

        if !allowed {
            let reason = "capability SETPCAP not in effective set; unable to drop capabilities";
            tracing::debug!("{reason}");
            return Ok(DropOutcome::NotApplicable(reason.to_string()));
        }

        self.kernel
            .enter_no_privilege_mode()
            .map_err(|(op, source)| SetupError::Capability { op, source })?;
        tracing::debug!("capabilities dropped");
        Ok(DropOutcome::Dropped)
    }
}

/// Sets the no_new_privs flag.
pub struct PrivilegeLock<'k, K: PolicyKernel> {
    kernel: &'k K,
}

impl<'k, K: PolicyKernel> PrivilegeLock<'k, K> {
    pub fn new(kernel: &'k K) -> Self {
        Self { kernel }
    }

    pub fn lock(&self) -> Result<()> {
        self.kernel.set_no_new_privs().map_err(SetupError::NoNewPrivs)?;
        tracing::debug!("no_new_privs set");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::recording::{Call, RecordingKernel};

    #[test]
    fn test_unprivileged_process_is_not_applicable() {
        let kernel = RecordingKernel::new().with_setpcap(false);
        let outcome = CapabilityDropper::new(&kernel).drop_all().unwrap();
        assert!(matches!(outcome, DropOutcome::NotApplicable(_)));
        assert!(!kernel.calls().contains(&Call::EnterNoPrivilegeMode));
    }

    #[test]
    fn test_privileged_process_drops() {
        let kernel = RecordingKernel::new().with_setpcap(true);
        let outcome = CapabilityDropper::new(&kernel).drop_all().unwrap();
        assert_eq!(outcome, DropOutcome::Dropped);
        assert_eq!(
            kernel.calls(),
            vec![
                Call::CapabilityRestrictionSupported,
                Call::HasEffectiveSetpcap,
                Call::EnterNoPrivilegeMode,
            ]
        );
    }

    #[test]
    fn test_unsupported_kernel_is_error() {
        let kernel = RecordingKernel::new().with_capability_support(false);
        let err = CapabilityDropper::new(&kernel).drop_all().unwrap_err();
        assert!(matches!(err, SetupError::CapabilityUnsupported));
    }

    #[test]
    fn test_failed_mode_switch_is_error() {
        let kernel = RecordingKernel::new()
            .with_setpcap(true)
            .failing(Call::EnterNoPrivilegeMode);
        let err = CapabilityDropper::new(&kernel).drop_all().unwrap_err();
        assert!(matches!(err, SetupError::Capability { .. }));
    }

    #[test]
    fn test_lock_error_is_reported() {
        let kernel = RecordingKernel::new().failing(Call::SetNoNewPrivs);
        let err = PrivilegeLock::new(&kernel).lock().unwrap_err();
        assert!(err.to_string().starts_with("prctl(PR_SET_NO_NEW_PRIVS, 1): "));
    }
}
