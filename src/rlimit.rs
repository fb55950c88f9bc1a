//! Resource limit table.
//!
//! One [`RlimitSpec`] per kernel resource kind, indexed by the kernel's own
//! resource number. Each launcher ships a full default catalog; `-r` and
//! `-R` edit it, and [`RlimitTable::apply`] writes it to the kernel once.

use std::collections::BTreeMap;
use std::fmt;

use nix::sys::resource::Resource;

use crate::error::{Result, RlimitParseError, SetupError};
use crate::sandbox::PolicyKernel;

/// Number of resource kinds the kernel knows about.
#[allow(deprecated)]
pub const RLIMIT_COUNT: usize = libc::RLIMIT_NLIMITS as usize;

/// What to do with one limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RlimitAction {
    /// Leave the inherited limits alone.
    Inherit,
    /// Soft and hard limit 0.
    Zero,
    /// Soft and hard limit set to the value.
    Absolute(u64),
    /// Hard limit lowered to the current soft limit.
    EqualizeSoftToHard,
}

impl fmt::Display for RlimitAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RlimitAction::Inherit => f.write_str("inherit"),
            RlimitAction::Zero => f.write_str("0"),
            RlimitAction::Absolute(v) => write!(f, "{v}"),
            RlimitAction::EqualizeSoftToHard => f.write_str("soft"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RlimitSpec {
    pub name: &'static str,
    pub resource: Resource,
    pub action: RlimitAction,
}

impl RlimitSpec {
    pub const fn new(name: &'static str, resource: Resource, action: RlimitAction) -> Self {
        Self {
            name,
            resource,
            action,
        }
    }

    pub const fn zero(name: &'static str, resource: Resource) -> Self {
        Self::new(name, resource, RlimitAction::Zero)
    }

    pub const fn absolute(name: &'static str, resource: Resource, value: u64) -> Self {
        Self::new(name, resource, RlimitAction::Absolute(value))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RlimitTable {
    entries: Vec<RlimitSpec>,
}

impl RlimitTable {
    /// Build a table from a launcher's default catalog.
    ///
    /// The catalog must list every resource kind exactly once, in kernel order.
    pub fn from_catalog(catalog: &[RlimitSpec]) -> Result<Self> {
        if catalog.len() != RLIMIT_COUNT {
            return Err(SetupError::RlimitCatalog(format!(
                "{} entries, kernel has {RLIMIT_COUNT}",
                catalog.len()
            )));
        }
        for (i, spec) in catalog.iter().enumerate() {
            if spec.resource as usize != i {
                return Err(SetupError::RlimitCatalog(format!(
                    "{} at position {i} governs resource {}",
                    spec.name, spec.resource as usize
                )));
            }
        }
        Ok(Self {
            entries: catalog.to_vec(),
        })
    }

    pub fn entries(&self) -> &[RlimitSpec] {
        &self.entries
    }

    pub fn get(&self, name: &str) -> Option<&RlimitSpec> {
        self.entries.iter().find(|s| s.name.eq_ignore_ascii_case(name))
    }

    /// Opt out of all clamping.
    pub fn set_all_inherit(&mut self) {
        for spec in &mut self.entries {
            spec.action = RlimitAction::Inherit;
        }
    }

    /// Apply one `NAME=VALUE` override. On error the table is unchanged.
    pub fn parse_override(&mut self, text: &str) -> std::result::Result<(), RlimitParseError> {
        tracing::debug!("parsing: {text}");

        let (name, value) = text
            .split_once('=')
            .ok_or_else(|| RlimitParseError::MalformedInput(text.to_string()))?;

        let spec = self
            .entries
            .iter_mut()
            .find(|s| s.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| RlimitParseError::NoSuchLimit(text.to_string()))?;

        let value: u64 = value
            .parse()
            .map_err(|_| RlimitParseError::MalformedValue(value.to_string()))?;

        tracing::info!("rlimit {}: {value}", spec.name);
        spec.action = RlimitAction::Absolute(value);
        Ok(())
    }

    /// Apply every `NAME -> VALUE` pair of a settings-file map.
    pub fn apply_overrides(
        &mut self,
        overrides: &BTreeMap<String, u64>,
    ) -> std::result::Result<(), RlimitParseError> {
        for (name, value) in overrides {
            self.parse_override(&format!("{name}={value}"))?;
        }
        Ok(())
    }

    /// Write the table to the kernel, in index order.
    ///
    /// Every limit is read first; `Inherit` entries stop there.
    pub fn apply<K: PolicyKernel>(&self, kernel: &K) -> Result<()> {
        tracing::debug!("applying rlimits");

        for spec in &self.entries {
            let (soft, hard) = kernel
                .get_rlimit(spec.resource)
                .map_err(|source| SetupError::Rlimit {
                    op: "getrlimit",
                    name: spec.name,
                    source,
                })?;
            tracing::debug!(
                "get rlimit {}: soft={soft} hard={hard}, action {}",
                spec.name,
                spec.action
            );

            let (soft, hard) = match spec.action {
                RlimitAction::Inherit => continue,
                RlimitAction::Zero => (0, 0),
                RlimitAction::Absolute(v) => (v, v),
                RlimitAction::EqualizeSoftToHard => (soft, soft),
            };

            tracing::debug!("set rlimit {}: soft={soft} hard={hard}", spec.name);
            kernel
                .set_rlimit(spec.resource, soft, hard)
                .map_err(|source| SetupError::Rlimit {
                    op: "setrlimit",
                    name: spec.name,
                    source,
                })?;
        }
        Ok(())
    }
}
