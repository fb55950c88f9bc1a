//! Syscall allow-list application.
//!
//! The filter programs are generated by `build.rs` from `policies/*.syscalls`
//! and compiled into the binary. This module only knows their instruction
//! format and how to install one. Installing is always the last setup step:
//! from then on a syscall marked `deny` fails with `EACCES` and any other
//! syscall not on the list kills the process.

use crate::error::{Result, SetupError};
use crate::sandbox::PolicyKernel;

// BPF instruction classes and fields
pub const BPF_LD: u16 = 0x00;
pub const BPF_JMP: u16 = 0x05;
pub const BPF_RET: u16 = 0x06;
pub const BPF_W: u16 = 0x00;
pub const BPF_ABS: u16 = 0x20;
pub const BPF_JEQ: u16 = 0x10;
pub const BPF_K: u16 = 0x00;

pub const SECCOMP_RET_KILL_PROCESS: u32 = 0x8000_0000;
pub const SECCOMP_RET_ERRNO: u32 = 0x0005_0000;
pub const SECCOMP_RET_ALLOW: u32 = 0x7fff_0000;

pub const AUDIT_ARCH_X86_64: u32 = 0xc000_003e;
pub const AUDIT_ARCH_AARCH64: u32 = 0xc000_00b7;

// struct seccomp_data
pub const OFFSET_SYSCALL_NR: u32 = 0;
pub const OFFSET_ARCH: u32 = 4;

/// One classic BPF instruction, layout-compatible with `struct sock_filter`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SockFilter {
    pub code: u16,
    pub jt: u8,
    pub jf: u8,
    pub k: u32,
}

impl SockFilter {
    pub const fn stmt(code: u16, k: u32) -> Self {
        Self {
            code,
            jt: 0,
            jf: 0,
            k,
        }
    }

    pub const fn jump(code: u16, k: u32, jt: u8, jf: u8) -> Self {
        Self { code, jt, jf, k }
    }
}

/// A compiled filter program. Opaque to everything but the kernel.
#[derive(Debug, Clone, Copy)]
pub struct SeccompProgram {
    name: &'static str,
    instructions: &'static [SockFilter],
}

impl SeccompProgram {
    pub const fn new(name: &'static str, instructions: &'static [SockFilter]) -> Self {
        Self { name, instructions }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn instructions(&self) -> &'static [SockFilter] {
        self.instructions
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

/// Programs generated from `policies/`.
pub mod programs {
    use super::*;

    include!(concat!(env!("OUT_DIR"), "/seccomp_programs.rs"));
}

/// Install `program` as the process's seccomp filter.
///
/// Requires no_new_privs (or `CAP_SYS_ADMIN`). Irreversible.
pub fn apply_filter<K: PolicyKernel>(kernel: &K, program: &SeccompProgram) -> Result<()> {
    tracing::debug!(
        program = program.name(),
        instructions = program.len(),
        "applying seccomp filter"
    );
    kernel
        .seccomp_set_mode_filter(program)
        .map_err(SetupError::Seccomp)
}
