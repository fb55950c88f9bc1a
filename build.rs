//! Build script for script-jail.
//!
//! Compiles the declarative syscall allow-lists in `policies/` into seccomp
//! BPF programs for the target architecture. The output is
//! `$OUT_DIR/seccomp_programs.rs`, included by `sandbox::linux::seccomp`.
//!
//! Policy file format, one entry per line:
//!
//! ```text
//! # comment
//! include common        # pull in policies/common.syscalls
//! read                  # allowed on every architecture
//! open @x86_64          # only where the syscall exists
//! deny socket           # fails with EACCES instead of killing the process
//! ```

use std::collections::BTreeSet;
use std::env;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

const POLICY_DIR: &str = "policies";

/// (policy file stem, generated constant name)
const LAUNCHERS: &[(&str, &str)] = &[
    ("lua", "LUA"),
    ("python", "PYTHON"),
    ("node", "NODE"),
    ("shell", "SHELL"),
];

/// BPF jump offsets are 8 bits wide; the farthest jump skips every
/// comparison plus the kill and errno returns.
const MAX_SYSCALLS: usize = 254;

/// One policy after includes and architecture qualifiers are resolved.
#[derive(Default)]
struct Policy {
    allow: Vec<String>,
    deny: Vec<String>,
}

impl Policy {
    fn len(&self) -> usize {
        self.allow.len() + self.deny.len()
    }
}

fn main() {
    println!("cargo:rerun-if-changed={POLICY_DIR}");

    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR not set"));
    let arch = env::var("CARGO_CFG_TARGET_ARCH").expect("CARGO_CFG_TARGET_ARCH not set");

    let audit_arch = match arch.as_str() {
        "x86_64" => "AUDIT_ARCH_X86_64",
        "aarch64" => "AUDIT_ARCH_AARCH64",
        other => panic!("seccomp policies are not defined for target architecture {other}"),
    };

    let mut out = String::new();
    out.push_str("// @generated by build.rs from policies/*.syscalls\n\n");

    for (stem, ident) in LAUNCHERS {
        let path = Path::new(POLICY_DIR).join(format!("{stem}.syscalls"));
        let policy = match load_policy(&path, &arch) {
            Ok(policy) => policy,
            Err(e) => panic!("{}: {e}", path.display()),
        };
        if policy.allow.is_empty() || policy.len() > MAX_SYSCALLS {
            panic!(
                "{}: {} syscalls for {arch}, need 1..={MAX_SYSCALLS}",
                path.display(),
                policy.len()
            );
        }
        emit_program(&mut out, stem, ident, audit_arch, &policy);
    }

    fs::write(out_dir.join("seccomp_programs.rs"), out).expect("write seccomp_programs.rs");
}

/// Read a policy file, following includes, keeping entries for `arch`.
fn load_policy(path: &Path, arch: &str) -> Result<Policy, String> {
    let mut seen = BTreeSet::new();
    let mut policy = Policy::default();
    collect(path, arch, &mut seen, &mut policy, 0)?;
    Ok(policy)
}

fn collect(
    path: &Path,
    arch: &str,
    seen: &mut BTreeSet<String>,
    policy: &mut Policy,
    depth: usize,
) -> Result<(), String> {
    if depth > 4 {
        return Err("includes nested too deeply".to_string());
    }
    println!("cargo:rerun-if-changed={}", path.display());
    let text = fs::read_to_string(path).map_err(|e| format!("read {}: {e}", path.display()))?;

    for (lineno, raw) in text.lines().enumerate() {
        let line = raw.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let mut words = line.split_whitespace();
        let mut first = words.next().unwrap_or("");

        if first == "include" {
            let name = words
                .next()
                .ok_or_else(|| format!("line {}: include without a name", lineno + 1))?;
            let included = Path::new(POLICY_DIR).join(format!("{name}.syscalls"));
            collect(&included, arch, seen, policy, depth + 1)?;
            continue;
        }

        let deny = first == "deny";
        if deny {
            first = words
                .next()
                .ok_or_else(|| format!("line {}: deny without a syscall", lineno + 1))?;
        }

        if !first.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(format!("line {}: bad syscall name {first:?}", lineno + 1));
        }

        let mut wanted = true;
        for qualifier in words {
            match qualifier.strip_prefix('@') {
                Some(a) => wanted = a == arch,
                None => {
                    return Err(format!("line {}: unexpected {qualifier:?}", lineno + 1));
                }
            }
        }
        if !wanted {
            continue;
        }

        if !seen.insert(first.to_string()) {
            return Err(format!(
                "line {}: duplicate syscall {first} in {}",
                lineno + 1,
                path.display()
            ));
        }
        if deny {
            policy.deny.push(first.to_string());
        } else {
            policy.allow.push(first.to_string());
        }
    }
    Ok(())
}

/// Layout, with `n` allowed and `m` denied syscalls:
///   0         ld arch
///   1         jeq AUDIT_ARCH, skip 1
///   2         ret KILL_PROCESS
///   3         ld nr
///   4+i       jeq allow_i -> ALLOW
///   4+n+j     jeq deny_j -> ERRNO
///   4+n+m     ret KILL_PROCESS
///   5+n+m     ret ERRNO(EACCES)
///   6+n+m     ret ALLOW
fn emit_program(out: &mut String, stem: &str, ident: &str, audit_arch: &str, policy: &Policy) {
    let n = policy.allow.len();
    let m = policy.deny.len();
    let _ = writeln!(out, "const {ident}_FILTER: [SockFilter; {}] = [", n + m + 7);
    let _ = writeln!(out, "    SockFilter::stmt(BPF_LD | BPF_W | BPF_ABS, OFFSET_ARCH),");
    let _ = writeln!(
        out,
        "    SockFilter::jump(BPF_JMP | BPF_JEQ | BPF_K, {audit_arch}, 1, 0),"
    );
    let _ = writeln!(out, "    SockFilter::stmt(BPF_RET | BPF_K, SECCOMP_RET_KILL_PROCESS),");
    let _ = writeln!(out, "    SockFilter::stmt(BPF_LD | BPF_W | BPF_ABS, OFFSET_SYSCALL_NR),");
    for (i, name) in policy.allow.iter().enumerate() {
        let _ = writeln!(
            out,
            "    SockFilter::jump(BPF_JMP | BPF_JEQ | BPF_K, libc::SYS_{name} as u32, {}, 0),",
            n + m + 1 - i
        );
    }
    for (j, name) in policy.deny.iter().enumerate() {
        let _ = writeln!(
            out,
            "    SockFilter::jump(BPF_JMP | BPF_JEQ | BPF_K, libc::SYS_{name} as u32, {}, 0),",
            m - j
        );
    }
    let _ = writeln!(out, "    SockFilter::stmt(BPF_RET | BPF_K, SECCOMP_RET_KILL_PROCESS),");
    let _ = writeln!(
        out,
        "    SockFilter::stmt(BPF_RET | BPF_K, SECCOMP_RET_ERRNO | libc::EACCES as u32),"
    );
    let _ = writeln!(out, "    SockFilter::stmt(BPF_RET | BPF_K, SECCOMP_RET_ALLOW),");
    let _ = writeln!(out, "];\n");
    let _ = writeln!(
        out,
        "/// Allow-list from `policies/{stem}.syscalls` ({n} allowed, {m} denied with EACCES)."
    );
    let _ = writeln!(
        out,
        "pub const {ident}: SeccompProgram = SeccompProgram::new(\"{stem}\", &{ident}_FILTER);\n"
    );
}
