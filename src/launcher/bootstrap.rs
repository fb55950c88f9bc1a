//! Handing control to the script runtime once the sandbox is sealed.
//!
//! Two strategies:
//! - [`InterpreterBootstrap`] spawns the interpreter as a child. The child
//!   inherits every restriction; the launcher waits, forwards its stderr and
//!   classifies the outcome.
//! - [`ExecBootstrap`] replaces the launcher with the runtime through
//!   `fexecve` on a descriptor opened before the ruleset was sealed.

use std::ffi::{CString, OsStr};
use std::io::{self, BufRead, BufReader, Write};
use std::os::fd::{AsRawFd, OwnedFd};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::error::{GuestError, Result, SetupError, EXIT_GUEST_ERROR};
use crate::launcher::SealedSandbox;
use crate::sandbox::{AccessFs, PolicyKernel};

/// The only environment the runtime sees.
const GUEST_PATH: &str = "/usr/bin";

/// Without `HOME` runtimes fall back to a passwd lookup, which goes through NSS.
const GUEST_HOME: &str = "/nonexistent";

fn guest_env() -> [(&'static str, &'static str); 2] {
    [("PATH", GUEST_PATH), ("HOME", GUEST_HOME)]
}

/// Library locations the dynamic loader may need. Missing ones are skipped.
const LIBRARY_DIRS: &[&str] = &["/lib", "/lib64", "/usr/lib", "/usr/lib64", "/usr/local/lib"];

/// Read, list and map (execute) beneath a directory.
const LIBRARY_ACCESS: AccessFs = AccessFs::READ_FILE
    .union(AccessFs::READ_DIR)
    .union(AccessFs::EXECUTE);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    /// Missing path aborts the launch.
    Required,
    /// Missing path is skipped.
    Optional,
}

/// A fixed support path the runtime needs inside the sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grant {
    pub path: PathBuf,
    pub access: AccessFs,
    pub requirement: Requirement,
}

impl Grant {
    pub fn required(path: impl Into<PathBuf>, access: AccessFs) -> Self {
        Self {
            path: path.into(),
            access,
            requirement: Requirement::Required,
        }
    }

    pub fn optional(path: impl Into<PathBuf>, access: AccessFs) -> Self {
        Self {
            path: path.into(),
            access,
            requirement: Requirement::Optional,
        }
    }
}

/// How the guest program ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuestOutcome {
    pub exit_code: u8,
    pub class: GuestError,
    pub diagnostic: Option<String>,
}

impl GuestOutcome {
    pub fn success() -> Self {
        Self {
            exit_code: 0,
            class: GuestError::None,
            diagnostic: None,
        }
    }

    pub fn failed(class: GuestError, diagnostic: impl Into<String>) -> Self {
        Self {
            exit_code: EXIT_GUEST_ERROR,
            class,
            diagnostic: Some(diagnostic.into()),
        }
    }
}

/// The runtime side of a launcher.
pub trait RuntimeBootstrap {
    /// Paths that must be granted besides the input.
    fn support_grants(&self) -> Vec<Grant>;

    /// Runs after resource limits are applied and before the ruleset exists.
    fn prepare(&mut self, kernel: &dyn PolicyKernel) -> Result<()>;

    /// Load and run `input`. Only reachable with a sealed sandbox.
    fn run(self: Box<Self>, input: &Path, sandbox: &SealedSandbox) -> Result<GuestOutcome>;
}

fn cstring(bytes: &OsStr) -> Result<CString> {
    CString::new(bytes.as_bytes()).map_err(|e| SetupError::Bootstrap {
        op: "argument".to_string(),
        source: io::Error::new(io::ErrorKind::InvalidInput, e),
    })
}

fn runtime_grants(interpreter: &Path) -> Vec<Grant> {
    let mut grants = vec![Grant::required(
        interpreter,
        AccessFs::EXECUTE | AccessFs::READ_FILE,
    )];
    grants.extend(
        LIBRARY_DIRS
            .iter()
            .map(|dir| Grant::optional(*dir, LIBRARY_ACCESS)),
    );
    grants.push(Grant::optional("/etc/ld.so.cache", AccessFs::READ_FILE));
    grants
}

/// Spawns an interpreter child inside the sandbox.
pub struct InterpreterBootstrap {
    interpreter: PathBuf,
    args: Vec<String>,
    extra_grants: Vec<Grant>,
    syntax_markers: &'static [&'static str],
}

impl InterpreterBootstrap {
    pub fn new(
        interpreter: impl Into<PathBuf>,
        args: Vec<String>,
        syntax_markers: &'static [&'static str],
    ) -> Self {
        Self {
            interpreter: interpreter.into(),
            args,
            extra_grants: Vec::new(),
            syntax_markers,
        }
    }

    /// Add a runtime-specific support path.
    pub fn with_grant(mut self, grant: Grant) -> Self {
        self.extra_grants.push(grant);
        self
    }

    fn is_syntax_error(&self, line: &[u8]) -> bool {
        let line = String::from_utf8_lossy(line);
        self.syntax_markers.iter().any(|m| line.contains(m))
    }

    /// Copy the child's stderr to ours line by line, noting syntax errors.
    fn forward_stderr(&self, stderr: impl io::Read) -> (bool, Option<String>) {
        let mut reader = BufReader::new(stderr);
        let mut out = io::stderr().lock();
        let mut line = Vec::new();
        let mut syntax = false;
        let mut first = None;

        loop {
            line.clear();
            match reader.read_until(b'\n', &mut line) {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::warn!("reading guest stderr: {e}");
                    break;
                }
            }
            // A closed stderr must not stop the drain, or the child blocks.
            let _ = out.write_all(&line);
            if first.is_none() {
                first = Some(String::from_utf8_lossy(&line).trim_end().to_string());
            }
            if !syntax && self.is_syntax_error(&line) {
                syntax = true;
            }
        }
        let _ = out.flush();
        (syntax, first)
    }
}

impl RuntimeBootstrap for InterpreterBootstrap {
    fn support_grants(&self) -> Vec<Grant> {
        let mut grants = runtime_grants(&self.interpreter);
        grants.extend(self.extra_grants.iter().cloned());
        grants
    }

    fn prepare(&mut self, _kernel: &dyn PolicyKernel) -> Result<()> {
        Ok(())
    }

    fn run(self: Box<Self>, input: &Path, sandbox: &SealedSandbox) -> Result<GuestOutcome> {
        tracing::debug!(
            interpreter = %self.interpreter.display(),
            seccomp = sandbox.seccomp_program(),
            rules = sandbox.ruleset().rules().len(),
            capabilities = ?sandbox.capabilities(),
            "starting runtime"
        );

        let mut child = match Command::new(&self.interpreter)
            .args(&self.args)
            .arg(input)
            .env_clear()
            .envs(guest_env())
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                return Ok(GuestOutcome::failed(
                    GuestError::HostInit,
                    format!("{}: {e}", self.interpreter.display()),
                ));
            }
        };

        let (syntax, first_line) = match child.stderr.take() {
            Some(stderr) => self.forward_stderr(stderr),
            None => (false, None),
        };

        let status = child.wait().map_err(|source| SetupError::Bootstrap {
            op: "wait".to_string(),
            source,
        })?;

        match status.code() {
            Some(0) => Ok(GuestOutcome::success()),
            Some(code) => {
                let class = if syntax {
                    GuestError::Syntax
                } else {
                    GuestError::Runtime
                };
                let diagnostic = first_line.unwrap_or_else(|| format!("exit status {code}"));
                tracing::debug!(code, ?class, "guest failed");
                Ok(GuestOutcome::failed(class, diagnostic))
            }
            None => Err(SetupError::Bootstrap {
                op: format!("{}", self.interpreter.display()),
                source: io::Error::new(
                    io::ErrorKind::Other,
                    format!("killed by signal {}", status.signal().unwrap_or(0)),
                ),
            }),
        }
    }
}

/// Replaces the launcher with the runtime via `fexecve`.
pub struct ExecBootstrap {
    program: PathBuf,
    args: Vec<String>,
    fd: Option<OwnedFd>,
}

impl ExecBootstrap {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            fd: None,
        }
    }

    /// `argv` for the runtime: program, configured arguments, input.
    pub fn argv(&self, input: &Path) -> Result<Vec<CString>> {
        let mut argv = vec![cstring(self.program.as_os_str())?];
        for arg in &self.args {
            argv.push(cstring(OsStr::new(arg))?);
        }
        argv.push(cstring(input.as_os_str())?);
        Ok(argv)
    }
}

impl RuntimeBootstrap for ExecBootstrap {
    fn support_grants(&self) -> Vec<Grant> {
        runtime_grants(&self.program)
    }

    fn prepare(&mut self, kernel: &dyn PolicyKernel) -> Result<()> {
        let fd = kernel
            .open_path(&self.program)
            .map_err(|source| SetupError::Bootstrap {
                op: format!("open({}, O_PATH)", self.program.display()),
                source,
            })?;
        self.fd = Some(fd);
        Ok(())
    }

    fn run(self: Box<Self>, input: &Path, sandbox: &SealedSandbox) -> Result<GuestOutcome> {
        let fd = self.fd.as_ref().ok_or_else(|| SetupError::Bootstrap {
            op: "fexecve".to_string(),
            source: io::Error::new(io::ErrorKind::NotFound, "runtime was not prepared"),
        })?;

        let argv = self.argv(input)?;
        let env = guest_env()
            .iter()
            .map(|(key, value)| cstring(OsStr::new(&format!("{key}={value}"))))
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(
            program = %self.program.display(),
            capabilities = ?sandbox.capabilities(),
            "exec runtime"
        );
        match nix::unistd::fexecve(fd.as_raw_fd(), &argv, &env) {
            Ok(never) => match never {},
            Err(errno) => Err(SetupError::Bootstrap {
                op: "fexecve".to_string(),
                source: io::Error::from_raw_os_error(errno as i32),
            }),
        }
    }
}
