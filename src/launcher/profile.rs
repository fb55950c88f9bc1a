//! Per-launcher profiles: which runtime, which defaults.

use std::path::PathBuf;

use nix::sys::resource::Resource;

use crate::config::LauncherConfig;
use crate::error::{ConfigError, LaunchError};
use crate::rlimit::{RlimitSpec, RlimitTable};
use crate::sandbox::linux::seccomp::programs;
use crate::sandbox::SeccompProgram;

const DEFAULT_SCRATCH_DIR: &str = "/tmp";
const DEFAULT_TIMEZONE_FILE: &str = "/etc/localtime";

/// The runtimes a jail can be built around.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Launcher {
    Lua,
    Python,
    Node,
    Shell,
}

impl Launcher {
    pub const ALL: [Launcher; 4] = [
        Launcher::Lua,
        Launcher::Python,
        Launcher::Node,
        Launcher::Shell,
    ];

    /// Short name, used for the settings file and the seccomp policy.
    pub fn name(self) -> &'static str {
        match self {
            Launcher::Lua => "lua",
            Launcher::Python => "python",
            Launcher::Node => "node",
            Launcher::Shell => "sh",
        }
    }

    /// Binary name.
    pub fn program(self) -> &'static str {
        match self {
            Launcher::Lua => "jail-lua",
            Launcher::Python => "jail-python",
            Launcher::Node => "jail-node",
            Launcher::Shell => "jail-sh",
        }
    }

    pub fn about(self) -> &'static str {
        match self {
            Launcher::Lua => "Run a Lua script inside a landlock and seccomp jail",
            Launcher::Python => "Run a Python script inside a landlock and seccomp jail",
            Launcher::Node => "Run a JavaScript file with Node.js inside a landlock and seccomp jail",
            Launcher::Shell => "Run a shell script inside a landlock and seccomp jail",
        }
    }

    pub fn seccomp_program(self) -> SeccompProgram {
        match self {
            Launcher::Lua => programs::LUA,
            Launcher::Python => programs::PYTHON,
            Launcher::Node => programs::NODE,
            Launcher::Shell => programs::SHELL,
        }
    }

    pub fn default_interpreter(self) -> &'static str {
        match self {
            Launcher::Lua => "/usr/bin/lua",
            Launcher::Python => "/usr/bin/python3",
            Launcher::Node => "/usr/bin/node",
            Launcher::Shell => "/bin/sh",
        }
    }

    pub fn default_interpreter_args(self) -> &'static [&'static str] {
        match self {
            Launcher::Python => &["-I"],
            _ => &[],
        }
    }

    /// Fragments of the runtime's diagnostics that mean the script failed to load.
    pub fn syntax_markers(self) -> &'static [&'static str] {
        match self {
            Launcher::Lua => &[
                "syntax error",
                "unexpected symbol",
                "expected near",
                "unfinished string",
                "malformed number",
            ],
            Launcher::Python => &["SyntaxError:", "IndentationError:", "TabError:"],
            Launcher::Node => &["SyntaxError:"],
            Launcher::Shell => &[],
        }
    }

    /// The compiled-in resource limits.
    pub fn rlimit_catalog(self) -> &'static [RlimitSpec] {
        match self {
            Launcher::Lua => &LUA_RLIMITS,
            Launcher::Python => &PYTHON_RLIMITS,
            Launcher::Node => &NODE_RLIMITS,
            Launcher::Shell => &SHELL_RLIMITS,
        }
    }
}

const LUA_RLIMITS: [RlimitSpec; 16] = [
    RlimitSpec::absolute("CPU", Resource::RLIMIT_CPU, 8),
    RlimitSpec::absolute("FSIZE", Resource::RLIMIT_FSIZE, 1 << 24),
    RlimitSpec::absolute("DATA", Resource::RLIMIT_DATA, 1 << 28),
    RlimitSpec::absolute("STACK", Resource::RLIMIT_STACK, 1 << 23),
    RlimitSpec::zero("CORE", Resource::RLIMIT_CORE),
    RlimitSpec::absolute("RSS", Resource::RLIMIT_RSS, 1 << 28),
    RlimitSpec::absolute("NPROC", Resource::RLIMIT_NPROC, 4096),
    RlimitSpec::absolute("NOFILE", Resource::RLIMIT_NOFILE, 32),
    RlimitSpec::zero("MEMLOCK", Resource::RLIMIT_MEMLOCK),
    RlimitSpec::absolute("AS", Resource::RLIMIT_AS, 1 << 30),
    RlimitSpec::zero("LOCKS", Resource::RLIMIT_LOCKS),
    RlimitSpec::absolute("SIGPENDING", Resource::RLIMIT_SIGPENDING, 64),
    RlimitSpec::zero("MSGQUEUE", Resource::RLIMIT_MSGQUEUE),
    RlimitSpec::zero("NICE", Resource::RLIMIT_NICE),
    RlimitSpec::zero("RTPRIO", Resource::RLIMIT_RTPRIO),
    RlimitSpec::zero("RTTIME", Resource::RLIMIT_RTTIME),
];

const PYTHON_RLIMITS: [RlimitSpec; 16] = [
    RlimitSpec::absolute("CPU", Resource::RLIMIT_CPU, 8),
    RlimitSpec::absolute("FSIZE", Resource::RLIMIT_FSIZE, 1 << 24),
    RlimitSpec::absolute("DATA", Resource::RLIMIT_DATA, 1 << 29),
    RlimitSpec::absolute("STACK", Resource::RLIMIT_STACK, 1 << 23),
    RlimitSpec::zero("CORE", Resource::RLIMIT_CORE),
    RlimitSpec::absolute("RSS", Resource::RLIMIT_RSS, 1 << 29),
    RlimitSpec::absolute("NPROC", Resource::RLIMIT_NPROC, 4096),
    RlimitSpec::absolute("NOFILE", Resource::RLIMIT_NOFILE, 64),
    RlimitSpec::zero("MEMLOCK", Resource::RLIMIT_MEMLOCK),
    RlimitSpec::absolute("AS", Resource::RLIMIT_AS, 1 << 31),
    RlimitSpec::zero("LOCKS", Resource::RLIMIT_LOCKS),
    RlimitSpec::absolute("SIGPENDING", Resource::RLIMIT_SIGPENDING, 64),
    RlimitSpec::zero("MSGQUEUE", Resource::RLIMIT_MSGQUEUE),
    RlimitSpec::zero("NICE", Resource::RLIMIT_NICE),
    RlimitSpec::zero("RTPRIO", Resource::RLIMIT_RTPRIO),
    RlimitSpec::zero("RTTIME", Resource::RLIMIT_RTTIME),
];

// V8 reserves its code range and heap cage up front; DATA and AS leave room for that.
const NODE_RLIMITS: [RlimitSpec; 16] = [
    RlimitSpec::absolute("CPU", Resource::RLIMIT_CPU, 4),
    RlimitSpec::absolute("FSIZE", Resource::RLIMIT_FSIZE, 1 << 24),
    RlimitSpec::absolute("DATA", Resource::RLIMIT_DATA, 1 << 30),
    RlimitSpec::absolute("STACK", Resource::RLIMIT_STACK, 1 << 23),
    RlimitSpec::zero("CORE", Resource::RLIMIT_CORE),
    RlimitSpec::absolute("RSS", Resource::RLIMIT_RSS, 1 << 28),
    RlimitSpec::absolute("NPROC", Resource::RLIMIT_NPROC, 2048),
    RlimitSpec::absolute("NOFILE", Resource::RLIMIT_NOFILE, 32),
    RlimitSpec::zero("MEMLOCK", Resource::RLIMIT_MEMLOCK),
    RlimitSpec::absolute("AS", Resource::RLIMIT_AS, 1 << 33),
    RlimitSpec::zero("LOCKS", Resource::RLIMIT_LOCKS),
    RlimitSpec::absolute("SIGPENDING", Resource::RLIMIT_SIGPENDING, 64),
    RlimitSpec::zero("MSGQUEUE", Resource::RLIMIT_MSGQUEUE),
    RlimitSpec::zero("NICE", Resource::RLIMIT_NICE),
    RlimitSpec::zero("RTPRIO", Resource::RLIMIT_RTPRIO),
    RlimitSpec::zero("RTTIME", Resource::RLIMIT_RTTIME),
];

// POSIX shells park the script descriptor at fd 10 or above, so NOFILE must exceed 10.
const SHELL_RLIMITS: [RlimitSpec; 16] = [
    RlimitSpec::absolute("CPU", Resource::RLIMIT_CPU, 1 << 3),
    RlimitSpec::absolute("FSIZE", Resource::RLIMIT_FSIZE, 1 << 20),
    RlimitSpec::absolute("DATA", Resource::RLIMIT_DATA, 1 << 25),
    RlimitSpec::absolute("STACK", Resource::RLIMIT_STACK, 1 << 25),
    RlimitSpec::zero("CORE", Resource::RLIMIT_CORE),
    RlimitSpec::absolute("RSS", Resource::RLIMIT_RSS, 1 << 15),
    RlimitSpec::zero("NPROC", Resource::RLIMIT_NPROC),
    RlimitSpec::absolute("NOFILE", Resource::RLIMIT_NOFILE, 1 << 4),
    RlimitSpec::zero("MEMLOCK", Resource::RLIMIT_MEMLOCK),
    RlimitSpec::absolute("AS", Resource::RLIMIT_AS, 1 << 30),
    RlimitSpec::zero("LOCKS", Resource::RLIMIT_LOCKS),
    RlimitSpec::zero("SIGPENDING", Resource::RLIMIT_SIGPENDING),
    RlimitSpec::zero("MSGQUEUE", Resource::RLIMIT_MSGQUEUE),
    RlimitSpec::zero("NICE", Resource::RLIMIT_NICE),
    RlimitSpec::zero("RTPRIO", Resource::RLIMIT_RTPRIO),
    RlimitSpec::zero("RTTIME", Resource::RLIMIT_RTTIME),
];

/// A launcher with its settings file folded in.
#[derive(Debug, Clone)]
pub struct Profile {
    pub launcher: Launcher,
    pub interpreter: PathBuf,
    pub interpreter_args: Vec<String>,
    pub scratch_dir: PathBuf,
    pub timezone_file: PathBuf,
    pub rlimits: RlimitTable,
}

impl Profile {
    pub fn resolve(launcher: Launcher, config: LauncherConfig) -> Result<Self, LaunchError> {
        let mut rlimits = RlimitTable::from_catalog(launcher.rlimit_catalog())?;
        rlimits
            .apply_overrides(&config.rlimits)
            .map_err(ConfigError::from)?;

        Ok(Self {
            launcher,
            interpreter: config
                .interpreter
                .unwrap_or_else(|| PathBuf::from(launcher.default_interpreter())),
            interpreter_args: config.interpreter_args.unwrap_or_else(|| {
                launcher
                    .default_interpreter_args()
                    .iter()
                    .map(|a| a.to_string())
                    .collect()
            }),
            scratch_dir: config
                .scratch_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SCRATCH_DIR)),
            timezone_file: config
                .timezone_file
                .unwrap_or_else(|| PathBuf::from(DEFAULT_TIMEZONE_FILE)),
            rlimits,
        })
    }
}
