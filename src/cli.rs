//! Command-line parsing shared by every launcher.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use clap::parser::ValueSource;
use clap::{ArgAction, CommandFactory, FromArgMatches, Parser};

use crate::error::{ConfigError, LaunchError, EXIT_USAGE};

/// Options understood by all jail launchers.
#[derive(Parser, Debug)]
#[command(disable_version_flag = true)]
pub struct Cli {
    /// Allow reading the system time zone file
    #[arg(short = 'l')]
    pub allow_localtime: bool,

    /// Allow reading files beneath the input script's directory
    #[arg(short = 's')]
    pub allow_script_dir: bool,

    /// Also allow executing files beneath the input script's directory (implies -s)
    #[arg(short = 'x')]
    pub allow_script_exec: bool,

    /// Allow read+write access beneath the scratch directory
    #[arg(short = 't')]
    pub allow_tmp: bool,

    /// Set resource limit RLIMIT to VALUE (repeatable)
    #[arg(short = 'r', value_name = "RLIMIT=VALUE", action = ArgAction::Append)]
    pub rlimits: Vec<String>,

    /// Use inherited resource limits instead of the defaults
    #[arg(short = 'R', action = ArgAction::Count)]
    pub inherit_rlimits: u8,

    /// Print version information
    #[arg(short = 'v', action = ArgAction::SetTrue)]
    pub version: bool,

    /// Script to run
    pub input: Option<PathBuf>,
}

/// One resource-limit edit, in command-line order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RlimitOp {
    Set(String),
    InheritAll,
}

/// Parsed options for a launcher run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub input: PathBuf,
    pub allow_localtime: bool,
    pub allow_script_dir: bool,
    pub allow_script_exec: bool,
    pub allow_tmp: bool,
    pub rlimit_ops: Vec<RlimitOp>,
}

impl Cli {
    /// Parse `args` (including the program name) for the launcher `name`.
    ///
    /// Help and version requests, usage errors and a missing input come back
    /// as [`LaunchError::Exit`].
    pub fn parse_options<I, T>(
        name: &'static str,
        about: &'static str,
        args: I,
    ) -> Result<Options, LaunchError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let mut cmd = Cli::command().name(name).bin_name(name).about(about);

        let matches = match cmd.try_get_matches_from_mut(args) {
            Ok(m) => m,
            Err(e) => {
                let to_stderr = e.use_stderr();
                return Err(LaunchError::Exit {
                    code: if to_stderr { EXIT_USAGE } else { 0 },
                    message: e.render().to_string(),
                    to_stderr,
                });
            }
        };

        let cli = Cli::from_arg_matches(&matches).map_err(|e| LaunchError::Exit {
            code: EXIT_USAGE,
            message: e.render().to_string(),
            to_stderr: true,
        })?;

        if cli.version {
            return Err(LaunchError::Exit {
                code: 0,
                message: format!("{name} {}", env!("CARGO_PKG_VERSION")),
                to_stderr: false,
            });
        }

        let Some(input) = cli.input else {
            return Err(LaunchError::Exit {
                code: EXIT_USAGE,
                message: format!("error: {}\n\n{}", ConfigError::MissingInput, cmd.render_usage()),
                to_stderr: true,
            });
        };
        tracing::debug!("input: {}", input.display());

        let mut ops: Vec<(usize, RlimitOp)> = Vec::new();
        if let (Some(indices), Some(values)) = (
            matches.indices_of("rlimits"),
            matches.get_many::<String>("rlimits"),
        ) {
            ops.extend(indices.zip(values.map(|v| RlimitOp::Set(v.clone()))));
        }
        if matches.value_source("inherit_rlimits") == Some(ValueSource::CommandLine) {
            if let Some(indices) = matches.indices_of("inherit_rlimits") {
                ops.extend(indices.map(|i| (i, RlimitOp::InheritAll)));
            }
        }
        ops.sort_by_key(|(i, _)| *i);

        Ok(Options {
            input,
            allow_localtime: cli.allow_localtime,
            allow_script_dir: cli.allow_script_dir || cli.allow_script_exec,
            allow_script_exec: cli.allow_script_exec,
            allow_tmp: cli.allow_tmp,
            rlimit_ops: ops.into_iter().map(|(_, op)| op).collect(),
        })
    }
}

/// The input must be a readable regular file before any sandbox step runs.
pub fn check_input(path: &Path) -> Result<(), ConfigError> {
    let inaccessible = |source| ConfigError::InputInaccessible {
        path: path.to_path_buf(),
        source,
    };
    let metadata = std::fs::metadata(path).map_err(inaccessible)?;
    // a directory would widen the single-file grant to a whole tree
    if !metadata.is_file() {
        return Err(ConfigError::InputNotFile {
            path: path.to_path_buf(),
        });
    }
    nix::unistd::access(path, nix::unistd::AccessFlags::R_OK)
        .map_err(|errno| inaccessible(std::io::Error::from_raw_os_error(errno as i32)))?;
    Ok(())
}
