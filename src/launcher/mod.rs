//! The launcher: builds the sandbox in a fixed order, then hands off to the runtime.
//!
//! Order, identical for every runtime:
//! 1. drop capabilities
//! 2. set no_new_privs
//! 3. parse options, check the input, load settings
//! 4. apply resource limits
//! 5. build and seal the landlock ruleset
//! 6. install the seccomp filter
//! 7. run the guest
//!
//! Steps 1 to 6 are fatal on any error. Configuration problems surface in
//! step 3, before anything in steps 4 to 6 has touched the kernel.

mod bootstrap;
mod profile;

pub use bootstrap::{
    ExecBootstrap, GuestOutcome, Grant, InterpreterBootstrap, Requirement, RuntimeBootstrap,
};
pub use profile::{Launcher, Profile};

use std::ffi::OsString;
use std::io;
use std::process::ExitCode;

use crate::cli::{check_input, Cli, Options, RlimitOp};
use crate::config::{load_launcher_config, LauncherConfig};
use crate::error::{fatal, ConfigError, LaunchError, SetupError};
use crate::sandbox::linux::seccomp::apply_filter;
use crate::sandbox::{
    AccessFs, CapabilityDropper, DropOutcome, LinuxKernel, PolicyKernel, PrivilegeLock, Ruleset,
    SealedRuleset,
};
use crate::utils::{init_logging, script_dir};

/// Proof that every restriction is in force. Only the orchestrator builds one.
#[derive(Debug)]
pub struct SealedSandbox {
    ruleset: SealedRuleset,
    seccomp: &'static str,
    capabilities: DropOutcome,
}

impl SealedSandbox {
    pub fn ruleset(&self) -> &SealedRuleset {
        &self.ruleset
    }

    pub fn seccomp_program(&self) -> &'static str {
        self.seccomp
    }

    pub fn capabilities(&self) -> &DropOutcome {
        &self.capabilities
    }
}

const LUA_MODULE_ACCESS: AccessFs = AccessFs::READ_FILE.union(AccessFs::READ_DIR);

/// The stock runtime for a profile.
pub fn default_bootstrap(profile: &Profile) -> Box<dyn RuntimeBootstrap> {
    let interpreter = profile.interpreter.clone();
    let args = profile.interpreter_args.clone();
    let markers = profile.launcher.syntax_markers();

    match profile.launcher {
        Launcher::Shell => Box::new(ExecBootstrap::new(interpreter, args)),
        Launcher::Lua => Box::new(
            InterpreterBootstrap::new(interpreter, args, markers)
                .with_grant(Grant::optional("/usr/share/lua", LUA_MODULE_ACCESS))
                .with_grant(Grant::optional("/usr/local/share/lua", LUA_MODULE_ACCESS)),
        ),
        Launcher::Python => Box::new(
            InterpreterBootstrap::new(interpreter, args, markers)
                .with_grant(Grant::optional("/dev/urandom", AccessFs::READ_FILE)),
        ),
        Launcher::Node => Box::new(
            InterpreterBootstrap::new(interpreter, args, markers)
                .with_grant(Grant::optional("/etc/ssl/openssl.cnf", AccessFs::READ_FILE))
                .with_grant(Grant::optional("/dev/urandom", AccessFs::READ_FILE)),
        ),
    }
}

type SettingsLoader = fn(&str) -> Result<LauncherConfig, ConfigError>;

/// Runs the launch sequence for one launcher against one kernel.
pub struct Orchestrator<'k, K: PolicyKernel> {
    launcher: Launcher,
    kernel: &'k K,
    settings: SettingsLoader,
}

impl<'k, K: PolicyKernel> Orchestrator<'k, K> {
    pub fn new(launcher: Launcher, kernel: &'k K) -> Self {
        Self {
            launcher,
            kernel,
            settings: load_launcher_config,
        }
    }

    /// Replace the settings-file lookup.
    pub fn with_settings(mut self, settings: SettingsLoader) -> Self {
        self.settings = settings;
        self
    }

    /// Build the sandbox and run the guest.
    ///
    /// `args` includes the program name. `bootstrap_for` picks the runtime
    /// once the profile is known.
    pub fn execute<I, T, F>(&self, args: I, bootstrap_for: F) -> Result<GuestOutcome, LaunchError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
        F: FnOnce(&Profile) -> Box<dyn RuntimeBootstrap>,
    {
        let capabilities = CapabilityDropper::new(self.kernel).drop_all()?;
        PrivilegeLock::new(self.kernel).lock()?;

        let options = Cli::parse_options(self.launcher.program(), self.launcher.about(), args)?;
        check_input(&options.input)?;
        let config = (self.settings)(self.launcher.name())?;
        let mut profile = Profile::resolve(self.launcher, config)?;
        for op in &options.rlimit_ops {
            match op {
                RlimitOp::Set(text) => profile
                    .rlimits
                    .parse_override(text)
                    .map_err(ConfigError::from)?,
                RlimitOp::InheritAll => profile.rlimits.set_all_inherit(),
            }
        }
        let mut bootstrap = bootstrap_for(&profile);

        profile.rlimits.apply(self.kernel)?;
        bootstrap.prepare(self.kernel)?;

        let ruleset = self.seal_filesystem(&options, &profile, bootstrap.support_grants())?;

        let program = self.launcher.seccomp_program();
        apply_filter(self.kernel, &program)?;

        let sandbox = SealedSandbox {
            ruleset,
            seccomp: program.name(),
            capabilities,
        };
        Ok(bootstrap.run(&options.input, &sandbox)?)
    }

    fn seal_filesystem(
        &self,
        options: &Options,
        profile: &Profile,
        grants: Vec<Grant>,
    ) -> Result<SealedRuleset, SetupError> {
        let mut ruleset = Ruleset::create(self.kernel)?;

        if options.allow_script_dir {
            let dir = script_dir(&options.input).map_err(|source| SetupError::LandlockPath {
                op: "realpath",
                path: options.input.clone(),
                source,
            })?;
            let access = if options.allow_script_exec {
                AccessFs::READ | AccessFs::EXECUTE
            } else {
                AccessFs::READ
            };
            ruleset.allow(&dir, access)?;
        } else {
            ruleset.allow_read(&options.input)?;
        }

        for grant in grants {
            if grant.requirement == Requirement::Optional && !grant.path.exists() {
                tracing::debug!(path = %grant.path.display(), "optional path missing, skipped");
                continue;
            }
            ruleset.allow(&grant.path, grant.access)?;
        }

        if options.allow_localtime {
            ruleset.allow_read(&profile.timezone_file)?;
        }
        if options.allow_tmp {
            ruleset.allow_read_write(&profile.scratch_dir)?;
        }

        ruleset.restrict_self()
    }
}

/// Entry point shared by the launcher binaries.
pub fn run(launcher: Launcher) -> ExitCode {
    init_logging();

    let kernel = LinuxKernel;
    let orchestrator = Orchestrator::new(launcher, &kernel);

    match orchestrator.execute(std::env::args_os(), default_bootstrap) {
        Ok(outcome) => match outcome.class.exit_code() {
            Some(_) => {
                if let Some(diagnostic) = &outcome.diagnostic {
                    tracing::debug!(class = ?outcome.class, "{diagnostic}");
                }
                ExitCode::from(outcome.exit_code)
            }
            None => fatal(&SetupError::Bootstrap {
                op: format!("start {}", launcher.name()),
                source: io::Error::new(
                    io::ErrorKind::Other,
                    outcome.diagnostic.unwrap_or_default(),
                ),
            }),
        },
        Err(LaunchError::Exit {
            code,
            message,
            to_stderr,
        }) => {
            let message = message.trim_end();
            if to_stderr {
                eprintln!("{message}");
            } else {
                println!("{message}");
            }
            ExitCode::from(code)
        }
        Err(LaunchError::Setup(err)) => fatal(&err),
    }
}
