use std::process::ExitCode;

use script_jail::launcher::{run, Launcher};

fn main() -> ExitCode {
    run(Launcher::Node)
}
