mod common;

use std::fs::File;

use common::{assert_child_ok, in_child};
use nix::sys::resource::{getrlimit, Resource};
use script_jail::launcher::Launcher;
use script_jail::rlimit::RlimitTable;
use script_jail::sandbox::LinuxKernel;

#[test]
fn test_nofile_override_is_enforced() {
    assert_child_ok(in_child(|| {
        let mut table = RlimitTable::from_catalog(Launcher::Lua.rlimit_catalog())
            .map_err(|e| e.to_string())?;
        table.set_all_inherit();
        table.parse_override("NOFILE=4").map_err(|e| e.to_string())?;
        table.apply(&LinuxKernel).map_err(|e| e.to_string())?;

        let mut files = Vec::new();
        for _ in 0..8 {
            match File::open("/dev/null") {
                Ok(file) => files.push(file),
                Err(e) if e.raw_os_error() == Some(libc::EMFILE) => {
                    return if files.len() <= 1 {
                        Ok(())
                    } else {
                        Err(format!("{} descriptors opened past the limit", files.len()))
                    };
                }
                Err(e) => return Err(format!("unexpected error {e}")),
            }
        }
        Err("descriptor limit was not enforced".into())
    }));
}

#[test]
fn test_inherit_leaves_limits_untouched() {
    let before: Vec<_> = [Resource::RLIMIT_NOFILE, Resource::RLIMIT_STACK, Resource::RLIMIT_CORE]
        .iter()
        .map(|r| getrlimit(*r).unwrap())
        .collect();

    let mut table = RlimitTable::from_catalog(Launcher::Shell.rlimit_catalog()).unwrap();
    table.set_all_inherit();
    table.apply(&LinuxKernel).unwrap();

    let after: Vec<_> = [Resource::RLIMIT_NOFILE, Resource::RLIMIT_STACK, Resource::RLIMIT_CORE]
        .iter()
        .map(|r| getrlimit(*r).unwrap())
        .collect();
    assert_eq!(before, after);
}
