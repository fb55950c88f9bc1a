#[macro_use]
mod common;

use std::fs::{self, OpenOptions};

use common::{assert_child_ok, denied, in_child};
use script_jail::sandbox::{AccessFs, LinuxKernel, PrivilegeLock, Ruleset};

fn seal(rules: &[(&std::path::Path, AccessFs)]) -> Result<(), String> {
    let kernel = LinuxKernel;
    PrivilegeLock::new(&kernel).lock().map_err(|e| e.to_string())?;
    let mut ruleset = Ruleset::create(&kernel).map_err(|e| e.to_string())?;
    for (path, access) in rules {
        ruleset.allow(path, *access).map_err(|e| e.to_string())?;
    }
    ruleset.restrict_self().map_err(|e| e.to_string())?;
    Ok(())
}

#[test]
fn test_read_only_file_grant() {
    require_landlock!();

    let dir = tempfile::tempdir().unwrap();
    let granted = dir.path().join("main.lua");
    let sibling = dir.path().join("secret.txt");
    fs::write(&granted, "print(1)\n").unwrap();
    fs::write(&sibling, "hunter2\n").unwrap();

    assert_child_ok(in_child(|| {
        seal(&[(granted.as_path(), AccessFs::READ)])?;

        let content = fs::read_to_string(&granted).map_err(|e| format!("read granted: {e}"))?;
        if content != "print(1)\n" {
            return Err(format!("unexpected content {content:?}"));
        }
        if !denied(OpenOptions::new().write(true).open(&granted)) {
            return Err("write to read-only grant was allowed".into());
        }
        if !denied(fs::read(&sibling)) {
            return Err("read of sibling was allowed".into());
        }
        Ok(())
    }));
}

#[test]
fn test_directory_grant_covers_descendants_only() {
    require_landlock!();

    let root = tempfile::tempdir().unwrap();
    let input_dir = root.path().join("in");
    fs::create_dir_all(input_dir.join("lib")).unwrap();
    fs::write(input_dir.join("main.py"), "").unwrap();
    fs::write(input_dir.join("lib/util.py"), "X = 1\n").unwrap();
    let outside = root.path().join("outside.txt");
    fs::write(&outside, "no").unwrap();

    assert_child_ok(in_child(|| {
        seal(&[(input_dir.as_path(), AccessFs::READ)])?;

        fs::read(input_dir.join("lib/util.py")).map_err(|e| format!("read nested: {e}"))?;
        if !denied(fs::read(&outside)) {
            return Err("read outside the granted directory was allowed".into());
        }
        Ok(())
    }));
}

#[test]
fn test_read_write_grant() {
    require_landlock!();

    let scratch = tempfile::tempdir().unwrap();
    let scratch_path = scratch.path().to_path_buf();

    assert_child_ok(in_child(|| {
        seal(&[(scratch_path.as_path(), AccessFs::READ_WRITE)])?;

        let file = scratch_path.join("out.txt");
        fs::write(&file, "ok").map_err(|e| format!("create: {e}"))?;
        fs::read(&file).map_err(|e| format!("read back: {e}"))?;
        fs::remove_file(&file).map_err(|e| format!("remove: {e}"))?;
        if !denied(fs::create_dir(scratch_path.join("sub"))) {
            return Err("mkdir was allowed without MAKE_DIR".into());
        }
        Ok(())
    }));
}

#[test]
fn test_missing_path_is_rejected_before_sealing() {
    require_landlock!();

    assert_child_ok(in_child(|| {
        let kernel = LinuxKernel;
        let mut ruleset = Ruleset::create(&kernel).map_err(|e| e.to_string())?;
        match ruleset.allow_read("/nonexistent/script-jail/input") {
            Err(e) if e.to_string().starts_with("open(/nonexistent/script-jail/input): ") => Ok(()),
            other => Err(format!("unexpected {other:?}")),
        }
    }));
}
