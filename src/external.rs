//! Locating external programs and translating their exit statuses.

use crate::command::ExitCode;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;

/// Exit code of a finished process, shell style: `128 + signal` when it was killed.
pub fn status_to_exit_code(exit_status: ExitStatus) -> ExitCode {
    match exit_status.code() {
        Some(x) => x,
        None => terminated_by_signal(exit_status),
    }
}

#[cfg(unix)]
fn terminated_by_signal(exit_status: ExitStatus) -> ExitCode {
    use std::os::unix::process::ExitStatusExt;
    if let Some(signal) = ExitStatusExt::signal(&exit_status) {
        128 + signal
    } else if ExitStatusExt::core_dumped(&exit_status) {
        255
    } else {
        -1
    }
}

#[cfg(not(unix))]
fn terminated_by_signal(_exit_status: ExitStatus) -> ExitCode {
    -1
}

/// Resolve a command name the way a typical shell would.
///
/// - Absolute path: used as is.
/// - Anything containing a separator (`bin/tool`, `./tool`): resolved against
///   `current_dir`, the shell's working directory.
/// - A bare name: the first executable match in `search_paths` (a `PATH` value).
///
/// Only existing, executable regular files resolve.
pub fn find_command_path(search_paths: &OsStr, current_dir: &Path, name: &Path) -> Option<PathBuf> {
    let mut components = name.components();
    match (components.next(), components.next()) {
        (None, _) => None,
        (Some(single), None) if !name.is_absolute() => std::env::split_paths(search_paths)
            .map(|dir| dir.join(single.as_os_str()))
            .find(|candidate| is_executable(candidate)),
        _ => {
            let candidate = current_dir.join(name);
            is_executable(&candidate).then_some(candidate)
        }
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    fn osstr(s: &str) -> &OsStr {
        OsStr::new(s)
    }

    fn make_tool(path: &Path, mode: u32) {
        fs::write(path, "#!/bin/sh\n").expect("write tool");
        fs::set_permissions(path, fs::Permissions::from_mode(mode)).expect("chmod");
    }

    #[test]
    fn absolute_existing() {
        let path = Path::new("/bin/sh");
        let found = find_command_path(osstr(""), Path::new("/"), path);
        assert_eq!(found.as_deref(), Some(path));
    }

    #[test]
    fn absolute_nonexisting() {
        let found = find_command_path(osstr("/bin"), Path::new("/"), Path::new("/bin/nonexisting"));
        assert!(found.is_none());
    }

    #[test]
    fn single_component_found_in_path() {
        let found = find_command_path(osstr("/nowhere:/bin"), Path::new("/"), Path::new("sh"))
            .expect("Expected to find 'sh' in /bin via PATH search");
        assert_eq!(found, Path::new("/bin/sh"));
    }

    #[test]
    fn single_component_not_found_in_path() {
        let found = find_command_path(osstr("/bin"), Path::new("/"), Path::new("nonexisting"));
        assert!(found.is_none());
    }

    #[test]
    fn relative_path_resolves_against_current_dir() {
        let tmp = tempfile::tempdir().expect("tempdir");
        fs::create_dir(tmp.path().join("bin")).expect("mkdir bin");
        make_tool(&tmp.path().join("bin").join("tool"), 0o755);

        let found = find_command_path(osstr("/bin"), tmp.path(), Path::new("bin/tool"))
            .expect("Expected to find relative 'bin/tool'");
        assert_eq!(found, tmp.path().join("bin/tool"));

        let dotted = find_command_path(osstr("/bin"), &tmp.path().join("bin"), Path::new("./tool"));
        assert!(dotted.is_some());
    }

    #[test]
    fn non_executable_file_is_skipped() {
        let tmp = tempfile::tempdir().expect("tempdir");
        make_tool(&tmp.path().join("plain"), 0o644);
        let search = tmp.path().as_os_str();
        assert!(find_command_path(search, Path::new("/"), Path::new("plain")).is_none());
    }

    #[test]
    fn directory_is_not_a_command() {
        let tmp = tempfile::tempdir().expect("tempdir");
        fs::create_dir(tmp.path().join("sub")).expect("mkdir");
        assert!(find_command_path(osstr(""), tmp.path(), Path::new("./sub")).is_none());
    }

    #[test]
    fn empty_path_is_none() {
        assert!(find_command_path(osstr("/bin"), Path::new("/"), Path::new("")).is_none());
    }

    #[test]
    fn signal_termination_maps_above_128() {
        let status = std::process::Command::new("sh")
            .args(["-c", "kill -9 $$"])
            .status()
            .expect("run sh");
        assert_eq!(status_to_exit_code(status), 128 + 9);
    }
}
