//! Command and directory resolution.
//!
//! `look_path` follows the classic rules: a name with a leading `/` is
//! tried as-is, any other name containing `/` is joined to the working
//! directory, and a bare name walks `$PATH`, where an empty component
//! means the working directory. A hit must be a regular file with an
//! execute bit.

use std::path::{Component, Path, PathBuf};

use directories::BaseDirs;

use crate::error::ShellError;

/// The user's home directory, for bare `cd`.
pub fn home_dir() -> Option<PathBuf> {
    BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf())
}

enum ExecCheck {
    Missing,
    NotExecutable,
}

fn check_executable(path: &Path) -> Result<(), ExecCheck> {
    use std::os::unix::fs::PermissionsExt;
    let meta = std::fs::metadata(path).map_err(|_| ExecCheck::Missing)?;
    if meta.is_file() && meta.permissions().mode() & 0o111 != 0 {
        Ok(())
    } else {
        Err(ExecCheck::NotExecutable)
    }
}

/// Resolve a command name to an executable path.
pub fn look_path(path_var: &str, cwd: &Path, name: &str) -> Result<PathBuf, ShellError> {
    let as_error = |check: ExecCheck| match check {
        ExecCheck::Missing => ShellError::NotFound { name: name.into() },
        ExecCheck::NotExecutable => ShellError::NotExecutable { name: name.into() },
    };

    if name.starts_with('/') {
        let path = PathBuf::from(name);
        return check_executable(&path).map(|_| path).map_err(as_error);
    }
    if name.contains('/') {
        let path = clean_join(cwd, name);
        return check_executable(&path).map(|_| path).map_err(as_error);
    }
    for dir in path_var.split(':') {
        let base = if dir.is_empty() {
            cwd.to_path_buf()
        } else {
            clean_join(cwd, dir)
        };
        let candidate = base.join(name);
        if check_executable(&candidate).is_ok() {
            return Ok(candidate);
        }
    }
    Err(ShellError::NotFound { name: name.into() })
}

/// Resolve a `cd` target to an existing directory.
pub fn look_dir(cwd: &Path, path: &str) -> Result<PathBuf, ShellError> {
    let resolved = clean_join(cwd, path);
    let meta = std::fs::metadata(&resolved).map_err(|e| {
        ShellError::Io(std::io::Error::new(e.kind(), format!("{path}: {e}")))
    })?;
    if meta.is_dir() {
        Ok(resolved)
    } else {
        Err(ShellError::Io(std::io::Error::new(
            std::io::ErrorKind::NotADirectory,
            format!("{path}: not a directory"),
        )))
    }
}

/// Join `path` onto `base` (unless absolute) and squash `.` and `..`
/// lexically, the way a prompt wants to display the result.
pub fn clean_join(base: &Path, path: &str) -> PathBuf {
    let p = Path::new(path);
    let joined = if p.is_absolute() {
        p.to_path_buf()
    } else {
        base.join(p)
    };
    let mut out = PathBuf::new();
    for comp in joined.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn make_exec(path: &Path) {
        std::fs::write(path, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[test]
    fn clean_join_squashes_dots() {
        let base = Path::new("/home/user");
        assert_eq!(clean_join(base, "x/./y"), PathBuf::from("/home/user/x/y"));
        assert_eq!(clean_join(base, ".."), PathBuf::from("/home"));
        assert_eq!(clean_join(base, "../../../.."), PathBuf::from("/"));
        assert_eq!(clean_join(base, "/etc"), PathBuf::from("/etc"));
    }

    #[test]
    fn bare_names_walk_the_path_variable() {
        let tmp = tempfile::tempdir().unwrap();
        let bin = tmp.path().join("bin");
        std::fs::create_dir(&bin).unwrap();
        make_exec(&bin.join("tool"));

        let path_var = format!("/definitely/absent:{}", bin.display());
        let found = look_path(&path_var, Path::new("/"), "tool").unwrap();
        assert_eq!(found, bin.join("tool"));
    }

    #[test]
    fn empty_path_component_means_the_working_directory() {
        let tmp = tempfile::tempdir().unwrap();
        make_exec(&tmp.path().join("here"));

        let found = look_path(":/usr/bin", tmp.path(), "here").unwrap();
        assert_eq!(found, tmp.path().join("here"));
    }

    #[test]
    fn slash_names_skip_the_path_variable() {
        let tmp = tempfile::tempdir().unwrap();
        let sub = tmp.path().join("sub");
        std::fs::create_dir(&sub).unwrap();
        make_exec(&sub.join("tool"));

        let found = look_path("/usr/bin", tmp.path(), "sub/tool").unwrap();
        assert_eq!(found, sub.join("tool"));
        assert!(matches!(
            look_path("/usr/bin", tmp.path(), "sub/absent"),
            Err(ShellError::NotFound { .. })
        ));
    }

    #[test]
    fn execute_bit_is_required() {
        let tmp = tempfile::tempdir().unwrap();
        let plain = tmp.path().join("plain");
        std::fs::write(&plain, "data").unwrap();
        std::fs::set_permissions(&plain, std::fs::Permissions::from_mode(0o644)).unwrap();

        let name = format!("{}", plain.display());
        assert!(matches!(
            look_path("", Path::new("/"), &name),
            Err(ShellError::NotExecutable { .. })
        ));
    }

    #[test]
    fn look_dir_rejects_files() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("file"), "").unwrap();
        assert!(look_dir(tmp.path(), "file").is_err());
        assert!(matches!(
            look_dir(tmp.path(), "missing"),
            Err(ShellError::Io(_))
        ));
        let sub = tmp.path().join("sub");
        std::fs::create_dir(&sub).unwrap();
        assert_eq!(look_dir(tmp.path(), "sub").unwrap(), sub);
    }
}
