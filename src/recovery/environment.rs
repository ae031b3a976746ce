//! Directory preparation before a worker is launched.
//!
//! Every directory a role needs must exist and be readable and writable.
//! A directory that is not gets one permission correction (`0o755`); if it
//! is still inaccessible afterwards the launch cannot proceed.

use crate::config::SessionPaths;
use crate::errors::EnvironmentError;
use crate::worker::{LaunchConfig, RoleProfile};
use std::path::Path;
use tracing::{info, warn};

/// Ensure the role's directories are usable and return its launch config.
/// The profile decides how the directories reach the agent's command line.
pub fn prepare_environment(
    profile: &RoleProfile,
    paths: &SessionPaths,
    skip_env_check: bool,
) -> Result<LaunchConfig, EnvironmentError> {
    let role = profile.role;
    let required_dirs = paths.required_dirs();

    for dir in &required_dirs {
        if !dir.exists() {
            info!(role = %role, dir = %dir.display(), "Creating directory");
            std::fs::create_dir_all(dir).map_err(|e| EnvironmentError::CreateFailed {
                path: dir.clone(),
                source: e,
            })?;
        }
    }

    for dir in &required_dirs {
        if is_accessible(dir) {
            continue;
        }
        warn!(role = %role, dir = %dir.display(), "Fixing directory permissions");
        if let Err(e) = fix_permissions(dir) {
            warn!(dir = %dir.display(), error = %e, "Permission correction failed");
        }
        if !is_accessible(dir) {
            return Err(EnvironmentError::Inaccessible { path: dir.clone() });
        }
    }

    Ok(LaunchConfig {
        required_dirs,
        working_dir: paths.target_dir.clone(),
        skip_env_check,
    })
}

#[cfg(unix)]
fn is_accessible(dir: &Path) -> bool {
    use std::os::unix::ffi::OsStrExt;

    let Ok(c_path) = std::ffi::CString::new(dir.as_os_str().as_bytes()) else {
        return false;
    };
    // SAFETY: access(2) reads a valid NUL-terminated path.
    unsafe { libc::access(c_path.as_ptr(), libc::R_OK | libc::W_OK) == 0 }
}

#[cfg(not(unix))]
fn is_accessible(dir: &Path) -> bool {
    std::fs::metadata(dir)
        .map(|m| !m.permissions().readonly())
        .unwrap_or(false)
}

#[cfg(unix)]
fn fix_permissions(dir: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn fix_permissions(dir: &Path) -> std::io::Result<()> {
    let mut perms = std::fs::metadata(dir)?.permissions();
    perms.set_readonly(false);
    std::fs::set_permissions(dir, perms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Role;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn paths(dir: &TempDir) -> SessionPaths {
        SessionPaths::new(
            dir.path().join("sessions/orch_1"),
            dir.path().join("target"),
            dir.path().join(".triad"),
        )
    }

    #[test]
    fn test_creates_missing_directories() {
        let dir = TempDir::new().unwrap();
        let paths = paths(&dir);
        let config = prepare_environment(RoleProfile::for_role(Role::Architect), &paths, false).unwrap();

        assert!(paths.workspace_dir.is_dir());
        assert!(paths.target_dir.is_dir());
        assert!(paths.support_dir.is_dir());
        assert_eq!(config.required_dirs.len(), 3);
        assert_eq!(config.working_dir, paths.target_dir);
        assert!(!config.skip_env_check);
    }

    #[test]
    fn test_skip_flag_is_carried() {
        let dir = TempDir::new().unwrap();
        let profile = RoleProfile::for_role(Role::Reviewer);
        let config = prepare_environment(profile, &paths(&dir), true).unwrap();
        assert!(config.skip_env_check);
        let args = profile.build_args(&config, &[], "review");
        assert!(args.contains(&"--skip-git-repo-check".to_string()));
        assert!(args.contains(&dir.path().join("target").display().to_string()));
    }

    #[cfg(unix)]
    #[test]
    fn test_fixes_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let paths = paths(&dir);
        std::fs::create_dir_all(&paths.target_dir).unwrap();
        std::fs::set_permissions(&paths.target_dir, std::fs::Permissions::from_mode(0o500))
            .unwrap();

        // root passes access(2) regardless of mode bits
        let needed_fix = !is_accessible(&paths.target_dir);

        prepare_environment(RoleProfile::for_role(Role::Implementer), &paths, false).unwrap();
        assert!(is_accessible(&paths.target_dir));
        if needed_fix {
            let mode = std::fs::metadata(&paths.target_dir)
                .unwrap()
                .permissions()
                .mode();
            assert_eq!(mode & 0o700, 0o700);
        }
    }

    #[test]
    fn test_uncreatable_directory_is_fatal() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "not a dir").unwrap();
        let paths = SessionPaths::new(
            dir.path().join("ws"),
            blocker.join("target"),
            PathBuf::from(dir.path()),
        );
        let err = prepare_environment(RoleProfile::for_role(Role::Architect), &paths, false).unwrap_err();
        assert!(matches!(err, EnvironmentError::CreateFailed { .. }));
    }
}
