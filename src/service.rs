//! Invocation of the local service-control utility.
//!
//! This is the one external collaborator the agent calls into: it resolves
//! `service` on `PATH`, spawns it with `<service-name> <cmd>`, and captures
//! its exit code and output streams to completion. Platform-specific path
//! resolution for the utility itself is treated as opaque — only the
//! PATH-lookup fallback is implemented here.

use tokio::process::Command;

use crate::hostinfo;
use crate::messages::ResultDetail;

/// Locate `service` on `PATH`. Returns `None` if no directory on `PATH`
/// contains an executable by that name.
pub fn find_service_utility() -> Option<std::path::PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var).find_map(|dir| {
        let candidate = dir.join("service");
        if is_executable(&candidate) {
            Some(candidate)
        } else {
            None
        }
    })
}

#[cfg(unix)]
fn is_executable(path: &std::path::Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &std::path::Path) -> bool {
    path.is_file()
}

/// Run `service <name> <cmd>` to completion and build the resulting detail block.
///
/// Returns `Err` only when the utility itself cannot be located; a utility
/// that runs and fails is reported through `returncode`/`stderr`, not an error.
pub async fn invoke(service_name: &str, cmd: &str) -> Result<ResultDetail, String> {
    let utility = find_service_utility()
        .ok_or_else(|| "Unable to determine location to service(8)".to_string())?;

    let output = Command::new(utility)
        .arg(service_name)
        .arg(cmd)
        .output()
        .await
        .map_err(|e| format!("failed to spawn service(8): {e}"))?;

    Ok(ResultDetail {
        node: hostinfo::node_name(),
        service: service_name.to_string(),
        returncode: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        system: hostinfo::system_name(),
        version: hostinfo::system_version(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_utility_reports_unlocatable() {
        let saved = std::env::var_os("PATH");
        std::env::set_var("PATH", "/nonexistent/dir/for/test");

        let result = invoke("sshd", "status").await;

        if let Some(path) = saved {
            std::env::set_var("PATH", path);
        }

        assert_eq!(
            result.unwrap_err(),
            "Unable to determine location to service(8)"
        );
    }

    #[test]
    fn find_service_utility_returns_none_on_empty_path() {
        let saved = std::env::var_os("PATH");
        std::env::set_var("PATH", "");

        let found = find_service_utility();

        if let Some(path) = saved {
            std::env::set_var("PATH", path);
        }

        assert!(found.is_none());
    }
}
