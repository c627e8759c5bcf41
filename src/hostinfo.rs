//! Local host identity: node name and OS family/version.

use std::process::Command;

/// The host's node name, used as one of the agent's implicit topic subscriptions.
pub fn node_name() -> String {
    gethostname::gethostname()
        .into_string()
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown-node".to_string())
}

/// The OS family name (e.g. `Linux`, `FreeBSD`, `Darwin`), used as the
/// other implicit topic subscription.
pub fn system_name() -> String {
    Command::new("uname")
        .arg("-s")
        .output()
        .ok()
        .filter(|out| out.status.success())
        .map(|out| String::from_utf8_lossy(&out.stdout).trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| capitalize(std::env::consts::OS))
}

/// The OS release/version string reported alongside result payloads.
pub fn system_version() -> String {
    Command::new("uname")
        .arg("-r")
        .output()
        .ok()
        .filter(|out| out.status.success())
        .map(|out| String::from_utf8_lossy(&out.stdout).trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
