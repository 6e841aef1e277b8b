// SPDX-License-Identifier: MIT

//! Agent identity: stable machine id, caller-name detection, unique-name
//! allocation, and the process-info blob registered alongside the agent.
//!
//! The machine id is a SHA-256 fingerprint of a platform hardware ID and is
//! the uniqueness scope for agent names. Name detection prefers an explicit
//! environment override, then a parent-process hint, then a hostname
//! fallback; whatever is detected is normalized to the name grammar
//! (3–64 chars of `[a-z0-9-]`, letter/digit at both ends, no dash runs)
//! before collision resolution.

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::mailbox::error::MailError;
use crate::storage::Storage;

/// Environment variables consulted for an explicit agent-name override,
/// in priority order.
const NAME_ENV_VARS: &[&str] = &["AI_AGENT_NAME", "AGENT_NAME", "MCP_CLIENT_NAME"];

/// Parent-process executable names mapped to well-known agent names.
const PROCESS_HINTS: &[(&str, &str)] = &[
    ("claude", "claude-desktop"),
    ("cursor", "cursor-ai"),
    ("code", "vscode-copilot"),
    ("zed", "zed-ai"),
    ("python", "python-agent"),
    ("node", "node-agent"),
];

// ─── Machine id ───────────────────────────────────────────────────────────────

/// Returns the stable machine identity string: SHA-256 hex of a platform
/// hardware ID. Deterministic, so every process on the host computes the
/// same value without coordination.
pub fn machine_id() -> String {
    match platform_hardware_id() {
        Ok(raw) => hex_sha256(raw.trim()),
        Err(e) => {
            // No stable hardware id on this platform; fall back to the
            // hostname, which is at least stable across restarts.
            warn!(err = %e, "no platform hardware ID; deriving machine id from hostname");
            hex_sha256(&format!("hostname:{}", short_hostname()))
        }
    }
}

/// Raw platform-specific hardware identifier.
fn platform_hardware_id() -> Result<String, std::io::Error> {
    #[cfg(target_os = "macos")]
    return macos_platform_uuid();

    #[cfg(target_os = "linux")]
    return linux_machine_id();

    #[cfg(target_os = "windows")]
    return windows_machine_guid();

    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    return Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "unsupported platform",
    ));
}

#[cfg(target_os = "macos")]
fn macos_platform_uuid() -> Result<String, std::io::Error> {
    // ioreg -rd1 -c IOPlatformExpertDevice (no external crate needed)
    let out = std::process::Command::new("ioreg")
        .args(["-rd1", "-c", "IOPlatformExpertDevice"])
        .output()?;
    let stdout = String::from_utf8_lossy(&out.stdout);
    for line in stdout.lines() {
        if line.contains("IOPlatformUUID") {
            if let Some(start) = line.rfind('"') {
                let tail = &line[..start];
                if let Some(end) = tail.rfind('"') {
                    return Ok(line[end + 1..start].to_string());
                }
            }
        }
    }
    Err(std::io::Error::new(
        std::io::ErrorKind::NotFound,
        "IOPlatformUUID not found in ioreg output",
    ))
}

#[cfg(target_os = "linux")]
fn linux_machine_id() -> Result<String, std::io::Error> {
    std::fs::read_to_string("/etc/machine-id")
        .or_else(|_| std::fs::read_to_string("/var/lib/dbus/machine-id"))
}

#[cfg(target_os = "windows")]
fn windows_machine_guid() -> Result<String, std::io::Error> {
    let out = std::process::Command::new("reg")
        .args([
            "query",
            r"HKLM\SOFTWARE\Microsoft\Cryptography",
            "/v",
            "MachineGuid",
        ])
        .output()?;
    let stdout = String::from_utf8_lossy(&out.stdout);
    for line in stdout.lines() {
        if line.contains("MachineGuid") {
            if let Some(guid) = line.split_whitespace().last() {
                return Ok(guid.to_string());
            }
        }
    }
    Err(std::io::Error::new(
        std::io::ErrorKind::NotFound,
        "MachineGuid not found in registry output",
    ))
}

fn hex_sha256(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}

// ─── Name detection ───────────────────────────────────────────────────────────

/// Detect the calling agent's base name, already normalized to the grammar.
///
/// Resolution order: explicit env override, parent-process hint, hostname
/// fallback. The result is a valid name; collision resolution happens
/// separately against the agent table.
pub fn detect_agent_name() -> String {
    for var in NAME_ENV_VARS {
        if let Ok(value) = std::env::var(var) {
            if let Some(name) = sanitize_name(&value) {
                debug!(source = var, name = %name, "agent name from environment");
                return name;
            }
        }
    }

    if let Some(parent) = parent_process_name() {
        let parent = parent.to_lowercase();
        for (needle, agent) in PROCESS_HINTS {
            if parent.contains(needle) {
                debug!(parent = %parent, name = agent, "agent name from parent process");
                return (*agent).to_string();
            }
        }
    }

    fallback_name()
}

/// `agent-<short-hostname>` — always grammar-valid thanks to the prefix.
pub fn fallback_name() -> String {
    sanitize_name(&format!("agent-{}", short_hostname()))
        .unwrap_or_else(|| "agent-localhost".to_string())
}

fn short_hostname() -> String {
    let raw = std::env::var("HOSTNAME")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .or_else(|| std::fs::read_to_string("/etc/hostname").ok())
        .or_else(|| {
            std::process::Command::new("hostname")
                .output()
                .ok()
                .and_then(|o| String::from_utf8(o.stdout).ok())
        })
        .unwrap_or_default();
    let trimmed = raw.trim();
    let short = trimmed.split('.').next().unwrap_or("");
    if short.is_empty() {
        "localhost".to_string()
    } else {
        short.to_string()
    }
}

#[cfg(unix)]
fn parent_process_name() -> Option<String> {
    let ppid = std::os::unix::process::parent_id();
    #[cfg(target_os = "linux")]
    {
        if let Ok(comm) = std::fs::read_to_string(format!("/proc/{ppid}/comm")) {
            return Some(comm.trim().to_string());
        }
    }
    // Portable fallback (macOS and friends): ask ps for the command name.
    let out = std::process::Command::new("ps")
        .args(["-o", "comm=", "-p", &ppid.to_string()])
        .output()
        .ok()?;
    let name = String::from_utf8_lossy(&out.stdout).trim().to_string();
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

#[cfg(not(unix))]
fn parent_process_name() -> Option<String> {
    None
}

// ─── Name grammar ─────────────────────────────────────────────────────────────

/// Normalize a raw name to the grammar: lowercase, invalid chars collapsed
/// to single dashes, edges trimmed, capped at 64. Returns `None` when the
/// result is shorter than 3 chars — callers then use [`fallback_name`].
pub fn sanitize_name(raw: &str) -> Option<String> {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.trim().to_lowercase().chars() {
        let mapped = if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            ch
        } else {
            '-'
        };
        if mapped == '-' && (out.is_empty() || out.ends_with('-')) {
            continue;
        }
        out.push(mapped);
    }
    let mut out = out.trim_end_matches('-').to_string();
    if out.len() > 64 {
        out.truncate(64);
        out = out.trim_end_matches('-').to_string();
    }
    if out.len() < 3 {
        None
    } else {
        Some(out)
    }
}

/// Check a name against the grammar without normalizing it.
pub fn is_valid_name(name: &str) -> bool {
    if name.len() < 3 || name.len() > 64 {
        return false;
    }
    let bytes = name.as_bytes();
    let edge_ok = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    if !edge_ok(bytes[0]) || !edge_ok(bytes[bytes.len() - 1]) {
        return false;
    }
    if name.contains("--") {
        return false;
    }
    name.bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
}

/// Resolve a name collision against the agent table: `base`, then `base-2`,
/// `base-3`, … until a free `(name, machine_id)` slot is found.
pub async fn ensure_unique_name(
    storage: &Storage,
    base: &str,
    machine_id: &str,
) -> Result<String, MailError> {
    if storage.find_agent(base, machine_id).await?.is_none() {
        return Ok(base.to_string());
    }
    let mut n: u32 = 2;
    loop {
        let candidate = format!("{base}-{n}");
        if storage.find_agent(&candidate, machine_id).await?.is_none() {
            return Ok(candidate);
        }
        n += 1;
    }
}

/// Diagnostic blob stored in `agents.process_info`.
pub fn process_info() -> serde_json::Value {
    serde_json::json!({
        "pid": std::process::id(),
        "platform": std::env::consts::OS,
        "version": env!("CARGO_PKG_VERSION"),
        "started_at": crate::mailbox::model::now_iso(),
    })
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_lowercases_and_replaces_invalid_chars() {
        assert_eq!(sanitize_name("Claude Desktop"), Some("claude-desktop".into()));
        assert_eq!(sanitize_name("GPT_Agent.v2"), Some("gpt-agent-v2".into()));
    }

    #[test]
    fn sanitize_collapses_dash_runs_and_trims_edges() {
        assert_eq!(sanitize_name("--my---agent--"), Some("my-agent".into()));
        assert_eq!(sanitize_name("...bot..."), Some("bot".into()));
    }

    #[test]
    fn sanitize_rejects_too_short_results() {
        assert_eq!(sanitize_name(""), None);
        assert_eq!(sanitize_name("!!"), None);
        assert_eq!(sanitize_name("ab"), None);
    }

    #[test]
    fn sanitize_caps_at_64_chars() {
        let long = "x".repeat(100);
        let name = sanitize_name(&long).unwrap();
        assert_eq!(name.len(), 64);
        assert!(is_valid_name(&name));
    }

    #[test]
    fn sanitized_names_satisfy_the_grammar() {
        for raw in ["Claude Desktop", "a b c", "UPPER", "x9--y", "trailing-"] {
            if let Some(name) = sanitize_name(raw) {
                assert!(is_valid_name(&name), "invalid after sanitize: {name}");
            }
        }
    }

    #[test]
    fn grammar_rejects_bad_shapes() {
        assert!(!is_valid_name("ab"));
        assert!(!is_valid_name("-abc"));
        assert!(!is_valid_name("abc-"));
        assert!(!is_valid_name("a--b"));
        assert!(!is_valid_name("Has-Upper"));
        assert!(!is_valid_name(&"x".repeat(65)));
        assert!(is_valid_name("claude-desktop-2"));
        assert!(is_valid_name("a2c"));
    }

    #[test]
    fn sha256_is_deterministic() {
        assert_eq!(hex_sha256("host"), hex_sha256("host"));
        assert_eq!(hex_sha256("host").len(), 64);
        assert_ne!(hex_sha256("a"), hex_sha256("b"));
    }

    #[test]
    fn fallback_name_is_always_valid() {
        assert!(is_valid_name(&fallback_name()));
    }
}
