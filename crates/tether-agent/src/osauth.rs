//! Host account database lookup
//!
//! Resolves a username to UID/GID/home/shell via the host account database
//! (`getent`), with supplementary groups from a separate membership query.
//! A miss never fails outright: single-user and account-database-less hosts
//! degrade to process-level defaults, flagged as such so callers can apply
//! their own policy.

use std::path::PathBuf;
use std::process::Command;

/// A read-only snapshot of one local account.
///
/// Fetched per request; never cached, since host account state can change
/// between calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalAccount {
    pub uid: u32,
    pub gid: u32,
    pub username: String,
    pub name: String,
    pub home: PathBuf,
    pub shell: String,
}

/// Result of an account lookup: either a real database record or a
/// best-effort fallback built from the process environment.
#[derive(Debug, Clone)]
pub enum Account {
    Known(LocalAccount),
    Fallback(LocalAccount),
}

impl Account {
    pub fn record(&self) -> &LocalAccount {
        match self {
            Account::Known(account) | Account::Fallback(account) => account,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Account::Known(_))
    }
}

/// Look up `username` in the host account database.
pub fn lookup(username: &str) -> Account {
    match getent_passwd(username) {
        Some(account) => Account::Known(account),
        None => {
            tracing::debug!(username, "account not in host database, using process defaults");
            Account::Fallback(fallback_account(username))
        }
    }
}

/// Supplementary group IDs for `username`. Empty when membership cannot be
/// resolved; callers fall back to the primary GID.
pub fn supplementary_groups(username: &str) -> Vec<u32> {
    let output = match Command::new("id").args(["-G", username]).output() {
        Ok(output) if output.status.success() => output,
        _ => return Vec::new(),
    };

    String::from_utf8_lossy(&output.stdout)
        .split_whitespace()
        .filter_map(|gid| gid.parse().ok())
        .collect()
}

fn getent_passwd(username: &str) -> Option<LocalAccount> {
    let output = Command::new("getent")
        .args(["passwd", username])
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    parse_passwd_line(String::from_utf8_lossy(&output.stdout).trim())
}

/// Parse one `name:x:uid:gid:gecos:home:shell` passwd entry.
fn parse_passwd_line(line: &str) -> Option<LocalAccount> {
    let fields: Vec<&str> = line.split(':').collect();
    if fields.len() < 7 {
        return None;
    }

    Some(LocalAccount {
        username: fields[0].to_string(),
        uid: fields[2].parse().ok()?,
        gid: fields[3].parse().ok()?,
        name: fields[4].split(',').next().unwrap_or("").to_string(),
        home: PathBuf::from(fields[5]),
        shell: fields[6].to_string(),
    })
}

/// Process-level defaults for hosts without a usable account database:
/// environment-derived UID/home/shell, real ids otherwise.
fn fallback_account(username: &str) -> LocalAccount {
    let uid = std::env::var("UID")
        .ok()
        .and_then(|uid| uid.parse().ok())
        .unwrap_or_else(|| rustix::process::getuid().as_raw());

    LocalAccount {
        uid,
        gid: rustix::process::getgid().as_raw(),
        username: username.to_string(),
        name: String::new(),
        home: PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| "/".to_string())),
        shell: std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string()),
    }
}
