//! Privileged command execution
//!
//! Turns an authorized remote request into a correctly-scoped local
//! process: a scrubbed four-variable environment, the account's home as
//! working directory, and credentials dropped to the target account when
//! the agent itself runs as root. Without root the context is built without
//! a credential override and the process inherits the agent's identity, a
//! degraded best-effort mode.

use std::path::PathBuf;

use tokio::process::Command;

use crate::osauth::LocalAccount;

/// Environment variable naming the service host inside spawned processes
pub const HOST_ENV_VAR: &str = "TETHER_HOST";

/// Target credentials applied before exec
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub uid: u32,
    pub gid: u32,
    /// Never empty: falls back to the primary GID
    pub groups: Vec<u32>,
}

/// A fully specified process launch descriptor, built fresh per invocation.
#[derive(Debug)]
pub struct ExecutionContext {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub dir: PathBuf,
    /// Present only when the agent can drop privileges
    pub credentials: Option<Credentials>,
}

/// Whether the current process can assume another account's identity
pub fn can_drop_privileges() -> bool {
    rustix::process::geteuid().is_root()
}

/// Build the launch descriptor for `command` under `account`.
///
/// `command` is the binary plus arguments and must be non-empty; callers
/// validate before building.
/// `groups` is the account's resolved supplementary group set; when empty,
/// the primary GID stands in so the spawned process never runs with an
/// empty group list. `can_drop` is the capability check result, injected so
/// both modes are testable without root.
pub fn build_execution_context(
    account: &LocalAccount,
    groups: Vec<u32>,
    shell: &str,
    term: &str,
    host_label: &str,
    command: &[String],
    can_drop: bool,
) -> ExecutionContext {
    let env = vec![
        ("TERM".to_string(), term.to_string()),
        ("HOME".to_string(), account.home.display().to_string()),
        ("SHELL".to_string(), shell.to_string()),
        (HOST_ENV_VAR.to_string(), host_label.to_string()),
    ];

    let credentials = can_drop.then(|| Credentials {
        uid: account.uid,
        gid: account.gid,
        groups: if groups.is_empty() {
            vec![account.gid]
        } else {
            groups
        },
    });

    ExecutionContext {
        program: command[0].clone(),
        args: command[1..].to_vec(),
        env,
        dir: account.home.clone(),
        credentials,
    }
}

impl ExecutionContext {
    /// Produce the process builder: scrubbed environment, scoped working
    /// directory, credential drop applied between fork and exec.
    pub fn into_command(self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .env_clear()
            .envs(self.env)
            .current_dir(&self.dir);

        #[cfg(unix)]
        if let Some(credentials) = self.credentials {
            // Materialized before the fork: the pre_exec closure must not
            // allocate.
            let groups: Vec<libc::gid_t> =
                credentials.groups.iter().map(|&gid| gid as _).collect();
            let gid = credentials.gid;
            let uid = credentials.uid;

            // Safety: only raw syscalls between fork and exec.
            unsafe {
                cmd.pre_exec(move || apply_credentials(uid, gid, &groups));
            }
        }

        cmd
    }
}

/// Drop to the target credentials. Group changes must happen before the
/// uid change revokes the permission to make them.
#[cfg(unix)]
fn apply_credentials(uid: u32, gid: u32, groups: &[libc::gid_t]) -> std::io::Result<()> {
    if unsafe { libc::setgroups(groups.len() as _, groups.as_ptr()) } != 0 {
        return Err(std::io::Error::last_os_error());
    }

    if unsafe { libc::setgid(gid as _) } != 0 {
        return Err(std::io::Error::last_os_error());
    }

    if unsafe { libc::setuid(uid as _) } != 0 {
        return Err(std::io::Error::last_os_error());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account() -> LocalAccount {
        LocalAccount {
            uid: 1000,
            gid: 1000,
            username: "alice".to_string(),
            name: "Alice Example".to_string(),
            home: PathBuf::from("/home/alice"),
            shell: "/bin/bash".to_string(),
        }
    }

    fn command_line() -> Vec<String> {
        vec!["/bin/ls".to_string(), "-la".to_string()]
    }

    #[test]
    fn test_environment_is_exactly_four_variables() {
        let ctx = build_execution_context(
            &account(),
            vec![1000, 27],
            "/bin/bash",
            "xterm-256color",
            "cloud.example.com",
            &command_line(),
            true,
        );

        assert_eq!(ctx.env.len(), 4);
        let names: Vec<&str> = ctx.env.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(names, ["TERM", "HOME", "SHELL", "TETHER_HOST"]);

        let host = ctx.env.iter().find(|(k, _)| k == HOST_ENV_VAR).unwrap();
        assert_eq!(host.1, "cloud.example.com");
    }

    #[test]
    fn test_working_directory_is_account_home() {
        let ctx = build_execution_context(
            &account(),
            vec![],
            "/bin/bash",
            "xterm",
            "host",
            &command_line(),
            false,
        );
        assert_eq!(ctx.dir, PathBuf::from("/home/alice"));
    }

    #[test]
    fn test_empty_supplementary_groups_fall_back_to_primary_gid() {
        let ctx = build_execution_context(
            &account(),
            vec![],
            "/bin/bash",
            "xterm",
            "host",
            &command_line(),
            true,
        );

        let credentials = ctx.credentials.unwrap();
        assert_eq!(credentials.groups, vec![1000]);
    }

    #[test]
    fn test_resolved_groups_are_kept() {
        let ctx = build_execution_context(
            &account(),
            vec![1000, 27, 999],
            "/bin/bash",
            "xterm",
            "host",
            &command_line(),
            true,
        );

        assert_eq!(ctx.credentials.unwrap().groups, vec![1000, 27, 999]);
    }

    #[test]
    fn test_unprivileged_context_has_no_credentials() {
        let ctx = build_execution_context(
            &account(),
            vec![1000],
            "/bin/bash",
            "xterm",
            "host",
            &command_line(),
            false,
        );

        assert!(ctx.credentials.is_none());
    }

    #[test]
    fn test_command_line_split() {
        let ctx = build_execution_context(
            &account(),
            vec![],
            "/bin/bash",
            "xterm",
            "host",
            &command_line(),
            false,
        );

        assert_eq!(ctx.program, "/bin/ls");
        assert_eq!(ctx.args, vec!["-la".to_string()]);
    }
}
