use crate::collectors::command::{shell_quote, CommandRunner};
use crate::config::HelperConfig;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub const SUDO_RULES: &str = "sudo -n -l";
const THIN_SNAPSHOTS: &str = "sudo -n tmutil thinlocalsnapshots / 999999999999 4";

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum PurgeAction {
    /// Flush the inactive memory cache.
    Memory,
    /// Thin local Time Machine snapshots on the root volume.
    Snapshots,
}

impl PurgeAction {
    pub fn command_line(self, cfg: &HelperConfig) -> String {
        match self {
            PurgeAction::Memory => format!("sudo -n {}", shell_quote(&cfg.purge_helper)),
            PurgeAction::Snapshots => THIN_SNAPSHOTS.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },
}

/// Starts the action and returns immediately. The returned handle resolves
/// once the command exits; dropping it leaves the command running.
pub fn trigger(action: PurgeAction, cfg: &HelperConfig) -> Result<JoinHandle<()>, ActionError> {
    spawn_logged(action, action.command_line(cfg))
}

fn spawn_logged(action: PurgeAction, command: String) -> Result<JoinHandle<()>, ActionError> {
    let mut child = Command::new("/bin/sh")
        .arg("-c")
        .arg(&command)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|source| ActionError::Spawn {
            command: command.clone(),
            source,
        })?;
    info!(?action, "purge action started");

    Ok(tokio::spawn(async move {
        match child.wait().await {
            Ok(status) if status.success() => info!(?action, "purge action finished"),
            Ok(status) => warn!(?action, %status, command = %command, "purge action failed"),
            Err(err) => warn!(?action, error = %err, "failed to wait for purge action"),
        }
    }))
}

/// Gives a triggered action up to `bound` to finish. Returns false when it is
/// still running; the command then outlives the caller.
pub async fn wait_bounded(handle: JoinHandle<()>, bound: Duration) -> bool {
    tokio::time::timeout(bound, handle).await.is_ok()
}

pub fn purge_capable_from_rules(rules: &str, purge_helper: &str) -> bool {
    rules.lines().any(|line| {
        let Some((_, commands)) = line.split_once("NOPASSWD:") else {
            return false;
        };
        commands
            .split(|c: char| c == ',' || c.is_whitespace())
            .any(|token| token == purge_helper || token == "ALL")
    })
}

pub async fn collect_purge_capable<R: CommandRunner>(runner: &R, cfg: &HelperConfig) -> bool {
    purge_capable_from_rules(&runner.run(SUDO_RULES).await, &cfg.purge_helper)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::command::fake::FakeRunner;

    const RULES: &str = "Matching Defaults entries for alice on mac:
    env_reset

User alice may run the following commands on mac:
    (ALL) ALL
    (root) NOPASSWD: /usr/sbin/purge
";

    #[test]
    fn detects_nopasswd_purge_rule() {
        assert!(purge_capable_from_rules(RULES, "/usr/sbin/purge"));
        assert!(!purge_capable_from_rules(RULES, "/usr/local/bin/purge"));
        assert!(purge_capable_from_rules("    (ALL) NOPASSWD: ALL\n", "/usr/sbin/purge"));
        assert!(!purge_capable_from_rules("    (ALL) ALL\n", "/usr/sbin/purge"));
        assert!(!purge_capable_from_rules("", "/usr/sbin/purge"));
    }

    #[test]
    fn helper_must_match_a_whole_command() {
        let helper = "/usr/sbin/purge";
        assert!(!purge_capable_from_rules("    (root) NOPASSWD: /usr/sbin/purge-foo\n", helper));
        assert!(!purge_capable_from_rules("    (root) NOPASSWD: /opt/usr/sbin/purge\n", helper));
        assert!(!purge_capable_from_rules("    (root) /usr/sbin/purge\n", helper));
        assert!(purge_capable_from_rules(
            "    (root) NOPASSWD: /usr/bin/tmutil, /usr/sbin/purge\n",
            helper
        ));
        assert!(purge_capable_from_rules("    (root) NOPASSWD: /usr/sbin/purge ''\n", helper));
    }

    #[test]
    fn command_lines() {
        let cfg = HelperConfig::default();
        assert_eq!(PurgeAction::Memory.command_line(&cfg), "sudo -n /usr/sbin/purge");
        assert_eq!(
            PurgeAction::Snapshots.command_line(&cfg),
            "sudo -n tmutil thinlocalsnapshots / 999999999999 4"
        );
    }

    #[tokio::test]
    async fn capability_comes_from_rule_listing() {
        let runner = FakeRunner::new().with(SUDO_RULES, RULES);
        assert!(collect_purge_capable(&runner, &HelperConfig::default()).await);
        assert!(!collect_purge_capable(&FakeRunner::new(), &HelperConfig::default()).await);
    }

    #[tokio::test]
    async fn trigger_returns_before_completion_and_never_panics() {
        let cfg = HelperConfig {
            purge_helper: "/nonexistent/purge".to_string(),
            ..HelperConfig::default()
        };
        let handle = trigger(PurgeAction::Memory, &cfg).expect("shell spawns");
        handle.await.expect("background task completes");
    }

    #[tokio::test]
    async fn bounded_wait_sees_completion() {
        let cfg = HelperConfig {
            purge_helper: "/nonexistent/purge".to_string(),
            ..HelperConfig::default()
        };
        let handle = trigger(PurgeAction::Memory, &cfg).expect("shell spawns");
        assert!(wait_bounded(handle, Duration::from_secs(5)).await);
    }

    #[tokio::test]
    async fn bounded_wait_gives_up_on_slow_action() {
        let handle =
            spawn_logged(PurgeAction::Snapshots, "sleep 2".to_string()).expect("shell spawns");
        assert!(!wait_bounded(handle, Duration::from_millis(100)).await);
    }
}
