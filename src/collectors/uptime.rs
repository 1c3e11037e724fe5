use crate::collectors::command::CommandRunner;
use crate::collectors::extract::{FieldKind, FieldSet};
use once_cell::sync::Lazy;

pub const SYSCTL_BOOTTIME: &str = "sysctl -n kern.boottime";

static BOOTTIME_FIELDS: Lazy<FieldSet> = Lazy::new(|| FieldSet::new(&[("sec", FieldKind::Int)]));

pub async fn collect<R: CommandRunner>(runner: &R, now_unix: u64) -> String {
    match parse_boot_time(&runner.run(SYSCTL_BOOTTIME).await) {
        Some(boot) => format_uptime(now_unix.saturating_sub(boot)),
        None => String::new(),
    }
}

/// `kern.boottime` prints `{ sec = 1700000000, usec = 123456 } Tue Nov 14 22:13:20 2023`.
pub fn parse_boot_time(text: &str) -> Option<u64> {
    let fields = BOOTTIME_FIELDS.extract(text);
    u64::try_from(fields.int("sec")).ok().filter(|sec| *sec > 0)
}

pub fn format_uptime(secs: u64) -> String {
    let days = secs / 86_400;
    let hours = secs % 86_400 / 3_600;
    let minutes = secs % 3_600 / 60;

    if days > 0 {
        format!("{days}d {hours}h")
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}
