use crate::collectors::command::CommandRunner;
use crate::collectors::extract::{FieldKind, FieldSet};
use crate::snapshot::{pct_u8, DiskStat, DiskStrategy};
use once_cell::sync::Lazy;
use tracing::debug;

// guarded so a missing toolchain never opens the command line tools prompt
pub const VOLUME_CAPACITY: &str = r#"xcode-select -p >/dev/null 2>&1 && swift -e 'import Foundation; let v = try! URL(fileURLWithPath: "/").resourceValues(forKeys: [.volumeTotalCapacityKey, .volumeAvailableCapacityKey, .volumeAvailableCapacityForImportantUsageKey]); print("total=\(v.volumeTotalCapacity ?? 0) available=\(v.volumeAvailableCapacity ?? 0) important=\(v.volumeAvailableCapacityForImportantUsage ?? 0)")'"#;
pub const DF_ROOT: &str = "df -k /";

const BYTES_PER_GB: f64 = 1e9;
const KBLOCKS_PER_GB: f64 = 1e6;

static CAPACITY_FIELDS: Lazy<FieldSet> = Lazy::new(|| {
    FieldSet::new(&[
        ("total", FieldKind::Uint),
        ("available", FieldKind::Uint),
        ("important", FieldKind::Uint),
    ])
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeCapacity {
    pub total_bytes: u64,
    pub available_bytes: u64,
    pub important_bytes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DfUsage {
    pub total_kb: u64,
    pub used_kb: u64,
    pub available_kb: u64,
}

pub async fn collect<R: CommandRunner>(runner: &R) -> DiskStat {
    if let Some(capacity) = parse_volume_capacity(&runner.run(VOLUME_CAPACITY).await) {
        return from_capacity(capacity);
    }
    debug!("precise volume capacity unavailable, falling back to df");

    match parse_df(&runner.run(DF_ROOT).await) {
        Some(usage) => from_df(usage),
        None => DiskStat::default(),
    }
}

pub fn parse_volume_capacity(text: &str) -> Option<VolumeCapacity> {
    let fields = CAPACITY_FIELDS.extract(text);
    let capacity = VolumeCapacity {
        total_bytes: fields.uint("total"),
        available_bytes: fields.uint("available"),
        important_bytes: fields.uint("important"),
    };
    (capacity.total_bytes > 0 && capacity.important_bytes > 0).then_some(capacity)
}

pub fn parse_df(text: &str) -> Option<DfUsage> {
    text.lines().skip(1).find_map(|line| {
        let mut cols = line.split_whitespace().skip(1);
        let mut next = || cols.next()?.parse::<u64>().ok();
        let usage = DfUsage {
            total_kb: next()?,
            used_kb: next()?,
            available_kb: next()?,
        };
        (usage.total_kb > 0).then_some(usage)
    })
}

pub fn from_capacity(capacity: VolumeCapacity) -> DiskStat {
    let total = capacity.total_bytes as f64 / BYTES_PER_GB;
    let important = capacity.important_bytes as f64 / BYTES_PER_GB;
    let available = capacity.available_bytes as f64 / BYTES_PER_GB;
    let purgeable = (important - available).max(0.0);
    let used = (total - important).clamp(0.0, total);

    DiskStat {
        total_gb: total,
        used_gb: used,
        free_gb: available,
        available_gb: important,
        purgeable_gb: purgeable,
        used_pct: pct_u8(used / total * 100.0),
        purge_capable: purgeable > 0.0,
        strategy: DiskStrategy::Precise,
    }
}

pub fn from_df(usage: DfUsage) -> DiskStat {
    let total = usage.total_kb as f64 / KBLOCKS_PER_GB;
    let used = (usage.used_kb as f64 / KBLOCKS_PER_GB).min(total);
    let available = usage.available_kb as f64 / KBLOCKS_PER_GB;

    DiskStat {
        total_gb: total,
        used_gb: used,
        free_gb: available,
        available_gb: available,
        purgeable_gb: 0.0,
        used_pct: pct_u8(used / total * 100.0),
        purge_capable: false,
        strategy: DiskStrategy::Fallback,
    }
}
