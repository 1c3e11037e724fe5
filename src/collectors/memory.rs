use crate::collectors::command::CommandRunner;
use crate::collectors::extract::compile;
use crate::config::Config;
use crate::snapshot::{pct_of, MemoryStat};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

pub const SYSCTL_MEMSIZE: &str = "sysctl -n hw.memsize";
pub const VM_STAT: &str = "vm_stat";

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

static PAGE_SIZE: Lazy<Option<Regex>> = Lazy::new(|| compile(r"page size of (\d+) bytes"));

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageCounts {
    pub page_size: Option<u64>,
    pub free: u64,
    pub active: u64,
    pub inactive: u64,
    pub speculative: u64,
    pub wired: u64,
    pub compressed: u64,
    pub purgeable: u64,
}

pub async fn collect<R: CommandRunner>(runner: &R, cfg: &Config) -> MemoryStat {
    let (memsize, vm_stat) = tokio::join!(runner.run(SYSCTL_MEMSIZE), runner.run(VM_STAT));
    let total = memsize.trim().parse::<u64>().unwrap_or(0);
    compute(total, parse_vm_stat(&vm_stat).as_ref(), cfg.default_page_size)
}

const COUNTER_LABELS: [&str; 7] = [
    "Pages free",
    "Pages active",
    "Pages inactive",
    "Pages speculative",
    "Pages wired down",
    "Pages occupied by compressor",
    "Pages purgeable",
];

/// `None` when the report carries none of the page counters.
pub fn parse_vm_stat(text: &str) -> Option<PageCounts> {
    let page_size = PAGE_SIZE
        .as_ref()
        .and_then(|re| re.captures(text))
        .and_then(|caps| caps.get(1)?.as_str().parse::<u64>().ok())
        .filter(|size| *size > 0);

    let counters: HashMap<&str, u64> = text
        .lines()
        .filter_map(|line| {
            let (label, value) = line.split_once(':')?;
            let value = value.trim().trim_end_matches('.').parse::<u64>().ok()?;
            Some((label.trim(), value))
        })
        .collect();
    if !COUNTER_LABELS.iter().any(|label| counters.contains_key(label)) {
        return None;
    }
    let get = |label: &str| counters.get(label).copied().unwrap_or(0);

    Some(PageCounts {
        page_size,
        free: get("Pages free"),
        active: get("Pages active"),
        inactive: get("Pages inactive"),
        speculative: get("Pages speculative"),
        wired: get("Pages wired down"),
        compressed: get("Pages occupied by compressor"),
        purgeable: get("Pages purgeable"),
    })
}

pub fn compute(total_bytes: u64, pages: Option<&PageCounts>, default_page_size: u64) -> MemoryStat {
    if total_bytes == 0 {
        return MemoryStat::default();
    }
    let total_gb = total_bytes as f64 / GIB;
    let Some(pages) = pages else {
        return MemoryStat {
            total_gb,
            ..MemoryStat::default()
        };
    };
    let page_size = pages.page_size.unwrap_or(default_page_size);
    let bytes = |count: u64| count.saturating_mul(page_size);
    let gib = |count: u64| bytes(count) as f64 / GIB;

    let available = bytes(pages.free)
        .saturating_add(bytes(pages.inactive))
        .saturating_add(bytes(pages.speculative))
        .saturating_add(bytes(pages.purgeable));
    let used = total_bytes.saturating_sub(available);

    MemoryStat {
        total_gb,
        used_gb: used as f64 / GIB,
        used_pct: pct_of(used as f64, total_bytes as f64),
        app_gb: gib(pages.active.saturating_add(pages.wired)),
        wired_gb: gib(pages.wired),
        compressed_gb: gib(pages.compressed),
        cached_gb: gib(
            pages
                .inactive
                .saturating_add(pages.purgeable)
                .saturating_add(pages.speculative),
        ),
        free_gb: gib(pages.free),
        page_size,
    }
}
