use crate::collectors::command::{shell_quote, CommandRunner};
use crate::collectors::extract::{FieldKind, FieldSet};
use crate::config::Config;
use crate::snapshot::{clamp_pct, CpuStat};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

pub const TOP_CPU: &str = "top -l 1 -n 0 | grep 'CPU usage'";
pub const PMSET_THERM: &str = "pmset -g therm";
pub const POWERMETRICS_SMC: &str = "sudo -n powermetrics --samplers smc -i 1 -n 1";

static THERMAL_FIELDS: Lazy<FieldSet> =
    Lazy::new(|| FieldSet::new(&[("CPU_Speed_Limit", FieldKind::Int)]));

static CELSIUS: Lazy<Option<Regex>> =
    Lazy::new(|| super::extract::compile(r"(-?\d+(?:\.\d+)?)\s*°?\s*C\b"));
static DIE_TEMP: Lazy<Option<Regex>> = Lazy::new(|| {
    super::extract::compile(r"(?i)CPU die temperature:\s*(-?\d+(?:\.\d+)?)")
});
static RPM: Lazy<Option<Regex>> = Lazy::new(|| super::extract::compile(r"(?i)(\d+)\s*rpm\b"));

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ThermalReading {
    pub temp_c: f64,
    pub fan_rpm: u32,
}

impl ThermalReading {
    fn is_known(&self) -> bool {
        self.temp_c > 0.0
    }
}

pub async fn collect<R: CommandRunner>(runner: &R, cfg: &Config) -> CpuStat {
    let (usage, therm, thermal) = tokio::join!(
        runner.run(TOP_CPU),
        runner.run(PMSET_THERM),
        read_temperature(runner, cfg),
    );

    CpuStat {
        usage_pct: parse_cpu_usage(&usage),
        throttle_pct: parse_throttle(&therm),
        temp_c: thermal.temp_c,
        fan_rpm: thermal.fan_rpm,
    }
}

pub fn parse_cpu_usage(text: &str) -> f64 {
    let Some(line) = text.lines().find(|l| l.contains("CPU usage")) else {
        return 0.0;
    };
    let body = line.split_once(':').map_or(line, |(_, rest)| rest);

    let mut user = 0.0;
    let mut sys = 0.0;
    for part in body.split(',') {
        let mut words = part.split_whitespace();
        let (Some(value), Some(label)) = (words.next(), words.next()) else {
            continue;
        };
        let Ok(value) = value.trim_end_matches('%').parse::<f64>() else {
            continue;
        };
        match label {
            "user" => user = value,
            "sys" => sys = value,
            _ => {}
        }
    }
    clamp_pct(user + sys)
}

pub fn parse_throttle(text: &str) -> u8 {
    let fields = THERMAL_FIELDS.extract(text);
    fields.int_or("CPU_Speed_Limit", 100).clamp(0, 100) as u8
}

async fn read_temperature<R: CommandRunner>(runner: &R, cfg: &Config) -> ThermalReading {
    let helper = shell_quote(&cfg.helpers.temperature_helper);
    if !runner.run(&format!("command -v {helper}")).await.trim().is_empty() {
        let fan_command = format!("{helper} -f");
        let (temp, fans) = tokio::join!(runner.run(&helper), runner.run(&fan_command));
        let reading = parse_helper_output(&temp, &fans);
        if reading.is_known() {
            debug!(source = %cfg.helpers.temperature_helper, "cpu temperature from helper");
            return reading;
        }
    }

    let reading = parse_powermetrics(&runner.run(POWERMETRICS_SMC).await);
    if reading.is_known() {
        debug!(source = "powermetrics", "cpu temperature from smc sampler");
    }
    reading
}

/// Temperature helper prints `61.8°C`; its `-f` mode lists fans as `... at 1992 RPM ...`.
pub fn parse_helper_output(temp: &str, fans: &str) -> ThermalReading {
    ThermalReading {
        temp_c: first_float(CELSIUS.as_ref(), temp),
        fan_rpm: max_rpm(fans),
    }
}

/// `powermetrics --samplers smc` reports `CPU die temperature: 45.50 C` and `Fan: 1999 rpm`.
pub fn parse_powermetrics(text: &str) -> ThermalReading {
    ThermalReading {
        temp_c: first_float(DIE_TEMP.as_ref(), text),
        fan_rpm: max_rpm(text),
    }
}

fn first_float(re: Option<&Regex>, text: &str) -> f64 {
    re.and_then(|re| re.captures(text))
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .filter(|v| *v > 0.0)
        .unwrap_or(0.0)
}

fn max_rpm(text: &str) -> u32 {
    let Some(re) = RPM.as_ref() else {
        return 0;
    };
    re.captures_iter(text)
        .filter_map(|caps| caps.get(1)?.as_str().parse::<u32>().ok())
        .max()
        .unwrap_or(0)
}
