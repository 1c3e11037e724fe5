use crate::collectors::command::CommandRunner;
use crate::collectors::extract::{compile, FieldKind, FieldSet, Fields};
use crate::snapshot::{pct_of, BatteryStat, BatteryStatus, PowerStat, TimeLabel};
use once_cell::sync::Lazy;
use regex::Regex;

pub const IOREG_BATTERY: &str = "ioreg -rn AppleSmartBattery";
pub const PMSET_BATT: &str = "pmset -g batt";

static REGISTRY_FIELDS: Lazy<FieldSet> = Lazy::new(|| {
    FieldSet::new(&[
        ("CurrentCapacity", FieldKind::Uint),
        ("MaxCapacity", FieldKind::Uint),
        ("DesignCapacity", FieldKind::Uint),
        ("AppleRawCurrentCapacity", FieldKind::Uint),
        ("AppleRawMaxCapacity", FieldKind::Uint),
        ("Voltage", FieldKind::Uint),
        ("Amperage", FieldKind::Uint),
        ("InstantAmperage", FieldKind::Uint),
        ("CycleCount", FieldKind::Uint),
        ("Temperature", FieldKind::Uint),
        ("IsCharging", FieldKind::Bool),
        ("ExternalConnected", FieldKind::Bool),
        ("Watts", FieldKind::Uint),
        ("AdapterVoltage", FieldKind::Uint),
        ("Current", FieldKind::Uint),
        ("SystemPowerIn", FieldKind::Uint),
        ("ChargingCurrent", FieldKind::Uint),
        ("ChargingVoltage", FieldKind::Uint),
    ])
});

static CELL_VOLTAGE: Lazy<Option<Regex>> =
    Lazy::new(|| compile(r#""?\bCellVoltage\b"?[ \t]*=[ \t]*\(([^)]*)\)"#));
static PERCENTAGE: Lazy<Option<Regex>> = Lazy::new(|| compile(r"(\d+)%"));
static OS_TIME: Lazy<Option<Regex>> = Lazy::new(|| compile(r"(\d+):(\d{2})\s*remaining"));

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegistryReading {
    pub current_capacity_mah: u64,
    pub max_capacity_mah: u64,
    pub design_capacity_mah: u64,
    pub voltage_mv: u64,
    pub amperage_ma: i64,
    pub instant_amperage_ma: i64,
    pub cycle_count: u64,
    pub temperature_centi_c: u64,
    pub is_charging: bool,
    pub external_connected: bool,
    pub adapter_watts: u64,
    pub adapter_voltage_mv: u64,
    pub adapter_current_ma: u64,
    pub system_power_mw: u64,
    pub charging_current_ma: u64,
    pub charging_voltage_mv: u64,
    pub cell_voltages_mv: Vec<u32>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusReading {
    pub percentage: u8,
    pub status: BatteryStatus,
    /// Already formatted as `Hh MMm`.
    pub os_time: Option<String>,
}

pub async fn collect<R: CommandRunner>(runner: &R) -> (BatteryStat, PowerStat) {
    let (registry, status) = tokio::join!(runner.run(IOREG_BATTERY), runner.run(PMSET_BATT));
    derive(&parse_registry(&registry), &parse_status(&status))
}

/// Reinterprets a raw unsigned 64-bit reading as signed: values at or above
/// 2^63 become `raw - 2^64`.
pub fn to_signed(raw: u64) -> i64 {
    raw as i64
}

pub fn parse_registry(text: &str) -> RegistryReading {
    let fields = REGISTRY_FIELDS.extract(text);

    RegistryReading {
        current_capacity_mah: prefer_raw(&fields, "AppleRawCurrentCapacity", "CurrentCapacity"),
        max_capacity_mah: prefer_raw(&fields, "AppleRawMaxCapacity", "MaxCapacity"),
        design_capacity_mah: fields.uint("DesignCapacity"),
        voltage_mv: fields.uint("Voltage"),
        amperage_ma: to_signed(fields.uint("Amperage")),
        instant_amperage_ma: to_signed(fields.uint("InstantAmperage")),
        cycle_count: fields.uint("CycleCount"),
        temperature_centi_c: fields.uint("Temperature"),
        is_charging: fields.flag("IsCharging"),
        external_connected: fields.flag("ExternalConnected"),
        adapter_watts: fields.uint("Watts"),
        adapter_voltage_mv: fields.uint("AdapterVoltage"),
        adapter_current_ma: fields.uint("Current"),
        system_power_mw: fields.uint("SystemPowerIn"),
        charging_current_ma: fields.uint("ChargingCurrent"),
        charging_voltage_mv: fields.uint("ChargingVoltage"),
        cell_voltages_mv: parse_cell_voltages(text),
    }
}

// Apple Silicon reports percentages in CurrentCapacity/MaxCapacity and the mAh
// figures under the AppleRaw* keys.
fn prefer_raw(fields: &Fields, raw: &str, plain: &str) -> u64 {
    match fields.uint(raw) {
        0 => fields.uint(plain),
        value => value,
    }
}

fn parse_cell_voltages(text: &str) -> Vec<u32> {
    CELL_VOLTAGE
        .as_ref()
        .and_then(|re| re.captures(text))
        .and_then(|caps| caps.get(1))
        .map(|list| {
            list.as_str()
                .split(',')
                .filter_map(|v| v.trim().parse::<u32>().ok())
                .collect()
        })
        .unwrap_or_default()
}

pub fn parse_status(text: &str) -> StatusReading {
    let percentage = PERCENTAGE
        .as_ref()
        .and_then(|re| re.captures(text))
        .and_then(|caps| caps.get(1)?.as_str().parse::<u8>().ok())
        .unwrap_or(0)
        .min(100);

    let os_time = OS_TIME
        .as_ref()
        .and_then(|re| re.captures(text))
        .and_then(|caps| {
            let hours = caps.get(1)?.as_str().parse::<u64>().ok()?;
            let minutes = caps.get(2)?.as_str().parse::<u64>().ok()?;
            Some(hours * 60 + minutes)
        })
        .filter(|total| *total > 0)
        .map(format_minutes);

    StatusReading {
        percentage,
        status: status_from_text(text),
        os_time,
    }
}

pub fn status_from_text(text: &str) -> BatteryStatus {
    let lower = text.to_lowercase();
    if lower.contains("discharging") {
        BatteryStatus::Discharging
    } else if lower.contains("charging") {
        BatteryStatus::Charging
    } else if lower.contains("charged") {
        BatteryStatus::Full
    } else if lower.contains("ac power") {
        BatteryStatus::Ac
    } else {
        BatteryStatus::Unknown
    }
}

pub fn format_minutes(total: u64) -> String {
    format!("{}h {:02}m", total / 60, total % 60)
}

pub fn derive(registry: &RegistryReading, status: &StatusReading) -> (BatteryStat, PowerStat) {
    let (time_estimate, time_label) = time_estimate(registry, status);

    let battery = BatteryStat {
        percentage: status.percentage,
        status: status.status,
        health_pct: pct_of(
            registry.max_capacity_mah as f64,
            registry.design_capacity_mah as f64,
        ),
        cycle_count: saturating_u32(registry.cycle_count),
        temp_c: registry.temperature_centi_c as f64 / 100.0,
        time_estimate,
        time_label,
        is_charging: registry.is_charging,
        external_power_connected: registry.external_connected,
        current_capacity_mah: saturating_u32(registry.current_capacity_mah),
        max_capacity_mah: saturating_u32(registry.max_capacity_mah),
        design_capacity_mah: saturating_u32(registry.design_capacity_mah),
        voltage_v: registry.voltage_mv as f64 / 1000.0,
        cell_voltages_mv: registry.cell_voltages_mv.clone(),
    };

    (battery, power(registry))
}

fn power(registry: &RegistryReading) -> PowerStat {
    let voltage = registry.voltage_mv as f64;

    if registry.external_connected {
        let charge_watts = if registry.amperage_ma > 0 {
            registry.amperage_ma as f64 * voltage / 1e6
        } else {
            0.0
        };
        PowerStat {
            adapter_rated_watts: registry.adapter_watts as f64,
            adapter_total_watts: registry.system_power_mw as f64 / 1000.0,
            charge_watts,
            adapter_voltage_v: registry.adapter_voltage_mv as f64 / 1000.0,
            adapter_current_a: registry.adapter_current_ma as f64 / 1000.0,
            charging_current_a: registry.charging_current_ma as f64 / 1000.0,
            charging_voltage_v: registry.charging_voltage_mv as f64 / 1000.0,
            ..PowerStat::default()
        }
    } else {
        PowerStat {
            discharge_watts: registry.instant_amperage_ma.unsigned_abs() as f64 * voltage / 1e6,
            ..PowerStat::default()
        }
    }
}

fn time_estimate(registry: &RegistryReading, status: &StatusReading) -> (String, TimeLabel) {
    if let Some(os_time) = &status.os_time {
        let label = if registry.is_charging {
            TimeLabel::ToFull
        } else {
            TimeLabel::Remaining
        };
        return (os_time.clone(), label);
    }

    let current = registry.current_capacity_mah as f64;
    let max = registry.max_capacity_mah as f64;

    if registry.is_charging && registry.amperage_ma > 0 && max > current {
        let minutes = (max - current) * 60.0 / registry.amperage_ma as f64;
        return (format_minutes(minutes as u64), TimeLabel::ToFull);
    }
    if !registry.external_connected && registry.instant_amperage_ma != 0 {
        let minutes = current * 60.0 / registry.instant_amperage_ma.unsigned_abs() as f64;
        return (format_minutes(minutes as u64), TimeLabel::Remaining);
    }
    (String::new(), TimeLabel::Blank)
}

fn saturating_u32(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}
