use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Snapshot {
    pub collected_at: String,
    #[serde(flatten)]
    pub cpu: CpuStat,
    #[serde(flatten)]
    pub memory: MemoryStat,
    #[serde(flatten)]
    pub disk: DiskStat,
    #[serde(flatten)]
    pub battery: BatteryStat,
    #[serde(flatten)]
    pub power: PowerStat,
    #[serde(flatten)]
    pub network: NetworkStat,
    pub bluetooth: Vec<BluetoothDevice>,
    pub uptime: String,
    pub purge_capable: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CpuStat {
    #[serde(rename = "cpu_usage_pct")]
    pub usage_pct: f64,
    /// 100 means no throttling.
    #[serde(rename = "cpu_throttle_pct")]
    pub throttle_pct: u8,
    /// 0 means unknown, not zero degrees.
    #[serde(rename = "cpu_temp_c")]
    pub temp_c: f64,
    pub fan_rpm: u32,
}

impl Default for CpuStat {
    fn default() -> Self {
        Self {
            usage_pct: 0.0,
            throttle_pct: 100,
            temp_c: 0.0,
            fan_rpm: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryStat {
    #[serde(rename = "mem_total_gb")]
    pub total_gb: f64,
    #[serde(rename = "mem_used_gb")]
    pub used_gb: f64,
    #[serde(rename = "mem_used_pct")]
    pub used_pct: f64,
    #[serde(rename = "mem_app_gb")]
    pub app_gb: f64,
    #[serde(rename = "mem_wired_gb")]
    pub wired_gb: f64,
    #[serde(rename = "mem_compressed_gb")]
    pub compressed_gb: f64,
    #[serde(rename = "mem_cached_gb")]
    pub cached_gb: f64,
    #[serde(rename = "mem_free_gb")]
    pub free_gb: f64,
    #[serde(rename = "mem_page_size")]
    pub page_size: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiskStrategy {
    Precise,
    Fallback,
    #[default]
    #[serde(rename = "none")]
    Unavailable,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiskStat {
    #[serde(rename = "disk_total_gb")]
    pub total_gb: f64,
    #[serde(rename = "disk_used_gb")]
    pub used_gb: f64,
    #[serde(rename = "disk_free_gb")]
    pub free_gb: f64,
    #[serde(rename = "disk_available_gb")]
    pub available_gb: f64,
    #[serde(rename = "disk_purgeable_gb")]
    pub purgeable_gb: f64,
    #[serde(rename = "disk_used_pct")]
    pub used_pct: u8,
    #[serde(rename = "disk_purge_capable")]
    pub purge_capable: bool,
    #[serde(rename = "disk_strategy")]
    pub strategy: DiskStrategy,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatteryStatus {
    Charging,
    Discharging,
    Full,
    #[serde(rename = "AC")]
    Ac,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeLabel {
    #[serde(rename = "to-full")]
    ToFull,
    #[serde(rename = "remaining")]
    Remaining,
    #[default]
    #[serde(rename = "none")]
    Blank,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatteryStat {
    #[serde(rename = "battery_percentage")]
    pub percentage: u8,
    #[serde(rename = "battery_status")]
    pub status: BatteryStatus,
    #[serde(rename = "battery_health_pct")]
    pub health_pct: f64,
    #[serde(rename = "battery_cycle_count")]
    pub cycle_count: u32,
    #[serde(rename = "battery_temp_c")]
    pub temp_c: f64,
    pub time_estimate: String,
    pub time_label: TimeLabel,
    pub is_charging: bool,
    pub external_power_connected: bool,
    #[serde(rename = "battery_current_capacity_mah")]
    pub current_capacity_mah: u32,
    #[serde(rename = "battery_max_capacity_mah")]
    pub max_capacity_mah: u32,
    #[serde(rename = "battery_design_capacity_mah")]
    pub design_capacity_mah: u32,
    #[serde(rename = "battery_voltage_v")]
    pub voltage_v: f64,
    #[serde(rename = "battery_cell_voltages_mv")]
    pub cell_voltages_mv: Vec<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PowerStat {
    pub adapter_rated_watts: f64,
    pub adapter_total_watts: f64,
    pub charge_watts: f64,
    pub discharge_watts: f64,
    pub adapter_voltage_v: f64,
    pub adapter_current_a: f64,
    pub charging_current_a: f64,
    pub charging_voltage_v: f64,
    pub load_watts: f64,
    /// Negative when the battery is supplementing a maxed-out adapter.
    pub headroom_watts: f64,
    pub adapter_load_pct: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TailscaleStatus {
    Online,
    #[default]
    Offline,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkStat {
    pub wifi_ssid: String,
    pub wifi_ip: String,
    pub ethernet_ip: String,
    pub tailscale_ip: String,
    pub tailscale_status: TailscaleStatus,
}

pub const NOT_AVAILABLE: &str = "N/A";
pub const WIFI_OFF: &str = "Off";

impl Default for NetworkStat {
    fn default() -> Self {
        Self {
            wifi_ssid: WIFI_OFF.to_string(),
            wifi_ip: NOT_AVAILABLE.to_string(),
            ethernet_ip: NOT_AVAILABLE.to_string(),
            tailscale_ip: NOT_AVAILABLE.to_string(),
            tailscale_status: TailscaleStatus::Offline,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BluetoothDevice {
    pub device_name: String,
    pub battery_pct: u8,
}

impl Snapshot {
    pub fn clamp_percentages(&mut self) {
        self.cpu.usage_pct = clamp_pct(self.cpu.usage_pct);
        self.cpu.throttle_pct = self.cpu.throttle_pct.min(100);
        self.memory.used_pct = clamp_pct(self.memory.used_pct);
        self.disk.used_pct = self.disk.used_pct.min(100);
        self.battery.percentage = self.battery.percentage.min(100);
        self.battery.health_pct = clamp_pct(self.battery.health_pct);
        self.power.adapter_load_pct = clamp_pct(self.power.adapter_load_pct);
        for device in &mut self.bluetooth {
            device.battery_pct = device.battery_pct.min(100);
        }
    }

    pub fn to_json(&self, pretty: bool) -> Result<String, serde_json::Error> {
        if pretty {
            serde_json::to_string_pretty(self)
        } else {
            serde_json::to_string(self)
        }
    }
}

pub fn clamp_pct(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}

pub fn pct_of(part: f64, total: f64) -> f64 {
    if total > 0.0 {
        clamp_pct(part / total * 100.0)
    } else {
        0.0
    }
}

pub fn pct_u8(value: f64) -> u8 {
    clamp_pct(value) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn default_snapshot_serializes_flat() {
        let json = Snapshot::default().to_json(false).expect("serialize");
        let value: Value = serde_json::from_str(&json).expect("parse");
        let obj = value.as_object().expect("object");

        assert_eq!(obj["cpu_throttle_pct"], 100);
        assert_eq!(obj["cpu_temp_c"], 0.0);
        assert_eq!(obj["disk_strategy"], "none");
        assert_eq!(obj["battery_status"], "Unknown");
        assert_eq!(obj["time_label"], "none");
        assert_eq!(obj["wifi_ssid"], "Off");
        assert_eq!(obj["ethernet_ip"], "N/A");
        assert_eq!(obj["tailscale_status"], "Offline");
        assert_eq!(obj["purge_capable"], false);
        assert_eq!(obj["disk_purge_capable"], false);
        assert!(obj["bluetooth"].as_array().expect("array").is_empty());
        assert!(obj.values().all(|v| !v.is_object()));
    }

    #[test]
    fn json_round_trips_enum_spellings() {
        let mut snapshot = Snapshot::default();
        snapshot.battery.status = BatteryStatus::Ac;
        snapshot.battery.time_label = TimeLabel::ToFull;
        snapshot.disk.strategy = DiskStrategy::Precise;
        let json = snapshot.to_json(true).expect("serialize");
        assert!(json.contains("\"AC\""));
        assert!(json.contains("\"to-full\""));
        assert!(json.contains("\"precise\""));

        let back: Snapshot = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, snapshot);
    }

    #[test]
    fn clamp_percentages_bounds_every_field() {
        let mut snapshot = Snapshot::default();
        snapshot.cpu.usage_pct = 130.0;
        snapshot.cpu.throttle_pct = 250;
        snapshot.memory.used_pct = -3.0;
        snapshot.disk.used_pct = 101;
        snapshot.battery.percentage = 104;
        snapshot.battery.health_pct = 103.5;
        snapshot.power.adapter_load_pct = f64::NAN;
        snapshot.bluetooth.push(BluetoothDevice {
            device_name: "Mouse".to_string(),
            battery_pct: 120,
        });

        snapshot.clamp_percentages();

        assert_eq!(snapshot.cpu.usage_pct, 100.0);
        assert_eq!(snapshot.cpu.throttle_pct, 100);
        assert_eq!(snapshot.memory.used_pct, 0.0);
        assert_eq!(snapshot.disk.used_pct, 100);
        assert_eq!(snapshot.battery.percentage, 100);
        assert_eq!(snapshot.battery.health_pct, 100.0);
        assert_eq!(snapshot.power.adapter_load_pct, 0.0);
        assert_eq!(snapshot.bluetooth[0].battery_pct, 100);
    }

    #[test]
    fn pct_helpers() {
        assert_eq!(pct_of(50.0, 200.0), 25.0);
        assert_eq!(pct_of(5.0, 0.0), 0.0);
        assert_eq!(pct_of(210.0, 200.0), 100.0);
        assert_eq!(pct_u8(99.9), 99);
        assert_eq!(pct_u8(-1.0), 0);
    }
}
