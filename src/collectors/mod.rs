pub mod battery;
pub mod bluetooth;
pub mod command;
pub mod cpu;
pub mod disk;
pub mod extract;
pub mod memory;
pub mod network;
pub mod uptime;

use crate::actions;
use crate::config::Config;
use crate::snapshot::{pct_of, PowerStat, Snapshot};
use command::CommandRunner;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

pub async fn collect_snapshot<R: CommandRunner>(runner: &R, cfg: &Config) -> Snapshot {
    collect_snapshot_at(runner, cfg, SystemTime::now()).await
}

pub async fn collect_snapshot_at<R: CommandRunner>(
    runner: &R,
    cfg: &Config,
    now: SystemTime,
) -> Snapshot {
    let now_unix = now
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let (cpu, memory, disk, (battery, mut power), network, bluetooth, uptime, purge_capable) = tokio::join!(
        cpu::collect(runner, cfg),
        memory::collect(runner, cfg),
        disk::collect(runner),
        battery::collect(runner),
        network::collect(runner, &cfg.network),
        bluetooth::collect(runner),
        uptime::collect(runner, now_unix),
        actions::collect_purge_capable(runner, &cfg.helpers),
    );

    balance_power(&mut power, battery.external_power_connected);

    let mut snapshot = Snapshot {
        collected_at: humantime::format_rfc3339_seconds(now).to_string(),
        cpu,
        memory,
        disk,
        battery,
        power,
        network,
        bluetooth,
        uptime,
        purge_capable,
    };
    snapshot.clamp_percentages();

    debug!(
        cpu_pct = snapshot.cpu.usage_pct,
        mem_pct = snapshot.memory.used_pct,
        disk_strategy = ?snapshot.disk.strategy,
        battery_pct = snapshot.battery.percentage,
        devices = snapshot.bluetooth.len(),
        "snapshot collected"
    );
    snapshot
}

pub fn balance_power(power: &mut PowerStat, external_power_connected: bool) {
    if !external_power_connected {
        return;
    }
    let load = power.adapter_total_watts + power.charge_watts;
    power.load_watts = load;
    power.headroom_watts = power.adapter_rated_watts - load;
    power.adapter_load_pct = pct_of(load, power.adapter_rated_watts);
}

#[cfg(test)]
mod tests {
    use super::command::fake::FakeRunner;
    use super::*;
    use crate::snapshot::{BatteryStatus, DiskStrategy, TailscaleStatus, TimeLabel};
    use std::time::Duration;

    const BATTERY_DUMP: &str = r#"
+-o AppleSmartBattery  <class AppleSmartBattery, id 0x100000254, registered, matched, active, busy 0 (0 ms), retain 7>
    {
      "CurrentCapacity"=4500
      "MaxCapacity"=5000
      "DesignCapacity"=5200
      IsCharging=Yes
      ExternalConnected=Yes
      Amperage=1500
      Voltage=12000
      "AdapterDetails" = {"Watts"=96,"Current"=4990,"AdapterVoltage"=20000}
      "PowerTelemetryData" = {"SystemPowerIn"=45000}
    }
"#;

    fn at(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(secs)
    }

    #[test]
    fn power_balance_on_adapter() {
        let mut power = PowerStat {
            adapter_rated_watts: 96.0,
            adapter_total_watts: 30.0,
            charge_watts: 18.0,
            ..PowerStat::default()
        };
        balance_power(&mut power, true);
        assert_eq!(power.load_watts, 48.0);
        assert_eq!(power.headroom_watts, 48.0);
        assert_eq!(power.adapter_load_pct, 50.0);
    }

    #[test]
    fn power_balance_overloaded_adapter() {
        let mut power = PowerStat {
            adapter_rated_watts: 30.0,
            adapter_total_watts: 35.0,
            ..PowerStat::default()
        };
        balance_power(&mut power, true);
        assert_eq!(power.headroom_watts, -5.0);
        assert_eq!(power.adapter_load_pct, 100.0);
    }

    #[test]
    fn power_balance_skipped_on_battery() {
        let mut power = PowerStat {
            discharge_watts: 12.0,
            ..PowerStat::default()
        };
        balance_power(&mut power, false);
        assert_eq!(power.load_watts, 0.0);
        assert_eq!(power.headroom_watts, 0.0);
    }

    #[tokio::test]
    async fn empty_commands_yield_default_snapshot() {
        let snapshot = collect_snapshot_at(&FakeRunner::new(), &Config::default(), at(0)).await;
        assert_eq!(
            snapshot,
            Snapshot {
                collected_at: "1970-01-01T00:00:00Z".to_string(),
                ..Snapshot::default()
            }
        );
        let json = snapshot.to_json(false).expect("serialize");
        assert!(json.contains("\"wifi_ssid\":\"Off\""));
    }

    #[tokio::test]
    async fn assembles_every_domain() {
        let runner = FakeRunner::new()
            .with(cpu::TOP_CPU, "CPU usage: 10.0% user, 5.0% sys, 85.0% idle\n")
            .with(cpu::PMSET_THERM, "CPU_Speed_Limit = 90\n")
            .with(memory::SYSCTL_MEMSIZE, "17179869184\n")
            .with(
                memory::VM_STAT,
                "Mach Virtual Memory Statistics: (page size of 16384 bytes)\nPages free: 262144.\n",
            )
            .with(
                disk::VOLUME_CAPACITY,
                "total=1000000000000 available=300000000000 important=450000000000",
            )
            .with(battery::IOREG_BATTERY, BATTERY_DUMP)
            .with(
                battery::PMSET_BATT,
                "Now drawing from 'AC Power'\n -InternalBattery-0 (id=1)\t90%; charging; 0:20 remaining present: true\n",
            )
            .with("ipconfig getifaddr en0", "192.168.1.20\n")
            .with("tailscale status", "Tailscale is stopped.\n")
            .with(
                bluetooth::IOREG_BATTERY_PERCENT,
                "+-o Dev\n  \"Product\" = \"AirPods Pro\"\n  \"BatteryPercent\" = 80\n",
            )
            .with(
                uptime::SYSCTL_BOOTTIME,
                "{ sec = 1699910000, usec = 0 } Mon Nov 13 21:13:20 2023\n",
            )
            .with(actions::SUDO_RULES, "    (root) NOPASSWD: /usr/sbin/purge\n");

        let snapshot = collect_snapshot_at(&runner, &Config::default(), at(1_700_000_000)).await;

        assert_eq!(snapshot.collected_at, "2023-11-14T22:13:20Z");
        assert_eq!(snapshot.cpu.usage_pct, 15.0);
        assert_eq!(snapshot.cpu.throttle_pct, 90);
        assert!((snapshot.memory.used_pct - 75.0).abs() < 1e-9);
        assert_eq!(snapshot.disk.strategy, DiskStrategy::Precise);
        assert!(snapshot.disk.purge_capable);

        assert_eq!(snapshot.battery.percentage, 90);
        assert_eq!(snapshot.battery.status, BatteryStatus::Charging);
        assert_eq!(snapshot.battery.time_estimate, "0h 20m");
        assert_eq!(snapshot.battery.time_label, TimeLabel::ToFull);
        assert!((snapshot.battery.health_pct - 96.2).abs() < 0.05);

        assert!((snapshot.power.charge_watts - 18.0).abs() < 1e-9);
        assert_eq!(snapshot.power.adapter_total_watts, 45.0);
        assert_eq!(snapshot.power.discharge_watts, 0.0);
        assert!((snapshot.power.load_watts - 63.0).abs() < 1e-9);
        assert!((snapshot.power.headroom_watts - 33.0).abs() < 1e-9);

        assert_eq!(snapshot.network.wifi_ssid, "Connected");
        assert_eq!(snapshot.network.tailscale_status, TailscaleStatus::Offline);
        assert_eq!(snapshot.bluetooth.len(), 1);
        assert_eq!(snapshot.bluetooth[0].device_name, "AirPods");
        assert_eq!(snapshot.uptime, "1d 1h");
        assert!(snapshot.purge_capable);
    }
}
