use crate::collectors::command::{shell_quote, CommandRunner};
use crate::config::NetworkConfig;
use crate::snapshot::{NetworkStat, TailscaleStatus, NOT_AVAILABLE, WIFI_OFF};

pub const AIRPORT_REPORT: &str = "system_profiler SPAirPortDataType";

const CURRENT_NETWORK: &str = "Current Network Information:";
const SSID_UNKNOWN: &str = "Connected";

pub async fn collect<R: CommandRunner>(runner: &R, cfg: &NetworkConfig) -> NetworkStat {
    let ((wifi_ssid, wifi_ip), ethernet_ip, (tailscale_ip, tailscale_status)) = tokio::join!(
        wifi(runner, &cfg.wifi_interface),
        ethernet(runner, &cfg.ethernet_interfaces),
        tailscale(runner, &cfg.tailscale_bin),
    );

    NetworkStat {
        wifi_ssid,
        wifi_ip,
        ethernet_ip,
        tailscale_ip,
        tailscale_status,
    }
}

fn getifaddr(iface: &str) -> String {
    format!("ipconfig getifaddr {}", shell_quote(iface))
}

async fn wifi<R: CommandRunner>(runner: &R, iface: &str) -> (String, String) {
    let ip = runner.run(&getifaddr(iface)).await.trim().to_string();
    if ip.is_empty() {
        return (WIFI_OFF.to_string(), NOT_AVAILABLE.to_string());
    }

    // system_profiler is slow, only ask for the SSID once we know we are associated
    let ssid = parse_ssid(&runner.run(AIRPORT_REPORT).await)
        .unwrap_or_else(|| SSID_UNKNOWN.to_string());
    (ssid, ip)
}

pub fn parse_ssid(text: &str) -> Option<String> {
    let mut lines = text.lines().skip_while(|l| !l.contains(CURRENT_NETWORK)).skip(1);
    let line = lines.find(|l| !l.trim().is_empty())?;
    let ssid = line.trim().trim_end_matches(':').trim();
    (!ssid.is_empty()).then(|| ssid.to_string())
}

async fn ethernet<R: CommandRunner>(runner: &R, interfaces: &[String]) -> String {
    for iface in interfaces {
        let ip = runner.run(&getifaddr(iface)).await;
        let ip = ip.trim();
        if !ip.is_empty() {
            return ip.to_string();
        }
    }
    NOT_AVAILABLE.to_string()
}

async fn tailscale<R: CommandRunner>(runner: &R, bin: &str) -> (String, TailscaleStatus) {
    let bin = shell_quote(bin);
    let status = runner.run(&format!("{bin} status")).await;
    if status.to_lowercase().contains("stopped") {
        return (NOT_AVAILABLE.to_string(), TailscaleStatus::Offline);
    }

    let ip = runner.run(&format!("{bin} ip -4")).await;
    match parse_tailscale_ip(&ip) {
        Some(ip) => (ip, TailscaleStatus::Online),
        None => (NOT_AVAILABLE.to_string(), TailscaleStatus::Offline),
    }
}

pub fn parse_tailscale_ip(text: &str) -> Option<String> {
    let ip = text.lines().next()?.trim();
    ip.starts_with(|c: char| c.is_ascii_digit())
        .then(|| ip.to_string())
}
