use crate::collectors::command::CommandRunner;
use crate::collectors::extract::{FieldKind, FieldSet};
use crate::snapshot::BluetoothDevice;
use once_cell::sync::Lazy;

pub const IOREG_BATTERY_PERCENT: &str = "ioreg -r -l -k BatteryPercent";

static DEVICE_FIELDS: Lazy<FieldSet> = Lazy::new(|| {
    FieldSet::new(&[
        ("Product", FieldKind::Str),
        ("BatteryPercent", FieldKind::Int),
    ])
});

/// Substring rules applied in order; the first rule whose words all appear wins.
const NAME_RULES: &[(&[&str], &str)] = &[
    (&["Magic", "Mouse"], "Mouse"),
    (&["Magic", "Keyboard"], "Keyboard"),
    (&["Magic", "Trackpad"], "Trackpad"),
    (&["AirPods"], "AirPods"),
    (&["Beats"], "Beats"),
];

pub async fn collect<R: CommandRunner>(runner: &R) -> Vec<BluetoothDevice> {
    parse_devices(&runner.run(IOREG_BATTERY_PERCENT).await)
}

pub fn parse_devices(text: &str) -> Vec<BluetoothDevice> {
    let mut devices = Vec::new();
    let mut name: Option<String> = None;
    let mut percent: Option<i64> = None;

    for line in text.lines() {
        if line.contains("+-o") {
            name = None;
            percent = None;
            continue;
        }

        let fields = DEVICE_FIELDS.extract(line);
        if fields.matched("Product") && !fields.text("Product").is_empty() {
            name = Some(fields.text("Product").to_string());
        }
        if fields.matched("BatteryPercent") {
            percent = Some(fields.int("BatteryPercent"));
        }

        if let (Some(product), Some(pct)) = (name.as_ref(), percent) {
            devices.push(BluetoothDevice {
                device_name: normalize_name(product),
                battery_pct: pct.clamp(0, 100) as u8,
            });
            name = None;
            percent = None;
        }
    }
    devices
}

pub fn normalize_name(name: &str) -> String {
    NAME_RULES
        .iter()
        .find(|(words, _)| words.iter().all(|w| name.contains(w)))
        .map_or_else(|| name.to_string(), |(_, short)| short.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::command::fake::FakeRunner;

    const DUMP: &str = r#"+-o AppleDeviceManagementHIDEventService  <class AppleDeviceManagementHIDEventService, id 0x1000012ab>
    {
      "LowBatteryNotificationPercentage" = 2
      "Product" = "Magic Mouse 2"
      "ProductID" = 617
      "BatteryPercent" = 64
    }
+-o AppleDeviceManagementHIDEventService  <class AppleDeviceManagementHIDEventService, id 0x1000012cd>
    {
      "BatteryPercent" = 88
      "Product" = "Magic Keyboard with Touch ID"
    }
+-o IOService  <class IOService, id 0x1000013ef>
    {
      "BatteryPercent" = 40
    }
+-o AppleDeviceManagementHIDEventService  <class AppleDeviceManagementHIDEventService, id 0x100001401>
    {
      "Product" = "Generic HID Device"
      "BatteryPercent" = 105
    }
"#;

    #[test]
    fn normalizes_known_products() {
        assert_eq!(normalize_name("Magic Mouse 2"), "Mouse");
        assert_eq!(normalize_name("Magic Keyboard with Numeric Keypad"), "Keyboard");
        assert_eq!(normalize_name("Magic Trackpad"), "Trackpad");
        assert_eq!(normalize_name("AirPods Pro"), "AirPods");
        assert_eq!(normalize_name("Beats Studio Buds"), "Beats");
        assert_eq!(normalize_name("Generic HID Device"), "Generic HID Device");
        assert_eq!(normalize_name("Mouse"), "Mouse");
    }

    #[test]
    fn pairs_in_discovery_order() {
        let devices = parse_devices(DUMP);
        let summary: Vec<(&str, u8)> = devices
            .iter()
            .map(|d| (d.device_name.as_str(), d.battery_pct))
            .collect();
        assert_eq!(
            summary,
            vec![("Mouse", 64), ("Keyboard", 88), ("Generic HID Device", 100)]
        );
    }

    #[test]
    fn duplicate_products_are_kept() {
        let dump = "\"Product\" = \"AirPods Pro\"\n\"BatteryPercent\" = 50\n\"Product\" = \"AirPods Pro\"\n\"BatteryPercent\" = 70\n";
        let devices = parse_devices(dump);
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[1].battery_pct, 70);
    }

    #[tokio::test]
    async fn no_devices_is_empty() {
        assert!(collect(&FakeRunner::new()).await.is_empty());
    }
}
