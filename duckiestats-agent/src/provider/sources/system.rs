use async_trait::async_trait;
use serde_json::{Map, Value, json};

use crate::provider::Source;

/// Interface name prefixes worth reporting; each must be followed by a digit.
const MONITORED_INTERFACES: [&str; 4] = ["eth", "wlan", "tun", "tap"];

/// Seconds since boot.
#[derive(Debug, Clone, Default)]
pub struct UptimeSource;

#[async_trait]
impl Source for UptimeSource {
    fn key(&self) -> &str {
        "uptime"
    }

    async fn observe(&mut self) -> anyhow::Result<Option<Value>> {
        Ok(Some(json!({ "uptime": sysinfo::System::uptime() })))
    }
}

/// Addresses of the wired, wireless and tunnel interfaces.
#[derive(Debug, Clone, Default)]
pub struct NetworkConfigurationSource;

#[async_trait]
impl Source for NetworkConfigurationSource {
    fn key(&self) -> &str {
        "network/configuration"
    }

    async fn observe(&mut self) -> anyhow::Result<Option<Value>> {
        let interfaces: Map<String, Value> = netdev::get_interfaces()
            .into_iter()
            .filter(|iface| is_monitored(&iface.name))
            .map(|iface| {
                let addresses = json!({
                    "ipv4": iface.ipv4.iter().map(|net| net.to_string()).collect::<Vec<_>>(),
                    "ipv6": iface.ipv6.iter().map(|net| net.to_string()).collect::<Vec<_>>(),
                    "mac": iface.mac_addr.map(|mac| mac.to_string()),
                });
                (iface.name, addresses)
            })
            .collect();
        Ok(Some(Value::Object(interfaces)))
    }
}

fn is_monitored(name: &str) -> bool {
    MONITORED_INTERFACES.iter().any(|prefix| {
        name.strip_prefix(prefix)
            .and_then(|rest| rest.chars().next())
            .is_some_and(|c| c.is_ascii_digit())
    })
}
