use std::{collections::BTreeSet, time::Duration};

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tokio::{process::Command, time::timeout};

use crate::provider::Source;

pub const WIFI_DEVICE: &str = "wlan0";

/// Run `program` and return its stdout. A non-zero exit status is an error.
async fn run(program: &str, args: &[&str], limit: Duration) -> anyhow::Result<String> {
    let output = timeout(
        limit,
        Command::new(program).args(args).kill_on_drop(true).output(),
    )
    .await
    .map_err(|_| anyhow::anyhow!("'{program}' timed out after {limit:?}"))??;

    if !output.status.success() {
        anyhow::bail!(
            "'{program}' exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(String::from_utf8(output.stdout)?)
}

/// USB devices as reported by `lsusb`.
#[derive(Debug, Clone)]
pub struct LsusbSource {
    limit: Duration,
}

impl LsusbSource {
    pub fn new(limit: Duration) -> Self {
        Self { limit }
    }
}

#[async_trait]
impl Source for LsusbSource {
    fn key(&self) -> &str {
        "lsusb"
    }

    async fn observe(&mut self) -> anyhow::Result<Option<Value>> {
        let stdout = run("lsusb", &[], self.limit).await?;
        let devices: Vec<Value> = stdout.lines().filter_map(parse_lsusb_line).collect();
        Ok(Some(json!({ "devices": devices })))
    }
}

/// `Bus 001 Device 002: ID 8087:0024 Intel Corp. Hub`
fn parse_lsusb_line(line: &str) -> Option<Value> {
    let (head, tail) = line.split_once(" ID ")?;
    let (id, tag) = tail.trim().split_once(char::is_whitespace)?;
    if !id.contains(':') {
        return None;
    }

    let mut head = head.split_whitespace();
    let (bus_kw, bus, device_kw, device) = (head.next()?, head.next()?, head.next()?, head.next()?);
    let device = device.trim_end_matches(':');
    let is_number = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());
    if !bus_kw.eq_ignore_ascii_case("bus")
        || !device_kw.eq_ignore_ascii_case("device")
        || !is_number(bus)
        || !is_number(device)
    {
        return None;
    }

    Some(json!({
        "id": id,
        "tag": tag.trim(),
        "device": format!("/dev/bus/usb/{bus}/{device}"),
    }))
}

/// Running containers, keyed by id. Silent while the set of ids is unchanged.
#[derive(Debug, Clone)]
pub struct DockerPsSource {
    limit: Duration,
    last_seen: Option<BTreeSet<String>>,
}

impl DockerPsSource {
    pub fn new(limit: Duration) -> Self {
        Self {
            limit,
            last_seen: None,
        }
    }
}

#[async_trait]
impl Source for DockerPsSource {
    fn key(&self) -> &str {
        "docker/ps"
    }

    async fn observe(&mut self) -> anyhow::Result<Option<Value>> {
        let ids: BTreeSet<String> = run("docker", &["ps", "-q", "--no-trunc"], self.limit)
            .await?
            .lines()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_owned)
            .collect();
        if self.last_seen.as_ref() == Some(&ids) {
            return Ok(None);
        }

        let mut containers = Map::new();
        if !ids.is_empty() {
            let mut args = vec!["inspect"];
            args.extend(ids.iter().map(String::as_str));
            let inspected: Vec<Value> =
                serde_json::from_str(&run("docker", &args, self.limit).await?)?;
            containers = key_by_id(inspected, "Id");
        }

        self.last_seen = Some(ids);
        Ok(Some(Value::Object(containers)))
    }
}

/// Local images, keyed by id. Silent while the set of ids is unchanged.
#[derive(Debug, Clone)]
pub struct DockerImagesSource {
    limit: Duration,
    last_seen: Option<BTreeSet<String>>,
}

impl DockerImagesSource {
    pub fn new(limit: Duration) -> Self {
        Self {
            limit,
            last_seen: None,
        }
    }
}

#[async_trait]
impl Source for DockerImagesSource {
    fn key(&self) -> &str {
        "docker/images"
    }

    async fn observe(&mut self) -> anyhow::Result<Option<Value>> {
        let stdout = run(
            "docker",
            &["image", "ls", "--no-trunc", "--format", "{{json .}}"],
            self.limit,
        )
        .await?;
        let images = stdout
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(serde_json::from_str)
            .collect::<Result<Vec<Value>, _>>()?;
        let images = key_by_id(images, "ID");

        let ids: BTreeSet<String> = images.keys().cloned().collect();
        if self.last_seen.as_ref() == Some(&ids) {
            return Ok(None);
        }
        self.last_seen = Some(ids);
        Ok(Some(Value::Object(images)))
    }
}

fn key_by_id(items: Vec<Value>, id_field: &str) -> Map<String, Value> {
    items
        .into_iter()
        .filter_map(|item| {
            let id = item.get(id_field)?.as_str()?.to_owned();
            Some((id, item))
        })
        .collect()
}

/// Link status of the Wi-Fi adapter as reported by `iwconfig`.
#[derive(Debug, Clone)]
pub struct WirelessStatusSource {
    device: &'static str,
    limit: Duration,
}

impl WirelessStatusSource {
    pub fn new(device: &'static str, limit: Duration) -> Self {
        Self { device, limit }
    }
}

#[async_trait]
impl Source for WirelessStatusSource {
    fn key(&self) -> &str {
        "wireless/status"
    }

    async fn observe(&mut self) -> anyhow::Result<Option<Value>> {
        let stdout = run("iwconfig", &[self.device], self.limit).await?;
        let status = parse_iwconfig(&stdout);
        if status.is_empty() {
            anyhow::bail!("no wireless extensions on {}", self.device);
        }
        Ok(Some(Value::Object(status)))
    }
}

fn parse_iwconfig(output: &str) -> Map<String, Value> {
    let mut status = Map::new();
    for line in output.lines() {
        // the first line starts with the interface name
        let line = if line.starts_with(char::is_whitespace) {
            line
        } else {
            line.split_once(char::is_whitespace).map_or("", |(_, rest)| rest)
        };

        for field in line.split("  ").map(str::trim).filter(|f| !f.is_empty()) {
            match field.find([':', '=']) {
                Some(idx) => {
                    let name = field[..idx].trim();
                    let value = field[idx + 1..].trim().trim_matches('"');
                    status.insert(name.to_owned(), Value::String(value.to_owned()));
                }
                None if field.starts_with("IEEE") => {
                    status.insert("Protocol".to_owned(), Value::String(field.to_owned()));
                }
                None => {}
            }
        }
    }
    status
}
