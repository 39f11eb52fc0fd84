use async_trait::async_trait;
use serde_json::{Value, json};

use crate::provider::Source;

pub const ROBOT_TYPE_ENV: &str = "ROBOT_TYPE";
pub const ROBOT_CONFIGURATION_ENV: &str = "ROBOT_CONFIGURATION";

#[derive(Debug, Clone)]
pub struct RobotHostnameSource {
    hostname: Option<String>,
}

impl RobotHostnameSource {
    /// `hostname` overrides the name reported by the OS.
    pub fn new(hostname: Option<String>) -> Self {
        Self { hostname }
    }
}

#[async_trait]
impl Source for RobotHostnameSource {
    fn key(&self) -> &str {
        "robot/hostname"
    }

    async fn observe(&mut self) -> anyhow::Result<Option<Value>> {
        let hostname = self
            .hostname
            .clone()
            .or_else(sysinfo::System::host_name)
            .ok_or_else(|| anyhow::anyhow!("hostname unavailable"))?;
        Ok(Some(json!({ "value": hostname })))
    }
}

#[derive(Debug, Clone, Default)]
pub struct RobotTypeSource;

#[async_trait]
impl Source for RobotTypeSource {
    fn key(&self) -> &str {
        "robot/type"
    }

    async fn observe(&mut self) -> anyhow::Result<Option<Value>> {
        Ok(known_env(ROBOT_TYPE_ENV).map(|t| json!({ "value": t.to_ascii_lowercase() })))
    }
}

#[derive(Debug, Clone, Default)]
pub struct RobotConfigurationSource;

#[async_trait]
impl Source for RobotConfigurationSource {
    fn key(&self) -> &str {
        "robot/configuration"
    }

    async fn observe(&mut self) -> anyhow::Result<Option<Value>> {
        Ok(known_env(ROBOT_CONFIGURATION_ENV).map(|c| json!({ "value": c.to_ascii_uppercase() })))
    }
}

/// Value of `var` unless unset, empty or `unknown`.
fn known_env(var: &str) -> Option<String> {
    let value = std::env::var(var).ok()?;
    let value = value.trim();
    (!value.is_empty() && !value.eq_ignore_ascii_case("unknown")).then(|| value.to_owned())
}
