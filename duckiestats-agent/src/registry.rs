use std::path::Path;

use log::info;

use crate::{
    http_util::HttpOptions,
    provider::{
        Frequency, Provider,
        file::{glob_event_providers, glob_usage_providers},
        sources::{
            DockerImagesSource, DockerPsSource, JsonEndpointSource, LsusbSource,
            NetworkConfigurationSource, RobotConfigurationSource, RobotHostnameSource,
            RobotTypeSource, UptimeSource, WirelessStatusSource, command::WIFI_DEVICE,
        },
    },
};

const DROPPED_FILE_PATTERN: &str = "*.json";
const PUBLIC_IP_URL: &str = "https://api.ipify.org?format=json";
const GEOLOCATION_URL: &str = "https://freegeoip.app/json/";

/// Inputs needed to build the provider list.
#[derive(Debug, Clone)]
pub struct RegistrySettings<'a> {
    pub events_dir: &'a Path,
    pub usage_dir: &'a Path,
    pub hostname: &'a str,
    pub hostname_override: Option<&'a str>,
    pub probe: HttpOptions,
}

/// Dropped files first, then in-process sources, then static robot facts.
///
/// Directories are scanned once; files appearing later are not picked up.
pub fn assemble(settings: &RegistrySettings<'_>) -> Vec<Provider> {
    let mut providers = Vec::new();

    providers.extend(glob_event_providers(
        settings.events_dir,
        DROPPED_FILE_PATTERN,
    ));
    for key in ["disk_image", "init_sd_card"] {
        providers.extend(glob_usage_providers(
            &settings.usage_dir.join(key),
            DROPPED_FILE_PATTERN,
            key,
        ));
    }
    let dropped = providers.len();

    let probe = settings.probe;
    let limit = probe.timeout;
    let local = |key: &'static str, path: &str| {
        JsonEndpointSource::local(key, settings.hostname, path, probe)
    };

    providers.extend([
        Provider::usage(DockerPsSource::new(limit), Frequency::EveryHour),
        Provider::usage(DockerImagesSource::new(limit), Frequency::Every2Hours),
        Provider::usage(UptimeSource, Frequency::Every30Minutes),
        Provider::usage(NetworkConfigurationSource, Frequency::EveryHour),
        Provider::usage(local("ros/graph", "ros/graph").field("data"), Frequency::Every30Minutes),
        Provider::usage(local("health", "health"), Frequency::Every30Minutes),
        Provider::usage(
            JsonEndpointSource::new("network/public_ip", PUBLIC_IP_URL, probe),
            Frequency::OneShot,
        ),
        Provider::usage(
            JsonEndpointSource::new("geolocation", GEOLOCATION_URL, probe),
            Frequency::OneShot,
        ),
        Provider::usage(
            local("battery/history", "health/battery/history"),
            Frequency::Every2Hours,
        ),
        Provider::usage(local("battery/info", "health/battery/info"), Frequency::OneShot),
        Provider::usage(LsusbSource::new(limit), Frequency::Every2Hours),
        Provider::usage(
            WirelessStatusSource::new(WIFI_DEVICE, limit),
            Frequency::Every30Minutes,
        ),
        Provider::configuration(RobotHostnameSource::new(
            settings.hostname_override.map(str::to_owned),
        )),
        Provider::configuration(RobotTypeSource),
        Provider::configuration(RobotConfigurationSource),
    ]);

    info!(
        "registered {} providers ({dropped} from dropped files)",
        providers.len()
    );
    providers
}
