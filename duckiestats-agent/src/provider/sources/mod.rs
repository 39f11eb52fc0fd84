//! Concrete data sources wrapped by polled providers.

pub mod command;
pub mod endpoint;
pub mod robot;
pub mod system;

pub use command::{DockerImagesSource, DockerPsSource, LsusbSource, WirelessStatusSource};
pub use endpoint::JsonEndpointSource;
pub use robot::{RobotConfigurationSource, RobotHostnameSource, RobotTypeSource};
pub use system::{NetworkConfigurationSource, UptimeSource};
