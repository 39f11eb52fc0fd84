use std::{
    fs,
    path::{Path, PathBuf},
};

use duckiestats_proto::msg::{DeviceToken, TokenError};
use log::trace;

use crate::config::PathsConf;

#[derive(thiserror::Error, Debug)]
pub enum IdentityError {
    #[error("no secret token found at {0}")]
    MissingToken(PathBuf),
    #[error("invalid secret token: {0}")]
    InvalidToken(#[from] TokenError),
    #[error("could not find the device's unique ID at {0}")]
    MissingDeviceId(PathBuf),
    #[error("could not read the boot identifier at {0}")]
    MissingBootId(PathBuf),
}

/// Facts about the device that are resolved once per component start.
pub trait DeviceContext: Send + Sync {
    fn device_id(&self) -> Result<String, IdentityError>;

    fn token(&self) -> Result<DeviceToken, IdentityError>;

    fn boot_id(&self) -> Result<String, IdentityError>;

    fn permission_granted(&self, permission: &str) -> bool;
}

/// [`DeviceContext`] backed by plain files on the device.
#[derive(Debug, Clone)]
pub struct FsDeviceContext {
    token_file: PathBuf,
    device_id_file: PathBuf,
    boot_id_file: PathBuf,
    permissions_dir: PathBuf,
}

impl FsDeviceContext {
    pub fn new(paths: &PathsConf) -> Self {
        Self {
            token_file: paths.token_file.clone(),
            device_id_file: paths.device_id_file.clone(),
            boot_id_file: paths.boot_id_file.clone(),
            permissions_dir: paths.permissions_dir.clone(),
        }
    }
}

fn read_trimmed(path: &Path) -> Option<String> {
    let content = fs::read_to_string(path)
        .inspect_err(|e| trace!("unable to read {}: {e}", path.display()))
        .ok()?;
    let content = content.trim();
    (!content.is_empty()).then(|| content.to_owned())
}

impl DeviceContext for FsDeviceContext {
    fn device_id(&self) -> Result<String, IdentityError> {
        read_trimmed(&self.device_id_file)
            .ok_or_else(|| IdentityError::MissingDeviceId(self.device_id_file.clone()))
    }

    fn token(&self) -> Result<DeviceToken, IdentityError> {
        let raw = read_trimmed(&self.token_file)
            .ok_or_else(|| IdentityError::MissingToken(self.token_file.clone()))?;
        Ok(raw.parse()?)
    }

    fn boot_id(&self) -> Result<String, IdentityError> {
        read_trimmed(&self.boot_id_file)
            .ok_or_else(|| IdentityError::MissingBootId(self.boot_id_file.clone()))
    }

    fn permission_granted(&self, permission: &str) -> bool {
        read_trimmed(&self.permissions_dir.join(permission)).is_some_and(|value| {
            matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes")
        })
    }
}
