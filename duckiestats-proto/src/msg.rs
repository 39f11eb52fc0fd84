use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of `POST /{version}/{category}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushPointReq {
    pub key: String,
    pub device: String,
    pub boot_id: String,
    pub stamp_ms: i64,
    pub format: String,
    pub payload: Value,
}

/// Server answer to a [`PushPointReq`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushPointResp {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl PushPointResp {
    /// Status code the server uses for "point already recorded".
    pub const CONFLICT: u16 = 409;

    pub fn is_duplicate(&self) -> bool {
        !self.success && self.code == Some(Self::CONFLICT)
    }
}

const TOKEN_PREFIX: &str = "dt1-";
const BASE58_ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("token must start with '{TOKEN_PREFIX}'")]
    UnknownScheme,
    #[error("token must have the form dt1-<payload>-<signature>")]
    Malformed,
    #[error("token contains non-base58 characters")]
    InvalidEncoding,
}

/// Device-unique `dt1` credential. Only the shape is checked, not the signature.
#[derive(PartialEq, Eq, Hash, Clone)]
pub struct DeviceToken(String);

impl DeviceToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for DeviceToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // never leak the signature into logs
        let visible = self.0.len().min(TOKEN_PREFIX.len() + 4);
        write!(f, "DeviceToken({}...)", &self.0[..visible])
    }
}

impl std::fmt::Display for DeviceToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for DeviceToken {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let rest = s.strip_prefix(TOKEN_PREFIX).ok_or(TokenError::UnknownScheme)?;

        let (payload, signature) = rest.split_once('-').ok_or(TokenError::Malformed)?;
        if payload.is_empty() || signature.is_empty() || signature.contains('-') {
            return Err(TokenError::Malformed);
        }

        let is_base58 = |part: &str| part.chars().all(|c| BASE58_ALPHABET.contains(c));
        if !is_base58(payload) || !is_base58(signature) {
            return Err(TokenError::InvalidEncoding);
        }

        Ok(DeviceToken(s.to_owned()))
    }
}
