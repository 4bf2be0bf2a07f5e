use alloc::string::String;
use core::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dfplayer::MAX_VOLUME;
use crate::token::TokenId;

pub const DEFAULT_VOLUME: u8 = 15;

/// 8.3 names of the configuration file in the card's root directory: the
/// alias a PC writes for `config.json`, then the plain short name.
pub const CONFIG_FILES: [&str; 2] = ["CONFIG~1.JSO", "CONFIG.JSO"];

const END_PROGRAM: [u8; 4] = [0x65, 0xc0, 0x8c, 0xb9];
const NEXT_UNASSIGNED_FOLDER: [u8; 4] = [0x12, 0x06, 0xbe, 0x59];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Tags that trigger an action instead of playing a folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpecialTokens {
    /// Stops the player and ends the program.
    pub end_program: TokenId,
    /// Plays the folder the next new tag would get, to prepare that tag.
    pub next_unassigned_folder: TokenId,
}

impl Default for SpecialTokens {
    fn default() -> Self {
        Self {
            end_program: token_from(&END_PROGRAM),
            next_unassigned_folder: token_from(&NEXT_UNASSIGNED_FOLDER),
        }
    }
}

fn token_from(uid: &[u8; 4]) -> TokenId {
    match TokenId::from_bytes(uid) {
        Ok(token) => token,
        // four bytes always fit
        Err(_) => unreachable!(),
    }
}

/// Contents of `CONFIG.JSO` on the SD card.
#[derive(Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DeviceConfig {
    /// Network to join. Without it the device opens its own access point.
    #[serde(alias = "SSID")]
    pub ssid: Option<String>,

    #[serde(alias = "PASSWORD")]
    pub password: Option<String>,

    /// Player volume at startup, 0..=30.
    pub volume: Option<u8>,

    pub special_tokens: SpecialTokens,
}

impl DeviceConfig {
    pub fn from_json(bytes: &[u8]) -> Result<Self, ConfigError> {
        serde_json::from_slice(bytes).map_err(|err| ConfigError::Invalid(alloc::format!("{err}")))
    }

    pub fn volume(&self) -> u8 {
        self.volume.unwrap_or(DEFAULT_VOLUME).min(MAX_VOLUME)
    }

    /// Station credentials, if both are configured.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.ssid, &self.password) {
            (Some(ssid), Some(password)) if !ssid.is_empty() => {
                Some((ssid.as_str(), password.as_str()))
            }
            _ => None,
        }
    }
}

impl fmt::Debug for DeviceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceConfig")
            .field("ssid", &self.ssid)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("volume", &self.volume())
            .field("special_tokens", &self.special_tokens)
            .finish()
    }
}
