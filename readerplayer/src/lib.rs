#![cfg_attr(not(test), no_std)]

//! Keeps a serial MP3 player module in sync with the RFID tag lying on a
//! reader: placing a tag plays its folder, removing it pauses.

extern crate alloc;

pub mod config;
pub mod controls;
pub mod dfplayer;
pub mod machine;
pub mod player;
pub mod reader;
pub mod registry;
pub mod token;
pub mod web;

#[cfg(test)]
mod testing;

pub use config::{DeviceConfig, SpecialTokens};
pub use machine::{PlayerState, ReaderPlayer, Step};
pub use player::{PlayerCommand, PlayerControl, SharedPlayer};
pub use reader::{ReaderFault, TagReader};
pub use registry::{RegistryStore, TagRegistry};
pub use token::{FolderIndex, TokenId};

/// Logs the error of a fire-and-forget operation and continues with an `Option`.
pub trait PrintErr<T> {
    fn print_err(self, msg: &str) -> Option<T>;
}

impl<T, E: core::fmt::Debug> PrintErr<T> for Result<T, E> {
    fn print_err(self, msg: &str) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(err) => {
                log::error!("{}: {:?}", msg, err);
                None
            }
        }
    }
}
