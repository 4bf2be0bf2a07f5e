use log::debug;
use mfrc522::comm::Interface;
use mfrc522::{Initialized, Mfrc522};
use thiserror::Error;

use crate::token::TokenId;

/// Spurious bus-level failure of the transceiver driver. It says nothing about
/// the tag; the current tick is abandoned and the next one polls again.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("transient reader fault")]
pub struct ReaderFault;

pub trait TagReader {
    /// Runs a fresh request/select handshake. A failed handshake reads as "no
    /// tag"; only a [`ReaderFault`] is reported as an error.
    fn poll_new_token(&mut self) -> Result<Option<TokenId>, ReaderFault>;

    /// Wakes and re-selects the tag returned by the last successful poll. Any
    /// failed handshake reads as "removed".
    fn token_still_present(&mut self) -> Result<bool, ReaderFault>;
}

pub struct Mfrc522Reader<COMM: Interface> {
    device: Mfrc522<COMM, Initialized>,
    selected: Option<TokenId>,
}

impl<COMM: Interface> Mfrc522Reader<COMM> {
    pub fn new(device: Mfrc522<COMM, Initialized>) -> Self {
        Self {
            device,
            selected: None,
        }
    }

    pub fn selected(&self) -> Option<&TokenId> {
        self.selected.as_ref()
    }

    pub fn release(self) -> Mfrc522<COMM, Initialized> {
        self.device
    }

    /// WUPA, select, then HLTA. Halting the tag makes it answer the next WUPA
    /// at once instead of ignoring it while still ACTIVE.
    fn handshake(&mut self) -> Result<Option<TokenId>, ReaderFault> {
        let atqa = match self.device.wupa() {
            Ok(atqa) => atqa,
            Err(err) => return classify(err).map(|()| None),
        };
        let uid = match self.device.select(&atqa) {
            Ok(uid) => uid,
            Err(err) => {
                debug!("Tag answered wake-up but select failed");
                return classify(err).map(|()| None);
            }
        };
        if let Err(err) = self.device.hlta() {
            classify(err)?;
            debug!("Tag did not halt");
        }

        Ok(TokenId::from_bytes(uid.as_bytes()).ok())
    }
}

/// Bus errors are faults, everything else is a failed handshake.
fn classify<E>(err: mfrc522::Error<E>) -> Result<(), ReaderFault> {
    match err {
        mfrc522::Error::Comm(_) => Err(ReaderFault),
        _ => Ok(()),
    }
}

impl<COMM: Interface> TagReader for Mfrc522Reader<COMM> {
    fn poll_new_token(&mut self) -> Result<Option<TokenId>, ReaderFault> {
        // WUPA rather than REQA so a tag halted by the last presence check is
        // found again without lifting it
        let token = self.handshake()?;
        if token.is_some() {
            self.selected.clone_from(&token);
        }
        Ok(token)
    }

    fn token_still_present(&mut self) -> Result<bool, ReaderFault> {
        let Some(expected) = self.selected.clone() else {
            return Ok(false);
        };
        Ok(self.handshake()?.is_some_and(|token| token == expected))
    }
}
