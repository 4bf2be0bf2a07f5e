//! Serial protocol of the DFPlayer Mini family of MP3 modules.
//!
//! Every command is a ten byte frame:
//! `7E FF 06 <cmd> <feedback> <param hi> <param lo> <checksum hi> <checksum lo> EF`.
//! The module answers with frames of the same shape; the only answer we care
//! about is `3D` ("track on the SD card finished").

use embedded_io::ReadReady;
use embedded_io_async::{Read, Write};
use log::{debug, info};
use thiserror::Error;

use crate::player::{PlayerCommand, PlayerControl};

pub const FRAME_LEN: usize = 10;

const START: u8 = 0x7E;
const VERSION: u8 = 0xFF;
const LEN: u8 = 0x06;
const NO_FEEDBACK: u8 = 0x00;
const END: u8 = 0xEF;

const CMD_NEXT: u8 = 0x01;
const CMD_PREVIOUS: u8 = 0x02;
const CMD_TRACK: u8 = 0x03;
const CMD_VOLUME: u8 = 0x06;
const CMD_RESUME: u8 = 0x0D;
const CMD_PAUSE: u8 = 0x0E;
const CMD_FOLDER: u8 = 0x0F;
const CMD_STOP: u8 = 0x16;

/// `06` is the frame length byte, `3D` the "SD track finished" answer.
const TRACK_FINISHED: [u8; 2] = [LEN, 0x3D];

/// Folders are named `01`..`99` on the card.
pub const MAX_FOLDER: u32 = 99;
pub const MAX_VOLUME: u8 = 30;
pub const MAX_TRACK: u16 = 2999;

#[derive(Debug, Error)]
pub enum DfPlayerError<E: core::fmt::Debug> {
    #[error("serial I/O failed: {0:?}")]
    Serial(E),
    #[error("folder {0} does not exist on the player")]
    FolderOutOfRange(u32),
    #[error("track {0} does not exist on the player")]
    TrackOutOfRange(u16),
}

pub fn checksum(body: &[u8]) -> u16 {
    let sum = body.iter().fold(0u16, |acc, &b| acc.wrapping_add(u16::from(b)));
    0u16.wrapping_sub(sum)
}

pub fn encode_frame(command: u8, param: u16) -> [u8; FRAME_LEN] {
    let [param_hi, param_lo] = param.to_be_bytes();
    let [check_hi, check_lo] =
        checksum(&[VERSION, LEN, command, NO_FEEDBACK, param_hi, param_lo]).to_be_bytes();
    [
        START,
        VERSION,
        LEN,
        command,
        NO_FEEDBACK,
        param_hi,
        param_lo,
        check_hi,
        check_lo,
        END,
    ]
}

pub fn encode_command<E: core::fmt::Debug>(
    command: PlayerCommand,
) -> Result<[u8; FRAME_LEN], DfPlayerError<E>> {
    let frame = match command {
        PlayerCommand::PlayFolder(folder) => {
            let folder = folder.one_based();
            if folder > MAX_FOLDER {
                return Err(DfPlayerError::FolderOutOfRange(folder));
            }
            // first track of the folder
            encode_frame(CMD_FOLDER, u16::from_be_bytes([folder as u8, 1]))
        }
        PlayerCommand::PlayTrack(track) => {
            if track == 0 || track > MAX_TRACK {
                return Err(DfPlayerError::TrackOutOfRange(track));
            }
            encode_frame(CMD_TRACK, track)
        }
        PlayerCommand::Resume => encode_frame(CMD_RESUME, 0),
        PlayerCommand::Pause => encode_frame(CMD_PAUSE, 0),
        PlayerCommand::Next => encode_frame(CMD_NEXT, 0),
        PlayerCommand::Previous => encode_frame(CMD_PREVIOUS, 0),
        PlayerCommand::Stop => encode_frame(CMD_STOP, 0),
        PlayerCommand::SetVolume(volume) => {
            encode_frame(CMD_VOLUME, u16::from(volume.min(MAX_VOLUME)))
        }
    };
    Ok(frame)
}

/// Finds the finished-track marker in the inbound byte stream, also when it
/// is split across two reads.
#[derive(Debug, Default)]
pub struct FinishedScanner {
    previous: Option<u8>,
}

impl FinishedScanner {
    pub fn feed(&mut self, bytes: &[u8]) -> bool {
        let mut found = false;
        for &byte in bytes {
            if self.previous == Some(TRACK_FINISHED[0]) && byte == TRACK_FINISHED[1] {
                found = true;
            }
            self.previous = Some(byte);
        }
        found
    }
}

pub struct DfPlayer<U> {
    uart: U,
    scanner: FinishedScanner,
}

impl<U> DfPlayer<U> {
    pub fn new(uart: U) -> Self {
        Self {
            uart,
            scanner: FinishedScanner::default(),
        }
    }

    pub fn release(self) -> U {
        self.uart
    }
}

impl<U> PlayerControl for DfPlayer<U>
where
    U: Read + Write + ReadReady,
{
    type Error = DfPlayerError<U::Error>;

    async fn send(&mut self, command: PlayerCommand) -> Result<(), Self::Error> {
        let frame = encode_command(command)?;
        info!("Player command: {:?}", command);
        self.uart
            .write_all(&frame)
            .await
            .map_err(DfPlayerError::Serial)?;
        self.uart.flush().await.map_err(DfPlayerError::Serial)
    }

    async fn poll_track_finished(&mut self) -> Result<bool, Self::Error> {
        let mut finished = false;
        let mut buffer = [0u8; 32];
        while self.uart.read_ready().map_err(DfPlayerError::Serial)? {
            let n = self
                .uart
                .read(&mut buffer)
                .await
                .map_err(DfPlayerError::Serial)?;
            if n == 0 {
                break;
            }
            debug!("Player sent {:02x?}", &buffer[..n]);
            finished |= self.scanner.feed(&buffer[..n]);
        }
        Ok(finished)
    }
}
