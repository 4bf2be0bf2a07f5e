use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::mutex::Mutex;

use crate::token::FolderIndex;

/// Everything the player module understands. Commands are fire-and-forget:
/// the module does not confirm that it applied them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerCommand {
    PlayFolder(FolderIndex),
    /// One-based track number across the whole card.
    PlayTrack(u16),
    Resume,
    Pause,
    Next,
    Previous,
    Stop,
    SetVolume(u8),
}

#[allow(async_fn_in_trait)]
pub trait PlayerControl {
    type Error: core::fmt::Debug;

    async fn send(&mut self, command: PlayerCommand) -> Result<(), Self::Error>;

    /// True if the player reported a finished track since the last poll.
    /// Never waits for input.
    async fn poll_track_finished(&mut self) -> Result<bool, Self::Error>;

    async fn play_folder(&mut self, folder: FolderIndex) -> Result<(), Self::Error> {
        self.send(PlayerCommand::PlayFolder(folder)).await
    }

    async fn play_track(&mut self, track: u16) -> Result<(), Self::Error> {
        self.send(PlayerCommand::PlayTrack(track)).await
    }

    async fn resume(&mut self) -> Result<(), Self::Error> {
        self.send(PlayerCommand::Resume).await
    }

    async fn pause(&mut self) -> Result<(), Self::Error> {
        self.send(PlayerCommand::Pause).await
    }

    async fn next(&mut self) -> Result<(), Self::Error> {
        self.send(PlayerCommand::Next).await
    }

    async fn previous(&mut self) -> Result<(), Self::Error> {
        self.send(PlayerCommand::Previous).await
    }

    async fn stop(&mut self) -> Result<(), Self::Error> {
        self.send(PlayerCommand::Stop).await
    }

    async fn set_volume(&mut self, volume: u8) -> Result<(), Self::Error> {
        self.send(PlayerCommand::SetVolume(volume)).await
    }
}

/// Handle to a player used by several tasks. The lock is held for a single
/// command only, so commands from different tasks may interleave.
pub struct SharedPlayer<'a, M: RawMutex, P> {
    inner: &'a Mutex<M, P>,
}

impl<'a, M: RawMutex, P> SharedPlayer<'a, M, P> {
    pub fn new(inner: &'a Mutex<M, P>) -> Self {
        Self { inner }
    }
}

impl<M: RawMutex, P> Clone for SharedPlayer<'_, M, P> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<M: RawMutex, P> Copy for SharedPlayer<'_, M, P> {}

impl<M: RawMutex, P: PlayerControl> PlayerControl for SharedPlayer<'_, M, P> {
    type Error = P::Error;

    async fn send(&mut self, command: PlayerCommand) -> Result<(), Self::Error> {
        self.inner.lock().await.send(command).await
    }

    async fn poll_track_finished(&mut self) -> Result<bool, Self::Error> {
        self.inner.lock().await.poll_track_finished().await
    }
}
