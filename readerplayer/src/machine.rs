//! The reader/player state machine.
//!
//! The player module gives almost no feedback, so this keeps its own idea of
//! whether the player is playing and drives it from what the reader sees:
//! a tag on the reader means playing, no tag means paused.

use embassy_time::{Duration, Instant, Timer};
use embedded_hal::digital::{InputPin, OutputPin};
use log::{debug, info};

use crate::config::SpecialTokens;
use crate::controls::{Button, Debounce, StatusLed};
use crate::player::PlayerControl;
use crate::reader::{ReaderFault, TagReader};
use crate::registry::{RegistryStore, TagRegistry};
use crate::token::FolderIndex;
use crate::PrintErr;

/// Period of the poll loop.
pub const TICK: Duration = Duration::from_millis(100);
/// Delay before the pause command is repeated after a tag was removed.
pub const REPEAT_PAUSE_DELAY: Duration = Duration::from_millis(100);
/// Minimum time between two accepted button presses.
pub const BUTTON_WINDOW: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Playing,
    Paused,
}

/// Outcome of one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    /// The end-of-program tag was scanned and the player stopped.
    Shutdown,
}

#[derive(Debug, Clone, Copy)]
pub struct Session {
    pub state: PlayerState,
    pub current_folder: Option<FolderIndex>,
    pub button: Debounce,
}

impl Session {
    pub fn new(now: Instant) -> Self {
        Self {
            state: PlayerState::Paused,
            current_folder: None,
            button: Debounce::new(BUTTON_WINDOW, now),
        }
    }
}

pub struct ReaderPlayer<R, P, B, L, S> {
    reader: R,
    player: P,
    button: Button<B>,
    led: StatusLed<L>,
    registry: TagRegistry<S>,
    special: SpecialTokens,
    session: Session,
}

impl<R, P, B, L, S> ReaderPlayer<R, P, B, L, S>
where
    R: TagReader,
    P: PlayerControl,
    B: InputPin,
    L: OutputPin,
    S: RegistryStore,
{
    pub fn new(
        reader: R,
        player: P,
        button: B,
        led: L,
        registry: TagRegistry<S>,
        special: SpecialTokens,
        now: Instant,
    ) -> Self {
        Self {
            reader,
            player,
            button: Button::new(button),
            led: StatusLed::new(led),
            registry,
            special,
            session: Session::new(now),
        }
    }

    /// Brings the player into a known state: volume set, paused, LED off.
    pub async fn start(&mut self, volume: u8) {
        self.player
            .set_volume(volume)
            .await
            .print_err("Failed to set volume");
        self.pause().await;
    }

    /// Ticks until the end-of-program tag is scanned.
    pub async fn run(&mut self) {
        loop {
            match self.tick(Instant::now()).await {
                Ok(Step::Continue) => {}
                Ok(Step::Shutdown) => {
                    info!("Program ended by tag");
                    return;
                }
                Err(ReaderFault) => debug!("Reader fault, tick abandoned"),
            }
            Timer::after(TICK).await;
        }
    }

    /// One iteration of the poll loop, without the trailing sleep.
    ///
    /// A [`ReaderFault`] aborts the tick; commands issued before it stay
    /// issued.
    pub async fn tick(&mut self, now: Instant) -> Result<Step, ReaderFault> {
        match self.session.state {
            PlayerState::Playing => {
                self.tick_playing(now).await?;
                Ok(Step::Continue)
            }
            PlayerState::Paused => self.tick_paused().await,
        }
    }

    async fn tick_playing(&mut self, now: Instant) -> Result<(), ReaderFault> {
        let finished = self
            .player
            .poll_track_finished()
            .await
            .print_err("Failed to read from player")
            .unwrap_or(false);
        if finished {
            info!("Track finished");
            self.player.next().await.print_err("Failed to skip");
        }

        if !self.reader.token_still_present()? {
            info!("Tag removed");
            self.pause().await;
            // the player sometimes drops a pause
            Timer::after(REPEAT_PAUSE_DELAY).await;
            self.player.pause().await.print_err("Failed to pause");
        } else if !finished && self.button.is_pressed() && self.session.button.accept(now) {
            info!("Button pressed");
            self.player.next().await.print_err("Failed to skip");
        }

        Ok(())
    }

    async fn tick_paused(&mut self) -> Result<Step, ReaderFault> {
        let Some(token) = self.reader.poll_new_token()? else {
            return Ok(Step::Continue);
        };
        debug!("Tag {} scanned", token);

        // special tags are only honoured while paused
        if token == self.special.end_program {
            info!("End-of-program tag scanned");
            self.player.stop().await.print_err("Failed to stop");
            return Ok(Step::Shutdown);
        }

        if token == self.special.next_unassigned_folder {
            let folder = self.registry.preview_next_unassigned_folder();
            info!("Previewing unassigned folder {}", folder);
            self.play_folder(folder).await;
            return Ok(Step::Continue);
        }

        let folder = self.registry.folder_for(&token);
        if self.session.current_folder == Some(folder) {
            self.resume().await;
        } else {
            self.play_folder(folder).await;
        }
        Ok(Step::Continue)
    }

    async fn play_folder(&mut self, folder: FolderIndex) {
        info!("Playing folder {}", folder);
        self.player
            .play_folder(folder)
            .await
            .print_err("Failed to play folder");
        self.session.current_folder = Some(folder);
        self.set_state(PlayerState::Playing);
    }

    async fn resume(&mut self) {
        info!("Resuming folder {:?}", self.session.current_folder);
        self.player.resume().await.print_err("Failed to resume");
        self.set_state(PlayerState::Playing);
    }

    async fn pause(&mut self) {
        self.player.pause().await.print_err("Failed to pause");
        self.set_state(PlayerState::Paused);
    }

    fn set_state(&mut self, state: PlayerState) {
        self.session.state = state;
        self.led.set(state == PlayerState::Playing);
    }

    pub fn state(&self) -> PlayerState {
        self.session.state
    }

    pub fn current_folder(&self) -> Option<FolderIndex> {
        self.session.current_folder
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn registry(&self) -> &TagRegistry<S> {
        &self.registry
    }

    pub fn reader(&self) -> &R {
        &self.reader
    }

    pub fn player(&self) -> &P {
        &self.player
    }

    pub fn player_mut(&mut self) -> &mut P {
        &mut self.player
    }

    pub fn reader_mut(&mut self) -> &mut R {
        &mut self.reader
    }
}
