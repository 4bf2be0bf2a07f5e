//! Test doubles for the hardware the controller talks to.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::convert::Infallible;
use std::rc::Rc;

use embedded_hal::spi::{ErrorKind, Operation, SpiDevice};

use crate::player::{PlayerCommand, PlayerControl};
use crate::reader::{ReaderFault, TagReader};
use crate::registry::{Assignment, RegistryStore, StoreError};
use crate::token::TokenId;

pub fn token(hex: &str) -> TokenId {
    hex.parse().unwrap()
}

/// Reader driven by a script of poll results. An exhausted script reads as
/// "no tag" and "tag still there".
#[derive(Default)]
pub struct ScriptedReader {
    pub polls: VecDeque<Result<Option<TokenId>, ReaderFault>>,
    pub presence: VecDeque<Result<bool, ReaderFault>>,
    pub poll_calls: usize,
    pub presence_calls: usize,
}

impl ScriptedReader {
    pub fn scan(&mut self, hex: &str) -> &mut Self {
        self.polls.push_back(Ok(Some(token(hex))));
        self
    }

    pub fn nothing(&mut self) -> &mut Self {
        self.polls.push_back(Ok(None));
        self
    }

    pub fn fault_on_poll(&mut self) -> &mut Self {
        self.polls.push_back(Err(ReaderFault));
        self
    }

    pub fn present(&mut self, present: bool) -> &mut Self {
        self.presence.push_back(Ok(present));
        self
    }

    pub fn fault_on_presence(&mut self) -> &mut Self {
        self.presence.push_back(Err(ReaderFault));
        self
    }
}

impl TagReader for ScriptedReader {
    fn poll_new_token(&mut self) -> Result<Option<TokenId>, ReaderFault> {
        self.poll_calls += 1;
        self.polls.pop_front().unwrap_or(Ok(None))
    }

    fn token_still_present(&mut self) -> Result<bool, ReaderFault> {
        self.presence_calls += 1;
        self.presence.pop_front().unwrap_or(Ok(true))
    }
}

/// Records every command it is sent.
#[derive(Default)]
pub struct RecordingPlayer {
    pub commands: Vec<PlayerCommand>,
    pub finished: VecDeque<bool>,
}

impl PlayerControl for RecordingPlayer {
    type Error = Infallible;

    async fn send(&mut self, command: PlayerCommand) -> Result<(), Self::Error> {
        self.commands.push(command);
        Ok(())
    }

    async fn poll_track_finished(&mut self) -> Result<bool, Self::Error> {
        Ok(self.finished.pop_front().unwrap_or(false))
    }
}

/// Player whose serial line is broken.
#[derive(Default)]
pub struct BrokenPlayer {
    pub attempts: usize,
}

impl PlayerControl for BrokenPlayer {
    type Error = &'static str;

    async fn send(&mut self, _command: PlayerCommand) -> Result<(), Self::Error> {
        self.attempts += 1;
        Err("line down")
    }

    async fn poll_track_finished(&mut self) -> Result<bool, Self::Error> {
        Err("line down")
    }
}

/// Input pin whose level is shared with the test through an `Rc`.
#[derive(Clone, Default)]
pub struct FakeInput {
    low: Rc<Cell<bool>>,
}

impl FakeInput {
    pub fn set_low(&self, low: bool) {
        self.low.set(low);
    }
}

impl embedded_hal::digital::ErrorType for FakeInput {
    type Error = Infallible;
}

impl embedded_hal::digital::InputPin for FakeInput {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.low.get())
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(self.low.get())
    }
}

#[derive(Clone, Default)]
pub struct FakeOutput {
    high: Rc<Cell<bool>>,
}

impl FakeOutput {
    pub fn is_high(&self) -> bool {
        self.high.get()
    }
}

impl embedded_hal::digital::ErrorType for FakeOutput {
    type Error = Infallible;
}

impl embedded_hal::digital::OutputPin for FakeOutput {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.high.set(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.high.set(true);
        Ok(())
    }
}

/// Serial port with a queue of inbound bytes and a log of written ones.
#[derive(Default)]
pub struct FakeSerial {
    pub inbound: VecDeque<u8>,
    pub written: Vec<u8>,
}

impl FakeSerial {
    pub fn push_inbound(&mut self, bytes: &[u8]) {
        self.inbound.extend(bytes);
    }
}

impl embedded_io::ErrorType for FakeSerial {
    type Error = Infallible;
}

impl embedded_io::ReadReady for FakeSerial {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.inbound.is_empty())
    }
}

impl embedded_io_async::Read for FakeSerial {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let n = buf.len().min(self.inbound.len());
        for (slot, byte) in buf.iter_mut().zip(self.inbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl embedded_io_async::Write for FakeSerial {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.written.extend_from_slice(buf);
        Ok(buf.len())
    }
}

/// HTTP client connection delivering the request in small chunks.
pub struct FakeConnection {
    request: VecDeque<u8>,
    chunk: usize,
    pub response: Vec<u8>,
}

impl FakeConnection {
    pub fn new(request: &str, chunk: usize) -> Self {
        Self {
            request: request.bytes().collect(),
            chunk,
            response: Vec::new(),
        }
    }

    pub fn response_text(&self) -> String {
        String::from_utf8_lossy(&self.response).into_owned()
    }
}

impl embedded_io::ErrorType for FakeConnection {
    type Error = Infallible;
}

impl embedded_io_async::Read for FakeConnection {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let n = buf.len().min(self.chunk).min(self.request.len());
        for (slot, byte) in buf.iter_mut().zip(self.request.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl embedded_io_async::Write for FakeConnection {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.response.extend_from_slice(buf);
        Ok(buf.len())
    }
}

/// Store that fails on load or on every append.
pub struct FailingStore {
    fail_load: bool,
    appends: usize,
}

impl FailingStore {
    pub fn on_load() -> Self {
        Self {
            fail_load: true,
            appends: 0,
        }
    }

    pub fn on_append() -> Self {
        Self {
            fail_load: false,
            appends: 0,
        }
    }

    pub fn appends(&self) -> usize {
        self.appends
    }
}

impl RegistryStore for FailingStore {
    fn load(&mut self) -> Result<Vec<Assignment>, StoreError> {
        if self.fail_load {
            Err(StoreError::Unavailable)
        } else {
            Ok(Vec::new())
        }
    }

    fn append(&mut self, _assignment: &Assignment) -> Result<(), StoreError> {
        self.appends += 1;
        Err(StoreError::Io("card removed".into()))
    }
}

/// ISO 14443-3 type A tag states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TagState {
    #[default]
    Idle,
    Ready,
    Active,
    Halt,
}

const COMMAND_REG: u8 = 0x01;
const COM_IRQ_REG: u8 = 0x04;
const DIV_IRQ_REG: u8 = 0x05;
const ERROR_REG: u8 = 0x06;
const FIFO_DATA_REG: u8 = 0x09;
const FIFO_LEVEL_REG: u8 = 0x0A;
const CONTROL_REG: u8 = 0x0C;
const BIT_FRAMING_REG: u8 = 0x0D;
const CRC_RESULT_HIGH_REG: u8 = 0x21;
const CRC_RESULT_LOW_REG: u8 = 0x22;

const CMD_IDLE: u8 = 0x00;
const CMD_CALC_CRC: u8 = 0x03;
const CMD_TRANSCEIVE: u8 = 0x0C;
const CMD_SOFT_RESET: u8 = 0x0F;

const TIMER_IRQ: u8 = 1 << 0;
const ERR_IRQ: u8 = 1 << 1;
const RX_IRQ: u8 = 1 << 5;
const CRC_IRQ: u8 = 1 << 2;
const PROTOCOL_ERR: u8 = 1 << 0;

const SAK_MIFARE_1K: u8 = 0x08;

/// CRC_A of ISO 14443-3, low byte first.
fn crc_a(data: &[u8]) -> [u8; 2] {
    let mut crc: u16 = 0x6363;
    for &byte in data {
        let mut ch = byte ^ (crc & 0xff) as u8;
        ch ^= ch << 4;
        let ch = u16::from(ch);
        crc = (crc >> 8) ^ (ch << 8) ^ (ch << 3) ^ (ch >> 4);
    }
    crc.to_le_bytes()
}

/// Register map of an MFRC522 with at most one 4-byte-UID tag in its field.
struct Rc522Chip {
    registers: [u8; 64],
    fifo: VecDeque<u8>,
    command: u8,
    tag: Option<[u8; 4]>,
    tag_state: TagState,
    bus_down: bool,
    garbled: bool,
    proprietary: bool,
    transactions: usize,
    wake_ups: usize,
}

impl Rc522Chip {
    fn new() -> Self {
        Self {
            registers: [0; 64],
            fifo: VecDeque::new(),
            command: CMD_IDLE,
            tag: None,
            tag_state: TagState::Idle,
            bus_down: false,
            garbled: false,
            proprietary: false,
            transactions: 0,
            wake_ups: 0,
        }
    }

    /// One byte on the wire. The first byte of a transaction is the address.
    fn shift(&mut self, address: &mut Option<u8>, mosi: u8) -> u8 {
        let Some(addr) = *address else {
            *address = Some(mosi);
            return 0;
        };
        let reg = (addr >> 1) & 0x3F;
        if addr & 0x80 != 0 {
            self.read_register(reg)
        } else {
            self.write_register(reg, mosi);
            0
        }
    }

    fn read_register(&mut self, reg: u8) -> u8 {
        match reg {
            COMMAND_REG => self.command,
            FIFO_DATA_REG => self.fifo.pop_front().unwrap_or(0),
            FIFO_LEVEL_REG => self.fifo.len() as u8,
            _ => self.registers[usize::from(reg)],
        }
    }

    fn write_register(&mut self, reg: u8, value: u8) {
        match reg {
            COMMAND_REG => self.run_command(value & 0x0F),
            COM_IRQ_REG | DIV_IRQ_REG => {
                let bits = value & 0x7F;
                if value & 0x80 != 0 {
                    self.registers[usize::from(reg)] |= bits;
                } else {
                    self.registers[usize::from(reg)] &= !bits;
                }
            }
            FIFO_DATA_REG => self.fifo.push_back(value),
            FIFO_LEVEL_REG => {
                if value & 0x80 != 0 {
                    self.fifo.clear();
                }
            }
            BIT_FRAMING_REG => {
                self.registers[usize::from(reg)] = value & 0x7F;
                if value & 0x80 != 0 && self.command == CMD_TRANSCEIVE {
                    self.transceive();
                }
            }
            _ => self.registers[usize::from(reg)] = value,
        }
    }

    fn run_command(&mut self, command: u8) {
        self.command = command;
        match command {
            CMD_SOFT_RESET => self.command = CMD_IDLE,
            CMD_CALC_CRC => {
                let data: Vec<u8> = self.fifo.drain(..).collect();
                let [low, high] = crc_a(&data);
                self.registers[usize::from(CRC_RESULT_LOW_REG)] = low;
                self.registers[usize::from(CRC_RESULT_HIGH_REG)] = high;
                self.registers[usize::from(DIV_IRQ_REG)] |= CRC_IRQ;
            }
            _ => {}
        }
    }

    fn transceive(&mut self) {
        let frame: Vec<u8> = self.fifo.drain(..).collect();
        self.registers[usize::from(ERROR_REG)] = 0;
        match self.answer(&frame) {
            Some(_) if self.garbled => {
                self.registers[usize::from(ERROR_REG)] = PROTOCOL_ERR;
                self.registers[usize::from(COM_IRQ_REG)] |= ERR_IRQ;
            }
            Some(answer) => {
                self.fifo.extend(answer);
                self.registers[usize::from(CONTROL_REG)] &= !0x07;
                self.registers[usize::from(COM_IRQ_REG)] |= RX_IRQ;
            }
            None => self.registers[usize::from(COM_IRQ_REG)] |= TIMER_IRQ,
        }
    }

    /// What the tag sends back for `frame`, `None` for silence.
    fn answer(&mut self, frame: &[u8]) -> Option<Vec<u8>> {
        if frame == [0x52] {
            self.wake_ups += 1;
        }
        let uid = self.tag?;
        let atqa = if self.proprietary {
            vec![0x00, 0x00]
        } else {
            vec![0x04, 0x00]
        };

        match (frame, self.tag_state) {
            // REQA
            ([0x26], TagState::Idle) => {
                self.tag_state = TagState::Ready;
                Some(atqa)
            }
            // WUPA
            ([0x52], TagState::Idle | TagState::Halt) => {
                self.tag_state = TagState::Ready;
                Some(atqa)
            }
            // anticollision, cascade level 1
            ([0x93, 0x20], TagState::Ready) => {
                let bcc = uid.iter().fold(0, |acc, b| acc ^ b);
                let mut answer = uid.to_vec();
                answer.push(bcc);
                Some(answer)
            }
            // SELECT, cascade level 1
            ([0x93, 0x70, rest @ ..], TagState::Ready) if rest.starts_with(&uid) => {
                self.tag_state = TagState::Active;
                let mut answer = vec![SAK_MIFARE_1K];
                answer.extend(crc_a(&[SAK_MIFARE_1K]));
                Some(answer)
            }
            // HLTA
            ([0x50, 0x00, ..], TagState::Active) => {
                self.tag_state = TagState::Halt;
                None
            }
            // anything unexpected sends the tag back to where it started
            (_, TagState::Halt) => None,
            _ => {
                self.tag_state = TagState::Idle;
                None
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusError;

impl embedded_hal::spi::Error for BusError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

/// SPI side of a simulated MFRC522, shared with the test through an `Rc`.
#[derive(Clone)]
pub struct FakeRc522 {
    chip: Rc<RefCell<Rc522Chip>>,
}

impl Default for FakeRc522 {
    fn default() -> Self {
        Self {
            chip: Rc::new(RefCell::new(Rc522Chip::new())),
        }
    }
}

impl FakeRc522 {
    /// Puts a tag into the field. A tag entering the field starts out IDLE.
    pub fn place(&self, uid: [u8; 4]) {
        let mut chip = self.chip.borrow_mut();
        chip.tag = Some(uid);
        chip.tag_state = TagState::Idle;
    }

    pub fn remove(&self) {
        let mut chip = self.chip.borrow_mut();
        chip.tag = None;
        chip.tag_state = TagState::Idle;
    }

    pub fn tag_state(&self) -> TagState {
        self.chip.borrow().tag_state
    }

    /// Makes every SPI transfer fail.
    pub fn set_bus_down(&self, down: bool) {
        self.chip.borrow_mut().bus_down = down;
    }

    /// Makes the tag's answers arrive with a protocol error.
    pub fn set_garbled(&self, garbled: bool) {
        self.chip.borrow_mut().garbled = garbled;
    }

    /// Makes the tag announce a proprietary anticollision scheme.
    pub fn set_proprietary(&self, proprietary: bool) {
        self.chip.borrow_mut().proprietary = proprietary;
    }

    pub fn transactions(&self) -> usize {
        self.chip.borrow().transactions
    }

    /// WUPA frames sent to the field.
    pub fn wake_ups(&self) -> usize {
        self.chip.borrow().wake_ups
    }
}

impl embedded_hal::spi::ErrorType for FakeRc522 {
    type Error = BusError;
}

impl SpiDevice for FakeRc522 {
    fn transaction(&mut self, operations: &mut [Operation<'_, u8>]) -> Result<(), Self::Error> {
        let mut chip = self.chip.borrow_mut();
        if chip.bus_down {
            return Err(BusError);
        }
        chip.transactions += 1;

        let mut address = None;
        for operation in operations.iter_mut() {
            match operation {
                Operation::Read(buf) => {
                    for byte in buf.iter_mut() {
                        *byte = chip.shift(&mut address, 0);
                    }
                }
                Operation::Write(bytes) => {
                    for &byte in bytes.iter() {
                        chip.shift(&mut address, byte);
                    }
                }
                Operation::Transfer(read, write) => {
                    let len = read.len().max(write.len());
                    for i in 0..len {
                        let miso = chip.shift(&mut address, write.get(i).copied().unwrap_or(0));
                        if let Some(slot) = read.get_mut(i) {
                            *slot = miso;
                        }
                    }
                }
                Operation::TransferInPlace(buf) => {
                    for byte in buf.iter_mut() {
                        *byte = chip.shift(&mut address, *byte);
                    }
                }
                Operation::DelayNs(_) => {}
            }
        }
        Ok(())
    }
}
