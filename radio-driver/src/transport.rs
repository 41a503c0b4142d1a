/// Chip strobe commands, named after the CC112x/CC120x command strobe
/// registers they map onto.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum Strobe {
    /// Reset.
    Res,
    /// Go to IDLE.
    Idle,
    /// Enter wake-on-radio.
    Wor,
    /// Enable RX.
    Rx,
    /// Enable TX (or TX-on-CCA when CCA mode is armed).
    Tx,
    /// Start RF calibration.
    Cal,
    /// Enter power-down/sleep.
    Pwd,
    /// No operation; used to read chip status without side effects.
    Nop,
    /// Flush RX FIFO.
    Frx,
    /// Flush TX FIFO.
    Ftx,
}

/// Chip registers the driver reads or writes, named after the
/// CC112x/CC120x registers they map onto.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum Register {
    /// Chip part-number ID, checked once at [`crate::Driver::init`]
    /// against the caller-supplied expected value.
    PartNumber,
    /// Main Radio Controller state, polled down to `0x41` after
    /// calibration.
    MarcState,
    /// Main Radio Controller status flags (TX/RX result, CCA result).
    MarcStatus0,
    /// Packet configuration 2: CCA mode lives here.
    PktCfg2,
    /// Number of bytes currently in the RX FIFO.
    NumRxBytes,
    /// Wake-on-radio config 0: RC oscillator calibration control bits.
    WorCfg0,
    /// Packet length register (low 8 bits used in fixed-length mode).
    PktLen,
    /// Channel/frequency programming, word 0.
    Freq0,
    /// Output power ramp register.
    PaCfg,
}

/// The seam between the driver's state machine and the actual silicon.
///
/// Implementors perform the SPI transaction (and, where the chip
/// requires it, any header byte framing) for a single strobe or
/// register access. The driver never assumes anything about bus
/// framing beyond these operations.
pub trait RadioTransport {
    type Error;

    /// Issues a command strobe. Returns the chip status byte the SPI
    /// header returns alongside the strobe, where the transport can
    /// provide one (used by the CCA poll to read `chip_status & 0x20`
    /// without a full register read).
    fn strobe(&mut self, cmd: Strobe) -> Result<u8, Self::Error>;

    fn read_register(&mut self, reg: Register) -> Result<u8, Self::Error>;

    fn write_register(&mut self, reg: Register, value: u8) -> Result<(), Self::Error>;

    /// Burst-reads from the RX FIFO into `buf`, exactly `buf.len()` bytes.
    fn read_fifo(&mut self, buf: &mut [u8]) -> Result<(), Self::Error>;

    /// Burst-writes `buf` into the TX FIFO.
    fn write_fifo(&mut self, buf: &[u8]) -> Result<(), Self::Error>;

    /// Busy-waits for approximately `us` microseconds; used by the
    /// calibration and CCA poll loops.
    fn delay_us(&mut self, us: u32);
}
