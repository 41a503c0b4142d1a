use crate::error::RadioError;
use crate::state::RadioState;
use crate::transport::{Register, RadioTransport, Strobe};
use crate::{AVAIL_BYTES_IN_FIFO, FIFO_SIZE, FIFO_THR, RX_BUF_MAX};

/// MARC calibration complete value polled for after `SCAL`.
const MARC_STATE_CAL_DONE: u8 = 0x41;
/// Bit in `MARC_STATUS0` set when a TX-on-CCA strobe found the channel
/// busy.
const MARC_TXONCCA_FAILED: u8 = 0x04;
/// Bit in the chip status byte (returned alongside any strobe) set once
/// the chip has actually entered TX.
const CHIP_STATUS_TX: u8 = 0x20;
/// Bit in `MARC_STATUS0` set on a successful TX completion.
const MARC_TX_OK: u8 = 0x01;
/// Bit in `MARC_STATUS0` set on a successful RX completion (RX FIFO
/// holds a good frame per MARC, independent of CRC, which is checked
/// above this layer).
const MARC_RX_OK: u8 = 0x80;
/// CCA mode value for `PKT_CFG2`: RSSI below threshold.
const CCA_MODE_RSSI_BELOW_THR: u8 = 0x24;

const CAL_POLL_MAX: u32 = 10_000;
const CCA_POLL_MAX: u32 = 10_000;

fn to_fatal<E>(_: E) -> RadioError {
    RadioError::Fatal
}

/// How many TX-on-CCA attempts to make before reporting
/// [`RadioError::ChannelAccessFailure`].
///
/// The CC112x reference path retries four times; the CC120x path tries
/// once. Both are real observed behaviors, so the count is a
/// construction-time parameter rather than a compile-time constant.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CcaRetry(pub u8);

impl CcaRetry {
    pub const CC112X: CcaRetry = CcaRetry(4);
    pub const CC120X: CcaRetry = CcaRetry(1);
}

/// Upward hook the radio driver calls on receive events.
///
/// Implemented by the PHY framer, which alone knows how to read a PHY
/// header and turn it into an expected PSDU length; the radio driver
/// never decodes PHR bits itself, only drains the byte counts this
/// trait tells it to.
pub trait PhySink {
    /// Number of PHR bytes to drain from the FIFO before a length is
    /// known: 1 for legacy 15.4, 2 for 15.4g.
    fn phr_len(&self) -> usize;

    /// Decodes the expected PSDU length (everything after the PHR) from
    /// the raw PHR bytes, or `None` if the header is malformed.
    fn parse_phr_len(&self, phr: &[u8]) -> Option<usize>;

    /// Delivers one fully received frame (PHR included, CRC included)
    /// upward. Always called from [`Driver::on_rx_complete`], never
    /// from interrupt context.
    fn recv(&mut self, data: &[u8]);
}

/// Owns the transceiver and its finite state machine.
///
/// `Driver` holds fixed-size TX/RX scratch buffers sized for the
/// largest 15.4g PSDU rather than allocating, so its size is
/// significant (~4 KiB) and it is expected to live for the lifetime of
/// the application, constructed once in [`Driver::init`].
pub struct Driver<'s, T: RadioTransport> {
    transport: T,
    sink: &'s mut dyn PhySink,
    state: RadioState,
    cca_retry: CcaRetry,
    needs_calibration: bool,
    error_count: u32,

    rx_buf: [u8; RX_BUF_MAX],
    rx_ix: usize,
    rx_bytes_left: usize,
    rx_total_len: usize,

    tx_buf: [u8; RX_BUF_MAX],
    tx_ix: usize,
    tx_bytes_left: usize,
    tx_iterations: usize,
    tx_last_portion: bool,
    last_tx_error: Option<RadioError>,

    fixed_pkt_len_mode: bool,
}

/// Commands accepted by [`Driver::ioctl`]. Each variant is named after
/// the NETSTK `ioctl` command it replaces, carrying the argument
/// directly instead of through a `void *`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum IoctlCmd {
    TxPowerSet(i8),
    CcaGet,
    IsRxBusy,
    Chan0Set(u8),
    WorEnable(bool),
}

impl<'s, T: RadioTransport> Driver<'s, T> {
    /// Checks the chip's part-number register against `expected_part_number`,
    /// then runs RF calibration and RC-oscillator calibration, registers
    /// (logically — the interrupt wiring itself is the host's job) the
    /// sync-detect and FIFO-threshold lines, and drops to `Sleep`.
    ///
    /// Returns `InitFailed` if the part-number readback doesn't match.
    pub fn init(
        transport: T,
        sink: &'s mut dyn PhySink,
        cca_retry: CcaRetry,
        expected_part_number: u8,
    ) -> Result<Self, RadioError> {
        let mut d = Driver {
            transport,
            sink,
            state: RadioState::Init,
            cca_retry,
            needs_calibration: false,
            error_count: 0,
            rx_buf: [0; RX_BUF_MAX],
            rx_ix: 0,
            rx_bytes_left: 0,
            rx_total_len: 0,
            tx_buf: [0; RX_BUF_MAX],
            tx_ix: 0,
            tx_bytes_left: 0,
            tx_iterations: 0,
            tx_last_portion: false,
            last_tx_error: None,
            fixed_pkt_len_mode: true,
        };
        let part_number = d.transport.read_register(Register::PartNumber).map_err(to_fatal)?;
        if part_number != expected_part_number {
            return Err(RadioError::InitFailed);
        }
        d.calibrate_rf()?;
        d.calibrate_rc_osc()?;
        d.state = RadioState::Sleep;
        Ok(d)
    }

    pub fn state(&self) -> RadioState {
        self.state
    }

    pub fn error_count(&self) -> u32 {
        self.error_count
    }

    fn calibrate_rf(&mut self) -> Result<(), RadioError> {
        self.transport.strobe(Strobe::Cal).map_err(to_fatal)?;
        for _ in 0..CAL_POLL_MAX {
            let marc_state = self.transport.read_register(Register::MarcState).map_err(to_fatal)?;
            if marc_state == MARC_STATE_CAL_DONE {
                return Ok(());
            }
            self.transport.delay_us(10);
        }
        Err(RadioError::InitFailed)
    }

    fn calibrate_rc_osc(&mut self) -> Result<(), RadioError> {
        let cfg = self.transport.read_register(Register::WorCfg0).map_err(to_fatal)?;
        self.transport
            .write_register(Register::WorCfg0, (cfg & !0x06) | 0x04)
            .map_err(to_fatal)?;
        self.transport.strobe(Strobe::Idle).map_err(to_fatal)?;
        let cfg = self.transport.read_register(Register::WorCfg0).map_err(to_fatal)?;
        self.transport
            .write_register(Register::WorCfg0, cfg & !0x06)
            .map_err(to_fatal)?;
        Ok(())
    }

    /// Powers the radio up into `Sniff` (WOR or continuous RX). Idempotent
    /// with respect to already being on.
    pub fn on(&mut self) -> Result<(), RadioError> {
        match self.state {
            RadioState::Sleep => {
                if self.needs_calibration {
                    self.calibrate_rf()?;
                    self.calibrate_rc_osc()?;
                    self.needs_calibration = false;
                }
                self.transport.strobe(Strobe::Wor).map_err(to_fatal)?;
                self.state = RadioState::Sniff;
                Ok(())
            }
            RadioState::Sniff => Ok(()),
            _ => Err(RadioError::Busy),
        }
    }

    /// Forces `SIDLE`, flushes both FIFOs, strobes power-down and drops
    /// to `Sleep`, regardless of the state it was called from.
    /// Idempotent if already asleep.
    pub fn off(&mut self) -> Result<(), RadioError> {
        if self.state == RadioState::Sleep {
            return Ok(());
        }
        self.transport.strobe(Strobe::Idle).map_err(to_fatal)?;
        self.transport.strobe(Strobe::Frx).map_err(to_fatal)?;
        self.transport.strobe(Strobe::Ftx).map_err(to_fatal)?;
        self.transport.strobe(Strobe::Pwd).map_err(to_fatal)?;
        self.state = RadioState::Sleep;
        self.needs_calibration = true;
        Ok(())
    }

    /// Starts transmitting `buf` (already framed by the PHY layer: PHR,
    /// PSDU and trailing CRC). Returns once the first FIFO burst has
    /// been written and TX strobed — it does not block for completion.
    /// The caller polls [`Driver::poll_tx`] from its own busy-wait or
    /// main-loop tick.
    pub fn send(&mut self, buf: &[u8]) -> Result<(), RadioError> {
        if self.state != RadioState::Sniff {
            return Err(RadioError::Busy);
        }
        if buf.is_empty() {
            return Err(RadioError::TxNoPacket);
        }
        if buf.len() > RX_BUF_MAX {
            return Err(RadioError::InvalidArgument);
        }
        if self.needs_calibration {
            self.calibrate_rf()?;
            self.calibrate_rc_osc()?;
            self.needs_calibration = false;
        }

        self.state = RadioState::TxStarted;
        self.transport.strobe(Strobe::Idle).map_err(to_fatal)?;
        self.transport.strobe(Strobe::Ftx).map_err(to_fatal)?;

        self.tx_buf[..buf.len()].copy_from_slice(buf);
        let total_len = buf.len();
        self.tx_last_portion = false;
        self.last_tx_error = None;

        self.transport
            .write_register(Register::PktLen, (total_len % 256) as u8)
            .map_err(to_fatal)?;

        if total_len <= 255 {
            // Short frame: fixed length mode up front, one burst.
            self.fixed_pkt_len_mode = true;
            self.transport.write_fifo(&self.tx_buf[..total_len]).map_err(to_fatal)?;
            self.tx_ix = total_len;
            self.tx_bytes_left = 0;
            self.tx_iterations = 0;
            self.tx_last_portion = true;
        } else {
            self.fixed_pkt_len_mode = false;
            self.transport.write_fifo(&self.tx_buf[..FIFO_SIZE]).map_err(to_fatal)?;
            self.tx_ix = FIFO_SIZE;
            self.tx_bytes_left = total_len - FIFO_SIZE;
            self.tx_iterations = self.tx_bytes_left / AVAIL_BYTES_IN_FIFO;
        }

        self.state = RadioState::TxBusy;
        self.transport.strobe(Strobe::Tx).map_err(to_fatal)?;
        Ok(())
    }

    /// FIFO-below-threshold interrupt on the TX side. Outside `TxBusy`
    /// this never mutates `state`, only flushes the TX FIFO and counts
    /// an error: under correct wiring it shouldn't fire here at all.
    pub fn on_fifo_threshold_tx(&mut self) -> Result<(), RadioError> {
        if self.state != RadioState::TxBusy {
            self.error_count += 1;
            self.transport.strobe(Strobe::Ftx).map_err(to_fatal)?;
            return Ok(());
        }

        if self.tx_iterations == 0 {
            let n = self.tx_bytes_left;
            self.transport
                .write_fifo(&self.tx_buf[self.tx_ix..self.tx_ix + n])
                .map_err(to_fatal)?;
            self.tx_ix += n;
            self.tx_bytes_left = 0;
            self.tx_last_portion = true;
            return Ok(());
        }

        let n = AVAIL_BYTES_IN_FIFO.min(self.tx_bytes_left);
        self.transport
            .write_fifo(&self.tx_buf[self.tx_ix..self.tx_ix + n])
            .map_err(to_fatal)?;
        self.tx_ix += n;
        self.tx_bytes_left -= n;
        self.tx_iterations -= 1;

        // The mode-switch is a one-shot hardware cutover: once armed it
        // does not gate further refills, it only tells the chip to stop
        // on its own once PKT_LEN bytes have gone out.
        if !self.fixed_pkt_len_mode && self.tx_bytes_left < 256 - (FIFO_SIZE - AVAIL_BYTES_IN_FIFO) {
            self.fixed_pkt_len_mode = true;
        }
        Ok(())
    }

    /// Packet-end interrupt on the TX side. Outside `TxBusy`, counts an
    /// error and flushes the TX FIFO instead of mutating `state`.
    pub fn on_packet_end_tx(&mut self) {
        if self.state != RadioState::TxBusy {
            self.error_count += 1;
            self.transport.strobe(Strobe::Ftx).ok();
            return;
        }
        let marc = match self.transport.read_register(Register::MarcStatus0) {
            Ok(v) => v,
            Err(_) => {
                self.fail_tx(RadioError::Fatal);
                return;
            }
        };
        if marc & MARC_TX_OK == 0 {
            self.transport.strobe(Strobe::Ftx).ok();
            self.fail_tx(RadioError::TxTimeout);
            return;
        }
        if !self.tx_last_portion {
            self.transport.strobe(Strobe::Ftx).ok();
            self.fail_tx(RadioError::Fatal);
            return;
        }
        self.state = RadioState::TxFini;
    }

    fn fail_tx(&mut self, err: RadioError) {
        self.error_count += 1;
        self.last_tx_error = Some(err);
        self.state = RadioState::Err;
    }

    /// Polls TX completion. `None` while still sending; `Some` once the
    /// transmit finished, successfully or not, after which the radio has
    /// already been restored to `Sniff`.
    pub fn poll_tx(&mut self) -> Option<Result<(), RadioError>> {
        match self.state {
            RadioState::TxFini => {
                self.state = RadioState::Sniff;
                Some(Ok(()))
            }
            RadioState::Err => {
                self.state = RadioState::Sniff;
                Some(Err(self.last_tx_error.take().unwrap_or(RadioError::Fatal)))
            }
            _ => None,
        }
    }

    /// Sync-detect interrupt: drains the PHR, asks the sink to decode
    /// the expected PSDU length, and either enters the streaming RX
    /// path or discards and returns to `Sniff`.
    pub fn on_sync_detect(&mut self) -> Result<(), RadioError> {
        if self.state != RadioState::Sniff {
            self.error_count += 1;
            self.transport.strobe(Strobe::Frx).map_err(to_fatal)?;
            return Ok(());
        }
        self.state = RadioState::RxSync;

        let phr_len = self.sink.phr_len();
        self.transport.read_fifo(&mut self.rx_buf[..phr_len]).map_err(to_fatal)?;

        let psdu_len = self.sink.parse_phr_len(&self.rx_buf[..phr_len]);
        match psdu_len {
            Some(psdu_len) if phr_len + psdu_len <= RX_BUF_MAX => {
                self.rx_ix = phr_len;
                self.rx_total_len = phr_len + psdu_len;
                self.rx_bytes_left = psdu_len;
                self.transport
                    .write_register(Register::PktLen, (self.rx_total_len % 256) as u8)
                    .map_err(to_fatal)?;

                if self.rx_bytes_left > FIFO_THR + 1 {
                    self.fixed_pkt_len_mode = false;
                    self.state = RadioState::RxPortionMiddle;
                } else {
                    self.fixed_pkt_len_mode = true;
                    self.state = RadioState::RxPortionLast;
                }
                Ok(())
            }
            _ => {
                self.transport.strobe(Strobe::Frx).map_err(to_fatal)?;
                self.state = RadioState::Sniff;
                Ok(())
            }
        }
    }

    /// FIFO-below-threshold interrupt on the RX side. Outside the
    /// streaming-RX states, counts an error and flushes the RX FIFO.
    pub fn on_fifo_threshold_rx(&mut self) -> Result<(), RadioError> {
        if self.state != RadioState::RxPortionMiddle {
            self.error_count += 1;
            self.transport.strobe(Strobe::Frx).map_err(to_fatal)?;
            return Ok(());
        }
        let n = AVAIL_BYTES_IN_FIFO.min(self.rx_bytes_left);
        self.transport
            .read_fifo(&mut self.rx_buf[self.rx_ix..self.rx_ix + n])
            .map_err(to_fatal)?;
        self.rx_ix += n;
        self.rx_bytes_left -= n;

        if self.rx_bytes_left <= FIFO_THR + 1 {
            self.fixed_pkt_len_mode = true;
            self.state = RadioState::RxPortionLast;
        }
        Ok(())
    }

    /// Packet-end interrupt on the RX side: drains the tail and posts
    /// `RxFini`, to be picked up by [`Driver::on_rx_complete`] from the
    /// main loop.
    pub fn on_packet_end_rx(&mut self) -> Result<(), RadioError> {
        if self.state != RadioState::RxPortionLast {
            self.error_count += 1;
            self.transport.strobe(Strobe::Frx).map_err(to_fatal)?;
            return Ok(());
        }
        let marc = self.transport.read_register(Register::MarcStatus0).map_err(to_fatal)?;
        if marc & MARC_RX_OK == 0 {
            self.transport.strobe(Strobe::Frx).ok();
            self.error_count += 1;
            self.state = RadioState::Sniff;
            return Ok(());
        }

        let n = self.rx_bytes_left;
        self.transport
            .read_fifo(&mut self.rx_buf[self.rx_ix..self.rx_ix + n])
            .map_err(to_fatal)?;
        self.rx_ix += n;
        self.rx_bytes_left = 0;
        self.state = RadioState::RxFini;
        Ok(())
    }

    /// Deferred main-loop callback for a completed receive. Re-enters
    /// `Sniff` *before* calling the sink so the transceiver is ready for
    /// the next frame as soon as possible.
    pub fn on_rx_complete(&mut self) {
        if self.state != RadioState::RxFini {
            return;
        }
        self.state = RadioState::Sniff;
        let total = self.rx_total_len;
        self.sink.recv(&self.rx_buf[..total]);
    }

    /// Runs the TX-on-CCA algorithm: clear-channel assessment combined
    /// with an immediate transmit strobe if the channel is clear.
    pub fn cca(&mut self) -> Result<(), RadioError> {
        if self.state != RadioState::Sniff {
            return Err(RadioError::Busy);
        }

        let saved_cfg = self.transport.read_register(Register::PktCfg2).map_err(to_fatal)?;
        self.transport
            .write_register(Register::PktCfg2, (saved_cfg & !0x3F) | CCA_MODE_RSSI_BELOW_THR)
            .map_err(to_fatal)?;

        let mut result = Err(RadioError::ChannelAccessFailure);
        for _ in 0..self.cca_retry.0 {
            self.state = RadioState::CcaBusy;

            let num_rx = self.transport.read_register(Register::NumRxBytes).map_err(to_fatal)?;
            if num_rx > 0 {
                self.transport.strobe(Strobe::Frx).map_err(to_fatal)?;
            }
            self.transport.strobe(Strobe::Rx).map_err(to_fatal)?;
            self.transport.strobe(Strobe::Tx).map_err(to_fatal)?;

            let clear = self.poll_cca()?;
            self.state = RadioState::CcaFini;
            if clear {
                result = Ok(());
                break;
            }
        }

        self.transport.write_register(Register::PktCfg2, saved_cfg).map_err(to_fatal)?;
        self.state = RadioState::Sniff;
        result
    }

    fn poll_cca(&mut self) -> Result<bool, RadioError> {
        for _ in 0..CCA_POLL_MAX {
            let status = self.transport.strobe(Strobe::Nop).map_err(to_fatal)?;
            if status & CHIP_STATUS_TX != 0 {
                return Ok(true);
            }
            let marc = self.transport.read_register(Register::MarcStatus0).map_err(to_fatal)?;
            if marc & MARC_TXONCCA_FAILED != 0 {
                return Ok(false);
            }
            self.transport.delay_us(10);
        }
        Ok(false)
    }

    /// Reads back the last-configured PA power level.
    ///
    /// `ioctl` only carries the setter (`TxPowerSet`): a getter has no
    /// natural fit in a uniform `Result<(), RadioError>` signature, so it's
    /// a plain method like [`Driver::is_rx_busy`].
    pub fn tx_power(&mut self) -> Result<i8, RadioError> {
        self.transport
            .read_register(Register::PaCfg)
            .map(|v| v as i8)
            .map_err(to_fatal)
    }

    /// True while a receive is in progress (any `Rx*` state).
    pub fn is_rx_busy(&self) -> bool {
        matches!(
            self.state,
            RadioState::RxSync
                | RadioState::RxPortionMiddle
                | RadioState::RxPortionLast
                | RadioState::RxFini
        )
    }

    pub fn ioctl(&mut self, cmd: IoctlCmd) -> Result<(), RadioError> {
        match cmd {
            IoctlCmd::TxPowerSet(power) => self
                .transport
                .write_register(Register::PaCfg, power as u8)
                .map_err(to_fatal),
            IoctlCmd::CcaGet => self.cca(),
            IoctlCmd::IsRxBusy => {
                if self.is_rx_busy() {
                    Err(RadioError::Busy)
                } else {
                    Ok(())
                }
            }
            IoctlCmd::Chan0Set(chan) => self
                .transport
                .write_register(Register::Freq0, chan)
                .map_err(to_fatal),
            IoctlCmd::WorEnable(enable) => {
                if self.state != RadioState::Sleep && self.state != RadioState::Sniff {
                    return Err(RadioError::Busy);
                }
                if enable {
                    self.transport.strobe(Strobe::Wor).map_err(to_fatal)?;
                } else {
                    self.transport.strobe(Strobe::Idle).map_err(to_fatal)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use std::vec::Vec;

    use super::*;
    use crate::mock::MockTransport;

    struct TestSink {
        phr_len: usize,
        next_psdu_len: Option<usize>,
        received: Vec<Vec<u8>>,
    }

    impl TestSink {
        fn new(phr_len: usize) -> Self {
            TestSink {
                phr_len,
                next_psdu_len: None,
                received: Vec::new(),
            }
        }
    }

    impl PhySink for TestSink {
        fn phr_len(&self) -> usize {
            self.phr_len
        }

        fn parse_phr_len(&self, _phr: &[u8]) -> Option<usize> {
            self.next_psdu_len
        }

        fn recv(&mut self, data: &[u8]) {
            self.received.push(data.to_vec());
        }
    }

    fn new_driver(sink: &mut TestSink) -> Driver<'_, MockTransport> {
        Driver::init(MockTransport::new(), sink, CcaRetry::CC112X, 0x48).expect("init should succeed")
    }

    #[test]
    fn init_drops_to_sleep() {
        let mut sink = TestSink::new(2);
        let d = new_driver(&mut sink);
        assert_eq!(d.state(), RadioState::Sleep);
    }

    #[test]
    fn init_fails_on_part_number_mismatch() {
        let mut sink = TestSink::new(2);
        let mut transport = MockTransport::new();
        transport.part_number = 0x99;
        let err = Driver::init(transport, &mut sink, CcaRetry::CC112X, 0x48).unwrap_err();
        assert_eq!(err, RadioError::InitFailed);
    }

    #[test]
    fn on_off_are_idempotent() {
        let mut sink = TestSink::new(2);
        let mut d = new_driver(&mut sink);
        assert!(d.on().is_ok());
        assert_eq!(d.state(), RadioState::Sniff);
        assert!(d.on().is_ok());
        assert_eq!(d.state(), RadioState::Sniff);
        assert!(d.off().is_ok());
        assert_eq!(d.state(), RadioState::Sleep);
        assert!(d.off().is_ok());
        assert_eq!(d.state(), RadioState::Sleep);
    }

    #[test]
    fn send_rejected_outside_sniff() {
        let mut sink = TestSink::new(2);
        let mut d = new_driver(&mut sink);
        // Still asleep.
        assert_eq!(d.send(&[1, 2, 3]), Err(RadioError::Busy));
    }

    #[test]
    fn send_empty_buffer_rejected() {
        let mut sink = TestSink::new(2);
        let mut d = new_driver(&mut sink);
        d.on().unwrap();
        assert_eq!(d.send(&[]), Err(RadioError::TxNoPacket));
    }

    #[test]
    fn short_frame_tx_completes_in_one_burst() {
        let mut sink = TestSink::new(2);
        let mut d = new_driver(&mut sink);
        d.on().unwrap();

        let frame = [0xAAu8; 50];
        d.send(&frame).unwrap();
        assert_eq!(d.state(), RadioState::TxBusy);
        assert_eq!(d.poll_tx(), None);

        d.transport.marc_status0 = MARC_TX_OK;
        d.on_packet_end_tx();
        assert_eq!(d.poll_tx(), Some(Ok(())));
        assert_eq!(d.state(), RadioState::Sniff);
        assert_eq!(d.transport.tx_fifo.len(), 50);
    }

    #[test]
    fn long_frame_tx_streams_expected_fifo_refill_count() {
        let mut sink = TestSink::new(2);
        let mut d = new_driver(&mut sink);
        d.on().unwrap();

        let total_len = 500usize;
        let frame = std::vec![0x5Au8; total_len];
        d.send(&frame).unwrap();

        let bytes_left_after_first = total_len - FIFO_SIZE;
        let expected_refills =
            (bytes_left_after_first + AVAIL_BYTES_IN_FIFO - 1) / AVAIL_BYTES_IN_FIFO;

        let mut refills = 0;
        loop {
            d.on_fifo_threshold_tx().unwrap();
            refills += 1;
            if d.tx_last_portion {
                break;
            }
            assert!(refills <= expected_refills, "too many FIFO refills");
        }
        assert_eq!(refills, expected_refills);

        d.transport.marc_status0 = MARC_TX_OK;
        d.on_packet_end_tx();
        assert_eq!(d.poll_tx(), Some(Ok(())));
        assert_eq!(d.transport.tx_fifo.len(), total_len);
    }

    #[test]
    fn cca_reports_channel_access_failure_and_restores_sniff() {
        let mut sink = TestSink::new(2);
        let mut d = new_driver(&mut sink);
        d.on().unwrap();
        d.transport.marc_status0 = MARC_TXONCCA_FAILED;
        d.transport.chip_status = 0; // never reports entering TX

        assert_eq!(d.cca(), Err(RadioError::ChannelAccessFailure));
        assert_eq!(d.state(), RadioState::Sniff);
    }

    #[test]
    fn isr_outside_its_expected_state_counts_an_error_and_flushes() {
        let mut sink = TestSink::new(2);
        let mut d = new_driver(&mut sink);
        // Still asleep: no ISR may mutate state, but each still counts
        // an error and flushes its FIFO.
        assert_eq!(d.state(), RadioState::Sleep);
        d.on_sync_detect().unwrap();
        assert_eq!(d.state(), RadioState::Sleep);
        d.on_fifo_threshold_rx().unwrap();
        assert_eq!(d.state(), RadioState::Sleep);
        d.on_packet_end_rx().unwrap();
        assert_eq!(d.state(), RadioState::Sleep);
        assert_eq!(d.error_count(), 3);
        assert_eq!(d.transport.strobes, std::vec![Strobe::Frx, Strobe::Frx, Strobe::Frx]);
    }

    #[test]
    fn rx_short_frame_reaches_sink() {
        let mut sink = TestSink::new(2);
        sink.next_psdu_len = Some(10);
        let mut d = new_driver(&mut sink);
        d.on().unwrap();

        let mut frame = std::vec![0u8; 12];
        frame[0] = 0x00;
        frame[1] = 0x0A;
        d.transport.rx_fifo.extend_from_slice(&frame);
        d.transport.marc_status0 = MARC_RX_OK;

        d.on_sync_detect().unwrap();
        assert_eq!(d.state(), RadioState::RxPortionLast);
        d.on_packet_end_rx().unwrap();
        assert_eq!(d.state(), RadioState::RxFini);
        d.on_rx_complete();
        assert_eq!(d.state(), RadioState::Sniff);
        assert_eq!(sink.received.len(), 1);
        assert_eq!(sink.received[0], frame);
    }

    #[test]
    fn tx_power_set_then_get_round_trips() {
        let mut sink = TestSink::new(2);
        let mut d = new_driver(&mut sink);
        d.ioctl(IoctlCmd::TxPowerSet(-10)).unwrap();
        assert_eq!(d.tx_power().unwrap(), -10);
    }

    #[test]
    fn ioctl_chan0_set_writes_freq0() {
        let mut sink = TestSink::new(2);
        let mut d = new_driver(&mut sink);
        d.ioctl(IoctlCmd::Chan0Set(0x5A)).unwrap();
        assert_eq!(d.transport.freq0, 0x5A);
    }

    #[test]
    fn ioctl_is_rx_busy_reports_busy_only_while_receiving() {
        let mut sink = TestSink::new(2);
        let mut d = new_driver(&mut sink);
        assert!(d.ioctl(IoctlCmd::IsRxBusy).is_ok());

        sink.next_psdu_len = Some(10);
        d.on().unwrap();
        d.transport.rx_fifo.extend_from_slice(&[0x00, 0x0A]);
        d.on_sync_detect().unwrap();
        assert_eq!(d.ioctl(IoctlCmd::IsRxBusy), Err(RadioError::Busy));
    }

    #[test]
    fn ioctl_wor_enable_rejected_while_busy() {
        let mut sink = TestSink::new(2);
        let mut d = new_driver(&mut sink);
        sink.next_psdu_len = Some(10);
        d.on().unwrap();
        d.transport.rx_fifo.extend_from_slice(&[0x00, 0x0A]);
        d.on_sync_detect().unwrap();
        assert_eq!(d.ioctl(IoctlCmd::WorEnable(true)), Err(RadioError::Busy));
    }
}
