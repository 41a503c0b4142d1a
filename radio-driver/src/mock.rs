//! In-memory [`RadioTransport`] double used by this crate's own tests.
//!
//! Mirrors the shape of `embedded-hal-mock`'s expectation queues, but
//! hand-rolled against our own `RadioTransport` trait rather than
//! `embedded-hal`'s SPI/GPIO traits.

extern crate std;

use std::vec::Vec;

use crate::transport::{Register, RadioTransport, Strobe};

pub struct MockTransport {
    pub part_number: u8,
    pub marc_state: u8,
    pub marc_status0: u8,
    pub pkt_cfg2: u8,
    pub num_rx_bytes: u8,
    pub wor_cfg0: u8,
    pub pkt_len: u8,
    pub freq0: u8,
    pub pa_cfg: u8,
    /// Chip status byte returned alongside every strobe.
    pub chip_status: u8,
    pub rx_fifo: Vec<u8>,
    pub tx_fifo: Vec<u8>,
    pub strobes: Vec<Strobe>,
}

impl MockTransport {
    pub fn new() -> Self {
        MockTransport {
            part_number: 0x48,
            marc_state: 0x41,
            marc_status0: 0,
            pkt_cfg2: 0,
            num_rx_bytes: 0,
            wor_cfg0: 0,
            pkt_len: 0,
            freq0: 0,
            pa_cfg: 0,
            chip_status: 0,
            rx_fifo: Vec::new(),
            tx_fifo: Vec::new(),
            strobes: Vec::new(),
        }
    }
}

impl RadioTransport for MockTransport {
    type Error = ();

    fn strobe(&mut self, cmd: Strobe) -> Result<u8, Self::Error> {
        self.strobes.push(cmd);
        match cmd {
            Strobe::Ftx => self.tx_fifo.clear(),
            Strobe::Frx => {
                self.rx_fifo.clear();
                self.num_rx_bytes = 0;
            }
            _ => {}
        }
        Ok(self.chip_status)
    }

    fn read_register(&mut self, reg: Register) -> Result<u8, Self::Error> {
        Ok(match reg {
            Register::PartNumber => self.part_number,
            Register::MarcState => self.marc_state,
            Register::MarcStatus0 => self.marc_status0,
            Register::PktCfg2 => self.pkt_cfg2,
            Register::NumRxBytes => self.num_rx_bytes,
            Register::WorCfg0 => self.wor_cfg0,
            Register::PktLen => self.pkt_len,
            Register::Freq0 => self.freq0,
            Register::PaCfg => self.pa_cfg,
        })
    }

    fn write_register(&mut self, reg: Register, value: u8) -> Result<(), Self::Error> {
        match reg {
            Register::PartNumber => self.part_number = value,
            Register::MarcState => self.marc_state = value,
            Register::MarcStatus0 => self.marc_status0 = value,
            Register::PktCfg2 => self.pkt_cfg2 = value,
            Register::NumRxBytes => self.num_rx_bytes = value,
            Register::WorCfg0 => self.wor_cfg0 = value,
            Register::PktLen => self.pkt_len = value,
            Register::Freq0 => self.freq0 = value,
            Register::PaCfg => self.pa_cfg = value,
        }
        Ok(())
    }

    fn read_fifo(&mut self, buf: &mut [u8]) -> Result<(), Self::Error> {
        let n = buf.len();
        if self.rx_fifo.len() < n {
            return Err(());
        }
        let drained: Vec<u8> = self.rx_fifo.drain(0..n).collect();
        buf.copy_from_slice(&drained);
        Ok(())
    }

    fn write_fifo(&mut self, buf: &[u8]) -> Result<(), Self::Error> {
        self.tx_fifo.extend_from_slice(buf);
        Ok(())
    }

    fn delay_us(&mut self, _us: u32) {}
}
