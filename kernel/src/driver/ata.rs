///////////////////////////////////////////////////////////////////////////////L
// The MIT License (MIT)
// Copyright (c) 2021 [untitled os] Team
// See LICENSE.txt and CREDITS.txt for details
///////////////////////////////////////////////////////////////////////////////L

//! Driver for legacy parallel-ATA (IDE) drives on the primary bus.
//!
//! Everything here is polled PIO against the primary-bus register block;
//! only the master drive is ever selected. LBA28 addressing.

use x86_64::instructions::port::Port;
use alloc::string::String;
use bitflags::bitflags;
use core::cmp::min;
use crate::device::block::SECTOR_SIZE;
use super::{busy_poll, DriveError, DriveResult};

/// Register block of the primary ATA bus.
pub const ATA_PRIMARY_IO: u16 = 0x1F0;

pub const ATA_REG_DATA:      u16 = 0x00;
pub const ATA_REG_ERROR:     u16 = 0x01;
pub const ATA_REG_SECCOUNT0: u16 = 0x02;
pub const ATA_REG_LBA0:      u16 = 0x03;
pub const ATA_REG_LBA1:      u16 = 0x04;
pub const ATA_REG_LBA2:      u16 = 0x05;
pub const ATA_REG_HDDEVSEL:  u16 = 0x06;
pub const ATA_REG_COMMAND:   u16 = 0x07;
pub const ATA_REG_STATUS:    u16 = 0x07;

pub const ATA_CMD_READ_SECTORS:  u8 = 0x20;
pub const ATA_CMD_WRITE_SECTORS: u8 = 0x30;
pub const ATA_CMD_IDENTIFY:      u8 = 0xEC;

/// Select master drive (device-select register pattern)
const SELECT_MASTER: u8 = 0xA0;
/// Select master drive with LBA addressing; low nibble carries LBA bits 27:24
const SELECT_MASTER_LBA: u8 = 0xE0;

/// Busy-wait bound for every ATA poll, in iterations (not wall-clock time).
pub const ATA_TIMEOUT: u32 = 10_000_000;

/// Largest sector count for a single LBA28 command (count register is one
/// byte; 0 would mean 256, which we never use).
const MAX_SECTORS_PER_COMMAND: u32 = 255;

bitflags! {
    /// Contents of the ATA status register.
    pub struct AtaStatus: u8 {
        const ERR  = 0x01;
        const IDX  = 0x02;
        const CORR = 0x04;
        const DRQ  = 0x08;
        const DSC  = 0x10;
        const DF   = 0x20;
        const DRDY = 0x40;
        const BSY  = 0x80;
    }
}

/// State for the (single) legacy ATA target: primary bus, master drive.
#[derive(Debug)]
pub struct AtaDrive {
    io_base: u16,
    present: bool,
    model: Option<String>,
}

impl AtaDrive {
    pub const fn new() -> Self {
        AtaDrive { io_base: ATA_PRIMARY_IO, present: false, model: None }
    }

    pub fn present(&self) -> bool { self.present }

    /// Model string reported by IDENTIFY, if the drive probed present.
    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    fn read_status(&self) -> AtaStatus {
        let mut port = Port::<u8>::new(self.io_base + ATA_REG_STATUS);
        AtaStatus::from_bits_truncate(unsafe { port.read() })
    }

    fn write_reg(&mut self, reg: u16, value: u8) {
        let mut port = Port::<u8>::new(self.io_base + reg);
        unsafe { port.write(value); }
    }

    /// Wait ~400ns by reading the status port 4 times
    fn io_wait(&self) {
        for _ in 0..4 {
            self.read_status();
        }
    }

    /// Poll the status port until the busy bit clears.
    fn wait_not_busy(&self) -> DriveResult<()> {
        busy_poll(ATA_TIMEOUT, || {
            if !self.read_status().contains(AtaStatus::BSY) {
                Some(Ok(()))
            } else {
                None
            }
        })
    }

    /// Poll until the drive is ready for a data transfer (DRQ set).
    /// The error bit terminates the wait immediately.
    fn wait_drq(&self) -> DriveResult<()> {
        busy_poll(ATA_TIMEOUT, || {
            let status = self.read_status();
            if status.contains(AtaStatus::ERR) {
                Some(Err(DriveError::Device))
            } else if status.contains(AtaStatus::DRQ) {
                Some(Ok(()))
            } else {
                None
            }
        })
    }

    /// Probe the primary master: floating-bus check, then IDENTIFY.
    /// Returns whether a usable ATA disk is present; ATAPI devices are
    /// rejected. Absence is a normal outcome, logged but not an error.
    pub fn probe(&mut self) -> bool {
        crate::serial_println!("Scanning for ATA devices...");
        self.present = false;
        self.model = None;

        self.write_reg(ATA_REG_HDDEVSEL, SELECT_MASTER);
        self.io_wait();

        // An open bus floats the data lines high
        if self.read_status().bits() == 0xFF {
            crate::serial_println!("  No device on primary master (floating bus).");
            return false;
        }

        // IDENTIFY wants the count and LBA registers zeroed
        self.write_reg(ATA_REG_SECCOUNT0, 0);
        self.write_reg(ATA_REG_LBA0, 0);
        self.write_reg(ATA_REG_LBA1, 0);
        self.write_reg(ATA_REG_LBA2, 0);
        self.write_reg(ATA_REG_COMMAND, ATA_CMD_IDENTIFY);
        self.io_wait();

        if self.read_status().is_empty() {
            crate::serial_println!("  No device responded to IDENTIFY.");
            return false;
        }

        if self.wait_not_busy().is_err() {
            crate::serial_println!("  Device hung after IDENTIFY.");
            return false;
        }

        if !self.read_status().contains(AtaStatus::DRQ) {
            crate::serial_println!("  Device did not set DRQ after IDENTIFY; not an ATA disk.");
            return false;
        }

        let mut identify = [0u16; 256];
        let mut data = Port::<u16>::new(self.io_base + ATA_REG_DATA);
        for word in identify.iter_mut() {
            *word = unsafe { data.read() };
        }

        // Word 0 bit 15: 0 = ATA, 1 = ATAPI. No packet devices here.
        if identify[0] & 0x8000 != 0 {
            crate::serial_println!("  Device is ATAPI (packet interface); rejected.");
            return false;
        }

        // Words 27-46 hold the model string as big-endian byte pairs
        let mut model = String::with_capacity(40);
        for word in &identify[27..47] {
            model.push((*word >> 8) as u8 as char);
            model.push((*word & 0xFF) as u8 as char);
        }
        let model = String::from(model.trim_end());

        crate::serial_println!("  ATA disk on primary master: {}", model);
        self.model = Some(model);
        self.present = true;
        true
    }

    /// Select the drive and post one LBA28 command.
    fn issue_command(&mut self, lba: u32, sectors: u8, command: u8) {
        self.write_reg(ATA_REG_HDDEVSEL, SELECT_MASTER_LBA | ((lba >> 24) & 0x0F) as u8);
        self.io_wait();
        self.write_reg(ATA_REG_SECCOUNT0, sectors);
        self.write_reg(ATA_REG_LBA0, lba as u8);
        self.write_reg(ATA_REG_LBA1, (lba >> 8) as u8);
        self.write_reg(ATA_REG_LBA2, (lba >> 16) as u8);
        self.write_reg(ATA_REG_COMMAND, command);
    }

    /// Read `count` sectors starting at `lba` into `buf`.
    ///
    /// Each sector gets its own not-busy/DRQ poll before its 256-word PIO
    /// transfer; the first failing sector aborts the whole request with its
    /// error. Requests over 255 sectors are split into successive commands.
    pub fn read_sectors(&mut self, lba: u64, count: u16, buf: &mut [u8]) -> DriveResult<()> {
        if !self.present {
            return Err(DriveError::Absent);
        }
        assert!(buf.len() >= count as usize * SECTOR_SIZE);

        let mut done: u32 = 0;
        while done < count as u32 {
            let chunk = min(count as u32 - done, MAX_SECTORS_PER_COMMAND) as u8;
            self.wait_not_busy()?;
            self.issue_command(lba as u32 + done, chunk, ATA_CMD_READ_SECTORS);

            for s in 0..chunk as usize {
                self.wait_not_busy()?;
                self.wait_drq()?;
                let offset = (done as usize + s) * SECTOR_SIZE;
                let mut data = Port::<u16>::new(self.io_base + ATA_REG_DATA);
                for i in 0..SECTOR_SIZE / 2 {
                    let word = unsafe { data.read() };
                    buf[offset + i * 2] = word as u8;
                    buf[offset + i * 2 + 1] = (word >> 8) as u8;
                }
            }
            done += chunk as u32;
        }
        Ok(())
    }

    /// Write `count` sectors starting at `lba` from `buf`.
    ///
    /// Ends with one more not-busy wait, which doubles as a flush.
    pub fn write_sectors(&mut self, lba: u64, count: u16, buf: &[u8]) -> DriveResult<()> {
        if !self.present {
            return Err(DriveError::Absent);
        }
        assert!(buf.len() >= count as usize * SECTOR_SIZE);

        let mut done: u32 = 0;
        while done < count as u32 {
            let chunk = min(count as u32 - done, MAX_SECTORS_PER_COMMAND) as u8;
            self.wait_not_busy()?;
            self.issue_command(lba as u32 + done, chunk, ATA_CMD_WRITE_SECTORS);

            for s in 0..chunk as usize {
                self.wait_not_busy()?;
                self.wait_drq()?;
                let offset = (done as usize + s) * SECTOR_SIZE;
                let mut data = Port::<u16>::new(self.io_base + ATA_REG_DATA);
                for i in 0..SECTOR_SIZE / 2 {
                    let word = (buf[offset + i * 2] as u16)
                        | ((buf[offset + i * 2 + 1] as u16) << 8);
                    unsafe { data.write(word); }
                }
            }
            done += chunk as u32;
        }

        self.wait_not_busy()
    }
}
