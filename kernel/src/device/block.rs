///////////////////////////////////////////////////////////////////////////////L
// The MIT License (MIT)
// Copyright (c) 2021 [untitled os] Team
// See LICENSE.txt and CREDITS.txt for details
///////////////////////////////////////////////////////////////////////////////L

//! The block device layer: picks exactly one of {PATA, SATA} at boot and
//! dispatches all logical sector I/O to it. Selection happens once; there
//! is no per-I/O fallback between drivers.

use core::ops::Range;
use crate::pci::PciDeviceInfo;
use crate::driver::ata::AtaDrive;
use crate::driver::sata::SataDrive;
use crate::driver::{DriveError, DriveResult};

pub const SECTOR_SIZE: usize = 512;

/// Uniform logical sector interface. Implemented by [`BlockDevice`] over
/// real hardware, and by RAM-backed devices in tests.
pub trait SectorIo {
    /// Read `count` sectors starting at `lba` into `buf`.
    fn read_sectors(&mut self, lba: u64, count: u16, buf: &mut [u8]) -> DriveResult<()>;
    /// Write `count` sectors starting at `lba` from `buf`.
    fn write_sectors(&mut self, lba: u64, count: u16, buf: &[u8]) -> DriveResult<()>;
}

/// The one driver chosen at boot. At most one variant is ever active.
#[derive(Debug)]
pub enum ActiveDriver {
    None,
    Pata(AtaDrive),
    Sata(SataDrive),
}

#[derive(Debug)]
pub struct BlockDevice {
    driver: ActiveDriver,
}

impl BlockDevice {
    pub fn new(driver: ActiveDriver) -> Self {
        BlockDevice { driver }
    }

    /// Probe for a usable drive: legacy ATA first, then AHCI/SATA if the
    /// ATA bus turned up nothing. The winner stays selected for the whole
    /// session.
    pub fn probe(pci_infos: &[PciDeviceInfo], ahci_arena: Option<Range<u64>>) -> Self {
        crate::serial_println!("Probing for block devices...");

        let mut ata = AtaDrive::new();
        if ata.probe() {
            crate::serial_println!("Block layer: using PATA driver.");
            return BlockDevice::new(ActiveDriver::Pata(ata));
        }

        if let Some(sata) = SataDrive::probe(pci_infos, ahci_arena) {
            crate::serial_println!("Block layer: using SATA/AHCI driver.");
            return BlockDevice::new(ActiveDriver::Sata(sata));
        }

        crate::serial_println!("Block layer: no usable PATA or SATA device found.");
        BlockDevice::new(ActiveDriver::None)
    }

    pub fn available(&self) -> bool {
        !matches!(self.driver, ActiveDriver::None)
    }
}

impl SectorIo for BlockDevice {
    fn read_sectors(&mut self, lba: u64, count: u16, buf: &mut [u8]) -> DriveResult<()> {
        if count == 0 {
            return Ok(());
        }
        match &mut self.driver {
            ActiveDriver::Pata(drive) => drive.read_sectors(lba, count, buf),
            ActiveDriver::Sata(drive) => drive.read_sectors(lba, count, buf),
            ActiveDriver::None => Err(DriveError::Absent),
        }
    }

    fn write_sectors(&mut self, lba: u64, count: u16, buf: &[u8]) -> DriveResult<()> {
        if count == 0 {
            return Ok(());
        }
        match &mut self.driver {
            ActiveDriver::Pata(drive) => drive.write_sectors(lba, count, buf),
            ActiveDriver::Sata(drive) => drive.write_sectors(lba, count, buf),
            ActiveDriver::None => Err(DriveError::Absent),
        }
    }
}
