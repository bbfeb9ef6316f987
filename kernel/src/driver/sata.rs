///////////////////////////////////////////////////////////////////////////////L
// The MIT License (MIT)
// Copyright (c) 2021 [untitled os] Team
// See LICENSE.txt and CREDITS.txt for details
///////////////////////////////////////////////////////////////////////////////L

//! SATA shim: presents the AHCI driver's one active port as a plain
//! sector-addressed drive to the block layer.

use core::ops::Range;
use crate::pci::PciDeviceInfo;
use super::ahci::{self, AhciPort};
use super::DriveResult;

#[derive(Debug)]
pub struct SataDrive {
    port: AhciPort,
}

impl SataDrive {
    /// Probe for a usable SATA disk: find the AHCI controller on PCI, bring
    /// up its first active port, designate it the active port for the rest
    /// of the session. `None` when there is no controller, no powered port,
    /// or bring-up fails.
    pub fn probe(pci_infos: &[PciDeviceInfo], arena_range: Option<Range<u64>>) -> Option<SataDrive> {
        crate::serial_println!("Scanning for SATA/AHCI devices...");

        let abar = match ahci::find_controller(pci_infos) {
            Some(addr) => addr,
            None => {
                crate::serial_println!("  No AHCI controller on PCI.");
                return None;
            }
        };

        let arena_range = match arena_range {
            Some(range) => range,
            None => {
                crate::serial_println!("  No memory region reserved for the AHCI arena.");
                return None;
            }
        };

        match unsafe { ahci::init(abar, arena_range) } {
            Ok(Some(port)) => {
                crate::serial_println!("  AHCI port {} is the active port.", port.index());
                Some(SataDrive { port })
            }
            Ok(None) => {
                crate::serial_println!("  AHCI controller has no active port.");
                None
            }
            Err(e) => {
                crate::serial_println!("  AHCI init failed: {}", e);
                None
            }
        }
    }

    pub fn read_sectors(&mut self, lba: u64, count: u16, buf: &mut [u8]) -> DriveResult<()> {
        self.port.read_sectors(lba, count, buf)
    }

    pub fn write_sectors(&mut self, lba: u64, count: u16, buf: &[u8]) -> DriveResult<()> {
        self.port.write_sectors(lba, count, buf)
    }
}
