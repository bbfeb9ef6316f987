///////////////////////////////////////////////////////////////////////////////L
// The MIT License (MIT)
// Copyright (c) 2021 [untitled os] Team
// See LICENSE.txt and CREDITS.txt for details
///////////////////////////////////////////////////////////////////////////////L

//! The command arena: one 64 KiB physical region, carved out of the boot
//! memory map, holding every structure the HBA reads or writes over DMA.
//!
//! Layout (offsets fixed, validated once at construction):
//! - 0x0000  command list, 1 KiB, 32 headers (only header 0 is used)
//! - 0x0400  received-FIS area, 256 B
//! - 0x1000  command table, one PRDT entry
//! - 0x8000  data bounce buffer, 32 KiB - the single contiguous DMA
//!           region every request transfers through

use core::ops::Range;
use anyhow::ensure;
use super::constants::*;
use super::hba::{HbaCommandHeader, HbaCommandTable};
use crate::PHYS_MEM_OFFSET;

#[derive(Debug)]
pub struct CommandArena {
    phys_base: u64,
}

impl CommandArena {
    /// Take ownership of `range` and zero it. The range must be exclusively
    /// ours (the boot sequence marks it `InUse` in the memory map) and is
    /// checked here for size and command-list alignment.
    pub fn new(range: Range<u64>) -> anyhow::Result<CommandArena> {
        ensure!(range.end - range.start >= AHCI_MEMORY_SIZE,
                "AHCI arena region too small: {:#X} bytes", range.end - range.start);
        ensure!(range.start % AHCI_MEMORY_ALIGN == 0,
                "AHCI arena region not 1K-aligned: starts at {:#X}", range.start);

        let arena = CommandArena { phys_base: range.start };
        unsafe {
            core::ptr::write_bytes(arena.virt(0) as *mut u8, 0, AHCI_MEMORY_SIZE as usize);
        }
        Ok(arena)
    }

    fn virt(&self, offset: u64) -> u64 {
        self.phys_base + offset + PHYS_MEM_OFFSET
    }

    pub fn command_list_phys(&self) -> u64 { self.phys_base + COMMAND_LIST_OFFSET }
    pub fn received_fis_phys(&self) -> u64 { self.phys_base + RECEIVED_FIS_OFFSET }
    pub fn command_table_phys(&self) -> u64 { self.phys_base + COMMAND_TABLE_OFFSET }
    pub fn data_buffer_phys(&self) -> u64 { self.phys_base + DATA_BUFFER_OFFSET }

    /// Command header 0 - the only header this driver populates.
    pub fn command_header(&mut self) -> &mut HbaCommandHeader {
        unsafe { &mut *(self.virt(COMMAND_LIST_OFFSET) as *mut HbaCommandHeader) }
    }

    pub fn command_table(&mut self) -> &mut HbaCommandTable {
        unsafe { &mut *(self.virt(COMMAND_TABLE_OFFSET) as *mut HbaCommandTable) }
    }

    /// The bounce buffer requests stage data through.
    pub fn data_buffer(&mut self) -> &mut [u8] {
        unsafe {
            core::slice::from_raw_parts_mut(
                self.virt(DATA_BUFFER_OFFSET) as *mut u8,
                DATA_BUFFER_SIZE as usize)
        }
    }

    pub fn zero_command_list(&mut self) {
        unsafe { core::ptr::write_bytes(self.virt(COMMAND_LIST_OFFSET) as *mut u8, 0, COMMAND_LIST_SIZE as usize); }
    }

    pub fn zero_received_fis(&mut self) {
        unsafe { core::ptr::write_bytes(self.virt(RECEIVED_FIS_OFFSET) as *mut u8, 0, RECEIVED_FIS_SIZE as usize); }
    }

    pub fn zero_command_table(&mut self) {
        unsafe { core::ptr::write_bytes(self.virt(COMMAND_TABLE_OFFSET) as *mut u8, 0, COMMAND_TABLE_SIZE as usize); }
    }
}
