///////////////////////////////////////////////////////////////////////////////L
// The MIT License (MIT)
// Copyright (c) 2021 [untitled os] Team
// See LICENSE.txt and CREDITS.txt for details
///////////////////////////////////////////////////////////////////////////////L

//! AHCI driver: locates the HBA through PCI, brings up the first active
//! port, and issues READ/WRITE DMA EXT through command slot 0.

use core::cmp::min;
use core::mem::size_of;
use core::ops::Range;
use x86_64::PhysAddr;

use crate::PHYS_MEM_OFFSET;
use crate::pci::{PciDeviceInfo, PciFullClass};
use crate::device::block::SECTOR_SIZE;
use crate::driver::{busy_poll, DriveError, DriveResult};

/// The command arena backing all DMA structures
pub mod arena;
/// Constants and enums for AHCI values
pub mod constants;
/// Types related to the various types of FIS (Frame Information Structure)
pub mod fis;
/// Types related to the AHCI HBA (Host Bus Adapter)
pub mod hba;

use arena::CommandArena;
use constants::*;
use fis::{FisRegH2D, FisType, FIS_FLAG_COMMAND, FIS_DEVICE_LBA};
use hba::{HbaMemory, HbaPort, CMD_HEADER_WRITE};

/// AHCI class match: mass storage / SATA / AHCI programming interface
const PCI_PROGIF_AHCI: u8 = 0x01;

/// Locate the AHCI controller among the scanned PCI devices and return its
/// HBA base (BAR5 with the low address-decode bits masked off). Absence is
/// a normal, silent outcome.
pub fn find_controller(pci_infos: &[PciDeviceInfo]) -> Option<PhysAddr> {
    pci_infos.iter()
        .find(|info| info.full_class == PciFullClass::MassStorage_SATA
                  && info.prog_if == PCI_PROGIF_AHCI)
        .map(|info| PhysAddr::new((info.bars[5] & 0xFFFF_FFF0) as u64))
        .filter(|addr| addr.as_u64() != 0)
}

/// The single active AHCI port plus the command arena it issues through.
#[derive(Debug)]
pub struct AhciPort {
    port: &'static mut HbaPort,
    arena: CommandArena,
    index: usize,
}

/// Bring up the HBA at `abar` and claim its first active port.
///
/// Returns `Ok(None)` when no implemented port has a powered, communicating
/// device - a normal outcome on machines without a SATA disk.
///
/// # Safety
///
/// `abar` must point at a real AHCI HBA register window, and `arena_range`
/// must be physical memory owned exclusively by the caller.
pub unsafe fn init(abar: PhysAddr, arena_range: Range<u64>) -> anyhow::Result<Option<AhciPort>> {
    let hba_mem = unsafe { &mut *((abar.as_u64() + PHYS_MEM_OFFSET) as *mut HbaMemory) };

    let pi = hba_mem.ports_impl.read();
    let mut active = None;
    for i in 0..hba_mem.ports.len() {
        if pi & (1 << i) == 0 {
            continue;
        }
        let port = unsafe { &mut *hba_mem.ports.as_mut_ptr().add(i) };
        if port.device_present() {
            crate::serial_println!("  SATA device found on port {}", i);
            active = Some((i, port));
            break;
        }
    }

    let (index, port) = match active {
        Some(found) => found,
        None => return Ok(None),
    };

    let mut arena = CommandArena::new(arena_range)
        .map_err(|e| anyhow::anyhow!("building AHCI command arena: {}", e))?;
    bring_up(port, &mut arena).map_err(|e| anyhow::anyhow!("port {} bring-up failed: {}", index, e))?;

    Ok(Some(AhciPort { port, arena, index }))
}

/// Program the port's command list, received-FIS area and command table,
/// with the command engine stopped, then restart the engine.
fn bring_up(port: &mut HbaPort, arena: &mut CommandArena) -> DriveResult<()> {
    port.stop_cmd();

    let cmd_list = arena.command_list_phys();
    port.cmd_list_base_addr[0].write(cmd_list as u32);
    port.cmd_list_base_addr[1].write((cmd_list >> 32) as u32);
    arena.zero_command_list();

    let fis_base = arena.received_fis_phys();
    port.fis_base_addr[0].write(fis_base as u32);
    port.fis_base_addr[1].write((fis_base >> 32) as u32);
    arena.zero_received_fis();

    let table = arena.command_table_phys();
    let header = arena.command_header();
    header.cmd_table_base.write(table as u32);
    header.cmd_table_base_upper.write((table >> 32) as u32);
    arena.zero_command_table();

    port.start_cmd()
}

impl AhciPort {
    pub fn index(&self) -> usize { self.index }

    /// Read `count` sectors (at most one bounce buffer's worth) into `buf`.
    pub fn read_dma(&mut self, lba: u64, count: u16, buf: &mut [u8]) -> DriveResult<()> {
        let bytes = count as usize * SECTOR_SIZE;
        assert!(count <= MAX_SECTORS_PER_REQUEST && buf.len() >= bytes);
        self.issue(lba, count, false)?;
        buf[..bytes].copy_from_slice(&self.arena.data_buffer()[..bytes]);
        Ok(())
    }

    /// Write `count` sectors (at most one bounce buffer's worth) from `buf`.
    pub fn write_dma(&mut self, lba: u64, count: u16, buf: &[u8]) -> DriveResult<()> {
        let bytes = count as usize * SECTOR_SIZE;
        assert!(count <= MAX_SECTORS_PER_REQUEST && buf.len() >= bytes);
        self.arena.data_buffer()[..bytes].copy_from_slice(&buf[..bytes]);
        self.issue(lba, count, true)
    }

    /// Issue one command through slot 0 and poll it to completion.
    ///
    /// Reads and writes share this protocol; they differ only in the
    /// direction bit of the command header and the ATA opcode.
    fn issue(&mut self, lba: u64, count: u16, write: bool) -> DriveResult<()> {
        let port = &mut *self.port;
        let arena = &mut self.arena;

        port.interrupt_status.write(u32::MAX);

        // Slot 0 is the only slot ever used; a busy slot means a caller
        // issued overlapping requests, which the single-threaded design
        // rules out.
        if !port.slot_free() {
            return Err(DriveError::Device);
        }

        let table_phys = arena.command_table_phys();
        let buffer_phys = arena.data_buffer_phys();

        let header = arena.command_header();
        let mut flags = (size_of::<FisRegH2D>() / size_of::<u32>()) as u16;
        if write {
            flags |= CMD_HEADER_WRITE;
        }
        header.flags.write(flags);
        header.prdt_length.write(1);
        header.prd_byte_count.write(0);
        header.cmd_table_base.write(table_phys as u32);
        header.cmd_table_base_upper.write((table_phys >> 32) as u32);

        arena.zero_command_table();
        let table = arena.command_table();

        let prdt = &mut table.prdt_entries[0];
        prdt.data_base.write(buffer_phys as u32);
        prdt.data_base_upper.write((buffer_phys >> 32) as u32);
        // byte count is 0-based
        prdt.byte_count.write(count as u32 * SECTOR_SIZE as u32 - 1);

        let cmdfis = unsafe { &mut *(table.command_fis.as_mut_ptr() as *mut FisRegH2D) };
        cmdfis.fis_type.write(FisType::RegisterHostToDevice as u8);
        cmdfis.flags.write(FIS_FLAG_COMMAND);
        cmdfis.command.write(if write {
            AtaCommand::WriteDmaExt.as_u8()
        } else {
            AtaCommand::ReadDmaExt.as_u8()
        });
        cmdfis.set_lba(lba);
        cmdfis.device.write(FIS_DEVICE_LBA);
        cmdfis.set_count(count);

        let ci = port.command_issue.read();
        port.command_issue.write(ci | 1);

        busy_poll(AHCI_TIMEOUT, || {
            if port.interrupt_status.read() & HBA_PORT_IS_TFES != 0 {
                return Some(Err(DriveError::Device));
            }
            if port.command_issue.read() & 1 == 0 {
                return Some(Ok(()));
            }
            None
        })
    }
}

/// Read/write in bounce-buffer-sized chunks. Shared by the SATA shim.
impl AhciPort {
    pub fn read_sectors(&mut self, lba: u64, count: u16, buf: &mut [u8]) -> DriveResult<()> {
        assert!(buf.len() >= count as usize * SECTOR_SIZE);
        let mut done: u16 = 0;
        while done < count {
            let chunk = min(count - done, MAX_SECTORS_PER_REQUEST);
            let offset = done as usize * SECTOR_SIZE;
            let len = chunk as usize * SECTOR_SIZE;
            self.read_dma(lba + done as u64, chunk, &mut buf[offset..offset + len])?;
            done += chunk;
        }
        Ok(())
    }

    pub fn write_sectors(&mut self, lba: u64, count: u16, buf: &[u8]) -> DriveResult<()> {
        assert!(buf.len() >= count as usize * SECTOR_SIZE);
        let mut done: u16 = 0;
        while done < count {
            let chunk = min(count - done, MAX_SECTORS_PER_REQUEST);
            let offset = done as usize * SECTOR_SIZE;
            let len = chunk as usize * SECTOR_SIZE;
            self.write_dma(lba + done as u64, chunk, &buf[offset..offset + len])?;
            done += chunk;
        }
        Ok(())
    }
}
