///////////////////////////////////////////////////////////////////////////////L
// The MIT License (MIT)
// Copyright (c) 2021 [untitled os] Team
// See LICENSE.txt and CREDITS.txt for details
///////////////////////////////////////////////////////////////////////////////L

//! Constants and enums for AHCI values, including the fixed layout of the
//! command arena (see `arena.rs`).

/// Total size of the AHCI command arena in bytes.
pub const AHCI_MEMORY_SIZE: u64 = 0x10000; // 64 KiB
/// The command list must be 1 KiB aligned; the arena inherits that bound.
pub const AHCI_MEMORY_ALIGN: u64 = 1024;

/// 32 command headers of 32 bytes each. Only header 0 is ever populated.
pub const COMMAND_LIST_OFFSET: u64 = 0x0000;
pub const COMMAND_LIST_SIZE: u64 = 1024;
pub const COMMAND_HEADER_SIZE: u64 = 32;

/// Received-FIS area, 256-byte aligned.
pub const RECEIVED_FIS_OFFSET: u64 = 0x0400;
pub const RECEIVED_FIS_SIZE: u64 = 256;

/// One command table: 64 B command FIS + 16 B ATAPI area + 48 B reserved
/// + a single PRDT entry.
pub const COMMAND_TABLE_OFFSET: u64 = 0x1000;
pub const COMMAND_TABLE_SIZE: u64 = 256;

/// Bounce buffer used as the one contiguous DMA region per request.
pub const DATA_BUFFER_OFFSET: u64 = 0x8000;
pub const DATA_BUFFER_SIZE: u64 = 0x8000;

/// Hard cap on sectors per issued command, from the bounce buffer size.
pub const MAX_SECTORS_PER_REQUEST: u16 = (DATA_BUFFER_SIZE / 512) as u16;

/// Busy-wait bound for AHCI polls, in iterations. The engine-stop spin is
/// the one wait not subject to this bound.
pub const AHCI_TIMEOUT: u32 = 10_000_000;

#[derive(Debug, Copy, Clone, PartialEq)]
#[repr(u8)]
/// ATA command codes issued through the H2D register FIS
pub enum AtaCommand {
    ReadDmaExt = 0x25,
    WriteDmaExt = 0x35,
}
impl AtaCommand { pub fn as_u8(self) -> u8 { self as u8 } }

/// Task-file-data busy / data-request bits
pub const ATA_DEV_BUSY: u32 = 0x80;
pub const ATA_DEV_DRQ: u32 = 0x08;

/// Task File Error Status bit of the port interrupt-status register
pub const HBA_PORT_IS_TFES: u32 = 1 << 30;

#[derive(Debug, Copy, Clone, PartialEq)]
#[repr(u32)]
/// Bitmasks for the per-port PxCMD register (Command and Status)
pub enum HbaPortCmdBit {
    Start             = 0x0001,
    FisReceiveEnable  = 0x0010,
    FisReceiveRunning = 0x4000,
    CmdListRunning    = 0x8000,
}
impl HbaPortCmdBit { pub fn as_u32(self) -> u32 { self as u32 } }

/// SSTS device-detection field value: device present, phy established
pub const HBA_PORT_DET_PRESENT: u32 = 3;
/// SSTS interface-power-management field value: interface active
pub const HBA_PORT_IPM_ACTIVE: u32 = 1;
