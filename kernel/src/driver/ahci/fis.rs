///////////////////////////////////////////////////////////////////////////////L
// The MIT License (MIT)
// Copyright (c) 2021 [untitled os] Team
// See LICENSE.txt and CREDITS.txt for details
///////////////////////////////////////////////////////////////////////////////L

//! FIS (Frame Information Structure) types.
//!
//! Only the host-to-device register FIS is ever built here; everything else
//! the HBA writes into the received-FIS area on its own.

use volatile::Volatile;

#[derive(Debug, Copy, Clone)]
#[repr(u8)]
pub enum FisType {
    RegisterHostToDevice = 0x27, // Register FIS - host to device
    RegisterDeviceToHost = 0x34, // Register FIS - device to host
    DMAActivate          = 0x39, // DMA activate FIS - device to host
    DMASetup             = 0x41, // DMA setup FIS - bidirectional
    Data                 = 0x46, // Data FIS - bidirectional
    BISTActivate         = 0x58, // BIST activate FIS - bidirectional
    PIOSetup             = 0x5F, // PIO setup FIS - device to host
    SetDeviceBits        = 0xA1, // Set device bits FIS - device to host
}

/// Host-to-device register FIS, as laid down in the command table.
///
/// Written in place through `Volatile` fields; the layout must match the
/// wire format byte for byte.
#[repr(C)]
#[derive(Debug)]
pub struct FisRegH2D {
    // DWORD 0
    /// 0x00, always `FisType::RegisterHostToDevice`
    pub fis_type: Volatile<u8>,
    /// 0x01, [3:0] port multiplier port, [6:4] reserved, [7] 1=command 0=control
    pub flags: Volatile<u8>,
    /// 0x02, command register
    pub command: Volatile<u8>,
    /// 0x03, feature register 7:0
    pub feature_low: Volatile<u8>,

    // DWORD 1
    /// 0x04, LBA bits 7:0
    pub lba0: Volatile<u8>,
    /// 0x05, LBA bits 15:8
    pub lba1: Volatile<u8>,
    /// 0x06, LBA bits 23:16
    pub lba2: Volatile<u8>,
    /// 0x07, device register
    pub device: Volatile<u8>,

    // DWORD 2
    /// 0x08, LBA bits 31:24
    pub lba3: Volatile<u8>,
    /// 0x09, LBA bits 39:32
    pub lba4: Volatile<u8>,
    /// 0x0A, LBA bits 47:40
    pub lba5: Volatile<u8>,
    /// 0x0B, feature register 15:8
    pub feature_high: Volatile<u8>,

    // DWORD 3
    /// 0x0C, count bits 7:0
    pub count_low: Volatile<u8>,
    /// 0x0D, count bits 15:8
    pub count_high: Volatile<u8>,
    /// 0x0E, isochronous command completion
    pub icc: Volatile<u8>,
    /// 0x0F, control register
    pub control: Volatile<u8>,

    // DWORD 4
    /// 0x10-0x13, reserved
    pub _reserved: [Volatile<u8>; 4],
}

/// Bit 7 of `flags`: this FIS carries a command, not control bits.
pub const FIS_FLAG_COMMAND: u8 = 1 << 7;

/// Device register pattern for LBA addressing.
pub const FIS_DEVICE_LBA: u8 = 1 << 6;

impl FisRegH2D {
    /// Split a 48-bit LBA across the six single-byte address fields.
    pub fn set_lba(&mut self, lba: u64) {
        self.lba0.write(lba as u8);
        self.lba1.write((lba >> 8) as u8);
        self.lba2.write((lba >> 16) as u8);
        self.lba3.write((lba >> 24) as u8);
        self.lba4.write((lba >> 32) as u8);
        self.lba5.write((lba >> 40) as u8);
    }

    pub fn set_count(&mut self, count: u16) {
        self.count_low.write(count as u8);
        self.count_high.write((count >> 8) as u8);
    }
}
