///////////////////////////////////////////////////////////////////////////////L
// The MIT License (MIT)
// Copyright (c) 2021 [untitled os] Team
// See LICENSE.txt and CREDITS.txt for details
///////////////////////////////////////////////////////////////////////////////L

//! Brute-force scanner for the legacy PCI configuration space.
//!
//! Access goes through the standard CONFIG_ADDRESS/CONFIG_DATA port pair at
//! 0xCF8/0xCFC, 32-bit aligned reads only.

use x86_64::instructions::port::Port;
use alloc::vec::Vec;
use core::fmt::{Display, Formatter, Error};
use alloc::string::String;
use alloc::format;
use num_derive::FromPrimitive;

#[allow(dead_code)]
#[derive(Debug, Clone, Copy, FromPrimitive, PartialEq)]
pub enum PciClass {
    Unclassified = 0x00,
    MassStorage = 0x01,
    Network = 0x02,
    Display = 0x03,
    Multimedia = 0x04,
    Memory = 0x05,
    Bridge = 0x06,
    Other = 0xFF,
}
impl PciClass {
    pub fn from_u8(u: u8) -> PciClass {
        let opt = num_traits::FromPrimitive::from_u8(u);
        match opt {
            Some(e) => e,
            None => PciClass::Other
        }
    }
    pub fn as_u8(&self) -> u8 { *self as u8 }
}

#[allow(non_camel_case_types, dead_code)]
#[derive(Debug, Clone, Copy, FromPrimitive, PartialEq)]
pub enum PciFullClass {
    Unclassified_NonVgaCompatible = 0x0000,
    Unclassified_VgaCompatible = 0x0001,

    MassStorage_ScsiBus = 0x0100,
    MassStorage_IDE = 0x0101,
    MassStorage_Floppy = 0x0102,
    MassStorage_IpiBus = 0x0103,
    MassStorage_RAID = 0x0104,
    MassStorage_ATA = 0x0105,
    MassStorage_SATA = 0x0106,
    MassStorage_SerialSCSI = 0x0107,
    MassStorage_NVM = 0x0108,
    MassStorage_Other = 0x0180,

    Network_Ethernet = 0x0200,
    Network_Other = 0x0280,

    Display_VGA = 0x0300,
    Display_XGA = 0x0301,
    Display_3D = 0x0302,
    Display_Other = 0x0380,

    Bridge_Host = 0x0600,
    Bridge_ISA = 0x0601,
    Bridge_PciToPci = 0x0604,
    Bridge_Other = 0x0680,

    Unknown = 0xFFFF,
}
impl PciFullClass {
    pub fn from_u16(u: u16) -> PciFullClass {
        let opt = num_traits::FromPrimitive::from_u16(u);
        match opt {
            Some(e) => e,
            None => PciFullClass::Unknown
        }
    }
    pub fn as_u16(&self) -> u16 { *self as u16 }
}

#[allow(dead_code)]
#[derive(Clone, Debug)]
pub struct PciDeviceInfo {
    pub device: u8,
    pub bus: u8,
    pub device_id: u16,
    pub vendor_id: u16,
    pub full_class: PciFullClass,
    pub prog_if: u8,
    pub header_type: u8,
    pub bars: [u32; 6],
    pub supported_fns: [bool; 8],
}
impl PciDeviceInfo {
    pub fn class(&self) -> PciClass {
        PciClass::from_u8(((self.full_class.as_u16() >> 8) & 0xFF) as u8)
    }
    pub fn subclass(&self) -> u8 {
        (self.full_class.as_u16() & 0xFF) as u8
    }
}
impl Display for PciDeviceInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        let vendor_name = name_for_vendor_id(self.vendor_id);
        writeln!(f, "Device {:X} | Bus {:X} | Vendor: {}", self.device, self.bus, vendor_name)?;
        writeln!(f, "    Class: {:?} ({:#06X}) Prog-if: {:#04X}", self.full_class, self.full_class.as_u16(), self.prog_if)?;
        writeln!(f, "    Header type: {:X}", self.header_type)?;
        write!(f,   "    Supported functions: 0")?;
        for (i, b) in self.supported_fns.iter().enumerate().skip(1) {
            if *b {
                write!(f, ", {}", i)?;
            }
        }
        writeln!(f)?;
        write!(f, "    BARs: [ ")?;
        for i in self.bars.iter() {
            if *i == 0 {
                write!(f, "0x0 ")?;
            }
            else {
                write!(f, "{:#010X} ", i)?;
            }
        }
        writeln!(f, "]")?;
        Ok(())
    }
}

pub fn name_for_vendor_id(vendor_id: u16) -> String {
    match vendor_id {
        0x8086 => "Intel Corp. (0x8086)".into(),
        0x1234 => "QEMU (0x1234)".into(),
        _ => format!("Unknown({:#06X})", vendor_id)
    }
}

/// Scan bus 0-255 x device 0-31, function 0, and collect every populated slot.
/// An empty result is a normal outcome on machines with no (emulated) PCI bus.
pub fn brute_force_scan() -> Vec<PciDeviceInfo> {
    let mut infos = Vec::new();
    for bus in 0u8..=255 {
        for device in 0u8..32 {
            if let Some(info) = check_device(bus, device) {
                infos.push(info);
            }
        }
    }
    infos
}

fn check_device(bus: u8, device: u8) -> Option<PciDeviceInfo> {
    let function = 0u8;

    let (device_id, vendor_id) = get_ids(bus, device, function);
    if vendor_id == 0xFFFF {
        // Device doesn't exist
        return None;
    }

    let class = pci_config_read(bus, device, 0, 0x08);
    let pci_class = PciFullClass::from_u16(((class >> 16) & 0x0000FFFF) as u16);
    let prog_if = ((class >> 8) & 0xFF) as u8;
    let header_type = get_header_type(bus, device, function);

    let mut supported_fns = [true, false, false, false, false, false, false, false];
    if (header_type & 0x80) != 0 {
        // It is a multi-function device, so check remaining functions
        for function in 1u8..8 {
            if get_ids(bus, device, function).1 != 0xFFFF {
                supported_fns[function as usize] = true;
            }
        }
    }

    let mut bars = [0, 0, 0, 0, 0, 0];
    for (i, bar) in bars.iter_mut().enumerate() {
        *bar = pci_config_read(bus, device, 0, 0x10 + (i as u8) * 4);
    }

    Some(PciDeviceInfo {
        device, bus, device_id, vendor_id,
        full_class: pci_class,
        prog_if,
        header_type,
        bars,
        supported_fns
    })
}

fn pci_config_read(bus: u8, device: u8, func: u8, offset: u8) -> u32 {
    let bus = bus as u32;
    let device = device as u32;
    let func = func as u32;
    let offset = offset as u32;
    // construct address param
    let address = (bus << 16) | (device << 11) | (func << 8) | (offset & 0xFC) | 0x80000000;

    // write address
    let mut port = Port::new(0xCF8);
    unsafe { port.write(address); }

    // read data
    let mut port = Port::new(0xCFC);
    unsafe { port.read() }
}

fn get_header_type(bus: u8, device: u8, function: u8) -> u8 {
    let res = pci_config_read(bus, device, function, 0x0C);
    ((res >> 16) & 0xFF) as u8
}

fn get_ids(bus: u8, device: u8, function: u8) -> (u16, u16) {
    let res = pci_config_read(bus, device, function, 0);
    let dev_id = ((res >> 16) & 0xFFFF) as u16;
    let vnd_id = (res & 0xFFFF) as u16;
    (dev_id, vnd_id)
}
