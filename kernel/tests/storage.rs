///////////////////////////////////////////////////////////////////////////////L
// The MIT License (MIT)
// Copyright (c) 2021 [untitled os] Team
// See LICENSE.txt and CREDITS.txt for details
///////////////////////////////////////////////////////////////////////////////L

//! Block-layer dispatch and device discovery against the QEMU test machine:
//! the boot image sits on the primary IDE master, and an AHCI controller
//! (no disk attached) hangs off the PCI bus.

#![no_std]
#![no_main]
#![feature(custom_test_frameworks)]
#![test_runner(kernel::test_runner)]
#![reexport_test_harness_main = "test_main"]

use core::panic::PanicInfo;
use bootloader::{entry_point, BootInfo};
use x86_64::VirtAddr;
use kernel::device::block::{ActiveDriver, BlockDevice, SectorIo, SECTOR_SIZE};
use kernel::driver::ata::AtaDrive;
use kernel::driver::{ahci, DriveError};

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    kernel::test_panic_handler(info)
}

entry_point!(main);
fn main(boot_info: &'static BootInfo) -> ! {
    kernel::build_memory_map(boot_info);
    kernel::memory_init(VirtAddr::new(boot_info.physical_memory_offset));
    test_main();
    kernel::exit_qemu(kernel::QemuExitCode::Success);
    loop {}
}

#[test_case]
fn no_driver_fails_without_hardware_io() {
    let mut dev = BlockDevice::new(ActiveDriver::None);
    assert!(!dev.available());

    let mut buf = [0u8; SECTOR_SIZE];
    assert_eq!(dev.read_sectors(0, 1, &mut buf), Err(DriveError::Absent));
    assert_eq!(dev.write_sectors(0, 1, &buf), Err(DriveError::Absent));
}

#[test_case]
fn zero_count_is_a_noop_even_without_a_driver() {
    let mut dev = BlockDevice::new(ActiveDriver::None);
    let mut buf = [0u8; 0];
    assert_eq!(dev.read_sectors(0, 0, &mut buf), Ok(()));
    assert_eq!(dev.write_sectors(0, 0, &buf), Ok(()));
}

#[test_case]
fn unprobed_ata_drive_refuses_io() {
    // presence flag false: the driver must fail before touching any port
    let mut drive = AtaDrive::new();
    assert!(!drive.present());

    let mut buf = [0u8; SECTOR_SIZE];
    assert_eq!(drive.read_sectors(0, 1, &mut buf), Err(DriveError::Absent));
    assert_eq!(drive.write_sectors(0, 1, &buf), Err(DriveError::Absent));
}

#[test_case]
fn pci_scan_sees_the_bus() {
    let infos = kernel::init_pci();
    assert!(!infos.is_empty());
}

#[test_case]
fn ahci_controller_found_by_class_match() {
    // the test VM carries `-device ahci`; class 0x01 / subclass 0x06 /
    // prog-if 0x01 with a BIOS-assigned BAR5 must match it
    let infos = kernel::init_pci();
    assert!(ahci::find_controller(&infos).is_some());
}

#[test_case]
fn ata_probe_finds_the_boot_disk() {
    let mut drive = AtaDrive::new();
    assert!(drive.probe());
    assert!(drive.present());
    assert!(drive.model().unwrap().starts_with("QEMU"));
}

#[test_case]
fn ata_reads_the_boot_sector() {
    let mut drive = AtaDrive::new();
    assert!(drive.probe());

    let mut buf = [0u8; SECTOR_SIZE];
    drive.read_sectors(0, 1, &mut buf).unwrap();
    // the boot image carries an MBR boot signature
    assert_eq!(buf[510], 0x55);
    assert_eq!(buf[511], 0xAA);
}

#[test_case]
fn probe_prefers_pata_over_sata() {
    let infos = kernel::init_pci();
    let ahci_mem = kernel::memory::AHCI_MEM_REGION.try_get().ok()
        .map(|region| region.range.start_addr()..region.range.end_addr());
    let mut dev = BlockDevice::probe(&infos, ahci_mem);
    assert!(dev.available());

    let mut buf = [0u8; SECTOR_SIZE];
    dev.read_sectors(0, 1, &mut buf).unwrap();
    assert_eq!(buf[510], 0x55);
    assert_eq!(buf[511], 0xAA);
}
