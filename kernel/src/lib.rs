///////////////////////////////////////////////////////////////////////////////L
// The MIT License (MIT)
// Copyright (c) 2021 [untitled os] Team
// See LICENSE.txt and CREDITS.txt for details
///////////////////////////////////////////////////////////////////////////////L

#![no_std]

#![warn(absolute_paths_not_starting_with_crate,
        elided_lifetimes_in_paths,
        explicit_outlives_requirements,
        macro_use_extern_crate,
        meta_variable_misuse,
        missing_debug_implementations,
        noop_method_call,
        rust_2021_incompatible_closure_captures,
        rust_2021_incompatible_or_patterns,
        rust_2021_prefixes_incompatible_syntax,
        rust_2021_prelude_collisions,
        single_use_lifetimes,
        trivial_numeric_casts,
        unused_extern_crates,
        unused_import_braces,
        unused_lifetimes,
        unused_qualifications,
        variant_size_differences)]
#![warn(unsafe_op_in_unsafe_fn)] // make unsafety as explicit as possible
#![forbid(non_ascii_idents)] // prevent unicode homoglyph attacks

#![feature(custom_test_frameworks)]
#![feature(alloc_error_handler)]

#![cfg_attr(test, no_main)]
#![test_runner(crate::test_runner)]
#![reexport_test_harness_main = "test_main"]

extern crate alloc;

/// Devices presenting a uniform interface over the drivers below (plus serial)
pub mod device;
/// Storage hardware drivers: PATA, AHCI, and the SATA shim
pub mod driver;
/// The flat File-Index-Table filesystem
pub mod fs;
/// Paging, frame allocation, heap, and the global memory map
pub mod memory;
/// PCI configuration-space scanning
pub mod pci;
pub mod util;

use core::panic::PanicInfo;
use alloc::vec::Vec;
use x86_64::VirtAddr;
use x86_64::instructions::port::Port;
use x86_64::structures::paging::OffsetPageTable;
use bootloader::BootInfo;
use bootloader::bootinfo::{MemoryRegion, MemoryRegionType, FrameRange};

use crate::memory::BootInfoFrameAllocator;
use crate::pci::{PciDeviceInfo, PciFullClass};
use crate::device::block::BlockDevice;
use crate::driver::ahci::constants::AHCI_MEMORY_SIZE;
use crate::fs::fit::{FitFilesystem, DATA_PARTITION_LBA};

/// Start address where physical memory is identity mapped in virtual memory
pub const PHYS_MEM_OFFSET: u64 = 0x100000000000;

// Testing stuff ///////////////////////////////////////////////////////////////

pub trait Testable {
    fn run(&self) -> ();
}

impl<T> Testable for T
    where
        T: Fn(),
{
    fn run(&self) {
        serial_print!("{}...\t", core::any::type_name::<T>());
        self();
        serial_println!("[ok]");
    }
}

pub fn test_runner(tests: &[&dyn Testable]) {
    serial_println!("Running {} tests", tests.len());
    for test in tests {
        test.run();
    }
    exit_qemu(QemuExitCode::Success);
}

pub fn test_panic_handler(info: &PanicInfo<'_>) -> ! {
    serial_println!("[failed]\n");
    serial_println!("Error: {}\n", info);
    exit_qemu(QemuExitCode::Failed);
    loop {}
}

/// Entry point for `cargo test`
#[cfg(test)]
#[no_mangle]
pub extern "C" fn _start() -> ! {
    test_main();
    loop {}
}

#[cfg(test)]
#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    test_panic_handler(info)
}

#[alloc_error_handler]
fn alloc_error_handler(layout: alloc::alloc::Layout) -> ! {
    panic!("allocation error: {:?}", layout)
}

// Startup step printer

#[derive(Debug)]
pub struct StartupStep {
    ok: bool
}

impl StartupStep {
    pub fn begin(msg: &str) -> Self {
        serial_print!("{}... ", msg);
        Self { ok: false }
    }

    pub fn ok(&mut self) { self.ok = true; }
    pub fn fail(&mut self) { self.ok = false; }

    pub fn result(&mut self, res: &Result<(), anyhow::Error>) {
        self.ok = res.is_ok();
        // do something with error msg?
    }
}

impl Drop for StartupStep {
    fn drop(&mut self) {
        if self.ok {
            serial_println!("ok");
        }
        else {
            serial_println!("failed");
        }
    }
}

// Initialization //////////////////////////////////////////////////////////////

/// Copy the bootloader's memory map into the global one, carving out the
/// AHCI command arena from the first usable region large enough to hold it.
pub fn build_memory_map(boot_info: &'static BootInfo) {
    let mut mmap_lock = memory::GLOBAL_MEMORY_MAP.lock();
    let mut found_ahci_mem = None;
    for region in boot_info.memory_map.iter() {
        if found_ahci_mem.is_none() && region.region_type == MemoryRegionType::Usable &&
            region.range.end_addr() - region.range.start_addr() >= AHCI_MEMORY_SIZE {

            let ahci_region = MemoryRegion {
                range: FrameRange::new(region.range.start_addr(), region.range.start_addr() + AHCI_MEMORY_SIZE),
                region_type: MemoryRegionType::InUse
            };
            let leftover_region = MemoryRegion {
                range: FrameRange::new(region.range.start_addr() + AHCI_MEMORY_SIZE, region.range.end_addr()),
                region_type: MemoryRegionType::Usable
            };

            mmap_lock.add_region(ahci_region);
            mmap_lock.add_region(leftover_region);

            found_ahci_mem = Some(ahci_region);
        }
        else {
            mmap_lock.add_region(region.clone());
        }
    }
    drop(mmap_lock);

    if let Some(region) = found_ahci_mem {
        memory::AHCI_MEM_REGION.try_init_once(|| region).ok();
    }
    else {
        serial_println!("WARNING: no free space for AHCI memory; SATA disabled.");
    }
}

#[allow(dead_code)]
#[derive(Debug)]
pub struct MemoryInitResults {
    pub mapper: OffsetPageTable<'static>,
    pub frame_allocator: BootInfoFrameAllocator,
}

pub fn memory_init(phys_mem_offset: VirtAddr) -> MemoryInitResults {
    let mut mapper = unsafe { memory::init(phys_mem_offset) };
    let mut frame_allocator = unsafe { BootInfoFrameAllocator::init() };
    memory::allocator::init_heap(&mut mapper, &mut frame_allocator)
        .expect("heap initialization failed");

    *memory::HAVE_ALLOC.lock() = true;

    MemoryInitResults { mapper, frame_allocator }
}

pub fn init_pci() -> Vec<PciDeviceInfo> {
    let pci_infos = {
        let mut step = StartupStep::begin("Scanning for PCI devices");
        let pci_infos = pci::brute_force_scan();
        if !pci_infos.is_empty() { step.ok(); }
        pci_infos
    };
    if pci_infos.is_empty() {
        serial_println!("  Failed to find any PCI devices.");
    }
    for i in pci_infos.iter() {
        match i.full_class {
            PciFullClass::MassStorage_IDE => {
                serial_println!("  Found IDE device: bus {} device {}", i.bus, i.device);
            },
            PciFullClass::MassStorage_ATA => {
                serial_println!("  Found ATA device: bus {} device {}", i.bus, i.device);
            },
            PciFullClass::MassStorage_SATA => {
                serial_println!("  Found SATA device: bus {} device {}", i.bus, i.device);
            },
            _ => {
                serial_println!("  Found PCI device: bus {} device {} class {:?}", i.bus, i.device, i.full_class);
            }
        }
    }
    pci_infos
}

/// Everything the storage subsystem owns, built once at boot and threaded
/// by reference into every operation. Consumers reach sector I/O through
/// `fs.device_mut()` and files through the filesystem itself.
#[derive(Debug)]
pub struct Storage {
    pub fs: FitFilesystem<BlockDevice>,
}

/// Probe block devices and mount the file index table.
///
/// Failure leaves no usable storage behind: a missing device or an
/// unreadable table permanently disables the subsystem for this session
/// (there is no re-probe).
pub fn storage_init(pci_infos: &[PciDeviceInfo]) -> anyhow::Result<Storage> {
    let ahci_mem = memory::AHCI_MEM_REGION.try_get().ok()
        .map(|region| region.range.start_addr()..region.range.end_addr());

    let device = BlockDevice::probe(pci_infos, ahci_mem);
    if !device.available() {
        anyhow::bail!("no usable block device");
    }

    let fs = FitFilesystem::mount(device, DATA_PARTITION_LBA)
        .map_err(|e| anyhow::anyhow!("file index table unusable: {}", e))?;
    serial_println!("HDD FS initialized. Partition starts at LBA {}.", DATA_PARTITION_LBA);

    Ok(Storage { fs })
}

// QEMU ////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum QemuExitCode {
    Success = 0x10,
    Failed = 0x11,
}

pub fn exit_qemu(exit_code: QemuExitCode) {
    unsafe {
        let mut port = Port::new(0xf4);
        port.write(exit_code as u32);
    }
}
