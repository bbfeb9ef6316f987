///////////////////////////////////////////////////////////////////////////////L
// The MIT License (MIT)
// Copyright (c) 2021 [untitled os] Team
// See LICENSE.txt and CREDITS.txt for details
///////////////////////////////////////////////////////////////////////////////L

#![no_std]
#![no_main]
#![test_runner(kernel::test_runner)]
#![reexport_test_harness_main = "test_main"]

#![feature(custom_test_frameworks)]

extern crate alloc;

use core::panic::PanicInfo;
use bootloader::BootInfo;
use x86_64::VirtAddr;
use kernel::{serial_println, MemoryInitResults};


#[cfg(not(test))]
#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    serial_println!("\n{}", info);
    kernel::util::halt_loop()
}

#[cfg(test)]
#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    kernel::test_panic_handler(info)
}

bootloader::entry_point!(kernel_main);
/// Main entry point for the kernel, called by the bootloader
fn kernel_main(boot_info: &'static BootInfo) -> ! {
    kernel::build_memory_map(boot_info);

    let phys_mem_offset = VirtAddr::new(boot_info.physical_memory_offset);
    let MemoryInitResults { mapper: _mapper, frame_allocator: _frame_allocator } = kernel::memory_init(phys_mem_offset);

    let pci_infos = kernel::init_pci();

    match kernel::storage_init(&pci_infos) {
        Ok(storage) => {
            serial_println!("--- HDD File Listing ---");
            let mut count = 0;
            for entry in storage.fs.files() {
                serial_println!("{:<30} | {} bytes", entry.name(), entry.size_bytes());
                count += 1;
            }
            if count == 0 {
                serial_println!("(No files found)");
            }
        }
        Err(e) => {
            serial_println!("Storage unavailable: {}", e);
        }
    }

    serial_println!("Boot complete!\n");

    #[cfg(test)]
    test_main();

    kernel::util::halt_loop()
}
