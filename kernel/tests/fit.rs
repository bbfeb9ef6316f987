///////////////////////////////////////////////////////////////////////////////L
// The MIT License (MIT)
// Copyright (c) 2021 [untitled os] Team
// See LICENSE.txt and CREDITS.txt for details
///////////////////////////////////////////////////////////////////////////////L

//! File-index-table filesystem behavior, run against RAM-backed sector
//! devices so no real drive is needed.

#![no_std]
#![no_main]
#![feature(custom_test_frameworks)]
#![test_runner(kernel::test_runner)]
#![reexport_test_harness_main = "test_main"]

extern crate alloc;

use core::panic::PanicInfo;
use alloc::vec;
use alloc::vec::Vec;
use alloc::format;
use bootloader::{entry_point, BootInfo};
use x86_64::VirtAddr;
use kernel::device::block::{SectorIo, SECTOR_SIZE};
use kernel::driver::{DriveError, DriveResult};
use kernel::fs::FsError;
use kernel::fs::fit::{FitFilesystem, MAX_FILES, MAX_FILE_SIZE};

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

/// Sector store backed by heap memory.
struct RamDisk {
    data: Vec<u8>,
}

impl RamDisk {
    fn new(num_sectors: usize) -> Self {
        RamDisk { data: vec![0u8; num_sectors * SECTOR_SIZE] }
    }
}

impl SectorIo for RamDisk {
    fn read_sectors(&mut self, lba: u64, count: u16, buf: &mut [u8]) -> DriveResult<()> {
        let start = lba as usize * SECTOR_SIZE;
        let len = count as usize * SECTOR_SIZE;
        if start + len > self.data.len() {
            return Err(DriveError::Device);
        }
        buf[..len].copy_from_slice(&self.data[start..start + len]);
        Ok(())
    }

    fn write_sectors(&mut self, lba: u64, count: u16, buf: &[u8]) -> DriveResult<()> {
        let start = lba as usize * SECTOR_SIZE;
        let len = count as usize * SECTOR_SIZE;
        if start + len > self.data.len() {
            return Err(DriveError::Device);
        }
        self.data[start..start + len].copy_from_slice(&buf[..len]);
        Ok(())
    }
}

/// A device whose table sector is unreadable/unwritable.
struct BrokenDisk;

impl SectorIo for BrokenDisk {
    fn read_sectors(&mut self, _lba: u64, _count: u16, _buf: &mut [u8]) -> DriveResult<()> {
        Err(DriveError::Device)
    }
    fn write_sectors(&mut self, _lba: u64, _count: u16, _buf: &[u8]) -> DriveResult<()> {
        Err(DriveError::Device)
    }
}

/// RamDisk wrapper that rejects writes to the table sector.
struct TablelessDisk {
    inner: RamDisk,
}

impl SectorIo for TablelessDisk {
    fn read_sectors(&mut self, lba: u64, count: u16, buf: &mut [u8]) -> DriveResult<()> {
        self.inner.read_sectors(lba, count, buf)
    }
    fn write_sectors(&mut self, lba: u64, count: u16, buf: &[u8]) -> DriveResult<()> {
        if lba == 0 {
            return Err(DriveError::Device);
        }
        self.inner.write_sectors(lba, count, buf)
    }
}

fn fresh_fs() -> FitFilesystem<RamDisk> {
    FitFilesystem::mount(RamDisk::new(64), 0).unwrap()
}

#[test_case]
fn mount_empty_disk() {
    let fs = fresh_fs();
    assert_eq!(fs.files().count(), 0);
    assert_eq!(fs.next_free_lba(), 1);
}

#[test_case]
fn write_then_read_roundtrip() {
    let mut fs = fresh_fs();
    fs.write_file("a.txt", b"hello").unwrap();

    let mut buf = [0u8; SECTOR_SIZE + 1];
    let len = fs.read_file("a.txt", &mut buf).unwrap();
    assert_eq!(len, 5);
    assert_eq!(&buf[..5], b"hello");
    // trailing NUL just past the declared size
    assert_eq!(buf[5], 0);
}

#[test_case]
fn table_sector_is_bit_exact() {
    let mut fs = fresh_fs();
    fs.write_file("a.txt", b"hello").unwrap();

    let mut sector = [0u8; SECTOR_SIZE];
    fs.device_mut().read_sectors(0, 1, &mut sector).unwrap();

    // entry 0: NUL-padded filename, then LE start LBA, then LE size
    assert_eq!(&sector[..5], b"a.txt");
    assert!(sector[5..32].iter().all(|b| *b == 0));
    assert_eq!(u32::from_le_bytes([sector[32], sector[33], sector[34], sector[35]]), 1);
    assert_eq!(u32::from_le_bytes([sector[36], sector[37], sector[38], sector[39]]), 5);
    // the rest of the table and its padding are zero
    assert!(sector[40..].iter().all(|b| *b == 0));
}

#[test_case]
fn duplicate_write_rejected_and_original_kept() {
    let mut fs = fresh_fs();
    fs.write_file("x", b"first").unwrap();
    assert_eq!(fs.write_file("x", b"second"), Err(FsError::NameConflict));

    let mut buf = [0u8; SECTOR_SIZE + 1];
    let len = fs.read_file("x", &mut buf).unwrap();
    assert_eq!(&buf[..len], b"first");
    assert_eq!(fs.files().count(), 1);
}

#[test_case]
fn table_overflow_fails_cleanly() {
    let mut fs = fresh_fs();
    for i in 0..MAX_FILES {
        fs.write_file(&format!("file{}", i), b"x").unwrap();
    }
    assert_eq!(fs.write_file("one-too-many", b"x"), Err(FsError::TableFull));
    assert_eq!(fs.files().count(), MAX_FILES);
}

#[test_case]
fn format_empties_table_and_resets_cursor() {
    let mut fs = fresh_fs();
    fs.write_file("a", b"aaaa").unwrap();
    fs.write_file("b", b"bbbb").unwrap();
    assert!(fs.next_free_lba() > 1);

    fs.format().unwrap();
    assert_eq!(fs.files().count(), 0);
    assert_eq!(fs.next_free_lba(), 1);

    // old data sectors are unreferenced, not reclaimed; new writes restart
    // at the base
    fs.write_file("c", b"cccc").unwrap();
    assert_eq!(fs.files().next().unwrap().start_lba(), 1);
}

#[test_case]
fn cursor_recomputed_on_remount() {
    let mut fs = fresh_fs();
    // 600 bytes -> 2 sectors at LBA 1, then 1 sector at LBA 3
    fs.write_file("two-sectors", &[7u8; 600]).unwrap();
    fs.write_file("one-sector", b"tail").unwrap();
    assert_eq!(fs.next_free_lba(), 4);

    let disk = fs.into_inner();
    let fs = FitFilesystem::mount(disk, 0).unwrap();
    assert_eq!(fs.files().count(), 2);
    assert_eq!(fs.next_free_lba(), 4);
}

#[test_case]
fn directory_markers_are_zero_byte_files() {
    let mut fs = fresh_fs();
    fs.write_file("docs/", b"").unwrap();

    let entry = fs.files().next().unwrap();
    assert_eq!(entry.name(), "docs/");
    assert_eq!(entry.size_bytes(), 0);
    // a zero-sector extent never moves the cursor
    assert_eq!(fs.next_free_lba(), 1);

    let mut buf = [0xFFu8; 8];
    assert_eq!(fs.read_file("docs/", &mut buf), Ok(0));
    assert_eq!(buf[0], 0);
}

#[test_case]
fn bad_names_rejected() {
    let mut fs = fresh_fs();
    assert_eq!(fs.write_file("", b"data"), Err(FsError::InvalidName));
    let long = [b'n'; 32];
    let long = core::str::from_utf8(&long).unwrap();
    assert_eq!(fs.write_file(long, b"data"), Err(FsError::InvalidName));
    assert_eq!(fs.files().count(), 0);
}

#[test_case]
fn oversized_file_rejected() {
    let mut fs = fresh_fs();
    let data = vec![0u8; MAX_FILE_SIZE as usize + 1];
    assert_eq!(fs.write_file("big", &data), Err(FsError::FileTooLarge));
    assert_eq!(fs.files().count(), 0);
}

#[test_case]
fn missing_file_not_found() {
    let mut fs = fresh_fs();
    let mut buf = [0u8; SECTOR_SIZE + 1];
    assert_eq!(fs.read_file("nope", &mut buf), Err(FsError::FileNotFound));
}

#[test_case]
fn short_buffer_rejected() {
    let mut fs = fresh_fs();
    fs.write_file("a.txt", b"hello").unwrap();
    // the whole sector extent plus the terminator must fit
    let mut buf = [0u8; 5];
    assert_eq!(fs.read_file("a.txt", &mut buf), Err(FsError::BufferTooSmall));
}

#[test_case]
fn unreadable_table_fails_mount() {
    match FitFilesystem::mount(BrokenDisk, 0) {
        Err(FsError::TableInconsistent) => {}
        other => panic!("expected TableInconsistent, got {:?}", other.map(|_| ())),
    }
}

#[test_case]
fn failed_table_write_leaves_no_entry() {
    let inner = RamDisk::new(64);
    let mut fs = FitFilesystem::mount(TablelessDisk { inner }, 0).unwrap();
    // data sectors go out first; the table write fails and the entry must
    // not survive in memory either
    assert_eq!(fs.write_file("ghost", b"data"), Err(FsError::Drive(DriveError::Device)));
    assert_eq!(fs.files().count(), 0);

    let mut buf = [0u8; SECTOR_SIZE + 1];
    assert_eq!(fs.read_file("ghost", &mut buf), Err(FsError::FileNotFound));
}
