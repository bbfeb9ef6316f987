///////////////////////////////////////////////////////////////////////////////L
// The MIT License (MIT)
// Copyright (c) 2021 [untitled os] Team
// See LICENSE.txt and CREDITS.txt for details
///////////////////////////////////////////////////////////////////////////////L

//! The flat filesystem: a directory-less catalog of filename -> (start LBA,
//! size) pairs held in one reserved sector, the File Index Table, plus a
//! sequential bump allocator for file data.
//!
//! On-disk layout of the table sector (little-endian, packed):
//! - 12 entries of 40 bytes each: 32-byte NUL-padded filename,
//!   u32 start LBA (partition-relative), u32 size in bytes
//! - 32 bytes of zero padding, for exactly one 512-byte sector
//!
//! A slot is free iff the first byte of its filename is zero. Files are
//! never deleted and their data sectors are never reclaimed; the allocation
//! cursor only ever moves forward.

use byteorder::{ByteOrder, LittleEndian};
use alloc::vec;
use crate::device::block::{SectorIo, SECTOR_SIZE};
use crate::util::sectors_for;
use super::{FsError, FsResult};

pub const MAX_FILES: usize = 12;
pub const MAX_FILENAME_LEN: usize = 32;
pub const MAX_FILE_SIZE: u32 = 2 * 1024 * 1024;
pub const ENTRY_SIZE: usize = 40;

/// Where the data partition lives on the disks this kernel deploys to.
/// The FIT sector sits at the partition base; file extents are stored
/// relative to it.
pub const DATA_PARTITION_LBA: u64 = 30720;

/// First data LBA, relative to the partition base (LBA 0 holds the table).
const FIRST_DATA_LBA: u32 = 1;

#[derive(Debug, Clone, Copy)]
pub struct FileEntry {
    filename: [u8; MAX_FILENAME_LEN],
    start_lba: u32,
    size_bytes: u32,
}

impl FileEntry {
    fn empty() -> FileEntry {
        FileEntry { filename: [0; MAX_FILENAME_LEN], start_lba: 0, size_bytes: 0 }
    }

    /// A slot is free iff its filename's first byte is zero.
    pub fn is_free(&self) -> bool {
        self.filename[0] == 0
    }

    pub fn name(&self) -> &str {
        let len = self.filename.iter().position(|b| *b == 0).unwrap_or(MAX_FILENAME_LEN);
        core::str::from_utf8(&self.filename[..len]).unwrap_or("")
    }

    /// Start of the file's data, relative to the partition base.
    pub fn start_lba(&self) -> u32 { self.start_lba }

    pub fn size_bytes(&self) -> u32 { self.size_bytes }

    fn decode(buf: &[u8]) -> FileEntry {
        let mut filename = [0u8; MAX_FILENAME_LEN];
        filename.copy_from_slice(&buf[..MAX_FILENAME_LEN]);
        FileEntry {
            filename,
            start_lba: LittleEndian::read_u32(&buf[32..36]),
            size_bytes: LittleEndian::read_u32(&buf[36..40]),
        }
    }

    fn encode(&self, buf: &mut [u8]) {
        buf[..MAX_FILENAME_LEN].copy_from_slice(&self.filename);
        LittleEndian::write_u32(&mut buf[32..36], self.start_lba);
        LittleEndian::write_u32(&mut buf[36..40], self.size_bytes);
    }
}

/// The in-memory image of the one-sector File Index Table.
#[derive(Debug)]
pub struct FileIndexTable {
    entries: [FileEntry; MAX_FILES],
}

impl FileIndexTable {
    pub fn empty() -> FileIndexTable {
        FileIndexTable { entries: [FileEntry::empty(); MAX_FILES] }
    }

    pub fn decode(sector: &[u8; SECTOR_SIZE]) -> FileIndexTable {
        let mut table = FileIndexTable::empty();
        for (i, entry) in table.entries.iter_mut().enumerate() {
            *entry = FileEntry::decode(&sector[i * ENTRY_SIZE..(i + 1) * ENTRY_SIZE]);
        }
        table
    }

    /// Encode to exactly one sector, zero-padded past the last entry.
    pub fn encode(&self) -> [u8; SECTOR_SIZE] {
        let mut sector = [0u8; SECTOR_SIZE];
        for (i, entry) in self.entries.iter().enumerate() {
            entry.encode(&mut sector[i * ENTRY_SIZE..(i + 1) * ENTRY_SIZE]);
        }
        sector
    }
}

#[derive(Debug)]
pub struct FitFilesystem<D: SectorIo> {
    dev: D,
    base_lba: u64,
    table: FileIndexTable,
    next_free_lba: u32,
}

impl<D: SectorIo> FitFilesystem<D> {
    /// Load the index table through the block layer and compute the
    /// allocation cursor. A table sector that cannot be read consumes the
    /// device and fails the mount; the filesystem will not operate on an
    /// unknown table, and a failed mount disables storage for the session.
    pub fn mount(mut dev: D, base_lba: u64) -> FsResult<FitFilesystem<D>> {
        let mut sector = [0u8; SECTOR_SIZE];
        if dev.read_sectors(base_lba, 1, &mut sector).is_err() {
            return Err(FsError::TableInconsistent);
        }
        let table = FileIndexTable::decode(&sector);

        let mut fs = FitFilesystem { dev, base_lba, table, next_free_lba: FIRST_DATA_LBA };
        fs.recompute_cursor();
        Ok(fs)
    }

    /// The cursor is the maximum of (start + sectors used) over all occupied
    /// entries, so new extents never overlap old ones.
    fn recompute_cursor(&mut self) {
        let mut next = FIRST_DATA_LBA;
        for entry in self.table.entries.iter().filter(|e| !e.is_free()) {
            let end = entry.start_lba + sectors_for(entry.size_bytes, SECTOR_SIZE as u32);
            if end > next {
                next = end;
            }
        }
        self.next_free_lba = next;
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.dev
    }

    pub fn into_inner(self) -> D {
        self.dev
    }

    /// Next partition-relative LBA the allocator would hand out.
    pub fn next_free_lba(&self) -> u32 {
        self.next_free_lba
    }

    /// Occupied catalog entries, in slot order.
    pub fn files(&self) -> impl Iterator<Item = &FileEntry> {
        self.table.entries.iter().filter(|e| !e.is_free())
    }

    /// Read a whole file into `buf` and NUL-terminate it; returns the file
    /// size in bytes. `buf` must hold the file's full sector extent plus the
    /// terminator (callers storing binary data must tolerate the extra NUL
    /// beyond the declared size).
    pub fn read_file(&mut self, filename: &str, buf: &mut [u8]) -> FsResult<usize> {
        let entry = self.table.entries.iter()
            .find(|e| !e.is_free() && e.name() == filename)
            .ok_or(FsError::FileNotFound)?;
        let (start_lba, size) = (entry.start_lba, entry.size_bytes);

        if size > MAX_FILE_SIZE {
            return Err(FsError::FileTooLarge);
        }
        let num_sectors = sectors_for(size, SECTOR_SIZE as u32);
        let extent_bytes = num_sectors as usize * SECTOR_SIZE;
        if buf.len() < core::cmp::max(extent_bytes, size as usize + 1) {
            return Err(FsError::BufferTooSmall);
        }

        if num_sectors > 0 {
            self.dev.read_sectors(
                self.base_lba + start_lba as u64,
                num_sectors as u16,
                &mut buf[..extent_bytes])?;
        }
        buf[size as usize] = 0;
        Ok(size as usize)
    }

    /// Create a file. Fails on empty/overlong names, oversized data, a full
    /// table, or a name that already exists - existing files are never
    /// overwritten. Data sectors go out before the table sector: a crash in
    /// between orphans the new extent but corrupts nothing, because the
    /// cursor is never reused.
    pub fn write_file(&mut self, filename: &str, data: &[u8]) -> FsResult<()> {
        if filename.is_empty() || filename.len() >= MAX_FILENAME_LEN {
            return Err(FsError::InvalidName);
        }
        if data.len() > MAX_FILE_SIZE as usize {
            return Err(FsError::FileTooLarge);
        }

        let mut free_index = None;
        for (i, entry) in self.table.entries.iter().enumerate() {
            if !entry.is_free() && entry.name() == filename {
                return Err(FsError::NameConflict);
            }
            if free_index.is_none() && entry.is_free() {
                free_index = Some(i);
            }
        }
        let free_index = free_index.ok_or(FsError::TableFull)?;

        let num_sectors = sectors_for(data.len() as u32, SECTOR_SIZE as u32);
        if num_sectors > 0 {
            let mut padded = vec![0u8; num_sectors as usize * SECTOR_SIZE];
            padded[..data.len()].copy_from_slice(data);
            self.dev.write_sectors(
                self.base_lba + self.next_free_lba as u64,
                num_sectors as u16,
                &padded)?;
        }

        let mut filename_bytes = [0u8; MAX_FILENAME_LEN];
        filename_bytes[..filename.len()].copy_from_slice(filename.as_bytes());
        self.table.entries[free_index] = FileEntry {
            filename: filename_bytes,
            start_lba: self.next_free_lba,
            size_bytes: data.len() as u32,
        };

        let sector = self.table.encode();
        if let Err(e) = self.dev.write_sectors(self.base_lba, 1, &sector) {
            // the on-disk table still lacks this entry; don't keep it in memory
            self.table.entries[free_index] = FileEntry::empty();
            return Err(e.into());
        }

        self.next_free_lba += num_sectors;
        Ok(())
    }

    /// Zero the table, write it out, and reset the allocator. Existing file
    /// data is not touched, just unreferenced.
    pub fn format(&mut self) -> FsResult<()> {
        self.table = FileIndexTable::empty();
        let sector = self.table.encode();
        self.dev.write_sectors(self.base_lba, 1, &sector)?;
        self.recompute_cursor();
        Ok(())
    }
}
