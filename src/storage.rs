//! Paged File Manager (PFM): treats a file as an array of fixed-size pages
//! preceded by a 16-byte header of four little-endian `u32` counters
//! (`read_page_count`, `write_page_count`, `append_page_count`,
//! `page_count`).
//!
//! The header occupies a full page-sized region at file offset 0 — only the
//! first 16 bytes are meaningful, the remaining 4080 bytes are reserved for
//! forward compatibility. Logical page `p` therefore lives at file offset
//! `(1 + p) * PAGE_SIZE`. Counters are mutated in memory on every operation
//! but are only flushed to the header by [`FileHandle::close`]; an abrupt
//! process exit loses counter progress, not record data (every
//! `write_page`/`append_page` is flushed immediately).

use std::{
    fs::{File, OpenOptions},
    io::{prelude::*, SeekFrom},
    os::unix::fs::OpenOptionsExt,
    path::Path,
};

use crate::aligned;
use crate::attribute::PageNum;
use crate::error::{Error, Result};
use libc::O_DIRECT;

const HEADER_REGION: u64 = crate::PAGE_SIZE as u64;

/// An open paged file: an exclusive file descriptor plus the in-memory
/// mirror of its four operation counters.
#[derive(Debug)]
pub struct FileHandle {
    file: File,
    read_page_count: u32,
    write_page_count: u32,
    append_page_count: u32,
    page_count: u32,
}

/// Create a new paged file at `path`. Fails if a file already exists there.
pub fn create(path: impl AsRef<Path>) -> Result<()> {
    let mut file = OpenOptions::new()
        .create_new(true)
        .read(true)
        .write(true)
        .custom_flags(O_DIRECT)
        .open(path)?;
    let header = aligned::Buffer::new();
    file.write_all(&header)?;
    file.sync_all()?;
    Ok(())
}

/// Remove a paged file.
pub fn destroy(path: impl AsRef<Path>) -> Result<()> {
    std::fs::remove_file(path)?;
    Ok(())
}

/// Open an existing paged file, reading its counters from the header.
pub fn open(path: impl AsRef<Path>) -> Result<FileHandle> {
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(O_DIRECT)
        .open(path)?;

    let mut header = aligned::Buffer::new();
    file.seek(SeekFrom::Start(0))?;
    file.read_exact(&mut header)?;

    Ok(FileHandle {
        file,
        read_page_count: u32::from_le_bytes(header[0..4].try_into().unwrap()),
        write_page_count: u32::from_le_bytes(header[4..8].try_into().unwrap()),
        append_page_count: u32::from_le_bytes(header[8..12].try_into().unwrap()),
        page_count: u32::from_le_bytes(header[12..16].try_into().unwrap()),
    })
}

impl FileHandle {
    fn page_offset(page_num: PageNum) -> u64 {
        HEADER_REGION + page_num as u64 * crate::PAGE_SIZE as u64
    }

    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    /// Read logical page `page_num` into `buf`. `buf` must be page-sized.
    pub fn read_page(&mut self, page_num: PageNum, buf: &mut [u8]) -> Result<()> {
        if page_num >= self.page_count {
            return Err(Error::OutOfRangePage {
                page: page_num,
                page_count: self.page_count,
            });
        }
        self.file.seek(SeekFrom::Start(Self::page_offset(page_num)))?;
        self.file.read_exact(&mut buf[..crate::PAGE_SIZE])?;
        self.read_page_count += 1;
        Ok(())
    }

    /// Overwrite logical page `page_num` with `buf`.
    pub fn write_page(&mut self, page_num: PageNum, buf: &[u8]) -> Result<()> {
        if page_num >= self.page_count {
            return Err(Error::OutOfRangePage {
                page: page_num,
                page_count: self.page_count,
            });
        }
        self.file.seek(SeekFrom::Start(Self::page_offset(page_num)))?;
        self.file.write_all(&buf[..crate::PAGE_SIZE])?;
        self.file.sync_data()?;
        self.write_page_count += 1;
        Ok(())
    }

    /// Append `buf` as a brand new logical page, returning its page number.
    pub fn append_page(&mut self, buf: &[u8]) -> Result<PageNum> {
        let page_num = self.page_count;
        self.file
            .seek(SeekFrom::Start(Self::page_offset(page_num)))?;
        self.file.write_all(&buf[..crate::PAGE_SIZE])?;
        self.file.sync_data()?;
        self.append_page_count += 1;
        self.page_count += 1;
        Ok(page_num)
    }

    pub fn collect_counters(&self) -> (u32, u32, u32) {
        (
            self.read_page_count,
            self.write_page_count,
            self.append_page_count,
        )
    }

    /// Flush the in-memory counters to the header and close the file.
    pub fn close(mut self) -> Result<()> {
        let mut header = aligned::Buffer::new();
        header[0..4].copy_from_slice(&self.read_page_count.to_le_bytes());
        header[4..8].copy_from_slice(&self.write_page_count.to_le_bytes());
        header[8..12].copy_from_slice(&self.append_page_count.to_le_bytes());
        header[12..16].copy_from_slice(&self.page_count.to_le_bytes());

        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&header)?;
        self.file.sync_all()?;
        Ok(())
    }
}
