//! A [`BlockDevice`] backed by a real file on disk.

use std::path::Path;

use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt, SeekFrom};

use crate::{BlockDevice, DeviceInfo, Error, Result};

/// Default physical sector size assumed for plain files.
///
/// Real block devices report their own sector size; a regular file has no
/// such notion, so we use the common 512-byte default (matching the
/// virtual sector size the engine presents, though the two are unrelated).
pub const DEFAULT_SECTOR_SIZE: u64 = 512;

/// A [`BlockDevice`] backed by a `tokio::fs::File`.
#[derive(Debug)]
pub struct FileDevice {
    file: File,
    sector_size: u64,
    size_sectors: u64,
    read_write: bool,
}

impl FileDevice {
    /// Creates a new, empty (zero-sized) file at `path` for read-write use.
    pub async fn create(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .await?;
        Ok(Self {
            file,
            sector_size: DEFAULT_SECTOR_SIZE,
            size_sectors: 0,
            read_write: true,
        })
    }

    /// Opens an existing file, discovering its current size.
    pub async fn open(path: impl AsRef<Path>, read_write: bool) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(read_write)
            .open(path)
            .await?;
        let len = file.metadata().await?.len();
        Ok(Self {
            file,
            sector_size: DEFAULT_SECTOR_SIZE,
            size_sectors: len / DEFAULT_SECTOR_SIZE,
            read_write,
        })
    }
}

impl BlockDevice for FileDevice {
    fn info(&self) -> DeviceInfo {
        DeviceInfo {
            sector_size: self.sector_size,
            size_sectors: self.size_sectors,
            read_write: self.read_write,
        }
    }

    async fn read(&mut self, sector: u64, buf: &mut [u8]) -> Result<()> {
        let offset = sector * self.sector_size;
        let size = self.size_sectors * self.sector_size;
        if offset + buf.len() as u64 > size {
            return Err(Error::OutOfBounds {
                offset,
                len: buf.len() as u64,
                size,
            });
        }
        self.file.seek(SeekFrom::Start(offset)).await?;
        self.file.read_exact(buf).await?;
        Ok(())
    }

    async fn write(&mut self, sector: u64, buf: &[u8]) -> Result<()> {
        if !self.read_write {
            return Err(Error::ReadOnly);
        }
        let offset = sector * self.sector_size;
        let size = self.size_sectors * self.sector_size;
        if offset + buf.len() as u64 > size {
            return Err(Error::OutOfBounds {
                offset,
                len: buf.len() as u64,
                size,
            });
        }
        self.file.seek(SeekFrom::Start(offset)).await?;
        self.file.write_all(buf).await?;
        Ok(())
    }

    async fn resize(&mut self, size_sectors: u64) -> Result<()> {
        let new_len = size_sectors * self.sector_size;
        self.file.set_len(new_len).await?;
        self.size_sectors = size_sectors;
        tracing::debug!(size_sectors, "resized file device");
        Ok(())
    }

    async fn disconnect(mut self) -> Result<()> {
        self.file.flush().await?;
        Ok(())
    }
}
