//! An in-memory [`BlockDevice`], used by the engine's own test suite.

use crate::{BlockDevice, DeviceInfo, Error, Result};

/// An in-memory block device backed by a growable byte buffer.
///
/// Never touches the filesystem — useful for fast, deterministic tests of
/// the address translator, allocator, and refcount manager without the
/// overhead of real file I/O.
#[derive(Debug, Clone)]
pub struct MemDevice {
    data: Vec<u8>,
    sector_size: u64,
}

impl MemDevice {
    /// Creates an empty (zero-sized) device with the given physical sector
    /// size.
    pub fn new(sector_size: u64) -> Self {
        Self {
            data: Vec::new(),
            sector_size,
        }
    }

    /// Creates a device with the given physical sector size, pre-sized to
    /// `size_sectors` sectors of zeroed content.
    pub fn with_capacity(sector_size: u64, size_sectors: u64) -> Self {
        Self {
            data: vec![0u8; (sector_size * size_sectors) as usize],
            sector_size,
        }
    }

    /// Returns the raw backing buffer, for test assertions.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

impl BlockDevice for MemDevice {
    fn info(&self) -> DeviceInfo {
        DeviceInfo {
            sector_size: self.sector_size,
            size_sectors: self.data.len() as u64 / self.sector_size,
            read_write: true,
        }
    }

    async fn read(&mut self, sector: u64, buf: &mut [u8]) -> Result<()> {
        let offset = (sector * self.sector_size) as usize;
        let end = offset + buf.len();
        if end > self.data.len() {
            return Err(Error::OutOfBounds {
                offset: offset as u64,
                len: buf.len() as u64,
                size: self.data.len() as u64,
            });
        }
        buf.copy_from_slice(&self.data[offset..end]);
        Ok(())
    }

    async fn write(&mut self, sector: u64, buf: &[u8]) -> Result<()> {
        let offset = (sector * self.sector_size) as usize;
        let end = offset + buf.len();
        if end > self.data.len() {
            return Err(Error::OutOfBounds {
                offset: offset as u64,
                len: buf.len() as u64,
                size: self.data.len() as u64,
            });
        }
        self.data[offset..end].copy_from_slice(buf);
        Ok(())
    }

    async fn resize(&mut self, size_sectors: u64) -> Result<()> {
        self.data.resize((size_sectors * self.sector_size) as usize, 0);
        Ok(())
    }

    async fn disconnect(self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn grows_and_zero_fills() {
        let mut dev = MemDevice::new(512);
        dev.resize(2).await.unwrap();
        assert_eq!(dev.as_bytes().len(), 1024);
        assert!(dev.as_bytes().iter().all(|&b| b == 0));
    }

    #[tokio::test]
    async fn round_trips_data() {
        let mut dev = MemDevice::new(512);
        dev.resize(1).await.unwrap();
        let pattern: Vec<u8> = (0..512).map(|i| (i % 256) as u8).collect();
        dev.write(0, &pattern).await.unwrap();

        let mut out = vec![0u8; 512];
        dev.read(0, &mut out).await.unwrap();
        assert_eq!(out, pattern);
    }
}
