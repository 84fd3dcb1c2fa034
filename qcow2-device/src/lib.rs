//! Resizable block-device abstraction consumed by the `qcow2` engine.
//!
//! `qcow2` never touches a file descriptor directly — every physical I/O
//! goes through [`BlockDevice`]. This mirrors the split in `bux`, where all
//! `unsafe` FFI calls into `libkrun` are confined to a single narrow crate:
//! here, all actual file/memory access is confined to [`FileDevice`] and
//! [`MemDevice`].
//!
//! # Quick start
//!
//! ```no_run
//! # async fn run() -> qcow2_device::Result<()> {
//! use qcow2_device::{BlockDevice, FileDevice};
//!
//! let mut dev = FileDevice::create("/tmp/disk.raw").await?;
//! dev.resize(8).await?; // 8 physical sectors
//! dev.write(0, &vec![0xAA; dev.info().sector_size as usize]).await?;
//! # Ok(())
//! # }
//! ```

use std::future::Future;

mod file;
mod mem;

pub use file::FileDevice;
pub use mem::MemDevice;

/// Alias for `Result<T, qcow2_device::Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by a [`BlockDevice`] implementation.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The requested region falls outside the device's current size.
    #[error("out of bounds: offset {offset} len {len} exceeds device size {size}")]
    OutOfBounds {
        /// Byte offset of the failed access.
        offset: u64,
        /// Length of the failed access, in bytes.
        len: u64,
        /// Current device size in bytes.
        size: u64,
    },

    /// `resize` was asked for a size that is not a whole multiple of the
    /// physical sector size.
    #[error("resize target {requested} is not a multiple of sector size {sector_size}")]
    Misaligned {
        /// The requested size in bytes.
        requested: u64,
        /// The device's physical sector size.
        sector_size: u64,
    },

    /// The device is open read-only.
    #[error("device is read-only")]
    ReadOnly,

    /// Propagated I/O error from the underlying file or OS call.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Static information about a backing device, discovered at open time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Physical sector size in bytes. All I/O happens in whole multiples of
    /// this size, starting at a multiple of this size.
    pub sector_size: u64,
    /// Current device size, expressed in physical sectors.
    pub size_sectors: u64,
    /// Whether the device accepts writes.
    pub read_write: bool,
}

/// A resizable, randomly-addressable block device.
///
/// Every method is async: the engine models every physical I/O as a
/// suspension point, per its single-threaded cooperative scheduling model.
/// Implementations are not required to be safe for concurrent use from
/// multiple tasks — the engine serializes all access through a single
/// owner.
pub trait BlockDevice: Send {
    /// Returns the device's current geometry and access mode.
    fn info(&self) -> DeviceInfo;

    /// Reads `buf.len()` bytes starting at physical `sector` into `buf`.
    ///
    /// `buf.len()` must be a whole multiple of the device's sector size.
    fn read(&mut self, sector: u64, buf: &mut [u8]) -> impl Future<Output = Result<()>> + Send;

    /// Writes `buf` starting at physical `sector`.
    ///
    /// `buf.len()` must be a whole multiple of the device's sector size.
    fn write(&mut self, sector: u64, buf: &[u8]) -> impl Future<Output = Result<()>> + Send;

    /// Grows or shrinks the device to exactly `size_sectors` physical
    /// sectors, zero-filling any newly exposed region.
    fn resize(&mut self, size_sectors: u64) -> impl Future<Output = Result<()>> + Send;

    /// Flushes and releases the device. A no-op for in-memory devices.
    fn disconnect(self) -> impl Future<Output = Result<()>> + Send;
}
