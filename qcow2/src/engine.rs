//! The public engine facade: create, connect, read, write.

use qcow2_device::BlockDevice;

use crate::error::{Error, Result};
use crate::header::{Header, HEADER_LENGTH};
use crate::io;
use crate::refcount;

/// Mutable engine state that every module in this crate threads through:
/// the parsed header plus the next free cluster index.
///
/// `next_cluster` is never persisted — it is recomputed from the backing
/// device's current size on [`Engine::connect`], since [`crate::alloc`]
/// keeps the device resized to exactly `next_cluster << cluster_bits`
/// bytes at all times.
pub(crate) struct EngineState {
    pub(crate) header: Header,
    pub(crate) next_cluster: u64,
}

/// Parameters for [`Engine::create`].
#[derive(Debug, Clone, Copy)]
pub struct CreateOptions {
    /// Virtual disk size, in bytes.
    pub size: u64,
    /// `log2` of the cluster size. Defaults to 16 (64 KiB clusters),
    /// matching common QCOW2 images.
    pub cluster_bits: u32,
}

impl CreateOptions {
    /// Starts from the default cluster size with the given virtual size.
    #[must_use]
    pub fn new(size: u64) -> Self {
        CreateOptions { size, cluster_bits: 16 }
    }
}

/// The engine always presents the virtual disk in fixed 512-byte sectors,
/// independent of the backing device's own physical sector size.
pub const VIRTUAL_SECTOR_SIZE: u64 = 512;

/// Virtual disk geometry reported by [`Engine::get_info`]: the read_write
/// flag, the fixed 512-byte virtual sector size, and the virtual size
/// expressed in those sectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeInfo {
    /// Virtual disk size, in bytes.
    pub size: u64,
    /// Virtual disk size, in fixed 512-byte sectors.
    pub size_sectors: u64,
    /// Always [`VIRTUAL_SECTOR_SIZE`]; exposed for API symmetry with
    /// [`qcow2_device::DeviceInfo`].
    pub sector_size: u64,
    /// `log2` of the cluster size.
    pub cluster_bits: u32,
    /// Whether the underlying backing device accepts writes.
    pub read_write: bool,
}

/// A QCOW2 engine bound to a single open backing device.
pub struct Engine<D: BlockDevice> {
    device: D,
    state: EngineState,
}

impl<D: BlockDevice> Engine<D> {
    /// Formats `device` as a fresh, empty QCOW2 image and returns an
    /// engine bound to it.
    ///
    /// Lays out the header, refcount table, and L1 table in the first
    /// three clusters, then refcounts all three (bootstrapping the first
    /// refcount block as a fourth, per the limitation noted in
    /// [`crate::refcount`]).
    pub async fn create(mut device: D, options: CreateOptions) -> Result<Self> {
        let cluster_bits = options.cluster_bits;
        let cluster_size = 1u64 << cluster_bits;
        let sector_size = device.info().sector_size;

        let l2_entries = cluster_size / 8;
        let bytes_per_l1_entry = l2_entries * cluster_size;
        let l1_size = options.size.div_ceil(bytes_per_l1_entry).max(1);
        let l1_size: u32 = l1_size.try_into().map_err(|_| {
            Error::HeaderParse(format!("virtual size {} needs too many L1 entries", options.size))
        })?;
        if u64::from(l1_size) * 8 > cluster_size {
            return Err(Error::HeaderParse(format!(
                "virtual size {} does not fit a single-cluster L1 table at cluster_bits {cluster_bits}",
                options.size
            )));
        }

        let header = Header {
            cluster_bits,
            size: options.size,
            l1_table_offset: cluster_size * 2,
            l1_size,
            refcount_table_offset: cluster_size,
            refcount_table_clusters: 1,
            backing_file_offset: 0,
            backing_file_size: 0,
            crypt_method: 0,
            nb_snapshots: 0,
            snapshots_offset: 0,
        };

        device.resize(3 * cluster_size / sector_size).await?;

        let mut header_cluster = vec![0u8; cluster_size as usize];
        header_cluster[..HEADER_LENGTH].copy_from_slice(&header.serialize());
        device.write(0, &header_cluster).await?;
        device.write(cluster_size / sector_size, &vec![0u8; cluster_size as usize]).await?;
        device
            .write(2 * cluster_size / sector_size, &vec![0u8; cluster_size as usize])
            .await?;

        let mut state = EngineState { header, next_cluster: 3 };
        for cluster_index in 0..3 {
            refcount::incr_refcount(&mut state, &mut device, cluster_index).await?;
        }

        tracing::debug!(size = options.size, cluster_bits, "created qcow2 image");
        Ok(Engine { device, state })
    }

    /// Reads the header of an existing image and binds an engine to it.
    pub async fn connect(mut device: D) -> Result<Self> {
        let sector_size = device.info().sector_size;
        let mut buf = vec![0u8; sector_size.max(HEADER_LENGTH as u64) as usize];
        device.read(0, &mut buf).await?;
        let header = Header::parse(&buf)?;

        let total_bytes = device.info().size_sectors * sector_size;
        let next_cluster = total_bytes >> header.cluster_bits;

        tracing::debug!(cluster_bits = header.cluster_bits, next_cluster, "connected to qcow2 image");
        Ok(Engine { device, state: EngineState { header, next_cluster } })
    }

    /// Reports the virtual disk's geometry.
    #[must_use]
    pub fn get_info(&self) -> VolumeInfo {
        VolumeInfo {
            size: self.state.header.size,
            size_sectors: self.state.header.size / VIRTUAL_SECTOR_SIZE,
            sector_size: VIRTUAL_SECTOR_SIZE,
            cluster_bits: self.state.header.cluster_bits,
            read_write: self.device.info().read_write,
        }
    }

    /// Reads `buf.len()` bytes starting at virtual byte offset `offset`.
    /// Unmapped regions read back as zero.
    pub async fn read(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        io::read(&mut self.state, &mut self.device, offset, buf).await
    }

    /// Writes `buf` starting at virtual byte offset `offset`, allocating
    /// any unmapped clusters along the way.
    pub async fn write(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        io::write(&mut self.state, &mut self.device, offset, buf).await
    }

    /// Releases the backing device.
    pub async fn disconnect(self) -> Result<()> {
        self.device.disconnect().await?;
        Ok(())
    }
}
