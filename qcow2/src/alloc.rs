//! Cluster allocator: extends the backing device and hands out fresh
//! cluster offsets.

use qcow2_device::BlockDevice;

use crate::engine::EngineState;
use crate::error::{Error, Result};

/// Reserves the next cluster index, extends the backing device to cover
/// it, and returns the new cluster's byte offset.
///
/// The returned cluster's contents are undefined: callers must zero or
/// fill it before installing any pointer to it.
pub(crate) async fn extend<D: BlockDevice>(state: &mut EngineState, device: &mut D) -> Result<u64> {
    let cluster_index = state.next_cluster;
    state.next_cluster += 1;

    let sector_size = device.info().sector_size;
    let new_size = state.next_cluster << state.header.cluster_bits;
    resize(device, sector_size, new_size).await?;

    tracing::debug!(cluster_index, new_size, "extended backing device by one cluster");
    Ok(cluster_index << state.header.cluster_bits)
}

/// Resizes the backing device to exactly `new_size_bytes`, which must be a
/// whole multiple of the device's physical sector size.
pub(crate) async fn resize<D: BlockDevice>(
    device: &mut D,
    sector_size: u64,
    new_size_bytes: u64,
) -> Result<()> {
    if new_size_bytes % sector_size != 0 {
        return Err(Error::BadAlignment(format!(
            "target size {new_size_bytes} is not a multiple of sector size {sector_size}"
        )));
    }
    device.resize(new_size_bytes / sector_size).await?;
    Ok(())
}

/// Zero-fills one cluster at `cluster_offset` (must be cluster-aligned).
pub(crate) async fn zero_cluster<D: BlockDevice>(
    device: &mut D,
    sector_size: u64,
    cluster_offset: u64,
    cluster_size: u64,
) -> Result<()> {
    let sector = cluster_offset / sector_size;
    let buf = vec![0u8; cluster_size as usize];
    device.write(sector, &buf).await?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::header::Header;
    use qcow2_device::MemDevice;

    fn state(cluster_bits: u32, next_cluster: u64) -> EngineState {
        EngineState {
            header: Header {
                cluster_bits,
                size: 0,
                l1_table_offset: 0,
                l1_size: 0,
                refcount_table_offset: 0,
                refcount_table_clusters: 0,
                backing_file_offset: 0,
                backing_file_size: 0,
                crypt_method: 0,
                nb_snapshots: 0,
                snapshots_offset: 0,
            },
            next_cluster,
        }
    }

    #[tokio::test]
    async fn extend_bumps_next_cluster_and_resizes() {
        let mut st = state(16, 2);
        let mut dev = MemDevice::new(512);
        dev.resize((2 << 16) / 512).await.unwrap();

        let off = extend(&mut st, &mut dev).await.unwrap();
        assert_eq!(off, 2 << 16);
        assert_eq!(st.next_cluster, 3);
        assert_eq!(dev.info().size_sectors, (3 << 16) / 512);
    }

    #[tokio::test]
    async fn extend_is_monotone_across_calls() {
        let mut st = state(16, 0);
        let mut dev = MemDevice::new(512);

        let a = extend(&mut st, &mut dev).await.unwrap();
        let b = extend(&mut st, &mut dev).await.unwrap();
        assert!(b > a);
        assert_eq!(st.next_cluster, 2);
    }

    #[tokio::test]
    async fn resize_rejects_non_sector_multiple() {
        let mut dev = MemDevice::new(512);
        assert!(resize(&mut dev, 512, 513).await.is_err());
    }

    #[tokio::test]
    async fn zero_cluster_clears_region() {
        let mut dev = MemDevice::new(512);
        dev.resize(128).await.unwrap(); // 64 KiB
        dev.write(0, &vec![0xFFu8; 512]).await.unwrap();
        zero_cluster(&mut dev, 512, 0, 65536).await.unwrap();
        assert!(dev.as_bytes()[..65536].iter().all(|&b| b == 0));
    }
}
