//! Refcount table and refcount block management.
//!
//! Only the first refcount block is ever consulted: growing the refcount
//! table to cover more than one block's worth of clusters is out of
//! scope, and any cluster index past the first block is a hard error
//! rather than a silent corruption.

use qcow2_device::BlockDevice;

use crate::alloc;
use crate::engine::EngineState;
use crate::error::{Error, Result};
use crate::field;

/// Number of 16-bit counters that fit in one cluster.
fn refs_per_cluster(cluster_size: u64) -> u64 {
    cluster_size / 2
}

/// Increments the refcount of the cluster at `cluster_index` by one,
/// allocating the (single supported) refcount block on first use.
///
/// A refcount block allocated by this call is not itself recursively
/// refcounted — bootstrapping that chain is out of scope.
pub(crate) async fn incr_refcount<D: BlockDevice>(
    state: &mut EngineState,
    device: &mut D,
    cluster_index: u64,
) -> Result<()> {
    let cluster_size = state.header.cluster_size();
    let sector_size = device.info().sector_size;
    let refs_per = refs_per_cluster(cluster_size);

    let rt_index = cluster_index / refs_per;
    let within_index = cluster_index % refs_per;

    if rt_index != 0 {
        return Err(Error::RefcountEnlargementUnsupported { cluster: cluster_index });
    }

    let rt_entry_offset = state.header.refcount_table_offset + rt_index * 8;
    let mut block_offset = field::read_entry(device, sector_size, rt_entry_offset).await?;

    if block_offset == 0 {
        block_offset = alloc::extend(state, device).await?;
        alloc::zero_cluster(device, sector_size, block_offset, cluster_size).await?;
        field::write_entry(device, sector_size, rt_entry_offset, block_offset).await?;
        tracing::debug!(block_offset, "allocated first refcount block");
    }

    let counter_offset = block_offset + within_index * 2;
    let count = field::read_counter(device, sector_size, counter_offset).await?;
    field::write_counter(device, sector_size, counter_offset, count + 1).await?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::header::Header;
    use qcow2_device::MemDevice;

    fn state() -> EngineState {
        EngineState {
            header: Header {
                cluster_bits: 16,
                size: 0,
                l1_table_offset: 0,
                l1_size: 0,
                refcount_table_offset: 512,
                refcount_table_clusters: 1,
                backing_file_offset: 0,
                backing_file_size: 0,
                crypt_method: 0,
                nb_snapshots: 0,
                snapshots_offset: 0,
            },
            next_cluster: 1,
        }
    }

    #[tokio::test]
    async fn first_increment_allocates_block() {
        let mut st = state();
        let mut dev = MemDevice::new(512);
        dev.resize((1u64 << 16) / 512).await.unwrap();

        incr_refcount(&mut st, &mut dev, 0).await.unwrap();

        let rt_entry = field::read_entry(&mut dev, 512, st.header.refcount_table_offset)
            .await
            .unwrap();
        assert_ne!(rt_entry, 0);

        let count = field::read_counter(&mut dev, 512, rt_entry).await.unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn repeated_increments_accumulate() {
        let mut st = state();
        let mut dev = MemDevice::new(512);

        incr_refcount(&mut st, &mut dev, 5).await.unwrap();
        incr_refcount(&mut st, &mut dev, 5).await.unwrap();
        incr_refcount(&mut st, &mut dev, 5).await.unwrap();

        let rt_entry = field::read_entry(&mut dev, 512, st.header.refcount_table_offset)
            .await
            .unwrap();
        let count = field::read_counter(&mut dev, 512, rt_entry + 5 * 2).await.unwrap();
        assert_eq!(count, 3);
    }

    #[tokio::test]
    async fn distinct_clusters_get_distinct_counters() {
        let mut st = state();
        let mut dev = MemDevice::new(512);

        incr_refcount(&mut st, &mut dev, 1).await.unwrap();
        incr_refcount(&mut st, &mut dev, 2).await.unwrap();

        let rt_entry = field::read_entry(&mut dev, 512, st.header.refcount_table_offset)
            .await
            .unwrap();
        assert_eq!(field::read_counter(&mut dev, 512, rt_entry + 2).await.unwrap(), 1);
        assert_eq!(field::read_counter(&mut dev, 512, rt_entry + 4).await.unwrap(), 1);
        assert_eq!(field::read_counter(&mut dev, 512, rt_entry + 0).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn beyond_first_block_is_unsupported() {
        let mut st = state();
        let mut dev = MemDevice::new(512);
        let refs_per = refs_per_cluster(st.header.cluster_size());

        let err = incr_refcount(&mut st, &mut dev, refs_per).await.unwrap_err();
        assert!(matches!(err, Error::RefcountEnlargementUnsupported { cluster } if cluster == refs_per));
    }
}
