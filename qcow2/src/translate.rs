//! L1 → L2 → cluster address translation, with allocate-on-write.

use qcow2_device::BlockDevice;

use crate::addr::Address;
use crate::alloc;
use crate::engine::EngineState;
use crate::error::Result;
use crate::field;
use crate::refcount;

/// Translates a virtual byte offset to a physical byte offset.
///
/// When `allocate` is `false` (read path), an unmapped L2 table or cluster
/// yields `Ok(None)`. When `allocate` is `true` (write path), missing L2
/// tables and clusters are allocated, zeroed, refcounted, and linked in
/// before returning — the result is always `Ok(Some(_))`.
pub(crate) async fn walk<D: BlockDevice>(
    state: &mut EngineState,
    device: &mut D,
    virtual_offset: u64,
    allocate: bool,
) -> Result<Option<u64>> {
    let cluster_bits = state.header.cluster_bits;
    let sector_size = device.info().sector_size;
    let addr = Address::decompose(virtual_offset, cluster_bits);

    let l1_entry_offset = state.header.l1_table_offset + addr.l1_index * 8;
    let l1_raw = field::read_entry(device, sector_size, l1_entry_offset).await?;
    let mut l2_table_offset = field::decode_pointer(l1_raw)?;

    if l2_table_offset == 0 {
        if !allocate {
            return Ok(None);
        }
        l2_table_offset = allocate_and_link(state, device, l1_entry_offset).await?;
    }

    let l2_entry_offset = l2_table_offset + addr.l2_index * 8;
    let l2_raw = field::read_entry(device, sector_size, l2_entry_offset).await?;
    let mut cluster_offset = field::decode_pointer(l2_raw)?;

    if cluster_offset == 0 {
        if !allocate {
            return Ok(None);
        }
        cluster_offset = allocate_and_link(state, device, l2_entry_offset).await?;
    }

    Ok(Some(cluster_offset + addr.cluster_offset))
}

/// Allocates a fresh cluster, zeroes it, refcounts it, and installs a
/// copied pointer to it at `link_entry_offset` (an L1 or L2 slot).
async fn allocate_and_link<D: BlockDevice>(
    state: &mut EngineState,
    device: &mut D,
    link_entry_offset: u64,
) -> Result<u64> {
    let cluster_bits = state.header.cluster_bits;
    let cluster_size = state.header.cluster_size();
    let sector_size = device.info().sector_size;

    let offset = alloc::extend(state, device).await?;
    alloc::zero_cluster(device, sector_size, offset, cluster_size).await?;
    refcount::incr_refcount(state, device, offset >> cluster_bits).await?;
    field::write_entry(device, sector_size, link_entry_offset, field::set_copied(offset)).await?;

    tracing::debug!(offset, link_entry_offset, "allocated and linked new cluster");
    Ok(offset)
}
