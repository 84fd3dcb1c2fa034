//! 8-byte big-endian field I/O primitives.
//!
//! `read_entry`/`write_entry` each touch exactly one physical sector: no
//! caching, no batching. Every field access is a real I/O. Simpler and
//! easier to reason about than a cache layer; a higher layer may add one.

use byteorder::{BigEndian, ByteOrder};
use qcow2_device::BlockDevice;

use crate::error::{Error, Result};

const ENTRY_LEN: usize = 8;
const COUNTER_LEN: usize = 2;

fn locate(sector_size: u64, byte_offset: u64, entry_len: usize) -> Result<(u64, usize)> {
    let sector = byte_offset / sector_size;
    let within = (byte_offset % sector_size) as usize;
    if within + entry_len > sector_size as usize {
        return Err(Error::BadAlignment(format!(
            "{entry_len}-byte entry at {byte_offset} straddles physical sector boundary \
             (sector_size={sector_size})"
        )));
    }
    Ok((sector, within))
}

/// Reads the 8-byte big-endian entry at `byte_offset`.
pub(crate) async fn read_entry<D: BlockDevice>(
    device: &mut D,
    sector_size: u64,
    byte_offset: u64,
) -> Result<u64> {
    let (sector, within) = locate(sector_size, byte_offset, ENTRY_LEN)?;
    let mut buf = vec![0u8; sector_size as usize];
    device.read(sector, &mut buf).await?;
    Ok(BigEndian::read_u64(&buf[within..within + ENTRY_LEN]))
}

/// Read-modify-writes the 8-byte big-endian entry at `byte_offset`: reads
/// the containing sector, overwrites the 8 bytes at `byte_offset`, writes
/// the sector back.
pub(crate) async fn write_entry<D: BlockDevice>(
    device: &mut D,
    sector_size: u64,
    byte_offset: u64,
    value: u64,
) -> Result<()> {
    let (sector, within) = locate(sector_size, byte_offset, ENTRY_LEN)?;
    let mut buf = vec![0u8; sector_size as usize];
    device.read(sector, &mut buf).await?;
    BigEndian::write_u64(&mut buf[within..within + ENTRY_LEN], value);
    device.write(sector, &buf).await?;
    Ok(())
}

/// Reads the 16-bit big-endian refcount at `byte_offset`.
pub(crate) async fn read_counter<D: BlockDevice>(
    device: &mut D,
    sector_size: u64,
    byte_offset: u64,
) -> Result<u16> {
    let (sector, within) = locate(sector_size, byte_offset, COUNTER_LEN)?;
    let mut buf = vec![0u8; sector_size as usize];
    device.read(sector, &mut buf).await?;
    Ok(BigEndian::read_u16(&buf[within..within + COUNTER_LEN]))
}

/// Read-modify-writes the 16-bit big-endian refcount at `byte_offset`.
pub(crate) async fn write_counter<D: BlockDevice>(
    device: &mut D,
    sector_size: u64,
    byte_offset: u64,
    value: u16,
) -> Result<()> {
    let (sector, within) = locate(sector_size, byte_offset, COUNTER_LEN)?;
    let mut buf = vec![0u8; sector_size as usize];
    device.read(sector, &mut buf).await?;
    BigEndian::write_u16(&mut buf[within..within + COUNTER_LEN], value);
    device.write(sector, &buf).await?;
    Ok(())
}

/// Bit 63: the "copied" flag — refcount == 1, safe to write in place.
pub(crate) const COPIED_BIT: u64 = 1 << 63;
/// Bit 62: the "compressed" flag — unsupported by this engine.
pub(crate) const COMPRESSED_BIT: u64 = 1 << 62;
/// Bits [61..0]: the byte offset carried by an L1/L2/refcount-table entry.
pub(crate) const OFFSET_MASK: u64 = !(COPIED_BIT | COMPRESSED_BIT);

/// Extracts the byte offset from a raw L1/L2 entry, after confirming the
/// compressed bit is clear.
pub(crate) fn decode_pointer(raw: u64) -> Result<u64> {
    if raw & COMPRESSED_BIT != 0 {
        return Err(Error::UnsupportedCompressedCluster);
    }
    Ok(raw & OFFSET_MASK)
}

/// Sets the copied bit on a freshly allocated cluster offset, ready to
/// install as an L1 or L2 entry.
pub(crate) fn set_copied(cluster_offset: u64) -> u64 {
    cluster_offset | COPIED_BIT
}
