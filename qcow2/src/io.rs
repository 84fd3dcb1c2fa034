//! Read/write dispatch: chops a virtual I/O request into physical-sector
//! pieces and drives each one through [`crate::translate::walk`].

use std::ops::Range;

use qcow2_device::BlockDevice;

use crate::engine::{EngineState, VIRTUAL_SECTOR_SIZE};
use crate::error::{Error, Result};
use crate::translate;

/// One physical-sector-sized (or shorter, for a trailing remainder) slice
/// of a caller-supplied buffer, paired with the absolute virtual sector
/// it starts at.
///
/// `chop` hands back indices into the caller's buffer list rather than
/// borrowed slices, so the same `Vec<Piece>` works whether the caller's
/// buffers are mutable or shared.
pub(crate) struct Piece {
    /// Absolute virtual sector number (in fixed 512-byte virtual sectors)
    /// this piece starts at.
    pub(crate) virtual_sector: u64,
    /// Index into the `buffers` slice passed to `chop`.
    pub(crate) buffer: usize,
    /// Byte range within that buffer covered by this piece.
    pub(crate) range: Range<usize>,
}

/// Splits `buffers` into pieces of at most `physical_sector_size` bytes
/// each, walking the buffer list in order and incrementing the virtual
/// sector counter by the number of virtual sectors each piece consumes.
///
/// A buffer shorter than a physical sector still consumes at least one
/// virtual sector — it is not padded or rejected, just chopped whole.
pub(crate) fn chop(first_virtual_sector: u64, buffers: &[usize], physical_sector_size: u64) -> Vec<Piece> {
    let sectors_per_piece = (physical_sector_size / VIRTUAL_SECTOR_SIZE).max(1);
    let mut pieces = Vec::new();
    let mut sector = first_virtual_sector;

    for (buffer, &len) in buffers.iter().enumerate() {
        let mut offset = 0;
        while offset < len {
            let take = (len - offset).min(physical_sector_size as usize);
            pieces.push(Piece {
                virtual_sector: sector,
                buffer,
                range: offset..offset + take,
            });
            offset += take;
            sector += sectors_per_piece;
        }
    }
    pieces
}

fn check_sector_aligned(virtual_offset: u64) -> Result<()> {
    if virtual_offset % VIRTUAL_SECTOR_SIZE != 0 {
        return Err(Error::BadAlignment(format!(
            "I/O at offset {virtual_offset} is not a multiple of the virtual sector size {VIRTUAL_SECTOR_SIZE}"
        )));
    }
    Ok(())
}

/// Reads `buf.len()` bytes starting at virtual byte offset `virtual_offset`.
///
/// Unmapped regions read back as zero, without allocating anything.
pub(crate) async fn read<D: BlockDevice>(
    state: &mut EngineState,
    device: &mut D,
    virtual_offset: u64,
    buf: &mut [u8],
) -> Result<()> {
    check_sector_aligned(virtual_offset)?;
    let physical_sector_size = device.info().sector_size;
    let first_virtual_sector = virtual_offset / VIRTUAL_SECTOR_SIZE;

    for piece in chop(first_virtual_sector, &[buf.len()], physical_sector_size) {
        let voff = piece.virtual_sector * VIRTUAL_SECTOR_SIZE;
        let chunk = &mut buf[piece.range];
        match translate::walk(state, device, voff, false).await? {
            Some(phys) => {
                let sector = phys / physical_sector_size;
                device.read(sector, chunk).await?;
            }
            None => chunk.fill(0),
        }
    }
    Ok(())
}

/// Writes `buf` starting at virtual byte offset `virtual_offset`,
/// allocating any unmapped L2 tables or clusters along the way.
pub(crate) async fn write<D: BlockDevice>(
    state: &mut EngineState,
    device: &mut D,
    virtual_offset: u64,
    buf: &[u8],
) -> Result<()> {
    check_sector_aligned(virtual_offset)?;
    let physical_sector_size = device.info().sector_size;
    let first_virtual_sector = virtual_offset / VIRTUAL_SECTOR_SIZE;

    for piece in chop(first_virtual_sector, &[buf.len()], physical_sector_size) {
        let voff = piece.virtual_sector * VIRTUAL_SECTOR_SIZE;
        let chunk = &buf[piece.range];
        let phys = translate::walk(state, device, voff, true)
            .await?
            .ok_or(Error::UnreachableUnmappedWrite)?;
        let sector = phys / physical_sector_size;
        device.write(sector, chunk).await?;
    }
    Ok(())
}
