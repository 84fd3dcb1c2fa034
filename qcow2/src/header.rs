//! The fixed QCOW2 v2 header.

use std::io::Cursor;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Error, Result};

/// QCOW2 magic number: the ASCII bytes `QFI` followed by `0xFB`.
pub const MAGIC: u32 = 0x5146_49FB;

/// The only version this engine reads or writes.
pub const VERSION: u32 = 2;

/// Fixed length of the v2 header, in bytes.
pub const HEADER_LENGTH: usize = 72;

/// The on-disk QCOW2 v2 header, persisted at byte 0 of the backing device.
///
/// Backing files, encryption, and snapshots are recognized fields but are
/// always zero: this engine neither reads nor writes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// `log2` of the cluster size in bytes (e.g. 16 → 64 KiB clusters).
    pub cluster_bits: u32,
    /// Virtual disk size, in bytes.
    pub size: u64,
    /// Byte offset of the L1 table.
    pub l1_table_offset: u64,
    /// Number of entries in the L1 table.
    pub l1_size: u32,
    /// Byte offset of the refcount table.
    pub refcount_table_offset: u64,
    /// Length of the refcount table, in clusters.
    pub refcount_table_clusters: u32,
    /// Backing file name offset (always 0 — no backing file chains).
    pub backing_file_offset: u64,
    /// Backing file name length (always 0).
    pub backing_file_size: u32,
    /// Encryption method (always 0 — none).
    pub crypt_method: u32,
    /// Number of snapshots (always 0).
    pub nb_snapshots: u32,
    /// Snapshot table offset (always 0).
    pub snapshots_offset: u64,
}

impl Header {
    /// Cluster size in bytes implied by `cluster_bits`.
    #[must_use]
    pub fn cluster_size(&self) -> u64 {
        1u64 << self.cluster_bits
    }

    /// Parses a header from the first [`HEADER_LENGTH`] bytes of `buf`.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_LENGTH {
            return Err(Error::HeaderParse(format!(
                "buffer too short: {} bytes, need {HEADER_LENGTH}",
                buf.len()
            )));
        }
        let mut r = Cursor::new(buf);

        let magic = r.read_u32::<BigEndian>().unwrap();
        if magic != MAGIC {
            return Err(Error::HeaderParse(format!(
                "bad magic: {magic:#x}, expected {MAGIC:#x}"
            )));
        }
        let version = r.read_u32::<BigEndian>().unwrap();
        if version != VERSION {
            return Err(Error::HeaderParse(format!(
                "unsupported version {version}, only v2 is supported"
            )));
        }

        let backing_file_offset = r.read_u64::<BigEndian>().unwrap();
        let backing_file_size = r.read_u32::<BigEndian>().unwrap();
        let cluster_bits = r.read_u32::<BigEndian>().unwrap();
        let size = r.read_u64::<BigEndian>().unwrap();
        let crypt_method = r.read_u32::<BigEndian>().unwrap();
        let l1_size = r.read_u32::<BigEndian>().unwrap();
        let l1_table_offset = r.read_u64::<BigEndian>().unwrap();
        let refcount_table_offset = r.read_u64::<BigEndian>().unwrap();
        let refcount_table_clusters = r.read_u32::<BigEndian>().unwrap();
        let nb_snapshots = r.read_u32::<BigEndian>().unwrap();
        let snapshots_offset = r.read_u64::<BigEndian>().unwrap();

        if cluster_bits == 0 || cluster_bits >= 64 {
            return Err(Error::HeaderParse(format!(
                "implausible cluster_bits {cluster_bits}"
            )));
        }

        Ok(Header {
            cluster_bits,
            size,
            l1_table_offset,
            l1_size,
            refcount_table_offset,
            refcount_table_clusters,
            backing_file_offset,
            backing_file_size,
            crypt_method,
            nb_snapshots,
            snapshots_offset,
        })
    }

    /// Serializes the header into a fresh, zero-padded cluster-sized
    /// buffer (the caller writes only the leading [`HEADER_LENGTH`] bytes
    /// that matter; the rest is padding up to the first data cluster).
    #[must_use]
    pub fn serialize(&self) -> [u8; HEADER_LENGTH] {
        let mut buf = [0u8; HEADER_LENGTH];
        let mut w = Cursor::new(&mut buf[..]);

        w.write_u32::<BigEndian>(MAGIC).unwrap();
        w.write_u32::<BigEndian>(VERSION).unwrap();
        w.write_u64::<BigEndian>(self.backing_file_offset).unwrap();
        w.write_u32::<BigEndian>(self.backing_file_size).unwrap();
        w.write_u32::<BigEndian>(self.cluster_bits).unwrap();
        w.write_u64::<BigEndian>(self.size).unwrap();
        w.write_u32::<BigEndian>(self.crypt_method).unwrap();
        w.write_u32::<BigEndian>(self.l1_size).unwrap();
        w.write_u64::<BigEndian>(self.l1_table_offset).unwrap();
        w.write_u64::<BigEndian>(self.refcount_table_offset).unwrap();
        w.write_u32::<BigEndian>(self.refcount_table_clusters)
            .unwrap();
        w.write_u32::<BigEndian>(self.nb_snapshots).unwrap();
        w.write_u64::<BigEndian>(self.snapshots_offset).unwrap();

        buf
    }
}
