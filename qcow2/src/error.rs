//! Error types for qcow2 engine operations.

/// Alias for `Result<T, qcow2::Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by qcow2 engine operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Propagated verbatim from the underlying [`qcow2_device::BlockDevice`].
    #[error(transparent)]
    Backing(#[from] qcow2_device::Error),

    /// The header could not be parsed at connect time.
    #[error("failed to parse qcow2 header: {0}")]
    HeaderParse(String),

    /// A traversed L1 or L2 entry has the compressed bit set.
    ///
    /// Compressed clusters are recognized by the header but not decoded by
    /// this engine; encountering one mid-walk is fatal.
    #[error("compressed cluster encountered during address translation")]
    UnsupportedCompressedCluster,

    /// The cluster index requiring a refcount bump falls outside the first
    /// refcount block. Enlarging the refcount table is not implemented.
    #[error("refcount table enlargement not implemented (cluster {cluster})")]
    RefcountEnlargementUnsupported {
        /// The cluster index that could not be refcounted.
        cluster: u64,
    },

    /// `resize` was asked for a size that is not a whole multiple of the
    /// physical sector size.
    #[error("bad alignment: {0}")]
    BadAlignment(String),

    /// A write-path walk returned no physical offset after allocation.
    ///
    /// Defensive: the allocate-on-write path always installs a pointer
    /// before returning, so this should never fire.
    #[error("unreachable: write-path walk produced no mapped offset")]
    UnreachableUnmappedWrite,
}
