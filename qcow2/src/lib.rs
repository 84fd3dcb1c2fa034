//! A sparse, copy-on-write virtual block device engine for the QCOW2 v2
//! on-disk format.
//!
//! `qcow2` lays a growable virtual disk over any [`qcow2_device::BlockDevice`]:
//! an L1/L2 table walk translates virtual byte offsets to physical ones,
//! allocating and refcounting new clusters on write as the image grows.
//! Compressed clusters, encryption, backing-file chains, and snapshots are
//! recognized in the header but not implemented — see [`error::Error`] and
//! the module docs below for exactly what is and isn't supported.
//!
//! # Quick start
//!
//! ```no_run
//! use qcow2::{CreateOptions, Engine};
//! use qcow2_device::FileDevice;
//!
//! # async fn run() -> qcow2::Result<()> {
//! let device = FileDevice::create("disk.qcow2").await?;
//! let mut engine = Engine::create(device, CreateOptions::new(1 << 30)).await?;
//!
//! engine.write(0, &[0xAB; 512]).await?;
//! let mut buf = [0u8; 512];
//! engine.read(0, &mut buf).await?;
//!
//! engine.disconnect().await?;
//! # Ok(())
//! # }
//! ```

mod addr;
mod alloc;
mod engine;
mod error;
mod field;
mod header;
mod refcount;
mod translate;
mod io;

pub use addr::{Address, Offset};
pub use engine::{CreateOptions, Engine, VolumeInfo, VIRTUAL_SECTOR_SIZE};
pub use error::{Error, Result};
pub use header::{Header, HEADER_LENGTH, MAGIC, VERSION};
