//! Shared utility code throughout the mtscan project.

#![deny(rust_2018_idioms, rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod blob;
pub use blob::{BlobReader, SerializationError};

pub mod idmap;
pub use idmap::{IdEntry, IdTable, LocalIdCache};

pub mod mem;

pub mod shard;
pub use shard::ShardedMap;

/// Renders a byte slice as lowercase hex, e.g. for error previews.
pub fn to_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;

    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}
