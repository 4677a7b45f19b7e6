//! Decoding of the Minetest on-disk map block format.
//!
//! Supports serialization format versions 28 (zlib-framed) and 29
//! (zstd-framed), including the line-oriented inventory grammar, the
//! per-node metadata tables and the per-block name/id mapping that is
//! remapped to globally interned content ids during decoding.

#![deny(rust_2018_idioms, rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod filter;
pub use filter::NameFilter;

pub mod inventory;
pub use inventory::Inventory;

pub mod mapblock;
pub use mapblock::{BlockFlags, MapBlock};

pub mod minegeld;

pub mod node;
pub use node::{MetadataVar, Node};

pub mod pos;
pub use pos::{MapBlockPos, NodePos, NODES_PER_BLOCK};
