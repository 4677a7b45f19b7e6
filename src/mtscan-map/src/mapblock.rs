//! The map block container format.
//!
//! Two serialization versions are in the wild for the worlds we care
//! about: 28 stores the node array and the metadata table as individual
//! zlib streams inside an otherwise plain container, 29 wraps the whole
//! body after the version byte into a single zstd frame.

use bitflags::bitflags;

use mtscan_utils::{to_hex, BlobReader, LocalIdCache, SerializationError};

use crate::{node::Node, pos::NODES_PER_BLOCK};

const PARAM0_SIZE: usize = NODES_PER_BLOCK * 2;
const PARAM1_SIZE: usize = NODES_PER_BLOCK;
const NODE_DATA_SIZE: usize = PARAM0_SIZE + PARAM1_SIZE + NODES_PER_BLOCK;

bitflags! {
    /// Header flag bits of a serialized block.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct BlockFlags: u8 {
        const IS_UNDERGROUND = 1 << 0;
        const DAY_NIGHT_DIFFERS = 1 << 1;
        const LIGHTING_EXPIRED = 1 << 2;
        const GENERATED = 1 << 3;
    }
}

/// A fully decoded map block.
///
/// After decoding, every node's `param0` holds a globally interned
/// content id rather than the block-local id it was serialized with.
#[derive(Debug)]
pub struct MapBlock {
    version: u8,
    flags: BlockFlags,
    lighting_complete: u16,
    timestamp: u32,
    // Block-local content id -> interned global id.
    name_id_map: Vec<Option<u16>>,
    nodes: Vec<Node>,
}

impl MapBlock {
    fn empty() -> Self {
        Self {
            version: 0,
            flags: BlockFlags::empty(),
            lighting_complete: 0,
            timestamp: 0,
            name_id_map: Vec::new(),
            nodes: Vec::new(),
        }
    }

    /// Decodes one block, interning every node name it carries through
    /// `ids`.
    ///
    /// The blob must be consumed exactly; trailing bytes are treated as
    /// corruption.
    pub fn deserialize<E>(
        blob: &mut BlobReader<'_>,
        ids: &mut LocalIdCache<'_, E>,
    ) -> Result<Self, SerializationError> {
        let mut block = Self::empty();

        block.version = blob.read_u8("version")?;
        match block.version {
            28 => block.deserialize_format_28(blob, ids)?,
            29 => block.deserialize_format_29(blob, ids)?,
            v => return Err(blob.error("version", format!("unsupported version {v}"))),
        }

        block.remap_param0(blob)?;
        verify_all_data_consumed(blob)?;

        Ok(block)
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn flags(&self) -> BlockFlags {
        self.flags
    }

    pub fn lighting_complete(&self) -> u16 {
        self.lighting_complete
    }

    pub fn timestamp(&self) -> u32 {
        self.timestamp
    }

    /// All 4096 nodes in z-major order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn nodes_mut(&mut self) -> &mut [Node] {
        &mut self.nodes
    }

    /// Number of distinct content ids the block was serialized with.
    pub fn unique_content_ids(&self) -> usize {
        self.name_id_map.len()
    }

    fn deserialize_format_28<E>(
        &mut self,
        blob: &mut BlobReader<'_>,
        ids: &mut LocalIdCache<'_, E>,
    ) -> Result<(), SerializationError> {
        self.flags = BlockFlags::from_bits_retain(blob.read_u8("flags")?);
        self.lighting_complete = blob.read_u16("lighting_complete")?;

        read_content_widths(blob)?;

        let nodes = blob.decompress_zlib("nodes")?;
        if nodes.len() != NODE_DATA_SIZE {
            return Err(blob.error(
                "nodes",
                format!("node data inflated to {} bytes, expected {NODE_DATA_SIZE}", nodes.len()),
            ));
        }
        self.deserialize_nodes(&mut BlobReader::new(&nodes))?;

        let metadata = blob.decompress_zlib("metadata")?;
        self.deserialize_metadata(&mut BlobReader::new(&metadata))?;

        deserialize_static_objects(blob)?;

        self.timestamp = blob.read_u32("timestamp")?;
        self.deserialize_name_id_mapping(blob, ids)?;

        deserialize_node_timers(blob)
    }

    fn deserialize_format_29<E>(
        &mut self,
        blob: &mut BlobReader<'_>,
        ids: &mut LocalIdCache<'_, E>,
    ) -> Result<(), SerializationError> {
        let raw = blob.decompress_zstd("format-29.zstd")?;
        let inner = &mut BlobReader::new(&raw);

        self.flags = BlockFlags::from_bits_retain(inner.read_u8("flags")?);
        self.lighting_complete = inner.read_u16("lighting_complete")?;

        self.timestamp = inner.read_u32("timestamp")?;
        self.deserialize_name_id_mapping(inner, ids)?;

        read_content_widths(inner)?;

        self.deserialize_nodes(inner)?;
        self.deserialize_metadata(inner)?;
        deserialize_static_objects(inner)?;
        deserialize_node_timers(inner)?;

        verify_all_data_consumed(inner)
    }

    /// 4096 big-endian `param0` words, then the `param1` and `param2`
    /// byte planes.
    fn deserialize_nodes(&mut self, blob: &mut BlobReader<'_>) -> Result<(), SerializationError> {
        let mut nodes = vec![Node::default(); NODES_PER_BLOCK];

        for node in nodes.iter_mut() {
            node.param0 = blob.read_u16("nodes.param0")?;
        }
        for node in nodes.iter_mut() {
            node.param1 = blob.read_u8("nodes.param1")?;
        }
        for node in nodes.iter_mut() {
            node.param2 = blob.read_u8("nodes.param2")?;
        }

        self.nodes = nodes;
        Ok(())
    }

    fn deserialize_metadata(&mut self, blob: &mut BlobReader<'_>) -> Result<(), SerializationError> {
        let version = blob.read_u8("meta.version")?;
        if version == 0 {
            // No metadata in this block.
            return Ok(());
        }
        if version != 2 {
            return Err(blob.error("meta.version", format!("unsupported meta.version {version}")));
        }

        let count = blob.read_u16("meta.count")?;
        for _ in 0..count {
            let local_pos = blob.read_u16("meta.pos")?;
            if local_pos as usize >= NODES_PER_BLOCK {
                return Err(blob.error("meta.pos", format!("invalid metadata position {local_pos}")));
            }

            self.nodes[local_pos as usize].deserialize_metadata(blob)?;
        }

        Ok(())
    }

    fn deserialize_name_id_mapping<E>(
        &mut self,
        blob: &mut BlobReader<'_>,
        ids: &mut LocalIdCache<'_, E>,
    ) -> Result<(), SerializationError> {
        let nim_version = blob.read_u8("nim.version")?;
        if nim_version != 0 {
            return Err(blob.error("nim.version", format!("unsupported nim.version {nim_version}")));
        }

        let count = blob.read_u16("nim.count")?;
        let mut map = vec![None; count as usize];

        for _ in 0..count {
            let id = blob.read_u16("nim.id")?;
            if id as usize >= NODES_PER_BLOCK {
                return Err(blob.error("nim.id", format!("illegal nim.id {id}")));
            }

            let name_len = blob.read_u16("nim.name_len")?;
            let name = blob.read_str(name_len as usize, "nim.name")?;

            let global = u16::try_from(ids.add(&name))
                .map_err(|_| blob.error("nim.name", "content id table overflow"))?;

            if id as usize >= map.len() {
                map.resize(id as usize + 1, None);
            }
            map[id as usize] = Some(global);
        }

        self.name_id_map = map;
        Ok(())
    }

    /// Rewrites every node's `param0` from its block-local content id
    /// to the interned global one.
    fn remap_param0(&mut self, blob: &BlobReader<'_>) -> Result<(), SerializationError> {
        for node in &mut self.nodes {
            node.param0 = self
                .name_id_map
                .get(node.param0 as usize)
                .copied()
                .flatten()
                .ok_or_else(|| {
                    blob.error("nim", format!("param0 {} missing from name-id mapping", node.param0))
                })?;
        }
        Ok(())
    }
}

fn read_content_widths(blob: &mut BlobReader<'_>) -> Result<(), SerializationError> {
    let content_width = blob.read_u8("content_width")?;
    if content_width != 2 {
        return Err(blob.error("content_width", format!("unsupported content_width {content_width}")));
    }

    let params_width = blob.read_u8("params_width")?;
    if params_width != 2 {
        return Err(blob.error("params_width", format!("unsupported params_width {params_width}")));
    }

    Ok(())
}

// Static objects are parsed for framing only; their payload is opaque
// to the scan.
fn deserialize_static_objects(blob: &mut BlobReader<'_>) -> Result<(), SerializationError> {
    let obj_version = blob.read_u8("static_object.version")?;
    if obj_version != 0 {
        return Err(blob.error(
            "static_object.version",
            format!("unsupported static_object.version {obj_version}"),
        ));
    }

    let count = blob.read_u16("static_object.count")?;
    for _ in 0..count {
        let _ = blob.read_u8("static_object.type")?;
        let _ = blob.read_s32("static_object.x")?;
        let _ = blob.read_s32("static_object.y")?;
        let _ = blob.read_s32("static_object.z")?;

        let data_size = blob.read_u16("static_object.data_size")?;
        blob.skip(data_size as usize, "static_object.data")?;
    }

    Ok(())
}

fn deserialize_node_timers(blob: &mut BlobReader<'_>) -> Result<(), SerializationError> {
    let _ = blob.read_u8("timer.len")?;

    let count = blob.read_u16("timer.count")?;
    for _ in 0..count {
        let _ = blob.read_u16("timer.pos")?;
        let _ = blob.read_s32("timer.timeout")?;
        let _ = blob.read_s32("timer.elapsed")?;
    }

    Ok(())
}

fn verify_all_data_consumed(blob: &BlobReader<'_>) -> Result<(), SerializationError> {
    if blob.remaining() > 0 {
        let tail = blob.remaining_bytes();
        let preview = &tail[..tail.len().min(128)];
        return Err(blob.error(
            "trailer",
            format!("left over data after deserialization, sample: {}", to_hex(preview)),
        ));
    }
    Ok(())
}
