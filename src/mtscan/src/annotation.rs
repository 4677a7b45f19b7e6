//! Tiny per-block and per-node-name analytic records.

/// Per-block annotation, one per populated block coordinate.
///
/// Keep this struct as small as possible: storing 100M of these in the
/// sharded map costs roughly 60 bytes per entry including container
/// overhead, and the map lives for the whole run.
#[derive(Clone, Copy, Debug, Default)]
pub struct MapBlockAnnotation {
    /// The global content id all 4096 nodes share, or 0 when the block
    /// holds more than one content.
    pub uniform: u16,

    /// The block contains at least one node that was most likely
    /// placed by a player rather than by mapgen.
    pub anthropocene: bool,

    /// Some block within the preserve radius is anthropocene, so this
    /// block must survive pruning as well.
    pub preserve: bool,
}

const _: () = assert!(std::mem::size_of::<MapBlockAnnotation>() == 4);

/// Interning payload for node names.
#[derive(Clone, Copy, Debug)]
pub struct NodeNameInfo {
    /// Whether the name filter classified this name as player-placed.
    pub anthropocene: bool,
}
