//! A single voxel and its optional metadata and inventory.

use mtscan_utils::{to_hex, BlobReader, SerializationError};

use crate::inventory::Inventory;

/// One key/value entry from a node's metadata table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetadataVar {
    pub key: String,
    pub value: String,
    pub private: bool,
}

/// A decoded node.
///
/// `param0` holds a block-local content id while the block is being
/// decoded and the globally interned content id afterwards.
#[derive(Clone, Debug, Default)]
pub struct Node {
    pub param0: u16,
    pub param1: u8,
    pub param2: u8,
    metadata: Vec<MetadataVar>,
    inventory: Inventory,
}

impl Node {
    pub fn metadata(&self) -> &[MetadataVar] {
        &self.metadata
    }

    pub fn inventory(&self) -> &Inventory {
        &self.inventory
    }

    /// Moves the inventory out, leaving an empty one behind.
    pub fn take_inventory(&mut self) -> Inventory {
        std::mem::take(&mut self.inventory)
    }

    /// First metadata value stored under `key`.
    ///
    /// Metadata tables are almost always tiny, so this is a linear scan.
    pub fn meta(&self, key: &str) -> Option<&str> {
        self.metadata
            .iter()
            .find(|var| var.key == key)
            .map(|var| var.value.as_str())
    }

    /// The owning actor recorded in metadata. Most nodes use `owner`,
    /// bone piles use `_owner`.
    pub fn owner(&self) -> Option<&str> {
        self.metadata
            .iter()
            .find(|var| var.key == "owner" || var.key == "_owner")
            .map(|var| var.value.as_str())
    }

    /// Parses this node's metadata table followed by its inventory.
    pub(crate) fn deserialize_metadata(
        &mut self,
        blob: &mut BlobReader<'_>,
    ) -> Result<(), SerializationError> {
        let num_vars = blob.read_u32("meta.num_vars")?;

        for _ in 0..num_vars {
            let key_len = blob.read_u16("meta.key_len")?;
            let key = blob.read_str(key_len as usize, "meta.key")?;

            let val_len = blob.read_u32("meta.val_len")?;
            let value = blob.read_str(val_len as usize, "meta.val")?;

            let private = blob.read_u8("meta.private")?;
            if private > 1 {
                return Err(blob.error(
                    "meta.private",
                    format!("unexpected flag value 0x{}", to_hex(&[private])),
                ));
            }

            self.metadata.push(MetadataVar {
                key,
                value,
                private: private != 0,
            });
        }

        self.inventory = Inventory::deserialize(blob)?;
        Ok(())
    }
}
