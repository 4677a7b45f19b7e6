//! The line-oriented inventory serialization inside node metadata.
//!
//! See `doc/world_format.txt` in the engine source. The grammar is a
//! sequence of `List <name> <size>` sections, each holding `Item <str>`
//! and `Empty` slot lines, closed by `EndInventoryList`, with the whole
//! table closed by `EndInventory`.

use indexmap::IndexMap;

use mtscan_utils::{BlobReader, SerializationError};

use crate::minegeld::parse_minegeld;

// Item strings beyond this length skip token validation and are taken
// verbatim. Crated machinery can serialize its entire content into one
// item string.
const HUGE_ITEM_LEN: usize = 4096;

/// All inventory lists of one node, in serialization order.
///
/// `Empty` slots are kept as empty strings so that item positions
/// stay stable.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Inventory {
    lists: IndexMap<String, Vec<String>>,
}

impl Inventory {
    /// Consumes inventory lines from `blob` up to and including the
    /// `EndInventory` terminator.
    pub fn deserialize(blob: &mut BlobReader<'_>) -> Result<Self, SerializationError> {
        let mut lists = IndexMap::new();
        let mut list_name = String::new();
        let mut current: Vec<String> = Vec::new();

        loop {
            let line = blob.read_line("inventory")?;

            if let Some(rest) = line.strip_prefix("List ") {
                let mut parts = rest.split_whitespace();
                match (parts.next(), parts.next(), parts.next()) {
                    (Some(name), Some(size), None) if size.bytes().all(|b| b.is_ascii_digit()) => {
                        // The declared size is not needed; slots are counted
                        // from the Item/Empty lines.
                        list_name = name.to_owned();
                        current.clear();
                        continue;
                    }
                    _ => return Err(blob.error("inventory", format!("junk string? {line}"))),
                }
            }

            if line.starts_with("Width ") {
                continue;
            }

            if line.len() > HUGE_ITEM_LEN && line.starts_with("Item ") {
                current.push(line[5..].to_owned());
                continue;
            }

            if let Some(item) = line.strip_prefix("Item ") {
                if list_name.is_empty() {
                    return Err(blob.error("inventory", "Item before any List"));
                }
                current.push(item.to_owned());
                continue;
            }

            if line == "Empty" {
                if list_name.is_empty() {
                    return Err(blob.error("inventory", "Empty before any List"));
                }
                current.push(String::new());
                continue;
            }

            if line == "EndInventoryList" {
                lists.insert(std::mem::take(&mut list_name), std::mem::take(&mut current));
                continue;
            }

            if line == "EndInventory" {
                break;
            }

            return Err(blob.error("inventory", format!("junk string? {line}")));
        }

        Ok(Self { lists })
    }

    pub fn lists(&self) -> &IndexMap<String, Vec<String>> {
        &self.lists
    }

    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }

    /// Sum of [`parse_minegeld`] over every item in every list.
    pub fn total_minegeld(&self) -> u64 {
        self.lists
            .values()
            .flatten()
            .map(|item| parse_minegeld(item))
            .sum()
    }
}
