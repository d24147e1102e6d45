//! Path of Building item text.
//!
//! Each `<Item>` element carries a block of lines in the in-game copy format:
//!
//! ```text
//! Rarity: UNIQUE
//! Foulborn Matua Tupuna
//! Tarnished Spirit Shield
//! Energy Shield: 33
//! Implicits: 1
//! +20 to maximum Energy Shield
//! +45% to Fire Resistance
//! Corrupted
//! ```
//!
//! The header is positional (rarity, then name and base type), so the parser
//! is a single forward pass with no lookahead. It never fails; lines it does
//! not recognise end up as properties or explicit mods.

use indexmap::IndexMap;
use serde::Serialize;

/// Properties stored under their own key; other `key: value` lines are kept too
pub const KNOWN_PROPERTIES: [&str; 6] = [
    "Energy Shield",
    "Armour",
    "Evasion",
    "Quality",
    "Item Level",
    "LevelReq",
];

const RARITY_PREFIX: &str = "Rarity:";
const IMPLICITS_PREFIX: &str = "Implicits:";
const CORRUPTED_MARKER: &str = "Corrupted";
const SOCKETS_KEY: &str = "Sockets";
const UNIQUE_ID_KEY: &str = "Unique ID";

/// One parsed item
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ItemRecord {
    /// `NORMAL`, `MAGIC`, `RARE`, `UNIQUE`, ... as written
    pub rarity: Option<String>,
    /// Only unique and rare items carry a name line
    pub name: Option<String>,
    /// Base item type
    pub base_type: Option<String>,
    /// Set by a bare `Corrupted` line
    pub corrupted: bool,
    /// Socket string, e.g. `B-B-R G`
    pub sockets: Option<String>,
    /// `Unique ID:` line
    pub unique_id: Option<String>,
    /// Remaining `key: value` lines, in order of appearance
    pub properties: IndexMap<String, String>,
    /// The lines counted by `Implicits: N`
    pub implicit_mods: Vec<String>,
    /// All other modifier lines
    pub explicit_mods: Vec<String>,
}

impl ItemRecord {
    /// Returns true for unique items
    pub fn is_unique(&self) -> bool {
        self.rarity.as_deref() == Some("UNIQUE")
    }

    /// Name if present, else base type
    pub fn display_name(&self) -> Option<&str> {
        self.name.as_deref().or(self.base_type.as_deref())
    }

    fn apply_property(&mut self, key: &str, value: &str) {
        match key {
            SOCKETS_KEY => self.sockets = Some(value.to_string()),
            UNIQUE_ID_KEY => self.unique_id = Some(value.to_string()),
            // known and unknown keys alike land in the property map
            _ => {
                self.properties.insert(key.to_string(), value.to_string());
            }
        }
    }
}

/// Parse the text of one `<Item>` element
pub fn parse_item_text(item_text: &str) -> ItemRecord {
    let mut item = ItemRecord::default();
    let mut lines = item_text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .peekable();

    if let Some(rarity) = lines
        .peek()
        .and_then(|line| line.strip_prefix(RARITY_PREFIX))
    {
        item.rarity = Some(rarity.trim().to_string());
        lines.next();
    }

    let body: Vec<&str> = lines.collect();
    let mut body = body.as_slice();

    match (item.rarity.as_deref(), body) {
        (Some("UNIQUE" | "RARE"), [name, base_type, rest @ ..]) => {
            item.name = Some(name.to_string());
            item.base_type = Some(base_type.to_string());
            body = rest;
        }
        // other rarities, or a named item missing its second header line
        (_, [base_type, rest @ ..]) => {
            item.base_type = Some(base_type.to_string());
            body = rest;
        }
        (_, []) => {}
    }

    let mut in_implicits = false;
    let mut remaining: i64 = 0;

    for &line in body {
        if let Some(count) = line.strip_prefix(IMPLICITS_PREFIX) {
            in_implicits = true;
            remaining = count.trim().parse().unwrap_or(0);
            continue;
        }

        if line == CORRUPTED_MARKER {
            item.corrupted = true;
            continue;
        }

        if line.contains(": ") {
            if let Some((key, value)) = line.split_once(':') {
                item.apply_property(key.trim(), value.trim());
            }
            continue;
        }

        if in_implicits && remaining > 0 {
            item.implicit_mods.push(line.to_string());
            remaining -= 1;
            if remaining == 0 {
                in_implicits = false;
            }
        } else {
            item.explicit_mods.push(line.to_string());
        }
    }

    item
}
