//! The `Build` aggregate and the Path of Building XML parser.

use super::code::decode_import_code;
use super::item::{parse_item_text, ItemRecord};
use super::xml::{parse_document, XmlElement, XmlNode};
use crate::error::{Error, Result};
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, trace};

const DEFAULT_BUILD_NAME: &str = "Unnamed Build";
const DEFAULT_ITEM_SET: &str = "1";
const EMPTY_SLOT_ID: &str = "0";

/// Slots whose name contains any of these are not equipment
const EXCLUDED_SLOT_MARKERS: [&str; 2] = ["Abyssal", "Swap"];

/// Which game a build belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Game {
    /// Path of Exile 1
    Poe1,
    /// Path of Exile 2
    Poe2,
}

impl Game {
    /// Human-readable game name
    pub fn display_name(self) -> &'static str {
        match self {
            Game::Poe1 => "Path of Exile 1",
            Game::Poe2 => "Path of Exile 2",
        }
    }

    /// Short identifier, as serialized
    pub fn as_str(self) -> &'static str {
        match self {
            Game::Poe1 => "poe1",
            Game::Poe2 => "poe2",
        }
    }
}

impl fmt::Display for Game {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Allocated passives of the active tree spec
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PassiveTree {
    /// `treeVersion`, e.g. `3_25`
    pub tree_version: Option<String>,
    /// Spec title as shown in the PoB tree dropdown
    pub title: Option<String>,
    /// Allocated node ids, in the order PoB wrote them
    pub nodes: Vec<u32>,
}

/// A gem inside a skill group
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Gem {
    /// Display name (`nameSpec`)
    pub name: String,
    /// Gem level
    pub level: Option<u32>,
    /// Gem quality
    pub quality: Option<u32>,
    /// Whether the gem is switched on
    pub enabled: bool,
}

/// One linked group of gems
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkillGroup {
    /// User label, if any
    pub label: Option<String>,
    /// Item slot the gems are socketed in
    pub slot: Option<String>,
    /// Whether the group is switched on
    pub enabled: bool,
    /// Gems in socket order
    pub gems: Vec<Gem>,
}

/// A character build parsed from a Path of Building export
#[derive(Debug, Clone, Serialize)]
pub struct Build {
    /// Game the build was exported for
    pub game: Game,
    /// `buildName`, or "Unnamed Build"
    pub name: String,
    /// Base class, e.g. `Witch`
    pub character_class: String,
    /// Character level
    pub level: i64,
    /// Ascendancy class
    pub ascendancy: Option<String>,
    /// Equipped item per slot name
    pub items: IndexMap<String, ItemRecord>,
    /// Active passive tree spec
    pub passive_tree: Option<PassiveTree>,
    /// Skill groups of the active skill set
    pub skills: Option<Vec<SkillGroup>>,
    /// Where the build came from; always `pob`
    pub source: &'static str,
    /// The whole export, structurally mirrored
    pub raw_xml_snapshot: XmlNode,
}

impl Build {
    /// Item equipped in `slot`, e.g. `"Weapon 1"` or `"Amulet"`
    pub fn item_in_slot(&self, slot: &str) -> Option<&ItemRecord> {
        self.items.get(slot)
    }
}

/// Parse a Path of Building XML export
pub fn parse_pob_xml(xml: &str, game: Game) -> Result<Build> {
    let root = parse_document(xml)?;

    let build = root.child("Build").ok_or(Error::MissingBuildElement)?;
    let character_class = build
        .non_empty_attr("className")
        .ok_or(Error::MissingAttribute("className"))?;
    let level_raw = build
        .non_empty_attr("level")
        .ok_or(Error::MissingAttribute("level"))?;
    let level = level_raw
        .trim()
        .parse::<i64>()
        .map_err(|_| Error::InvalidLevel(level_raw.to_string()))?;

    let items = extract_items(&root);
    debug!(
        class = character_class,
        level,
        slots = items.len(),
        "Parsed PoB build"
    );

    Ok(Build {
        game,
        name: build
            .non_empty_attr("buildName")
            .unwrap_or(DEFAULT_BUILD_NAME)
            .to_string(),
        character_class: character_class.to_string(),
        level,
        ascendancy: build.non_empty_attr("ascendClassName").map(str::to_string),
        items,
        passive_tree: extract_passive_tree(&root),
        skills: extract_skills(&root),
        source: "pob",
        raw_xml_snapshot: XmlNode::from(&root),
    })
}

/// Decode an import code and parse the XML inside it
pub fn parse_pob_code(import_code: &str, game: Game) -> Result<Build> {
    let xml = decode_import_code(import_code)?;
    parse_pob_xml(&xml, game)
}

/// Equipped items of the active item set, keyed by slot name
pub fn extract_items(root: &XmlElement) -> IndexMap<String, ItemRecord> {
    let mut slots = IndexMap::new();
    let Some(items) = root.child("Items") else {
        return slots;
    };

    let mut by_id: HashMap<&str, ItemRecord> = HashMap::new();
    for item in items.children_named("Item") {
        match item.non_empty_attr("id") {
            Some(id) if !item.text().trim().is_empty() => {
                by_id.insert(id, parse_item_text(item.text()));
            }
            _ => {}
        }
    }
    debug!("Parsed {} items", by_id.len());

    let active = items.attr("activeItemSet").unwrap_or(DEFAULT_ITEM_SET);
    let Some(item_set) =
        root.find_descendant(|e| e.tag == "ItemSet" && e.attr("id") == Some(active))
    else {
        debug!("No item set with id {active}");
        return slots;
    };

    for slot in item_set.children_named("Slot") {
        let name = slot.attr("name").unwrap_or("");
        let item_id = slot.attr("itemId").unwrap_or(EMPTY_SLOT_ID);

        if item_id == EMPTY_SLOT_ID {
            continue;
        }
        if EXCLUDED_SLOT_MARKERS.iter().any(|m| name.contains(m)) {
            trace!("Skipping slot {name}");
            continue;
        }
        match by_id.get(item_id) {
            Some(item) => {
                slots.insert(name.to_string(), item.clone());
            }
            None => trace!("Slot {name} references unknown item {item_id}"),
        }
    }

    slots
}

fn extract_passive_tree(root: &XmlElement) -> Option<PassiveTree> {
    let tree = root.child("Tree")?;
    let spec = select_active_spec(tree)?;

    let nodes = spec
        .attr("nodes")
        .unwrap_or("")
        .split(',')
        .filter_map(|node| node.trim().parse().ok())
        .collect();

    Some(PassiveTree {
        tree_version: spec.non_empty_attr("treeVersion").map(str::to_string),
        title: spec.non_empty_attr("title").map(str::to_string),
        nodes,
    })
}

fn extract_skills(root: &XmlElement) -> Option<Vec<SkillGroup>> {
    let skills = root.child("Skills")?;
    // older exports put <Skill> directly under <Skills>
    let holder = select_active_skill_set(skills).unwrap_or(skills);

    Some(holder.children_named("Skill").map(skill_group).collect())
}

fn skill_group(skill: &XmlElement) -> SkillGroup {
    SkillGroup {
        label: skill.non_empty_attr("label").map(str::to_string),
        slot: skill.non_empty_attr("slot").map(str::to_string),
        enabled: flag(skill, "enabled"),
        gems: skill
            .children_named("Gem")
            .map(|gem| Gem {
                name: gem
                    .non_empty_attr("nameSpec")
                    .or_else(|| gem.non_empty_attr("skillId"))
                    .unwrap_or("")
                    .to_string(),
                level: number(gem, "level"),
                quality: number(gem, "quality"),
                enabled: flag(gem, "enabled"),
            })
            .collect(),
    }
}

/// The `<Spec>` at the 1-based `activeSpec` position, else the first one
fn select_active_spec(tree: &XmlElement) -> Option<&XmlElement> {
    tree.attr("activeSpec")
        .and_then(|a| a.trim().parse::<usize>().ok())
        .and_then(|n| n.checked_sub(1))
        .and_then(|i| tree.children_named("Spec").nth(i))
        .or_else(|| tree.child("Spec"))
}

/// The `<SkillSet>` whose id is `activeSkillSet`, else the first one
fn select_active_skill_set(skills: &XmlElement) -> Option<&XmlElement> {
    let active = skills.attr("activeSkillSet");
    skills
        .children_named("SkillSet")
        .find(|set| active.is_some() && set.attr("id") == active)
        .or_else(|| skills.child("SkillSet"))
}

/// Boolean attribute; missing means true, as PoB omits defaults
fn flag(element: &XmlElement, name: &str) -> bool {
    element.attr(name).map_or(true, |v| v != "false")
}

fn number(element: &XmlElement, name: &str) -> Option<u32> {
    element.attr(name).and_then(|v| v.trim().parse().ok())
}
