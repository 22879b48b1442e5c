//! Dictionary lookups: human names for tag/num coordinates.
//!
//! XML parsing is a front-end concern; here the dictionary is the parsed
//! result, a two-way map between names and [`DictEntry`] values. An entry is
//! one of three kinds: an exact tag/num pair (optionally qualified by a
//! parent chain), a tag with no num, or an inclusive tag range. Name lookup
//! for a structure tries those kinds in priority order: exact tag/num
//! first, then tag-only, then the first matching range.

use std::collections::HashMap;

use serde::Serialize;

use crate::EvioError;

/// What a dictionary entry keys on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DictEntryType {
    TagNum,
    TagOnly,
    TagRange,
}

/// One dictionary entry: tag, optional num, optional tag range, optional
/// parent qualification.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct DictEntry {
    pub tag: u16,
    pub num: Option<u8>,
    /// Inclusive range end; 0 (or `tag` itself) means no range.
    pub tag_end: u16,
    /// Hierarchical entries qualify on their parent structure.
    pub parent: Option<Box<DictEntry>>,
}

impl DictEntry {
    pub fn tag_num(tag: u16, num: u8) -> Self {
        DictEntry {
            tag,
            num: Some(num),
            tag_end: 0,
            parent: None,
        }
    }

    pub fn tag_only(tag: u16) -> Self {
        DictEntry {
            tag,
            num: None,
            tag_end: 0,
            parent: None,
        }
    }

    pub fn tag_range(tag: u16, tag_end: u16) -> Self {
        DictEntry {
            tag,
            num: None,
            tag_end,
            parent: None,
        }
    }

    pub fn with_parent(mut self, parent: DictEntry) -> Self {
        self.parent = Some(Box::new(parent));
        self
    }

    pub fn entry_type(&self) -> DictEntryType {
        if self.tag_end > self.tag {
            DictEntryType::TagRange
        } else if self.num.is_some() {
            DictEntryType::TagNum
        } else {
            DictEntryType::TagOnly
        }
    }

    /// True when `tag` falls in this entry's inclusive range.
    pub fn in_range(&self, tag: u16) -> bool {
        self.tag <= tag && tag <= self.tag_end
    }
}

/// Two-way name/entry dictionary with the evio match rules.
#[derive(Debug, Default, Clone)]
pub struct EvioDictionary {
    xml: Option<String>,
    name_to_entry: HashMap<String, DictEntry>,
    tag_num_to_name: HashMap<DictEntry, String>,
    tag_only_to_name: HashMap<u16, String>,
    /// Range entries in insertion order; the first containing range wins.
    ranges: Vec<(DictEntry, String)>,
}

impl EvioDictionary {
    pub fn new() -> Self {
        EvioDictionary::default()
    }

    /// Keep the original XML text alongside the parsed entries.
    pub fn with_xml(xml: &str) -> Self {
        EvioDictionary {
            xml: Some(xml.to_string()),
            ..EvioDictionary::default()
        }
    }

    pub fn xml(&self) -> Option<&str> {
        self.xml.as_deref()
    }

    pub fn len(&self) -> usize {
        self.name_to_entry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.name_to_entry.is_empty()
    }

    /// Register `name` for `entry`. Duplicate names (or duplicate tag/num
    /// coordinates) are rejected.
    pub fn add_entry(&mut self, name: &str, entry: DictEntry) -> Result<(), EvioError> {
        if self.name_to_entry.contains_key(name) {
            return Err(EvioError::InvalidData(format!(
                "duplicate dictionary name \"{}\"",
                name
            )));
        }
        match entry.entry_type() {
            DictEntryType::TagNum => {
                if self.tag_num_to_name.contains_key(&entry) {
                    return Err(EvioError::InvalidData(format!(
                        "duplicate dictionary entry tag={} num={:?}",
                        entry.tag, entry.num
                    )));
                }
                self.tag_num_to_name.insert(entry.clone(), name.to_string());
            }
            DictEntryType::TagOnly => {
                if self.tag_only_to_name.contains_key(&entry.tag) {
                    return Err(EvioError::InvalidData(format!(
                        "duplicate dictionary entry tag={}",
                        entry.tag
                    )));
                }
                self.tag_only_to_name.insert(entry.tag, name.to_string());
            }
            DictEntryType::TagRange => {
                self.ranges.push((entry.clone(), name.to_string()));
            }
        }
        self.name_to_entry.insert(name.to_string(), entry);
        Ok(())
    }

    /// Exact name lookup.
    pub fn entry(&self, name: &str) -> Option<&DictEntry> {
        self.name_to_entry.get(name)
    }

    /// Tag/num coordinates for a name, when it names a tag/num entry.
    pub fn tag_num_of(&self, name: &str) -> Option<(u16, Option<u8>)> {
        self.name_to_entry.get(name).map(|e| (e.tag, e.num))
    }

    /// Name for a structure's coordinates, per the match rules:
    /// exact tag/num, then tag-only, then the first containing range.
    pub fn name(&self, tag: u16, num: u8) -> Option<&str> {
        self.name_qualified(tag, num, None)
    }

    /// The name/entry map as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, EvioError> {
        serde_json::to_string_pretty(&self.name_to_entry)
            .map_err(|e| EvioError::Io(format!("cannot serialize dictionary: {}", e)))
    }

    /// Like [`name`](Self::name) but trying a parent-qualified exact match
    /// first.
    pub fn name_qualified(&self, tag: u16, num: u8, parent: Option<&DictEntry>) -> Option<&str> {
        if let Some(parent) = parent {
            let probe = DictEntry::tag_num(tag, num).with_parent(parent.clone());
            if let Some(name) = self.tag_num_to_name.get(&probe) {
                return Some(name);
            }
        }
        let probe = DictEntry::tag_num(tag, num);
        if let Some(name) = self.tag_num_to_name.get(&probe) {
            return Some(name);
        }
        if let Some(name) = self.tag_only_to_name.get(&tag) {
            return Some(name);
        }
        self.ranges
            .iter()
            .find(|(entry, _)| entry.in_range(tag))
            .map(|(_, name)| name.as_str())
    }
}
