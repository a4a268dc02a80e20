//! Free text notes attached to the running tracking. `#label` markers inside a note are turned
//! into tag references, see [tags::extract_tags].

pub mod tags;

use std::{collections::HashMap, fmt::Display};

use serde::{Deserialize, Serialize};

use tags::{extract_tags, strip_markers};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagKey(pub String);

impl TagKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for TagKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub key: TagKey,
    pub label: String,
}

/// Label to key lookup. Built once from the tags of a remote service connection.
#[derive(Debug, Clone, Default)]
pub struct TagTable {
    by_label: HashMap<String, TagKey>,
}

impl TagTable {
    pub fn resolve(&self, label: &str) -> Option<&TagKey> {
        self.by_label.get(label)
    }

    pub fn len(&self) -> usize {
        self.by_label.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_label.is_empty()
    }
}

impl FromIterator<Tag> for TagTable {
    fn from_iter<T: IntoIterator<Item = Tag>>(iter: T) -> Self {
        Self {
            by_label: iter.into_iter().map(|v| (v.label, v.key)).collect(),
        }
    }
}

/// A tag reference inside a note. `start..end` is a character range of the note text with
/// all `#` markers removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteTagSpan {
    pub start: usize,
    pub end: usize,
    pub tag_key: TagKey,
}

/// A note as it is stored remotely: text without markers plus the resolved tag spans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Note {
    pub text: String,
    pub tags: Vec<NoteTagSpan>,
}

impl Note {
    pub fn parse(text: &str, table: &TagTable) -> Self {
        Self {
            text: strip_markers(text),
            tags: extract_tags(text, table),
        }
    }
}
