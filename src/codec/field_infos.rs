//! Per-field indexing options.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TesseraError};

/// What the inverted index records for a field, from least to most.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum IndexOptions {
    /// Only document ids.
    Docs,
    /// Document ids and term frequencies.
    DocsAndFreqs,
    /// Document ids, frequencies and positions.
    DocsAndFreqsAndPositions,
    /// Document ids, frequencies, positions and character offsets.
    DocsAndFreqsAndPositionsAndOffsets,
}

impl IndexOptions {
    pub fn has_freqs(self) -> bool {
        self >= IndexOptions::DocsAndFreqs
    }

    pub fn has_positions(self) -> bool {
        self >= IndexOptions::DocsAndFreqsAndPositions
    }

    pub fn has_offsets(self) -> bool {
        self >= IndexOptions::DocsAndFreqsAndPositionsAndOffsets
    }
}

/// Indexing metadata for one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldInfo {
    pub name: String,
    pub number: u32,
    pub index_options: IndexOptions,
    pub has_payloads: bool,
}

impl FieldInfo {
    pub fn new(name: impl Into<String>, number: u32, index_options: IndexOptions) -> Self {
        FieldInfo {
            name: name.into(),
            number,
            index_options,
            has_payloads: false,
        }
    }

    pub fn with_payloads(mut self, has_payloads: bool) -> Self {
        self.has_payloads = has_payloads;
        self
    }

    pub fn has_freqs(&self) -> bool {
        self.index_options.has_freqs()
    }

    pub fn has_positions(&self) -> bool {
        self.index_options.has_positions()
    }

    pub fn has_offsets(&self) -> bool {
        self.index_options.has_offsets()
    }
}

/// The fields of one segment, with aggregate flags deciding which postings
/// streams the segment needs.
#[derive(Debug, Clone, Default)]
pub struct FieldInfos {
    fields: Vec<FieldInfo>,
    by_name: AHashMap<String, usize>,
    has_freq: bool,
    has_prox: bool,
    has_payloads: bool,
    has_offsets: bool,
}

impl FieldInfos {
    pub fn new(fields: Vec<FieldInfo>) -> Result<Self> {
        let mut by_name = AHashMap::with_capacity(fields.len());
        let mut numbers = AHashMap::with_capacity(fields.len());
        let mut infos = FieldInfos::default();

        for (idx, field) in fields.iter().enumerate() {
            if field.has_payloads && !field.has_positions() {
                return Err(TesseraError::invalid_argument(format!(
                    "field \"{}\" has payloads but does not index positions",
                    field.name
                )));
            }
            if by_name.insert(field.name.clone(), idx).is_some() {
                return Err(TesseraError::invalid_argument(format!(
                    "duplicate field name \"{}\"",
                    field.name
                )));
            }
            if let Some(other) = numbers.insert(field.number, idx) {
                return Err(TesseraError::invalid_argument(format!(
                    "field number {} is shared by \"{}\" and \"{}\"",
                    field.number, fields[other].name, field.name
                )));
            }
            infos.has_freq |= field.has_freqs();
            infos.has_prox |= field.has_positions();
            infos.has_payloads |= field.has_payloads;
            infos.has_offsets |= field.has_offsets();
        }

        infos.fields = fields;
        infos.by_name = by_name;
        Ok(infos)
    }

    pub fn field(&self, name: &str) -> Option<&FieldInfo> {
        self.by_name.get(name).map(|&idx| &self.fields[idx])
    }

    pub fn field_by_number(&self, number: u32) -> Option<&FieldInfo> {
        self.fields.iter().find(|f| f.number == number)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldInfo> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Any field records frequencies.
    pub fn has_freq(&self) -> bool {
        self.has_freq
    }

    /// Any field records positions.
    pub fn has_prox(&self) -> bool {
        self.has_prox
    }

    pub fn has_payloads(&self) -> bool {
        self.has_payloads
    }

    pub fn has_offsets(&self) -> bool {
        self.has_offsets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_flags() {
        let infos = FieldInfos::new(vec![
            FieldInfo::new("id", 0, IndexOptions::Docs),
            FieldInfo::new("body", 1, IndexOptions::DocsAndFreqsAndPositions),
        ])
        .unwrap();
        assert!(infos.has_freq());
        assert!(infos.has_prox());
        assert!(!infos.has_payloads());
        assert!(!infos.has_offsets());
        assert_eq!(infos.field("body").unwrap().number, 1);
        assert_eq!(infos.field_by_number(0).unwrap().name, "id");
        assert!(infos.field("missing").is_none());
    }

    #[test]
    fn test_rejects_inconsistent_fields() {
        let dup = FieldInfos::new(vec![
            FieldInfo::new("a", 0, IndexOptions::Docs),
            FieldInfo::new("a", 1, IndexOptions::Docs),
        ]);
        assert!(dup.is_err());

        let payload_without_positions = FieldInfos::new(vec![
            FieldInfo::new("a", 0, IndexOptions::DocsAndFreqs).with_payloads(true),
        ]);
        assert!(payload_without_positions.is_err());
    }

    #[test]
    fn test_index_options_order() {
        assert!(!IndexOptions::Docs.has_freqs());
        assert!(IndexOptions::DocsAndFreqs.has_freqs());
        assert!(!IndexOptions::DocsAndFreqs.has_positions());
        assert!(IndexOptions::DocsAndFreqsAndPositionsAndOffsets.has_offsets());
    }
}
