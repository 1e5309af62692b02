//! Dictionary Store - local, deduplicated copy of approved catalog column descriptions
//!
//! Records are indexed twice:
//! - by catalog id (source of truth, one record per id)
//! - by name (derived, several records may share a column name)
//!
//! The whole dictionary is loaded from a JSON snapshot on open and rewritten in full on save.

use crate::error::{DictionaryError, Result};
use crate::fuzzy_matcher::NameMatcher;
use crate::record::{Normalizer, Record, RecordId, DEFAULT_BASE_URI};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Default location of the snapshot file.
pub const DEFAULT_DICTIONARY_PATH: &str = "dictionary.json";

/// Where the dictionary lives and how catalog links are resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DictionaryConfig {
    pub path: PathBuf,
    pub base_uri: String,
}

impl Default for DictionaryConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_DICTIONARY_PATH),
            base_uri: DEFAULT_BASE_URI.to_string(),
        }
    }
}

impl DictionaryConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn with_base_uri(mut self, base_uri: impl Into<String>) -> Self {
        self.base_uri = base_uri.into();
        self
    }
}

/// Persisted form of the dictionary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    /// Empty string on disk until the first successful save
    #[serde(with = "last_update_format")]
    pub last_update: Option<DateTime<Utc>>,
    pub data: Vec<Record>,
}

#[derive(Serialize)]
struct SnapshotView<'a> {
    #[serde(with = "last_update_format")]
    last_update: Option<DateTime<Utc>>,
    data: Vec<&'a Record>,
}

/// `last_update` is written as RFC 3339. Reads also accept an offset-less ISO 8601 timestamp,
/// taken as UTC, since older snapshots were written without one.
mod last_update_format {
    use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(ts) => serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Micros, false)),
            None => serializer.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        if raw.is_empty() {
            return Ok(None);
        }
        parse(&raw).map(Some).map_err(serde::de::Error::custom)
    }

    pub(super) fn parse(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
        match DateTime::parse_from_rfc3339(raw) {
            Ok(ts) => Ok(ts.with_timezone(&Utc)),
            Err(err) => ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
                .iter()
                .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
                .map(|naive| naive.and_utc())
                .ok_or(err),
        }
    }
}

/// How an upsert changed the dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Inserted,
    Updated,
    Unchanged,
}

/// A fuzzy lookup hit: the best matching name, its score and that name's records.
#[derive(Debug, Clone)]
pub struct FuzzyMatch<'a> {
    pub name: &'a str,
    pub score: f64,
    pub records: Vec<&'a Record>,
}

pub struct Dictionary {
    path: PathBuf,
    normalizer: Normalizer,
    matcher: NameMatcher,
    last_update: Option<DateTime<Utc>>,
    /// Records by catalog id
    index: IndexMap<RecordId, Record>,
    /// Record ids grouped by name, in insertion order
    name_index: IndexMap<String, Vec<RecordId>>,
    new_record_count: usize,
    updated_record_count: usize,
}

impl Dictionary {
    /// Open the dictionary at `config.path`, creating an empty snapshot if none exists.
    pub fn open(config: DictionaryConfig) -> Result<Self> {
        let normalizer = Normalizer::new(&config.base_uri)?;
        let path = config.path;

        if !path.exists() {
            info!("No dictionary at {}, creating an empty one", path.display());
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            write_snapshot(&path, &Snapshot::default())?;
        }

        let snapshot = read_snapshot(&path)?;

        let mut dictionary = Self {
            path,
            normalizer,
            matcher: NameMatcher::default(),
            last_update: snapshot.last_update,
            index: IndexMap::with_capacity(snapshot.data.len()),
            name_index: IndexMap::new(),
            new_record_count: 0,
            updated_record_count: 0,
        };

        for record in snapshot.data {
            dictionary.upsert(record);
        }

        info!(
            "Loaded {} records ({} names) from {}",
            dictionary.index.len(),
            dictionary.name_index.len(),
            dictionary.path.display()
        );

        Ok(dictionary)
    }

    /// Use a different similarity scorer for fuzzy lookups
    pub fn with_matcher(mut self, matcher: NameMatcher) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        self.last_update
    }

    pub fn new_record_count(&self) -> usize {
        self.new_record_count
    }

    pub fn updated_record_count(&self) -> usize {
        self.updated_record_count
    }

    /// True when records were added or updated since open
    pub fn has_changes(&self) -> bool {
        self.new_record_count > 0 || self.updated_record_count > 0
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// All records, in id index order
    pub fn records(&self) -> impl ExactSizeIterator<Item = &Record> + '_ {
        self.index.values()
    }

    pub fn get(&self, id: &RecordId) -> Option<&Record> {
        self.index.get(id)
    }

    /// Distinct record names, in first-seen order
    pub fn names(&self) -> impl ExactSizeIterator<Item = &str> + '_ {
        self.name_index.keys().map(String::as_str)
    }

    /// Normalize a raw catalog payload and upsert it.
    ///
    /// Fails with [`DictionaryError::MalformedRecord`] when a required field is missing;
    /// the dictionary is left untouched in that case.
    pub fn add(&mut self, raw: &Value) -> Result<()> {
        let record = self.normalizer.normalize(raw)?;
        self.add_record(record);
        Ok(())
    }

    /// Upsert an already normalized record and count the change.
    pub fn add_record(&mut self, record: Record) -> AddOutcome {
        let outcome = self.upsert(record);
        match outcome {
            AddOutcome::Inserted => self.new_record_count += 1,
            AddOutcome::Updated => self.updated_record_count += 1,
            AddOutcome::Unchanged => {}
        }
        outcome
    }

    fn upsert(&mut self, record: Record) -> AddOutcome {
        match self.index.get_mut(&record.id) {
            None => {
                self.name_index
                    .entry(record.name.clone())
                    .or_default()
                    .push(record.id.clone());
                self.index.insert(record.id.clone(), record);
                AddOutcome::Inserted
            }
            Some(existing) if *existing == record => AddOutcome::Unchanged,
            Some(existing) => {
                if existing.name != record.name {
                    debug!(
                        "Record {} renamed from '{}' to '{}'",
                        record.id, existing.name, record.name
                    );
                    unlink(&mut self.name_index, &existing.name, &record.id);
                    self.name_index
                        .entry(record.name.clone())
                        .or_default()
                        .push(record.id.clone());
                }
                *existing = record;
                AddOutcome::Updated
            }
        }
    }

    /// Records whose name equals `name` exactly
    pub fn lookup(&self, name: &str) -> Option<Vec<&Record>> {
        self.name_index.get(name).map(|ids| self.resolve(ids))
    }

    /// Best matching name and its score, regardless of any threshold
    pub fn best_match(&self, name: &str) -> Option<(&str, f64)> {
        self.matcher.find_best_match(name, self.names())
    }

    /// Records of the single best matching name, if its score is strictly above `threshold`
    pub fn fuzzy_lookup(&self, name: &str, threshold: f64) -> Option<Vec<&Record>> {
        self.fuzzy_lookup_with_score(name, threshold)
            .map(|hit| hit.records)
    }

    pub fn fuzzy_lookup_with_score(&self, name: &str, threshold: f64) -> Option<FuzzyMatch<'_>> {
        let (best, score) = self.best_match(name)?;
        debug!("Best match for '{}' is '{}' ({:.1})", name, best, score);

        if score <= threshold {
            return None;
        }

        let records = self.lookup(best)?;
        Some(FuzzyMatch {
            name: best,
            score,
            records,
        })
    }

    /// Write the full dictionary if anything changed since open.
    ///
    /// Returns whether the file was written. Counters are not reset.
    pub fn save(&mut self) -> Result<bool> {
        if !self.has_changes() {
            debug!("No dictionary changes, skipping save");
            return Ok(false);
        }

        let now = Utc::now();
        let snapshot = SnapshotView {
            last_update: Some(now),
            data: self.index.values().collect(),
        };
        write_snapshot(&self.path, &snapshot)?;
        self.last_update = Some(now);

        info!(
            "Saved {} records to {} ({} new, {} updated)",
            self.index.len(),
            self.path.display(),
            self.new_record_count,
            self.updated_record_count
        );

        Ok(true)
    }

    fn resolve(&self, ids: &[RecordId]) -> Vec<&Record> {
        ids.iter().filter_map(|id| self.index.get(id)).collect()
    }
}

fn unlink(name_index: &mut IndexMap<String, Vec<RecordId>>, name: &str, id: &RecordId) {
    let now_empty = match name_index.get_mut(name) {
        Some(group) => {
            group.retain(|member| member != id);
            group.is_empty()
        }
        None => false,
    };

    if now_empty {
        name_index.shift_remove(name);
    }
}

fn read_snapshot(path: &Path) -> Result<Snapshot> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        DictionaryError::Snapshot(format!("Failed to read {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        DictionaryError::Snapshot(format!("Failed to parse {}: {}", path.display(), e))
    })
}

/// Serialize to indented JSON next to `path`, then move it into place.
fn write_snapshot<T: Serialize>(path: &Path, snapshot: &T) -> Result<()> {
    let content = serde_json::to_string_pretty(snapshot)?;

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let written = std::fs::write(&tmp, content).and_then(|_| std::fs::rename(&tmp, path));
    if let Err(e) = written {
        let _ = std::fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fuzzy_matcher::Scorer;
    use serde_json::json;
    use tempfile::TempDir;

    fn payload(id: i64, name: &str, description: &str) -> Value {
        json!({
            "id": id,
            "url": format!("attribute/{}/", id),
            "name": name,
            "description": description,
            "custom_fields": [],
        })
    }

    fn open(dir: &TempDir) -> Dictionary {
        Dictionary::open(DictionaryConfig::new(dir.path().join("dictionary.json"))).unwrap()
    }

    #[test]
    fn test_open_creates_empty_snapshot() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested/dir/dictionary.json");

        let dictionary = Dictionary::open(DictionaryConfig::new(&path)).unwrap();

        assert!(path.exists());
        assert!(dictionary.is_empty());
        assert!(dictionary.last_update().is_none());
        assert_eq!(dictionary.new_record_count(), 0);
        assert_eq!(dictionary.updated_record_count(), 0);

        let on_disk: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk, json!({"last_update": "", "data": []}));
    }

    #[test]
    fn test_new_then_updated_then_unchanged() {
        let temp_dir = TempDir::new().unwrap();
        let mut dictionary = open(&temp_dir);

        dictionary.add(&payload(1, "amount", "Net amount")).unwrap();
        assert_eq!(dictionary.new_record_count(), 1);
        assert_eq!(dictionary.updated_record_count(), 0);

        dictionary.add(&payload(1, "amount", "Net amount")).unwrap();
        assert_eq!(dictionary.new_record_count(), 1);
        assert_eq!(dictionary.updated_record_count(), 0);

        dictionary.add(&payload(1, "amount", "Gross amount")).unwrap();
        assert_eq!(dictionary.new_record_count(), 1);
        assert_eq!(dictionary.updated_record_count(), 1);

        let records = dictionary.lookup("amount").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].description, "Gross amount");
        assert_eq!(dictionary.len(), 1);
    }

    #[test]
    fn test_markup_only_change_is_not_an_update() {
        let temp_dir = TempDir::new().unwrap();
        let mut dictionary = open(&temp_dir);

        dictionary.add(&payload(1, "amount", "<p>Net amount</p>")).unwrap();
        dictionary.add(&payload(1, "amount", "<div>Net amount</div>")).unwrap();

        assert_eq!(dictionary.updated_record_count(), 0);
    }

    #[test]
    fn test_malformed_record_leaves_dictionary_untouched() {
        let temp_dir = TempDir::new().unwrap();
        let mut dictionary = open(&temp_dir);

        let err = dictionary
            .add(&json!({"id": 5, "url": "x", "description": "no name"}))
            .unwrap_err();

        assert!(matches!(err, DictionaryError::MalformedRecord(_)));
        assert!(dictionary.is_empty());
        assert!(!dictionary.has_changes());
    }

    #[test]
    fn test_lookup_groups_by_name() {
        let temp_dir = TempDir::new().unwrap();
        let mut dictionary = open(&temp_dir);

        dictionary.add(&payload(1, "amount", "Loan amount")).unwrap();
        dictionary.add(&payload(2, "account", "Account number")).unwrap();
        dictionary.add(&payload(3, "amount", "Payment amount")).unwrap();

        let ids: Vec<_> = dictionary
            .lookup("amount")
            .unwrap()
            .iter()
            .map(|r| r.id.clone())
            .collect();
        assert_eq!(ids, vec![RecordId::Int(1), RecordId::Int(3)]);

        assert_eq!(dictionary.lookup("account").unwrap().len(), 1);
        assert!(dictionary.lookup("Amount").is_none());
        assert!(dictionary.lookup("missing").is_none());
        assert_eq!(dictionary.names().collect::<Vec<_>>(), vec!["amount", "account"]);
    }

    #[test]
    fn test_rename_moves_record_between_name_groups() {
        let temp_dir = TempDir::new().unwrap();
        let mut dictionary = open(&temp_dir);

        dictionary.add(&payload(1, "amt", "Amount")).unwrap();
        dictionary.add(&payload(2, "amount", "Other amount")).unwrap();
        dictionary.add(&payload(1, "amount", "Amount")).unwrap();

        assert_eq!(dictionary.updated_record_count(), 1);
        assert!(dictionary.lookup("amt").is_none());
        assert_eq!(dictionary.names().collect::<Vec<_>>(), vec!["amount"]);

        let ids: Vec<_> = dictionary
            .lookup("amount")
            .unwrap()
            .iter()
            .map(|r| r.id.clone())
            .collect();
        assert_eq!(ids, vec![RecordId::Int(2), RecordId::Int(1)]);
    }

    #[test]
    fn test_update_keeps_position_in_group() {
        let temp_dir = TempDir::new().unwrap();
        let mut dictionary = open(&temp_dir);

        dictionary.add(&payload(1, "amount", "a")).unwrap();
        dictionary.add(&payload(2, "amount", "b")).unwrap();
        dictionary.add(&payload(1, "amount", "changed")).unwrap();

        let descriptions: Vec<_> = dictionary
            .lookup("amount")
            .unwrap()
            .iter()
            .map(|r| r.description.as_str())
            .collect();
        assert_eq!(descriptions, vec!["changed", "b"]);
    }

    #[test]
    fn test_fuzzy_lookup_threshold() {
        let temp_dir = TempDir::new().unwrap();
        let mut dictionary = open(&temp_dir);

        dictionary.add(&payload(1, "amount", "Net amount")).unwrap();
        dictionary.add(&payload(2, "account", "Account number")).unwrap();

        // 80 for "amount", below the threshold
        assert!(dictionary.fuzzy_lookup("amnt", 90.0).is_none());

        let hit = dictionary.fuzzy_lookup("amnt", 75.0).unwrap();
        assert_eq!(hit.len(), 1);
        assert_eq!(hit[0].name, "amount");

        // score must be strictly greater than the threshold
        assert!(dictionary.fuzzy_lookup("amount", 100.0).is_none());
        assert!(dictionary.fuzzy_lookup("amount", 99.9).is_some());

        // a plural clears the default threshold
        let scored = dictionary.fuzzy_lookup_with_score("amounts", 90.0).unwrap();
        assert_eq!(scored.name, "amount");
        assert!((scored.score - 100.0 * 12.0 / 13.0).abs() < 1e-9);
    }

    #[test]
    fn test_fuzzy_lookup_on_empty_dictionary() {
        let temp_dir = TempDir::new().unwrap();
        let dictionary = open(&temp_dir);

        assert!(dictionary.fuzzy_lookup("anything", 0.0).is_none());
        assert!(dictionary.best_match("anything").is_none());
    }

    #[test]
    fn test_fuzzy_lookup_is_stable_on_ties() {
        let temp_dir = TempDir::new().unwrap();
        let mut dictionary = open(&temp_dir);

        dictionary.add(&payload(1, "ax", "first")).unwrap();
        dictionary.add(&payload(2, "xb", "second")).unwrap();

        for _ in 0..5 {
            let hit = dictionary.fuzzy_lookup("ab", 10.0).unwrap();
            assert_eq!(hit[0].name, "ax");
        }
    }

    #[test]
    fn test_with_matcher_changes_scoring() {
        let temp_dir = TempDir::new().unwrap();
        let mut dictionary =
            open(&temp_dir).with_matcher(NameMatcher::new(Scorer::Levenshtein));

        dictionary.add(&payload(1, "amount", "Net amount")).unwrap();

        // two edits over six characters
        assert!(dictionary.fuzzy_lookup("amnt", 66.0).is_some());
        assert!(dictionary.fuzzy_lookup("amnt", 67.0).is_none());
        assert!(dictionary.fuzzy_lookup("amounts", 90.0).is_none());
    }

    #[test]
    fn test_save_is_skipped_without_changes() {
        let temp_dir = TempDir::new().unwrap();
        let mut dictionary = open(&temp_dir);

        assert!(!dictionary.save().unwrap());
        assert!(dictionary.last_update().is_none());
    }

    #[test]
    fn test_save_sets_last_update() {
        let temp_dir = TempDir::new().unwrap();
        let mut dictionary = open(&temp_dir);

        dictionary.add(&payload(1, "amount", "Net amount")).unwrap();
        let before = Utc::now();
        assert!(dictionary.save().unwrap());

        let saved = dictionary.last_update().unwrap();
        assert!(saved >= before);
        assert_eq!(dictionary.new_record_count(), 1);
        assert!(!dictionary.path().with_extension("json.tmp").exists());

        let reopened = open(&temp_dir);
        let reloaded = reopened.last_update().unwrap();
        assert_eq!(reloaded.timestamp_micros(), saved.timestamp_micros());
    }

    #[test]
    fn test_duplicate_ids_in_snapshot_keep_last() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("dictionary.json");
        let snapshot = json!({
            "last_update": "",
            "data": [
                {"id": 1, "source": "s", "name": "old", "description": "d", "custom_fields": []},
                {"id": 1, "source": "s", "name": "new", "description": "d", "custom_fields": []},
            ]
        });
        std::fs::write(&path, snapshot.to_string()).unwrap();

        let dictionary = Dictionary::open(DictionaryConfig::new(&path)).unwrap();

        assert_eq!(dictionary.len(), 1);
        assert!(dictionary.lookup("old").is_none());
        assert_eq!(dictionary.lookup("new").unwrap().len(), 1);
        assert!(!dictionary.has_changes());
    }

    #[test]
    fn test_invalid_snapshot_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("dictionary.json");

        std::fs::write(&path, "{not json").unwrap();
        let err = Dictionary::open(DictionaryConfig::new(&path)).err().unwrap();
        assert!(matches!(err, DictionaryError::Snapshot(_)));

        std::fs::write(&path, r#"{"last_update": "yesterday", "data": []}"#).unwrap();
        let err = Dictionary::open(DictionaryConfig::new(&path)).err().unwrap();
        assert!(matches!(err, DictionaryError::Snapshot(_)));
    }

    #[test]
    fn test_last_update_without_offset_is_utc() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("dictionary.json");

        std::fs::write(&path, r#"{"last_update": "2024-03-01T08:15:30.123456", "data": []}"#)
            .unwrap();
        let dictionary = Dictionary::open(DictionaryConfig::new(&path)).unwrap();
        assert_eq!(
            dictionary.last_update().unwrap().to_rfc3339(),
            "2024-03-01T08:15:30.123456+00:00"
        );

        let spaced = last_update_format::parse("2024-03-01 08:15:30").unwrap();
        assert_eq!(spaced.to_rfc3339(), "2024-03-01T08:15:30+00:00");
        assert!(last_update_format::parse("2024-03-01").is_err());
    }

    #[test]
    fn test_failed_write_removes_temp_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("dictionary.json");

        // a non-empty directory cannot be replaced by a file
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("keep"), "x").unwrap();

        assert!(write_snapshot(&path, &Snapshot::default()).is_err());
        assert!(!temp_dir.path().join("dictionary.json.tmp").exists());
        assert!(path.join("keep").exists());
    }

    #[test]
    fn test_invalid_base_uri_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let config = DictionaryConfig::new(temp_dir.path().join("dictionary.json"))
            .with_base_uri("nowhere");

        assert!(matches!(
            Dictionary::open(config),
            Err(DictionaryError::InvalidUri(_))
        ));
    }
}
