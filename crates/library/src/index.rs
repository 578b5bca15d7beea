use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use common::{child_relpath, relpath_from, Entry};
use rand::seq::index::sample;
use redb::{
    CommitError, Database, DatabaseError, ReadableTable, StorageError, TableDefinition, TableError,
    TransactionError, WriteTransaction,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::Cache;

const INDEX_VERSION: u32 = 1;
const KEY_SEP: char = '\x1f';
const KEY_END: char = '\u{10ffff}';

const META_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("meta");
const CHILDREN_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("children");
const WORDS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("words");
const FILES_TABLE: TableDefinition<u64, &str> = TableDefinition::new("files");

const META_VERSION_KEY: &str = "version";
const META_STATS_KEY: &str = "stats";

/// Persistent index over the media root: directory children, name words and
/// the list of files for random sampling.
///
/// The index only changes through [`FileIndex::rescan`]; between scans it may
/// lag behind the filesystem, which callers treat as a cache miss.
#[derive(Clone)]
pub struct FileIndex {
    root: PathBuf,
    db: Arc<Database>,
}

impl FileIndex {
    pub fn load_or_scan(root: PathBuf, db_path: PathBuf) -> Result<(Self, bool), IndexError> {
        let db = open_or_create_db(&db_path)?;
        let index = Self {
            root,
            db: Arc::new(db),
        };

        let mut scanned = false;
        match read_version(&index.db)? {
            Some(version) if version == INDEX_VERSION => {
                info!("Loaded index from {:?}", db_path);
            }
            Some(version) => {
                warn!("Index version mismatch ({}); rescanning", version);
                index.rescan()?;
                scanned = true;
            }
            None => {
                warn!("Index missing; scanning");
                index.rescan()?;
                scanned = true;
            }
        }

        Ok((index, scanned))
    }

    pub fn rescan(&self) -> Result<IndexStats, IndexError> {
        scan_root(&self.root, &self.db)
    }

    pub fn stats(&self) -> Result<IndexStats, IndexError> {
        read_stats(&self.db)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Indexed children of `path`; empty when the path was never indexed.
    pub fn list(&self, path: &str) -> Result<Vec<Entry>, IndexError> {
        let path = path.trim_matches('/');
        let read_txn = self.db.begin_read()?;
        let table = match read_txn.open_table(CHILDREN_TABLE) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let prefix = prefix_key(path);
        let end = end_key(&prefix);
        let mut entries = Vec::new();
        for entry in table.range(prefix.as_str()..end.as_str())? {
            let entry = entry?;
            let (_, name) = split_key_last(entry.0.value())?;
            let is_dir = bytes_bool(entry.1.value());
            entries.push(Entry::new(child_relpath(path, name), is_dir));
        }
        Ok(entries)
    }

    /// Entries whose name has a word starting with one of the query words,
    /// best matches first.
    pub fn search(&self, query: &str) -> Result<Vec<Entry>, IndexError> {
        let terms = name_words(query);
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let read_txn = self.db.begin_read()?;
        let table = match read_txn.open_table(WORDS_TABLE) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut hits: HashMap<String, (bool, HashSet<usize>)> = HashMap::new();
        for (term_idx, term) in terms.iter().enumerate() {
            let end = end_key(term);
            for entry in table.range(term.as_str()..end.as_str())? {
                let entry = entry?;
                let (_, relpath) = split_key_first(entry.0.value())?;
                let is_dir = bytes_bool(entry.1.value());
                hits.entry(relpath.to_string())
                    .or_insert_with(|| (is_dir, HashSet::new()))
                    .1
                    .insert(term_idx);
            }
        }

        let mut ranked: Vec<(usize, String, bool)> = hits
            .into_iter()
            .map(|(relpath, (is_dir, matched))| (matched.len(), relpath, is_dir))
            .collect();
        ranked.sort_by(|a, b| {
            b.0.cmp(&a.0)
                .then_with(|| a.1.len().cmp(&b.1.len()))
                .then_with(|| a.1.cmp(&b.1))
        });
        debug!("search {:?} matched {} entries", query, ranked.len());

        Ok(ranked
            .into_iter()
            .map(|(_, relpath, is_dir)| Entry::new(relpath, is_dir))
            .collect())
    }

    /// Up to `count` distinct files, chosen uniformly.
    pub fn random_files(&self, count: usize) -> Result<Vec<Entry>, IndexError> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let read_txn = self.db.begin_read()?;
        let table = match read_txn.open_table(FILES_TABLE) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let total = table.len()? as usize;
        if total == 0 {
            return Ok(Vec::new());
        }

        let mut rng = rand::rng();
        let mut entries = Vec::with_capacity(count.min(total));
        for ordinal in sample(&mut rng, total, count.min(total)) {
            if let Some(relpath) = table.get(ordinal as u64)? {
                entries.push(Entry::track(relpath.value()));
            }
        }
        Ok(entries)
    }
}

impl Cache for FileIndex {
    fn listdir(&self, path: &str) -> Vec<Entry> {
        self.list(path).unwrap_or_else(|err| {
            warn!("Index listing of {:?} failed: {}", path, err);
            Vec::new()
        })
    }

    fn searchfor(&self, query: &str) -> Vec<Entry> {
        self.search(query).unwrap_or_else(|err| {
            warn!("Index search for {:?} failed: {}", query, err);
            Vec::new()
        })
    }

    fn random_file_entries(&self, count: usize) -> Vec<Entry> {
        self.random_files(count).unwrap_or_else(|err| {
            warn!("Index sampling failed: {}", err);
            Vec::new()
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    pub dirs: usize,
    pub files: usize,
}

#[derive(Debug)]
pub enum IndexError {
    Io(std::io::Error),
    Redb(redb::Error),
    Bincode(Box<bincode::ErrorKind>),
    KeyParse(String),
}

impl std::fmt::Display for IndexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexError::Io(err) => write!(f, "io error: {}", err),
            IndexError::Redb(err) => write!(f, "db error: {}", err),
            IndexError::Bincode(err) => write!(f, "bincode error: {}", err),
            IndexError::KeyParse(value) => write!(f, "key parse error: {:?}", value),
        }
    }
}

impl std::error::Error for IndexError {}

impl From<std::io::Error> for IndexError {
    fn from(err: std::io::Error) -> Self {
        IndexError::Io(err)
    }
}

impl From<redb::Error> for IndexError {
    fn from(err: redb::Error) -> Self {
        IndexError::Redb(err)
    }
}

impl From<DatabaseError> for IndexError {
    fn from(err: DatabaseError) -> Self {
        IndexError::Redb(err.into())
    }
}

impl From<TableError> for IndexError {
    fn from(err: TableError) -> Self {
        IndexError::Redb(err.into())
    }
}

impl From<TransactionError> for IndexError {
    fn from(err: TransactionError) -> Self {
        IndexError::Redb(err.into())
    }
}

impl From<StorageError> for IndexError {
    fn from(err: StorageError) -> Self {
        IndexError::Redb(err.into())
    }
}

impl From<CommitError> for IndexError {
    fn from(err: CommitError) -> Self {
        IndexError::Redb(err.into())
    }
}

impl From<Box<bincode::ErrorKind>> for IndexError {
    fn from(err: Box<bincode::ErrorKind>) -> Self {
        IndexError::Bincode(err)
    }
}

fn open_or_create_db(path: &Path) -> Result<Database, IndexError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    if path.exists() {
        Ok(Database::open(path)?)
    } else {
        Ok(Database::create(path)?)
    }
}

fn read_version(db: &Database) -> Result<Option<u32>, IndexError> {
    let read_txn = db.begin_read()?;
    let table = match read_txn.open_table(META_TABLE) {
        Ok(table) => table,
        Err(TableError::TableDoesNotExist(_)) => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let version = match table.get(META_VERSION_KEY)? {
        Some(value) => Some(decode_value(value.value())?),
        None => None,
    };
    Ok(version)
}

fn read_stats(db: &Database) -> Result<IndexStats, IndexError> {
    let read_txn = db.begin_read()?;
    let table = match read_txn.open_table(META_TABLE) {
        Ok(table) => table,
        Err(TableError::TableDoesNotExist(_)) => return Ok(IndexStats::default()),
        Err(err) => return Err(err.into()),
    };
    let stats = match table.get(META_STATS_KEY)? {
        Some(value) => decode_value(value.value())?,
        None => IndexStats::default(),
    };
    Ok(stats)
}

fn scan_root(root: &Path, db: &Database) -> Result<IndexStats, IndexError> {
    let write_txn = db.begin_write()?;

    clear_table(&write_txn, META_TABLE)?;
    clear_table(&write_txn, CHILDREN_TABLE)?;
    clear_table(&write_txn, WORDS_TABLE)?;
    match write_txn.delete_table(FILES_TABLE) {
        Ok(_) | Err(TableError::TableDoesNotExist(_)) => {}
        Err(err) => return Err(err.into()),
    }

    let stats = {
        let mut meta_table = write_txn.open_table(META_TABLE)?;
        let mut children_table = write_txn.open_table(CHILDREN_TABLE)?;
        let mut words_table = write_txn.open_table(WORDS_TABLE)?;
        let mut files_table = write_txn.open_table(FILES_TABLE)?;

        let mut stats = IndexStats::default();
        let walker = WalkDir::new(root)
            .follow_links(false)
            .min_depth(1)
            .sort_by_file_name();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!("Skipping unreadable path during scan: {}", err);
                    continue;
                }
            };
            let relpath = match relpath_from(root, entry.path()) {
                Some(rel) if !rel.is_empty() => rel,
                _ => continue,
            };
            let is_dir = entry.file_type().is_dir();
            let (parent, name) = match relpath.rfind('/') {
                Some(idx) => (&relpath[..idx], &relpath[idx + 1..]),
                None => ("", relpath.as_str()),
            };

            let mut child_key = prefix_key(parent);
            child_key.push_str(name);
            children_table.insert(child_key.as_str(), bool_bytes(is_dir))?;

            for word in name_words(name) {
                let word_key = format!("{}{}{}", word, KEY_SEP, relpath);
                words_table.insert(word_key.as_str(), bool_bytes(is_dir))?;
            }

            if is_dir {
                stats.dirs += 1;
            } else {
                files_table.insert(stats.files as u64, relpath.as_str())?;
                stats.files += 1;
            }
        }

        let version_bytes = encode_value(&INDEX_VERSION)?;
        meta_table.insert(META_VERSION_KEY, version_bytes.as_slice())?;
        let stats_bytes = encode_value(&stats)?;
        meta_table.insert(META_STATS_KEY, stats_bytes.as_slice())?;

        stats
    };

    write_txn.commit()?;
    info!("Indexed {} directories, {} files", stats.dirs, stats.files);
    Ok(stats)
}

fn clear_table(
    txn: &WriteTransaction,
    table: TableDefinition<&str, &[u8]>,
) -> Result<(), IndexError> {
    match txn.delete_table(table) {
        Ok(_) => Ok(()),
        Err(TableError::TableDoesNotExist(_)) => Ok(()),
        Err(err) => Err(err.into()),
    }
}

fn encode_value<T: Serialize>(value: &T) -> Result<Vec<u8>, IndexError> {
    Ok(bincode::serialize(value)?)
}

fn decode_value<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T, IndexError> {
    Ok(bincode::deserialize(bytes)?)
}

fn bool_bytes(value: bool) -> &'static [u8] {
    if value {
        &[1u8]
    } else {
        &[0u8]
    }
}

fn bytes_bool(value: &[u8]) -> bool {
    value.first().copied().unwrap_or(0) != 0
}

/// Lowercase alphanumeric words of a name or query, without duplicates.
fn name_words(value: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    value
        .split(|ch: char| !ch.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(|word| word.to_lowercase())
        .filter(|word| seen.insert(word.clone()))
        .collect()
}

fn prefix_key(prefix: &str) -> String {
    let mut out = String::new();
    out.push_str(prefix);
    out.push(KEY_SEP);
    out
}

fn end_key(prefix: &str) -> String {
    let mut out = prefix.to_string();
    out.push(KEY_END);
    out
}

fn split_key_last(value: &str) -> Result<(&str, &str), IndexError> {
    let idx = value
        .rfind(KEY_SEP)
        .ok_or_else(|| IndexError::KeyParse(value.to_string()))?;
    let next = idx + KEY_SEP.len_utf8();
    Ok((&value[..idx], &value[next..]))
}

fn split_key_first(value: &str) -> Result<(&str, &str), IndexError> {
    let idx = value
        .find(KEY_SEP)
        .ok_or_else(|| IndexError::KeyParse(value.to_string()))?;
    let next = idx + KEY_SEP.len_utf8();
    Ok((&value[..idx], &value[next..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> (tempfile::TempDir, FileIndex) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("music");
        fs::create_dir_all(root.join("Daft Punk").join("Discovery")).unwrap();
        fs::create_dir_all(root.join(".trash")).unwrap();
        fs::write(root.join("Daft Punk/Discovery/01 One More Time.mp3"), b"x").unwrap();
        fs::write(root.join("Daft Punk/Discovery/02 Aerodynamic.flac"), b"x").unwrap();
        fs::write(root.join("Daft Punk/cover.jpg"), b"x").unwrap();
        fs::write(root.join("loose.mp3"), b"x").unwrap();

        let (index, scanned) =
            FileIndex::load_or_scan(root, dir.path().join("db").join("index.redb")).unwrap();
        assert!(scanned);
        (dir, index)
    }

    #[test]
    fn scan_records_stats() {
        let (_dir, index) = fixture();
        let stats = index.stats().unwrap();
        assert_eq!(stats, IndexStats { dirs: 3, files: 4 });
    }

    #[test]
    fn lists_direct_children_only() {
        let (_dir, index) = fixture();

        let root = index.list("").unwrap();
        let paths: Vec<&str> = root.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec![".trash", "Daft Punk", "loose.mp3"]);
        assert!(root[1].is_dir);
        assert!(root[2].is_track());

        let artist = index.list("/Daft Punk/").unwrap();
        let paths: Vec<&str> = artist.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["Daft Punk/Discovery", "Daft Punk/cover.jpg"]);
    }

    #[test]
    fn unindexed_path_lists_empty() {
        let (_dir, index) = fixture();
        assert!(index.list("Nobody").unwrap().is_empty());
    }

    #[test]
    fn search_ranks_by_matched_words() {
        let (_dir, index) = fixture();
        let results = index.search("one time").unwrap();
        assert_eq!(results[0].path, "Daft Punk/Discovery/01 One More Time.mp3");

        let results = index.search("daft").unwrap();
        assert_eq!(results, vec![Entry::dir("Daft Punk")]);
        assert!(results[0].is_dir);

        let results = index.search("aero").unwrap();
        assert_eq!(results.len(), 1);
        assert!(index.search("   ").unwrap().is_empty());
        assert!(index.search("zzz").unwrap().is_empty());
    }

    #[test]
    fn random_files_are_distinct_tracks() {
        let (_dir, index) = fixture();
        let picked = index.random_files(3).unwrap();
        assert_eq!(picked.len(), 3);
        let unique: HashSet<&Entry> = picked.iter().collect();
        assert_eq!(unique.len(), 3);
        assert!(picked.iter().all(Entry::is_track));

        assert_eq!(index.random_files(100).unwrap().len(), 4);
        assert!(index.random_files(0).unwrap().is_empty());
    }

    #[test]
    fn reopening_skips_scan() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("music");
        fs::create_dir_all(&root).unwrap();
        let db_path = dir.path().join("index.redb");

        {
            let (_, scanned) = FileIndex::load_or_scan(root.clone(), db_path.clone()).unwrap();
            assert!(scanned);
        }
        let (_, scanned) = FileIndex::load_or_scan(root, db_path).unwrap();
        assert!(!scanned);
    }

    #[test]
    fn rescan_picks_up_new_files() {
        let (dir, index) = fixture();
        fs::write(dir.path().join("music/new.ogg"), b"x").unwrap();
        assert!(index.search("new").unwrap().is_empty());

        let stats = index.rescan().unwrap();
        assert_eq!(stats.files, 5);
        assert_eq!(index.search("new").unwrap(), vec![Entry::track("new.ogg")]);
    }

    #[test]
    fn name_words_split_and_dedupe() {
        assert_eq!(
            name_words("01 One-More_Time.mp3 one"),
            vec!["01", "one", "more", "time", "mp3"]
        );
    }
}
