use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;

use common::{child_relpath, is_hidden, join_relpath_checked, Entry};
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::{ConfigError, LibraryConfig, ModelSettings};
use crate::fs::Filesystem;
use crate::probe::DecoderProbe;
use crate::Cache;

/// Browsing, search and sampling over the media root.
///
/// Holds nothing but its settings and shared collaborators, so clones are
/// cheap and may be used from any number of threads at once.
#[derive(Clone)]
pub struct Model {
    settings: Arc<ModelSettings>,
    cache: Arc<dyn Cache>,
    fs: Arc<dyn Filesystem>,
    probe: Arc<dyn DecoderProbe>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CompactGroup {
    pub filter: String,
    pub count: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Listing {
    pub entries: Vec<Entry>,
    pub groups: Vec<CompactGroup>,
}

impl Model {
    pub fn new(
        config: &LibraryConfig,
        cache: Arc<dyn Cache>,
        fs: Arc<dyn Filesystem>,
        probe: Arc<dyn DecoderProbe>,
    ) -> Result<Self, ConfigError> {
        let settings = ModelSettings::from_config(config)?;
        Ok(Self::with_settings(settings, cache, fs, probe))
    }

    pub fn with_settings(
        settings: ModelSettings,
        cache: Arc<dyn Cache>,
        fs: Arc<dyn Filesystem>,
        probe: Arc<dyn DecoderProbe>,
    ) -> Self {
        Self {
            settings: Arc::new(settings),
            cache,
            fs,
            probe,
        }
    }

    pub fn settings(&self) -> &ModelSettings {
        &self.settings
    }

    /// Visible children of `path`, from the index when it knows the path and
    /// from the filesystem otherwise.
    pub fn list_directory(&self, path: &str) -> Vec<Entry> {
        let path = path.trim_matches('/');
        let dir = match join_relpath_checked(&self.settings.basedir, path) {
            Some(dir) => dir,
            None => {
                warn!("Refusing to list {:?}: outside the media root", path);
                return Vec::new();
            }
        };

        let mut entries = self.cache.listdir(path);
        if entries.is_empty() {
            debug!("Index has no listing for {:?}; reading {:?}", path, dir);
            entries = self.list_filesystem(path, &dir);
        }

        entries.retain(|entry| !is_hidden(entry));
        entries.sort_by(|a, b| {
            b.is_dir
                .cmp(&a.is_dir)
                .then_with(|| a.name().to_lowercase().cmp(&b.name().to_lowercase()))
                .then_with(|| a.path.cmp(&b.path))
        });
        entries
    }

    fn list_filesystem(&self, path: &str, dir: &Path) -> Vec<Entry> {
        let names = match self.fs.list_names(dir) {
            Ok(names) => names,
            Err(err) if err.kind() == ErrorKind::NotFound => return Vec::new(),
            Err(err) => {
                warn!("Failed to list {:?}: {}", dir, err);
                return Vec::new();
            }
        };

        let mut entries = Vec::with_capacity(names.len());
        for name in names {
            // Names that cannot be inspected (dangling links, races) stay listed as tracks.
            let is_dir = match self.fs.stat(&dir.join(&name)) {
                Ok(stat) => stat.is_dir,
                Err(err) => {
                    debug!("Cannot stat {:?} in {:?}: {}", name, dir, err);
                    false
                }
            };
            entries.push(Entry::new(child_relpath(path, &name), is_dir));
        }
        entries
    }

    /// Visible index matches for `query`, at most `search.maxresults` of them.
    pub fn search(&self, query: &str) -> Vec<Entry> {
        if query.trim().is_empty() {
            return Vec::new();
        }
        self.cache
            .searchfor(query)
            .into_iter()
            .filter(|entry| !is_hidden(entry))
            .take(self.settings.maxresults)
            .collect()
    }

    /// Asks the index for `count` random files and keeps the playable ones.
    /// Unplayable picks are dropped, not replaced.
    pub fn random_music_entries(&self, count: usize) -> Vec<Entry> {
        if count == 0 {
            return Vec::new();
        }
        let candidates = self.cache.random_file_entries(count);
        let picked: Vec<Entry> = candidates
            .into_iter()
            .take(count)
            .filter(|entry| self.is_playable(&entry.path))
            .collect();
        debug!("{} of {} random picks are playable", picked.len(), count);
        picked
    }

    /// Whether `path` can be streamed, natively or through the transcoder.
    ///
    /// Relative paths are taken from the media root. Never fails: anything
    /// that cannot be inspected is not playable.
    pub fn is_playable(&self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        let full = if path.is_absolute() {
            path.to_path_buf()
        } else {
            match join_relpath_checked(&self.settings.basedir, &path.to_string_lossy()) {
                Some(full) => full,
                None => {
                    debug!("{:?} points outside the media root", path);
                    return false;
                }
            }
        };

        match self.fs.stat(&full) {
            Ok(stat) if stat.is_dir => {
                debug!("{:?} is a directory", full);
                return false;
            }
            Ok(stat) if stat.len == 0 => {
                debug!("{:?} is empty", full);
                return false;
            }
            Ok(_) => {}
            Err(err) => {
                debug!("Cannot stat {:?}: {}", full, err);
                return false;
            }
        }

        let ext = match full.extension().and_then(|ext| ext.to_str()) {
            Some(ext) => ext.to_ascii_lowercase(),
            None => return false,
        };
        if self.settings.supported_formats.contains(&ext) {
            return true;
        }
        if self.settings.transcode && self.probe.available_decoder_formats().contains(&ext) {
            return true;
        }
        debug!("No decoder for {:?}", full);
        false
    }

    /// Directory listing narrowed to names starting with `filter`, folded
    /// into prefix groups once it grows past `browser.max_show_files`.
    pub fn browse(&self, path: &str, filter: Option<&str>) -> Listing {
        let filter = filter.unwrap_or("");
        let filter_lower = filter.to_lowercase();
        let entries: Vec<Entry> = self
            .list_directory(path)
            .into_iter()
            .filter(|entry| entry.name().to_lowercase().starts_with(&filter_lower))
            .collect();

        let max = self.settings.max_show_files;
        if max == 0 || entries.len() <= max {
            return Listing {
                entries,
                groups: Vec::new(),
            };
        }
        compact_listing(entries, filter.chars().count())
    }
}

fn compact_listing(entries: Vec<Entry>, filter_chars: usize) -> Listing {
    let mut exact = Vec::new();
    let mut groups: Vec<CompactGroup> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for entry in entries {
        let prefix: String = entry.name().chars().take(filter_chars + 1).collect();
        if prefix.chars().count() <= filter_chars {
            exact.push(entry);
            continue;
        }
        let key = prefix.to_lowercase();
        match positions.get(&key) {
            Some(&idx) => groups[idx].count += 1,
            None => {
                positions.insert(key, groups.len());
                groups.push(CompactGroup {
                    filter: prefix,
                    count: 1,
                });
            }
        }
    }

    groups.sort_by_key(|group| group.filter.to_lowercase());
    Listing {
        entries: exact,
        groups,
    }
}
