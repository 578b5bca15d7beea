pub mod config;
pub mod fs;
pub mod index;
pub mod model;
pub mod probe;

pub use common::{is_hidden, Entry};
pub use config::{ConfigError, LibraryConfig, ModelSettings};
pub use fs::{FileStat, Filesystem, LocalFs};
pub use index::{FileIndex, IndexError, IndexStats};
pub use model::{CompactGroup, Listing, Model};
pub use probe::{CommandProbe, DecoderProbe, StaticProbe};

/// Read-only view of an index over the media root.
///
/// An empty result means "nothing known", never an error; a path that was
/// never indexed lists as empty.
pub trait Cache: Send + Sync {
    fn listdir(&self, path: &str) -> Vec<Entry>;

    /// All matches for `query`, best first. Callers apply their own cap.
    fn searchfor(&self, query: &str) -> Vec<Entry>;

    fn random_file_entries(&self, count: usize) -> Vec<Entry>;
}
