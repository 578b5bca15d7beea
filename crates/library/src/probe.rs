use std::collections::HashSet;
use std::env;
use std::path::{Path, PathBuf};

/// Reports which file extensions the transcoder can currently decode.
pub trait DecoderProbe: Send + Sync {
    fn available_decoder_formats(&self) -> HashSet<String>;
}

/// A fixed capability set.
#[derive(Clone, Debug, Default)]
pub struct StaticProbe(pub HashSet<String>);

impl StaticProbe {
    pub fn new<S: AsRef<str>>(formats: &[S]) -> Self {
        Self(crate::config::normalize_formats(formats))
    }
}

impl DecoderProbe for StaticProbe {
    fn available_decoder_formats(&self) -> HashSet<String> {
        self.0.clone()
    }
}

struct Decoder {
    command: &'static str,
    formats: &'static [&'static str],
}

const DECODERS: &[Decoder] = &[
    Decoder {
        command: "ffmpeg",
        formats: &[
            "mp3", "ogg", "oga", "flac", "wav", "opus", "m4a", "aac", "wma", "ape", "aiff",
        ],
    },
    Decoder {
        command: "mpg123",
        formats: &["mp3"],
    },
    Decoder {
        command: "lame",
        formats: &["mp3"],
    },
    Decoder {
        command: "oggdec",
        formats: &["ogg", "oga"],
    },
    Decoder {
        command: "flac",
        formats: &["flac"],
    },
    Decoder {
        command: "faad",
        formats: &["m4a", "aac"],
    },
    Decoder {
        command: "opusdec",
        formats: &["opus"],
    },
];

/// Looks for external decoder programs on `PATH`.
///
/// Every call searches again, so installing a decoder takes effect without a
/// restart.
#[derive(Clone, Debug, Default)]
pub struct CommandProbe {
    search_path: Option<Vec<PathBuf>>,
}

impl CommandProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Searches `dirs` instead of `PATH`.
    pub fn with_search_path(dirs: Vec<PathBuf>) -> Self {
        Self {
            search_path: Some(dirs),
        }
    }

    fn dirs(&self) -> Vec<PathBuf> {
        match &self.search_path {
            Some(dirs) => dirs.clone(),
            None => env::var_os("PATH")
                .map(|value| env::split_paths(&value).collect())
                .unwrap_or_default(),
        }
    }
}

impl DecoderProbe for CommandProbe {
    fn available_decoder_formats(&self) -> HashSet<String> {
        let dirs = self.dirs();
        let mut formats = HashSet::new();
        for decoder in DECODERS {
            if dirs.iter().any(|dir| has_executable(dir, decoder.command)) {
                formats.extend(decoder.formats.iter().map(|ext| ext.to_string()));
            }
        }
        formats
    }
}

fn has_executable(dir: &Path, command: &str) -> bool {
    if dir.join(command).is_file() {
        return true;
    }
    cfg!(windows) && dir.join(format!("{}.exe", command)).is_file()
}
