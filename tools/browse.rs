use std::env;
use std::sync::Arc;

use library::config::{config_path_from_env, load_or_create_config, resolve_path};
use library::{CommandProbe, FileIndex, LocalFs, Model, ModelSettings};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

const USAGE: &str =
    "usage: browse <ls PATH [FILTER] | search QUERY | random N | playable PATH>";

#[derive(Debug, PartialEq, Eq)]
enum Command {
    List { path: String, filter: Option<String> },
    Search(String),
    Random(usize),
    Playable(String),
}

fn parse_command(args: &[String]) -> Result<Command, String> {
    let (name, rest) = args.split_first().ok_or(USAGE)?;
    match name.as_str() {
        "ls" => {
            if rest.len() > 2 {
                return Err(USAGE.to_string());
            }
            Ok(Command::List {
                path: rest.first().cloned().unwrap_or_default(),
                filter: rest.get(1).cloned().filter(|value| !value.is_empty()),
            })
        }
        "search" => Ok(Command::Search(rest.join(" "))),
        "random" => {
            let count = rest
                .first()
                .ok_or(USAGE)?
                .trim()
                .parse::<usize>()
                .map_err(|err| format!("invalid count: {}", err))?;
            Ok(Command::Random(count))
        }
        "playable" => Ok(Command::Playable(rest.join(" "))),
        _ => Err(USAGE.to_string()),
    }
}

#[derive(Serialize)]
struct PlayableView<'a> {
    path: &'a str,
    playable: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let command = parse_command(&args)?;

    let config_path = config_path_from_env();
    let (config, created) = load_or_create_config(&config_path)?;
    if created {
        info!("Created default config at {:?}", config_path);
    } else {
        info!("Loaded config from {:?}", config_path);
    }

    let mut settings = ModelSettings::from_config(&config)?;
    settings.basedir = resolve_path(&config_path, &settings.basedir.to_string_lossy());
    let index_path = resolve_path(&config_path, config.index_path.trim());

    let (index, _) = FileIndex::load_or_scan(settings.basedir.clone(), index_path)?;
    let model = Model::with_settings(
        settings,
        Arc::new(index),
        Arc::new(LocalFs),
        Arc::new(CommandProbe::new()),
    );

    let output = match &command {
        Command::List { path, filter } => {
            serde_json::to_string_pretty(&model.browse(path, filter.as_deref()))?
        }
        Command::Search(query) => serde_json::to_string_pretty(&model.search(query))?,
        Command::Random(count) => {
            serde_json::to_string_pretty(&model.random_music_entries(*count))?
        }
        Command::Playable(path) => serde_json::to_string_pretty(&PlayableView {
            path,
            playable: model.is_playable(path),
        })?,
    };
    println!("{}", output);

    Ok(())
}
