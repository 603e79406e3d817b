use std::{
    error::Error,
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    process,
};

use clap::{command, Parser, Subcommand, ValueHint};
use log::{debug, error, info, warn, LevelFilter};

use zhangmen::{
    catalog::{self, EndOfCatalog},
    client::Client,
    config::Config,
    downloader::Downloader,
    protocol::Song,
    proxy::{self, Proxy},
    store::Store,
};

/// Profile to display when not built in release mode.
#[cfg(debug_assertions)]
const BUILD_PROFILE: &str = "debug";
/// Profile to display when built in release mode.
#[cfg(not(debug_assertions))]
const BUILD_PROFILE: &str = "release";

/// Group name for mutually exclusive logging options.
const ARGS_GROUP_LOGGING: &str = "logging";

/// Command line arguments as parsed by `clap`.
#[derive(Clone, Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Configuration file
    ///
    /// TOML file overriding any of the built-in defaults.
    #[arg(short, long, value_name = "FILE", value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,

    /// Response cache file
    ///
    /// [default: ~/.zhangmen_cache.json]
    #[arg(long, value_name = "FILE", value_hint = ValueHint::FilePath)]
    cache: Option<PathBuf>,

    /// HTTP proxy as host:port
    ///
    /// Overrides the configuration file and the `http_proxy` environment
    /// variable.
    #[arg(long, value_name = "HOST:PORT", value_hint = ValueHint::Hostname)]
    proxy: Option<Proxy>,

    /// Suppresses all output except warnings and errors.
    #[arg(short, long, default_value_t = false, group = ARGS_GROUP_LOGGING)]
    quiet: bool,

    /// Enable verbose logging
    ///
    /// Specify twice for trace logging.
    #[arg(short, long, action = clap::ArgAction::Count, group = ARGS_GROUP_LOGGING)]
    verbose: u8,
}

#[derive(Clone, Debug, Subcommand)]
enum Command {
    /// List the playlists of every category
    List,

    /// Download every song of a playlist
    ///
    /// Songs are saved as `<author>/<author> - <title>.mp3`.
    Fetch {
        /// Playlist to download
        playlist_id: String,

        /// Directory to save songs in
        #[arg(short, long, value_name = "DIR", value_hint = ValueHint::DirPath, default_value = ".")]
        output: PathBuf,
    },
}

/// Initializes the logger facade.
///
/// The logging level is determined as follows, in order of precedence from
/// highest to lowest:
/// 1. Command line arguments
/// 2. `RUST_LOG` environment variable
/// 3. Hard coded default
///
/// # Panics
///
/// Panics when a logger facade is already initialized.
fn init_logger(args: &Args) {
    let mut logger = env_logger::Builder::from_env(
        // Note: if you change the default logging level here, then you should
        // probably also change the verbosity levels below.
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    if args.quiet || args.verbose > 0 {
        let level = match args.verbose {
            // Quiet and verbose are mutually exclusive.
            0 => LevelFilter::Warn,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        };

        // Filter log messages of external crates.
        logger.filter_module("zhangmen", level);
    }

    logger.init();
}

/// Loads the configuration and applies the command line overrides.
fn load_config(args: &Args) -> Result<Config, Box<dyn Error>> {
    let mut config = match args.config {
        Some(ref path) => Config::from_file(path)
            .map_err(|e| format!("cannot load {}: {e}", path.display()))?,
        None => Config::default(),
    };

    config.proxy = args
        .proxy
        .clone()
        .or(config.proxy)
        .or_else(|| proxy::locate(&proxy::FromEnv));

    Ok(config)
}

/// Prints the playlists of every category, saving the cache as it goes.
async fn list(
    client: &mut Client,
    config: &Config,
    store: Option<&Store>,
) -> Result<(), Box<dyn Error>> {
    let end = catalog::scan(client, config.empty_run, |client, category, playlists| {
        println!("Category {category}");
        for playlist in playlists {
            println!(
                "  {} - {} - {} songs",
                playlist.name, playlist.id, playlist.song_count
            );
        }

        if let Some(store) = store {
            store.save(client.cache());
        }
    })
    .await;

    match end {
        EndOfCatalog::EmptyRun { last } => {
            info!("scanned {last} categories");
            Ok(())
        }
        EndOfCatalog::Failed { at, error } => Err(format!("category {at}: {error}").into()),
    }
}

/// Replaces characters that cannot appear in a file name.
fn path_component(name: &str) -> String {
    let name: String = name
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | '\0') { '_' } else { c })
        .collect();

    match name.trim() {
        "" | "." | ".." => String::from("_"),
        _ => name,
    }
}

fn song_path(output: &Path, song: &Song) -> PathBuf {
    let author = path_component(&song.author);
    let file_name = path_component(&format!("{} - {}.mp3", song.author, song.title));
    output.join(author).join(file_name)
}

/// Downloads every song of a playlist.
///
/// A song that cannot be downloaded is reported and skipped.
async fn fetch(
    client: &mut Client,
    config: &Config,
    store: Option<&Store>,
    playlist_id: &str,
    output: &Path,
) -> Result<(), Box<dyn Error>> {
    let songs = client.playlist(playlist_id).await?;
    if let Some(store) = store {
        store.save(client.cache());
    }
    info!("playlist {playlist_id} has {} songs", songs.len());

    let downloader = Downloader::new(config);
    let mut failed = 0;

    for song in &songs {
        print!("{} - {} ... ", song.author, song.title);
        io::stdout().flush()?;

        let bits = match downloader.fetch(client, song).await {
            Ok(bits) => bits,
            Err(e) => {
                warn!("cannot resolve sources of {}: {e}", song.id);
                None
            }
        };

        let saved = match bits {
            Some(bits) => {
                let path = song_path(output, song);
                if let Some(dir) = path.parent() {
                    fs::create_dir_all(dir)?;
                }
                fs::write(&path, bits)?;
                debug!("saved {}", path.display());
                true
            }
            None => false,
        };

        if saved {
            println!("ok");
        } else {
            failed += 1;
            println!("FAIL");
        }
    }

    if let Some(store) = store {
        store.save(client.cache());
    }

    if failed > 0 {
        warn!("{failed} of {} songs failed", songs.len());
    }

    Ok(())
}

async fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let config = load_config(&args)?;

    let store = args.cache.clone().or_else(Store::default_path).map(Store::new);
    if store.is_none() {
        warn!("no home directory; responses will not be cached between runs");
    }

    let mut client = Client::new(&config)?;
    if let Some(ref store) = store {
        client.set_cache(store.load());
    }

    match args.command {
        Command::List => list(&mut client, &config, store.as_ref()).await,
        Command::Fetch {
            ref playlist_id,
            ref output,
        } => fetch(&mut client, &config, store.as_ref(), playlist_id, output).await,
    }
}

/// Main entry point of the application.
///
/// Initializes the logger facade, parses the command line arguments and
/// runs the requested command.
#[tokio::main(flavor = "current_thread")]
async fn main() {
    // `clap` handles our command line arguments and help text.
    let args = Args::parse();
    init_logger(&args);

    // Dump command line arguments before we do anything more.
    // This aids in debugging of whatever comes next.
    debug!("Command {:#?}", args);

    let cmd = command!();
    let name = cmd.get_name().to_string();
    let version = cmd.get_version().unwrap_or("UNKNOWN").to_string();

    info!("starting {name}/{version}; {BUILD_PROFILE}");

    if let Err(e) = run(args).await {
        error!("{e}");
        process::exit(1);
    }
}
