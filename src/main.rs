use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;

use segstore::{
    pack_config, pack_config_with_endpoint, BlobStorage, BlobStorageConfig, BlobStorageFactory,
    Composite, KeySegmentPair, KeyType, LibraryPath, OpenMode, RefKey, RemoveOpts, Segment,
    Storage, StorageExt,
};

#[derive(Parser)]
#[command(name = "segstore")]
#[command(about = "Inspect and maintain segment libraries in blob storage")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct LibraryArgs {
    /// Configuration file path
    #[arg(short, long, default_value = "segstore.toml")]
    config: PathBuf,
    /// Library path, e.g. "research.daily"
    #[arg(short, long)]
    library: String,
    /// Fill missing credentials from AWS_ACCESS_KEY_ID / AWS_SECRET_ACCESS_KEY
    #[arg(long)]
    env_credentials: bool,
}

#[derive(Args)]
struct RefArgs {
    #[command(flatten)]
    library: LibraryArgs,
    /// Key type folder, e.g. "vref"
    #[arg(short, long, value_parser = parse_key_type)]
    key_type: KeyType,
    /// Symbol of the ref key
    #[arg(short, long)]
    symbol: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a configuration template
    InitConfig,
    /// Print the packed configuration envelope as JSON
    PackConfig {
        #[arg(long)]
        container: String,
        #[arg(long)]
        endpoint: Option<String>,
    },
    /// List keys of one type
    List {
        #[command(flatten)]
        library: LibraryArgs,
        #[arg(short, long, value_parser = parse_key_type)]
        key_type: KeyType,
        /// Only keys whose symbol starts with this prefix
        #[arg(short, long, default_value = "")]
        prefix: String,
    },
    /// Print the blob path of a ref key
    Path {
        #[arg(short, long)]
        library: String,
        #[arg(short, long, value_parser = parse_key_type)]
        key_type: KeyType,
        #[arg(short, long)]
        symbol: String,
    },
    /// Read a ref key to a file, or stdout
    GetRef {
        #[command(flatten)]
        key: RefArgs,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Write a ref key from a file
    PutRef {
        #[command(flatten)]
        key: RefArgs,
        #[arg(short, long)]
        input: PathBuf,
    },
    /// Remove a ref key
    RmRef {
        #[command(flatten)]
        key: RefArgs,
        #[arg(long)]
        ignore_missing: bool,
    },
}

fn parse_key_type(folder: &str) -> std::result::Result<KeyType, String> {
    KeyType::from_folder(folder).ok_or_else(|| {
        let known: Vec<&str> = KeyType::ALL.iter().map(|kt| kt.folder()).collect();
        format!("unknown key type '{}', expected one of {}", folder, known.join(", "))
    })
}

fn parse_library(library: &str) -> Result<LibraryPath> {
    LibraryPath::from_delim_path(library, '.')
        .with_context(|| format!("Invalid library path: {}", library))
}

fn open_storage(args: &LibraryArgs, mode: OpenMode) -> Result<BlobStorage> {
    info!("Loading configuration from {:?}", args.config);
    let mut config = BlobStorageConfig::load(&args.config)?;
    if args.env_credentials {
        config = config.with_env_credentials();
    }
    let factory = BlobStorageFactory::new(config).context("Failed to create storage factory")?;
    let lib = parse_library(&args.library)?;
    let storage = factory
        .create(&lib, mode)
        .with_context(|| format!("Failed to open library {}", lib))?;
    Ok(storage)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut stdout = std::io::stdout().lock();

    match cli.command {
        Commands::InitConfig => {
            write!(stdout, "{}", BlobStorageConfig::default_config())?;
        }
        Commands::PackConfig {
            container,
            endpoint,
        } => {
            let envelope = match endpoint {
                Some(endpoint) => pack_config_with_endpoint(&container, &endpoint)?,
                None => pack_config(&container)?,
            };
            stdout.write_all(&envelope.to_bytes()?)?;
            writeln!(stdout)?;
        }
        Commands::List {
            library,
            key_type,
            prefix,
        } => {
            let storage = open_storage(&library, OpenMode::Read)?;
            let mut count = 0usize;
            let mut listed = Ok(());
            storage.iterate_type(
                key_type,
                &mut |key| {
                    count += 1;
                    if listed.is_ok() {
                        listed = writeln!(stdout, "{}\t{}", key, storage.get_key_path(&key));
                    }
                },
                &prefix,
            )?;
            listed?;
            info!("Listed {} keys", count);
        }
        Commands::Path {
            library,
            key_type,
            symbol,
        } => {
            let lib = parse_library(&library)?;
            let key = RefKey::new(key_type, symbol).into();
            writeln!(
                stdout,
                "{}",
                segstore::path::encode_path(&segstore::path::root_folder(&lib), &key)
            )?;
        }
        Commands::GetRef { key, output } => {
            let storage = open_storage(&key.library, OpenMode::Read)?;
            let segment = storage.read_one(RefKey::new(key.key_type, key.symbol).into())?;
            match output {
                Some(path) => {
                    std::fs::write(&path, segment.as_bytes())
                        .with_context(|| format!("Failed to write {:?}", path))?;
                    info!("Wrote {} bytes to {:?}", segment.len(), path);
                }
                None => stdout.write_all(segment.as_bytes())?,
            }
        }
        Commands::PutRef { key, input } => {
            let data = std::fs::read(&input).with_context(|| format!("Failed to read {:?}", input))?;
            let storage = open_storage(&key.library, OpenMode::Write)?;
            let ref_key = RefKey::new(key.key_type, key.symbol);
            storage.write(Composite::single(KeySegmentPair::new(ref_key, Segment::from(data))))?;
            info!("Stored {:?}", input);
        }
        Commands::RmRef {
            key,
            ignore_missing,
        } => {
            let storage = open_storage(&key.library, OpenMode::Delete)?;
            let ref_key = RefKey::new(key.key_type, key.symbol).into();
            storage.remove(
                Composite::single(ref_key),
                RemoveOpts::default().ignore_missing(ignore_missing),
            )?;
            info!("Removed");
        }
    }

    Ok(())
}
