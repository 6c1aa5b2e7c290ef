use std::fs::{self, File};
use std::panic;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{error, info};
use simplelog::{Config, LevelFilter, WriteLogger};

use bookweave::fragment::Fragment;
use bookweave::labels::LabelSet;
use bookweave::links::{CrossLink, codec};
use bookweave::settings::{self, ViewerSettings};

/// Inspect the encodings a bookweave viewer works with
#[derive(Parser, Debug)]
#[command(name = "bookweave", version, about)]
struct Cli {
    /// Settings file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[arg(long, global = true, default_value = "bookweave.log")]
    log_file: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve a virtual cross-link href to a corpus path
    Link {
        href: String,
        /// Corpus root, overriding the configured one
        #[arg(long)]
        root: Option<String>,
    },
    /// Encode text as cross-link tokens
    Encode { text: String },
    /// Parse an address fragment
    Fragment { hash: String },
    /// Decode a label table dump
    Labels { file: PathBuf },
}

fn initialize_panic_handler() {
    better_panic::install();

    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        error!("bookweave panicked: {panic_info}");
        default_hook(panic_info);
    }));
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    WriteLogger::init(
        LevelFilter::Debug,
        Config::default(),
        File::create(&cli.log_file)
            .with_context(|| format!("creating log file {}", cli.log_file.display()))?,
    )?;
    initialize_panic_handler();

    let config_path = cli.config.clone().or_else(settings::preferred_config_path);
    let settings = ViewerSettings::load_or_default(config_path.as_deref());
    info!("Running {:?}", cli.command);

    if let Err(err) = run(cli.command, &settings) {
        error!("Command failed: {err:?}");
        return Err(err);
    }
    Ok(())
}

fn run(command: Command, settings: &ViewerSettings) -> Result<()> {
    match command {
        Command::Link { href, root } => {
            if !codec::is_cross_link(&href) {
                println!("{href}");
                return Ok(());
            }
            let link = CrossLink::parse(&href)?;
            let root = root.as_deref().unwrap_or(&settings.path_to_root);
            println!(
                "{}",
                link.resolve(root, &settings.source_extension, &settings.target_extension)
            );
        }
        Command::Encode { text } => println!("{}", codec::encode(&text)),
        Command::Fragment { hash } => match Fragment::parse(&hash) {
            Some(Fragment::Label(name)) => println!("label {name:?}"),
            Some(Fragment::Location(pos)) => {
                println!("unit {} at ({}, {})", pos.unit, pos.x, pos.y);
            }
            None => anyhow::bail!("{hash:?} is not a label or location fragment"),
        },
        Command::Labels { file } => {
            let bytes =
                fs::read(&file).with_context(|| format!("reading {}", file.display()))?;
            let labels = LabelSet::from_metadata(&bytes)?;
            for label in labels.iter() {
                let p = label.position;
                println!("{}\tp{}x{}y{}", label.name, p.unit, p.x, p.y);
            }
            info!("Decoded {} labels from {}", labels.len(), file.display());
        }
    }
    Ok(())
}
