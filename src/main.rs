use std::path::Path;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use gitgrab::clone::{CloneOptions, clone_list, clone_url};

#[derive(Parser)]
#[command(name = "gitgrab")]
#[command(about = "Reconstruct a repository from an exposed .git directory", long_about = None)]
struct Cli {
    /// Base URL of the exposed site (or a file of URLs with --list)
    url: String,

    /// Target directory (defaults to the URL host)
    dir: Option<String>,

    /// Delete a nonempty target directory before cloning
    #[arg(short, long, conflicts_with = "keep")]
    force: bool,

    /// Clone into a nonempty target directory, keeping existing files
    #[arg(short, long)]
    keep: bool,

    /// Treat URL as a file containing one URL per line
    #[arg(short, long)]
    list: bool,
}

fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(err) = run() {
        eprintln!("{:#}", err);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let opts = CloneOptions {
        force: cli.force,
        keep: cli.keep,
        ..CloneOptions::default()
    };
    let dir = cli.dir.unwrap_or_default();

    if cli.list {
        clone_list(Path::new(&cli.url), &dir, &opts)
    } else {
        clone_url(&cli.url, &dir, &opts)
    }
}
