mod error;
mod logging;

use crate::error::{ErrorKind, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use exn::ResultExt;
use podarc_archive::{Context, IaUploader, Mirror, archive_all, sync_all};
use podarc_config::{Credentials, Loaded, Podcasts, Settings, ShowTable};
use podarc_feed::{FilenameGenerator, Resolver};
use podarc_ledger::{DATABASE_FILENAME, Database, Ledger};
use podarc_storage::{Archive, HttpOptions, HttpRemote};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Output root holding `podcasts.json`, `archive/` and `logs/`.
    #[arg(long, global = true)]
    root: Option<PathBuf>,
    /// Settings file (TOML, or JSON by extension).
    #[arg(long, global = true, env = "PODARC_CONFIG")]
    config: Option<PathBuf>,
    /// Increase verbosity (-v, -vv).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Fetch feeds and download new or changed episodes.
    Archive(Selection),
    /// Mirror archived shows to the remote store.
    Sync(Selection),
}

#[derive(Debug, Args)]
struct Selection {
    /// Only this show, by exact name.
    #[arg(long)]
    show: Option<String>,
    /// Episodes fetched (or uploaded) at once.
    #[arg(long)]
    concurrency: Option<usize>,
}

impl Command {
    fn selection(&self) -> &Selection {
        match self {
            Self::Archive(selection) | Self::Sync(selection) => selection,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let settings = match settings(&cli) {
        Ok(settings) => settings,
        Err(error) => {
            // Logging isn't set up yet; it needs the root.
            eprintln!("{error:?}");
            return ExitCode::FAILURE;
        },
    };
    if let Err(error) = std::fs::create_dir_all(settings.logs_dir()) {
        eprintln!("could not create {}: {error}", settings.logs_dir().display());
        return ExitCode::FAILURE;
    }
    let _guard = logging::init(&settings.logs_dir(), cli.verbose);

    let result = tokio::select! {
        result = run(cli.command, settings) => result,
        _ = tokio::signal::ctrl_c() => Err(ErrorKind::Interrupted.into()),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) if *error == ErrorKind::Interrupted => {
            tracing::warn!("interrupted; partial downloads were discarded");
            ExitCode::from(130)
        },
        Err(error) => {
            tracing::error!(?error, "{error}");
            ExitCode::FAILURE
        },
    }
}

fn settings(cli: &Cli) -> Result<Settings> {
    let mut settings = Settings::load(cli.config.as_deref()).or_raise(|| ErrorKind::Config)?;
    if let Some(root) = &cli.root {
        settings = settings.with_root(root.clone());
    }
    if let Some(concurrency) = cli.command.selection().concurrency {
        settings = settings.with_concurrency(concurrency);
    }
    Ok(settings)
}

async fn run(command: Command, settings: Settings) -> Result<()> {
    let podcasts = match Podcasts::load_or_template(settings.podcasts_file()).or_raise(|| ErrorKind::Config)? {
        Loaded::Existing(podcasts) => podcasts.only(command.selection().show.as_deref()),
        Loaded::TemplateCreated(path) => {
            tracing::info!(path = %path.display(), "fill in the feed urls, then run again");
            return Ok(());
        },
    };
    if podcasts.iter().next().is_none() {
        tracing::warn!(show = ?command.selection().show, "no shows selected");
        return Ok(());
    }

    let archive = Archive::new(settings.archive_dir()).or_raise(|| ErrorKind::Storage)?;
    let db = Database::connect(settings.archive_dir().join(DATABASE_FILENAME))
        .await
        .or_raise(|| ErrorKind::Ledger)?;
    let ledger = Ledger::from(&db);

    let result = match command {
        Command::Archive(_) => {
            let shows = ShowTable::load(settings.shows.as_deref()).or_raise(|| ErrorKind::Config)?;
            let resolver = Resolver::new(Arc::new(shows), FilenameGenerator::default());
            let remote = HttpRemote::new(&HttpOptions {
                timeout: settings.timeout(),
                user_agent: settings.user_agent.clone(),
                authorization: None,
                follow_redirects: true,
            })
            .or_raise(|| ErrorKind::Config)?;
            let ctx = Context::new(archive, ledger, Arc::new(remote)).with_concurrency(settings.concurrency);
            archive_all(&ctx, &resolver, &podcasts).await.map(|_| ())
        },
        Command::Sync(_) => {
            let credentials = Credentials::discover().or_raise(|| ErrorKind::Config)?;
            let uploader = IaUploader::probe(&settings.upload_tool).await.or_raise(|| ErrorKind::Config)?;
            // Redirects are inspected by the probe, not followed.
            let remote = HttpRemote::new(&HttpOptions {
                timeout: settings.timeout(),
                user_agent: settings.user_agent.clone(),
                authorization: Some(credentials.authorization()),
                follow_redirects: false,
            })
            .or_raise(|| ErrorKind::Config)?;
            let ctx = Context::new(archive, ledger, Arc::new(remote)).with_concurrency(settings.concurrency);
            let mirror = Mirror::new(&settings.remote_base, &settings.remote_s3_base);
            sync_all(&ctx, &mirror, &uploader, &podcasts).await.map(|_| ())
        },
    };
    db.close().await;
    result.or_raise(|| ErrorKind::Run)
}
