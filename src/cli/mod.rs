//! Command-line interface for r4.

mod progress;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{ArgAction, Args, Parser, Subcommand};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::api::ApiClient;
use crate::catalog::{Catalog, DEFAULT_SEARCH_LIMIT, SearchScope};
use crate::config::AppConfig;
use crate::download::Downloader;
use crate::error::{Error, Result};
use crate::format::{
    OutputFormat, channel_line, plural, render_channel, render_channels, render_tracks, to_json,
    track_line,
};
use crate::legacy::LegacyDataset;
use crate::model::{ChannelInput, TrackInput};
use crate::tool::{YT_DLP, YtDlp};

pub use progress::{CliProgress, print_summary};

/// Radio4000 command-line client.
#[derive(Parser, Debug)]
#[command(name = "r4", version, about, long_about = None)]
pub struct Cli {
    /// More log output (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List, view and edit channels
    #[command(subcommand)]
    Channel(ChannelCommand),

    /// List, view and edit tracks
    #[command(subcommand)]
    Track(TrackCommand),

    /// Search channels and tracks
    Search(SearchArgs),

    /// Download the audio of a channel's tracks
    Download(DownloadArgs),

    /// Sign in and out
    #[command(subcommand)]
    Auth(AuthCommand),
}

#[derive(Subcommand, Debug)]
pub enum ChannelCommand {
    /// List channels (from the API or the bundled v1 data)
    List {
        /// Maximum number of channels
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
    },
    /// Show one or more channels
    View {
        #[arg(required = true)]
        slugs: Vec<String>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
    },
    /// Create a channel
    Create {
        /// Channel slug (e.g. my-sounds)
        slug: String,
        #[command(flatten)]
        fields: ChannelFields,
    },
    /// Update a channel
    Update {
        slug: String,
        /// New slug
        #[arg(long)]
        new_slug: Option<String>,
        #[command(flatten)]
        fields: ChannelFields,
    },
    /// Delete one or more channels
    Delete {
        #[arg(required = true)]
        slugs: Vec<String>,
    },
}

#[derive(Args, Debug, Default)]
pub struct ChannelFields {
    /// Channel name
    #[arg(long)]
    pub name: Option<String>,
    /// Channel description
    #[arg(long)]
    pub description: Option<String>,
    /// Image id or URL
    #[arg(long)]
    pub image: Option<String>,
    /// Website
    #[arg(long)]
    pub url: Option<String>,
}

impl ChannelFields {
    fn into_input(self, slug: Option<String>) -> ChannelInput {
        ChannelInput {
            slug,
            name: self.name,
            description: self.description,
            image: self.image,
            url: self.url,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum TrackCommand {
    /// List tracks, optionally of some channels
    List {
        /// Channel slug (repeatable)
        #[arg(long = "channel")]
        channels: Vec<String>,
        /// Maximum number of tracks
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
    },
    /// Show one or more tracks
    View {
        #[arg(required = true)]
        ids: Vec<String>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
    },
    /// Add a track to a channel
    Create {
        /// Channel slug
        #[arg(long)]
        channel: String,
        #[command(flatten)]
        fields: TrackFields,
    },
    /// Update a track
    Update {
        id: String,
        #[command(flatten)]
        fields: TrackFields,
    },
    /// Delete one or more tracks
    Delete {
        #[arg(required = true)]
        ids: Vec<String>,
    },
}

#[derive(Args, Debug, Default)]
pub struct TrackFields {
    /// Track title
    #[arg(long)]
    pub title: Option<String>,
    /// Track URL
    #[arg(long)]
    pub url: Option<String>,
    /// Track description
    #[arg(long)]
    pub description: Option<String>,
}

impl From<TrackFields> for TrackInput {
    fn from(fields: TrackFields) -> Self {
        Self {
            title: fields.title,
            url: fields.url,
            description: fields.description,
        }
    }
}

#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Search query
    pub query: String,
    /// Search only channels
    #[arg(short, long, conflicts_with = "tracks")]
    pub channels: bool,
    /// Search only tracks
    #[arg(short, long)]
    pub tracks: bool,
    /// Results per category
    #[arg(long, default_value_t = DEFAULT_SEARCH_LIMIT)]
    pub limit: usize,
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl SearchArgs {
    const fn scope(&self) -> SearchScope {
        match (self.channels, self.tracks) {
            (true, _) => SearchScope::Channels,
            (false, true) => SearchScope::Tracks,
            (false, false) => SearchScope::All,
        }
    }
}

#[derive(Args, Debug)]
pub struct DownloadArgs {
    /// Channel slug
    pub slug: String,
    /// Output directory; tracks go to <output>/<slug>/tracks
    #[arg(short, long, default_value = ".")]
    pub output: PathBuf,
    /// Number of concurrent downloads [default: 5]
    #[arg(long)]
    pub concurrency: Option<usize>,
    /// Show what would happen without doing it
    #[arg(long, alias = "simulate")]
    pub dry_run: bool,
    /// Retry tracks that failed recently
    #[arg(long)]
    pub retry_failed: bool,
    /// Hours a failure blocks retries (0 = until --retry-failed) [default: 24]
    #[arg(long)]
    pub failure_window: Option<u64>,
    /// Use premium YouTube Music (requires --po-token)
    #[arg(long, requires = "po_token")]
    pub premium: bool,
    /// Premium token for YouTube Music
    #[arg(long)]
    pub po_token: Option<String>,
    /// Path of the yt-dlp binary
    #[arg(long)]
    pub tool: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum AuthCommand {
    /// Sign in with email and password
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "R4_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Forget the stored session
    Logout,
    /// Show the signed-in user
    Whoami,
}

/// Runs a parsed command line.
///
/// # Errors
///
/// Returns any error that should end the process with a non-zero status.
pub async fn run(cli: Cli, cancel: CancellationToken) -> Result<()> {
    let config = AppConfig::load()?;
    match cli.command {
        Command::Channel(command) => run_channel(&config, command).await,
        Command::Track(command) => run_track(&config, command).await,
        Command::Search(args) => run_search(&config, &args).await,
        Command::Download(args) => run_download(&config, args, &cancel).await,
        Command::Auth(command) => run_auth(config, command).await,
    }
}

fn build_catalog(config: &AppConfig) -> Catalog {
    let api = if config.api.is_configured() {
        ApiClient::new(&config.api, config.auth.session.clone())
            .inspect_err(|e| log::warn!("{e}"))
            .ok()
    } else {
        log::info!("No API URL configured, using bundled v1 data");
        None
    };
    Catalog::new(api, LegacyDataset::new(&config.paths.data_dir))
}

async fn run_channel(config: &AppConfig, command: ChannelCommand) -> Result<()> {
    let catalog = build_catalog(config);
    match command {
        ChannelCommand::List { limit, format } => {
            let channels = catalog.list_channels(limit).await?;
            println!("{}", render_channels(&channels, format)?);
        }
        ChannelCommand::View { slugs, format } => {
            let mut channels = Vec::with_capacity(slugs.len());
            for slug in &slugs {
                channels.push(catalog.channel(slug).await?);
            }
            let output = match channels.as_slice() {
                [channel] => render_channel(channel, format)?,
                _ => render_channels(&channels, format)?,
            };
            println!("{output}");
        }
        ChannelCommand::Create { slug, fields } => {
            let channel = catalog.create_channel(&fields.into_input(Some(slug))).await?;
            println!("{}", to_json(&channel)?);
        }
        ChannelCommand::Update {
            slug,
            new_slug,
            fields,
        } => {
            let channel = catalog
                .update_channel(&slug, &fields.into_input(new_slug))
                .await?;
            println!("{}", to_json(&channel)?);
        }
        ChannelCommand::Delete { slugs } => {
            for slug in slugs {
                catalog.delete_channel(&slug).await?;
                println!("{}", to_json(&json!({ "success": true, "slug": slug }))?);
            }
        }
    }
    Ok(())
}

async fn run_track(config: &AppConfig, command: TrackCommand) -> Result<()> {
    let catalog = build_catalog(config);
    match command {
        TrackCommand::List {
            channels,
            limit,
            format,
        } => {
            let mut tracks = catalog.list_tracks(&channels).await?;
            if let Some(limit) = limit {
                tracks.truncate(limit);
            }
            println!("{}", render_tracks(&tracks, format)?);
        }
        TrackCommand::View { ids, format } => {
            let mut tracks = Vec::with_capacity(ids.len());
            for id in &ids {
                tracks.push(catalog.track(id).await?);
            }
            println!("{}", render_tracks(&tracks, format)?);
        }
        TrackCommand::Create { channel, fields } => {
            let track = catalog.create_track(&channel, &fields.into()).await?;
            println!("{}", to_json(&track)?);
        }
        TrackCommand::Update { id, fields } => {
            let track = catalog.update_track(&id, &fields.into()).await?;
            println!("{}", to_json(&track)?);
        }
        TrackCommand::Delete { ids } => {
            for id in ids {
                catalog.delete_track(&id).await?;
                println!("{}", to_json(&json!({ "success": true, "id": id }))?);
            }
        }
    }
    Ok(())
}

async fn run_search(config: &AppConfig, args: &SearchArgs) -> Result<()> {
    let catalog = build_catalog(config);
    let scope = args.scope();
    let results = catalog.search(&args.query, scope, args.limit).await?;
    let query = &args.query;

    if args.json {
        let output = match scope {
            SearchScope::Channels => to_json(&results.channels)?,
            SearchScope::Tracks => to_json(&results.tracks)?,
            SearchScope::All => to_json(&results)?,
        };
        println!("{output}");
        return Ok(());
    }

    let channel_lines = || {
        results
            .channels
            .iter()
            .map(channel_line)
            .collect::<Vec<_>>()
            .join("\n")
    };
    let track_lines = || {
        results
            .tracks
            .iter()
            .map(track_line)
            .collect::<Vec<_>>()
            .join("\n")
    };

    match scope {
        SearchScope::Channels if results.channels.is_empty() => {
            println!("No channels found for \"{query}\"");
        }
        SearchScope::Channels => {
            let found = plural(results.channels.len(), "channel");
            println!("Found {found}:\n{}", channel_lines());
        }
        SearchScope::Tracks if results.tracks.is_empty() => {
            println!("No tracks found for \"{query}\"");
        }
        SearchScope::Tracks => {
            let found = plural(results.tracks.len(), "track");
            println!("Found {found}:\n{}", track_lines());
        }
        SearchScope::All if results.is_empty() => println!("No results found for \"{query}\""),
        SearchScope::All => {
            let mut parts = Vec::new();
            if !results.channels.is_empty() {
                let count = results.channels.len();
                parts.push(format!("Channels ({count}):\n{}", channel_lines()));
            }
            if !results.tracks.is_empty() {
                let count = results.tracks.len();
                parts.push(format!("Tracks ({count}):\n{}", track_lines()));
            }
            println!("{}", parts.join("\n\n"));
        }
    }
    Ok(())
}

async fn run_download(
    config: &AppConfig,
    args: DownloadArgs,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut download = config
        .download
        .clone()
        .with_simulate(args.dry_run)
        .with_retry_failed(args.retry_failed);
    if let Some(concurrency) = args.concurrency {
        download = download.with_concurrency(concurrency);
    }
    if let Some(hours) = args.failure_window {
        download = download.with_failure_window_hours(hours);
    }
    if args.premium {
        download = download.with_premium(args.po_token);
        println!("Premium mode enabled - using YouTube Music with provided token");
    }
    download.validate()?;

    let tool = match args.tool.or_else(|| download.tool_path.clone()) {
        Some(path) => YtDlp::new(path),
        None => match YtDlp::from_path() {
            Some(tool) => tool,
            // Simulation never runs the tool.
            None if download.simulate => YtDlp::new(PathBuf::from(YT_DLP)),
            None => {
                return Err(Error::ExternalTool(format!(
                    "{YT_DLP} not found on PATH; install it or pass --tool"
                )));
            }
        },
    };
    log::debug!("Using {}", tool.binary_path().display());

    let simulate = download.simulate;
    let catalog = build_catalog(config);
    let downloader = Downloader::new(Arc::new(tool), download);
    let progress = CliProgress::new();

    let result = downloader
        .download_channel(&args.slug, &args.output, catalog.track_sources(), &progress, cancel)
        .await;
    progress.finish();
    let summary = result?;

    print_summary(&summary, simulate);
    if cancel.is_cancelled() {
        println!("Interrupted; {} not finished", plural(summary.cancelled, "track"));
    }
    Ok(())
}

async fn run_auth(mut config: AppConfig, command: AuthCommand) -> Result<()> {
    match command {
        AuthCommand::Login { email, password } => {
            let api = ApiClient::new(&config.api, None)?;
            let session = api.sign_in(&email, &password).await?;
            config.auth.session = Some(session.access_token.clone());
            config.save()?;

            eprintln!(
                "\nAuthentication successful. Session saved to {}",
                config.paths.config_file().display()
            );
            eprintln!("To use this session elsewhere, set the environment variable:");
            eprintln!("  export R4_AUTH_TOKEN=\"{}\"\n", session.access_token);
            println!(
                "{}",
                to_json(&json!({ "user": session.user, "message": "Authenticated successfully" }))?
            );
        }
        AuthCommand::Logout => {
            config.auth.session = None;
            config.save()?;
            println!("{}", to_json(&json!({ "success": true }))?);
        }
        AuthCommand::Whoami => {
            let output = if config.session().is_none() {
                json!({
                    "authenticated": false,
                    "message": "Not authenticated. Run: r4 auth login",
                })
            } else {
                let user = ApiClient::new(&config.api, config.auth.session.clone())?
                    .user()
                    .await?;
                json!({ "authenticated": true, "user": user })
            };
            println!("{}", to_json(&output)?);
        }
    }
    Ok(())
}
