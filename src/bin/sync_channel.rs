#![forbid(unsafe_code)]

//! Batch job that mirrors a channel's uploads into a Google Sheets worksheet.
//! Meant to be run from cron: fetch, reconcile, exit.

use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use tubesheet_tools::{
    auth::{SheetsAuth, read_service_account},
    config::{SettingsOverrides, SyncSettings, resolve_settings},
    error::{SyncError, SyncResult},
    reconcile::{ReconcileSummary, reconcile},
    sheets::GoogleSheet,
    youtube::{SearchQuery, YouTubeClient, fetch_videos},
};

#[derive(Debug, Parser)]
#[command(name = "sync_channel", about = "Sync a YouTube channel's uploads into a worksheet")]
struct Cli {
    /// `.env` file to read settings from.
    #[arg(long)]
    env_file: Option<PathBuf>,
    #[arg(long)]
    channel_id: Option<String>,
    /// Only videos published after this RFC 3339 timestamp or YYYY-MM-DD date.
    #[arg(long)]
    since: Option<String>,
    /// Spreadsheet URL or id.
    #[arg(long)]
    spreadsheet: Option<String>,
    #[arg(long)]
    worksheet: Option<String>,
    /// IANA zone used for the date and time columns.
    #[arg(long)]
    timezone: Option<String>,
    /// Service-account key file.
    #[arg(long)]
    credentials: Option<PathBuf>,
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn overrides(&self) -> SettingsOverrides {
        SettingsOverrides {
            channel_id: self.channel_id.clone(),
            published_after: self.since.clone(),
            spreadsheet: self.spreadsheet.clone(),
            worksheet: self.worksheet.clone(),
            timezone: self.timezone.clone(),
            credentials_path: self.credentials.clone(),
            env_path: self.env_file.clone(),
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli) {
        Ok(summary) => {
            info!(
                appended = summary.appended,
                refreshed = summary.refreshed,
                header_inserted = summary.header_inserted,
                "sync complete"
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(kind = err.kind(), "{}", describe(&err));
            ExitCode::from(err.exit_code())
        }
    }
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: &Cli) -> SyncResult<ReconcileSummary> {
    let settings = resolve_settings(cli.overrides()).context("loading settings")?;
    info!(
        channel = %settings.channel_id,
        since = %settings.published_after,
        worksheet = %settings.worksheet,
        "starting sync"
    );

    // Credentials are checked before any quota is spent on the Data API.
    let key = read_service_account(&settings.credentials_path)?;
    let auth = SheetsAuth::connect(key)?;
    let agent = build_agent(&settings);

    let catalog = YouTubeClient::new(agent.clone(), settings.api_key.clone());
    let query = SearchQuery {
        channel_id: settings.channel_id.clone(),
        published_after: settings.published_after,
    };
    let videos = fetch_videos(&catalog, &query, settings.timezone)?;

    let token = auth.access_token()?;
    let mut sheet = GoogleSheet::open(
        agent,
        &token,
        &settings.spreadsheet_id,
        &settings.worksheet,
    )?;
    let summary = reconcile(&mut sheet, &catalog, &videos)?;
    sheet.close();
    Ok(summary)
}

/// Flattens the error and its causes into one log line.
fn describe(err: &SyncError) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

fn build_agent(settings: &SyncSettings) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout(settings.http_timeout)
        .user_agent(concat!("tubesheet-tools/", env!("CARGO_PKG_VERSION")))
        .build()
}
