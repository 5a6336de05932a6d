use crate::application::bootstrap::bootstrap_workspace;
use crate::application::entity_store::{EntityStore, LoadOutcome};
use crate::application::forecast::ForecastService;
use crate::application::planner::{EntryChange, Planner};
use crate::domain::models::{EntryDraft, EntryType, ScheduleEntry, Tag, ViewMode};
use crate::infrastructure::config::{load_secrets_from_env, PlannerConfig, Secrets};
use crate::infrastructure::document_store::{
    DocumentStore, FileDocumentStore, ReqwestJsonBinStore,
};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::weather_client::ReqwestWeatherClient;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const LOCAL_TIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

#[derive(Debug, Parser)]
#[command(name = "ink-planner", version, about = "Calendar and task planner")]
pub struct Cli {
    /// Workspace holding config/ and state/ (defaults to the current directory).
    #[arg(long, global = true)]
    pub workspace: Option<PathBuf>,

    /// Use the local document file even when store credentials are set.
    #[arg(long, global = true)]
    pub offline: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Render the current view, optionally switching view or navigating first.
    Show {
        #[arg(long)]
        view: Option<ViewMode>,
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        offset: i32,
    },
    /// List free time slots for a day (defaults to today).
    Slots { date: Option<NaiveDate> },
    /// Create an entry, or replace the one with `--id`.
    Save {
        #[arg(long)]
        id: Option<u64>,
        #[arg(long = "type", default_value = "schedule")]
        entry_type: EntryType,
        #[arg(long)]
        title: String,
        /// RFC 3339 or local `YYYY-MM-DDTHH:MM` in the configured timezone.
        #[arg(long)]
        start: String,
        #[arg(long)]
        end: String,
        #[arg(long, default_value = "")]
        location: String,
        #[arg(long, default_value = "")]
        notes: String,
        #[arg(long, default_value = "white")]
        tag: Tag,
    },
    /// Flip a task between pending and completed.
    Toggle { id: u64 },
    Delete {
        id: u64,
        /// Confirms the deletion.
        #[arg(long)]
        yes: bool,
    },
    /// Show one entry with its status and, for schedules, the weather forecast.
    Details { id: u64 },
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Self::Show { .. } => "show",
            Self::Slots { .. } => "slots",
            Self::Save { .. } => "save",
            Self::Toggle { .. } => "toggle",
            Self::Delete { .. } => "delete",
            Self::Details { .. } => "details",
        }
    }

    fn mutates(&self) -> bool {
        matches!(
            self,
            Self::Save { .. } | Self::Toggle { .. } | Self::Delete { .. }
        )
    }
}

#[derive(Debug, Serialize)]
struct ChangeOutput {
    entry: ScheduleEntry,
    saved: bool,
}

pub async fn execute(cli: Cli) -> Result<(), InfraError> {
    let secrets = load_secrets_from_env()?;
    let output = execute_with_secrets(cli, secrets).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Runs one command and returns its JSON output.
pub async fn execute_with_secrets(cli: Cli, secrets: Secrets) -> Result<Value, InfraError> {
    let workspace_root = match cli.workspace {
        Some(path) => path,
        None => std::env::current_dir()?,
    };
    let bootstrap = bootstrap_workspace(&workspace_root)?;
    let config = bootstrap.config;
    let timezone = config.time_zone()?;

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.http_timeout_seconds))
        .build()
        .map_err(|error| InfraError::from_reqwest("failed building http client", error))?;

    let weather = match secrets.weather_api_key.as_deref() {
        Some(api_key) => Some(Arc::new(
            ReqwestWeatherClient::with_endpoints(
                http.clone(),
                api_key,
                &config.weather.geocoding_endpoint,
                &config.weather.forecast_endpoint,
            )?
            .with_forecast_days(config.weather.forecast_days),
        )),
        None => None,
    };
    let forecast = ForecastService::new(weather, config.default_location.clone(), timezone)
        .with_retry_policy(config.retry.clone());

    match secrets.document_store.as_ref().filter(|_| !cli.offline) {
        Some(credentials) => {
            let store = ReqwestJsonBinStore::new(
                http,
                &config.document_store.endpoint,
                &credentials.bin_id,
                &credentials.master_key,
            )?;
            info!(endpoint = %store.endpoint(), "using remote document store");
            run_command(cli.command, Arc::new(store), forecast, &config, timezone).await
        }
        None => {
            let store = FileDocumentStore::new(bootstrap.offline_document_path);
            info!(path = %store.path().display(), "using local document file");
            run_command(cli.command, Arc::new(store), forecast, &config, timezone).await
        }
    }
}

async fn run_command<S>(
    command: Command,
    document_store: Arc<S>,
    forecast: ForecastService<ReqwestWeatherClient>,
    config: &PlannerConfig,
    timezone: Tz,
) -> Result<Value, InfraError>
where
    S: DocumentStore + 'static,
{
    let store = EntityStore::new(document_store, timezone).with_retry_policy(config.retry.clone());
    let mut planner = Planner::new(store, forecast, config.slot_window);

    let outcome = planner.load().await;
    if outcome == LoadOutcome::Unavailable && command.mutates() {
        return Err(InfraError::Network(format!(
            "document store unavailable, refusing to run {} over an empty state",
            command.name()
        )));
    }

    match command {
        Command::Show { view, offset } => {
            if let Some(save) = planner.navigate(view, offset) {
                if !save.wait().await {
                    warn!("view change was not persisted");
                }
            }
            Ok(serde_json::to_value(planner.render())?)
        }
        Command::Slots { date } => {
            let date = date.unwrap_or_else(|| Utc::now().with_timezone(&timezone).date_naive());
            Ok(serde_json::to_value(planner.free_slots(date))?)
        }
        Command::Save {
            id,
            entry_type,
            title,
            start,
            end,
            location,
            notes,
            tag,
        } => {
            let draft = EntryDraft {
                id,
                entry_type,
                title,
                start: parse_entry_time(&start, &timezone)?,
                end: parse_entry_time(&end, &timezone)?,
                location,
                notes,
                tag,
            };
            finish_change(planner.save_entry(draft)?).await
        }
        Command::Toggle { id } => finish_change(planner.toggle_task(id)?).await,
        Command::Delete { id, yes } => {
            if !yes {
                return Err(InfraError::Validation(format!(
                    "deleting entry {id} needs confirmation, pass --yes"
                )));
            }
            finish_change(planner.delete_entry(id)?).await
        }
        Command::Details { id } => Ok(serde_json::to_value(planner.entry_details(id).await?)?),
    }
}

async fn finish_change(change: EntryChange) -> Result<Value, InfraError> {
    let saved = change.save.wait().await;
    if !saved {
        warn!(id = change.entry.id, "change kept in memory only, document save failed");
    }
    Ok(serde_json::to_value(ChangeOutput {
        entry: change.entry,
        saved,
    })?)
}

/// Accepts RFC 3339 timestamps or a local wall-clock time in `timezone`.
pub fn parse_entry_time<Z: TimeZone>(raw: &str, timezone: &Z) -> Result<DateTime<Utc>, InfraError> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    LOCAL_TIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .and_then(|local| timezone.from_local_datetime(&local).earliest())
        .map(|local| local.with_timezone(&Utc))
        .ok_or_else(|| InfraError::Validation(format!("invalid date/time: {raw}")))
}
