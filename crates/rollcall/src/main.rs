//! `rollcall` - CLI for the attendance client
//!
//! This binary validates scanned QR codes, registers attendance with the
//! configured service and reads back the attendance history.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Parser;
use tracing::debug;

use rollcall::cli::{
    CheckCommand, Cli, Command, ConfigCommand, DistanceCommand, GroupBy, HistoryCommand,
    OutputFormat, StatsCommand, SubmitCommand, WhoamiCommand,
};
use rollcall::flow::{AttendanceFlow, FlowFailure, FlowState, ScanOutcome};
use rollcall::history::{
    self, AttendanceSummary, HistoryClient, HistoryQuery, StatsReport, StatsSource,
};
use rollcall::location::{FixedLocationSource, GeolocationProvider, LocationTier};
use rollcall::{
    geo, init_logging, AttendanceError, AttendanceReceipt, AttendanceRecord,
    AttendanceSubmitter, Config, Coordinates, HttpTransport, QrCode, Session, SessionStore,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    match cli.command {
        Command::Check(cmd) => handle_check(&cmd),
        Command::Distance(cmd) => handle_distance(&cmd),
        Command::Submit(cmd) => handle_submit(&load_config(cli.config)?, cmd).await,
        Command::History(cmd) => handle_history(&load_config(cli.config)?, &cmd).await,
        Command::Stats(cmd) => handle_stats(&load_config(cli.config)?, &cmd).await,
        Command::Whoami(cmd) => handle_whoami(&load_config(cli.config)?, &cmd).await,
        Command::Config(cmd) => handle_config(cli.config, cmd),
    }
}

fn load_config(path: Option<PathBuf>) -> Result<Config> {
    let config = Config::load_from(path).context("failed to load configuration")?;
    debug!(?config, "Configuration loaded");
    Ok(config)
}

fn transport(config: &Config) -> Result<HttpTransport> {
    let session = match &config.api.token {
        Some(token) => SessionStore::with_session(Session::new(token.clone())),
        None => SessionStore::new(),
    };
    Ok(HttpTransport::new(
        &config.api.base_url,
        config.request_timeout(),
        Arc::new(session),
    )?)
}

/// Turn an API failure into a command error, pointing at the token when the
/// server rejected it.
fn api_error(err: AttendanceError) -> anyhow::Error {
    if err.kind().requires_reauthentication() {
        anyhow::Error::new(err)
            .context("the server rejected the API token; sign in again and update api.token")
    } else {
        err.into()
    }
}

fn handle_check(cmd: &CheckCommand) -> Result<()> {
    let code = QrCode::parse(&cmd.qr)?;
    println!("Valid event code: {code}");
    Ok(())
}

fn handle_distance(cmd: &DistanceCommand) -> Result<()> {
    let from = Coordinates::new(cmd.lat1, cmd.lon1);
    let to = Coordinates::new(cmd.lat2, cmd.lon2);
    from.validate()?;
    to.validate()?;

    let distance = geo::distance_meters(cmd.lat1, cmd.lon1, cmd.lat2, cmd.lon2);
    println!("{distance:.2} m");
    if let Some(radius) = cmd.radius {
        let verdict = if distance <= radius { "within" } else { "outside" };
        println!("{verdict} the {radius} m radius");
    }
    Ok(())
}

async fn handle_submit(config: &Config, cmd: SubmitCommand) -> Result<()> {
    let position = match (cmd.lat, cmd.lon) {
        (Some(latitude), Some(longitude)) => Some(Coordinates::new(latitude, longitude)),
        _ => config.location.coordinates(),
    };
    let accuracy = cmd.accuracy.or(config.location.accuracy);
    let source = position.map_or_else(FixedLocationSource::disabled, |position| {
        FixedLocationSource::new(position, accuracy)
    });
    let location_config = cmd
        .tier
        .map_or_else(|| config.location_config(), |tier| LocationTier::from(tier).config());

    let flow = AttendanceFlow::new(
        GeolocationProvider::new(source),
        AttendanceSubmitter::new(transport(config)?),
        location_config,
    );
    flow.start_scanning();
    let outcome = flow.scan(&cmd.qr).await;
    flow.close();

    match outcome {
        ScanOutcome::Completed(FlowState::Success(receipt)) => {
            print_receipt(&receipt, cmd.format)
        }
        ScanOutcome::Completed(FlowState::Error(failure)) => {
            print_failure(&failure, cmd.format)?;
            Err(failure.error().clone().into())
        }
        other => bail!("attendance attempt ended unexpectedly: {other:?}"),
    }
}

fn print_receipt(receipt: &AttendanceReceipt, format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(receipt)?);
        return Ok(());
    }

    if receipt.verified() {
        println!("Attendance registered and verified.");
    } else {
        println!("Attendance registered, but you were outside the event radius.");
    }
    if let Some(name) = receipt.event_name() {
        println!("  Event:     {name}");
    }
    println!("  Distance:  {:.1} m", receipt.distance_meters);
    println!("  Position:  {}", receipt.record.user_coordinates());
    println!("  Time:      {}", receipt.record.checked_in_at.to_rfc3339());
    if let Some(message) = &receipt.message {
        println!("  Server:    {message}");
    }
    Ok(())
}

fn print_failure(failure: &FlowFailure, format: OutputFormat) -> Result<()> {
    let error = failure.error();
    if format == OutputFormat::Json {
        let body = serde_json::json!({
            "kind": failure.kind().as_str(),
            "message": failure.message(),
            "remediation": failure.remediation().to_string(),
            "server_message": error.server_message(),
            "sent": !error.is_local(),
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    println!("{}", failure.message());
    if let Some(message) = error.server_message() {
        println!("  Server:    {message}");
    }
    println!("  Next step: {}", failure.remediation());
    if error.is_local() {
        println!("  Nothing was sent to the server.");
    }
    Ok(())
}

async fn handle_history(config: &Config, cmd: &HistoryCommand) -> Result<()> {
    let client = HistoryClient::new(transport(config)?);
    let query = cmd.query();
    let page = client.mine(&query).await.map_err(api_error)?;
    let records = query.apply(&page.attendances);

    if cmd.format == OutputFormat::Json {
        let body = match cmd.group {
            Some(GroupBy::Event) => serde_json::to_value(history::group_by_event(&records))?,
            Some(GroupBy::Date) => serde_json::to_value(history::group_by_date(&records))?,
            None => serde_json::to_value(&records)?,
        };
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    match cmd.group {
        Some(GroupBy::Event) => {
            let now = Utc::now();
            for group in history::group_by_event(&records) {
                let (name, status) = group.event.as_ref().map_or(
                    ("(unknown event)".to_string(), String::new()),
                    |e| (e.name.clone(), format!(" [{}]", e.status_at(now))),
                );
                println!(
                    "{name}{status}: {} check-ins, {} verified, avg {:.1} m, last {}",
                    group.attendances.len(),
                    group.verified_count,
                    group.average_distance,
                    group.last_check_in.format("%Y-%m-%d %H:%M"),
                );
            }
        }
        Some(GroupBy::Date) => {
            for day in history::group_by_date(&records) {
                println!("{}  ({} events)", day.date, day.events_count);
                for record in &day.attendances {
                    print_record(record, "    ");
                }
            }
        }
        None => {
            for record in &records {
                print_record(record, "");
            }
        }
    }

    let last = page
        .last_page
        .map_or_else(String::new, |last| format!(" of {last}"));
    println!(
        "\nPage {}{last}, {} of {} records shown",
        page.current_page,
        records.len(),
        page.total
    );
    Ok(())
}

fn print_record(record: &AttendanceRecord, indent: &str) {
    let name = record
        .event
        .as_ref()
        .map_or_else(|| format!("event #{}", record.event_id), |e| e.name.clone());
    let mark = if record.verified { "verified" } else { "unverified" };
    println!(
        "{indent}{}  {name}  {:.1} m  {mark}",
        record.checked_in_at.format("%Y-%m-%d %H:%M"),
        record.distance_meters,
    );
}

async fn handle_stats(config: &Config, cmd: &StatsCommand) -> Result<()> {
    let client = HistoryClient::new(transport(config)?);
    let report = if cmd.local {
        let records = client
            .all(&HistoryQuery::default())
            .await
            .map_err(api_error)?;
        StatsReport {
            source: StatsSource::Local,
            summary: AttendanceSummary::from_records(&records),
        }
    } else {
        client.my_stats().await.map_err(api_error)?
    };

    if cmd.format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let summary = &report.summary;
    println!("Attendances:      {}", summary.total);
    println!("Verified:         {}", summary.verified);
    println!("Unverified:       {}", summary.unverified);
    println!("Events attended:  {}", summary.events_attended);
    println!("Average distance: {:.2} m", summary.average_distance);
    if !summary.recent.is_empty() {
        println!("\nMost recent:");
        for record in &summary.recent {
            print_record(record, "  ");
        }
    }
    if report.source == StatsSource::Local && !cmd.local {
        println!("\n(computed from your attendance history; the stats service was unavailable)");
    }
    Ok(())
}

async fn handle_whoami(config: &Config, cmd: &WhoamiCommand) -> Result<()> {
    let transport = transport(config)?;
    let session = transport.session();
    session.refresh(&transport).await.map_err(api_error)?;
    let user = session
        .user()
        .context("the server confirmed the token without a user")?;

    if cmd.format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&user)?);
        return Ok(());
    }
    println!("Signed in as {} <{}>", user.name, user.email);
    println!("  Id:          {}", user.id);
    let role = if user.is_admin() { "administrator" } else { user.role.as_str() };
    println!("  Role:        {role}");
    if let Some(employee_id) = &user.employee_id {
        println!("  Employee id: {employee_id}");
    }
    Ok(())
}

fn handle_config(config_path: Option<PathBuf>, cmd: ConfigCommand) -> Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            let config = Config::load_from(config_path)?;
            if json {
                let mut shown = config.clone();
                if shown.api.token.is_some() {
                    shown.api.token = Some("<redacted>".to_string());
                }
                println!("{}", serde_json::to_string_pretty(&shown)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[API]");
                println!("  Base URL:           {}", config.api.base_url);
                println!("  Request timeout:    {:?}", config.request_timeout());
                println!(
                    "  Token:              {}",
                    if config.api.token.is_some() { "set" } else { "not set" }
                );
                println!();
                println!("[Location]");
                let location = config.location_config();
                println!(
                    "  Tier:               {} (timeout {:?}, max age {:?})",
                    location.tier, location.timeout, location.maximum_age
                );
                match config.location.coordinates() {
                    Some(position) => println!("  Fixed position:     {position}"),
                    None => println!("  Fixed position:     not set"),
                }
            }
        }
        ConfigCommand::Path => {
            println!(
                "{}",
                config_path
                    .unwrap_or_else(Config::default_config_path)
                    .display()
            );
        }
        ConfigCommand::Validate { file } => {
            let path = file
                .or(config_path)
                .unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => bail!("configuration error: {e}"),
            }
        }
    }
    Ok(())
}
