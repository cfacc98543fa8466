//! Command-line interface for clamor.
//!
//! This binary manages alarms and silences the ringing one through the
//! daemon's HTTP API.

use std::env;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use clamor_alarm::api_client::{
    self,
    types::{AlarmDraft, AlarmId, AlarmRecord},
};

#[derive(Parser)]
#[command(name = "clamor-cli", version, about = "Control the clamor alarm daemon")]
#[command(after_help = "Environment:\n  CLAMOR_API_URL    API base URL (default: http://127.0.0.1:7786)")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List all alarms
    List,
    /// Add an alarm
    Add {
        #[arg(long)]
        label: String,
        /// Instant to ring, RFC 3339 (e.g. 2026-03-01T07:00:00+01:00)
        #[arg(long, value_parser = parse_instant, required_unless_present = "in_secs")]
        at: Option<OffsetDateTime>,
        /// Ring this many seconds from now
        #[arg(long = "in", value_name = "SECS", conflicts_with = "at")]
        in_secs: Option<u64>,
    },
    /// Change an alarm's label and time (re-arms it)
    Edit {
        id: String,
        #[arg(long)]
        label: String,
        #[arg(long, value_parser = parse_instant)]
        at: OffsetDateTime,
    },
    /// Delete an alarm
    Delete { id: String },
    /// Enable an alarm (re-arms it)
    Enable { id: String },
    /// Disable an alarm
    Disable { id: String },
    /// Show the ringing alarm and noise progress
    Status,
    /// Silence the ringing alarm
    Silence,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    let client = make_client();

    let result = match cli.command {
        Command::List => cmd_list(&client).await,
        Command::Add { label, at, in_secs } => {
            let time = match (at, in_secs) {
                (Some(at), _) => at,
                (None, secs) => {
                    OffsetDateTime::now_utc() + Duration::from_secs(secs.unwrap_or_default())
                }
            };
            cmd_add(&client, AlarmDraft { label, time }).await
        }
        Command::Edit { id, label, at } => {
            cmd_edit(&client, id.into(), AlarmDraft { label, time: at }).await
        }
        Command::Delete { id } => cmd_delete(&client, id.into()).await,
        Command::Enable { id } => cmd_set_enabled(&client, id.into(), true).await,
        Command::Disable { id } => cmd_set_enabled(&client, id.into(), false).await,
        Command::Status => cmd_status(&client).await,
        Command::Silence => cmd_silence(&client).await,
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

/// Build an API client, honoring CLAMOR_API_URL if set.
fn make_client() -> api_client::Client {
    match env::var("CLAMOR_API_URL") {
        Ok(url) => api_client::Client::with_base_url(url),
        Err(_) => api_client::Client::new(),
    }
}

fn parse_instant(s: &str) -> Result<OffsetDateTime, time::error::Parse> {
    OffsetDateTime::parse(s, &Rfc3339)
}

fn print_alarm(alarm: &AlarmRecord) {
    let time = alarm
        .time
        .format(&Rfc3339)
        .unwrap_or_else(|_| alarm.time.to_string());
    let state = match (alarm.enabled, alarm.triggered) {
        (false, _) => "disabled",
        (true, true) => "rang",
        (true, false) => "armed",
    };
    println!(
        "{:<22} {:<26} {:<9} {}",
        alarm.id.as_str(),
        time,
        state,
        alarm.label
    );
}

async fn cmd_list(client: &api_client::Client) -> Result<()> {
    let alarms = client.list_alarms().await?;
    if alarms.is_empty() {
        println!("No alarms.");
        return Ok(());
    }
    for alarm in &alarms {
        print_alarm(alarm);
    }
    Ok(())
}

async fn cmd_add(client: &api_client::Client, draft: AlarmDraft) -> Result<()> {
    let alarm = client.create_alarm(&draft).await?;
    print_alarm(&alarm);
    Ok(())
}

async fn cmd_edit(client: &api_client::Client, id: AlarmId, draft: AlarmDraft) -> Result<()> {
    let alarm = client.edit_alarm(&id, &draft).await?;
    print_alarm(&alarm);
    Ok(())
}

async fn cmd_delete(client: &api_client::Client, id: AlarmId) -> Result<()> {
    client.delete_alarm(&id).await?;
    println!("Deleted {id}");
    Ok(())
}

async fn cmd_set_enabled(client: &api_client::Client, id: AlarmId, enabled: bool) -> Result<()> {
    let alarm = client.set_enabled(&id, enabled).await?;
    print_alarm(&alarm);
    Ok(())
}

/// Print the ringing alarm and how much noise is still needed.
async fn cmd_status(client: &api_client::Client) -> Result<()> {
    let status = client.ring_status().await?;
    let Some(ringing) = status.ringing else {
        println!("Nothing ringing.");
        return Ok(());
    };

    println!("Ringing:  {} ({})", ringing.label, ringing.alarm_id);
    if let Some(alert) = &ringing.alert {
        println!("Alert:    {alert}");
    }
    if ringing.silence_enabled {
        println!("Silence:  available");
    } else {
        println!(
            "Silence:  make noise for {} more second(s) [{:>3.0}%]",
            ringing.remaining_secs,
            ringing.progress * 100.0
        );
    }
    Ok(())
}

async fn cmd_silence(client: &api_client::Client) -> Result<()> {
    let id = client.silence().await?;
    println!("Silenced {id}");
    Ok(())
}
