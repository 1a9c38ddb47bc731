use std::fmt::Display;

use ansi_term::{ANSIGenericString, Colour};
use anyhow::{anyhow, Result};
use chrono::{DateTime, Local, NaiveDate, Utc};
use chrono_english::parse_date_string;
use clap::{CommandFactory, Parser, ValueEnum};

use crate::{
    api::{presentation::handle_bridge_message, records::create_record},
    daemon::storage::{
        entities::StoredRecord,
        query::{aggregate, list_records, DailyStats, RecordFilter, StatsFilter, DEFAULT_LIST_LIMIT},
        record_event::EventKind,
        record_storage::RecordStorage,
    },
};

use super::Args;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum DateStyle {
    Uk,
    Us,
}

impl From<DateStyle> for chrono_english::Dialect {
    fn from(value: DateStyle) -> Self {
        match value {
            DateStyle::Uk => Self::Uk,
            DateStyle::Us => Self::Us,
        }
    }
}

impl Display for DateStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DateStyle::Uk => write!(f, "uk"),
            DateStyle::Us => write!(f, "us"),
        }
    }
}

#[derive(Debug, Parser)]
pub struct RecordsCommand {
    #[arg(long = "pc-name", help = "Only records of this machine")]
    pc_name: Option<String>,
    #[arg(
        long = "start",
        short,
        help = "Earliest start time. Examples are \"yesterday\", \"1 hour ago\", \"15/03/2025\", \"12:00 16/03/2025\""
    )]
    start_date: Option<String>,
    #[arg(
        long = "end",
        short,
        help = "Latest start time. Examples are \"yesterday\", \"1 hour ago\", \"15/03/2025\", \"12:00 16/03/2025\""
    )]
    end_date: Option<String>,
    #[arg(long, short = 'n', default_value_t = DEFAULT_LIST_LIMIT)]
    limit: usize,
    #[arg(long, default_value_t = DateStyle::Uk, help = "Style of dates used during parsing. For Uk it's day/month/year. For Us it's month/day/year")]
    date_style: DateStyle,
    #[arg(long, help = "Print raw json rows")]
    json: bool,
}

#[derive(Debug, Parser)]
pub struct StatsCommand {
    #[arg(long = "pc-name", help = "Only totals of this machine")]
    pc_name: Option<String>,
    #[arg(long, short, help = "Only this UTC day, e.g. \"2025-03-15\" or \"yesterday\"")]
    date: Option<String>,
    #[arg(long, default_value_t = DateStyle::Uk)]
    date_style: DateStyle,
    #[arg(long, help = "Print raw json rows")]
    json: bool,
}

fn validation_error(message: String) -> anyhow::Error {
    Args::command()
        .error(clap::error::ErrorKind::ValueValidation, message)
        .into()
}

fn parse_moment(
    name: &str,
    value: &str,
    now: DateTime<Local>,
    date_style: DateStyle,
) -> Result<DateTime<Utc>> {
    parse_date_string(value, now, date_style.into())
        .map(|v| v.with_timezone(&Utc))
        .map_err(|e| validation_error(format!("Failed to validate {name} {e}")))
}

fn parse_day(value: &str, now: DateTime<Local>, date_style: DateStyle) -> Result<NaiveDate> {
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok(date);
    }
    parse_date_string(value, now, date_style.into())
        .map(|v| v.date_naive())
        .map_err(|e| validation_error(format!("Failed to validate date {e}")))
}

fn records_filter(command: &RecordsCommand, now: DateTime<Local>) -> Result<RecordFilter> {
    Ok(RecordFilter {
        pc_name: command.pc_name.clone(),
        start: command
            .start_date
            .as_deref()
            .map(|v| parse_moment("start", v, now, command.date_style))
            .transpose()?,
        end: command
            .end_date
            .as_deref()
            .map(|v| parse_moment("end", v, now, command.date_style))
            .transpose()?,
        limit: command.limit,
    })
}

/// Command to process `records`. Prints matching records newest first.
pub async fn process_records_command(
    storage: impl RecordStorage,
    command: RecordsCommand,
) -> Result<()> {
    let filter = records_filter(&command, Local::now())?;
    let records = list_records(storage, &filter).await?;

    if command.json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }
    for record in &records {
        println!("{}", format_record(record));
    }
    Ok(())
}

/// Command to process `stats`. Prints one line per machine and day.
pub async fn process_stats_command(storage: impl RecordStorage, command: StatsCommand) -> Result<()> {
    let filter = StatsFilter {
        pc_name: command.pc_name.clone(),
        date: command
            .date
            .as_deref()
            .map(|v| parse_day(v, Local::now(), command.date_style))
            .transpose()?,
    };
    let stats = aggregate(storage, &filter).await?;

    if command.json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }
    for entry in &stats {
        println!("{}", format_stats(entry));
    }
    Ok(())
}

pub async fn process_bridge_command(storage: impl RecordStorage, message: &str) -> Result<()> {
    if let Some(reply) = handle_bridge_message(&storage, message).await {
        println!("{reply}");
    }
    Ok(())
}

/// Command to process `ingest`. Stores one record given as the json body the records endpoint
/// accepts and prints the reply. A rejected record is an error.
pub async fn process_ingest_command(storage: impl RecordStorage, body: &str) -> Result<()> {
    let body = serde_json::from_str(body)
        .map_err(|e| validation_error(format!("Record is not valid json {e}")))?;
    let response = create_record(&storage, body).await;
    println!("{}", serde_json::to_string_pretty(&response.body)?);
    if response.status >= 400 {
        return Err(anyhow!("Record rejected with status {}", response.status));
    }
    Ok(())
}

fn paint_kind(kind: EventKind) -> ANSIGenericString<'static, str> {
    match kind {
        EventKind::WindowOpen => Colour::Green.paint(kind.as_str()),
        EventKind::WindowClose => Colour::Blue.paint(kind.as_str()),
        EventKind::Unknown => Colour::Red.paint(kind.as_str()),
        _ => Colour::Yellow.paint(kind.as_str()),
    }
}

fn format_record(record: &StoredRecord) -> String {
    let duration = record
        .duration_seconds
        .map(format_duration)
        .unwrap_or_else(|| "-".to_string());
    format!(
        "{}\t{}\t{}\t{}\t{}",
        record.start_time.with_timezone(&Local).format("%x %H:%M:%S"),
        paint_kind(record.event_type),
        duration,
        record.pc_name,
        record.window_title
    )
}

fn format_stats(stats: &DailyStats) -> String {
    format!(
        "{}\t{}\t{} events\t{} opens\t{}",
        stats.date,
        stats.pc_name,
        stats.total_events,
        stats.window_opens,
        format_duration(stats.total_seconds)
    )
}

fn format_duration(seconds: i64) -> String {
    let (hours, minutes, seconds) = (seconds / 3600, seconds / 60 % 60, seconds % 60);
    if hours > 0 {
        format!("{hours}h{minutes}m{seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m{seconds}s")
    } else {
        format!("{seconds}s")
    }
}
