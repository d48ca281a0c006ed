//! Merged snapshot listing.

use chrono::{Local, TimeZone};
use comfy_table::{Cell, Color, Table};
use std::fmt::Display;
use zbackup_engine::{BackupConfig, BackupEngine, SnapshotRow};
use zbackup_store::SnapshotStore;

const DATE_FORMAT: &str = "%a, %d %b %Y %H:%M";

/// Prints every snapshot known on either pool.
pub fn run<S: SnapshotStore>(engine: &BackupEngine<S>) -> Result<(), Box<dyn std::error::Error>> {
    let rows = engine.list()?;
    println!("{}", render(&rows, engine.config(), &Local));
    Ok(())
}

/// Builds the listing table, one row per snapshot value.
pub fn render<Tz>(rows: &[SnapshotRow], config: &BackupConfig, tz: &Tz) -> Table
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let mut table = Table::new();
    let _ = table.set_header(vec![
        Cell::new("Name").fg(Color::Blue),
        Cell::new("Date").fg(Color::Blue),
        Cell::new("Pool").fg(Color::Blue),
        Cell::new("Backup Pool").fg(Color::Blue),
    ]);

    for row in rows {
        let name = row.snapshot.name();
        let located = |present: bool, volume: &str| {
            if present {
                format!("{volume}@{name}")
            } else {
                String::new()
            }
        };
        let _ = table.add_row(vec![
            Cell::new(name),
            Cell::new(format_date(row.snapshot.created_at(), tz)),
            Cell::new(located(row.on_primary, &config.primary)),
            Cell::new(located(row.on_backup, &config.backup)),
        ]);
    }
    table
}

/// Formats epoch seconds for display, falling back to the raw number.
pub fn format_date<Tz>(epoch_secs: i64, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    match tz.timestamp_opt(epoch_secs, 0).single() {
        Some(date) => date.format(DATE_FORMAT).to_string(),
        None => epoch_secs.to_string(),
    }
}
