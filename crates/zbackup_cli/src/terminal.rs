//! Terminal front end for engine events and confirmation prompts.

use std::io::{self, BufRead, Write};
use zbackup_engine::{
    Catalog, Confirmer, Reporter, Snapshot, SyncOutcome, TransferRequest, TransferStats,
};

const MIB: f64 = 1024.0 * 1024.0;

/// Prints progress the way an interactive user expects it.
#[derive(Debug, Default)]
pub struct TerminalReporter;

impl TerminalReporter {
    fn print(&self, line: std::fmt::Arguments<'_>) {
        let mut out = io::stdout().lock();
        let _ = writeln!(out, "{line}");
    }
}

/// Formats a running byte total as `Wrote N.NN MB`.
pub fn format_progress(bytes: u64) -> String {
    format!("Wrote {:.2} MB", bytes as f64 / MIB)
}

impl Reporter for TerminalReporter {
    fn sync_started(&self, primary: &str, backup: &str) {
        self.print(format_args!(
            "IMPORTANT: This is a one-way sync: {primary} -> {backup}"
        ));
    }

    fn reconciled(&self, checkpoint: Option<&Snapshot>, pending: Option<&Snapshot>) {
        self.print(format_args!(
            "Last Synced Snapshot: {}",
            checkpoint.map(Snapshot::name).unwrap_or("")
        ));
        self.print(format_args!(
            "Last not Synced Snapshot: {}",
            pending.map(Snapshot::name).unwrap_or("")
        ));
    }

    fn transfer_started(&self, request: &TransferRequest) {
        self.print(format_args!(
            "Sending {}@{} to {}",
            request.source_volume,
            request.snapshot.name(),
            request.target_volume
        ));
    }

    fn transfer_progress(&self, bytes: u64) {
        let mut out = io::stdout().lock();
        let _ = write!(out, "\r{}", format_progress(bytes));
        let _ = out.flush();
    }

    fn transfer_finished(&self, _request: &TransferRequest, stats: &TransferStats) {
        if stats.bytes > 0 {
            self.print(format_args!(""));
        }
    }

    fn catalog_refreshed(&self, _catalog: &Catalog) {}

    fn sync_finished(&self, _outcome: &SyncOutcome) {
        self.print(format_args!("Sync Done"));
    }

    fn snapshot_created(&self, _volume: &str, name: &str) {
        self.print(format_args!("Snapshot Created: {name}"));
    }

    fn snapshot_destroyed(&self, target: &str) {
        self.print(format_args!("Snapshot Deleted: {target}"));
    }

    fn restore_finished(&self, source: &str, volume: &str) {
        self.print(format_args!("Restored {volume} from {source}"));
    }

    fn cancelled(&self, operation: &str) {
        self.print(format_args!("Canceled {operation}!"));
    }
}

/// Asks on stdout and reads one line from stdin.
#[derive(Debug, Default)]
pub struct StdinConfirmer;

impl Confirmer for StdinConfirmer {
    fn ask(&self, prompt: &str) -> io::Result<String> {
        {
            let mut out = io::stdout().lock();
            write!(out, "{prompt}")?;
            out.flush()?;
        }
        let mut answer = String::new();
        io::stdin().lock().read_line(&mut answer)?;
        Ok(answer)
    }
}
