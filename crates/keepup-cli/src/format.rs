//! Plain-text rendering of daemon replies.

use std::fmt::Write;

use chrono::{DateTime, Utc};
use keepup_core::ManagedServerRecord;
use keepup_protocol::{strip_colors, ServerStatus};

const HEADERS: [&str; 6] = ["NAME", "PORT", "MOD", "USER", "PID", "UPTIME"];

/// Formats an uptime, e.g. "35s", "2m 15s", "1h 30m", "3d 4h".
pub fn format_uptime(secs: u64) -> String {
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        let mins = secs / 60;
        match secs % 60 {
            0 => format!("{mins}m"),
            rem => format!("{mins}m {rem}s"),
        }
    } else if secs < 86_400 {
        let hours = secs / 3600;
        match (secs % 3600) / 60 {
            0 => format!("{hours}h"),
            rem => format!("{hours}h {rem}m"),
        }
    } else {
        let days = secs / 86_400;
        match (secs % 86_400) / 3600 {
            0 => format!("{days}d"),
            rem => format!("{days}d {rem}h"),
        }
    }
}

fn row(record: &ManagedServerRecord, now: DateTime<Utc>) -> [String; 6] {
    let pid = record
        .process_id
        .map_or_else(|| "-".to_string(), |pid| pid.to_string());
    let uptime = match (record.process_id, record.started_at) {
        _ if record.restarts_exhausted() => "gave up".to_string(),
        (Some(_), Some(at)) => {
            let secs = now.signed_duration_since(at).num_seconds().max(0);
            format_uptime(secs.unsigned_abs())
        }
        (Some(_), None) => "-".to_string(),
        (None, _) => "stopped".to_string(),
    };

    [
        record.name().to_string(),
        record.config.port.to_string(),
        record.config.game_mod.to_string(),
        record.config.os_user.clone(),
        pid,
        uptime,
    ]
}

/// Renders records as an aligned table.
pub fn format_servers(records: &[ManagedServerRecord], now: DateTime<Utc>) -> String {
    if records.is_empty() {
        return "No servers registered.\n".to_string();
    }

    let rows: Vec<[String; 6]> = records.iter().map(|r| row(r, now)).collect();
    let mut widths = HEADERS.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }

    let mut out = String::new();
    let header = HEADERS.map(str::to_string);
    for cells in std::iter::once(&header).chain(rows.iter()) {
        let line: Vec<String> = cells
            .iter()
            .zip(widths)
            .map(|(cell, width)| format!("{cell:<width$}"))
            .collect();
        let _ = writeln!(out, "{}", line.join("  ").trim_end());
    }
    out
}

/// Renders a status reply: hostname, map, player count and player list.
pub fn format_status(status: &ServerStatus) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{}",
        status.hostname().unwrap_or_else(|| "(no hostname)".to_string())
    );
    if let Some(map) = status.map_name() {
        let _ = writeln!(out, "map:     {map}");
    }
    let capacity = status
        .max_clients()
        .map(|max| format!("{}/{max}", status.players.len()))
        .unwrap_or_else(|| status.players.len().to_string());
    let _ = writeln!(out, "players: {capacity}");
    for player in &status.players {
        let _ = writeln!(out, "  {}", strip_colors(player));
    }
    out
}
