//! Status report generation
//!
//! Renders a [`HealthSnapshot`] as a plain-text table or as JSON.

use crate::config::AppInfo;
use anyhow::Result;
use health_monitor::{ConnectionState, HealthSnapshot, HeartbeatStatus, StateSet};
use serde::Serialize;
use std::fmt::Write;

/// Everything one status report shows
#[derive(Debug, Serialize)]
pub struct StatusReport<'a> {
    pub app: &'a AppInfo,
    pub connection: ConnectionState,
    pub retry_attempt: u32,
    pub retry_limit: u32,
    #[serde(flatten)]
    pub health: HealthSnapshot,
}

impl StatusReport<'_> {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn to_text(&self) -> String {
        let mut out = String::new();
        // Writing to a String cannot fail
        let _ = self.write_text(&mut out);
        out
    }

    fn write_text(&self, out: &mut String) -> std::fmt::Result {
        writeln!(out, "═══════════════════════════════════════════════")?;
        writeln!(out, "  {} v{} ({})", self.app.name, self.app.version, self.app.organization)?;
        writeln!(out, "  Health config v{}, {}", self.health.version, self.health.taken_at.format("%Y-%m-%d %H:%M:%S UTC"))?;
        writeln!(out, "═══════════════════════════════════════════════")?;

        write!(out, "\nConnection: {}", self.connection)?;
        if self.retry_attempt > 0 {
            write!(out, " (retry {}/{})", self.retry_attempt, self.retry_limit)?;
        }
        writeln!(out)?;

        for monitor in &self.health.monitors {
            writeln!(out, "\n[{}] {}", monitor.id, monitor.name)?;
            for (entry, states) in &monitor.entries {
                writeln!(out, "  {:<24} {}", entry, format_states(states))?;
            }
        }

        if !self.health.heartbeats.is_empty() {
            writeln!(out, "\nHeartbeats:")?;
        }
        for hb in &self.health.heartbeats {
            let status = match hb.state.status() {
                HeartbeatStatus::Idle => "idle",
                HeartbeatStatus::Running => "running",
                HeartbeatStatus::TimedOut => "TIMED OUT",
            };
            writeln!(
                out,
                "  {:<24} {:<9} elapsed {}/{}s  retry {}/{}  last ping {}",
                hb.name,
                status,
                hb.state.elapsed(),
                hb.state.time_limit(),
                hb.state.retry_attempt(),
                hb.state.retry_limit(),
                hb.state.last_ping()
            )?;
        }

        let seats = &self.health.seats;
        writeln!(out, "\n{}:", seats.name)?;
        if seats.entries.is_empty() {
            writeln!(out, "  (no data)")?;
        }
        for seat in &seats.entries {
            writeln!(out, "  {:<24} {}", seat.name, seat.state)?;
        }
        Ok(())
    }
}

fn format_states(states: &StateSet) -> String {
    states
        .iter()
        .map(|state| state.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
