//! Presentation helpers shared by the screen and the dashboard.
//!
//! These turn the text values of a [`MinerStatus`] into the numbers and
//! labels shown to the operator. Drawing them is someone else's job.

use time::{OffsetDateTime, UtcOffset};

use crate::status::{MinerStatus, WorkMode};

/// Human label of a work mode.
pub fn mode_label(mode: WorkMode) -> &'static str {
    match mode {
        WorkMode::Eco => "Eco",
        WorkMode::Standard => "Standard",
        WorkMode::Super => "Super",
        WorkMode::Unknown => "Unknown",
    }
}

/// Convert an `MHS av` value to TH/s. Unparseable text counts as zero.
pub fn hashrate_ths(mhs: &str) -> f64 {
    mhs.trim().parse::<f64>().unwrap_or(0.0) / 1_000_000.0
}

/// Format an `Elapsed` value in seconds as `Xd Yh Zm`.
///
/// Days and hours are left out when zero; minutes are always shown.
/// Missing or non-positive values give `N/A`.
pub fn format_elapsed(seconds: &str) -> String {
    let secs = match seconds.trim().parse::<i64>() {
        Ok(secs) if secs > 0 => secs,
        _ => return "N/A".to_string(),
    };

    let days = secs / 86_400;
    let hours = secs % 86_400 / 3_600;
    let minutes = secs % 3_600 / 60;

    let mut out = String::new();
    if days > 0 {
        out.push_str(&format!("{days}d "));
    }
    if hours > 0 {
        out.push_str(&format!("{hours}h "));
    }
    out.push_str(&format!("{minutes}m"));
    out
}

/// What the miner page of the screen shows.
#[derive(Clone, Debug, PartialEq)]
pub struct MinerPage {
    pub ip: String,
    pub mode_label: String,
    pub hashrate_ths: f64,
    pub power_w: f64,
}

impl MinerPage {
    /// Build the page from the outcome of the last poll.
    ///
    /// A sleeping miner reports stale hashrate and power, so both are shown
    /// as zero with an `Inactive` label.
    pub fn from_poll(poll_ok: bool, status: &MinerStatus) -> Self {
        if !poll_ok || status.ip.is_empty() {
            return Self {
                ip: "N/A".to_string(),
                mode_label: mode_label(WorkMode::Unknown).to_string(),
                hashrate_ths: 0.0,
                power_w: 0.0,
            };
        }

        if !status.is_active {
            return Self {
                ip: status.ip.clone(),
                mode_label: "Inactive".to_string(),
                hashrate_ths: 0.0,
                power_w: 0.0,
            };
        }

        Self {
            ip: status.ip.clone(),
            mode_label: mode_label(status.work_mode).to_string(),
            hashrate_ths: hashrate_ths(&status.summary.mhs_av),
            power_w: status
                .power
                .as_deref()
                .and_then(|p| p.trim().parse().ok())
                .unwrap_or(0.0),
        }
    }
}

/// Local date (`dd/mm/yyyy`) and time (`HH:MM`) at `offset_hours` from UTC.
pub fn clock_strings(now: OffsetDateTime, offset_hours: i8) -> (String, String) {
    let offset = UtcOffset::from_hms(offset_hours, 0, 0).unwrap_or(UtcOffset::UTC);
    let local = now.to_offset(offset);

    let date = format!(
        "{:02}/{:02}/{}",
        local.day(),
        u8::from(local.month()),
        local.year()
    );
    let time = format!("{:02}:{:02}", local.hour(), local.minute());
    (date, time)
}
