//! Stop-schedule interpreter.
//!
//! A stop schedule is a small sequence program describing which signals to
//! send a stubborn daemon and how long to wait between them, with an
//! optional `goto` for looping retries. The grammar mirrors
//! `start-stop-daemon --retry`'s schedule syntax.
use std::time::Duration;

use crate::error::StopScheduleError;

/// One item in a parsed stop schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleItem {
    /// Send this signal to the target process.
    Signal(i32),
    /// Wait up to this long for the process to exit before moving on.
    Timeout(std::time::Duration),
    /// Resume execution at this zero-based index (used to implement
    /// `forever`).
    Goto(usize),
}

/// A parsed, ready-to-execute stop schedule.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StopSchedule(Vec<ScheduleItem>);

impl StopSchedule {
    /// The default schedule applied when a service declares none:
    /// `SIGTERM`, then wait 5 seconds.
    pub fn default_schedule() -> Self {
        Self(vec![
            ScheduleItem::Signal(libc::SIGTERM),
            ScheduleItem::Timeout(crate::constants::DEFAULT_STOP_TIMEOUT),
        ])
    }

    /// Parses a whitespace-separated schedule string such as
    /// `"TERM/5 KILL/2 forever"`.
    ///
    /// Each token is either a bare signal name/number, a `SIGNAL/TIMEOUT`
    /// pair, or the literal `forever`, which must appear last and loops
    /// back to the schedule's start. A `forever` appearing before any
    /// `timeout` item is rejected: there would be nothing to wait on before
    /// looping.
    pub fn parse(spec: &str) -> Result<Self, StopScheduleError> {
        let mut items = Vec::new();
        let mut seen_timeout = false;

        let tokens: Vec<&str> = spec.split_whitespace().collect();
        for (idx, token) in tokens.iter().enumerate() {
            if token.eq_ignore_ascii_case("forever") {
                if !seen_timeout {
                    return Err(StopScheduleError::ForeverBeforeTimeout);
                }
                if idx != tokens.len() - 1 {
                    return Err(StopScheduleError::UnknownItem(
                        "'forever' must be the last schedule item".to_string(),
                    ));
                }
                items.push(ScheduleItem::Goto(0));
                continue;
            }

            if let Some((sig_part, timeout_part)) = token.split_once('/') {
                let signal = parse_signal(sig_part)?;
                let secs: u64 = timeout_part
                    .parse()
                    .map_err(|_| StopScheduleError::UnknownItem(token.to_string()))?;
                items.push(ScheduleItem::Signal(signal));
                items.push(ScheduleItem::Timeout(Duration::from_secs(secs)));
                seen_timeout = true;
                continue;
            }

            let signal = parse_signal(token)?;
            items.push(ScheduleItem::Signal(signal));
        }

        Ok(Self(items))
    }

    /// Substitutes every `Signal` item for `signal`, used by `-R` retry
    /// semantics where the configured stop signal replaces the schedule's
    /// own signals while timeouts are kept as-is.
    pub fn with_retry_signal(&self, signal: i32) -> Self {
        let items = self
            .0
            .iter()
            .map(|item| match item {
                ScheduleItem::Signal(_) => ScheduleItem::Signal(signal),
                other => *other,
            })
            .collect();
        Self(items)
    }

    /// Returns the schedule items in execution order.
    pub fn items(&self) -> &[ScheduleItem] {
        &self.0
    }
}

fn parse_signal(token: &str) -> Result<i32, StopScheduleError> {
    if let Ok(n) = token.parse::<i32>() {
        return Ok(n);
    }

    let name = token.trim_start_matches("SIG").to_ascii_uppercase();
    let signal = match name.as_str() {
        "HUP" => libc::SIGHUP,
        "INT" => libc::SIGINT,
        "QUIT" => libc::SIGQUIT,
        "KILL" => libc::SIGKILL,
        "TERM" => libc::SIGTERM,
        "USR1" => libc::SIGUSR1,
        "USR2" => libc::SIGUSR2,
        "CONT" => libc::SIGCONT,
        "STOP" => libc::SIGSTOP,
        _ => return Err(StopScheduleError::UnknownItem(token.to_string())),
    };
    Ok(signal)
}
