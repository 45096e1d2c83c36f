//! Line-oriented threshold controls on stdin.
//!
//! Each control is named after the slider it replaces (`LowerH`, `UpperS`,
//! ...) and maps to exactly one [`ThresholdState::set`] call:
//!
//! ```text
//! LowerH 20
//! UpperV 255
//! show
//! ```

use std::io::BufRead;
use std::num::IntErrorKind;
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use thiserror::Error;

use crate::segmentation::{Bound, Channel, ThresholdState};

/// The six controls: name, channel, bound
const CONTROLS: [(&str, Channel, Bound); 6] = [
    ("LowerH", Channel::Hue, Bound::Lower),
    ("UpperH", Channel::Hue, Bound::Upper),
    ("LowerS", Channel::Saturation, Bound::Lower),
    ("UpperS", Channel::Saturation, Bound::Upper),
    ("LowerV", Channel::Value, Bound::Lower),
    ("UpperV", Channel::Value, Bound::Upper),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TuningCommand {
    Set {
        channel: Channel,
        bound: Bound,
        value: i32,
    },
    Show,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TuningError {
    #[error("unknown control {0:?} (expected LowerH, UpperH, LowerS, UpperS, LowerV, UpperV or show)")]
    UnknownControl(String),

    #[error("control {control} needs an integer value, got {value:?}")]
    InvalidValue { control: String, value: String },

    #[error("control {0} needs a value")]
    MissingValue(String),

    #[error("unexpected trailing input {0:?}")]
    TrailingInput(String),
}

/// Parse one line. Blank lines yield `None`.
pub fn parse_command(line: &str) -> Result<Option<TuningCommand>, TuningError> {
    let mut words = line.split_whitespace();
    let Some(name) = words.next() else {
        return Ok(None);
    };

    let command = if name.eq_ignore_ascii_case("show") {
        TuningCommand::Show
    } else {
        let (_, channel, bound) = CONTROLS
            .iter()
            .find(|(control, _, _)| control.eq_ignore_ascii_case(name))
            .ok_or_else(|| TuningError::UnknownControl(name.to_string()))?;
        let raw = words
            .next()
            .ok_or_else(|| TuningError::MissingValue(name.to_string()))?;
        let value = parse_saturating(raw).ok_or_else(|| TuningError::InvalidValue {
            control: name.to_string(),
            value: raw.to_string(),
        })?;
        TuningCommand::Set {
            channel: *channel,
            bound: *bound,
            value,
        }
    };

    if let Some(extra) = words.next() {
        return Err(TuningError::TrailingInput(extra.to_string()));
    }
    Ok(Some(command))
}

/// Integers too large for `i32` saturate so `set` can clamp them
fn parse_saturating(raw: &str) -> Option<i32> {
    match raw.parse::<i32>() {
        Ok(value) => Some(value),
        Err(err) => match err.kind() {
            IntErrorKind::PosOverflow => Some(i32::MAX),
            IntErrorKind::NegOverflow => Some(i32::MIN),
            _ => None,
        },
    }
}

/// Apply a command, logging the outcome
pub fn apply(state: &ThresholdState, command: TuningCommand) {
    match command {
        TuningCommand::Set {
            channel,
            bound,
            value,
        } => {
            let stored = state.set(channel, bound, value);
            if i32::from(stored) != value {
                tracing::info!("{:?} {:?} clamped {} -> {}", bound, channel, value, stored);
            }
            tracing::info!("Thresholds now {}", state.read());
        }
        TuningCommand::Show => tracing::info!("Thresholds {}", state.read()),
    }
}

/// Feed every line of `input` to `state` until EOF
pub fn run<R: BufRead>(state: &ThresholdState, input: R) -> Result<()> {
    for line in input.lines() {
        let line = line.context("Failed to read tuning input")?;
        match parse_command(&line) {
            Ok(Some(command)) => apply(state, command),
            Ok(None) => {}
            Err(err) => tracing::warn!("{}", err),
        }
    }
    Ok(())
}

/// Read tuning commands from stdin on a detached thread.
///
/// The thread is never joined: a blocking stdin read cannot be interrupted,
/// and it holds nothing that needs releasing on shutdown.
pub fn spawn_stdin_tuner(state: Arc<ThresholdState>) -> Result<()> {
    thread::Builder::new()
        .name("tuning".into())
        .spawn(move || {
            tracing::info!("Tuning controls: LowerH/UpperH [0,180], LowerS/UpperS/LowerV/UpperV [0,256], show");
            if let Err(err) = run(&state, std::io::stdin().lock()) {
                tracing::warn!("Tuning input closed: {:#}", err);
            }
        })
        .context("Failed to spawn tuning thread")?;
    Ok(())
}
