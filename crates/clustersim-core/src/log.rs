//! Logging facilities.
//!
//! Every line starts with a `[tick LEVEL component]` prefix, e.g. `[12 INFO  scheduler-0] placed task 3`.
//! The level is colored when stderr is a terminal.

use atty::Stream;
use colored::{Color, ColoredString, Colorize};
use log::Level;
use serde_json::json;
use serde_type_name::type_name;

use crate::event::{Event, Tick};

// Colors only when stderr goes to a terminal.
fn get_colored(s: &str, color: Color) -> ColoredString {
    if atty::is(Stream::Stderr) {
        s.color(color)
    } else {
        s.normal()
    }
}

fn level_color(level: Level) -> Color {
    match level {
        Level::Error => Color::Red,
        Level::Warn => Color::Yellow,
        Level::Info => Color::Green,
        Level::Debug => Color::Blue,
        Level::Trace => Color::BrightBlack,
    }
}

/// Builds the `[tick LEVEL component]` line prefix.
pub fn prefix(time: Tick, level: Level, component: &str) -> String {
    let label = format!("{:<5}", level.as_str());
    format!("[{} {} {}]", time, get_colored(&label, level_color(level)), component)
}

/// Shared body of the level macros.
#[doc(hidden)]
#[macro_export]
macro_rules! log_at {
    ($level:expr, $ctx:expr, $($arg:tt)+) => (
        $crate::log_facade::log!(
            target: $ctx.name(),
            $level,
            "{} {}",
            $crate::log::prefix($ctx.time(), $level, $ctx.name()),
            format_args!($($arg)+)
        )
    );
}

/// Logs a message at the info level on behalf of the component owning `ctx`.
///
/// # Examples
///
/// ```rust
/// use clustersim_core::{log_info, Simulation};
///
/// let mut sim = Simulation::new(123);
/// let ctx = sim.create_context("comp");
/// log_info!(ctx, "started with {} workers", 4);
/// ```
#[macro_export]
macro_rules! log_info {
    ($ctx:expr, $msg:expr) => ($crate::log_at!($crate::log_facade::Level::Info, $ctx, "{}", $msg));
    ($ctx:expr, $format:expr, $($arg:tt)+) => ($crate::log_at!($crate::log_facade::Level::Info, $ctx, $format, $($arg)+));
}

/// Logs a message at the debug level, see [`log_info!`](crate::log_info!).
#[macro_export]
macro_rules! log_debug {
    ($ctx:expr, $msg:expr) => ($crate::log_at!($crate::log_facade::Level::Debug, $ctx, "{}", $msg));
    ($ctx:expr, $format:expr, $($arg:tt)+) => ($crate::log_at!($crate::log_facade::Level::Debug, $ctx, $format, $($arg)+));
}

/// Logs a message at the warn level, see [`log_info!`](crate::log_info!).
#[macro_export]
macro_rules! log_warn {
    ($ctx:expr, $msg:expr) => ($crate::log_at!($crate::log_facade::Level::Warn, $ctx, "{}", $msg));
    ($ctx:expr, $format:expr, $($arg:tt)+) => ($crate::log_at!($crate::log_facade::Level::Warn, $ctx, $format, $($arg)+));
}

/// Logs a message at the error level, see [`log_info!`](crate::log_info!).
#[macro_export]
macro_rules! log_error {
    ($ctx:expr, $msg:expr) => ($crate::log_at!($crate::log_facade::Level::Error, $ctx, "{}", $msg));
    ($ctx:expr, $format:expr, $($arg:tt)+) => ($crate::log_at!($crate::log_facade::Level::Error, $ctx, $format, $($arg)+));
}

/// JSON view of an event used in engine log lines.
pub(crate) fn describe(event: &Event, src: &str) -> serde_json::Value {
    json!({
        "type": type_name(&event.data).unwrap_or("unknown"),
        "data": event.data,
        "src": src,
        "dst": event.dst,
    })
}

/// Logs an event that reached a handler but matched none of its arms.
///
/// Called from the [`cast!`](crate::cast!) fallback arm.
pub fn log_unhandled_event(event: Event) {
    log::error!(
        target: "simulation",
        "{} Unhandled event: {}",
        prefix(event.time, Level::Error, "simulation"),
        describe(&event, &event.src.to_string())
    );
}

/// Logs an event whose destination has no registered handler.
pub(crate) fn log_undelivered_event(event: Event) {
    log::error!(
        target: "simulation",
        "{} Undelivered event: {}",
        prefix(event.time, Level::Error, "simulation"),
        describe(&event, &event.src.to_string())
    );
}
