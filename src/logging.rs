//! Runtime-adjustable log verbosity
//!
//! Components that care about verbosity receive an `Arc<LogController>` instead of
//! reading a process-wide variable. Changing the level applies it to the `log`
//! facade and notifies every subscriber.

use std::sync::RwLock;

use log::LevelFilter;

use crate::events::{EventEmitter, Subscription};

pub struct LogController {
    level: RwLock<LevelFilter>,
    on_did_change_level: EventEmitter<LevelFilter>,
}

impl LogController {
    pub fn new(initial: LevelFilter) -> Self {
        log::set_max_level(initial);
        Self {
            level: RwLock::new(initial),
            on_did_change_level: EventEmitter::new(),
        }
    }

    pub fn level(&self) -> LevelFilter {
        self.level.read().map(|l| *l).unwrap_or(LevelFilter::Info)
    }

    /// Change the level; a no-op when it is already `level`
    pub fn set_level(&self, level: LevelFilter) {
        {
            let Ok(mut current) = self.level.write() else {
                return;
            };
            if *current == level {
                return;
            }
            *current = level;
        }

        log::set_max_level(level);
        log::info!("Log level changed to {}", level);
        self.on_did_change_level.fire(&level);
    }

    pub fn is_enabled(&self, level: log::Level) -> bool {
        level <= self.level()
    }

    #[must_use = "dropping the subscription removes the listener"]
    pub fn on_did_change_level<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&LevelFilter) + Send + Sync + 'static,
    {
        self.on_did_change_level.subscribe(listener)
    }
}

impl Default for LogController {
    fn default() -> Self {
        Self::new(LevelFilter::Info)
    }
}

/// Parse a level name as accepted on the command line
pub fn parse_level(name: &str) -> Option<LevelFilter> {
    match name.to_ascii_lowercase().as_str() {
        "off" => Some(LevelFilter::Off),
        "error" | "critical" => Some(LevelFilter::Error),
        "warn" | "warning" => Some(LevelFilter::Warn),
        "info" => Some(LevelFilter::Info),
        "debug" => Some(LevelFilter::Debug),
        "trace" => Some(LevelFilter::Trace),
        _ => None,
    }
}
