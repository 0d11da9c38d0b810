//! Injected logger.
//!
//! The engine never logs through process-wide state. Every component that
//! emits diagnostics holds an `Arc<dyn Logger>` handed to it at construction
//! and calls it at a few fixed points: system instance construction, each
//! subscription change, dispatch decisions, and scheduler stage boundaries.
//!
//! [`TracingLogger`] forwards to the `tracing` ecosystem, tagging each event
//! with its [`LogCategory`]. [`NullLogger`] drops everything.

use std::fmt;
use std::sync::Arc;

use tracing::Level;


/// Area of the engine an event belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LogCategory {
    /// Bitset built for a system instance.
    SystemBitset,
    /// Entity subscribed to or unsubscribed from a system.
    Subscription,
    /// Dispatch, slicing and joining.
    Execution,
    /// Stage construction and tick boundaries.
    Scheduler,
}

impl LogCategory {
    /// Stable lowercase name, used as the `category` field.
    pub fn as_str(self) -> &'static str {
        match self {
            LogCategory::SystemBitset => "system_bitset",
            LogCategory::Subscription => "subscription",
            LogCategory::Execution => "execution",
            LogCategory::Scheduler => "scheduler",
        }
    }
}

impl fmt::Display for LogCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sink for engine diagnostics.
pub trait Logger: Send + Sync {
    /// Records one event.
    fn log(&self, category: LogCategory, level: Level, message: fmt::Arguments<'_>);

    /// Cheap pre-check so callers can skip formatting work.
    fn enabled(&self, _category: LogCategory, _level: Level) -> bool {
        true
    }
}

/// Forwards events to `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, category: LogCategory, level: Level, message: fmt::Arguments<'_>) {
        let category = category.as_str();
        if level == Level::ERROR {
            tracing::error!(category, "{}", message);
        } else if level == Level::WARN {
            tracing::warn!(category, "{}", message);
        } else if level == Level::INFO {
            tracing::info!(category, "{}", message);
        } else if level == Level::DEBUG {
            tracing::debug!(category, "{}", message);
        } else {
            tracing::trace!(category, "{}", message);
        }
    }

    fn enabled(&self, _category: LogCategory, level: Level) -> bool {
        if level == Level::ERROR {
            tracing::enabled!(Level::ERROR)
        } else if level == Level::WARN {
            tracing::enabled!(Level::WARN)
        } else if level == Level::INFO {
            tracing::enabled!(Level::INFO)
        } else if level == Level::DEBUG {
            tracing::enabled!(Level::DEBUG)
        } else {
            tracing::enabled!(Level::TRACE)
        }
    }
}

/// Discards every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullLogger;

impl Logger for NullLogger {
    fn log(&self, _category: LogCategory, _level: Level, _message: fmt::Arguments<'_>) {}

    fn enabled(&self, _category: LogCategory, _level: Level) -> bool {
        false
    }
}

/// Default logger handed out when the caller does not inject one.
pub fn default_logger() -> Arc<dyn Logger> {
    Arc::new(TracingLogger)
}

/// Logs through an injected logger, skipping formatting when disabled.
macro_rules! log_event {
    ($logger:expr, $category:expr, $level:expr, $($arg:tt)+) => {{
        let logger: &dyn $crate::engine::logging::Logger = &*$logger;
        if logger.enabled($category, $level) {
            logger.log($category, $level, format_args!($($arg)+));
        }
    }};
}

pub(crate) use log_event;
