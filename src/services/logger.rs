use crate::constants::limits;
use crate::utils::redact::{redact_object, redact_text};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
}

impl LogLevel {
    fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "error" => LogLevel::Error,
            "warn" => LogLevel::Warn,
            "debug" => LogLevel::Debug,
            _ => LogLevel::Info,
        }
    }

    fn from_env() -> Self {
        Self::parse(&std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()))
    }

    fn rank(self) -> u8 {
        match self {
            LogLevel::Error => 0,
            LogLevel::Warn => 1,
            LogLevel::Info => 2,
            LogLevel::Debug => 3,
        }
    }

    fn allows(self, other: LogLevel) -> bool {
        other.rank() <= self.rank()
    }

    fn directive(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    error: u64,
    warn: u64,
    info: u64,
    debug: u64,
}

/// Installs the process-wide `tracing` subscriber. Output goes to stderr,
/// as text unless `LOG_FORMAT=json`. `RUST_LOG` wins over `LOG_LEVEL`.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let format = std::env::var("LOG_FORMAT")
        .unwrap_or_else(|_| "text".to_string())
        .to_lowercase();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("graph_relay={}", LogLevel::from_env().directive()))
    });

    let result = match format.as_str() {
        "json" => fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(true)
            .try_init(),
        _ => fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(true)
            .try_init(),
    };
    // A subscriber may already be installed (tests, embedding).
    let _ = result;
}

fn render_meta(meta: Option<&serde_json::Value>) -> String {
    meta.filter(|m| !m.is_null())
        .map(|m| redact_object(m, limits::MAX_ERROR_DETAIL, None).to_string())
        .unwrap_or_default()
}

#[derive(Debug, Clone)]
pub struct Logger {
    context: String,
    level: LogLevel,
    counters: Arc<Mutex<Counters>>,
}

impl Logger {
    pub fn new(context: &str) -> Self {
        Self {
            context: context.to_string(),
            level: LogLevel::from_env(),
            counters: Arc::new(Mutex::new(Counters::default())),
        }
    }

    pub fn child(&self, suffix: &str) -> Self {
        let context = if suffix.is_empty() {
            self.context.clone()
        } else {
            format!("{}:{}", self.context, suffix)
        };
        Self {
            context,
            level: self.level,
            counters: self.counters.clone(),
        }
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn set_level(&mut self, level: LogLevel) {
        self.level = level;
    }

    fn log(&self, level: LogLevel, message: &str, meta: Option<&serde_json::Value>) {
        if !self.level.allows(level) {
            return;
        }
        if let Ok(mut counters) = self.counters.lock() {
            match level {
                LogLevel::Error => counters.error += 1,
                LogLevel::Warn => counters.warn += 1,
                LogLevel::Info => counters.info += 1,
                LogLevel::Debug => counters.debug += 1,
            }
        }
        let message = redact_text(message, usize::MAX, None);
        let meta = render_meta(meta);
        let context = self.context.as_str();
        match level {
            LogLevel::Error => tracing::error!(
                target: "graph_relay",
                context = %context,
                meta = %meta,
                "{}",
                message
            ),
            LogLevel::Warn => tracing::warn!(
                target: "graph_relay",
                context = %context,
                meta = %meta,
                "{}",
                message
            ),
            LogLevel::Info => tracing::info!(
                target: "graph_relay",
                context = %context,
                meta = %meta,
                "{}",
                message
            ),
            LogLevel::Debug => tracing::debug!(
                target: "graph_relay",
                context = %context,
                meta = %meta,
                "{}",
                message
            ),
        }
    }

    pub fn error(&self, message: &str, meta: Option<&serde_json::Value>) {
        self.log(LogLevel::Error, message, meta);
    }

    pub fn warn(&self, message: &str, meta: Option<&serde_json::Value>) {
        self.log(LogLevel::Warn, message, meta);
    }

    pub fn info(&self, message: &str, meta: Option<&serde_json::Value>) {
        self.log(LogLevel::Info, message, meta);
    }

    pub fn debug(&self, message: &str, meta: Option<&serde_json::Value>) {
        self.log(LogLevel::Debug, message, meta);
    }

    pub fn stats(&self) -> serde_json::Value {
        let counters = self.counters.lock().unwrap_or_else(|err| err.into_inner());
        serde_json::json!({
            "level": format!("{:?}", self.level).to_lowercase(),
            "context": self.context,
            "error": counters.error,
            "warn": counters.warn,
            "info": counters.info,
            "debug": counters.debug,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_loggers_share_counters() {
        let mut root = Logger::new("relay");
        root.set_level(LogLevel::Debug);
        let child = root.child("obo");
        assert_eq!(child.context(), "relay:obo");
        child.warn("exchange failed", None);
        root.info("started", Some(&serde_json::json!({"port": 8000})));
        let stats = root.stats();
        assert_eq!(stats["warn"], 1);
        assert_eq!(stats["info"], 1);
    }

    #[test]
    fn level_filter_skips_counting() {
        let mut logger = Logger::new("relay");
        logger.set_level(LogLevel::Warn);
        logger.debug("noise", None);
        logger.info("noise", None);
        logger.error("boom", None);
        let stats = logger.stats();
        assert_eq!(stats["debug"], 0);
        assert_eq!(stats["info"], 0);
        assert_eq!(stats["error"], 1);
    }

    #[test]
    fn meta_is_redacted_before_emitting() {
        let rendered = render_meta(Some(&serde_json::json!({
            "access_token": "graph-token",
            "detail": "rejected Bearer abc123xyz",
            "status": 401,
        })));
        assert!(!rendered.contains("graph-token"));
        assert!(!rendered.contains("abc123xyz"));
        assert!(rendered.contains("\"status\":401"));
        assert_eq!(render_meta(Some(&serde_json::Value::Null)), "");
    }

    #[test]
    fn unknown_level_defaults_to_info() {
        assert_eq!(LogLevel::parse("verbose"), LogLevel::Info);
        assert_eq!(LogLevel::parse(" DEBUG "), LogLevel::Debug);
    }
}
