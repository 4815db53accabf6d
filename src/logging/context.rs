use std::env;
use std::str::FromStr;

/// Environment variable that selects the logging context.
pub const LOG_CONTEXT_ENV: &str = "CHATFLOW_LOG_CONTEXT";

/// Host contexts that influence how logging is routed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LogContext {
    /// Long-running service embedding the engine (inbound webhook handler, scheduler).
    Service,
    /// Developer running flows locally or from tests.
    #[default]
    LocalDev,
    /// Embedded use where only the file sink should receive events.
    Quiet,
}

impl LogContext {
    /// Returns `true` when console sinks should be disabled.
    pub fn disables_console(self) -> bool {
        matches!(self, LogContext::Quiet)
    }
}

impl FromStr for LogContext {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "service" => Ok(LogContext::Service),
            "local" | "local_dev" | "localdev" | "dev" => Ok(LogContext::LocalDev),
            "quiet" => Ok(LogContext::Quiet),
            other => Err(format!(
                "invalid {} '{}'; supported values are service, local_dev, quiet",
                LOG_CONTEXT_ENV, other
            )),
        }
    }
}

/// Derive the active context from `CHATFLOW_LOG_CONTEXT`, defaulting to local development.
pub fn detect_context() -> LogContext {
    match env::var(LOG_CONTEXT_ENV) {
        Ok(value) => value.parse().unwrap_or_else(|err: String| {
            eprintln!("{}; falling back to local_dev", err);
            LogContext::LocalDev
        }),
        Err(_) => LogContext::LocalDev,
    }
}
