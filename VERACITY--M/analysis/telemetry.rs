use std::{fmt, path::PathBuf, sync::Arc};

use anyhow::Result;
use serde_json::Value;
use shared_logging::{JsonLogger, LogLevel, LogRecord, StructuredLogger};

/// Builder configuring telemetry for analysis runs.
pub struct AnalysisTelemetryBuilder {
    module: String,
    log_path: Option<PathBuf>,
    stderr: bool,
    min_level: LogLevel,
}

impl AnalysisTelemetryBuilder {
    /// Creates a new builder.
    #[must_use]
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            log_path: None,
            stderr: false,
            min_level: LogLevel::Info,
        }
    }

    /// Sets the JSON log path.
    #[must_use]
    pub fn log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    /// Echoes records to stderr.
    #[must_use]
    pub const fn stderr(mut self, enabled: bool) -> Self {
        self.stderr = enabled;
        self
    }

    /// Drops records below `level`.
    #[must_use]
    pub const fn min_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }

    /// Finalizes the builder.
    pub fn build(self) -> Result<AnalysisTelemetry> {
        let file = match self.log_path {
            Some(path) => Some(JsonLogger::new(path)?),
            None => None,
        };
        Ok(AnalysisTelemetry {
            inner: Arc::new(TelemetryInner {
                module: self.module,
                logger: StructuredLogger::new(file, self.stderr, self.min_level),
            }),
        })
    }
}

/// Telemetry handle shared by every pipeline stage.
#[derive(Clone)]
pub struct AnalysisTelemetry {
    inner: Arc<TelemetryInner>,
}

impl fmt::Debug for AnalysisTelemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisTelemetry")
            .field("module", &self.inner.module)
            .field("min_level", &self.inner.logger.min_level())
            .finish()
    }
}

struct TelemetryInner {
    module: String,
    logger: StructuredLogger,
}

impl AnalysisTelemetry {
    /// Returns a builder for this telemetry helper.
    #[must_use]
    pub fn builder(module: impl Into<String>) -> AnalysisTelemetryBuilder {
        AnalysisTelemetryBuilder::new(module)
    }

    /// Logs a structured record; `metadata` fields are copied when it is an object.
    pub fn log(&self, level: LogLevel, message: &str, metadata: Value) -> Result<()> {
        if !self.inner.logger.enabled(level) {
            return Ok(());
        }
        let mut record = LogRecord::new(&self.inner.module, level, message);
        if let Value::Object(fields) = metadata {
            record.metadata = fields;
        }
        self.inner.logger.log(&record)
    }
}
