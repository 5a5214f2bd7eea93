//! Logging setup over `tracing-subscriber`.
//!
//! The engine emits `dispatch` and `invoke` spans with structured fields
//! (`handler`, `sieve`, `input`, `params`). This module installs the global
//! subscriber that renders them.
//!
//! # Configuration-Based Initialization
//!
//! ```rust,ignore
//! use brass_runtime::{config::ConfigLoader, logging};
//!
//! let config = ConfigLoader::new().load()?;
//! logging::init_from_config(&config.logging)?;
//! ```
//!
//! # Manual Initialization
//!
//! ```rust,ignore
//! use brass_runtime::logging::{LoggingBuilder, SpanEvents};
//!
//! LoggingBuilder::new()
//!     .directive("brass_framework=debug")
//!     .span_events(SpanEvents::LIFECYCLE)
//!     .init();
//! ```

use std::path::{Path, PathBuf};

use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::Layered;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

use crate::config::{LogFormat, LogOutput, LogRotation, LoggingConfig, SpanEventConfig};
use crate::error::LoggingError;

type BoxedFmtLayer = Box<dyn Layer<Layered<EnvFilter, Registry>> + Send + Sync>;

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpanEvents {
    pub new: bool,
    pub enter: bool,
    pub exit: bool,
    pub close: bool,
}

impl SpanEvents {
    /// No span events.
    pub const NONE: Self = Self {
        new: false,
        enter: false,
        exit: false,
        close: false,
    };

    /// Creation and close; the close event carries the span's busy/idle time.
    pub const LIFECYCLE: Self = Self {
        new: true,
        enter: false,
        exit: false,
        close: true,
    };

    /// Every span event.
    pub const FULL: Self = Self {
        new: true,
        enter: true,
        exit: true,
        close: true,
    };

    fn to_fmt_span(self) -> FmtSpan {
        [
            (self.new, FmtSpan::NEW),
            (self.enter, FmtSpan::ENTER),
            (self.exit, FmtSpan::EXIT),
            (self.close, FmtSpan::CLOSE),
        ]
        .into_iter()
        .filter(|(on, _)| *on)
        .fold(FmtSpan::NONE, |acc, (_, span)| acc | span)
    }
}

impl From<&SpanEventConfig> for SpanEvents {
    fn from(config: &SpanEventConfig) -> Self {
        Self {
            new: config.new,
            enter: config.enter,
            exit: config.exit,
            close: config.close,
        }
    }
}

/// Installs the global subscriber described by `config`.
pub fn init_from_config(config: &LoggingConfig) -> Result<(), LoggingError> {
    LoggingBuilder::from_config(config).try_init()
}

// =============================================================================
// LoggingBuilder
// =============================================================================

/// Builder for the global subscriber.
#[derive(Debug, Clone)]
pub struct LoggingBuilder {
    level: tracing::Level,
    directives: Vec<String>,
    span_events: SpanEvents,
    format: LogFormat,
    output: LogOutput,
    with_target: bool,
    with_thread_ids: bool,
    with_file_location: bool,
    file_path: Option<PathBuf>,
    rotation: LogRotation,
    max_files: Option<usize>,
}

impl Default for LoggingBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LoggingBuilder {
    /// Compact lines on stdout at `INFO`.
    pub fn new() -> Self {
        Self {
            level: tracing::Level::INFO,
            directives: Vec::new(),
            span_events: SpanEvents::NONE,
            format: LogFormat::Compact,
            output: LogOutput::Stdout,
            with_target: true,
            with_thread_ids: false,
            with_file_location: false,
            file_path: None,
            rotation: LogRotation::Never,
            max_files: None,
        }
    }

    /// Creates a builder from a [`LoggingConfig`].
    pub fn from_config(config: &LoggingConfig) -> Self {
        let mut builder = Self::new()
            .level(config.level.to_tracing_level())
            .format(config.format)
            .output(config.output)
            .span_events(SpanEvents::from(&config.span_events))
            .thread_ids(config.thread_ids)
            .file_location(config.file_location)
            .rotation(config.rotation);
        builder.file_path.clone_from(&config.file_path);
        builder.max_files = config.max_files;

        let mut filters: Vec<_> = config.filters.iter().collect();
        filters.sort_by(|a, b| a.0.cmp(b.0));
        for (target, level) in filters {
            builder = builder.directive(format!("{target}={level}"));
        }
        builder
    }

    /// Sets the base level.
    pub fn level(mut self, level: tracing::Level) -> Self {
        self.level = level;
        self
    }

    /// Adds an `EnvFilter` directive such as `brass_framework::sieve=trace`.
    pub fn directive(mut self, directive: impl Into<String>) -> Self {
        self.directives.push(directive.into());
        self
    }

    /// Sets which span lifecycle events are logged.
    pub fn span_events(mut self, events: SpanEvents) -> Self {
        self.span_events = events;
        self
    }

    /// Sets the line format.
    pub fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Sets where lines are written.
    pub fn output(mut self, output: LogOutput) -> Self {
        self.output = output;
        self
    }

    /// Include the target (module path) in each line.
    pub fn target(mut self, enabled: bool) -> Self {
        self.with_target = enabled;
        self
    }

    /// Include thread ids in each line.
    pub fn thread_ids(mut self, enabled: bool) -> Self {
        self.with_thread_ids = enabled;
        self
    }

    /// Include source file and line number in each line.
    pub fn file_location(mut self, enabled: bool) -> Self {
        self.with_file_location = enabled;
        self
    }

    /// Log file for [`LogOutput::File`].
    pub fn file_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    /// Sets when file output starts a new file.
    pub fn rotation(mut self, rotation: LogRotation) -> Self {
        self.rotation = rotation;
        self
    }

    /// Rotated files to keep.
    pub fn max_files(mut self, count: usize) -> Self {
        self.max_files = Some(count);
        self
    }

    /// `RUST_LOG` if set, otherwise the base level; then every directive.
    fn build_filter(&self) -> EnvFilter {
        let base = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.level.as_str().to_lowercase()));

        self.directives
            .iter()
            .filter_map(|directive| match directive.parse() {
                Ok(d) => Some(d),
                Err(e) => {
                    eprintln!("ignoring invalid log directive {directive:?}: {e}");
                    None
                }
            })
            .fold(base, EnvFilter::add_directive)
    }

    fn build_writer(&self) -> Result<BoxMakeWriter, LoggingError> {
        Ok(match self.output {
            LogOutput::Stdout => BoxMakeWriter::new(std::io::stdout),
            LogOutput::Stderr => BoxMakeWriter::new(std::io::stderr),
            LogOutput::File => {
                let path = self.file_path.as_deref().ok_or(LoggingError::MissingFilePath)?;
                BoxMakeWriter::new(self.file_appender(path)?)
            }
        })
    }

    fn file_appender(&self, path: &Path) -> Result<RollingFileAppender, LoggingError> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "brass.log".to_string());
        let rotation = match self.rotation {
            LogRotation::Never => Rotation::NEVER,
            LogRotation::Minutely => Rotation::MINUTELY,
            LogRotation::Hourly => Rotation::HOURLY,
            LogRotation::Daily => Rotation::DAILY,
        };

        let mut builder = RollingFileAppender::builder()
            .rotation(rotation)
            .filename_prefix(name);
        if let Some(count) = self.max_files {
            builder = builder.max_log_files(count);
        }
        builder.build(dir).map_err(|source| LoggingError::File {
            path: path.to_path_buf(),
            source,
        })
    }

    fn build_layer(&self, writer: BoxMakeWriter) -> BoxedFmtLayer {
        macro_rules! configure {
            ($layer:expr) => {
                $layer
                    .with_span_events(self.span_events.to_fmt_span())
                    .with_target(self.with_target)
                    .with_thread_ids(self.with_thread_ids)
                    .with_file(self.with_file_location)
                    .with_line_number(self.with_file_location)
                    .with_ansi(matches!(self.output, LogOutput::Stdout | LogOutput::Stderr))
                    .with_writer(writer)
                    .boxed()
            };
        }

        match self.format {
            LogFormat::Compact => configure!(fmt::layer().compact()),
            LogFormat::Full => configure!(fmt::layer()),
            LogFormat::Pretty => configure!(fmt::layer().pretty()),
            #[cfg(feature = "json-log")]
            LogFormat::Json => configure!(fmt::layer().json()),
            #[cfg(not(feature = "json-log"))]
            LogFormat::Json => {
                eprintln!("json log format needs the `json-log` feature; using compact");
                configure!(fmt::layer().compact())
            }
        }
    }

    /// Installs the subscriber, ignoring failure.
    pub fn init(self) {
        let _ = self.try_init();
    }

    /// Installs the subscriber.
    ///
    /// Fails if a global subscriber is already set or the log file cannot be
    /// opened.
    pub fn try_init(self) -> Result<(), LoggingError> {
        let filter = self.build_filter();
        let layer = self.build_layer(self.build_writer()?);
        tracing_subscriber::registry()
            .with(filter)
            .with(layer)
            .try_init()?;
        Ok(())
    }
}
