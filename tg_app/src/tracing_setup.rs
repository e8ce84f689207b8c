use std::io;

use serde::Deserialize;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::RollingFileAppender;
use tracing_appender::rolling::Rotation;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

/// How often the request log file is rolled over
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogRotation {
    Minutely,
    #[default]
    Hourly,
    Daily,
    Never,
}

impl LogRotation {
    pub fn to_rotation(self) -> Rotation {
        match self {
            LogRotation::Minutely => Rotation::MINUTELY,
            LogRotation::Hourly => Rotation::HOURLY,
            LogRotation::Daily => Rotation::DAILY,
            LogRotation::Never => Rotation::NEVER,
        }
    }
}

/// The `[logging]` config section
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub dir: String,

    /// Files are named `{file_prefix}.{date}.log`
    pub file_prefix: String,

    pub rotation: LogRotation,

    /// Mirror log lines to stdout as well as the file
    pub stdout: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { dir: "logs".to_string(), file_prefix: "tg_server".to_string(), rotation: LogRotation::Hourly, stdout: true }
    }
}

/// Install the global subscriber described by `config`
///
/// The file writer is non-blocking so request tasks never wait on disk.
/// `RUST_LOG` overrides `default_level`. Keep the returned guard alive for
/// the whole process or buffered lines are lost on exit.
pub fn init(config: &LoggingConfig, default_level: Level) -> anyhow::Result<WorkerGuard> {
    std::fs::create_dir_all(&config.dir)?;

    let file_appender = RollingFileAppender::builder()
        .rotation(config.rotation.to_rotation())
        .filename_prefix(&config.file_prefix)
        .filename_suffix("log")
        .build(&config.dir)?;
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = EnvFilter::builder().with_default_directive(default_level.into()).from_env_lossy();

    let file_layer = fmt::layer().with_writer(non_blocking).with_target(true).with_thread_ids(true).with_line_number(true).with_ansi(false).compact();
    let stdout_layer = config.stdout.then(|| fmt::layer().with_writer(io::stdout).with_target(true).with_ansi(true).compact());

    tracing_subscriber::registry().with(env_filter).with(file_layer).with(stdout_layer).try_init()?;

    Ok(guard)
}
