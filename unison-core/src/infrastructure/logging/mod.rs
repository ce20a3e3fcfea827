//! `log` + `log4rs` setup shared by the node binary and tests.

mod consts;

pub use consts::*;

use crate::foundation::UnisonError;
use crate::storage_err;
use log::LevelFilter;
use log4rs::{
    append::{
        console::{ConsoleAppender, Target},
        rolling_file::{
            policy::compound::{roll::fixed_window::FixedWindowRoller, trigger::size::SizeTrigger, CompoundPolicy},
            RollingFileAppender,
        },
    },
    config::{Appender, Logger, Root},
    encode::pattern::PatternEncoder,
    filter::threshold::ThresholdFilter,
    Config,
};
use std::io::IsTerminal;
use std::path::Path;

const CONSOLE_APPENDER: &str = "stderr";
const LOG_FILE_APPENDER: &str = "log_file";
const ERR_LOG_FILE_APPENDER: &str = "err_log_file";

/// Parsed form of a filter expression such as `"info,unison_core=debug,reqwest=warn,root=error"`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogFilters {
    /// Level for whitelisted crates (bare level in the expression, default `info`).
    pub app_level: LevelFilter,
    /// `root=<level>`; third-party crates are silent without it.
    pub root_level: LevelFilter,
    pub modules: Vec<(String, LevelFilter)>,
}

impl LogFilters {
    pub fn parse(filters: &str) -> Self {
        let mut parsed = Self { app_level: LevelFilter::Info, root_level: LevelFilter::Off, modules: Vec::new() };
        let mut app_level_set = false;
        for part in filters.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            match part.split_once('=') {
                None => {
                    if let (false, Ok(level)) = (app_level_set, part.parse()) {
                        parsed.app_level = level;
                        app_level_set = true;
                    }
                }
                Some((module, level)) => {
                    let (module, level) = (module.trim(), level.trim());
                    let Ok(level) = level.parse::<LevelFilter>() else { continue };
                    if module == "root" {
                        parsed.root_level = level;
                    } else if !module.is_empty() {
                        parsed.modules.push((module.to_string(), level));
                    }
                }
            }
        }
        parsed
    }
}

/// Installs the global logger: stderr always, plus `unison.log` / `unison_err.log` when `log_dir` is set.
///
/// Repeated calls keep the first logger.
pub fn init_logger(log_dir: Option<&str>, filters: &str) -> Result<(), UnisonError> {
    let config = build_config(log_dir, &LogFilters::parse(filters))?;
    let _ = log4rs::init_config(config);
    Ok(())
}

fn build_config(log_dir: Option<&str>, filters: &LogFilters) -> Result<Config, UnisonError> {
    let pattern = if std::io::stderr().is_terminal() { LOG_LINE_PATTERN_COLORED } else { LOG_LINE_PATTERN };
    let console = ConsoleAppender::builder().target(Target::Stderr).encoder(Box::new(PatternEncoder::new(pattern))).build();
    let mut builder = Config::builder().appender(Appender::builder().build(CONSOLE_APPENDER, Box::new(console)));
    let mut appenders = vec![CONSOLE_APPENDER.to_string()];

    if let Some(dir) = log_dir.map(str::trim).filter(|d| !d.is_empty()) {
        let dir = Path::new(dir);
        builder = builder.appender(Appender::builder().build(LOG_FILE_APPENDER, Box::new(rolling_file(dir, LOG_FILE_NAME)?)));
        builder = builder.appender(
            Appender::builder()
                .filter(Box::new(ThresholdFilter::new(LevelFilter::Warn)))
                .build(ERR_LOG_FILE_APPENDER, Box::new(rolling_file(dir, ERR_LOG_FILE_NAME)?)),
        );
        appenders.push(LOG_FILE_APPENDER.to_string());
        appenders.push(ERR_LOG_FILE_APPENDER.to_string());
    }

    for crate_name in WHITELISTED_CRATES.iter().filter(|c| !filters.modules.iter().any(|(m, _)| m == *c)) {
        builder = builder.logger(Logger::builder().appenders(appenders.clone()).additive(false).build(*crate_name, filters.app_level));
    }
    for (module, level) in &filters.modules {
        builder = builder.logger(Logger::builder().appenders(appenders.clone()).additive(false).build(module, *level));
    }

    builder
        .build(Root::builder().appenders(appenders).build(filters.root_level))
        .map_err(|err| UnisonError::ConfigError(format!("logger config: {err}")))
}

fn rolling_file(dir: &Path, file_name: &str) -> Result<RollingFileAppender, UnisonError> {
    let archive = dir.join(format!("{file_name}.{{}}.gz"));
    let archive = archive.to_str().ok_or_else(|| UnisonError::ConfigError(format!("non-utf8 log dir: {}", dir.display())))?;
    let roller = FixedWindowRoller::builder()
        .base(1)
        .build(archive, LOG_FILE_MAX_ROLLS)
        .map_err(|err| UnisonError::ConfigError(format!("log roller: {err}")))?;
    let policy = CompoundPolicy::new(Box::new(SizeTrigger::new(LOG_FILE_MAX_SIZE)), Box::new(roller));
    RollingFileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(LOG_LINE_PATTERN)))
        .build(dir.join(file_name), Box::new(policy))
        .map_err(|err| storage_err!(format!("open log file in {}", dir.display()), err))
}
