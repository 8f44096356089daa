use std::{fs::OpenOptions, path::Path, sync::Mutex};

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::{errors::Error, Result};

/// Line layout of the console log.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Timestamp, level, target, message and fields.
    #[default]
    Full,
    /// Shorter lines with fields folded after the message.
    Compact,
}

impl LogFormat {
    /// `compact` selects [`LogFormat::Compact`]; any other value (including
    /// printf-style templates from older configs) keeps the full layout.
    pub fn from_setting(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("compact") {
            LogFormat::Compact
        } else {
            LogFormat::Full
        }
    }
}

/// Initialize tracing for the run.
///
/// `RUST_LOG` wins when set; otherwise `level` applies to everything. When
/// `log_file` is given, events are also appended there without ANSI colors,
/// always in the full layout.
pub fn init(level: &str, format: LogFormat, log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let (full, compact) = match format {
        LogFormat::Full => (Some(fmt::layer().with_writer(std::io::stderr)), None),
        LogFormat::Compact => (
            None,
            Some(fmt::layer().compact().with_writer(std::io::stderr)),
        ),
    };

    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| Error::InvalidPath {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(full)
        .with(compact)
        .with(file_layer)
        .try_init()
        .map_err(|e| Error::External(format!("logging init failed: {e}")))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_compact_switches_layout() {
        assert_eq!(LogFormat::from_setting(" Compact "), LogFormat::Compact);
        assert_eq!(LogFormat::from_setting("full"), LogFormat::Full);
        assert_eq!(
            LogFormat::from_setting("%(asctime)s | %(levelname)s | %(message)s"),
            LogFormat::Full
        );
    }
}
