//! Display formatting for snippet timestamps.

use banter_config::LocaleConfig;
use chrono::{DateTime, FixedOffset, Offset, Utc};
use chrono_tz::Tz;
use std::sync::Arc;
use tracing::warn;

/// Renders a document timestamp for a snippet header.
pub trait TimestampFormatter: Send + Sync {
    fn format(&self, timestamp: &DateTime<Utc>) -> String;
}

/// The formatter `locale` asks for: its IANA zone when set, otherwise the
/// fixed offset. An unknown zone name is logged and the offset used.
pub fn formatter_from_locale(locale: &LocaleConfig) -> Arc<dyn TimestampFormatter> {
    let zone = locale.timezone.trim();
    if zone.is_empty() {
        return Arc::new(FixedOffsetFormatter::from_config(locale));
    }
    match ZonedFormatter::new(zone, locale.timestamp_format.clone()) {
        Some(formatter) => Arc::new(formatter),
        None => {
            warn!(timezone = %zone, "Unknown timezone, using fixed offset");
            Arc::new(FixedOffsetFormatter::from_config(locale))
        }
    }
}

/// Formats in an IANA zone, following its daylight-saving rules.
#[derive(Debug, Clone)]
pub struct ZonedFormatter {
    zone: Tz,
    pattern: String,
}

impl ZonedFormatter {
    /// `None` if `zone` is not a known IANA name.
    pub fn new(zone: &str, pattern: impl Into<String>) -> Option<Self> {
        let zone = zone.parse::<Tz>().ok()?;
        Some(Self {
            zone,
            pattern: pattern.into(),
        })
    }
}

impl TimestampFormatter for ZonedFormatter {
    fn format(&self, timestamp: &DateTime<Utc>) -> String {
        timestamp
            .with_timezone(&self.zone)
            .format(&self.pattern)
            .to_string()
    }
}

/// Formats in a fixed UTC offset with a strftime pattern.
#[derive(Debug, Clone)]
pub struct FixedOffsetFormatter {
    offset: FixedOffset,
    pattern: String,
}

impl FixedOffsetFormatter {
    /// An out-of-range offset falls back to UTC.
    pub fn new(offset_minutes: i32, pattern: impl Into<String>) -> Self {
        let offset = offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .unwrap_or_else(|| Utc.fix());
        Self {
            offset,
            pattern: pattern.into(),
        }
    }

    pub fn from_config(locale: &LocaleConfig) -> Self {
        Self::new(locale.utc_offset_minutes, locale.timestamp_format.clone())
    }
}

impl Default for FixedOffsetFormatter {
    fn default() -> Self {
        Self::from_config(&LocaleConfig::default())
    }
}

impl TimestampFormatter for FixedOffsetFormatter {
    fn format(&self, timestamp: &DateTime<Utc>) -> String {
        timestamp
            .with_timezone(&self.offset)
            .format(&self.pattern)
            .to_string()
    }
}
