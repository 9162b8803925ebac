//! Severity classification for toasts
//!
//! The severity decides the icon and the default display duration:
//! - SUCCESS / INFO: 3000ms
//! - WARNING: 4000ms
//! - ERROR: 5000ms

use std::time::Duration;

/// Severity level for toasts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Success,
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Success => "success",
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        }
    }

    /// Default display duration when the caller does not set one
    pub fn default_duration(&self) -> Duration {
        match self {
            Severity::Success | Severity::Info => Duration::from_millis(3000),
            Severity::Warning => Duration::from_millis(4000),
            Severity::Error => Duration::from_millis(5000),
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            Severity::Success => "✅",
            Severity::Error => "❌",
            Severity::Warning => "⚠️",
            Severity::Info => "ℹ️",
        }
    }

    /// Parse a severity name, falling back to `Info` for anything unknown
    ///
    /// Matching is case-insensitive and ignores surrounding whitespace.
    pub fn parse_lossy(value: &str) -> Severity {
        match value.trim().to_lowercase().as_str() {
            "success" => Severity::Success,
            "error" => Severity::Error,
            "warning" | "warn" => Severity::Warning,
            _ => Severity::Info,
        }
    }
}

impl Default for Severity {
    fn default() -> Self {
        Severity::Info
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_durations() {
        assert_eq!(Severity::Success.default_duration(), Duration::from_millis(3000));
        assert_eq!(Severity::Info.default_duration(), Duration::from_millis(3000));
        assert_eq!(Severity::Warning.default_duration(), Duration::from_millis(4000));
        assert_eq!(Severity::Error.default_duration(), Duration::from_millis(5000));
    }

    #[test]
    fn test_parse_lossy_falls_back_to_info() {
        assert_eq!(Severity::parse_lossy("ERROR"), Severity::Error);
        assert_eq!(Severity::parse_lossy(" warning "), Severity::Warning);
        assert_eq!(Severity::parse_lossy("success"), Severity::Success);
        // 未知类型回退为 info
        assert_eq!(Severity::parse_lossy("critical"), Severity::Info);
        assert_eq!(Severity::parse_lossy(""), Severity::Info);
    }

    #[test]
    fn test_serde_lowercase() {
        let json = serde_json::to_string(&Severity::Warning).unwrap();
        assert_eq!(json, "\"warning\"");
        let parsed: Severity = serde_json::from_str("\"error\"").unwrap();
        assert_eq!(parsed, Severity::Error);
    }
}
