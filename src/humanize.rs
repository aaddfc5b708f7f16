//! Human-readable sizes and durations for log lines and notices

use std::fmt;
use std::time::Duration;

const KIB: u64 = 1024;
const MIB: u64 = 1024 * 1024;

/// Byte count that renders as `512 B`, `14.5 KB` or `80.0 MB`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ByteSize(pub u64);

impl ByteSize {
    pub fn to_human_readable(&self) -> String {
        match self.0 {
            n if n < KIB => format!("{} B", n),
            n if n < MIB => format!("{:.1} KB", n as f64 / KIB as f64),
            n => format!("{:.1} MB", n as f64 / MIB as f64),
        }
    }
}

impl From<u64> for ByteSize {
    fn from(value: u64) -> Self {
        ByteSize(value)
    }
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_human_readable())
    }
}

/// Spell out a duration in the largest whole unit: `5 minutes`, `90 seconds`
pub fn duration_words(duration: Duration) -> String {
    fn plural(n: u128, unit: &str) -> String {
        if n == 1 {
            format!("1 {}", unit)
        } else {
            format!("{} {}s", n, unit)
        }
    }

    let secs = duration.as_secs();
    if secs == 0 {
        return plural(duration.as_millis(), "millisecond");
    }
    if secs % 3600 == 0 {
        return plural(u128::from(secs / 3600), "hour");
    }
    if secs % 60 == 0 {
        return plural(u128::from(secs / 60), "minute");
    }
    plural(u128::from(secs), "second")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes() {
        assert_eq!(ByteSize(0).to_human_readable(), "0 B");
        assert_eq!(ByteSize(1023).to_human_readable(), "1023 B");
    }

    #[test]
    fn test_kilobytes() {
        assert_eq!(ByteSize(1024).to_human_readable(), "1.0 KB");
        assert_eq!(ByteSize(1536).to_human_readable(), "1.5 KB");
    }

    #[test]
    fn test_megabytes() {
        assert_eq!(ByteSize(5 * MIB).to_human_readable(), "5.0 MB");
        assert_eq!(ByteSize(15_728_640).to_human_readable(), "15.0 MB");
        // Large files stay in MB, there is no GB step
        assert_eq!(ByteSize(2048 * MIB).to_human_readable(), "2048.0 MB");
    }

    #[test]
    fn test_duration_words() {
        assert_eq!(duration_words(Duration::from_secs(300)), "5 minutes");
        assert_eq!(duration_words(Duration::from_secs(60)), "1 minute");
        assert_eq!(duration_words(Duration::from_secs(90)), "90 seconds");
        assert_eq!(duration_words(Duration::from_secs(1)), "1 second");
        assert_eq!(duration_words(Duration::from_secs(3600)), "1 hour");
        assert_eq!(duration_words(Duration::from_millis(500)), "500 milliseconds");
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", ByteSize::from(14 * MIB + MIB / 2)), "14.5 MB");
    }
}
