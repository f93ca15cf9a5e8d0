//! Schema version model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A (major, minor) schema version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SchemaVersion {
    pub major: i64,
    pub minor: i64,
}

impl SchemaVersion {
    /// Version this build of the library writes and expects
    pub const CURRENT: SchemaVersion = SchemaVersion { major: 0, minor: 3 };

    pub const fn new(major: i64, minor: i64) -> Self {
        Self { major, minor }
    }

    pub fn is_current(&self) -> bool {
        *self == Self::CURRENT
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.X", self.major, self.minor)
    }
}

/// Row of the version history table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct VersionHistory {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub major_version: i64,
    pub minor_version: i64,
}

impl VersionHistory {
    pub fn version(&self) -> SchemaVersion {
        SchemaVersion::new(self.major_version, self.minor_version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_ordering_and_display() {
        assert!(SchemaVersion::new(0, 2) < SchemaVersion::CURRENT);
        assert!(SchemaVersion::new(1, 0) > SchemaVersion::CURRENT);
        assert_eq!(SchemaVersion::CURRENT.to_string(), "0.3.X");
        assert!(SchemaVersion::new(0, 3).is_current());
    }
}
