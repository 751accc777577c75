//! Schema routing: which table holds a chunk starting at a given time

use crate::{Error, Result};

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Resolves the destination table for a chunk from its start time.
pub trait SchemaRouter: Send + Sync {
    /// `from` is milliseconds since the epoch.
    fn table_for(&self, from: i64) -> Result<String>;
}

/// One schema period. Chunks starting on or after `from` (and before the next
/// period) live in tables named by this period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodConfig {
    /// First day (UTC) this period applies to
    pub from: NaiveDate,
    /// Table name, or table name prefix when `period_secs` is set
    pub prefix: String,
    /// Table rotation period; 0 means a single static table
    #[serde(default)]
    pub period_secs: u64,
}

impl PeriodConfig {
    fn start_millis(&self) -> i64 {
        self.from.and_time(NaiveTime::MIN).and_utc().timestamp_millis()
    }

    fn table_for(&self, from: i64) -> String {
        if self.period_secs == 0 {
            return self.prefix.clone();
        }
        let secs = from.div_euclid(1000);
        format!("{}{}", self.prefix, secs.div_euclid(self.period_secs as i64))
    }
}

/// Ordered list of schema periods
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SchemaConfig {
    pub configs: Vec<PeriodConfig>,
}

impl SchemaConfig {
    pub fn new(configs: Vec<PeriodConfig>) -> Result<Self> {
        let config = Self { configs };
        config.validate()?;
        Ok(config)
    }

    /// Load a YAML schema file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: SchemaConfig = serde_yaml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.configs.is_empty() {
            return Err(Error::Config("schema has no periods".to_string()));
        }
        for pair in self.configs.windows(2) {
            if pair[1].from <= pair[0].from {
                return Err(Error::Config(format!(
                    "schema periods must be in increasing order: {} follows {}",
                    pair[1].from, pair[0].from
                )));
            }
        }
        if let Some(p) = self.configs.iter().find(|p| p.prefix.is_empty()) {
            return Err(Error::Config(format!(
                "schema period starting {} has an empty table prefix",
                p.from
            )));
        }
        if let Some(p) = self
            .configs
            .iter()
            .find(|p| i64::try_from(p.period_secs).is_err())
        {
            return Err(Error::Config(format!(
                "schema period starting {} has period_secs {} above {}",
                p.from,
                p.period_secs,
                i64::MAX
            )));
        }
        Ok(())
    }
}

impl SchemaRouter for SchemaConfig {
    fn table_for(&self, from: i64) -> Result<String> {
        self.configs
            .iter()
            .rev()
            .find(|p| p.start_millis() <= from)
            .map(|p| p.table_for(from))
            .ok_or_else(|| Error::Schema(format!("no schema period covers timestamp {from}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WEEK: u64 = 7 * 24 * 3600;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn schema() -> SchemaConfig {
        SchemaConfig::new(vec![
            PeriodConfig {
                from: date(1970, 1, 1),
                prefix: "chunks".to_string(),
                period_secs: 0,
            },
            PeriodConfig {
                from: date(2024, 1, 1),
                prefix: "chunks_".to_string(),
                period_secs: WEEK,
            },
        ])
        .unwrap()
    }

    #[test]
    fn static_period_uses_prefix() {
        assert_eq!(schema().table_for(0).unwrap(), "chunks");
        assert_eq!(schema().table_for(3_600_000).unwrap(), "chunks");
    }

    #[test]
    fn periodic_tables_rotate() {
        let start = date(2024, 1, 1)
            .and_time(NaiveTime::MIN)
            .and_utc()
            .timestamp_millis();
        let first = schema().table_for(start).unwrap();
        let same = schema().table_for(start + 1000).unwrap();
        let next = schema().table_for(start + WEEK as i64 * 1000).unwrap();
        assert_eq!(first, same);
        assert_ne!(first, next);
        assert_eq!(first, format!("chunks_{}", start / 1000 / WEEK as i64));
    }

    #[test]
    fn timestamp_before_first_period_is_an_error() {
        let err = schema().table_for(-1).unwrap_err();
        assert!(matches!(err, Error::Schema(_)));
    }

    #[test]
    fn validate_rejects_unordered_periods() {
        let err = SchemaConfig::new(vec![
            PeriodConfig {
                from: date(2024, 1, 1),
                prefix: "a".to_string(),
                period_secs: 0,
            },
            PeriodConfig {
                from: date(2023, 1, 1),
                prefix: "b".to_string(),
                period_secs: 0,
            },
        ])
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn validate_rejects_period_beyond_i64() {
        let period = |period_secs| {
            SchemaConfig::new(vec![PeriodConfig {
                from: date(2021, 1, 1),
                prefix: "chunks-".to_string(),
                period_secs,
            }])
        };
        let err = period(i64::MAX as u64 + 1).unwrap_err();
        assert!(matches!(err, Error::Config(_)), "{err}");

        let schema = period(i64::MAX as u64).unwrap();
        assert_eq!(schema.table_for(1_609_459_200_000).unwrap(), "chunks-0");
    }

    #[test]
    fn load_from_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema.yaml");
        std::fs::write(
            &path,
            "configs:\n  - from: 2020-01-01\n    prefix: chunks_\n    period_secs: 604800\n",
        )
        .unwrap();
        let schema = SchemaConfig::load(&path).unwrap();
        assert_eq!(schema.configs.len(), 1);
        assert_eq!(schema.configs[0].period_secs, WEEK);
    }
}
