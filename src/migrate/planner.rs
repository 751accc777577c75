//! Expands a migration into independent scan requests

use crate::scan::{ScanRequest, Shard, NUM_SHARDS};
use crate::{Error, Result};

use serde::{Deserialize, Serialize};

/// What to migrate: every listed table, for every listed tenant, over an
/// inclusive range of shards
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannerConfig {
    pub first_shard: u8,
    /// Inclusive
    pub last_shard: u8,
    pub users: Vec<String>,
    pub tables: Vec<String>,
    /// Only chunks overlapping `[from, through)` milliseconds
    #[serde(default)]
    pub interval: Option<(i64, i64)>,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            first_shard: 0,
            last_shard: NUM_SHARDS - 1,
            users: Vec::new(),
            tables: Vec::new(),
            interval: None,
        }
    }
}

impl PlannerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.last_shard >= NUM_SHARDS {
            return Err(Error::InvalidShard(format!(
                "last shard {} out of range, expected at most {}",
                self.last_shard,
                NUM_SHARDS - 1
            )));
        }
        if self.first_shard > self.last_shard {
            return Err(Error::InvalidShard(format!(
                "first shard {} is after last shard {}",
                self.first_shard, self.last_shard
            )));
        }
        if self.users.is_empty() {
            return Err(Error::Config("migration plan needs at least one user".to_string()));
        }
        if self.tables.is_empty() {
            return Err(Error::Config("migration plan needs at least one table".to_string()));
        }
        if let Some(user) = self.users.iter().find(|u| u.is_empty() || u.contains('/')) {
            return Err(Error::Config(format!("invalid user id {user:?}")));
        }
        if let Some((from, through)) = self.interval {
            if from >= through {
                return Err(Error::Config(format!(
                    "interval start {from} must be before its end {through}"
                )));
            }
        }
        Ok(())
    }
}

/// Validated migration plan
#[derive(Debug, Clone)]
pub struct Planner {
    config: PlannerConfig,
}

impl Planner {
    pub fn new(config: PlannerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Number of requests [`plan`](Self::plan) yields
    pub fn len(&self) -> usize {
        let shards = usize::from(self.config.last_shard - self.config.first_shard) + 1;
        self.config.tables.len() * self.config.users.len() * shards
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Table-major, then user, then shard order
    pub fn plan(&self) -> impl Iterator<Item = ScanRequest> + '_ {
        let shards = self.config.first_shard..=self.config.last_shard;
        let interval = self.config.interval;
        self.config.tables.iter().flat_map(move |table| {
            let shards = shards.clone();
            self.config.users.iter().flat_map(move |user| {
                shards.clone().filter_map(move |index| {
                    Shard::new(index).ok().map(|shard| ScanRequest {
                        table: table.clone(),
                        user: user.clone(),
                        shard,
                        interval,
                    })
                })
            })
        })
    }
}
