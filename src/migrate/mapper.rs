//! Tenant renaming during migration
//!
//! A mapper file is YAML with a single `users` map from source tenant to
//! destination tenant:
//!
//! ```yaml
//! users:
//!   1: 2
//!   team-a: team-b
//! ```
//!
//! Tenant IDs are often numeric, so scalar keys and values are read as
//! their string form.

use crate::chunk::Chunk;
use crate::{Error, Result};

use serde_yaml::Value;
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

/// Rewrites the tenant of chunks
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mapper {
    pub users: HashMap<String, String>,
}

impl Mapper {
    pub fn new(users: HashMap<String, String>) -> Self {
        Self { users }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let mapper = Self::from_yaml(&raw)?;
        info!(path = %path.display(), users = mapper.users.len(), "Loaded tenant mapper");
        Ok(mapper)
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        let doc: Value = serde_yaml::from_str(raw)?;
        let users = match doc.get("users") {
            None | Some(Value::Null) => return Ok(Self::default()),
            Some(Value::Mapping(users)) => users,
            Some(_) => {
                return Err(Error::Config("mapper 'users' must be a map".to_string()));
            }
        };

        let mut out = HashMap::with_capacity(users.len());
        for (from, to) in users {
            out.insert(scalar(from)?, scalar(to)?);
        }
        Ok(Self { users: out })
    }

    /// Destination tenant for `user`; unmapped tenants keep their ID.
    pub fn map_user<'a>(&'a self, user: &'a str) -> &'a str {
        self.users.get(user).map_or(user, String::as_str)
    }

    /// Rewrite the tenant of every chunk. All other fields are kept, so each
    /// chunk's external key changes only in its tenant part.
    pub fn map_chunks(&self, mut chunks: Vec<Chunk>) -> Vec<Chunk> {
        for chunk in &mut chunks {
            if let Some(to) = self.users.get(&chunk.user_id) {
                chunk.user_id.clone_from(to);
            }
        }
        chunks
    }
}

fn scalar(value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(Error::Config(format!(
            "mapper tenant IDs must be scalars, got {other:?}"
        ))),
    }
}
