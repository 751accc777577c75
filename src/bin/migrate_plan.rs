//! Migration plan generator
//!
//! Prints every (table, tenant, shard) scan request of a migration as one
//! JSON object per line. Splitting the output lets several transfer
//! processes share one migration.

use chunktable::migrate::{Planner, PlannerConfig};
use chunktable::scan::NUM_SHARDS;
use chunktable::telemetry::Telemetry;

use anyhow::Context;
use clap::Parser;
use std::io::{BufWriter, Write};
use tracing::info;

/// chunktable migration planner
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// First shard to migrate
    #[arg(long, env = "MIGRATE_FIRST_SHARD", default_value_t = 0)]
    first_shard: u8,

    /// Last shard to migrate, inclusive
    #[arg(long, env = "MIGRATE_LAST_SHARD", default_value_t = NUM_SHARDS - 1)]
    last_shard: u8,

    /// Tenants to migrate, comma separated
    #[arg(long, env = "MIGRATE_USERS", value_delimiter = ',', required = true)]
    users: Vec<String>,

    /// Source tables, comma separated
    #[arg(long, env = "MIGRATE_TABLES", value_delimiter = ',', required = true)]
    tables: Vec<String>,

    /// Only migrate chunks overlapping [from, through), milliseconds
    #[arg(long, requires = "through")]
    from: Option<i64>,

    #[arg(long, requires = "from")]
    through: Option<i64>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let _telemetry = Telemetry::init("chunktable-migrate-plan", &args.log_level)
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;

    let planner = Planner::new(PlannerConfig {
        first_shard: args.first_shard,
        last_shard: args.last_shard,
        users: args.users,
        tables: args.tables,
        interval: args.from.zip(args.through),
    })?;

    let stdout = std::io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    for request in planner.plan() {
        serde_json::to_writer(&mut out, &request).context("failed to encode scan request")?;
        out.write_all(b"\n")?;
    }
    out.flush()?;

    info!(requests = planner.len(), "Migration plan written");
    Ok(())
}
