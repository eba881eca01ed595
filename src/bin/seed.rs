//! Populate a store with sample restaurants and reviews
//!
//! ```bash
//! # Against the emulator
//! FIRESTORE_PROJECT_ID=demo FIRESTORE_EMULATOR_HOST=localhost:8080 cargo run --bin friendlyeats-seed
//!
//! # Dry run in memory
//! RUST_LOG=debug cargo run --bin friendlyeats-seed -- --memory --count 5
//! ```

use clap::Parser;
use friendlyeats_store::seed;
use friendlyeats_store::store::{MemoryStore, RestStore, Settings};
use friendlyeats_store::{EatsError, EatsResult};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// `friendlyeats-seed` command arguments.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "friendlyeats-seed",
    about = "Populate a store with sample restaurants and reviews",
    version
)]
struct Args {
    /// Seed a throwaway in-memory store instead of the configured REST store.
    #[arg(long)]
    memory: bool,
    /// Number of restaurants to generate.
    #[arg(long, value_name = "n", default_value_t = 20)]
    count: usize,
}

#[tokio::main]
async fn main() -> EatsResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let data = seed::generate(args.count, &mut rand::thread_rng());

    let report = if args.memory {
        let store = MemoryStore::new();
        let report = seed::populate(&store, &data).await;
        info!(documents = store.document_count().await, "memory store populated");
        report
    } else {
        let settings = Settings::from_env()?;
        info!(database = %settings.database_path(), host = %settings.host, "seeding store");
        let store = RestStore::new(settings)?;
        seed::populate(&store, &data).await
    };

    if report.failures > 0 && report.restaurants == 0 {
        return Err(EatsError::StoreUnavailable(format!(
            "all {} restaurants failed to write",
            report.failures
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_defaults() {
        let args = Args::try_parse_from(["friendlyeats-seed"]).unwrap();
        assert!(!args.memory);
        assert_eq!(args.count, 20);
    }

    #[test]
    fn test_args_accepts_both_count_forms() {
        let args = Args::try_parse_from(["friendlyeats-seed", "--memory", "--count", "5"]).unwrap();
        assert!(args.memory);
        assert_eq!(args.count, 5);

        let args = Args::try_parse_from(["friendlyeats-seed", "--count=7"]).unwrap();
        assert_eq!(args.count, 7);
    }

    #[test]
    fn test_args_rejects_bad_input() {
        assert!(Args::try_parse_from(["friendlyeats-seed", "--count", "many"]).is_err());
        assert!(Args::try_parse_from(["friendlyeats-seed", "--verbose"]).is_err());
    }
}
