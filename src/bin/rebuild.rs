use anyhow::Result;
use clap::Parser;
use eventrec::config::StoreBackend;
use eventrec::{init_tracing, AppState, Config};
use futures::future::join_all;
use tracing::{error, info};

/// Replays interaction history into fresh preference profiles.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "config/default.toml")]
    config: String,

    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// User whose profile to rebuild; repeat for several users.
    #[arg(short, long = "user", required = true)]
    users: Vec<String>,
}

/// A memory backend starts empty in this process, so there is no history to
/// replay.
fn ensure_persistent_backend(config: &Config) -> Result<()> {
    if config.store.backend == StoreBackend::Memory {
        anyhow::bail!(
            "memory store backend has no history to replay; set store.backend = \"redis\""
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    std::env::set_var("RUST_LOG", &args.log_level);
    init_tracing();

    let config = if std::path::Path::new(&args.config).exists() {
        Config::from_file(&args.config)?
    } else {
        info!("Config file not found, using default configuration");
        Config::default()
    };

    ensure_persistent_backend(&config)?;

    info!(
        "Rebuilding {} profiles from the last {} interactions each",
        args.users.len(),
        config.recommendation.history_replay_limit
    );

    let state = AppState::new(config).await?;
    let aggregator = &state.aggregator;

    let results = join_all(args.users.iter().map(|user_id| async move {
        (user_id, aggregator.rebuild(user_id).await)
    }))
    .await;

    let mut profiles = Vec::new();
    let mut failures = 0;
    for (user_id, result) in results {
        match result {
            Ok(profile) => profiles.push(profile),
            Err(e) => {
                error!("Failed to rebuild profile for user {}: {}", user_id, e);
                failures += 1;
            }
        }
    }

    println!("{}", serde_json::to_string_pretty(&profiles)?);

    if failures > 0 {
        anyhow::bail!("{} of {} rebuilds failed", failures, args.users.len());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_backend_is_refused() {
        let config = Config::default();
        assert!(ensure_persistent_backend(&config).is_err());

        let mut config = Config::default();
        config.store.backend = StoreBackend::Redis;
        assert!(ensure_persistent_backend(&config).is_ok());
    }

    #[test]
    fn test_user_flag_is_required_and_repeatable() {
        assert!(Args::try_parse_from(["eventrec-rebuild"]).is_err());

        let args =
            Args::try_parse_from(["eventrec-rebuild", "--user", "u1", "--user", "u2"]).unwrap();
        assert_eq!(args.users, vec!["u1", "u2"]);
        assert_eq!(args.log_level, "info");
    }
}
