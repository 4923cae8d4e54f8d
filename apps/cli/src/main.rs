//! `keyward`: drive the resource pools from the command line.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use keyward_log::{Format, LoggerGuard};
use keyward_pool::{Error as PoolError, Identify, PoolRegistry, RegistryConfig, ShutdownReport};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

const CHANNELS: [&str; 3] = ["FILE", "DATABASE", "CLOUD"];

/// Bounded resource pools for secure connections and encryption engines
#[derive(Parser)]
#[command(name = "keyward", version, long_about = None)]
struct Cli {
    /// Registry configuration file (JSON). Defaults to KEYWARD_POOL_* variables
    #[arg(short, long, global = true, env = "KEYWARD_CONFIG")]
    config: Option<PathBuf>,

    /// Log output format (pretty, compact, json)
    #[arg(long, global = true)]
    log_format: Option<Format>,

    /// Log filter, e.g. `debug` or `keyward_pool=trace`
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Walk through connection, engine and reuse scenarios
    Demo,
    /// Hammer the default pools from many concurrent workers
    Stress {
        /// Concurrent workers
        #[arg(short, long, default_value_t = 16)]
        workers: usize,
        /// Checkouts per worker
        #[arg(short, long, default_value_t = 10)]
        rounds: usize,
        /// Give up on a single checkout after this many milliseconds
        #[arg(long, default_value_t = 1000)]
        timeout_ms: u64,
    },
    /// Encrypt a value with a pooled AES engine
    Encrypt {
        /// Passphrase the key is derived from
        #[arg(long, env = "KEYWARD_PASSPHRASE", hide_env_values = true)]
        passphrase: String,
        /// AES key size in bits (128 or 256)
        #[arg(long, default_value_t = 256)]
        key_size: u32,
        /// Text to encrypt
        plaintext: String,
    },
    /// Decrypt a value produced by `encrypt`
    Decrypt {
        /// Passphrase used for encryption
        #[arg(long, env = "KEYWARD_PASSPHRASE", hide_env_values = true)]
        passphrase: String,
        /// AES key size in bits (128 or 256)
        #[arg(long, default_value_t = 256)]
        key_size: u32,
        /// Base64 output of `encrypt`
        ciphertext: String,
    },
    /// Print the effective registry configuration as JSON
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _log = init_logging(&cli)?;
    let config = load_config(cli.config.as_deref())?;

    if matches!(cli.command, Commands::Config) {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let registry = Arc::new(PoolRegistry::with_default_pools(config)?);
    let outcome = match cli.command {
        Commands::Demo => demo(&registry).await,
        Commands::Stress {
            workers,
            rounds,
            timeout_ms,
        } => stress(&registry, workers, rounds, Duration::from_millis(timeout_ms)).await,
        Commands::Encrypt {
            passphrase,
            key_size,
            plaintext,
        } => encrypt(&registry, key_size, &plaintext, &passphrase).await,
        Commands::Decrypt {
            passphrase,
            key_size,
            ciphertext,
        } => decrypt(&registry, key_size, &ciphertext, &passphrase).await,
        Commands::Config => Ok(()),
    };

    // Shut down even when the command failed.
    let report = registry.close_all_pools().await;
    print_report(&report);
    outcome
}

fn init_logging(cli: &Cli) -> Result<LoggerGuard> {
    let mut config = keyward_log::Config::from_env();
    if let Some(format) = cli.log_format {
        config.format = format;
    }
    if let Some(level) = &cli.log_level {
        config.level.clone_from(level);
    }
    config.service = Some("keyward".to_string());
    keyward_log::init_with(config).context("failed to initialize logging")
}

fn load_config(path: Option<&Path>) -> Result<RegistryConfig> {
    match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            RegistryConfig::from_json(&raw)
                .with_context(|| format!("invalid config {}", path.display()))
        }
        None => RegistryConfig::from_env().context("invalid KEYWARD_POOL_* environment"),
    }
}

// ---------------------------------------------------------------------------
// demo
// ---------------------------------------------------------------------------

async fn demo(registry: &PoolRegistry) -> Result<()> {
    println!("--- Secure connections ---");
    let mut file = registry.connection("FILE", true).await?;
    let mut database = registry.connection("DATABASE", true).await?;
    file.send("Sample file data").await?;
    database.send("Sample database query").await?;
    println!("FILE connection     {}", file.id());
    println!("DATABASE connection {}", database.id());
    registry.release_connection(file)?;
    registry.release_connection(database)?;

    println!("\n--- Encryption engines ---");
    let mut engine = registry.engine("AES", 256).await?;
    let key = engine.generate_key().await?;
    let secret = "This is a secret password!";
    let sealed = engine.encrypt(secret, &key).await?;
    let opened = engine.decrypt(&sealed, &key).await?;
    registry.release_engine(engine)?;
    println!("Generated key:  {key}");
    println!("Encrypted text: {sealed}");
    println!("Decrypted text: {opened}");
    anyhow::ensure!(opened == secret, "decrypted text does not match the original");

    println!("\n--- Resource reuse ---");
    let first = registry.connection("FILE", true).await?;
    let first_id = first.id();
    registry.release_connection(first)?;
    let second = registry.connection("FILE", true).await?;
    println!("Second FILE checkout reused the first: {}", second.id() == first_id);
    registry.release_connection(second)?;

    let mut held = Vec::with_capacity(3);
    for n in 1..=3 {
        let conn = registry.connection("FILE", true).await?;
        println!("Holding connection {n}: {}", conn.id());
        held.push(conn);
    }
    for conn in held {
        registry.release_connection(conn)?;
    }

    println!();
    print_snapshots(registry);
    Ok(())
}

// ---------------------------------------------------------------------------
// encrypt / decrypt
// ---------------------------------------------------------------------------

async fn encrypt(
    registry: &PoolRegistry,
    key_size: u32,
    plaintext: &str,
    passphrase: &str,
) -> Result<()> {
    let mut engine = registry.engine("AES", key_size).await?;
    let sealed = engine.encrypt(plaintext, passphrase).await;
    registry.release_engine(engine)?;
    println!("{}", sealed?);
    Ok(())
}

async fn decrypt(
    registry: &PoolRegistry,
    key_size: u32,
    ciphertext: &str,
    passphrase: &str,
) -> Result<()> {
    let mut engine = registry.engine("AES", key_size).await?;
    let opened = engine.decrypt(ciphertext, passphrase).await;
    registry.release_engine(engine)?;
    println!("{}", opened?);
    Ok(())
}

// ---------------------------------------------------------------------------
// stress
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Tally {
    completed: usize,
    timed_out: usize,
    interrupted: usize,
}

impl Tally {
    fn merge(&mut self, other: &Self) {
        self.completed += other.completed;
        self.timed_out += other.timed_out;
        self.interrupted += other.interrupted;
    }
}

async fn stress(
    registry: &Arc<PoolRegistry>,
    workers: usize,
    rounds: usize,
    timeout: Duration,
) -> Result<()> {
    let token = CancellationToken::new();
    let ctrl_c = {
        let token = token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, stopping workers");
                token.cancel();
            }
        })
    };

    let started = Instant::now();
    let mut set = JoinSet::new();
    for worker in 0..workers {
        let registry = Arc::clone(registry);
        let token = token.clone();
        set.spawn(async move { run_worker(&registry, worker, rounds, timeout, &token).await });
    }

    let mut total = Tally::default();
    while let Some(joined) = set.join_next().await {
        total.merge(&joined.context("worker panicked")??);
    }
    ctrl_c.abort();

    println!(
        "{} checkouts completed, {} timed out, {} interrupted in {:.2?}",
        total.completed,
        total.timed_out,
        total.interrupted,
        started.elapsed()
    );
    print_snapshots(registry);
    Ok(())
}

async fn run_worker(
    registry: &PoolRegistry,
    worker: usize,
    rounds: usize,
    timeout: Duration,
    token: &CancellationToken,
) -> Result<Tally> {
    let mut tally = Tally::default();

    for round in 0..rounds {
        let outcome = if round % 3 == 2 {
            let pool = registry.engine_pool("AES", 256, None)?;
            match tokio::time::timeout(timeout, pool.get_cancellable(token)).await {
                Ok(Ok(mut engine)) => {
                    let used = engine.generate_key().await;
                    pool.release(engine)?;
                    used.map(|_| true)
                }
                Ok(Err(e)) => Err(e.into_error()),
                Err(_) => Ok(false),
            }
        } else {
            let channel = CHANNELS[(worker + round) % CHANNELS.len()];
            let pool = registry.connection_pool(channel, true, None)?;
            match tokio::time::timeout(timeout, pool.get_cancellable(token)).await {
                Ok(Ok(mut conn)) => {
                    let sent = conn.send(&format!("worker {worker} round {round}")).await;
                    pool.release(conn)?;
                    sent.map(|()| true)
                }
                Ok(Err(e)) => Err(e.into_error()),
                Err(_) => Ok(false),
            }
        };

        match outcome {
            Ok(true) => tally.completed += 1,
            Ok(false) => tally.timed_out += 1,
            Err(PoolError::Interrupted { .. }) => {
                tally.interrupted += 1;
                break;
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(tally)
}

// ---------------------------------------------------------------------------
// output
// ---------------------------------------------------------------------------

fn print_snapshots(registry: &PoolRegistry) {
    println!("{:<22} {:>9} {:>6} {:>8}", "POOL", "AVAILABLE", "IN USE", "CAPACITY");
    for (kind, snapshot) in registry.snapshots() {
        println!(
            "{:<22} {:>9} {:>6} {:>8}",
            kind.to_string(),
            snapshot.available,
            snapshot.in_use,
            snapshot.capacity
        );
    }
}

fn print_report(report: &ShutdownReport) {
    eprintln!(
        "Shut down {} pools, closed {} resources",
        report.pools, report.resources_closed
    );
    for (kind, error) in &report.failures {
        eprintln!("  {kind}: {error}");
    }
}
