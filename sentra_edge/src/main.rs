//! Sentra Edge - CLI
//!
//! Operator commands: provision the device key, run a sync cycle,
//! recognize a probe image, show status.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use sentra_edge::annotate::render_verdict;
use sentra_edge::scan_log::{ScanEntry, ScanLog};
use sentra_edge::sync::SyncOutcome;
use sentra_edge::{
    EdgeConfig, EmbeddingStore, FaceEmbedder, HttpRemoteStore, MatchOutcome, Matcher,
    PerceptualEmbedder, RemoteStore, SyncEngine,
};
use sentra_keyvault::{KeyVault, KeyVaultError};

/// Default RSA key size for provisioning
const KEY_BITS: usize = 2048;

#[derive(Parser)]
#[command(name = "sentra-edge")]
#[command(version = sentra_edge::VERSION)]
#[command(about = "Sentra Edge - encrypted image sync and on-device face recognition")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate the device key pair and publish the public key
    Provision {
        /// Replace an existing key pair
        #[arg(long)]
        force: bool,
    },

    /// Run one sync cycle against the remote store
    Sync,

    /// Match a probe image against the synced signatures
    Recognize {
        /// Probe image path
        image: PathBuf,

        /// Write an annotated copy of the probe here
        #[arg(long)]
        annotate: Option<PathBuf>,

        /// Override the acceptance threshold for this query
        #[arg(long)]
        threshold: Option<f32>,
    },

    /// Show device and store status
    Status,
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    let config = EdgeConfig::from_env()?;

    match cli.command {
        Commands::Provision { force } => provision(&config, force).await,
        Commands::Sync => sync(&config).await,
        Commands::Recognize {
            image,
            annotate,
            threshold,
        } => recognize(&config, &image, annotate.as_deref(), threshold),
        Commands::Status => status(&config),
    }
}

async fn provision(config: &EdgeConfig, force: bool) -> anyhow::Result<i32> {
    println!("🔐 Provisioning device key pair...");

    let vault = if force {
        KeyVault::generate_overwrite(config.vault_dir(), KEY_BITS)?
    } else {
        match KeyVault::generate(config.vault_dir(), KEY_BITS) {
            Ok(vault) => vault,
            Err(KeyVaultError::VaultExists(path)) => {
                anyhow::bail!("key pair already exists at {path}; use --force to replace it")
            }
            Err(e) => return Err(e.into()),
        }
    };

    let remote = HttpRemoteStore::new(config)?;
    remote
        .publish_public_key(&config.product_key, &vault.public_key_pem()?)
        .await
        .context("publishing public key")?;

    println!("✅ Key pair ready (fingerprint {})", vault.key_id()?);
    println!("✅ Public key published for product {}", config.product_key);
    Ok(0)
}

async fn sync(config: &EdgeConfig) -> anyhow::Result<i32> {
    let vault = Arc::new(
        KeyVault::open(config.vault_dir())
            .context("opening device key pair; run `sentra-edge provision` first")?,
    );
    let store = Arc::new(EmbeddingStore::open(config.store_path())?);
    let remote = HttpRemoteStore::new(config)?;

    let engine = SyncEngine::new(
        remote,
        vault,
        store,
        PerceptualEmbedder,
        config.product_key.clone(),
        config.cache_dir(),
        config.profile_path(),
    );

    // Shutdown cancels the run; no partial state is committed
    let cancel = engine.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    match engine.run().await? {
        SyncOutcome::UpToDate => {
            println!("✅ Already up to date");
            Ok(0)
        }
        SyncOutcome::Committed(report) => {
            println!("✅ Sync committed");
            println!("   Fetched:   {}", report.fetched);
            println!("   New:       {}", report.committed);
            println!("   Unchanged: {}", report.unchanged);
            println!("   No face:   {}", report.no_face);
            println!("   Removed:   {}", report.removed);
            if report.is_clean() {
                Ok(0)
            } else {
                println!("⚠️  Skipped:   {}", report.skipped);
                for error in &report.errors {
                    println!("   - {error}");
                }
                Ok(2)
            }
        }
        SyncOutcome::AlreadyRunning => {
            println!("⚠️  A sync is already in progress");
            Ok(0)
        }
    }
}

fn recognize(
    config: &EdgeConfig,
    image: &std::path::Path,
    annotate: Option<&std::path::Path>,
    threshold: Option<f32>,
) -> anyhow::Result<i32> {
    let probe_bytes = std::fs::read(image).with_context(|| format!("reading {}", image.display()))?;

    let store = EmbeddingStore::open(config.store_path())?;
    let records = store.all_records()?;
    if records.is_empty() {
        println!("📭 No signatures synced yet; run `sentra-edge sync` first");
    }

    let matcher = Matcher::new(records, threshold.unwrap_or(config.match_threshold));

    let outcome = match PerceptualEmbedder.embed(&probe_bytes)? {
        Some(probe) => matcher.query(&probe),
        None => {
            println!("⚠️  No face detected in probe");
            MatchOutcome::NoMatch { best: None }
        }
    };

    match &outcome {
        MatchOutcome::Match {
            asset_id,
            label,
            score,
        } => {
            let who = label.as_deref().unwrap_or(asset_id);
            println!("✅ Match: {who} (score {score:.3})");
        }
        MatchOutcome::NoMatch { best: Some((id, score)) } => {
            println!("❌ No match (best {id} at {score:.3}, threshold {:.3})", matcher.threshold());
        }
        MatchOutcome::NoMatch { best: None } => {
            println!("❌ No match");
        }
    }

    ScanLog::new(config.scan_log_path()).append(ScanEntry::from_outcome(image, &outcome))?;

    if let Some(out_path) = annotate {
        let rendered = render_verdict(&probe_bytes, outcome.is_match())?;
        std::fs::write(out_path, rendered)?;
        println!("🖼  Annotated copy written to {}", out_path.display());
    }

    Ok(0)
}

fn status(config: &EdgeConfig) -> anyhow::Result<i32> {
    println!("📊 Sentra Edge Status");
    println!("{:-<40}", "");

    match KeyVault::open(config.vault_dir()) {
        Ok(vault) => println!("Device key:   {}", vault.key_id()?),
        Err(_) => println!("Device key:   not provisioned"),
    }

    let store = EmbeddingStore::open(config.store_path())?;
    let state = store.load_state()?;
    println!("Signatures:   {}", store.count()?);
    match state.last_updated_at {
        Some(ts) => println!("Last sync:    {ts}"),
        None => println!("Last sync:    never"),
    }

    match std::fs::read_to_string(config.profile_path()) {
        Ok(raw) => {
            if let Ok(meta) = serde_json::from_str::<sentra_edge::profile::ProfileMeta>(&raw) {
                let name = meta.display_name.as_deref().unwrap_or("-");
                println!("Profile:      {} ({})", name, meta.user_id);
                println!("Assets:       {}", meta.asset_count);
            }
        }
        Err(_) => println!("Profile:      not cached"),
    }

    Ok(0)
}
