use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use callqi_config::Settings;
use callqi_db::models::{AsrResponse, Channel, ChannelRoles};
use callqi_services::ScoreRequest;
use callqi_services::ScoringEngine;
use callqi_services::catalog::StaticCatalog;
use callqi_services::dao::{CreditStore, MemoryCreditStore, MongoCreditStore};
use callqi_services::matching::HttpPredictor;
use clap::{Parser, ValueEnum};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Role {
    Staff,
    Customer,
}

/// Scores one recorded call and prints its credit history as JSON.
#[derive(Parser, Debug)]
#[command(name = "callqi-replay")]
#[command(version)]
struct Args {
    /// ASR result of the call (JSON)
    #[arg(long)]
    asr: PathBuf,

    /// Rule settings catalog (JSON)
    #[arg(long)]
    catalog: PathBuf,

    /// Rule group to score against; repeat for several
    #[arg(long = "rule-group", required = true)]
    rule_groups: Vec<u64>,

    /// Who speaks on the left channel
    #[arg(long, value_enum, default_value = "staff")]
    left_role: Role,

    /// Settings file, overriding CALLQI_CONFIG
    #[arg(long, env = "CALLQI_CONFIG")]
    config: Option<PathBuf>,

    /// Keep credits in memory instead of writing them to MongoDB
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let settings = match &args.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    }
    .context("Failed to load settings")?;
    callqi_services::telemetry::init_tracing(&settings.logging)
        .context("Failed to initialise tracing")?;

    let raw = std::fs::read_to_string(&args.asr)
        .with_context(|| format!("Failed to read {}", args.asr.display()))?;
    let asr: AsrResponse = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse ASR result {}", args.asr.display()))?;
    let catalog = StaticCatalog::from_path(&args.catalog).context("Failed to load catalog")?;

    let store: Arc<dyn CreditStore> = if args.dry_run {
        Arc::new(MemoryCreditStore::new())
    } else {
        let client = mongodb::Client::with_uri_str(&settings.database.url)
            .await
            .context("Failed to connect to MongoDB")?;
        let db = client.database(&settings.database.name);
        callqi_db::indexes::ensure_indexes(&db)
            .await
            .context("Failed to ensure indexes")?;
        Arc::new(MongoCreditStore::new(client, db))
    };
    let predictor =
        HttpPredictor::new(&settings.predictor).context("Failed to build predictor client")?;

    let engine = ScoringEngine::new(
        store,
        Arc::new(predictor),
        Arc::new(catalog),
        settings.scoring.clone(),
        settings.timeline.clone(),
    );

    let roles = match args.left_role {
        Role::Staff => ChannelRoles::staff_on(Channel::Left),
        Role::Customer => ChannelRoles::staff_on(Channel::Right),
    };
    let call_id = asr.call_id;
    let scored = engine
        .score_call(ScoreRequest {
            asr,
            roles,
            rule_group_ids: args.rule_groups.clone(),
        })
        .await
        .with_context(|| format!("Failed to score call {call_id}"))?;
    info!(
        call_id,
        score = scored.score,
        rows = scored.credit_ids.len(),
        dry_run = args.dry_run,
        "Replay finished"
    );

    let history = engine
        .retrieve_credit(call_id)
        .await
        .context("Failed to read back credit history")?;
    println!("{}", serde_json::to_string_pretty(&history)?);
    Ok(())
}
