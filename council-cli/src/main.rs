//! council: validate, repair and simulate prediction bundles.
//!
//! Results are written to stdout as JSON, logs to stderr.

use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tracing::{info, warn};

use bundle::{BundleRepairer, BundleValidator, CategoryRegistry, PredictionValue};
use council::{
    ConsensusRound, CouncilConfig, CouncilSelector, ParametricStrategy, PerformanceTracker,
    ProductionContext, Question, RiskProfile, Source, SourceStrategy, StrategyProfile,
};

/// Specializations handed out to simulated sources, in rotation.
const SPECIALIZATIONS: [&[&str]; 6] = [
    &["game", "spread"],
    &["totals", "scoring"],
    &["passing", "receiving", "player_props"],
    &["rushing", "defense"],
    &["periods", "scoring"],
    &["special_teams", "discipline", "coaching"],
];

#[derive(Parser)]
#[command(name = "council")]
#[command(about = "Weighted multi-source consensus over prediction bundles")]
struct Cli {
    /// Path to a YAML configuration file
    #[arg(short, long, env = "COUNCIL_CONFIG")]
    config: Option<PathBuf>,

    /// Path to a JSON category registry (defaults to the standard registry)
    #[arg(short, long, env = "COUNCIL_REGISTRY")]
    registry: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a bundle ("-" reads stdin)
    Validate { file: PathBuf },

    /// Repair a bundle so it validates ("-" reads stdin)
    Repair { file: PathBuf },

    /// Print the category registry
    Registry,

    /// Simulate a consensus round with seeded sources
    Simulate {
        /// Number of sources in the pool
        #[arg(long, default_value_t = 8)]
        sources: usize,

        /// Base RNG seed
        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// Resolved warm-up games used to build track records
        #[arg(long, default_value_t = 5)]
        history_games: usize,

        /// Question id
        #[arg(long, default_value = "game-1")]
        question: String,

        /// Home side
        #[arg(long, default_value = "home")]
        home: String,

        /// Away side
        #[arg(long, default_value = "away")]
        away: String,

        /// Market-implied home win probability
        #[arg(long, default_value_t = 0.55)]
        home_prob: f64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("council=info".parse()?)
                .add_directive("bundle=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            CouncilConfig::from_yaml(&content)?
        }
        None => CouncilConfig::default(),
    };
    config.bundle.validate().map_err(anyhow::Error::msg)?;
    let registry = match &cli.registry {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("reading registry {}", path.display()))?;
            serde_json::from_str(&content)?
        }
        None => CategoryRegistry::standard(),
    };

    let output = match cli.command {
        Command::Validate { file } => {
            let candidate = read_json(&file)?;
            let report = BundleValidator::with_config(&registry, config.bundle.clone()).validate(&candidate);
            serde_json::to_value(report)?
        }
        Command::Repair { file } => {
            let candidate = read_json(&file)?;
            let report = BundleValidator::with_config(&registry, config.bundle.clone()).validate(&candidate);
            let repaired = BundleRepairer::with_config(&registry, config.bundle.clone()).repair(&candidate, &report)?;
            json!({
                "violations": report.violations,
                "repair": repaired.report,
                "bundle": repaired.bundle,
            })
        }
        Command::Registry => serde_json::to_value(&registry)?,
        Command::Simulate {
            sources,
            seed,
            history_games,
            question,
            home,
            away,
            home_prob,
        } => {
            let question = Question::new(question, home, away).with_home_win_prob(home_prob);
            simulate(config, Arc::new(registry), sources, seed, history_games, question).await?
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn read_json(path: &Path) -> anyhow::Result<Value> {
    let content = if path == Path::new("-") {
        let mut buffer = String::new();
        std::io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?
    };
    Ok(serde_json::from_str(&content)?)
}

async fn simulate(
    config: CouncilConfig,
    registry: Arc<CategoryRegistry>,
    pool_size: usize,
    seed: u64,
    history_games: usize,
    question: Question,
) -> anyhow::Result<Value> {
    let profiles = RiskProfile::all();
    let mut pool: Vec<Source> = Vec::with_capacity(pool_size);
    let mut strategies: Vec<ParametricStrategy> = Vec::with_capacity(pool_size);
    for i in 0..pool_size {
        let risk = profiles[i % profiles.len()];
        pool.push(
            Source::new(format!("source-{:02}", i))
                .with_name(format!("{} #{}", risk.as_str(), i))
                .with_specializations(SPECIALIZATIONS[i % SPECIALIZATIONS.len()]),
        );
        strategies.push(ParametricStrategy::new(
            StrategyProfile::preset(risk).with_seed(seed.wrapping_add(i as u64)),
        ));
    }

    // Warm-up: score every source against seeded "actual" results
    let tracker = PerformanceTracker::with_config(config.performance.clone())?;
    let oracle_source = Source::new("oracle");
    let oracle = ParametricStrategy::new(StrategyProfile::preset(RiskProfile::Balanced).with_seed(!seed));
    for game in 0..history_games {
        let warmup = Question::new(format!("warmup-{}", game), question.home.clone(), question.away.clone())
            .with_home_win_prob(question.home_win_prob);
        let actual = oracle.produce(&warmup, &context(&registry, &oracle_source, &config));
        let results: HashMap<String, PredictionValue> = actual
            .predictions
            .into_iter()
            .map(|item| (item.category, item.value))
            .collect();

        for (source, strategy) in pool.iter().zip(&strategies) {
            let bundle = strategy.produce(&warmup, &context(&registry, source, &config));
            tracker.record_bundle(&bundle, &results);
        }
    }
    tracker.annotate(&mut pool);

    let selection = CouncilSelector::with_config(config.selection.clone())?.select(&pool, &registry.tag_universe());
    let members_only = config.round.members_only;
    let round = ConsensusRound::with_config(question.id.clone(), registry.clone(), pool.clone(), config.clone())?
        .with_council(selection.clone());

    for (source, strategy) in pool.iter().zip(&strategies) {
        if members_only && !selection.contains(&source.id) {
            continue;
        }
        let bundle = strategy.produce(&question, &context(&registry, source, &config));
        if let Err(e) = round.submit_bundle(&bundle).await {
            warn!(source_id = %source.id, error = %e, "Simulated submission refused");
        }
    }

    let outcome = round.finalize(&tracker).await;
    info!(
        round_id = %outcome.round_id,
        council = selection.members.len(),
        "Simulation complete"
    );

    Ok(json!({
        "sources": pool,
        "council": selection,
        "outcome": outcome,
    }))
}

fn context<'a>(
    registry: &'a CategoryRegistry,
    source: &'a Source,
    config: &'a CouncilConfig,
) -> ProductionContext<'a> {
    ProductionContext {
        registry,
        source,
        limits: &config.bundle,
    }
}
