//! Chainrecord CLI - entity relationship graph and risk scoring

use std::collections::HashSet;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use chainrecord_core::config::Config;
use chainrecord_core::domain::entity::{EntityDirectory, EntityProfile};
use chainrecord_core::domain::graph::{
    GraphPayload, GraphTraversal, NodeRef, Relationship, RelationshipStore, RelationshipType,
    TraversalDirection,
};
use chainrecord_core::domain::scoring::{
    Grade, RuleRegistry, ScoreRecord, ScoreRepository, ScoringService,
};
use chainrecord_core::infrastructure::entities::SqliteEntityDirectory;
use chainrecord_core::infrastructure::graph::SqliteRelationshipStore;
use chainrecord_core::infrastructure::scoring::SqliteScoreRepository;
use chainrecord_core::storage::{Database, DatabaseConfig};
use chainrecord_core::{Error, ErrorKind};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::debug;

#[derive(Parser)]
#[command(name = "chainrecord")]
#[command(
    author,
    version,
    about = "Entity relationship graph and fraud-risk scoring",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// SQLite database file (overrides database.path)
    #[arg(long, global = true)]
    database: Option<PathBuf>,
}

#[derive(Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage entities
    Entities {
        #[command(subcommand)]
        action: EntityAction,
    },

    /// Manage relationships
    Relationships {
        #[command(subcommand)]
        action: RelationshipAction,
    },

    /// Expand the relationship graph around a node (e.g. entity:1)
    Graph {
        /// Seed node as kind:id
        node: String,
        /// Maximum number of hops (0-5, default from config)
        #[arg(short, long)]
        depth: Option<u32>,
        /// Only follow these relationship types (comma separated)
        #[arg(short, long, value_delimiter = ',')]
        types: Vec<String>,
    },

    /// Score an entity and record the result
    Score {
        entity_id: i64,
        /// Evaluate without recording
        #[arg(long)]
        dry_run: bool,
    },

    /// Score several entities
    ScoreBatch {
        entity_ids: Vec<i64>,
        /// Score every entity in the database
        #[arg(long, conflicts_with = "entity_ids")]
        all: bool,
    },

    /// Show the most recent score of an entity
    Latest { entity_id: i64 },

    /// Show score history, most recent first
    History {
        entity_id: i64,
        #[arg(short, long, default_value_t = 10)]
        limit: u32,
    },

    /// List entities whose latest grade is at or above a threshold
    HighRisk {
        #[arg(short = 'g', long, default_value = "D")]
        min_grade: String,
        #[arg(short, long, default_value_t = 20)]
        limit: u32,
    },

    /// Show scoring statistics
    Stats,

    /// List scoring rules
    Rules {
        #[arg(short, long)]
        category: Option<String>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Run health check
    Doctor,
}

#[derive(Subcommand)]
enum EntityAction {
    /// Add an entity
    Add {
        legal_name: String,
        #[arg(short = 't', long = "type")]
        entity_type: Option<String>,
        #[arg(short, long)]
        status: Option<String>,
        /// Formation date (YYYY-MM-DD)
        #[arg(short, long)]
        formed: Option<String>,
    },
    /// Show entity details
    Show { id: i64 },
}

#[derive(Subcommand)]
enum RelationshipAction {
    /// Record a relationship between two nodes
    Add {
        /// Source node as kind:id
        from: String,
        /// Target node as kind:id
        to: String,
        /// Relationship type (owns, agent_for, located_at, ...)
        rel_type: String,
        #[arg(short, long, default_value = "manual")]
        source: String,
        #[arg(short, long, default_value_t = 1.0)]
        confidence: f64,
        /// Start date (YYYY-MM-DD)
        #[arg(long)]
        start: Option<String>,
        /// End date (YYYY-MM-DD)
        #[arg(long)]
        end: Option<String>,
    },
    /// Close a relationship
    End {
        id: i64,
        /// End date (YYYY-MM-DD, default today)
        #[arg(long)]
        date: Option<String>,
    },
    /// List active relationships of a node
    List { node: String },
    /// Show relationship statistics
    Stats,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a configuration value
    Get { key: String },
    /// Set a configuration value
    Set { key: String, value: String },
    /// List all configuration values
    List,
    /// Reset configuration to defaults
    Reset,
    /// Show config file path
    Path,
}

type SqliteScoringService =
    ScoringService<SqliteRelationshipStore, SqliteEntityDirectory, SqliteScoreRepository>;

/// Everything a command needs, opened once per invocation
struct App {
    config: Config,
    store: Arc<SqliteRelationshipStore>,
    entities: Arc<SqliteEntityDirectory>,
    scores: Arc<SqliteScoreRepository>,
    format: OutputFormat,
    quiet: bool,
}

impl App {
    async fn open(
        config: Config,
        database: Option<PathBuf>,
        format: OutputFormat,
        quiet: bool,
    ) -> anyhow::Result<Self> {
        let path = database.unwrap_or_else(|| config.database_path());
        let db = Database::new(DatabaseConfig::with_path(path)).await?;
        let pool = db.pool().clone();

        Ok(Self {
            config,
            store: Arc::new(SqliteRelationshipStore::new(pool.clone())),
            entities: Arc::new(SqliteEntityDirectory::new(pool.clone())),
            scores: Arc::new(SqliteScoreRepository::new(pool)),
            format,
            quiet,
        })
    }

    fn scoring(&self) -> anyhow::Result<SqliteScoringService> {
        let registry = self.config.scoring.build_registry()?;
        Ok(ScoringService::new(
            Arc::new(registry),
            Arc::clone(&self.store),
            Arc::clone(&self.entities),
            Arc::clone(&self.scores),
        ))
    }

    fn json(&self) -> bool {
        self.format == OutputFormat::Json
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::from_default_env();
    let filter = match "chainrecord=info".parse() {
        Ok(directive) => filter.add_directive(directive),
        Err(_) => filter,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => report(&err),
    }
}

/// Print an error and map it to an exit code: 2 for caller mistakes, 1 otherwise
fn report(err: &anyhow::Error) -> ExitCode {
    eprintln!("Error: {:#}", err);

    match err.downcast_ref::<Error>() {
        Some(core) => {
            if let Some(suggestion) = core.suggestion() {
                eprintln!("  [{}] Try: {}", core.code(), suggestion);
            }
            match core.kind() {
                ErrorKind::Client => ExitCode::from(2),
                ErrorKind::Server => ExitCode::FAILURE,
            }
        }
        None => ExitCode::FAILURE,
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let command = match cli.command {
        Commands::Config { action } => return cmd_config(action, cli.quiet),
        Commands::Doctor => return cmd_doctor(cli.database, cli.quiet).await,
        command => command,
    };

    let app = App::open(Config::load()?, cli.database, cli.format, cli.quiet).await?;

    match command {
        Commands::Entities { action } => cmd_entities(&app, action).await,
        Commands::Relationships { action } => cmd_relationships(&app, action).await,
        Commands::Graph { node, depth, types } => cmd_graph(&app, &node, depth, &types).await,
        Commands::Score { entity_id, dry_run } => cmd_score(&app, entity_id, dry_run).await,
        Commands::ScoreBatch { entity_ids, all } => cmd_score_batch(&app, entity_ids, all).await,
        Commands::Latest { entity_id } => cmd_latest(&app, entity_id).await,
        Commands::History { entity_id, limit } => cmd_history(&app, entity_id, limit).await,
        Commands::HighRisk { min_grade, limit } => cmd_high_risk(&app, &min_grade, limit).await,
        Commands::Stats => cmd_stats(&app).await,
        Commands::Rules { category } => cmd_rules(&app, category.as_deref()),
        Commands::Config { .. } | Commands::Doctor => {
            unreachable!("handled before opening the database")
        }
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

async fn cmd_entities(app: &App, action: EntityAction) -> anyhow::Result<()> {
    match action {
        EntityAction::Add {
            legal_name,
            entity_type,
            status,
            formed,
        } => {
            let mut profile = EntityProfile::new(0, legal_name);
            profile.entity_type = entity_type;
            profile.status = status;
            profile.formation_date = formed.as_deref().map(parse_date).transpose()?;

            let id = app.entities.save(&profile).await?;
            if app.json() {
                print_json(&EntityProfile { id, ..profile })?;
            } else if app.quiet {
                println!("{}", id);
            } else {
                println!("Entity created: {} (entity:{})", profile.legal_name, id);
            }
        }
        EntityAction::Show { id } => {
            let profile = app.entities.get_entity(id).await?.ok_or(Error::EntityNotFound(id))?;
            if app.json() {
                print_json(&profile)?;
            } else {
                println!("Entity: {}", profile.legal_name);
                println!("  ID: {}", profile.id);
                println!("  Type: {}", profile.entity_type.as_deref().unwrap_or("-"));
                println!("  Status: {}", profile.status.as_deref().unwrap_or("-"));
                match profile.formation_date {
                    Some(date) => println!("  Formed: {}", date),
                    None => println!("  Formed: unknown"),
                }
            }
        }
    }
    Ok(())
}

async fn cmd_relationships(app: &App, action: RelationshipAction) -> anyhow::Result<()> {
    match action {
        RelationshipAction::Add {
            from,
            to,
            rel_type,
            source,
            confidence,
            start,
            end,
        } => {
            let mut rel = Relationship::new(
                NodeRef::parse(&from)?,
                NodeRef::parse(&to)?,
                parse_rel_type(&rel_type)?,
                source,
            );
            rel.confidence = confidence;
            rel.start_date = start.as_deref().map(parse_date).transpose()?;
            rel.end_date = end.as_deref().map(parse_date).transpose()?;

            let saved = app.store.create_relationship(&rel).await?;
            if app.json() {
                print_json(&saved)?;
            } else if app.quiet {
                println!("{}", saved.id);
            } else {
                println!(
                    "Relationship {}: {} -{}-> {}",
                    saved.id, saved.from, saved.rel_type, saved.to
                );
            }
        }
        RelationshipAction::End { id, date } => {
            let date = match date {
                Some(d) => parse_date(&d)?,
                None => Utc::now().date_naive(),
            };
            let ended = app.store.end_relationship(id, date).await?;
            if !ended {
                anyhow::bail!("Relationship {} not found or already ended", id);
            }
            if !app.quiet {
                println!("Relationship {} ended on {}", id, date);
            }
        }
        RelationshipAction::List { node } => {
            let node = NodeRef::parse(&node)?;
            let edges = app
                .store
                .incident_edges(&node, TraversalDirection::Both, None, Utc::now().date_naive())
                .await?;
            if app.json() {
                print_json(&edges)?;
            } else if edges.is_empty() {
                if !app.quiet {
                    println!("No active relationships for {}.", node);
                }
            } else {
                for rel in edges {
                    println!(
                        "  {:>6}  {} -{}-> {}  ({:.2}, {})",
                        rel.id, rel.from, rel.rel_type, rel.to, rel.confidence, rel.source_system
                    );
                }
            }
        }
        RelationshipAction::Stats => {
            let stats = app.store.statistics().await?;
            if app.json() {
                print_json(&stats)?;
            } else {
                println!("Relationships: {} ({} active)", stats.total, stats.active);
                println!("By type:");
                for (rel_type, count) in &stats.by_type {
                    println!("  {:<12} {}", rel_type, count);
                }
                println!("By source:");
                for (source, count) in &stats.by_source {
                    println!("  {:<12} {}", source, count);
                }
            }
        }
    }
    Ok(())
}

async fn cmd_graph(
    app: &App,
    node: &str,
    depth: Option<u32>,
    types: &[String],
) -> anyhow::Result<()> {
    let seed = NodeRef::parse(node)?;
    let depth = depth.unwrap_or(app.config.graph.default_depth);
    let allowed = if types.is_empty() {
        None
    } else {
        Some(
            types
                .iter()
                .map(|t| parse_rel_type(t))
                .collect::<Result<HashSet<_>, _>>()?,
        )
    };

    let subgraph = GraphTraversal::new(Arc::clone(&app.store))
        .expand(seed, depth, allowed.as_ref())
        .await?;
    let payload = subgraph.to_payload();

    if app.json() {
        print_json(&payload)?;
    } else {
        print_graph(&payload);
    }
    Ok(())
}

fn print_graph(payload: &GraphPayload) {
    println!("Graph from {} (depth {})", payload.seed, payload.max_depth);
    println!("  Nodes ({}):", payload.total_nodes);
    let mut nodes: Vec<_> = payload.nodes.iter().collect();
    nodes.sort_by(|(ka, a), (kb, b)| a.depth.cmp(&b.depth).then_with(|| ka.cmp(kb)));
    for (key, node) in nodes {
        println!("    [{}] {}", node.depth, key);
    }
    println!("  Edges ({}):", payload.total_edges);
    for edge in &payload.edges {
        println!(
            "    {} -{}-> {} ({:.2}, {})",
            edge.from, edge.relationship, edge.to, edge.confidence, edge.source
        );
    }
}

async fn cmd_score(app: &App, entity_id: i64, dry_run: bool) -> anyhow::Result<()> {
    let service = app.scoring()?;

    if dry_run {
        let preview = service.preview(entity_id, Utc::now().date_naive()).await?;
        if app.json() {
            print_json(&preview)?;
        } else {
            println!("Entity {} (dry run)", entity_id);
            println!(
                "  Score: {} (raw {})",
                preview.evaluation.score, preview.evaluation.raw_score
            );
            println!("  Grade: {}", preview.evaluation.grade);
            for detail in &preview.evaluation.rule_details {
                println!("  {:+4}  {}  {}", detail.weight, detail.name, detail.description);
            }
        }
        return Ok(());
    }

    let record = service.score_entity(entity_id).await?;
    print_record(app, &record)
}

async fn cmd_score_batch(app: &App, entity_ids: Vec<i64>, all: bool) -> anyhow::Result<()> {
    let ids = if all { app.entities.list_ids().await? } else { entity_ids };
    if ids.is_empty() {
        anyhow::bail!("No entities to score. Pass entity ids or --all.");
    }

    let summary = app.scoring()?.score_entities(&ids).await?;
    if app.json() {
        print_json(&summary)?;
        return Ok(());
    }

    if !app.quiet {
        println!("Scored {} of {} entities", summary.scored, summary.requested);
        for record in &summary.records {
            println!("  entity:{:<8} {:>4}  {}", record.entity_id, record.score, record.grade);
        }
        for failure in &summary.failures {
            println!("  entity:{:<8} [{}] {}", failure.entity_id, failure.code, failure.message);
        }
    }
    Ok(())
}

async fn cmd_latest(app: &App, entity_id: i64) -> anyhow::Result<()> {
    match app.scores.latest(entity_id).await? {
        Some(record) => print_record(app, &record),
        None => {
            if app.json() {
                println!("null");
            } else if !app.quiet {
                println!("Entity {} has not been scored.", entity_id);
            }
            Ok(())
        }
    }
}

async fn cmd_history(app: &App, entity_id: i64, limit: u32) -> anyhow::Result<()> {
    let records = app.scoring()?.history(entity_id, limit).await?;
    if app.json() {
        return print_json(&records);
    }

    if records.is_empty() {
        if !app.quiet {
            println!("Entity {} has not been scored.", entity_id);
        }
        return Ok(());
    }
    for record in records {
        println!(
            "  {}  {:>4}  {}  {}",
            record.calculated_at.format("%Y-%m-%d %H:%M:%S"),
            record.score,
            record.grade,
            record.flags.join(", ")
        );
    }
    Ok(())
}

async fn cmd_high_risk(app: &App, min_grade: &str, limit: u32) -> anyhow::Result<()> {
    let grade = Grade::parse(min_grade).ok_or_else(|| {
        Error::InvalidArgument(format!(
            "Unknown grade '{}', expected A, B, C, D or F",
            min_grade
        ))
    })?;
    let records = app.scores.high_risk(grade, limit).await?;

    if app.json() {
        return print_json(&records);
    }
    if records.is_empty() {
        if !app.quiet {
            println!("No entities graded {} or worse.", grade);
        }
        return Ok(());
    }
    for record in records {
        println!(
            "  entity:{:<8} {:>4}  {}  {}",
            record.entity_id,
            record.score,
            record.grade,
            record.flags.join(", ")
        );
    }
    Ok(())
}

async fn cmd_stats(app: &App) -> anyhow::Result<()> {
    let stats = app.scores.statistics().await?;
    if app.json() {
        return print_json(&stats);
    }

    println!("Entities scored: {}", stats.entities_scored);
    println!("Score records:   {}", stats.total_records);
    match stats.average_score {
        Some(avg) => println!("Average score:   {:.1}", avg),
        None => println!("Average score:   -"),
    }
    println!("Grades:");
    for grade in Grade::all() {
        let count = stats.grade_distribution.get(grade).copied().unwrap_or(0);
        println!("  {}  {}", grade, count);
    }
    Ok(())
}

fn cmd_rules(app: &App, category: Option<&str>) -> anyhow::Result<()> {
    let registry: RuleRegistry = app.config.scoring.build_registry()?;
    let rules = registry.rules(category);

    if app.json() {
        let descriptors: Vec<_> = rules.iter().map(|r| r.descriptor()).collect();
        return print_json(&descriptors);
    }

    println!("Rule set: {} ({} rules)", app.config.scoring.rule_set, registry.len());
    for rule in rules {
        println!(
            "  {:+4}  {:<34} {:<13} {}",
            rule.weight(),
            rule.name(),
            rule.category(),
            rule.description()
        );
    }
    Ok(())
}

fn print_record(app: &App, record: &ScoreRecord) -> anyhow::Result<()> {
    if app.json() {
        return print_json(record);
    }
    if app.quiet {
        println!("{} {}", record.score, record.grade);
        return Ok(());
    }

    println!("Entity {}", record.entity_id);
    println!("  Score: {}", record.score);
    if record.raw_score != record.score {
        println!("  Raw score: {}", record.raw_score);
    }
    println!("  Grade: {}", record.grade);
    println!("  Calculated: {}", record.calculated_at.format("%Y-%m-%d %H:%M:%S"));
    if record.rule_details.is_empty() {
        println!("  No rules triggered.");
    }
    for detail in &record.rule_details {
        println!("  {:+4}  {}  {}", detail.weight, detail.name, detail.description);
    }
    Ok(())
}

fn cmd_config(action: ConfigAction, quiet: bool) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            let value = config.get(&key)?;
            println!("{}", value);
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            config.save()?;
            if !quiet {
                println!("Set {} = {}", key, value);
            }
        }
        ConfigAction::List => {
            let config = Config::load()?;
            let items = config.list()?;
            for (key, value) in items {
                println!("{} = {}", key, value);
            }
        }
        ConfigAction::Reset => {
            Config::reset()?;
            if !quiet {
                println!("Configuration reset to defaults.");
            }
        }
        ConfigAction::Path => {
            let path = Config::config_path()?;
            println!("{}", path.display());
        }
    }
    Ok(())
}

async fn cmd_doctor(database: Option<PathBuf>, quiet: bool) -> anyhow::Result<()> {
    if !quiet {
        println!("Chainrecord Health Check");
        println!("========================");
        println!();
    }

    let mut all_ok = true;

    let config = match Config::load() {
        Ok(config) => {
            if !quiet {
                println!("[OK] Configuration: Valid");
            }
            config
        }
        Err(e) => {
            all_ok = false;
            if !quiet {
                println!("[!!] Configuration: Error - {:#}", e);
                println!("     Continuing with default settings");
            }
            Config::default()
        }
    };

    if !quiet {
        match Config::config_path() {
            Ok(path) if path.exists() => println!("[OK] Config file: {}", path.display()),
            Ok(path) => println!("[--] Config file: {} (using defaults)", path.display()),
            Err(e) => println!("[!!] Config file: Error - {}", e),
        }
    }

    match config.scoring.build_registry() {
        Ok(registry) => {
            if !quiet {
                println!(
                    "[OK] Rules: {} ({} rules, {})",
                    config.scoring.rule_set,
                    registry.len(),
                    match registry.bounds() {
                        Some(b) => format!("clamped to [{}, {}]", b.floor, b.ceiling),
                        None => "unclamped".to_string(),
                    }
                );
            }
        }
        Err(e) => {
            all_ok = false;
            if !quiet {
                println!("[!!] Rules: Error - {}", e);
            }
        }
    }

    let path = database.unwrap_or_else(|| config.database_path());
    match Database::new(DatabaseConfig::with_path(&path)).await {
        Ok(db) => match db.health_check().await {
            Ok(()) => {
                if !quiet {
                    println!("[OK] Database: Connected");
                    println!("     Path: {}", db.path().display());
                    match db.migration_status().await {
                        Ok(status) if status.needs_migration => println!(
                            "[!!] Database: Migrations pending (v{} -> v{})",
                            status.current_version, status.target_version
                        ),
                        Ok(status) => println!("[OK] Database: Schema v{}", status.current_version),
                        Err(e) => println!("[!!] Database: Migration check failed - {}", e),
                    }
                }
            }
            Err(e) => {
                all_ok = false;
                if !quiet {
                    println!("[!!] Database: Health check failed - {}", e);
                }
            }
        },
        Err(e) => {
            all_ok = false;
            if !quiet {
                println!("[!!] Database: Failed to initialize - {}", e);
            }
        }
    }

    if !quiet {
        println!();
        if all_ok {
            println!("All checks passed!");
        } else {
            println!("Some checks failed. See above for details.");
        }
    }

    debug!(all_ok, "Health check finished");
    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

fn parse_date(value: &str) -> anyhow::Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| {
            Error::InvalidArgument(format!("Invalid date '{}', expected YYYY-MM-DD", value))
        })
        .context("Failed to parse date")
}

fn parse_rel_type(value: &str) -> Result<RelationshipType, Error> {
    RelationshipType::parse(value).ok_or_else(|| {
        let known: Vec<_> = RelationshipType::all().iter().map(|t| t.as_str()).collect();
        Error::InvalidArgument(format!(
            "Unknown relationship type '{}'. Valid types: {}",
            value,
            known.join(", ")
        ))
    })
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
