//! factgraph CLI: fact graph management over a local SQLite database.
//!
//! Usage:
//!   factgraph corpus <subcommand> [--db path]
//!   factgraph fact <subcommand> [--db path]
//!   factgraph search --project <id> <query>
//!   factgraph embed <pending|retry|stats>
//!   factgraph worker

use clap::{Parser, Subcommand};
use factgraph::{
    ActorId, AllowAll, CorpusId, EmbedOutcome, FactContext, FactGraphApi, FactId, FactState,
    FactUpdate, HealthMonitor, HealthState, NewFact, OpenStore, ProjectId, RagClient, RagConfig,
    ScoredFact, SqliteStore,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(
    name = "factgraph",
    version,
    about = "Fact graph engine with an eventually consistent semantic index"
)]
struct Cli {
    /// Path to SQLite database file
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// YAML file with RAG service settings (RAG_* environment variables override it)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Log level written to stderr (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage corpora
    Corpus {
        #[command(subcommand)]
        action: CorpusAction,
    },
    /// Manage facts
    Fact {
        #[command(subcommand)]
        action: FactAction,
    },
    /// Semantic search within a project
    Search {
        /// Project to search
        #[arg(long)]
        project: ProjectId,
        /// Query text
        query: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        /// Restrict to these corpora (repeatable)
        #[arg(long = "corpus")]
        corpora: Vec<CorpusId>,
    },
    /// Facts similar to an existing fact
    Similar {
        id: FactId,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        /// Only consider facts in the same corpus
        #[arg(long)]
        same_corpus: bool,
    },
    /// Embedding pipeline administration
    Embed {
        #[command(subcommand)]
        action: EmbedAction,
    },
    /// Probe the RAG service once
    Health,
    /// Run the health monitor and reconcile embeddings until interrupted
    Worker {
        /// Facts per reconciliation pass
        #[arg(long, default_value_t = 100)]
        batch: usize,
        /// Seconds between passes
        #[arg(long, default_value_t = 30)]
        every: u64,
    },
}

#[derive(Subcommand)]
enum CorpusAction {
    /// Create a corpus
    Create {
        #[arg(long)]
        project: ProjectId,
        name: String,
        /// Parent corpus this one derives from
        #[arg(long)]
        basis: Option<CorpusId>,
    },
    /// List corpora
    List {
        #[arg(long)]
        project: Option<ProjectId>,
    },
    /// Delete a corpus and all of its facts
    Delete { id: CorpusId },
    /// Change the parent corpus; omit --basis to clear it
    SetBasis {
        id: CorpusId,
        #[arg(long)]
        basis: Option<CorpusId>,
    },
}

#[derive(Subcommand)]
enum FactAction {
    /// Add a fact to a corpus
    Add {
        #[arg(long)]
        corpus: CorpusId,
        #[arg(long)]
        statement: Option<String>,
        #[arg(long, default_value = "knowledge")]
        context: FactContext,
        #[arg(long)]
        state: Option<FactState>,
        #[arg(long)]
        basis: Option<FactId>,
    },
    /// Show a fact with its basis and links
    Show { id: FactId },
    /// Update fields of a fact
    Update {
        id: FactId,
        #[arg(long, conflicts_with = "clear_statement")]
        statement: Option<String>,
        #[arg(long)]
        clear_statement: bool,
        #[arg(long)]
        context: Option<FactContext>,
        #[arg(long)]
        state: Option<FactState>,
        #[arg(long, conflicts_with = "clear_basis")]
        basis: Option<FactId>,
        #[arg(long)]
        clear_basis: bool,
    },
    /// Move a fact to another corpus
    Move {
        id: FactId,
        #[arg(long)]
        to: CorpusId,
    },
    /// Delete a fact
    Delete { id: FactId },
    /// Print the basis chain, root first
    Chain { id: FactId },
    /// Link two facts
    Link { a: FactId, b: FactId },
    /// Remove a link between two facts
    Unlink { a: FactId, b: FactId },
}

#[derive(Subcommand)]
enum EmbedAction {
    /// Embed pending facts now and wait for the results
    Pending {
        #[arg(long, default_value_t = 100)]
        limit: usize,
    },
    /// Retry failed facts now and wait for the results
    Retry {
        #[arg(long, default_value_t = 100)]
        limit: usize,
    },
    /// Show embedding counts
    Stats,
}

/// Get the default database path (~/.local/share/factgraph/factgraph.db)
fn default_db_path() -> PathBuf {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join(".local/share"));
    data_dir.join("factgraph").join("factgraph.db")
}

fn init_logging(level: &str) {
    let level = level.parse::<tracing::Level>().unwrap_or(tracing::Level::WARN);
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

/// The local CLI user owns every project it touches
fn cli_actor() -> ActorId {
    ActorId::from("cli")
}

fn open_api(db: Option<PathBuf>, config: &RagConfig) -> Result<FactGraphApi, String> {
    let db_path = db.unwrap_or_else(default_db_path);
    let store = SqliteStore::open(&db_path)
        .map_err(|e| format!("Failed to open database at {}: {}", db_path.display(), e))?;
    let client = RagClient::new(config.clone())
        .map_err(|e| format!("Failed to create RAG client: {}", e))?;
    Ok(FactGraphApi::new(
        Arc::new(store),
        client,
        Arc::new(AllowAll),
        tokio::runtime::Handle::current(),
    ))
}

fn fail(e: impl std::fmt::Display) -> i32 {
    eprintln!("Error: {}", e);
    1
}

fn print_json(value: &impl serde::Serialize) -> i32 {
    match serde_json::to_string_pretty(value) {
        Ok(json) => {
            println!("{}", json);
            0
        }
        Err(e) => fail(e),
    }
}

fn print_hits(hits: &[ScoredFact]) -> i32 {
    if hits.is_empty() {
        println!("No matches.");
        return 0;
    }
    println!("{:>7}  {:<36}  STATEMENT", "SCORE", "FACT");
    println!("{}", "-".repeat(80));
    for hit in hits {
        println!(
            "{:>7.2}  {:<36}  {}",
            hit.score,
            hit.record.fact.id,
            hit.record.fact.statement_text().unwrap_or("")
        );
    }
    0
}

fn print_outcomes(outcomes: &[EmbedOutcome]) -> i32 {
    let embedded = outcomes.iter().filter(|o| **o == EmbedOutcome::Embedded).count();
    let failed = outcomes
        .iter()
        .filter(|o| matches!(o, EmbedOutcome::Failed(_)))
        .count();
    println!(
        "Dispatched {}: {} embedded, {} failed, {} skipped",
        outcomes.len(),
        embedded,
        failed,
        outcomes.len() - embedded - failed
    );
    if failed > 0 {
        1
    } else {
        0
    }
}

fn cmd_corpus(api: &FactGraphApi, action: CorpusAction) -> i32 {
    let actor = cli_actor();
    match action {
        CorpusAction::Create {
            project,
            name,
            basis,
        } => match api.create_corpus(&actor, project, &name, basis) {
            Ok(corpus) => {
                println!("Created corpus '{}' ({})", corpus.name, corpus.id);
                0
            }
            Err(e) => fail(e),
        },
        CorpusAction::List { project } => {
            let corpora = match api.graph().list_corpora(project.as_ref()) {
                Ok(c) => c,
                Err(e) => return fail(e),
            };
            if corpora.is_empty() {
                println!("No corpora defined.");
                return 0;
            }
            println!("{:<36}  {:<24}  {:<36}", "ID", "NAME", "BASIS");
            println!("{}", "-".repeat(100));
            for corpus in corpora {
                println!(
                    "{:<36}  {:<24}  {:<36}",
                    corpus.id,
                    corpus.name,
                    corpus
                        .basis_corpus_id
                        .map(|id| id.to_string())
                        .unwrap_or_else(|| "-".to_string())
                );
            }
            0
        }
        CorpusAction::Delete { id } => match api.delete_corpus(&actor, &id) {
            Ok(removed) => {
                println!("Deleted corpus {} ({} facts)", id, removed.len());
                0
            }
            Err(e) => fail(e),
        },
        CorpusAction::SetBasis { id, basis } => match api.set_basis_corpus(&actor, &id, basis) {
            Ok(corpus) => {
                match corpus.basis_corpus_id {
                    Some(parent) => println!("Corpus {} now derives from {}", id, parent),
                    None => println!("Corpus {} no longer has a basis corpus", id),
                }
                0
            }
            Err(e) => fail(e),
        },
    }
}

fn cmd_fact(api: &FactGraphApi, action: FactAction) -> i32 {
    let actor = cli_actor();
    match action {
        FactAction::Add {
            corpus,
            statement,
            context,
            state,
            basis,
        } => {
            let mut input = NewFact::new(corpus).with_context(context);
            input.statement = statement;
            input.state = state;
            input.basis_id = basis;
            match api.create_fact(&actor, input) {
                Ok(fact) => {
                    println!("Created fact {} [{}]", fact.id, fact.state);
                    0
                }
                Err(e) => fail(e),
            }
        }
        FactAction::Show { id } => match api.get_fact(&actor, &id) {
            Ok(record) => print_json(&record),
            Err(e) => fail(e),
        },
        FactAction::Update {
            id,
            statement,
            clear_statement,
            context,
            state,
            basis,
            clear_basis,
        } => {
            let mut update = FactUpdate::new();
            if let Some(statement) = statement {
                update = update.with_statement(statement);
            }
            if clear_statement {
                update = update.clear_statement();
            }
            if let Some(context) = context {
                update = update.with_context(context);
            }
            if let Some(state) = state {
                update = update.with_state(state);
            }
            if let Some(basis) = basis {
                update = update.with_basis(basis);
            }
            if clear_basis {
                update = update.clear_basis();
            }
            match api.update_fact(&actor, &id, update) {
                Ok(fact) => {
                    println!("Updated fact {} [{}]", fact.id, fact.state);
                    0
                }
                Err(e) => fail(e),
            }
        }
        FactAction::Move { id, to } => {
            match api.update_fact(&actor, &id, FactUpdate::new().move_to(to)) {
                Ok(fact) => {
                    println!("Moved fact {} to corpus {}", fact.id, fact.corpus_id);
                    0
                }
                Err(e) => fail(e),
            }
        }
        FactAction::Delete { id } => match api.delete_fact(&actor, &id) {
            Ok(_) => {
                println!("Deleted fact {}", id);
                0
            }
            Err(e) => fail(e),
        },
        FactAction::Chain { id } => match api.basis_chain(&actor, &id) {
            Ok(chain) => {
                if chain.is_empty() {
                    println!("Fact {} has no basis.", id);
                }
                for (depth, summary) in chain.iter().enumerate() {
                    println!(
                        "{:>3}  {}  {}",
                        depth,
                        summary.id,
                        summary.statement.as_deref().unwrap_or("(no statement)")
                    );
                }
                0
            }
            Err(e) => fail(e),
        },
        FactAction::Link { a, b } => match api.link(&actor, &a, &b) {
            Ok(_) => {
                println!("Linked {} <-> {}", a, b);
                0
            }
            Err(e) => fail(e),
        },
        FactAction::Unlink { a, b } => match api.unlink(&actor, &a, &b) {
            Ok(true) => {
                println!("Unlinked {} <-> {}", a, b);
                0
            }
            Ok(false) => {
                eprintln!("Warning: {} and {} are not linked", a, b);
                1
            }
            Err(e) => fail(e),
        },
    }
}

async fn cmd_embed(api: &FactGraphApi, action: EmbedAction) -> i32 {
    let pipeline = api.pipeline();
    match action {
        EmbedAction::Pending { limit } => match pipeline.process_pending(limit) {
            Ok(dispatch) => print_outcomes(&dispatch.join().await),
            Err(e) => fail(e),
        },
        EmbedAction::Retry { limit } => match pipeline.retry_failed(limit) {
            Ok(dispatch) => print_outcomes(&dispatch.join().await),
            Err(e) => fail(e),
        },
        EmbedAction::Stats => match pipeline.stats() {
            Ok(stats) => {
                println!("total:      {}", stats.total);
                println!("embedded:   {}", stats.embedded);
                println!("pending:    {}", stats.pending);
                println!("failed:     {}", stats.failed);
                println!("completion: {:.2}%", stats.completion_rate());
                0
            }
            Err(e) => fail(e),
        },
    }
}

async fn cmd_health(api: &FactGraphApi) -> i32 {
    match api.pipeline().client().health().await {
        Ok(health) => {
            println!(
                "status: {} (provider: {}, chromadb: {})",
                health.status,
                health.provider.as_deref().unwrap_or("-"),
                health.chromadb.as_deref().unwrap_or("-")
            );
            if health.is_healthy() {
                0
            } else {
                1
            }
        }
        Err(e) => fail(format!("{} [{}]", e, e.kind())),
    }
}

async fn cmd_worker(api: &FactGraphApi, batch: usize, every: u64) -> i32 {
    let pipeline = api.pipeline();
    if !pipeline.client().is_enabled() {
        return fail("RAG service is disabled; nothing to reconcile");
    }

    let monitor = HealthMonitor::spawn(pipeline.client().clone());
    let mut ticker = tokio::time::interval(Duration::from_secs(every.max(1)));
    tracing::info!(batch, every, "worker started");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {
                let health = monitor.state();
                if health == HealthState::Unavailable {
                    tracing::debug!("RAG service unavailable, skipping pass");
                    continue;
                }
                match pipeline.process_pending(batch) {
                    Ok(dispatch) => {
                        dispatch.join().await;
                    }
                    Err(e) => tracing::warn!(error = %e, "failed to load pending facts"),
                }
                if health == HealthState::Healthy {
                    match pipeline.retry_failed(batch) {
                        Ok(dispatch) => {
                            dispatch.join().await;
                        }
                        Err(e) => tracing::warn!(error = %e, "failed to load failed facts"),
                    }
                }
            }
        }
    }

    monitor.shutdown().await;
    tracing::info!("worker stopped");
    0
}

async fn run(api: FactGraphApi, command: Commands) -> i32 {
    let actor = cli_actor();
    match command {
        Commands::Corpus { action } => cmd_corpus(&api, action),
        Commands::Fact { action } => cmd_fact(&api, action),
        Commands::Search {
            project,
            query,
            limit,
            corpora,
        } => {
            let filter = (!corpora.is_empty()).then_some(corpora);
            match api.search(&actor, &project, &query, limit, filter).await {
                Ok(hits) => print_hits(&hits),
                Err(e) => fail(e),
            }
        }
        Commands::Similar {
            id,
            limit,
            same_corpus,
        } => match api.find_similar(&actor, &id, limit, same_corpus).await {
            Ok(hits) => print_hits(&hits),
            Err(e) => fail(e),
        },
        Commands::Embed { action } => cmd_embed(&api, action).await,
        Commands::Health => cmd_health(&api).await,
        Commands::Worker { batch, every } => cmd_worker(&api, batch, every).await,
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let config = match RagConfig::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to create tokio runtime: {}", e);
            std::process::exit(1);
        }
    };

    let Cli { db, command, .. } = cli;
    let code = rt.block_on(async move {
        let api = match open_api(db, &config) {
            Ok(api) => api,
            Err(e) => {
                eprintln!("Error: {}", e);
                return 1;
            }
        };
        run(api, command).await
    });
    std::process::exit(code);
}
