//! CLI struct definitions and dispatch for the tandem command-line
//! interface.
//!
//! The CLI is a thin operator surface over the library contract; the HTTP
//! layer of the wider system is an external collaborator and not part of
//! this crate.

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::path::PathBuf;

use crate::core::error::TandemError;
use crate::core::model::{Node, Phase, Rating, ResourceId, SourceKind, Statement};
use crate::core::persistence::Query;
use crate::core::store::AssertionStore;
use crate::core::time;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum SourceArg {
    Artificial,
    Natural,
}

impl From<SourceArg> for SourceKind {
    fn from(arg: SourceArg) -> Self {
        match arg {
            SourceArg::Artificial => SourceKind::Artificial,
            SourceArg::Natural => SourceKind::Natural,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum RatingArg {
    Positive,
    Negative,
    Undecided,
}

impl From<RatingArg> for Rating {
    fn from(arg: RatingArg) -> Self {
        match arg {
            RatingArg::Positive => Rating::Positive,
            RatingArg::Negative => Rating::Negative,
            RatingArg::Undecided => Rating::Undecided,
        }
    }
}

#[derive(Parser, Debug)]
#[clap(
    name = "tandem",
    version = env!("CARGO_PKG_VERSION"),
    about = "Dual-opinion assertion store: automated agents and humans assert, reconcile, and propagate facts over a shared triple space."
)]
pub struct Cli {
    /// Store root directory.
    #[clap(long, global = true, default_value = ".tandem")]
    pub root: PathBuf,
    /// Store id; names the database and audit log files.
    #[clap(long, global = true, default_value = "graph")]
    pub store: String,
    /// Output format for this invocation.
    #[clap(long, global = true, value_enum, default_value = "text")]
    pub format: OutputFormat,
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create or open the store, bootstrapping the schema.
    Init,
    /// Assert one opinion about a triple and commit it.
    Assert {
        #[clap(long)]
        subject: String,
        #[clap(long)]
        predicate: String,
        /// Object resource id.
        #[clap(long, conflicts_with = "literal")]
        object: Option<String>,
        /// Object literal value.
        #[clap(long)]
        literal: Option<String>,
        #[clap(long, default_value = "concept_discovery")]
        phase: String,
        #[clap(long, value_enum)]
        source: SourceArg,
        #[clap(long)]
        agent: String,
        #[clap(long, value_enum)]
        rating: RatingArg,
        #[clap(long, default_value_t = 1.0)]
        confidence: f64,
        /// Bulk-import path; subject to the store's bulk notification
        /// policy.
        #[clap(long)]
        bulk: bool,
    },
    /// Query assertions; all filters optional.
    Query {
        #[clap(long)]
        subject: Option<String>,
        #[clap(long)]
        predicate: Option<String>,
        #[clap(long, conflicts_with = "literal")]
        object: Option<String>,
        #[clap(long)]
        literal: Option<String>,
        #[clap(long)]
        phase: Option<String>,
        #[clap(long, value_enum)]
        source: Option<SourceArg>,
        #[clap(long)]
        agent: Option<String>,
        #[clap(long, value_enum)]
        rating: Option<RatingArg>,
        #[clap(long)]
        min_confidence: Option<f64>,
    },
    /// Remove every assertion mentioning a resource.
    Forget {
        #[clap(long)]
        resource: String,
    },
    /// Show store status: pending writes, queued notifications, state.
    Status,
}

fn object_node(object: Option<String>, literal: Option<String>) -> Result<Node, TandemError> {
    match (object, literal) {
        (Some(id), None) => Ok(Node::resource(id)),
        (None, Some(value)) => Ok(Node::literal(value)),
        _ => Err(TandemError::ValidationError(
            "exactly one of --object or --literal is required".to_string(),
        )),
    }
}

pub fn run(cli: Cli) -> Result<(), TandemError> {
    let store = AssertionStore::open(&cli.root, &cli.store)?;
    match cli.command {
        Command::Init => {
            match cli.format {
                OutputFormat::Text => println!(
                    "{} store '{}' ready at {}",
                    "ok:".green().bold(),
                    cli.store,
                    cli.root.display()
                ),
                OutputFormat::Json => println!(
                    "{}",
                    time::command_envelope(
                        "init",
                        "ok",
                        serde_json::json!({ "store": cli.store, "root": cli.root })
                    )
                ),
            }
            Ok(())
        }
        Command::Assert {
            subject,
            predicate,
            object,
            literal,
            phase,
            source,
            agent,
            rating,
            confidence,
            bulk,
        } => {
            let statement = Statement::new(
                subject.as_str(),
                predicate.as_str(),
                object_node(object, literal)?,
            );
            let phase = Phase::from_name(&phase);
            let is_new = if bulk {
                store.assert_bulk(
                    statement,
                    phase,
                    source.into(),
                    &agent,
                    rating.into(),
                    confidence,
                    None,
                )?
            } else {
                store.assert(
                    statement,
                    phase,
                    source.into(),
                    &agent,
                    rating.into(),
                    confidence,
                    None,
                )?
            };
            store.commit()?;
            store.notify_listeners_recursively()?;
            match cli.format {
                OutputFormat::Text => {
                    let marker = if is_new {
                        "new fact".green().bold()
                    } else {
                        "refreshed".yellow()
                    };
                    println!("{} asserted by {}", marker, agent);
                }
                OutputFormat::Json => println!(
                    "{}",
                    time::command_envelope(
                        "assert",
                        "ok",
                        serde_json::json!({ "is_new_fact": is_new })
                    )
                ),
            }
            Ok(())
        }
        Command::Query {
            subject,
            predicate,
            object,
            literal,
            phase,
            source,
            agent,
            rating,
            min_confidence,
        } => {
            let mut q = Query::new();
            q.subject = subject.map(ResourceId::new);
            q.predicate = predicate.map(ResourceId::new);
            q.object = match (object, literal) {
                (Some(id), None) => Some(Node::resource(id)),
                (None, Some(value)) => Some(Node::literal(value)),
                _ => None,
            };
            q.phase = phase.as_deref().map(Phase::from_name);
            q.source = source.map(SourceKind::from);
            q.agent = agent;
            q.rating = rating.map(Rating::from);
            q.min_confidence = min_confidence;

            let results = store.query(&q)?;
            match cli.format {
                OutputFormat::Text => {
                    for assertion in &results {
                        // At least one opinion is guaranteed by the read path.
                        if let Some(primary) = assertion.primary() {
                            println!(
                                "{}@{} {} ({:.2}) by {} [{}]",
                                assertion.statement,
                                assertion.phase,
                                primary.rating,
                                primary.confidence,
                                primary.agent.cyan(),
                                primary.source
                            );
                        }
                    }
                    println!("{} {} assertion(s)", "total:".bold(), results.len());
                }
                OutputFormat::Json => {
                    let payload = serde_json::json!({
                        "count": results.len(),
                        "assertions": results,
                    });
                    println!("{}", time::command_envelope("query", "ok", payload));
                }
            }
            Ok(())
        }
        Command::Forget { resource } => {
            let deleted = store.remove_all_about(&ResourceId::new(resource.clone()))?;
            match cli.format {
                OutputFormat::Text => println!(
                    "{} removed {} assertion(s) about {}",
                    "ok:".green().bold(),
                    deleted,
                    resource
                ),
                OutputFormat::Json => println!(
                    "{}",
                    time::command_envelope(
                        "forget",
                        "ok",
                        serde_json::json!({ "resource": resource, "deleted": deleted })
                    )
                ),
            }
            Ok(())
        }
        Command::Status => {
            let payload = serde_json::json!({
                "store": store.store_id(),
                "state": format!("{:?}", store.state()),
                "pending_writes": store.pending_write_count(),
                "pending_notifications": store.pending_notification_count(),
                "listeners": store.listener_count(),
                "last_propagation_depth": store.last_propagation_depth(),
            });
            match cli.format {
                OutputFormat::Text => {
                    println!("store:  {}", store.store_id());
                    println!("state:  {:?}", store.state());
                    println!("writes: {} pending", store.pending_write_count());
                    println!("notify: {} queued", store.pending_notification_count());
                }
                OutputFormat::Json => {
                    println!("{}", time::command_envelope("status", "ok", payload));
                }
            }
            Ok(())
        }
    }
}
