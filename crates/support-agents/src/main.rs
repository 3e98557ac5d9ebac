//! `support-agents` command line.
//!
//! ```bash
//! # Resolve a ticket from flags, answering feedback prompts on stdin
//! support-agents resolve --subject "Login" --description "How do I reset my password?" --interactive
//!
//! # Resolve a ticket stored as JSON and keep the session transcript
//! support-agents --config support.toml resolve --ticket ticket.json --transcript session.json
//!
//! # Sanitize text
//! echo "mail me at jane@example.com" | support-agents redact
//!
//! # Probe the configured endpoints
//! support-agents check
//! ```

use std::io::{self, BufRead, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use support_agents::config::{check_endpoint, KnowledgeBackend};
use support_agents::knowledge::{check_collection, FileKnowledgeBase};
use support_agents::{AgentFactory, FeedbackOutcome, Orchestrator, SupportConfig, TurnOutcome};
use tracing::{info, warn};
use triage::{Decision, Feedback, SessionId, Ticket};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML configuration file. Environment variables override it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a ticket through the resolution pipeline
    Resolve(ResolveArgs),
    /// Print text with PII replaced by placeholders (reads stdin without TEXT)
    Redact { text: Option<String> },
    /// Check that the language endpoint and knowledge backend are reachable
    Check,
}

#[derive(clap::Args, Debug)]
struct ResolveArgs {
    /// Ticket as JSON (id, subject, category, description, client_id, timestamp)
    #[arg(long, conflicts_with_all = ["subject", "description"])]
    ticket: Option<PathBuf>,

    #[arg(long)]
    subject: Option<String>,

    #[arg(long, default_value = "General")]
    category: String,

    #[arg(long)]
    description: Option<String>,

    #[arg(long, default_value = "cli")]
    client_id: String,

    /// Ask for feedback on stdin after each answer
    #[arg(long, default_value_t = false)]
    interactive: bool,

    /// Write the final session as JSON
    #[arg(long)]
    transcript: Option<PathBuf>,
}

impl ResolveArgs {
    fn load_ticket(&self) -> Result<Ticket> {
        if let Some(path) = &self.ticket {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            return serde_json::from_str(&content).context("Failed to parse ticket JSON");
        }
        let Some(description) = &self.description else {
            bail!("either --ticket or --description is required");
        };
        let now = Utc::now();
        Ok(Ticket {
            id: format!("CLI-{}", now.timestamp()),
            subject: self.subject.clone().unwrap_or_default(),
            category: self.category.clone(),
            description: description.clone(),
            client_id: self.client_id.clone(),
            timestamp: now,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    match args.command {
        Command::Redact { text } => redact(text),
        Command::Check => {
            let config = SupportConfig::load(args.config.as_deref())?;
            check(&config).await
        }
        Command::Resolve(resolve_args) => {
            let config = SupportConfig::load(args.config.as_deref())?;
            resolve(&config, &resolve_args).await
        }
    }
}

fn redact(text: Option<String>) -> Result<()> {
    let text = match text {
        Some(text) => text,
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read stdin")?;
            buf
        }
    };
    print!("{}", triage::redact(&text));
    if !text.ends_with('\n') {
        println!();
    }
    Ok(())
}

async fn check(config: &SupportConfig) -> Result<()> {
    let mut healthy = true;

    if check_endpoint(&config.endpoint.url).await {
        info!(url = %config.endpoint.url, "Language endpoint reachable");
    } else {
        warn!(url = %config.endpoint.url, "Language endpoint unreachable");
        healthy = false;
    }

    match config.knowledge.backend {
        KnowledgeBackend::Qdrant => {
            if check_collection(&config.knowledge).await {
                info!(
                    url = %config.knowledge.qdrant_url,
                    collection = %config.knowledge.collection,
                    "Qdrant collection available"
                );
            } else {
                warn!(
                    url = %config.knowledge.qdrant_url,
                    collection = %config.knowledge.collection,
                    "Qdrant collection unavailable"
                );
                healthy = false;
            }
        }
        KnowledgeBackend::File => match config.knowledge.file.as_deref() {
            Some(path) => match FileKnowledgeBase::from_file(path) {
                Ok(kb) => info!(path = %path.display(), entries = kb.len(), "Knowledge file loaded"),
                Err(e) => {
                    warn!(path = %path.display(), "Knowledge file unusable: {e:#}");
                    healthy = false;
                }
            },
            None => {
                warn!("knowledge.file is not set");
                healthy = false;
            }
        },
    }

    if !healthy {
        bail!("one or more checks failed");
    }
    println!("All checks passed.");
    Ok(())
}

fn print_turn(outcome: &TurnOutcome) {
    println!(
        "--- turn {} · {} · state {} ---",
        outcome.turn, outcome.decision, outcome.state
    );
    println!("{}", outcome.response);
}

/// Feedback from stdin. `y`/`yes` means satisfied; anything else is the follow-up.
fn read_feedback() -> Result<Option<Feedback>> {
    print!("Did this solve your issue? [y/yes, or describe what is still wrong]: ");
    io::stdout().flush()?;
    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line)? == 0 {
        return Ok(None);
    }
    let answer = line.trim();
    Ok(Some(match answer.to_lowercase().as_str() {
        "y" | "yes" => Feedback::Satisfied,
        _ => Feedback::NotSatisfied {
            follow_up: answer.to_string(),
        },
    }))
}

async fn resolve(config: &SupportConfig, args: &ResolveArgs) -> Result<()> {
    let ticket = args.load_ticket()?;
    let capabilities = AgentFactory::new(config)?.build_capabilities()?;
    let orchestrator = Orchestrator::new(capabilities, config);

    let mut outcome = orchestrator.submit(ticket).await?;
    let session_id = outcome.session_id;
    print_turn(&outcome);

    while args.interactive && outcome.decision == Decision::Answer {
        let Some(feedback) = read_feedback()? else {
            break;
        };
        match orchestrator.feedback(session_id, feedback).await? {
            FeedbackOutcome::Resolved { .. } => {
                println!("Glad we could help.");
                break;
            }
            FeedbackOutcome::Turn(next) => {
                print_turn(&next);
                outcome = next;
            }
        }
    }

    if let Some(path) = &args.transcript {
        write_transcript(&orchestrator, session_id, path).await?;
    }
    Ok(())
}

async fn write_transcript(orchestrator: &Orchestrator, id: SessionId, path: &Path) -> Result<()> {
    let session = orchestrator.session(id).await?;
    let json = serde_json::to_string_pretty(&session)?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    info!(path = %path.display(), summary = %session.summary(), "Wrote session transcript");
    Ok(())
}
