//! Précis CLI - progressive article summaries
//!
//! The application logic is contained in lib.rs, and this file is responsible
//! for parsing arguments and handling top-level errors.

use anyhow::{bail, Context};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::{ColoredString, Colorize};
use precis::agent::AnthropicClient;
use precis::protocol::{AnalysisOutcome, Failure};
use precis::scraper::{self, WebPage};
use precis::summary::ScoreBand;
use precis::ui::{self, state::mask_key, Header};
use precis::{logging, Config, DetailLevel, KeyStore, Orchestrator, SessionCache, SummaryResult};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "precis")]
#[command(author, version, about = "Progressive article summaries in your terminal", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the interactive summary view for a page
    Open {
        /// URL or path of the article
        url: String,
    },
    /// Summarise a page and print the result
    Analyze {
        /// URL or path of the article
        url: String,
        /// Only print this level (1 = brief ... 4 = detailed)
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=4))]
        level: Option<u8>,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
        /// Ignore any cached result and summarise again
        #[arg(long)]
        fresh: bool,
    },
    /// Print the text that would be sent for summarisation
    Extract {
        /// URL or path of the article
        url: String,
    },
    /// Store the API key (prompts when omitted)
    SetKey {
        key: Option<String>,
    },
    /// Show the stored API key, masked
    GetKey,
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

type PageOrchestrator = Orchestrator<WebPage, AnthropicClient>;

fn build_orchestrator(url: &str, config: &Config) -> anyhow::Result<PageOrchestrator> {
    let keys = KeyStore::open(config.key_store_path())
        .with_context(|| format!("opening key store in {}", config.storage.path.display()))?;
    let orchestrator = Orchestrator::new(
        WebPage::new(url)?,
        AnthropicClient::new(&config.agent),
        keys,
        SessionCache::new()?,
    )
    .with_fallback_key(config.api.anthropic_key.clone());
    Ok(orchestrator)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        Some(Commands::Open { url }) => {
            if let Err(e) = logging::init_file(&config.log_dir()) {
                eprintln!("Warning: file logging disabled: {}", e);
            }
            let orchestrator = Arc::new(build_orchestrator(&url, &config)?);
            let header = Header {
                title: None,
                url: url.clone(),
            };
            ui::run(orchestrator, header).await?;
        }
        Some(Commands::Analyze {
            url,
            level,
            json,
            fresh,
        }) => {
            logging::init_stderr();
            let orchestrator = build_orchestrator(&url, &config)?;

            if !json {
                println!("Analyzing: {}\n", url);
            }
            let outcome = if fresh {
                orchestrator.reanalyze_page().await
            } else {
                orchestrator.analyze_page().await
            };
            let summary = match outcome {
                AnalysisOutcome::Success { data } => data,
                AnalysisOutcome::Failure {
                    error: Failure::ApiKeyMissing,
                } => bail!("no API key stored. Run `precis set-key` or set ANTHROPIC_API_KEY."),
                AnalysisOutcome::Failure {
                    error: Failure::Message(message),
                } => bail!(message),
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                let level = level.and_then(|n| DetailLevel::from_index(usize::from(n) - 1));
                print_summary(&summary, level);
            }
        }
        Some(Commands::Extract { url }) => {
            logging::init_stderr();
            let content = scraper::fetch_content(&url).await?;
            let title = content
                .title
                .clone()
                .unwrap_or_else(|| "No title".to_string());

            println!("\n=== {} ===\n", title);
            println!("{}", content.text);
            println!(
                "\n--- Extracted {} characters ---",
                content.text.chars().count()
            );
        }
        Some(Commands::SetKey { key }) => {
            let key = match key {
                Some(key) => key,
                None => dialoguer::Password::new()
                    .with_prompt("API key")
                    .interact()?,
            };
            let key = key.trim();
            if key.is_empty() {
                bail!("the API key must not be empty");
            }
            let store = KeyStore::open(config.key_store_path())?;
            store.set_api_key(key)?;
            println!("{} API key saved.", "✓".green());
        }
        Some(Commands::GetKey) => {
            let store = KeyStore::open(config.key_store_path())?;
            match store.api_key()? {
                Some(key) => println!("{}", mask_key(&key)),
                None => println!("No API key stored."),
            }
        }
        Some(Commands::Completions { shell }) => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "precis", &mut std::io::stdout());
        }
        None => {
            Cli::command().print_help()?;
        }
    }

    Ok(())
}

fn print_summary(summary: &SummaryResult, only: Option<DetailLevel>) {
    println!(
        "Fluff:   {}",
        score(summary.fluff_percentage, summary.fluff_band())
    );
    println!(
        "Novelty: {}\n",
        score(summary.novelty_score, summary.novelty_band())
    );

    let levels = match only {
        Some(level) => vec![level],
        None => DetailLevel::ALL.to_vec(),
    };
    for level in levels {
        println!("{}", format!("── {} ──", level.label()).bold());
        println!("{}\n", summary.text(level));
    }
}

fn score(value: u8, band: ScoreBand) -> ColoredString {
    let text = format!("{:>3}%", value);
    match band {
        ScoreBand::Green => text.green(),
        ScoreBand::Amber => text.yellow(),
        ScoreBand::Red => text.red(),
    }
}
