use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;
mod util;

#[derive(Parser)]
#[command(
    name = "calmline",
    version,
    about = "Calmline CLI: safety-gated coping support for anxiety and panic (educational information only)"
)]
struct Cli {
    /// API base URL (for `health` and `remote-ask`)
    #[arg(long, env = "CALMLINE_API_URL", default_value = "http://localhost:3000")]
    api_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer one question with the in-process pipeline
    Ask {
        /// The question, passed verbatim
        question: String,
        /// Print the full result (reply, outcome, safety metadata) as JSON
        #[arg(long)]
        json: bool,
    },
    /// Interactive session on stdin; blank lines are skipped, `exit` or EOF ends it
    Chat,
    /// Show which policy phrase sets an utterance trips, without answering it
    Classify {
        /// Text to classify
        text: String,
        /// Policy document to classify against (built-in policy when unset)
        #[arg(long, env = "CALMLINE_POLICY_PATH")]
        policy: Option<PathBuf>,
    },
    /// Check a running API's health
    Health,
    /// Ask a running API
    RemoteAsk {
        question: String,
    },
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "calmline_core=warn".into()),
        )
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let cli = Cli::parse();

    let code = match cli.command {
        Commands::Ask { question, json } => commands::ask::run(&question, json).await,
        Commands::Chat => commands::chat::run().await,
        Commands::Classify { text, policy } => commands::classify::run(policy.as_deref(), &text),
        Commands::Health => commands::remote::health(&cli.api_url).await,
        Commands::RemoteAsk { question } => commands::remote::ask(&cli.api_url, &question).await,
    };

    std::process::exit(code);
}
