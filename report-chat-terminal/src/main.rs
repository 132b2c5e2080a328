mod commands;

use anyhow::Result;
use clap::Parser;
use report_chat::{
    Attachment, ClientConfig, ConversationSession, ExchangeOutcome, HttpReportService,
    config::{API_URL_ENV, DEFAULT_API_URL, DEFAULT_TITLE, TITLE_ENV},
    render_message,
};
use std::{path::Path, sync::Arc};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::commands::{Command, HELP};

/// Used when `RUST_LOG` is unset or invalid
const DEFAULT_LOG_FILTER: &str = "report_chat=info,report_chat_terminal=info";

#[derive(Parser, Debug)]
#[command(name = "report-chat", about = "Chat with an AI service about a medical report image")]
struct Args {
    /// Base URL of the analysis service
    #[arg(long, env = API_URL_ENV, default_value = DEFAULT_API_URL)]
    api_url: String,

    /// Conversation title
    #[arg(long, env = TITLE_ENV, default_value = DEFAULT_TITLE)]
    title: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so the transcript on stdout stays readable
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = ClientConfig::new(args.api_url, args.title);
    info!("Using analysis service at {}", config.api_url);

    let service = Arc::new(HttpReportService::new(&config));
    let mut session = ConversationSession::new(service, config.title.clone());

    connect(&mut session).await;
    println!("{}\n", HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match commands::parse(&line) {
            Command::Quit => break,
            command => handle(&mut session, command).await,
        }
    }

    Ok(())
}

async fn connect(session: &mut ConversationSession) {
    let created = session.initialize().await.map(str::to_string);
    report_connection(session, created);
}

fn report_connection(session: &ConversationSession, created: report_chat::Result<String>) {
    match created {
        Ok(id) => println!("Connected (conversation {})", id),
        Err(e) => {
            error!("Could not create a conversation: {}", e);
            println!("{} (use /reset to try again)", session.connection_status());
        }
    }
}

async fn handle(session: &mut ConversationSession, command: Command) {
    match command {
        Command::Send(text) => {
            println!("…");
            let outcome = session.send_message(&text).await;
            print_outcome(outcome);
        }
        Command::Analyze { path, prompt } => {
            let Some(attachment) = load(&path).await else {
                return;
            };
            println!("Analyzing {}…", attachment.file_name());
            let outcome = session.analyze_report(attachment, &prompt).await;
            print_outcome(outcome);
        }
        Command::Attach(path) => {
            if let Some(attachment) = load(&path).await {
                println!(
                    "Attached {}; it will be analyzed with your next message.",
                    attachment.file_name()
                );
                session.attach(attachment);
            }
        }
        Command::Detach => match session.clear_attachment() {
            Some(attachment) => println!("Removed {}", attachment.file_name()),
            None => println!("No attachment pending"),
        },
        Command::Reset => {
            println!("Starting a new conversation…");
            let created = session.reset().await.map(str::to_string);
            report_connection(session, created);
        }
        Command::History => {
            for message in session.messages() {
                println!("{}\n", render_message(message));
            }
        }
        Command::Help => println!("{}", HELP),
        Command::Invalid(reason) => println!("{}", reason),
        Command::Empty | Command::Quit => {}
    }
}

async fn load(path: &Path) -> Option<Attachment> {
    match Attachment::from_path(path).await {
        Ok(attachment) => Some(attachment),
        Err(e) => {
            println!("Cannot use {}: {}", path.display(), e);
            None
        }
    }
}

fn print_outcome(outcome: report_chat::Result<ExchangeOutcome>) {
    match outcome {
        Ok(outcome) => {
            if let Some(message) = outcome.message() {
                println!("{}\n", render_message(message));
            }
        }
        Err(e) => println!("{}", e),
    }
}
