use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use libotrsrpc::{ClientConfig, ClientError, ParameterSet, TicketClient, Value};

/// otrsrpc - query and create OTRS tickets from the command line
#[derive(Parser)]
#[command(name = "otrsrpc", version, about)]
struct Cli {
    /// Config file (default: ~/.config/otrsrpc/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch every ticket visible to the configured user
    List {
        /// Extra search parameters as KEY=VALUE
        params: Vec<String>,
    },

    /// List ticket IDs
    Ids {
        /// Extra search parameters as KEY=VALUE
        params: Vec<String>,
    },

    /// Fetch one ticket
    Get {
        id: String,
        /// Extra parameters as KEY=VALUE
        params: Vec<String>,
    },

    /// Search tickets, printing matching IDs
    Search {
        /// Search parameters as KEY=VALUE (e.g. TicketNumber=%)
        params: Vec<String>,
    },

    /// Look up the ticket number of a ticket ID
    Number { id: String },

    /// Create a ticket with a first article
    Create {
        #[arg(long)]
        title: String,
        #[arg(long)]
        subject: String,
        #[arg(long)]
        body: String,
        /// Customer user the ticket belongs to
        #[arg(long)]
        customer: Option<String>,
    },

    /// Add an article to a ticket
    AddArticle {
        id: String,
        #[arg(long)]
        subject: String,
        #[arg(long)]
        body: String,
    },

    /// Update ticket fields given as KEY=VALUE
    Update { id: String, fields: Vec<String> },
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("otrsrpc=info,libotrsrpc=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match ClientConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            return ExitCode::FAILURE;
        }
    };
    debug!(base_url = %config.base_url, "Config loaded");

    let client = match TicketClient::new(&config) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Failed to create client: {e}");
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Command::List { params: raw } => match parse_params(&raw) {
            Ok(p) => print_result(client.ticket_list(&p)),
            Err(e) => usage_error(e),
        },
        Command::Ids { params: raw } => match parse_params(&raw) {
            Ok(p) => print_result(client.ticket_list_ids(&p)),
            Err(e) => usage_error(e),
        },
        Command::Get { id, params: raw } => match parse_params(&raw) {
            Ok(p) => print_result(client.ticket_get(&parse_id(&id), &p)),
            Err(e) => usage_error(e),
        },
        Command::Search { params: raw } => match parse_params(&raw) {
            Ok(p) => print_result(client.ticket_search(&p)),
            Err(e) => usage_error(e),
        },
        Command::Number { id } => print_result(client.ticket_number_lookup(&parse_id(&id))),
        Command::Create {
            title,
            subject,
            body,
            customer,
        } => {
            let mut ticket = ParameterSet::new();
            ticket.insert("Title".into(), title.into());
            if let Some(customer) = customer {
                ticket.insert("CustomerUser".into(), customer.into());
            }
            let article = article_params(subject, body);
            print_result(client.ticket_article_create(&ticket, &article))
        }
        Command::AddArticle { id, subject, body } => {
            let article = article_params(subject, body);
            print_result(client.ticket_article_add(&parse_id(&id), &article))
        }
        Command::Update { id, fields } => match parse_params(&fields) {
            Ok(p) => print_result(client.ticket_update(&parse_id(&id), &p)),
            Err(e) => usage_error(e),
        },
    }
}

fn article_params(subject: String, body: String) -> ParameterSet {
    let mut article = ParameterSet::new();
    article.insert("Subject".into(), subject.into());
    article.insert("Body".into(), body.into());
    article
}

/// Numeric IDs go out as integers, anything else as given
fn parse_id(raw: &str) -> Value {
    raw.parse::<i64>().map_or_else(|_| Value::from(raw), Value::Int)
}

/// Parse KEY=VALUE pairs; integer values are sent as integers
fn parse_params(raw: &[String]) -> Result<ParameterSet, String> {
    let mut params = ParameterSet::new();
    for pair in raw {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| format!("expected KEY=VALUE, got {pair:?}"))?;
        if key.is_empty() {
            return Err(format!("empty key in {pair:?}"));
        }
        let value = value
            .parse::<i64>()
            .map_or_else(|_| Value::from(value), Value::Int);
        params.insert(key.to_string(), value);
    }
    Ok(params)
}

fn usage_error(message: String) -> ExitCode {
    eprintln!("{message}");
    ExitCode::from(2)
}

fn print_result<T: Serialize>(result: Result<Option<T>, ClientError>) -> ExitCode {
    match result {
        Ok(Some(value)) => match serde_json::to_string_pretty(&value) {
            Ok(json) => {
                println!("{json}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Failed to encode result: {e}");
                ExitCode::FAILURE
            }
        },
        Ok(None) => {
            eprintln!("No result");
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
