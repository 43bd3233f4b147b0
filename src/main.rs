use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
mod input;
use diarist::{Accounts, EntryBatch, FileStore, Journal, Session, default_store_path, search};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn resolve_store(path: Option<PathBuf>) -> Result<PathBuf> {
    match path {
        Some(p) => Ok(p),
        None => default_store_path().context("could not determine platform directories"),
    }
}

#[derive(Debug, Parser)]
#[command(name = "diarist")]
#[command(
    version,
    about = "Personal journal that encrypts every entry before it is stored."
)]
struct Cli {
    /// Path to the journal store file
    #[arg(long, global = true, value_name = "PATH", env = "DIARIST_STORE")]
    store: Option<PathBuf>,

    /// Account the command acts on
    #[arg(long, global = true, value_name = "ID", env = "DIARIST_USER")]
    user: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Creates an account and its encryption key
    #[command(arg_required_else_help = true)]
    Signup { email: String },

    /// Writes the entry for a day, replacing that day's entry if present
    Write {
        /// Day of the entry, YYYY-MM-DD (default: today)
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Entry text (default: read from stdin)
        content: Option<String>,
    },

    /// Lists all entries, newest first
    List,

    /// Prints the entry for one day
    #[command(arg_required_else_help = true)]
    Show { date: NaiveDate },

    /// Finds entries by text or by date, e.g. "monday" or "january 15"
    #[command(arg_required_else_help = true)]
    Search { query: String },

    /// Deletes an entry by id
    #[command(arg_required_else_help = true)]
    Delete { id: String },

    /// Manages the saved conversation with the assistant
    #[command(subcommand)]
    Chat(ChatCommand),
}

#[derive(Debug, Subcommand)]
enum ChatCommand {
    /// Prints the saved conversation
    Show,
    /// Erases the saved conversation
    Clear,
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();
}

/// Prints unreadable records to stderr and fails if there were any.
fn check_failures(batch: &EntryBatch) -> Result<()> {
    for failure in &batch.failures {
        eprintln!("could not read entry {}: {}", failure.id, failure.error);
    }
    match batch.failures.len() {
        0 => Ok(()),
        1 => bail!("1 entry could not be read"),
        n => bail!("{n} entries could not be read"),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let args = Cli::parse();
    let path = resolve_store(args.store)?;
    let user = args
        .user
        .context("no user given; pass --user or set DIARIST_USER")?;

    let store = Arc::new(
        FileStore::open(path.clone())
            .with_context(|| format!("failed to open store at {}", path.display()))?,
    );
    let accounts = Accounts::new(store.clone(), Session::new());
    let journal = Journal::new(store.clone());

    let command = match args.command {
        Commands::Signup { email } => {
            accounts.sign_up(&user, &email).await?;
            println!("account '{user}' created");
            return Ok(());
        }
        other => other,
    };

    if !store.exists() {
        bail!("diarist store does not exist");
    }
    let secret = accounts.sign_in(&user).await?;
    let secret = secret.expose();

    match command {
        Commands::Signup { .. } => {}
        Commands::Write { date, content } => {
            let date = date.unwrap_or_else(|| Local::now().date_naive());
            let content = input::read_entry(content)?;
            let id = journal.save_entry(&user, &content, date, secret).await?;
            println!("saved entry {id} for {date}");
        }
        Commands::List => {
            let batch = journal.load_entries(&user, secret).await?;
            if batch.entries.is_empty() && batch.failures.is_empty() {
                println!("No entries yet.");
            }
            for entry in &batch.entries {
                println!("{}  [{}]", search::long_date(entry.date), entry.id);
                println!("{}\n", entry.content);
            }
            check_failures(&batch)?;
        }
        Commands::Show { date } => {
            let batch = journal.load_entries(&user, secret).await?;
            if let Some(failure) = batch.failure_for_date(date) {
                bail!("entry for {date} could not be read: {}", failure.error);
            }
            for failure in &batch.failures {
                eprintln!("could not read entry {}: {}", failure.id, failure.error);
            }
            match batch.for_date(date) {
                Some(entry) => println!("{}", entry.content),
                None => println!("no entry for {date}"),
            }
        }
        Commands::Search { query } => {
            let batch = journal.search_entries(&user, secret, &query).await?;
            let n = batch.entries.len();
            println!(
                "Search results for \"{query}\" ({n} {})",
                if n == 1 { "entry" } else { "entries" }
            );
            for entry in &batch.entries {
                println!("{}  [{}]", search::long_date(entry.date), entry.id);
                println!("{}\n", entry.content);
            }
            check_failures(&batch)?;
        }
        Commands::Delete { id } => {
            journal.delete_entry(&user, &id).await?;
            println!("entry '{id}' removed");
        }
        Commands::Chat(ChatCommand::Show) => {
            let messages = journal.load_chat_history(&user, secret).await?;
            if messages.is_empty() {
                println!("No chat history.");
            }
            for message in messages {
                println!("{}: {}", message.role.as_str(), message.content);
            }
        }
        Commands::Chat(ChatCommand::Clear) => {
            journal.save_chat_history(&user, &[], secret).await?;
            println!("chat history cleared");
        }
    }

    accounts.sign_out();
    Ok(())
}
