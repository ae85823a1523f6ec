//! sandql CLI - Interactive SQL shell
//!
//! Usage:
//!   sandql-cli                          # interactive mode, fresh session
//!   sandql-cli --user alice             # interactive mode as a user
//!   sandql-cli -e "SELECT 1 + 1"        # run a batch and exit
//!   sandql-cli --highlight -e "SELECT 1" # print highlighted HTML

use anyhow::{Context, Result};
use clap::Parser;
use sandql::{BatchResult, Engine, EngineConfig, OwnerScope, QueryResult, Session, Value};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "sandql-cli", version, about = "Interactive shell for the sandql SQL engine")]
struct Args {
    /// Execute a `;`-separated batch and exit
    #[arg(short = 'e', long = "execute")]
    execute: Option<String>,

    /// Session id to run as (defaults to a fresh random id)
    #[arg(long, conflicts_with = "user")]
    session: Option<String>,

    /// User id to run as
    #[arg(long)]
    user: Option<String>,

    /// Claim the session's tables for this user before running
    #[arg(long, requires = "session")]
    claim_for: Option<String>,

    /// Print the batch as highlighted HTML instead of executing it
    #[arg(long, requires = "execute")]
    highlight: bool,

    /// JSON engine configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory for the JSON backing store (overrides the config file)
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    if args.highlight {
        if let Some(text) = &args.execute {
            println!("{}", sandql::highlight(text));
        }
        return Ok(());
    }

    let mut config = match &args.config {
        Some(path) => EngineConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::for_sandbox(),
    };
    if let Some(dir) = &args.data_dir {
        config = config.with_data_dir(dir);
    }

    let engine = Arc::new(Engine::new(config).context("starting engine")?);
    let scope = match (&args.user, &args.session) {
        (Some(user), _) => OwnerScope::user(user.clone()),
        (None, Some(session)) => OwnerScope::session(session.clone()),
        (None, None) => OwnerScope::session(uuid::Uuid::new_v4().to_string()),
    };
    let mut session = Session::new(engine, scope);

    if let Some(user) = &args.claim_for {
        let summary = session.claim_for(OwnerScope::user(user.clone()))?;
        println!("Claimed {} table(s) for {}", summary.tables.len(), session.scope());
        if let Some(err) = summary.persistence_error {
            eprintln!("Warning: {}", err);
        }
    }

    match &args.execute {
        Some(text) => {
            let batch = session.batch(text)?;
            display_batch(&batch);
            if !batch.all_succeeded() {
                std::process::exit(1);
            }
            Ok(())
        }
        None => interactive_mode(&mut session),
    }
}

fn interactive_mode(session: &mut Session) -> Result<()> {
    println!("sandql v{}", env!("CARGO_PKG_VERSION"));
    println!("Running as {}", session.scope());
    println!("Type '.help' for help, '.exit' to quit\n");

    let stdin = io::stdin();
    let mut lines = stdin.lock();
    let mut buffer = String::new();
    let mut multiline_sql = String::new();

    loop {
        if multiline_sql.is_empty() {
            print!("sandql> ");
        } else {
            print!("     -> ");
        }
        io::stdout().flush()?;

        buffer.clear();
        if lines.read_line(&mut buffer)? == 0 {
            break;
        }
        let input = buffer.trim();

        if input.starts_with('.') && multiline_sql.is_empty() {
            if !run_dot_command(session, input)? {
                break;
            }
            continue;
        }

        if input.is_empty() {
            continue;
        }

        multiline_sql.push_str(input);
        multiline_sql.push('\n');

        if input.ends_with(';') {
            match session.batch(&multiline_sql) {
                Ok(batch) => display_batch(&batch),
                Err(e) => eprintln!("Error: {}", e),
            }
            multiline_sql.clear();
        }
    }

    println!("Goodbye!");
    Ok(())
}

/// Returns `false` when the shell should exit.
fn run_dot_command(session: &mut Session, input: &str) -> Result<bool> {
    let mut parts = input.split_whitespace();
    let command = parts.next().unwrap_or_default();
    let arg = parts.next();

    match (command, arg) {
        (".exit" | ".quit", _) => return Ok(false),
        (".help", _) => print_interactive_help(),
        (".tables", _) => match session.tables() {
            Ok(tables) if tables.is_empty() => println!("No tables"),
            Ok(tables) => tables.iter().for_each(|t| println!("  {}", t)),
            Err(e) => eprintln!("Error: {}", e),
        },
        (".schema", Some(table)) => match session.execute(&format!("DESCRIBE {}", table)) {
            Ok(result) => display_result(&result),
            Err(e) => eprintln!("Error: {}", e),
        },
        (".history", _) => {
            for record in session.history() {
                let mark = if record.success { "ok " } else { "err" };
                println!("  [{}] {:>8.3} ms  {}", mark, record.execution_time_ms, record.statement_text);
            }
        }
        (".highlight", Some(_)) => {
            let sql = input[".highlight".len()..].trim();
            println!("{}", sandql::highlight(sql));
        }
        (".claim", Some(user)) => match session.claim_for(OwnerScope::user(user)) {
            Ok(summary) => {
                println!("Claimed {} table(s); now running as {}", summary.tables.len(), session.scope());
                if let Some(err) = summary.persistence_error {
                    eprintln!("Warning: {}", err);
                }
            }
            Err(e) => eprintln!("Error: {}", e),
        },
        (".retry", _) => {
            let report = session.engine().retry_pending_writes();
            println!("Applied {} pending write(s), {} remaining", report.applied, report.remaining);
        }
        _ => {
            eprintln!("Unknown command: {}", input);
            println!("Type '.help' for available commands");
        }
    }
    Ok(true)
}

fn display_batch(batch: &BatchResult) {
    for outcome in &batch.outcomes {
        match (&outcome.result, &outcome.error_message) {
            (Some(result), _) => display_result(result),
            (None, Some(message)) => eprintln!("Error: {}", message),
            (None, None) => {}
        }
        if let Some(err) = &outcome.persistence_error {
            eprintln!("Warning: not saved: {}", err);
        }
    }
    if batch.outcomes.len() > 1 {
        println!(
            "{} succeeded, {} failed in {:.3} ms",
            batch.succeeded(),
            batch.failed(),
            batch.total_time_ms
        );
    }
}

fn display_result(result: &QueryResult) {
    match result {
        QueryResult::Definition { message } => println!("{}", message),
        QueryResult::Modification { affected_rows } => println!("{} row(s) affected", affected_rows),
        QueryResult::Select { columns, rows } => display_table(columns, rows),
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::Text(s) if s.chars().count() > 50 => {
            let head: String = s.chars().take(47).collect();
            format!("{}...", head)
        }
        other => other.to_string(),
    }
}

fn display_table(columns: &[String], rows: &[Vec<Value>]) {
    let cells: Vec<Vec<String>> = rows.iter().map(|row| row.iter().map(render).collect()).collect();

    let mut widths: Vec<usize> = columns.iter().map(|c| c.chars().count()).collect();
    for row in &cells {
        for (i, cell) in row.iter().enumerate() {
            if let Some(w) = widths.get_mut(i) {
                *w = (*w).max(cell.chars().count());
            }
        }
    }

    let rule = |left: &str, mid: &str, right: &str| {
        let parts: Vec<String> = widths.iter().map(|w| "─".repeat(w + 2)).collect();
        println!("{}{}{}", left, parts.join(mid), right);
    };
    let line = |values: &[String]| {
        let parts: Vec<String> = values
            .iter()
            .zip(&widths)
            .map(|(v, w)| format!(" {:w$} ", v, w = *w))
            .collect();
        println!("│{}│", parts.join("│"));
    };

    rule("┌", "┬", "┐");
    line(columns);
    rule("├", "┼", "┤");
    for row in &cells {
        line(row.as_slice());
    }
    rule("└", "┴", "┘");
    println!("{} row(s) returned", rows.len());
}

fn print_interactive_help() {
    println!(
        r#"
Commands:
  .help              Show this help
  .exit, .quit       Exit
  .tables            List tables in the current scope
  .schema <table>    Describe a table
  .history           Show executed statements
  .highlight <sql>   Print highlighted HTML for <sql>
  .claim <user>      Move this session's tables to <user>
  .retry             Retry writes the backing store rejected

SQL examples:
  CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
  INSERT INTO users VALUES (1, 'Alice'), (2, 'Bob');
  SELECT * FROM users WHERE name LIKE '%o%';
  CREATE INDEX idx_name ON users (name);
  UPDATE users SET name = 'Robert' WHERE id = 2;
  DELETE FROM users WHERE id = 1;
  SHOW TABLES;
  DESCRIBE users;
"#
    );
}
