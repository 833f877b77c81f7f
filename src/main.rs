use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::info;

use account_lookup::config::{Command, Config};
use account_lookup::directory::BankDirectory;
use account_lookup::metrics::{self, Metrics};
use account_lookup::query;
use account_lookup::transport::{Dispatcher, SearchHandle};
use account_lookup::types::{AccountRecord, Outcome, Snapshot};

// ── Output ──────────────────────────────────────────────────────────────────

/// Prints each record once, even when snapshots repeat earlier records.
#[derive(Default)]
struct Printer {
    shown: usize,
}

impl Printer {
    fn render(&mut self, snapshot: &Snapshot) {
        let Some(outcome) = &snapshot.outcome else {
            return;
        };
        let records = outcome.records();
        for record in records.iter().skip(self.shown) {
            print_record(record);
        }
        self.shown = self.shown.max(records.len());

        if snapshot.terminal {
            match outcome {
                Outcome::Success(_) => {}
                Outcome::SuccessMany(records) => println!("{} account(s) found", records.len()),
                Outcome::Empty => println!("no result"),
                Outcome::Failure(reason) => println!("error: {reason}"),
            }
        }
    }
}

fn print_record(record: &AccountRecord) {
    println!(
        "{}  {:<32}  {} ({})",
        record.account_number, record.account_name, record.bank_name, record.bank_code
    );
}

/// Next snapshot from the current search; pending forever when idle.
async fn next_update(current: &mut Option<SearchHandle>) -> Option<Snapshot> {
    match current {
        Some(handle) => handle.changed().await.then(|| handle.snapshot()),
        None => std::future::pending().await,
    }
}

// ── Commands ────────────────────────────────────────────────────────────────

async fn lookup(
    dispatcher: &mut Dispatcher,
    banks: &BankDirectory,
    account: &str,
    bank: Option<&str>,
    name: Option<&str>,
) -> ExitCode {
    let query = match query::build(account, bank, name, banks) {
        Ok(query) => query,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(2);
        }
    };
    info!(mode = query.mode.as_str(), account = %query.identifier, bank = %query.bank_code, "dispatching");

    let mut handle = dispatcher.dispatch(&query).await;
    let mut printer = Printer::default();
    loop {
        let snapshot = handle.snapshot();
        printer.render(&snapshot);
        if snapshot.terminal {
            return match snapshot.outcome {
                Some(Outcome::Failure(_)) => ExitCode::FAILURE,
                _ => ExitCode::SUCCESS,
            };
        }
        tokio::select! {
            changed = handle.changed() => if !changed {
                return ExitCode::FAILURE;
            },
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, closing search");
                dispatcher.close().await;
                return ExitCode::from(130);
            }
        }
    }
}

async fn interactive(
    dispatcher: &mut Dispatcher,
    banks: &BankDirectory,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut current: Option<SearchHandle> = None;
    let mut printer = Printer::default();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let mut words = line.split_whitespace();
                let Some(account) = words.next() else { continue };
                let bank = words.next();
                let name = words.collect::<Vec<_>>().join(" ");

                match query::build(account, bank, Some(&name), banks) {
                    Ok(query) => {
                        if current.take().is_some() {
                            println!("-- new search --");
                        }
                        printer = Printer::default();
                        let mut handle = dispatcher.dispatch(&query).await;
                        let snapshot = handle.snapshot();
                        printer.render(&snapshot);
                        if !snapshot.terminal {
                            current = Some(handle);
                        }
                    }
                    Err(e) => eprintln!("error: {e}"),
                }
            }
            update = next_update(&mut current) => match update {
                Some(snapshot) => {
                    printer.render(&snapshot);
                    if snapshot.terminal {
                        current = None;
                    }
                }
                None => current = None,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
        }
    }

    dispatcher.close().await;
    Ok(ExitCode::SUCCESS)
}

// ── Main ────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    let banks = BankDirectory::from_path(&config.banks)?;
    let endpoints = config.endpoints();
    info!(
        host = endpoints.host(),
        port = config.port,
        banks = banks.len(),
        "starting account lookup"
    );

    let cancel = CancellationToken::new();
    let metrics = Arc::new(Metrics::default());

    let http_handle = config.metrics_port.map(|port| {
        let cancel = cancel.clone();
        let metrics = Arc::clone(&metrics);
        tokio::spawn(async move {
            metrics::serve_http(port, metrics, cancel).await;
        })
    });

    let mut dispatcher = Dispatcher::new(endpoints, Arc::clone(&metrics))?;

    let code = match &config.command {
        Command::Banks { filter } => {
            for (code, name) in banks.search(filter.as_deref().unwrap_or("")) {
                println!("{code}  {name}");
            }
            ExitCode::SUCCESS
        }
        Command::Lookup {
            account,
            bank,
            name,
        } => {
            lookup(
                &mut dispatcher,
                &banks,
                account,
                bank.as_deref(),
                name.as_deref(),
            )
            .await
        }
        Command::Interactive => interactive(&mut dispatcher, &banks).await?,
    };

    dispatcher.close().await;
    cancel.cancel();
    if let Some(handle) = http_handle {
        let _ = handle.await;
    }

    info!("shutdown complete");
    Ok(code)
}
