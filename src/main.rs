use quote_sync_lib::config::AppConfig;
use quote_sync_lib::quotes::transfer::DEFAULT_EXPORT_FILE;
use quote_sync_lib::quotes::CategoryFilter;
use quote_sync_lib::sync::{
    ChannelNotifier, Conflict, ConflictChoice, NotificationLevel, NotifierEvent, SyncReport,
};
use quote_sync_lib::QuoteApp;
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::UnboundedReceiver;

const HISTORY_RETENTION_DAYS: i64 = 30;

#[derive(Debug, Clone, PartialEq)]
enum Command {
    Show,
    List,
    Categories,
    Filter(CategoryFilter),
    Add { text: String, category: String },
    Export(PathBuf),
    Import(PathBuf),
    Clear,
    Sync,
    Status,
    History(i64),
    Watch,
}

fn usage() -> &'static str {
    "Usage: quote-sync <command>\n\
     \n\
     Commands:\n\
     \x20 show                      show a random quote (respects the filter)\n\
     \x20 list                      list every quote\n\
     \x20 categories                list categories\n\
     \x20 filter <category|all>     set the category filter\n\
     \x20 add <text> <category>     add a quote\n\
     \x20 export [path]             export quotes as JSON (default quotes.json)\n\
     \x20 import <path>             replace quotes with a JSON file\n\
     \x20 clear --yes               delete every quote\n\
     \x20 sync                      run one sync cycle\n\
     \x20 status                    show sync status\n\
     \x20 history [n]               show the last n sync cycles (default 10)\n\
     \x20 watch                     sync periodically; stdin accepts\n\
     \x20                           resolve <id> local|server, conflicts, sync, show, quit\n\
     \n\
     Environment: QUOTE_SYNC_SERVER_URL, QUOTE_SYNC_API_TOKEN, QUOTE_SYNC_DB_PATH,\n\
     \x20            QUOTE_SYNC_INTERVAL_SECS, QUOTE_SYNC_TIMEOUT_SECS\n"
}

fn parse_args(args: &[String]) -> Result<Command, String> {
    let name = args.first().ok_or("missing command")?;
    let rest = &args[1..];

    let command = match name.as_str() {
        "show" => Command::Show,
        "list" => Command::List,
        "categories" => Command::Categories,
        "filter" => {
            let v = rest.first().ok_or("filter requires CATEGORY or all")?;
            Command::Filter(CategoryFilter::parse(v))
        }
        "add" => {
            let text = rest.first().ok_or("add requires TEXT and CATEGORY")?;
            let category = rest.get(1).ok_or("add requires TEXT and CATEGORY")?;
            Command::Add {
                text: text.clone(),
                category: category.clone(),
            }
        }
        "export" => Command::Export(
            rest.first()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_EXPORT_FILE)),
        ),
        "import" => {
            let v = rest.first().ok_or("import requires PATH")?;
            Command::Import(PathBuf::from(v))
        }
        "clear" => {
            if !rest.iter().any(|a| a == "--yes") {
                return Err("clear deletes every quote; confirm with: clear --yes".to_string());
            }
            Command::Clear
        }
        "sync" => Command::Sync,
        "status" => Command::Status,
        "history" => {
            let limit = match rest.first() {
                Some(v) => v
                    .parse::<i64>()
                    .ok()
                    .filter(|n| *n > 0)
                    .ok_or_else(|| format!("history count must be a positive number, got {}", v))?,
                None => 10,
            };
            Command::History(limit)
        }
        "watch" => Command::Watch,
        other => return Err(format!("unknown command: {}", other)),
    };

    Ok(command)
}

fn print_quote_line(quote: &quote_sync_lib::quotes::Quote) {
    println!("[{}] \"{}\" - {}", quote.id, quote.text, quote.category);
}

fn print_report(report: &SyncReport) {
    println!(
        "fetched {}, appended {}, overwritten {}, conflicts {}, sent {}",
        report.fetched,
        report.appended,
        report.overwritten,
        report.conflicts.len(),
        report.sent
    );
}

fn print_conflicts(conflicts: &[Conflict]) {
    if conflicts.is_empty() {
        println!("No pending conflicts");
        return;
    }
    for conflict in conflicts {
        println!("Conflict on quote {}:", conflict.id);
        println!("  local:  \"{}\" ({}) {}", conflict.local.text, conflict.local.category, conflict.local.last_updated.to_rfc3339());
        println!("  server: \"{}\" ({}) {}", conflict.server.text, conflict.server.category, conflict.server.last_updated.to_rfc3339());
    }
    println!("Resolve with: resolve <id> local|server");
}

fn print_event(event: &NotifierEvent) {
    match event {
        NotifierEvent::Notification(n) => match n.level {
            NotificationLevel::Error | NotificationLevel::Warning => {
                eprintln!("[{}] {}", n.level.as_str(), n.message)
            }
            _ => println!("[{}] {}", n.level.as_str(), n.message),
        },
        NotifierEvent::Conflicts(conflicts) => print_conflicts(conflicts),
    }
}

fn drain_events(events: &mut UnboundedReceiver<NotifierEvent>) {
    while let Ok(event) = events.try_recv() {
        print_event(&event);
    }
}

async fn run(command: Command) -> Result<(), Box<dyn Error>> {
    let config = AppConfig::from_env()?;
    let (notifier, mut events) = ChannelNotifier::new();
    let app = QuoteApp::open(&config, Arc::new(notifier)).await?;

    match command {
        Command::Show => match app.show_random_quote().await {
            Some(quote) => println!("\"{}\"\n  - {}", quote.text, quote.category),
            None => println!("No quotes available for this category."),
        },
        Command::List => {
            for quote in app.quotes().await {
                print_quote_line(&quote);
            }
        }
        Command::Categories => {
            let current = app.current_filter().await;
            println!("{} {}", if current == CategoryFilter::All { "*" } else { " " }, CategoryFilter::All.label());
            for category in app.categories().await {
                let selected = current == CategoryFilter::Category(category.clone());
                println!("{} {}", if selected { "*" } else { " " }, category);
            }
        }
        Command::Filter(filter) => {
            app.set_filter(filter.clone()).await?;
            println!("Filter set to {}", filter.label());
        }
        Command::Add { text, category } => {
            let quote = app.add_quote(&text, &category).await?;
            println!("Quote added successfully!");
            print_quote_line(&quote);
        }
        Command::Export(path) => {
            app.export_to_file(&path).await?;
            println!("Exported to {}", path.display());
        }
        Command::Import(path) => {
            let count = app.import_from_file(&path).await?;
            println!("Successfully imported {} quotes!", count);
        }
        Command::Clear => {
            app.clear().await?;
            println!("All quotes have been cleared.");
        }
        Command::Sync => {
            let result = app.sync_now().await;
            drain_events(&mut events);
            print_report(&result?);
        }
        Command::Status => {
            let status = app.sync_status().await;
            println!("{} ({})", status.message, status.state.as_str());
            match app.last_sync()? {
                Some(at) => println!("Last upload: {}", at.to_rfc3339()),
                None => println!("Last upload: never"),
            }
            let config = app.scheduler_config().await;
            println!(
                "Scheduler: {} every {}s, last run {}",
                if config.enabled { "enabled" } else { "disabled" },
                config.interval_secs,
                config.last_run.map(|t| t.to_rfc3339()).unwrap_or_else(|| "never".to_string())
            );
        }
        Command::History(limit) => {
            let stats = app.sync_stats()?;
            println!("{} cycles recorded, {} failed", stats.total_cycles, stats.failed_cycles);
            for entry in app.sync_history(limit)? {
                println!(
                    "{} {:<8} fetched={} appended={} overwritten={} conflicts={} sent={}{}",
                    entry.created_at.format("%Y-%m-%d %H:%M:%S"),
                    entry.outcome.as_str(),
                    entry.fetched,
                    entry.appended,
                    entry.overwritten,
                    entry.conflicts,
                    entry.sent,
                    entry.error_message.map(|e| format!(" error={}", e)).unwrap_or_default()
                );
            }
        }
        Command::Watch => watch(&app, &mut events).await?,
    }

    Ok(())
}

/// Interactive loop: scheduler in the background, commands on stdin
async fn watch(app: &QuoteApp, events: &mut UnboundedReceiver<NotifierEvent>) -> Result<(), Box<dyn Error>> {
    let pruned = app.prune_history(HISTORY_RETENTION_DAYS)?;
    if pruned > 0 {
        log::info!("Pruned {} old sync history entries", pruned);
    }

    if !app.start_scheduler().await? {
        println!("Background sync is disabled; type `sync` to sync manually.");
    }
    println!("Watching. Commands: resolve <id> local|server, conflicts, sync, show, status, quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Some(event) => print_event(&event),
                None => break,
            },
            line = lines.next_line() => match line? {
                Some(line) => {
                    if !handle_watch_line(app, line.trim()).await {
                        break;
                    }
                }
                None => break,
            },
        }
    }

    if app.scheduler_running() {
        app.stop_scheduler().await?;
    }
    Ok(())
}

/// Returns false when the loop should end
async fn handle_watch_line(app: &QuoteApp, line: &str) -> bool {
    let parts: Vec<&str> = line.split_whitespace().collect();

    match parts.as_slice() {
        [] => {}
        ["quit"] | ["exit"] => return false,
        ["conflicts"] => print_conflicts(&app.pending_conflicts().await),
        ["show"] => match app.show_random_quote().await {
            Some(quote) => print_quote_line(&quote),
            None => println!("No quotes available for this category."),
        },
        ["status"] => {
            let status = app.sync_status().await;
            let busy = if status.state.is_busy() { ", in progress" } else { "" };
            println!("{} ({}{}), {} unresolved conflicts", status.message, status.state.as_str(), busy, status.unresolved_conflicts);
        }
        ["sync"] => match app.sync_now().await {
            Ok(report) => print_report(&report),
            Err(e) => eprintln!("Error: {}", e),
        },
        ["resolve", id, choice] => {
            let id = match id.parse::<i64>() {
                Ok(id) => id,
                Err(_) => {
                    eprintln!("Invalid quote id: {}", id);
                    return true;
                }
            };
            let choice = match ConflictChoice::from_str(choice) {
                Ok(choice) => choice,
                Err(e) => {
                    eprintln!("{}", e);
                    return true;
                }
            };
            match app.resolve_conflict(id, choice).await {
                Ok(quote) => print_quote_line(&quote),
                Err(e) => eprintln!("Error: {}", e),
            }
        }
        _ => eprintln!("Unknown command: {}", line),
    }

    true
}

#[tokio::main]
async fn main() {
    // Load .env file for endpoint overrides
    dotenvy::dotenv().ok();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = std::env::args().skip(1).collect::<Vec<_>>();
    if args.is_empty() || args.iter().any(|a| a == "-h" || a == "--help") {
        print!("{}", usage());
        std::process::exit(if args.is_empty() { 2 } else { 0 });
    }

    let command = match parse_args(&args) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("{e}");
            eprint!("{}", usage());
            std::process::exit(2);
        }
    };

    if let Err(e) = run(command).await {
        log::error!("Command failed: {}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!(parse_args(&args(&["show"])), Ok(Command::Show));
        assert_eq!(parse_args(&args(&["sync"])), Ok(Command::Sync));
        assert_eq!(parse_args(&args(&["watch"])), Ok(Command::Watch));
        assert_eq!(parse_args(&args(&["history"])), Ok(Command::History(10)));
        assert_eq!(parse_args(&args(&["history", "3"])), Ok(Command::History(3)));
    }

    #[test]
    fn test_parse_arguments() {
        assert_eq!(
            parse_args(&args(&["add", "Be kind", "life"])),
            Ok(Command::Add {
                text: "Be kind".to_string(),
                category: "life".to_string()
            })
        );
        assert_eq!(parse_args(&args(&["filter", "all"])), Ok(Command::Filter(CategoryFilter::All)));
        assert_eq!(
            parse_args(&args(&["export"])),
            Ok(Command::Export(PathBuf::from("quotes.json")))
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_args(&args(&["clear"])).is_err());
        assert_eq!(parse_args(&args(&["clear", "--yes"])), Ok(Command::Clear));
        assert!(parse_args(&args(&["add", "only text"])).is_err());
        assert!(parse_args(&args(&["history", "0"])).is_err());
        assert!(parse_args(&args(&["import"])).is_err());
        assert!(parse_args(&args(&["bogus"])).is_err());
    }
}
