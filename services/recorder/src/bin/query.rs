// recorder-query: Read-only reporting over the recorded event log.
//
// Opens its own read-only connection to the same SQLite database the
// recorder writes; WAL keeps readers and the live writer out of each
// other's way.
//
// Usage:
//     recorder-query [--db PATH]            # recent events
//     recorder-query --topics               # topics with counts
//     recorder-query --stats                # aggregate statistics
//     recorder-query --topic 'home/#'       # filter by topic pattern
//     recorder-query --since 1h             # events from last hour
//     recorder-query --limit 100            # max events to show

use chrono::{Local, SecondsFormat};
use recorder::storage::event_store::{EventFilter, EventStore};
use std::path::PathBuf;

const DEFAULT_DB: &str = "/var/lib/bus-recorder/events.sqlite3";

// ---------------------------------------------------------------------------
// Argument parsing
// ---------------------------------------------------------------------------

struct QueryArgs {
    db: PathBuf,
    topics: bool,
    stats: bool,
    topic: Option<String>,
    since: Option<String>,
    limit: u32,
}

fn parse_args(args: &[String]) -> Result<QueryArgs, String> {
    let mut parsed = QueryArgs {
        db: PathBuf::from(DEFAULT_DB),
        topics: false,
        stats: false,
        topic: None,
        since: None,
        limit: 50,
    };

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--db" => {
                i += 1;
                let p = args.get(i).ok_or("--db requires a path argument")?;
                parsed.db = PathBuf::from(p);
            }
            "--topics" => parsed.topics = true,
            "--stats" => parsed.stats = true,
            "--topic" | "-t" => {
                i += 1;
                let p = args.get(i).ok_or("--topic requires a pattern argument")?;
                parsed.topic = Some(p.clone());
            }
            "--since" | "-s" => {
                i += 1;
                let d = args.get(i).ok_or("--since requires a duration argument")?;
                parsed.since = Some(d.clone());
            }
            "--limit" | "-n" => {
                i += 1;
                let n = args.get(i).ok_or("--limit requires a number argument")?;
                parsed.limit = n
                    .parse()
                    .map_err(|_| format!("invalid --limit value '{}'", n))?;
            }
            other => return Err(format!("unknown argument '{}'", other)),
        }
        i += 1;
    }
    Ok(parsed)
}

/// Parse a duration like `30m`, `1h`, `7d`.
fn parse_duration(s: &str) -> Result<chrono::Duration, String> {
    if s.len() < 2 {
        return Err(format!("invalid duration '{}'", s));
    }
    let (value, unit) = s.split_at(s.len() - 1);
    let value: i64 = value
        .parse()
        .map_err(|_| format!("invalid duration value in '{}'", s))?;
    match unit {
        "m" => Ok(chrono::Duration::minutes(value)),
        "h" => Ok(chrono::Duration::hours(value)),
        "d" => Ok(chrono::Duration::days(value)),
        other => Err(format!("unknown duration unit '{}'", other)),
    }
}

// ---------------------------------------------------------------------------
// Report rendering
// ---------------------------------------------------------------------------

fn list_topics(store: &EventStore) -> Result<(), String> {
    let counts = store.topic_counts().map_err(|e| e.to_string())?;
    println!("{:<60} {:>8}", "Topic", "Count");
    println!("{}", "-".repeat(70));
    for (topic, count) in counts {
        println!("{:<60} {:>8}", topic, count);
    }
    Ok(())
}

fn show_stats(store: &EventStore) -> Result<(), String> {
    let stats = store.stats().map_err(|e| e.to_string())?;
    println!("Recorded Events Statistics");
    println!("{}", "=".repeat(40));
    println!("Total events:    {}", stats.total_events);
    println!("Unique topics:   {}", stats.distinct_topics);
    println!("Retained msgs:   {}", stats.retained_events);
    println!(
        "First event:     {}",
        stats.earliest.as_deref().unwrap_or("N/A")
    );
    println!(
        "Last event:      {}",
        stats.latest.as_deref().unwrap_or("N/A")
    );
    Ok(())
}

fn list_events(store: &EventStore, args: &QueryArgs) -> Result<(), String> {
    let since = match &args.since {
        Some(s) => {
            let delta = parse_duration(s)?;
            Some((Local::now() - delta).to_rfc3339_opts(SecondsFormat::Micros, false))
        }
        None => None,
    };
    let filter = EventFilter {
        topic_pattern: args.topic.clone(),
        since,
        limit: args.limit,
    };
    let events = store.query(&filter).map_err(|e| e.to_string())?;

    for event in events {
        let ret_flag = if event.retained { 'R' } else { ' ' };
        let sender = event
            .sender
            .map_or_else(String::new, |s| format!(" [{}]", s));
        println!(
            "{} Q{}{} {}{}",
            event.timestamp, event.qos, ret_flag, event.topic, sender
        );
        if !event.payload.is_empty() {
            let display: String = if event.payload.chars().count() > 80 {
                let head: String = event.payload.chars().take(80).collect();
                format!("{}...", head)
            } else {
                event.payload
            };
            println!("    {}", display);
        }
        println!();
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() {
    let raw_args: Vec<String> = std::env::args().skip(1).collect();
    let args = match parse_args(&raw_args) {
        Ok(a) => a,
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(1);
        }
    };

    if !args.db.exists() {
        eprintln!("database not found: {}", args.db.display());
        eprintln!("run the recorder first to create it");
        std::process::exit(1);
    }

    let store = match EventStore::open_read_only(&args.db) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: failed to open database: {}", e);
            std::process::exit(1);
        }
    };

    let result = if args.topics {
        list_topics(&store)
    } else if args.stats {
        show_stats(&store)
    } else {
        list_events(&store, &args)
    };

    if let Err(e) = result {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
