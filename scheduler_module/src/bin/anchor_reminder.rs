use std::env;
use std::io::Write;
use std::net::TcpStream;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use scheduler_module::checklist::pending_items;
use scheduler_module::service::{build_calendar_sync, run_daemon, BoxError, ServiceConfig};
use scheduler_module::{
    CalendarSync, ClientMessage, IcsFileSync, StoreError, TaskStore, TaskUpsert,
};

const DAEMON_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

const USAGE: &str = "Usage: anchor-reminder [command]

Commands:
  run                                   Run the reminder daemon until Ctrl-C (default)
  list                                  Show pending tasks
  done <id>                             Mark a task done
  add --uid <uid> --title <title> --start <ts> [--end <ts>] [--red]
                                        Insert or update a task
  sync [--ics <path>]                   Run the configured calendar sources once,
                                        or only the given .ics file";

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    let command = args.get(1).map(String::as_str).unwrap_or("run");
    if matches!(command, "help" | "--help" | "-h") {
        println!("{}", USAGE);
        return Ok(());
    }

    let config = ServiceConfig::from_env()?;
    match command {
        "run" => {
            run_daemon(config, async {
                if let Err(err) = tokio::signal::ctrl_c().await {
                    warn!("failed to listen for Ctrl-C: {}", err);
                }
            })
            .await
        }
        "list" => cmd_list(&config),
        "done" => cmd_done(&config, &args),
        "add" => cmd_add(&config, &args),
        "sync" => cmd_sync(&config, &args),
        other => {
            eprintln!("{}", USAGE);
            Err(format!("unknown command: {}", other).into())
        }
    }
}

fn cmd_list(config: &ServiceConfig) -> Result<(), BoxError> {
    let store = TaskStore::new(&config.db_path)?;
    let items = pending_items(&store)?;
    if items.is_empty() {
        println!("No pending tasks.");
        return Ok(());
    }
    let now = Utc::now();
    for item in items {
        let due = item
            .end
            .map(|end| end.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:>5}  {}{} {:<16}  {}",
            item.id,
            if item.red { "!" } else { " " },
            if item.is_due(now) { "*" } else { " " },
            due,
            item.title
        );
    }
    Ok(())
}

fn cmd_done(config: &ServiceConfig, args: &[String]) -> Result<(), BoxError> {
    let raw = args.get(2).ok_or("done requires a task id")?;
    let task_id = raw
        .parse::<i64>()
        .map_err(|_| format!("invalid task id: {}", raw))?;
    let store = TaskStore::new(&config.db_path)?;
    // Fail early on unknown ids even when the daemon handles the update.
    store.get(task_id)?;

    match send_ack_to_daemon(config, task_id) {
        Ok(()) => {
            println!("Task {} acknowledged via running daemon.", task_id);
            Ok(())
        }
        Err(err) => {
            info!("daemon not reachable ({}); updating store directly", err);
            match store.mark_done(task_id) {
                Ok(()) => {
                    println!("Task {} marked done.", task_id);
                    Ok(())
                }
                Err(StoreError::NotFound(id)) => Err(format!("task {} not found", id).into()),
                Err(err) => Err(err.into()),
            }
        }
    }
}

fn send_ack_to_daemon(config: &ServiceConfig, task_id: i64) -> Result<(), BoxError> {
    let addr = config.socket_addr()?;
    let mut stream = TcpStream::connect_timeout(&addr, DAEMON_CONNECT_TIMEOUT)?;
    stream.set_write_timeout(Some(DAEMON_CONNECT_TIMEOUT))?;
    let mut line = serde_json::to_vec(&ClientMessage::Done { task_id })?;
    line.push(b'\n');
    stream.write_all(&line)?;
    stream.flush()?;
    Ok(())
}

fn cmd_add(config: &ServiceConfig, args: &[String]) -> Result<(), BoxError> {
    let uid = parse_arg(args, "--uid").ok_or("add requires --uid")?;
    let title = parse_arg(args, "--title").ok_or("add requires --title")?;
    let start_ts = parse_timestamp(args, "--start")?.ok_or("add requires --start")?;
    let end_ts = parse_timestamp(args, "--end")?;
    let red = args.iter().any(|arg| arg == "--red");

    let store = TaskStore::new(&config.db_path)?;
    let id = store.upsert(&TaskUpsert::new(uid, title, start_ts, end_ts, red))?;
    println!("Task {} saved.", id);
    Ok(())
}

fn cmd_sync(config: &ServiceConfig, args: &[String]) -> Result<(), BoxError> {
    let store = TaskStore::new(&config.db_path)?;
    let sync: Box<dyn CalendarSync> = match parse_arg(args, "--ics") {
        Some(path) => Box::new(IcsFileSync::new(path)),
        None => build_calendar_sync(config),
    };
    let processed = sync.sync(&store)?;
    println!("Synced {} task(s).", processed);
    Ok(())
}

fn parse_arg(args: &[String], flag: &str) -> Option<String> {
    let prefix = format!("{}=", flag);
    for (idx, arg) in args.iter().enumerate() {
        if let Some(value) = arg.strip_prefix(&prefix) {
            return Some(value.to_string());
        }
        if arg == flag {
            return args.get(idx + 1).cloned();
        }
    }
    None
}

fn parse_timestamp(args: &[String], flag: &str) -> Result<Option<i64>, BoxError> {
    match parse_arg(args, flag) {
        Some(raw) => raw
            .parse::<i64>()
            .map(Some)
            .map_err(|_| format!("invalid timestamp for {}: {}", flag, raw).into()),
        None => Ok(None),
    }
}
