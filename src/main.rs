use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;

use imgrid::api::{Backend, CountRequest, HttpBackend, Item};
use imgrid::config::{self, Config};
use imgrid::count::group_thousands;
use imgrid::group::{GridRow, cell_label, group};
use imgrid::pattern;
use imgrid::query::{QueryKey, QueryMode};
use imgrid::session::{Session, SessionConfig};
use imgrid::worker::{Reply, Worker};

fn version() -> &'static str {
    const VERSION: &str = concat!(
        env!("CARGO_PKG_VERSION"),
        " (",
        env!("IMGRID_BUILD_GIT_HASH"),
        " ",
        env!("IMGRID_BUILD_PROFILE"),
        ")"
    );
    VERSION
}

#[derive(Parser)]
#[command(
    name = "imgrid",
    version = version(),
    about = "Browse pattern-matched bucket images as a grouped grid in the terminal"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Object pattern, e.g. `gs://bucket/%exp%/%class%_00.jpg`
    #[arg(global = true)]
    pattern: Option<String>,

    /// Pattern syntax (percent or regex)
    #[arg(long, global = true, value_parser = parse_mode)]
    mode: Option<QueryMode>,

    /// Query server base URL
    #[arg(long, global = true)]
    server: Option<String>,

    /// Matches requested per page (25..=500)
    #[arg(long, global = true)]
    page_size: Option<u32>,

    /// Images per grid row (2, 4, 6 or 8)
    #[arg(long, global = true)]
    columns: Option<usize>,

    /// Capture name to group by (defaults to the first capture)
    #[arg(long, global = true)]
    group_by: Option<String>,

    /// Log output file path (enables logging when specified)
    #[arg(long, global = true)]
    log: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Page through all matches and print them grouped
    List {
        /// Stop after this many matches
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Print the server's total match count
    Count,
    /// Validate the pattern locally and show its captures
    Check,
}

fn parse_mode(value: &str) -> Result<QueryMode, String> {
    QueryMode::parse(value).ok_or_else(|| format!("unknown mode '{value}' (percent or regex)"))
}

fn main() {
    let cli = Cli::parse();

    if let Some(log_path) = &cli.log {
        let file = match std::fs::File::create(log_path) {
            Ok(f) => f,
            Err(e) => {
                eprintln!("Error: failed to open log file {}: {e}", log_path.display());
                std::process::exit(1);
            }
        };
        env_logger::Builder::from_default_env()
            .target(env_logger::Target::Pipe(Box::new(file)))
            .init();
    } else if cli.command.is_some() {
        env_logger::init();
    }
    // viewer mode + no --log → logger not initialized (no log output)

    // Load config file and merge CLI overrides
    let mut cfg = match config::load_config() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(1);
        }
    };
    cfg.merge_cli(&config::CliOverrides {
        server: cli.server,
        pattern: cli.pattern,
        mode: cli.mode,
        page_size: cli.page_size,
        columns: cli.columns,
        group_by: cli.group_by,
    });
    let config = cfg.resolve();

    let result = match cli.command {
        Some(Command::List { limit }) => cmd_list(&config, limit),
        Some(Command::Count) => cmd_count(&config),
        Some(Command::Check) => cmd_check(&config),
        None => imgrid::viewer::run(config),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn session_config(config: &Config) -> SessionConfig {
    SessionConfig {
        page_size: config.page_size,
        columns: config.grid.columns,
        group_by: config.grid.group_by.clone(),
        heights: config.grid.heights,
        lookahead: config.grid.lookahead_rows,
    }
}

fn backend(config: &Config) -> Arc<dyn Backend> {
    Arc::new(HttpBackend::new(
        &config.server,
        config.request_timeout,
        config.viewer.max_image_bytes,
    ))
}

fn cmd_list(config: &Config, limit: Option<usize>) -> Result<()> {
    let start = Instant::now();
    let worker = Worker::spawn(backend(config));
    let mut session = Session::new(worker.jobs.clone(), session_config(config));
    session
        .submit(QueryKey::new(config.pattern.as_str(), config.mode))
        .context("invalid pattern")?;

    // Follow the cursor chain until exhausted, failed or past the limit.
    loop {
        let fetch = session.fetch();
        if fetch.all_loaded()
            || fetch.error().is_some()
            || limit.is_some_and(|n| fetch.items().len() >= n)
        {
            break;
        }
        if !fetch.is_fetching() {
            session.request_more();
        }
        match worker.replies.recv().context("worker stopped")? {
            Reply::Page { version, result } => session.on_page(version, result),
            Reply::Count { version, result } => session.on_count(version, result),
            Reply::Image { .. } => {}
        }
    }

    if let Some(e) = session.fetch().error() {
        if session.fetch().first_page_failed() {
            anyhow::bail!("query failed: {}", e.user_message());
        }
        eprintln!("warning: listing incomplete: {}", e.user_message());
    }

    let items = session.fetch().items();
    let shown = items.len().min(limit.unwrap_or(usize::MAX));
    let lines = list_lines(&items[..shown], session.capture_names(), session.group_dimension());
    let mut out = io::stdout().lock();
    for line in &lines {
        writeln!(out, "{line}")?;
    }

    let stats = session.fetch().stats();
    info!(
        "cmd_list: {} match(es) in {} page(s), scanned {} object(s), {:.1}ms",
        session.fetch().items().len(),
        session.fetch().pages_loaded(),
        stats.scanned_objects,
        start.elapsed().as_secs_f64() * 1000.0
    );
    eprintln!(
        "{} match(es) shown, {} page(s)",
        group_thousands(shown as u64),
        session.fetch().pages_loaded()
    );
    Ok(())
}

/// Render listed matches grouped under their headers. Header counts cover
/// only the listed matches, so a limit never leaves an empty group behind.
fn list_lines(items: &[Arc<Item>], names: &[String], dimension: Option<&str>) -> Vec<String> {
    let grouped = group(items, dimension, 1);
    if grouped.rows.is_empty() {
        // No captures: nothing to group on, list in arrival order.
        return items.iter().map(|item| item.object.clone()).collect();
    }
    let mut lines = Vec::with_capacity(grouped.rows.len());
    for row in &grouped.rows {
        match row {
            GridRow::Header { label, size } => lines.push(format!("{label} ({size})")),
            GridRow::Images { .. } => {
                for m in grouped.row_items(row) {
                    lines.push(format!("  {}  {}", cell_label(m, names), m.object));
                }
            }
        }
    }
    lines
}

fn cmd_count(config: &Config) -> Result<()> {
    let key = QueryKey::new(config.pattern.as_str(), config.mode);
    pattern::inspect(&key.pattern, key.mode).context("invalid pattern")?;
    let backend = backend(config);
    let total = backend
        .count(&CountRequest::new(&key, config.page_size))
        .map_err(|e| anyhow::anyhow!("count failed: {}", e.user_message()))?;
    println!("{} files", group_thousands(total));
    Ok(())
}

fn cmd_check(config: &Config) -> Result<()> {
    let info = pattern::inspect(&config.pattern, config.mode).context("invalid pattern")?;
    println!("bucket:   {}", info.bucket);
    println!("objects:  {}", info.object_pattern);
    println!("mode:     {}", config.mode);
    if info.capture_names.is_empty() {
        println!("captures: (none)");
    } else {
        println!("captures: {}", info.capture_names.join(", "));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(object: &str, class: &str, exp: &str) -> Arc<Item> {
        Arc::new(Item {
            object: object.into(),
            url: format!("https://x/{object}"),
            captures: [("class", class), ("exp", exp)]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        })
    }

    fn names() -> Vec<String> {
        vec!["class".into(), "exp".into()]
    }

    #[test]
    fn limited_listing_skips_groups_with_nothing_shown() {
        let items = vec![
            item("e1/owl.jpg", "owl", "e1"),
            item("e1/cat.jpg", "cat", "e1"),
            item("e2/owl.jpg", "owl", "e2"),
            item("e2/ant.jpg", "ant", "e2"),
        ];
        let lines = list_lines(&items[..3], &names(), Some("class"));
        assert_eq!(
            lines,
            [
                "class: cat (1)",
                "  exp: e1  e1/cat.jpg",
                "class: owl (2)",
                "  exp: e1  e1/owl.jpg",
                "  exp: e2  e2/owl.jpg",
            ]
        );
    }

    #[test]
    fn listing_without_captures_keeps_arrival_order() {
        let items = vec![item("b.jpg", "x", "y"), item("a.jpg", "x", "y")];
        let lines = list_lines(&items, &[], None);
        assert_eq!(lines, ["b.jpg", "a.jpg"]);
    }
}
