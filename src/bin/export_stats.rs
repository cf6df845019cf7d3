use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};

use matchday::config::Config;
use matchday::{db, stats_export};

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");

    let group_id: i64 = arg_value("--group")
        .ok_or_else(|| anyhow!("usage: export_stats --group <id> [--db <path>] [--out <file.xlsx>]"))?
        .parse()
        .context("--group must be a numeric group id")?;

    let db_path = match arg_value("--db") {
        Some(path) => PathBuf::from(path),
        None => Config::load()?.db_path,
    };
    let out = arg_value("--out")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(format!("group-{group_id}-stats.xlsx")));

    let conn = db::open_db(&db_path)?;
    let report = stats_export::export_group_stats(&conn, group_id, &out)?;

    println!("Stats export complete");
    println!("DB: {}", db_path.display());
    println!("Workbook: {}", out.display());
    println!(
        "Players: {}  Matchdays: {}  Games: {}",
        report.players, report.matchdays, report.games
    );
    Ok(())
}

/// Value of `--name=value` or `--name value`.
fn arg_value(name: &str) -> Option<String> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let prefix = format!("{name}=");
    for (idx, arg) in args.iter().enumerate() {
        if let Some(raw) = arg.strip_prefix(&prefix) {
            let trimmed = raw.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
        if arg == name
            && let Some(next) = args.get(idx + 1)
            && !next.trim().is_empty()
        {
            return Some(next.trim().to_string());
        }
    }
    None
}
