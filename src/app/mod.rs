
use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;

use crate::catalog::has_mp4_extension;
use crate::cli::{Cli, Command, DateArg, ServeArgs};
use crate::config::{Config, ServerConfig};
use crate::resolver::Pick;
use crate::server::start_server;

pub fn run(cli: Cli) -> Result<()> {
    let config = Config::load(&cli.options)?;

    match cli.command {
        Some(Command::Today(date)) => run_today(&config, &date)?,
        Some(Command::Status(date)) => run_status(&config, &date)?,
        Some(Command::List) => run_list(&config)?,
        Some(Command::Pin { id, date }) => run_pin(&config, id, &date)?,
        Some(Command::Add { file }) => run_add(&config, &file)?,
        Some(Command::Remove { filename }) => run_remove(&config, &filename)?,
        Some(Command::Serve(args)) => run_serve(config, &args)?,
        None => run_today(&config, &DateArg::default())?,
    }

    Ok(())
}

fn day_for(config: &Config, date: &DateArg) -> NaiveDate {
    date.date.unwrap_or_else(|| config.today())
}

fn run_today(config: &Config, date: &DateArg) -> Result<()> {
    let resolver = config.open_resolver()?;
    let pick = resolver.resolve(day_for(config, date))?;
    println!("{}", describe_pick(&pick));
    println!("  {}", pick.candidate.locator.display());
    if pick.advanced {
        println!("  (rotation advanced)");
    }
    Ok(())
}

fn run_status(config: &Config, date: &DateArg) -> Result<()> {
    let resolver = config.open_resolver()?;
    let (videos, store) = resolver.describe();
    let day = day_for(config, date);
    println!("Videos: {videos}");
    println!("State:  {store}");
    println!("Zone:   {}", config.time_zone);

    match resolver.selection()? {
        Some(selection) => println!("Stored: video {} on {}", selection.id, selection.day),
        None => println!("Stored: nothing yet"),
    }
    match resolver.peek(day)? {
        Some(pick) => println!("Today:  {}", pick.candidate.file_name),
        None => println!("Today:  not chosen yet for {day}"),
    }
    Ok(())
}

fn run_list(config: &Config) -> Result<()> {
    let resolver = config.open_resolver()?;
    let candidates = resolver.candidates()?;
    if candidates.is_empty() {
        let (videos, _) = resolver.describe();
        println!("No videos in {videos}. Run `espen add <file.mp4>` first.");
        return Ok(());
    }

    let today = resolver
        .peek(config.today())?
        .map(|pick| pick.candidate.id);
    println!("{:<3} {:<8} {:<24}", "", "ID", "FILE");
    for candidate in candidates {
        let marker = if Some(candidate.id) == today { "*" } else { "" };
        println!(
            "{:<3} {:<8} {:<24}",
            marker, candidate.id, candidate.file_name
        );
    }
    Ok(())
}

fn run_pin(config: &Config, id: u64, date: &DateArg) -> Result<()> {
    let resolver = config.open_resolver()?;
    let pick = resolver.pin(day_for(config, date), id)?;
    println!("Pinned {}", describe_pick(&pick));
    Ok(())
}

fn run_add(config: &Config, file: &Path) -> Result<()> {
    ensure_mp4(file)?;
    let resolver = config.open_resolver()?;
    let mut source =
        File::open(file).with_context(|| format!("failed to open {}", file.display()))?;
    let added = resolver.add(&mut source)?;
    println!("Added {} as {}", file.display(), added.file_name);
    Ok(())
}

fn run_remove(config: &Config, filename: &str) -> Result<()> {
    let resolver = config.open_resolver()?;
    let removed = resolver.remove(filename)?;
    println!("Removed {}", removed.file_name);
    Ok(())
}

fn run_serve(config: Config, args: &ServeArgs) -> Result<()> {
    let server = ServerConfig::load(args)?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    runtime.block_on(start_server(config, server))
}

pub(crate) fn describe_pick(pick: &Pick) -> String {
    format!(
        "Video of the day for {}: {} (#{})",
        pick.day, pick.candidate.file_name, pick.candidate.id
    )
}

pub(crate) fn ensure_mp4(file: &Path) -> Result<()> {
    let is_mp4 = file
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(has_mp4_extension);
    if !is_mp4 {
        bail!("only MP4 files are allowed: {}", file.display());
    }
    Ok(())
}
