//! CLI interface for Almanac.
//!
//! Every subcommand is non-interactive: arguments in, plain text out on stdout.
//! Logs and diagnostics go to stderr.
//!
//! - `almanac sync` — reconcile the replica with the remote.
//! - `almanac steps|step|news` — read the replica, no network.
//! - `almanac syncs` — the sync audit log.
//! - `almanac register|trigger` — push plumbing.

mod format;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use almanac::config::Config;
use almanac::registration::TokenRegistrar;
use almanac::remote::{HttpRemote, RemoteSource};
use almanac::storage::Replica;
use almanac::sync::{SyncRequest, Synchronizer};
use almanac::trigger::{self, Trigger};

use format::{format_news, format_report, format_step, format_step_line, format_sync};

/// Almanac — a local replica of the itinerary and its news.
#[derive(Debug, Parser)]
#[command(name = "almanac", after_long_help = WORKFLOW_HELP)]
pub struct Cli {
    /// Replica database to use instead of the configured one.
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

const WORKFLOW_HELP: &str = r#"Workflow:
  1. almanac sync --if-necessary     first run: fetch everything
  2. almanac steps                   read the itinerary offline
  3. almanac step 3                  one step with its links
  4. almanac sync --forced           refresh on demand

Push plumbing:
  almanac register <token>
  almanac trigger '{"type":"syncRequested","forced":false}'"#;

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Request a sync and wait for its report.
    ///
    /// If a sync is already pending, nothing new is started.
    Sync {
        /// Mark the request as user-initiated.
        #[arg(long)]
        forced: bool,

        /// Only sync if a pending sync was left behind or none ever completed.
        #[arg(long, conflicts_with = "forced")]
        if_necessary: bool,
    },

    /// List steps in itinerary order.
    Steps,

    /// Show one step with its links.
    Step {
        /// Step position.
        position: i64,
    },

    /// List news, newest first.
    News,

    /// Inspect or prune the sync audit log.
    Syncs {
        #[command(subcommand)]
        command: SyncsCommand,
    },

    /// Post a registration token to the remote.
    Register {
        token: String,

        /// Post even if this token was already accepted.
        #[arg(long)]
        force: bool,
    },

    /// Feed a raw push message body, e.g. `{"type":"syncRequested"}`.
    Trigger {
        /// JSON message body.
        body: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum SyncsCommand {
    /// List sync records, oldest first.
    List,

    /// Show the last completed sync.
    Last,

    /// Delete old completed sync records.
    Prune {
        /// Completed records to keep. Defaults to `keep-syncs` from config.
        #[arg(long)]
        keep: Option<usize>,
    },
}

pub async fn run(cli: Cli, config: &Config) -> Result<(), String> {
    let path = match cli.database {
        Some(path) => path,
        None => config.database_path()?,
    };
    let replica = Replica::open(&path)
        .map_err(|e| format!("failed to open replica at {}: {e}", path.display()))?;

    match cli.command {
        Command::Sync {
            forced,
            if_necessary,
        } => {
            let sync = synchronizer(config, &replica)?;
            cmd_sync(&sync, forced, if_necessary).await
        }
        Command::Steps => cmd_steps(&replica),
        Command::Step { position } => cmd_step(&replica, position),
        Command::News => cmd_news(&replica),
        Command::Syncs { command } => match command {
            SyncsCommand::List => cmd_syncs_list(&replica),
            SyncsCommand::Last => cmd_syncs_last(&replica),
            SyncsCommand::Prune { keep } => {
                cmd_syncs_prune(&replica, keep.unwrap_or(config.keep_syncs))
            }
        },
        Command::Register { token, force } => {
            let registrar =
                TokenRegistrar::new(Arc::clone(&replica.registrations), remote(config)?);
            cmd_register(&registrar, &token, force).await
        }
        Command::Trigger { body } => {
            let sync = synchronizer(config, &replica)?;
            cmd_trigger(&sync, &body).await
        }
    }
}

fn remote(config: &Config) -> Result<Arc<dyn RemoteSource>, String> {
    let remote = HttpRemote::new(config.api_url()?, config.fetch_timeout())
        .map_err(|e| format!("failed to set up remote: {e}"))?;
    Ok(Arc::new(remote))
}

fn synchronizer(config: &Config, replica: &Replica) -> Result<Synchronizer, String> {
    Ok(Synchronizer::new(
        replica.clone(),
        remote(config)?,
        config.fetch_timeout(),
    ))
}

async fn cmd_sync(sync: &Synchronizer, forced: bool, if_necessary: bool) -> Result<(), String> {
    let request = if if_necessary {
        match sync
            .sync_if_necessary()
            .await
            .map_err(|e| format!("failed to check sync state: {e}"))?
        {
            Some(request) => request,
            None => {
                println!("Up to date");
                return Ok(());
            }
        }
    } else {
        sync.request_sync(forced)
            .await
            .map_err(|e| format!("failed to request sync: {e}"))?
    };
    wait_and_report(request).await
}

async fn wait_and_report(request: SyncRequest) -> Result<(), String> {
    if let SyncRequest::Coalesced(record) = &request {
        println!("{}", format_sync(record));
        eprintln!(
            "A sync is already pending. If no other process is running it, \
             resume it with `almanac sync --if-necessary`."
        );
        return Ok(());
    }

    let report = request
        .wait()
        .await
        .map_err(|e| format!("sync failed: {e}"))?
        .ok_or("sync did not start")?;
    print!("{}", format_report(&report));
    if report.is_clean() {
        Ok(())
    } else {
        Err("sync completed with errors".to_string())
    }
}

fn cmd_steps(replica: &Replica) -> Result<(), String> {
    let steps = replica
        .steps
        .get_all()
        .map_err(|e| format!("failed to list steps: {e}"))?;

    if steps.is_empty() {
        println!("No steps. Run `almanac sync` first.");
        return Ok(());
    }

    for step in &steps {
        println!("{}", format_step_line(step));
    }
    let completed = replica
        .steps
        .count_completed()
        .map_err(|e| format!("failed to count steps: {e}"))?;
    println!("\n{completed}/{} completed", steps.len());
    Ok(())
}

fn cmd_step(replica: &Replica, position: i64) -> Result<(), String> {
    let step = replica
        .steps
        .get_by_position(position)
        .map_err(|e| format!("failed to read step: {e}"))?
        .ok_or_else(|| format!("no step at position {position}"))?;
    let links = replica
        .steps
        .get_links_by_position(position)
        .map_err(|e| format!("failed to read links: {e}"))?;

    print!("{}", format_step(&step, &links));
    Ok(())
}

fn cmd_news(replica: &Replica) -> Result<(), String> {
    let news = replica
        .news
        .get_all()
        .map_err(|e| format!("failed to list news: {e}"))?;

    if news.is_empty() {
        println!("No news");
        return Ok(());
    }

    for item in &news {
        print!("{}", format_news(item));
    }
    Ok(())
}

fn cmd_syncs_list(replica: &Replica) -> Result<(), String> {
    let mut syncs = replica
        .syncs
        .get_all()
        .map_err(|e| format!("failed to list syncs: {e}"))?;
    syncs.sort_by_key(|s| s.time_created);

    if syncs.is_empty() {
        println!("No syncs");
        return Ok(());
    }

    for sync in &syncs {
        println!("{}", format_sync(sync));
    }
    Ok(())
}

fn cmd_syncs_last(replica: &Replica) -> Result<(), String> {
    match replica
        .syncs
        .last_successful()
        .map_err(|e| format!("failed to read syncs: {e}"))?
    {
        Some(sync) => println!("{}", format_sync(&sync)),
        None => println!("Never synced"),
    }
    Ok(())
}

fn cmd_syncs_prune(replica: &Replica, keep: usize) -> Result<(), String> {
    let pruned = replica
        .syncs
        .prune_completed(keep)
        .map_err(|e| format!("failed to prune syncs: {e}"))?;
    eprintln!("Pruned {pruned} sync record(s), kept the latest {keep}");
    Ok(())
}

async fn cmd_register(registrar: &TokenRegistrar, token: &str, force: bool) -> Result<(), String> {
    let accepted = registrar
        .register(token, force)
        .await
        .map_err(|e| format!("registration failed: {e}"))?;
    if accepted {
        println!("Registered");
    } else if force {
        return Err("remote refused the token".to_string());
    } else {
        println!("Already registered, or refused by the remote (use --force to post again)");
    }
    Ok(())
}

async fn cmd_trigger(sync: &Synchronizer, body: &str) -> Result<(), String> {
    let trigger = Trigger::from_json(body).map_err(|e| e.to_string())?;
    let dispatched = trigger::dispatch(sync, trigger)
        .await
        .map_err(|e| format!("failed to dispatch trigger: {e}"))?;

    if let Some(announcement) = &dispatched.announcement {
        println!("{}\n{}\n", announcement.title, announcement.message);
    }
    wait_and_report(dispatched.request).await
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn command_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn long_help_shows_trigger_example() {
        let help = Cli::command().render_long_help().to_string();

        assert!(help.contains(r#"almanac trigger '{"type":"syncRequested","forced":false}'"#));
    }

    #[test]
    fn parses_sync_flags() {
        let cli = Cli::try_parse_from(["almanac", "sync", "--forced"]).unwrap();

        assert!(matches!(
            cli.command,
            Command::Sync {
                forced: true,
                if_necessary: false,
            }
        ));
    }

    #[test]
    fn forced_and_if_necessary_conflict() {
        assert!(Cli::try_parse_from(["almanac", "sync", "--forced", "--if-necessary"]).is_err());
    }

    #[test]
    fn database_flag_is_global() {
        let cli = Cli::try_parse_from(["almanac", "steps", "--database", "/tmp/r.sqlite"]).unwrap();

        assert_eq!(cli.database, Some(PathBuf::from("/tmp/r.sqlite")));
    }

    #[test]
    fn prune_keep_is_optional() {
        let cli = Cli::try_parse_from(["almanac", "syncs", "prune"]).unwrap();

        assert!(matches!(
            cli.command,
            Command::Syncs {
                command: SyncsCommand::Prune { keep: None },
            }
        ));
    }
}
