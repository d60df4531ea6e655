use std::path::PathBuf;

use anyhow::{Context, bail};
use chrono::Utc;
use clap::{Parser, Subcommand};
use shopsync::{
    CloudConfig, CollectionStatus, ConflictPolicy, Notice, PushOutcome, RestorePolicy, ShopSync,
    ShopSyncBuilder, SyncReport, SyncSettings, backup,
};
use tokio::sync::broadcast;

#[derive(Parser)]
#[command(name = "shopsync")]
#[command(about = "Local-first shop records with optional cloud mirroring")]
struct Cli {
    /// Local store location.
    #[arg(long, env = "SHOPSYNC_DATABASE_URL", default_value = "sqlite://shopsync.db?mode=rwc")]
    database_url: String,

    /// Ask before pushing local data into an empty cloud table.
    #[arg(long)]
    confirm_restore: bool,

    /// Keep the local copy of a record when its `updatedAt` is newer than the cloud's.
    #[arg(long)]
    latest_update_wins: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Archive old finished tasks and reconcile with the cloud.
    Sync {
        /// Reconcile only; skip archiving and report unreachable tables.
        #[arg(long)]
        manual: bool,
    },
    /// Show record counts, cloud state and the last sync time.
    Status,
    /// Save cloud credentials.
    Configure {
        #[arg(long)]
        url: String,
        #[arg(long)]
        key: String,
    },
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "SHOPSYNC_PASSWORD", hide_env_values = true)]
        password: String,
    },
    Logout,
    /// Check that the cloud credentials can read the customers table.
    TestConnection,
    /// Upload all local customers and tasks to the cloud.
    Push,
    /// Write customers and tasks to a JSON backup.
    Export {
        /// Defaults to crm_backup_YYYY-MM-DD.json in the current directory.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Replace local customers and tasks with a backup's contents.
    Import {
        path: PathBuf,
        /// Required: the import overwrites local data.
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init();

    let cli = Cli::parse();
    let settings = SyncSettings {
        restore_policy: if cli.confirm_restore {
            RestorePolicy::RequireConfirmation
        } else {
            RestorePolicy::AutoPush
        },
        conflict_policy: if cli.latest_update_wins {
            ConflictPolicy::LatestUpdate
        } else {
            ConflictPolicy::RemoteWins
        },
        ..SyncSettings::default()
    };

    let mut app = ShopSyncBuilder::new(&cli.database_url)
        .with_settings(settings)
        .build()
        .await
        .with_context(|| format!("opening local store at {}", cli.database_url))?;
    let mut notices = app.subscribe();

    let result = run(&mut app, cli.cmd).await;
    print_notices(&mut notices);
    result
}

async fn run(app: &mut ShopSync, cmd: Command) -> anyhow::Result<()> {
    match cmd {
        Command::Sync { manual } => {
            let report = if manual {
                app.sync_now(Utc::now()).await?
            } else {
                app.startup_sync(Utc::now()).await?
            };
            print_report(&report);
        }
        Command::Status => {
            let state = app.state();
            println!("customers:      {}", state.customers.len());
            println!("tasks:          {}", state.tasks.len());
            println!("archived tasks: {}", state.archived_tasks.len());
            println!("cloud:          {}", if app.is_cloud_active() { "active" } else { "inactive" });
            match app.session().await.and_then(|s| s.email) {
                Some(email) => println!("signed in as:   {email}"),
                None => println!("signed in as:   -"),
            }
            let last_sync = app.store().last_sync().await?;
            if last_sync.is_never() {
                println!("last sync:      never");
            } else {
                let at = chrono::DateTime::from_timestamp_millis(last_sync.millis());
                println!("last sync:      {}", at.map(|t| t.to_rfc3339()).unwrap_or_default());
            }
            println!("stored bytes:   {}", app.store().usage_bytes().await?);
        }
        Command::Configure { url, key } => {
            let config = CloudConfig::new(url, key);
            if !config.is_configured() {
                bail!("both --url and --key must be non-empty");
            }
            app.save_cloud_config(config).await?;
            println!("Cloud settings saved. Run `shopsync login` to sign in.");
        }
        Command::Login { email, password } => {
            let session = app.sign_in(&email, &password).await?;
            println!("Signed in as {}", session.email.unwrap_or(email));
        }
        Command::Logout => {
            app.sign_out().await?;
            println!("Signed out");
        }
        Command::TestConnection => {
            app.test_connection().await?;
            println!("Connection OK");
        }
        Command::Push => {
            for (collection, outcome) in app.push_local_to_cloud().await? {
                println!("{collection}: {}", describe_push(&outcome));
            }
        }
        Command::Export { out } => {
            let now = Utc::now();
            let path = out.unwrap_or_else(|| PathBuf::from(backup::file_name(now)));
            let json = app.export_backup(now).to_json_pretty()?;
            std::fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
            println!("Backup written to {}", path.display());
        }
        Command::Import { path, yes } => {
            if !yes {
                bail!("import overwrites local customers and tasks; pass --yes to continue");
            }
            let bytes = std::fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
            let snapshot = backup::parse_backup(&bytes)?;
            let imported = app.import_backup(snapshot).await?;
            println!(
                "Imported {} customers and {} tasks",
                imported.customers, imported.tasks
            );
        }
    }
    Ok(())
}

fn print_report(report: &SyncReport) {
    if report.archived > 0 {
        println!("archived {} completed tasks", report.archived);
    }
    if let Some(reason) = report.skipped {
        println!("reconciliation skipped: {reason:?}");
        return;
    }
    for sync in &report.collections {
        match &sync.status {
            CollectionStatus::RemoteUnavailable => println!("{}: cloud unavailable", sync.collection),
            CollectionStatus::Merged {
                records,
                local_only,
                restore,
                push,
                checkpoint_saved,
            } => println!(
                "{}: {records} records, {local_only} local-only{}, {}{}",
                sync.collection,
                if *restore { " (restore)" } else { "" },
                describe_push(push),
                if *checkpoint_saved { "" } else { ", sync time not saved" }
            ),
        }
    }
}

fn describe_push(outcome: &PushOutcome) -> String {
    match outcome {
        PushOutcome::NotNeeded => "nothing to push".to_string(),
        PushOutcome::Pushed { records } => format!("pushed {records}"),
        PushOutcome::Deferred => "push waiting for `shopsync push`".to_string(),
        PushOutcome::Failed { reason } => format!("push failed: {reason}"),
    }
}

fn print_notices(notices: &mut broadcast::Receiver<Notice>) {
    while let Ok(notice) = notices.try_recv() {
        eprintln!("! {notice}");
    }
}
