//! `healthtrack` - web server and maintenance CLI
//!
//! Every subcommand except `config` opens the database through a
//! [`Tracker`], the same service the web handlers use.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use chrono::{Local, NaiveDate, Utc};
use clap::Parser;

use healthtrack::cli::{
    BackupCommand, Cli, Command, ConfigCommand, ExportCommand, FoodCommand, OutputFormat,
    RemindersCommand, UserCommand,
};
use healthtrack::export::report_filename;
use healthtrack::food::NewFood;
use healthtrack::notification::{parse_reminder_time, truncate_to_minute};
use healthtrack::user::{Registration, Role};
use healthtrack::{init_logging, web, Config, Tracker};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    if let Command::Config(config_cmd) = cli.command {
        return handle_config(cli.config, config_cmd);
    }

    let mut config = Config::load_from(cli.config.clone())
        .with_context(|| "failed to load configuration")?;
    if let Command::Serve { bind: Some(bind) } = &cli.command {
        config.server.bind_address.clone_from(bind);
        config.validate()?;
    }

    let tracker = Tracker::open(config).with_context(|| "failed to open the database")?;

    match cli.command {
        Command::Serve { .. } => web::serve(Arc::new(tracker)).await?,
        Command::Status(status_cmd) => handle_status(&tracker, status_cmd.json).await?,
        Command::User(user_cmd) => handle_user(&tracker, user_cmd).await?,
        Command::Backup(backup_cmd) => handle_backup(&tracker, backup_cmd).await?,
        Command::Reminders(reminders_cmd) => handle_reminders(&tracker, reminders_cmd).await?,
        Command::Export(export_cmd) => handle_export(&tracker, export_cmd).await?,
        Command::Food(food_cmd) => handle_food(&tracker, food_cmd).await?,
        Command::Config(_) => {}
    }
    Ok(())
}

async fn handle_status(tracker: &Tracker, json: bool) -> anyhow::Result<()> {
    let stats = tracker.stats().await?;
    let backups = tracker.list_backups()?;
    let config = tracker.config();

    if json {
        let status = serde_json::json!({
            "database_path": config.database_path(),
            "backup_dir": config.backup_dir(),
            "backups": backups.len(),
            "stats": stats,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("healthtrack status");
        println!("------------------");
        println!("Database:       {}", config.database_path().display());
        println!("Size:           {} bytes", stats.db_size_bytes);
        println!("Users:          {}", stats.total_users);
        println!("Records:        {}", stats.total_records);
        if let (Some(oldest), Some(newest)) = (stats.oldest_record, stats.newest_record) {
            println!("Record dates:   {oldest} to {newest}");
        }
        println!(
            "Notifications:  {} ({} unread)",
            stats.total_notifications, stats.unread_notifications
        );
        println!("Sessions:       {}", stats.active_sessions);
        println!(
            "Backups:        {} in {}",
            backups.len(),
            config.backup_dir().display()
        );
    }
    Ok(())
}

async fn handle_user(tracker: &Tracker, cmd: UserCommand) -> anyhow::Result<()> {
    match cmd {
        UserCommand::Create {
            username,
            email,
            password,
            first_name,
            last_name,
            role,
        } => {
            let form = Registration {
                username,
                email,
                first_name,
                last_name,
                password1: password.clone(),
                password2: password,
            };
            let user = tracker.create_user(&form, Role::from(role)).await?;
            println!("Created {} ({}) with id {}", user.username, user.role.label(), user.id);
        }
        UserCommand::List { role, format } => {
            let users = tracker.list_users(role.map(Role::from)).await?;
            match format {
                OutputFormat::Json => {
                    // Password hashes stay out of listings.
                    let listed: Vec<_> = users
                        .iter()
                        .map(|u| {
                            serde_json::json!({
                                "id": u.id,
                                "username": u.username,
                                "email": u.email,
                                "role": u.role,
                                "date_joined": u.date_joined,
                                "last_login": u.last_login,
                                "locked": u.is_locked(Utc::now()),
                            })
                        })
                        .collect();
                    println!("{}", serde_json::to_string_pretty(&listed)?);
                }
                OutputFormat::Table => {
                    println!(
                        "{:<6} {:<20} {:<30} {:<8} {}",
                        "ID", "USERNAME", "EMAIL", "ROLE", "JOINED"
                    );
                    for user in &users {
                        println!(
                            "{:<6} {:<20} {:<30} {:<8} {}{}",
                            user.id,
                            user.username,
                            user.email,
                            user.role.code(),
                            user.date_joined.format("%Y-%m-%d"),
                            if user.is_locked(Utc::now()) { "  (locked)" } else { "" }
                        );
                    }
                }
            }
        }
        UserCommand::Unlock { username } => {
            let user = tracker.unlock_user(&username).await?;
            println!("Unlocked {}", user.username);
        }
    }
    Ok(())
}

async fn handle_backup(tracker: &Tracker, cmd: BackupCommand) -> anyhow::Result<()> {
    match cmd {
        BackupCommand::Create => {
            let path = tracker.create_backup(Local::now()).await?;
            println!("Backup written to {}", path.display());
        }
        BackupCommand::List { format } => {
            let backups = tracker.list_backups()?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&backups)?),
                OutputFormat::Table if backups.is_empty() => println!("No backups found."),
                OutputFormat::Table => {
                    for backup in &backups {
                        println!("{:<45} {:>12} bytes", backup.filename, backup.size);
                    }
                }
            }
        }
        BackupCommand::Restore { file, yes } => {
            if !yes {
                println!("This will replace ALL data with the contents of {}.", file.display());
                println!("Use --yes to confirm.");
                return Ok(());
            }
            let info = tracker.restore_backup(&file).await?;
            println!(
                "Restored backup {}: {} users, {} records, {} notifications",
                info.timestamp, info.users, info.health_records, info.notifications
            );
        }
    }
    Ok(())
}

async fn handle_reminders(tracker: &Tracker, cmd: RemindersCommand) -> anyhow::Result<()> {
    match cmd {
        RemindersCommand::Send { at } => {
            let at = match at {
                Some(text) => parse_reminder_time(&text)?,
                None => truncate_to_minute(Local::now().time()),
            };
            let sent = tracker.dispatch_reminders(at).await?;
            println!("Sent {sent} reminder(s) for {}", at.format("%H:%M"));
        }
        RemindersCommand::WeeklySummary => {
            let sent = tracker
                .weekly_summaries(Local::now().date_naive(), Utc::now())
                .await?;
            println!("Posted {sent} weekly summary notification(s)");
        }
    }
    Ok(())
}

fn parse_date(text: Option<&str>, flag: &str) -> anyhow::Result<Option<NaiveDate>> {
    text.map(|t| {
        NaiveDate::parse_from_str(t, "%Y-%m-%d")
            .with_context(|| format!("--{flag} must be YYYY-MM-DD, got {t}"))
    })
    .transpose()
}

fn write_output(path: Option<&Path>, bytes: &[u8]) -> anyhow::Result<()> {
    match path {
        Some(path) => {
            std::fs::write(path, bytes)
                .with_context(|| format!("failed to write {}", path.display()))?;
            eprintln!("Wrote {}", path.display());
        }
        None => std::io::stdout().write_all(bytes)?,
    }
    Ok(())
}

async fn handle_export(tracker: &Tracker, cmd: ExportCommand) -> anyhow::Result<()> {
    let today = Local::now().date_naive();
    match cmd {
        ExportCommand::Csv {
            username,
            start,
            end,
            output,
        } => {
            let start = parse_date(start.as_deref(), "start")?;
            let end = parse_date(end.as_deref(), "end")?;
            if let (Some(s), Some(e)) = (start, end) {
                if s > e {
                    bail!("--start ({s}) is after --end ({e})");
                }
            }
            let user = tracker.user_by_username(&username).await?;
            let body = tracker.export_csv(&user, start, end).await?;
            write_output(output.as_deref(), body.as_bytes())?;
        }
        ExportCommand::Json { username, output } => {
            let user = tracker.user_by_username(&username).await?;
            let (filename, body) = tracker.export_json(&user, user.id, Local::now()).await?;
            let path = output.unwrap_or_else(|| PathBuf::from(filename));
            write_output(Some(&path), body.as_bytes())?;
        }
        ExportCommand::Report {
            username,
            pdf,
            output,
        } => {
            let user = tracker.user_by_username(&username).await?;
            let (bytes, extension) = if pdf {
                (tracker.report_pdf(&user, today).await?, "pdf")
            } else {
                let html = tracker.report(&user, today).await?.to_html();
                (html.into_bytes(), "html")
            };
            let path = output.unwrap_or_else(|| PathBuf::from(report_filename(today, extension)));
            write_output(Some(&path), &bytes)?;
        }
    }
    Ok(())
}

async fn handle_food(tracker: &Tracker, cmd: FoodCommand) -> anyhow::Result<()> {
    match cmd {
        FoodCommand::Add {
            name,
            description,
            calories,
        } => {
            let id = tracker
                .add_food(
                    NewFood {
                        name,
                        description,
                        calories,
                    },
                    Utc::now(),
                )
                .await?;
            println!("Added food recommendation {id}");
        }
        FoodCommand::List => {
            let foods = tracker.foods().await?;
            if foods.is_empty() {
                println!("No food recommendations yet.");
            }
            for food in &foods {
                let calories = food.calories.map(|c| format!(" ({c} kcal)")).unwrap_or_default();
                println!("{:>4}  {}{}", food.id, food.name, calories);
                if !food.description.is_empty() {
                    println!("      {}", food.description);
                }
            }
        }
    }
    Ok(())
}

fn handle_config(path: Option<PathBuf>, cmd: ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            let mut config = Config::load_from(path)?;
            if config.mail.smtp_password.is_some() {
                config.mail.smtp_password = Some("********".to_string());
            }
            if json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Server]");
                println!("  Bind address:       {}", config.server.bind_address);
                println!("  Base URL:           {}", config.server.base_url);
                println!("  Session TTL (h):    {}", config.server.session_ttl_hours);
                println!("  Secure cookies:     {}", config.server.secure_cookies);
                println!();
                println!("[Storage]");
                println!("  Database path:      {}", config.database_path().display());
                println!("  Backup dir:         {}", config.backup_dir().display());
                println!("  Max backups:        {}", config.backup.max_backups);
                println!();
                println!("[Security]");
                println!("  Max failed logins:  {}", config.security.max_failed_logins);
                println!("  Lockout (min):      {}", config.security.lockout_minutes);
                println!(
                    "  Rate limit:         {} per {}s",
                    config.security.rate_limit_requests, config.security.rate_limit_window_secs
                );
                println!();
                println!("[Reminders]");
                println!("  Enabled:            {}", config.reminders.enabled);
                println!("  Check every (s):    {}", config.reminders.check_interval_secs);
                println!();
                println!("[Mail]");
                println!(
                    "  SMTP host:          {}",
                    config.mail.smtp_host.as_deref().unwrap_or("(log only)")
                );
                println!("  From:               {}", config.mail.from_address);
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.or(path).unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => bail!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}
