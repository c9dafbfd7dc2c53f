//! LdapSync command-line tool.
//!
//! Provides the `sync` command that imports LDAP / Active Directory users
//! into the local user store, plus helpers for checking connectivity,
//! managing the location table that drives OU mapping, inspecting synced
//! users and the audit log, and generating / validating configuration files.

mod style;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use ldapsync_core::config::AppConfig;
use ldapsync_core::db::Database;
use ldapsync_core::directory::{DirectoryClient, LdapDirectory};
use ldapsync_core::location::LocationSelector;
use ldapsync_core::summary::{render_json_error, LineLevel, ReportMode};
use ldapsync_core::sync_engine::{SyncEngine, SyncOptions, SyncOutcome, SyncReport};

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// LdapSync command-line tool.
#[derive(Parser, Debug)]
#[command(
    name = "ldapsync",
    version,
    about = "Sync LDAP / Active Directory users into the local user store"
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(
        short,
        long,
        global = true,
        default_value = "/etc/ldapsync/config.toml"
    )]
    config: PathBuf,

    /// Override the configured log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Import users from the directory.
    Sync(SyncArgs),

    /// Connect and bind to the directory without importing anything.
    TestConnection,

    /// Manage locations and their OU mappings.
    Locations {
        #[command(subcommand)]
        action: LocationsAction,
    },

    /// Inspect local users.
    Users {
        #[command(subcommand)]
        action: UsersAction,
    },

    /// Generate a default configuration file.
    Init {
        /// Output path for the generated config file.
        #[arg(short, long, default_value = "./ldapsync.toml")]
        output: PathBuf,
    },

    /// Validate a configuration file.
    Validate,

    /// Show recent sync runs.
    Audit {
        /// Maximum number of entries to show.
        #[arg(short, long, default_value = "20")]
        limit: u32,
    },
}

#[derive(Args, Debug)]
struct SyncArgs {
    /// A location name to assign to every synced user.
    #[arg(long)]
    location: Option<String>,

    /// A location id to assign to every synced user.
    #[arg(long)]
    location_id: Option<String>,

    /// A different base DN to search under.
    #[arg(long)]
    base_dn: Option<String>,

    /// Print a summary line per user.
    #[arg(long)]
    summary: bool,

    /// Print the summary as a single JSON document.
    #[arg(long)]
    json_summary: bool,

    /// Run the sync without updating the database.
    #[arg(long)]
    dryrun: bool,
}

#[derive(Subcommand, Debug)]
enum LocationsAction {
    /// List all locations.
    List,
    /// Add a location.
    Add {
        /// Location name.
        #[arg(long)]
        name: String,

        /// OU whose members are placed at this location.
        #[arg(long)]
        ldap_ou: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum UsersAction {
    /// List local users, most recently changed first.
    List {
        /// Number of results.
        #[arg(long, default_value = "50")]
        limit: u32,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", style::error(&format!("Error: {:#}", e)));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let log_level = cli.log_level.as_deref();

    match cli.command {
        Commands::Init { output } => {
            init_tracing(log_level.unwrap_or("warn"));
            cmd_init(&output)?;
        }
        Commands::Validate => {
            init_tracing(log_level.unwrap_or("warn"));
            cmd_validate(&cli.config)?;
        }
        Commands::Sync(args) => {
            let config = match load_config(&cli.config, log_level) {
                Ok(config) => config,
                Err(e) if args.json_summary => {
                    println!("{}", render_json_error(&format!("{:#}", e)));
                    return Ok(ExitCode::FAILURE);
                }
                Err(e) => return Err(e),
            };
            return Ok(cmd_sync(&config, args));
        }
        Commands::TestConnection => {
            let config = load_config(&cli.config, log_level)?;
            cmd_test_connection(&config)?;
        }
        Commands::Locations { action } => {
            let config = load_config(&cli.config, log_level)?;
            cmd_locations(&open_database(&config)?, action)?;
        }
        Commands::Users { action } => {
            let config = load_config(&cli.config, log_level)?;
            cmd_users(&open_database(&config)?, action)?;
        }
        Commands::Audit { limit } => {
            let config = load_config(&cli.config, log_level)?;
            cmd_audit(&open_database(&config)?, limit)?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Logs go to stderr so `--json-summary` output on stdout stays parseable.
fn init_tracing(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

// ---------------------------------------------------------------------------
// Config helpers
// ---------------------------------------------------------------------------

/// Load, resolve and validate the config, then start logging at the
/// requested level (falling back to the configured one).
fn load_config(path: &Path, log_level: Option<&str>) -> Result<AppConfig> {
    let config = AppConfig::load_and_resolve(path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))?;
    init_tracing(log_level.unwrap_or(&config.app.log_level));
    Ok(config)
}

fn open_database(config: &AppConfig) -> Result<Database> {
    let db = Database::new(config.app.database_path()).context("failed to open database")?;
    db.initialize().context("failed to initialize database")?;
    Ok(db)
}

// ---------------------------------------------------------------------------
// sync
// ---------------------------------------------------------------------------

fn cmd_sync(config: &AppConfig, args: SyncArgs) -> ExitCode {
    let mode = ReportMode::from_flags(args.summary, args.json_summary);

    if !config.ldap.enabled {
        let msg = "LDAP integration is not enabled. Exiting sync process.";
        info!("{msg}");
        if mode != ReportMode::Json {
            println!("{msg}");
        }
        return ExitCode::SUCCESS;
    }

    let options = SyncOptions {
        location: LocationSelector::from_options(args.location, args.location_id),
        base_dn: args.base_dn,
        dry_run: args.dryrun,
    };

    match execute_sync(config, &options) {
        Ok(SyncOutcome::Disabled) => ExitCode::SUCCESS,
        Ok(SyncOutcome::Completed(report)) => {
            print_report(&report, mode);
            ExitCode::SUCCESS
        }
        Err(e) => {
            let message = format!("{:#}", e);
            error!(error = %message, "LDAP sync aborted");
            if mode == ReportMode::Json {
                println!("{}", render_json_error(&message));
            } else {
                eprintln!("{}", style::error(&message));
            }
            ExitCode::FAILURE
        }
    }
}

fn execute_sync(config: &AppConfig, options: &SyncOptions) -> Result<SyncOutcome> {
    let db = open_database(config)?;
    let directory = LdapDirectory::new(config.ldap.clone(), config.app.max_execution());
    let mut engine = SyncEngine::new(config.clone(), db, directory);
    Ok(engine.run(options)?)
}

fn print_report(report: &SyncReport, mode: ReportMode) {
    let summary = &report.summary;

    if report.dry_run {
        let table = format!(
            "{}\n{}",
            style::header("The following users will be synced!"),
            summary.render_table()
        );
        if mode == ReportMode::Json {
            eprintln!("{table}");
        } else {
            println!("{table}");
        }
    }

    match mode {
        ReportMode::Json => println!("{}", summary.render_json()),
        ReportMode::Text => {
            for line in summary.render_lines() {
                match line.level {
                    LineLevel::Info => println!("{}", line.text),
                    LineLevel::Error => eprintln!("{}", style::error(&line.text)),
                }
            }
        }
        ReportMode::Quiet => {
            let msg = format!(
                "{}: {} created, {} updated, {} failed, {} unchanged ({} fetched)",
                if report.dry_run { "Dry run complete" } else { "Sync complete" },
                summary.created_count(),
                summary.updated_count(),
                summary.error_count(),
                report.unchanged,
                report.fetched,
            );
            if summary.error_count() > 0 {
                println!("{}", style::warn(&msg));
            } else {
                println!("{}", style::success(&msg));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Other subcommands
// ---------------------------------------------------------------------------

fn cmd_test_connection(config: &AppConfig) -> Result<()> {
    if !config.ldap.enabled {
        println!("{}", style::warn("LDAP integration is not enabled."));
        return Ok(());
    }

    let mut directory = LdapDirectory::new(config.ldap.clone(), config.app.max_execution());
    directory
        .test_connection()
        .with_context(|| format!("could not bind to {}", config.ldap.url))?;

    println!(
        "{}",
        style::success(&format!(
            "Connected to {} as '{}'",
            config.ldap.url,
            if config.ldap.bind_dn.is_empty() {
                "anonymous"
            } else {
                &config.ldap.bind_dn
            }
        ))
    );
    Ok(())
}

fn cmd_locations(db: &Database, action: LocationsAction) -> Result<()> {
    match action {
        LocationsAction::List => {
            let locations = db.list_locations().context("failed to list locations")?;
            if locations.is_empty() {
                println!("No locations found.");
                return Ok(());
            }

            let mut table = Table::new();
            table.load_preset(UTF8_FULL);
            table.set_content_arrangement(ContentArrangement::Dynamic);
            table.set_header(vec!["ID", "Name", "LDAP OU"]);
            for location in &locations {
                table.add_row(vec![
                    Cell::new(location.id),
                    Cell::new(&location.name),
                    Cell::new(location.ldap_ou.as_deref().unwrap_or("-")),
                ]);
            }
            println!("{table}");
            Ok(())
        }
        LocationsAction::Add { name, ldap_ou } => {
            let ldap_ou = ldap_ou.as_deref().map(str::trim).filter(|ou| !ou.is_empty());
            let id = db
                .insert_location(&name, ldap_ou)
                .with_context(|| format!("failed to add location '{}'", name))?;
            println!("{}", style::success(&format!("Location '{}' added with id {}", name, id)));
            Ok(())
        }
    }
}

fn cmd_users(db: &Database, action: UsersAction) -> Result<()> {
    match action {
        UsersAction::List { limit } => {
            let users = db.list_users(limit).context("failed to list users")?;
            if users.is_empty() {
                println!("No users found.");
                return Ok(());
            }

            let mut table = Table::new();
            table.load_preset(UTF8_FULL);
            table.set_content_arrangement(ContentArrangement::Dynamic);
            table.set_header(vec![
                "Username", "Name", "Email", "Employee #", "Location Id", "Active", "Source",
            ]);
            for user in &users {
                table.add_row(vec![
                    Cell::new(&user.username),
                    Cell::new(format!("{} {}", user.first_name, user.last_name).trim()),
                    Cell::new(&user.email),
                    Cell::new(&user.employee_number),
                    Cell::new(user.location_id.map(|id| id.to_string()).unwrap_or_default()),
                    Cell::new(if user.activated { "yes" } else { "no" }),
                    Cell::new(user.import_source.map(|s| s.as_str()).unwrap_or("manual")),
                ]);
            }
            println!("{table}");
            println!();
            println!(
                "{}",
                style::dim(&format!("{} of {} user(s) shown", users.len(), db.count_users()?))
            );
            Ok(())
        }
    }
}

fn cmd_audit(db: &Database, limit: u32) -> Result<()> {
    let entries = db
        .list_audit_log(limit)
        .context("failed to list audit entries")?;

    if entries.is_empty() {
        println!("No audit log entries found.");
        return Ok(());
    }

    println!("{:<34} {:<12} DETAILS", "TIMESTAMP", "ACTION");
    println!("{}", "-".repeat(90));

    for entry in &entries {
        println!(
            "{:<34} {:<12} {}",
            entry.created_at,
            entry.action,
            entry.details.as_deref().unwrap_or(""),
        );
    }

    println!();
    println!("{} entries shown", entries.len());

    Ok(())
}

fn cmd_init(output: &Path) -> Result<()> {
    let default_config = r#"# LdapSync Configuration
# See documentation for all available options.

[app]
data_dir = "/var/lib/ldapsync"
log_level = "info"
max_execution_secs = 600

[ldap]
enabled = true
url = "ldaps://ad.example.com:636"
bind_dn = "cn=ldapsync,ou=service,dc=example,dc=com"
bind_password_env = "LDAP_BIND_PASSWORD"
base_dn = "dc=example,dc=com"
filter = "(&(objectClass=user)(cn=*))"
starttls = false
page_size = 500
is_ad = true

[ldap.attributes]
username = "samaccountname"
first_name = "givenname"
last_name = "sn"
email = "mail"
employee_number = "employeenumber"
# active_flag = "useraccountcontrol"
"#;

    if output.exists() {
        anyhow::bail!(
            "file already exists: {}. Use a different path or remove the existing file.",
            output.display()
        );
    }

    std::fs::write(output, default_config).context("failed to write config file")?;

    println!("Default configuration written to {}", output.display());
    println!();
    println!("Next steps:");
    println!("  1. Edit the config file with your directory details");
    println!("  2. Set the referenced environment variable (LDAP_BIND_PASSWORD)");
    println!(
        "  3. Validate with: ldapsync validate --config {}",
        output.display()
    );
    println!(
        "  4. Preview a sync: ldapsync sync --dryrun --config {}",
        output.display()
    );

    Ok(())
}

fn cmd_validate(config_path: &Path) -> Result<()> {
    println!("Validating configuration: {}", config_path.display());
    println!();

    let mut config =
        AppConfig::load_from_file(config_path).context("failed to parse configuration")?;
    println!("  [OK] TOML structure is valid");

    let _ = config.resolve_env_vars();
    println!("  [OK] Environment variable references processed");

    match config.validate() {
        Ok(()) => {
            println!("  [OK] All required fields are valid");
        }
        Err(e) => {
            println!("  [FAIL] Validation error: {}", e);
            anyhow::bail!("configuration validation failed");
        }
    }

    println!();
    println!("Configuration summary:");
    println!(
        "  LDAP enabled  : {}",
        if config.ldap.enabled { "yes" } else { "no" }
    );
    println!("  LDAP URL      : {}", config.ldap.url);
    println!("  Bind DN       : {}", config.ldap.bind_dn);
    println!(
        "  Bind password : {}",
        if config.ldap.bind_password.is_some() {
            "set"
        } else {
            "NOT SET"
        }
    );
    println!("  Base DN       : {}", config.ldap.base_dn);
    println!("  Filter        : {}", config.ldap.filter);
    println!(
        "  Active flag   : {}",
        config
            .ldap
            .attributes
            .effective_active_flag(config.ldap.is_ad)
            .unwrap_or("none (all users activated)")
    );
    println!("  Data directory: {}", config.app.data_dir.display());
    println!("  Time budget   : {}s", config.app.max_execution_secs);
    println!();
    println!("Configuration is valid.");

    Ok(())
}
