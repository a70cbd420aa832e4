//! safeledger operator CLI
//!
//! Runs schema migrations and prints read-only ledger reports against the configured
//! PostgreSQL database.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use rust_decimal::Decimal;
use safeledger::connection::connect;
use safeledger::executor::PgExecutor;
use safeledger::migration::Migrator;
use safeledger::{
    Ledger, LedgerConfig, Obligation, ObligationKind, OwnershipPath, PartnerId, PgStore, SafeId,
    UnitId,
};
use std::process;

#[derive(Parser)]
#[command(name = "safeledger")]
#[command(about = "Operator tool for the safeledger back-office ledger")]
#[command(version)]
struct Cli {
    /// Database connection URL (overrides config and SAFELEDGER__DATABASE__URL)
    #[arg(long)]
    database_url: Option<String>,

    /// Configuration file
    #[arg(long, default_value = safeledger::config::DEFAULT_CONFIG_PATH)]
    config: String,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the ledger schema
    Migrate {
        #[command(subcommand)]
        action: MigrateAction,
    },

    /// List active safes with their balances
    Safes,

    /// Recompute a safe's balance from its movements
    Reconcile {
        #[arg(long)]
        safe: SafeId,
    },

    /// Profit and loss of one unit
    UnitPl {
        #[arg(long)]
        unit: UnitId,
    },

    /// Investment and revenue share of one partner, per ownership path
    PartnerShare {
        #[arg(long)]
        partner: PartnerId,
    },

    /// Broker dues and partner debts
    Obligations {
        #[command(subcommand)]
        report: ObligationReport,
    },
}

#[derive(Subcommand)]
enum MigrateAction {
    /// Apply pending migrations
    Up {
        /// Number of migrations to apply (default: all pending)
        #[arg(long)]
        steps: Option<usize>,
    },
    /// Revert applied migrations, newest first
    Down {
        #[arg(long, default_value = "1")]
        steps: usize,
    },
    /// Show applied and pending migrations
    Status,
}

#[derive(Subcommand)]
enum ObligationReport {
    /// Counts and sums per status
    Stats {
        #[arg(long, value_enum)]
        kind: KindArg,
        /// Judge overdue as of this date (default: today, UTC)
        #[arg(long)]
        as_of: Option<NaiveDate>,
    },
    /// Pending and past due
    Overdue {
        #[arg(long, value_enum)]
        kind: KindArg,
        #[arg(long)]
        as_of: Option<NaiveDate>,
    },
    /// Pending and due within the window
    Upcoming {
        #[arg(long, value_enum)]
        kind: KindArg,
        /// Window in days (default: ledger.upcoming_window_days)
        #[arg(long)]
        days: Option<u32>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    BrokerDue,
    PartnerDebt,
}

impl From<KindArg> for ObligationKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::BrokerDue => ObligationKind::BrokerDue,
            KindArg::PartnerDebt => ObligationKind::PartnerDebt,
        }
    }
}

fn main() {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if let Err(e) = run(cli) {
        eprintln!("{} {:#}", "error:".red().bold(), e);
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = LedgerConfig::load_from(&cli.config).context("loading configuration")?;
    if let Some(url) = cli.database_url {
        config.database.url = url;
    }

    match cli.command {
        Commands::Migrate { action } => handle_migrate(&config, action),
        Commands::Safes => print_safes(&open_ledger(&config)?),
        Commands::Reconcile { safe } => print_reconciliation(&open_ledger(&config)?, safe),
        Commands::UnitPl { unit } => print_unit_pl(&open_ledger(&config)?, unit),
        Commands::PartnerShare { partner } => print_partner_share(&open_ledger(&config)?, partner),
        Commands::Obligations { report } => handle_obligations(&open_ledger(&config)?, report),
    }
}

fn open_ledger(config: &LedgerConfig) -> Result<Ledger<PgStore>> {
    let store = PgStore::connect(config).context("opening connection pool")?;
    Ok(Ledger::with_settings(store, config.ledger.clone()))
}

fn handle_migrate(config: &LedgerConfig, action: MigrateAction) -> Result<()> {
    let client = connect(&config.database.url).context("connecting to database")?;
    let executor = PgExecutor::new(client);
    let migrator = Migrator::ledger();

    match action {
        MigrateAction::Up { steps } => {
            let applied = migrator.up(&executor, steps)?;
            if applied.is_empty() {
                println!("{}", "Schema is up to date".green());
            }
            for record in applied {
                println!(
                    "  {} {}_{} ({}ms)",
                    "applied".green(),
                    record.version,
                    record.name,
                    record.execution_time_ms.unwrap_or_default()
                );
            }
        }
        MigrateAction::Down { steps } => {
            for record in migrator.down(&executor, steps)? {
                println!("  {} {}_{}", "reverted".yellow(), record.version, record.name);
            }
        }
        MigrateAction::Status => {
            let status = migrator.status(&executor)?;
            println!("{}", "Applied".bold());
            for record in &status.applied {
                println!(
                    "  {} {}_{} at {}",
                    "✓".green(),
                    record.version,
                    record.name,
                    record.applied_at.format("%Y-%m-%d %H:%M:%S")
                );
            }
            println!("{}", "Pending".bold());
            for pending in &status.pending {
                println!("  {} {}_{}", "…".yellow(), pending.version, pending.name);
            }
            println!(
                "\n{} applied, {} pending",
                status.applied.len(),
                status.pending.len()
            );
        }
    }
    Ok(())
}

fn print_safes(ledger: &Ledger<PgStore>) -> Result<()> {
    println!("{:<38} {:<24} {:>16}", "ID".bold(), "NAME".bold(), "BALANCE".bold());
    for safe in ledger.safes().list()? {
        println!("{:<38} {:<24} {:>16}", safe.id, safe.name, money(safe.balance));
    }
    Ok(())
}

fn print_reconciliation(ledger: &Ledger<PgStore>, safe: SafeId) -> Result<()> {
    let report = ledger.safes().reconcile(safe)?;
    println!("recorded   {:>16}", money(report.recorded));
    println!("computed   {:>16}", money(report.computed));
    let difference = money(report.difference);
    if report.is_balanced() {
        println!("difference {:>16}  {}", difference, "balanced".green());
    } else {
        println!("difference {:>16}  {}", difference, "MISMATCH".red().bold());
    }
    Ok(())
}

fn print_unit_pl(ledger: &Ledger<PgStore>, unit: UnitId) -> Result<()> {
    let pl = ledger.revenue().unit_profit_loss(unit)?;
    println!("investment {:>16}", money(pl.investment));
    println!("revenue    {:>16}", money(pl.revenue));
    let profit = format!("{:>16}", money(pl.profit));
    if pl.profit < Decimal::ZERO {
        println!("profit     {}", profit.red());
    } else {
        println!("profit     {}", profit.green());
    }
    println!("roi        {:>15}%", pl.roi_percent.to_string());
    Ok(())
}

fn print_partner_share(ledger: &Ledger<PgStore>, partner: PartnerId) -> Result<()> {
    let lines = ledger.revenue().partner_breakdown(partner)?;
    println!(
        "{:<38} {:<10} {:>8} {:>16} {:>16}",
        "UNIT".bold(),
        "PATH".bold(),
        "%".bold(),
        "REVENUE".bold(),
        "SHARE".bold()
    );
    for line in &lines {
        let path = match line.path {
            OwnershipPath::Direct { .. } => "direct",
            OwnershipPath::Group { .. } => "group",
        };
        println!(
            "{:<38} {:<10} {:>8} {:>16} {:>16}",
            line.unit_id,
            path,
            line.percentage.to_string(),
            money(line.revenue),
            money(line.partner_revenue)
        );
    }
    let total = ledger.revenue().partner_share(partner)?;
    println!(
        "\ninvestment {}  revenue {}  share {}%  partner revenue {}",
        money(total.investment),
        money(total.revenue),
        total.share,
        money(total.partner_revenue).bold()
    );
    Ok(())
}

fn handle_obligations(ledger: &Ledger<PgStore>, report: ObligationReport) -> Result<()> {
    let tracker = ledger.obligations();
    match report {
        ObligationReport::Stats { kind, as_of } => {
            let kind = ObligationKind::from(kind);
            let stats = match as_of {
                Some(date) => tracker.stats(kind, date)?,
                None => tracker.stats_today(kind)?,
            };
            println!("total    {:>6} {:>16}", stats.total_count, money(stats.total_amount));
            println!("pending  {:>6} {:>16}", stats.pending_count, money(stats.pending_amount));
            println!("paid     {:>6} {:>16}", stats.paid_count, money(stats.paid_amount));
            println!(
                "{}  {:>6} {:>16}",
                "overdue".red(),
                stats.overdue_count,
                money(stats.overdue_amount)
            );
        }
        ObligationReport::Overdue { kind, as_of } => {
            let kind = ObligationKind::from(kind);
            let rows = match as_of {
                Some(date) => tracker.overdue(kind, date)?,
                None => tracker.overdue_today(kind)?,
            };
            print_obligations(&rows);
        }
        ObligationReport::Upcoming { kind, days } => {
            let kind = ObligationKind::from(kind);
            let rows = match days {
                Some(days) => tracker.upcoming(kind, chrono::Utc::now().date_naive(), days)?,
                None => tracker.upcoming_default(kind)?,
            };
            print_obligations(&rows);
        }
    }
    Ok(())
}

fn print_obligations(rows: &[Obligation]) {
    if rows.is_empty() {
        println!("{}", "Nothing due".green());
        return;
    }
    println!(
        "{:<38} {:<38} {:<10} {:>16}",
        "ID".bold(),
        "PARTY".bold(),
        "DUE".bold(),
        "AMOUNT".bold()
    );
    for o in rows {
        println!(
            "{:<38} {:<38} {:<10} {:>16}",
            o.id,
            o.party.uuid(),
            o.due_date,
            money(o.amount)
        );
    }
}

fn money(amount: Decimal) -> String {
    format!("{:.2}", amount)
}
