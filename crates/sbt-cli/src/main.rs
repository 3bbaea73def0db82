use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "sbt")]
#[command(about = "Screened-universe backtest CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> overrides)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Backtest commands
    Backtest {
        #[command(subcommand)]
        cmd: BacktestCmd,
    },

    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },
}

#[derive(Subcommand)]
enum BacktestCmd {
    /// Run one backtest and write exports/<run_id>/.
    Run {
        /// Layered config paths in merge order
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,

        /// Fundamentals CSV. Without it, fundamentals are read from SBT_DATABASE_URL.
        #[arg(long)]
        fundamentals: Option<String>,

        /// Long-format price CSV (ticker,date,close)
        #[arg(long, conflicts_with = "twelvedata", required_unless_present = "twelvedata")]
        prices: Option<String>,

        /// Fetch prices from TwelveData (key from TWELVEDATA_API_KEY)
        #[arg(long, default_value_t = false)]
        twelvedata: bool,

        /// Root directory for run exports
        #[arg(long, default_value = "exports")]
        exports: String,

        /// Fail on config keys the backtest does not read (default: warn)
        #[arg(long = "strict-keys", default_value_t = false)]
        strict_keys: bool,

        /// Also store the finished run in SBT_DATABASE_URL
        #[arg(long, default_value_t = false)]
        persist: bool,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,

    /// Apply SQL migrations.
    Migrate,

    /// Upsert a fundamentals CSV into the fundamentals table.
    ImportFundamentals {
        #[arg(long)]
        csv: String,
    },

    /// Print a stored run's equity curve as date,value,drawdown CSV.
    ExportRun {
        #[arg(long)]
        run_id: String,

        /// Write to this file instead of stdout
        #[arg(long)]
        out: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    init_tracing();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = sbt_config::load_layered_yaml(&path_refs)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::Backtest { cmd } => match cmd {
            BacktestCmd::Run {
                config_paths,
                fundamentals,
                prices,
                twelvedata,
                exports,
                strict_keys,
                persist,
            } => {
                commands::backtest::backtest_run(commands::backtest::BacktestRunArgs {
                    config_paths,
                    fundamentals,
                    prices,
                    twelvedata,
                    exports,
                    strict_keys,
                    persist,
                })
                .await?;
            }
        },

        Commands::Db { cmd } => {
            let pool = sbt_db::connect_from_env().await?;
            match cmd {
                DbCmd::Status => {
                    let s = sbt_db::status(&pool).await?;
                    println!(
                        "db_ok={} has_fundamentals_table={} has_runs_table={}",
                        s.ok, s.has_fundamentals_table, s.has_runs_table
                    );
                }
                DbCmd::Migrate => {
                    sbt_db::migrate(&pool).await?;
                    println!("migrations_applied=true");
                }
                DbCmd::ImportFundamentals { csv } => {
                    commands::db::import_fundamentals(&pool, &csv).await?;
                }
                DbCmd::ExportRun { run_id, out } => {
                    commands::db::export_run(&pool, &run_id, out.as_deref()).await?;
                }
            }
        }
    }

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}
