//! DWH ETL - run the pipeline or print reports from the command line

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use dwh_common::logging::{init_logging, LogConfig, LogLevel};
use std::path::PathBuf;
use tracing::info;

use dwh_server::config::Config;
use dwh_server::db;
use dwh_server::etl::{EtlPipeline, PipelineReport, StagingPolicy};
use dwh_server::insights::analysis::{self, GroupTotal, Summary};
use dwh_server::insights::queries::{fetch_order_views, fetch_table_counts};

#[derive(Parser, Debug)]
#[command(name = "dwh-etl")]
#[command(author, version, about = "Order warehouse ETL and reports")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load a CSV export into the warehouse
    Run {
        /// Source file (defaults to CSV_FILE_PATH)
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Keep rows staged by earlier runs
        #[arg(long)]
        append: bool,

        /// Rows per chunk (defaults to ETL_BATCH_SIZE)
        #[arg(long)]
        batch_size: Option<usize>,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print a report over the loaded warehouse
    Report {
        #[arg(value_enum, default_value_t = ReportKind::All)]
        kind: ReportKind,

        /// Products at each end of the ranking
        #[arg(short = 'n', long, default_value_t = 10)]
        top: usize,
    },

    /// Apply schema migrations and exit
    Migrate,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum ReportKind {
    Summary,
    Counts,
    Categories,
    Regions,
    Trends,
    Products,
    Customers,
    Correlations,
    All,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("dwh-etl")
        .filter_directives("sqlx=warn")
        .build()
        .merge_env()?;
    let _guard = init_logging(&log_config)?;

    let mut config = Config::load()?;

    match cli.command {
        Command::Run {
            file,
            append,
            batch_size,
            json,
        } => {
            if let Some(file) = file {
                config.etl.csv_file_path = file;
            }
            if append {
                config.etl.staging_policy = StagingPolicy::Append;
            }
            if let Some(batch_size) = batch_size {
                anyhow::ensure!(batch_size > 0, "--batch-size must be greater than 0");
                config.etl.batch_size = batch_size;
            }

            let pipeline = EtlPipeline::new(config.etl.clone());
            let raw = pipeline.load().await?;

            let pool = db::create_pool(&config.database).await?;
            db::run_migrations(&pool).await?;
            let mut conn = pool.acquire().await.context("Failed to acquire a connection")?;

            let report = pipeline.run_loaded(&mut conn, raw).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_run_report(&report);
            }

            if !report.is_complete() {
                anyhow::bail!("{} stage(s) failed, see log for details", report.failed_stages.len());
            }
        },
        Command::Report { kind, top } => {
            anyhow::ensure!(top > 0, "--top must be at least 1");
            let pool = db::create_pool(&config.database).await?;
            print_reports(&pool, kind, top).await?;
        },
        Command::Migrate => {
            let pool = db::create_pool(&config.database).await?;
            db::run_migrations(&pool).await?;
        },
    }

    info!("Done");
    Ok(())
}

fn new_table(header: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header.to_vec());
    table
}

fn print_run_report(report: &PipelineReport) {
    let mut table = new_table(&["Stage", "Result"]);
    table.add_row(vec!["load".to_string(), format!("{} rows", report.loaded)]);

    if let Some(staging) = &report.staging {
        table.add_row(vec![
            "staging".to_string(),
            format!(
                "{} inserted, {} invalid, {} failed",
                staging.inserted, staging.skipped_invalid, staging.failed
            ),
        ]);
    }
    if let Some(cleaning) = &report.cleaning {
        table.add_row(vec![
            "cleaning".to_string(),
            format!(
                "{} cleaned, {} dropped, {} undated",
                cleaning.cleaned, cleaning.dropped, cleaning.undated
            ),
        ]);
    }
    for dim in &report.dimensions {
        table.add_row(vec![
            dim.stage.to_string(),
            format!("{} candidates, {} upserted", dim.candidates, dim.upserted),
        ]);
    }
    if let Some(facts) = &report.facts {
        table.add_row(vec![
            "facts".to_string(),
            format!("{} upserted, {} skipped", facts.inserted, facts.skipped),
        ]);
    }
    for failure in &report.failed_stages {
        table.add_row(vec![format!("{} (failed)", failure.stage), failure.error.clone()]);
    }

    println!("{table}");
    println!("Finished in {} ms", report.elapsed_ms);
}

async fn print_reports(pool: &sqlx::PgPool, kind: ReportKind, top: usize) -> Result<()> {
    let wants = |k: ReportKind| kind == k || kind == ReportKind::All;

    if wants(ReportKind::Counts) {
        let counts = fetch_table_counts(pool).await?;
        let mut table = new_table(&["Table", "Rows"]);
        for (name, rows) in [
            ("temp_orders", counts.staging),
            ("dim_customers", counts.customers),
            ("dim_products", counts.products),
            ("dim_dates", counts.dates),
            ("dim_payments", counts.payments),
            ("dim_shipping_regions", counts.shipping_regions),
            ("fact_orders", counts.facts),
        ] {
            table.add_row(vec![name.to_string(), rows.to_string()]);
        }
        println!("Table counts\n{table}");
    }

    if kind == ReportKind::Counts {
        return Ok(());
    }

    let views = fetch_order_views(pool).await?;

    if wants(ReportKind::Summary) {
        let stats = analysis::descriptive_stats(&views);
        let mut table = new_table(&["Measure", "Mean", "Median", "Mode"]);
        for (name, summary) in [
            ("order_total", stats.order_total),
            ("quantity", stats.quantity),
            ("price", stats.price),
            ("age", stats.age),
        ] {
            table.add_row(summary_row(name, summary));
        }
        println!("Descriptive statistics ({} orders)\n{table}", stats.orders);
    }

    if wants(ReportKind::Categories) {
        println!("Sales by category\n{}", group_table("Category", &analysis::sales_by_category(&views)));
    }

    if wants(ReportKind::Regions) {
        println!("Sales by region\n{}", group_table("Region", &analysis::sales_by_region(&views)));
    }

    if wants(ReportKind::Trends) {
        let monthly = analysis::monthly_sales(&views);
        let mut table = new_table(&["Month", "Sales"]);
        for month in &monthly {
            table.add_row(vec![month.month.clone(), format!("{:.2}", month.total)]);
        }
        println!("Monthly sales\n{table}");
        if let Some(extremes) = analysis::monthly_extremes(&monthly) {
            println!(
                "Best month: {} ({:.2}); worst month: {} ({:.2})",
                extremes.best.month, extremes.best.total, extremes.worst.month, extremes.worst.total
            );
        }
    }

    if wants(ReportKind::Products) {
        let ranking = analysis::product_ranking(&views, top);
        println!("Best-selling products\n{}", group_table("Product", &ranking.top));
        println!("Least-selling products\n{}", group_table("Product", &ranking.bottom));
    }

    if wants(ReportKind::Customers) {
        let mut table = new_table(&["Age", "Sales", "Units"]);
        for age in analysis::sales_by_age(&views) {
            table.add_row(vec![age.age.to_string(), format!("{:.2}", age.total), age.quantity.to_string()]);
        }
        println!("Sales by age\n{table}");
        println!("Sales by gender\n{}", group_table("Gender", &analysis::sales_by_gender(&views)));
    }

    if wants(ReportKind::Correlations) {
        match analysis::order_total_age_correlation(&views) {
            Some(r) => println!("Correlation between order total and age: {r:.4}"),
            None => println!("Correlation between order total and age: undefined"),
        }

        let crosstab = analysis::category_payment_crosstab(&views);
        let mut header = vec!["Category"];
        header.extend(crosstab.payment_methods.iter().map(String::as_str));
        let mut table = new_table(&header);
        for row in &crosstab.rows {
            let mut cells = vec![row.category.clone()];
            cells.extend(row.counts.iter().map(u64::to_string));
            table.add_row(cells);
        }
        println!("Orders by category and payment method\n{table}");
    }

    Ok(())
}

fn summary_row(name: &str, summary: Option<Summary>) -> Vec<String> {
    match summary {
        Some(s) => vec![
            name.to_string(),
            format!("{:.2}", s.mean),
            format!("{:.2}", s.median),
            format!("{:.2}", s.mode),
        ],
        None => vec![name.to_string(), "-".into(), "-".into(), "-".into()],
    }
}

fn group_table(label: &str, groups: &[GroupTotal]) -> Table {
    let mut table = new_table(&[label, "Sales", "Orders"]);
    for group in groups {
        table.add_row(vec![group.key.clone(), format!("{:.2}", group.total), group.orders.to_string()]);
    }
    table
}
