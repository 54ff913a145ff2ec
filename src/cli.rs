//! CLI definition and dispatch.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use crate::adapters::file_config_adapter::{build_effect_map, FileConfigAdapter};
use crate::domain::cash_flow::{self, CashFlow};
use crate::domain::error::FolioError;
use crate::domain::holdings::{self, EffectMap};
use crate::domain::mapping::{fund_names_for_ticker, TickerMapping};
use crate::domain::price::{normalise_lse_price, price_series};
use crate::domain::returns::{self, format_gbp};
use crate::domain::snapshot::HoldingsSnapshot;
use crate::domain::transaction::{Platform, TaxWrapper, Transaction};
use crate::ports::config_port::ConfigPort;
use crate::ports::report_port::PerformanceSection;
use crate::ports::store_port::{StorePort, TransactionFilter};

#[derive(Parser, Debug)]
#[command(name = "folio", about = "Multi-platform investment portfolio analyser")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Import platform CSV exports into the database
    Import {
        #[arg(short, long)]
        config: PathBuf,
        /// Import a single platform only
        #[arg(long)]
        platform: Option<String>,
    },
    /// Import a price-history CSV (columns: date, ticker, close_price)
    ImportPrices {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Value the current-holdings snapshot at the latest prices
    Holdings {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Compute per-ticker and aggregate return metrics
    Performance {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        ticker: Option<String>,
        /// Restrict to one tax wrapper (ISA, SIPP, GIA, OTHER)
        #[arg(long)]
        wrapper: Option<String>,
        /// Valuation date (YYYY-MM-DD); defaults to the latest price date
        #[arg(long)]
        as_of: Option<String>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Cross-check transactions, mappings, prices and recorded status
    Validate {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show price coverage per ticker
    Info {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        ticker: Option<String>,
    },
    /// Recompute the recorded per-ticker transaction aggregates
    RefreshStatus {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Apply a standardised fund name to all matching transactions
    MapFund {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        fund: String,
        #[arg(long)]
        mapped: String,
    },
    /// Exclude a fund from portfolio aggregation (or re-include it)
    Exclude {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        fund: String,
        /// Re-include instead of excluding
        #[arg(long)]
        undo: bool,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    #[cfg(feature = "sqlite")]
    {
        dispatch(cli)
    }
    #[cfg(not(feature = "sqlite"))]
    {
        let _ = cli;
        eprintln!("error: folio was built without the sqlite feature");
        ExitCode::from(1)
    }
}

pub fn load_config(path: &PathBuf) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| {
        let err = FolioError::ConfigParse {
            file: path.display().to_string(),
            reason: e.to_string(),
        };
        eprintln!("error: {err}");
        ExitCode::from(&err)
    })
}

fn parse_cli_date(value: &str) -> Result<NaiveDate, FolioError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| FolioError::InvalidInput {
        reason: format!("invalid date '{value}' (expected YYYY-MM-DD)"),
    })
}

/// One valued position from the holdings snapshot.
#[derive(Debug, Clone)]
pub struct HoldingRow {
    pub ticker: String,
    pub fund_name: String,
    pub platform: String,
    pub tax_wrapper: String,
    pub units: f64,
    pub price: f64,
    pub price_date: NaiveDate,
    pub value: f64,
    pub cost_basis: f64,
    pub gain: f64,
    /// `None` when no cost basis could be reconstructed.
    pub gain_pct: Option<f64>,
}

/// Fetch one ticker's transactions under every fund name it is known by,
/// deduplicating rows that match under both raw and mapped names.
fn fetch_ticker_transactions(
    store: &dyn StorePort,
    fund_names: &[&str],
    wrapper: Option<TaxWrapper>,
    platform: Option<Platform>,
) -> Result<Vec<Transaction>, FolioError> {
    let mut seen: std::collections::HashSet<(String, u64, u64)> =
        std::collections::HashSet::new();
    let mut transactions = Vec::new();

    for name in fund_names {
        let filter = TransactionFilter {
            fund: Some((*name).to_string()),
            tax_wrapper: wrapper,
            platform,
            ..Default::default()
        };
        for tx in store.fetch_transactions(&filter)? {
            let key = (
                format!(
                    "{}|{}|{}|{}|{}",
                    tx.platform.as_db_str(),
                    tx.date,
                    tx.fund_name,
                    tx.transaction_type.as_db_str(),
                    tx.reference.as_deref().unwrap_or(""),
                ),
                tx.value.to_bits(),
                tx.units.to_bits(),
            );
            if seen.insert(key) {
                transactions.push(tx);
            }
        }
    }

    transactions.sort_by_key(|tx| tx.date);
    Ok(transactions)
}

/// Value every snapshot position: units at the latest price, FIFO cost
/// basis from the transaction history.
pub fn build_holdings_rows(
    store: &dyn StorePort,
    snapshot: &HoldingsSnapshot,
    mappings: &[TickerMapping],
    effects: &EffectMap,
) -> Result<Vec<HoldingRow>, FolioError> {
    let mut rows = Vec::new();

    for (ticker, entry) in &snapshot.0 {
        let Some(latest) = store.latest_price(ticker)? else {
            log::warn!("no price data for {ticker}, skipping valuation");
            continue;
        };
        let price = normalise_lse_price(ticker, latest.close);

        let mut fund_names = fund_names_for_ticker(mappings, ticker);
        if fund_names.is_empty() {
            fund_names.push(entry.fund_name.as_str());
        }

        for position in &entry.holdings {
            let transactions = fetch_ticker_transactions(
                store,
                &fund_names,
                position.tax_wrapper_enum(),
                position.platform_enum(),
            )?;
            let basis = holdings::fifo_cost_basis(&transactions, effects);

            let value = position.units * price;
            let gain = value - basis.cost;
            let gain_pct = (basis.cost > 0.0).then(|| gain / basis.cost);

            rows.push(HoldingRow {
                ticker: ticker.clone(),
                fund_name: entry.fund_name.clone(),
                platform: position.platform.clone(),
                tax_wrapper: position.tax_wrapper.clone(),
                units: position.units,
                price,
                price_date: latest.date,
                value,
                cost_basis: basis.cost,
                gain,
                gain_pct,
            });
        }
    }

    Ok(rows)
}

/// Per-ticker return metrics plus a portfolio aggregate, labelled for
/// display.
pub fn build_performance_sections(
    store: &dyn StorePort,
    snapshot: &HoldingsSnapshot,
    mappings: &[TickerMapping],
    effects: &EffectMap,
    ticker_filter: Option<&str>,
    wrapper: Option<TaxWrapper>,
    as_of_override: Option<NaiveDate>,
) -> Result<Vec<PerformanceSection>, FolioError> {
    let mut sections = Vec::new();
    let mut aggregate_flows: Vec<CashFlow> = Vec::new();
    let mut aggregate_value = 0.0;
    let mut aggregate_as_of: Option<NaiveDate> = None;

    for (ticker, entry) in &snapshot.0 {
        if let Some(wanted) = ticker_filter {
            if ticker != wanted {
                continue;
            }
        }

        let units: f64 = entry
            .holdings
            .iter()
            .filter(|p| wrapper.is_none() || p.tax_wrapper_enum() == wrapper)
            .map(|p| p.units)
            .sum();
        if units <= 0.0 {
            continue;
        }

        let Some(latest) = store.latest_price(ticker)? else {
            log::warn!("no price data for {ticker}, skipping");
            continue;
        };
        let price = normalise_lse_price(ticker, latest.close);
        let current_value = units * price;

        let mut fund_names = fund_names_for_ticker(mappings, ticker);
        if fund_names.is_empty() {
            fund_names.push(entry.fund_name.as_str());
        }
        let transactions = fetch_ticker_transactions(store, &fund_names, wrapper, None)?;

        let flows = cash_flow::cash_flows_from_transactions(&transactions);
        if flows.is_empty() {
            log::warn!("no cash flows for {ticker}, skipping");
            continue;
        }

        // Transactions can postdate the last price; the valuation date
        // must not precede any flow.
        let last_flow_date = flows.last().map(|f| f.date).unwrap_or(latest.date);
        let as_of = as_of_override.unwrap_or_else(|| latest.date.max(last_flow_date));

        let metrics = returns::compute(&flows, current_value, as_of)?;

        let series = price_series(&store.fetch_prices(Some(ticker.as_str()))?, ticker);
        let twr = returns::time_weighted_return(&transactions, &series, current_value, effects);

        aggregate_flows.extend(flows);
        aggregate_value += current_value;
        aggregate_as_of = Some(aggregate_as_of.map_or(as_of, |d| d.max(as_of)));

        sections.push(PerformanceSection {
            label: format!("{ticker} ({})", entry.fund_name),
            metrics,
            twr,
        });
    }

    if let Some(as_of) = aggregate_as_of {
        if sections.len() > 1 {
            let metrics = returns::compute(&aggregate_flows, aggregate_value, as_of)?;
            sections.push(PerformanceSection {
                label: "Aggregate".to_string(),
                metrics,
                twr: None,
            });
        }
    }

    Ok(sections)
}

#[cfg(feature = "sqlite")]
fn dispatch(cli: Cli) -> ExitCode {
    use crate::adapters::sqlite_store::SqliteStore;

    match cli.command {
        Command::Import { config, platform } => run_import(&config, platform.as_deref()),
        Command::ImportPrices { config, file } => run_import_prices(&config, &file),
        Command::Holdings { config } => run_holdings(&config),
        Command::Performance {
            config,
            ticker,
            wrapper,
            as_of,
            output,
        } => run_performance(
            &config,
            ticker.as_deref(),
            wrapper.as_deref(),
            as_of.as_deref(),
            output.as_ref(),
        ),
        Command::Validate { config, output } => run_validate(&config, output.as_ref()),
        Command::Info { config, ticker } => run_info(&config, ticker.as_deref()),
        Command::RefreshStatus { config } => {
            let adapter = match load_config(&config) {
                Ok(a) => a,
                Err(code) => return code,
            };
            match SqliteStore::from_config(&adapter)
                .and_then(|store| store.refresh_mapping_status())
            {
                Ok(refreshed) => {
                    eprintln!("Refreshed status for {refreshed} tickers");
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    eprintln!("error: {e}");
                    (&e).into()
                }
            }
        }
        Command::MapFund {
            config,
            fund,
            mapped,
        } => {
            let adapter = match load_config(&config) {
                Ok(a) => a,
                Err(code) => return code,
            };
            match SqliteStore::from_config(&adapter)
                .and_then(|store| store.set_mapped_fund_name(&fund, &mapped))
            {
                Ok(updated) => {
                    eprintln!("Mapped '{fund}' to '{mapped}' on {updated} transactions");
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    eprintln!("error: {e}");
                    (&e).into()
                }
            }
        }
        Command::Exclude { config, fund, undo } => {
            let adapter = match load_config(&config) {
                Ok(a) => a,
                Err(code) => return code,
            };
            match SqliteStore::from_config(&adapter)
                .and_then(|store| store.set_excluded(&fund, !undo))
            {
                Ok(updated) => {
                    let action = if undo { "Re-included" } else { "Excluded" };
                    eprintln!("{action} '{fund}' on {updated} transactions");
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    eprintln!("error: {e}");
                    (&e).into()
                }
            }
        }
    }
}

#[cfg(feature = "sqlite")]
fn run_import(config_path: &PathBuf, platform: Option<&str>) -> ExitCode {
    use crate::adapters::loaders::{
        FidelityLoader, InteractiveInvestorLoader, InvestEngineLoader, Loader, LoaderConfig,
    };
    use crate::adapters::sqlite_store::SqliteStore;

    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    let selected = match platform {
        Some(raw) => match Platform::parse(raw) {
            Some(p) => Some(p),
            None => {
                eprintln!("error: unknown platform '{raw}'");
                return ExitCode::from(2);
            }
        },
        None => None,
    };

    let store = match SqliteStore::from_config(&adapter) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    let mut total_inserted = 0usize;
    let mut total_duplicates = 0usize;

    for platform in Platform::all() {
        if selected.is_some_and(|s| s != platform) {
            continue;
        }

        let loader: Box<dyn Loader> = match platform {
            Platform::Fidelity => Box::new(FidelityLoader::new(LoaderConfig::from_config(
                &adapter,
                "fidelity",
                "fidelity",
                "TransactionHistory*.csv",
                6,
            ))),
            Platform::InteractiveInvestor => {
                let wrapper = adapter
                    .get_string("interactive_investor", "tax_wrapper")
                    .and_then(|s| TaxWrapper::parse(&s))
                    .unwrap_or(TaxWrapper::Isa);
                Box::new(InteractiveInvestorLoader::new(
                    LoaderConfig::from_config(
                        &adapter,
                        "interactive_investor",
                        "interactive_investor",
                        "ii_*.csv",
                        0,
                    ),
                    wrapper,
                ))
            }
            Platform::InvestEngine => Box::new(InvestEngineLoader::new(
                LoaderConfig::from_config(
                    &adapter,
                    "invest_engine",
                    "invest_engine",
                    "invest_engine_*.csv",
                    1,
                ),
            )),
        };

        eprintln!("Importing {platform} transactions...");
        let transactions = match loader.load() {
            Ok(txs) => txs,
            Err(e) => {
                eprintln!("error: {e}");
                return (&e).into();
            }
        };

        match store.insert_transactions(&transactions) {
            Ok((inserted, duplicates)) => {
                eprintln!("  {platform}: {inserted} inserted, {duplicates} duplicates skipped");
                total_inserted += inserted;
                total_duplicates += duplicates;
            }
            Err(e) => {
                eprintln!("error: {e}");
                return (&e).into();
            }
        }
    }

    eprintln!("Import complete: {total_inserted} inserted, {total_duplicates} duplicates skipped");
    ExitCode::SUCCESS
}

#[cfg(feature = "sqlite")]
fn run_import_prices(config_path: &PathBuf, file: &PathBuf) -> ExitCode {
    use crate::adapters::loaders::{parse_date, CsvTable};
    use crate::adapters::sqlite_store::SqliteStore;
    use crate::domain::price::PricePoint;

    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    let store = match SqliteStore::from_config(&adapter) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    let table = match CsvTable::load(file, 0) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    let mut prices = Vec::new();
    for record in table.records() {
        let Some(date) = parse_date(table.get(record, "date")) else {
            continue;
        };
        let ticker = table.get(record, "ticker");
        let close: f64 = match table.get(record, "close_price").parse() {
            Ok(v) => v,
            Err(_) => {
                log::warn!("skipping price row with bad close_price for {ticker} on {date}");
                continue;
            }
        };
        if ticker.is_empty() {
            continue;
        }
        prices.push(PricePoint {
            date,
            ticker: ticker.to_string(),
            fund_name: table.get(record, "fund_name").to_string(),
            close,
        });
    }

    match store.insert_prices(&prices) {
        Ok((inserted, duplicates)) => {
            eprintln!("Inserted {inserted} price points, skipped {duplicates} duplicates");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

#[cfg(feature = "sqlite")]
fn snapshot_from_config(config: &dyn ConfigPort) -> Result<HoldingsSnapshot, FolioError> {
    let path = config
        .get_string("holdings", "snapshot_path")
        .unwrap_or_else(|| "data/current_holdings.json".to_string());
    HoldingsSnapshot::from_file(path)
}

#[cfg(feature = "sqlite")]
fn run_holdings(config_path: &PathBuf) -> ExitCode {
    use crate::adapters::sqlite_store::SqliteStore;

    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    let result = (|| -> Result<Vec<HoldingRow>, FolioError> {
        let effects = build_effect_map(&adapter)?;
        let store = SqliteStore::from_config(&adapter)?;
        let snapshot = snapshot_from_config(&adapter)?;
        let mappings = store.fetch_mappings()?;
        build_holdings_rows(&store, &snapshot, &mappings, &effects)
    })();

    let rows = match result {
        Ok(rows) => rows,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    if rows.is_empty() {
        eprintln!("No holdings could be valued");
        return ExitCode::SUCCESS;
    }

    println!("Current Holdings");
    println!("================");
    let mut total_value = 0.0;
    let mut total_cost = 0.0;
    for row in &rows {
        let gain_pct = row
            .gain_pct
            .map(|g| format!("{:+.2}%", g * 100.0))
            .unwrap_or_else(|| "N/A".to_string());
        println!(
            "{:<12} {:<35} {:<8} {:>12.4} units  {} ({} on {})  gain {} ({})",
            row.ticker,
            row.fund_name,
            row.tax_wrapper,
            row.units,
            format_gbp(row.value),
            format_gbp(row.price),
            row.price_date,
            format_gbp(row.gain),
            gain_pct,
        );
        total_value += row.value;
        total_cost += row.cost_basis;
    }

    let total_gain = total_value - total_cost;
    println!();
    println!("Total Value:      {}", format_gbp(total_value));
    println!("Total Cost Basis: {}", format_gbp(total_cost));
    if total_cost > 0.0 {
        println!(
            "Unrealised Gain:  {} ({:+.2}%)",
            format_gbp(total_gain),
            total_gain / total_cost * 100.0
        );
    } else {
        println!("Unrealised Gain:  {}", format_gbp(total_gain));
    }

    ExitCode::SUCCESS
}

#[cfg(feature = "sqlite")]
fn run_performance(
    config_path: &PathBuf,
    ticker: Option<&str>,
    wrapper: Option<&str>,
    as_of: Option<&str>,
    output: Option<&PathBuf>,
) -> ExitCode {
    use crate::adapters::sqlite_store::SqliteStore;
    use crate::adapters::text_report_adapter::TextReportAdapter;
    use crate::ports::report_port::ReportPort;

    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    let wrapper = match wrapper {
        Some(raw) => match TaxWrapper::parse(raw) {
            Some(w) => Some(w),
            None => {
                eprintln!("error: unknown tax wrapper '{raw}'");
                return ExitCode::from(2);
            }
        },
        None => None,
    };

    let result = (|| -> Result<Vec<PerformanceSection>, FolioError> {
        let as_of_override = as_of.map(parse_cli_date).transpose()?;
        let effects = build_effect_map(&adapter)?;
        let store = SqliteStore::from_config(&adapter)?;
        let snapshot = snapshot_from_config(&adapter)?;
        let mappings = store.fetch_mappings()?;
        build_performance_sections(
            &store,
            &snapshot,
            &mappings,
            &effects,
            ticker,
            wrapper,
            as_of_override,
        )
    })();

    let sections = match result {
        Ok(sections) => sections,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    if sections.is_empty() {
        eprintln!("No holdings with price data and cash flows found");
        return ExitCode::SUCCESS;
    }

    for section in &sections {
        println!("{}", section.label);
        println!("{}", section.metrics);
        if let Some(twr) = section.twr {
            println!("  TWR (annualised):    {:+.2}%", twr * 100.0);
        }
        println!();
    }

    if let Some(path) = output {
        let path = path.display().to_string();
        if let Err(e) = TextReportAdapter.write_performance(&sections, &path) {
            eprintln!("error: {e}");
            return (&e).into();
        }
        eprintln!("Report written to {path}");
    }

    ExitCode::SUCCESS
}

#[cfg(feature = "sqlite")]
fn run_validate(config_path: &PathBuf, output: Option<&PathBuf>) -> ExitCode {
    use crate::adapters::sqlite_store::SqliteStore;
    use crate::adapters::text_report_adapter::TextReportAdapter;
    use crate::domain::reconcile;
    use crate::ports::report_port::ReportPort;

    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    let result = (|| -> Result<reconcile::ReconciliationReport, FolioError> {
        let effects = build_effect_map(&adapter)?;
        let store = SqliteStore::from_config(&adapter)?;
        let transactions = store.fetch_transactions(&TransactionFilter {
            include_excluded: true,
            ..Default::default()
        })?;
        let mappings = store.fetch_mappings()?;
        let prices = store.fetch_prices(None)?;
        let statuses = store.fetch_mapping_statuses()?;
        Ok(reconcile::reconcile(
            &transactions,
            &mappings,
            &prices,
            &statuses,
            &effects,
        ))
    })();

    let report = match result {
        Ok(report) => report,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    println!("{report}");

    if let Some(path) = output {
        let path = path.display().to_string();
        if let Err(e) = TextReportAdapter.write_reconciliation(&report, &path) {
            eprintln!("error: {e}");
            return (&e).into();
        }
        eprintln!("Report written to {path}");
    }

    if report.has_issues() {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    }
}

#[cfg(feature = "sqlite")]
fn run_info(config_path: &PathBuf, ticker: Option<&str>) -> ExitCode {
    use crate::adapters::sqlite_store::SqliteStore;

    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    let store = match SqliteStore::from_config(&adapter) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    // VIP tickers list first.
    let tickers: Vec<(String, bool)> = match ticker {
        Some(t) => vec![(t.to_string(), false)],
        None => {
            let mappings = match store.fetch_mappings() {
                Ok(m) => m,
                Err(e) => {
                    eprintln!("error: {e}");
                    return (&e).into();
                }
            };
            let mut tickers: Vec<(String, bool)> =
                mappings.into_iter().map(|m| (m.ticker, m.vip)).collect();
            tickers.sort_by(|a, b| (!a.1, &a.0).cmp(&(!b.1, &b.0)));
            let mut seen = std::collections::HashSet::new();
            tickers.retain(|(ticker, _)| seen.insert(ticker.clone()));
            tickers
        }
    };

    for (ticker, vip) in &tickers {
        let marker = if *vip { " [VIP]" } else { "" };
        match store.price_range(ticker) {
            Ok(Some((first, last, count))) => {
                println!("{ticker:<16} {first} to {last} ({count} prices){marker}");
            }
            Ok(None) => println!("{ticker:<16} no price data{marker}"),
            Err(e) => {
                eprintln!("error: {e}");
                return (&e).into();
            }
        }
    }

    ExitCode::SUCCESS
}
