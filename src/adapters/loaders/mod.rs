//! Platform CSV loaders and the UK-format parsing helpers they share.
//!
//! Each platform export has its own column layout, preamble length and
//! vocabulary; every loader normalises rows into [`Transaction`] and
//! skips rows it cannot parse, logging a warning rather than failing the
//! file.

pub mod fidelity;
pub mod interactive_investor;
pub mod invest_engine;

use crate::domain::error::FolioError;
use crate::domain::transaction::{Platform, Transaction};
use crate::ports::config_port::ConfigPort;
use chrono::{NaiveDate, NaiveDateTime};
use std::path::{Path, PathBuf};

pub use fidelity::FidelityLoader;
pub use interactive_investor::InteractiveInvestorLoader;
pub use invest_engine::InvestEngineLoader;

/// A platform-specific transaction loader.
pub trait Loader {
    fn platform(&self) -> Platform;

    /// Load and normalise every matching CSV file, sorted by date.
    fn load(&self) -> Result<Vec<Transaction>, FolioError>;
}

/// Where and how to read one platform's export files.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    pub directory: PathBuf,
    pub file_pattern: String,
    pub skip_rows: usize,
}

impl LoaderConfig {
    /// Read a platform section from the config, falling back to the
    /// platform's conventional defaults.
    pub fn from_config(
        config: &dyn ConfigPort,
        section: &str,
        default_dir: &str,
        default_pattern: &str,
        default_skip: usize,
    ) -> Self {
        let base_path = config
            .get_string("data", "base_path")
            .unwrap_or_else(|| ".".to_string());
        let directory = config
            .get_string(section, "directory")
            .unwrap_or_else(|| default_dir.to_string());
        Self {
            directory: Path::new(&base_path).join(directory),
            file_pattern: config
                .get_string(section, "file_pattern")
                .unwrap_or_else(|| default_pattern.to_string()),
            skip_rows: config.get_int(section, "skip_rows", default_skip as i64) as usize,
        }
    }
}

const DATE_FORMATS: &[&str] = &["%d/%m/%Y", "%d %b %Y", "%Y-%m-%d", "%d-%m-%Y", "%d/%m/%y"];

/// Parse a date in any of the common UK export formats, including
/// InvestEngine's timestamped `16/01/23 15:30:45`.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(value, fmt) {
            return Some(date);
        }
    }
    if let Ok(datetime) = NaiveDateTime::parse_from_str(value, "%d/%m/%y %H:%M:%S") {
        return Some(datetime.date());
    }

    log::warn!("could not parse date: {value}");
    None
}

/// Parse a monetary value such as `£1,234.56` or `-£500`. Unparseable
/// values become 0.0 so a single bad cell never aborts a file.
pub fn parse_money(value: &str) -> f64 {
    let value = value.trim();
    if value.is_empty() || value.eq_ignore_ascii_case("n/a") {
        return 0.0;
    }

    let negative = value.contains('-');
    let cleaned: String = value
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();

    match cleaned.parse::<f64>() {
        Ok(amount) if negative => -amount,
        Ok(amount) => amount,
        Err(_) => {
            log::warn!("could not parse monetary value: {value}");
            0.0
        }
    }
}

/// Parse a unit price, converting pence-quoted values (`162p`) to pounds.
pub fn parse_price(value: &str) -> f64 {
    let value = value.trim();
    if value.is_empty() || value.eq_ignore_ascii_case("n/a") {
        return 0.0;
    }

    let is_pence = value.to_lowercase().contains('p') && !value.contains('£');
    let cleaned: String = value
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();

    match cleaned.parse::<f64>() {
        Ok(price) if is_pence => price / 100.0,
        Ok(price) => price,
        Err(_) => {
            log::warn!("could not parse price: {value}");
            0.0
        }
    }
}

/// Parse a unit quantity such as `1,231.99`.
pub fn parse_quantity(value: &str) -> f64 {
    let value = value.trim();
    if value.is_empty() || value.eq_ignore_ascii_case("n/a") {
        return 0.0;
    }

    match value.replace(',', "").parse::<f64>() {
        Ok(quantity) => quantity,
        Err(_) => {
            log::warn!("could not parse quantity: {value}");
            0.0
        }
    }
}

/// Substitutions applied to abbreviated fund descriptions so the same
/// fund lands under one name regardless of platform.
const FUND_NAME_SUBSTITUTIONS: &[(&str, &str)] = &[
    ("WS BLUE", "WS Blue Whale Growth"),
    ("BLUESTD", "Blue Whale Growth"),
    ("FDSMITH", "Fundsmith Equity"),
    ("SCOH MORT", "Scottish Mortgage"),
    ("SCOTTISH MORTGAGE", "Scottish Mortgage"),
    ("FIDY FUNDSTD", "Fidelity Funds"),
    ("ISHS PHYSETCMD", "iShares Physical Gold"),
    ("ISHARES GBL EN", "iShares Global Clean Energy"),
    ("POLAR CAP TECH", "Polar Capital Technology"),
    ("LIONT SPEC SIT", "Liontrust Special Situations"),
    ("ALLZ TECH", "Allianz Technology Trust"),
    ("LINDSELL TRAIN", "Lindsell Train Global Equity"),
    ("VAN LIFE", "Vanguard LifeStrategy"),
    ("BAIE GIFF", "Baillie Gifford"),
];

/// Collapse whitespace and standardise known abbreviated fund names.
pub fn normalise_fund_name(name: &str) -> String {
    let collapsed = name.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return collapsed;
    }

    let upper = collapsed.to_uppercase();
    for (pattern, replacement) in FUND_NAME_SUBSTITUTIONS {
        if upper.contains(pattern) {
            return replacement.to_string();
        }
    }
    collapsed
}

/// Glob-style match supporting `*` only.
pub fn matches_pattern(name: &str, pattern: &str) -> bool {
    fn matches(name: &[u8], pattern: &[u8]) -> bool {
        match pattern.split_first() {
            None => name.is_empty(),
            Some((b'*', rest)) => (0..=name.len()).any(|i| matches(&name[i..], rest)),
            Some((&expected, rest)) => name
                .split_first()
                .is_some_and(|(&actual, name_rest)| actual == expected && matches(name_rest, rest)),
        }
    }
    matches(name.as_bytes(), pattern.as_bytes())
}

/// Files in `directory` matching the pattern, sorted by name. A missing
/// directory logs a warning and yields nothing.
pub fn find_csv_files(directory: &Path, pattern: &str) -> Result<Vec<PathBuf>, FolioError> {
    if !directory.exists() {
        log::warn!("directory does not exist: {}", directory.display());
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(directory)? {
        let entry = entry?;
        let name = entry.file_name();
        if matches_pattern(&name.to_string_lossy(), pattern) {
            files.push(entry.path());
        }
    }

    files.sort();
    log::debug!(
        "found {} files matching '{}' in {}",
        files.len(),
        pattern,
        directory.display()
    );
    Ok(files)
}

/// A CSV file read into memory with named-column access.
pub struct CsvTable {
    headers: Vec<String>,
    records: Vec<csv::StringRecord>,
}

impl CsvTable {
    /// Read a CSV file, skipping `skip_rows` preamble lines before the
    /// header row and stripping any BOM.
    pub fn load(path: &Path, skip_rows: usize) -> Result<Self, FolioError> {
        let content = std::fs::read_to_string(path)?;
        let content = content.trim_start_matches('\u{feff}');

        let body: String = content
            .lines()
            .skip(skip_rows)
            .collect::<Vec<_>>()
            .join("\n");

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(body.as_bytes());

        let headers = reader
            .headers()
            .map_err(|e| FolioError::CsvParse {
                file: path.display().to_string(),
                reason: e.to_string(),
            })?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
            .collect();

        let mut records = Vec::new();
        for result in reader.records() {
            let record = result.map_err(|e| FolioError::CsvParse {
                file: path.display().to_string(),
                reason: e.to_string(),
            })?;
            records.push(record);
        }

        Ok(Self { headers, records })
    }

    pub fn records(&self) -> &[csv::StringRecord] {
        &self.records
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.headers.iter().any(|h| h == column)
    }

    /// Cell value by column name, empty when the column or cell is absent.
    pub fn get<'a>(&self, record: &'a csv::StringRecord, column: &str) -> &'a str {
        self.headers
            .iter()
            .position(|h| h == column)
            .and_then(|i| record.get(i))
            .map(str::trim)
            .unwrap_or("")
    }
}
