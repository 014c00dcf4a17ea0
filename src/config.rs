use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    pub currency: CurrencyConfig,
    pub business_units: Vec<BusinessUnitSeed>,
    pub register: Option<RegisterConfig>,
    /// Source-file business-unit label to canonical code.
    pub business_unit_aliases: BTreeMap<String, String>,
    pub sources: Vec<SourceConfig>,
    pub date_formats: Vec<String>,
    pub backup: BackupConfig,
    /// Directory relative source paths are resolved against.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CurrencyConfig {
    pub primary: String,
    pub secondary: String,
    /// Units of the secondary currency per one unit of the primary currency.
    pub secondary_per_primary: Decimal,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BusinessUnitSeed {
    pub code: String,
    pub name: String,
    pub managers: Vec<String>,
    pub location: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegisterConfig {
    pub path: PathBuf,
    pub code: Vec<String>,
    pub name: Vec<String>,
    pub manager: Vec<String>,
    pub location: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub path: PathBuf,
    pub business_unit: String,
    #[serde(default)]
    pub sheet: Option<String>,
    #[serde(default)]
    pub columns: ColumnMapping,
}

/// Header candidates per canonical field. Matching ignores case and
/// surrounding or repeated whitespace.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnMapping {
    pub po_number: Vec<String>,
    pub client: Vec<String>,
    pub value: Vec<String>,
    pub currency: Vec<String>,
    pub secondary_value: Vec<String>,
    pub issue_date: Vec<String>,
    pub expiry_date: Vec<String>,
    pub status: Vec<String>,
    pub description: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    pub dir: Option<PathBuf>,
    pub retention: usize,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            currency: CurrencyConfig::default(),
            business_units: default_business_units(),
            register: Some(RegisterConfig::default()),
            business_unit_aliases: BTreeMap::from([("TSS".to_string(), "TCS".to_string())]),
            sources: default_sources(),
            date_formats: default_date_formats(),
            backup: BackupConfig::default(),
            base_dir: PathBuf::new(),
        }
    }
}

impl Default for CurrencyConfig {
    fn default() -> Self {
        Self {
            primary: "USD".to_string(),
            secondary: "NGN".to_string(),
            secondary_per_primary: Decimal::from(1650),
        }
    }
}

impl Default for RegisterConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("SBU Data/SBU Register.csv"),
            code: strings(&["S/HAND", "SHORTHAND", "CODE"]),
            name: strings(&["SBU NAME", "NAME"]),
            manager: strings(&["MANAGER", "MANAGERS"]),
            location: strings(&["LOCATION"]),
        }
    }
}

impl Default for ColumnMapping {
    fn default() -> Self {
        Self {
            po_number: strings(&["PO NUMBER", "PO NO", "PO #"]),
            client: strings(&["CLIENT", "CLIENT NAME"]),
            value: strings(&["VALUE IN USD", "VALUE", "PO VALUE"]),
            currency: strings(&["CURRENCY"]),
            secondary_value: strings(&["VALUE IN NGN"]),
            issue_date: strings(&["DATE ISSUED", "ISSUE DATE", "START DATE"]),
            expiry_date: strings(&["DATE EXPIRED", "EXPIRY DATE", "END DATE"]),
            status: strings(&["STATUS"]),
            description: strings(&["DESCRIPTION OF THE ORDER", "DESCRIPTION"]),
        }
    }
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            dir: None,
            retention: 10,
        }
    }
}

impl MigrationConfig {
    /// Loads and validates the configuration file, or returns the built-in
    /// defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            let config = Self::default();
            config.validate()?;
            return Ok(config);
        };

        let raw = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        let mut config: Self = serde_json::from_slice(&raw)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        config.base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        config
            .validate()
            .with_context(|| format!("invalid configuration in {}", path.display()))?;

        info!(
            path = %path.display(),
            sources = config.sources.len(),
            business_units = config.business_units.len(),
            "loaded migration config"
        );

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.currency.secondary_per_primary <= Decimal::ZERO {
            bail!(
                "currency.secondary_per_primary must be positive, got {}",
                self.currency.secondary_per_primary
            );
        }
        if self.currency.primary.trim().is_empty() {
            bail!("currency.primary must not be empty");
        }
        if self
            .currency
            .primary
            .eq_ignore_ascii_case(&self.currency.secondary)
        {
            bail!("primary and secondary currency must differ");
        }
        if self.backup.retention == 0 {
            bail!("backup.retention must keep at least one snapshot");
        }
        if self.date_formats.is_empty() {
            bail!("date_formats must list at least one format");
        }

        for (label, code) in &self.business_unit_aliases {
            let chained = self
                .business_unit_aliases
                .keys()
                .any(|other| other.eq_ignore_ascii_case(code) && !other.eq_ignore_ascii_case(label));
            if chained {
                bail!("business-unit alias {label} -> {code} points at another alias source");
            }
        }

        for seed in &self.business_units {
            if seed.code.trim().is_empty() || seed.name.trim().is_empty() {
                bail!("business unit entries need both code and name");
            }
        }

        for source in &self.sources {
            if source.columns.po_number.is_empty() || source.columns.client.is_empty() {
                bail!(
                    "source {} must map po_number and client headers",
                    source.path.display()
                );
            }
        }

        Ok(())
    }

    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    /// Maps a source-file label to its canonical business-unit code.
    /// Applying it to a canonical code returns that code unchanged.
    pub fn canonical_business_unit(&self, label: &str) -> String {
        let label = label.trim();
        self.business_unit_aliases
            .iter()
            .find(|(source, _)| source.eq_ignore_ascii_case(label))
            .map(|(_, code)| code.clone())
            .unwrap_or_else(|| label.to_string())
    }
}

fn default_business_units() -> Vec<BusinessUnitSeed> {
    [
        ("ED&C", "ENGINEERING, DESIGN AND CONSTRUCTION"),
        ("GCM", "GLOBAL COMMERCIAL MANAGEMENT"),
        ("OSS", "OILFIELD SUPPLY AND SERVICES"),
        ("PMC", "PROJECT MANAGEMENT CONSULTANCY SERVICES"),
        ("P&R", "POWER & RENEWABLES"),
        ("TCS", "TECHNICAL CONSULTANCY SERVICES"),
    ]
    .into_iter()
    .map(|(code, name)| BusinessUnitSeed {
        code: code.to_string(),
        name: name.to_string(),
        managers: Vec::new(),
        location: String::new(),
    })
    .collect()
}

fn default_sources() -> Vec<SourceConfig> {
    [
        ("SBU Data/2025 Purchase orders - ED&C.xlsx", "ED&C"),
        ("SBU Data/2025 Purchase orders - GCM.xlsx", "GCM"),
        ("SBU Data/2025 Purchase orders - PMC.xlsx", "PMC"),
        ("SBU Data/2025 Purchase orders - TSS.xlsx", "TSS"),
        ("SBU Data/2025 Purchase orders OSS.xlsx", "OSS"),
    ]
    .into_iter()
    .map(|(path, label)| SourceConfig {
        path: PathBuf::from(path),
        business_unit: label.to_string(),
        sheet: None,
        columns: ColumnMapping::default(),
    })
    .collect()
}

/// Slash dates read month-first when ambiguous; the day-first form only
/// matches when the first field cannot be a month.
fn default_date_formats() -> Vec<String> {
    strings(&[
        "%Y-%m-%d",
        "%Y/%m/%d",
        "%m/%d/%Y",
        "%d/%m/%Y",
        "%d-%m-%Y",
        "%d.%m.%Y",
        "%d-%b-%Y",
        "%d %b %Y",
        "%d %B %Y",
        "%b %d, %Y",
        "%B %d, %Y",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%m/%d/%Y %H:%M:%S",
        "%d/%m/%Y %H:%M:%S",
    ])
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| (*value).to_string()).collect()
}
