use std::path::PathBuf;

use anyhow::{Context, Result};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use serde::Deserialize;

pub const PRIVATE_LAWS_URL: &str = "http://www.knesset.gov.il/privatelaw/Plaw_display.asp?lawtp=1";
pub const GOV_LAWS_URL: &str = "http://www.knesset.gov.il/laws/heb/template.asp?Type=4";
pub const PRIVATE_LAW_TEXT_BASE: &str = "http://www.knesset.gov.il/privatelaw";
pub const PDF_BASE: &str = "http://www.knesset.gov.il";

/// Runtime settings: built-in defaults, then `knesset_ingest.toml` if
/// present, then `KI_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub db_path: PathBuf,
    pub cache_dir: PathBuf,
    pub private_laws_url: String,
    pub gov_laws_url: String,
    pub private_law_text_base: String,
    pub pdf_base: String,
    pub timeout_secs: u64,
    pub user_agent: String,
    /// JSON-lines file receiving alerts, in addition to the log.
    pub alerts_path: Option<PathBuf>,
}

impl Settings {
    pub fn load() -> Result<Settings> {
        defaults()?
            .add_source(File::with_name("knesset_ingest").required(false))
            .add_source(Environment::with_prefix("KI"))
            .build()?
            .try_deserialize()
            .context("Invalid settings")
    }
}

fn defaults() -> Result<ConfigBuilder<DefaultState>> {
    Ok(Config::builder()
        .set_default("db_path", "data/knesset.sqlite")?
        .set_default("cache_dir", "data/files")?
        .set_default("private_laws_url", PRIVATE_LAWS_URL)?
        .set_default("gov_laws_url", GOV_LAWS_URL)?
        .set_default("private_law_text_base", PRIVATE_LAW_TEXT_BASE)?
        .set_default("pdf_base", PDF_BASE)?
        .set_default("timeout_secs", 60)?
        .set_default("user_agent", concat!("knesset_ingest/", env!("CARGO_PKG_VERSION")))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_source_site() {
        let s: Settings = defaults().unwrap().build().unwrap().try_deserialize().unwrap();
        assert_eq!(s.gov_laws_url, GOV_LAWS_URL);
        assert_eq!(s.pdf_base, PDF_BASE);
        assert_eq!(s.timeout_secs, 60);
        assert_eq!(s.alerts_path, None);
    }

    #[test]
    fn toml_overrides_defaults() {
        let toml = "timeout_secs = 5\nalerts_path = \"alerts.jsonl\"\n";
        let s: Settings = defaults()
            .unwrap()
            .add_source(File::from_str(toml, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(s.timeout_secs, 5);
        assert_eq!(s.alerts_path, Some(PathBuf::from("alerts.jsonl")));
        assert_eq!(s.private_laws_url, PRIVATE_LAWS_URL);
    }
}
