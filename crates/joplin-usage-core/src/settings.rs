use crate::api::DEFAULT_PAGE_SIZE;
use crate::engine::{ReportOptions, DEFAULT_PLACEHOLDER_BODY, DEFAULT_REPORT_TITLE};
use crate::http::JoplinHttpConfig;
use crate::resolver::MAX_LINKAGE_WORKERS;
use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:41184";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct UsageSettings {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    #[serde(default)]
    pub api: ApiSettings,
    #[serde(default)]
    pub report: ReportSettings,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReportSettings {
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_report_title")]
    pub title: String,
    #[serde(default = "default_placeholder_body")]
    pub placeholder_body: String,
    #[serde(default = "default_linkage_concurrency")]
    pub linkage_concurrency: usize,
    /// Notebook id or exact title that receives the report.
    #[serde(default)]
    pub target_notebook: Option<String>,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token: None,
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            title: default_report_title(),
            placeholder_body: default_placeholder_body(),
            linkage_concurrency: default_linkage_concurrency(),
            target_notebook: None,
        }
    }
}

impl Default for UsageSettings {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            api: ApiSettings::default(),
            report: ReportSettings::default(),
        }
    }
}

impl UsageSettings {
    pub fn apply_env(&mut self) {
        self.apply_env_with(|name| std::env::var(name).ok());
    }

    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        if let Some(value) = get("JOPLIN_USAGE_URL") {
            self.api.base_url = value;
        }
        if let Some(value) = get("JOPLIN_USAGE_TOKEN") {
            self.api.token = Some(value);
        }
        if let Some(value) = get("JOPLIN_USAGE_TIMEOUT_MS").and_then(|v| v.parse::<u64>().ok()) {
            self.api.timeout_ms = value;
        }
        if let Some(value) = get("JOPLIN_USAGE_NOTEBOOK") {
            self.report.target_notebook = Some(value);
        }
        if let Some(value) = get("JOPLIN_USAGE_CONCURRENCY").and_then(|v| v.parse::<usize>().ok())
        {
            self.report.linkage_concurrency = value;
        }
    }

    /// Clamps numeric fields into their supported ranges and restores
    /// defaults for blank strings.
    pub fn normalized(&self) -> UsageSettings {
        let mut out = self.clone();
        out.api.timeout_ms = out.api.timeout_ms.max(1_000);
        if out.api.base_url.trim().is_empty() {
            out.api.base_url = default_base_url();
        }
        out.api.token = out
            .api
            .token
            .take()
            .filter(|token| !token.trim().is_empty());
        out.report.page_size = out.report.page_size.clamp(1, DEFAULT_PAGE_SIZE);
        out.report.linkage_concurrency = out
            .report
            .linkage_concurrency
            .clamp(1, MAX_LINKAGE_WORKERS);
        if out.report.title.trim().is_empty() {
            out.report.title = default_report_title();
        }
        if out.report.placeholder_body.trim().is_empty() {
            out.report.placeholder_body = default_placeholder_body();
        }
        out.report.target_notebook = out
            .report
            .target_notebook
            .take()
            .map(|target| target.trim().to_string())
            .filter(|target| !target.is_empty());
        out
    }

    pub fn report_options(&self) -> ReportOptions {
        let settings = self.normalized();
        ReportOptions {
            page_size: settings.report.page_size,
            linkage_concurrency: settings.report.linkage_concurrency,
            title: settings.report.title,
            placeholder_body: settings.report.placeholder_body,
            dry_run: false,
        }
    }

    pub fn http_config(&self) -> JoplinHttpConfig {
        let settings = self.normalized();
        JoplinHttpConfig {
            base_url: settings.api.base_url,
            token: settings.api.token,
            timeout_ms: settings.api.timeout_ms,
            target_notebook: settings.report.target_notebook,
        }
    }
}

pub fn app_config_dir() -> PathBuf {
    if let Ok(path) = std::env::var("JOPLIN_USAGE_CONFIG") {
        let path = path.trim();
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    if cfg!(target_os = "windows") {
        if let Ok(appdata) = std::env::var("APPDATA") {
            let appdata = appdata.trim();
            if !appdata.is_empty() {
                return Path::new(appdata).join("JoplinUsage");
            }
        }
    }

    if let Ok(home) = std::env::var("HOME") {
        let home = home.trim();
        if !home.is_empty() {
            return Path::new(home).join(".config").join("joplin-usage");
        }
    }

    PathBuf::from(".joplin-usage")
}

pub fn settings_path(config_dir: &Path) -> PathBuf {
    config_dir.join("settings.json")
}

pub fn pending_ledger_path(config_dir: &Path) -> PathBuf {
    config_dir.join("pending_placeholders.json")
}

pub fn load_settings(config_dir: &Path) -> Result<UsageSettings> {
    let path = settings_path(config_dir);
    if !path.exists() {
        return Ok(UsageSettings::default());
    }

    let raw = fs::read_to_string(&path)
        .with_context(|| format!("read settings file: {}", path.display()))?;
    let settings: UsageSettings = serde_json::from_str(&raw)
        .with_context(|| format!("parse settings file: {}", path.display()))?;
    Ok(settings)
}

/// File settings with the environment layered on top.
pub fn load_effective_settings(config_dir: &Path) -> Result<UsageSettings> {
    let mut settings = load_settings(config_dir)?;
    settings.apply_env();
    Ok(settings)
}

pub fn save_settings(config_dir: &Path, settings: &UsageSettings) -> Result<()> {
    let path = settings_path(config_dir);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create config dir: {}", parent.display()))?;
    }

    let json = serde_json::to_string_pretty(settings)?;
    fs::write(&path, json).with_context(|| format!("write settings file: {}", path.display()))?;
    Ok(())
}

const fn default_schema_version() -> u32 {
    1
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

const fn default_timeout_ms() -> u64 {
    30_000
}

const fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_report_title() -> String {
    DEFAULT_REPORT_TITLE.to_string()
}

fn default_placeholder_body() -> String {
    DEFAULT_PLACEHOLDER_BODY.to_string()
}

const fn default_linkage_concurrency() -> usize {
    1
}
