use anyhow::{anyhow, bail, Context, Result};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use glass_salt_adapter::{DemoSettings, EventFilter, SaltSettings, SourceSettings};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_ENV: &str = "SALT_GLASS_CONFIG";
pub const SOURCE_ENV: &str = "SALT_GLASS_SOURCE";
pub const LOG_DIR_ENV: &str = "SALT_GLASS_LOG_DIR";
pub const QUIT_KEY_ENV: &str = "SALT_GLASS_QUIT_KEY";

const DEFAULT_QUIT_KEY: &str = "f12";
const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 1500;

#[derive(clap::Args, Debug, Clone, Default)]
pub struct DashboardArgs {
    /// Path to a TOML config file.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Data source: "salt" or "demo".
    #[arg(long)]
    pub source: Option<String>,
    #[arg(long)]
    pub salt_config_dir: Option<PathBuf>,
    #[arg(long)]
    pub log_dir: Option<PathBuf>,
    /// Key that exits the dashboard, e.g. f12, q or ctrl-q.
    #[arg(long)]
    pub quit_key: Option<String>,
    /// Only show events whose tag starts with this prefix. Repeatable.
    #[arg(long = "event-filter")]
    pub event_filter: Vec<String>,
    #[arg(long, default_value_t = false)]
    pub debug: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub log_dir: Option<PathBuf>,
    pub source: SourceSection,
    pub events: EventsSection,
    pub ui: UiSection,
    pub supervisor: SupervisorSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSection {
    pub kind: String,
    pub salt: SaltSettings,
    pub demo: DemoSettings,
}

impl Default for SourceSection {
    fn default() -> Self {
        Self {
            kind: "salt".to_string(),
            salt: SaltSettings::default(),
            demo: DemoSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsSection {
    pub tag_prefixes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiSection {
    pub quit_key: String,
}

impl Default for UiSection {
    fn default() -> Self {
        Self {
            quit_key: DEFAULT_QUIT_KEY.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorSection {
    pub shutdown_grace_ms: u64,
}

impl Default for SupervisorSection {
    fn default() -> Self {
        Self {
            shutdown_grace_ms: DEFAULT_SHUTDOWN_GRACE_MS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub source: SourceSettings,
    pub event_filter: EventFilter,
    pub quit_key: KeySpec,
    pub shutdown_grace: Duration,
    pub log_dir: Option<PathBuf>,
    pub debug: bool,
    pub config_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeySpec {
    pub code: KeyCode,
    pub modifiers: KeyModifiers,
}

impl KeySpec {
    pub fn matches(&self, key: &KeyEvent) -> bool {
        let relevant = KeyModifiers::CONTROL | KeyModifiers::ALT;
        key.code == self.code && (key.modifiers & relevant) == (self.modifiers & relevant)
    }

    pub fn label(&self) -> String {
        let base = match self.code {
            KeyCode::F(n) => format!("F{n}"),
            KeyCode::Esc => "Esc".to_string(),
            KeyCode::Char(c) => c.to_string(),
            other => format!("{other:?}"),
        };
        if self.modifiers.contains(KeyModifiers::CONTROL) {
            format!("Ctrl-{base}")
        } else {
            base
        }
    }
}

impl Default for KeySpec {
    fn default() -> Self {
        Self {
            code: KeyCode::F(12),
            modifiers: KeyModifiers::NONE,
        }
    }
}

pub fn parse_key_spec(raw: &str) -> Result<KeySpec> {
    let trimmed = raw.trim();
    let lowered = trimmed.to_ascii_lowercase();
    for prefix in ["ctrl-", "ctrl+", "c-"] {
        if lowered.starts_with(prefix) && trimmed.len() > prefix.len() {
            let rest = &trimmed[prefix.len()..];
            let mut chars = rest.chars();
            return match (chars.next(), chars.next()) {
                (Some(ch), None) if ch.is_ascii_alphanumeric() => Ok(KeySpec {
                    code: KeyCode::Char(ch.to_ascii_lowercase()),
                    modifiers: KeyModifiers::CONTROL,
                }),
                _ => Err(anyhow!("unsupported control key: {raw}")),
            };
        }
    }
    if lowered == "esc" || lowered == "escape" {
        return Ok(KeySpec {
            code: KeyCode::Esc,
            modifiers: KeyModifiers::NONE,
        });
    }
    if let Some(number) = lowered.strip_prefix('f') {
        if let Ok(n) = number.parse::<u8>() {
            if (1..=12).contains(&n) {
                return Ok(KeySpec {
                    code: KeyCode::F(n),
                    modifiers: KeyModifiers::NONE,
                });
            }
            bail!("function key out of range: {raw}");
        }
    }
    let mut chars = trimmed.chars();
    match (chars.next(), chars.next()) {
        (Some(ch), None) if !ch.is_whitespace() => Ok(KeySpec {
            code: KeyCode::Char(ch),
            modifiers: KeyModifiers::NONE,
        }),
        _ => Err(anyhow!("unsupported key: {raw:?}")),
    }
}

pub fn load_config(args: &DashboardArgs) -> Result<Config> {
    let env = |name: &str| std::env::var(name).ok().filter(|value| !value.trim().is_empty());
    let path = resolve_config_path(args.config.as_deref(), &env);
    let file = match &path {
        Some(path) => load_file_config(path, args.config.is_some())?,
        None => FileConfig::default(),
    };
    let mut config = resolve(file, &env, args)?;
    config.config_path = path;
    Ok(config)
}

fn resolve_config_path(explicit: Option<&Path>, env: &dyn Fn(&str) -> Option<String>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Some(path) = env(CONFIG_ENV) {
        return Some(PathBuf::from(path));
    }
    let config_dir = env("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| env("HOME").map(|home| PathBuf::from(home).join(".config")))?;
    Some(config_dir.join("salt-glass").join("config.toml"))
}

fn load_file_config(path: &Path, required: bool) -> Result<FileConfig> {
    if !path.exists() {
        if required {
            bail!("config file not found: {}", path.display());
        }
        return Ok(FileConfig::default());
    }
    let contents =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    toml::from_str(&contents).with_context(|| format!("invalid config in {}", path.display()))
}

/// Layers environment and command line over the file config.
pub fn resolve(
    file: FileConfig,
    env: &dyn Fn(&str) -> Option<String>,
    args: &DashboardArgs,
) -> Result<Config> {
    let FileConfig {
        log_dir,
        source,
        events,
        ui,
        supervisor,
    } = file;

    let kind = args
        .source
        .clone()
        .or_else(|| env(SOURCE_ENV))
        .unwrap_or(source.kind);
    let source = match kind.trim().to_ascii_lowercase().as_str() {
        "salt" => {
            let mut salt = source.salt;
            if let Some(dir) = &args.salt_config_dir {
                salt.config_dir = dir.clone();
            }
            SourceSettings::Salt(salt)
        }
        "demo" => SourceSettings::Demo(source.demo),
        other => bail!("unknown source kind: {other} (expected salt or demo)"),
    };

    let log_dir = args
        .log_dir
        .clone()
        .or_else(|| env(LOG_DIR_ENV).map(PathBuf::from))
        .or(log_dir);

    let quit_raw = args
        .quit_key
        .clone()
        .or_else(|| env(QUIT_KEY_ENV))
        .unwrap_or(ui.quit_key);
    let quit_key = parse_key_spec(&quit_raw).context("invalid quit key")?;

    let event_filter = if args.event_filter.is_empty() {
        EventFilter::new(&events.tag_prefixes)
    } else {
        EventFilter::new(&args.event_filter)
    };

    Ok(Config {
        source,
        event_filter,
        quit_key,
        shutdown_grace: Duration::from_millis(supervisor.shutdown_grace_ms),
        log_dir,
        debug: args.debug,
        config_path: None,
    })
}
