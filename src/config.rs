use std::path::PathBuf;
use std::time::Duration;

use log::{debug, info, warn};
use serde::Deserialize;

use crate::query::QueryMode;
use crate::session::COLUMN_CHOICES;
use crate::viewport::{LOOKAHEAD_ROWS, RowHeights};

pub const DEFAULT_SERVER: &str = "http://localhost:8080";
pub const DEFAULT_PATTERN: &str = "gs://wlt-public-sandbox/imgrid-takehome/%exp%/%class%_00.jpg";
pub const DEFAULT_PAGE_SIZE: u32 = 120;
pub const MIN_PAGE_SIZE: u32 = 25;
pub const MAX_PAGE_SIZE: u32 = 500;
/// Tallest header or image row, in terminal cells.
pub const MAX_ROW_HEIGHT: u16 = 64;

// ---------------------------------------------------------------------------
// ConfigFile — deserialized from TOML (all fields optional)
// ---------------------------------------------------------------------------

#[derive(Default, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub server: Option<String>,
    pub pattern: Option<String>,
    pub mode: Option<QueryMode>,
    pub page_size: Option<u32>,
    pub request_timeout_ms: Option<u64>,
    #[serde(default)]
    pub grid: GridConfigFile,
    #[serde(default)]
    pub viewer: ViewerConfigFile,
}

#[derive(Default, Deserialize)]
#[serde(default)]
pub struct GridConfigFile {
    pub columns: Option<usize>,
    pub group_by: Option<String>,
    pub header_height: Option<u16>,
    pub image_row_height: Option<u16>,
    pub lookahead_rows: Option<usize>,
}

#[derive(Default, Deserialize)]
#[serde(default)]
pub struct ViewerConfigFile {
    pub frame_budget_ms: Option<u64>,
    pub max_image_bytes: Option<u64>,
}

// ---------------------------------------------------------------------------
// Config — resolved (all fields concrete)
// ---------------------------------------------------------------------------

pub struct Config {
    pub server: String,
    pub pattern: String,
    pub mode: QueryMode,
    pub page_size: u32,
    pub request_timeout: Duration,
    pub grid: GridConfig,
    pub viewer: ViewerConfig,
}

pub struct GridConfig {
    pub columns: usize,
    pub group_by: Option<String>,
    pub heights: RowHeights,
    pub lookahead_rows: usize,
}

pub struct ViewerConfig {
    pub frame_budget: Duration,
    pub max_image_bytes: u64,
}

/// Values given on the command line. `None` means "not given".
#[derive(Default, Clone)]
pub struct CliOverrides {
    pub server: Option<String>,
    pub pattern: Option<String>,
    pub mode: Option<QueryMode>,
    pub page_size: Option<u32>,
    pub columns: Option<usize>,
    pub group_by: Option<String>,
}

impl ConfigFile {
    /// Merge CLI values (overwrites non-None fields).
    pub fn merge_cli(&mut self, cli: &CliOverrides) {
        if let Some(ref v) = cli.server {
            debug!("config: CLI override server={v}");
            self.server = Some(v.clone());
        }
        if let Some(ref v) = cli.pattern {
            debug!("config: CLI override pattern={v}");
            self.pattern = Some(v.clone());
        }
        if let Some(v) = cli.mode {
            debug!("config: CLI override mode={v}");
            self.mode = Some(v);
        }
        if let Some(v) = cli.page_size {
            debug!("config: CLI override page_size={v}");
            self.page_size = Some(v);
        }
        if let Some(v) = cli.columns {
            debug!("config: CLI override columns={v}");
            self.grid.columns = Some(v);
        }
        if let Some(ref v) = cli.group_by {
            debug!("config: CLI override group_by={v}");
            self.grid.group_by = Some(v.clone());
        }
    }

    /// Resolve to a Config by applying defaults to missing fields.
    pub fn resolve(self) -> Config {
        let defaults = RowHeights::default();
        let page_size = self
            .page_size
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(MIN_PAGE_SIZE, MAX_PAGE_SIZE);
        let columns = match self.grid.columns {
            Some(c) if COLUMN_CHOICES.contains(&c) => c,
            Some(c) => {
                warn!("config: columns={c} not one of {COLUMN_CHOICES:?}, using 4");
                4
            }
            None => 4,
        };
        let config = Config {
            server: self
                .server
                .map(|s| s.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_SERVER.into()),
            pattern: self.pattern.unwrap_or_else(|| DEFAULT_PATTERN.into()),
            mode: self.mode.unwrap_or_default(),
            page_size,
            request_timeout: Duration::from_millis(self.request_timeout_ms.unwrap_or(15_000)),
            grid: GridConfig {
                columns,
                group_by: self.grid.group_by.filter(|g| !g.is_empty()),
                heights: RowHeights {
                    header: row_height("header_height", self.grid.header_height, defaults.header),
                    images: row_height("image_row_height", self.grid.image_row_height, defaults.images),
                },
                lookahead_rows: self.grid.lookahead_rows.unwrap_or(LOOKAHEAD_ROWS),
            },
            viewer: ViewerConfig {
                frame_budget: Duration::from_millis(self.viewer.frame_budget_ms.unwrap_or(32)),
                max_image_bytes: self.viewer.max_image_bytes.unwrap_or(20 * 1024 * 1024),
            },
        };
        info!(
            "config: resolved server={}, pattern={:?}, mode={}, page_size={}, \
             request_timeout={}ms, columns={}, group_by={:?}, heights={}/{}, \
             lookahead_rows={}, frame_budget={}ms, max_image_bytes={}",
            config.server,
            config.pattern,
            config.mode,
            config.page_size,
            config.request_timeout.as_millis(),
            config.grid.columns,
            config.grid.group_by,
            config.grid.heights.header,
            config.grid.heights.images,
            config.grid.lookahead_rows,
            config.viewer.frame_budget.as_millis(),
            config.viewer.max_image_bytes,
        );
        config
    }
}

fn row_height(key: &str, value: Option<u16>, default: u16) -> u16 {
    let height = value.unwrap_or(default);
    if height > MAX_ROW_HEIGHT {
        warn!("config: {key}={height} exceeds {MAX_ROW_HEIGHT}, clamping");
    }
    height.clamp(1, MAX_ROW_HEIGHT)
}

/// Resolve the XDG config path for imgrid.
fn config_path() -> Option<PathBuf> {
    let config_dir = std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
    Some(config_dir.join("imgrid").join("config.toml"))
}

/// Load config file. Returns `ConfigFile::default()` if no file exists.
/// Returns an error if the file exists but cannot be parsed.
pub fn load_config() -> anyhow::Result<ConfigFile> {
    let path = match config_path() {
        Some(p) => p,
        None => {
            info!("config: no HOME or XDG_CONFIG_HOME set, using defaults");
            return Ok(ConfigFile::default());
        }
    };
    debug!("config: looking for {}", path.display());
    match std::fs::read_to_string(&path) {
        Ok(text) => {
            info!("config: loaded from {}", path.display());
            let cfg: ConfigFile = toml::from_str(&text)
                .map_err(|e| anyhow::anyhow!("failed to parse {}: {e}", path.display()))?;
            Ok(cfg)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!("config: {} not found, using defaults", path.display());
            Ok(ConfigFile::default())
        }
        Err(e) => Err(anyhow::anyhow!("failed to read {}: {e}", path.display())),
    }
}
