//! CLI execution context.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, Result};
use turbo_db::Db;
use turbo_shop::{HttpGateway, Shop, ShopConfig};

use crate::output::Output;

/// Config file names searched from the working directory upward.
pub const CONFIG_NAMES: [&str; 3] = ["shop.toml", ".shop.toml", "shop.json"];

/// Execution context for CLI commands.
pub struct Context {
    /// Shop configuration, with environment overrides applied.
    pub config: ShopConfig,
    /// File the configuration came from, if any.
    pub config_path: Option<PathBuf>,
    /// Output handler.
    pub output: Output,
    /// Working directory.
    pub cwd: PathBuf,
}

impl Context {
    /// Load context from a config file, or the nearest `shop.toml`.
    pub fn load(config_path: Option<&str>, output: Output) -> Result<Self> {
        let cwd = std::env::current_dir().context("Failed to get current directory")?;

        let path = match config_path {
            Some(path) => Some(resolve(&cwd, path)),
            None => find_config(&cwd),
        };
        let config = match &path {
            Some(path) => ShopConfig::load(path)
                .with_context(|| format!("Failed to load config: {}", path.display()))?,
            None => ShopConfig::default(),
        };

        Ok(Self {
            config: config.with_env_overrides(),
            config_path: path,
            output,
            cwd,
        })
    }

    /// Store file to use: `override_path` if given, else the configured one.
    pub fn store_path(&self, override_path: Option<&str>) -> Option<PathBuf> {
        override_path
            .map(|p| resolve(&self.cwd, p))
            .or_else(|| self.config.store.path.as_deref().map(|p| self.cwd.join(p)))
    }

    /// Open the redb store at `path`, creating it if needed. Without a path
    /// the store lives in memory and is gone when the command exits.
    pub fn open_store(&self, path: Option<&Path>) -> Result<Db> {
        match path {
            Some(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent).with_context(|| {
                        format!("Failed to create store directory: {}", parent.display())
                    })?;
                }
                self.output.debug(&format!("Opening store {}", path.display()));
                Db::open(path).with_context(|| {
                    format!(
                        "Failed to open store {} (is another shop process using it?)",
                        path.display()
                    )
                })
            }
            None => {
                self.output
                    .warn("No store path configured, using an in-memory store");
                Db::in_memory().context("Failed to create in-memory store")
            }
        }
    }

    /// Assemble the services over `db`. The HTTP gateway is wired in only
    /// when a base URL is configured.
    pub fn shop(&self, db: Db) -> Result<Shop> {
        let mut builder = Shop::builder(db).config(self.config.clone());
        if self.config.gateway.base_url.is_some() {
            let gateway = HttpGateway::new(&self.config.gateway)
                .context("Failed to set up payment gateway client")?;
            builder = builder.gateway(Arc::new(gateway));
        }
        Ok(builder.build())
    }
}

fn resolve(cwd: &Path, path: &str) -> PathBuf {
    let path = PathBuf::from(path);
    if path.is_absolute() {
        path
    } else {
        cwd.join(path)
    }
}

/// Find a config file in the directory tree.
fn find_config(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();
    loop {
        for name in &CONFIG_NAMES {
            let candidate = current.join(name);
            if candidate.exists() {
                return Some(candidate);
            }
        }
        if !current.pop() {
            return None;
        }
    }
}
