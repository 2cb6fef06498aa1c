use crate::domain::{config::EchoLineConfig, error::{EchoLineError, EchoLineResult}};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

const CONFIG_DIR: &str = ".echoline";
const CONFIG_FILE: &str = "config.toml";

/// Configuration manager
pub struct ConfigManager {
    global_config_path: Option<PathBuf>,
    project_config_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Create new configuration manager
    pub fn new() -> Self {
        Self {
            global_config_path: Self::get_global_config_path(),
            project_config_path: Self::find_project_config_path(),
        }
    }

    /// Manager with explicit locations, mainly for tests and embedding
    pub fn with_paths(global: Option<PathBuf>, project: Option<PathBuf>) -> Self {
        Self {
            global_config_path: global,
            project_config_path: project,
        }
    }

    /// Load configuration: defaults, then the global file, then the project file.
    /// A later layer replaces the earlier one wholesale.
    pub fn load_config(&self) -> EchoLineResult<EchoLineConfig> {
        let mut config = EchoLineConfig::default();

        for path in [&self.global_config_path, &self.project_config_path].into_iter().flatten() {
            if path.exists() {
                debug!("Loading configuration from {}", path.display());
                config = self.load_config_from_path(path)?;
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Get global configuration path
    fn get_global_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".config").join("echoline").join(CONFIG_FILE))
    }

    /// Find project configuration path by walking up directory tree
    fn find_project_config_path() -> Option<PathBuf> {
        let current_dir = std::env::current_dir().ok()?;
        let mut path = current_dir.as_path();

        loop {
            let config_path = path.join(CONFIG_DIR).join(CONFIG_FILE);
            if config_path.exists() {
                return Some(config_path);
            }

            path = path.parent()?;
        }
    }

    /// Load configuration from specific path
    pub fn load_config_from_path(&self, path: &Path) -> EchoLineResult<EchoLineConfig> {
        let content = fs::read_to_string(path).map_err(|e| EchoLineError::Config {
            message: format!("Failed to read config file {}: {}", path.display(), e),
        })?;

        let config: EchoLineConfig = toml::from_str(&content).map_err(|e| EchoLineError::Config {
            message: format!("Failed to parse config file {}: {}", path.display(), e),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to specific path
    pub fn save_config_to_path(&self, path: &Path, config: &EchoLineConfig) -> EchoLineResult<()> {
        let content = toml::to_string_pretty(config).map_err(|e| EchoLineError::Config {
            message: format!("Failed to serialize config: {}", e),
        })?;

        fs::write(path, content).map_err(|e| EchoLineError::Config {
            message: format!("Failed to write config file {}: {}", path.display(), e),
        })
    }

    /// Write a default project configuration under `path/.echoline/`
    pub fn init_project_config(&self, path: &Path) -> EchoLineResult<PathBuf> {
        let config_dir = path.join(CONFIG_DIR);
        let config_file = config_dir.join(CONFIG_FILE);

        if config_file.exists() {
            return Err(EchoLineError::Config {
                message: "Project configuration already exists".to_string(),
            });
        }

        fs::create_dir_all(&config_dir).map_err(|e| EchoLineError::Config {
            message: format!("Failed to create {} directory: {}", CONFIG_DIR, e),
        })?;

        self.save_config_to_path(&config_file, &EchoLineConfig::default())?;
        Ok(config_file)
    }

    /// Get the current project config path (if any)
    pub fn get_project_config_path(&self) -> Option<&PathBuf> {
        self.project_config_path.as_ref()
    }

    /// Get the global config path (if a home directory exists)
    pub fn get_global_config_path_ref(&self) -> Option<&PathBuf> {
        self.global_config_path.as_ref()
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}
