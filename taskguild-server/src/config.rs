use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

use task_core::agent::{PermissionMode, PermissionPolicy};
use task_core::agent_pool::AgentClassConfig;
use task_core::ScalingConfig;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub daemon: DaemonConfig,
    pub worktrees: WorktreeConfig,
    #[serde(default)]
    pub agents: Vec<AgentClassSettings>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    /// Optional database URL. If not provided, defaults to ~/taskguild.sqlite
    pub url: Option<String>,
    pub max_connections: u32,
    pub connection_timeout: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub port: u16,
    /// Reserved for a future multi-listener mode; the daemon currently runs
    /// one axum listener regardless of this value.
    pub workers: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
    Compact,
}

/// Where the daemon's static process DAG lives on disk, plus shutdown
/// timing.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DaemonConfig {
    pub task_definition_path: String,
    /// How long `Stop` waits for every agent and the event bus to drain
    /// before giving up and returning anyway. Default 30s.
    #[serde(default = "default_shutdown_drain_window_secs")]
    pub shutdown_drain_window_secs: u64,
}

fn default_shutdown_drain_window_secs() -> u64 {
    30
}

/// Root directory new git worktrees are provisioned under.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WorktreeConfig {
    pub base_dir: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PermissionModeSetting {
    #[default]
    Default,
    AcceptEdits,
    BypassPermissions,
}

impl From<PermissionModeSetting> for PermissionMode {
    fn from(setting: PermissionModeSetting) -> Self {
        match setting {
            PermissionModeSetting::Default => PermissionMode::Default,
            PermissionModeSetting::AcceptEdits => PermissionMode::AcceptEdits,
            PermissionModeSetting::BypassPermissions => PermissionMode::BypassPermissions,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ScalingSettings {
    pub min: u32,
    pub max: u32,
    #[serde(default)]
    pub auto: bool,
}

impl From<ScalingSettings> for ScalingConfig {
    fn from(settings: ScalingSettings) -> Self {
        ScalingConfig { min: settings.min, max: settings.max, auto: settings.auto }
    }
}

/// One agent class: the process it drives, the instructions handed to its
/// runtime, and its scaling/permission policy.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AgentClassSettings {
    pub class: String,
    pub process_name: String,
    pub instructions: String,
    #[serde(default)]
    pub scaling: Option<ScalingSettings>,
    #[serde(default)]
    pub permission_mode: PermissionModeSetting,
}

impl AgentClassSettings {
    fn validate(&self) -> Result<()> {
        if self.class.trim().is_empty() {
            return Err(anyhow::anyhow!("agent class name cannot be empty"));
        }
        if self.process_name.trim().is_empty() {
            return Err(anyhow::anyhow!("agent class '{}' has no process_name", self.class));
        }
        if let Some(scaling) = &self.scaling {
            if scaling.max < scaling.min {
                return Err(anyhow::anyhow!(
                    "agent class '{}' has scaling.max < scaling.min",
                    self.class
                ));
            }
        }
        Ok(())
    }
}

impl From<AgentClassSettings> for AgentClassConfig {
    fn from(settings: AgentClassSettings) -> Self {
        let mut permission_policy = PermissionPolicy::default();
        permission_policy.mode = settings.permission_mode.into();
        AgentClassConfig {
            class: settings.class,
            process_name: settings.process_name,
            instructions: settings.instructions,
            scaling: settings.scaling.map(Into::into),
            permission_policy,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        builder = builder.add_source(File::from_str(include_str!("../config/default.toml"), FileFormat::Toml));

        if let Ok(config_file) = env::var("CONFIG_FILE") {
            builder = builder.add_source(File::with_name(&config_file).required(false).format(FileFormat::Toml));
        }

        builder = builder.add_source(Environment::with_prefix("TASKGUILD").separator("_").try_parsing(true));

        let config = builder.build().context("Failed to build configuration")?;

        let mut result: Config = config.try_deserialize().context("Failed to deserialize configuration")?;
        Self::apply_standard_env_vars(&mut result);

        Ok(result)
    }

    pub fn from_file(path: &str) -> Result<Self> {
        let builder = ConfigBuilder::builder()
            .add_source(File::from_str(include_str!("../config/default.toml"), FileFormat::Toml))
            .add_source(File::with_name(path).format(FileFormat::Toml))
            .add_source(Environment::with_prefix("TASKGUILD").separator("_").try_parsing(true));

        let config = builder.build().context("Failed to build configuration from file")?;

        let mut result: Config = config.try_deserialize().context("Failed to deserialize configuration from file")?;
        Self::apply_standard_env_vars(&mut result);
        Ok(result)
    }

    fn apply_standard_env_vars(config: &mut Config) {
        if let Ok(database_url) = env::var("DATABASE_URL") {
            config.database.url = Some(database_url);
        }
        if let Ok(listen_addr) = env::var("LISTEN_ADDR") {
            config.server.listen_addr = listen_addr;
        }
        if let Ok(log_level) = env::var("LOG_LEVEL") {
            config.logging.level = log_level;
        }
        if let Ok(task_definition_path) = env::var("TASK_DEFINITION_PATH") {
            config.daemon.task_definition_path = task_definition_path;
        }
    }

    pub fn database_url(&self) -> String {
        match &self.database.url {
            Some(url) => url.clone(),
            None => Self::default_database_url(),
        }
    }

    pub fn default_database_url() -> String {
        if let Ok(xdg_data) = env::var("XDG_DATA_HOME") {
            return format!("sqlite://{xdg_data}/taskguild/taskguild.sqlite");
        }

        let home = env::var("HOME").or_else(|_| env::var("USERPROFILE")).unwrap_or_else(|_| ".".to_string());
        format!("sqlite://{home}/taskguild.sqlite")
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.listen_addr, self.server.port)
    }

    pub fn validate(&self) -> Result<()> {
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(anyhow::anyhow!(
                    "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                    self.logging.level
                ));
            }
        }

        let database_url = self.database_url();
        if !database_url.starts_with("sqlite://") {
            return Err(anyhow::anyhow!(
                "Only SQLite databases are supported. URL must start with 'sqlite://'. Got: {}",
                database_url
            ));
        }

        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }
        if self.server.workers == 0 {
            return Err(anyhow::anyhow!("Server workers must be greater than 0"));
        }
        if self.database.max_connections == 0 {
            return Err(anyhow::anyhow!("Database max_connections must be greater than 0"));
        }
        if self.daemon.task_definition_path.trim().is_empty() {
            return Err(anyhow::anyhow!("daemon.task_definition_path cannot be empty"));
        }
        if self.worktrees.base_dir.trim().is_empty() {
            return Err(anyhow::anyhow!("worktrees.base_dir cannot be empty"));
        }
        if self.daemon.shutdown_drain_window_secs == 0 {
            return Err(anyhow::anyhow!("daemon.shutdown_drain_window_secs must be greater than 0"));
        }
        for agent in &self.agents {
            agent.validate()?;
        }

        Ok(())
    }

    pub fn agent_classes(&self) -> Vec<AgentClassConfig> {
        self.agents.iter().cloned().map(Into::into).collect()
    }

    pub fn shutdown_drain_window(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.daemon.shutdown_drain_window_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig { url: None, max_connections: 5, connection_timeout: 30 },
            server: ServerConfig { listen_addr: "127.0.0.1".to_string(), port: 3000, workers: 4 },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Pretty },
            daemon: DaemonConfig {
                task_definition_path: "taskdef.yaml".to_string(),
                shutdown_drain_window_secs: default_shutdown_drain_window_secs(),
            },
            worktrees: WorktreeConfig { base_dir: ".taskguild/worktrees".to_string() },
            agents: Vec::new(),
        }
    }
}

#[allow(dead_code)]
pub fn default_database_path() -> PathBuf {
    let home = env::var("HOME").or_else(|_| env::var("USERPROFILE")).unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join("taskguild.sqlite")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_expected_values() {
        let config = Config::default();
        assert_eq!(config.server.listen_addr, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.daemon.task_definition_path, "taskdef.yaml");
    }

    #[test]
    fn database_url_falls_back_to_default() {
        let config = Config::default();
        let url = config.database_url();
        assert!(url.starts_with("sqlite://"));
        assert!(url.contains("taskguild.sqlite"));
    }

    #[test]
    fn database_url_honors_override() {
        let mut config = Config::default();
        config.database.url = Some("sqlite://custom.db".to_string());
        assert_eq!(config.database_url(), "sqlite://custom.db");
    }

    #[test]
    fn server_address_formats_host_and_port() {
        let config = Config::default();
        assert_eq!(config.server_address(), "127.0.0.1:3000");
    }

    #[test]
    fn validate_rejects_bad_log_level() {
        let mut config = Config::default();
        config.logging.level = "invalid".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_inverted_agent_scaling() {
        let mut config = Config::default();
        config.agents.push(AgentClassSettings {
            class: "implementer".to_string(),
            process_name: "implement".to_string(),
            instructions: "run.sh".to_string(),
            scaling: Some(ScalingSettings { min: 4, max: 1, auto: true }),
            permission_mode: PermissionModeSetting::Default,
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn agent_classes_converts_settings() {
        let mut config = Config::default();
        config.agents.push(AgentClassSettings {
            class: "implementer".to_string(),
            process_name: "implement".to_string(),
            instructions: "run.sh".to_string(),
            scaling: Some(ScalingSettings { min: 1, max: 3, auto: true }),
            permission_mode: PermissionModeSetting::AcceptEdits,
        });
        let classes = config.agent_classes();
        assert_eq!(classes.len(), 1);
        assert_eq!(classes[0].class, "implementer");
        assert_eq!(classes[0].scaling.unwrap().max, 3);
    }
}
