use std::sync::Arc;

use anyhow::{Context, Result};
use database::SqliteTaskRepository;
use task_core::agent_pool::AgentPool;
use task_core::event_bus::EventBus;
use task_core::interaction::InteractionService;
use task_core::process_event_bus::ProcessEventBus;
use task_core::task_service::TaskService;
use task_core::task_store::TaskStore;
use task_core::TaskDefinition;
use taskguild_protocol::TaskGuildHandler;
use tracing::info;

use crate::command_runtime::ShellAgentRuntimeFactory;
use crate::config::Config;
use crate::worktree::GitWorktreeManager;

/// Create a task repository based on the complete configuration.
pub async fn create_repository(config: &Config) -> Result<Arc<SqliteTaskRepository>> {
    info!("Creating task repository");

    let database_url = config.database_url();
    info!("Using database URL: {}", database_url);

    let repo = SqliteTaskRepository::new(&database_url).await.context("Failed to create SQLite repository")?;

    info!("Running database migrations");
    repo.migrate().await.context("Failed to run database migrations")?;

    info!("Task repository created successfully");
    Ok(Arc::new(repo))
}

/// Load and validate the static process DAG the daemon instantiates every
/// task against.
pub fn load_task_definition(config: &Config) -> Result<Arc<TaskDefinition>> {
    let document = std::fs::read_to_string(&config.daemon.task_definition_path)
        .with_context(|| format!("Failed to read task definition at {}", config.daemon.task_definition_path))?;
    let definition = TaskDefinition::from_yaml(&document).context("Failed to parse task definition")?;
    Ok(Arc::new(definition))
}

/// Everything the daemon's RPC surface and agent pool run against, wired up
/// and ready to start.
pub struct Application {
    pub handler: Arc<TaskGuildHandler>,
    pub agent_pool: Arc<AgentPool>,
    pub domain_events: Arc<EventBus>,
}

/// Initialize the complete application: repository, task definition, core
/// services, agent pool, and the RPC handler that fronts them.
pub async fn initialize_app(config: &Config) -> Result<Application> {
    info!("Initializing application");

    let repository = create_repository(config).await.context("Failed to create repository")?;
    let definition = load_task_definition(config).context("Failed to load task definition")?;

    let process_events = Arc::new(ProcessEventBus::new());
    let domain_events = Arc::new(EventBus::new());
    let interactions = Arc::new(InteractionService::new());
    let store = Arc::new(TaskStore::new(repository, process_events, domain_events.clone(), interactions.clone()));
    let tasks = Arc::new(TaskService::new(store, definition));

    let worktree_base = std::path::PathBuf::from(&config.worktrees.base_dir);
    std::fs::create_dir_all(&worktree_base).context("Failed to create worktree base directory")?;
    let worktree_manager = Arc::new(GitWorktreeManager::new(std::env::current_dir()?, worktree_base));
    let runtime_factory = Arc::new(ShellAgentRuntimeFactory);

    let agent_pool = Arc::new(AgentPool::new(
        config.agent_classes(),
        runtime_factory,
        worktree_manager,
        tasks.clone(),
        interactions.clone(),
        domain_events.clone(),
    ));

    let handler = Arc::new(TaskGuildHandler::new(tasks, interactions, domain_events.clone(), agent_pool.clone()));

    info!("Application initialized successfully");
    Ok(Application { handler, agent_pool, domain_events })
}

/// Ensure the database file's parent directory exists.
pub fn ensure_database_directory_from_config(config: &Config) -> Result<()> {
    ensure_database_directory(&config.database_url())
}

pub fn ensure_database_directory(database_url: &str) -> Result<()> {
    if let Some(db_path) = database_url.strip_prefix("sqlite://") {
        if let Some(parent) = std::path::Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                info!("Creating database directory: {}", parent.display());
                std::fs::create_dir_all(parent).context("Failed to create database directory")?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DaemonConfig, DatabaseConfig, LogFormat, LoggingConfig, ServerConfig, WorktreeConfig};
    use tempfile::TempDir;

    fn base_config(database_url: Option<String>, task_definition_path: String) -> Config {
        Config {
            database: DatabaseConfig { url: database_url, max_connections: 5, connection_timeout: 30 },
            server: ServerConfig { listen_addr: "127.0.0.1".to_string(), port: 3000, workers: 4 },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Pretty },
            daemon: DaemonConfig { task_definition_path, shutdown_drain_window_secs: 30 },
            worktrees: WorktreeConfig { base_dir: ".taskguild/worktrees".to_string() },
            agents: Vec::new(),
        }
    }

    #[tokio::test]
    async fn create_repository_with_custom_url() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let database_url = format!("sqlite://{}", db_path.display());

        let config = base_config(Some(database_url), "taskdef.yaml".to_string());
        let repo = create_repository(&config).await;
        assert!(repo.is_ok());
    }

    #[tokio::test]
    async fn create_repository_rejects_non_sqlite_url() {
        let config = base_config(Some("postgres://invalid".to_string()), "taskdef.yaml".to_string());
        let repo = create_repository(&config).await;
        assert!(repo.is_err());
    }

    #[test]
    fn ensure_database_directory_creates_missing_parent() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("subdir").join("test.db");
        let database_url = format!("sqlite://{}", db_path.display());

        assert!(ensure_database_directory(&database_url).is_ok());
        assert!(db_path.parent().unwrap().exists());
    }

    #[test]
    fn load_task_definition_parses_yaml_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("taskdef.yaml");
        std::fs::write(
            &path,
            "processes:\n  - name: implement\n  - name: review\n    depends_on: [implement]\non_all_complete: close\n",
        )
        .unwrap();

        let config = base_config(None, path.to_string_lossy().to_string());
        let definition = load_task_definition(&config).unwrap();
        assert!(definition.get_process("implement").is_some());
    }
}
