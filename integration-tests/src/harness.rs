//! Process harness for driving a real `taskguild` daemon over HTTP.
//!
//! Spawns the daemon binary against a throwaway sqlite file and task
//! definition, polls `/health` until it answers, and exposes a thin
//! JSON-RPC-style client over `/rpc` for scenario tests to drive.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::{json, Value};
use tokio::process::{Child, Command};
use tokio::time::{sleep, timeout};
use tracing::{debug, info};

const TASK_DEFINITION_YAML: &str = r#"
processes:
  - name: implement
  - name: review
    depends_on: [implement]
  - name: qa
    depends_on: [implement]
on_all_complete: close
"#;

/// Drives a live `taskguild` process through its HTTP RPC surface.
pub struct TaskGuildHarness {
    process: Option<Child>,
    rpc_url: String,
    health_url: String,
    client: reqwest::Client,
    next_id: u64,
}

impl TaskGuildHarness {
    /// Spawn `binary` listening on `port`, rooted at `work_dir`.
    pub async fn spawn(binary: &Path, work_dir: &Path, port: u16) -> Result<Self> {
        tokio::fs::create_dir_all(work_dir).await.context("failed to create test work directory")?;

        let task_definition_path = work_dir.join("taskdef.yaml");
        tokio::fs::write(&task_definition_path, TASK_DEFINITION_YAML).await.context("failed to write task definition")?;

        let database_path = work_dir.join("taskguild.sqlite");
        let database_url = format!("sqlite://{}", database_path.display());

        info!("starting taskguild daemon on port {port}");
        let process = Command::new(binary)
            .arg("--start")
            .arg("--port")
            .arg(port.to_string())
            .arg("--database-url")
            .arg(&database_url)
            .arg("--task-definition")
            .arg(&task_definition_path)
            .env("RUST_LOG", "info")
            .kill_on_drop(true)
            .spawn()
            .context("failed to spawn taskguild binary")?;

        let mut harness = Self {
            process: Some(process),
            rpc_url: format!("http://127.0.0.1:{port}/rpc"),
            health_url: format!("http://127.0.0.1:{port}/health"),
            client: reqwest::Client::new(),
            next_id: 1,
        };
        harness.wait_until_ready().await?;
        Ok(harness)
    }

    async fn wait_until_ready(&self) -> Result<()> {
        for attempt in 1..=30 {
            sleep(Duration::from_millis(300)).await;
            if let Ok(response) = self.client.get(&self.health_url).timeout(Duration::from_secs(2)).send().await {
                if response.status().is_success() {
                    info!("taskguild daemon ready after {attempt} polls");
                    return Ok(());
                }
            }
        }
        anyhow::bail!("taskguild daemon did not become ready within the poll budget")
    }

    /// Invoke an RPC method and return its `result` field.
    pub async fn call(&mut self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id;
        self.next_id += 1;

        let body = json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params});
        debug!(method, "dispatching rpc call");

        let response = timeout(Duration::from_secs(10), self.client.post(&self.rpc_url).json(&body).send())
            .await
            .context("timed out waiting for rpc response")?
            .context("rpc request failed")?;

        let envelope: Value = response.json().await.context("rpc response was not valid json")?;
        if let Some(error) = envelope.get("error") {
            anyhow::bail!("method '{method}' returned an rpc error: {error}");
        }
        envelope.get("result").cloned().context("rpc response had no 'result' field")
    }

    pub async fn shutdown(&mut self) {
        if let Some(mut process) = self.process.take() {
            let _ = process.start_kill();
            let _ = process.wait().await;
        }
    }
}

impl Drop for TaskGuildHarness {
    fn drop(&mut self) {
        if let Some(process) = self.process.as_mut() {
            let _ = process.start_kill();
        }
    }
}

/// Default path to the daemon binary under the workspace build output.
pub fn default_binary_path() -> PathBuf {
    PathBuf::from("./target/debug/taskguild")
}
