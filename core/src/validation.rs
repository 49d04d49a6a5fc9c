use crate::error::{Result, TaskError};
use crate::models::{NewTask, ScalingConfig};

/// Validation utilities shared by `TaskService`, `AgentPool`, and the RPC
/// transport edge.
pub struct TaskValidator;

impl TaskValidator {
    /// Task/agent/interaction identifiers: 1-128 chars, start and end
    /// alphanumeric, interior letters/digits/hyphen/underscore only.
    pub fn validate_id(kind: &str, id: &str) -> Result<()> {
        if id.is_empty() {
            return Err(TaskError::empty_field(kind));
        }
        if id.len() > 128 {
            return Err(TaskError::Validation(format!(
                "{kind} must be at most 128 characters long"
            )));
        }
        let first = id.chars().next().unwrap();
        let last = id.chars().last().unwrap();
        if !first.is_alphanumeric() || !last.is_alphanumeric() {
            return Err(TaskError::Validation(format!(
                "{kind} must start and end with a letter or digit"
            )));
        }
        if !id.chars().all(|c| c.is_alphanumeric() || c == '-' || c == '_') {
            return Err(TaskError::Validation(format!(
                "{kind} can only contain letters, digits, hyphens, and underscores"
            )));
        }
        Ok(())
    }

    /// Process names follow the same shape as IDs but additionally disallow
    /// the literal `"*"` wildcard reserved by `ProcessEventBus`.
    pub fn validate_process_name(name: &str) -> Result<()> {
        if name == "*" {
            return Err(TaskError::Validation(
                "'*' is reserved as the wildcard subscription key".to_string(),
            ));
        }
        Self::validate_id("process name", name)
    }

    pub fn validate_title(title: &str) -> Result<()> {
        let trimmed = title.trim();
        if trimmed.is_empty() {
            return Err(TaskError::empty_field("title"));
        }
        if trimmed.len() > 200 {
            return Err(TaskError::Validation(
                "title must be at most 200 characters long".to_string(),
            ));
        }
        Ok(())
    }

    pub fn validate_description(description: &str) -> Result<()> {
        if description.len() > 20_000 {
            return Err(TaskError::Validation(
                "description must be at most 20000 characters long".to_string(),
            ));
        }
        Ok(())
    }

    pub fn validate_new_task(task: &NewTask) -> Result<()> {
        Self::validate_id("task id", &task.id)?;
        Self::validate_title(&task.title)?;
        Self::validate_description(&task.description)?;
        Ok(())
    }

    pub fn validate_scaling(scaling: &ScalingConfig) -> Result<()> {
        scaling.validate()
    }
}
