//! Static process-DAG definition, loaded once at daemon startup and never
//! mutated afterward.

use crate::error::{Result, TaskError};
use crate::models::{ProcessState, ProcessStatus};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// One named step inside a [`TaskDefinition`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessDefinition {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

/// Advisory action to take once every process in a task has completed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OnAllComplete {
    Close,
}

/// The static DAG of processes every task is instantiated against.
///
/// Loaded once from the YAML document shown in the external-interfaces
/// section, validated, and held immutable for the daemon's lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDefinition {
    pub processes: Vec<ProcessDefinition>,
    #[serde(default)]
    pub on_all_complete: Option<OnAllComplete>,

    #[serde(skip)]
    by_name: HashMap<String, usize>,
    #[serde(skip)]
    direct_dependents: HashMap<String, Vec<String>>,
}

impl TaskDefinition {
    /// Parse and validate a definition from its YAML document.
    pub fn from_yaml(document: &str) -> Result<Self> {
        let mut def: TaskDefinition = serde_yaml::from_str(document)
            .map_err(|e| TaskError::Validation(format!("invalid task definition: {e}")))?;
        def.build_indices()?;
        Ok(def)
    }

    /// Construct directly from already-parsed process definitions (used by
    /// tests and by callers assembling a definition programmatically).
    pub fn new(processes: Vec<ProcessDefinition>, on_all_complete: Option<OnAllComplete>) -> Result<Self> {
        let mut def = Self {
            processes,
            on_all_complete,
            by_name: HashMap::new(),
            direct_dependents: HashMap::new(),
        };
        def.build_indices()?;
        Ok(def)
    }

    fn build_indices(&mut self) -> Result<()> {
        if self.processes.is_empty() {
            return Err(TaskError::Validation(
                "task definition must declare at least one process".to_string(),
            ));
        }

        let mut by_name = HashMap::with_capacity(self.processes.len());
        for (idx, proc) in self.processes.iter().enumerate() {
            if proc.name.trim().is_empty() {
                return Err(TaskError::Validation(
                    "process name cannot be empty".to_string(),
                ));
            }
            if by_name.insert(proc.name.clone(), idx).is_some() {
                return Err(TaskError::Validation(format!(
                    "duplicate process name '{}'",
                    proc.name
                )));
            }
        }

        for proc in &self.processes {
            for dep in &proc.depends_on {
                if dep == &proc.name {
                    return Err(TaskError::Validation(format!(
                        "process '{}' cannot depend on itself",
                        proc.name
                    )));
                }
                if !by_name.contains_key(dep) {
                    return Err(TaskError::Validation(format!(
                        "process '{}' depends on unknown process '{}'",
                        proc.name, dep
                    )));
                }
            }
        }

        let mut direct_dependents: HashMap<String, Vec<String>> =
            self.processes.iter().map(|p| (p.name.clone(), Vec::new())).collect();
        for proc in &self.processes {
            for dep in &proc.depends_on {
                direct_dependents.get_mut(dep).unwrap().push(proc.name.clone());
            }
        }

        self.by_name = by_name;
        self.direct_dependents = direct_dependents;
        self.check_acyclic()?;
        Ok(())
    }

    fn check_acyclic(&self) -> Result<()> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            InStack,
            Done,
        }

        let mut marks: HashMap<&str, Mark> =
            self.processes.iter().map(|p| (p.name.as_str(), Mark::Unvisited)).collect();

        fn visit<'a>(
            name: &'a str,
            def: &'a TaskDefinition,
            marks: &mut HashMap<&'a str, Mark>,
        ) -> Result<()> {
            match marks.get(name).copied().unwrap_or(Mark::Unvisited) {
                Mark::Done => return Ok(()),
                Mark::InStack => {
                    return Err(TaskError::Validation(format!(
                        "cycle detected in process dependencies involving '{name}'"
                    )))
                }
                Mark::Unvisited => {}
            }
            marks.insert(name, Mark::InStack);
            if let Some(proc) = def.get_process(name) {
                for dep in &proc.depends_on {
                    visit(dep, def, marks)?;
                }
            }
            marks.insert(name, Mark::Done);
            Ok(())
        }

        for proc in &self.processes {
            visit(&proc.name, self, &mut marks)?;
        }
        Ok(())
    }

    pub fn get_process(&self, name: &str) -> Option<&ProcessDefinition> {
        self.by_name.get(name).map(|&idx| &self.processes[idx])
    }

    pub fn direct_dependents(&self, name: &str) -> Vec<String> {
        self.direct_dependents.get(name).cloned().unwrap_or_default()
    }

    /// DFS closure of every process that (transitively) depends on `name`.
    /// Unordered.
    pub fn transitive_dependents(&self, name: &str) -> HashSet<String> {
        let mut seen = HashSet::new();
        let mut stack: Vec<String> = self.direct_dependents(name);
        while let Some(next) = stack.pop() {
            if seen.insert(next.clone()) {
                stack.extend(self.direct_dependents(&next));
            }
        }
        seen
    }

    /// True iff `name` names a defined process, its current status is
    /// `pending`, and every dependency is `completed`.
    pub fn can_start(&self, name: &str, states: &HashMap<String, ProcessState>) -> bool {
        let Some(proc) = self.get_process(name) else {
            return false;
        };
        let Some(state) = states.get(name) else {
            return false;
        };
        if state.status != ProcessStatus::Pending {
            return false;
        }
        proc.depends_on.iter().all(|dep| {
            states
                .get(dep)
                .map(|s| s.status == ProcessStatus::Completed)
                .unwrap_or(false)
        })
    }

    /// Every process at `pending`, no assignment — the state map a freshly
    /// created task is given.
    pub fn initial_states(&self) -> HashMap<String, ProcessState> {
        self.processes
            .iter()
            .map(|p| (p.name.clone(), ProcessState::pending()))
            .collect()
    }

    pub fn process_names(&self) -> impl Iterator<Item = &str> {
        self.processes.iter().map(|p| p.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear_def() -> TaskDefinition {
        TaskDefinition::new(
            vec![
                ProcessDefinition { name: "implement".into(), description: None, depends_on: vec![] },
                ProcessDefinition { name: "review".into(), description: None, depends_on: vec!["implement".into()] },
                ProcessDefinition { name: "qa".into(), description: None, depends_on: vec!["implement".into()] },
            ],
            Some(OnAllComplete::Close),
        )
        .unwrap()
    }

    #[test]
    fn rejects_empty_process_list() {
        assert!(TaskDefinition::new(vec![], None).is_err());
    }

    #[test]
    fn rejects_duplicate_name() {
        let result = TaskDefinition::new(
            vec![
                ProcessDefinition { name: "a".into(), description: None, depends_on: vec![] },
                ProcessDefinition { name: "a".into(), description: None, depends_on: vec![] },
            ],
            None,
        );
        assert!(result.is_err());
    }

    #[test]
    fn rejects_unknown_dependency() {
        let result = TaskDefinition::new(
            vec![ProcessDefinition { name: "a".into(), description: None, depends_on: vec!["missing".into()] }],
            None,
        );
        assert!(result.is_err());
    }

    #[test]
    fn rejects_self_dependency() {
        let result = TaskDefinition::new(
            vec![ProcessDefinition { name: "a".into(), description: None, depends_on: vec!["a".into()] }],
            None,
        );
        assert!(result.is_err());
    }

    #[test]
    fn rejects_cycle() {
        let result = TaskDefinition::new(
            vec![
                ProcessDefinition { name: "a".into(), description: None, depends_on: vec!["b".into()] },
                ProcessDefinition { name: "b".into(), description: None, depends_on: vec!["a".into()] },
            ],
            None,
        );
        assert!(result.is_err());
    }

    #[test]
    fn transitive_dependents_of_root() {
        let def = linear_def();
        let deps = def.transitive_dependents("implement");
        assert_eq!(deps.len(), 2);
        assert!(deps.contains("review"));
        assert!(deps.contains("qa"));
        assert!(def.transitive_dependents("review").is_empty());
    }

    #[test]
    fn can_start_respects_dependencies() {
        let def = linear_def();
        let mut states = def.initial_states();
        assert!(def.can_start("implement", &states));
        assert!(!def.can_start("review", &states));

        states.insert("implement".to_string(), ProcessState::completed());
        assert!(def.can_start("review", &states));
        assert!(def.can_start("qa", &states));
        assert!(!def.can_start("implement", &states));
    }

    #[test]
    fn parses_yaml_document() {
        let yaml = r#"
processes:
  - name: implement
  - name: review
    depends_on: [implement]
  - name: qa
    depends_on: [implement]
on_all_complete: close
"#;
        let def = TaskDefinition::from_yaml(yaml).unwrap();
        assert_eq!(def.processes.len(), 3);
        assert_eq!(def.on_all_complete, Some(OnAllComplete::Close));
    }
}
