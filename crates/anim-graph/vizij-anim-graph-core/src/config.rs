//! Runtime sizing for graph instances and evaluation contexts.

use serde::{Deserialize, Serialize};

/// Capacity hints and hard caps shared by instances and contexts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Hard cap on child graph instances owned by a single graph instance.
    pub max_child_graphs: usize,
    /// Hard cap on how deeply child graphs may nest.
    pub max_graph_depth: usize,
    /// Initial capacity of the sampled event buffer.
    pub event_buffer_capacity: usize,
    /// Initial capacity of the task list.
    pub task_capacity: usize,
    /// Hard cap on tasks registered in one update.
    pub max_tasks: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            max_child_graphs: 20,
            max_graph_depth: 8,
            event_buffer_capacity: 64,
            task_capacity: 32,
            max_tasks: 255,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_fills_defaults() {
        let config: GraphConfig = serde_json::from_str(r#"{"max_tasks": 16}"#).unwrap();
        assert_eq!(config.max_tasks, 16);
        assert_eq!(config.max_child_graphs, 20);
        assert_eq!(config.event_buffer_capacity, 64);
    }
}
