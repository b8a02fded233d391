use serde::{Deserialize, Serialize};

use crate::context::Context;

/// State of one walk through a graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub graph_id: String,
    pub current_task_id: String,
    pub status_message: Option<String>,
    /// Tasks executed so far, in execution order
    pub completed_tasks: Vec<String>,
    #[serde(skip)]
    pub context: Context,
}

impl Session {
    pub fn new_from_task(sid: impl Into<String>, graph_id: impl Into<String>, task_id: &str) -> Self {
        Self {
            id: sid.into(),
            graph_id: graph_id.into(),
            current_task_id: task_id.to_string(),
            status_message: None,
            completed_tasks: Vec::new(),
            context: Context::new(),
        }
    }
}
