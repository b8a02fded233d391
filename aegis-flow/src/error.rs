use thiserror::Error;

/// Errors raised while building or driving a task graph
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("context error: {0}")]
    ContextError(String),

    #[error("invalid graph: {0}")]
    InvalidGraph(String),

    #[error("task execution failed: {0}")]
    TaskExecutionFailed(String),

    /// A task failed with a typed error. Callers can `downcast` the source to
    /// recover it.
    #[error("task {task_id} failed: {source}")]
    TaskFailed {
        task_id: String,
        #[source]
        source: anyhow::Error,
    },
}

impl GraphError {
    pub fn task_failed(task_id: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self::TaskFailed {
            task_id: task_id.into(),
            source: source.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, GraphError>;
