//! FlowRunner: drives a session through its graph until the walk ends or the
//! caller cancels it.
//!
//! Cancellation is only observed *between* tasks. A task that has started is
//! always allowed to finish, so a half-finished task never leaves partial
//! output in the context.
//!
//! ```rust,ignore
//! let runner = FlowRunner::new(graph.clone());
//! let cancel = Cancellation::new();
//! match runner.run(&mut session, &cancel).await? {
//!     FlowOutcome::Completed => { /* read results from session.context */ }
//!     FlowOutcome::Cancelled { pending_task } => { /* pending_task never ran */ }
//! }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info};

use crate::{
    error::Result,
    graph::{ExecutionStatus, Graph},
    session::Session,
};

/// Cloneable cancellation flag shared between a caller and running sessions
#[derive(Clone, Debug, Default)]
pub struct Cancellation {
    cancelled: Arc<AtomicBool>,
}

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// How a [`FlowRunner::run`] call ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowOutcome {
    Completed,
    /// Cancelled before `pending_task` started
    Cancelled { pending_task: String },
}

/// Runs sessions of one graph to completion
#[derive(Clone)]
pub struct FlowRunner {
    graph: Arc<Graph>,
}

impl FlowRunner {
    pub fn new(graph: Arc<Graph>) -> Self {
        Self { graph }
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Execute tasks one at a time until the graph ends, a task fails, or
    /// `cancel` is raised.
    pub async fn run(&self, session: &mut Session, cancel: &Cancellation) -> Result<FlowOutcome> {
        loop {
            if cancel.is_cancelled() {
                info!(
                    session_id = %session.id,
                    pending_task = %session.current_task_id,
                    "Run cancelled at task boundary"
                );
                return Ok(FlowOutcome::Cancelled {
                    pending_task: session.current_task_id.clone(),
                });
            }

            debug!(
                session_id = %session.id,
                task_id = %session.current_task_id,
                "Executing task"
            );
            let result = self.graph.execute_session(session).await?;

            if result.status == ExecutionStatus::Completed {
                info!(
                    session_id = %session.id,
                    graph_id = %self.graph.id,
                    steps = session.completed_tasks.len(),
                    "Graph walk completed"
                );
                return Ok(FlowOutcome::Completed);
            }
        }
    }
}
