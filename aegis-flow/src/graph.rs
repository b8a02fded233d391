use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::{
    context::Context,
    error::{GraphError, Result},
    session::Session,
    task::{NextAction, Task, TaskResult},
};

/// Type alias for edge condition functions
pub type EdgeCondition = Arc<dyn Fn(&Context) -> bool + Send + Sync>;

/// Outgoing route of a task
#[derive(Clone)]
enum Edge {
    Always { to: String },
    Branch {
        condition: EdgeCondition,
        yes: String,
        no: String,
    },
}

impl Edge {
    fn targets(&self) -> Vec<&str> {
        match self {
            Edge::Always { to } => vec![to.as_str()],
            Edge::Branch { yes, no, .. } => vec![yes.as_str(), no.as_str()],
        }
    }

    fn resolve(&self, context: &Context) -> &str {
        match self {
            Edge::Always { to } => to.as_str(),
            Edge::Branch { condition, yes, no } => {
                if condition(context) {
                    yes.as_str()
                } else {
                    no.as_str()
                }
            }
        }
    }
}

/// An immutable graph of tasks. Built once with [`GraphBuilder`] and shared
/// freely between concurrent sessions.
pub struct Graph {
    pub id: String,
    tasks: HashMap<String, Arc<dyn Task>>,
    edges: HashMap<String, Edge>,
    start_task_id: String,
}

impl Graph {
    /// Execute exactly one task of the session and move the session to the
    /// task that follows it.
    pub async fn execute_session(&self, session: &mut Session) -> Result<ExecutionResult> {
        let result = self
            .execute_single_task(&session.current_task_id, session.context.clone())
            .await?;

        session.completed_tasks.push(result.task_id.clone());
        if result.status_message.is_some() {
            session.status_message = result.status_message.clone();
        }

        let next = match &result.next_action {
            NextAction::Continue => self.find_next_task(&result.task_id, &session.context),
            NextAction::GoTo(target_id) => {
                if !self.tasks.contains_key(target_id) {
                    return Err(GraphError::TaskNotFound(target_id.clone()));
                }
                Some(target_id.clone())
            }
            NextAction::End => None,
        };

        match next {
            Some(next_task_id) => {
                debug!(
                    session_id = %session.id,
                    from = %result.task_id,
                    to = %next_task_id,
                    "Advancing session"
                );
                session.current_task_id = next_task_id;
                Ok(ExecutionResult {
                    response: result.response,
                    status: ExecutionStatus::Ready,
                })
            }
            None => Ok(ExecutionResult {
                response: result.response,
                status: ExecutionStatus::Completed,
            }),
        }
    }

    async fn execute_single_task(&self, task_id: &str, context: Context) -> Result<TaskResult> {
        let task = self
            .tasks
            .get(task_id)
            .ok_or_else(|| GraphError::TaskNotFound(task_id.to_string()))?;

        let mut result = task.run(context).await?;
        result.task_id = task_id.to_string();
        Ok(result)
    }

    /// Find the next task based on edges and conditions
    pub fn find_next_task(&self, current_task_id: &str, context: &Context) -> Option<String> {
        self.edges
            .get(current_task_id)
            .map(|edge| edge.resolve(context).to_string())
    }

    pub fn start_task_id(&self) -> &str {
        &self.start_task_id
    }

    pub fn get_task(&self, task_id: &str) -> Option<Arc<dyn Task>> {
        self.tasks.get(task_id).cloned()
    }
}

/// Builder for creating graphs
pub struct GraphBuilder {
    id: String,
    tasks: HashMap<String, Arc<dyn Task>>,
    edges: Vec<(String, Edge)>,
    start_task_id: Option<String>,
}

impl GraphBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tasks: HashMap::new(),
            edges: Vec::new(),
            start_task_id: None,
        }
    }

    /// Add a task. The first task added becomes the start task unless
    /// [`GraphBuilder::set_start_task`] says otherwise.
    pub fn add_task(mut self, task: Arc<dyn Task>) -> Self {
        let task_id = task.id().to_string();
        if self.start_task_id.is_none() {
            self.start_task_id = Some(task_id.clone());
        }
        self.tasks.insert(task_id, task);
        self
    }

    pub fn add_edge(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.edges.push((from.into(), Edge::Always { to: to.into() }));
        self
    }

    /// Route to `yes` when `condition` holds for the context, else to `no`.
    pub fn add_conditional_edge<F>(
        mut self,
        from: impl Into<String>,
        condition: F,
        yes: impl Into<String>,
        no: impl Into<String>,
    ) -> Self
    where
        F: Fn(&Context) -> bool + Send + Sync + 'static,
    {
        self.edges.push((
            from.into(),
            Edge::Branch {
                condition: Arc::new(condition),
                yes: yes.into(),
                no: no.into(),
            },
        ));
        self
    }

    pub fn set_start_task(mut self, task_id: impl Into<String>) -> Self {
        self.start_task_id = Some(task_id.into());
        self
    }

    pub fn build(self) -> Result<Graph> {
        let start_task_id = self
            .start_task_id
            .ok_or_else(|| GraphError::InvalidGraph(format!("graph {} has no tasks", self.id)))?;
        if !self.tasks.contains_key(&start_task_id) {
            return Err(GraphError::InvalidGraph(format!(
                "start task {start_task_id} is not part of graph {}",
                self.id
            )));
        }

        let mut edges = HashMap::new();
        for (from, edge) in self.edges {
            let unknown = std::iter::once(from.as_str())
                .chain(edge.targets())
                .find(|id| !self.tasks.contains_key(*id))
                .map(str::to_string);
            if let Some(unknown) = unknown {
                return Err(GraphError::InvalidGraph(format!(
                    "edge from {from} references unknown task {unknown}"
                )));
            }
            if edges.insert(from.clone(), edge).is_some() {
                return Err(GraphError::InvalidGraph(format!(
                    "task {from} has more than one outgoing route"
                )));
            }
        }

        Ok(Graph {
            id: self.id,
            tasks: self.tasks,
            edges,
            start_task_id,
        })
    }
}

/// Status of graph execution after one step
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub response: Option<String>,
    pub status: ExecutionStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionStatus {
    /// Another task is queued on the session
    Ready,
    /// The last task ended the walk
    Completed,
}
