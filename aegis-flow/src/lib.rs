pub mod context;
pub mod error;
pub mod graph;
pub mod runner;
pub mod session;
pub mod task;

// Re-export commonly used types
pub use context::Context;
pub use error::{GraphError, Result};
pub use graph::{ExecutionResult, ExecutionStatus, Graph, GraphBuilder};
pub use runner::{Cancellation, FlowOutcome, FlowRunner};
pub use session::Session;
pub use task::{NextAction, Task, TaskResult};

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct AppendTask {
        id: &'static str,
        runs: Arc<AtomicUsize>,
        cancel_after: Option<Cancellation>,
    }

    impl AppendTask {
        fn new(id: &'static str, runs: Arc<AtomicUsize>) -> Self {
            Self {
                id,
                runs,
                cancel_after: None,
            }
        }
    }

    #[async_trait]
    impl Task for AppendTask {
        fn id(&self) -> &str {
            self.id
        }

        async fn run(&self, context: Context) -> Result<TaskResult> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            let mut trail: Vec<String> = context.get("trail").unwrap_or_default();
            trail.push(self.id.to_string());
            context.set("trail", trail)?;
            if let Some(cancel) = &self.cancel_after {
                cancel.cancel();
            }
            Ok(TaskResult::new(None, NextAction::Continue))
        }
    }

    struct FailingTask;

    #[async_trait]
    impl Task for FailingTask {
        async fn run(&self, _context: Context) -> Result<TaskResult> {
            Err(GraphError::task_failed(
                self.id(),
                anyhow::anyhow!("model unavailable"),
            ))
        }
    }

    fn branching_graph(runs: &Arc<AtomicUsize>) -> Arc<Graph> {
        Arc::new(
            GraphBuilder::new("branching")
                .add_task(Arc::new(AppendTask::new("start", runs.clone())))
                .add_task(Arc::new(AppendTask::new("left", runs.clone())))
                .add_task(Arc::new(AppendTask::new("right", runs.clone())))
                .add_task(Arc::new(AppendTask::new("finish", runs.clone())))
                .add_conditional_edge(
                    "start",
                    |context| context.get::<bool>("go_left").unwrap_or(false),
                    "left",
                    "right",
                )
                .add_edge("left", "finish")
                .add_edge("right", "finish")
                .build()
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn conditional_edge_selects_branch_from_context() {
        let runs = Arc::new(AtomicUsize::new(0));
        let runner = FlowRunner::new(branching_graph(&runs));

        for (go_left, expected) in [(true, "left"), (false, "right")] {
            let mut session = Session::new_from_task("s", "branching", "start");
            session.context.set("go_left", go_left).unwrap();

            let outcome = runner.run(&mut session, &Cancellation::new()).await.unwrap();

            assert_eq!(outcome, FlowOutcome::Completed);
            let trail: Vec<String> = session.context.get("trail").unwrap();
            assert_eq!(trail, vec!["start", expected, "finish"]);
            assert_eq!(session.completed_tasks, trail);
        }
    }

    #[tokio::test]
    async fn cancellation_is_checked_between_tasks() {
        let runs = Arc::new(AtomicUsize::new(0));
        let cancel = Cancellation::new();
        let first = AppendTask {
            id: "first",
            runs: runs.clone(),
            cancel_after: Some(cancel.clone()),
        };
        let graph = GraphBuilder::new("linear")
            .add_task(Arc::new(first))
            .add_task(Arc::new(AppendTask::new("second", runs.clone())))
            .add_edge("first", "second")
            .build()
            .unwrap();

        let mut session = Session::new_from_task("s", "linear", "first");
        let outcome = FlowRunner::new(Arc::new(graph))
            .run(&mut session, &cancel)
            .await
            .unwrap();

        assert_eq!(
            outcome,
            FlowOutcome::Cancelled {
                pending_task: "second".to_string()
            }
        );
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(session.completed_tasks, vec!["first"]);
    }

    #[tokio::test]
    async fn typed_task_errors_can_be_recovered() {
        let graph = GraphBuilder::new("failing")
            .add_task(Arc::new(FailingTask))
            .build()
            .unwrap();
        let start = graph.start_task_id().to_string();
        let mut session = Session::new_from_task("s", "failing", &start);

        let err = FlowRunner::new(Arc::new(graph))
            .run(&mut session, &Cancellation::new())
            .await
            .unwrap_err();

        match err {
            GraphError::TaskFailed { task_id, source } => {
                assert_eq!(task_id, start);
                assert_eq!(source.to_string(), "model unavailable");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(session.completed_tasks.is_empty());
    }

    #[test]
    fn build_rejects_edges_to_unknown_tasks() {
        let runs = Arc::new(AtomicUsize::new(0));
        let result = GraphBuilder::new("broken")
            .add_task(Arc::new(AppendTask::new("only", runs)))
            .add_edge("only", "ghost")
            .build();
        assert!(matches!(result, Err(GraphError::InvalidGraph(_))));
    }
}
