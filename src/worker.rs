use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::engine::Engine;
use crate::queue::{ExecutionJob, JobKind, JobQueue};
use crate::result::{self, ExecutionResult};

pub async fn worker(
    id: u8,
    engine: Arc<Engine>,
    queue: Arc<JobQueue>,
    token: CancellationToken,
) -> anyhow::Result<()> {
    log::info!("Worker {id} initialized");

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                log::info!("Worker {id} received shutdown signal, stopping");
                break;
            }

            job = queue.pop() => {
                let ExecutionJob { id: job_id, mut kind, responder } = job;
                log::info!("Worker {id} got job {job_id} from queue");

                // Pinned before the job runs so even an aborted job reports it
                let requested = kind.execution_count_mut();
                let count = engine.next_execution_count(*requested);
                *requested = Some(count);

                // A panicking pipeline must not take the worker down with it
                let engine_ref = Arc::clone(&engine);
                let handle = tokio::spawn(async move { dispatch(&engine_ref, kind).await });

                let result = match handle.await {
                    Ok(result) => result,
                    Err(e) => {
                        log::error!("Job {job_id} failed on worker {id}: {e:?}");
                        result::system_failure(&format!("execution job {job_id} aborted"), count)
                    }
                };

                if responder.send(result).is_err() {
                    log::warn!("Failed to send job {job_id} result back, requester is gone");
                } else {
                    log::debug!("Job {job_id} result sent back from worker {id}");
                }
            }
        };
    }

    log::info!("Worker {id} has shut down gracefully");
    Ok(())
}

pub async fn dispatch(engine: &Engine, kind: JobKind) -> ExecutionResult {
    match kind {
        JobKind::Cell(request) => engine.execute(request).await,
        JobKind::Group {
            notebook,
            group_id,
            cells,
            execution_count,
        } => {
            engine
                .execute_group(&notebook, &group_id, &cells, execution_count)
                .await
        }
        JobKind::Cells {
            codes,
            execution_count,
        } => engine.execute_cells(codes, execution_count).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::sandbox::{BoxFuture, ProcessOutput, ProcessRunner, ProcessSpec};
    use std::time::Duration;

    struct PanickingRunner;

    impl ProcessRunner for PanickingRunner {
        fn run_process<'a>(
            &'a self,
            spec: &'a ProcessSpec,
            _timeout: Duration,
        ) -> BoxFuture<'a, anyhow::Result<ProcessOutput>> {
            Box::pin(async move {
                if !spec.program.is_empty() {
                    panic!("runner exploded on {}", spec.program);
                }
                Ok(ProcessOutput::default())
            })
        }
    }

    #[tokio::test]
    async fn test_worker_assigns_counts_in_order() {
        let root = tempfile::tempdir().unwrap();
        let config = EngineConfig {
            workspace_root: Some(root.path().to_path_buf()),
            ..Default::default()
        };
        let engine = Arc::new(Engine::new(config, Arc::new(PanickingRunner)));
        let queue = Arc::new(JobQueue::new());
        let token = CancellationToken::new();
        let handle = tokio::spawn(worker(1, Arc::clone(&engine), Arc::clone(&queue), token.clone()));

        // classification failures never reach the runner
        for expected in 1..=2 {
            let (job, rx) = ExecutionJob::new(JobKind::Cells {
                codes: vec!["public class A {}\npublic class B {}".to_string()],
                execution_count: None,
            });
            queue.push(job).await;
            let result = rx.await.unwrap();
            assert_eq!(result.outputs[0].error_name(), Some("ClassificationError"));
            assert_eq!(result.execution_count, expected);
        }
        assert_eq!(engine.next_execution_count(None), 3);

        token.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_panicking_job_becomes_system_error() {
        let root = tempfile::tempdir().unwrap();
        let config = EngineConfig {
            workspace_root: Some(root.path().to_path_buf()),
            ..Default::default()
        };
        let engine = Arc::new(Engine::new(config, Arc::new(PanickingRunner)));
        let queue = Arc::new(JobQueue::new());
        let token = CancellationToken::new();
        let handle = tokio::spawn(worker(1, engine, Arc::clone(&queue), token.clone()));

        let (job, rx) = ExecutionJob::new(JobKind::Cells {
            codes: vec!["int x = 1;".to_string()],
            execution_count: None,
        });
        queue.push(job).await;

        let result = tokio::time::timeout(Duration::from_secs(5), rx)
            .await
            .unwrap()
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.outputs[0].error_name(), Some("SystemError"));
        assert_eq!(result.execution_count, 1);

        let (job, rx) = ExecutionJob::new(JobKind::Cells {
            codes: vec!["int y = 2;".to_string()],
            execution_count: Some(9),
        });
        queue.push(job).await;
        let result = tokio::time::timeout(Duration::from_secs(5), rx)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result.execution_count, 9);

        // the worker survives and stops on request
        token.cancel();
        handle.await.unwrap().unwrap();
    }
}
