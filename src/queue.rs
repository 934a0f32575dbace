use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{Mutex, Notify, oneshot};

use crate::engine::CellExecution;
use crate::result::ExecutionResult;

static NEXT_JOB_ID: AtomicU64 = AtomicU64::new(1);

pub enum JobKind {
    Cell(CellExecution),
    Group {
        notebook: String,
        group_id: String,
        cells: HashMap<String, String>,
        execution_count: Option<u64>,
    },
    Cells {
        codes: Vec<String>,
        execution_count: Option<u64>,
    },
}

impl JobKind {
    /// The execution count requested for this job, if any
    pub fn execution_count_mut(&mut self) -> &mut Option<u64> {
        match self {
            Self::Cell(request) => &mut request.execution_count,
            Self::Group {
                execution_count, ..
            }
            | Self::Cells {
                execution_count, ..
            } => execution_count,
        }
    }
}

pub struct ExecutionJob {
    pub id: u64,
    pub kind: JobKind,
    pub responder: oneshot::Sender<ExecutionResult>,
}

impl ExecutionJob {
    /// Creates a job and the receiver its result will arrive on
    pub fn new(kind: JobKind) -> (Self, oneshot::Receiver<ExecutionResult>) {
        let (responder, rx) = oneshot::channel();
        let job = Self {
            id: NEXT_JOB_ID.fetch_add(1, Ordering::Relaxed),
            kind,
            responder,
        };
        (job, rx)
    }
}

pub struct JobQueue {
    queue: Mutex<VecDeque<ExecutionJob>>,
    notify: Notify,
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl JobQueue {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        }
    }

    pub async fn push(&self, job: ExecutionJob) {
        self.queue.lock().await.push_back(job);
        self.notify.notify_one();
    }

    pub async fn pop(&self) -> ExecutionJob {
        loop {
            if let Some(job) = self.queue.lock().await.pop_front() {
                return job;
            }
            self.notify.notified().await;
        }
    }

    pub async fn len(&self) -> usize {
        self.queue.lock().await.len()
    }
}
