//! Fixed-size pool of worker actors.

use ractor::{Actor, ActorRef};

use crate::messages::{DispatchError, WorkerMessage};
use crate::worker_actor::{WorkerActor, WorkerArgs, WorkerContext};

struct PoolMember {
    worker_id: String,
    actor: ActorRef<WorkerMessage>,
    handle: tokio::task::JoinHandle<()>,
}

/// N workers draining one queue.
///
/// Workers stop on their own once the queue is closed and empty; there is no
/// separate stop call. [`wait_drained`](Self::wait_drained) returns when the
/// last of them has exited.
pub struct WorkerPool {
    members: Vec<PoolMember>,
}

impl WorkerPool {
    /// Spawn `count` workers sharing `context`.
    pub async fn start(count: usize, context: WorkerContext) -> Result<Self, DispatchError> {
        let mut members = Vec::with_capacity(count);

        for n in 1..=count {
            let worker_id = format!("worker-{}", n);
            let args = WorkerArgs {
                worker_id: worker_id.clone(),
                context: context.clone(),
            };

            match Actor::spawn(None, WorkerActor, args).await {
                Ok((actor, handle)) => members.push(PoolMember {
                    worker_id,
                    actor,
                    handle,
                }),
                Err(e) => {
                    tracing::warn!("Failed to spawn {}: {}", worker_id, e);
                    for member in &members {
                        member.actor.stop(Some("pool startup failed".to_string()));
                    }
                    return Err(DispatchError::spawn(worker_id, e));
                }
            }
        }

        tracing::info!("Started worker pool with {} workers", members.len());
        Ok(Self { members })
    }

    pub fn size(&self) -> usize {
        self.members.len()
    }

    pub fn worker_ids(&self) -> Vec<&str> {
        self.members.iter().map(|m| m.worker_id.as_str()).collect()
    }

    /// Wait until every worker has exited. Only returns once the queue has
    /// been closed and drained, so callers close the queue first.
    pub async fn wait_drained(self) -> Result<usize, DispatchError> {
        let mut exited = 0;
        let mut crashed = None;

        for member in self.members {
            match member.handle.await {
                Ok(()) => exited += 1,
                Err(e) => {
                    tracing::warn!("Worker {} task failed: {}", member.worker_id, e);
                    crashed.get_or_insert(DispatchError::WorkerCrashed {
                        worker_id: member.worker_id,
                        reason: e.to_string(),
                    });
                }
            }
        }

        match crashed {
            Some(err) => Err(err),
            None => {
                tracing::info!("Worker pool drained: {} workers exited", exited);
                Ok(exited)
            }
        }
    }
}
