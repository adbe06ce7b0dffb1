//! Per-resource collaboration coordinator.
//!
//! Each resource gets its own `tokio::sync::Mutex` in a sharded lock
//! table, so operations on different resources never contend. A slot is
//! retired (and removed from the table) while its lock is held once the
//! session empties; a waiter that then acquires the retired lock drops it
//! and resolves the table entry again.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, OwnedMutexGuard};
use tokio::time;
use tracing::{debug, info};

use crate::domain::collaboration::{CollaborationSession, JoinOutcome};
use crate::domain::foundation::{DomainError, ResourceId, UserId};

/// Coordinator settings.
#[derive(Debug, Clone)]
pub struct CollaborationConfig {
    pub max_collaborators_per_resource: usize,
    pub sweep_interval: Duration,
}

impl Default for CollaborationConfig {
    fn default() -> Self {
        Self {
            max_collaborators_per_resource: 10,
            sweep_interval: Duration::from_secs(60),
        }
    }
}

struct SessionSlot {
    session: CollaborationSession,
    retired: bool,
}

type SlotHandle = Arc<Mutex<SessionSlot>>;

pub struct CollaborationCoordinator {
    config: CollaborationConfig,
    sessions: DashMap<ResourceId, SlotHandle>,
}

impl CollaborationCoordinator {
    pub fn new(config: CollaborationConfig) -> Self {
        Self {
            config,
            sessions: DashMap::new(),
        }
    }

    pub fn max_collaborators(&self) -> usize {
        self.config.max_collaborators_per_resource
    }

    /// Number of resources with a live session.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Lock the slot for `resource_id`, creating it when `create` is set.
    ///
    /// Never holds a table guard across an await point.
    async fn lock_slot(
        &self,
        resource_id: &ResourceId,
        create: bool,
    ) -> Option<(SlotHandle, OwnedMutexGuard<SessionSlot>)> {
        loop {
            let handle = if create {
                let entry = self.sessions.entry(resource_id.clone()).or_insert_with(|| {
                    Arc::new(Mutex::new(SessionSlot {
                        session: CollaborationSession::new(
                            resource_id.clone(),
                            self.config.max_collaborators_per_resource,
                        ),
                        retired: false,
                    }))
                });
                Arc::clone(entry.value())
            } else {
                let entry = self.sessions.get(resource_id)?;
                Arc::clone(entry.value())
            };

            let guard = Arc::clone(&handle).lock_owned().await;
            if guard.retired {
                continue;
            }
            return Some((handle, guard));
        }
    }

    /// Retire an empty slot and drop it from the table.
    ///
    /// Must be called with the slot's lock held.
    fn retire(&self, resource_id: &ResourceId, handle: &SlotHandle, slot: &mut SessionSlot) {
        slot.retired = true;
        self.sessions
            .remove_if(resource_id, |_, current| Arc::ptr_eq(current, handle));
        debug!(resource_id = %resource_id, "Collaboration session closed");
    }

    /// Add `user_id` to the resource's collaborators.
    ///
    /// Idempotent for an existing member. Returns the collaborator set
    /// after the change.
    pub async fn add_collaborator(
        &self,
        resource_id: &ResourceId,
        user_id: UserId,
    ) -> Result<Vec<UserId>, DomainError> {
        let Some((handle, mut slot)) = self.lock_slot(resource_id, true).await else {
            // lock_slot only returns None when not creating
            return Ok(Vec::new());
        };

        match slot.session.join(user_id.clone()) {
            Ok(JoinOutcome::Joined) => {
                debug!(resource_id = %resource_id, user_id = %user_id, "Collaborator joined");
            }
            Ok(JoinOutcome::AlreadyPresent) => {}
            Err(e) => {
                if slot.session.is_empty() {
                    self.retire(resource_id, &handle, &mut slot);
                }
                return Err(e);
            }
        }
        Ok(slot.session.snapshot())
    }

    /// Remove `user_id`. Returns whether they were a collaborator.
    ///
    /// The session and its lock are discarded once the set empties.
    pub async fn remove_collaborator(&self, resource_id: &ResourceId, user_id: &UserId) -> bool {
        let Some((handle, mut slot)) = self.lock_slot(resource_id, false).await else {
            return false;
        };
        let removed = slot.session.leave(user_id);
        if slot.session.is_empty() {
            self.retire(resource_id, &handle, &mut slot);
        }
        removed
    }

    /// Copy of the resource's current collaborators.
    pub async fn get_active_collaborators(&self, resource_id: &ResourceId) -> Vec<UserId> {
        match self.lock_slot(resource_id, false).await {
            Some((_, slot)) => slot.session.snapshot(),
            None => Vec::new(),
        }
    }

    /// Delete sessions that are empty, one resource lock at a time.
    pub async fn sweep_empty_sessions(&self) -> usize {
        let resources: Vec<ResourceId> = self.sessions.iter().map(|e| e.key().clone()).collect();
        let mut removed = 0;
        for resource_id in resources {
            if let Some((handle, mut slot)) = self.lock_slot(&resource_id, false).await {
                if slot.session.is_empty() {
                    self.retire(&resource_id, &handle, &mut slot);
                    removed += 1;
                }
            }
        }
        removed
    }

    /// Run the empty-session sweep periodically until shutdown.
    pub async fn run_sweeper(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = time::interval(self.config.sweep_interval);
        interval.tick().await;

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Collaboration sweeper stopping");
                        return;
                    }
                }
                _ = interval.tick() => {
                    let removed = self.sweep_empty_sessions().await;
                    if removed > 0 {
                        debug!(removed, "Swept empty collaboration sessions");
                    }
                }
            }
        }
    }
}

impl Default for CollaborationCoordinator {
    fn default() -> Self {
        Self::new(CollaborationConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::ErrorCode;
    use proptest::prelude::*;

    fn resource(id: &str) -> ResourceId {
        ResourceId::new(id).unwrap()
    }

    fn user(n: usize) -> UserId {
        UserId::new(format!("user-{}", n)).unwrap()
    }

    fn coordinator(max: usize) -> Arc<CollaborationCoordinator> {
        Arc::new(CollaborationCoordinator::new(CollaborationConfig {
            max_collaborators_per_resource: max,
            ..Default::default()
        }))
    }

    #[tokio::test]
    async fn add_returns_snapshot_and_is_idempotent() {
        let coord = coordinator(3);
        let r = resource("task-1");

        assert_eq!(coord.add_collaborator(&r, user(1)).await.unwrap(), vec![user(1)]);
        let snapshot = coord.add_collaborator(&r, user(1)).await.unwrap();
        assert_eq!(snapshot, vec![user(1)]);
    }

    #[tokio::test]
    async fn full_session_rejects_new_members() {
        let coord = coordinator(1);
        let r = resource("task-1");
        coord.add_collaborator(&r, user(1)).await.unwrap();

        let err = coord.add_collaborator(&r, user(2)).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::MaxCollaboratorsExceeded);
    }

    #[tokio::test]
    async fn last_remove_discards_session() {
        let coord = coordinator(5);
        let r = resource("task-1");
        coord.add_collaborator(&r, user(1)).await.unwrap();
        coord.add_collaborator(&r, user(2)).await.unwrap();

        assert!(coord.remove_collaborator(&r, &user(1)).await);
        assert_eq!(coord.session_count(), 1);
        assert!(coord.remove_collaborator(&r, &user(2)).await);
        assert_eq!(coord.session_count(), 0);
        assert!(!coord.remove_collaborator(&r, &user(2)).await);
        assert!(coord.get_active_collaborators(&r).await.is_empty());
    }

    #[tokio::test]
    async fn zero_capacity_leaves_no_session_behind() {
        let coord = coordinator(0);
        let r = resource("task-1");
        assert!(coord.add_collaborator(&r, user(1)).await.is_err());
        assert_eq!(coord.session_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_adds_never_exceed_limit() {
        let coord = coordinator(10);
        let r = resource("task-hot");

        let tasks: Vec<_> = (0..50)
            .map(|n| {
                let coord = Arc::clone(&coord);
                let r = r.clone();
                tokio::spawn(async move { coord.add_collaborator(&r, user(n)).await })
            })
            .collect();

        let mut accepted = 0;
        let mut rejected = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => accepted += 1,
                Err(e) => {
                    assert_eq!(e.code, ErrorCode::MaxCollaboratorsExceeded);
                    rejected += 1;
                }
            }
        }
        assert_eq!(accepted, 10);
        assert_eq!(rejected, 40);
        assert_eq!(coord.get_active_collaborators(&r).await.len(), 10);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn churn_on_one_resource_keeps_single_live_lock() {
        let coord = coordinator(4);
        let r = resource("task-churn");

        let tasks: Vec<_> = (0..8)
            .map(|n| {
                let coord = Arc::clone(&coord);
                let r = r.clone();
                tokio::spawn(async move {
                    for _ in 0..50 {
                        if coord.add_collaborator(&r, user(n)).await.is_ok() {
                            let members = coord.get_active_collaborators(&r).await;
                            assert!(members.len() <= 4);
                            coord.remove_collaborator(&r, &user(n)).await;
                        }
                    }
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(coord.session_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_stops_on_shutdown() {
        let coord = coordinator(2);
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn({
            let coord = Arc::clone(&coord);
            async move { coord.run_sweeper(rx).await }
        });
        tx.send(true).unwrap();
        task.await.unwrap();
    }

    proptest! {
        #[test]
        fn collaborators_stay_within_limit(
            max in 1usize..6,
            ops in proptest::collection::vec((any::<bool>(), 0usize..10), 0..60),
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            runtime.block_on(async {
                let coord = coordinator(max);
                let r = resource("task-prop");
                for (join, n) in ops {
                    if join {
                        let _ = coord.add_collaborator(&r, user(n)).await;
                    } else {
                        coord.remove_collaborator(&r, &user(n)).await;
                    }
                    let members = coord.get_active_collaborators(&r).await;
                    assert!(members.len() <= max);
                    assert_eq!(coord.session_count(), usize::from(!members.is_empty()));
                }
            });
        }
    }
}
