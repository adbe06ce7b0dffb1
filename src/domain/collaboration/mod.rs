//! Collaboration domain - who is editing a resource right now.
//!
//! `CollaborationSession` holds the bounded collaborator set for one
//! resource. It carries no locking of its own; callers serialize access
//! per resource.

use std::collections::BTreeSet;

use crate::domain::foundation::{DomainError, ErrorCode, ResourceId, UserId};

/// Outcome of a join attempt that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    Joined,
    AlreadyPresent,
}

/// Set of users concurrently editing one resource.
#[derive(Debug, Clone)]
pub struct CollaborationSession {
    resource_id: ResourceId,
    collaborators: BTreeSet<UserId>,
    max_collaborators: usize,
}

impl CollaborationSession {
    pub fn new(resource_id: ResourceId, max_collaborators: usize) -> Self {
        Self {
            resource_id,
            collaborators: BTreeSet::new(),
            max_collaborators,
        }
    }

    pub fn resource_id(&self) -> &ResourceId {
        &self.resource_id
    }

    /// Adds a collaborator, refusing once the session is full.
    ///
    /// Re-adding an existing member is a no-op and never counts against
    /// the limit.
    pub fn join(&mut self, user_id: UserId) -> Result<JoinOutcome, DomainError> {
        if self.collaborators.contains(&user_id) {
            return Ok(JoinOutcome::AlreadyPresent);
        }
        if self.collaborators.len() >= self.max_collaborators {
            return Err(DomainError::new(
                ErrorCode::MaxCollaboratorsExceeded,
                format!(
                    "Resource '{}' already has {} collaborators",
                    self.resource_id, self.max_collaborators
                ),
            )
            .with_detail("resource_id", self.resource_id.as_str())
            .with_detail("limit", self.max_collaborators.to_string()));
        }
        self.collaborators.insert(user_id);
        Ok(JoinOutcome::Joined)
    }

    /// Removes a collaborator. Returns whether they were present.
    pub fn leave(&mut self, user_id: &UserId) -> bool {
        self.collaborators.remove(user_id)
    }

    pub fn is_empty(&self) -> bool {
        self.collaborators.is_empty()
    }

    pub fn len(&self) -> usize {
        self.collaborators.len()
    }

    /// Copy of the collaborator set, in stable order.
    pub fn snapshot(&self) -> Vec<UserId> {
        self.collaborators.iter().cloned().collect()
    }
}
