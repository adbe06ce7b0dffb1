//! WebSocket connection manager.
//!
//! Owns the table of live connections and everything that happens to
//! them after the transport upgrade: admission control, inbound frame
//! dispatch, outbound fan-out, heartbeat reaping and teardown.
//!
//! Each connection's outbound side is an `mpsc` channel drained by a
//! writer task in the transport, so a slow or dead socket only ever
//! blocks its own channel.

use dashmap::DashMap;
use futures::future::join_all;
use serde_json::{json, Value as JsonValue};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex as AsyncMutex};
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

use super::messages::{ClientMessage, ServerMessage};
use crate::adapters::collaboration::CollaborationCoordinator;
use crate::adapters::presence::PresenceTracker;
use crate::domain::connection::{CloseReason, ConnectionState};
use crate::domain::foundation::{
    ConnectionId, DomainError, ErrorCode, EventType, PublishOptions, ResourceId, StateMachine,
    Timestamp, UserId,
};
use crate::domain::presence::{PresenceMetadata, PresenceStatus};
use crate::ports::{EventPublisher, RateDecision, RateLimitKey, RateLimiter};

/// Connection manager settings.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    /// Ceiling on concurrently open connections.
    pub max_connections: usize,
    /// How often idle connections are checked.
    pub heartbeat_interval: Duration,
    /// Connections silent for longer than this are closed.
    pub heartbeat_timeout: Duration,
    /// Deadline for queuing one frame on a connection.
    pub send_timeout: Duration,
    /// Frames buffered per connection before sends start to wait.
    pub outbound_buffer: usize,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            max_connections: 10_000,
            heartbeat_interval: Duration::from_secs(30),
            heartbeat_timeout: Duration::from_secs(90),
            send_timeout: Duration::from_secs(5),
            outbound_buffer: 256,
        }
    }
}

/// Item queued for a connection's writer task.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// Serialized envelope.
    Text(Arc<str>),
    /// Protocol-level ping.
    Ping,
    /// Send a close frame and stop writing.
    Close { code: u16, reason: String },
}

/// Handle returned to the transport after a successful admission.
#[derive(Debug)]
pub struct AdmittedConnection {
    pub connection_id: ConnectionId,
    pub user_id: UserId,
    pub outbound: mpsc::Receiver<Outbound>,
}

/// Result of a fan-out.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub failed: Vec<ConnectionId>,
}

impl BroadcastReport {
    pub fn attempted(&self) -> usize {
        self.delivered + self.failed.len()
    }
}

/// Read-only view of a connection.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub connection_id: ConnectionId,
    pub user_id: UserId,
    pub connected_at: Timestamp,
    pub last_activity: Timestamp,
    pub state: ConnectionState,
    pub subscriptions: Vec<String>,
    pub send_failures: u32,
}

struct ConnectionEntry {
    user_id: UserId,
    connected_at: Timestamp,
    last_activity: Timestamp,
    last_seen: Instant,
    state: ConnectionState,
    subscriptions: HashSet<String>,
    collaborations: HashSet<ResourceId>,
    sender: mpsc::Sender<Outbound>,
    send_failures: u32,
}

impl ConnectionEntry {
    fn touch(&mut self) {
        self.last_activity = Timestamp::now();
        self.last_seen = Instant::now();
    }

    fn info(&self, connection_id: ConnectionId) -> ConnectionInfo {
        let mut subscriptions: Vec<String> = self.subscriptions.iter().cloned().collect();
        subscriptions.sort();
        ConnectionInfo {
            connection_id,
            user_id: self.user_id.clone(),
            connected_at: self.connected_at,
            last_activity: self.last_activity,
            state: self.state,
            subscriptions,
            send_failures: self.send_failures,
        }
    }
}

/// Releases a capacity reservation unless it was handed to a connection.
struct Reservation<'a> {
    counter: &'a AtomicUsize,
    armed: bool,
}

impl Reservation<'_> {
    fn keep(mut self) {
        self.armed = false;
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.counter.fetch_sub(1, Ordering::AcqRel);
        }
    }
}

/// Orders the presence writes issued for one user.
///
/// Writes run one at a time under `gate`; a write whose sequence number is
/// no longer `latest` when it gets the gate is skipped, so the newest
/// connect or disconnect always decides the stored status.
#[derive(Default)]
struct PresenceSlot {
    latest: AtomicU64,
    gate: AsyncMutex<()>,
}

type PresenceSlots = DashMap<UserId, Arc<PresenceSlot>>;

pub struct ConnectionManager {
    settings: ConnectionSettings,
    connections: DashMap<ConnectionId, ConnectionEntry>,
    open_count: AtomicUsize,
    rate_limiter: Arc<dyn RateLimiter>,
    presence: Arc<PresenceTracker>,
    collaboration: Arc<CollaborationCoordinator>,
    publisher: Arc<dyn EventPublisher>,
    presence_slots: Arc<PresenceSlots>,
    /// Serializes one user's collaboration joins and leaves across devices.
    seat_gates: DashMap<UserId, Arc<AsyncMutex<()>>>,
}

impl ConnectionManager {
    pub fn new(
        settings: ConnectionSettings,
        rate_limiter: Arc<dyn RateLimiter>,
        presence: Arc<PresenceTracker>,
        collaboration: Arc<CollaborationCoordinator>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            settings,
            connections: DashMap::new(),
            open_count: AtomicUsize::new(0),
            rate_limiter,
            presence,
            collaboration,
            publisher,
            presence_slots: Arc::new(DashMap::new()),
            seat_gates: DashMap::new(),
        }
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    /// Connections currently admitted.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn connection_info(&self, connection_id: &ConnectionId) -> Option<ConnectionInfo> {
        self.connections
            .get(connection_id)
            .map(|entry| entry.info(*connection_id))
    }

    pub fn connections_for_user(&self, user_id: &UserId) -> Vec<ConnectionId> {
        self.connections
            .iter()
            .filter(|entry| &entry.user_id == user_id)
            .map(|entry| *entry.key())
            .collect()
    }

    /// Failed sends recorded against a connection.
    pub fn send_failures(&self, connection_id: &ConnectionId) -> Option<u32> {
        self.connections
            .get(connection_id)
            .map(|entry| entry.send_failures)
    }

    fn reserve_slot(&self) -> Option<Reservation<'_>> {
        let max = self.settings.max_connections;
        self.open_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current < max).then_some(current + 1)
            })
            .ok()
            .map(|_| Reservation {
                counter: &self.open_count,
                armed: true,
            })
    }

    /// Spend one unit of `key`'s quota, failing open when the limiter errors.
    async fn check_rate(&self, key: RateLimitKey) -> Result<(), DomainError> {
        match self.rate_limiter.acquire(&key).await {
            Ok(decision @ RateDecision::Denied { .. }) => {
                let scope = key.scope();
                let retry_after = decision.retry_after_secs().unwrap_or(1);
                Err(DomainError::new(
                    ErrorCode::RateLimitExceeded,
                    format!("Rate limit exceeded for {}, retry in {}s", scope, retry_after),
                )
                .with_detail("scope", scope.as_str())
                .with_detail("retry_after_secs", retry_after.to_string()))
            }
            Ok(RateDecision::Allowed(_)) => Ok(()),
            Err(e) => {
                warn!(key = %key, error = %e, "Rate limiter unavailable, allowing request");
                Ok(())
            }
        }
    }

    /// Admit a new connection for an authenticated user.
    ///
    /// Fails with `RateLimitExceeded` when the source address (or the node)
    /// is opening connections too quickly and with `CapacityExceeded` at
    /// the connection ceiling.
    pub async fn admit(
        &self,
        source_ip: &str,
        user_id: UserId,
    ) -> Result<AdmittedConnection, DomainError> {
        self.check_rate(RateLimitKey::source_ip(source_ip)).await?;
        self.check_rate(RateLimitKey::Node).await?;

        let reservation = self.reserve_slot().ok_or_else(|| {
            DomainError::new(
                ErrorCode::CapacityExceeded,
                format!("Server is at its limit of {} connections", self.settings.max_connections),
            )
            .with_detail("limit", self.settings.max_connections.to_string())
        })?;

        let connection_id = ConnectionId::new();
        let (sender, outbound) = mpsc::channel(self.settings.outbound_buffer.max(1));
        let state = ConnectionState::Connecting.transition_to(ConnectionState::Open)?;
        let now = Timestamp::now();

        let connected = ServerMessage::Connected {
            connection_id,
            user_id: user_id.clone(),
        };
        if let Ok(text) = connected.to_text() {
            // Fresh channel, cannot be full.
            let _ = sender.try_send(Outbound::Text(text.into()));
        }

        self.connections.insert(
            connection_id,
            ConnectionEntry {
                user_id: user_id.clone(),
                connected_at: now,
                last_activity: now,
                last_seen: Instant::now(),
                state,
                subscriptions: HashSet::new(),
                collaborations: HashSet::new(),
                sender,
                send_failures: 0,
            },
        );
        reservation.keep();

        info!(connection_id = %connection_id, user_id = %user_id, source_ip, "Connection admitted");
        self.spawn_presence_update(user_id.clone(), PresenceStatus::Online);

        Ok(AdmittedConnection {
            connection_id,
            user_id,
            outbound,
        })
    }

    fn spawn_presence_update(&self, user_id: UserId, status: PresenceStatus) {
        // Claim a sequence number before spawning so call order decides.
        let (slot, sequence) = {
            let entry = self.presence_slots.entry(user_id.clone()).or_default();
            let sequence = entry.latest.fetch_add(1, Ordering::AcqRel) + 1;
            (Arc::clone(entry.value()), sequence)
        };
        let presence = Arc::clone(&self.presence);
        let slots = Arc::clone(&self.presence_slots);
        tokio::spawn(async move {
            let _turn = slot.gate.lock().await;
            if slot.latest.load(Ordering::Acquire) != sequence {
                debug!(user_id = %user_id, status = %status, "Presence update superseded");
                return;
            }
            if let Err(e) = presence
                .update_presence(user_id.clone(), status, PresenceMetadata::active_now())
                .await
            {
                debug!(user_id = %user_id, status = %status, error = %e, "Presence update dropped");
            }
            slots.remove_if(&user_id, |_, current| {
                current.latest.load(Ordering::Acquire) == sequence
            });
        });
    }

    /// Record client activity without a frame (e.g. a protocol pong).
    pub fn touch(&self, connection_id: &ConnectionId) -> bool {
        match self.connections.get_mut(connection_id) {
            Some(mut entry) => {
                entry.touch();
                true
            }
            None => false,
        }
    }

    /// Queue a message for one connection.
    pub async fn send_to(
        &self,
        connection_id: &ConnectionId,
        message: &ServerMessage,
    ) -> Result<(), DomainError> {
        let sender = self
            .connections
            .get(connection_id)
            .filter(|entry| entry.state.is_open())
            .map(|entry| entry.sender.clone())
            .ok_or_else(|| not_found(connection_id))?;
        let text = encode(message)?;
        let report = self.deliver(vec![(*connection_id, sender)], text).await;
        if report.failed.is_empty() {
            Ok(())
        } else {
            Err(DomainError::new(
                ErrorCode::Timeout,
                format!("Connection {} is not accepting frames", connection_id),
            ))
        }
    }

    async fn send_error(&self, connection_id: &ConnectionId, code: &str, message: impl Into<String>) {
        let frame = ServerMessage::error(code, message);
        if let Err(e) = self.send_to(connection_id, &frame).await {
            debug!(connection_id = %connection_id, error = %e, "Could not deliver error frame");
        }
    }

    /// Process one inbound text frame.
    ///
    /// Protocol and business errors are answered with an `ERROR` frame;
    /// only an unknown connection is reported back to the caller.
    pub async fn handle_inbound(&self, connection_id: &ConnectionId, text: &str) -> Result<(), DomainError> {
        let user_id = {
            let mut entry = self
                .connections
                .get_mut(connection_id)
                .filter(|entry| entry.state.is_open())
                .ok_or_else(|| not_found(connection_id))?;
            entry.touch();
            entry.user_id.clone()
        };

        if let Err(e) = self.check_rate(RateLimitKey::Connection(*connection_id)).await {
            debug!(connection_id = %connection_id, "Inbound frame rate limited");
            self.send_error(connection_id, e.code.as_str(), e.message).await;
            return Ok(());
        }

        let message = match ClientMessage::parse(text) {
            Ok(message) => message,
            Err(e) => {
                debug!(connection_id = %connection_id, error = %e, "Rejected inbound frame");
                self.send_error(connection_id, e.code(), e.to_string()).await;
                return Ok(());
            }
        };

        if let Err(e) = self.dispatch(connection_id, &user_id, message).await {
            self.send_error(connection_id, e.code.as_str(), e.message).await;
        }
        Ok(())
    }

    async fn dispatch(
        &self,
        connection_id: &ConnectionId,
        user_id: &UserId,
        message: ClientMessage,
    ) -> Result<(), DomainError> {
        match message {
            ClientMessage::Ping => self.send_to(connection_id, &ServerMessage::Pong).await,
            ClientMessage::Subscribe { topic } => {
                self.update_entry(connection_id, |entry| {
                    entry.subscriptions.insert(topic);
                })
            }
            ClientMessage::Unsubscribe { topic } => {
                self.update_entry(connection_id, |entry| {
                    entry.subscriptions.remove(&topic);
                })
            }
            ClientMessage::JoinCollaboration { resource_id } => {
                self.join_collaboration(connection_id, user_id, resource_id).await
            }
            ClientMessage::LeaveCollaboration { resource_id } => {
                self.leave_collaboration(connection_id, user_id, resource_id).await
            }
            ClientMessage::PresenceUpdate { status, device } => {
                let metadata = match device {
                    Some(device) => PresenceMetadata::active_now().with_device(device),
                    None => PresenceMetadata::active_now(),
                };
                let record = self
                    .presence
                    .update_presence(user_id.clone(), status, metadata)
                    .await?;
                self.send_to(connection_id, &ServerMessage::Presence(record)).await
            }
            ClientMessage::NotificationRead { notification_id } => {
                self.publisher
                    .publish(
                        EventType::NotificationRead,
                        json!({ "notificationId": notification_id, "userId": user_id }),
                        PublishOptions::default().with_origin_user(user_id.clone()),
                    )
                    .await
                    .map(|_| ())
            }
        }
    }

    fn update_entry(
        &self,
        connection_id: &ConnectionId,
        update: impl FnOnce(&mut ConnectionEntry),
    ) -> Result<(), DomainError> {
        let mut entry = self
            .connections
            .get_mut(connection_id)
            .ok_or_else(|| not_found(connection_id))?;
        update(&mut entry);
        Ok(())
    }

    fn seat_gate(&self, user_id: &UserId) -> Arc<AsyncMutex<()>> {
        Arc::clone(self.seat_gates.entry(user_id.clone()).or_default().value())
    }

    /// Another open connection of `user_id` still sits on `resource_id`.
    fn seat_held_elsewhere(&self, user_id: &UserId, resource_id: &ResourceId) -> bool {
        self.connections
            .iter()
            .any(|entry| &entry.user_id == user_id && entry.collaborations.contains(resource_id))
    }

    /// Release the user's seat unless one of their other connections still
    /// claims it. Call after removing the current connection's claim.
    /// Returns whether the seat was actually released.
    async fn release_seat(&self, user_id: &UserId, resource_id: &ResourceId) -> bool {
        if self.seat_held_elsewhere(user_id, resource_id) {
            debug!(user_id = %user_id, resource_id = %resource_id, "Seat still held by another device");
            return false;
        }
        self.collaboration.remove_collaborator(resource_id, user_id).await
    }

    async fn join_collaboration(
        &self,
        connection_id: &ConnectionId,
        user_id: &UserId,
        resource_id: ResourceId,
    ) -> Result<(), DomainError> {
        let collaborators = {
            let gate = self.seat_gate(user_id);
            let _seats = gate.lock().await;
            let collaborators = self
                .collaboration
                .add_collaborator(&resource_id, user_id.clone())
                .await?;

            let tracked = self.update_entry(connection_id, |entry| {
                entry.collaborations.insert(resource_id.clone());
                entry.subscriptions.insert(resource_id.topic());
            });
            if tracked.is_err() {
                // Closed while joining; undo so the seat is not leaked.
                self.release_seat(user_id, &resource_id).await;
                return tracked;
            }
            collaborators
        };

        self.send_to(
            connection_id,
            &ServerMessage::Collaborators {
                resource_id: resource_id.clone(),
                collaborators: collaborators.clone(),
            },
        )
        .await?;
        self.announce_collaboration(EventType::CollaboratorJoined, &resource_id, user_id, collaborators)
            .await;
        Ok(())
    }

    async fn leave_collaboration(
        &self,
        connection_id: &ConnectionId,
        user_id: &UserId,
        resource_id: ResourceId,
    ) -> Result<(), DomainError> {
        let released = {
            let gate = self.seat_gate(user_id);
            let _seats = gate.lock().await;
            self.update_entry(connection_id, |entry| {
                entry.collaborations.remove(&resource_id);
                entry.subscriptions.remove(&resource_id.topic());
            })?;
            self.release_seat(user_id, &resource_id).await
        };
        if !released {
            return Ok(());
        }
        let collaborators = self.collaboration.get_active_collaborators(&resource_id).await;
        self.send_to(
            connection_id,
            &ServerMessage::Collaborators {
                resource_id: resource_id.clone(),
                collaborators: collaborators.clone(),
            },
        )
        .await?;
        self.announce_collaboration(EventType::CollaboratorLeft, &resource_id, user_id, collaborators)
            .await;
        Ok(())
    }

    async fn announce_collaboration(
        &self,
        event_type: EventType,
        resource_id: &ResourceId,
        user_id: &UserId,
        collaborators: Vec<UserId>,
    ) {
        let payload = json!({
            "resourceId": resource_id,
            "userId": user_id,
            "collaborators": collaborators,
        });
        let options = PublishOptions::default()
            .with_channel(resource_id.topic())
            .with_origin_user(user_id.clone());
        if let Err(e) = self.publisher.publish(event_type, payload, options).await {
            warn!(resource_id = %resource_id, event_type = %event_type, error = %e, "Failed to publish collaboration change");
        }
    }

    /// Send one frame to each target concurrently.
    async fn deliver(
        &self,
        targets: Vec<(ConnectionId, mpsc::Sender<Outbound>)>,
        text: Arc<str>,
    ) -> BroadcastReport {
        let send_timeout = self.settings.send_timeout;
        let results = join_all(targets.into_iter().map(|(connection_id, sender)| {
            let frame = Outbound::Text(Arc::clone(&text));
            async move {
                let ok = sender.send_timeout(frame, send_timeout).await.is_ok();
                (connection_id, ok)
            }
        }))
        .await;

        let mut report = BroadcastReport::default();
        for (connection_id, ok) in results {
            if ok {
                report.delivered += 1;
            } else {
                if let Some(mut entry) = self.connections.get_mut(&connection_id) {
                    entry.send_failures += 1;
                }
                warn!(connection_id = %connection_id, "Failed to queue frame for connection");
                report.failed.push(connection_id);
            }
        }
        report
    }

    fn open_targets(
        &self,
        filter: impl Fn(&ConnectionId, &ConnectionEntry) -> bool,
    ) -> Vec<(ConnectionId, mpsc::Sender<Outbound>)> {
        self.connections
            .iter()
            .filter(|entry| entry.state.is_open() && filter(entry.key(), entry.value()))
            .map(|entry| (*entry.key(), entry.sender.clone()))
            .collect()
    }

    /// Send an event frame to every open connection except `exclude`.
    ///
    /// A failing connection never affects delivery to the others.
    pub async fn broadcast(
        &self,
        event_type: EventType,
        payload: JsonValue,
        exclude: Option<ConnectionId>,
    ) -> BroadcastReport {
        let message = ServerMessage::Event { event_type, payload };
        let Ok(text) = encode(&message) else {
            return BroadcastReport::default();
        };
        let targets = self.open_targets(|id, _| Some(*id) != exclude);
        self.deliver(targets, text).await
    }

    /// Send an event frame to connections subscribed to `topic`.
    pub async fn broadcast_to_topic(
        &self,
        topic: &str,
        event_type: EventType,
        payload: JsonValue,
    ) -> BroadcastReport {
        let message = ServerMessage::Event { event_type, payload };
        let Ok(text) = encode(&message) else {
            return BroadcastReport::default();
        };
        let targets = self.open_targets(|_, entry| entry.subscriptions.contains(topic));
        self.deliver(targets, text).await
    }

    /// Send a message to every connection of one user.
    pub async fn send_to_user(&self, user_id: &UserId, message: &ServerMessage) -> BroadcastReport {
        let Ok(text) = encode(message) else {
            return BroadcastReport::default();
        };
        let targets = self.open_targets(|_, entry| &entry.user_id == user_id);
        self.deliver(targets, text).await
    }

    /// Close a connection and release everything it held.
    ///
    /// Returns `false` if the connection was already gone.
    pub async fn close(&self, connection_id: &ConnectionId, reason: CloseReason) -> bool {
        let Some((_, mut entry)) = self.connections.remove(connection_id) else {
            return false;
        };
        self.open_count.fetch_sub(1, Ordering::AcqRel);

        if let Ok(closing) = entry.state.transition_to(ConnectionState::Closing) {
            entry.state = closing;
            let _ = entry.sender.try_send(Outbound::Close {
                code: reason.code(),
                reason: reason.description(),
            });
        }

        if let Err(e) = self
            .rate_limiter
            .forget(&RateLimitKey::Connection(*connection_id))
            .await
        {
            debug!(connection_id = %connection_id, error = %e, "Could not reset connection rate limit");
        }

        let mut released = Vec::new();
        if !entry.collaborations.is_empty() {
            let gate = self.seat_gate(&entry.user_id);
            let _seats = gate.lock().await;
            for resource_id in entry.collaborations.drain() {
                if self.release_seat(&entry.user_id, &resource_id).await {
                    released.push(resource_id);
                }
            }
        }
        for resource_id in released {
            let collaborators = self.collaboration.get_active_collaborators(&resource_id).await;
            self.announce_collaboration(
                EventType::CollaboratorLeft,
                &resource_id,
                &entry.user_id,
                collaborators,
            )
            .await;
        }

        let last_connection = !self
            .connections
            .iter()
            .any(|other| other.user_id == entry.user_id);
        if last_connection {
            self.seat_gates
                .remove_if(&entry.user_id, |_, gate| Arc::strong_count(gate) == 1);
            self.spawn_presence_update(entry.user_id.clone(), PresenceStatus::Offline);
        }

        if let Ok(closed) = entry.state.transition_to(ConnectionState::Closed) {
            entry.state = closed;
        }
        info!(
            connection_id = %connection_id,
            user_id = %entry.user_id,
            code = reason.code(),
            reason = %reason.description(),
            "Connection closed"
        );
        true
    }

    /// Close every connection silent for longer than the heartbeat timeout.
    pub async fn reap_idle(&self) -> Vec<ConnectionId> {
        let now = Instant::now();
        let timeout = self.settings.heartbeat_timeout;
        let idle: Vec<ConnectionId> = self
            .connections
            .iter()
            .filter(|entry| now.duration_since(entry.last_seen) > timeout)
            .map(|entry| *entry.key())
            .collect();

        for connection_id in &idle {
            self.close(connection_id, CloseReason::IdleTimeout).await;
        }
        idle
    }

    fn ping_all(&self) {
        for entry in self.connections.iter() {
            let _ = entry.sender.try_send(Outbound::Ping);
        }
    }

    /// Close all connections, e.g. on shutdown.
    pub async fn close_all(&self, reason: CloseReason) -> usize {
        let ids: Vec<ConnectionId> = self.connections.iter().map(|e| *e.key()).collect();
        let mut closed = 0;
        for connection_id in ids {
            if self.close(&connection_id, reason.clone()).await {
                closed += 1;
            }
        }
        closed
    }

    /// Ping clients and reap idle connections until shutdown.
    ///
    /// Remaining connections are closed with `GoingAway` on exit.
    pub async fn run_heartbeat(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = time::interval(self.settings.heartbeat_interval);
        interval.tick().await;

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        let closed = self.close_all(CloseReason::GoingAway).await;
                        info!(closed, "Heartbeat monitor stopping");
                        return;
                    }
                }
                _ = interval.tick() => {
                    let reaped = self.reap_idle().await;
                    if !reaped.is_empty() {
                        info!(count = reaped.len(), "Closed idle connections");
                    }
                    self.ping_all();
                }
            }
        }
    }
}

fn not_found(connection_id: &ConnectionId) -> DomainError {
    DomainError::new(
        ErrorCode::ConnectionNotFound,
        format!("Connection {} is not open", connection_id),
    )
}

fn encode(message: &ServerMessage) -> Result<Arc<str>, DomainError> {
    message
        .to_text()
        .map(Arc::from)
        .map_err(|e| DomainError::new(ErrorCode::InternalError, e.to_string()))
}
