//! Integration tests for the realtime path.
//!
//! Wires the bus, presence tracker, collaboration coordinator and
//! connection manager the way the server does, using in-memory adapters,
//! and checks what clients observe on their outbound channels.

use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use taskflow_realtime::adapters::collaboration::{CollaborationConfig, CollaborationCoordinator};
use taskflow_realtime::adapters::presence::{InMemoryPresenceStore, PresenceSettings, PresenceTracker};
use taskflow_realtime::adapters::rate_limiter::InMemoryRateLimiter;
use taskflow_realtime::adapters::websocket::{
    AdmittedConnection, ConnectionManager, ConnectionSettings, NotificationComposer, Outbound,
    WebSocketEventBridge,
};
use taskflow_realtime::adapters::{EventBus, EventBusConfig};
use taskflow_realtime::domain::connection::CloseReason;
use taskflow_realtime::domain::foundation::{
    ErrorCode, EventType, NodeId, PublishOptions, ResourceId, UserId,
};
use taskflow_realtime::domain::presence::{PresenceMetadata, PresenceStatus};
use taskflow_realtime::ports::EventPublisher;

// =============================================================================
// Test Infrastructure
// =============================================================================

struct Realtime {
    bus: Arc<EventBus>,
    collaboration: Arc<CollaborationCoordinator>,
    connections: Arc<ConnectionManager>,
}

fn realtime(max_collaborators: usize) -> Realtime {
    let bus = Arc::new(EventBus::new(EventBusConfig::default()));
    let presence = Arc::new(PresenceTracker::new(
        NodeId::new("node-it"),
        Arc::new(InMemoryPresenceStore::new()),
        PresenceSettings::default(),
    ));
    let collaboration = Arc::new(CollaborationCoordinator::new(CollaborationConfig {
        max_collaborators_per_resource: max_collaborators,
        ..Default::default()
    }));
    let connections = Arc::new(ConnectionManager::new(
        ConnectionSettings::default(),
        Arc::new(InMemoryRateLimiter::with_defaults()),
        presence,
        Arc::clone(&collaboration),
        bus.clone(),
    ));
    WebSocketEventBridge::new_shared(&connections)
        .register(bus.as_ref())
        .unwrap();
    NotificationComposer::new_shared(&connections)
        .register(bus.as_ref())
        .unwrap();

    Realtime {
        bus,
        collaboration,
        connections,
    }
}

fn user(id: &str) -> UserId {
    UserId::new(id).unwrap()
}

async fn next_frame(rx: &mut mpsc::Receiver<Outbound>) -> JsonValue {
    match rx.recv().await {
        Some(Outbound::Text(text)) => serde_json::from_str(&text).unwrap(),
        other => panic!("expected text frame, got {:?}", other),
    }
}

async fn connect(rt: &Realtime, id: &str) -> AdmittedConnection {
    let mut conn = rt.connections.admit("192.168.1.20", user(id)).await.unwrap();
    assert_eq!(next_frame(&mut conn.outbound).await["type"], "CONNECTED");
    conn
}

fn assert_quiet(rx: &mut mpsc::Receiver<Outbound>) {
    assert!(rx.try_recv().is_err(), "unexpected frame queued");
}

// =============================================================================
// Collaboration
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_joins_never_exceed_capacity() {
    let coordinator = Arc::new(CollaborationCoordinator::new(CollaborationConfig {
        max_collaborators_per_resource: 5,
        ..Default::default()
    }));
    let resource = ResourceId::new("task-42").unwrap();

    let joins: Vec<_> = (0..20)
        .map(|n| {
            let coordinator = Arc::clone(&coordinator);
            let resource = resource.clone();
            tokio::spawn(async move {
                coordinator
                    .add_collaborator(&resource, user(&format!("user-{n}")))
                    .await
            })
        })
        .collect();

    let mut admitted = 0;
    let mut refused = 0;
    for join in joins {
        match join.await.unwrap() {
            Ok(_) => admitted += 1,
            Err(e) => {
                assert_eq!(e.code, ErrorCode::MaxCollaboratorsExceeded);
                refused += 1;
            }
        }
    }

    assert_eq!(admitted, 5);
    assert_eq!(refused, 15);
    assert_eq!(coordinator.get_active_collaborators(&resource).await.len(), 5);
}

#[tokio::test]
async fn last_leave_discards_session() {
    let coordinator = CollaborationCoordinator::new(CollaborationConfig::default());
    let resource = ResourceId::new("doc-7").unwrap();

    coordinator.add_collaborator(&resource, user("alice")).await.unwrap();
    coordinator.add_collaborator(&resource, user("bob")).await.unwrap();
    assert_eq!(coordinator.session_count(), 1);

    assert!(coordinator.remove_collaborator(&resource, &user("alice")).await);
    assert_eq!(coordinator.session_count(), 1);
    assert!(coordinator.remove_collaborator(&resource, &user("bob")).await);

    assert_eq!(coordinator.session_count(), 0);
    assert!(coordinator.get_active_collaborators(&resource).await.is_empty());
    assert!(!coordinator.remove_collaborator(&resource, &user("bob")).await);
}

#[tokio::test]
async fn collaborators_see_each_other_join_and_leave() {
    let rt = realtime(10);
    let mut alice = connect(&rt, "alice").await;
    let mut bob = connect(&rt, "bob").await;
    let join = r#"{"type":"JOIN_COLLABORATION","payload":{"resourceId":"task-1"}}"#;

    rt.connections.handle_inbound(&alice.connection_id, join).await.unwrap();
    let frame = next_frame(&mut alice.outbound).await;
    assert_eq!(frame["type"], "COLLABORATORS");
    let frame = next_frame(&mut alice.outbound).await;
    assert_eq!(frame["type"], "COLLABORATOR_JOINED");
    assert_eq!(frame["payload"]["userId"], "alice");
    // Bob never subscribed to the resource topic.
    assert_quiet(&mut bob.outbound);

    rt.connections.handle_inbound(&bob.connection_id, join).await.unwrap();
    let frame = next_frame(&mut bob.outbound).await;
    assert_eq!(frame["type"], "COLLABORATORS");
    assert_eq!(frame["payload"]["collaborators"], json!(["alice", "bob"]));
    assert_eq!(next_frame(&mut bob.outbound).await["type"], "COLLABORATOR_JOINED");
    let frame = next_frame(&mut alice.outbound).await;
    assert_eq!(frame["type"], "COLLABORATOR_JOINED");
    assert_eq!(frame["payload"]["userId"], "bob");

    // Disconnecting releases the seat and tells the remaining collaborator.
    assert!(rt.connections.close(&bob.connection_id, CloseReason::Normal).await);
    let frame = next_frame(&mut alice.outbound).await;
    assert_eq!(frame["type"], "COLLABORATOR_LEFT");
    assert_eq!(frame["payload"]["userId"], "bob");

    let resource = ResourceId::new("task-1").unwrap();
    assert_eq!(
        rt.collaboration.get_active_collaborators(&resource).await,
        vec![user("alice")]
    );
}

// =============================================================================
// Presence
// =============================================================================

#[tokio::test(start_paused = true)]
async fn presence_is_unknown_after_ttl() {
    let tracker = PresenceTracker::new(
        NodeId::new("node-it"),
        Arc::new(InMemoryPresenceStore::new()),
        PresenceSettings {
            ttl: Duration::from_secs(5),
            ..Default::default()
        },
    );
    let alice = user("alice");

    tracker
        .update_presence(alice.clone(), PresenceStatus::Away, PresenceMetadata::default())
        .await
        .unwrap();
    let record = tracker.get_presence(&alice).await.unwrap().unwrap();
    assert_eq!(record.status, PresenceStatus::Away);

    tokio::time::advance(Duration::from_secs(6)).await;

    assert_eq!(tracker.get_presence(&alice).await.unwrap(), None);
}

// =============================================================================
// Fan-out
// =============================================================================

#[tokio::test]
async fn broadcast_isolates_a_dead_connection() {
    let rt = realtime(10);
    let mut clients = Vec::new();
    for n in 0..10 {
        clients.push(connect(&rt, &format!("user-{n}")).await);
    }
    let dead = clients.remove(5);
    let dead_id = dead.connection_id;
    drop(dead);

    let report = rt
        .connections
        .broadcast(EventType::ProjectUpdated, json!({"projectId": "p-1"}), None)
        .await;

    assert_eq!(report.attempted(), 10);
    assert_eq!(report.delivered, 9);
    assert_eq!(report.failed, vec![dead_id]);
    assert_eq!(rt.connections.send_failures(&dead_id), Some(1));
    for client in &mut clients {
        assert_eq!(rt.connections.send_failures(&client.connection_id), Some(0));
        let frame = next_frame(&mut client.outbound).await;
        assert_eq!(frame["type"], "PROJECT_UPDATED");
    }
}

#[tokio::test]
async fn published_task_update_reaches_every_client() {
    let rt = realtime(10);
    let mut alice = connect(&rt, "alice").await;
    let mut bob = connect(&rt, "bob").await;

    let report = rt
        .bus
        .publish(
            EventType::TaskUpdated,
            json!({"taskId": "t-1", "status": "done"}),
            PublishOptions::high_priority(),
        )
        .await
        .unwrap();
    assert_eq!(report.handlers_invoked, 1);

    for conn in [&mut alice, &mut bob] {
        let frame = next_frame(&mut conn.outbound).await;
        assert_eq!(frame["type"], "TASK_UPDATED");
        assert_eq!(frame["payload"]["status"], "done");
    }
}

#[tokio::test]
async fn channel_scoped_event_reaches_only_subscribers() {
    let rt = realtime(10);
    let mut alice = connect(&rt, "alice").await;
    let mut bob = connect(&rt, "bob").await;

    rt.connections
        .handle_inbound(
            &alice.connection_id,
            r#"{"type":"SUBSCRIBE","payload":{"topic":"project:p-1"}}"#,
        )
        .await
        .unwrap();

    rt.bus
        .publish(
            EventType::CommentUpdated,
            json!({"commentId": "c-1"}),
            PublishOptions::default().with_channel("project:p-1"),
        )
        .await
        .unwrap();

    assert_eq!(next_frame(&mut alice.outbound).await["type"], "COMMENT_UPDATED");
    assert_quiet(&mut bob.outbound);
}

#[tokio::test]
async fn task_assignment_notifies_the_assignee() {
    let rt = realtime(10);
    let mut alice = connect(&rt, "alice").await;
    let mut bob = connect(&rt, "bob").await;

    rt.bus
        .publish(
            EventType::TaskAssigned,
            json!({"taskId": "t-3", "assigneeId": "bob"}),
            PublishOptions::default().with_origin_user(user("alice")),
        )
        .await
        .unwrap();

    // Everyone sees the assignment itself.
    assert_eq!(next_frame(&mut alice.outbound).await["type"], "TASK_ASSIGNED");

    let mut types = vec![
        next_frame(&mut bob.outbound).await,
        next_frame(&mut bob.outbound).await,
    ];
    types.sort_by_key(|frame| frame["type"].as_str().unwrap_or_default().to_string());
    assert_eq!(types[0]["type"], "NOTIFICATION_CREATED");
    assert_eq!(types[0]["payload"]["userId"], "bob");
    assert_eq!(types[0]["payload"]["kind"], "TASK_ASSIGNED");
    assert_eq!(types[1]["type"], "TASK_ASSIGNED");
    assert_quiet(&mut alice.outbound);
}

#[tokio::test]
async fn notification_read_syncs_only_the_readers_devices() {
    let rt = realtime(10);
    let mut phone = connect(&rt, "alice").await;
    let mut laptop = connect(&rt, "alice").await;
    let mut bob = connect(&rt, "bob").await;

    rt.connections
        .handle_inbound(
            &phone.connection_id,
            r#"{"type":"NOTIFICATION_READ","payload":{"notificationId":"n-1"}}"#,
        )
        .await
        .unwrap();

    for device in [&mut phone, &mut laptop] {
        let frame = next_frame(&mut device.outbound).await;
        assert_eq!(frame["type"], "NOTIFICATION_READ");
        assert_eq!(frame["payload"]["notificationId"], "n-1");
    }
    assert_quiet(&mut bob.outbound);
}
