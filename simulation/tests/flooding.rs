//! End-to-end flooding behavior through the simulation manager

use std::sync::Arc;
use std::time::Duration;

use meshsim_simulation::scenarios::collect_until_quiet;
use meshsim_simulation::{
    EngineConfig, Event, EventKind, MeshError, Message, NodeId, RunConfig, Scenario, SimulationManager, Topology,
};

fn engine() -> EngineConfig {
    EngineConfig::default()
        .with_max_latency(Duration::ZERO)
        .with_seed(7)
        .with_hub_capacity(256, 65_536)
}

fn topology(json: &str) -> Topology {
    Topology::from_json_str(json).unwrap()
}

const PAIR: &str = r#"{"nodes":[{"id":"A","neighbors":["B"]},{"id":"B","neighbors":["A"]}]}"#;
const LINE: &str = r#"{"nodes":[
    {"id":"A","neighbors":["B"]},
    {"id":"B","neighbors":["C"]},
    {"id":"C","neighbors":[]}
]}"#;

async fn settle(observer: &mut meshsim_simulation::Observer) -> Vec<Arc<Event>> {
    collect_until_quiet(observer, Duration::from_millis(300)).await
}

fn position(events: &[Arc<Event>], pred: impl Fn(&Event) -> bool) -> Option<usize> {
    events.iter().position(|e| pred(e))
}

fn count(events: &[Arc<Event>], kind: EventKind) -> usize {
    events.iter().filter(|e| e.kind == kind).count()
}

#[tokio::test]
async fn test_direct_neighbor_decrypts_without_forwarding() {
    let manager = SimulationManager::new(engine());
    manager.configure(topology(PAIR), RunConfig::new(0.0, 2)).await.unwrap();
    let mut observer = manager.subscribe().await.unwrap();

    manager.send("A", "B").await.unwrap();
    let events = settle(&mut observer).await;

    let received = position(&events, |e| e.kind == EventKind::Received && e.is_to("B")).unwrap();
    let decrypted = position(&events, |e| e.kind == EventKind::Decrypted && e.is_to("B")).unwrap();
    assert!(received < decrypted);
    assert_eq!(events[decrypted].payload_str("plaintext"), Some("Hello from A → B"));
    assert_eq!(events[decrypted].from.as_str(), "A");
    assert_eq!(count(&events, EventKind::Forwarded), 0);

    manager.shutdown().await;
}

#[tokio::test]
async fn test_relay_decrements_ttl_once_per_forward() {
    let manager = SimulationManager::new(engine());
    manager.configure(topology(LINE), RunConfig::new(0.0, 2)).await.unwrap();
    let mut observer = manager.subscribe().await.unwrap();

    manager.send("A", "C").await.unwrap();
    let events = settle(&mut observer).await;

    let at_b_received = position(&events, |e| e.kind == EventKind::Received && e.is_to("B")).unwrap();
    let at_b_forwarded =
        position(&events, |e| e.kind == EventKind::Forwarded && e.from.as_str() == "B").unwrap();
    assert!(at_b_received < at_b_forwarded);
    assert_eq!(events[at_b_received].ttl, 2);
    assert_eq!(events[at_b_forwarded].ttl, 1);
    assert_eq!(events[at_b_forwarded].to, None);

    let at_c_received = position(&events, |e| e.kind == EventKind::Received && e.is_to("C")).unwrap();
    let at_c_decrypted = position(&events, |e| e.kind == EventKind::Decrypted && e.is_to("C")).unwrap();
    assert!(at_b_forwarded < at_c_received);
    assert!(at_c_received < at_c_decrypted);
    assert_eq!(events[at_c_decrypted].ttl, 1);
    assert_eq!(events[at_c_decrypted].payload_str("plaintext"), Some("Hello from A → C"));

    // The origin dispatches without a forward of its own
    assert_eq!(count(&events, EventKind::Forwarded), 1);
    manager.shutdown().await;
}

#[tokio::test]
async fn test_exhausted_ttl_dropped_at_recipient() {
    let manager = SimulationManager::new(engine());
    manager.configure(topology(LINE), RunConfig::new(0.0, 1)).await.unwrap();
    let mut observer = manager.subscribe().await.unwrap();

    manager.send("A", "C").await.unwrap();
    let events = settle(&mut observer).await;

    let forwarded = position(&events, |e| e.kind == EventKind::Forwarded && e.from.as_str() == "B").unwrap();
    assert_eq!(events[forwarded].ttl, 0);

    let delivered = position(&events, |e| e.kind == EventKind::Delivered && e.is_to("C")).unwrap();
    assert_eq!(events[delivered].ttl, 0);

    let received = position(&events, |e| e.kind == EventKind::Received && e.is_to("C")).unwrap();
    let dropped = position(&events, |e| e.kind == EventKind::DroppedTtl && e.is_to("C")).unwrap();
    assert!(forwarded < received && received < dropped);
    assert_eq!(count(&events, EventKind::Decrypted), 0);

    manager.shutdown().await;
}

#[tokio::test]
async fn test_total_loss_never_delivers() {
    let manager = SimulationManager::new(engine());
    let full = r#"{"nodes":[
        {"id":"A","neighbors":["B","C","D"]},
        {"id":"B","neighbors":["A","C","D"]},
        {"id":"C","neighbors":["A","B","D"]},
        {"id":"D","neighbors":["A","B","C"]}
    ]}"#;
    manager.configure(topology(full), RunConfig::new(1.0, 4)).await.unwrap();
    let mut observer = manager.subscribe().await.unwrap();

    for (from, to) in [("A", "D"), ("B", "C"), ("D", "A")] {
        manager.send(from, to).await.unwrap();
    }
    let events = settle(&mut observer).await;

    for origin in ["A", "B", "D"] {
        let drops = events
            .iter()
            .filter(|e| e.kind == EventKind::DroppedNetwork && e.from.as_str() == origin)
            .count();
        assert_eq!(drops, 3, "every edge out of {origin} loses the copy");
    }
    assert_eq!(count(&events, EventKind::Delivered), 0);
    assert_eq!(count(&events, EventKind::Decrypted), 0);

    manager.shutdown().await;
}

#[tokio::test]
async fn test_ttl_along_directed_line() {
    let line = r#"{"nodes":[
        {"id":"N1","neighbors":["N2"]},
        {"id":"N2","neighbors":["N3"]},
        {"id":"N3","neighbors":["N4"]},
        {"id":"N4","neighbors":["N5"]},
        {"id":"N5","neighbors":["N6"]},
        {"id":"N6","neighbors":[]}
    ]}"#;
    let manager = SimulationManager::new(engine());
    let mut observer = manager.subscribe().await.unwrap();

    // Four relays sit between N1 and N6
    for ttl in 1..=7 {
        manager.configure(topology(line), RunConfig::new(0.0, ttl)).await.unwrap();
        manager.send("N1", "N6").await.unwrap();
        let events = settle(&mut observer).await;

        let forwards: Vec<_> = events.iter().filter(|e| e.kind == EventKind::Forwarded).collect();
        for (k, event) in forwards.iter().enumerate() {
            assert_eq!(event.ttl, ttl - (k as i32 + 1));
            assert_eq!(event.from.as_str(), format!("N{}", k + 2));
        }

        let decrypted = events.iter().find(|e| e.kind == EventKind::Decrypted);
        if ttl > 4 {
            let decrypted = decrypted.unwrap();
            assert_eq!(decrypted.ttl, ttl - forwards.len() as i32);
            assert_eq!(forwards.len(), 4);
        } else {
            assert!(decrypted.is_none(), "ttl {ttl} must not reach N6");
            assert_eq!(count(&events, EventKind::DroppedTtl), 1);
        }
    }

    manager.shutdown().await;
}

#[tokio::test]
async fn test_reconfiguration_replaces_previous_generation() {
    let engine = EngineConfig::default()
        .with_max_latency(Duration::from_millis(20))
        .with_seed(3)
        .with_hub_capacity(256, 65_536);
    let manager = SimulationManager::new(engine);
    let mut observer = manager.subscribe().await.unwrap();

    let ring = r#"{"nodes":[
        {"id":"A","neighbors":["B","F"]},
        {"id":"B","neighbors":["A","C"]},
        {"id":"C","neighbors":["B","D"]},
        {"id":"D","neighbors":["C","E"]},
        {"id":"E","neighbors":["D","F"]},
        {"id":"F","neighbors":["E","A"]}
    ]}"#;
    let first = manager.configure(topology(ring), RunConfig::new(0.0, 3)).await.unwrap();
    for (from, to) in [("A", "D"), ("C", "F"), ("E", "B")] {
        manager.send(from, to).await.unwrap();
    }

    // Replace while the first flood is still in flight
    let second = manager.configure(topology(PAIR), RunConfig::new(0.0, 2)).await.unwrap();
    assert_eq!(first.generation + 1, second.generation);
    manager.send("A", "B").await.unwrap();

    let events = settle(&mut observer).await;
    let first_new = events
        .iter()
        .position(|e| e.generation == second.generation)
        .unwrap();
    assert!(
        events[first_new..].iter().all(|e| e.generation == second.generation),
        "old generation emitted after replacement"
    );
    assert!(events[first_new..]
        .iter()
        .any(|e| e.kind == EventKind::Decrypted && e.is_to("B")));
    assert_eq!(manager.node_ids().await, vec![NodeId::new("A"), NodeId::new("B")]);

    manager.shutdown().await;
}

#[tokio::test]
async fn test_drop_rate_statistics() {
    const LEAVES: usize = 100;
    const MESSAGES: usize = 100;
    const P: f64 = 0.3;

    let leaves: Vec<String> = (1..=LEAVES).map(|i| format!("L{i}")).collect();
    let mut nodes = vec![serde_json::json!({ "id": "S", "neighbors": leaves })];
    nodes.extend(leaves.iter().map(|id| serde_json::json!({ "id": id })));
    let star = serde_json::json!({ "nodes": nodes }).to_string();

    let manager = SimulationManager::new(engine());
    manager.configure(topology(&star), RunConfig::new(P, 1)).await.unwrap();
    let mut observer = manager.subscribe().await.unwrap();

    for _ in 0..MESSAGES {
        manager.send("S", "L1").await.unwrap();
    }
    let events = collect_until_quiet(&mut observer, Duration::from_millis(500)).await;

    let dropped = count(&events, EventKind::DroppedNetwork) as f64;
    let delivered = count(&events, EventKind::Delivered) as f64;
    let n = dropped + delivered;
    assert_eq!(n as usize, LEAVES * MESSAGES);

    let observed = dropped / n;
    let standard_error = (P * (1.0 - P) / n).sqrt();
    assert!(
        (observed - P).abs() < 4.0 * standard_error,
        "observed drop fraction {observed} too far from {P}"
    );

    manager.shutdown().await;
}

#[tokio::test]
async fn test_tampered_injection_reports_decrypt_failure() {
    let manager = SimulationManager::new(engine());
    manager.configure(topology(PAIR), RunConfig::new(0.0, 2)).await.unwrap();
    let mut observer = manager.subscribe().await.unwrap();

    let forged = Message::new("A".into(), "B".into(), 2, vec![0xAA; 48], [9; 24]);
    tokio_test::assert_ok!(manager.inject(forged).await);
    let events = settle(&mut observer).await;

    let failed = events
        .iter()
        .find(|e| e.kind == EventKind::DecryptFailed)
        .unwrap();
    assert!(failed.is_to("B"));
    assert_eq!(failed.payload_str("error"), Some("Authentication failed"));
    assert_eq!(count(&events, EventKind::Decrypted), 0);

    // The simulation keeps working afterwards
    manager.send("A", "B").await.unwrap();
    let events = settle(&mut observer).await;
    assert_eq!(count(&events, EventKind::Decrypted), 1);

    let stray = Message::new("Z".into(), "B".into(), 2, vec![0; 16], [0; 24]);
    assert!(matches!(
        manager.inject(stray).await,
        Err(MeshError::UnknownNode(id)) if id.as_str() == "Z"
    ));
    manager.shutdown().await;
}

#[tokio::test]
async fn test_failed_configure_keeps_active_simulation() {
    let manager = SimulationManager::new(engine());
    let first = manager.configure(topology(PAIR), RunConfig::new(0.0, 2)).await.unwrap();

    let dangling = topology(r#"{"nodes":[{"id":"X","neighbors":["Y"]}]}"#);
    assert!(matches!(
        manager.configure(dangling, RunConfig::new(0.0, 2)).await,
        Err(MeshError::Config(_))
    ));
    assert!(matches!(
        manager.configure(topology(PAIR), RunConfig::new(0.0, 0)).await,
        Err(MeshError::Config(_))
    ));

    assert_eq!(manager.generation().await, Some(first.generation));
    let mut observer = manager.subscribe().await.unwrap();
    manager.send("A", "B").await.unwrap();
    let events = settle(&mut observer).await;
    assert!(events.iter().any(|e| e.kind == EventKind::Decrypted && e.generation == first.generation));

    manager.shutdown().await;
}

#[tokio::test]
async fn test_observers_agree_on_order() {
    let manager = SimulationManager::new(engine());
    let ring = r#"{"nodes":[
        {"id":"A","neighbors":["B","D"]},
        {"id":"B","neighbors":["A","C"]},
        {"id":"C","neighbors":["B","D"]},
        {"id":"D","neighbors":["C","A"]}
    ]}"#;
    manager.configure(topology(ring), RunConfig::new(0.2, 3)).await.unwrap();
    let mut first = manager.subscribe().await.unwrap();
    let mut second = manager.subscribe().await.unwrap();

    manager.send("A", "C").await.unwrap();
    manager.send("B", "D").await.unwrap();

    let seen_first = settle(&mut first).await;
    let seen_second = settle(&mut second).await;
    assert!(!seen_first.is_empty());
    assert_eq!(seen_first.len(), seen_second.len());
    for (a, b) in seen_first.iter().zip(&seen_second) {
        assert!(Arc::ptr_eq(a, b));
    }

    manager.shutdown().await;
}

#[tokio::test]
async fn test_builtin_scenarios() {
    let manager = SimulationManager::new(engine());

    let relay = Scenario::Relay.run(&manager, Duration::from_millis(300)).await.unwrap();
    assert_eq!(relay.count(EventKind::Decrypted), 1);
    assert_eq!(relay.at("B").filter(|e| e.kind == EventKind::Forwarded).count(), 1);

    let exhausted = Scenario::TtlExhaustion.run(&manager, Duration::from_millis(300)).await.unwrap();
    assert_eq!(exhausted.count(EventKind::DroppedTtl), 1);
    assert_eq!(exhausted.count(EventKind::Decrypted), 0);

    let lossy = Scenario::Lossy.run(&manager, Duration::from_millis(300)).await.unwrap();
    assert!(lossy.count(EventKind::DroppedNetwork) >= 1);
    assert_eq!(lossy.count(EventKind::Delivered), 0);
    assert!(lossy.generation > exhausted.generation);

    manager.shutdown().await;
}

#[tokio::test]
async fn test_self_loop_floods_back_to_origin() {
    let manager = SimulationManager::new(engine());
    let looped = r#"{"nodes":[
        {"id":"A","neighbors":["A","B"]},
        {"id":"B","neighbors":[]}
    ]}"#;
    manager.configure(topology(looped), RunConfig::new(0.0, 2)).await.unwrap();
    let mut observer = manager.subscribe().await.unwrap();

    manager.send("A", "B").await.unwrap();
    let events = settle(&mut observer).await;

    // A sees its origination plus one looped copy per hop budget step
    let at_a = events.iter().filter(|e| e.kind == EventKind::Received && e.is_to("A")).count();
    assert_eq!(at_a, 4);
    let forwarded_by_a = events
        .iter()
        .filter(|e| e.kind == EventKind::Forwarded && e.from.as_str() == "A")
        .count();
    assert_eq!(forwarded_by_a, 2);
    assert_eq!(count(&events, EventKind::Delivered), 6);
    assert_eq!(count(&events, EventKind::Decrypted), 2);
    assert_eq!(count(&events, EventKind::DroppedTtl), 2);

    manager.shutdown().await;
}
