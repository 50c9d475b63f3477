//! End-to-end discovery against in-process fake PLUs.
//!
//! Each fake unit serves `GET /info` and records `POST /config` bodies, and
//! can be switched offline (it then answers 503).

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use plu_control::network::{HttpProbe, LineState};
use plu_control::registry::RegistryEvent;
use plu_control::roles::RoleCatalog;
use plu_control::topology::Position;
use plu_control::{ControlCenter, ControlConfig};

use serde_json::{json, Value};
use warp::http::StatusCode;
use warp::Filter;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct FakePlu {
    addr: SocketAddr,
    online: Arc<AtomicBool>,
    received: Arc<Mutex<Vec<Value>>>,
}

impl FakePlu {
    fn spawn(id: u32, role: i64, battery: i64) -> Self {
        let online = Arc::new(AtomicBool::new(true));
        let received: Arc<Mutex<Vec<Value>>> = Arc::default();

        let info_online = Arc::clone(&online);
        let info = warp::path("info").and(warp::get()).map(move || {
            let body = warp::reply::json(&json!({"id": id, "role": role, "batLel": battery}));
            let status = if info_online.load(Ordering::SeqCst) {
                StatusCode::OK
            } else {
                StatusCode::SERVICE_UNAVAILABLE
            };
            warp::reply::with_status(body, status)
        });

        let log = Arc::clone(&received);
        let config = warp::path("config")
            .and(warp::post())
            .and(warp::body::json())
            .map(move |body: Value| {
                log.lock().unwrap().push(body);
                "ok"
            });

        let (addr, server) =
            warp::serve(info.or(config)).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(server);

        Self { addr, online, received }
    }

    fn address(&self) -> String {
        self.addr.to_string()
    }

    fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    fn received(&self) -> Vec<Value> {
        self.received.lock().unwrap().clone()
    }
}

fn closed_address() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr.to_string()
}

fn make_center(dir: &std::path::Path, addresses: Vec<String>) -> ControlCenter {
    let mut catalog = RoleCatalog::new(dir.join("roles.db"));
    catalog.add("Cutter").unwrap();
    catalog.add("Welder").unwrap();
    catalog.save().unwrap();

    let config = ControlConfig {
        role_store: dir.join("roles.db"),
        figure_dir: dir.join("figures"),
        probe_timeout_ms: 500,
        ..ControlConfig::default()
    };
    let probe = HttpProbe::new(&config.info_path, config.probe_timeout()).unwrap();
    ControlCenter::with_probe(config, catalog, addresses, Arc::new(probe)).unwrap()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn discovers_updates_and_evicts() {
    let dir = tempfile::tempdir().unwrap();
    let a = FakePlu::spawn(1, 1, 90);
    let b = FakePlu::spawn(2, 2, 0);
    let center = make_center(
        dir.path(),
        vec![a.address(), closed_address(), b.address()],
    );
    let mut events = center.registry().subscribe();

    let summary = center.poller().run_cycle().await;
    assert_eq!(summary.added, vec![1, 2]);

    let plu_b = center.registry().get(2).await.unwrap();
    assert_eq!(plu_b.ip, b.address());
    assert_eq!(plu_b.role_id, Some(2));
    assert_eq!(plu_b.battery_level, 0);
    assert!(matches!(events.recv().await.unwrap(), RegistryEvent::Added(d) if d.id == 1));

    // One missed cycle is enough to drop a unit.
    a.set_online(false);
    let summary = center.poller().run_cycle().await;
    assert_eq!(summary.removed, vec![1]);
    assert!(center.registry().get(1).await.is_none());

    a.set_online(true);
    let summary = center.poller().run_cycle().await;
    assert_eq!(summary.added, vec![1]);
    assert_eq!(center.registry().len().await, 2);
}

#[tokio::test]
async fn commands_reach_live_units() {
    let dir = tempfile::tempdir().unwrap();
    let a = FakePlu::spawn(1, 1, 90);
    let b = FakePlu::spawn(2, -1, 55);
    let center = make_center(dir.path(), vec![a.address(), b.address()]);
    center.poller().run_cycle().await;

    center.assign_role(2, 1).await.unwrap();
    assert_eq!(b.received(), vec![json!({"role": "Cutter", "state": 0})]);

    let delivery = center.set_line_state(LineState::Start).await;
    tokio::time::timeout(Duration::from_secs(3), delivery)
        .await
        .expect("broadcast did not finish")
        .unwrap();
    assert_eq!(a.received(), vec![json!({"state": 1})]);
    assert_eq!(b.received().last(), Some(&json!({"state": 1})));
}

#[tokio::test]
async fn topology_follows_positions_across_cycles() {
    let dir = tempfile::tempdir().unwrap();
    let units: Vec<FakePlu> = (1..=3).map(|id| FakePlu::spawn(id, 1, 80)).collect();
    let center = make_center(dir.path(), units.iter().map(FakePlu::address).collect());
    center.poller().run_cycle().await;

    let registry = center.registry();
    registry.update_status(1, None, Some(Position::new(0.0, 0.0))).await.unwrap();
    registry.update_status(2, None, Some(Position::new(100.0, 0.0))).await.unwrap();
    registry.update_status(3, None, Some(Position::new(200.0, 0.0))).await.unwrap();

    let before = registry.topology().await;
    center.poller().run_cycle().await;
    assert_eq!(registry.topology().await, before);
    assert_eq!(before[&2].inputs, vec![1]);
    assert_eq!(before[&2].outputs, vec![3]);

    units[1].set_online(false);
    center.poller().run_cycle().await;
    let after = registry.topology().await;
    assert!(!after.contains_key(&2));
    assert!(after[&1].outputs.is_empty());
    assert!(after[&3].inputs.is_empty());
}
