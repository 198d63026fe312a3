//! End-to-end cluster tests: bootstrap, routing, placement, shutdown.

use std::sync::mpsc::{channel, Sender};
use std::sync::Mutex;
use std::time::Duration;

use meshwork::prelude::*;
use tempfile::TempDir;

/// Actor forwarding everything it receives to a test channel.
struct Probe {
    tx: Sender<String>,
}

impl Actor<String> for Probe {
    fn receive(&mut self, message: String) {
        let _ = self.tx.send(message);
    }
}

/// Actor that ignores its messages.
struct Sink;

impl Actor<String> for Sink {
    fn receive(&mut self, _message: String) {}
}

/// Find a path the ring assigns to `owner`.
fn path_owned_by(ring: &HashRing, owner: WorkerId, prefix: &str) -> String {
    (0..)
        .map(|i| format!("{prefix}-{i}"))
        .find(|path| ring.node_for(path) == owner)
        .expect("the ring covers every worker")
}

#[test]
fn two_worker_echo_routes_over_the_mesh() {
    let dir = TempDir::new().unwrap();
    let config = ClusterConfig::new(2, dir.path());
    let cluster: Cluster<String> = Cluster::new(config).unwrap();
    let shutdown = cluster.shutdown_signal();

    let ring = HashRing::new(2, DEFAULT_REPLICAS);
    let echo_path = path_owned_by(&ring, 0, "echo");

    let (tx, rx) = channel::<String>();
    let tx = Mutex::new(tx);
    let cluster = cluster.on_worker_start(move |node| {
        if node.worker_id() == 0 {
            let tx = tx.lock().unwrap().clone();
            node.spawn(Props::new(move || Probe { tx: tx.clone() }), &echo_path)
                .unwrap();
        } else {
            let target = echo_path.clone();
            let node = node.clone();
            tokio::task::spawn_local(async move {
                // Give worker 0's callback time to mount the actor.
                tokio::time::sleep(Duration::from_millis(150)).await;
                node.send(&target, "hi".to_string()).await.unwrap();
            });
        }
    });

    let socket_0 = dir.path().join("worker-0.sock");
    let socket_1 = dir.path().join("worker-1.sock");

    let runner = std::thread::spawn(move || cluster.run());
    let received = rx
        .recv_timeout(Duration::from_secs(10))
        .expect("message should reach the echo actor");
    assert_eq!(received, "hi");

    shutdown.trigger();
    runner.join().unwrap().unwrap();

    // Worker stop unlinks the socket files.
    assert!(!socket_0.exists());
    assert!(!socket_1.exists());
}

#[test]
fn first_send_claims_placement_in_the_directory() {
    let dir = TempDir::new().unwrap();
    let config = ClusterConfig::new(2, dir.path());
    let cluster: Cluster<String> = Cluster::new(config).unwrap();
    let shutdown = cluster.shutdown_signal();

    let ring = HashRing::new(2, DEFAULT_REPLICAS);
    // Owned by worker 1 but never spawned when worker 0 first sends to it.
    let target = path_owned_by(&ring, 1, "claim");

    let (claim_tx, claim_rx) = channel::<Option<WorkerId>>();
    let claim_tx = Mutex::new(claim_tx);
    let (msg_tx, msg_rx) = channel::<String>();
    let msg_tx = Mutex::new(msg_tx);

    let cluster = cluster.on_worker_start(move |node| {
        if node.worker_id() == 0 {
            let claim_tx = claim_tx.lock().unwrap().clone();
            let path = target.clone();
            let node = node.clone();
            tokio::task::spawn_local(async move {
                node.send(&path, "poke".to_string()).await.unwrap();
                let _ = claim_tx.send(node.directory().lookup(&path));
            });
        } else {
            let msg_tx = msg_tx.lock().unwrap().clone();
            let path = target.clone();
            let node = node.clone();
            tokio::task::spawn_local(async move {
                // Let worker 0's send land first.
                tokio::time::sleep(Duration::from_millis(300)).await;
                node.spawn(
                    Props::new(move || Probe { tx: msg_tx.clone() }),
                    &path,
                )
                .unwrap();
                // The claimed entry routes this locally, off the wire.
                node.send(&path, "local".to_string()).await.unwrap();
            });
        }
    });

    let runner = std::thread::spawn(move || cluster.run());

    let claimed = claim_rx
        .recv_timeout(Duration::from_secs(10))
        .expect("worker 0 should report the claimed owner");
    assert_eq!(claimed, Some(1));

    let delivered = msg_rx
        .recv_timeout(Duration::from_secs(10))
        .expect("worker 1's local send should be delivered");
    assert_eq!(delivered, "local");

    shutdown.trigger();
    runner.join().unwrap().unwrap();
}

#[test]
fn frames_for_unknown_actors_are_dropped_without_crashing() {
    let dir = TempDir::new().unwrap();
    let config = ClusterConfig::new(2, dir.path());
    let cluster: Cluster<String> = Cluster::new(config).unwrap();
    let shutdown = cluster.shutdown_signal();

    let ring = HashRing::new(2, DEFAULT_REPLICAS);
    // Routed to worker 0, but no actor is ever spawned there.
    let ghost = path_owned_by(&ring, 0, "ghost");

    let (done_tx, done_rx) = channel::<Option<WorkerId>>();
    let done_tx = Mutex::new(done_tx);
    let cluster = cluster.on_worker_start(move |node| {
        if node.worker_id() == 1 {
            let done_tx = done_tx.lock().unwrap().clone();
            let path = ghost.clone();
            let node = node.clone();
            tokio::task::spawn_local(async move {
                node.send(&path, "anyone home?".to_string()).await.unwrap();
                // The frame crosses the mesh and is dropped on worker 0.
                tokio::time::sleep(Duration::from_millis(200)).await;
                let _ = done_tx.send(node.directory().lookup(&path));
            });
        }
    });

    let runner = std::thread::spawn(move || cluster.run());

    let owner = done_rx
        .recv_timeout(Duration::from_secs(10))
        .expect("sender should survive the dropped message");
    assert_eq!(owner, Some(0));

    shutdown.trigger();
    runner.join().unwrap().unwrap();
}

#[test]
fn spawn_refuses_paths_the_ring_places_elsewhere() {
    let dir = TempDir::new().unwrap();
    let config = ClusterConfig::new(2, dir.path());
    let cluster: Cluster<String> = Cluster::new(config).unwrap();
    let shutdown = cluster.shutdown_signal();

    let ring = HashRing::new(2, DEFAULT_REPLICAS);
    let foreign = path_owned_by(&ring, 1, "foreign");

    let (tx, rx) = channel::<bool>();
    let tx = Mutex::new(tx);
    let cluster = cluster.on_worker_start(move |node| {
        if node.worker_id() == 0 {
            let result = node.spawn(Props::new(|| Sink), &foreign);
            let refused = matches!(result, Err(ClusterError::MisplacedSpawn { owner: 1, .. }));
            let _ = tx.lock().unwrap().send(refused);
        }
    });

    let runner = std::thread::spawn(move || cluster.run());

    assert!(rx
        .recv_timeout(Duration::from_secs(10))
        .expect("worker 0 should report the spawn outcome"));

    shutdown.trigger();
    runner.join().unwrap().unwrap();
}

#[test]
fn stopping_an_actor_releases_its_directory_entry() {
    let dir = TempDir::new().unwrap();
    let config = ClusterConfig::new(1, dir.path());
    let cluster: Cluster<String> = Cluster::new(config).unwrap();
    let shutdown = cluster.shutdown_signal();

    let (tx, rx) = channel::<(Option<WorkerId>, Option<WorkerId>)>();
    let tx = Mutex::new(tx);
    let cluster = cluster.on_worker_start(move |node| {
        node.spawn(Props::new(|| Sink), "solo").unwrap();
        let before = node.directory().lookup("solo");
        node.stop_actor("solo");
        let after = node.directory().lookup("solo");
        let _ = tx.lock().unwrap().send((before, after));
    });

    let runner = std::thread::spawn(move || cluster.run());

    let (before, after) = rx
        .recv_timeout(Duration::from_secs(10))
        .expect("worker should report directory state");
    assert_eq!(before, Some(0));
    assert_eq!(after, None);

    shutdown.trigger();
    runner.join().unwrap().unwrap();
}

#[test]
fn invalid_configuration_is_rejected_up_front() {
    let dir = TempDir::new().unwrap();

    let config = ClusterConfig::new(0, dir.path());
    assert!(matches!(
        Cluster::<String>::new(config),
        Err(ClusterError::InvalidWorkerCount)
    ));

    let config = ClusterConfig::new(2, dir.path()).with_table_size(0);
    assert!(matches!(
        Cluster::<String>::new(config),
        Err(ClusterError::InvalidTableSize)
    ));
}
