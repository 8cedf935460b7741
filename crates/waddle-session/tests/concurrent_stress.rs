//! Concurrent connect/sign-in interleaved with fan-out.

mod common;

use std::collections::HashSet;
use std::sync::Arc;

use common::{connection_pair, init_tracing, within, Peer};
use futures::future::join_all;
use waddle_session::{
    Device, Message, Principal, Session, SessionManager, SessionManagerConfig, SignInOutcome,
};

const USERS: i64 = 200;
const DEVICES_PER_USER: i64 = 2;
const SENDERS: usize = 400;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_sign_ins_leave_consistent_registry() {
    init_tracing();
    let manager = Arc::new(SessionManager::new(SessionManagerConfig::default()));

    let sign_ins = (1..=USERS).flat_map(|user| {
        (1..=DEVICES_PER_USER).map(move |device| (Principal::new(user), Device::new(device)))
    });
    let sign_in_tasks: Vec<_> = sign_ins
        .map(|(uid, device)| {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move {
                let (conn, peer) = connection_pair();
                let temp = manager.connect(conn);
                tokio::task::yield_now().await;
                let outcome = manager.sign_in(temp, uid, device);
                (peer, outcome)
            })
        })
        .collect();

    let sender_tasks: Vec<_> = (0..SENDERS)
        .map(|i| {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move {
                let uid = Principal::new((i as i64 % USERS) + 1);
                manager.enqueue_message(uid, Device::ALL, Message::from(format!("m{}", i)));
            })
        })
        .collect();

    let results = within(join_all(sign_in_tasks)).await;
    within(join_all(sender_tasks)).await;

    // Keep every peer alive so no session is torn down by a hang-up.
    let mut peers: Vec<Peer> = Vec::new();
    for result in results {
        let (peer, outcome) = result.unwrap();
        assert_eq!(outcome, SignInOutcome::SignedIn { evicted: None });
        peers.push(peer);
    }

    let expected = (USERS * DEVICES_PER_USER) as usize;
    assert_eq!(manager.session_count(), expected);
    assert_eq!(manager.all_principals().len(), USERS as usize);
    assert_eq!(manager.registry().user_count(), USERS as usize);

    for user in 1..=USERS {
        let uid = Principal::new(user);
        let snapshot = manager.registry().get(uid);
        assert_eq!(snapshot.len(), DEVICES_PER_USER as usize);

        let mut ids = HashSet::new();
        for (device, session) in snapshot.iter() {
            assert!(!session.is_closed());
            assert_eq!(session.identity().principal, uid);
            assert_eq!(session.identity().device, device);
            assert!(ids.insert(session.id()));
        }
    }
    assert_eq!(peers.len(), expected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_competing_sign_ins_for_one_device_leave_one_winner() {
    init_tracing();
    let manager = Arc::new(SessionManager::new(SessionManagerConfig::default()));
    let uid = Principal::new(5);
    let device = Device::new(1);

    let mut peers = Vec::new();
    let mut temps = Vec::new();
    for _ in 0..50 {
        let (conn, peer) = connection_pair();
        temps.push(manager.connect(conn));
        peers.push(peer);
    }

    let tasks: Vec<_> = temps
        .into_iter()
        .map(|temp| {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.sign_in(temp, uid, device) })
        })
        .collect();
    let outcomes = within(join_all(tasks)).await;

    let evictions = outcomes
        .into_iter()
        .map(|outcome| outcome.unwrap())
        .filter(|outcome| matches!(outcome, SignInOutcome::SignedIn { evicted: Some(_) }))
        .count();

    // Every sign-in but the first displaced someone; one session remains.
    assert_eq!(evictions, 49);
    let snapshot = manager.registry().get(uid);
    assert_eq!(snapshot.len(), 1);
    assert!(!snapshot.get(device).unwrap().is_closed());
    assert_eq!(manager.session_count(), 1);
}
