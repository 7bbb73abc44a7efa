//! End-to-end relay tests over real sockets.
//!
//! A host and two clients on loopback. The receiving client must end
//! up simulating exactly what the sender simulates, with nothing but
//! the start snapshot and relayed actions crossing the wire.

use std::net::SocketAddr;
use std::time::Duration;

use conquest_core::action::Action;
use conquest_core::faction::FactionId;
use conquest_core::map::LayoutConfig;
use conquest_core::simulation::ConquestSim;
use conquest_core::snapshot::MatchSnapshot;
use conquest_net::client::{ClientEvent, ClientSession};
use conquest_net::error::NetError;
use conquest_net::host::{HostCommand, HostHandle, HostSession};
use conquest_net::wire::PeerProfile;
use conquest_net::NetConfig;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(2);

async fn spawn_host(max_clients: u8) -> (SocketAddr, HostHandle) {
    let config = NetConfig {
        port: 0,
        max_clients,
        ..NetConfig::default()
    };
    let layout = LayoutConfig {
        seed: 7,
        ..LayoutConfig::default()
    };
    let (session, handle) = HostSession::bind(config, PeerProfile::new("Host", "♞"), layout)
        .await
        .expect("bind host");
    let addr = session.local_addr().expect("local addr");
    tokio::spawn(session.run());
    (addr, handle)
}

async fn join(addr: SocketAddr, name: &str) -> ClientSession {
    let (session, _roster) = ClientSession::connect(addr, PeerProfile::new(name, "x"))
        .await
        .expect("join lobby");
    session
}

async fn next_event(session: &mut ClientSession) -> ClientEvent {
    timeout(WAIT, session.next_event())
        .await
        .expect("timed out waiting for an event")
        .expect("event stream ended")
}

async fn wait_for_start(session: &mut ClientSession) -> MatchSnapshot {
    loop {
        if let ClientEvent::Start(snapshot) = next_event(session).await {
            return snapshot;
        }
    }
}

async fn wait_for_action(session: &mut ClientSession) -> (u8, Action) {
    loop {
        if let ClientEvent::Action { faction, action } = next_event(session).await {
            return (faction, action);
        }
    }
}

#[tokio::test]
async fn test_relayed_action_reproduces_senders_state() {
    let (addr, handle) = spawn_host(3).await;
    let mut alice = join(addr, "alice").await;
    let mut bob = join(addr, "bob").await;

    handle.command(HostCommand::StartMatch).await.unwrap();
    let snap_a = wait_for_start(&mut alice).await;
    let snap_b = wait_for_start(&mut bob).await;

    // Seats are dealt in join order; the host itself is faction 0.
    assert_eq!(snap_a.assigned_faction, 1);
    assert_eq!(snap_b.assigned_faction, 2);
    assert_eq!(snap_a.total_factions, 3);
    assert_eq!(snap_a.strongholds, snap_b.strongholds);

    let mut sim_a = ConquestSim::from_snapshot(&snap_a);
    let mut sim_b = ConquestSim::from_snapshot(&snap_b);
    assert_eq!(sim_a.state_hash(), sim_b.state_hash());

    // Alice dispatches from her citadel and applies it locally.
    let action = Action::SendUnits {
        source: 1,
        target: 0,
        percentage: 50,
        seed: 99,
    };
    sim_a.apply_action(FactionId(1), &action).unwrap();
    alice.send_action(1, action).await.unwrap();

    // Bob receives the identical frame and applies it verbatim.
    let (issuer, relayed) = wait_for_action(&mut bob).await;
    assert_eq!(issuer, 1);
    assert_eq!(relayed, action);
    sim_b.apply_action(FactionId(issuer), &relayed).unwrap();

    for _ in 0..200 {
        sim_a.tick();
        sim_b.tick();
    }
    assert_eq!(sim_a.state_hash(), sim_b.state_hash());
    assert_eq!(sim_a.detachments().len(), sim_b.detachments().len());

    // The origin never hears its own action back.
    let echo = timeout(Duration::from_millis(200), alice.next_event()).await;
    assert!(echo.is_err(), "the origin must not receive an echo");
}

#[tokio::test]
async fn test_invalid_actions_stop_at_the_host() {
    let (addr, handle) = spawn_host(3).await;
    let mut alice = join(addr, "alice").await;
    let mut bob = join(addr, "bob").await;

    handle.command(HostCommand::StartMatch).await.unwrap();
    let _ = wait_for_start(&mut alice).await;
    let _ = wait_for_start(&mut bob).await;

    // Stronghold 2 belongs to faction 2, not to alice.
    let foreign = Action::SendUnits {
        source: 2,
        target: 0,
        percentage: 50,
        seed: 1,
    };
    alice.send_action(1, foreign).await.unwrap();

    // Out-of-range index, same verdict.
    let bogus = Action::SendUnits {
        source: 999,
        target: 0,
        percentage: 50,
        seed: 2,
    };
    alice.send_action(1, bogus).await.unwrap();

    let leaked = timeout(Duration::from_millis(300), bob.next_event()).await;
    assert!(leaked.is_err(), "invalid actions must not be relayed");
}

#[tokio::test]
async fn test_fourth_client_is_refused() {
    let (addr, _handle) = spawn_host(3).await;
    let _a = join(addr, "a").await;
    let _b = join(addr, "b").await;
    let _c = join(addr, "c").await;

    let err = ClientSession::connect(addr, PeerProfile::new("late", "x"))
        .await
        .expect_err("the lobby only seats four");
    assert!(matches!(err, NetError::Refused(reason) if reason.contains("full")));
}

#[tokio::test]
async fn test_join_after_start_is_refused() {
    let (addr, handle) = spawn_host(3).await;
    let mut alice = join(addr, "alice").await;
    handle.command(HostCommand::StartMatch).await.unwrap();
    let _ = wait_for_start(&mut alice).await;

    let err = ClientSession::connect(addr, PeerProfile::new("late", "x"))
        .await
        .expect_err("a running match seats nobody");
    assert!(matches!(err, NetError::Refused(reason) if reason.contains("started")));
}

#[tokio::test]
async fn test_leaving_peer_disappears_from_roster() {
    let (addr, _handle) = spawn_host(3).await;
    let mut alice = join(addr, "alice").await;
    let bob = join(addr, "bob").await;

    // Alice sees bob arrive first.
    loop {
        if let ClientEvent::Roster(peers) = next_event(&mut alice).await {
            if peers.len() == 3 {
                break;
            }
        }
    }

    bob.leave().await.unwrap();

    loop {
        if let ClientEvent::Roster(peers) = next_event(&mut alice).await {
            if peers.len() == 2 {
                assert!(peers.iter().all(|p| p.display_name != "bob"));
                break;
            }
        }
    }
}

#[tokio::test]
async fn test_chat_reaches_other_peers_not_the_sender() {
    let (addr, _handle) = spawn_host(3).await;
    let mut alice = join(addr, "alice").await;
    let mut bob = join(addr, "bob").await;

    alice.send_chat("ready when you are").await.unwrap();

    loop {
        if let ClientEvent::Chat { from, text } = next_event(&mut bob).await {
            assert_eq!(from, "alice");
            assert_eq!(text, "ready when you are");
            break;
        }
    }

    // Alice's queue holds bob's roster update but no chat echo.
    match timeout(Duration::from_millis(200), alice.next_event()).await {
        Ok(Ok(ClientEvent::Roster(_))) => {}
        Ok(other) => panic!("unexpected event for the sender: {other:?}"),
        Err(_) => {}
    }
}
