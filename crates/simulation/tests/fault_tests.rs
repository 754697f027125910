//! Byzantine leaders and network partitions.

use gambit_core::Event;
use gambit_simulation::{NetworkConfig, NodeIndex, SimulationRunner};
use gambit_test_helpers::{signed_move, test_players};
use gambit_types::{
    GameState, Hash, KeyPair, PeerId, Proposal, QuorumCertificate, SessionId, View, VoteKind,
};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use tracing_test::traced_test;

const QUORUM: usize = 3;

fn setup(seed: u64) -> (SimulationRunner, KeyPair, KeyPair, SessionId) {
    let mut runner = SimulationRunner::new(NetworkConfig::default(), seed);
    let (white, black) = test_players();
    runner.start_game(0, white.public_key(), black.public_key());
    let session = SessionId::for_players(&white.public_key(), &black.public_key());
    (runner, white, black, session)
}

fn state(runner: &SimulationRunner, node: NodeIndex, session: &SessionId) -> GameState {
    runner
        .node(node)
        .and_then(|n| n.session(session))
        .map(|s| s.state().clone())
        .unwrap_or_else(|| panic!("node {node} has no session"))
}

fn committed_views(
    runner: &SimulationRunner,
    node: NodeIndex,
    session: &SessionId,
) -> Vec<(View, Hash)> {
    runner
        .node(node)
        .and_then(|n| n.session(session))
        .map(|s| s.committed_views().collect())
        .unwrap_or_default()
}

#[traced_test]
#[test]
fn test_equivocating_leader_cannot_split_quorum() {
    let (mut runner, white, black, session) = setup(7);
    // Node 1 leads view 1
    runner.set_byzantine(1);
    runner.run_until(Duration::from_millis(100));

    let leader = runner.peer_keypair(1).clone();
    let propose = |from: &str, to: &str| {
        Proposal::new_signed(
            View(1),
            1,
            QuorumCertificate::genesis(session),
            None,
            signed_move(&white, &black, &white, None, from, to),
            &leader,
        )
    };
    let first = propose("e2", "e4");
    let second = propose("d2", "d4");

    for (node, proposal) in [(0, &first), (2, &first), (3, &second)] {
        runner.inject_event(
            node,
            Duration::ZERO,
            Event::ProposalReceived {
                proposal: proposal.clone(),
            },
        );
    }
    // Node 0 later sees the conflicting proposal too
    runner.inject_event(
        0,
        Duration::from_millis(400),
        Event::ProposalReceived {
            proposal: second.clone(),
        },
    );
    runner.run_until(Duration::from_secs(1));

    // Every honest peer casts at most one prepare vote in view 1
    let mut voters: BTreeMap<Hash, BTreeSet<PeerId>> = BTreeMap::new();
    let mut votes_per_peer: BTreeMap<PeerId, usize> = BTreeMap::new();
    for event in runner.captured(1) {
        if let Event::VoteReceived { vote } = event {
            if vote.view == View(1) && vote.kind == VoteKind::Prepare {
                voters.entry(vote.proposal_hash).or_default().insert(vote.voter);
                *votes_per_peer.entry(vote.voter).or_default() += 1;
            }
        }
    }
    assert!(votes_per_peer.values().all(|&count| count == 1));

    // The Byzantine leader adds its own signature to whichever side it likes
    let certifiable = voters
        .values()
        .filter(|peers| peers.len() + 1 >= QUORUM)
        .count();
    assert!(certifiable <= 1);

    let node0 = runner.node(0).expect("node 0");
    let flagged = node0
        .session(&session)
        .expect("session")
        .is_flagged(&runner.peer_id(1));
    assert!(flagged);

    // The honest peers time out of view 1 and commit a single move
    runner.run_until(Duration::from_secs(12));

    let honest = [0, 2, 3];
    let expected = committed_views(&runner, 0, &session);
    assert_eq!(expected.len(), 1);
    assert!(expected[0].0 >= View(2));
    for node in honest {
        assert_eq!(committed_views(&runner, node, &session), expected);
        assert_eq!(state(&runner, node, &session).move_count(), 1);
    }
}

#[traced_test]
#[test]
fn test_minority_partition_stalls_then_recovers() {
    let (mut runner, white, black, session) = setup(11);
    runner.run_until(Duration::from_millis(200));

    // No side holds a quorum
    runner.network_mut().partition_groups(&[0, 1], &[2, 3]);
    let e4 = signed_move(&white, &black, &white, None, "e2", "e4");
    runner.submit_transaction(0, e4);
    runner.run_until(Duration::from_secs(5));

    for node in 0..4 {
        assert_eq!(state(&runner, node, &session).move_count(), 0);
    }
    assert!(runner.stats().messages_dropped_partition > 0);

    runner.network_mut().heal_all();
    runner.run_until(Duration::from_secs(20));

    let expected = state(&runner, 0, &session);
    assert_eq!(expected.move_count(), 1);
    for node in 1..4 {
        assert_eq!(state(&runner, node, &session), expected);
    }
}

#[traced_test]
#[test]
fn test_isolated_peer_catches_up_after_heal() {
    let (mut runner, white, black, session) = setup(3);
    runner.network_mut().isolate_node(3);

    let e4 = signed_move(&white, &black, &white, None, "e2", "e4");
    runner.submit_transaction(0, e4);
    runner.run_until(Duration::from_secs(2));

    assert_eq!(state(&runner, 0, &session).move_count(), 1);
    assert!(runner
        .node(3)
        .and_then(|n| n.session(&session))
        .is_none());

    runner.network_mut().heal_all();
    let after_e4 = state(&runner, 0, &session);
    let e5 = signed_move(&white, &black, &black, Some(after_e4.hash()), "e7", "e5");
    runner.submit_transaction(1, e5);
    runner.run_until(Duration::from_secs(6));

    let expected = state(&runner, 0, &session);
    assert_eq!(expected.move_count(), 2);
    assert_eq!(state(&runner, 3, &session), expected);
    assert_eq!(
        committed_views(&runner, 3, &session),
        committed_views(&runner, 0, &session)
    );
    assert!(logs_contain("Replaying commits"));
}

#[traced_test]
#[test]
fn test_slow_leader_is_skipped_by_rotation() {
    let (mut runner, white, black, session) = setup(5);
    runner.run_until(Duration::from_millis(200));

    // Everything node 1 sends lands after the view timeout
    runner.network_mut().slow_node(1, Duration::from_secs(5));
    let e4 = signed_move(&white, &black, &white, None, "e2", "e4");
    runner.submit_transaction(0, e4);
    runner.run_until(Duration::from_secs(15));

    let expected = committed_views(&runner, 0, &session);
    assert_eq!(expected.len(), 1);
    assert!(expected[0].0 >= View(2));
    for node in 0..4 {
        assert_eq!(state(&runner, node, &session).move_count(), 1);
        assert_eq!(committed_views(&runner, node, &session), expected);
    }
}
