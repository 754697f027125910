//! Multi-peer engine tests over an in-memory, instantly delivering network.

use crate::{BftConfig, ConsensusEngine, ConsensusPhase, EvidenceKind, GameSession};
use gambit_core::{Action, Event, RequestId, TimerId};
use gambit_mempool::PoolError;
use gambit_types::{
    Color, Hash, KeyPair, PieceKind, Proposal, QuorumCertificate, Transaction, View, Vote,
    VoteKind,
};
use gambit_test_helpers::{signed_move, square, test_peers, test_players, test_topology};
use std::collections::{HashSet, VecDeque};
use std::time::Duration;
use tracing_test::traced_test;

const TIMEOUT: Duration = Duration::from_secs(3);

struct Cluster {
    keys: Vec<KeyPair>,
    white: KeyPair,
    black: KeyPair,
    engines: Vec<ConsensusEngine>,
    sessions: Vec<GameSession>,
    now: Duration,
    inbox: VecDeque<(usize, Event)>,
    crashed: HashSet<usize>,
    drop_commit_votes: bool,
    results: Vec<Result<Hash, PoolError>>,
}

impl Cluster {
    fn new(n: usize) -> Self {
        let keys = test_peers(n);
        let (white, black) = test_players();
        let engines: Vec<ConsensusEngine> = (0..n)
            .map(|i| {
                ConsensusEngine::new(
                    keys[i].clone(),
                    test_topology(&keys, i),
                    BftConfig::default().with_view_timeout(TIMEOUT),
                )
            })
            .collect();
        let sessions = engines
            .iter()
            .map(|engine| {
                engine
                    .new_session(white.public_key(), black.public_key(), Duration::ZERO)
                    .0
            })
            .collect();
        Self {
            keys,
            white,
            black,
            engines,
            sessions,
            now: Duration::ZERO,
            inbox: VecDeque::new(),
            crashed: HashSet::new(),
            drop_commit_votes: false,
            results: vec![],
        }
    }

    fn index_of(&self, peer: gambit_types::PeerId) -> usize {
        self.keys
            .iter()
            .position(|k| k.peer_id() == peer)
            .expect("known peer")
    }

    fn dispatch(&mut self, from: usize, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::Broadcast { message } => {
                    for to in 0..self.keys.len() {
                        if to != from {
                            self.inbox.push_back((to, message.clone().into_event()));
                        }
                    }
                }
                Action::SendTo { peer, message } => {
                    let to = self.index_of(peer);
                    self.inbox.push_back((to, message.into_event()));
                }
                Action::EmitTransactionResult { result, .. } => self.results.push(result),
                _ => {}
            }
        }
    }

    fn deliver(&mut self, to: usize, event: Event) {
        if self.crashed.contains(&to) {
            return;
        }
        if self.drop_commit_votes
            && matches!(&event, Event::VoteReceived { vote } if vote.kind == VoteKind::Commit)
        {
            return;
        }
        let actions = self.engines[to].handle(&mut self.sessions[to], event, self.now);
        self.dispatch(to, actions);
    }

    fn run(&mut self) {
        while let Some((to, event)) = self.inbox.pop_front() {
            self.deliver(to, event);
        }
    }

    fn submit(&mut self, at: usize, tx: Transaction) {
        self.deliver(
            at,
            Event::SubmitTransaction {
                tx,
                request_id: RequestId(1),
            },
        );
        self.run();
    }

    fn fire_timeouts(&mut self) {
        self.now += TIMEOUT;
        for i in 0..self.keys.len() {
            let session = self.sessions[i].id();
            self.deliver(i, Event::ViewTimeout { session });
        }
        self.run();
    }

    fn e4(&self) -> Transaction {
        signed_move(&self.white, &self.black, &self.white, None, "e2", "e4")
    }

    fn session(&self, i: usize) -> &GameSession {
        &self.sessions[i]
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Happy Path
// ═══════════════════════════════════════════════════════════════════════════

#[traced_test]
#[test]
fn test_move_commits_on_every_peer() {
    let mut cluster = Cluster::new(4);
    let tx = cluster.e4();
    cluster.submit(0, tx.clone());

    assert_eq!(cluster.results, vec![Ok(tx.hash())]);
    for i in 0..4 {
        let session = cluster.session(i);
        assert_eq!(session.committed_height(), 1, "peer {i}");
        assert_eq!(session.state().turn, Color::Black);
        assert_eq!(
            session.state().board.get(square("e4")).map(|p| p.kind),
            Some(PieceKind::Pawn)
        );
        assert!(session.state().board.get(square("e2")).is_none());
        assert_eq!(session.view(), View(2));
        assert_eq!(session.phase(), ConsensusPhase::Idle);
        assert!(session.pool().is_empty());
        assert!(session.locked().is_none());
    }

    // Every peer recorded the same committed (view, proposal) pair
    let committed: Vec<_> = cluster.session(0).committed_views().collect();
    assert_eq!(committed.len(), 1);
    for i in 1..4 {
        assert_eq!(cluster.session(i).committed_views().collect::<Vec<_>>(), committed);
    }

    // The leader of view 1 cached both certificates
    let leader = cluster.session(1);
    assert!(leader.qc(View(1), VoteKind::Prepare).is_some());
    assert_eq!(
        leader.qc(View(1), VoteKind::Commit),
        Some(leader.highest_qc())
    );
    assert!(logs_contain("Committed move"));
}

#[traced_test]
#[test]
fn test_committed_transaction_resubmission_is_stale() {
    let mut cluster = Cluster::new(4);
    let tx = cluster.e4();
    cluster.submit(0, tx.clone());
    cluster.submit(2, tx);

    assert_eq!(cluster.results.last(), Some(&Err(PoolError::StaleProposal)));
    assert_eq!(cluster.session(2).committed_height(), 1);
}

#[traced_test]
#[test]
fn test_game_progresses_over_several_moves() {
    let mut cluster = Cluster::new(4);
    let moves = [("e2", "e4"), ("e7", "e5"), ("g1", "f3"), ("b8", "c6")];

    for (i, (from, to)) in moves.iter().enumerate() {
        let signer = if i % 2 == 0 {
            cluster.white.clone()
        } else {
            cluster.black.clone()
        };
        let prior = Some(cluster.session(0).state().hash());
        let tx = signed_move(&cluster.white, &cluster.black, &signer, prior, from, to);
        cluster.submit(i % 4, tx);
    }

    let expected = cluster.session(0).state().clone();
    assert_eq!(expected.move_count(), 4);
    assert_eq!(expected.turn, Color::White);
    for i in 1..4 {
        assert_eq!(cluster.session(i).state(), &expected);
        assert_eq!(cluster.session(i).commit_log().len(), 4);
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Byzantine Input
// ═══════════════════════════════════════════════════════════════════════════

#[traced_test]
#[test]
fn test_illegal_move_proposal_gets_no_vote() {
    let mut cluster = Cluster::new(4);
    // White signs a move of a black pawn
    let illegal = signed_move(&cluster.white, &cluster.black, &cluster.white, None, "e7", "e5");
    let session_id = cluster.session(0).id();
    let proposal = Proposal::new_signed(
        View(1),
        1,
        QuorumCertificate::genesis(session_id),
        None,
        illegal,
        &cluster.keys[1],
    );

    let actions = cluster.engines[0].handle(
        &mut cluster.sessions[0],
        Event::ProposalReceived { proposal },
        Duration::ZERO,
    );
    assert!(actions.is_empty());
    assert_eq!(cluster.session(0).phase(), ConsensusPhase::Idle);
    assert!(logs_contain("Dropped invalid message"));
}

#[traced_test]
#[test]
fn test_proposal_from_non_leader_dropped() {
    let mut cluster = Cluster::new(4);
    let session_id = cluster.session(0).id();
    let proposal = Proposal::new_signed(
        View(1),
        1,
        QuorumCertificate::genesis(session_id),
        None,
        cluster.e4(),
        &cluster.keys[2],
    );

    let actions = cluster.engines[0].handle(
        &mut cluster.sessions[0],
        Event::ProposalReceived { proposal },
        Duration::ZERO,
    );
    assert!(actions.is_empty());
    assert!(logs_contain("is not the leader of"));
}

#[traced_test]
#[test]
fn test_equivocating_leader_flagged() {
    let mut cluster = Cluster::new(4);
    let session_id = cluster.session(0).id();
    let leader = cluster.keys[1].clone();
    let d4 = signed_move(&cluster.white, &cluster.black, &cluster.white, None, "d2", "d4");

    let first = Proposal::new_signed(
        View(1),
        1,
        QuorumCertificate::genesis(session_id),
        None,
        cluster.e4(),
        &leader,
    );
    let second = Proposal::new_signed(
        View(1),
        1,
        QuorumCertificate::genesis(session_id),
        None,
        d4,
        &leader,
    );

    let voted = cluster.engines[0].handle(
        &mut cluster.sessions[0],
        Event::ProposalReceived { proposal: first },
        Duration::ZERO,
    );
    assert_eq!(voted.len(), 1);
    let refused = cluster.engines[0].handle(
        &mut cluster.sessions[0],
        Event::ProposalReceived { proposal: second },
        Duration::ZERO,
    );
    assert!(refused.is_empty());

    let session = cluster.session(0);
    assert!(session.is_flagged(&leader.peer_id()));
    assert_eq!(session.evidence().len(), 1);
    assert_eq!(session.evidence()[0].kind, EvidenceKind::Proposal);
    assert!(logs_contain("Leader equivocated"));
}

#[traced_test]
#[test]
fn test_tampered_relay_does_not_shadow_genuine_proposal() {
    let mut cluster = Cluster::new(4);
    let session_id = cluster.session(0).id();
    let leader = cluster.keys[1].clone();
    let genuine = Proposal::new_signed(
        View(1),
        1,
        QuorumCertificate::genesis(session_id),
        None,
        cluster.e4(),
        &leader,
    );

    let mut tampered = genuine.clone();
    tampered.parent_qc.height = 5;
    let dropped = cluster.engines[0].handle(
        &mut cluster.sessions[0],
        Event::ProposalReceived { proposal: tampered },
        Duration::ZERO,
    );
    assert!(dropped.is_empty());
    assert!(logs_contain("bad signature from"));

    let voted = cluster.engines[0].handle(
        &mut cluster.sessions[0],
        Event::ProposalReceived { proposal: genuine },
        Duration::ZERO,
    );
    assert!(matches!(
        voted.as_slice(),
        [Action::SendTo { message, .. }] if matches!(
            message.clone().into_event(),
            Event::VoteReceived { vote } if vote.kind == VoteKind::Prepare
        )
    ));
    assert!(!cluster.session(0).is_flagged(&leader.peer_id()));
}

#[traced_test]
#[test]
fn test_parent_qc_at_max_height_rejected() {
    let mut cluster = Cluster::new(4);
    let session_id = cluster.session(0).id();
    let mut parent = QuorumCertificate::genesis(session_id);
    parent.height = u64::MAX;
    let proposal = Proposal::new_signed(View(1), 1, parent, None, cluster.e4(), &cluster.keys[1]);

    let actions = cluster.engines[0].handle(
        &mut cluster.sessions[0],
        Event::ProposalReceived { proposal },
        Duration::ZERO,
    );
    assert!(actions.is_empty());
    assert!(logs_contain("parent certificate does not extend the committed state"));
    assert_eq!(cluster.session(0).committed_height(), 0);
}

#[traced_test]
#[test]
fn test_equivocating_voter_flagged() {
    let mut cluster = Cluster::new(4);
    let session_id = cluster.session(1).id();
    let voter = cluster.keys[2].clone();

    for hash in [Hash::from_bytes(b"first"), Hash::from_bytes(b"second")] {
        let vote = Vote::new_signed(session_id, View(1), 1, VoteKind::Prepare, hash, &voter);
        cluster.engines[1].handle(
            &mut cluster.sessions[1],
            Event::VoteReceived { vote },
            Duration::ZERO,
        );
    }

    let session = cluster.session(1);
    assert!(session.is_flagged(&voter.peer_id()));
    assert_eq!(
        session.evidence()[0].kind,
        EvidenceKind::Vote(VoteKind::Prepare)
    );
    assert!(logs_contain("Voter equivocated"));
}

#[traced_test]
#[test]
fn test_forged_vote_dropped() {
    let mut cluster = Cluster::new(4);
    let session_id = cluster.session(1).id();
    let mut vote = Vote::new_signed(
        session_id,
        View(1),
        1,
        VoteKind::Prepare,
        Hash::from_bytes(b"proposal"),
        &cluster.keys[2],
    );
    vote.voter = cluster.keys[3].peer_id();

    cluster.engines[1].handle(
        &mut cluster.sessions[1],
        Event::VoteReceived { vote },
        Duration::ZERO,
    );
    assert!(cluster.session(1).evidence().is_empty());
    assert!(logs_contain("bad signature"));
}

// ═══════════════════════════════════════════════════════════════════════════
// View Change
// ═══════════════════════════════════════════════════════════════════════════

#[traced_test]
#[test]
fn test_crashed_leader_skipped_by_timeout() {
    let mut cluster = Cluster::new(4);
    cluster.crashed.insert(1);
    cluster.submit(0, cluster.e4());
    assert_eq!(cluster.session(0).committed_height(), 0);

    cluster.fire_timeouts();

    for i in [0, 2, 3] {
        let session = cluster.session(i);
        assert_eq!(session.committed_height(), 1, "peer {i}");
        assert_eq!(session.view(), View(3));
        assert_eq!(session.stats().view_changes, 1);
    }
    assert_eq!(cluster.session(0).commit_log()[0].proposal.view, View(2));
    assert!(logs_contain("Liveness timeout"));
}

#[traced_test]
#[test]
fn test_idle_session_does_not_change_view() {
    let mut cluster = Cluster::new(4);
    cluster.fire_timeouts();
    for i in 0..4 {
        assert_eq!(cluster.session(i).view(), View(1));
    }
}

#[test]
fn test_timer_rearmed_for_remainder() {
    let mut cluster = Cluster::new(4);
    let session = cluster.session(0).id();
    let actions = cluster.engines[0].handle(
        &mut cluster.sessions[0],
        Event::ViewTimeout { session },
        Duration::from_secs(1),
    );
    assert!(matches!(
        actions.as_slice(),
        [Action::SetTimer { id: TimerId::ViewTimeout(s), duration }]
            if *s == session && *duration == Duration::from_secs(2)
    ));
}

#[traced_test]
#[test]
fn test_locked_transaction_reproposed_after_view_change() {
    let mut cluster = Cluster::new(4);
    cluster.drop_commit_votes = true;
    let tx = cluster.e4();
    cluster.submit(0, tx.clone());

    for i in 0..4 {
        let lock = cluster.session(i).locked().expect("locked after prepare QC");
        assert_eq!(lock.proposal.transaction, tx);
        assert_eq!(cluster.session(i).committed_height(), 0);
    }

    cluster.drop_commit_votes = false;
    cluster.fire_timeouts();

    for i in 0..4 {
        assert_eq!(cluster.session(i).committed_height(), 1, "peer {i}");
    }
    let committed = &cluster.session(0).commit_log()[0].proposal;
    assert_eq!(committed.view, View(2));
    assert_eq!(committed.transaction, tx);
    assert_eq!(
        committed.justify.as_ref().map(|qc| qc.view),
        Some(View(1))
    );
}

#[traced_test]
#[test]
fn test_locked_peer_refuses_conflicting_proposal() {
    let mut cluster = Cluster::new(4);
    cluster.drop_commit_votes = true;
    cluster.submit(0, cluster.e4());
    cluster.drop_commit_votes = false;

    // Move everyone except the next leader to view 2
    cluster.crashed.insert(2);
    cluster.fire_timeouts();
    assert_eq!(cluster.session(0).view(), View(2));

    let session_id = cluster.session(0).id();
    let d4 = signed_move(&cluster.white, &cluster.black, &cluster.white, None, "d2", "d4");
    let proposal = Proposal::new_signed(
        View(2),
        1,
        QuorumCertificate::genesis(session_id),
        None,
        d4,
        &cluster.keys[2],
    );
    let actions = cluster.engines[0].handle(
        &mut cluster.sessions[0],
        Event::ProposalReceived { proposal },
        cluster.now,
    );
    assert!(actions.is_empty());
    assert!(logs_contain("proposal conflicts with the locked transaction"));
}

// ═══════════════════════════════════════════════════════════════════════════
// Catch-up
// ═══════════════════════════════════════════════════════════════════════════

#[traced_test]
#[test]
fn test_lagging_peer_catches_up_through_sync() {
    let mut cluster = Cluster::new(4);
    cluster.crashed.insert(3);
    cluster.submit(0, cluster.e4());
    assert_eq!(cluster.session(3).committed_height(), 0);
    cluster.crashed.remove(&3);

    let reply = signed_move(&cluster.white, &cluster.black, &cluster.black, None, "e7", "e5");
    cluster.submit(0, reply);

    let expected = cluster.session(0).state().clone();
    assert_eq!(expected.move_count(), 2);
    assert_eq!(cluster.session(3).state(), &expected);
    assert!(logs_contain("Requesting missed commits"));
    assert!(logs_contain("Replaying commits"));
}
