//! Gambit local devnet
//!
//! Runs a full peer set in one process over an in-memory hub and plays a
//! scripted opening through it, submitting each move to a different peer.
//!
//! # Usage
//!
//! ```bash
//! # Four fresh peers, six moves
//! gambit-devnet
//!
//! # Reproducible keys, shorter view timeout, chatty logs
//! gambit-devnet --peers 7 --seed 42 --view-timeout-ms 1000 --log-level debug
//!
//! # Peers from config files written by `gambit-keygen --out-dir`
//! gambit-devnet --config devnet/node-0.toml --config devnet/node-1.toml \
//!               --config devnet/node-2.toml --config devnet/node-3.toml
//! ```

use anyhow::{bail, ensure, Context, Result};
use clap::Parser;
use gambit_production::{
    init_telemetry, ConsensusConfig, IdentityConfig, LocalHub, NetworkConfig, NodeConfig,
    NodeHandle, PeerEntry, ProductionRunner, TelemetryConfig,
};
use gambit_types::{Color, GameState, KeyPair, MoveAction, Position, PublicKey, Transaction};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Italian game, no castling.
const OPENING: &[(&str, &str)] = &[
    ("e2", "e4"),
    ("e7", "e5"),
    ("g1", "f3"),
    ("b8", "c6"),
    ("f1", "c4"),
    ("f8", "c5"),
    ("c2", "c3"),
    ("g8", "f6"),
    ("d2", "d3"),
    ("d7", "d6"),
];

const PEER_KEY_TAG: u8 = 0x01;
const PLAYER_KEY_TAG: u8 = 0x02;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Commits may take several failed views under load.
const VIEWS_OF_PATIENCE: u32 = 10;

/// Gambit local devnet
///
/// Runs N consensus peers in-process and replicates a chess opening.
#[derive(Parser, Debug)]
#[command(name = "gambit-devnet")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Number of peers to run (ignored with --config)
    #[arg(long, default_value_t = 4)]
    peers: usize,

    /// How many moves of the scripted opening to play
    #[arg(long, default_value_t = 6)]
    moves: usize,

    /// Derive peer and player keys from this seed instead of generating them
    #[arg(long)]
    seed: Option<u64>,

    /// Node configuration file, once per peer
    #[arg(short, long)]
    config: Vec<PathBuf>,

    /// View timeout in milliseconds (ignored with --config)
    #[arg(long, default_value_t = 3000)]
    view_timeout_ms: u64,

    /// Log level filter (RUST_LOG takes precedence)
    #[arg(long)]
    log_level: Option<String>,

    /// Emit JSON logs
    #[arg(long)]
    json: bool,
}

fn keypair(seed: Option<u64>, tag: u8, index: usize) -> KeyPair {
    match seed {
        Some(seed) => {
            let mut bytes = [tag; 32];
            bytes[..8].copy_from_slice(&seed.to_le_bytes());
            bytes[8..16].copy_from_slice(&(index as u64).to_le_bytes());
            KeyPair::from_seed(&bytes)
        }
        None => KeyPair::generate(),
    }
}

fn generated_configs(cli: &Cli) -> Result<Vec<NodeConfig>> {
    ensure!(cli.peers > 0, "--peers must be at least 1");

    let keys: Vec<KeyPair> = (0..cli.peers)
        .map(|index| keypair(cli.seed, PEER_KEY_TAG, index))
        .collect();
    let peers: Vec<PeerEntry> = keys
        .iter()
        .map(|key| PeerEntry {
            public_key: key.public_key().to_hex(),
        })
        .collect();

    Ok(keys
        .iter()
        .map(|key| NodeConfig {
            node: IdentityConfig {
                secret_key: key.secret_hex(),
            },
            peers: peers.clone(),
            consensus: ConsensusConfig {
                view_timeout_ms: cli.view_timeout_ms,
                quorum_threshold: None,
            },
            network: NetworkConfig::default(),
            telemetry: TelemetryConfig::default(),
        })
        .collect())
}

fn load_configs(paths: &[PathBuf]) -> Result<Vec<NodeConfig>> {
    let configs = paths
        .iter()
        .map(|path| {
            NodeConfig::load(path).with_context(|| format!("loading {}", path.display()))
        })
        .collect::<Result<Vec<_>>>()?;

    let expected = configs[0].peer_keys()?;
    for (path, config) in paths.iter().zip(&configs).skip(1) {
        ensure!(
            config.peer_keys()? == expected,
            "{} lists a different peer set than {}",
            path.display(),
            paths[0].display()
        );
    }
    ensure!(
        configs.len() == expected.len(),
        "{} peers configured but {} config files given",
        expected.len(),
        configs.len()
    );
    Ok(configs)
}

/// Poll a node until its copy of the game satisfies `done`.
async fn wait_for_state(
    node: &NodeHandle,
    white: &PublicKey,
    black: &PublicKey,
    patience: Duration,
    done: impl Fn(&GameState) -> bool,
) -> Result<GameState> {
    let deadline = tokio::time::Instant::now() + patience;
    loop {
        if let Some(state) = node.state(white, black).await? {
            if done(&state) {
                return Ok(state);
            }
        }
        if tokio::time::Instant::now() >= deadline {
            bail!("timed out after {patience:?}");
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

fn square(notation: &str) -> Result<Position> {
    Position::from_notation(notation).with_context(|| format!("bad square {notation}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let configs = if cli.config.is_empty() {
        generated_configs(&cli)?
    } else {
        load_configs(&cli.config)?
    };

    let mut telemetry = configs[0].telemetry.clone();
    if let Some(level) = &cli.log_level {
        telemetry.log_level = level.clone();
    }
    telemetry.json |= cli.json;
    init_telemetry(&telemetry).context("failed to initialise logging")?;

    // ═══════════════════════════════════════════════════════════════════════
    // Peers
    // ═══════════════════════════════════════════════════════════════════════

    let hub = LocalHub::new();
    let mut nodes = Vec::with_capacity(configs.len());
    let mut shutdowns = Vec::with_capacity(configs.len());
    let mut tasks = Vec::with_capacity(configs.len());

    for (index, config) in configs.iter().enumerate() {
        config
            .validate()
            .with_context(|| format!("invalid configuration for node {index}"))?;
        let key = config.keypair()?;
        let (transport, inbound) = hub.connect(key.peer_id(), config.network.channel_capacity);

        let mut runner = ProductionRunner::builder()
            .topology(config.topology()?)
            .signing_key(key)
            .bft_config(config.bft_config())
            .transport(Arc::new(transport), inbound)
            .channel_capacity(config.network.channel_capacity)
            .rate_limit(config.rate_limit())
            .build()
            .with_context(|| format!("failed to build node {index}"))?;

        info!(node = index, peer = ?runner.local_peer_id(), "Node ready");
        nodes.push(runner.handle());
        shutdowns.push(runner.shutdown_handle());
        tasks.push(tokio::spawn(runner.run()));
    }

    let view_timeout = Duration::from_millis(configs[0].consensus.view_timeout_ms);
    let patience = view_timeout * VIEWS_OF_PATIENCE;

    // ═══════════════════════════════════════════════════════════════════════
    // Game
    // ═══════════════════════════════════════════════════════════════════════

    let white = keypair(cli.seed, PLAYER_KEY_TAG, 0);
    let black = keypair(cli.seed, PLAYER_KEY_TAG, 1);
    let (white_key, black_key) = (white.public_key(), black.public_key());

    nodes[0].start(&white_key, &black_key).await?;
    info!(white = %white_key, black = %black_key, "Game started");

    let moves = cli.moves.min(OPENING.len());
    for (ply, (from, to)) in OPENING.iter().take(moves).enumerate() {
        let entry = ply % nodes.len();
        let state = wait_for_state(&nodes[entry], &white_key, &black_key, patience, |s| {
            s.move_count() == ply as u64
        })
        .await
        .with_context(|| format!("node {entry} never reached ply {ply}"))?;

        let signer = match state.turn {
            Color::White => &white,
            Color::Black => &black,
        };
        let tx = Transaction::new_signed(
            white_key.clone(),
            black_key.clone(),
            Some(state.hash()),
            MoveAction::new(square(from)?, square(to)?),
            signer,
        );
        let response = nodes[entry].transact(tx).await?;
        if !response.ok {
            bail!("move {from}{to} rejected by node {entry}: {:?}", response.rejection);
        }

        for (index, node) in nodes.iter().enumerate() {
            wait_for_state(node, &white_key, &black_key, patience, |s| {
                s.move_count() > ply as u64
            })
            .await
            .with_context(|| format!("node {index} never committed {from}{to}"))?;
        }
        info!(ply = ply + 1, entry, "Move {from}{to} committed on every peer");
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Report
    // ═══════════════════════════════════════════════════════════════════════

    let state = nodes[0]
        .state(&white_key, &black_key)
        .await?
        .context("game missing on node 0")?;
    println!("{}", state.board);
    println!("moves:  {}", state.history.join(" "));
    println!("status: {:?}, {} to move", state.status, state.turn);

    for (index, node) in nodes.iter().enumerate() {
        if let Some(snapshot) = node.watch(&white_key, &black_key).await? {
            let stats = snapshot.borrow().stats;
            println!(
                "node {index}: view {} height {} view changes {} view syncs {} flagged {}",
                stats.view,
                stats.committed_height,
                stats.view_changes,
                stats.view_syncs,
                stats.flagged_peers
            );
        }
    }

    drop(shutdowns);
    for task in tasks {
        task.await.context("runner task panicked")?;
    }
    Ok(())
}
