//! Gambit key generator
//!
//! Prints fresh secp256k1 identities, and optionally writes a node config
//! for each of them sharing one peer list.
//!
//! # Usage
//!
//! ```bash
//! # One identity
//! gambit-keygen
//!
//! # Four reproducible identities plus a config per node
//! gambit-keygen --count 4 --seed 42 --out-dir devnet
//! ```

use anyhow::{ensure, Context, Result};
use clap::Parser;
use gambit_production::{
    ConsensusConfig, IdentityConfig, NetworkConfig, NodeConfig, PeerEntry, TelemetryConfig,
};
use gambit_types::KeyPair;
use std::path::PathBuf;

/// Gambit key generator
#[derive(Parser, Debug)]
#[command(name = "gambit-keygen")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Number of identities to generate
    #[arg(short = 'n', long, default_value_t = 1)]
    count: usize,

    /// Derive keys from this seed (testing only; never for real deployments)
    #[arg(long)]
    seed: Option<u64>,

    /// Write node-<i>.toml for each identity into this directory
    #[arg(long)]
    out_dir: Option<PathBuf>,
}

fn generate(seed: Option<u64>, index: usize) -> KeyPair {
    match seed {
        Some(seed) => {
            let mut bytes = [0x01; 32];
            bytes[..8].copy_from_slice(&seed.to_le_bytes());
            bytes[8..16].copy_from_slice(&(index as u64).to_le_bytes());
            KeyPair::from_seed(&bytes)
        }
        None => KeyPair::generate(),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    ensure!(cli.count > 0, "--count must be at least 1");

    let keys: Vec<KeyPair> = (0..cli.count).map(|i| generate(cli.seed, i)).collect();

    for (index, key) in keys.iter().enumerate() {
        println!("# node {index}");
        println!("secret_key = \"{}\"", key.secret_hex());
        println!("public_key = \"{}\"", key.public_key().to_hex());
        println!("peer_id    = \"{}\"", key.peer_id());
        println!();
    }

    let peers: Vec<PeerEntry> = keys
        .iter()
        .map(|key| PeerEntry {
            public_key: key.public_key().to_hex(),
        })
        .collect();

    println!("# peer list, in leader rotation order");
    for peer in &peers {
        println!("[[peers]]\npublic_key = \"{}\"\n", peer.public_key);
    }

    let Some(dir) = cli.out_dir else {
        return Ok(());
    };
    std::fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;

    for (index, key) in keys.iter().enumerate() {
        let config = NodeConfig {
            node: IdentityConfig {
                secret_key: key.secret_hex(),
            },
            peers: peers.clone(),
            consensus: ConsensusConfig::default(),
            network: NetworkConfig::default(),
            telemetry: TelemetryConfig::default(),
        };
        config
            .validate()
            .with_context(|| format!("generated config for node {index} is invalid"))?;

        let path = dir.join(format!("node-{index}.toml"));
        let contents = toml::to_string(&config).context("serialising node config")?;
        std::fs::write(&path, contents).with_context(|| format!("writing {}", path.display()))?;
        eprintln!("wrote {}", path.display());
    }
    Ok(())
}
