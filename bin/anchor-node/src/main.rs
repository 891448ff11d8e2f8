//! The anchor node: checkpoints a subnet chain onto Bitcoin with a
//! FROST-held taproot key.

use std::{fs, path::Path, sync::Arc, time::Duration};

use anchor_blob_store::{http::HttpBlobStoreConfig, HttpBlobStore};
use anchor_btc_client::{BitcoinClient, BtcClientConfig};
use anchor_common::logging::{self, LoggerConfig};
use anchor_coordinator::{Coordinator, CoordinatorConfig, CoordinatorState, MatcherParams};
use anchor_primitives::{threshold::load_share_file, PartyId};
use anchor_pubsub::{Fabric, KeygenTopic};
use anyhow::Context;
use clap::Parser;
use config::NodeConfig;
use serde::de::DeserializeOwned;
use tokio::runtime;
use tracing::{debug, info, trace};

mod args;
mod child_rpc;
mod config;

fn main() -> anyhow::Result<()> {
    logging::init(LoggerConfig::with_base_name("anchor-node"));

    let cli = args::Cli::parse();
    info!(path = %cli.path.display(), "starting anchor node");

    let node_config = parse_toml::<NodeConfig>(cli.path.join("config.toml"));

    let runtime = runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("must be able to create runtime");

    runtime.block_on(run(cli, node_config))
}

async fn run(cli: args::Cli, node_config: NodeConfig) -> anyhow::Result<()> {
    let party_id = PartyId::from(cli.party_id);
    let share_path = cli.path.join("share.toml");

    let shares = load_share_file(&share_path, &party_id).context("loading share file")?;
    match &shares {
        Some(config) => info!(
            threshold = config.threshold,
            group = config.group_size(),
            "loaded existing threshold shares"
        ),
        None => info!("no share file; awaiting the first key generation"),
    }

    let bootstrap_pubkey: [u8; 32] = hex::decode(&node_config.public_key)
        .context("PublicKey is not hex")?
        .try_into()
        .map_err(|_| anyhow::anyhow!("PublicKey must be 32 bytes"))?;
    let fee = bitcoin::Amount::from_btc(node_config.fee).context("Fee is not a valid amount")?;

    let wallet = BitcoinClient::new(&BtcClientConfig {
        host: node_config.bitcoin_host.clone(),
        user: node_config.bitcoin_user.clone(),
        pass: node_config.bitcoin_password.clone(),
        timeout: None,
    })?;

    let blobs = HttpBlobStore::new(&HttpBlobStoreConfig {
        host: node_config.minio_host.clone(),
        bucket: node_config.minio_bucket_name.clone(),
        access_key_id: node_config.minio_access_key_id.clone(),
        secret_access_key: node_config.minio_secret_access_key.clone(),
    });

    let child = child_rpc::ChildRpcClient::new(&node_config.subnet_node_url)?;
    let fabric: Arc<dyn Fabric> = child_rpc::RpcFabric::new(&node_config.subnet_node_url)?;
    let topic = KeygenTopic::join(fabric, party_id.clone()).await?;
    debug!(%party_id, "joined ceremony topic");

    let mut coordinator = Coordinator::new(
        child.clone(),
        wallet,
        blobs,
        topic,
        CoordinatorConfig {
            network: node_config.bitcoin_network,
            fee,
            bootstrap_pubkey,
            share_file: Some(share_path),
        },
        CoordinatorState::at_boot(shares),
    );

    // A dead Bitcoin node means the coordinator must not start at all.
    coordinator.bootstrap().await.context("bootstrap failed")?;

    let head_changes = child_rpc::spawn_head_poller(
        child,
        MatcherParams::default(),
        Duration::from_secs(2),
    );

    tokio::select! {
        _ = coordinator.listen(head_changes) => {}
        _ = tokio::signal::ctrl_c() => info!("shutdown signal received"),
    }

    info!("anchor node shutdown complete");
    Ok(())
}

/// Reads and parses a TOML file from the given path into the given type `T`.
///
/// # Panics
///
/// 1. If the file is not readable.
/// 2. If the contents of the file cannot be deserialized into the given type `T`.
fn parse_toml<T>(path: impl AsRef<Path>) -> T
where
    T: std::fmt::Debug + DeserializeOwned,
{
    fs::read_to_string(path)
        .map(|p| {
            trace!(?p, "read file");

            let parsed = toml::from_str::<T>(&p).unwrap_or_else(|e| {
                panic!("failed to parse TOML file: {e:?}");
            });
            debug!(?parsed, "parsed TOML file");

            parsed
        })
        .unwrap_or_else(|_| {
            panic!("failed to read TOML file");
        })
}
