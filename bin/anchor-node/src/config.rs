//! Node configuration, read from `$EUDICO_PATH/config.toml`.

use bitcoin::Network;
use serde::{Deserialize, Serialize};

/// The configuration values the anchor node recognizes. The key names are
/// part of the deployed config format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct NodeConfig {
    /// `host:port` of the Bitcoin Core JSON-RPC endpoint.
    #[serde(rename = "BitcoinHost")]
    pub bitcoin_host: String,

    /// Basic-auth user for the Bitcoin RPC.
    #[serde(rename = "BitcoinUser", default)]
    pub bitcoin_user: String,

    /// Basic-auth password for the Bitcoin RPC.
    #[serde(rename = "BitcoinPassword", default)]
    pub bitcoin_password: String,

    /// The Bitcoin network checkpoints are anchored on.
    #[serde(rename = "BitcoinNetwork", default = "default_network")]
    pub bitcoin_network: Network,

    /// Object-store endpoint, `host:port`.
    #[serde(rename = "MinioHost")]
    pub minio_host: String,

    /// Object-store access key id.
    #[serde(rename = "MinioAccessKeyID")]
    pub minio_access_key_id: String,

    /// Object-store secret access key.
    #[serde(rename = "MinioSecretAccessKey")]
    pub minio_secret_access_key: String,

    /// Bucket holding the checkpoint config blobs.
    #[serde(rename = "MinioBucketName")]
    pub minio_bucket_name: String,

    /// Fixed fee per checkpoint transaction, in BTC.
    #[serde(rename = "Fee")]
    pub fee: f64,

    /// Hex-encoded 32-byte initial threshold public key (pre-tweak), used to
    /// locate the bootstrap anchor.
    #[serde(rename = "PublicKey")]
    pub public_key: String,

    /// JSON-RPC endpoint of the subnet node.
    #[serde(rename = "SubnetNodeURL", default = "default_subnet_url")]
    pub subnet_node_url: String,
}

fn default_network() -> Network {
    Network::Regtest
}

fn default_subnet_url() -> String {
    "http://127.0.0.1:1234/rpc/v1".to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_serde_toml() {
        let config = r#"
            BitcoinHost = "127.0.0.1:18443"
            BitcoinUser = "satoshi"
            BitcoinPassword = "hunter2"
            MinioHost = "127.0.0.1:9000"
            MinioAccessKeyID = "minioadmin"
            MinioSecretAccessKey = "minioadmin"
            MinioBucketName = "checkpoints"
            Fee = 0.01
            PublicKey = "c74ebba12ecb1d7b7be7a22bd582d30e5c969f9c8e51e1c72b22bbdd4a322667"
        "#;

        let config = toml::from_str::<NodeConfig>(config);
        assert!(
            config.is_ok(),
            "must be able to deserialize config from toml but got: {}",
            config.unwrap_err()
        );

        let config = config.unwrap();
        assert_eq!(config.bitcoin_network, Network::Regtest);
        assert_eq!(config.fee, 0.01);

        let serialized = toml::to_string(&config).unwrap();
        let deserialized = toml::from_str::<NodeConfig>(&serialized).unwrap();
        assert_eq!(
            deserialized, config,
            "must be able to serialize and deserialize config to toml"
        );
    }
}
