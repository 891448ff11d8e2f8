//! Parses command-line arguments for the anchor node.

use std::path::PathBuf;

use clap::{crate_version, Parser};

#[derive(Debug, Parser)]
#[clap(
    name = "anchor-node",
    about = "Checkpoints a subnet chain onto Bitcoin",
    version = crate_version!()
)]
pub(crate) struct Cli {
    #[clap(
        long,
        short = 'i',
        help = "This node's identity in the signing group (its peer id)"
    )]
    pub party_id: String,

    #[clap(
        long,
        short = 'p',
        env = "EUDICO_PATH",
        help = "Directory holding config.toml and share.toml"
    )]
    pub path: PathBuf,
}
