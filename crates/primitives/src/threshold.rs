//! The threshold key configuration produced by a key generation ceremony and
//! its on-disk share file format.

use std::{collections::BTreeMap, fs, io, path::Path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::party::PartyId;

/// A compressed secp256k1 point attesting one party's share of the group
/// key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VerificationShare(#[serde(with = "hex::serde")] pub [u8; 33]);

/// The threshold signing configuration held by one validator.
///
/// Every participant's config agrees on `public_key`, `threshold` and the
/// key set of `verification_shares`; only `party_id` and `private_share`
/// differ per node. The sorted participant list is derived from the
/// verification share keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdKeyConfig {
    /// The local node's identity within the group.
    pub party_id: PartyId,

    /// Minimum number of signers required to produce a signature.
    pub threshold: u16,

    /// The local secret signing share. Never leaves the node.
    #[serde(with = "hex::serde")]
    pub private_share: [u8; 32],

    /// The x-only group public key, identical across the group.
    #[serde(with = "hex::serde")]
    pub public_key: [u8; 32],

    /// Per-party verification shares, keyed by party id.
    pub verification_shares: BTreeMap<PartyId, VerificationShare>,
}

impl ThresholdKeyConfig {
    /// The participant list in canonical signing order.
    ///
    /// `BTreeMap` iteration already yields the lexicographic order every node
    /// must agree on.
    pub fn participants(&self) -> Vec<PartyId> {
        self.verification_shares.keys().cloned().collect()
    }

    /// Number of parties holding a share.
    pub fn group_size(&self) -> usize {
        self.verification_shares.len()
    }

    /// Checks the internal consistency of the config.
    pub fn validate(&self) -> Result<(), ShareFileError> {
        let n = self.group_size() as u16;
        if self.threshold == 0 || self.threshold > n {
            return Err(ShareFileError::BadThreshold {
                threshold: self.threshold,
                group_size: n,
            });
        }
        if !self.verification_shares.contains_key(&self.party_id) {
            return Err(ShareFileError::SelfNotInGroup(self.party_id.clone()));
        }
        Ok(())
    }
}

/// The threshold policy: strictly more than half of the group.
pub fn threshold_for(group_size: usize) -> u16 {
    (group_size / 2 + 1) as u16
}

/// Errors loading or storing the share file.
#[derive(Debug, Error)]
pub enum ShareFileError {
    /// Reading or writing the file failed.
    #[error("share file io: {0}")]
    Io(#[from] io::Error),

    /// The file contents were not valid TOML.
    #[error("share file parse: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized.
    #[error("share file encode: {0}")]
    Encode(#[from] toml::ser::Error),

    /// The threshold does not fit the group size.
    #[error("threshold {threshold} invalid for group of {group_size}")]
    BadThreshold { threshold: u16, group_size: u16 },

    /// The local party does not hold a verification share.
    #[error("party {0} is not part of the signing group")]
    SelfNotInGroup(PartyId),
}

/// On-disk share file. The field names (including the historical `Thershold`
/// misspelling) are part of the format and must not change.
#[derive(Debug, Serialize, Deserialize)]
struct ShareFile {
    #[serde(rename = "PrivateShare", with = "hex::serde")]
    private_share: [u8; 32],

    #[serde(rename = "PublicKey", with = "hex::serde")]
    public_key: [u8; 32],

    #[serde(rename = "Thershold")]
    threshold: u16,

    #[serde(rename = "VerificationShares")]
    verification_shares: BTreeMap<String, ShareFileEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ShareFileEntry {
    #[serde(rename = "Share", with = "hex::serde")]
    share: [u8; 33],
}

/// Loads a [`ThresholdKeyConfig`] from `path`, binding it to the local
/// `party_id`. Returns `Ok(None)` when the file does not exist.
pub fn load_share_file(
    path: &Path,
    party_id: &PartyId,
) -> Result<Option<ThresholdKeyConfig>, ShareFileError> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let file: ShareFile = toml::from_str(&contents)?;

    let config = ThresholdKeyConfig {
        party_id: party_id.clone(),
        threshold: file.threshold,
        private_share: file.private_share,
        public_key: file.public_key,
        verification_shares: file
            .verification_shares
            .into_iter()
            .map(|(id, entry)| (PartyId::from(id), VerificationShare(entry.share)))
            .collect(),
    };
    config.validate()?;

    Ok(Some(config))
}

/// Writes the share file for `config` to `path`.
pub fn store_share_file(path: &Path, config: &ThresholdKeyConfig) -> Result<(), ShareFileError> {
    let file = ShareFile {
        private_share: config.private_share,
        public_key: config.public_key,
        threshold: config.threshold,
        verification_shares: config
            .verification_shares
            .iter()
            .map(|(id, share)| {
                (
                    id.as_str().to_owned(),
                    ShareFileEntry { share: share.0 },
                )
            })
            .collect(),
    };

    fs::write(path, toml::to_string(&file)?)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> ThresholdKeyConfig {
        let shares = [
            ("12D3KooWA", [0x02; 33]),
            ("12D3KooWB", [0x03; 33]),
            ("12D3KooWC", [0x02; 33]),
        ];

        ThresholdKeyConfig {
            party_id: PartyId::from("12D3KooWB"),
            threshold: 2,
            private_share: [0x11; 32],
            public_key: [0x22; 32],
            verification_shares: shares
                .into_iter()
                .map(|(id, bytes)| (PartyId::from(id), VerificationShare(bytes)))
                .collect(),
        }
    }

    #[test]
    fn threshold_is_majority_plus_one() {
        assert_eq!(threshold_for(1), 1);
        assert_eq!(threshold_for(2), 2);
        assert_eq!(threshold_for(3), 2);
        assert_eq!(threshold_for(4), 3);
        assert_eq!(threshold_for(5), 3);
    }

    #[test]
    fn participants_are_sorted() {
        let ids: Vec<String> = sample_config()
            .participants()
            .iter()
            .map(|p| p.as_str().to_owned())
            .collect();
        assert_eq!(ids, vec!["12D3KooWA", "12D3KooWB", "12D3KooWC"]);
    }

    #[test]
    fn share_file_round_trips_with_legacy_field_names() {
        let dir = std::env::temp_dir().join("anchor-share-file-test");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("share.toml");

        let config = sample_config();
        store_share_file(&path, &config).unwrap();

        let written = fs::read_to_string(&path).unwrap();
        assert!(written.contains("Thershold = 2"), "got:\n{written}");
        assert!(written.contains("PrivateShare"));
        assert!(written.contains("[VerificationShares.12D3KooWA]"));

        let loaded = load_share_file(&path, &config.party_id).unwrap().unwrap();
        assert_eq!(loaded, config);

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn missing_share_file_is_none() {
        let path = Path::new("/definitely/not/here/share.toml");
        let loaded = load_share_file(path, &PartyId::from("a")).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn validate_rejects_foreign_party() {
        let mut config = sample_config();
        config.party_id = PartyId::from("outsider");
        assert!(matches!(
            config.validate(),
            Err(ShareFileError::SelfNotInGroup(_))
        ));
    }
}
