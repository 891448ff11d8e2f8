//! The config blob anchored next to each checkpoint.
//!
//! Line-delimited ASCII: the hex-encoded checkpoint payload, then the sorted
//! party ids, one per line. The blob's SHA256 rides on chain in the
//! checkpoint's `OP_RETURN` output; the blob itself lives in the object
//! store under its lowercase-hex hash.

use anchor_primitives::PartyId;

/// Builds the blob for a checkpoint payload and participant list.
pub fn build_config_blob(cp: &[u8], parties: &[PartyId]) -> Vec<u8> {
    let mut blob = String::with_capacity(cp.len() * 2 + 1 + parties.len() * 64);
    blob.push_str(&hex::encode(cp));
    blob.push('\n');
    for party in parties {
        blob.push_str(party.as_str());
        blob.push('\n');
    }
    blob.into_bytes()
}

/// Recovers the checkpoint payload from a blob's first line.
pub fn checkpoint_from_blob(blob: &[u8]) -> Option<Vec<u8>> {
    let text = std::str::from_utf8(blob).ok()?;
    let first_line = text.lines().next()?;
    hex::decode(first_line).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_layout_is_hex_then_sorted_parties() {
        let parties = vec![PartyId::from("alpha"), PartyId::from("beta")];
        let blob = build_config_blob(&[0xde, 0xad], &parties);

        assert_eq!(blob, b"dead\nalpha\nbeta\n");
    }

    #[test]
    fn checkpoint_round_trips_through_blob() {
        let cp = vec![1, 2, 3, 4];
        let blob = build_config_blob(&cp, &[PartyId::from("a")]);

        assert_eq!(checkpoint_from_blob(&blob), Some(cp));
    }

    #[test]
    fn garbage_blob_yields_none() {
        assert_eq!(checkpoint_from_blob(&[0xff, 0xfe]), None);
        assert_eq!(checkpoint_from_blob(b"not-hex\n"), None);
    }
}
