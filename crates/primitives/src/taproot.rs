//! BIP-340/341 primitives for the checkpoint chain: tagged hashes, the
//! single-leaf commitment tree, output-key tweaking and the key-path spend
//! sighash.
//!
//! Everything in this module is pure and stateless. Byte orders follow the
//! BIPs; the transaction layout handled by [`taproot_sighash`] is the fixed
//! one-input, two-output shape produced by `createrawtransaction` for a
//! checkpoint spend.

use bitcoin::{
    hashes::{sha256, Hash, HashEngine},
    key::TweakedPublicKey,
    secp256k1::{Scalar, XOnlyPublicKey, SECP256K1},
    Address, Network, ScriptBuf,
};
use thiserror::Error;

/// Leaf version byte for a tapscript leaf.
const TAPROOT_LEAF_TAPSCRIPT: u8 = 0xc0;

/// Minimum serialized length of a one-input transaction: 4 (version) + 1
/// (input count) + 36 (outpoint) + 1 (script len) + 4 (sequence) + 1 (output
/// count) + 4 (locktime).
const MIN_TX_LEN: usize = 51;

/// Serialized length of the prevout passed to [`taproot_sighash`]: 8 (amount)
/// + 1 (script length) + 34 (witness-v1 scriptPubKey).
const PREV_UTXO_LEN: usize = 43;

/// Errors produced by the taproot kernel.
#[derive(Debug, Error)]
pub enum TaprootError {
    /// Only `SIGHASH_DEFAULT` key-path spends are supported.
    #[error("unsupported sighash type {0:#04x}")]
    UnsupportedSighash(u8),

    /// The transaction bytes do not have the expected one-input layout.
    #[error("malformed transaction: {0}")]
    MalformedTx(&'static str),

    /// The prevout bytes do not have the expected amount + scriptPubKey
    /// layout.
    #[error("malformed prevout: {0}")]
    MalformedPrevout(&'static str),

    /// A 32-byte slice did not decode to a valid x-only point.
    #[error("invalid x-only public key: {0}")]
    InvalidKey(#[from] bitcoin::secp256k1::Error),

    /// The tweak scalar was not a valid field element.
    #[error("tweak value out of range")]
    TweakOutOfRange,
}

/// Computes `SHA256(SHA256(tag) || SHA256(tag) || part_0 || ... || part_n)`
/// per BIP-340.
pub fn tagged_hash(tag: &str, parts: &[&[u8]]) -> [u8; 32] {
    let tag_digest = sha256::Hash::hash(tag.as_bytes());

    let mut engine = sha256::Hash::engine();
    engine.input(tag_digest.as_ref());
    engine.input(tag_digest.as_ref());
    for part in parts {
        engine.input(part);
    }

    sha256::Hash::from_engine(engine).to_byte_array()
}

/// Computes the merkle root of the single-leaf commitment tree embedding
/// `checkpoint` next to the internal key.
///
/// The checkpoint payload is opaque here; it sits in the TapLeaf script slot
/// and is only ever hashed.
pub fn merkle_root(internal_pubkey: &[u8; 32], checkpoint: &[u8]) -> [u8; 32] {
    tagged_hash(
        "TapLeaf",
        &[&[TAPROOT_LEAF_TAPSCRIPT], internal_pubkey, checkpoint],
    )
}

/// Computes the TapTweak scalar committing the internal key to `merkle_root`.
pub fn tweak_value(internal_pubkey: &[u8; 32], merkle_root: &[u8; 32]) -> [u8; 32] {
    tagged_hash("TapTweak", &[internal_pubkey, merkle_root])
}

/// Applies a TapTweak scalar to an x-only internal key and returns the x-only
/// output key, per Bitcoin Core's key-path spending derivation.
///
/// The internal key is lifted to its even-Y representative, `Q = P + t*G` is
/// computed and the x coordinate of `Q`'s even-Y representative is returned.
pub fn apply_tweak(internal_pubkey: &[u8; 32], tweak: &[u8; 32]) -> Result<[u8; 32], TaprootError> {
    let point = XOnlyPublicKey::from_slice(internal_pubkey)?;
    let scalar = Scalar::from_be_bytes(*tweak).map_err(|_| TaprootError::TweakOutOfRange)?;

    let (tweaked, _parity) = point.add_tweak(SECP256K1, &scalar)?;

    Ok(tweaked.serialize())
}

/// Derives the output key that commits `internal_pubkey` to `checkpoint`.
pub fn checkpoint_pubkey(
    internal_pubkey: &[u8; 32],
    checkpoint: &[u8],
) -> Result<[u8; 32], TaprootError> {
    let root = merkle_root(internal_pubkey, checkpoint);
    apply_tweak(internal_pubkey, &tweak_value(internal_pubkey, &root))
}

/// Encodes an already-tweaked output key as a bech32m taproot address for the
/// given network.
pub fn taproot_address(pubkey: &[u8; 32], network: Network) -> Result<Address, TaprootError> {
    let key = XOnlyPublicKey::from_slice(pubkey)?;
    let tweaked = TweakedPublicKey::dangerous_assume_tweaked(key);

    Ok(Address::p2tr_tweaked(tweaked, network))
}

/// The witness-v1 scriptPubKey `OP_1 0x20 <pubkey>` paying to an
/// already-tweaked output key.
pub fn taproot_script(pubkey: &[u8; 32]) -> Result<ScriptBuf, TaprootError> {
    let key = XOnlyPublicKey::from_slice(pubkey)?;
    let tweaked = TweakedPublicKey::dangerous_assume_tweaked(key);

    Ok(ScriptBuf::new_p2tr_tweaked(tweaked))
}

/// Computes the BIP-341 key-path spend sighash for a one-input transaction.
///
/// `tx` is the non-witness serialization produced by `createrawtransaction`:
/// 4-byte version, a single input (count byte `0x01`, 36-byte outpoint, empty
/// script, 4-byte sequence), the output region and a 4-byte locktime.
/// `prev_utxo` is `amount_le64 || 0x22 || scriptPubKey(34)` for the taproot
/// output being spent. Only `hash_type == 0x00` (`SIGHASH_DEFAULT`) is
/// accepted.
pub fn taproot_sighash(
    tx: &[u8],
    prev_utxo: &[u8],
    hash_type: u8,
) -> Result<[u8; 32], TaprootError> {
    if hash_type != 0x00 {
        return Err(TaprootError::UnsupportedSighash(hash_type));
    }
    if tx.len() < MIN_TX_LEN {
        return Err(TaprootError::MalformedTx("transaction too short"));
    }
    if tx[4] != 0x01 {
        return Err(TaprootError::MalformedTx("expected exactly one input"));
    }
    if tx[41] != 0x00 {
        return Err(TaprootError::MalformedTx("expected an empty script sig"));
    }
    if prev_utxo.len() != PREV_UTXO_LEN || prev_utxo[8] != 0x22 {
        return Err(TaprootError::MalformedPrevout(
            "expected amount plus length-prefixed witness-v1 scriptPubKey",
        ));
    }

    let version = &tx[0..4];
    let outpoint = &tx[5..41];
    let sequence = &tx[42..46];
    let outputs = &tx[47..tx.len() - 4];
    let locktime = &tx[tx.len() - 4..];

    let amount = &prev_utxo[0..8];
    let script_pubkey = &prev_utxo[8..43];

    let mut msg = Vec::with_capacity(2 + 8 + 5 * 32 + 5);
    // ext_flag and sighash epoch, both zero for a key-path spend.
    msg.extend_from_slice(&[0x00, 0x00]);
    msg.extend_from_slice(version);
    msg.extend_from_slice(locktime);
    msg.extend_from_slice(sha256d_part(outpoint).as_ref());
    msg.extend_from_slice(sha256d_part(amount).as_ref());
    msg.extend_from_slice(sha256d_part(script_pubkey).as_ref());
    msg.extend_from_slice(sha256d_part(sequence).as_ref());
    msg.extend_from_slice(sha256d_part(outputs).as_ref());
    // spend type (no annex, key path) and input index.
    msg.push(0x00);
    msg.extend_from_slice(&0u32.to_le_bytes());

    Ok(tagged_hash("TapSighash", &[&msg]))
}

fn sha256d_part(bytes: &[u8]) -> [u8; 32] {
    sha256::Hash::hash(bytes).to_byte_array()
}

#[cfg(test)]
mod tests {
    use bitcoin::{
        absolute::LockTime,
        consensus,
        key::Keypair,
        opcodes::all::OP_RETURN,
        script::PushBytesBuf,
        secp256k1::{rand::rngs::OsRng, SecretKey},
        sighash::{Prevouts, SighashCache},
        taproot::{TapNodeHash, TapTweakHash},
        transaction::Version,
        Amount, OutPoint, Sequence, TapSighashType, Transaction, TxIn, TxOut, Txid, Witness,
    };

    use super::*;

    fn random_xonly() -> [u8; 32] {
        let secret_key = SecretKey::new(&mut OsRng);
        let keypair = Keypair::from_secret_key(SECP256K1, &secret_key);
        let (xonly, _) = XOnlyPublicKey::from_keypair(&keypair);
        xonly.serialize()
    }

    #[test]
    fn tweak_value_matches_rust_bitcoin() {
        let internal = random_xonly();
        let root = merkle_root(&internal, b"subnet tipset key bytes");

        let expected = TapTweakHash::from_key_and_tweak(
            XOnlyPublicKey::from_slice(&internal).unwrap(),
            Some(TapNodeHash::from_byte_array(root)),
        );

        assert_eq!(tweak_value(&internal, &root), expected.to_byte_array());
    }

    #[test]
    fn apply_tweak_matches_rust_bitcoin() {
        use bitcoin::key::TapTweak;

        let internal = random_xonly();
        let root = merkle_root(&internal, b"another checkpoint payload");
        let tweak = tweak_value(&internal, &root);

        let (expected, _parity) = XOnlyPublicKey::from_slice(&internal)
            .unwrap()
            .tap_tweak(SECP256K1, Some(TapNodeHash::from_byte_array(root)));

        assert_eq!(
            apply_tweak(&internal, &tweak).unwrap(),
            expected.serialize()
        );
    }

    #[test]
    fn address_round_trips_to_witness_program() {
        let pubkey = checkpoint_pubkey(&random_xonly(), b"cp").unwrap();

        let address = taproot_address(&pubkey, Network::Regtest).unwrap();
        let encoded = address.to_string();
        assert!(encoded.starts_with("bcrt1p"), "got {encoded}");

        let script = address.script_pubkey();
        assert_eq!(script, taproot_script(&pubkey).unwrap());
        assert_eq!(script.len(), 34);
        assert_eq!(script.as_bytes()[0], 0x51);
        assert_eq!(script.as_bytes()[1], 0x20);
        assert_eq!(&script.as_bytes()[2..], &pubkey);
    }

    #[test]
    fn sighash_rejects_non_default_hash_type() {
        let err = taproot_sighash(&[0u8; 64], &[0u8; 43], 0x01).unwrap_err();
        assert!(matches!(err, TaprootError::UnsupportedSighash(0x01)));
    }

    #[test]
    fn sighash_rejects_multi_input_tx() {
        let mut tx = vec![0u8; 64];
        tx[4] = 0x02;
        let err = taproot_sighash(&tx, &[0u8; 43], 0x00).unwrap_err();
        assert!(matches!(err, TaprootError::MalformedTx(_)));
    }

    #[test]
    fn sighash_matches_rust_bitcoin_key_spend() {
        let prev_pubkey = checkpoint_pubkey(&random_xonly(), b"previous checkpoint").unwrap();
        let prev_script = taproot_script(&prev_pubkey).unwrap();
        let prev_value = Amount::from_btc(49.999).unwrap();

        let next_pubkey = checkpoint_pubkey(&random_xonly(), b"next checkpoint").unwrap();
        let data = PushBytesBuf::try_from(vec![0xabu8; 32]).unwrap();
        let op_return = ScriptBuf::builder()
            .push_opcode(OP_RETURN)
            .push_slice(data)
            .into_script();

        let tx = Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: vec![TxIn {
                previous_output: OutPoint {
                    txid: "f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0f0"
                        .parse::<Txid>()
                        .unwrap(),
                    vout: 0,
                },
                script_sig: ScriptBuf::new(),
                sequence: Sequence::MAX,
                witness: Witness::new(),
            }],
            output: vec![
                TxOut {
                    value: Amount::from_btc(49.99).unwrap(),
                    script_pubkey: taproot_script(&next_pubkey).unwrap(),
                },
                TxOut {
                    value: Amount::ZERO,
                    script_pubkey: op_return,
                },
            ],
        };

        let prev_txout = TxOut {
            value: prev_value,
            script_pubkey: prev_script.clone(),
        };
        let expected = SighashCache::new(&tx)
            .taproot_key_spend_signature_hash(
                0,
                &Prevouts::All(&[prev_txout]),
                TapSighashType::Default,
            )
            .unwrap();

        let mut prev_utxo = Vec::with_capacity(43);
        prev_utxo.extend_from_slice(&prev_value.to_sat().to_le_bytes());
        prev_utxo.push(0x22);
        prev_utxo.extend_from_slice(prev_script.as_bytes());

        let raw = consensus::encode::serialize(&tx);
        let sighash = taproot_sighash(&raw, &prev_utxo, 0x00).unwrap();

        assert_eq!(sighash, expected.to_byte_array());
    }
}
