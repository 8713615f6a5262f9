use std::fmt::Debug;

use bech32::{segwit, Hrp};
use bitcoin::{
    base58,
    bip32::{ChildNumber, Xpub},
    hashes::Hash,
    secp256k1::{Secp256k1, VerifyOnly},
};

use crate::address::{AddressDeriver, DerivationError};

/// Serialized extended keys are 78 bytes: version(4) depth(1) fingerprint(4) child(4) chaincode(32) key(33)
const EXTENDED_KEY_LENGTH: usize = 78;
/// The BIP32 mainnet public version bytes. Litecoin wallets export `Ltub`/`Mtub`, and SLIP-132 wallets export
/// `zpub`/`vpub` etc. The version only labels the key, so it is normalised to this before decoding.
const XPUB_VERSION: [u8; 4] = [0x04, 0x88, 0xB2, 0x1E];
/// Addresses are derived on the external (receiving) chain.
const RECEIVE_CHAIN: u32 = 0;

/// Derives native segwit (P2WPKH) receiving addresses from an account-level extended public key, i.e. the key at
/// `m/84'/2'/0'`. The address at index `i` is the one at `<account>/0/i`.
///
/// A malformed key does not prevent construction. Instead, every derivation returns the parse error, so that a
/// misconfigured key only breaks per-customer allocation rather than the whole process.
pub struct XpubDeriver {
    key: Result<Xpub, DerivationError>,
    hrp: Result<Hrp, DerivationError>,
    secp: Secp256k1<VerifyOnly>,
}

impl Debug for XpubDeriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let valid = self.key.is_ok() && self.hrp.is_ok();
        write!(f, "XpubDeriver(valid: {valid})")
    }
}

impl XpubDeriver {
    pub fn new(extended_key: &str, hrp: &str) -> Self {
        let key = parse_extended_key(extended_key);
        let hrp = Hrp::parse(hrp).map_err(|e| DerivationError::InvalidPrefix(format!("{hrp}: {e}")));
        Self { key, hrp, secp: Secp256k1::verification_only() }
    }

    /// Returns the first configuration error, if any.
    pub fn validate(&self) -> Result<(), DerivationError> {
        self.key.as_ref().map_err(Clone::clone)?;
        self.hrp.as_ref().map_err(Clone::clone)?;
        Ok(())
    }
}

impl AddressDeriver for XpubDeriver {
    fn derive_address(&self, index: u32) -> Result<String, DerivationError> {
        let key = self.key.as_ref().map_err(Clone::clone)?;
        let hrp = *self.hrp.as_ref().map_err(Clone::clone)?;
        let chain = ChildNumber::from_normal_idx(RECEIVE_CHAIN)
            .map_err(|e| DerivationError::DerivationFailed(e.to_string()))?;
        let child =
            ChildNumber::from_normal_idx(index).map_err(|_| DerivationError::IndexOutOfRange(i64::from(index)))?;
        let derived =
            key.derive_pub(&self.secp, &[chain, child]).map_err(|e| DerivationError::DerivationFailed(e.to_string()))?;
        let program = derived.to_pub().wpubkey_hash();
        segwit::encode_v0(hrp, program.as_byte_array()).map_err(|e| DerivationError::DerivationFailed(e.to_string()))
    }
}

fn parse_extended_key(s: &str) -> Result<Xpub, DerivationError> {
    let mut data = base58::decode_check(s.trim()).map_err(|e| DerivationError::InvalidKey(e.to_string()))?;
    if data.len() != EXTENDED_KEY_LENGTH {
        return Err(DerivationError::InvalidKey(format!(
            "Expected {EXTENDED_KEY_LENGTH} bytes, but the key is {} bytes long",
            data.len()
        )));
    }
    data[0..4].copy_from_slice(&XPUB_VERSION);
    Xpub::decode(&data).map_err(|e| DerivationError::InvalidKey(e.to_string()))
}
