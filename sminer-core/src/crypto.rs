//! Cryptographic primitives for chain interaction
//!
//! Provides:
//! - Blake2b hashing at the widths the chain uses for keys and payloads
//! - 32-byte account and block-hash identifiers
//! - SS58 account rendering for logs
//! - The miner's signing identity (sr25519 or ed25519), loaded from a
//!   secret URI

use bip39::{Language, Mnemonic};
use blake2::digest::consts::{U16, U32};
use blake2::{Blake2b, Blake2b512, Digest};
use ed25519_dalek::{Signer as _, Verifier as _};
use parity_scale_codec::{Decode, Encode};
use schnorrkel::derive::{ChainCode, Derivation};
use schnorrkel::{signing_context, ExpansionMode, MiniSecretKey};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{ChainError, Result};

/// Signing context used by the chain for sr25519 signatures
const SR25519_CONTEXT: &[u8] = b"substrate";

/// Prefix hashed in front of SS58 payloads
const SS58_PREFIX: &[u8] = b"SS58PRE";

/// Phrase assumed when a secret URI starts directly with a derivation path
pub const DEV_PHRASE: &str =
    "bottom drive obey lake curtain smoke basket hold race lonely fit walk";

/// Blake2b with a 128-bit digest
pub fn blake2_128(data: &[u8]) -> [u8; 16] {
    let mut out = [0u8; 16];
    out.copy_from_slice(&Blake2b::<U16>::digest(data));
    out
}

/// Blake2b with a 256-bit digest
pub fn blake2_256(data: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Blake2b::<U32>::digest(data));
    out
}

/// Parse a `0x`-prefixed (or bare) hex string into exactly `N` bytes
pub fn parse_hex_array<const N: usize>(s: &str) -> Result<[u8; N]> {
    let raw = s.trim().trim_start_matches("0x");
    let bytes =
        hex::decode(raw).map_err(|e| ChainError::InvalidArgument(format!("invalid hex: {}", e)))?;
    if bytes.len() != N {
        return Err(ChainError::InvalidArgument(format!(
            "expected {} bytes, got {}",
            N,
            bytes.len()
        )));
    }
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes);
    Ok(out)
}

/// 32-byte account identifier (public key)
#[derive(
    Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Encode, Decode,
)]
pub struct AccountId(pub [u8; 32]);

impl AccountId {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Render as an SS58 address with the given network prefix
    pub fn to_ss58(&self, prefix: u16) -> String {
        let mut data = Vec::with_capacity(36);
        if prefix < 64 {
            data.push(prefix as u8);
        } else {
            data.push((((prefix & 0b1111_1100) >> 2) as u8) | 0b0100_0000);
            data.push(((prefix >> 8) as u8) | (((prefix & 0b11) as u8) << 6));
        }
        data.extend_from_slice(&self.0);

        let mut hasher = Blake2b512::new();
        hasher.update(SS58_PREFIX);
        hasher.update(&data);
        let checksum = hasher.finalize();
        data.extend_from_slice(&checksum[..2]);

        bs58::encode(data).into_string()
    }
}

impl FromStr for AccountId {
    type Err = ChainError;

    fn from_str(s: &str) -> Result<Self> {
        parse_hex_array(s).map(AccountId)
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountId({})", self)
    }
}

/// 32-byte block hash
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Encode, Decode)]
pub struct BlockHash(pub [u8; 32]);

impl BlockHash {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl FromStr for BlockHash {
    type Err = ChainError;

    fn from_str(s: &str) -> Result<Self> {
        parse_hex_array(s).map(BlockHash)
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockHash({})", self)
    }
}

/// Signature scheme of the miner's key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyScheme {
    #[default]
    Sr25519,
    Ed25519,
}

/// Signature as carried inside a signed extrinsic
#[derive(Clone, PartialEq, Eq, Encode, Decode)]
pub enum MultiSignature {
    Ed25519([u8; 64]),
    Sr25519([u8; 64]),
}

impl MultiSignature {
    /// Check the signature against `message` and the signer's public key
    pub fn verify(&self, message: &[u8], signer: &AccountId) -> bool {
        match self {
            MultiSignature::Ed25519(sig) => {
                let Ok(key) = ed25519_dalek::VerifyingKey::from_bytes(signer.as_bytes()) else {
                    return false;
                };
                key.verify(message, &ed25519_dalek::Signature::from_bytes(sig))
                    .is_ok()
            }
            MultiSignature::Sr25519(sig) => {
                let (Ok(key), Ok(sig)) = (
                    schnorrkel::PublicKey::from_bytes(signer.as_bytes()),
                    schnorrkel::Signature::from_bytes(sig),
                ) else {
                    return false;
                };
                key.verify(signing_context(SR25519_CONTEXT).bytes(message), &sig)
                    .is_ok()
            }
        }
    }
}

impl fmt::Debug for MultiSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MultiSignature::Ed25519(sig) => write!(f, "Ed25519(0x{})", hex::encode(sig)),
            MultiSignature::Sr25519(sig) => write!(f, "Sr25519(0x{})", hex::encode(sig)),
        }
    }
}

/// One step of a derivation path, holding its chain code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Junction {
    Soft([u8; 32]),
    Hard([u8; 32]),
}

impl Junction {
    /// Numeric names encode as u64, anything else as a SCALE string;
    /// encodings longer than 32 bytes are hashed
    fn chain_code(name: &str) -> [u8; 32] {
        let encoded = match name.parse::<u64>() {
            Ok(n) => n.encode(),
            Err(_) => name.encode(),
        };
        if encoded.len() > 32 {
            return blake2_256(&encoded);
        }
        let mut cc = [0u8; 32];
        cc[..encoded.len()].copy_from_slice(&encoded);
        cc
    }
}

/// `phrase(/soft|//hard)*(///password)?`
struct SecretUri<'a> {
    phrase: &'a str,
    path: Vec<Junction>,
    password: &'a str,
}

impl<'a> SecretUri<'a> {
    fn parse(uri: &'a str) -> Result<Self> {
        let (rest, password) = uri.split_once("///").unwrap_or((uri, ""));
        let (phrase, mut remaining) = rest.split_at(rest.find('/').unwrap_or(rest.len()));

        let mut path = Vec::new();
        while let Some(tail) = remaining.strip_prefix('/') {
            let (hard, tail) = match tail.strip_prefix('/') {
                Some(tail) => (true, tail),
                None => (false, tail),
            };
            let (name, rest) = tail.split_at(tail.find('/').unwrap_or(tail.len()));
            if name.is_empty() {
                return Err(ChainError::Signing("empty derivation junction".into()));
            }
            let cc = Junction::chain_code(name);
            path.push(if hard {
                Junction::Hard(cc)
            } else {
                Junction::Soft(cc)
            });
            remaining = rest;
        }

        let phrase = phrase.trim();
        Ok(Self {
            phrase: if phrase.is_empty() { DEV_PHRASE } else { phrase },
            path,
            password,
        })
    }
}

enum KeyMaterial {
    Sr25519(schnorrkel::Keypair),
    Ed25519(ed25519_dalek::SigningKey),
}

impl KeyMaterial {
    fn from_seed(seed: [u8; 32], scheme: KeyScheme) -> Result<Self> {
        Ok(match scheme {
            KeyScheme::Sr25519 => {
                let mini = MiniSecretKey::from_bytes(&seed)
                    .map_err(|e| ChainError::Signing(e.to_string()))?;
                KeyMaterial::Sr25519(mini.expand_to_keypair(ExpansionMode::Ed25519))
            }
            KeyScheme::Ed25519 => KeyMaterial::Ed25519(ed25519_dalek::SigningKey::from_bytes(&seed)),
        })
    }

    /// BIP-39 entropy stretched with the password
    fn from_phrase(phrase: &str, password: &str, scheme: KeyScheme) -> Result<Self> {
        let mnemonic = Mnemonic::parse_in_normalized(Language::English, phrase).map_err(|_| {
            ChainError::Signing("secret is neither a hex seed nor a BIP-39 phrase".into())
        })?;
        let entropy = mnemonic.to_entropy();
        let stretch_failed = |e: substrate_bip39::Error| ChainError::Signing(format!("{:?}", e));

        Ok(match scheme {
            KeyScheme::Sr25519 => {
                let mini = substrate_bip39::mini_secret_from_entropy(&entropy, password)
                    .map_err(stretch_failed)?;
                KeyMaterial::Sr25519(mini.expand_to_keypair(ExpansionMode::Ed25519))
            }
            KeyScheme::Ed25519 => {
                let wide = substrate_bip39::seed_from_entropy(&entropy, password)
                    .map_err(stretch_failed)?;
                let mut seed = [0u8; 32];
                seed.copy_from_slice(&wide[..32]);
                KeyMaterial::Ed25519(ed25519_dalek::SigningKey::from_bytes(&seed))
            }
        })
    }

    fn derive(self, junction: Junction) -> Result<Self> {
        Ok(match (self, junction) {
            (KeyMaterial::Sr25519(pair), Junction::Hard(cc)) => {
                let (mini, _) = pair.secret.hard_derive_mini_secret_key(Some(ChainCode(cc)), b"");
                KeyMaterial::Sr25519(mini.expand_to_keypair(ExpansionMode::Ed25519))
            }
            (KeyMaterial::Sr25519(pair), Junction::Soft(cc)) => {
                KeyMaterial::Sr25519(pair.derived_key_simple(ChainCode(cc), b"").0)
            }
            (KeyMaterial::Ed25519(key), Junction::Hard(cc)) => {
                let seed = blake2_256(&("Ed25519HDKD", key.to_bytes(), cc).encode());
                KeyMaterial::Ed25519(ed25519_dalek::SigningKey::from_bytes(&seed))
            }
            (KeyMaterial::Ed25519(_), Junction::Soft(_)) => {
                return Err(ChainError::Signing(
                    "ed25519 keys only support hard derivation".into(),
                ))
            }
        })
    }

    fn account(&self) -> AccountId {
        match self {
            KeyMaterial::Sr25519(pair) => AccountId(pair.public.to_bytes()),
            KeyMaterial::Ed25519(key) => AccountId(key.verifying_key().to_bytes()),
        }
    }
}

/// Key pair the miner signs every extrinsic with
///
/// Immutable once loaded. The secret never leaves process memory and is
/// redacted from `Debug` output.
pub struct SigningIdentity {
    key: KeyMaterial,
    account: AccountId,
}

impl SigningIdentity {
    /// Load the identity from a secret URI
    ///
    /// The phrase part is either a `0x`-prefixed 32-byte hex seed or a
    /// BIP-39 English mnemonic, optionally followed by `//hard` and `/soft`
    /// junctions and a `///password`. A URI that starts with a junction is
    /// applied to [`DEV_PHRASE`]. The password only affects mnemonics.
    pub fn from_secret(secret: &str, scheme: KeyScheme) -> Result<Self> {
        let secret = secret.trim();
        if secret.is_empty() {
            return Err(ChainError::Signing("secret is empty".into()));
        }
        let uri = SecretUri::parse(secret)?;

        let mut key = if uri.phrase.starts_with("0x") {
            let seed = parse_hex_array::<32>(uri.phrase)
                .map_err(|e| ChainError::Signing(format!("invalid seed: {}", e)))?;
            KeyMaterial::from_seed(seed, scheme)?
        } else {
            KeyMaterial::from_phrase(uri.phrase, uri.password, scheme)?
        };
        for junction in uri.path {
            key = key.derive(junction)?;
        }
        Ok(Self::from_key(key))
    }

    /// Derive the identity from a raw 32-byte seed
    pub fn from_seed(seed: [u8; 32], scheme: KeyScheme) -> Result<Self> {
        KeyMaterial::from_seed(seed, scheme).map(Self::from_key)
    }

    fn from_key(key: KeyMaterial) -> Self {
        Self {
            account: key.account(),
            key,
        }
    }

    /// Account the identity signs for
    pub fn account(&self) -> AccountId {
        self.account
    }

    pub fn scheme(&self) -> KeyScheme {
        match self.key {
            KeyMaterial::Sr25519(_) => KeyScheme::Sr25519,
            KeyMaterial::Ed25519(_) => KeyScheme::Ed25519,
        }
    }

    pub fn sign(&self, message: &[u8]) -> MultiSignature {
        match &self.key {
            KeyMaterial::Sr25519(keypair) => MultiSignature::Sr25519(
                keypair
                    .sign(signing_context(SR25519_CONTEXT).bytes(message))
                    .to_bytes(),
            ),
            KeyMaterial::Ed25519(key) => MultiSignature::Ed25519(key.sign(message).to_bytes()),
        }
    }
}

impl fmt::Debug for SigningIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningIdentity")
            .field("scheme", &self.scheme())
            .field("account", &self.account)
            .field("secret", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALICE: &str = "0xd43593c715fdd31c61141abd04a99fd6822c8558854ccde39a5684e7a56da27d";

    #[test]
    fn test_ss58_generic_prefix() {
        let alice: AccountId = ALICE.parse().unwrap();
        assert_eq!(
            alice.to_ss58(42),
            "5GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY"
        );
    }

    #[test]
    fn test_ss58_two_byte_prefix() {
        let alice: AccountId = ALICE.parse().unwrap();
        let decoded = bs58::decode(alice.to_ss58(11330)).into_vec().unwrap();
        assert_eq!(decoded.len(), 2 + 32 + 2);
        assert_eq!(&decoded[..2], &[0x50, 0xac]);
        assert_eq!(&decoded[2..34], alice.as_bytes());
    }

    #[test]
    fn test_hex_parsing() {
        let alice: AccountId = ALICE.parse().unwrap();
        assert_eq!(alice.to_string(), ALICE);
        assert!("0x1234".parse::<AccountId>().is_err());
        assert!("0xzz".parse::<BlockHash>().is_err());
    }

    #[test]
    fn test_dev_phrase_and_alice() {
        let dev = SigningIdentity::from_secret(DEV_PHRASE, KeyScheme::Sr25519).unwrap();
        assert_eq!(
            dev.account().to_string(),
            "0x46ebddef8cd9bb167dc30878d7113b7e168e6f0646beffd77d69d39bad76b47a"
        );

        let alice = SigningIdentity::from_secret("//Alice", KeyScheme::Sr25519).unwrap();
        assert_eq!(alice.account().to_string(), ALICE);
        let explicit =
            SigningIdentity::from_secret(&format!("{}//Alice", DEV_PHRASE), KeyScheme::Sr25519)
                .unwrap();
        assert_eq!(explicit.account(), alice.account());

        // Alice's derived seed used directly
        let seed = "0xe5be9a5092b81bca64be81d212e7f2f9eba183bb7a90954f7b76361f6edb5c0a";
        let from_seed = SigningIdentity::from_secret(seed, KeyScheme::Sr25519).unwrap();
        assert_eq!(from_seed.account(), alice.account());
    }

    #[test]
    fn test_ed25519_hard_derivation() {
        let alice = SigningIdentity::from_secret("//Alice", KeyScheme::Ed25519).unwrap();
        assert_eq!(
            alice.account().to_string(),
            "0x88dc3417d5058ec4b4503e0c12ea1a0a89be200fe98922423d4334014fa6b0ee"
        );
        assert!(matches!(
            SigningIdentity::from_secret("//Alice/soft", KeyScheme::Ed25519),
            Err(ChainError::Signing(_))
        ));
    }

    #[test]
    fn test_paths_and_passwords_change_the_key() {
        let scheme = KeyScheme::Sr25519;
        let alice = SigningIdentity::from_secret("//Alice", scheme).unwrap();
        let soft = SigningIdentity::from_secret("//Alice/stash", scheme).unwrap();
        let again = SigningIdentity::from_secret("//Alice/stash", scheme).unwrap();
        let numeric = SigningIdentity::from_secret("//Alice//1", scheme).unwrap();
        let guarded = SigningIdentity::from_secret("//Alice///pw", scheme).unwrap();

        assert_eq!(soft.account(), again.account());
        assert_ne!(soft.account(), alice.account());
        assert_ne!(numeric.account(), alice.account());
        assert_ne!(guarded.account(), alice.account());
    }

    #[test]
    fn test_rejects_unparseable_secrets() {
        for bad in ["bottom drive obey lake", "not a mnemonic at all", "//Alice//"] {
            let err = SigningIdentity::from_secret(bad, KeyScheme::Sr25519).unwrap_err();
            assert!(matches!(err, ChainError::Signing(_)), "{} should be rejected", bad);
            assert!(!err.to_string().contains("obey"));
        }
    }

    #[test]
    fn test_chain_codes() {
        assert_eq!(&Junction::chain_code("1")[..8], &1u64.to_le_bytes());
        assert_eq!(&Junction::chain_code("Alice")[..6], &[0x14, b'A', b'l', b'i', b'c', b'e']);
        let long = "x".repeat(40);
        assert_eq!(Junction::chain_code(&long), blake2_256(&long.encode()));
    }

    #[test]
    fn test_seed_and_phrase_forms() {
        let seed = format!("0x{}", "11".repeat(32));
        let from_hex = SigningIdentity::from_secret(&seed, KeyScheme::Ed25519).unwrap();
        let from_seed = SigningIdentity::from_seed([0x11; 32], KeyScheme::Ed25519).unwrap();
        assert_eq!(from_hex.account(), from_seed.account());

        assert!(matches!(
            SigningIdentity::from_secret("0x1234", KeyScheme::Sr25519),
            Err(ChainError::Signing(_))
        ));
        assert!(SigningIdentity::from_secret("   ", KeyScheme::Sr25519).is_err());
    }

    #[test]
    fn test_signatures_verify() {
        for scheme in [KeyScheme::Sr25519, KeyScheme::Ed25519] {
            let id = SigningIdentity::from_seed([7; 32], scheme).unwrap();
            let sig = id.sign(b"payload");
            assert!(sig.verify(b"payload", &id.account()));
            assert!(!sig.verify(b"tampered", &id.account()));
        }
    }

    #[test]
    fn test_ed25519_signatures_are_deterministic() {
        let id = SigningIdentity::from_seed([9; 32], KeyScheme::Ed25519).unwrap();
        assert_eq!(id.sign(b"m"), id.sign(b"m"));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let id = SigningIdentity::from_seed([1; 32], KeyScheme::Sr25519).unwrap();
        let rendered = format!("{:?}", id);
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains(&hex::encode([1u8; 32])));
    }
}
