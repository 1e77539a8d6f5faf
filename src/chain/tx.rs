//! EIP-155 legacy transfers: encoding, signing and sender derivation.

use std::fmt;

use anyhow::{Context, Result, anyhow};
use k256::ecdsa::{RecoveryId, Signature, SigningKey};
use rlp::RlpStream;

use crate::address::{ADDRESS_BYTES, WalletAddress};

/// Gas consumed by a plain value transfer.
pub const TRANSFER_GAS_LIMIT: u64 = 21_000;

const PRIVATE_KEY_BYTES: usize = 32;

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    keccak_hash::keccak(data).0
}

/// Holds the faucet's signing key and the account address derived from it.
pub struct TxSigner {
    key: SigningKey,
    address: WalletAddress,
}

impl TxSigner {
    pub fn from_hex(private_key: &str) -> Result<Self> {
        let trimmed = private_key.trim();
        let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let mut bytes = [0u8; PRIVATE_KEY_BYTES];
        hex::decode_to_slice(digits, &mut bytes)
            .map_err(|err| anyhow!("Private key must be {PRIVATE_KEY_BYTES} hex bytes: {err}"))?;

        let key = SigningKey::from_bytes(&bytes.into()).context("Invalid secp256k1 private key")?;
        let address = derive_address(&key);
        Ok(Self { key, address })
    }

    pub fn address(&self) -> WalletAddress {
        self.address
    }

    fn sign_prehash(&self, hash: &[u8; 32]) -> Result<(Signature, RecoveryId)> {
        self.key
            .sign_prehash_recoverable(hash)
            .context("secp256k1 signing failed")
    }
}

impl fmt::Debug for TxSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TxSigner")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

fn derive_address(key: &SigningKey) -> WalletAddress {
    let point = key.verifying_key().to_encoded_point(false);
    // Skip the 0x04 uncompressed-point tag
    let hash = keccak256(&point.as_bytes()[1..]);
    let mut bytes = [0u8; ADDRESS_BYTES];
    bytes.copy_from_slice(&hash[32 - ADDRESS_BYTES..]);
    WalletAddress::from_bytes(bytes)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyTransaction {
    pub nonce: u64,
    pub gas_price: u128,
    pub gas_limit: u64,
    pub to: WalletAddress,
    pub value: u128,
    pub chain_id: u64,
}

impl LegacyTransaction {
    pub fn transfer(nonce: u64, gas_price: u128, to: WalletAddress, value: u128, chain_id: u64) -> Self {
        Self {
            nonce,
            gas_price,
            gas_limit: TRANSFER_GAS_LIMIT,
            to,
            value,
            chain_id,
        }
    }

    fn append_body(&self, stream: &mut RlpStream) {
        append_uint(stream, self.nonce.into());
        append_uint(stream, self.gas_price);
        append_uint(stream, self.gas_limit.into());
        stream.append(&self.to.as_bytes().to_vec());
        append_uint(stream, self.value);
        stream.append_empty_data();
    }

    /// `rlp([nonce, gasPrice, gas, to, value, data, chainId, 0, 0])`
    pub fn signing_payload(&self) -> Vec<u8> {
        let mut stream = RlpStream::new_list(9);
        self.append_body(&mut stream);
        append_uint(&mut stream, self.chain_id.into());
        append_uint(&mut stream, 0);
        append_uint(&mut stream, 0);
        stream.out().to_vec()
    }

    pub fn signing_hash(&self) -> [u8; 32] {
        keccak256(&self.signing_payload())
    }

    pub fn sign(&self, signer: &TxSigner) -> Result<SignedTransaction> {
        let (signature, recovery_id) = signer.sign_prehash(&self.signing_hash())?;
        let v = self
            .chain_id
            .checked_mul(2)
            .and_then(|base| base.checked_add(35 + u64::from(recovery_id.to_byte())))
            .ok_or_else(|| anyhow!("Chain id {} overflows EIP-155 v", self.chain_id))?;
        let (r, s) = signature.split_bytes();

        let mut stream = RlpStream::new_list(9);
        self.append_body(&mut stream);
        append_uint(&mut stream, v.into());
        stream.append(&trim_leading_zeros(&r).to_vec());
        stream.append(&trim_leading_zeros(&s).to_vec());

        let raw = stream.out().to_vec();
        let hash = keccak256(&raw);
        Ok(SignedTransaction { raw, hash })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    raw: Vec<u8>,
    hash: [u8; 32],
}

impl SignedTransaction {
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn hash_hex(&self) -> String {
        format!("0x{}", hex::encode(self.hash))
    }
}

fn append_uint(stream: &mut RlpStream, value: u128) {
    let bytes = value.to_be_bytes();
    stream.append(&trim_leading_zeros(&bytes).to_vec());
}

fn trim_leading_zeros(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    &bytes[start..]
}

#[cfg(test)]
mod tests {
    use k256::ecdsa::VerifyingKey;
    use rlp::Rlp;

    use super::*;

    const EIP155_KEY: &str = "0x4646464646464646464646464646464646464646464646464646464646464646";

    fn eip155_example() -> LegacyTransaction {
        let to = WalletAddress::parse("0x3535353535353535353535353535353535353535").unwrap();
        LegacyTransaction {
            nonce: 9,
            gas_price: 20_000_000_000,
            gas_limit: TRANSFER_GAS_LIMIT,
            to,
            value: 1_000_000_000_000_000_000,
            chain_id: 1,
        }
    }

    #[test]
    fn test_signing_payload_matches_eip155_vector() {
        let tx = eip155_example();
        assert_eq!(
            hex::encode(tx.signing_payload()),
            "ec098504a817c800825208943535353535353535353535353535353535353535880de0b6b3a764000080018080"
        );
        assert_eq!(
            hex::encode(tx.signing_hash()),
            "daf5a779ae972f972197303d7b574746c7ef83eadac0f2791ad23db92e4c8e53"
        );
    }

    #[test]
    fn test_derives_known_address() {
        let signer =
            TxSigner::from_hex("4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318")
                .unwrap();
        assert_eq!(
            signer.address().to_string(),
            "0x2c7536e3605d9c16a7a3d7b1898e529396a65c23"
        );
    }

    #[test]
    fn test_signed_transaction_recovers_sender() {
        let signer = TxSigner::from_hex(EIP155_KEY).unwrap();
        let tx = eip155_example();
        let signed = tx.sign(&signer).unwrap();

        let rlp = Rlp::new(signed.raw());
        assert_eq!(rlp.item_count().unwrap(), 9);
        assert_eq!(rlp.val_at::<u64>(0).unwrap(), 9);
        assert_eq!(rlp.val_at::<u64>(2).unwrap(), TRANSFER_GAS_LIMIT);
        assert_eq!(rlp.val_at::<Vec<u8>>(3).unwrap(), vec![0x35; 20]);

        let v: u64 = rlp.val_at(6).unwrap();
        assert!(v == 37 || v == 38, "unexpected v {v}");
        let r: Vec<u8> = rlp.val_at(7).unwrap();
        let s: Vec<u8> = rlp.val_at(8).unwrap();
        let mut rs = [0u8; 64];
        rs[32 - r.len()..32].copy_from_slice(&r);
        rs[64 - s.len()..].copy_from_slice(&s);

        let signature = Signature::from_slice(&rs).unwrap();
        let recovery_id = RecoveryId::from_byte((v - 37) as u8).unwrap();
        let recovered =
            VerifyingKey::recover_from_prehash(&tx.signing_hash(), &signature, recovery_id).unwrap();
        assert_eq!(&recovered, signer.key.verifying_key());

        assert_eq!(signed.hash_hex(), format!("0x{}", hex::encode(keccak256(signed.raw()))));
    }

    #[test]
    fn test_large_chain_id_encodes_v() {
        let signer = TxSigner::from_hex(EIP155_KEY).unwrap();
        let mut tx = eip155_example();
        tx.chain_id = 11_155_111;
        let signed = tx.sign(&signer).unwrap();
        let v: u64 = Rlp::new(signed.raw()).val_at(6).unwrap();
        assert!(v == 11_155_111 * 2 + 35 || v == 11_155_111 * 2 + 36);
    }

    #[test]
    fn test_rejects_malformed_private_keys() {
        assert!(TxSigner::from_hex("0x1234").is_err());
        assert!(TxSigner::from_hex(&"zz".repeat(32)).is_err());
        assert!(TxSigner::from_hex(&"00".repeat(32)).is_err());
    }

    #[test]
    fn test_debug_hides_key_material() {
        let signer = TxSigner::from_hex(EIP155_KEY).unwrap();
        let rendered = format!("{signer:?}");
        assert!(!rendered.contains("4646"));
    }
}
