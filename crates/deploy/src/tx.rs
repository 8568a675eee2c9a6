//! EIP-155 legacy transaction encoding.

use alloy_core::primitives::{Address, B256, Bytes, U256, keccak256};
use alloy_core::rlp::{Encodable, Header};
use anyhow::{Context, Result};

use crate::signer::LocalKey;

/// A legacy (type 0) transaction with EIP-155 replay protection.
///
/// `to == None` makes it a contract creation whose `input` is the init code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyTransaction {
    pub nonce: u64,
    pub gas_price: u128,
    pub gas_limit: u64,
    pub to: Option<Address>,
    pub value: U256,
    pub input: Bytes,
    pub chain_id: u64,
}

impl LegacyTransaction {
    /// Build a contract creation transaction.
    pub fn create(nonce: u64, gas_price: u128, gas_limit: u64, init_code: Bytes, chain_id: u64) -> Self {
        Self {
            nonce,
            gas_price,
            gas_limit,
            to: None,
            value: U256::ZERO,
            input: init_code,
            chain_id,
        }
    }

    /// The RLP preimage of the signing hash: `[nonce, gasPrice, gas, to, value, data, chainId, 0, 0]`.
    pub fn signing_payload(&self) -> Vec<u8> {
        let mut fields = Vec::new();
        self.encode_common_fields(&mut fields);
        self.chain_id.encode(&mut fields);
        0u8.encode(&mut fields);
        0u8.encode(&mut fields);

        wrap_list(fields)
    }

    pub fn signing_hash(&self) -> B256 {
        keccak256(self.signing_payload())
    }

    /// Sign with `key` and return the raw transaction for `eth_sendRawTransaction`.
    pub fn sign(&self, key: &LocalKey) -> Result<Bytes> {
        let (signature, recovery_id) = key.sign_hash(&self.signing_hash())?;

        let v = self
            .chain_id
            .checked_mul(2)
            .and_then(|v| v.checked_add(35 + u64::from(recovery_id.to_byte())))
            .with_context(|| format!("Chain ID {} is too large for EIP-155", self.chain_id))?;
        let signature_bytes = signature.to_bytes();
        let r = U256::from_be_slice(&signature_bytes[..32]);
        let s = U256::from_be_slice(&signature_bytes[32..]);

        let mut fields = Vec::new();
        self.encode_common_fields(&mut fields);
        v.encode(&mut fields);
        r.encode(&mut fields);
        s.encode(&mut fields);

        Ok(Bytes::from(wrap_list(fields)))
    }

    fn encode_common_fields(&self, out: &mut Vec<u8>) {
        self.nonce.encode(out);
        self.gas_price.encode(out);
        self.gas_limit.encode(out);
        match &self.to {
            Some(to) => to.encode(out),
            // Creations carry an empty `to`.
            None => Bytes::new().encode(out),
        }
        self.value.encode(out);
        self.input.encode(out);
    }
}

fn wrap_list(payload: Vec<u8>) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 9);
    Header {
        list: true,
        payload_length: payload.len(),
    }
    .encode(&mut out);
    out.extend_from_slice(&payload);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};
    use k256::elliptic_curve::sec1::ToEncodedPoint;

    /// The example transaction from EIP-155.
    fn eip155_example() -> LegacyTransaction {
        LegacyTransaction {
            nonce: 9,
            gas_price: 20_000_000_000,
            gas_limit: 21_000,
            to: Some("0x3535353535353535353535353535353535353535".parse().unwrap()),
            value: U256::from(1_000_000_000_000_000_000u128),
            input: Bytes::new(),
            chain_id: 1,
        }
    }

    #[test]
    fn test_eip155_signing_payload() {
        let tx = eip155_example();
        assert_eq!(
            hex::encode(tx.signing_payload()),
            "ec098504a817c800825208943535353535353535353535353535353535353535880de0b6b3a764000080018080"
        );
    }

    #[test]
    fn test_eip155_signing_hash() {
        let tx = eip155_example();
        assert_eq!(
            hex::encode(tx.signing_hash()),
            "daf5a779ae972f972197303d7b574746c7ef83eadac0f2791ad23db92e4c8e53"
        );
    }

    #[test]
    fn test_eip155_signature_recovers_sender() {
        let key = LocalKey::from_private_key(
            "0x4646464646464646464646464646464646464646464646464646464646464646",
        )
        .unwrap();
        assert_eq!(
            key.address(),
            "0x9d8A62f656a8d1615C1294fd71e9CFb3E4855A4F".parse::<Address>().unwrap()
        );

        let tx = eip155_example();
        let raw = tx.sign(&key).unwrap();

        // The signed list ends with `v (1 byte: 0x25 or 0x26), r (0xa0 + 32), s (0xa0 + 32)`.
        let tail = &raw[raw.len() - 67..];
        let v = tail[0];
        assert!(v == 37 || v == 38, "unexpected v: {}", v);
        assert_eq!(tail[1], 0xa0);
        assert_eq!(tail[34], 0xa0);

        let mut sig = [0u8; 64];
        sig[..32].copy_from_slice(&tail[2..34]);
        sig[32..].copy_from_slice(&tail[35..67]);
        let signature = Signature::from_slice(&sig).unwrap();
        let recovery_id = RecoveryId::from_byte(v - 37).unwrap();

        let recovered =
            VerifyingKey::recover_from_prehash(tx.signing_hash().as_slice(), &signature, recovery_id)
                .unwrap();
        let point = recovered.to_encoded_point(false);
        assert_eq!(
            Address::from_raw_public_key(&point.as_bytes()[1..]),
            key.address()
        );
    }

    #[test]
    fn test_creation_has_empty_to() {
        let tx = LegacyTransaction::create(0, 1, 100_000, Bytes::from(vec![0x60, 0x80]), 31337);
        let payload = tx.signing_payload();

        // nonce, gasPrice, gas, empty to, value, data, chainId 31337, 0, 0
        assert_eq!(
            hex::encode(&payload[1..]),
            "8001830186a08080826080827a698080"
        );
    }

    #[test]
    fn test_sign_rejects_oversized_chain_id() {
        let key = LocalKey::from_private_key(
            "0x4646464646464646464646464646464646464646464646464646464646464646",
        )
        .unwrap();
        let tx = LegacyTransaction::create(0, 1, 100_000, Bytes::from(vec![0x60]), u64::MAX / 2);

        let err = tx.sign(&key).unwrap_err();
        assert!(err.to_string().contains("too large for EIP-155"));
    }
}
