// src/account.rs
use async_trait::async_trait;
use ethers::abi::{encode, Token};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, Bytes, H256, U256};
use ethers::utils::keccak256;
use tracing::debug;

use crate::error::SignerError;
use crate::types::UserOperation;

/// Placeholder signature bundlers accept during gas estimation.
const DUMMY_SIGNATURE: [u8; 65] = [
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0xff, 0xff, 0xff, 0xf0, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x7a, 0xaa, 0xaa, 0xaa,
    0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa,
    0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa,
    0xaa, 0xaa, 0xaa, 0xaa, 0x1c,
];

pub fn dummy_signature() -> Bytes {
    Bytes::from(DUMMY_SIGNATURE.to_vec())
}

/// Produces the signature the smart account validates for a user operation.
#[async_trait]
pub trait UserOpSigner: Send + Sync {
    async fn sign_user_operation(&self, user_op: &UserOperation) -> Result<Bytes, SignerError>;
}

/// Smart account owned by a local key; the account contract checks an
/// EIP-191 signature over the ERC-4337 user operation hash.
pub struct SmartAccount {
    owner: LocalWallet,
    pub address: Address,
    entry_point: Address,
    chain_id: u64,
}

impl SmartAccount {
    pub fn new(owner: LocalWallet, address: Address, entry_point: Address, chain_id: u64) -> Self {
        Self {
            owner: owner.with_chain_id(chain_id),
            address,
            entry_point,
            chain_id,
        }
    }

    pub fn owner(&self) -> Address {
        self.owner.address()
    }

    pub fn user_operation_hash(&self, user_op: &UserOperation) -> H256 {
        user_operation_hash(user_op, self.entry_point, self.chain_id)
    }
}

#[async_trait]
impl UserOpSigner for SmartAccount {
    async fn sign_user_operation(&self, user_op: &UserOperation) -> Result<Bytes, SignerError> {
        if user_op.sender != self.address {
            return Err(SignerError::Declined(format!(
                "operation sender {:?} is not this account ({:?})",
                user_op.sender, self.address
            )));
        }
        let hash = self.user_operation_hash(user_op);
        debug!(hash = ?hash, "signing user operation");

        let signature = self
            .owner
            .sign_message(hash.as_bytes())
            .await
            .map_err(|e| SignerError::Declined(e.to_string()))?;

        Ok(Bytes::from(signature.to_vec()))
    }
}

/// ERC-4337 v0.6 hash: `keccak256(abi.encode(keccak256(pack(op)), entryPoint, chainId))`.
pub fn user_operation_hash(user_op: &UserOperation, entry_point: Address, chain_id: u64) -> H256 {
    let packed = encode(&[
        Token::Address(user_op.sender),
        Token::Uint(user_op.nonce),
        Token::FixedBytes(keccak256(&user_op.init_code).to_vec()),
        Token::FixedBytes(keccak256(&user_op.call_data).to_vec()),
        Token::Uint(user_op.call_gas_limit),
        Token::Uint(user_op.verification_gas_limit),
        Token::Uint(user_op.pre_verification_gas),
        Token::Uint(user_op.max_fee_per_gas),
        Token::Uint(user_op.max_priority_fee_per_gas),
        Token::FixedBytes(keccak256(&user_op.paymaster_and_data).to_vec()),
    ]);

    let outer = encode(&[
        Token::FixedBytes(keccak256(packed).to_vec()),
        Token::Address(entry_point),
        Token::Uint(U256::from(chain_id)),
    ]);

    H256::from(keccak256(outer))
}
