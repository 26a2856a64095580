// src/contracts.rs
use ethers::abi::AbiEncode;
use ethers::prelude::abigen;
use ethers::types::{Address, Bytes, H160, U256};

use crate::types::{Call, Chain};

abigen!(
    FactoryToken,
    r#"[
        function deployToken(string name, string symbol, uint256 initialSupply) external returns (address token)
    ]"#
);

abigen!(
    LaunchToken,
    r#"[
        function mint(address to, uint256 amount) external
        function approve(address spender, uint256 amount) external returns (bool success)
        function transfer(address to, uint256 amount) external returns (bool success)
        function balanceOf(address account) external view returns (uint256 balance)
    ]"#
);

abigen!(
    MonPad,
    r#"[
        function recordDeploy(address tokenAddress, string name, string symbol, uint256 supply) external
        function recordMint(address tokenAddress, address to, uint256 amount) external
        function recordTransfer(address tokenAddress, address to, uint256 amount) external
    ]"#
);

abigen!(
    SimpleAccount,
    r#"[
        function execute(address dest, uint256 value, bytes func) external
        function executeBatch(address[] dest, uint256[] value, bytes[] func) external
    ]"#
);

abigen!(
    EntryPoint,
    r#"[
        function getNonce(address sender, uint192 key) external view returns (uint256 nonce)
    ]"#
);

/// ERC-4337 EntryPoint v0.6, deployed at the same address on every supported chain.
pub const ENTRY_POINT_V06: &str = "0x5FF137D4b0FDCD49DcA30c7CF57E578a026d2789";

/// `0x71fCa30B945DD1bC30FE7a8bEC63656213bC8a74`
const FACTORY_ADDRESS: Address = H160([
    0x71, 0xfc, 0xa3, 0x0b, 0x94, 0x5d, 0xd1, 0xbc, 0x30, 0xfe,
    0x7a, 0x8b, 0xec, 0x63, 0x65, 0x62, 0x13, 0xbc, 0x8a, 0x74,
]);

/// `0xBae9F76833AAAAfb2833AD258b75909601A35C80`
const MONPAD_ADDRESS: Address = H160([
    0xba, 0xe9, 0xf7, 0x68, 0x33, 0xaa, 0xaa, 0xfb, 0x28, 0x33,
    0xad, 0x25, 0x8b, 0x75, 0x90, 0x96, 0x01, 0xa3, 0x5c, 0x80,
]);

/// Contract addresses the orchestrator talks to on one chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deployment {
    pub chain: Chain,
    pub factory: Address,
    pub indexer: Address,
}

impl Deployment {
    pub fn for_chain(chain: Chain) -> Self {
        // Both networks share the same deployer nonce, hence identical addresses.
        let (factory, indexer) = match chain {
            Chain::MonadTestnet | Chain::Sepolia => (FACTORY_ADDRESS, MONPAD_ADDRESS),
        };
        Self {
            chain,
            factory,
            indexer,
        }
    }
}

pub fn deploy_token(factory: Address, name: &str, symbol: &str) -> Call {
    let data = DeployTokenCall {
        name: name.to_string(),
        symbol: symbol.to_string(),
        initial_supply: U256::zero(),
    };
    Call::new(factory, data.encode())
}

pub fn mint(token: Address, to: Address, amount: U256) -> Call {
    Call::new(token, MintCall { to, amount }.encode())
}

pub fn approve(token: Address, spender: Address, amount: U256) -> Call {
    Call::new(token, ApproveCall { spender, amount }.encode())
}

pub fn transfer(token: Address, to: Address, amount: U256) -> Call {
    Call::new(token, TransferCall { to, amount }.encode())
}

pub fn balance_of(account: Address) -> Bytes {
    BalanceOfCall { account }.encode().into()
}

pub fn record_deploy(
    indexer: Address,
    token_address: Address,
    name: &str,
    symbol: &str,
    supply: U256,
) -> Call {
    let data = RecordDeployCall {
        token_address,
        name: name.to_string(),
        symbol: symbol.to_string(),
        supply,
    };
    Call::new(indexer, data.encode())
}

pub fn record_mint(indexer: Address, token_address: Address, to: Address, amount: U256) -> Call {
    let data = RecordMintCall {
        token_address,
        to,
        amount,
    };
    Call::new(indexer, data.encode())
}

pub fn record_transfer(
    indexer: Address,
    token_address: Address,
    to: Address,
    amount: U256,
) -> Call {
    let data = RecordTransferCall {
        token_address,
        to,
        amount,
    };
    Call::new(indexer, data.encode())
}

/// Wrap a call list into the smart account's calldata.
pub fn account_call_data(calls: &[Call]) -> Bytes {
    match calls {
        [single] => ExecuteCall {
            dest: single.to,
            value: single.value,
            func: single.data.clone(),
        }
        .encode()
        .into(),
        _ => ExecuteBatchCall {
            dest: calls.iter().map(|c| c.to).collect(),
            value: calls.iter().map(|c| c.value).collect(),
            func: calls.iter().map(|c| c.data.clone()).collect(),
        }
        .encode()
        .into(),
    }
}

pub fn get_nonce(sender: Address) -> Bytes {
    GetNonceCall {
        sender,
        key: U256::zero(),
    }
    .encode()
    .into()
}
