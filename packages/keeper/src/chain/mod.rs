pub mod abi;
pub mod ethernauts_contract;
pub mod rpc;

pub use ethernauts_contract::{EthernautsClient, EthernautsContract, TxReceipt};
