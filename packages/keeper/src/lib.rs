//! Ethernauts keeper: pins revealed NFT metadata and assets to IPFS and keeps
//! the contract's base URI pointed at the pinned folder.

pub mod chain;
pub mod config;
pub mod jobs;
pub mod queue;
pub mod routes;
pub mod state;
pub mod storage;
