#![deny(missing_docs)]
//! A CryptoNote-family wallet core: encrypted container storage, a multi-subwallet registry
//! sharing one view key, an append-only transfers index tracking every owned output through its
//! lifecycle, a blockchain/pool synchronizer, a classic ring-signature transaction builder, and a
//! mempool cleaner — composed behind a single event-driven [`wallet::Wallet`].

pub mod builder;
pub mod config;
pub mod consumer;
pub mod container;
pub mod error;
pub mod history;
pub mod mempool;
pub mod node;
pub mod subwallet;
pub mod synchronizer;
pub mod transfers;
pub mod wallet;

pub use config::WalletConfig;
pub use error::WalletError;
pub use node::Node;
pub use subwallet::SubwalletRegistry;
pub use wallet::{Wallet, WalletEvent};
