//! Vault server components
//!
//! Durable storage backends, the production [`SystemEnv`], and the
//! `vault-keys` operator CLI. The vault logic itself lives in `vault-core`;
//! this crate supplies the pieces that touch the disk, the clock and the OS
//! RNG.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod cli;
pub mod storage;
mod system_env;

pub use storage::{ChaoticStorage, MemoryStorage, RedbStorage};
pub use system_env::SystemEnv;
