//! Vault key management binary.
//!
//! # Usage
//!
//! ```bash
//! # Generate ten keypairs for version v1
//! vault-keys --encryption-key-file enc.key --hashing-key-file hash.key generate -n 10 -v v1
//!
//! # Export active public keys, overwriting any existing file
//! vault-keys export -f public_keys.json -y
//! ```

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use vault_server::cli::{self, Cli};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Cli::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer().with_writer(std::io::stderr)).with(filter).init();

    tracing::debug!(db = %args.db.display(), keystore = %args.keystore.display(), "vault-keys starting");

    if let Err(e) = cli::run(&args) {
        tracing::error!(error = %e, "command failed");
        return Err(e.into());
    }

    Ok(())
}
