//! chainmirror CLI: run the mirror service and inspect its state.
//!
//! # Commands
//! ```text
//! chainmirror serve      [--config f.yaml] [--addr ..] [--ledger memory|fabric] [--store ..]
//! chainmirror verify     --message <b64> [--arg <value> ...]
//! chainmirror address    --public-key <b64 DER>
//! chainmirror checkpoint [--config f.yaml] [--store ..] [--dsn ..] [--table-prefix ..]
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

mod cmd_checkpoint;
mod cmd_serve;
mod cmd_verify;
mod config;
mod logging;
mod wiring;

use config::{LedgerKind, ServiceConfig, StoreConfig, StoreKind};

#[derive(Parser)]
#[command(
    name = "chainmirror",
    about = "Mirror a ledger contract's events into a queryable store",
    long_about = "
chainmirror listens to a depository contract's events, fetches each stored
value from the ledger and keeps a relational mirror of it. It also serves
the contract's read/write operations and the mirror over HTTP.

ENVIRONMENT VARIABLES:
  CHAINMIRROR_CONFIG   Path to the YAML config file
  CHAINMIRROR_DSN      Store DSN (sqlite path or postgres URL)
  RUST_LOG             Overrides the configured log directives
",
    version
)]
struct Cli {
    /// YAML configuration file
    #[arg(short, long, global = true, env = "CHAINMIRROR_CONFIG")]
    config: Option<PathBuf>,

    /// Global log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Emit JSON logs
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct StoreArgs {
    /// Mirror store backend
    #[arg(long, value_enum)]
    store: Option<StoreKind>,
    /// sqlite path or postgres URL
    #[arg(long, env = "CHAINMIRROR_DSN")]
    dsn: Option<String>,
    /// Table prefix; rows live in `{prefix}_depositories`
    #[arg(long)]
    table_prefix: Option<String>,
}

impl StoreArgs {
    fn apply(self, cfg: &mut StoreConfig) {
        if let Some(kind) = self.store {
            cfg.kind = kind;
        }
        if let Some(dsn) = self.dsn {
            cfg.dsn = dsn;
        }
        if let Some(prefix) = self.table_prefix {
            cfg.table_prefix = prefix;
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API and the event listener until Ctrl-C
    Serve {
        /// HTTP listen address
        #[arg(long)]
        addr: Option<SocketAddr>,
        /// Ledger backend
        #[arg(long, value_enum)]
        ledger: Option<LedgerKind>,
        /// Fabric gateway base URL
        #[arg(long)]
        gateway_url: Option<String>,
        /// Contract (chaincode) name
        #[arg(long)]
        contract: Option<String>,
        /// Event names to mirror, comma separated
        #[arg(long, value_delimiter = ',')]
        events: Option<Vec<String>>,
        #[command(flatten)]
        store: StoreArgs,
    },

    /// Verify a signed message envelope offline
    Verify {
        /// base64 of the JSON message
        #[arg(long)]
        message: String,
        /// Signed arguments, in order
        #[arg(long = "arg")]
        args: Vec<String>,
    },

    /// Print the account address of a public key
    Address {
        /// base64 DER SubjectPublicKeyInfo
        #[arg(long)]
        public_key: String,
    },

    /// Print the persisted checkpoint
    Checkpoint {
        #[command(flatten)]
        store: StoreArgs,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut cfg = ServiceConfig::load(cli.config.as_deref())?;
    if let Some(level) = cli.log_level {
        cfg.log.level = level;
    }
    cfg.log.json |= cli.log_json;

    match cli.command {
        Commands::Serve {
            addr,
            ledger,
            gateway_url,
            contract,
            events,
            store,
        } => {
            logging::init_tracing(&cfg.log);
            if let Some(addr) = addr {
                cfg.http.addr = addr;
            }
            if let Some(kind) = ledger {
                cfg.ledger.kind = kind;
            }
            if let Some(url) = gateway_url {
                cfg.ledger.gateway_url = url;
            }
            if let Some(contract) = contract {
                cfg.ledger.contract = contract;
            }
            if let Some(events) = events {
                cfg.listener.events = events;
            }
            store.apply(&mut cfg.store);
            cmd_serve::run(cfg).await
        }
        Commands::Verify { message, args } => cmd_verify::verify(&message, &args).map(drop),
        Commands::Address { public_key } => cmd_verify::address(&public_key).map(drop),
        Commands::Checkpoint { store } => {
            store.apply(&mut cfg.store);
            cmd_checkpoint::run(&cfg.store).await.map(drop)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn serve_flags_parse() {
        let cli = Cli::parse_from([
            "chainmirror",
            "serve",
            "--ledger",
            "memory",
            "--store",
            "discard",
            "--events",
            "PutValue,PutUntrustValue",
            "--addr",
            "127.0.0.1:8088",
        ]);
        let Commands::Serve {
            ledger,
            events,
            addr,
            store,
            ..
        } = cli.command
        else {
            panic!("expected serve");
        };
        assert_eq!(ledger, Some(LedgerKind::Memory));
        assert_eq!(store.store, Some(StoreKind::Discard));
        assert_eq!(events.unwrap(), ["PutValue", "PutUntrustValue"]);
        assert_eq!(addr.unwrap().port(), 8088);
    }

    #[test]
    fn store_args_override_config() {
        let mut cfg = StoreConfig::default();
        StoreArgs {
            store: Some(StoreKind::Postgres),
            dsn: Some("postgresql://db/mirror".into()),
            table_prefix: None,
        }
        .apply(&mut cfg);
        assert_eq!(cfg.kind, StoreKind::Postgres);
        assert_eq!(cfg.dsn, "postgresql://db/mirror");
        assert_eq!(cfg.table_prefix, "hf");
    }
}
