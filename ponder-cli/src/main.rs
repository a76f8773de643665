//! ponder CLI — inspect and manage indexer state.
//!
//! Usage:
//! ```bash
//! ponder info
//! ponder setup --namespace public --build-id abc123
//! ponder version
//! ```

use std::env;
use std::process;
use std::sync::Arc;

use ponder_core::schema::{Column, ColumnType, Scalar, Schema, Table};
use ponder_db::DatabaseService;
use ponder_storage::indexing::MemoryIndexingStore;
use ponder_storage::lock::MemoryLockStore;

#[tokio::main]
async fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    match args[1].as_str() {
        "info" => cmd_info(),
        "setup" => cmd_setup(&args[2..]).await,
        "version" | "--version" | "-V" => {
            println!("ponder {}", env!("CARGO_PKG_VERSION"));
        }
        "help" | "--help" | "-h" => print_usage(),
        other => {
            eprintln!("Unknown command: {other}");
            print_usage();
            process::exit(1);
        }
    }
}

fn print_usage() {
    println!("ponder {}", env!("CARGO_PKG_VERSION"));
    println!("Reorg-safe, embeddable blockchain indexing engine\n");
    println!("USAGE:");
    println!("    ponder <COMMAND>\n");
    println!("COMMANDS:");
    println!("    info     Show Ponder configuration info");
    println!("    setup    Provision a namespace against an ephemeral in-process store");
    println!("    version  Print version");
    println!("    help     Print this help");
}

fn cmd_info() {
    let options = ponder_core::config::Options::default();
    println!("Ponder v{}", env!("CARGO_PKG_VERSION"));
    println!("  Default max block range: {} blocks/call", options.max_block_range());
    println!("  Default finality depth: {} blocks", options.finality_block_count());
    println!("  Default lease TTL: {}ms", options.lease_ttl_ms());
    println!("  Default heartbeat interval: {}ms", options.heartbeat_interval_ms());
    println!("  Storage backends: memory, SQLite (feature: sqlite), Postgres (feature: postgres)");
    println!("  Chains: EVM JSON-RPC (chainId, address, and topic filters)");
}

/// Parses `--namespace <ns>` and `--build-id <id>` flags and runs
/// `DatabaseService::setup` against an in-process memory backend, since
/// loading a real config/schema file is an external collaborator's job
/// (see `ponder_core::config`'s module doc). Useful for sanity-checking
/// the namespace-lock and table-naming logic without a live database.
async fn cmd_setup(args: &[String]) {
    let mut namespace = "public".to_string();
    let mut build_id = "dev".to_string();

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--namespace" if i + 1 < args.len() => {
                namespace = args[i + 1].clone();
                i += 2;
            }
            "--build-id" if i + 1 < args.len() => {
                build_id = args[i + 1].clone();
                i += 2;
            }
            other => {
                eprintln!("Unknown setup argument: {other}");
                process::exit(1);
            }
        }
    }

    let schema = Schema::new().with_table(Table {
        name: "Placeholder".into(),
        columns: vec![Column { name: "id".into(), column_type: ColumnType::Scalar(Scalar::String), optional: false, list: false }],
    });
    if let Err(e) = schema.validate() {
        eprintln!("schema validation failed: {e}");
        process::exit(1);
    }

    let service = DatabaseService::new(
        Arc::new(MemoryIndexingStore::default()),
        Arc::new(MemoryLockStore::new()),
        namespace.clone(),
        ponder_core::config::Options::default().lease_ttl_ms() as i64,
        3,
    );

    match service.setup(&schema, &build_id, 0).await {
        Ok(outcome) => {
            println!("namespace '{namespace}' provisioned for build '{build_id}'");
            println!("resume checkpoint: {}", outcome.checkpoint);
            for (logical, physical) in &outcome.tables {
                println!("  {logical} -> {physical}");
            }
        }
        Err(e) => {
            eprintln!("setup failed: {e}");
            process::exit(1);
        }
    }
}
