// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Card Ledger CLI
//!
//! Entry point for the `cardledger` binary. Parses CLI arguments, initializes
//! logging, opens the ledger in the home directory and runs one command.
//!
//! - `init`           create the log, genesis block and authority wallet
//! - `create-wallet`  generate a P-256 wallet file
//! - `mint`           authority mints a card to a wallet
//! - `trade`          two wallets exchange cards
//! - `build-indices`  catch up / rebuild the block index and ownership
//! - `owner`          confirmed owner and pending lock of a card
//! - `show`           print blocks
//! - `version`        print build version information

mod cli;
mod logging;

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::Path;

use cardledger_protocol::cards::{Card, CardRepository, FileCardRepository};
use cardledger_protocol::transaction::{MintTransaction, TradeTransaction, Transaction};
use cardledger_protocol::wallet::{JsonWalletReader, Wallet, WalletReader};
use cardledger_protocol::{Ledger, LedgerConfig};

use cli::{CardLedgerCli, Commands, GlobalArgs};
use logging::LogFormat;

fn main() -> Result<()> {
    let cli = CardLedgerCli::parse();
    logging::init_logging(
        logging::DEFAULT_DIRECTIVE,
        LogFormat::from_str_lossy(&cli.global.log_format),
    );

    match cli.command {
        Commands::Init => init_ledger(&cli.global),
        Commands::CreateWallet(args) => create_wallet(args),
        Commands::Mint(args) => mint(&cli.global, args),
        Commands::Trade(args) => trade(&cli.global, args),
        Commands::BuildIndices(args) => build_indices(&cli.global, args),
        Commands::Owner(args) => owner(&cli.global, args),
        Commands::Show(args) => show(&cli.global, args),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Resolve the ledger configuration from a config file or `--home`.
fn load_config(global: &GlobalArgs) -> Result<LedgerConfig> {
    let mut config = match &global.config {
        Some(path) => LedgerConfig::from_json_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => LedgerConfig::new(&global.home),
    };
    if let Some(threshold) = global.safety_threshold {
        config = config.with_safety_threshold(threshold);
    }
    Ok(config)
}

/// Open and initialize the ledger.
fn open_ledger(global: &GlobalArgs) -> Result<Ledger> {
    let config = load_config(global)?;
    let ledger = Ledger::open(config.clone())
        .with_context(|| format!("failed to open ledger at {}", config.base_dir.display()))?;
    ledger
        .initialize()
        .context("failed to initialize the block log")?;
    Ok(ledger)
}

fn load_wallet(path: &Path) -> Result<Wallet> {
    JsonWalletReader
        .load_wallet(path)
        .with_context(|| format!("failed to load wallet {}", path.display()))
}

fn init_ledger(global: &GlobalArgs) -> Result<()> {
    let ledger = open_ledger(global)?;
    let wallet_path = ledger.config().authority_wallet();
    if wallet_path.exists() {
        tracing::info!(path = %wallet_path.display(), "authority wallet already present");
    } else {
        JsonWalletReader
            .save_wallet(&wallet_path, &Wallet::generate())
            .with_context(|| format!("failed to write {}", wallet_path.display()))?;
        tracing::info!(path = %wallet_path.display(), "authority wallet created");
    }
    println!(
        "ledger ready at {} ({} blocks)",
        ledger.config().base_dir.display(),
        ledger.total_blocks()?
    );
    Ok(())
}

fn create_wallet(args: cli::CreateWalletArgs) -> Result<()> {
    if args.out.exists() && !args.force {
        bail!("{} already exists (use --force to overwrite)", args.out.display());
    }
    let wallet = Wallet::generate();
    JsonWalletReader
        .save_wallet(&args.out, &wallet)
        .with_context(|| format!("failed to write {}", args.out.display()))?;
    println!("{}", hex::encode(&wallet.public_key));
    Ok(())
}

fn mint(global: &GlobalArgs, args: cli::MintArgs) -> Result<()> {
    let ledger = open_ledger(global)?;
    ledger.catch_up_index().context("failed to catch up block index")?;

    let authority = load_wallet(&ledger.config().authority_wallet())?;
    let recipient = load_wallet(&args.to)?;
    let cards = FileCardRepository::new(ledger.config().cards_dir());
    let card = Card::new(&args.card);
    if cards.card_exists(&card.name)? {
        bail!("card {:?} already exists", card.name);
    }

    let mut tx = MintTransaction::new(authority.public_key.clone(), recipient.public_key, card.hash);
    tx.sign(&authority.keypair()?)?;
    let location = ledger
        .add_transaction(Transaction::Mint(tx))
        .with_context(|| format!("mint of {:?} rejected", card.name))?;
    cards.save_card(&card)?;

    println!("minted {} at height {} ({})", card.name, location.height, card.hash_hex());
    Ok(())
}

fn trade(global: &GlobalArgs, args: cli::TradeArgs) -> Result<()> {
    let ledger = open_ledger(global)?;
    let (ingested, report) = ledger.catch_up().context("catch-up before trade failed")?;
    tracing::info!(ingested, checkpoint = ?report.checkpoint, "ledger caught up");

    let wallet1 = load_wallet(&args.wallet1)?;
    let wallet2 = load_wallet(&args.wallet2)?;
    let cards = FileCardRepository::new(ledger.config().cards_dir());
    let resolve = |names: &[String]| -> Result<Vec<[u8; 32]>> {
        names
            .iter()
            .map(|name| {
                cards
                    .load_card(name)
                    .map(|card| card.hash)
                    .with_context(|| format!("unknown card {name:?}"))
            })
            .collect()
    };

    let mut tx = TradeTransaction::new(
        wallet1.public_key.clone(),
        wallet2.public_key.clone(),
        resolve(&args.give1)?,
        resolve(&args.give2)?,
    );
    tx.sign(&wallet1.keypair()?)?;
    tx.sign(&wallet2.keypair()?)?;
    let location = ledger
        .add_transaction(Transaction::Trade(tx))
        .context("trade rejected")?;

    println!(
        "trade appended at height {}; confirmed after {} more blocks",
        location.height,
        ledger.config().safety_threshold
    );
    Ok(())
}

fn build_indices(global: &GlobalArgs, args: cli::BuildIndicesArgs) -> Result<()> {
    let ledger = open_ledger(global)?;
    // With neither flag, do both.
    let (blockchain, ownership) = match (args.blockchain, args.ownership) {
        (false, false) => (true, true),
        flags => flags,
    };

    if blockchain {
        let ingested = if args.rebuild {
            ledger.rebuild_index()?
        } else {
            ledger.catch_up_index()?
        };
        println!("block index: {ingested} blocks ingested");
    }
    if ownership {
        let report = if args.rebuild {
            ledger.rebuild_ownership()?
        } else {
            ledger.catch_up_ownership()?
        };
        match report.checkpoint {
            Some(checkpoint) => println!(
                "ownership: checkpoint {checkpoint}, {} blocks applied, {} locks",
                report.blocks_applied, report.locks_written
            ),
            None => println!("ownership: nothing confirmed yet, {} locks", report.locks_written),
        }
    }
    Ok(())
}

fn owner(global: &GlobalArgs, args: cli::OwnerArgs) -> Result<()> {
    let ledger = open_ledger(global)?;
    let card = Card::new(&args.card);
    match ledger.get_owner(&card.hash)? {
        Some(owner) => println!("{} owned by {}", card.name, hex::encode(owner)),
        None => println!("{} has no confirmed owner", card.name),
    }
    if let Some(lock) = ledger.lock_for(&card.hash)? {
        println!("  pending transaction at height {}", lock.height);
    }
    Ok(())
}

fn show(global: &GlobalArgs, args: cli::ShowArgs) -> Result<()> {
    let ledger = open_ledger(global)?;
    ledger.catch_up_index()?;
    for (offset, block) in ledger.blocks_from(args.from)?.enumerate() {
        let block = block?;
        let height = args.from + offset as u64;
        let when = block
            .timestamp
            .to_datetime()
            .map(|dt| dt.to_rfc3339())
            .unwrap_or_else(|| format!("{} ticks", block.timestamp.ticks()));
        println!(
            "#{height} {} prev={} txs={} at {when}",
            block.hash_hex()?,
            hex::encode(block.previous_hash),
            block.transactions.len()
        );
        for tx in &block.transactions {
            let cards: Vec<String> = tx.referenced_cards().iter().map(hex::encode).collect();
            println!("    {} [{}]", tx.kind_name(), cards.join(", "));
        }
    }
    Ok(())
}

fn print_version() {
    println!("cardledger {}", env!("CARGO_PKG_VERSION"));
    println!(
        "  wire format:      v{}",
        cardledger_protocol::config::FORMAT_VERSION
    );
    println!(
        "  segment capacity: {}",
        cardledger_protocol::config::DEFAULT_SEGMENT_CAPACITY
    );
    println!(
        "  safety threshold: {}",
        cardledger_protocol::config::DEFAULT_SAFETY_THRESHOLD
    );
    println!("  signatures:       ECDSA P-256 / SHA-256");
}
