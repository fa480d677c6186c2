// Command-line entry point. This is the only place the process exits with a
// failure status; everything below returns LedgerError.
use clap::Parser;
use data_encoding::HEXLOWER;
use log::error;
use serde_json::json;
use std::process;
use utxo_ledger::{
    address_to_pub_key_hash, convert_address, hash_pub_key, validate_address, Block, Blockchain,
    Command, LedgerError, Opt, Result, Transaction, UTXOSet, Wallets, GLOBAL_CONFIG,
};

fn main() {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(GLOBAL_CONFIG.get_log_level()),
    )
    .init();

    let opt = Opt::parse();
    if let Err(e) = run_command(opt.command) {
        error!("Error: {e}");
        process::exit(1);
    }
}

fn check_address(address: &str) -> Result<()> {
    if validate_address(address) {
        Ok(())
    } else {
        Err(LedgerError::InvalidAddress(address.to_string()))
    }
}

fn run_command(command: Command) -> Result<()> {
    match command {
        Command::Createblockchain { address } => {
            check_address(&address)?;
            let blockchain = Blockchain::create_blockchain(&address)?;
            let utxo_set = UTXOSet::new(blockchain);
            utxo_set.reindex()?;
            println!("Done!");
        }
        Command::Createwallet => {
            let mut wallets = Wallets::new()?;
            let address = wallets.create_wallet()?;
            println!("Your new address: {address}")
        }
        Command::GetBalance { address } => {
            let pub_key_hash = address_to_pub_key_hash(&address)?;
            let blockchain = Blockchain::new_blockchain()?;
            let utxo_set = UTXOSet::new(blockchain);
            let balance = utxo_set.get_balance(&pub_key_hash)?;
            println!("Balance of {address}: {balance}");
        }
        Command::ListAddresses => {
            let wallets = Wallets::new()?;
            for address in wallets.get_addresses() {
                println!("{address}")
            }
        }
        Command::Send { from, to, amount } => {
            check_address(&from)?;
            check_address(&to)?;

            let wallets = Wallets::new()?;
            let wallet = wallets
                .get_wallet(&from)
                .ok_or_else(|| LedgerError::Wallet(format!("No local key for {from}")))?;

            let blockchain = Blockchain::new_blockchain()?;
            let utxo_set = UTXOSet::new(blockchain.clone());
            let mut transaction = Transaction::new_utxo_transaction(&from, &to, amount, &utxo_set)?;
            blockchain.sign_transaction(&mut transaction, wallet.get_pkcs8())?;

            let coinbase_tx = Transaction::new_coinbase_tx(&from, "")?;
            let block = blockchain.mine_block(&[transaction, coinbase_tx])?;
            utxo_set.update(&block)?;
            println!("Success!")
        }
        Command::Printchain { json } => {
            let blockchain = Blockchain::new_blockchain()?;
            for block in blockchain.iterator() {
                let block = block?;
                if json {
                    println!("{}", block_to_json(&block));
                } else {
                    print_block(&block);
                }
            }
        }
        Command::Reindexutxo => {
            let blockchain = Blockchain::new_blockchain()?;
            let utxo_set = UTXOSet::new(blockchain);
            utxo_set.reindex()?;
            let count = utxo_set.count_transactions()?;
            println!("Done! There are {count} transactions in the UTXO set.");
        }
    }
    Ok(())
}

fn print_block(block: &Block) {
    println!("Height: {}", block.get_height());
    println!("Pre block hash: {}", HEXLOWER.encode(block.get_pre_block_hash()));
    println!("Cur block hash: {}", HEXLOWER.encode(block.get_hash()));
    println!("Cur block Timestamp: {}", block.get_timestamp());
    for tx in block.get_transactions() {
        println!("- Transaction txid_hex: {}", tx.get_id_hex());
        if !tx.is_coinbase() {
            for input in tx.get_vin() {
                let address = convert_address(&hash_pub_key(input.get_pub_key()));
                println!(
                    "-- Input txid = {}, vout = {}, from = {address}",
                    HEXLOWER.encode(input.get_txid()),
                    input.get_vout(),
                )
            }
        }
        for output in tx.get_vout() {
            let address = convert_address(output.get_pub_key_hash());
            println!("-- Output value = {}, to = {address}", output.get_value())
        }
    }
    println!()
}

fn block_to_json(block: &Block) -> serde_json::Value {
    let transactions: Vec<serde_json::Value> = block
        .get_transactions()
        .iter()
        .map(|tx| {
            let inputs: Vec<serde_json::Value> = tx
                .get_vin()
                .iter()
                .filter(|_| !tx.is_coinbase())
                .map(|input| {
                    json!({
                        "txid": HEXLOWER.encode(input.get_txid()),
                        "vout": input.get_vout(),
                        "from": convert_address(&hash_pub_key(input.get_pub_key())),
                    })
                })
                .collect();
            let outputs: Vec<serde_json::Value> = tx
                .get_vout()
                .iter()
                .map(|output| {
                    json!({
                        "value": output.get_value(),
                        "to": convert_address(output.get_pub_key_hash()),
                    })
                })
                .collect();
            json!({
                "txid": tx.get_id_hex(),
                "coinbase": tx.is_coinbase(),
                "inputs": inputs,
                "outputs": outputs,
            })
        })
        .collect();

    json!({
        "height": block.get_height(),
        "hash": HEXLOWER.encode(block.get_hash()),
        "pre_block_hash": HEXLOWER.encode(block.get_pre_block_hash()),
        "timestamp": block.get_timestamp(),
        "nonce": block.get_nonce(),
        "difficulty": block.get_difficulty(),
        "transactions": transactions,
    })
}
