//! Unspent transaction output queries
//!
//! Two views of the same set. The chain-scan functions replay the ledger from
//! tip to genesis and are always exact. The `chainstate` tree is a persisted
//! index of the same data, rebuilt with [`UTXOSet::reindex`] and kept current
//! with [`UTXOSet::update`], which makes balance lookups cheap.

use crate::core::{Block, Blockchain, TXOutput, Transaction, TxOutputs};
use crate::error::{LedgerError, Result};
use data_encoding::HEXLOWER;
use log::{debug, info};
use std::collections::{HashMap, HashSet};

const UTXO_TREE: &str = "chainstate";

pub struct UTXOSet {
    blockchain: Blockchain,
}

impl UTXOSet {
    pub fn new(blockchain: Blockchain) -> UTXOSet {
        UTXOSet { blockchain }
    }

    pub fn get_blockchain(&self) -> &Blockchain {
        &self.blockchain
    }

    /// Every unspent output on the chain, keyed by hex transaction ID.
    ///
    /// Scanning backward means every input spending an output is seen before
    /// the transaction that created it, so one pass is enough. Transactions
    /// inside a block are walked last to first for the same reason.
    pub fn build_utxo_set(&self) -> Result<HashMap<String, TxOutputs>> {
        let mut utxo: HashMap<String, TxOutputs> = HashMap::new();
        let mut spent_txos: HashMap<String, HashSet<usize>> = HashMap::new();

        for block in self.blockchain.iterator() {
            let block = block?;
            for tx in block.get_transactions().iter().rev() {
                let txid_hex = tx.get_id_hex();
                let spent = spent_txos.get(&txid_hex);
                let mut outs = TxOutputs::default();
                for (idx, out) in tx.get_vout().iter().enumerate() {
                    if spent.is_some_and(|indices| indices.contains(&idx)) {
                        continue;
                    }
                    outs.insert(idx, out.clone());
                }
                if !outs.is_empty() {
                    utxo.insert(txid_hex, outs);
                }

                if tx.is_coinbase() {
                    continue;
                }
                for vin in tx.get_vin() {
                    if let Some(idx) = vin.output_index() {
                        spent_txos
                            .entry(HEXLOWER.encode(vin.get_txid()))
                            .or_default()
                            .insert(idx);
                    }
                }
            }
        }
        Ok(utxo)
    }

    // Owner-restricted scan: each transaction holding at least one unspent
    // output locked to `pub_key_hash`, paired with those output indices.
    // Only the owner's inputs can spend the owner's outputs, so only those
    // are tracked as spends.
    fn scan_owned_outputs(&self, pub_key_hash: &[u8]) -> Result<Vec<(Transaction, Vec<usize>)>> {
        let mut owned = vec![];
        let mut spent_txos: HashMap<String, HashSet<usize>> = HashMap::new();

        for block in self.blockchain.iterator() {
            let block = block?;
            for tx in block.get_transactions().iter().rev() {
                let spent = spent_txos.get(&tx.get_id_hex());
                let indices: Vec<usize> = tx
                    .get_vout()
                    .iter()
                    .enumerate()
                    .filter(|(idx, out)| {
                        out.is_locked_with_key(pub_key_hash)
                            && !spent.is_some_and(|indices| indices.contains(idx))
                    })
                    .map(|(idx, _)| idx)
                    .collect();
                if !indices.is_empty() {
                    owned.push((tx.clone(), indices));
                }

                if tx.is_coinbase() {
                    continue;
                }
                for vin in tx.get_vin().iter().filter(|vin| vin.uses_key(pub_key_hash)) {
                    if let Some(idx) = vin.output_index() {
                        spent_txos
                            .entry(HEXLOWER.encode(vin.get_txid()))
                            .or_default()
                            .insert(idx);
                    }
                }
            }
        }
        Ok(owned)
    }

    /// Transactions with at least one unspent output locked to `pub_key_hash`,
    /// in chain-scan order
    pub fn find_unspent_transactions(&self, pub_key_hash: &[u8]) -> Result<Vec<Transaction>> {
        Ok(self
            .scan_owned_outputs(pub_key_hash)?
            .into_iter()
            .map(|(tx, _)| tx)
            .collect())
    }

    /// Greedy first fit: take unspent outputs in chain-scan order until their
    /// value reaches `amount`. The total may fall short; callers compare.
    pub fn find_spendable_outputs(
        &self,
        pub_key_hash: &[u8],
        amount: u64,
    ) -> Result<(u64, HashMap<String, Vec<usize>>)> {
        let mut unspent_outputs: HashMap<String, Vec<usize>> = HashMap::new();
        let mut accumulated = 0u64;

        'scan: for (tx, indices) in self.scan_owned_outputs(pub_key_hash)? {
            for idx in indices {
                if accumulated >= amount {
                    break 'scan;
                }
                accumulated = accumulated.saturating_add(tx.get_vout()[idx].get_value());
                unspent_outputs.entry(tx.get_id_hex()).or_default().push(idx);
            }
        }
        debug!("Selected {accumulated} towards {amount} from {} transactions", unspent_outputs.len());
        Ok((accumulated, unspent_outputs))
    }

    /// Rebuild the persisted index from a full chain scan
    pub fn reindex(&self) -> Result<()> {
        let utxo_tree = self.blockchain.get_store().open_tree(UTXO_TREE)?;
        utxo_tree.clear()?;

        let utxo_map = self.build_utxo_set()?;
        for (txid_hex, outs) in &utxo_map {
            let txid = HEXLOWER.decode(txid_hex.as_bytes()).map_err(|e| {
                LedgerError::Serialization(format!("Invalid transaction ID {txid_hex}: {e}"))
            })?;
            utxo_tree.insert(txid.as_slice(), outs.serialize()?)?;
        }
        utxo_tree.flush()?;
        info!("UTXO index rebuilt with {} transactions", utxo_map.len());
        Ok(())
    }

    /// Apply one newly appended block to the persisted index
    pub fn update(&self, block: &Block) -> Result<()> {
        let utxo_tree = self.blockchain.get_store().open_tree(UTXO_TREE)?;

        for tx in block.get_transactions() {
            if !tx.is_coinbase() {
                for vin in tx.get_vin() {
                    let outs_bytes = utxo_tree.get(vin.get_txid())?.ok_or_else(|| {
                        LedgerError::NotFound(format!(
                            "indexed outputs of {}",
                            HEXLOWER.encode(vin.get_txid())
                        ))
                    })?;
                    let mut outs = TxOutputs::deserialize(outs_bytes.as_ref())?;
                    if let Some(idx) = vin.output_index() {
                        outs.outputs.remove(&idx);
                    }

                    if outs.is_empty() {
                        utxo_tree.remove(vin.get_txid())?;
                    } else {
                        utxo_tree.insert(vin.get_txid(), outs.serialize()?)?;
                    }
                }
            }

            let mut new_outputs = TxOutputs::default();
            for (idx, out) in tx.get_vout().iter().enumerate() {
                new_outputs.insert(idx, out.clone());
            }
            utxo_tree.insert(tx.get_id(), new_outputs.serialize()?)?;
        }
        Ok(())
    }

    /// Indexed outputs locked to `pub_key_hash`
    pub fn find_utxo(&self, pub_key_hash: &[u8]) -> Result<Vec<TXOutput>> {
        let utxo_tree = self.blockchain.get_store().open_tree(UTXO_TREE)?;
        let mut utxos = vec![];
        for item in utxo_tree.iter() {
            let (_, v) = item?;
            let outs = TxOutputs::deserialize(v.as_ref())?;
            utxos.extend(
                outs.outputs
                    .into_values()
                    .filter(|out| out.is_locked_with_key(pub_key_hash)),
            );
        }
        Ok(utxos)
    }

    pub fn get_balance(&self, pub_key_hash: &[u8]) -> Result<u64> {
        Ok(self
            .find_utxo(pub_key_hash)?
            .iter()
            .map(TXOutput::get_value)
            .sum())
    }

    /// Number of transactions with unspent outputs in the index
    pub fn count_transactions(&self) -> Result<usize> {
        let utxo_tree = self.blockchain.get_store().open_tree(UTXO_TREE)?;
        let mut counter = 0;
        for item in utxo_tree.iter() {
            item?;
            counter += 1;
        }
        Ok(counter)
    }
}
