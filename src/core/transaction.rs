// Value transfer records: inputs reference earlier outputs, outputs lock value
// to a public key hash. A transaction's ID is the SHA-256 of its canonical
// encoding with every input's authorization fields cleared, so signing never
// changes the ID other transactions use to reference it.

use crate::error::{LedgerError, Result};
use crate::storage::UTXOSet;
use crate::utils::{
    deserialize, ecdsa_p256_sha256_sign_digest, ecdsa_p256_sha256_sign_verify,
    public_key_from_pkcs8, serialize, sha256_digest,
};
use crate::wallet::{address_to_pub_key_hash, hash_pub_key};
use data_encoding::HEXLOWER;
use log::error;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

/// Block reward paid by every coinbase transaction
pub const SUBSIDY: u64 = 100;

const COINBASE_OUTPUT_INDEX: i64 = -1;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct TXInput {
    txid: Vec<u8>,      // ID of the transaction holding the output being spent
    vout: i64,          // index of that output, -1 for coinbase
    signature: Vec<u8>, // ECDSA signature, or free-form miner data for coinbase
    pub_key: Vec<u8>,   // signer's raw public key
}

impl TXInput {
    /// An unsigned input spending output `vout` of transaction `txid`
    pub fn new(txid: &[u8], vout: usize) -> Result<TXInput> {
        let vout = i64::try_from(vout).map_err(|_| {
            LedgerError::InvalidTransaction(format!("Output index {vout} out of range"))
        })?;
        Ok(TXInput {
            txid: txid.to_vec(),
            vout,
            signature: vec![],
            pub_key: vec![],
        })
    }

    pub fn get_txid(&self) -> &[u8] {
        self.txid.as_slice()
    }

    pub fn get_vout(&self) -> i64 {
        self.vout
    }

    /// The referenced output index, `None` for the coinbase marker
    pub fn output_index(&self) -> Option<usize> {
        usize::try_from(self.vout).ok()
    }

    pub fn get_signature(&self) -> &[u8] {
        self.signature.as_slice()
    }

    pub fn get_pub_key(&self) -> &[u8] {
        self.pub_key.as_slice()
    }

    /// Was this input signed by the owner of `pub_key_hash`?
    pub fn uses_key(&self, pub_key_hash: &[u8]) -> bool {
        !self.pub_key.is_empty() && hash_pub_key(self.pub_key.as_slice()).eq(pub_key_hash)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct TXOutput {
    value: u64,
    pub_key_hash: Vec<u8>,
}

impl TXOutput {
    pub fn new(value: u64, address: &str) -> Result<TXOutput> {
        let pub_key_hash = address_to_pub_key_hash(address)?;
        Ok(TXOutput::locked_to(value, pub_key_hash))
    }

    pub fn locked_to(value: u64, pub_key_hash: Vec<u8>) -> TXOutput {
        TXOutput {
            value,
            pub_key_hash,
        }
    }

    pub fn get_value(&self) -> u64 {
        self.value
    }

    pub fn get_pub_key_hash(&self) -> &[u8] {
        self.pub_key_hash.as_slice()
    }

    pub fn is_locked_with_key(&self, pub_key_hash: &[u8]) -> bool {
        self.pub_key_hash.eq(pub_key_hash)
    }
}

/// The still-unspent outputs of one transaction, keyed by their original index
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct TxOutputs {
    pub outputs: BTreeMap<usize, TXOutput>,
}

impl TxOutputs {
    pub fn insert(&mut self, index: usize, output: TXOutput) {
        self.outputs.insert(index, output);
    }

    pub fn contains(&self, index: usize) -> bool {
        self.outputs.contains_key(&index)
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    pub fn total_value(&self) -> u64 {
        self.outputs.values().map(TXOutput::get_value).sum()
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        serialize(self)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<TxOutputs> {
        deserialize(bytes)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Transaction {
    id: Vec<u8>,
    vin: Vec<TXInput>,
    vout: Vec<TXOutput>,
}

impl Transaction {
    /// Mint `SUBSIDY` to `to`. An empty `data` is replaced with random bytes so
    /// that two rewards to the same address never share an ID.
    pub fn new_coinbase_tx(to: &str, data: &str) -> Result<Transaction> {
        let payload = if data.is_empty() {
            Uuid::new_v4().as_bytes().to_vec()
        } else {
            data.as_bytes().to_vec()
        };
        let tx_input = TXInput {
            txid: vec![],
            vout: COINBASE_OUTPUT_INDEX,
            signature: payload,
            pub_key: vec![],
        };
        let mut tx = Transaction {
            id: vec![],
            vin: vec![tx_input],
            vout: vec![TXOutput::new(SUBSIDY, to)?],
        };
        tx.id = tx.compute_id()?;
        Ok(tx)
    }

    /// Build an unsigned transfer of `amount` from `from` to `to`, spending the
    /// first outputs (in chain-scan order) that cover it. The result must be
    /// signed by the holder of `from`'s private key before it can be appended.
    pub fn new_utxo_transaction(
        from: &str,
        to: &str,
        amount: u64,
        utxo_set: &UTXOSet,
    ) -> Result<Transaction> {
        if amount == 0 {
            return Err(LedgerError::InvalidTransaction(
                "Amount must be positive".to_string(),
            ));
        }
        let from_pub_key_hash = address_to_pub_key_hash(from)?;
        let to_output = TXOutput::new(amount, to)?;

        let (accumulated, valid_outputs) =
            utxo_set.find_spendable_outputs(from_pub_key_hash.as_slice(), amount)?;
        if accumulated < amount {
            return Err(LedgerError::InsufficientFunds {
                required: amount,
                available: accumulated,
            });
        }

        let mut inputs = vec![];
        for (txid_hex, outs) in valid_outputs {
            let txid = HEXLOWER.decode(txid_hex.as_bytes()).map_err(|e| {
                LedgerError::Serialization(format!("Invalid transaction ID {txid_hex}: {e}"))
            })?;
            for out in outs {
                inputs.push(TXInput::new(&txid, out)?);
            }
        }

        let mut outputs = vec![to_output];
        if accumulated > amount {
            outputs.push(TXOutput::locked_to(accumulated - amount, from_pub_key_hash));
        }

        let mut tx = Transaction {
            id: vec![],
            vin: inputs,
            vout: outputs,
        };
        tx.id = tx.compute_id()?;
        Ok(tx)
    }

    pub fn is_coinbase(&self) -> bool {
        self.vin.len() == 1
            && self.vin[0].txid.is_empty()
            && self.vin[0].vout == COINBASE_OUTPUT_INDEX
    }

    /// Content hash of the transaction with signatures and public keys cleared.
    /// The coinbase payload is data, not authorization, and stays in.
    pub fn compute_id(&self) -> Result<Vec<u8>> {
        let mut unsigned = self.trimmed_copy();
        if self.is_coinbase() {
            unsigned.vin[0].signature = self.vin[0].signature.clone();
        }
        unsigned.hash()
    }

    /// Digest signed for input `idx`: every input's authorization cleared,
    /// except that input `idx` carries the lock hash of the output it spends.
    pub fn signing_digest(&self, idx: usize, locking_hash: &[u8]) -> Result<Vec<u8>> {
        let mut tx_copy = self.trimmed_copy();
        let input = tx_copy.vin.get_mut(idx).ok_or_else(|| {
            LedgerError::InvalidTransaction(format!("Input index {idx} out of range"))
        })?;
        input.pub_key = locking_hash.to_vec();
        tx_copy.hash()
    }

    fn trimmed_copy(&self) -> Transaction {
        let inputs = self
            .vin
            .iter()
            .map(|input| TXInput {
                txid: input.txid.clone(),
                vout: input.vout,
                signature: vec![],
                pub_key: vec![],
            })
            .collect();
        Transaction {
            id: vec![],
            vin: inputs,
            vout: self.vout.clone(),
        }
    }

    fn hash(&self) -> Result<Vec<u8>> {
        Ok(sha256_digest(&self.serialize()?))
    }

    /// Sign every input with `pkcs8`. `prev_txs` maps hex transaction IDs to
    /// the transactions this one spends from.
    pub fn sign(&mut self, pkcs8: &[u8], prev_txs: &HashMap<String, Transaction>) -> Result<()> {
        if self.is_coinbase() {
            return Err(LedgerError::InvalidTransaction(
                "Coinbase transactions are never signed".to_string(),
            ));
        }
        let public_key = public_key_from_pkcs8(pkcs8)?;

        let mut signatures = Vec::with_capacity(self.vin.len());
        for (idx, vin) in self.vin.iter().enumerate() {
            let prev_output = Self::referenced_output(vin, prev_txs).ok_or_else(|| {
                LedgerError::NotFound(format!(
                    "output {}:{} referenced by input {idx}",
                    HEXLOWER.encode(vin.get_txid()),
                    vin.vout
                ))
            })?;
            let digest = self.signing_digest(idx, prev_output.get_pub_key_hash())?;
            signatures.push(ecdsa_p256_sha256_sign_digest(pkcs8, &digest)?);
        }

        for (vin, signature) in self.vin.iter_mut().zip(signatures) {
            vin.signature = signature;
            vin.pub_key = public_key.clone();
        }
        Ok(())
    }

    /// Check every input's signature against the output it spends, and that
    /// the value spent equals the value created. Coinbase transactions pass.
    pub fn verify(&self, prev_txs: &HashMap<String, Transaction>) -> bool {
        if self.is_coinbase() {
            return true;
        }
        if self.vin.is_empty() {
            error!("Transaction {} has no inputs", HEXLOWER.encode(&self.id));
            return false;
        }

        let mut input_value = 0u64;
        for (idx, vin) in self.vin.iter().enumerate() {
            let prev_output = match Self::referenced_output(vin, prev_txs) {
                Some(output) => output,
                None => {
                    error!(
                        "Input {idx} references unknown output {}:{}",
                        HEXLOWER.encode(vin.get_txid()),
                        vin.vout
                    );
                    return false;
                }
            };

            if !vin.uses_key(prev_output.get_pub_key_hash()) {
                error!("Input {idx} public key does not match the output's lock");
                return false;
            }

            let digest = match self.signing_digest(idx, prev_output.get_pub_key_hash()) {
                Ok(digest) => digest,
                Err(e) => {
                    error!("Could not rebuild signing digest for input {idx}: {e}");
                    return false;
                }
            };
            if !ecdsa_p256_sha256_sign_verify(&vin.pub_key, &vin.signature, &digest) {
                error!("Input {idx} signature does not verify");
                return false;
            }

            input_value = match input_value.checked_add(prev_output.get_value()) {
                Some(sum) => sum,
                None => {
                    error!("Input value overflow");
                    return false;
                }
            };
        }

        match self.get_output_value() {
            Ok(output_value) if output_value == input_value => true,
            Ok(output_value) => {
                error!("Transaction balance violation: inputs={input_value}, outputs={output_value}");
                false
            }
            Err(e) => {
                error!("{e}");
                false
            }
        }
    }

    fn referenced_output<'a>(
        vin: &TXInput,
        prev_txs: &'a HashMap<String, Transaction>,
    ) -> Option<&'a TXOutput> {
        let prev_tx = prev_txs.get(&HEXLOWER.encode(vin.get_txid()))?;
        prev_tx.vout.get(vin.output_index()?)
    }

    pub fn get_id(&self) -> &[u8] {
        self.id.as_slice()
    }

    pub fn get_id_hex(&self) -> String {
        HEXLOWER.encode(&self.id)
    }

    pub fn get_vin(&self) -> &[TXInput] {
        self.vin.as_slice()
    }

    pub fn get_vout(&self) -> &[TXOutput] {
        self.vout.as_slice()
    }

    pub fn get_output_value(&self) -> Result<u64> {
        self.vout.iter().try_fold(0u64, |total, out| {
            total
                .checked_add(out.get_value())
                .ok_or_else(|| LedgerError::InvalidTransaction("Output value overflow".to_string()))
        })
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        serialize(self)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Transaction> {
        deserialize(bytes)
    }

    #[cfg(test)]
    pub(crate) fn from_parts(vin: Vec<TXInput>, vout: Vec<TXOutput>) -> Result<Transaction> {
        let mut tx = Transaction {
            id: vec![],
            vin,
            vout,
        };
        tx.id = tx.compute_id()?;
        Ok(tx)
    }
}
