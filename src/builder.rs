//! An editable, re-serializable form of a partially signed transaction.
//!
//! The builder recognizes three standard input forms, tracks which
//! signatures each input still needs, and can emit its scriptSigs for
//! signing, for further editing, or for broadcast.

use std::collections::BTreeMap;

use crate::address::{from_base58_check, AddressVersions};
use crate::buffer::{ByteBufferComposer, ByteBufferParser};
use crate::error::{Error, Result};
use crate::hashes::{hash160, Hash256};
use crate::keys::EcKey;
use crate::script::{
    classify, p2pkh_script, p2sh_script, push_data, split_pushes, MultiSigRedeemScript,
    ScriptKind, OP_0, OP_CHECKMULTISIG,
};
use crate::tx::{OutPoint, Transaction, TxIn, TxOut};

pub const SIGHASH_ALL: u8 = 0x01;

/// Which rendering of a scriptSig an input should produce.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum ScriptSigMode {
    /// The script substituted while computing the digest to sign: the
    /// pay-to-address template for single-key inputs, the bare redeem
    /// script for multisig forms.
    Sign,
    /// Partially signed form with every signature slot present; empty slots
    /// push zero bytes so another party can fill them in.
    Edit,
    /// Final form with empty signature slots omitted.
    Broadcast,
}

/// The signature state of one input.
#[derive(Clone, Debug, PartialEq)]
enum InputForm {
    /// Single public key, one signature slot.
    PayToAddress { pub_key: Vec<u8>, sig: Vec<u8> },
    /// Bare multisig: m of the registered keys must sign. Signature slots
    /// are kept parallel to `pub_keys`.
    MofN { min_sigs: usize, pub_keys: Vec<Vec<u8>>, sigs: Vec<Vec<u8>> },
    /// Script hash spend whose redeem script is not a recognized multisig;
    /// signatures are collected in order without per-key tracking.
    P2sh { redeem_script: Vec<u8>, sigs: Vec<Vec<u8>> },
}

#[derive(Clone, Debug, PartialEq)]
pub struct BuilderInput {
    pub previous_out: OutPoint,
    pub sequence: u32,
    form: InputForm,
}

impl BuilderInput {
    fn pay_to_address(previous_out: OutPoint, pub_key: Vec<u8>, sequence: u32) -> Self {
        BuilderInput {
            previous_out,
            sequence,
            form: InputForm::PayToAddress { pub_key, sig: vec![] },
        }
    }

    fn m_of_n(previous_out: OutPoint, redeem: &MultiSigRedeemScript, sequence: u32) -> Self {
        BuilderInput {
            previous_out,
            sequence,
            form: InputForm::MofN {
                min_sigs: redeem.min_sigs(),
                pub_keys: redeem.pub_keys().to_vec(),
                sigs: vec![vec![]; redeem.pub_keys().len()],
            },
        }
    }

    fn p2sh(previous_out: OutPoint, redeem_script: Vec<u8>, sequence: u32) -> Self {
        BuilderInput { previous_out, sequence, form: InputForm::P2sh { redeem_script, sigs: vec![] } }
    }

    pub fn clear_sigs(&mut self) {
        match &mut self.form {
            InputForm::PayToAddress { sig, .. } => sig.clear(),
            InputForm::MofN { sigs, .. } => sigs.iter_mut().for_each(Vec::clear),
            InputForm::P2sh { sigs, .. } => sigs.clear(),
        }
    }

    /// Deposits `sig` (raw signature with its hash type byte already
    /// appended) into the slot belonging to `pub_key`.
    pub fn add_sig(&mut self, pub_key: &[u8], sig: Vec<u8>) -> Result<()> {
        match &mut self.form {
            InputForm::PayToAddress { pub_key: own, sig: slot } => {
                if own != pub_key {
                    return Err(Error::UnknownPublicKey);
                }
                *slot = sig;
            }
            InputForm::MofN { pub_keys, sigs, .. } => {
                let slot = pub_keys
                    .iter()
                    .position(|key| key == pub_key)
                    .ok_or(Error::UnknownPublicKey)?;
                sigs[slot] = sig;
            }
            InputForm::P2sh { sigs, .. } => sigs.push(sig),
        }
        Ok(())
    }

    /// Minimum signatures still needed and the public keys whose slot is
    /// empty, in declaration order. Opaque script-hash inputs report
    /// nothing.
    pub fn missing_sigs(&self) -> (usize, Vec<Vec<u8>>) {
        match &self.form {
            InputForm::PayToAddress { pub_key, sig } => {
                if sig.is_empty() {
                    (1, vec![pub_key.clone()])
                } else {
                    (0, vec![])
                }
            }
            InputForm::MofN { min_sigs, pub_keys, sigs } => {
                let unsigned: Vec<Vec<u8>> = pub_keys
                    .iter()
                    .zip(sigs)
                    .filter(|(_, sig)| sig.is_empty())
                    .map(|(key, _)| key.clone())
                    .collect();
                let n_sigs = pub_keys.len() - unsigned.len();
                (min_sigs.saturating_sub(n_sigs), unsigned)
            }
            InputForm::P2sh { .. } => (0, vec![]),
        }
    }

    /// The redeem script of multisig and script-hash forms.
    fn redeem_script(&self) -> Option<Vec<u8>> {
        match &self.form {
            InputForm::PayToAddress { .. } => None,
            InputForm::MofN { min_sigs, pub_keys, .. } => {
                let mut script = vec![(*min_sigs + 0x50) as u8];
                for pub_key in pub_keys {
                    script.push(pub_key.len() as u8);
                    script.extend_from_slice(pub_key);
                }
                script.push((pub_keys.len() + 0x50) as u8);
                script.push(OP_CHECKMULTISIG);
                Some(script)
            }
            InputForm::P2sh { redeem_script, .. } => Some(redeem_script.clone()),
        }
    }

    pub fn script_sig(&self, mode: ScriptSigMode) -> Vec<u8> {
        let mut script = vec![];
        match &self.form {
            InputForm::PayToAddress { pub_key, sig } => match mode {
                ScriptSigMode::Sign => script = p2pkh_script(&hash160(pub_key)),
                ScriptSigMode::Edit | ScriptSigMode::Broadcast => {
                    push_data(&mut script, sig);
                    push_data(&mut script, pub_key);
                }
            },
            InputForm::MofN { sigs, .. } | InputForm::P2sh { sigs, .. } => {
                let redeem = self.redeem_script().expect("multisig forms carry a redeem script");
                match mode {
                    ScriptSigMode::Sign => script = redeem,
                    ScriptSigMode::Edit | ScriptSigMode::Broadcast => {
                        // an extra zero push feeds the off-by-one pop of
                        // OP_CHECKMULTISIG
                        script.push(OP_0);
                        for sig in sigs {
                            if !sig.is_empty() || mode == ScriptSigMode::Edit {
                                push_data(&mut script, sig);
                            }
                        }
                        push_data(&mut script, &redeem);
                    }
                }
            }
        }
        script
    }
}

/// One entry of the missing-signature report.
#[derive(Clone, Debug, PartialEq)]
pub struct InputSigRequest {
    pub input_index: u32,
    pub min_sigs_still_needed: u32,
    pub pub_keys: Vec<Vec<u8>>,
    /// The value of the spent output, where the dependency is registered.
    pub value: Option<u64>,
}

#[derive(Debug)]
pub struct TransactionBuilder {
    version: u32,
    lock_time: u32,
    inputs: Vec<BuilderInput>,
    outputs: Vec<TxOut>,
    dependencies: BTreeMap<Hash256, Transaction>,
    cached_missing_sigs: Option<Vec<InputSigRequest>>,
}

impl Default for TransactionBuilder {
    fn default() -> Self {
        TransactionBuilder::new()
    }
}

impl TransactionBuilder {
    pub fn new() -> Self {
        TransactionBuilder {
            version: 1,
            lock_time: 0,
            inputs: vec![],
            outputs: vec![],
            dependencies: BTreeMap::new(),
            cached_missing_sigs: None,
        }
    }

    /// Adopts an existing transaction, recognizing the form of every input
    /// from its scriptSig pushes.
    pub fn from_tx(tx: &Transaction) -> Result<Self> {
        let mut builder = TransactionBuilder::new();
        builder.set_tx(tx)?;
        Ok(builder)
    }

    pub fn set_tx(&mut self, tx: &Transaction) -> Result<()> {
        self.version = tx.version;
        self.lock_time = tx.lock_time;
        self.inputs.clear();
        self.outputs = tx.outputs.clone();
        self.cached_missing_sigs = None;

        for (i, input) in tx.inputs.iter().enumerate() {
            self.inputs.push(Self::recognize_input(i, input)?);
        }
        Ok(())
    }

    fn recognize_input(index: usize, input: &TxIn) -> Result<BuilderInput> {
        let objects = split_pushes(&input.script_sig)
            .map_err(|_| Error::malformed(format!("nonstandard script in input {index}")))?;

        if objects.len() == 2 {
            // [signature, public key]
            let mut built = BuilderInput::pay_to_address(
                input.previous_out,
                objects[1].clone(),
                input.sequence,
            );
            if !objects[0].is_empty() {
                built.add_sig(&objects[1].clone(), objects[0].clone())?;
            }
            return Ok(built);
        }

        if objects.len() >= 3 && objects[0].is_empty() {
            // [zero, signature slots..., redeem script]
            let redeem_bytes = objects.last().unwrap();
            let slots = &objects[1..objects.len() - 1];
            match MultiSigRedeemScript::parse(redeem_bytes) {
                Ok(redeem) => {
                    if redeem.pub_keys().len() < slots.len() {
                        return Err(Error::malformed(format!(
                            "more signatures than keys in input {index}"
                        )));
                    }
                    let mut built =
                        BuilderInput::m_of_n(input.previous_out, &redeem, input.sequence);
                    for (slot, sig) in slots.iter().enumerate() {
                        if !sig.is_empty() {
                            built.add_sig(&redeem.pub_keys()[slot].clone(), sig.clone())?;
                        }
                    }
                    Ok(built)
                }
                Err(_) => {
                    let mut built = BuilderInput::p2sh(
                        input.previous_out,
                        redeem_bytes.clone(),
                        input.sequence,
                    );
                    for sig in slots.iter().filter(|sig| !sig.is_empty()) {
                        built.add_sig(&[], sig.clone())?;
                    }
                    Ok(built)
                }
            }
        } else {
            Err(Error::malformed(format!("nonstandard script in input {index}")))
        }
    }

    /// Renders the transaction with each input's scriptSig in `mode`. With
    /// `only_index` set, every other input gets an empty scriptSig (the
    /// shape hashed for signing).
    pub fn to_tx(&self, mode: ScriptSigMode, only_index: Option<usize>) -> Transaction {
        let mut tx = Transaction::new(self.version, self.lock_time);
        for (i, input) in self.inputs.iter().enumerate() {
            let script_sig = match only_index {
                Some(index) if index != i => vec![],
                _ => input.script_sig(mode),
            };
            tx.add_input(TxIn::new(input.previous_out, script_sig, input.sequence));
        }
        for output in &self.outputs {
            tx.add_output(output.clone());
        }
        tx
    }

    pub fn inputs(&self) -> &[BuilderInput] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[TxOut] {
        &self.outputs
    }

    pub fn add_dependency(&mut self, tx: Transaction) {
        self.dependencies.insert(tx.hash(), tx);
        self.cached_missing_sigs = None;
    }

    pub fn remove_dependency(&mut self, tx_hash: &Hash256) -> bool {
        let removed = self.dependencies.remove(tx_hash).is_some();
        if removed {
            self.cached_missing_sigs = None;
        }
        removed
    }

    /// Drops dependencies no input refers to. Returns whether anything
    /// changed.
    pub fn strip_dependencies(&mut self) -> bool {
        let referenced: std::collections::BTreeSet<Hash256> =
            self.inputs.iter().map(|input| input.previous_out.hash).collect();
        let before = self.dependencies.len();
        self.dependencies.retain(|hash, _| referenced.contains(hash));
        before != self.dependencies.len()
    }

    pub fn clear_dependencies(&mut self) {
        self.dependencies.clear();
        self.cached_missing_sigs = None;
    }

    pub fn dependency_hashes(&self) -> Vec<Hash256> {
        self.dependencies.keys().copied().collect()
    }

    pub fn dependency_output_value(&self, out_hash: &Hash256, out_index: u32) -> Result<u64> {
        let tx = self
            .dependencies
            .get(out_hash)
            .ok_or_else(|| Error::DependencyMissing(out_hash.to_hex()))?;
        let output = tx
            .outputs
            .get(out_index as usize)
            .ok_or_else(|| Error::malformed("dependency output index out of range"))?;
        Ok(output.value)
    }

    /// Appends an input spending output `out_index` of the registered
    /// dependency `out_hash`.
    ///
    /// For pay-to-address outputs `pub_key` is the spending public key; for
    /// script-hash outputs it is the redeem script (recognized multisig
    /// scripts get per-key signature tracking, anything else is held
    /// opaque). Either way its HASH160 must match the output's hash.
    pub fn add_input(
        &mut self,
        out_hash: Hash256,
        out_index: u32,
        pub_key: &[u8],
        sequence: u32,
    ) -> Result<()> {
        let tx = self
            .dependencies
            .get(&out_hash)
            .ok_or_else(|| Error::DependencyMissing(out_hash.to_hex()))?;
        let output = tx
            .outputs
            .get(out_index as usize)
            .ok_or_else(|| Error::malformed("invalid output index"))?;

        let previous_out = OutPoint::new(out_hash, out_index);
        let input = match classify(&output.script_pub_key) {
            ScriptKind::PubKeyHash(expected) => {
                if hash160(pub_key) != expected {
                    return Err(Error::malformed(format!(
                        "public key {} does not hash to the output's value",
                        hex::encode(pub_key)
                    )));
                }
                BuilderInput::pay_to_address(previous_out, pub_key.to_vec(), sequence)
            }
            ScriptKind::ScriptHash(expected) => {
                if hash160(pub_key) != expected {
                    return Err(Error::malformed(
                        "redeem script does not hash to the output's value".to_string(),
                    ));
                }
                match MultiSigRedeemScript::parse(pub_key) {
                    Ok(redeem) => BuilderInput::m_of_n(previous_out, &redeem, sequence),
                    Err(_) => BuilderInput::p2sh(previous_out, pub_key.to_vec(), sequence),
                }
            }
            _ => return Err(Error::malformed("unknown output type")),
        };

        self.inputs.push(input);
        self.cached_missing_sigs = None;
        Ok(())
    }

    pub fn remove_input(&mut self, index: usize) -> Result<()> {
        if index >= self.inputs.len() {
            return Err(Error::malformed(format!("invalid index {index}")));
        }
        self.inputs.remove(index);
        self.cached_missing_sigs = None;
        Ok(())
    }

    /// Appends an output paying `value` to a base58check `address`.
    pub fn add_output(
        &mut self,
        address: &str,
        value: u64,
        versions: &AddressVersions,
    ) -> Result<()> {
        let (payload, version) = from_base58_check(address)?;
        let hash: [u8; 20] =
            payload.try_into().map_err(|_| Error::malformed("invalid hash length"))?;

        let script_pub_key = if version == versions.address {
            p2pkh_script(&hash)
        } else if version == versions.multisig {
            p2sh_script(&hash)
        } else {
            return Err(Error::malformed(format!("invalid address version {version}")));
        };

        self.outputs.push(TxOut::new(value, script_pub_key));
        self.cached_missing_sigs = None;
        Ok(())
    }

    pub fn remove_output(&mut self, index: usize) -> Result<()> {
        if index >= self.outputs.len() {
            return Err(Error::malformed(format!("invalid index {index}")));
        }
        self.outputs.remove(index);
        self.cached_missing_sigs = None;
        Ok(())
    }

    /// The per-input missing-signature report. Memoized until the next
    /// mutation.
    pub fn missing_sigs(&mut self) -> &[InputSigRequest] {
        if self.cached_missing_sigs.is_none() {
            let report = self
                .inputs
                .iter()
                .enumerate()
                .map(|(i, input)| {
                    let (min_sigs_still_needed, pub_keys) = input.missing_sigs();
                    let value = self
                        .dependency_output_value(
                            &input.previous_out.hash,
                            input.previous_out.index,
                        )
                        .ok();
                    InputSigRequest {
                        input_index: i as u32,
                        min_sigs_still_needed: min_sigs_still_needed as u32,
                        pub_keys,
                        value,
                    }
                })
                .collect();
            self.cached_missing_sigs = Some(report);
        }
        self.cached_missing_sigs.as_deref().unwrap()
    }

    /// Signs input `index` with a wallet-import private key: hashes the
    /// transaction with only that input's Sign-mode script set, appends
    /// SIGHASH_ALL to the signature, and deposits it into the input.
    pub fn sign(&mut self, index: usize, pub_key: &[u8], priv_key: &str) -> Result<()> {
        if index >= self.inputs.len() {
            return Err(Error::malformed(format!("invalid input index {index}")));
        }

        let digest = self
            .to_tx(ScriptSigMode::Sign, Some(index))
            .hash_with_appended_code(SIGHASH_ALL as u32);

        let key = EcKey::from_wallet_import(priv_key)?;
        let mut sig = key.sign(&digest)?;
        sig.push(SIGHASH_ALL);

        self.inputs[index].add_sig(pub_key, sig)?;
        self.cached_missing_sigs = None;
        Ok(())
    }

    /// The edit-mode transaction followed by every registered dependency.
    pub fn serialized(&self) -> Vec<u8> {
        let mut composer = ByteBufferComposer::new();
        self.to_tx(ScriptSigMode::Edit, None).encode(&mut composer);
        for tx in self.dependencies.values() {
            tx.encode(&mut composer);
        }
        composer.result()
    }

    /// Parses the leading transaction, then registers every transaction
    /// following it as a dependency.
    pub fn from_serialized(bytes: &[u8]) -> Result<Self> {
        let mut parser = ByteBufferParser::new(bytes);
        let tx = Transaction::parse(&mut parser)?;
        let mut builder = TransactionBuilder::from_tx(&tx)?;
        while parser.remaining() > 0 {
            builder.add_dependency(Transaction::parse(&mut parser)?);
        }
        Ok(builder)
    }
}

#[cfg(test)]
mod test {
    use crate::address::to_base58_check;
    use crate::script::OP_CHECKMULTISIG;

    use super::*;

    fn key(fill: u8) -> EcKey {
        EcKey::from_secret_bytes(&[fill; 32]).unwrap()
    }

    fn wif(key: &EcKey) -> String {
        to_base58_check(&key.secret_bytes(), 0x80)
    }

    /// A dependency with a pay-to-address output for `key` at index 0 and a
    /// 2-of-3 multisig script-hash output at index 1.
    fn dependency(p2a_key: &EcKey, redeem_script: &[u8]) -> Transaction {
        let mut tx = Transaction::new(1, 0);
        tx.add_input(TxIn::new(
            OutPoint::new(crate::hashes::sha256d(b"funding"), 0),
            vec![],
            0xffffffff,
        ));
        tx.add_output(TxOut::new(50_000, p2pkh_script(&hash160(&p2a_key.public_key()))));
        tx.add_output(TxOut::new(80_000, p2sh_script(&hash160(redeem_script))));
        tx
    }

    fn two_of_three_redeem() -> Vec<u8> {
        let mut redeem = MultiSigRedeemScript::new(2).unwrap();
        for fill in [0x21, 0x22, 0x23] {
            redeem.add_pub_key(key(fill).public_key().to_vec()).unwrap();
        }
        redeem.to_script().unwrap()
    }

    fn recipient_address() -> String {
        to_base58_check(&hash160(&key(0x31).public_key()), 0x00)
    }

    #[test]
    fn test_add_input_requires_dependency() {
        let mut builder = TransactionBuilder::new();
        let result = builder.add_input(crate::hashes::sha256d(b"unknown"), 0, &[], 0xffffffff);
        assert!(matches!(result, Err(Error::DependencyMissing(_))));
    }

    #[test]
    fn test_add_input_verifies_pub_key_hash() {
        let p2a_key = key(0x11);
        let dep = dependency(&p2a_key, &two_of_three_redeem());
        let mut builder = TransactionBuilder::new();
        builder.add_dependency(dep.clone());

        let wrong_key = key(0x12);
        assert!(builder
            .add_input(dep.hash(), 0, &wrong_key.public_key(), 0xffffffff)
            .is_err());
        assert!(builder
            .add_input(dep.hash(), 0, &p2a_key.public_key(), 0xffffffff)
            .is_ok());
    }

    #[test]
    fn test_pay_to_address_missing_sig_transitions() {
        let p2a_key = key(0x11);
        let dep = dependency(&p2a_key, &two_of_three_redeem());
        let mut builder = TransactionBuilder::new();
        builder.add_dependency(dep.clone());
        builder.add_input(dep.hash(), 0, &p2a_key.public_key(), 0xffffffff).unwrap();
        builder.add_output(&recipient_address(), 49_000, &AddressVersions::default()).unwrap();

        let report = builder.missing_sigs().to_vec();
        assert_eq!(report.len(), 1);
        assert_eq!(report[0].input_index, 0);
        assert_eq!(report[0].min_sigs_still_needed, 1);
        assert_eq!(report[0].pub_keys, vec![p2a_key.public_key().to_vec()]);
        assert_eq!(report[0].value, Some(50_000));

        builder.sign(0, &p2a_key.public_key(), &wif(&p2a_key)).unwrap();
        let report = builder.missing_sigs();
        assert_eq!(report[0].min_sigs_still_needed, 0);
        assert!(report[0].pub_keys.is_empty());
    }

    #[test]
    fn test_signature_verifies_against_sign_digest() {
        let p2a_key = key(0x11);
        let dep = dependency(&p2a_key, &two_of_three_redeem());
        let mut builder = TransactionBuilder::new();
        builder.add_dependency(dep.clone());
        builder.add_input(dep.hash(), 0, &p2a_key.public_key(), 0xffffffff).unwrap();
        builder.add_output(&recipient_address(), 49_000, &AddressVersions::default()).unwrap();

        let digest = builder
            .to_tx(ScriptSigMode::Sign, Some(0))
            .hash_with_appended_code(SIGHASH_ALL as u32);
        builder.sign(0, &p2a_key.public_key(), &wif(&p2a_key)).unwrap();

        let broadcast = builder.to_tx(ScriptSigMode::Broadcast, None);
        let pushes = split_pushes(&broadcast.inputs[0].script_sig).unwrap();
        assert_eq!(pushes.len(), 2);
        let sig = &pushes[0];
        assert_eq!(*sig.last().unwrap(), SIGHASH_ALL);
        assert!(p2a_key.verify(&digest, &sig[..sig.len() - 1]));
        assert_eq!(pushes[1], p2a_key.public_key().to_vec());
    }

    #[test]
    fn test_sign_rejects_unknown_key_and_bad_wif() {
        let p2a_key = key(0x11);
        let dep = dependency(&p2a_key, &two_of_three_redeem());
        let mut builder = TransactionBuilder::new();
        builder.add_dependency(dep.clone());
        builder.add_input(dep.hash(), 0, &p2a_key.public_key(), 0xffffffff).unwrap();

        let stranger = key(0x44);
        assert!(matches!(
            builder.sign(0, &stranger.public_key(), &wif(&stranger)),
            Err(Error::UnknownPublicKey)
        ));
        assert!(matches!(
            builder.sign(0, &p2a_key.public_key(), "garbage"),
            Err(Error::InvalidPrivateKey)
        ));
    }

    #[test]
    fn test_m_of_n_missing_sigs_count_down_in_order() {
        let redeem_script = two_of_three_redeem();
        let dep = dependency(&key(0x11), &redeem_script);
        let mut builder = TransactionBuilder::new();
        builder.add_dependency(dep.clone());
        builder.add_input(dep.hash(), 1, &redeem_script, 0xffffffff).unwrap();
        builder.add_output(&recipient_address(), 79_000, &AddressVersions::default()).unwrap();

        let all_keys: Vec<Vec<u8>> =
            [0x21, 0x22, 0x23].iter().map(|fill| key(*fill).public_key().to_vec()).collect();

        let report = builder.missing_sigs().to_vec();
        assert_eq!(report[0].min_sigs_still_needed, 2);
        assert_eq!(report[0].pub_keys, all_keys);
        assert_eq!(report[0].value, Some(80_000));

        let second = key(0x22);
        builder.sign(0, &second.public_key(), &wif(&second)).unwrap();
        let report = builder.missing_sigs().to_vec();
        assert_eq!(report[0].min_sigs_still_needed, 1);
        // unsigned keys keep declaration order
        assert_eq!(report[0].pub_keys, vec![all_keys[0].clone(), all_keys[2].clone()]);

        let first = key(0x21);
        builder.sign(0, &first.public_key(), &wif(&first)).unwrap();
        let report = builder.missing_sigs().to_vec();
        assert_eq!(report[0].min_sigs_still_needed, 0);
        assert_eq!(report[0].pub_keys, vec![all_keys[2].clone()]);
    }

    #[test]
    fn test_script_sig_modes() {
        let redeem_script = two_of_three_redeem();
        let dep = dependency(&key(0x11), &redeem_script);
        let mut builder = TransactionBuilder::new();
        builder.add_dependency(dep.clone());
        builder.add_input(dep.hash(), 1, &redeem_script, 0xffffffff).unwrap();

        // Sign mode: the bare redeem script
        assert_eq!(builder.inputs()[0].script_sig(ScriptSigMode::Sign), redeem_script);

        // Edit mode: zero push, three empty slots, redeem push
        let edit = builder.inputs()[0].script_sig(ScriptSigMode::Edit);
        let pushes = split_pushes(&edit).unwrap();
        assert_eq!(pushes.len(), 5);
        assert!(pushes[..4].iter().all(Vec::is_empty));
        assert_eq!(pushes[4], redeem_script);

        // Broadcast mode: empty slots omitted
        let second = key(0x22);
        builder.sign(0, &second.public_key(), &wif(&second)).unwrap();
        let broadcast = builder.inputs()[0].script_sig(ScriptSigMode::Broadcast);
        let pushes = split_pushes(&broadcast).unwrap();
        assert_eq!(pushes.len(), 3);
        assert!(pushes[0].is_empty());
        assert_eq!(*pushes[1].last().unwrap(), SIGHASH_ALL);
        assert_eq!(pushes[2], redeem_script);
    }

    #[test]
    fn test_serialized_round_trip_preserves_state() {
        let p2a_key = key(0x11);
        let redeem_script = two_of_three_redeem();
        let dep = dependency(&p2a_key, &redeem_script);
        let mut builder = TransactionBuilder::new();
        builder.add_dependency(dep.clone());
        builder.add_input(dep.hash(), 0, &p2a_key.public_key(), 0xffffffff).unwrap();
        builder.add_input(dep.hash(), 1, &redeem_script, 0xffffffff).unwrap();
        builder.add_output(&recipient_address(), 120_000, &AddressVersions::default()).unwrap();
        let second = key(0x22);
        builder.sign(1, &second.public_key(), &wif(&second)).unwrap();

        let bytes = builder.serialized();
        let mut restored = TransactionBuilder::from_serialized(&bytes).unwrap();

        assert_eq!(restored.dependency_hashes(), vec![dep.hash()]);
        assert_eq!(restored.serialized(), bytes);

        let expected = builder.missing_sigs().to_vec();
        assert_eq!(restored.missing_sigs(), expected.as_slice());
        assert_eq!(
            restored.to_tx(ScriptSigMode::Broadcast, None),
            builder.to_tx(ScriptSigMode::Broadcast, None)
        );
    }

    #[test]
    fn test_opaque_p2sh_input_reports_nothing() {
        // a redeem script that is not a bare multisig
        let redeem_script = vec![0x51, 0x51, 0x87]; // 1 1 EQUAL-ish nonsense
        assert!(MultiSigRedeemScript::parse(&redeem_script).is_err());

        let mut dep = Transaction::new(1, 0);
        dep.add_input(TxIn::new(
            OutPoint::new(crate::hashes::sha256d(b"funding"), 0),
            vec![],
            0xffffffff,
        ));
        dep.add_output(TxOut::new(10_000, p2sh_script(&hash160(&redeem_script))));

        let mut builder = TransactionBuilder::new();
        builder.add_dependency(dep.clone());
        builder.add_input(dep.hash(), 0, &redeem_script, 0xffffffff).unwrap();

        let report = builder.missing_sigs().to_vec();
        assert_eq!(report[0].min_sigs_still_needed, 0);
        assert!(report[0].pub_keys.is_empty());

        // signatures are collected in order
        let mut input = builder.inputs()[0].clone();
        input.add_sig(&[], vec![0xaa, SIGHASH_ALL]).unwrap();
        let pushes = split_pushes(&input.script_sig(ScriptSigMode::Broadcast)).unwrap();
        assert_eq!(pushes.len(), 3);
        assert_eq!(pushes[1], vec![0xaa, SIGHASH_ALL]);
    }

    #[test]
    fn test_recognize_rejects_nonstandard_input() {
        let mut tx = Transaction::new(1, 0);
        tx.add_input(TxIn::new(
            OutPoint::new(crate::hashes::sha256d(b"x"), 0),
            vec![OP_CHECKMULTISIG],
            0xffffffff,
        ));
        assert!(TransactionBuilder::from_tx(&tx).is_err());

        // a single push is neither form
        let mut script_sig = vec![];
        push_data(&mut script_sig, &[0x01, 0x02]);
        let mut tx = Transaction::new(1, 0);
        tx.add_input(TxIn::new(OutPoint::new(crate::hashes::sha256d(b"x"), 0), script_sig, 0));
        assert!(TransactionBuilder::from_tx(&tx).is_err());
    }

    #[test]
    fn test_strip_dependencies() {
        let p2a_key = key(0x11);
        let dep = dependency(&p2a_key, &two_of_three_redeem());
        let mut unused = Transaction::new(1, 0);
        unused.add_input(TxIn::new(OutPoint::new(crate::hashes::sha256d(b"y"), 0), vec![], 0));
        unused.add_output(TxOut::new(5, vec![]));

        let mut builder = TransactionBuilder::new();
        builder.add_dependency(dep.clone());
        builder.add_dependency(unused.clone());
        builder.add_input(dep.hash(), 0, &p2a_key.public_key(), 0xffffffff).unwrap();

        assert_eq!(builder.dependency_hashes().len(), 2);
        assert!(builder.strip_dependencies());
        assert_eq!(builder.dependency_hashes(), vec![dep.hash()]);
        assert!(!builder.strip_dependencies());

        assert!(builder.remove_dependency(&dep.hash()));
        assert!(!builder.remove_dependency(&dep.hash()));
    }

    #[test]
    fn test_remove_input_and_output_bounds() {
        let mut builder = TransactionBuilder::new();
        assert!(builder.remove_input(0).is_err());
        assert!(builder.remove_output(0).is_err());

        builder.add_output(&recipient_address(), 1, &AddressVersions::default()).unwrap();
        assert!(builder.remove_output(0).is_ok());
        assert!(builder.outputs().is_empty());
    }
}
