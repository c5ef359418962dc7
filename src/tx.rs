use crate::address::{to_base58_check, AddressVersions};
use crate::buffer::{var_int_size, ByteBufferComposer, ByteBufferParser};
use crate::error::Result;
use crate::hashes::{hash160, sha256d, Hash256};
use crate::script::{classify, split_pushes, ScriptKind};

/// Reference to a previous transaction output.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct OutPoint {
    pub hash: Hash256,
    pub index: u32,
}

impl OutPoint {
    pub const SIZE: usize = 36;

    pub fn new(hash: Hash256, index: u32) -> Self {
        OutPoint { hash, index }
    }

    pub fn is_coinbase(&self) -> bool {
        self.hash.is_zero() && self.index == 0xffffffff
    }

    pub fn encode(&self, composer: &mut ByteBufferComposer) {
        composer.append(self.hash.as_bytes());
        composer.append(&self.index.to_le_bytes());
    }

    pub fn parse(parser: &mut ByteBufferParser) -> Result<Self> {
        let hash = parser.read_hash()?;
        let index = parser.read_u32_le()?;
        Ok(OutPoint { hash, index })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TxIn {
    pub previous_out: OutPoint,
    pub script_sig: Vec<u8>,
    pub sequence: u32,
}

impl TxIn {
    pub fn new(previous_out: OutPoint, script_sig: Vec<u8>, sequence: u32) -> Self {
        TxIn { previous_out, script_sig, sequence }
    }

    pub fn size(&self) -> usize {
        OutPoint::SIZE + var_int_size(self.script_sig.len() as u64) + self.script_sig.len() + 4
    }

    pub fn encode(&self, composer: &mut ByteBufferComposer) {
        self.previous_out.encode(composer);
        composer.append_var_bytes(&self.script_sig);
        composer.append(&self.sequence.to_le_bytes());
    }

    pub fn parse(parser: &mut ByteBufferParser) -> Result<Self> {
        let previous_out = OutPoint::parse(parser)?;
        let script_sig = parser.read_var_bytes()?;
        let sequence = parser.read_u32_le()?;
        Ok(TxIn { previous_out, script_sig, sequence })
    }

    /// Probes the scriptSig pushes for the spender's address: the last push
    /// is the public key for pay-to-address inputs and the redeem script for
    /// script-hash inputs. `None` for coinbase and nonstandard inputs.
    pub fn address(&self, versions: &AddressVersions) -> Option<String> {
        if self.previous_out.is_coinbase() {
            return None;
        }
        let objects = split_pushes(&self.script_sig).ok()?;
        let version = match objects.len() {
            0 | 1 => return None,
            2 => versions.address,
            _ => versions.multisig,
        };
        Some(to_base58_check(&hash160(objects.last()?), version))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TxOut {
    pub value: u64,
    pub script_pub_key: Vec<u8>,
}

impl TxOut {
    pub fn new(value: u64, script_pub_key: Vec<u8>) -> Self {
        TxOut { value, script_pub_key }
    }

    pub fn size(&self) -> usize {
        8 + var_int_size(self.script_pub_key.len() as u64) + self.script_pub_key.len()
    }

    pub fn encode(&self, composer: &mut ByteBufferComposer) {
        composer.append(&self.value.to_le_bytes());
        composer.append_var_bytes(&self.script_pub_key);
    }

    pub fn parse(parser: &mut ByteBufferParser) -> Result<Self> {
        let value = parser.read_u64_le()?;
        let script_pub_key = parser.read_var_bytes()?;
        Ok(TxOut { value, script_pub_key })
    }

    /// The address this output pays to, for the standard script forms.
    pub fn address(&self, versions: &AddressVersions) -> Option<String> {
        match classify(&self.script_pub_key) {
            ScriptKind::PubKeyHash(hash) => Some(to_base58_check(&hash, versions.address)),
            ScriptKind::ScriptHash(hash) => Some(to_base58_check(&hash, versions.multisig)),
            ScriptKind::PubKey(pub_key) => Some(to_base58_check(&hash160(&pub_key), versions.address)),
            ScriptKind::Unknown => None,
        }
    }
}

/// https://en.bitcoin.it/wiki/Protocol_documentation#tx
///
/// size | field     | type     | description
/// ---  | -----     | ----     | ------------
/// 4    | version   | u32      | transaction data format version
/// 1+   | tx_in#    | var_int  | number of inputs
/// ?    | tx_in     | TxIn[]   | inputs
/// 1+   | tx_out#   | var_int  | number of outputs
/// ?    | tx_out    | TxOut[]  | outputs
/// 4    | lock_time | u32      | block height or timestamp the transaction is locked until
#[derive(Clone, Debug, PartialEq)]
pub struct Transaction {
    pub version: u32,
    pub inputs: Vec<TxIn>,
    pub outputs: Vec<TxOut>,
    pub lock_time: u32,
}

impl Transaction {
    pub fn new(version: u32, lock_time: u32) -> Self {
        Transaction { version, inputs: vec![], outputs: vec![], lock_time }
    }

    pub fn size(&self) -> usize {
        let mut size = 8; // version + lock_time
        size += var_int_size(self.inputs.len() as u64);
        size += self.inputs.iter().map(TxIn::size).sum::<usize>();
        size += var_int_size(self.outputs.len() as u64);
        size += self.outputs.iter().map(TxOut::size).sum::<usize>();
        size
    }

    pub fn encode(&self, composer: &mut ByteBufferComposer) {
        composer.append(&self.version.to_le_bytes());
        composer.append_var_int(self.inputs.len() as u64);
        for input in &self.inputs {
            input.encode(composer);
        }
        composer.append_var_int(self.outputs.len() as u64);
        for output in &self.outputs {
            output.encode(composer);
        }
        composer.append(&self.lock_time.to_le_bytes());
    }

    pub fn parse(parser: &mut ByteBufferParser) -> Result<Self> {
        let version = parser.read_u32_le()?;
        let input_count = parser.read_var_int()?;
        let mut inputs = Vec::with_capacity(input_count.min(1024) as usize);
        for _ in 0..input_count {
            inputs.push(TxIn::parse(parser)?);
        }
        let output_count = parser.read_var_int()?;
        let mut outputs = Vec::with_capacity(output_count.min(1024) as usize);
        for _ in 0..output_count {
            outputs.push(TxOut::parse(parser)?);
        }
        let lock_time = parser.read_u32_le()?;
        Ok(Transaction { version, inputs, outputs, lock_time })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut composer = ByteBufferComposer::with_capacity(self.size());
        self.encode(&mut composer);
        composer.result()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut parser = ByteBufferParser::new(bytes);
        Transaction::parse(&mut parser)
    }

    /// The transaction identity: double SHA-256 of the serialization.
    pub fn hash(&self) -> Hash256 {
        sha256d(&self.to_bytes())
    }

    /// Digest of `serialization || code` where `code` is appended as a
    /// little endian u32. This is the digest signed by transaction inputs,
    /// with `code` carrying the signature hash type.
    pub fn hash_with_appended_code(&self, code: u32) -> Hash256 {
        let mut bytes = self.to_bytes();
        bytes.extend_from_slice(&code.to_le_bytes());
        sha256d(&bytes)
    }

    pub fn total_sent(&self) -> u64 {
        self.outputs.iter().map(|out| out.value).sum()
    }

    pub fn clear_script_sigs(&mut self) {
        for input in &mut self.inputs {
            input.script_sig.clear();
        }
    }

    pub fn add_input(&mut self, input: TxIn) {
        self.inputs.push(input);
    }

    pub fn add_output(&mut self, output: TxOut) {
        self.outputs.push(output);
    }
}

#[cfg(test)]
pub(crate) mod test {
    use hex_literal::hex;

    use crate::script::p2pkh_script;

    use super::*;

    /// The coinbase transaction of the genesis block.
    pub(crate) fn genesis_tx() -> Transaction {
        let mut script_sig = hex!("04ffff001d0104").to_vec();
        let headline =
            b"The Times 03/Jan/2009 Chancellor on brink of second bailout for banks";
        script_sig.push(headline.len() as u8);
        script_sig.extend_from_slice(headline);

        let mut script_pub_key = vec![0x41];
        script_pub_key.extend_from_slice(&hex!(
            "04678afdb0fe5548271967f1a67130b7105cd6a828e03909a67962e0ea1f61deb6"
            "49f6bc3f4cef38c4f35504e51ec112de5c384df7ba0b8d578a4c702b6bf11d5f"
        ));
        script_pub_key.push(0xac);

        let mut tx = Transaction::new(1, 0);
        tx.add_input(TxIn::new(
            OutPoint::new(Hash256::ZERO, 0xffffffff),
            script_sig,
            0xffffffff,
        ));
        tx.add_output(TxOut::new(50_0000_0000, script_pub_key));
        tx
    }

    #[test]
    fn test_genesis_tx_hash() {
        assert_eq!(
            genesis_tx().hash().to_hex(),
            "4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b"
        );
    }

    #[test]
    fn test_round_trip_is_byte_stable() {
        let tx = genesis_tx();
        let bytes = tx.to_bytes();
        assert_eq!(bytes.len(), tx.size());

        let parsed = Transaction::from_bytes(&bytes).unwrap();
        assert_eq!(parsed, tx);
        assert_eq!(parsed.to_bytes(), bytes);
        assert_eq!(parsed.hash(), sha256d(&bytes));
    }

    #[test]
    fn test_truncated_rejected() {
        let bytes = genesis_tx().to_bytes();
        assert!(Transaction::from_bytes(&bytes[..bytes.len() - 1]).is_err());
    }

    #[test]
    fn test_coinbase_detection() {
        let tx = genesis_tx();
        assert!(tx.inputs[0].previous_out.is_coinbase());
        assert_eq!(tx.inputs[0].address(&AddressVersions::default()), None);
    }

    #[test]
    fn test_output_address() {
        let versions = AddressVersions::default();
        let tx = genesis_tx();
        // pay-to-pubkey probes through hash160 of the key
        assert_eq!(
            tx.outputs[0].address(&versions).unwrap(),
            "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa"
        );

        let out = TxOut::new(1000, p2pkh_script(&hex!("010966776006953d5567439e5e39f86a0d273bee")));
        assert_eq!(out.address(&versions).unwrap(), "16UwLL9Risc3QfPqBUvKofHmBQ7wMtjvM");
    }

    #[test]
    fn test_input_address_probe() {
        let versions = AddressVersions::default();
        let pub_key = hex!(
            "0450863ad64a87ae8a2fe83c1af1a8403cb53f53e486d8511dad8a04887e5b2352"
            "2cd470243453a299fa9e77237716103abc11a1df38855ed6f2ee187e9c582ba6"
        );
        let mut script_sig = vec![];
        crate::script::push_data(&mut script_sig, &[0x30; 71]); // placeholder signature
        crate::script::push_data(&mut script_sig, &pub_key);

        let input = TxIn::new(OutPoint::new(sha256d(b"prev"), 0), script_sig, 0xffffffff);
        assert_eq!(input.address(&versions).unwrap(), "16UwLL9Risc3QfPqBUvKofHmBQ7wMtjvM");
    }

    #[test]
    fn test_total_sent() {
        let mut tx = genesis_tx();
        tx.add_output(TxOut::new(25_0000_0000, vec![]));
        assert_eq!(tx.total_sent(), 75_0000_0000);
    }
}
