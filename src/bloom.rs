//! BIP 37 transaction bloom filter: probabilistic matching of transaction
//! ids, outpoints and script data, as loaded into a remote peer with
//! `filterload`.

use crate::buffer::{ByteBufferComposer, ByteBufferParser};
use crate::error::{Error, Result};
use crate::script::extract_pushes;
use crate::tx::Transaction;

const MAX_FILTER_SIZE: usize = 36_000; // bytes
const MAX_HASH_FUNCS: u32 = 50;
const LN2_SQUARED: f64 = 0.480_453_013_918_201_4;
const LN2: f64 = 0.693_147_180_559_945_3;

fn murmur3_32(seed: u32, data: &[u8]) -> u32 {
    const C1: u32 = 0xcc9e2d51;
    const C2: u32 = 0x1b873593;

    let mut h1 = seed;
    let mut chunks = data.chunks_exact(4);
    for chunk in &mut chunks {
        let mut k1 = u32::from_le_bytes(chunk.try_into().unwrap());
        k1 = k1.wrapping_mul(C1);
        k1 = k1.rotate_left(15);
        k1 = k1.wrapping_mul(C2);
        h1 ^= k1;
        h1 = h1.rotate_left(13);
        h1 = h1.wrapping_mul(5).wrapping_add(0xe6546b64);
    }

    let mut k1 = 0_u32;
    for (i, &byte) in chunks.remainder().iter().enumerate() {
        k1 |= (byte as u32) << (8 * i);
    }
    if k1 != 0 {
        k1 = k1.wrapping_mul(C1);
        k1 = k1.rotate_left(15);
        k1 = k1.wrapping_mul(C2);
        h1 ^= k1;
    }

    h1 ^= data.len() as u32;
    h1 ^= h1 >> 16;
    h1 = h1.wrapping_mul(0x85ebca6b);
    h1 ^= h1 >> 13;
    h1 = h1.wrapping_mul(0xc2b2ae35);
    h1 ^= h1 >> 16;
    h1
}

#[derive(Clone, Debug, PartialEq)]
pub struct BloomFilter {
    filter: Vec<u8>,
    n_hash_funcs: u32,
    n_tweak: u32,
    n_flags: u8,
}

impl BloomFilter {
    /// Sizes the bit array and hash function count for an expected number of
    /// elements and a desired false positive rate.
    pub fn new(n_elements: usize, false_positive_rate: f64, n_tweak: u32, n_flags: u8) -> Self {
        let ideal_bytes = (-1.0 / LN2_SQUARED * n_elements as f64 * false_positive_rate.ln()) / 8.0;
        let n_bytes = (ideal_bytes as usize).clamp(1, MAX_FILTER_SIZE);
        let ideal_funcs = (n_bytes * 8) as f64 / n_elements as f64 * LN2;
        let n_hash_funcs = (ideal_funcs as u32).clamp(1, MAX_HASH_FUNCS);

        BloomFilter { filter: vec![0; n_bytes], n_hash_funcs, n_tweak, n_flags }
    }

    fn bit_index(&self, n: u32, data: &[u8]) -> usize {
        let seed = n.wrapping_mul(0xFBA4C795).wrapping_add(self.n_tweak);
        murmur3_32(seed, data) as usize % (self.filter.len() * 8)
    }

    pub fn insert(&mut self, data: &[u8]) {
        for n in 0..self.n_hash_funcs {
            let index = self.bit_index(n, data);
            self.filter[index >> 3] |= 1 << (7 & index);
        }
    }

    pub fn matches(&self, data: &[u8]) -> bool {
        (0..self.n_hash_funcs).all(|n| {
            let index = self.bit_index(n, data);
            self.filter[index >> 3] & (1 << (7 & index)) != 0
        })
    }

    pub fn insert_out_point(&mut self, out_point: &crate::tx::OutPoint) {
        self.insert(&Self::out_point_bytes(out_point));
    }

    fn out_point_bytes(out_point: &crate::tx::OutPoint) -> Vec<u8> {
        let mut composer = ByteBufferComposer::with_capacity(36);
        out_point.encode(&mut composer);
        composer.result()
    }

    /// Tests a transaction against the filter. On a match against an
    /// output's pushed script data the output's own outpoint is inserted, so
    /// later spends of that output match as well.
    pub fn match_and_update(&mut self, tx: &Transaction) -> bool {
        let hash = tx.hash();
        let mut found = self.matches(hash.as_bytes());

        for (index, output) in tx.outputs.iter().enumerate() {
            let pushes = extract_pushes(&output.script_pub_key);
            if pushes.iter().any(|data| !data.is_empty() && self.matches(data)) {
                found = true;
                self.insert_out_point(&crate::tx::OutPoint::new(hash, index as u32));
            }
        }

        for input in &tx.inputs {
            if self.matches(&Self::out_point_bytes(&input.previous_out)) {
                found = true;
                continue;
            }
            let pushes = extract_pushes(&input.script_sig);
            if pushes.iter().any(|data| !data.is_empty() && self.matches(data)) {
                found = true;
            }
        }

        found
    }

    pub fn is_empty(&self) -> bool {
        self.filter.iter().all(|byte| *byte == 0)
    }

    pub fn is_full(&self) -> bool {
        self.filter.iter().all(|byte| *byte == 0xff)
    }

    /// Serialized size of the `filterload` form.
    pub fn size(&self) -> usize {
        crate::buffer::var_int_size(self.filter.len() as u64) + self.filter.len() + 4 + 4 + 1
    }

    /// `filterload` payload: the raw bit array, hash function count, tweak
    /// and flags byte.
    pub fn encode(&self, composer: &mut ByteBufferComposer) {
        composer.append_var_bytes(&self.filter);
        composer.append(&self.n_hash_funcs.to_le_bytes());
        composer.append(&self.n_tweak.to_le_bytes());
        composer.push(self.n_flags);
    }

    pub fn parse(parser: &mut ByteBufferParser) -> Result<Self> {
        let filter = parser.read_var_bytes()?;
        if filter.is_empty() || filter.len() > MAX_FILTER_SIZE {
            return Err(Error::malformed("bloom filter size out of range"));
        }
        let n_hash_funcs = parser.read_u32_le()?;
        let n_tweak = parser.read_u32_le()?;
        let n_flags = parser.read_u8()?;
        Ok(BloomFilter { filter, n_hash_funcs, n_tweak, n_flags })
    }
}

#[cfg(test)]
mod test {
    use hex_literal::hex;

    use crate::hashes::Hash256;
    use crate::script::push_data;
    use crate::tx::{OutPoint, TxIn, TxOut};

    use super::*;

    #[test]
    fn test_insert_match_serialize() {
        let mut filter = BloomFilter::new(3, 0.01, 0, 1);

        filter.insert(&hex!("99108ad8ed9bb6274d3980bab5a85c048f0950c8"));
        assert!(filter.matches(&hex!("99108ad8ed9bb6274d3980bab5a85c048f0950c8")));
        // one bit different
        assert!(!filter.matches(&hex!("19108ad8ed9bb6274d3980bab5a85c048f0950c8")));

        filter.insert(&hex!("b5a2c786d9ef4658287ced5914b37a1b4aa32eee"));
        assert!(filter.matches(&hex!("b5a2c786d9ef4658287ced5914b37a1b4aa32eee")));

        filter.insert(&hex!("b9300670b4c5366e95b2699e8b18bc75e5f729c5"));
        assert!(filter.matches(&hex!("b9300670b4c5366e95b2699e8b18bc75e5f729c5")));

        let mut composer = ByteBufferComposer::new();
        filter.encode(&mut composer);
        assert_eq!(composer.result(), hex!("03614e9b050000000000000001"));
    }

    #[test]
    fn test_tweak_changes_bits() {
        let mut filter = BloomFilter::new(3, 0.01, 2147483649, 1);
        filter.insert(&hex!("99108ad8ed9bb6274d3980bab5a85c048f0950c8"));
        filter.insert(&hex!("b5a2c786d9ef4658287ced5914b37a1b4aa32eee"));
        filter.insert(&hex!("b9300670b4c5366e95b2699e8b18bc75e5f729c5"));

        let mut composer = ByteBufferComposer::new();
        filter.encode(&mut composer);
        assert_eq!(composer.result(), hex!("03ce4299050000000100008001"));
    }

    #[test]
    fn test_parse_round_trip() {
        let mut filter = BloomFilter::new(10, 0.001, 42, 0);
        filter.insert(b"some data");

        let mut composer = ByteBufferComposer::new();
        filter.encode(&mut composer);
        let bytes = composer.result();
        assert_eq!(bytes.len(), filter.size());

        let mut parser = ByteBufferParser::new(&bytes);
        assert_eq!(BloomFilter::parse(&mut parser).unwrap(), filter);
    }

    #[test]
    fn test_match_and_update_inserts_outpoint() {
        let pub_key_hash = hex!("010966776006953d5567439e5e39f86a0d273bee");
        let mut filter = BloomFilter::new(10, 0.000001, 0, 1);
        filter.insert(&pub_key_hash);

        // transaction paying to the watched hash
        let mut tx = Transaction::new(1, 0);
        tx.add_input(TxIn::new(OutPoint::new(Hash256::ZERO, 0xffffffff), vec![], 0xffffffff));
        tx.add_output(TxOut::new(1000, crate::script::p2pkh_script(&pub_key_hash)));
        assert!(filter.match_and_update(&tx));

        // a later transaction spending the matched output now matches too,
        // by outpoint alone
        let mut spend = Transaction::new(1, 0);
        let mut script_sig = vec![];
        push_data(&mut script_sig, &[0x30; 71]);
        spend.add_input(TxIn::new(OutPoint::new(tx.hash(), 0), script_sig, 0xffffffff));
        spend.add_output(TxOut::new(900, vec![]));
        assert!(filter.match_and_update(&spend));

        // an unrelated transaction does not match
        let mut other = Transaction::new(1, 0);
        other.add_input(TxIn::new(OutPoint::new(crate::hashes::sha256d(b"x"), 1), vec![], 0));
        other.add_output(TxOut::new(1, vec![]));
        assert!(!filter.match_and_update(&other));

        assert!(!filter.is_empty());
        assert!(!filter.is_full());
    }
}
