use num_bigint::BigUint;
use num_traits::{One, ToPrimitive, Zero};

use crate::buffer::{var_int_size, ByteBufferComposer, ByteBufferParser};
use crate::error::{Error, Result};
use crate::hashes::{sha256d, Hash256};
use crate::merkle::MerkleTree;
use crate::tx::Transaction;

/// https://en.bitcoin.it/wiki/Protocol_documentation#Block_Headers
///
/// size | field           | type    | description
/// ---  | -----           | ----    | ------------
/// 4    | version         | u32     | block format version
/// 32   | prev_block_hash | [u8;32] | hash of the previous block header
/// 32   | merkle_root     | [u8;32] | root of the transaction merkle tree
/// 4    | timestamp       | u32     | seconds since the unix epoch
/// 4    | bits            | u32     | compact encoding of the proof-of-work target
/// 4    | nonce           | u32     | counter varied by miners
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BlockHeader {
    pub version: u32,
    pub prev_block_hash: Hash256,
    pub merkle_root: Hash256,
    pub timestamp: u32,
    pub bits: u32,
    pub nonce: u32,
}

impl BlockHeader {
    pub const SIZE: usize = 80;

    pub fn encode(&self, composer: &mut ByteBufferComposer) {
        composer.append(&self.version.to_le_bytes());
        composer.append(self.prev_block_hash.as_bytes());
        composer.append(self.merkle_root.as_bytes());
        composer.append(&self.timestamp.to_le_bytes());
        composer.append(&self.bits.to_le_bytes());
        composer.append(&self.nonce.to_le_bytes());
    }

    pub fn parse(parser: &mut ByteBufferParser) -> Result<Self> {
        Ok(BlockHeader {
            version: parser.read_u32_le()?,
            prev_block_hash: parser.read_hash()?,
            merkle_root: parser.read_hash()?,
            timestamp: parser.read_u32_le()?,
            bits: parser.read_u32_le()?,
            nonce: parser.read_u32_le()?,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut composer = ByteBufferComposer::with_capacity(Self::SIZE);
        self.encode(&mut composer);
        composer.result()
    }

    /// The block identity: double SHA-256 of the 80 byte header.
    pub fn hash(&self) -> Hash256 {
        sha256d(&self.to_bytes())
    }

    pub fn target(&self) -> BigUint {
        target_from_bits(self.bits)
    }

    pub fn set_target(&mut self, target: &BigUint) -> Result<()> {
        self.bits = bits_from_target(target)?;
        Ok(())
    }

    /// Expected number of hash evaluations to find a block at this target.
    pub fn work(&self) -> BigUint {
        let target = self.target();
        if target.is_zero() {
            return BigUint::zero();
        }
        (BigUint::one() << 256u32) / (target + BigUint::one())
    }
}

/// Expands the compact `bits` form: a one byte exponent over a 23 bit
/// mantissa, `target = mantissa * 256^(exponent - 3)`.
pub fn target_from_bits(bits: u32) -> BigUint {
    let exponent = bits >> 24;
    let mantissa = bits & 0x007fffff;
    if exponent <= 3 {
        BigUint::from(mantissa >> (8 * (3 - exponent)))
    } else {
        BigUint::from(mantissa) << (8 * (exponent - 3))
    }
}

/// Compacts a target back into `bits`. If the mantissa's top bit would be
/// set (the compact form is signed), the mantissa is shifted down a byte and
/// the exponent bumped.
pub fn bits_from_target(target: &BigUint) -> Result<u32> {
    let mut exponent = if target.is_zero() { 0 } else { target.to_bytes_be().len() as u32 };
    let mut mantissa: u32 = if exponent <= 3 {
        let word = target.to_u32().unwrap_or(0);
        word << (8 * (3 - exponent))
    } else {
        (target >> (8 * (exponent - 3))).to_u32().ok_or(Error::MantissaTooLarge)?
    };

    if mantissa >> 24 != 0 {
        return Err(Error::MantissaTooLarge);
    }

    if mantissa & 0x00800000 != 0 {
        mantissa >>= 8;
        exponent += 1;
    }

    if exponent >> 8 != 0 {
        return Err(Error::ExponentTooLarge);
    }

    Ok((exponent << 24) | mantissa)
}

/// Block header followed by the transaction list. Parsing verifies that the
/// header's merkle root matches the transactions.
#[derive(Clone, Debug, PartialEq)]
pub struct Block {
    pub header: BlockHeader,
    pub txs: Vec<Transaction>,
}

impl Block {
    pub fn size(&self) -> usize {
        BlockHeader::SIZE
            + var_int_size(self.txs.len() as u64)
            + self.txs.iter().map(Transaction::size).sum::<usize>()
    }

    pub fn encode(&self, composer: &mut ByteBufferComposer) {
        self.header.encode(composer);
        composer.append_var_int(self.txs.len() as u64);
        for tx in &self.txs {
            tx.encode(composer);
        }
    }

    pub fn parse(parser: &mut ByteBufferParser) -> Result<Self> {
        let header = BlockHeader::parse(parser)?;
        let tx_count = parser.read_var_int()?;
        let mut txs = Vec::with_capacity(tx_count.min(1024) as usize);
        let mut merkle_tree = MerkleTree::new();
        for _ in 0..tx_count {
            let tx = Transaction::parse(parser)?;
            merkle_tree.add_hash(tx.hash());
            txs.push(tx);
        }
        if merkle_tree.root() != Some(header.merkle_root) {
            return Err(Error::MerkleRootMismatch);
        }
        Ok(Block { header, txs })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut composer = ByteBufferComposer::with_capacity(self.size());
        self.encode(&mut composer);
        composer.result()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut parser = ByteBufferParser::new(bytes);
        Block::parse(&mut parser)
    }

    pub fn is_valid_merkle_root(&self) -> bool {
        self.merkle_root() == Some(self.header.merkle_root)
    }

    pub fn update_merkle_root(&mut self) {
        if let Some(root) = self.merkle_root() {
            self.header.merkle_root = root;
        }
    }

    fn merkle_root(&self) -> Option<Hash256> {
        MerkleTree::from_hashes(self.txs.iter().map(Transaction::hash).collect()).root()
    }

    pub fn total_sent(&self) -> u64 {
        self.txs.iter().map(Transaction::total_sent).sum()
    }

    /// The block height committed into the coinbase scriptSig for version 2
    /// and later blocks.
    pub fn height(&self) -> Option<i64> {
        if self.header.version < 2 {
            return None;
        }
        let script_sig = &self.txs.first()?.inputs.first()?.script_sig;
        let n_bytes = *script_sig.first()? as usize;
        if n_bytes >= script_sig.len() || n_bytes > 8 {
            return None;
        }
        let mut height: i64 = 0;
        let mut coef: i64 = 1;
        for &byte in &script_sig[1..=n_bytes] {
            height += byte as i64 * coef;
            coef *= 256;
        }
        Some(height)
    }
}

#[cfg(test)]
mod test {
    use hex_literal::hex;
    use rstest::*;

    use crate::tx::{OutPoint, TxIn, TxOut};

    use super::*;

    fn genesis_header() -> BlockHeader {
        BlockHeader {
            version: 1,
            prev_block_hash: Hash256::ZERO,
            merkle_root: Hash256::from_hex(
                "4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b",
            )
            .unwrap(),
            timestamp: 1231006505,
            bits: 0x1d00ffff,
            nonce: 2083236893,
        }
    }

    #[test]
    fn test_genesis_header_hash() {
        let header = genesis_header();
        assert_eq!(
            header.hash().to_hex(),
            "000000000019d6689c085ae165831e934ff763ae46a2a6c172b3f1b60a8ce26f"
        );

        let bytes = header.to_bytes();
        assert_eq!(bytes.len(), BlockHeader::SIZE);
        let mut parser = ByteBufferParser::new(&bytes);
        assert_eq!(BlockHeader::parse(&mut parser).unwrap(), header);
    }

    #[test]
    fn test_target_of_genesis_bits() {
        let target = target_from_bits(0x1d00ffff);
        let mut expected = vec![0xff, 0xff];
        expected.extend_from_slice(&[0; 26]);
        assert_eq!(target, BigUint::from_bytes_be(&expected));
        assert_eq!(bits_from_target(&target).unwrap(), 0x1d00ffff);
    }

    #[test]
    fn test_work_of_genesis_bits() {
        let header = genesis_header();
        assert_eq!(header.work(), BigUint::from(0x1_0001_0001_u64));
    }

    #[rstest]
    #[case(0)]
    #[case(0x01003456)]
    #[case(0x181bc330)]
    #[case(0x1d00ffff)]
    #[case(0x20007fff)]
    fn test_bits_round_trip(#[case] bits: u32) {
        let target = target_from_bits(bits);
        let reencoded = bits_from_target(&target).unwrap();
        assert_eq!(target_from_bits(reencoded), target);
    }

    #[test]
    fn test_sign_bit_normalization() {
        // a mantissa with its top bit set moves a byte into the exponent
        let target = BigUint::from(0x0080_0000_u32);
        let bits = bits_from_target(&target).unwrap();
        assert_eq!(bits, 0x04008000);
        assert_eq!(target_from_bits(bits), target);
    }

    #[test]
    fn test_exponent_too_large() {
        let huge = BigUint::one() << (8 * 256u32);
        assert!(matches!(bits_from_target(&huge), Err(Error::ExponentTooLarge)));
    }

    #[test]
    fn test_block_round_trip_validates_merkle_root() {
        let tx = crate::tx::test::genesis_tx();
        let mut block = Block { header: genesis_header(), txs: vec![tx] };
        assert!(block.is_valid_merkle_root());

        let bytes = block.to_bytes();
        assert_eq!(bytes.len(), block.size());
        assert_eq!(Block::from_bytes(&bytes).unwrap(), block);

        block.header.merkle_root = Hash256::ZERO;
        assert!(!block.is_valid_merkle_root());
        assert!(matches!(Block::from_bytes(&block.to_bytes()), Err(Error::MerkleRootMismatch)));

        block.update_merkle_root();
        assert!(block.is_valid_merkle_root());
    }

    #[test]
    fn test_coinbase_height() {
        // version 2 block with BIP34 height 227964 = 0x037a7c
        let mut coinbase = Transaction::new(1, 0);
        coinbase.add_input(TxIn::new(
            OutPoint::new(Hash256::ZERO, 0xffffffff),
            hex!("037c7a03").to_vec(),
            0xffffffff,
        ));
        coinbase.add_output(TxOut::new(25_0000_0000, vec![]));

        let mut block = Block {
            header: BlockHeader {
                version: 2,
                prev_block_hash: Hash256::ZERO,
                merkle_root: Hash256::ZERO,
                timestamp: 0,
                bits: 0x1d00ffff,
                nonce: 0,
            },
            txs: vec![coinbase],
        };
        block.update_merkle_root();
        assert_eq!(block.height(), Some(227964));

        block.header.version = 1;
        assert_eq!(block.height(), None);
    }
}
