//! Merkle trees over transaction hashes: full root recomputation and the
//! compact partial form that proves which leaves of a block were matched.

use crate::buffer::{ByteBufferComposer, ByteBufferParser};
use crate::error::{Error, Result};
use crate::hashes::{sha256d, Hash256};

fn hash_pair(left: &Hash256, right: &Hash256) -> Hash256 {
    let mut paired = Vec::with_capacity(64);
    paired.extend_from_slice(left.as_bytes());
    paired.extend_from_slice(right.as_bytes());
    sha256d(&paired)
}

/// depth = ceil(log2(n)) for n >= 1
fn tree_depth(n_leaves: u32) -> u32 {
    let mut depth = 0;
    while (1_u64 << depth) < n_leaves as u64 {
        depth += 1;
    }
    depth
}

/// Ordered list of leaf hashes. Levels pair adjacent hashes; an odd hash at
/// the end of a level is paired with itself.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MerkleTree {
    hashes: Vec<Hash256>,
}

impl MerkleTree {
    pub fn new() -> Self {
        MerkleTree { hashes: vec![] }
    }

    pub fn from_hashes(hashes: Vec<Hash256>) -> Self {
        MerkleTree { hashes }
    }

    pub fn add_hash(&mut self, hash: Hash256) {
        self.hashes.push(hash);
    }

    pub fn hashes(&self) -> &[Hash256] {
        &self.hashes
    }

    /// `None` for an empty tree.
    pub fn root(&self) -> Option<Hash256> {
        match self.hashes.len() {
            0 => None,
            1 => Some(self.hashes[0]),
            _ => {
                let mut level = Vec::with_capacity((self.hashes.len() + 1) / 2);
                for pair in self.hashes.chunks(2) {
                    let right = pair.get(1).unwrap_or(&pair[0]);
                    level.push(hash_pair(&pair[0], right));
                }
                MerkleTree::from_hashes(level).root()
            }
        }
    }
}

/// A leaf hash together with whether it was matched.
pub type MerkleLeaf = (Hash256, bool);

/// Compact proof of the matched leaves of a merkle tree: a depth-first
/// traversal emitting one flag bit per visited node and one hash per node
/// whose subtree is not descended into.
#[derive(Clone, Debug, PartialEq)]
pub struct PartialMerkleTree {
    n_txs: u32,
    depth: u32,
    root: Hash256,
    merkle_hashes: Vec<Hash256>,
    matched_hashes: Vec<Hash256>,
    bits: Vec<bool>,
}

impl PartialMerkleTree {
    /// Builds the proof from the full leaf set with match marks.
    pub fn from_leaves(leaves: &[MerkleLeaf]) -> Result<Self> {
        if leaves.is_empty() {
            return Err(Error::malformed("leaf list is empty"));
        }
        let n_txs = leaves.len() as u32;
        let depth = tree_depth(n_txs);

        let mut tree = PartialMerkleTree {
            n_txs,
            depth,
            root: Hash256::ZERO,
            merkle_hashes: vec![],
            matched_hashes: vec![],
            bits: vec![],
        };
        tree.root = tree.build(leaves, 0, leaves.len(), depth);
        Ok(tree)
    }

    fn build(&mut self, leaves: &[MerkleLeaf], begin: usize, end: usize, depth: u32) -> Hash256 {
        if depth == 0 {
            let (hash, matched) = leaves[begin];
            self.merkle_hashes.push(hash);
            self.bits.push(matched);
            if matched {
                self.matched_hashes.push(hash);
            }
            return hash;
        }

        // A full left subtree holds 2^(depth-1) leaves; anything remaining
        // goes right. With no right subtree the node hash doubles the left.
        let hashes_mark = self.merkle_hashes.len();
        let matched_mark = self.matched_hashes.len();
        let bits_mark = self.bits.len();

        let partition = std::cmp::min(1_usize << (depth - 1), end - begin);
        let left = self.build(leaves, begin, begin + partition, depth - 1);
        let root = if begin + partition < end {
            let right = self.build(leaves, begin + partition, end, depth - 1);
            hash_pair(&left, &right)
        } else {
            hash_pair(&left, &left)
        };

        if self.matched_hashes.len() == matched_mark {
            // nothing matched below: collapse the subtree to its root hash
            self.merkle_hashes.truncate(hashes_mark);
            self.merkle_hashes.push(root);
            self.bits.truncate(bits_mark);
            self.bits.push(false);
        } else {
            self.bits.insert(bits_mark, true);
        }
        root
    }

    /// Rebuilds the tree from its compressed form, taking one flag bit per
    /// visited node: a set bit at a non-leaf recurses, an unset bit
    /// substitutes the next hash for the whole subtree.
    pub fn from_compressed(n_txs: u32, hashes: &[Hash256], flags: &[u8]) -> Result<Self> {
        if n_txs == 0 {
            return Err(Error::malformed("transaction count is zero"));
        }
        let depth = tree_depth(n_txs);

        let mut bits = Vec::with_capacity(flags.len() * 8);
        for flag in flags {
            for i in 0..8 {
                bits.push((flag >> i) & 0x01 == 0x01);
            }
        }

        let mut tree = PartialMerkleTree {
            n_txs,
            depth,
            root: Hash256::ZERO,
            merkle_hashes: vec![],
            matched_hashes: vec![],
            bits: vec![],
        };
        let mut hash_pos = 0;
        let mut bit_pos = 0;
        tree.root = tree.decompress(hashes, &mut hash_pos, &bits, &mut bit_pos, depth, 0)?;

        if bits[bit_pos..].iter().any(|bit| *bit) {
            return Err(Error::ExcessBits);
        }
        tree.bits = bits[..bit_pos].to_vec();
        Ok(tree)
    }

    fn decompress(
        &mut self,
        hashes: &[Hash256],
        hash_pos: &mut usize,
        bits: &[bool],
        bit_pos: &mut usize,
        depth: u32,
        leaf_start: u32,
    ) -> Result<Hash256> {
        let bit = *bits.get(*bit_pos).ok_or(Error::Truncated)?;
        *bit_pos += 1;

        if depth == 0 || !bit {
            let hash = *hashes.get(*hash_pos).ok_or(Error::Truncated)?;
            *hash_pos += 1;
            self.merkle_hashes.push(hash);
            if bit && depth == 0 {
                self.matched_hashes.push(hash);
            }
            return Ok(hash);
        }

        // A node at this depth spans up to 2^depth leaves; a right subtree
        // exists only where the leaf count extends past the left half.
        let half_span = 1_u32 << (depth - 1);
        let left = self.decompress(hashes, hash_pos, bits, bit_pos, depth - 1, leaf_start)?;
        if self.n_txs - leaf_start > half_span {
            let right = self.decompress(
                hashes,
                hash_pos,
                bits,
                bit_pos,
                depth - 1,
                leaf_start + half_span,
            )?;
            Ok(hash_pair(&left, &right))
        } else {
            // right edge of the tree: the last hash is paired with itself
            Ok(hash_pair(&left, &left))
        }
    }

    pub fn n_txs(&self) -> u32 {
        self.n_txs
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn root(&self) -> Hash256 {
        self.root
    }

    pub fn merkle_hashes(&self) -> &[Hash256] {
        &self.merkle_hashes
    }

    /// The matched leaf hashes, in leaf order.
    pub fn matched_hashes(&self) -> &[Hash256] {
        &self.matched_hashes
    }

    /// Flag bits packed least significant bit first.
    pub fn flags(&self) -> Vec<u8> {
        let mut flags = Vec::with_capacity(self.bits.len() / 8 + 1);
        let mut byte = 0_u8;
        let mut bit_counter = 0;
        for bit in &self.bits {
            if bit_counter == 8 {
                flags.push(byte);
                byte = 0;
                bit_counter = 0;
            }
            if *bit {
                byte |= 1 << bit_counter;
            }
            bit_counter += 1;
        }
        flags.push(byte);
        flags
    }

    pub fn verify_root(&self, expected: &Hash256) -> Result<()> {
        if self.root == *expected {
            Ok(())
        } else {
            Err(Error::RootMismatch)
        }
    }

    /// Serialized size of the `{txCount, hashList, flags}` wire form.
    pub fn size(&self) -> usize {
        let flags_len = std::cmp::max(1, (self.bits.len() + 7) / 8);
        4 + crate::buffer::var_int_size(self.merkle_hashes.len() as u64)
            + 32 * self.merkle_hashes.len()
            + crate::buffer::var_int_size(flags_len as u64)
            + flags_len
    }

    /// `{txCount: u32, hashList, flags}` wire form.
    pub fn encode(&self, composer: &mut ByteBufferComposer) {
        composer.append(&self.n_txs.to_le_bytes());
        composer.append_var_int(self.merkle_hashes.len() as u64);
        for hash in &self.merkle_hashes {
            composer.append(hash.as_bytes());
        }
        composer.append_var_bytes(&self.flags());
    }

    pub fn parse(parser: &mut ByteBufferParser) -> Result<Self> {
        let n_txs = parser.read_u32_le()?;
        let hash_count = parser.read_var_int()?;
        let mut hashes = Vec::with_capacity(hash_count.min(1024) as usize);
        for _ in 0..hash_count {
            hashes.push(parser.read_hash()?);
        }
        let flags = parser.read_var_bytes()?;
        PartialMerkleTree::from_compressed(n_txs, &hashes, &flags)
    }
}
