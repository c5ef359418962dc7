use crate::block::BlockHeader;
use crate::buffer::{var_int_size, ByteBufferComposer, ByteBufferParser};
use crate::error::{Error, Result};
use crate::hashes::Hash256;
use crate::network::NetworkAddress;

/// Protocol versions from this one on carry the relay flag at the end of
/// `version` (BIP 37).
pub const RELAY_FLAG_VERSION: i32 = 70001;

/// https://en.bitcoin.it/wiki/Protocol_documentation#version
///
/// size | field        | type     | description
/// ---  | -----        | ----     | ------------
/// 4    | version      | i32      | Identifies protocol version being used by the node
/// 8    | services     | u64      | bitfield of features to be enabled for this connection
/// 8    | timestamp    | i64      | standard UNIX timestamp in seconds
/// 26   | addr_recv    | net_addr | The network address of the node receiving this message
/// 26   | addr_from    | net_addr | The network address of the node emitting this message
/// 8    | nonce        | u64      | Node random nonce
/// ?    | user_agent   | var_str  | User Agent (0x00 if string is 0 bytes long)
/// 4    | start_height | i32      | The last block received by the emitting node
/// 1    | relay        | bool     | Whether the remote peer should announce relayed transactions, see BIP 0037
#[derive(Clone, Debug, PartialEq)]
pub struct VersionMessage {
    pub version: i32,
    pub services: u64,
    pub timestamp: i64,
    pub recipient_address: NetworkAddress,
    pub sender_address: NetworkAddress,
    pub nonce: u64,
    pub user_agent: String,
    pub start_height: i32,
    pub relay: bool,
}

impl VersionMessage {
    pub fn size(&self) -> usize {
        let relay = if self.version >= RELAY_FLAG_VERSION { 1 } else { 0 };
        4 + 8
            + 8
            + 2 * NetworkAddress::SIZE
            + 8
            + var_int_size(self.user_agent.len() as u64)
            + self.user_agent.len()
            + 4
            + relay
    }

    pub fn encode(&self, composer: &mut ByteBufferComposer) {
        composer.append(&self.version.to_le_bytes());
        composer.append(&self.services.to_le_bytes());
        composer.append(&self.timestamp.to_le_bytes());
        // addresses inside `version` never carry the time field
        NetworkAddress { time: None, ..self.recipient_address }.encode(composer);
        NetworkAddress { time: None, ..self.sender_address }.encode(composer);
        composer.append(&self.nonce.to_le_bytes());
        composer.append_var_string(&self.user_agent);
        composer.append(&self.start_height.to_le_bytes());
        if self.version >= RELAY_FLAG_VERSION {
            composer.push(self.relay as u8);
        }
    }

    pub fn parse(parser: &mut ByteBufferParser) -> Result<Self> {
        let version = parser.read_i32_le()?;
        let services = parser.read_u64_le()?;
        let timestamp = parser.read_i64_le()?;
        let recipient_address = NetworkAddress::parse(parser, false)?;
        let sender_address = NetworkAddress::parse(parser, false)?;
        let nonce = parser.read_u64_le()?;
        let user_agent = parser.read_var_string()?;
        let start_height = parser.read_i32_le()?;
        // absent in messages from peers older than the flag
        let relay = if version >= RELAY_FLAG_VERSION && parser.remaining() > 0 {
            parser.read_u8()? != 0
        } else {
            true
        };

        Ok(VersionMessage {
            version,
            services,
            timestamp,
            recipient_address,
            sender_address,
            nonce,
            user_agent,
            start_height,
            relay,
        })
    }
}

/// List of known peer addresses with last-seen times.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AddrMessage {
    pub addr_list: Vec<NetworkAddress>,
}

impl AddrMessage {
    pub fn size(&self) -> usize {
        var_int_size(self.addr_list.len() as u64)
            + self.addr_list.len() * NetworkAddress::TIMED_SIZE
    }

    pub fn encode(&self, composer: &mut ByteBufferComposer) {
        composer.append_var_int(self.addr_list.len() as u64);
        for addr in &self.addr_list {
            NetworkAddress { time: addr.time.or(Some(0)), ..*addr }.encode(composer);
        }
    }

    pub fn parse(parser: &mut ByteBufferParser) -> Result<Self> {
        let count = parser.read_var_int()?;
        let mut addr_list = Vec::with_capacity(count.min(1024) as usize);
        for _ in 0..count {
            addr_list.push(NetworkAddress::parse(parser, true)?);
        }
        Ok(AddrMessage { addr_list })
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum InventoryType {
    Error = 0,
    Tx = 1,
    Block = 2,
}

impl TryFrom<u32> for InventoryType {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            0 => Ok(InventoryType::Error),
            1 => Ok(InventoryType::Tx),
            2 => Ok(InventoryType::Block),
            other => Err(crate::error::Error::malformed(format!("unknown inventory type {other}"))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InventoryItem {
    pub item_type: InventoryType,
    pub hash: Hash256,
}

impl InventoryItem {
    pub const SIZE: usize = 36;

    pub fn tx(hash: Hash256) -> Self {
        InventoryItem { item_type: InventoryType::Tx, hash }
    }

    pub fn block(hash: Hash256) -> Self {
        InventoryItem { item_type: InventoryType::Block, hash }
    }

    pub fn encode(&self, composer: &mut ByteBufferComposer) {
        composer.append(&(self.item_type as u32).to_le_bytes());
        composer.append(self.hash.as_bytes());
    }

    pub fn parse(parser: &mut ByteBufferParser) -> Result<Self> {
        let item_type = InventoryType::try_from(parser.read_u32_le()?)?;
        let hash = parser.read_hash()?;
        Ok(InventoryItem { item_type, hash })
    }
}

/// Inventory vector, the payload of both `inv` and `getdata`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Inventory {
    pub items: Vec<InventoryItem>,
}

impl Inventory {
    pub fn size(&self) -> usize {
        var_int_size(self.items.len() as u64) + self.items.len() * InventoryItem::SIZE
    }

    pub fn encode(&self, composer: &mut ByteBufferComposer) {
        composer.append_var_int(self.items.len() as u64);
        for item in &self.items {
            item.encode(composer);
        }
    }

    pub fn parse(parser: &mut ByteBufferParser) -> Result<Self> {
        let count = parser.read_var_int()?;
        let mut items = Vec::with_capacity(count.min(1024) as usize);
        for _ in 0..count {
            items.push(InventoryItem::parse(parser)?);
        }
        Ok(Inventory { items })
    }
}

/// Payload of `getblocks` and `getheaders`: known block hashes, densest at
/// the tip, asking the peer to continue from the first one it recognizes.
#[derive(Clone, Debug, PartialEq)]
pub struct BlockLocator {
    pub version: u32,
    pub locator_hashes: Vec<Hash256>,
    pub hash_stop: Hash256,
}

impl BlockLocator {
    pub fn size(&self) -> usize {
        4 + var_int_size(self.locator_hashes.len() as u64) + 32 * self.locator_hashes.len() + 32
    }

    pub fn encode(&self, composer: &mut ByteBufferComposer) {
        composer.append(&self.version.to_le_bytes());
        composer.append_var_int(self.locator_hashes.len() as u64);
        for hash in &self.locator_hashes {
            composer.append(hash.as_bytes());
        }
        composer.append(self.hash_stop.as_bytes());
    }

    pub fn parse(parser: &mut ByteBufferParser) -> Result<Self> {
        let version = parser.read_u32_le()?;
        // the hash count sits after the version field
        let count = parser.read_var_int()?;
        let mut locator_hashes = Vec::with_capacity(count.min(1024) as usize);
        for _ in 0..count {
            locator_hashes.push(parser.read_hash()?);
        }
        let hash_stop = parser.read_hash()?;
        Ok(BlockLocator { version, locator_hashes, hash_stop })
    }
}

/// Block headers as sent in `headers`: each followed by a transaction count,
/// always zero.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HeadersMessage {
    pub headers: Vec<BlockHeader>,
}

impl HeadersMessage {
    pub fn size(&self) -> usize {
        var_int_size(self.headers.len() as u64) + self.headers.len() * (BlockHeader::SIZE + 1)
    }

    pub fn encode(&self, composer: &mut ByteBufferComposer) {
        composer.append_var_int(self.headers.len() as u64);
        for header in &self.headers {
            header.encode(composer);
            composer.append_var_int(0);
        }
    }

    pub fn parse(parser: &mut ByteBufferParser) -> Result<Self> {
        let count = parser.read_var_int()?;
        let mut headers = Vec::with_capacity(count.min(1024) as usize);
        for _ in 0..count {
            headers.push(BlockHeader::parse(parser)?);
            parser.read_var_int()?;
        }
        Ok(HeadersMessage { headers })
    }
}
