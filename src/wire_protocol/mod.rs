pub mod messages;

use std::ascii;

use strum::{EnumIter, IntoEnumIterator};

use crate::buffer::{ByteBufferComposer, ByteBufferParser, IOBuffer};
use crate::error::{Error, Result};
use crate::hashes::sha256d;
use crate::network::Network;
use crate::wire_protocol::messages::{
    AddrMessage, BlockLocator, HeadersMessage, Inventory, VersionMessage,
};
use crate::{block::Block, tx::Transaction};

pub const HEADER_SIZE: usize = 4 + 12 + 4;
pub const CHECKSUM_SIZE: usize = 4;
/// Upper bound on a single payload; anything larger means we lost framing.
pub const MAX_PAYLOAD_SIZE: usize = 0x0200_0000;

#[derive(Copy, Clone, Debug, PartialEq, Eq, EnumIter)]
pub enum Command {
    Version,
    Verack,
    Addr,
    Inv,
    GetData,
    GetBlocks,
    GetHeaders,
    Tx,
    Block,
    Headers,
    GetAddr,
    Mempool,
}

impl Command {
    // ASCII string identifying the packet content, NULL padded (non-NULL padding results in packet rejected)
    pub fn as_bytes(&self) -> &'static [u8; 12] {
        match self {
            Command::Version => b"version\0\0\0\0\0",
            Command::Verack => b"verack\0\0\0\0\0\0",
            Command::Addr => b"addr\0\0\0\0\0\0\0\0",
            Command::Inv => b"inv\0\0\0\0\0\0\0\0\0",
            Command::GetData => b"getdata\0\0\0\0\0",
            Command::GetBlocks => b"getblocks\0\0\0",
            Command::GetHeaders => b"getheaders\0\0",
            Command::Tx => b"tx\0\0\0\0\0\0\0\0\0\0",
            Command::Block => b"block\0\0\0\0\0\0\0",
            Command::Headers => b"headers\0\0\0\0\0",
            Command::GetAddr => b"getaddr\0\0\0\0\0",
            Command::Mempool => b"mempool\0\0\0\0\0",
        }
    }

    pub fn as_str(&self) -> &'static str {
        let bytes = self.as_bytes();
        let end = bytes.iter().position(|b| *b == 0).unwrap_or(12);
        std::str::from_utf8(&bytes[..end]).unwrap()
    }

    /// `verack` predates the checksum field and is framed without one.
    pub fn has_checksum(&self) -> bool {
        !matches!(self, Command::Verack)
    }
}

impl TryFrom<&[u8]> for Command {
    type Error = Error;

    fn try_from(value: &[u8]) -> Result<Self> {
        fn format_byte_array_as_string(bytes: &[u8]) -> String {
            let mut result = String::new();
            for &c in bytes {
                result.push_str(
                    std::str::from_utf8(&ascii::escape_default(c).collect::<Vec<u8>>()).unwrap(),
                )
            }
            result
        }

        for command in Command::iter() {
            if command.as_bytes() == value {
                return Ok(command);
            }
        }
        Err(Error::UnknownCommand(format_byte_array_as_string(value)))
    }
}

/// Message framing header
/// (see https://en.bitcoin.it/wiki/Protocol_documentation#Message_structure)
///
/// size | field    | type     | description
/// ---  | -----    | ----     | ------------
/// 4    | magic    | u32      | Magic value indicating message origin network, and used to seek to next message when stream state is unknown
/// 12   | command  | [u8; 12] | ASCII string identifying the packet content, NULL padded
/// 4    | length   | u32      | Length of payload in number of bytes
/// 4    | checksum | [u8; 4]  | First 4 bytes of sha256(sha256(payload)); absent for `verack`
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MessageHeader {
    pub magic: u32,
    pub command: Command,
    pub length: u32,
    pub checksum: Option<[u8; 4]>,
}

impl MessageHeader {
    pub fn size(&self) -> usize {
        HEADER_SIZE + if self.checksum.is_some() { CHECKSUM_SIZE } else { 0 }
    }

    pub fn encode(&self, composer: &mut ByteBufferComposer) {
        composer.append(&self.magic.to_le_bytes());
        composer.append(self.command.as_bytes());
        composer.append(&self.length.to_le_bytes());
        if let Some(checksum) = self.checksum {
            composer.append(&checksum);
        }
    }
}

/// The payloads this node understands, one variant per command.
#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    Version(VersionMessage),
    Verack,
    Addr(AddrMessage),
    Inv(Inventory),
    GetData(Inventory),
    GetBlocks(BlockLocator),
    GetHeaders(BlockLocator),
    Tx(Transaction),
    Block(Block),
    Headers(HeadersMessage),
    GetAddr,
    Mempool,
}

impl Message {
    pub fn command(&self) -> Command {
        match self {
            Message::Version(_) => Command::Version,
            Message::Verack => Command::Verack,
            Message::Addr(_) => Command::Addr,
            Message::Inv(_) => Command::Inv,
            Message::GetData(_) => Command::GetData,
            Message::GetBlocks(_) => Command::GetBlocks,
            Message::GetHeaders(_) => Command::GetHeaders,
            Message::Tx(_) => Command::Tx,
            Message::Block(_) => Command::Block,
            Message::Headers(_) => Command::Headers,
            Message::GetAddr => Command::GetAddr,
            Message::Mempool => Command::Mempool,
        }
    }

    /// Serialized payload size, computed without building the buffer.
    pub fn payload_size(&self) -> usize {
        match self {
            Message::Version(m) => m.size(),
            Message::Addr(m) => m.size(),
            Message::Inv(m) | Message::GetData(m) => m.size(),
            Message::GetBlocks(m) | Message::GetHeaders(m) => m.size(),
            Message::Tx(m) => m.size(),
            Message::Block(m) => m.size(),
            Message::Headers(m) => m.size(),
            Message::Verack | Message::GetAddr | Message::Mempool => 0,
        }
    }

    pub fn encode_payload(&self, composer: &mut ByteBufferComposer) {
        match self {
            Message::Version(m) => m.encode(composer),
            Message::Addr(m) => m.encode(composer),
            Message::Inv(m) | Message::GetData(m) => m.encode(composer),
            Message::GetBlocks(m) | Message::GetHeaders(m) => m.encode(composer),
            Message::Tx(m) => m.encode(composer),
            Message::Block(m) => m.encode(composer),
            Message::Headers(m) => m.encode(composer),
            Message::Verack | Message::GetAddr | Message::Mempool => {}
        }
    }

    pub fn decode_payload(command: Command, payload: &[u8]) -> Result<Message> {
        let mut parser = ByteBufferParser::new(payload);
        let message = match command {
            Command::Version => Message::Version(VersionMessage::parse(&mut parser)?),
            Command::Verack => Message::Verack,
            Command::Addr => Message::Addr(AddrMessage::parse(&mut parser)?),
            Command::Inv => Message::Inv(Inventory::parse(&mut parser)?),
            Command::GetData => Message::GetData(Inventory::parse(&mut parser)?),
            Command::GetBlocks => Message::GetBlocks(BlockLocator::parse(&mut parser)?),
            Command::GetHeaders => Message::GetHeaders(BlockLocator::parse(&mut parser)?),
            Command::Tx => Message::Tx(Transaction::parse(&mut parser)?),
            Command::Block => Message::Block(Block::parse(&mut parser)?),
            Command::Headers => Message::Headers(HeadersMessage::parse(&mut parser)?),
            Command::GetAddr => Message::GetAddr,
            Command::Mempool => Message::Mempool,
        };
        Ok(message)
    }

    /// The complete frame: header (magic, command, length, checksum) and
    /// payload.
    pub fn to_bytes(&self, network: Network) -> Vec<u8> {
        let mut payload = ByteBufferComposer::with_capacity(self.payload_size());
        self.encode_payload(&mut payload);
        let payload = payload.result();

        let command = self.command();
        let checksum = command
            .has_checksum()
            .then(|| sha256d(&payload).as_bytes()[..4].try_into().unwrap());
        let header = MessageHeader {
            magic: network.magic_value(),
            command,
            length: payload.len() as u32,
            checksum,
        };

        let mut composer = ByteBufferComposer::with_capacity(header.size() + payload.len());
        header.encode(&mut composer);
        composer.append(&payload);
        composer.result()
    }
}

pub enum MessageParseOutcome {
    Message(Message),
    /// An unusable frame was consumed: unknown command, bad checksum or an
    /// undecodable payload. The stream stays in sync.
    Skipped(Error),
    /// Not enough buffered bytes for a complete frame.
    NoMessage,
}

/// Scans `buffer` for the next magic-prefixed frame of `network`, consuming
/// garbage before the magic and, when a complete frame is buffered, the
/// frame itself.
pub fn try_consume_message(buffer: &mut IOBuffer, network: Network) -> MessageParseOutcome {
    let magic = network.magic_value().to_le_bytes();

    let position = buffer.content().windows(4).position(|window| window == magic);
    match position {
        Some(0) => {}
        Some(skip) => buffer.shift_left(skip),
        None => {
            // keep a tail that could be the start of a magic sequence
            let keep = buffer.content().len().saturating_sub(3);
            if keep > 0 {
                buffer.shift_left(keep);
            }
            return MessageParseOutcome::NoMessage;
        }
    }

    let content = buffer.content();
    if content.len() < HEADER_SIZE {
        return MessageParseOutcome::NoMessage;
    }

    let command_bytes: [u8; 12] = content[4..16].try_into().unwrap();
    let length = u32::from_le_bytes(content[16..20].try_into().unwrap()) as usize;
    let checksum_size =
        if &command_bytes == Command::Verack.as_bytes() { 0 } else { CHECKSUM_SIZE };

    if length > MAX_PAYLOAD_SIZE {
        // framing is lost; drop this magic and seek the next one
        buffer.shift_left(4);
        return MessageParseOutcome::Skipped(Error::malformed(format!(
            "payload length {length} exceeds maximum"
        )));
    }

    let total_size = HEADER_SIZE + checksum_size + length;
    if content.len() < total_size {
        return MessageParseOutcome::NoMessage;
    }

    let checksum: Option<[u8; 4]> =
        (checksum_size > 0).then(|| content[HEADER_SIZE..HEADER_SIZE + 4].try_into().unwrap());
    let payload = &content[HEADER_SIZE + checksum_size..total_size];

    let outcome = (|| {
        let command = Command::try_from(&command_bytes[..])?;
        if let Some(checksum) = checksum {
            if checksum != sha256d(payload).as_bytes()[..4] {
                return Err(Error::ChecksumMismatch);
            }
        }
        Message::decode_payload(command, payload)
    })();

    buffer.shift_left(total_size);
    match outcome {
        Ok(message) => MessageParseOutcome::Message(message),
        Err(err) => MessageParseOutcome::Skipped(err),
    }
}
