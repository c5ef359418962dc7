use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::ops::BitAnd;

use strum::{EnumIter, IntoEnumIterator};

use crate::buffer::{ByteBufferComposer, ByteBufferParser};
use crate::error::{Error, Result};

#[derive(Copy, Clone, Debug, PartialEq, Eq, EnumIter)]
pub enum Network {
    Mainnet,
    Testnet3,
    Regtest,
}

impl Network {
    pub fn magic_value(&self) -> u32 {
        match self {
            Network::Mainnet => 0xD9B4BEF9,
            Network::Testnet3 => 0x0709110B,
            Network::Regtest => 0xDAB5BFFA,
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Network::Mainnet => 8333,
            Network::Testnet3 => 18333,
            Network::Regtest => 18444,
        }
    }
}

impl TryFrom<u32> for Network {
    type Error = Error;

    fn try_from(magic_value: u32) -> Result<Self> {
        for n in Self::iter() {
            if n.magic_value() == magic_value {
                return Ok(n);
            }
        }
        Err(Error::malformed(format!("no network known having magic value {magic_value:#x}")))
    }
}

#[derive(Copy, Clone, Debug, PartialEq, EnumIter)]
#[repr(u64)]
pub enum NodeService {
    NodeNetwork = 0x1, // bit mask value
}

impl NodeService {
    pub fn as_u64(self) -> u64 {
        self as u64
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct NodeServiceSet(pub Vec<NodeService>);

impl NodeServiceSet {
    pub fn as_bitmask(&self) -> u64 {
        let mut bitset = 0x0_u64;
        for bit in self.0.iter() {
            bitset |= bit.as_u64();
        }
        bitset
    }

    pub fn from_bitmask(mask: u64) -> Self {
        let mut services = vec![];

        for e in NodeService::iter() {
            if mask.bitand(e.as_u64()) != 0 {
                services.push(e);
            }
        }

        NodeServiceSet(services)
    }
}

/// Network address record
/// (https://en.bitcoin.it/wiki/Protocol_documentation#Network_address).
///
/// size | field    | type     | description
/// ---  | -----    | ----     | ------------
/// 4    | time     | u32      | Last-seen time. Present in `addr` payloads, absent inside `version`
/// 8    | services | u64      | features enabled for this connection
/// 16   | ip       | [u8; 16] | IPv6 address, or IPv4 mapped into `::ffff:a.b.c.d`
/// 2    | port     | u16      | port number, big endian
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NetworkAddress {
    pub time: Option<u32>,
    pub services: u64,
    pub socket_addr: SocketAddr,
}

impl NetworkAddress {
    pub const SIZE: usize = 26;
    pub const TIMED_SIZE: usize = 30;

    pub fn new(services: u64, socket_addr: SocketAddr) -> Self {
        NetworkAddress { time: None, services, socket_addr }
    }

    pub fn unspecified() -> Self {
        NetworkAddress::new(0, SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0))
    }

    pub fn size(&self) -> usize {
        if self.time.is_some() {
            Self::TIMED_SIZE
        } else {
            Self::SIZE
        }
    }

    pub fn encode(&self, composer: &mut ByteBufferComposer) {
        if let Some(time) = self.time {
            composer.append(&time.to_le_bytes());
        }
        composer.append(&self.services.to_le_bytes());
        let ipv6_octets = match self.socket_addr.ip() {
            IpAddr::V4(ip) => ip.to_ipv6_mapped().octets(),
            IpAddr::V6(ip) => ip.octets(),
        };
        composer.append(&ipv6_octets);
        composer.append(&self.socket_addr.port().to_be_bytes());
    }

    pub fn parse(parser: &mut ByteBufferParser, with_time: bool) -> Result<Self> {
        let time = if with_time { Some(parser.read_u32_le()?) } else { None };
        let services = parser.read_u64_le()?;
        let octets: [u8; 16] = parser.read(16)?.try_into().unwrap();
        let ip = match std::net::Ipv6Addr::from(octets).to_ipv4_mapped() {
            Some(v4) => IpAddr::V4(v4),
            None => IpAddr::V6(octets.into()),
        };
        let port = parser.read_u16_be()?;
        Ok(NetworkAddress { time, services, socket_addr: SocketAddr::new(ip, port) })
    }

    pub fn is_ipv4(&self) -> bool {
        self.socket_addr.is_ipv4()
    }
}
