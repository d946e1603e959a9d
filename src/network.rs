//! Privileged ("campus") network classification.
//!
//! The configured CIDR blocks are compiled once at startup into a binary
//! trie keyed by address bits. The root consumes no bits and each level
//! consumes one more bit, so the depth never exceeds 32. A lookup walks the
//! trie along the bits of the queried address and reports a hit as soon as
//! it passes a node that terminates a configured block. The shortest
//! matching prefix wins, so nested and overlapping blocks are handled
//! without any ordering requirement and every query costs at most 32 steps.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

use crate::{Error, Result};

/// An IPv4 network in CIDR notation, e.g. `192.168.0.0/24`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cidr4 {
    network: Ipv4Addr,
    prefix_len: u8,
}

impl Cidr4 {
    /// Create a block, clearing any host bits beyond `prefix_len`.
    pub fn new(address: Ipv4Addr, prefix_len: u8) -> Result<Self> {
        if prefix_len > 32 {
            return Err(Error::config(format!(
                "Invalid prefix length /{prefix_len} for {address}"
            )));
        }

        let network = Ipv4Addr::from(u32::from(address) & mask(prefix_len));
        Ok(Self {
            network,
            prefix_len,
        })
    }

    /// Network address with host bits cleared
    #[must_use]
    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    /// Number of leading bits that identify the network
    #[must_use]
    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// Linear membership test, used as the reference for the trie.
    #[cfg(test)]
    fn contains(&self, ip: Ipv4Addr) -> bool {
        u32::from(ip) & mask(self.prefix_len) == u32::from(self.network)
    }
}

impl FromStr for Cidr4 {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (address, prefix) = s
            .split_once('/')
            .ok_or_else(|| Error::config(format!("Invalid CIDR block '{s}': missing '/'")))?;

        let address: Ipv4Addr = address
            .parse()
            .map_err(|e| Error::config(format!("Invalid CIDR block '{s}': {e}")))?;
        let prefix_len: u8 = prefix
            .parse()
            .map_err(|e| Error::config(format!("Invalid CIDR block '{s}': {e}")))?;

        Self::new(address, prefix_len)
    }
}

impl fmt::Display for Cidr4 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix_len)
    }
}

fn mask(prefix_len: u8) -> u32 {
    match prefix_len {
        0 => 0,
        n => u32::MAX << (32 - u32::from(n)),
    }
}

#[derive(Debug, Clone, Default)]
struct Node {
    children: [Option<usize>; 2],
    terminal: bool,
}

/// Immutable set of privileged subnets.
///
/// Build once with [`NetworkClassifier::load`], then share freely: lookups
/// take `&self` and nothing is mutated after construction.
#[derive(Debug, Clone)]
pub struct NetworkClassifier {
    nodes: Vec<Node>,
    blocks: Vec<Cidr4>,
}

impl NetworkClassifier {
    /// Parse and compile a list of CIDR strings.
    ///
    /// Any malformed entry fails the whole load; the service must not start
    /// with a partially understood network definition.
    pub fn load<I, S>(subnets: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let blocks = subnets
            .into_iter()
            .map(|s| s.as_ref().parse())
            .collect::<Result<Vec<Cidr4>>>()?;

        Ok(Self::from_blocks(blocks))
    }

    /// Compile already parsed blocks.
    #[must_use]
    pub fn from_blocks(blocks: Vec<Cidr4>) -> Self {
        let mut classifier = Self {
            nodes: vec![Node::default()],
            blocks: Vec::with_capacity(blocks.len()),
        };

        for block in blocks {
            classifier.insert(block);
        }

        classifier
    }

    fn insert(&mut self, block: Cidr4) {
        let bits = u32::from(block.network);
        let mut current = 0;

        for depth in 0..block.prefix_len {
            let bit = bit_at(bits, depth);
            current = match self.nodes[current].children[bit] {
                Some(next) => next,
                None => {
                    self.nodes.push(Node::default());
                    let next = self.nodes.len() - 1;
                    self.nodes[current].children[bit] = Some(next);
                    next
                }
            };
        }

        self.nodes[current].terminal = true;
        self.blocks.push(block);
    }

    /// Whether `ip` falls inside any configured block.
    #[must_use]
    pub fn is_privileged(&self, ip: Ipv4Addr) -> bool {
        let bits = u32::from(ip);
        let mut current = 0;

        for depth in 0..32 {
            if self.nodes[current].terminal {
                return true;
            }
            match self.nodes[current].children[bit_at(bits, depth)] {
                Some(next) => current = next,
                None => return false,
            }
        }

        self.nodes[current].terminal
    }

    /// Classify any client address. IPv6 clients are never privileged
    /// unless they are IPv4-mapped.
    #[must_use]
    pub fn is_privileged_ip(&self, ip: IpAddr) -> bool {
        match ip.to_canonical() {
            IpAddr::V4(v4) => self.is_privileged(v4),
            IpAddr::V6(_) => false,
        }
    }

    /// The configured blocks, in load order
    #[must_use]
    pub fn blocks(&self) -> &[Cidr4] {
        &self.blocks
    }
}

fn bit_at(bits: u32, depth: u8) -> usize {
    ((bits >> (31 - u32::from(depth))) & 1) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> Ipv4Addr {
        s.parse().unwrap()
    }

    #[test]
    fn test_configured_subnets() {
        let classifier = NetworkClassifier::load(["192.168.0.0/24", "127.0.0.0/16"]).unwrap();

        assert!(classifier.is_privileged(ip("192.168.0.1")));
        assert!(classifier.is_privileged(ip("127.0.1.1")));
        assert!(!classifier.is_privileged(ip("192.168.1.1")));
        assert!(!classifier.is_privileged(ip("127.1.1.1")));
    }

    #[test]
    fn test_nested_subnets_match_shortest_prefix() {
        let classifier = NetworkClassifier::load(["10.1.2.0/24", "10.0.0.0/8"]).unwrap();

        assert!(classifier.is_privileged(ip("10.1.2.3")));
        assert!(classifier.is_privileged(ip("10.200.0.1")));
        assert!(!classifier.is_privileged(ip("11.0.0.1")));
    }

    #[test]
    fn test_host_and_catch_all_blocks() {
        let host = NetworkClassifier::load(["203.0.113.7/32"]).unwrap();
        assert!(host.is_privileged(ip("203.0.113.7")));
        assert!(!host.is_privileged(ip("203.0.113.6")));

        let everything = NetworkClassifier::load(["0.0.0.0/0"]).unwrap();
        assert!(everything.is_privileged(ip("8.8.8.8")));

        let nothing = NetworkClassifier::load(Vec::<String>::new()).unwrap();
        assert!(!nothing.is_privileged(ip("127.0.0.1")));
    }

    #[test]
    fn test_host_bits_are_cleared() {
        let cidr: Cidr4 = "192.168.0.77/24".parse().unwrap();
        assert_eq!(cidr.network(), ip("192.168.0.0"));
        assert_eq!(cidr.to_string(), "192.168.0.0/24");
    }

    #[test]
    fn test_malformed_cidr_is_config_error() {
        for bad in ["192.168.0.0", "192.168.0/24", "192.168.0.0/33", "::1/128", "a.b.c.d/8"] {
            let err = NetworkClassifier::load([bad]).unwrap_err();
            assert!(matches!(err, Error::Config(_)), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_ipv6_clients() {
        let classifier = NetworkClassifier::load(["127.0.0.0/8"]).unwrap();

        assert!(classifier.is_privileged_ip("::ffff:127.0.0.1".parse().unwrap()));
        assert!(!classifier.is_privileged_ip("::1".parse().unwrap()));
    }

    #[test]
    fn test_trie_agrees_with_linear_scan() {
        let subnets = ["10.0.0.0/8", "172.16.0.0/12", "192.168.4.0/22", "198.51.100.128/25"];
        let classifier = NetworkClassifier::load(subnets).unwrap();

        for probe in [
            "10.255.255.255",
            "172.31.0.1",
            "172.32.0.1",
            "192.168.7.255",
            "192.168.8.0",
            "198.51.100.127",
            "198.51.100.200",
            "1.2.3.4",
        ] {
            let addr = ip(probe);
            let linear = classifier.blocks().iter().any(|b| b.contains(addr));
            assert_eq!(classifier.is_privileged(addr), linear, "{probe}");
        }
    }
}
