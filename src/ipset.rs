// SPDX-License-Identifier: MIT
//!
//! Shared IP/CIDR set primitive.
//!
//! Both the access-control allow-list (§4.7) and the trusted-proxy set
//! (§4.3) are "a set of individual IPs plus a set of CIDR ranges" with
//! membership testing and atomic whole-set replacement on reload. They are
//! semantically distinct (access decision vs. trust decision) so callers
//! get distinct newtypes, but both are backed by this one implementation.

use std::net::IpAddr;
use std::str::FromStr;

use ipnet::IpNet;

/// An immutable (post-construction) set of individual IPs and CIDR ranges.
#[derive(Debug, Clone, Default)]
pub struct IpSet {
    ips: Vec<IpAddr>,
    nets: Vec<IpNet>,
}

impl IpSet {
    /// Parse a list of strings, each either a bare IP (`"127.0.0.1"`) or a
    /// CIDR range (`"192.168.1.0/24"`). Invalid entries are rejected with
    /// an error naming the offending entry rather than silently dropped —
    /// a typo in an allow-list must fail loudly, not narrow access silently.
    pub fn parse(entries: &[String]) -> Result<Self, String> {
        let mut ips = Vec::new();
        let mut nets = Vec::new();
        for raw in entries {
            let entry = raw.trim();
            if entry.is_empty() {
                continue;
            }
            if let Ok(net) = IpNet::from_str(entry) {
                // A bare IP parses as a /32 or /128 network; keep it in the
                // exact-match list instead so single-IP entries don't pay
                // the network-containment check.
                if net.prefix_len() == net.max_prefix_len() {
                    ips.push(net.addr());
                } else {
                    nets.push(net);
                }
                continue;
            }
            match IpAddr::from_str(entry) {
                Ok(ip) => ips.push(ip),
                Err(_) => return Err(format!("invalid IP or CIDR entry: {entry:?}")),
            }
        }
        Ok(Self { ips, nets })
    }

    pub fn contains(&self, ip: IpAddr) -> bool {
        self.ips.contains(&ip) || self.nets.iter().any(|n| n.contains(&ip))
    }

    pub fn is_empty(&self) -> bool {
        self.ips.is_empty() && self.nets.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ips.len() + self.nets.len()
    }
}
