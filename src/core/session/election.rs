//! Deterministic caller election.
//!
//! Both peers hash the same sorted id pair, so they agree on exactly one
//! caller without exchanging anything.

use sha3::{Digest, Sha3_256};
use std::fmt;

/// Which side of a pairwise negotiation this peer plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Creates the offer and drives reconnects.
    Caller,
    /// Answers offers and waits for the caller after a drop.
    Callee,
    /// Election impossible (identical ids).
    Unknown,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::Caller => "caller",
            Role::Callee => "callee",
            Role::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Id of the peer responsible for sending the offer, or `None` if the ids
/// are equal.
///
/// SHA3-256 over the two ids concatenated in sorted order; bit 0 of the
/// first digest byte picks the smaller (`0`) or larger (`1`) id.
pub fn elected_caller<'a>(a: &'a str, b: &'a str) -> Option<&'a str> {
    if a == b {
        return None;
    }
    let (low, high) = if a < b { (a, b) } else { (b, a) };

    let mut hasher = Sha3_256::new();
    hasher.update(low.as_bytes());
    hasher.update(high.as_bytes());
    let digest = hasher.finalize();

    Some(if digest[0] & 1 == 0 { low } else { high })
}

/// Role of `local` in its pairing with `remote`.
pub fn elect(local: &str, remote: &str) -> Role {
    match elected_caller(local, remote) {
        None => Role::Unknown,
        Some(caller) if caller == local => Role::Caller,
        Some(_) => Role::Callee,
    }
}
