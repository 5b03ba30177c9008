// Copyright (c) 2024-2026 Vanyo Vanev / Tech Art Ltd
// SPDX-License-Identifier: MPL-2.0
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
use std::fmt;
use std::str::FromStr;

use uuid::Uuid;

/// Size of a peer id on the wire, in bytes.
pub const PEER_ID_LENGTH: usize = 16;

/// Identifier for a connected peer: a random type-4 UUID.
///
/// On the wire a peer id travels as two 64-bit little-endian words, which
/// coincides with the UUID's raw byte order. The text form is the canonical
/// hyphenated UUID string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerId(Uuid);

impl PeerId {
    /// Generate a fresh random peer id.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// The all-zero id, used as the keep-alive address and never assigned
    /// to a peer.
    pub const fn zero() -> Self {
        Self(Uuid::nil())
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_nil()
    }

    /// Serialize as two 64-bit little-endian words.
    pub fn to_wire(&self) -> [u8; PEER_ID_LENGTH] {
        let (lo, hi) = self.as_words();
        let mut out = [0u8; PEER_ID_LENGTH];
        out[..8].copy_from_slice(&lo.to_le_bytes());
        out[8..].copy_from_slice(&hi.to_le_bytes());
        out
    }

    /// Inverse of [`PeerId::to_wire`].
    pub fn from_wire(bytes: [u8; PEER_ID_LENGTH]) -> Self {
        let mut lo = [0u8; 8];
        let mut hi = [0u8; 8];
        lo.copy_from_slice(&bytes[..8]);
        hi.copy_from_slice(&bytes[8..]);
        Self::from_words(u64::from_le_bytes(lo), u64::from_le_bytes(hi))
    }

    fn as_words(&self) -> (u64, u64) {
        let bytes = self.0.into_bytes();
        let mut lo = [0u8; 8];
        let mut hi = [0u8; 8];
        lo.copy_from_slice(&bytes[..8]);
        hi.copy_from_slice(&bytes[8..]);
        (u64::from_le_bytes(lo), u64::from_le_bytes(hi))
    }

    fn from_words(lo: u64, hi: u64) -> Self {
        let mut bytes = [0u8; PEER_ID_LENGTH];
        bytes[..8].copy_from_slice(&lo.to_le_bytes());
        bytes[8..].copy_from_slice(&hi.to_le_bytes());
        Self(Uuid::from_bytes(bytes))
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for PeerId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}
