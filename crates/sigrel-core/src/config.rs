// Copyright (c) 2024-2026 Vanyo Vanev / Tech Art Ltd
// SPDX-License-Identifier: MPL-2.0
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
use std::time::Duration;

/// Tunables for the relay server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Capacity, in frames, of each connection's outbound queue. A peer
    /// whose queue is full when a frame is offered is considered
    /// unresponsive and gets disconnected.
    pub outbound_queue_frames: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            outbound_queue_frames: 100,
        }
    }
}

/// Retry schedule for [`Client::connect`](crate::client::Client::connect).
///
/// `attempts` counts retries after the first failure; zero means a single
/// try. The delay doubles per consecutive failure and is capped at
/// `max_backoff`.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub attempts: usize,
    pub backoff_base: Duration,
    pub max_backoff: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            attempts: 0,
            backoff_base: Duration::from_millis(300),
            max_backoff: Duration::from_secs(8),
        }
    }
}

impl ReconnectPolicy {
    /// Delay before retry number `attempt` (zero-based).
    pub(crate) fn backoff(&self, attempt: usize) -> Duration {
        let exp = attempt.min(8) as u32;
        let factor = 1u32 << exp;
        self.backoff_base.saturating_mul(factor).min(self.max_backoff)
    }
}
