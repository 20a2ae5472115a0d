//! Fault-injecting channel wrapper for testing.
//!
//! Real networks drop, reorder, duplicate and damage packets.  To exercise
//! the reliability mechanisms without depending on actual network
//! conditions, [`LossyChannel`] wraps any [`DatagramChannel`] and applies a
//! configurable fault model to everything sent through it:
//!
//! | Fault        | Description                                          |
//! |--------------|------------------------------------------------------|
//! | Loss         | Drop a datagram with probability `loss_rate`.        |
//! | Corruption   | Flip one random bit with probability `corrupt_rate`. |
//! | Duplication  | Deliver a datagram twice.                            |
//! | Reordering   | Hold a datagram back until the next one has gone.    |
//!
//! Receives pass straight through; wrap both ends to damage both directions.
//! Faults are drawn from a seeded RNG so a failing run can be replayed.

use std::sync::Mutex;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

use crate::channel::{ChannelError, DatagramChannel, DatagramSink};

/// Configuration for the fault-injection model.
///
/// All probabilities are in the range `[0.0, 1.0]`.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Probability that a datagram is silently dropped.
    pub loss_rate: f64,
    /// Probability that a datagram has one bit flipped.
    pub corrupt_rate: f64,
    /// Probability that a datagram is delivered twice.
    pub duplicate_rate: f64,
    /// Probability that a datagram is held back behind the next one.
    pub reorder_rate: f64,
    /// RNG seed.
    pub seed: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        // No faults by default.
        Self {
            loss_rate: 0.0,
            corrupt_rate: 0.0,
            duplicate_rate: 0.0,
            reorder_rate: 0.0,
            seed: 0,
        }
    }
}

impl SimulatorConfig {
    pub fn validate(&self) -> Result<(), SimulatorError> {
        let rates = [
            ("loss_rate", self.loss_rate),
            ("corrupt_rate", self.corrupt_rate),
            ("duplicate_rate", self.duplicate_rate),
            ("reorder_rate", self.reorder_rate),
        ];
        for (name, rate) in rates {
            if !(0.0..=1.0).contains(&rate) {
                return Err(SimulatorError::RateOutOfRange { name, rate });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum SimulatorError {
    #[error("{name} must be within 0.0 and 1.0, got {rate}")]
    RateOutOfRange { name: &'static str, rate: f64 },
}

/// Tally of the faults a [`LossyChannel`] has injected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FaultCounts {
    pub sent: u64,
    pub dropped: u64,
    pub corrupted: u64,
    pub duplicated: u64,
    pub reordered: u64,
}

#[derive(Debug)]
struct FaultState {
    rng: StdRng,
    held: Option<Vec<u8>>,
    counts: FaultCounts,
}

/// A fault-injecting wrapper around another channel.
#[derive(Debug)]
pub struct LossyChannel<C> {
    inner: C,
    config: SimulatorConfig,
    state: Mutex<FaultState>,
}

impl<C> LossyChannel<C> {
    pub fn new(inner: C, config: SimulatorConfig) -> Result<Self, SimulatorError> {
        config.validate()?;
        let rng = StdRng::seed_from_u64(config.seed);
        Ok(Self {
            inner,
            config,
            state: Mutex::new(FaultState {
                rng,
                held: None,
                counts: FaultCounts::default(),
            }),
        })
    }

    pub fn counts(&self) -> FaultCounts {
        self.lock().counts
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FaultState> {
        // A panic while holding the lock leaves only counters behind.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Decide what actually goes on the wire for one send, in order.
    fn apply_faults(&self, datagram: &[u8]) -> Vec<Vec<u8>> {
        let cfg = &self.config;
        let mut st = self.lock();
        st.counts.sent += 1;

        if st.rng.random_bool(cfg.loss_rate) {
            st.counts.dropped += 1;
            return st.held.take().into_iter().collect();
        }

        let mut bytes = datagram.to_vec();
        if !bytes.is_empty() && st.rng.random_bool(cfg.corrupt_rate) {
            let bit = st.rng.random_range(0..bytes.len() * 8);
            bytes[bit / 8] ^= 1 << (bit % 8);
            st.counts.corrupted += 1;
        }

        let mut out = Vec::with_capacity(3);
        if st.held.is_none() && st.rng.random_bool(cfg.reorder_rate) {
            st.counts.reordered += 1;
            st.held = Some(bytes);
            return out;
        }

        let copies = if st.rng.random_bool(cfg.duplicate_rate) {
            st.counts.duplicated += 1;
            2
        } else {
            1
        };
        for _ in 0..copies {
            out.push(bytes.clone());
        }
        out.extend(st.held.take());
        out
    }
}

#[async_trait]
impl<C: DatagramSink> DatagramSink for LossyChannel<C> {
    async fn send(&self, datagram: &[u8]) -> Result<(), ChannelError> {
        let wire = self.apply_faults(datagram);
        for bytes in wire {
            self.inner.send(&bytes).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl<C: DatagramChannel> DatagramChannel for LossyChannel<C> {
    async fn recv(&self) -> Result<Vec<u8>, ChannelError> {
        self.inner.recv().await
    }
}
