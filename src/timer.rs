//! Retransmission timer.
//!
//! The sender's only suspension point is "wait for the next inbound packet
//! or for the retransmission timeout, whichever comes first".  A
//! [`RetransmitTimer`] is the timeout half of that race: a pinned
//! `tokio::time::Sleep` that can be armed, re-armed and disarmed without
//! being recreated, so it slots straight into a `tokio::select!` next to a
//! channel receive.
//!
//! The timeout is a fixed, configured duration.

use std::pin::Pin;
use std::time::Duration;

use tokio::time::{Instant, Sleep};

/// Deadline used while disarmed: far enough away never to fire.
const FAR_FUTURE: Duration = Duration::from_secs(365 * 24 * 3600);

#[derive(Debug)]
pub struct RetransmitTimer {
    rto: Duration,
    sleep: Pin<Box<Sleep>>,
    armed: bool,
}

impl RetransmitTimer {
    pub fn new(rto: Duration) -> Self {
        Self {
            rto,
            sleep: Box::pin(tokio::time::sleep(FAR_FUTURE)),
            armed: false,
        }
    }

    pub fn rto(&self) -> Duration {
        self.rto
    }

    /// (Re)start the countdown from now.
    pub fn arm(&mut self) {
        self.sleep.as_mut().reset(Instant::now() + self.rto);
        self.armed = true;
    }

    pub fn disarm(&mut self) {
        self.sleep.as_mut().reset(Instant::now() + FAR_FUTURE);
        self.armed = false;
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Resolves when the armed deadline passes.  Cancel-safe: dropping the
    /// future leaves the deadline untouched.
    pub async fn expired(&mut self) {
        self.sleep.as_mut().await;
        self.armed = false;
    }
}
