//! API quota tracking and credential rotation

use crate::fetch::Fetcher;

/// Tracks the remaining quota of the active credential
///
/// The budget is advisory: it only decides when to switch credentials.
/// Requests that still hit the limit are retried by the fetcher.
#[derive(Debug)]
pub struct RateBudget {
    credentials: Vec<String>,
    active: usize,
    rotate_below: u32,
    check_every: u32,
    nodes_since_check: u32,
    remaining: Option<u32>,
}

impl RateBudget {
    /// Creates a budget over `credentials`, the first one being active
    ///
    /// # Arguments
    ///
    /// * `credentials` - API tokens in rotation order
    /// * `rotate_below` - Remaining quota that triggers a rotation
    /// * `check_every` - Nodes between two quota probes
    pub fn new(credentials: Vec<String>, rotate_below: u32, check_every: u32) -> Self {
        Self {
            credentials,
            active: 0,
            rotate_below,
            check_every: check_every.max(1),
            nodes_since_check: 0,
            remaining: None,
        }
    }

    /// Index of the credential in use
    pub fn active_index(&self) -> usize {
        self.active
    }

    /// Last observed quota, `None` until the first probe or after a rotation
    pub fn remaining(&self) -> Option<u32> {
        self.remaining
    }

    /// Forces a probe on the next `maintain` call
    pub fn reset_schedule(&mut self) {
        self.nodes_since_check = 0;
    }

    /// Called before each node; probes the quota when due and rotates if low
    ///
    /// Returns true if the active credential changed.
    pub async fn maintain(&mut self, fetcher: &dyn Fetcher) -> bool {
        let due = self.nodes_since_check == 0;
        self.nodes_since_check = (self.nodes_since_check + 1) % self.check_every;

        if !due {
            return false;
        }

        match fetcher.remaining_quota().await {
            Ok(remaining) => {
                self.remaining = Some(remaining);
                tracing::debug!(
                    "Credential {} has {} calls remaining",
                    self.active,
                    remaining
                );
                if remaining < self.rotate_below {
                    self.rotate(fetcher)
                } else {
                    false
                }
            }
            Err(e) => {
                tracing::warn!("Quota check failed, keeping current credential: {}", e);
                false
            }
        }
    }

    fn rotate(&mut self, fetcher: &dyn Fetcher) -> bool {
        if self.credentials.len() < 2 {
            tracing::warn!(
                "Quota below {} but no other credential is configured",
                self.rotate_below
            );
            return false;
        }

        self.active = (self.active + 1) % self.credentials.len();
        fetcher.switch_credential(&self.credentials[self.active]);
        self.remaining = None;

        tracing::info!(
            "Rotated to credential {} of {}",
            self.active + 1,
            self.credentials.len()
        );
        true
    }
}
