//! ---
//! mig_section: "04-role-reconciliation"
//! mig_subsection: "module"
//! mig_type: "source"
//! mig_scope: "code"
//! mig_description: "Bounded retry for lagging dependencies."
//! mig_version: "v0.1.0"
//! mig_owner: "tbd"
//! ---
use std::thread;
use std::time::Duration;

use rolemig_common::RetryConfig;
use tracing::warn;

use crate::{MigrationError, Result};

/// Retries an operation while it fails with a missing object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.max_attempts, config.delay)
    }

    /// Run `op` with the 1-based attempt number until it succeeds, fails with
    /// anything other than NotFound, or the attempt budget is spent.
    pub fn run<T, F>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut(u32) -> Result<T>,
    {
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Err(err) if err.is_not_found() => {
                    if attempt >= self.max_attempts {
                        return Err(MigrationError::RetryExhausted {
                            what: what.to_owned(),
                            attempts: attempt,
                        });
                    }
                    warn!(
                        what,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_secs = self.delay.as_secs_f64(),
                        error = %err,
                        "dependency not found yet, retrying"
                    );
                    if !self.delay.is_zero() {
                        thread::sleep(self.delay);
                    }
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rolemig_store::{ResourcePath, StoreError};

    fn missing() -> MigrationError {
        let path = ResourcePath::cluster("/apis/rbac.example.io/v1", "roles");
        StoreError::not_found(&path, "view-pods").into()
    }

    #[test]
    fn succeeds_after_transient_not_found() {
        let policy = RetryPolicy::new(3, Duration::ZERO);
        let value = policy
            .run("template", |attempt| if attempt < 3 { Err(missing()) } else { Ok(attempt) })
            .unwrap();
        assert_eq!(value, 3);
    }

    #[test]
    fn exhaustion_is_reported() {
        let policy = RetryPolicy::new(2, Duration::ZERO);
        let mut calls = 0;
        let err = policy
            .run::<(), _>("role dev/ops", |_| {
                calls += 1;
                Err(missing())
            })
            .unwrap_err();
        assert_eq!(calls, 2);
        assert!(matches!(err, MigrationError::RetryExhausted { attempts: 2, .. }));
        assert_eq!(err.to_string(), "role dev/ops still missing after 2 attempts");
    }

    #[test]
    fn other_errors_are_not_retried() {
        let policy = RetryPolicy::new(5, Duration::ZERO);
        let mut calls = 0;
        let err = policy
            .run::<(), _>("template", |_| {
                calls += 1;
                Err(StoreError::from(anyhow::anyhow!("forbidden")).into())
            })
            .unwrap_err();
        assert_eq!(calls, 1);
        assert_eq!(err.to_string(), "forbidden");
    }

    #[test]
    fn zero_attempts_still_runs_once() {
        let policy = RetryPolicy::new(0, Duration::ZERO);
        assert_eq!(policy.max_attempts, 1);
    }
}
