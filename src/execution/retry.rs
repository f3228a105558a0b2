use log::warn;

use crate::error::ExecutionManagerError;

/// Bounded retry of remote calls that fail with a transient fault.
///
/// Attempts follow each other immediately. Anything slower belongs to whoever schedules `advance`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy { max_attempts: 3 }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        RetryPolicy { max_attempts: max_attempts.max(1) }
    }

    /// Call `op` until it succeeds, fails permanently, or runs out of attempts
    pub fn run<T, F>(&self, what: &str, mut op: F) -> Result<T, ExecutionManagerError>
    where
        F: FnMut() -> Result<T, ExecutionManagerError>,
    {
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.max_attempts => {
                    warn!("{} failed (attempt {} of {}): {}", what, attempt, self.max_attempts, err);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
