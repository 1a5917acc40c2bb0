//! Bounded retry of fallible operations

use std::{thread, time::Duration};

use tracing::debug;

/// Whether a failure may go away by itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transience {
    /// Try again
    Transient,
    /// Give up immediately
    Fatal,
}

/// Why [`RetryPolicy::run`] gave up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryError<E> {
    /// An attempt failed with a fatal error
    Fatal {
        /// Attempts made, including the failing one
        attempts: u32,
        /// The error
        error: E,
    },
    /// Every attempt failed with a transient error
    Exhausted {
        /// Attempts made
        attempts: u32,
        /// Error of the last attempt
        error: E,
    },
}

impl<E> RetryError<E> {
    /// Number of attempts made
    pub const fn attempts(&self) -> u32 {
        match self {
            Self::Fatal { attempts, .. } | Self::Exhausted { attempts, .. } => *attempts,
        }
    }

    /// The last error
    pub fn into_inner(self) -> E {
        match self {
            Self::Fatal { error, .. } | Self::Exhausted { error, .. } => error,
        }
    }
}

/// How often and how fast to repeat an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}

impl RetryPolicy {
    /// Allow up to `max_attempts` attempts, at least one
    pub const fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: if max_attempts == 0 { 1 } else { max_attempts },
            delay: Duration::ZERO,
        }
    }

    /// Pause for `delay` before each repeated attempt
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Maximum number of attempts
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Run `op` until it succeeds, fails fatally or the attempts run out
    ///
    /// `op` receives the 1-based attempt number.
    pub fn run<T, E>(
        &self,
        mut op: impl FnMut(u32) -> Result<T, E>,
        classify: impl Fn(&E) -> Transience,
    ) -> Result<T, RetryError<E>> {
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(error) => match classify(&error) {
                    Transience::Fatal => return Err(RetryError::Fatal { attempts: attempt, error }),
                    Transience::Transient if attempt >= self.max_attempts => {
                        return Err(RetryError::Exhausted { attempts: attempt, error });
                    }
                    Transience::Transient => {
                        debug!(attempt, max = self.max_attempts, "Transient failure, retrying");
                        if !self.delay.is_zero() {
                            thread::sleep(self.delay);
                        }
                        attempt += 1;
                    }
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(code: &u32) -> Transience {
        if *code == 28 { Transience::Transient } else { Transience::Fatal }
    }

    #[test]
    fn test_transient_retried_up_to_bound() {
        let mut calls = 0;
        let result: Result<(), _> = RetryPolicy::new(3).run(
            |_| {
                calls += 1;
                Err(28u32)
            },
            classify,
        );
        assert_eq!(calls, 3);
        assert_eq!(result, Err(RetryError::Exhausted { attempts: 3, error: 28 }));
    }

    #[test]
    fn test_fatal_not_retried() {
        let mut calls = 0;
        let result: Result<(), _> = RetryPolicy::new(3).run(
            |_| {
                calls += 1;
                Err(0xAEu32)
            },
            classify,
        );
        assert_eq!(calls, 1);
        assert_eq!(result.unwrap_err().attempts(), 1);
    }

    #[test]
    fn test_recovers_after_transient() {
        let result = RetryPolicy::new(3).run(
            |attempt| if attempt < 2 { Err(28u32) } else { Ok(attempt) },
            classify,
        );
        assert_eq!(result, Ok(2));
    }

    #[test]
    fn test_zero_attempts_means_one() {
        assert_eq!(RetryPolicy::new(0).max_attempts(), 1);
    }
}
