//! Connection retry helper shared by the Redis transports.

use std::fmt::Display;
use std::time::Duration;

use tracing::warn;

/// Default delay between connection attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Run `op` until it succeeds, sleeping `delay` between failures.
///
/// Startup dependencies (broker, store) are allowed to come up after the
/// worker does; the worker waits for them forever rather than crash-looping
/// under its supervisor.
pub fn retry_indefinitely<T, E: Display>(
    dependency: &str,
    delay: Duration,
    mut op: impl FnMut() -> Result<T, E>,
) -> T {
    loop {
        match op() {
            Ok(value) => return value,
            Err(e) => {
                warn!(
                    dependency = %dependency,
                    error = %e,
                    delay_secs = delay.as_secs_f32(),
                    "failed to connect; retrying"
                );
                std::thread::sleep(delay);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[test]
    fn returns_first_success_immediately() {
        let value = retry_indefinitely("test", Duration::from_millis(1), || {
            Ok::<_, &str>("connected")
        });
        assert_eq!(value, "connected");
    }

    #[test]
    fn retries_until_the_dependency_accepts() {
        let attempts = AtomicU32::new(0);

        let value = retry_indefinitely("test", Duration::from_millis(1), || {
            if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                Err("connection refused")
            } else {
                Ok(7)
            }
        });

        assert_eq!(value, 7);
        // Two refusals, then the third attempt connected.
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }
}
