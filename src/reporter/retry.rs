use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

const ENABLE_LOGS: bool = true;

use crate::log_warn;

/// Runs `op` up to `attempts` times (at least once), sleeping `delay`
/// between failures. Returns the first success or the last error.
pub async fn retry_fixed<T, E, F, Fut>(
    label: &str,
    attempts: u32,
    delay: Duration,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < attempts => {
                log_warn!("{label} failed (attempt {attempt}/{attempts}): {err}");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                log_warn!("{label} failed after {attempts} attempts: {err}");
                return Err(err);
            }
        }
    }
}
