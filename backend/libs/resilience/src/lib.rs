/// Resilience patterns for long-lived client connections
///
/// - **Backoff**: exponential reconnect delays with a cap and optional jitter
/// - **Retry budget**: consecutive-failure ceiling that turns transient errors terminal
///
/// # Example: reconnect loop
///
/// ```rust,no_run
/// use resilience::{RetryBudget, RetryConfig};
///
/// #[tokio::main]
/// async fn main() {
///     let config = RetryConfig::default();
///     let mut budget = RetryBudget::new(&config);
///
///     loop {
///         // Try to open the connection here
///         let opened = false;
///         if opened {
///             budget.reset();
///             break;
///         }
///         match budget.record_failure() {
///             Some(delay) => tokio::time::sleep(delay).await,
///             None => break,
///         }
///     }
/// }
/// ```

pub mod retry;

pub use retry::{Backoff, RetryBudget, RetryConfig};
