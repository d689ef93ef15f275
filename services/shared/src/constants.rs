/// Shared constants for the transaction pipeline
///
/// Centralizes queue names and reference defaults so the processor and the
/// producer tool agree on them.

/// Redis stream that carries incoming transaction payloads
pub const TRANSACTIONS_STREAM: &str = "transactions:incoming";

/// Consumer group used by processor instances on the transactions stream
pub const TRANSACTIONS_GROUP: &str = "transaction-processors";

/// Stream entry field holding the JSON payload
pub const PAYLOAD_FIELD: &str = "payload";

/// Default number of workers in the pool
pub const DEFAULT_WORKER_COUNT: usize = 10;

/// Default capacity of the input, result and error queues
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Per-transaction processing deadline in milliseconds
pub const DEFAULT_ITEM_TIMEOUT_MS: u64 = 5_000;

/// Simulated processing latency in milliseconds
pub const DEFAULT_SIMULATED_LATENCY_MS: u64 = 200;

/// Timeout for a single persistence insert in milliseconds
pub const DEFAULT_PERSIST_TIMEOUT_MS: u64 = 2_000;

/// Draws below this value fail with a surfaced processing error
pub const HARD_FAILURE_THRESHOLD: f64 = 0.20;

/// Draws below this value (and at or above the hard threshold) fail silently
pub const SOFT_FAILURE_THRESHOLD: f64 = 0.60;
