//! Protocol constants shared by the hub and its tests.

use std::time::Duration;

/// Max time allowed between inbound liveness-probe responses before a peer
/// is considered dead.
pub const PONG_WAIT: Duration = Duration::from_secs(60);

/// Interval between server-initiated Ping frames. Must be strictly less
/// than [`PONG_WAIT`]; nine-tenths of it, as in the original protocol.
pub const PING_PERIOD: Duration = Duration::from_secs(54);

/// Maximum inbound frame size in bytes.
pub const MAX_FRAME_SIZE: usize = 10_000;

/// Capacity of each connection's bounded outbound queue.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 256;

/// Maximum frames held in a connection's overflow buffer before the
/// connection is torn down as an abusive slow consumer.
pub const OVERFLOW_CAP: usize = 1024;

/// How long a session stays valid after each gated request extends it.
pub const SESSION_TTL: Duration = Duration::from_secs(45 * 60);

/// Interval of the background expired-session sweep.
pub const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(10 * 60);
