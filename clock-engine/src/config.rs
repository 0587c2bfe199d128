// Design constants of the timekeeping engine. Hardware specific values live in
// the firmware crate.

/// Number of minute positions on a 12 hour face.
pub const FACE_MINUTES: u16 = 12 * 60;

/// Drift between the local second counter and GPS time that is tolerated
/// before the counter is overwritten. Correcting requires stopping and
/// restarting the tick source, so leave some room for tick jitter.
pub const MAX_DRIFT_SECONDS: i64 = 2;

/// The maximum time the face may lead the target before a wraparound (stepping
/// forward almost 12 hours) is preferred over waiting.
pub const MAX_LOCAL_CLOCK_LEAD_MINUTES: u16 = 5;

pub const MAILBOX_DEPTH: usize = 3;
pub const SEND_TIMEOUT_MS: u64 = 100; // ms; blocking send gives up after this

pub const POWER_LOSS_SAMPLES: u32 = 100;
pub const POWER_RECOVERY_SAMPLES: u32 = 10_000;

pub const VALID_MAGIC: u32 = 0xDEAD_BEEF; // record was fully written by this engine

pub const DEFAULT_PULSE_LEN_MS: u16 = 100;
pub const DEFAULT_PULSE_PAUSE_MS: u16 = 100;

/// Age value the GPS adapter reports when it has never seen a fix.
pub const FIX_AGE_INVALID: u32 = u32::MAX;
/// Fixes older than this are not trusted for resynchronization.
pub const MAX_FIX_AGE_MS: u32 = 1500;

pub const GPS_LOST_TIMEOUT_MS: u64 = 5000;

// Uptime between two periodic checkpoints of the persistent state
pub const CHECKPOINT_INTERVAL_SECONDS: u32 = 3600;

// Status page rotation on the display, in seconds of local time
pub const STATUS_PAGE_SECONDS: u8 = 5;

// Timekeeping mailbox poll while no pulses are pending
pub const RECEIVE_TIMEOUT_MS: u64 = 100;

/// How long the power supervisor waits for each state owner to report
/// suspended before flushing whatever it has.
pub const SHUTDOWN_REPLY_TIMEOUT_MS: u64 = 1000;
