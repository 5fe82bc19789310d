//! Session-layer settings.

use std::time::Duration;

use gambit_protocol::TimeControl;

/// Room-code alphabet without look-alike characters (no `I`, `O`, `0`, `1`).
pub const UNAMBIGUOUS_ALPHABET: &str = "ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Configuration for the [`SessionManager`](crate::SessionManager).
///
/// Create one with `SessionConfig::default()` and override the fields
/// you care about.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Characters per room code. Default: 6.
    pub code_length: usize,
    /// Characters room codes are drawn from. Default:
    /// [`UNAMBIGUOUS_ALPHABET`].
    pub code_alphabet: String,
    /// How many random codes to try before giving up on a collision
    /// streak. Default: 32.
    pub max_code_attempts: u32,
    /// Prefix of the share link sent with `roomCreated`; the code is
    /// appended. Default: `https://gambit.local/join/`.
    pub share_link_base: String,
    /// How long a finished room stays joinable for late observers.
    /// Default: 60 seconds.
    pub terminal_grace: Duration,
    /// Upper bound on every datastore call. Default: 3 seconds.
    pub store_timeout: Duration,
    /// An unfinished room with nobody seated online and no activity for
    /// this long is dropped. Default: 24 hours.
    pub abandon_after: Duration,
    /// Time control used when `createRoom` does not name one.
    /// Default: none (untimed).
    pub default_time_control: Option<TimeControl>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            code_length: 6,
            code_alphabet: UNAMBIGUOUS_ALPHABET.to_string(),
            max_code_attempts: 32,
            share_link_base: "https://gambit.local/join/".to_string(),
            terminal_grace: Duration::from_secs(60),
            store_timeout: Duration::from_secs(3),
            abandon_after: Duration::from_secs(24 * 60 * 60),
            default_time_control: None,
        }
    }
}
