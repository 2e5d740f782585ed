//! Public slug and session identifier generation.
//!
//! Slugs are alphanumeric so they stay URL-safe without percent-encoding.
//! Uniqueness is enforced by the store's UNIQUE constraint; callers retry on
//! the (vanishingly rare) collision.

use rand::distributions::Alphanumeric;
use rand::Rng;

/// Length of anonymous session identifiers
pub const SESSION_ID_LENGTH: usize = 32;

/// Generate a random alphanumeric identifier of the given length
pub fn generate(length: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

/// Generate an anonymous session identifier
pub fn generate_session_id() -> String {
    generate(SESSION_ID_LENGTH)
}
