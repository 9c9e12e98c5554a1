//! Message identifier generation.

use rand::distr::Alphanumeric;
use rand::Rng;

/// Length of generated message identifiers
pub const MSG_ID_LEN: usize = 10;

/// Generate a random identifier of [`MSG_ID_LEN`] ASCII alphanumerics
pub fn random_id() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(MSG_ID_LEN)
        .map(char::from)
        .collect()
}
