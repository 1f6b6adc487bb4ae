//! Credential and name generation
//!
//! Passwords come from the operating system CSPRNG. Session name suffixes
//! are not secret and use the thread-local generator.

use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::Rng;

use crate::crd::Credentials;

/// Username of the portal administrator
pub const ADMIN_USERNAME: &str = "eduk8s";

/// Length of generated administrator passwords
pub const ADMIN_PASSWORD_LENGTH: usize = 32;

/// Length of generated session passwords
pub const SESSION_PASSWORD_LENGTH: usize = 16;

/// Length of the random suffix on session names
pub const SESSION_SUFFIX_LENGTH: usize = 8;

const NAME_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Generate a password of `length` letters and digits
pub fn generate_password(length: usize) -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

/// Fresh administrator credentials for a new portal
pub fn admin_credentials() -> Credentials {
    Credentials {
        username: ADMIN_USERNAME.to_string(),
        password: generate_password(ADMIN_PASSWORD_LENGTH),
    }
}

/// Fresh login for a session workload
pub fn session_credentials() -> Credentials {
    Credentials {
        username: ADMIN_USERNAME.to_string(),
        password: generate_password(SESSION_PASSWORD_LENGTH),
    }
}

/// Random lowercase suffix safe for use in object names
pub fn name_suffix(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| NAME_CHARSET[rng.gen_range(0..NAME_CHARSET.len())] as char)
        .collect()
}
