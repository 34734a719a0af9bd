//! Random password generation for database credentials.

use thiserror::Error;

/// Characters a generated password is drawn from.
pub const CHARACTERS: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789!@#$%^&*()-_=+,.?/:;{}[]`~";

/// Length of passwords generated for new databases.
pub const DEFAULT_PASSWORD_LENGTH: usize = 48;

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("random source unavailable: {0}")]
    RandomSource(#[from] getrandom::Error),
}

/// Generate a password of `length` characters taken uniformly from
/// [`CHARACTERS`], using the operating system's CSPRNG.
pub fn generate(length: usize) -> Result<String, PasswordError> {
    // Bytes at or above `limit` would bias the modulo, so they are dropped.
    let limit = 256 - (256 % CHARACTERS.len());

    let mut password = String::with_capacity(length);
    let mut chunk = vec![0u8; length.max(16)];
    while password.len() < length {
        getrandom::getrandom(&mut chunk)?;
        for &byte in &chunk {
            let byte = usize::from(byte);
            if byte >= limit {
                continue;
            }
            password.push(char::from(CHARACTERS[byte % CHARACTERS.len()]));
            if password.len() == length {
                break;
            }
        }
    }
    Ok(password)
}
