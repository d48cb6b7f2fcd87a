use grantshift_core::{AppError, AppResult};
use grantshift_domain::Password;

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Generates a random alphanumeric password.
pub fn generate_password(length: usize) -> AppResult<Password> {
    let mut bytes = vec![0u8; length];
    getrandom::fill(&mut bytes)
        .map_err(|error| AppError::Internal(format!("failed to generate password: {error}")))?;

    let value: String = bytes
        .iter()
        .map(|byte| {
            let index = (*byte as usize) % ALPHABET.len();
            ALPHABET[index] as char
        })
        .collect();

    Password::new(value)
}
