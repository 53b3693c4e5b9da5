use rand::{thread_rng, Rng};

/// Characters a session code may contain. `0`, `O`, `1`, and `I` are left
/// out because they are easy to misread when a code is shared by voice or
/// handwriting.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Length of a session code.
pub const CODE_LENGTH: usize = 6;

/// Generates a random session code. Uniqueness against live sessions is the
/// registry's concern, not the generator's.
pub fn generate_code() -> String {
    let mut rng = thread_rng();

    std::iter::repeat(())
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .take(CODE_LENGTH)
        .collect()
}

/// Normalizes a user-entered code for lookup. Codes are case-insensitive.
pub fn normalize_code(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}
