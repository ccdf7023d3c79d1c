//! Room code generation.
//!
//! Codes are short strings over Crockford's Base32 alphabet so they can be
//! read aloud and typed without ambiguity.

use crate::domain::GameRng;

const CROCKFORD: &[u8] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ"; // no I, L, O, U

pub const ROOM_CODE_LEN: usize = 6;

/// Generate a candidate room code. Uniqueness is enforced by the store when
/// the code is bound.
pub fn generate_room_code(rng: &GameRng) -> String {
    let mut s = String::with_capacity(ROOM_CODE_LEN);
    for _ in 0..ROOM_CODE_LEN {
        let idx = rng.index(CROCKFORD.len()).unwrap_or(0);
        s.push(CROCKFORD[idx] as char);
    }
    s
}

/// Canonical form of user-typed codes: trimmed, upper-cased, with the
/// commonly confused letters mapped the Crockford way.
pub fn normalize_room_code(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|c| match c.to_ascii_uppercase() {
            'O' => '0',
            'I' | 'L' => '1',
            other => other,
        })
        .collect()
}
