//! Password challenge-response.
//!
//! The device hands out a 4-byte challenge, an 8-byte salt and an iteration
//! count. The host runs a SHA-512 chain over the password:
//!
//! 1. The password is copied into a 68-byte buffer (C-string semantics,
//!    zero padded, truncated at 68).
//! 2. Each round hashes `counter (u32 LE) || salt || buffer[..64]` and stores
//!    the digest in `buffer[..64]`.
//! 3. After the round whose counter is `iterations - 1`, the buffer becomes
//!    `challenge || digest` and the counter restarts at 0, so a second pass of
//!    `iterations` rounds runs over the spliced buffer. The splice happens once.
//!    A count of zero or below runs one round and never splices.
//! 4. The SendPassword payload is the tag `00 00 40 00` followed by
//!    `buffer[..64]`.

use std::fmt;

use byteorder::{ByteOrder, LittleEndian};
use sha2::{Digest, Sha512};

use crate::protocol::{
    CHALLENGE_LEN, CHALLENGE_OFFSET, ITERATIONS_OFFSET, PASSWORD_INFO_MIN_LEN,
    PASSWORD_RESPONSE_LEN, PASSWORD_RESPONSE_TAG, ProtocolError, SALT_LEN, SALT_OFFSET,
};

const DIGEST_LEN: usize = 64;

/// Material for one password exchange. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChallengeMaterial {
    pub challenge: [u8; CHALLENGE_LEN],
    pub salt: [u8; SALT_LEN],
    /// Signed on the wire; a negative count runs a single round.
    pub iterations: i32,
}

impl ChallengeMaterial {
    /// Extract the fixed-offset fields from a GetPasswordInfo payload.
    pub fn from_payload(payload: &[u8]) -> Result<Self, ProtocolError> {
        if payload.len() < PASSWORD_INFO_MIN_LEN {
            return Err(ProtocolError::Truncated {
                what: "password info",
                expected: PASSWORD_INFO_MIN_LEN,
                actual: payload.len(),
            });
        }
        let mut challenge = [0u8; CHALLENGE_LEN];
        challenge.copy_from_slice(&payload[CHALLENGE_OFFSET..CHALLENGE_OFFSET + CHALLENGE_LEN]);
        let mut salt = [0u8; SALT_LEN];
        salt.copy_from_slice(&payload[SALT_OFFSET..SALT_OFFSET + SALT_LEN]);
        let iterations = LittleEndian::read_i32(&payload[ITERATIONS_OFFSET..ITERATIONS_OFFSET + 4]);

        Ok(Self {
            challenge,
            salt,
            iterations,
        })
    }
}

/// What the device said about its password.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordInfo {
    /// Empty reply: no password set, nothing to prove.
    NotSet,
    Challenge(ChallengeMaterial),
}

/// Result of a full authentication attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    /// Device has no password; no hashing was done.
    NotRequired,
    Accepted,
    Rejected,
    /// Reply was ambiguous.
    Unknown,
}

impl AuthOutcome {
    /// The device will honour privileged commands.
    pub fn is_satisfied(self) -> bool {
        matches!(self, AuthOutcome::NotRequired | AuthOutcome::Accepted)
    }
}

impl fmt::Display for AuthOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthOutcome::NotRequired => write!(f, "no password set"),
            AuthOutcome::Accepted => write!(f, "password accepted"),
            AuthOutcome::Rejected => write!(f, "wrong password"),
            AuthOutcome::Unknown => write!(f, "unknown"),
        }
    }
}

/// Derive the 68-byte SendPassword payload.
pub fn compute_response(
    password: &[u8],
    material: &ChallengeMaterial,
) -> [u8; PASSWORD_RESPONSE_LEN] {
    let mut hashed = [0u8; PASSWORD_RESPONSE_LEN];
    let password = password.split(|&b| b == 0).next().unwrap_or_default();
    let len = password.len().min(PASSWORD_RESPONSE_LEN);
    hashed[..len].copy_from_slice(&password[..len]);

    let iterations = i64::from(material.iterations);
    let mut count: i64 = 0;
    let mut spliced = false;

    // Runs at least once, even for zero iterations.
    loop {
        hash_round(&mut hashed, count as u32, &material.salt);

        if !spliced && count == iterations - 1 {
            spliced = true;
            count = -1;
            let mut next = [0u8; PASSWORD_RESPONSE_LEN];
            next[..CHALLENGE_LEN].copy_from_slice(&material.challenge);
            next[CHALLENGE_LEN..].copy_from_slice(&hashed[..DIGEST_LEN]);
            hashed = next;
        }

        count += 1;
        if count >= iterations {
            break;
        }
    }

    let mut response = [0u8; PASSWORD_RESPONSE_LEN];
    response[..PASSWORD_RESPONSE_TAG.len()].copy_from_slice(&PASSWORD_RESPONSE_TAG);
    response[PASSWORD_RESPONSE_TAG.len()..].copy_from_slice(&hashed[..DIGEST_LEN]);
    response
}

fn hash_round(hashed: &mut [u8; PASSWORD_RESPONSE_LEN], counter: u32, salt: &[u8; SALT_LEN]) {
    let mut hasher = Sha512::new();
    hasher.update(counter.to_le_bytes());
    hasher.update(salt);
    hasher.update(&hashed[..DIGEST_LEN]);
    hashed[..DIGEST_LEN].copy_from_slice(&hasher.finalize());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn material(iterations: i32) -> ChallengeMaterial {
        ChallengeMaterial {
            challenge: [0xDE, 0xAD, 0xBE, 0xEF],
            salt: [1, 2, 3, 4, 5, 6, 7, 8],
            iterations,
        }
    }

    fn sha512(parts: &[&[u8]]) -> [u8; 64] {
        let mut hasher = Sha512::new();
        for p in parts {
            hasher.update(p);
        }
        let mut out = [0u8; 64];
        out.copy_from_slice(&hasher.finalize());
        out
    }

    #[test]
    fn test_deterministic() {
        let m = material(10);
        let a = compute_response(b"password123", &m);
        let b = compute_response(b"password123", &m);
        assert_eq!(a, b);
        assert_eq!(&a[..4], &PASSWORD_RESPONSE_TAG);
    }

    #[test]
    fn test_single_byte_changes_propagate() {
        let base = compute_response(b"password123", &material(10));

        assert_ne!(base, compute_response(b"password124", &material(10)));

        let mut m = material(10);
        m.salt[7] ^= 1;
        assert_ne!(base, compute_response(b"password123", &m));

        let mut m = material(10);
        m.challenge[0] ^= 1;
        assert_ne!(base, compute_response(b"password123", &m));

        assert_ne!(base, compute_response(b"password123", &material(11)));
    }

    #[test]
    fn test_single_iteration_chain() {
        let m = material(1);
        let mut pw = [0u8; 68];
        pw[..11].copy_from_slice(b"password123");

        // Round 0, then the splice, then the second pass (counter back at 0).
        let h1 = sha512(&[&0u32.to_le_bytes(), &m.salt, &pw[..64]]);
        let mut spliced = [0u8; 68];
        spliced[..4].copy_from_slice(&m.challenge);
        spliced[4..].copy_from_slice(&h1);
        let h2 = sha512(&[&0u32.to_le_bytes(), &m.salt, &spliced[..64]]);

        let response = compute_response(b"password123", &m);
        assert_eq!(&response[..4], &[0x00, 0x00, 0x40, 0x00]);
        assert_eq!(&response[4..], &h2[..]);
    }

    #[test]
    fn test_zero_iterations_single_round_no_splice() {
        let m = material(0);
        let mut pw = [0u8; 68];
        pw[..3].copy_from_slice(b"abc");
        let h = sha512(&[&0u32.to_le_bytes(), &m.salt, &pw[..64]]);

        let response = compute_response(b"abc", &m);
        assert_eq!(&response[4..], &h[..]);

        // Without a splice the challenge cannot matter.
        let mut other = m;
        other.challenge = [0; 4];
        assert_eq!(response, compute_response(b"abc", &other));
    }

    #[test]
    fn test_negative_iterations_single_round_no_splice() {
        let mut payload = vec![0u8; 24];
        payload[4..8].copy_from_slice(&[0xA1, 0xA2, 0xA3, 0xA4]);
        payload[12..20].copy_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
        payload[20..24].copy_from_slice(&0x8000_0000u32.to_le_bytes());
        let m = ChallengeMaterial::from_payload(&payload).unwrap();
        assert_eq!(m.iterations, i32::MIN);

        let mut pw = [0u8; 68];
        pw[..3].copy_from_slice(b"abc");
        let h = sha512(&[&0u32.to_le_bytes(), &m.salt, &pw[..64]]);

        let response = compute_response(b"abc", &m);
        assert_eq!(&response[4..], &h[..]);
        assert_eq!(response, compute_response(b"abc", &material(-1)));
    }

    #[test]
    fn test_long_password_truncated_at_68() {
        let m = material(3);
        let long = [b'x'; 100];
        assert_eq!(
            compute_response(&long, &m),
            compute_response(&long[..68], &m)
        );
    }

    #[test]
    fn test_password_stops_at_nul() {
        let m = material(3);
        assert_eq!(
            compute_response(b"secret\0ignored", &m),
            compute_response(b"secret", &m)
        );
    }

    #[test]
    fn test_challenge_material_offsets() {
        let mut payload = vec![0u8; 24];
        payload[4..8].copy_from_slice(&[0xA1, 0xA2, 0xA3, 0xA4]);
        payload[12..20].copy_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
        payload[20..24].copy_from_slice(&1000u32.to_le_bytes());

        let m = ChallengeMaterial::from_payload(&payload).unwrap();
        assert_eq!(m.challenge, [0xA1, 0xA2, 0xA3, 0xA4]);
        assert_eq!(m.salt, [1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(m.iterations, 1000);
    }

    #[test]
    fn test_challenge_material_truncated() {
        assert!(matches!(
            ChallengeMaterial::from_payload(&[0u8; 23]),
            Err(ProtocolError::Truncated {
                expected: 24,
                actual: 23,
                ..
            })
        ));
    }
}
