//! Room code generation

use rand::Rng;

/// Alphabet without the look-alikes 0/O and 1/I
pub const ROOM_CODE_CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
pub const ROOM_CODE_LENGTH: usize = 6;
pub const MAX_ROOM_CODE_ATTEMPTS: usize = 10_000;

#[derive(Debug, thiserror::Error)]
#[error("failed to generate a unique room code after {attempts} attempts")]
pub struct RoomCodeExhausted {
    pub attempts: usize,
}

/// Draw random codes until one is not taken
pub fn generate_room_code<R, F>(rng: &mut R, is_taken: F) -> Result<String, RoomCodeExhausted>
where
    R: Rng + ?Sized,
    F: Fn(&str) -> bool,
{
    for _ in 0..MAX_ROOM_CODE_ATTEMPTS {
        let code: String = (0..ROOM_CODE_LENGTH)
            .map(|_| ROOM_CODE_CHARSET[rng.gen_range(0..ROOM_CODE_CHARSET.len())] as char)
            .collect();

        if !is_taken(&code) {
            return Ok(code);
        }
    }

    Err(RoomCodeExhausted {
        attempts: MAX_ROOM_CODE_ATTEMPTS,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::collections::HashSet;

    #[test]
    fn test_charset_excludes_ambiguous_characters() {
        for c in [b'0', b'O', b'1', b'I'] {
            assert!(!ROOM_CODE_CHARSET.contains(&c));
        }
    }

    #[test]
    fn test_code_length_and_charset() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);

        for _ in 0..200 {
            let code = generate_room_code(&mut rng, |_| false).unwrap();
            assert_eq!(code.len(), ROOM_CODE_LENGTH);
            assert!(code.bytes().all(|b| ROOM_CODE_CHARSET.contains(&b)));
        }
    }

    #[test]
    fn test_avoids_existing_codes() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let mut existing = HashSet::new();

        for _ in 0..500 {
            let code = generate_room_code(&mut rng, |c| existing.contains(c)).unwrap();
            assert!(existing.insert(code));
        }
    }

    #[test]
    fn test_fails_when_everything_is_taken() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let err = generate_room_code(&mut rng, |_| true).unwrap_err();
        assert_eq!(err.attempts, MAX_ROOM_CODE_ATTEMPTS);
    }
}
