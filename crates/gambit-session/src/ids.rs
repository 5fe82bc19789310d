//! Random identifiers: room codes, match ids, guest identities.

use gambit_protocol::{Identity, RoomCode};
use rand::Rng;

/// Lowercase hex of `N` random bytes.
fn random_hex<const N: usize>() -> String {
    let bytes: [u8; N] = rand::rng().random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// A code of `length` characters drawn uniformly from `alphabet`.
/// Returns `None` if the alphabet is empty.
pub(crate) fn room_code(alphabet: &str, length: usize) -> Option<RoomCode> {
    let chars: Vec<char> = alphabet.chars().collect();
    if chars.is_empty() {
        return None;
    }
    let mut rng = rand::rng();
    let code: String = (0..length)
        .map(|_| chars[rng.random_range(0..chars.len())])
        .collect();
    Some(RoomCode::new(code))
}

/// Identifier of the durable match record.
pub(crate) fn match_id() -> String {
    random_hex::<16>()
}

/// A throwaway identity for players admitted while auth is degraded.
pub fn guest_identity() -> Identity {
    let suffix = random_hex::<8>();
    Identity {
        display_name: format!("Guest-{}", suffix[..4].to_ascii_uppercase()),
        id: format!("guest-{suffix}"),
        guest: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::UNAMBIGUOUS_ALPHABET;

    #[test]
    fn test_room_code_uses_alphabet_and_length() {
        for _ in 0..100 {
            let code = room_code(UNAMBIGUOUS_ALPHABET, 6).unwrap();
            assert_eq!(code.as_str().len(), 6);
            assert!(code.as_str().chars().all(|c| UNAMBIGUOUS_ALPHABET.contains(c)));
        }
    }

    #[test]
    fn test_room_code_empty_alphabet_returns_none() {
        assert!(room_code("", 6).is_none());
    }

    #[test]
    fn test_match_id_is_32_hex_chars() {
        let id = match_id();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_guest_identity_shape() {
        let guest = guest_identity();
        assert!(guest.guest);
        assert!(guest.id.starts_with("guest-"));
        assert!(guest.display_name.starts_with("Guest-"));
        assert_eq!(guest.display_name.len(), "Guest-".len() + 4);
    }
}
