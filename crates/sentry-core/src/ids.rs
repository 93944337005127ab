use rand::RngCore;

/// A fresh 32-hex-character event id, used when an SDK payload omits `event_id`.
pub fn generate_event_id() -> String {
    generate_hex(16)
}

/// A DSN public key, grounded on the same `rand` + `hex` recipe the teacher uses to
/// mint project DSN keys.
pub fn generate_public_key() -> String {
    generate_hex(16)
}

fn generate_hex(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    hex::encode(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_id_is_32_hex_chars() {
        let id = generate_event_id();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn ids_are_not_constant() {
        assert_ne!(generate_event_id(), generate_event_id());
    }
}
