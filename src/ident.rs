//! Opaque unique identifiers for trip entities.

use uuid::Uuid;

/// Returns a fresh opaque id.
///
/// Ids are random UUIDs, so they never collide across sessions; documents
/// exported from one session and imported into another keep distinct
/// entity identities.
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for _ in 0..10_000 {
            assert!(seen.insert(generate_id()));
        }
    }

    #[test]
    fn test_id_is_nonempty_and_opaque() {
        let id = generate_id();
        assert!(!id.is_empty());
        assert!(id.contains('-'));
    }
}
