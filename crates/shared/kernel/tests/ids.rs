use lithium_kernel::{SAFE_ALPHABET, safe_nanoid};
use std::collections::HashSet;

#[test]
fn ids_avoid_ambiguous_characters() {
    for id in (0..64).map(|_| safe_nanoid!()) {
        assert_eq!(id.chars().count(), 12);
        assert!(id.chars().all(|c| SAFE_ALPHABET.contains(&c)), "{id}");
        assert!(!id.contains(['0', 'O', '1', 'I', 'l']), "{id}");
    }
}

#[test]
fn ids_do_not_repeat() {
    let ids: HashSet<String> = (0..1_000).map(|_| safe_nanoid!(16)).collect();
    assert_eq!(ids.len(), 1_000);
    assert!(ids.iter().all(|id| id.len() == 16));
}
