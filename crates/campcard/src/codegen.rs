//! Random code generation.
//!
//! All codes come from one process-wide generator seeded from the OS entropy
//! source on first use. The generator sits behind a mutex so concurrent
//! callers never share or reseed state.

use std::sync::{LazyLock, Mutex};

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{Rng, RngCore, SeedableRng, rngs::StdRng};

static RNG: LazyLock<Mutex<StdRng>> = LazyLock::new(|| Mutex::new(StdRng::from_os_rng()));

fn with_rng<T>(f: impl FnOnce(&mut StdRng) -> T) -> T {
    // Poisoning leaves the generator state intact.
    let mut rng = RNG.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    f(&mut rng)
}

/// Generate a code of exactly `length` uppercase URL-safe characters.
pub fn new_code(length: usize) -> String {
    // base64 yields 4 characters per 3 bytes
    let mut bytes = vec![0u8; length.div_ceil(4) * 3];
    with_rng(|rng| rng.fill_bytes(&mut bytes));

    let mut code = URL_SAFE_NO_PAD.encode(&bytes).to_ascii_uppercase();
    code.truncate(length);
    code
}

/// Generate `count` random decimal digits.
pub fn new_digits(count: usize) -> String {
    with_rng(|rng| {
        (0..count)
            .map(|_| char::from(b'0' + rng.random_range(0..10u8)))
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn code_has_requested_length() {
        for length in [1, 5, 12, 16, 33] {
            assert_eq!(new_code(length).len(), length);
        }
    }

    #[test]
    fn code_is_uppercase_url_safe() {
        for _ in 0..200 {
            let code = new_code(12);
            assert!(
                code.chars()
                    .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '-' || c == '_'),
                "unexpected character in {}",
                code
            );
            assert!(!code.contains('='));
        }
    }

    #[test]
    fn codes_do_not_repeat() {
        let codes: HashSet<String> = (0..1000).map(|_| new_code(12)).collect();
        assert_eq!(codes.len(), 1000);
    }

    #[test]
    fn digits_are_numeric() {
        let digits = new_digits(12);
        assert_eq!(digits.len(), 12);
        assert!(digits.bytes().all(|b| b.is_ascii_digit()));
    }

    #[test]
    fn generator_is_shared_across_threads() {
        let handles: Vec<_> = (0..8)
            .map(|_| std::thread::spawn(|| (0..100).map(|_| new_code(12)).collect::<Vec<_>>()))
            .collect();

        let mut all = HashSet::new();
        for handle in handles {
            all.extend(handle.join().unwrap());
        }
        assert_eq!(all.len(), 800);
    }
}
