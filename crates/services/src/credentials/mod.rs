//! Random credential generation for storefront admin accounts.

use rand::seq::SliceRandom;
use rand::Rng;
use std::fmt;

const LOWERCASE: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const UPPERCASE: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DIGITS: &[u8] = b"0123456789";
/// Special characters accepted by the storefront admin login form
pub const SPECIAL_CHARACTERS: &[u8] = b",.!?@#$%&*-_=+/-";

pub const DEFAULT_PASSWORD_LENGTH: usize = 12;
pub const MIN_PASSWORD_LENGTH: usize = 4;

#[derive(Debug, PartialEq, Eq)]
pub enum CredentialError {
    /// Requested length cannot hold one character of each required class
    LengthTooShort { requested: usize, minimum: usize },
}

impl fmt::Display for CredentialError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LengthTooShort { requested, minimum } => write!(
                f,
                "Password length {} is below the minimum of {}",
                requested, minimum
            ),
        }
    }
}

impl std::error::Error for CredentialError {}

/// Generate a random password of `length` characters containing at least one
/// lowercase letter, one uppercase letter, one digit, and one special
/// character, with the remainder drawn from the union of all four classes.
pub fn generate_password(length: usize) -> Result<String, CredentialError> {
    if length < MIN_PASSWORD_LENGTH {
        return Err(CredentialError::LengthTooShort {
            requested: length,
            minimum: MIN_PASSWORD_LENGTH,
        });
    }

    let mut rng = rand::rng();

    let mut chars: Vec<u8> = vec![
        LOWERCASE[rng.random_range(0..LOWERCASE.len())],
        UPPERCASE[rng.random_range(0..UPPERCASE.len())],
        DIGITS[rng.random_range(0..DIGITS.len())],
        SPECIAL_CHARACTERS[rng.random_range(0..SPECIAL_CHARACTERS.len())],
    ];

    let alphabet: Vec<u8> = [LOWERCASE, UPPERCASE, DIGITS, SPECIAL_CHARACTERS].concat();
    for _ in chars.len()..length {
        chars.push(alphabet[rng.random_range(0..alphabet.len())]);
    }

    // Shuffle so the class-guaranteeing characters are not in a fixed prefix
    chars.shuffle(&mut rng);

    Ok(String::from_utf8_lossy(&chars).into_owned())
}

/// Check a candidate password against the storefront policy: 8 to 16
/// characters, one of each class, nothing outside the allowed alphabet.
pub fn validate_password(candidate: &str) -> bool {
    let len = candidate.chars().count();
    if !(8..=16).contains(&len) {
        return false;
    }

    let mut has_lower = false;
    let mut has_upper = false;
    let mut has_digit = false;
    let mut has_special = false;

    for c in candidate.chars() {
        if c.is_ascii_lowercase() {
            has_lower = true;
        } else if c.is_ascii_uppercase() {
            has_upper = true;
        } else if c.is_ascii_digit() {
            has_digit = true;
        } else if c.is_ascii() && SPECIAL_CHARACTERS.contains(&(c as u8)) {
            has_special = true;
        } else {
            return false;
        }
    }

    has_lower && has_upper && has_digit && has_special
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_password_has_requested_length() {
        for length in [4, 8, 12, 16, 32] {
            let password = generate_password(length).expect("should generate");
            assert_eq!(password.len(), length);
        }
    }

    #[test]
    fn test_generated_password_contains_all_classes() {
        for _ in 0..100 {
            let password = generate_password(DEFAULT_PASSWORD_LENGTH).expect("should generate");
            assert!(
                password.bytes().any(|b| b.is_ascii_lowercase()),
                "missing lowercase in {:?}",
                password
            );
            assert!(
                password.bytes().any(|b| b.is_ascii_uppercase()),
                "missing uppercase in {:?}",
                password
            );
            assert!(
                password.bytes().any(|b| b.is_ascii_digit()),
                "missing digit in {:?}",
                password
            );
            assert!(
                password.bytes().any(|b| SPECIAL_CHARACTERS.contains(&b)),
                "missing special character in {:?}",
                password
            );
        }
    }

    #[test]
    fn test_generated_password_stays_inside_alphabet() {
        let alphabet: Vec<u8> = [LOWERCASE, UPPERCASE, DIGITS, SPECIAL_CHARACTERS].concat();
        for _ in 0..100 {
            let password = generate_password(20).expect("should generate");
            for b in password.bytes() {
                assert!(alphabet.contains(&b), "unexpected character in {:?}", password);
            }
        }
    }

    #[test]
    fn test_minimum_length_password_still_has_all_classes() {
        for _ in 0..100 {
            let password = generate_password(MIN_PASSWORD_LENGTH).expect("should generate");
            assert_eq!(password.len(), 4);
            assert!(password.bytes().any(|b| b.is_ascii_lowercase()));
            assert!(password.bytes().any(|b| b.is_ascii_uppercase()));
            assert!(password.bytes().any(|b| b.is_ascii_digit()));
            assert!(password.bytes().any(|b| SPECIAL_CHARACTERS.contains(&b)));
        }
    }

    #[test]
    fn test_below_minimum_length_is_an_error() {
        let err = generate_password(3).expect_err("should reject");
        assert_eq!(
            err,
            CredentialError::LengthTooShort {
                requested: 3,
                minimum: 4
            }
        );
    }

    #[test]
    fn test_validator_accepts_generated_passwords_in_range() {
        for length in 8..=16 {
            let password = generate_password(length).expect("should generate");
            assert!(validate_password(&password), "rejected {:?}", password);
        }
    }

    #[test]
    fn test_validator_rejects_out_of_range_lengths() {
        assert!(!validate_password("aB1!xyz")); // 7 chars
        assert!(!validate_password("aB1!aB1!aB1!aB1!a")); // 17 chars
    }

    #[test]
    fn test_validator_rejects_missing_classes() {
        assert!(!validate_password("abcdefgh1!")); // no uppercase
        assert!(!validate_password("ABCDEFGH1!")); // no lowercase
        assert!(!validate_password("Abcdefgh!!")); // no digit
        assert!(!validate_password("Abcdefgh12")); // no special
    }

    #[test]
    fn test_validator_rejects_characters_outside_alphabet() {
        assert!(!validate_password("Abcdef1! ")); // space
        assert!(!validate_password("Abcdef1!~")); // ~ not in the special set
        assert!(!validate_password("Abcdef1!ç")); // non-ASCII
    }
}
