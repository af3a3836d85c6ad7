use lazy_static::lazy_static;
use regex::Regex;

pub const EMAIL_MAX_LEN: usize = 32;
pub const PASSWORD_MIN_LEN: usize = 6;
pub const PASSWORD_MAX_LEN: usize = 32;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    email.len() <= EMAIL_MAX_LEN && EMAIL_RE.is_match(email)
}

/// Password policy: 6..=32 chars with at least one letter, one digit and
/// one of `!@#$%^&*`.
pub(crate) fn validate_password(password: &str) -> Result<(), &'static str> {
    if password.len() < PASSWORD_MIN_LEN {
        return Err("Password must be at least 6 characters");
    }
    if password.len() > PASSWORD_MAX_LEN {
        return Err("Password must be at most 32 characters");
    }
    let has_letter = password.chars().any(|c| c.is_ascii_alphabetic());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_special = password.chars().any(|c| "!@#$%^&*".contains(c));
    if !(has_letter && has_digit && has_special) {
        return Err("Password must contain a letter, a digit and one of !@#$%^&*");
    }
    Ok(())
}

pub(crate) fn passwords_match(password: &str, repeat: &str) -> bool {
    password == repeat
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_email() {
        assert!(is_valid_email("user@example.com"));
    }

    #[test]
    fn rejects_malformed_emails() {
        assert!(!is_valid_email("not-an-email"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("a b@c.com"));
        assert!(!is_valid_email(""));
    }

    #[test]
    fn rejects_overlong_email() {
        let email = format!("{}@example.com", "x".repeat(EMAIL_MAX_LEN));
        assert!(!is_valid_email(&email));
    }

    #[test]
    fn password_policy_accepts_complex_password() {
        assert!(validate_password("abc123!x").is_ok());
    }

    #[test]
    fn password_policy_rejects_short_and_long() {
        assert!(validate_password("a1!").is_err());
        assert!(validate_password(&format!("a1!{}", "x".repeat(40))).is_err());
    }

    #[test]
    fn password_policy_requires_all_classes() {
        assert!(validate_password("onlyletters").is_err());
        assert!(validate_password("12345678").is_err());
        assert!(validate_password("letters123").is_err()); // no special
        assert!(validate_password("!@#$%^&*").is_err()); // no letter/digit
    }

    #[test]
    fn repeat_must_match() {
        assert!(passwords_match("abc123!x", "abc123!x"));
        assert!(!passwords_match("abc123!x", "abc123!y"));
    }
}
