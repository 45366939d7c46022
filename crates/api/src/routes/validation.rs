//! Input validation shared by the form-backed endpoints

/// Loose structural email check: `local@domain.tld`, no whitespace
pub fn is_valid_email(email: &str) -> bool {
    let email = email.trim();
    if email.is_empty() || email.len() > 254 || email.chars().any(char::is_whitespace) {
        return false;
    }

    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }

    let labels: Vec<&str> = domain.split('.').collect();
    labels.len() >= 2 && labels.iter().all(|l| !l.is_empty())
}

/// Lowercased, trimmed email used for lookups and storage
pub fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

pub fn require_email(field: &str, value: &str) -> Result<(), String> {
    if is_valid_email(value) {
        Ok(())
    } else {
        Err(format!("Please enter a valid {}", field))
    }
}

pub fn require_non_empty(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        Err(format!("{} is required", field))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_emails() {
        assert!(is_valid_email("ops@knightcall.ai"));
        assert!(is_valid_email("first.last+tag@sub.example.co.uk"));
        assert!(is_valid_email("  padded@example.com "));
    }

    #[test]
    fn test_invalid_emails() {
        assert!(!is_valid_email(""));
        assert!(!is_valid_email("plainaddress"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("user@"));
        assert!(!is_valid_email("user@localhost"));
        assert!(!is_valid_email("user@exa mple.com"));
        assert!(!is_valid_email("a@b@c.com"));
        assert!(!is_valid_email("user@example..com"));
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email(" Ops@KnightCall.AI "), "ops@knightcall.ai");
    }

    #[test]
    fn test_require_helpers() {
        assert!(require_email("admin email", "bad").is_err());
        assert!(require_non_empty("First name", "  ").is_err());
        assert!(require_non_empty("First name", "Ada").is_ok());
    }
}
