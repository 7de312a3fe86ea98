use regex::Regex;

use crate::name;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("name is empty")]
    Empty,
    #[error("name {0:?} is longer than 253 characters")]
    NameTooLong(String),
    #[error("label {0:?} is too long (max 63 characters)")]
    LabelTooLong(String),
    #[error("label {0:?} contains invalid characters (only letters, digits, '-' and '_' allowed)")]
    InvalidCharacters(String),
    #[error("label {0:?} must not start or end with '-'")]
    LeadingOrTrailingHyphen(String),
    #[error("'*' is only allowed as the leftmost label of {0:?}")]
    MisplacedWildcard(String),
    #[error("hostmaster {0:?} must use the mailbox-as-name form (hostmaster.example.com, not hostmaster@example.com)")]
    MailboxWithAt(String),
}

lazy_static::lazy_static! {
    /// Letters, digits, '-' and '_' (service labels such as `_sip`).
    static ref LABEL_RE: Regex = Regex::new(r"^[A-Za-z0-9_-]+$").unwrap();
}

pub fn validate_label(label: &str) -> Result<(), ValidationError> {
    if label.is_empty() {
        return Err(ValidationError::Empty);
    }
    if label.len() > 63 {
        return Err(ValidationError::LabelTooLong(label.to_string()));
    }
    if !LABEL_RE.is_match(label) {
        return Err(ValidationError::InvalidCharacters(label.to_string()));
    }
    if label.starts_with('-') || label.ends_with('-') {
        return Err(ValidationError::LeadingOrTrailingHyphen(label.to_string()));
    }

    Ok(())
}

/// Owner names may start with a single `*` wildcard label.
pub fn validate_owner_name(owner: &str) -> Result<(), ValidationError> {
    validate_name(owner, true)
}

/// Host names referenced from record content (NS, MX, CNAME targets).
pub fn validate_hostname(host: &str) -> Result<(), ValidationError> {
    validate_name(host, false)
}

fn validate_name(fqdn: &str, wildcard_ok: bool) -> Result<(), ValidationError> {
    let d = name::strip_root(fqdn);
    if d.is_empty() {
        return Err(ValidationError::Empty);
    }
    if d.len() > 253 {
        return Err(ValidationError::NameTooLong(d.to_string()));
    }
    for (idx, label) in d.split('.').enumerate() {
        if label == "*" {
            if wildcard_ok && idx == 0 {
                continue;
            }
            return Err(ValidationError::MisplacedWildcard(d.to_string()));
        }
        validate_label(label)?;
    }
    Ok(())
}

pub fn validate_hostmaster(mailbox: &str) -> Result<(), ValidationError> {
    if mailbox.contains('@') {
        return Err(ValidationError::MailboxWithAt(mailbox.to_string()));
    }
    validate_hostname(mailbox)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels() {
        assert!(validate_label("www").is_ok());
        assert!(validate_label("_sip").is_ok());
        assert!(validate_label("xn--bcher-kva").is_ok());
        assert_eq!(validate_label(""), Err(ValidationError::Empty));
        assert!(matches!(validate_label("-a"), Err(ValidationError::LeadingOrTrailingHyphen(_))));
        assert!(matches!(validate_label("a b"), Err(ValidationError::InvalidCharacters(_))));
        assert!(matches!(
            validate_label(&"a".repeat(64)),
            Err(ValidationError::LabelTooLong(_))
        ));
    }

    #[test]
    fn owner_names_and_wildcards() {
        assert!(validate_owner_name("*.example.com").is_ok());
        assert!(validate_owner_name("www.example.com.").is_ok());
        assert!(matches!(
            validate_owner_name("www.*.example.com"),
            Err(ValidationError::MisplacedWildcard(_))
        ));
        assert!(validate_hostname("*.example.com").is_err());
        assert_eq!(validate_hostname("."), Err(ValidationError::Empty));
    }

    #[test]
    fn hostmaster_rejects_at_sign() {
        assert!(validate_hostmaster("hostmaster.example.com").is_ok());
        assert!(matches!(
            validate_hostmaster("hostmaster@example.com"),
            Err(ValidationError::MailboxWithAt(_))
        ));
    }
}
