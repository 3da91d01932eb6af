//! Domain name normalisation.

use thiserror::Error;

/// Errors that can occur when normalising a domain name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("domain is empty")]
    Empty,
    #[error("invalid domain '{0}': {1}")]
    Invalid(String, url::ParseError),
}

/// Normalises a domain: IDNA to ASCII, lowercase, one trailing dot removed.
///
/// IP literals are accepted and returned in canonical form.
pub fn normalize_domain(raw: &str) -> Result<String, DomainError> {
    let trimmed = raw.strip_suffix('.').unwrap_or(raw);
    if trimmed.is_empty() {
        return Err(DomainError::Empty);
    }
    let host =
        url::Host::parse(trimmed).map_err(|e| DomainError::Invalid(raw.to_string(), e))?;
    Ok(host.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_ascii() {
        assert_eq!(normalize_domain("Example.COM").unwrap(), "example.com");
    }

    #[test]
    fn strips_one_trailing_dot() {
        assert_eq!(normalize_domain("example.com.").unwrap(), "example.com");
    }

    #[test]
    fn converts_internationalized_names() {
        assert_eq!(
            normalize_domain("Bücher.example").unwrap(),
            "xn--bcher-kva.example"
        );
    }

    #[test]
    fn rejects_empty() {
        assert_eq!(normalize_domain(""), Err(DomainError::Empty));
        assert_eq!(normalize_domain("."), Err(DomainError::Empty));
    }

    #[test]
    fn rejects_forbidden_characters() {
        assert!(matches!(
            normalize_domain("exa mple.com"),
            Err(DomainError::Invalid(..))
        ));
        assert!(matches!(
            normalize_domain("user@example.com"),
            Err(DomainError::Invalid(..))
        ));
    }
}
