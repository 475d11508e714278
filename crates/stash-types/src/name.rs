use crate::error::TypeError;
use crate::MAX_NAME_LEN;

/// Validate a secret name before it reaches storage or the wire.
///
/// Names are free-form UTF-8 with three restrictions: they must be
/// non-empty, must not exceed [`MAX_NAME_LEN`] bytes, and must not contain
/// a NUL byte. The NUL restriction exists because persisted keys use NUL as
/// the separator between the name and fixed-width suffixes, so a name
/// containing NUL would alias another name's key range.
pub fn validate_name(name: &str) -> Result<(), TypeError> {
    if name.is_empty() {
        return Err(TypeError::InvalidName("name is empty".into()));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(TypeError::InvalidName(format!(
            "name exceeds {} bytes",
            MAX_NAME_LEN
        )));
    }
    if name.bytes().any(|b| b == 0) {
        return Err(TypeError::InvalidName("name contains NUL byte".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_typical_names() {
        for name in ["github", "aws/prod/api-key", "a", "名前", "with spaces"] {
            assert!(validate_name(name).is_ok(), "rejected {name:?}");
        }
    }

    #[test]
    fn rejects_empty() {
        assert!(matches!(
            validate_name(""),
            Err(TypeError::InvalidName(_))
        ));
    }

    #[test]
    fn rejects_nul_byte() {
        assert!(matches!(
            validate_name("a\0b"),
            Err(TypeError::InvalidName(_))
        ));
    }

    #[test]
    fn rejects_oversized() {
        let long = "x".repeat(MAX_NAME_LEN + 1);
        assert!(matches!(
            validate_name(&long),
            Err(TypeError::InvalidName(_))
        ));
    }

    #[test]
    fn accepts_max_length() {
        let max = "x".repeat(MAX_NAME_LEN);
        assert!(validate_name(&max).is_ok());
    }
}
