use rand::Rng;

use crate::error::AppError;

pub const CODE_LENGTH: usize = 4;

/// Fresh one-time completion code, `CODE_LENGTH` decimal digits.
pub fn generate_code() -> String {
    let mut rng = rand::rng();
    (0..CODE_LENGTH)
        .map(|_| char::from(b'0' + rng.random_range(0..10u8)))
        .collect()
}

/// Rejects anything that is not exactly `CODE_LENGTH` ASCII digits.
pub fn validate_format(code: &str) -> Result<(), AppError> {
    if code.len() != CODE_LENGTH || !code.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AppError::InvalidInput(format!(
            "completion code must be {CODE_LENGTH} digits"
        )));
    }
    Ok(())
}

pub fn check(submitted: &str, stored: Option<&str>) -> Result<(), AppError> {
    validate_format(submitted)?;
    match stored {
        Some(expected) if expected == submitted => Ok(()),
        Some(_) => Err(AppError::CodeMismatch),
        None => Err(AppError::Internal(
            "request has no completion code".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::{check, generate_code, validate_format, CODE_LENGTH};
    use crate::error::AppError;

    #[test]
    fn generated_codes_are_well_formed() {
        for _ in 0..200 {
            let code = generate_code();
            assert_eq!(code.len(), CODE_LENGTH);
            assert!(validate_format(&code).is_ok());
        }
    }

    #[test]
    fn malformed_codes_are_invalid_input() {
        for bad in ["123", "12345", "12a4", "", " 123", "１２３４"] {
            assert!(matches!(validate_format(bad), Err(AppError::InvalidInput(_))), "{bad:?}");
        }
    }

    #[test]
    fn format_is_checked_before_the_stored_code() {
        assert!(matches!(check("12", None), Err(AppError::InvalidInput(_))));
        assert!(matches!(check("4821", Some("4821")), Ok(())));
        assert!(matches!(check("4822", Some("4821")), Err(AppError::CodeMismatch)));
    }
}
