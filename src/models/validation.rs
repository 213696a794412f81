use crate::error::ValidationError;

pub fn validate_email(address: &str) -> Result<(), ValidationError> {
    if address.is_empty() {
        return Err(ValidationError::Invalid(
            "Email address cannot be empty".to_string(),
        ));
    }

    if address.len() > 254 {
        return Err(ValidationError::Invalid(
            "Email address too long (maximum 254 characters)".to_string(),
        ));
    }

    if address.chars().any(char::is_whitespace) {
        return Err(ValidationError::Invalid(
            "Email address contains whitespace".to_string(),
        ));
    }

    let Some((local, domain)) = address.split_once('@') else {
        return Err(ValidationError::Invalid(format!(
            "{:?} is not a valid email address",
            address
        )));
    };

    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return Err(ValidationError::Invalid(format!(
            "{:?} is not a valid email address",
            address
        )));
    }

    Ok(())
}
