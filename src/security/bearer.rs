use super::AuthError;

/// Pull the token out of an `Authorization` header value.
///
/// The scheme is matched case-insensitively (`Bearer`, `bearer`, ...). The
/// token must be a single non-empty word; anything after it is rejected rather
/// than silently dropped.
pub fn extract_bearer_token(header: Option<&str>) -> Result<&str, AuthError> {
    let value = header.ok_or(AuthError::MissingOrInvalidAuthHeader)?.trim();
    let (scheme, token) = value
        .split_once(' ')
        .ok_or(AuthError::MissingOrInvalidAuthHeader)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::MissingOrInvalidAuthHeader);
    }
    let token = token.trim_start();
    if token.is_empty() || token.contains(char::is_whitespace) {
        return Err(AuthError::MissingOrInvalidAuthHeader);
    }
    Ok(token)
}
