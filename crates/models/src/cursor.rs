//! Opaque continuation tokens for paginated article listings.
//!
//! A token is the sort values of the last hit of a page, as a JSON array
//! encoded with URL-safe base64.

use failure::Fail;
use newsdesk_error::ApiError;
use newsdesk_macros::From;
use serde_json::Value;

/// Token requesting the first page.
pub const FIRST_PAGE: &str = "*";

/// Encode sort values of the last hit on a page.
pub fn encode(sort: &[Value]) -> Result<String, EncodeCursorError> {
    if sort.is_empty() {
        return Err(EncodeCursorError::Empty);
    }

    let json = serde_json::to_vec(sort)?;
    Ok(base64::encode_config(&json, base64::URL_SAFE))
}

/// Decode a token produced by [`encode`].
///
/// Returns `None` for tokens requesting the first page.
pub fn decode(token: &str) -> Result<Option<Vec<Value>>, DecodeCursorError> {
    if token.is_empty() || token == FIRST_PAGE {
        return Ok(None);
    }

    let json = base64::decode_config(token, base64::URL_SAFE)?;
    let sort = serde_json::from_slice::<Vec<Value>>(&json)?;

    if sort.is_empty() {
        return Err(DecodeCursorError::Empty);
    }

    Ok(Some(sort))
}

#[derive(ApiError, Debug, Fail, From)]
pub enum EncodeCursorError {
    #[api(internal)]
    #[fail(display = "cannot create a cursor without sort values")]
    Empty,
    #[api(internal)]
    #[fail(display = "cannot encode cursor: {}", _0)]
    Json(#[cause] #[from] serde_json::Error),
}

#[derive(ApiError, Debug, Fail, From)]
pub enum DecodeCursorError {
    #[api(code = "cursor:invalid", status = "BAD_REQUEST")]
    #[fail(display = "malformed cursor: {}", _0)]
    Base64(#[cause] #[from] base64::DecodeError),
    #[api(code = "cursor:invalid", status = "BAD_REQUEST")]
    #[fail(display = "malformed cursor: {}", _0)]
    Json(#[cause] #[from] serde_json::Error),
    #[api(code = "cursor:invalid", status = "BAD_REQUEST")]
    #[fail(display = "malformed cursor: no sort values")]
    Empty,
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use super::*;

    #[test]
    fn round_trip() {
        let sort = vec![json!(1565000000123i64), json!("newsdesk-draft"), json!("x:1")];
        let token = encode(&sort).unwrap();
        assert!(!token.contains('+') && !token.contains('/'));
        assert_eq!(decode(&token).unwrap(), Some(sort));
    }

    #[test]
    fn first_page_tokens() {
        assert_eq!(decode("*").unwrap(), None);
        assert_eq!(decode("").unwrap(), None);
    }

    #[test]
    fn empty_sort_values_cannot_be_encoded() {
        match encode(&[]) {
            Err(EncodeCursorError::Empty) => (),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn garbage_is_a_bad_request() {
        let not_json = base64::encode_config(b"{nope", base64::URL_SAFE);
        let not_array = base64::encode_config(b"{}", base64::URL_SAFE);
        let empty_array = base64::encode_config(b"[]", base64::URL_SAFE);

        let tokens = [
            "%%%",
            "not base64!",
            not_json.as_str(),
            not_array.as_str(),
            empty_array.as_str(),
        ];

        for token in &tokens {
            let err = decode(token).unwrap_err();
            assert_eq!(err.status(), newsdesk_error::StatusCode::BAD_REQUEST);
        }
    }
}
