//! Error and notice response messages.

use crate::error::{Result, ServerError};
use crate::protocol::codec::read_cstr;

/// Parse ErrorResponse/NoticeResponse fields into a [`ServerError`].
///
/// The payload is a sequence of (field type byte, null-terminated value)
/// pairs ending with a zero byte.
pub fn parse_error_fields(payload: &[u8]) -> Result<ServerError> {
    let mut error = ServerError::default();
    let mut data = payload;

    while let [field_type, rest @ ..] = data {
        if *field_type == 0 {
            break;
        }
        let (value, remaining) = read_cstr(rest)?;
        error.set_field(*field_type, value);
        data = remaining;
    }

    Ok(error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fields() {
        let payload = b"SERROR\0C42P01\0Mrelation does not exist\0\0";
        let error = parse_error_fields(payload).unwrap();
        assert_eq!(error.severity(), Some("ERROR"));
        assert_eq!(error.sqlstate(), Some("42P01"));
        assert_eq!(error.message(), Some("relation does not exist"));
    }
}
