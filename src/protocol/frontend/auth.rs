//! Password responses for the startup handshake.

use crate::protocol::codec::MessageBuilder;

/// Write a PasswordMessage carrying a cleartext password.
pub fn write_cleartext_password(buf: &mut Vec<u8>, password: &str) {
    write_password_message(buf, password);
}

/// Write a PasswordMessage answering an MD5 challenge.
///
/// The response is `md5` followed by `md5(md5(password ‖ user) ‖ salt)` in
/// lowercase hex.
pub fn write_md5_password(buf: &mut Vec<u8>, user: &str, password: &str, salt: &[u8; 4]) {
    let credentials = hex_md5(&[password.as_bytes(), user.as_bytes()]);
    let response = format!("md5{}", hex_md5(&[credentials.as_bytes(), salt]));
    write_password_message(buf, &response);
}

fn write_password_message(buf: &mut Vec<u8>, response: &str) {
    let mut msg = MessageBuilder::new(buf, super::msg_type::PASSWORD);
    msg.write_cstr(response);
    msg.finish();
}

/// Lowercase hex digest of the concatenated inputs.
fn hex_md5(parts: &[&[u8]]) -> String {
    use md5::{Digest, Md5};

    let digest = parts
        .iter()
        .fold(Md5::new(), |hasher, part| hasher.chain_update(part))
        .finalize();
    format!("{digest:x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_md5_response_shape() {
        let mut buf = Vec::new();
        write_md5_password(&mut buf, "alice", "hunter2", &[0xde, 0xad, 0xbe, 0xef]);

        assert_eq!(buf[0], b'p');
        // "md5" + 32 hex digits + terminator
        let payload = &buf[5..];
        assert_eq!(payload.len(), 36);
        assert!(payload.starts_with(b"md5"));
        assert!(payload[3..35].iter().all(u8::is_ascii_hexdigit));
        assert_eq!(payload.last(), Some(&0));
    }

    #[test]
    fn test_md5_response_depends_on_salt() {
        let mut first = Vec::new();
        let mut second = Vec::new();
        write_md5_password(&mut first, "alice", "hunter2", &[0, 0, 0, 1]);
        write_md5_password(&mut second, "alice", "hunter2", &[0, 0, 0, 2]);
        assert_ne!(first, second);
    }

    #[test]
    fn test_cleartext_framing() {
        let mut buf = Vec::new();
        write_cleartext_password(&mut buf, "open sesame");

        let len = i32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]) as usize;
        assert_eq!(len, buf.len() - 1);
        assert_eq!(&buf[5..], b"open sesame\0");
    }

    #[test]
    fn test_hex_md5_is_concatenation() {
        assert_eq!(hex_md5(&[b"ab", b"cd"]), hex_md5(&[b"abcd"]));
        assert_eq!(hex_md5(&[b""]).len(), 32);
    }
}
