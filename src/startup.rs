//! Connection startup and authentication state machine.
//!
//! Sans-I/O: the connection feeds one backend message at a time and flushes
//! whatever the machine writes into the output buffer. Cleartext and MD5
//! password authentication are negotiated; SASL and the other variants are
//! rejected.

use crate::error::{Error, Result};
use crate::opts::Opts;
use crate::protocol::backend::{
    is_async_type, msg_type, parse_error_fields, AuthenticationMessage, BackendKeyData,
    ParameterStatus,
};
use crate::protocol::frontend::{write_cleartext_password, write_md5_password, write_startup};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StartupState {
    AwaitingAuth,
    AwaitingReady,
    Ready,
}

/// Outcome of feeding one message to the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StartupStep {
    /// More messages are needed.
    Continue,
    /// The server reported ReadyForQuery; the connection is usable.
    Done,
}

/// Handshake state machine.
pub(crate) struct Startup<'a> {
    opts: &'a Opts,
    state: StartupState,
    backend_pid: u32,
    server_params: Vec<(String, String)>,
}

impl<'a> Startup<'a> {
    pub fn new(opts: &'a Opts) -> Self {
        Self {
            opts,
            state: StartupState::AwaitingAuth,
            backend_pid: 0,
            server_params: Vec::new(),
        }
    }

    /// Queue the StartupMessage.
    pub fn start(&mut self, out: &mut Vec<u8>) {
        let mut params: Vec<(&str, &str)> =
            vec![("user", &self.opts.user), ("client_encoding", "UTF8")];

        if let Some(ref database) = self.opts.database {
            params.push(("database", database));
        }
        if let Some(ref application_name) = self.opts.application_name {
            params.push(("application_name", application_name));
        }
        for (name, value) in &self.opts.params {
            params.push((name, value));
        }

        write_startup(out, &params);
    }

    /// Process one backend message, possibly queueing a response.
    pub fn on_message(&mut self, type_byte: u8, payload: &[u8], out: &mut Vec<u8>) -> Result<StartupStep> {
        // Notices and parameter updates can arrive at any point.
        if is_async_type(type_byte) {
            if type_byte == msg_type::PARAMETER_STATUS {
                let param = ParameterStatus::parse(payload)?;
                self.server_params
                    .push((param.name.to_string(), param.value.to_string()));
            }
            return Ok(StartupStep::Continue);
        }

        if type_byte == msg_type::ERROR_RESPONSE {
            let fields = parse_error_fields(payload)?;
            return Err(Error::Server(fields));
        }

        match self.state {
            StartupState::AwaitingAuth => self.handle_auth(type_byte, payload, out),
            StartupState::AwaitingReady => self.handle_ready(type_byte, payload),
            StartupState::Ready => Err(Error::Protocol(
                "message after handshake completion".into(),
            )),
        }
    }

    /// Backend process ID, for diagnostics.
    pub fn backend_pid(&self) -> u32 {
        self.backend_pid
    }

    /// Server parameters announced during startup.
    pub fn take_server_params(&mut self) -> Vec<(String, String)> {
        std::mem::take(&mut self.server_params)
    }

    fn handle_auth(&mut self, type_byte: u8, payload: &[u8], out: &mut Vec<u8>) -> Result<StartupStep> {
        if type_byte != msg_type::AUTHENTICATION {
            return Err(Error::Protocol(format!(
                "expected Authentication message, got '{}'",
                type_byte as char
            )));
        }

        match AuthenticationMessage::parse(payload)? {
            AuthenticationMessage::Ok => {
                self.state = StartupState::AwaitingReady;
                Ok(StartupStep::Continue)
            }
            AuthenticationMessage::CleartextPassword => {
                write_cleartext_password(out, self.password()?);
                Ok(StartupStep::Continue)
            }
            AuthenticationMessage::Md5Password { salt } => {
                write_md5_password(out, &self.opts.user, self.password()?, &salt);
                Ok(StartupStep::Continue)
            }
            AuthenticationMessage::Sasl { mechanisms } => Err(Error::Unsupported(format!(
                "SASL authentication is not negotiated (server offers {:?})",
                mechanisms
            ))),
            AuthenticationMessage::Other(method) => Err(Error::Unsupported(format!(
                "authentication method {} is not negotiated",
                method
            ))),
        }
    }

    fn handle_ready(&mut self, type_byte: u8, payload: &[u8]) -> Result<StartupStep> {
        match type_byte {
            msg_type::BACKEND_KEY_DATA => {
                let key = BackendKeyData::parse(payload)?;
                self.backend_pid = key.process_id();
                Ok(StartupStep::Continue)
            }
            msg_type::READY_FOR_QUERY => {
                self.state = StartupState::Ready;
                Ok(StartupStep::Done)
            }
            other => Err(Error::Protocol(format!(
                "unexpected message during startup: '{}'",
                other as char
            ))),
        }
    }

    fn password(&self) -> Result<&str> {
        self.opts
            .password
            .as_deref()
            .ok_or_else(|| Error::Auth("password required but not provided".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::codec::MessageBuilder;

    fn opts() -> Opts {
        Opts {
            host: "localhost".into(),
            user: "alice".into(),
            password: Some("secret".into()),
            database: Some("app".into()),
            ..Opts::default()
        }
    }

    fn auth_payload(kind: i32, extra: &[u8]) -> Vec<u8> {
        let mut payload = kind.to_be_bytes().to_vec();
        payload.extend_from_slice(extra);
        payload
    }

    #[test]
    fn test_trust_handshake() {
        let options = opts();
        let mut startup = Startup::new(&options);
        let mut out = Vec::new();
        startup.start(&mut out);
        assert!(!out.is_empty());
        out.clear();

        assert_eq!(
            startup
                .on_message(msg_type::AUTHENTICATION, &auth_payload(0, &[]), &mut out)
                .unwrap(),
            StartupStep::Continue
        );

        let mut key = Vec::new();
        {
            let mut msg = MessageBuilder::new(&mut key, msg_type::BACKEND_KEY_DATA);
            msg.write_u32(1234);
            msg.write_u32(99);
            msg.finish();
        }
        assert_eq!(
            startup
                .on_message(msg_type::BACKEND_KEY_DATA, &key[5..], &mut out)
                .unwrap(),
            StartupStep::Continue
        );

        assert_eq!(
            startup
                .on_message(msg_type::READY_FOR_QUERY, b"I", &mut out)
                .unwrap(),
            StartupStep::Done
        );
        assert_eq!(startup.backend_pid(), 1234);
    }

    #[test]
    fn test_md5_auth_writes_password() {
        let options = opts();
        let mut startup = Startup::new(&options);
        let mut out = Vec::new();

        let step = startup
            .on_message(
                msg_type::AUTHENTICATION,
                &auth_payload(5, &[1, 2, 3, 4]),
                &mut out,
            )
            .unwrap();
        assert_eq!(step, StartupStep::Continue);
        assert_eq!(out[0], b'p');
        // "md5" + 32 hex chars + nul
        assert!(out.len() > 35);
    }

    #[test]
    fn test_missing_password() {
        let mut options = opts();
        options.password = None;
        let mut startup = Startup::new(&options);
        let mut out = Vec::new();

        let result = startup.on_message(msg_type::AUTHENTICATION, &auth_payload(3, &[]), &mut out);
        assert!(matches!(result, Err(Error::Auth(_))));
    }

    #[test]
    fn test_sasl_is_rejected() {
        let options = opts();
        let mut startup = Startup::new(&options);
        let mut out = Vec::new();

        let result = startup.on_message(
            msg_type::AUTHENTICATION,
            &auth_payload(10, b"SCRAM-SHA-256\0\0"),
            &mut out,
        );
        assert!(matches!(result, Err(Error::Unsupported(_))));
    }

    #[test]
    fn test_server_error_fails_handshake() {
        let options = opts();
        let mut startup = Startup::new(&options);
        let mut out = Vec::new();

        let result = startup.on_message(
            msg_type::ERROR_RESPONSE,
            b"SFATAL\0C28P01\0Mpassword authentication failed\0\0",
            &mut out,
        );
        assert!(matches!(result, Err(Error::Server(_))));
    }

    #[test]
    fn test_parameter_status_collected() {
        let options = opts();
        let mut startup = Startup::new(&options);
        let mut out = Vec::new();

        startup
            .on_message(msg_type::PARAMETER_STATUS, b"TimeZone\0UTC\0", &mut out)
            .unwrap();
        assert_eq!(
            startup.take_server_params(),
            [("TimeZone".to_string(), "UTC".to_string())]
        );
    }
}
