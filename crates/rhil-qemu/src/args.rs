//! QEMU command-line argument helpers
//!
//! Arguments arrive as shell-style strings from configuration. They are
//! split into tokens once, and everything after that works on token lists
//! and returns new ones.

use std::fmt;

use crate::error::{QemuError, Result};

/// Flag selecting the QMP control socket
pub const QMP_FLAG: &str = "-qmp";

/// Loopback host used for locally allocated ports
pub const LOCALHOST: &str = "127.0.0.1";

/// TCP address of a QMP control socket
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QmpAddr {
    /// Host name or IP
    pub host: String,
    /// TCP port
    pub port: u16,
}

impl QmpAddr {
    /// Create a new address
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Build the `-qmp` value for a server socket on this address
    pub fn server_arg(&self) -> String {
        format!("tcp:{}:{},server,wait=off", self.host, self.port)
    }
}

impl fmt::Display for QmpAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Split a shell-style argument string into tokens
pub fn split_args(s: &str) -> Result<Vec<String>> {
    shlex::split(s).ok_or_else(|| QemuError::InvalidArgs(s.to_string()))
}

/// Strip the outer quotes a user may have wrapped the whole string in
///
/// Double quotes are stripped first, then single quotes.
pub fn strip_outer_quotes(s: &str) -> &str {
    s.trim_matches('"').trim_matches('\'')
}

/// Parse a `-qmp` value of the form `tcp:<host>:<port>[,<opts>...]`
///
/// Returns the address and the trailing options (without the leading comma).
pub fn parse_qmp_value(value: &str) -> Result<(QmpAddr, Option<&str>)> {
    if !value.starts_with("tcp") {
        return Err(QemuError::QmpNotTcp(value.to_string()));
    }

    let (socket, opts) = match value.split_once(',') {
        Some((socket, opts)) => (socket, Some(opts)),
        None => (value, None),
    };

    let mut parts = socket.split(':');
    let (Some("tcp"), Some(host), Some(port), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(QemuError::QmpAddress(value.to_string()));
    };
    let port = port
        .parse::<u16>()
        .map_err(|_| QemuError::QmpAddress(value.to_string()))?;

    Ok((QmpAddr::new(host, port), opts))
}

/// Look for a user-supplied `-qmp` flag and shift its port by `index`
///
/// Returns the rewritten argument list and the adjusted address, or `None`
/// for the address if no `-qmp` flag is present (the list is returned
/// unchanged). Only the first `-qmp` flag is considered.
pub fn offset_qmp_arg(args: Vec<String>, index: u16) -> Result<(Vec<String>, Option<QmpAddr>)> {
    let Some(pos) = args.iter().position(|a| a == QMP_FLAG) else {
        return Ok((args, None));
    };
    let value = args
        .get(pos + 1)
        .ok_or_else(|| QemuError::QmpAddress(String::new()))?;

    let (addr, opts) = parse_qmp_value(value)?;
    let port = addr.port.checked_add(index).ok_or(QemuError::PortOverflow {
        port: addr.port,
        index,
    })?;
    let addr = QmpAddr::new(addr.host, port);

    let mut rewritten = format!("tcp:{}:{}", addr.host, addr.port);
    if let Some(opts) = opts {
        rewritten.push(',');
        rewritten.push_str(opts);
    }

    let args = args
        .into_iter()
        .enumerate()
        .map(|(i, a)| if i == pos + 1 { rewritten.clone() } else { a })
        .collect();

    Ok((args, Some(addr)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(s: &str) -> Vec<String> {
        split_args(s).unwrap()
    }

    #[test]
    fn test_split_args() {
        assert_eq!(
            tokens("-nographic -machine esp32 -global 'a b'"),
            vec!["-nographic", "-machine", "esp32", "-global", "a b"]
        );
        assert!(tokens("").is_empty());
        assert!(split_args("-machine 'esp32").is_err());
    }

    #[test]
    fn test_strip_outer_quotes() {
        assert_eq!(strip_outer_quotes("\"-nographic -machine esp32\""), "-nographic -machine esp32");
        assert_eq!(strip_outer_quotes("'-nographic'"), "-nographic");
        assert_eq!(strip_outer_quotes("-nographic"), "-nographic");
    }

    #[test]
    fn test_parse_qmp_value() {
        let (addr, opts) = parse_qmp_value("tcp:localhost:4488,server,wait=off").unwrap();
        assert_eq!(addr, QmpAddr::new("localhost", 4488));
        assert_eq!(opts, Some("server,wait=off"));

        let (addr, opts) = parse_qmp_value("tcp:127.0.0.1:5000").unwrap();
        assert_eq!(addr.port, 5000);
        assert_eq!(opts, None);

        assert!(matches!(
            parse_qmp_value("unix:/tmp/qmp.sock,server"),
            Err(QemuError::QmpNotTcp(_))
        ));
        assert!(matches!(
            parse_qmp_value("tcp:localhost"),
            Err(QemuError::QmpAddress(_))
        ));
        assert!(matches!(
            parse_qmp_value("tcp:localhost:port"),
            Err(QemuError::QmpAddress(_))
        ));
    }

    #[test]
    fn test_offset_qmp_arg() {
        let args = tokens("-nographic -qmp tcp:127.0.0.1:4488,server,wait=off -machine esp32");
        let (args, addr) = offset_qmp_arg(args, 2).unwrap();

        assert_eq!(addr, Some(QmpAddr::new("127.0.0.1", 4490)));
        assert_eq!(
            args,
            tokens("-nographic -qmp tcp:127.0.0.1:4490,server,wait=off -machine esp32")
        );
        assert_eq!(args.iter().filter(|a| *a == QMP_FLAG).count(), 1);
    }

    #[test]
    fn test_offset_qmp_arg_missing() {
        let args = tokens("-nographic -machine esp32");
        let (out, addr) = offset_qmp_arg(args.clone(), 3).unwrap();
        assert_eq!(out, args);
        assert!(addr.is_none());
    }

    #[test]
    fn test_offset_qmp_arg_errors() {
        assert!(offset_qmp_arg(tokens("-qmp"), 0).is_err());
        assert!(matches!(
            offset_qmp_arg(tokens("-qmp unix:/tmp/q,server"), 0),
            Err(QemuError::QmpNotTcp(_))
        ));
        assert!(matches!(
            offset_qmp_arg(tokens("-qmp tcp:localhost:65535"), 1),
            Err(QemuError::PortOverflow { port: 65535, index: 1 })
        ));
    }

    #[test]
    fn test_server_arg() {
        assert_eq!(
            QmpAddr::new(LOCALHOST, 1234).server_arg(),
            "tcp:127.0.0.1:1234,server,wait=off"
        );
    }
}
