//! QMP (QEMU Machine Protocol) client
//!
//! Each call opens a fresh connection, negotiates capabilities, runs one
//! command and disconnects:
//!
//! ```text
//! S: {"QMP": {"version": {...}, "capabilities": [...]}}
//! C: {"execute": "qmp_capabilities"}
//! S: {"return": {}}
//! C: {"execute": "system_reset"}
//! S: {"event": "RESET", ...}        (events are skipped)
//! S: {"return": {}}
//! ```
//!
//! The transport is async, but calls block: every call drives its own
//! short-lived single-threaded runtime to completion before returning.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use crate::args::QmpAddr;
use crate::error::{QemuError, Result};

/// Default limit for one complete QMP round trip
pub const DEFAULT_QMP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
struct Request<'a> {
    execute: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    arguments: Option<&'a Value>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    class: String,
    #[serde(default)]
    desc: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Message {
    Greeting {
        #[serde(rename = "QMP")]
        _qmp: Value,
    },
    Return {
        #[serde(rename = "return")]
        value: Value,
    },
    Error {
        error: ErrorBody,
    },
    Event {
        event: String,
    },
}

/// Blocking QMP client bound to one control socket
#[derive(Debug, Clone)]
pub struct QmpClient {
    addr: QmpAddr,
    timeout: Duration,
}

impl QmpClient {
    /// Create a client for the given control socket
    pub fn new(addr: QmpAddr) -> Self {
        Self {
            addr,
            timeout: DEFAULT_QMP_TIMEOUT,
        }
    }

    /// Set the round-trip timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Control socket address
    pub fn addr(&self) -> &QmpAddr {
        &self.addr
    }

    /// Run one QMP command and return its `return` value
    pub fn execute(&self, command: &str, arguments: Option<Value>) -> Result<Value> {
        log::debug!("QMP {} -> {}", self.addr, command);

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        runtime.block_on(async {
            tokio::time::timeout(self.timeout, self.round_trip(command, arguments.as_ref()))
                .await
                .map_err(|_| QemuError::Timeout(self.timeout, format!("QMP '{}'", command)))?
        })
    }

    /// Reset the emulated machine (`system_reset`)
    pub fn system_reset(&self) -> Result<()> {
        self.execute("system_reset", None)?;
        Ok(())
    }

    /// Save the emulated display to `path` (`screendump`)
    pub fn screendump(&self, path: &Path) -> Result<()> {
        let arguments = serde_json::json!({ "filename": path.to_string_lossy() });
        self.execute("screendump", Some(arguments))?;
        Ok(())
    }

    async fn round_trip(&self, command: &str, arguments: Option<&Value>) -> Result<Value> {
        let stream = TcpStream::connect((self.addr.host.as_str(), self.addr.port))
            .await
            .map_err(|source| QemuError::QmpConnect {
                addr: self.addr.to_string(),
                source,
            })?;
        let (read, mut write) = stream.into_split();
        let mut lines = BufReader::new(read).lines();

        match next_message(&mut lines).await? {
            Message::Greeting { .. } => {}
            other => {
                return Err(QemuError::QmpProtocol(format!(
                    "expected greeting, got {:?}",
                    other
                )))
            }
        }

        let capabilities = Request {
            execute: "qmp_capabilities",
            arguments: None,
        };
        send(&mut write, &capabilities).await?;
        await_return(&mut lines, "qmp_capabilities").await?;

        send(&mut write, &Request { execute: command, arguments }).await?;
        let value = await_return(&mut lines, command).await?;

        write.shutdown().await?;
        Ok(value)
    }
}

async fn send(write: &mut OwnedWriteHalf, request: &Request<'_>) -> Result<()> {
    let mut line = serde_json::to_vec(request)
        .map_err(|e| QemuError::QmpProtocol(format!("failed to encode request: {}", e)))?;
    line.push(b'\n');
    write.write_all(&line).await?;
    write.flush().await?;
    Ok(())
}

async fn next_message(lines: &mut Lines<BufReader<OwnedReadHalf>>) -> Result<Message> {
    loop {
        let line = lines
            .next_line()
            .await?
            .ok_or_else(|| QemuError::QmpProtocol("connection closed by QEMU".to_string()))?;
        if line.trim().is_empty() {
            continue;
        }
        return serde_json::from_str(&line)
            .map_err(|e| QemuError::QmpProtocol(format!("bad message {:?}: {}", line, e)));
    }
}

/// Read messages until the reply to `command` arrives, skipping events
async fn await_return(lines: &mut Lines<BufReader<OwnedReadHalf>>, command: &str) -> Result<Value> {
    loop {
        match next_message(lines).await? {
            Message::Return { value } => return Ok(value),
            Message::Error { error } => {
                return Err(QemuError::QmpCommand {
                    command: command.to_string(),
                    class: error.class,
                    desc: error.desc,
                })
            }
            Message::Event { event } => log::debug!("QMP event: {}", event),
            Message::Greeting { .. } => {
                return Err(QemuError::QmpProtocol("unexpected second greeting".to_string()))
            }
        }
    }
}
