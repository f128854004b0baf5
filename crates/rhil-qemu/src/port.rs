//! Ephemeral TCP port allocation
//!
//! A port is picked by binding port 0 on the host, reading back what the OS
//! assigned and closing the socket again. QEMU binds the port itself later,
//! so the listener can't be kept open. Between the close and QEMU's bind
//! another process may grab the same port; that window is accepted.

use std::net::TcpListener;

use crate::error::Result;

/// Ask the OS for a currently free TCP port on `host`
pub fn free_tcp_port(host: &str) -> Result<u16> {
    let listener = TcpListener::bind((host, 0))?;
    let port = listener.local_addr()?.port();
    drop(listener);
    log::debug!("Allocated free port {}:{}", host, port);
    Ok(port)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_free_port_is_bindable() {
        let port = free_tcp_port("127.0.0.1").unwrap();
        assert_ne!(port, 0);
        TcpListener::bind(("127.0.0.1", port)).unwrap();
    }
}
