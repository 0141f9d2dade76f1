//! Server configuration

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// TCP port of display 0
pub const X_TCP_PORT: u16 = 6000;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// TCP port to listen on (6000 + display number by convention)
    pub port: u16,

    /// Address to bind the listener to
    pub bind_address: IpAddr,

    /// Refuse handshakes that name an authorization protocol
    pub enforce_auth: bool,

    /// Treat requests with no registered handler as fatal for the connection
    pub strict: bool,

    pub screen_width: u16,
    pub screen_height: u16,

    /// Hosts seeding the access control list
    pub hosts: Vec<IpAddr>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            port: X_TCP_PORT,
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            enforce_auth: false,
            strict: false,
            screen_width: 1024,
            screen_height: 768,
            hosts: Vec::new(),
        }
    }
}

impl ServerConfig {
    pub fn for_display(display: u16) -> Self {
        ServerConfig {
            port: X_TCP_PORT.saturating_add(display),
            ..Default::default()
        }
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }
}

/// Parse `<W>x<H>`, both non-zero.
pub fn parse_screen_size(s: &str) -> Option<(u16, u16)> {
    let (w, h) = s.split_once(['x', 'X'])?;
    let w: u16 = w.trim().parse().ok()?;
    let h: u16 = h.trim().parse().ok()?;
    if w == 0 || h == 0 {
        return None;
    }
    Some((w, h))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 6000);
        assert_eq!(config.listen_addr().to_string(), "0.0.0.0:6000");
        assert!(!config.enforce_auth);
        assert_eq!(ServerConfig::for_display(2).port, 6002);
    }

    #[test]
    fn test_screen_size() {
        assert_eq!(parse_screen_size("800x600"), Some((800, 600)));
        assert_eq!(parse_screen_size("1920X1080"), Some((1920, 1080)));
        assert_eq!(parse_screen_size("0x600"), None);
        assert_eq!(parse_screen_size("800"), None);
        assert_eq!(parse_screen_size("axb"), None);
    }
}
