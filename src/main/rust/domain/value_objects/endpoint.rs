use std::fmt;

use crate::domain::errors::{DomainError, Result};

/// Link used to reach the endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    Tcp,
    WebSocket,
}

/// Target address of a streaming session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    kind: LinkKind,
    host: String,
    port: u16,
    path: String,
}

impl Endpoint {
    /// Accepts `tcp://host:port`, `ws://host:port/path` or a bare `host:port`
    pub fn parse(address: &str) -> Result<Self> {
        let address = address.trim();
        let (kind, rest) = match address.split_once("://") {
            Some(("tcp", rest)) => (LinkKind::Tcp, rest),
            Some(("ws", rest)) => (LinkKind::WebSocket, rest),
            Some((scheme, _)) => return Err(DomainError::UnsupportedScheme(scheme.to_string())),
            None => (LinkKind::Tcp, address),
        };

        let (authority, path) = match rest.find('/') {
            Some(idx) => (&rest[..idx], &rest[idx..]),
            None => (rest, "/"),
        };

        if kind == LinkKind::Tcp && path != "/" {
            return Err(DomainError::InvalidAddress(address.to_string()));
        }

        let (host, port) = authority
            .rsplit_once(':')
            .ok_or_else(|| DomainError::InvalidAddress(address.to_string()))?;

        if host.is_empty() {
            return Err(DomainError::InvalidAddress(address.to_string()));
        }

        let port: u16 = port
            .parse()
            .map_err(|_| DomainError::InvalidAddress(address.to_string()))?;
        if port == 0 {
            return Err(DomainError::InvalidPort);
        }

        Ok(Self {
            kind,
            host: host.to_string(),
            port,
            path: path.to_string(),
        })
    }

    pub fn kind(&self) -> LinkKind {
        self.kind
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// `host:port` form suitable for socket connects
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn url(&self) -> String {
        match self.kind {
            LinkKind::Tcp => format!("tcp://{}:{}", self.host, self.port),
            LinkKind::WebSocket => format!("ws://{}:{}{}", self.host, self.port, self.path),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url())
    }
}
