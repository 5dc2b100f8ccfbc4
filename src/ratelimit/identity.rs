//! Request identity and the per-request context governors see.

use std::fmt;
use std::net::IpAddr;

/// Authenticated principal supplied by the upstream auth layer.
///
/// Inserted into request extensions; absence means the request is anonymous.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Principal {
    /// Stable user identifier
    pub id: String,
}

impl Principal {
    /// Create a principal for the given user id.
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Partition key for rate-limit state.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identity {
    /// An authenticated user
    User(String),
    /// An anonymous client, by remote address
    Address(IpAddr),
    /// Remote address could not be determined
    Unknown,
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::User(id) => write!(f, "user:{}", id),
            Identity::Address(ip) => write!(f, "ip:{}", ip),
            Identity::Unknown => write!(f, "ip:unknown"),
        }
    }
}

/// What a governor knows about an inbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    path: String,
    remote_addr: Option<IpAddr>,
    principal: Option<Principal>,
}

impl RequestContext {
    /// Context for a request to `path` with nothing else known.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            remote_addr: None,
            principal: None,
        }
    }

    /// Set the client address.
    pub fn with_remote_addr(mut self, addr: IpAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    /// Set the authenticated principal.
    pub fn with_principal(mut self, principal: Principal) -> Self {
        self.principal = Some(principal);
        self
    }

    /// Request path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Client address, if known.
    pub fn remote_addr(&self) -> Option<IpAddr> {
        self.remote_addr
    }

    /// Authenticated principal, if any.
    pub fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    /// The principal's identity, falling back to the client address.
    pub fn identity(&self) -> Identity {
        match &self.principal {
            Some(principal) => Identity::User(principal.id.clone()),
            None => self.address_identity(),
        }
    }

    /// Identity by client address only, ignoring any principal.
    pub fn address_identity(&self) -> Identity {
        match self.remote_addr {
            Some(ip) => Identity::Address(ip),
            None => Identity::Unknown,
        }
    }
}
