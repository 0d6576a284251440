//! Capability interface for transports that can name their connection.

use std::net::SocketAddr;

/// Local and remote socket addresses of one accepted connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SocketAddressPair {
    /// Address the server accepted the connection on.
    pub local: SocketAddr,
    /// Address of the connecting peer.
    pub remote: SocketAddr,
}

/// A transport handle observed at an interception point.
///
/// Socket-backed transports implement [`socket_addresses`] to expose
/// the connection's address pair; transports with no socket underneath
/// (in-memory, framed-over-pipe) keep the default and the boundary
/// stage records no endpoint for the call. Absence is a normal state,
/// not an error.
///
/// [`socket_addresses`]: TransportHandle::socket_addresses
pub trait TransportHandle {
    /// Addresses of the connection this transport reads from, when the
    /// transport is socket-backed.
    fn socket_addresses(&self) -> Option<SocketAddressPair> {
        None
    }
}
