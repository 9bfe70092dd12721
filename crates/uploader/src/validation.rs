use std::net::{IpAddr, ToSocketAddrs};

/// Largest valid TCP port.
const MAX_PORT: i64 = u16::MAX as i64;

/// Returns true if `port` is in `0..=65535`.
///
/// Takes a wide integer so form input can be checked before it is narrowed
/// to `u16`.
pub fn validate_port(port: i64) -> bool {
    (0..=MAX_PORT).contains(&port)
}

/// Returns true if `input` names a reachable address.
///
/// IP literals (v4 or v6) are accepted directly. Anything else is handed to
/// the system resolver and accepted if it resolves, so host names such as
/// `localhost` pass too.
///
/// Empty input and input containing whitespace are rejected without a
/// lookup. This narrows the resolver behaviour on purpose: some resolvers
/// map an empty name to loopback, which would let a blank address field
/// validate.
///
/// May block while the resolver runs.
pub fn validate_ip_address(input: &str) -> bool {
    if input.parse::<IpAddr>().is_ok() {
        return true;
    }
    if input.is_empty() || input.chars().any(char::is_whitespace) {
        return false;
    }

    match (input, 0u16).to_socket_addrs() {
        Ok(mut addrs) => addrs.next().is_some(),
        Err(e) => {
            tracing::debug!(input, error = %e, "address did not resolve");
            false
        }
    }
}
