//! Host port allocation

use std::collections::HashSet;
use std::net::TcpListener;

use crate::error::{Error, Result};

/// How far above the base port the search goes
const PORT_SEARCH_RANGE: u16 = 100;

/// First port at or above `start` that is not reserved and can be bound
pub fn find_available_port(start: u16, reserved: &HashSet<u16>) -> Result<u16> {
    find_port_with(start, reserved, |port| {
        TcpListener::bind(("0.0.0.0", port)).is_ok()
    })
}

fn find_port_with<F>(start: u16, reserved: &HashSet<u16>, can_bind: F) -> Result<u16>
where
    F: Fn(u16) -> bool,
{
    (start..=start.saturating_add(PORT_SEARCH_RANGE))
        .find(|port| !reserved.contains(port) && can_bind(*port))
        .ok_or(Error::NoFreePort(start))
}
