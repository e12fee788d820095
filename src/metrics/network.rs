//! Network interface address enumeration via getifaddrs(3).
//!
//! Produces the per-interface address records the snapshot passes through
//! verbatim: one entry per assigned IPv4/IPv6 address, tagged with the
//! interface MAC and a loopback flag.

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::ffi::CStr;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// One assigned address on an interface
#[derive(Debug, Clone, Serialize)]
pub struct InterfaceAddress {
    pub address: String,
    pub netmask: Option<String>,
    pub family: &'static str,
    pub mac: Option<String>,
    pub internal: bool,
}

/// Enumerate all interface addresses, keyed by interface name.
pub fn interface_addresses() -> Result<BTreeMap<String, Vec<InterfaceAddress>>> {
    let mut ifap: *mut libc::ifaddrs = std::ptr::null_mut();
    let rc = unsafe { libc::getifaddrs(&mut ifap) };
    if rc != 0 {
        return Err(std::io::Error::last_os_error()).context("getifaddrs failed");
    }

    // First pass: MAC per interface from the AF_PACKET entries, so every
    // address record of that interface can carry it.
    let mut macs: BTreeMap<String, String> = BTreeMap::new();
    let mut cursor = ifap;
    while !cursor.is_null() {
        let ifa = unsafe { &*cursor };
        if let Some((name, mac)) = link_entry(ifa) {
            macs.insert(name, mac);
        }
        cursor = ifa.ifa_next;
    }

    // Second pass: the IP address records themselves.
    let mut interfaces: BTreeMap<String, Vec<InterfaceAddress>> = BTreeMap::new();
    let mut cursor = ifap;
    while !cursor.is_null() {
        let ifa = unsafe { &*cursor };
        if let Some((name, record)) = address_entry(ifa, &macs) {
            interfaces.entry(name).or_default().push(record);
        }
        cursor = ifa.ifa_next;
    }

    unsafe { libc::freeifaddrs(ifap) };
    Ok(interfaces)
}

fn interface_name(ifa: &libc::ifaddrs) -> Option<String> {
    if ifa.ifa_name.is_null() {
        return None;
    }
    let name = unsafe { CStr::from_ptr(ifa.ifa_name) };
    Some(name.to_string_lossy().into_owned())
}

/// Extract (name, mac) from an AF_PACKET entry, if this is one.
fn link_entry(ifa: &libc::ifaddrs) -> Option<(String, String)> {
    if ifa.ifa_addr.is_null() {
        return None;
    }
    let family = unsafe { (*ifa.ifa_addr).sa_family };
    if i32::from(family) != libc::AF_PACKET {
        return None;
    }

    let sll = unsafe { &*(ifa.ifa_addr as *const libc::sockaddr_ll) };
    let len = usize::from(sll.sll_halen).min(sll.sll_addr.len());
    if len == 0 {
        return None;
    }

    let mac = sll.sll_addr[..len]
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(":");
    Some((interface_name(ifa)?, mac))
}

/// Extract (name, record) from an AF_INET/AF_INET6 entry, if this is one.
fn address_entry(
    ifa: &libc::ifaddrs,
    macs: &BTreeMap<String, String>,
) -> Option<(String, InterfaceAddress)> {
    let (address, family) = sockaddr_ip(ifa.ifa_addr)?;
    let netmask = sockaddr_ip(ifa.ifa_netmask).map(|(ip, _)| ip.to_string());
    let name = interface_name(ifa)?;
    let internal = ifa.ifa_flags & libc::IFF_LOOPBACK as libc::c_uint != 0;

    let record = InterfaceAddress {
        address: address.to_string(),
        netmask,
        family,
        mac: macs.get(&name).cloned(),
        internal,
    };
    Some((name, record))
}

/// Decode an IPv4/IPv6 socket address; other families yield None.
fn sockaddr_ip(sa: *const libc::sockaddr) -> Option<(IpAddr, &'static str)> {
    if sa.is_null() {
        return None;
    }

    match i32::from(unsafe { (*sa).sa_family }) {
        libc::AF_INET => {
            let sin = unsafe { &*(sa as *const libc::sockaddr_in) };
            let ip = Ipv4Addr::from(u32::from_be(sin.sin_addr.s_addr));
            Some((IpAddr::V4(ip), "IPv4"))
        }
        libc::AF_INET6 => {
            let sin6 = unsafe { &*(sa as *const libc::sockaddr_in6) };
            let ip = Ipv6Addr::from(sin6.sin6_addr.s6_addr);
            Some((IpAddr::V6(ip), "IPv6"))
        }
        _ => None,
    }
}
