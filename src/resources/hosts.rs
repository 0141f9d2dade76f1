//! Host access control list

use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

pub const FAMILY_INTERNET: u8 = 0;
pub const FAMILY_DECNET: u8 = 1;
pub const FAMILY_CHAOS: u8 = 2;
pub const FAMILY_SERVER_INTERPRETED: u8 = 5;
pub const FAMILY_INTERNET6: u8 = 6;

/// An ACL entry. Two hosts are the same if family and address bytes match.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Host {
    pub family: u8,
    pub address: Vec<u8>,
}

impl Host {
    pub fn new(family: u8, address: Vec<u8>) -> Self {
        Host { family, address }
    }

    pub fn from_ip(ip: IpAddr) -> Self {
        match ip {
            IpAddr::V4(v4) => Host::new(FAMILY_INTERNET, v4.octets().to_vec()),
            IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
                Some(v4) => Host::new(FAMILY_INTERNET, v4.octets().to_vec()),
                None => Host::new(FAMILY_INTERNET6, v6.octets().to_vec()),
            },
        }
    }
}

pub struct HostList {
    hosts: Mutex<Vec<Host>>,
    access_control: AtomicBool,
}

impl HostList {
    pub fn new(access_control: bool) -> Self {
        HostList {
            hosts: Mutex::new(Vec::new()),
            access_control: AtomicBool::new(access_control),
        }
    }

    /// Adding a host that is already listed does nothing.
    pub fn add(&self, host: Host) {
        let mut hosts = self.hosts.lock().unwrap_or_else(PoisonError::into_inner);
        if !hosts.contains(&host) {
            log::info!("Host added to access list: {:?}", host);
            hosts.push(host);
        }
    }

    pub fn remove(&self, host: &Host) -> bool {
        let mut hosts = self.hosts.lock().unwrap_or_else(PoisonError::into_inner);
        let before = hosts.len();
        hosts.retain(|h| h != host);
        before != hosts.len()
    }

    pub fn contains(&self, host: &Host) -> bool {
        self.hosts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(host)
    }

    pub fn list(&self) -> Vec<Host> {
        self.hosts.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn access_control_enabled(&self) -> bool {
        self.access_control.load(Ordering::SeqCst)
    }

    pub fn set_access_control(&self, enabled: bool) {
        self.access_control.store(enabled, Ordering::SeqCst);
    }

    /// Whether a peer may connect. Loopback is always let in.
    pub fn allows(&self, peer: IpAddr) -> bool {
        if !self.access_control_enabled() || peer.is_loopback() {
            return true;
        }
        self.contains(&Host::from_ip(peer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_add_remove_structural() {
        let hosts = HostList::new(true);
        hosts.add(Host::new(FAMILY_INTERNET, vec![10, 0, 0, 1]));
        hosts.add(Host::new(FAMILY_INTERNET, vec![10, 0, 0, 1]));
        assert_eq!(hosts.list().len(), 1);
        assert!(hosts.remove(&Host::new(FAMILY_INTERNET, vec![10, 0, 0, 1])));
        assert!(!hosts.remove(&Host::new(FAMILY_INTERNET, vec![10, 0, 0, 1])));
    }

    #[test]
    fn test_allows() {
        let hosts = HostList::new(true);
        let peer = IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20));
        assert!(!hosts.allows(peer));
        assert!(hosts.allows(IpAddr::V4(Ipv4Addr::LOCALHOST)));

        hosts.add(Host::from_ip(peer));
        assert!(hosts.allows(peer));

        let other = IpAddr::V4(Ipv4Addr::new(192, 168, 1, 21));
        hosts.set_access_control(false);
        assert!(hosts.allows(other));
    }
}
