use if_addrs::get_if_addrs;
use std::net::{IpAddr, Ipv4Addr};
use tracing::debug;

/// Interfaces créées pour les caméras ONVIF émulées, jamais l'adresse de l'hôte.
fn is_camera_interface(name: &str) -> bool {
    name == "lo" || name.starts_with("onvif-") || name.starts_with("macvlan")
}

fn first_ipv4<'a>(mut addrs: impl Iterator<Item = &'a IpAddr>) -> Option<Ipv4Addr> {
    addrs.find_map(|ip| match ip {
        IpAddr::V4(v4) if !v4.is_loopback() => Some(*v4),
        _ => None,
    })
}

/// Interface préférée d'abord, puis la première interface "hôte", sinon loopback.
pub fn pick_host_ip(preferred: &str, interfaces: &[(String, IpAddr)]) -> Ipv4Addr {
    first_ipv4(interfaces.iter().filter(|(name, _)| name == preferred).map(|(_, ip)| ip))
        .or_else(|| {
            first_ipv4(
                interfaces
                    .iter()
                    .filter(|(name, _)| !is_camera_interface(name))
                    .map(|(_, ip)| ip),
            )
        })
        .unwrap_or(Ipv4Addr::LOCALHOST)
}

pub fn detect_host_ip(preferred: &str) -> String {
    let interfaces: Vec<(String, IpAddr)> = match get_if_addrs() {
        Ok(list) => list.into_iter().map(|iface| (iface.name.clone(), iface.ip())).collect(),
        Err(e) => {
            debug!("[netinfo] failed to enumerate interfaces: {e}");
            Vec::new()
        }
    };
    pick_host_ip(preferred, &interfaces).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iface(name: &str, ip: &str) -> (String, IpAddr) {
        (name.to_string(), ip.parse().unwrap())
    }

    #[test]
    fn test_preferred_interface_wins() {
        let list = vec![
            iface("lo", "127.0.0.1"),
            iface("wlan0", "192.168.1.30"),
            iface("eth0", "fe80::1"),
            iface("eth0", "192.168.1.10"),
        ];
        assert_eq!(pick_host_ip("eth0", &list), Ipv4Addr::new(192, 168, 1, 10));
    }

    #[test]
    fn test_skips_camera_interfaces() {
        let list = vec![
            iface("lo", "127.0.0.1"),
            iface("onvif-front", "192.168.1.120"),
            iface("macvlan0", "192.168.1.121"),
            iface("end0", "192.168.1.11"),
        ];
        assert_eq!(pick_host_ip("eth0", &list), Ipv4Addr::new(192, 168, 1, 11));
    }

    #[test]
    fn test_loopback_fallback() {
        assert_eq!(pick_host_ip("eth0", &[iface("lo", "127.0.0.1")]), Ipv4Addr::LOCALHOST);
        assert_eq!(pick_host_ip("eth0", &[]), Ipv4Addr::LOCALHOST);
    }

    #[test]
    fn test_detect_returns_an_ipv4() {
        assert!(detect_host_ip("eth0").parse::<Ipv4Addr>().is_ok());
    }
}
