//! Static peer list loading for the LAN transport.
//!
//! Reads a file with one peer per line, `<name> <ip>` or just `<ip>`, and
//! turns it into the discovered set for one discovery round.

use std::fs;
use std::net::IpAddr;
use std::path::Path;

use tracing::{debug, info, warn};

use lifeline_shared::types::DiscoveredPeer;

/// Load peers from a configuration file.
///
/// Empty lines and lines starting with `#` are ignored. Lines whose address
/// does not parse as an IP are logged and skipped. Order is preserved, so
/// the first line is the peer a sender connects to.
///
/// # Example file
///
/// ```text
/// # rescue post receivers
/// township-office 192.168.49.1
/// 192.168.49.7
/// ```
pub fn load_static_peers(path: &Path) -> Vec<DiscoveredPeer> {
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!(
                path = %path.display(),
                error = %e,
                "Failed to read peer list"
            );
            return Vec::new();
        }
    };

    let peers: Vec<DiscoveredPeer> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| match parse_peer_line(line) {
            Some(peer) => {
                debug!(name = %peer.device_name, address = %peer.device_address, "Loaded peer");
                Some(peer)
            }
            None => {
                warn!(line = %line, "Skipping invalid peer line");
                None
            }
        })
        .collect();

    info!(
        count = peers.len(),
        path = %path.display(),
        "Loaded static peers"
    );

    peers
}

fn parse_peer_line(line: &str) -> Option<DiscoveredPeer> {
    let mut parts = line.split_whitespace();
    let first = parts.next()?;
    let (name, address) = match parts.next() {
        Some(address) => (first, address),
        None => (first, first),
    };
    if parts.next().is_some() {
        return None;
    }

    address.parse::<IpAddr>().ok()?;
    Some(DiscoveredPeer {
        device_name: name.to_string(),
        device_address: address.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_from_nonexistent_file() {
        let peers = load_static_peers(Path::new("/nonexistent/peers.txt"));
        assert!(peers.is_empty());
    }

    #[test]
    fn test_load_from_file_keeps_order() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# receivers").unwrap();
        writeln!(file, "township-office 192.168.49.1").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "not-an-address").unwrap();
        writeln!(file, "a b c").unwrap();
        writeln!(file, "10.0.0.7").unwrap();
        file.flush().unwrap();

        let peers = load_static_peers(file.path());
        assert_eq!(peers.len(), 2);
        assert_eq!(peers[0].device_name, "township-office");
        assert_eq!(peers[0].device_address, "192.168.49.1");
        assert_eq!(peers[1].device_name, "10.0.0.7");
    }
}
