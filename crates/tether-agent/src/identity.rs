//! Device identity resolution and device metadata
//!
//! A device is recognized by the service across restarts through a single
//! stable string: either an operator-supplied override or the hardware
//! address of the primary network interface. Interface selection must be
//! deterministic for an unchanged host, so candidates are visited in
//! sorted-name order.

use sysinfo::{MacAddr, Networks, System};

use tether_core::error::IdentityError;
use tether_core::types::{DeviceIdentity, DeviceInfo};

use crate::{AGENT_PLATFORM, AGENT_VERSION};

/// Resolve the device identity.
///
/// A non-empty `preferred` value is used verbatim and no interface probing
/// occurs. Otherwise the primary interface's hardware address is used.
pub fn resolve(preferred: Option<&str>) -> Result<DeviceIdentity, IdentityError> {
    if let Some(id) = preferred.filter(|id| !id.is_empty()) {
        tracing::info!(identity = id, "using preferred device identity");
        return Ok(DeviceIdentity::new(id));
    }

    let mac = primary_hardware_address().ok_or(IdentityError::NoInterface)?;
    tracing::info!(identity = %mac, "derived device identity from primary interface");

    Ok(DeviceIdentity::new(mac))
}

/// Hardware address of the first non-loopback interface, in sorted-name
/// order. Loopback and virtual interfaces report an all-zero address and
/// are skipped.
fn primary_hardware_address() -> Option<String> {
    let networks = Networks::new_with_refreshed_list();

    let mut names: Vec<&String> = networks.list().keys().collect();
    names.sort();

    for name in names {
        let data = &networks.list()[name];
        let mac = data.mac_address();
        if mac == MacAddr::UNSPECIFIED {
            continue;
        }
        tracing::debug!(interface = %name, mac = %mac, "selected primary interface");
        return Some(mac.to_string());
    }

    None
}

/// Build the read-only device metadata snapshot sent with the
/// authorization request.
pub fn device_info() -> DeviceInfo {
    DeviceInfo {
        id: System::distribution_id(),
        pretty_name: System::name().unwrap_or_else(|| "unknown".to_string()),
        version: AGENT_VERSION.to_string(),
        arch: std::env::consts::ARCH.to_string(),
        platform: AGENT_PLATFORM.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preferred_identity_used_verbatim() {
        let identity = resolve(Some("02:42:ac:11:00:02")).unwrap();
        assert_eq!(identity.mac, "02:42:ac:11:00:02");
    }

    #[test]
    fn test_preferred_identity_allows_arbitrary_strings() {
        // Operator overrides are opaque: not required to look like a MAC
        let identity = resolve(Some("rack-7-slot-3")).unwrap();
        assert_eq!(identity.mac, "rack-7-slot-3");
    }

    #[test]
    fn test_empty_preferred_identity_is_ignored() {
        // An empty override must fall through to interface probing rather
        // than producing an empty identity.
        match resolve(Some("")) {
            Ok(identity) => assert!(!identity.mac.is_empty()),
            Err(IdentityError::NoInterface) => {}
        }
    }

    #[test]
    fn test_interface_selection_is_deterministic() {
        assert_eq!(primary_hardware_address(), primary_hardware_address());
    }

    #[test]
    fn test_device_info_snapshot() {
        let info = device_info();
        assert_eq!(info.version, AGENT_VERSION);
        assert_eq!(info.arch, std::env::consts::ARCH);
        assert_eq!(info.platform, "native");
    }
}
