//! SSH login probe.
//!
//! After a device has been remediated the operator can ask for a quick SSH login to
//! confirm the new transport actually accepts them. The probe authenticates with the same
//! credentials, opens nothing beyond the transport, and hangs up.

use super::*;
use async_ssh2_tokio::client::{AuthMethod, Client};
use async_ssh2_tokio::{Config, ServerCheckMethod};
use russh::Preferred;
use std::borrow::Cow;

use crate::config;

/// Algorithm preferences for freshly enabled IOS SSH servers.
pub(super) fn legacy_preferred() -> Preferred {
    Preferred {
        kex: Cow::Borrowed(config::LEGACY_KEX_ORDER),
        key: Cow::Borrowed(config::LEGACY_KEY_TYPES),
        cipher: Cow::Borrowed(config::LEGACY_CIPHERS),
        mac: Cow::Borrowed(config::LEGACY_MAC_ALGORITHMS),
        compression: Cow::Borrowed(config::DEFAULT_COMPRESSION_ALGORITHMS),
    }
}

/// Logs in over SSH and disconnects.
///
/// Host keys are not checked: the key was generated minutes ago and is not in any
/// known_hosts file yet.
pub(super) async fn probe_ssh(
    addr: &str,
    port: u16,
    credentials: &Credentials,
    timeout: Duration,
) -> Result<(), ConnectError> {
    let device_addr = format!("{}@{}:{}", credentials.username(), addr, port);
    let ssh_config = Config {
        preferred: legacy_preferred(),
        inactivity_timeout: Some(timeout),
        ..Default::default()
    };

    let connect = Client::connect_with_config(
        (addr.to_string(), port),
        credentials.username(),
        AuthMethod::with_password(credentials.secret()),
        ServerCheckMethod::NoCheck,
        ssh_config,
    );
    let client = match tokio::time::timeout(timeout, connect).await {
        Ok(result) => result?,
        Err(_) => return Err(ConnectError::ConnectTimeout(timeout.as_secs())),
    };
    debug!("{} SSH login successful", device_addr);
    drop(client);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::legacy_preferred;
    use russh::{cipher, kex};

    #[test]
    fn preferred_algorithms_cover_ios_defaults() {
        let preferred = legacy_preferred();
        assert!(preferred.kex.contains(&kex::DH_G14_SHA1));
        assert!(preferred.cipher.contains(&cipher::AES_256_CBC));
        assert!(preferred.kex.iter().all(|alg| *alg != kex::NONE));
    }
}
