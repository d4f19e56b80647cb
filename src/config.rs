//! Run settings, their defaults, and the SSH algorithm lists used by the login probe.
//!
//! Freshly remediated IOS devices speak SSH v2 with the algorithms their image shipped
//! with, which are often SHA-1 Diffie-Hellman groups, CBC ciphers and `ssh-rsa` host
//! keys. The probe therefore offers those next to the modern defaults.

use std::path::PathBuf;
use std::time::Duration;

use russh::keys::{Algorithm, HashAlg};
use russh::{cipher, compression, kex, mac};

/// Default inventory file name.
pub const DEFAULT_INVENTORY: &str = "DeviceDB.csv";
/// Default failure log file name.
pub const DEFAULT_FAILURE_LOG: &str = "SSHEnableFailure.log";
pub const DEFAULT_TELNET_PORT: u16 = 23;
pub const DEFAULT_SSH_PORT: u16 = 22;
/// Upper bound on devices remediated at the same time.
pub const DEFAULT_CONCURRENCY: usize = 20;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 60;
/// 2048-bit key generation can take minutes on older supervisors.
pub const DEFAULT_KEYGEN_TIMEOUT_SECS: u64 = 240;

/// Effective settings for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub inventory: PathBuf,
    pub failure_log: PathBuf,
    pub concurrency: usize,
    pub session: SessionSettings,
    /// Attempt an SSH login after a successful remediation.
    pub probe_ssh: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            inventory: PathBuf::from(DEFAULT_INVENTORY),
            failure_log: PathBuf::from(DEFAULT_FAILURE_LOG),
            concurrency: DEFAULT_CONCURRENCY,
            session: SessionSettings::default(),
            probe_ssh: false,
        }
    }
}

/// Per-device connection and command budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub telnet_port: u16,
    pub ssh_port: u16,
    pub connect_timeout: Duration,
    pub command_timeout: Duration,
    pub keygen_timeout: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            telnet_port: DEFAULT_TELNET_PORT,
            ssh_port: DEFAULT_SSH_PORT,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            command_timeout: Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS),
            keygen_timeout: Duration::from_secs(DEFAULT_KEYGEN_TIMEOUT_SECS),
        }
    }
}

/// Key exchange algorithms offered by the SSH probe, in order of preference.
pub const LEGACY_KEX_ORDER: &[kex::Name] = &[
    kex::CURVE25519,
    kex::CURVE25519_PRE_RFC_8731,
    kex::ECDH_SHA2_NISTP256,
    kex::ECDH_SHA2_NISTP384,
    kex::ECDH_SHA2_NISTP521,
    kex::DH_G14_SHA256,
    kex::DH_G16_SHA512,
    kex::DH_GEX_SHA256,
    kex::DH_G14_SHA1,
    kex::DH_GEX_SHA1,
    kex::DH_G1_SHA1,
];

/// Cipher algorithms offered by the SSH probe.
pub static LEGACY_CIPHERS: &[cipher::Name] = &[
    cipher::CHACHA20_POLY1305,
    cipher::AES_256_GCM,
    cipher::AES_256_CTR,
    cipher::AES_192_CTR,
    cipher::AES_128_CTR,
    cipher::AES_256_CBC,
    cipher::AES_192_CBC,
    cipher::AES_128_CBC,
];

/// MAC algorithms offered by the SSH probe.
pub const LEGACY_MAC_ALGORITHMS: &[mac::Name] = &[
    mac::HMAC_SHA256_ETM,
    mac::HMAC_SHA512_ETM,
    mac::HMAC_SHA256,
    mac::HMAC_SHA512,
    mac::HMAC_SHA1_ETM,
    mac::HMAC_SHA1,
];

pub const DEFAULT_COMPRESSION_ALGORITHMS: &[compression::Name] = &[compression::NONE];

/// Host key algorithms accepted by the SSH probe.
pub const LEGACY_KEY_TYPES: &[Algorithm] = &[
    Algorithm::Ed25519,
    Algorithm::Rsa {
        hash: Some(HashAlg::Sha512),
    },
    Algorithm::Rsa {
        hash: Some(HashAlg::Sha256),
    },
    Algorithm::Rsa { hash: None },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let settings = Settings::default();
        assert_eq!(settings.inventory, PathBuf::from("DeviceDB.csv"));
        assert_eq!(settings.failure_log, PathBuf::from("SSHEnableFailure.log"));
        assert_eq!(settings.concurrency, 20);
        assert_eq!(settings.session.telnet_port, 23);
        assert_eq!(settings.session.connect_timeout, Duration::from_secs(60));
        assert!(settings.session.keygen_timeout > settings.session.command_timeout);
    }

    #[test]
    fn probe_algorithms_exclude_none() {
        assert!(LEGACY_KEX_ORDER.iter().all(|alg| *alg != kex::NONE));
        assert!(LEGACY_CIPHERS.iter().all(|alg| *alg != cipher::NONE));
        assert!(LEGACY_MAC_ALGORITHMS.iter().all(|alg| *alg != mac::NONE));
        assert!(LEGACY_KEX_ORDER.contains(&kex::DH_G14_SHA1));
        assert!(LEGACY_CIPHERS.contains(&cipher::AES_128_CBC));
    }
}
