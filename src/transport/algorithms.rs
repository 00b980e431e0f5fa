//! SSH algorithm preferences for the production transport.
//!
//! A single curated "secure default" list rather than a multi-tier
//! compatibility matrix: this crate's hosts are operator-declared gateway
//! targets, not a sweep of legacy network devices, so there's no call for a
//! legacy-compatible profile with `kex::NONE`/`cipher::NONE`.

use std::borrow::Cow;

use russh::keys::{Algorithm, EcdsaCurve, HashAlg};
use russh::{Preferred, cipher, compression, kex, mac};

/// Modern key-exchange algorithms, most preferred first.
pub const KEX_ORDER: &[kex::Name] = &[
    kex::CURVE25519,
    kex::CURVE25519_PRE_RFC_8731,
    kex::ECDH_SHA2_NISTP256,
    kex::ECDH_SHA2_NISTP384,
    kex::ECDH_SHA2_NISTP521,
    kex::DH_G16_SHA512,
    kex::DH_G18_SHA512,
    kex::DH_G14_SHA256,
];

/// Authenticated and modern ciphers only.
pub const CIPHERS: &[cipher::Name] = &[
    cipher::AES_256_GCM,
    cipher::CHACHA20_POLY1305,
    cipher::AES_256_CTR,
    cipher::AES_192_CTR,
    cipher::AES_128_CTR,
];

/// MAC algorithms; ETM variants preferred.
pub const MAC_ALGORITHMS: &[mac::Name] = &[
    mac::HMAC_SHA256_ETM,
    mac::HMAC_SHA512_ETM,
    mac::HMAC_SHA256,
    mac::HMAC_SHA512,
];

pub const COMPRESSION_ALGORITHMS: &[compression::Name] = &[compression::NONE, compression::ZLIB];

/// Modern host key algorithms.
pub const KEY_TYPES: &[Algorithm] = &[
    Algorithm::Ed25519,
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP256,
    },
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP384,
    },
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP521,
    },
    Algorithm::Rsa {
        hash: Some(HashAlg::Sha256),
    },
    Algorithm::Rsa {
        hash: Some(HashAlg::Sha512),
    },
];

/// Builds the `Preferred` algorithm set used for every dial.
pub fn preferred() -> Preferred {
    Preferred {
        kex: Cow::Borrowed(KEX_ORDER),
        key: Cow::Borrowed(KEY_TYPES),
        cipher: Cow::Borrowed(CIPHERS),
        mac: Cow::Borrowed(MAC_ALGORITHMS),
        compression: Cow::Borrowed(COMPRESSION_ALGORITHMS),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excludes_weak_algorithms() {
        let p = preferred();
        assert!(p.kex.iter().all(|a| *a != kex::NONE));
        assert!(p.cipher.iter().all(|a| *a != cipher::NONE && *a != cipher::CLEAR));
        assert!(p.mac.iter().all(|a| *a != mac::NONE));
    }
}
