//! IANA code point -> BoringSSL name lookups.
//!
//! BoringSSL configures ciphers, curves and signature algorithms through
//! string lists. A value with no entry here (SCSV, legacy curves, exotic
//! signature schemes) cannot be put on the wire, and the connector refuses
//! a spec that contains one.

use super::grease::is_grease_u16;

pub fn cipher_name(id: u16) -> Option<&'static str> {
    let name = match id {
        0x1301 => "TLS_AES_128_GCM_SHA256",
        0x1302 => "TLS_AES_256_GCM_SHA384",
        0x1303 => "TLS_CHACHA20_POLY1305_SHA256",
        0xc02b => "ECDHE-ECDSA-AES128-GCM-SHA256",
        0xc02f => "ECDHE-RSA-AES128-GCM-SHA256",
        0xc02c => "ECDHE-ECDSA-AES256-GCM-SHA384",
        0xc030 => "ECDHE-RSA-AES256-GCM-SHA384",
        0xcca9 => "ECDHE-ECDSA-CHACHA20-POLY1305",
        0xcca8 => "ECDHE-RSA-CHACHA20-POLY1305",
        0xc013 => "ECDHE-RSA-AES128-SHA",
        0xc014 => "ECDHE-RSA-AES256-SHA",
        0xc009 => "ECDHE-ECDSA-AES128-SHA",
        0xc00a => "ECDHE-ECDSA-AES256-SHA",
        0xc023 => "ECDHE-ECDSA-AES128-SHA256",
        0xc024 => "ECDHE-ECDSA-AES256-SHA384",
        0xc027 => "ECDHE-RSA-AES128-SHA256",
        0xc028 => "ECDHE-RSA-AES256-SHA384",
        0x009c => "AES128-GCM-SHA256",
        0x009d => "AES256-GCM-SHA384",
        0x002f => "AES128-SHA",
        0x0035 => "AES256-SHA",
        0x003c => "AES128-SHA256",
        0x003d => "AES256-SHA256",
        0xc008 => "TLS_ECDHE_ECDSA_WITH_3DES_EDE_CBC_SHA",
        0xc012 => "TLS_ECDHE_RSA_WITH_3DES_EDE_CBC_SHA",
        0x000a => "DES-CBC3-SHA",
        _ => return None,
    };
    Some(name)
}

pub fn group_name(id: u16) -> Option<&'static str> {
    let name = match id {
        0x001d => "X25519",
        0x0017 => "P-256",
        0x0018 => "P-384",
        0x0019 => "P-521",
        0x11ec => "X25519MLKEM768",
        0x6399 => "X25519Kyber768Draft00",
        0x0100 => "ffdhe2048",
        0x0101 => "ffdhe3072",
        _ => return None,
    };
    Some(name)
}

pub fn sigalg_name(id: u16) -> Option<&'static str> {
    let name = match id {
        0x0403 => "ecdsa_secp256r1_sha256",
        0x0503 => "ecdsa_secp384r1_sha384",
        0x0603 => "ecdsa_secp521r1_sha512",
        0x0804 => "rsa_pss_rsae_sha256",
        0x0805 => "rsa_pss_rsae_sha384",
        0x0806 => "rsa_pss_rsae_sha512",
        0x0401 => "rsa_pkcs1_sha256",
        0x0501 => "rsa_pkcs1_sha384",
        0x0601 => "rsa_pkcs1_sha512",
        0x0201 => "rsa_pkcs1_sha1",
        0x0203 => "ecdsa_sha1",
        0x0807 => "ed25519",
        _ => return None,
    };
    Some(name)
}

/// Colon-joined BoringSSL list for the ids that have a name, in input order.
///
/// GREASE values are dropped; BoringSSL inserts its own. Callers reject
/// unknown ids before building the list.
pub fn name_list(ids: &[u16], lookup: fn(u16) -> Option<&'static str>) -> String {
    ids.iter()
        .copied()
        .filter(|id| !is_grease_u16(*id))
        .filter_map(lookup)
        .collect::<Vec<_>>()
        .join(":")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cipher_list_keeps_order() {
        let ids = [0x0a0a, 0x1303, 0x1301, 0xc02b, 0xc02f, 0x002f];
        assert_eq!(
            name_list(&ids, cipher_name),
            "TLS_CHACHA20_POLY1305_SHA256:TLS_AES_128_GCM_SHA256:ECDHE-ECDSA-AES128-GCM-SHA256:ECDHE-RSA-AES128-GCM-SHA256:AES128-SHA"
        );
        assert_eq!(cipher_name(0x00ff), None);
    }

    #[test]
    fn test_group_list() {
        let ids = [0x11ec, 0x001d, 0x0017, 0x0018, 0x0100, 0x0101];
        assert_eq!(
            name_list(&ids, group_name),
            "X25519MLKEM768:X25519:P-256:P-384:ffdhe2048:ffdhe3072"
        );
        assert_eq!(group_name(0x000e), None);
    }

    #[test]
    fn test_sigalg_list() {
        assert_eq!(
            name_list(&[0x0403, 0x0804, 0x0401], sigalg_name),
            "ecdsa_secp256r1_sha256:rsa_pss_rsae_sha256:rsa_pkcs1_sha256"
        );
        assert_eq!(name_list(&[], sigalg_name), "");
    }
}
