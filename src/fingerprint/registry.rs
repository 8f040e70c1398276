//! Browser profile registry.
//!
//! A fixed table of browser identities. Each entry pairs a JA3 string (and a
//! JA4R string where one is known) with the headers that browser sends on a
//! top-level navigation. Adding a browser is one entry in [`BUILTIN`].

use std::sync::OnceLock;

use super::http2::Http2Settings;

/// Engine family; selects GREASE, default signature algorithms and HTTP/2
/// SETTINGS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserFamily {
    Chromium,
    Firefox,
    Safari,
}

impl BrowserFamily {
    /// Guess the family from a User-Agent string.
    pub fn from_user_agent(user_agent: &str) -> Option<Self> {
        if user_agent.contains("Firefox/") {
            Some(Self::Firefox)
        } else if ["Chrome/", "Chromium/", "Edg/", "OPR/"]
            .iter()
            .any(|marker| user_agent.contains(marker))
        {
            Some(Self::Chromium)
        } else if user_agent.contains("Safari/") {
            Some(Self::Safari)
        } else {
            None
        }
    }

    /// Chromium sends GREASE in every ClientHello.
    pub fn uses_grease(&self) -> bool {
        matches!(self, Self::Chromium)
    }

    pub fn default_signature_algorithms(&self) -> &'static [u16] {
        match self {
            Self::Chromium | Self::Safari => &[
                0x0403, 0x0804, 0x0401, 0x0503, 0x0805, 0x0501, 0x0806, 0x0601,
            ],
            Self::Firefox => &[
                0x0403, 0x0503, 0x0603, 0x0804, 0x0805, 0x0806, 0x0401, 0x0501, 0x0601, 0x0203,
                0x0201,
            ],
        }
    }

    pub fn http2_settings(&self) -> Http2Settings {
        match self {
            Self::Chromium => Http2Settings::chrome(),
            Self::Firefox => Http2Settings::firefox(),
            Self::Safari => Http2Settings::safari(),
        }
    }
}

/// A registered browser identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserProfile {
    pub name: &'static str,
    pub ja3: &'static str,
    pub ja4r: Option<&'static str>,
    pub default_user_agent: &'static str,
    /// Headers in the order the browser emits them (User-Agent excluded).
    pub default_headers: &'static [(&'static str, &'static str)],
    /// Lower-case header names in wire order.
    pub header_order: &'static [&'static str],
    /// HTTP/2 fingerprint in Akamai form.
    pub http2: &'static str,
    pub family: BrowserFamily,
}

/// Immutable name -> profile table.
#[derive(Debug)]
pub struct Registry {
    entries: Vec<(&'static str, &'static BrowserProfile)>,
}

impl Registry {
    /// The built-in table, initialised on first use.
    pub fn builtin() -> &'static Registry {
        static REGISTRY: OnceLock<Registry> = OnceLock::new();
        REGISTRY.get_or_init(|| Registry {
            entries: BUILTIN
                .iter()
                .map(|profile| (profile.name, profile))
                .chain(ALIASES.iter().filter_map(|(alias, target)| {
                    BUILTIN
                        .iter()
                        .find(|profile| profile.name == *target)
                        .map(|profile| (*alias, profile))
                }))
                .collect(),
        })
    }

    /// Exact, case-sensitive lookup.
    pub fn lookup(&self, name: &str) -> Option<&'static BrowserProfile> {
        self.entries
            .iter()
            .find(|(entry, _)| *entry == name)
            .map(|(_, profile)| *profile)
    }

    /// Every registered name, aliases included.
    pub fn names(&self) -> Vec<&'static str> {
        self.entries.iter().map(|(name, _)| *name).collect()
    }
}

const ALIASES: &[(&str, &str)] = &[("chrome", "chrome142"), ("firefox", "firefox144")];

const CHROME_142_JA3: &str = "771,4865-4866-4867-49195-49199-49196-49200-52393-52392-49171-49172-156-157-47-53,65281-27-51-13-0-11-10-5-18-35-43-45-17613-23-65037-16-41,4588-29-23-24,0";
const CHROME_120_JA3: &str = "771,4865-4866-4867-49195-49199-49196-49200-52393-52392-49171-49172-156-157-47-53,0-5-10-11-13-16-18-21-23-27-35-43-45-51-17513-65037-65281-41,29-23-24,0";
const FIREFOX_144_JA3: &str = "771,4865-4867-4866-49195-49199-52393-52392-49196-49200-49162-49161-49171-49172-156-157-47-53,0-23-65281-10-11-35-16-5-34-18-51-43-13-45-28-27-65037,4588-29-23-24-25-256-257,0";
const SAFARI_JA3: &str = "771,4865-4866-4867-49196-49195-52393-49200-49199-52392-49162-49161-49172-49171-157-156-53-47-49160-49170-10,0-23-65281-10-11-16-5-13-18-51-45-43-27-21,29-23-24-25,0";

const CHROME_JA4R: &str = "t13d1515h2_002f,0035,009c,009d,1301,1302,1303,c013,c014,c02b,c02c,c02f,c030,cca8,cca9_0005,000a,000b,000d,0012,0017,001b,0023,002b,002d,0033,4469,ff01_0403,0804,0401,0503,0805,0501,0806,0601";
const FIREFOX_JA4R: &str = "t13d1717h2_002f,0035,009c,009d,1301,1302,1303,c009,c00a,c013,c014,c02b,c02c,c02f,c030,cca8,cca9_0005,000a,000b,000d,0012,0017,001b,001c,0022,0023,002b,002d,0033,fe0d,ff01_0403,0503,0603,0804,0805,0806,0401,0501,0601,0203,0201";
const SAFARI_JA4R: &str = "t13d2613h2_000a,002f,0035,003c,003d,009c,009d,1301,1302,1303,c008,c009,c00a,c012,c013,c014,c023,c024,c027,c028,c02b,c02c,c02f,c030,cca8,cca9_0005,000a,000b,000d,0012,0017,001b,002b,002d,0033,ff01_0403,0804,0401,0503,0805,0501,0806,0601";

const CHROME_H2: &str = "1:65536;2:0;4:6291456;6:262144|15663105|0:256:true|m,a,s,p";
const CHROMIUM_H2: &str = "1:65536;2:0;3:1000;4:6291456;6:262144|15663105|0:256:true|m,a,s,p";
const FIREFOX_H2: &str = "1:65536;2:0;4:131072;5:16384|12517377|0:42:false|m,p,a,s";
const SAFARI_H2: &str = "2:0;3:100;4:2097152;9:1|10420225|0:256:false|m,s,a,p";

const CHROME_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.7";
const PLAIN_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

const CHROMIUM_ORDER: &[&str] = &[
    "pragma",
    "host",
    "connection",
    "cache-control",
    "device-memory",
    "viewport-width",
    "rtt",
    "downlink",
    "ect",
    "sec-ch-ua",
    "sec-ch-ua-mobile",
    "sec-ch-ua-full-version",
    "sec-ch-ua-arch",
    "sec-ch-ua-platform",
    "sec-ch-ua-platform-version",
    "sec-ch-ua-model",
    "upgrade-insecure-requests",
    "user-agent",
    "accept",
    "sec-fetch-site",
    "sec-fetch-mode",
    "sec-fetch-user",
    "sec-fetch-dest",
    "referer",
    "accept-encoding",
    "accept-language",
    "cookie",
    "priority",
];

const FIREFOX_ORDER: &[&str] = &[
    "host",
    "connection",
    "cache-control",
    "device-memory",
    "viewport-width",
    "rtt",
    "downlink",
    "ect",
    "sec-ch-ua",
    "sec-ch-ua-mobile",
    "sec-ch-ua-full-version",
    "sec-ch-ua-arch",
    "sec-ch-ua-platform",
    "sec-ch-ua-platform-version",
    "sec-ch-ua-model",
    "user-agent",
    "accept",
    "accept-language",
    "accept-encoding",
    "upgrade-insecure-requests",
    "sec-fetch-dest",
    "sec-fetch-mode",
    "sec-fetch-site",
    "sec-fetch-user",
    "cookie",
    "referer",
    "priority",
    "te",
];

const SAFARI_ORDER: &[&str] = &[
    "host",
    "connection",
    "sec-fetch-dest",
    "user-agent",
    "accept",
    "sec-fetch-site",
    "sec-fetch-mode",
    "accept-language",
    "priority",
    "accept-encoding",
    "referer",
    "cookie",
];

static BUILTIN: &[BrowserProfile] = &[
    BrowserProfile {
        name: "chrome142",
        ja3: CHROME_142_JA3,
        ja4r: Some(CHROME_JA4R),
        default_user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/142.0.0.0 Safari/537.36",
        default_headers: &[
            ("sec-ch-ua", r#""Chromium";v="142", "Google Chrome";v="142", "Not_A Brand";v="99""#),
            ("sec-ch-ua-mobile", "?0"),
            ("sec-ch-ua-platform", r#""Windows""#),
            ("Upgrade-Insecure-Requests", "1"),
            ("Accept", CHROME_ACCEPT),
            ("Sec-Fetch-Site", "none"),
            ("Sec-Fetch-Mode", "navigate"),
            ("Sec-Fetch-User", "?1"),
            ("Sec-Fetch-Dest", "document"),
            ("Accept-Encoding", "gzip, deflate, br, zstd"),
            ("Accept-Language", "en-US,en;q=0.9"),
            ("Priority", "u=0, i"),
        ],
        header_order: CHROMIUM_ORDER,
        http2: CHROME_H2,
        family: BrowserFamily::Chromium,
    },
    BrowserProfile {
        name: "chrome120",
        ja3: CHROME_120_JA3,
        ja4r: Some(CHROME_JA4R),
        default_user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        default_headers: &[
            ("sec-ch-ua", r#""Not_A Brand";v="8", "Chromium";v="120", "Google Chrome";v="120""#),
            ("sec-ch-ua-mobile", "?0"),
            ("sec-ch-ua-platform", r#""Windows""#),
            ("Upgrade-Insecure-Requests", "1"),
            ("Accept", CHROME_ACCEPT),
            ("Sec-Fetch-Site", "none"),
            ("Sec-Fetch-Mode", "navigate"),
            ("Sec-Fetch-User", "?1"),
            ("Sec-Fetch-Dest", "document"),
            ("Accept-Encoding", "gzip, deflate, br"),
            ("Accept-Language", "en-US,en;q=0.9"),
        ],
        header_order: CHROMIUM_ORDER,
        http2: CHROME_H2,
        family: BrowserFamily::Chromium,
    },
    BrowserProfile {
        name: "chromium",
        ja3: CHROME_120_JA3,
        ja4r: Some(CHROME_JA4R),
        default_user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        default_headers: &[
            ("sec-ch-ua", r#""Chromium";v="115", "Not/A)Brand";v="99""#),
            ("sec-ch-ua-mobile", "?0"),
            ("sec-ch-ua-platform", r#""Linux""#),
            ("Accept", CHROME_ACCEPT),
            ("Sec-Fetch-Site", "none"),
            ("Sec-Fetch-Mode", "navigate"),
            ("Sec-Fetch-User", "?1"),
            ("Sec-Fetch-Dest", "document"),
            ("Accept-Encoding", "gzip, deflate, br"),
            ("Accept-Language", "en-US,en;q=0.9"),
        ],
        header_order: CHROMIUM_ORDER,
        http2: CHROMIUM_H2,
        family: BrowserFamily::Chromium,
    },
    BrowserProfile {
        name: "edge",
        ja3: CHROME_142_JA3,
        ja4r: Some(CHROME_JA4R),
        default_user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/142.0.0.0 Safari/537.36 Edg/142.0.0.0",
        default_headers: &[
            ("sec-ch-ua", r#""Chromium";v="142", "Microsoft Edge";v="142", "Not_A Brand";v="99""#),
            ("sec-ch-ua-mobile", "?0"),
            ("sec-ch-ua-platform", r#""Windows""#),
            ("Upgrade-Insecure-Requests", "1"),
            ("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.7"),
            ("Sec-Fetch-Site", "none"),
            ("Sec-Fetch-Mode", "navigate"),
            ("Sec-Fetch-User", "?1"),
            ("Sec-Fetch-Dest", "document"),
            ("Accept-Encoding", "gzip, deflate, br, zstd"),
            ("Accept-Language", "en-US,en;q=0.9"),
            ("Priority", "u=0, i"),
        ],
        header_order: CHROMIUM_ORDER,
        http2: CHROME_H2,
        family: BrowserFamily::Chromium,
    },
    BrowserProfile {
        name: "opera",
        ja3: CHROME_120_JA3,
        ja4r: Some(CHROME_JA4R),
        default_user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/116.0.0.0 Safari/537.36 OPR/101.0.0.0",
        default_headers: &[
            ("sec-ch-ua", r#""Not/A)Brand";v="99", "Opera";v="101", "Chromium";v="115""#),
            ("sec-ch-ua-mobile", "?0"),
            ("sec-ch-ua-platform", r#""Windows""#),
            ("Upgrade-Insecure-Requests", "1"),
            ("Accept", CHROME_ACCEPT),
            ("Sec-Fetch-Site", "none"),
            ("Sec-Fetch-Mode", "navigate"),
            ("Sec-Fetch-User", "?1"),
            ("Sec-Fetch-Dest", "document"),
            ("Accept-Encoding", "gzip, deflate, br"),
            ("Accept-Language", "en-US,en;q=0.9"),
        ],
        header_order: CHROMIUM_ORDER,
        http2: CHROME_H2,
        family: BrowserFamily::Chromium,
    },
    BrowserProfile {
        name: "firefox144",
        ja3: FIREFOX_144_JA3,
        ja4r: Some(FIREFOX_JA4R),
        default_user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:144.0) Gecko/20100101 Firefox/144.0",
        default_headers: &[
            ("Accept", PLAIN_ACCEPT),
            ("Accept-Language", "en-US,en;q=0.5"),
            ("Accept-Encoding", "gzip, deflate, br, zstd"),
            ("Upgrade-Insecure-Requests", "1"),
            ("Sec-Fetch-Dest", "document"),
            ("Sec-Fetch-Mode", "navigate"),
            ("Sec-Fetch-Site", "none"),
            ("Sec-Fetch-User", "?1"),
            ("Priority", "u=0, i"),
            ("TE", "trailers"),
        ],
        header_order: FIREFOX_ORDER,
        http2: FIREFOX_H2,
        family: BrowserFamily::Firefox,
    },
    BrowserProfile {
        name: "safari",
        ja3: SAFARI_JA3,
        ja4r: Some(SAFARI_JA4R),
        default_user_agent: "Mozilla/5.0 (iPad; CPU OS 18_7 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/18.7.3 Mobile/15E148 Safari/604.1",
        default_headers: &[
            ("Sec-Fetch-Dest", "document"),
            ("Accept", PLAIN_ACCEPT),
            ("Sec-Fetch-Site", "none"),
            ("Sec-Fetch-Mode", "navigate"),
            ("Accept-Language", "en-US,en;q=0.9"),
            ("Priority", "u=0, i"),
            ("Accept-Encoding", "gzip, deflate, br"),
        ],
        header_order: SAFARI_ORDER,
        http2: SAFARI_H2,
        family: BrowserFamily::Safari,
    },
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::ja3::Ja3;
    use crate::fingerprint::ja4r::Ja4r;

    #[test]
    fn test_registered_names() {
        let names = Registry::builtin().names();
        for expected in [
            "chrome",
            "chrome142",
            "chrome120",
            "chromium",
            "edge",
            "opera",
            "firefox",
            "firefox144",
            "safari",
        ] {
            assert!(names.contains(&expected), "missing {}", expected);
        }
    }

    #[test]
    fn test_aliases_resolve_to_target() {
        let registry = Registry::builtin();
        assert_eq!(registry.lookup("chrome").unwrap().name, "chrome142");
        assert_eq!(registry.lookup("firefox").unwrap().name, "firefox144");
    }

    #[test]
    fn test_lookup_is_exact() {
        let registry = Registry::builtin();
        assert!(registry.lookup("Chrome").is_none());
        assert!(registry.lookup("chrome ").is_none());
        assert!(registry.lookup("netscape").is_none());
    }

    #[test]
    fn test_every_profile_parses() {
        for profile in BUILTIN {
            Ja3::parse(profile.ja3)
                .unwrap_or_else(|e| panic!("{} JA3 invalid: {}", profile.name, e));
            if let Some(ja4r) = profile.ja4r {
                Ja4r::parse(ja4r)
                    .unwrap_or_else(|e| panic!("{} JA4R invalid: {}", profile.name, e));
            }
            let http2 = Http2Settings::parse(profile.http2)
                .unwrap_or_else(|e| panic!("{} http2 invalid: {}", profile.name, e));
            assert_eq!(http2.akamai_string(), profile.http2);
            assert_eq!(
                BrowserFamily::from_user_agent(profile.default_user_agent),
                Some(profile.family),
                "{} user agent does not match its family",
                profile.name
            );
        }
    }

    #[test]
    fn test_header_order_is_lowercase() {
        for profile in BUILTIN {
            for name in profile.header_order {
                assert_eq!(*name, name.to_ascii_lowercase());
            }
            assert!(profile.header_order.contains(&"user-agent"));
        }
    }

    #[test]
    fn test_family_from_user_agent() {
        assert_eq!(
            BrowserFamily::from_user_agent("Mozilla/5.0 (X11; Linux x86_64; rv:120.0) Gecko/20100101 Firefox/120.0"),
            Some(BrowserFamily::Firefox)
        );
        assert_eq!(
            BrowserFamily::from_user_agent("curl/8.4.0"),
            None
        );
        assert!(BrowserFamily::Chromium.uses_grease());
        assert!(!BrowserFamily::Firefox.uses_grease());
    }
}
