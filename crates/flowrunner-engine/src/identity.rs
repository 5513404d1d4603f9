//! Randomized per-user identity: source IP, User-Agent, and a couple of
//! rotating extra headers.

use rand::seq::IndexedRandom;
use rand::Rng;

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_4 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Mobile/15E148 Safari/604.1",
    "Mozilla/5.0 (Android 14; Mobile; rv:125.0) Gecko/125.0 Firefox/125.0",
];

const ACCEPT_LANGUAGES: &[&str] = &["en-US,en;q=0.9", "en-GB,en;q=0.8", "de-DE,de;q=0.9,en;q=0.8", "fr-FR,fr;q=0.9"];

#[derive(Clone, Debug)]
pub struct Identity {
    pub source_ip: String,
    pub user_agent: String,
    pub accept_language: String,
}

impl Identity {
    pub fn random() -> Self {
        let mut rng = rand::rng();
        Identity {
            source_ip: random_ipv4(&mut rng),
            user_agent: USER_AGENTS.choose(&mut rng).unwrap().to_string(),
            accept_language: ACCEPT_LANGUAGES.choose(&mut rng).unwrap().to_string(),
        }
    }
}

fn random_ipv4(rng: &mut impl Rng) -> String {
    // Avoid 0.x, 127.x, and 255.x so the generated address reads as a
    // plausible public client address.
    let a = rng.random_range(1..=223);
    let b = rng.random_range(0..=255);
    let c = rng.random_range(0..=255);
    let d = rng.random_range(1..=254);
    format!("{a}.{b}.{c}.{d}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_identity_has_plausible_ip() {
        for _ in 0..50 {
            let id = Identity::random();
            let octets: Vec<u8> = id.source_ip.split('.').map(|s| s.parse().unwrap()).collect();
            assert_eq!(octets.len(), 4);
            assert_ne!(octets[0], 0);
            assert_ne!(octets[0], 127);
        }
    }
}
