use serde::Serialize;

use crate::event::{ClientSignals, Geo};

const REFERENCE_COUNTRY: &str = "US";
const REFERENCE_LANGUAGE: &str = "en";

const REFERENCE_TIMEZONES: &[&str] = &[
    "America/Los_Angeles",
    "America/Denver",
    "America/Chicago",
    "America/New_York",
    "America/Phoenix",
    "America/Anchorage",
    "Pacific/Honolulu",
];

const ENGLISH_DOMINANT_COUNTRIES: &[&str] = &["GB", "CA", "AU", "NZ", "IE"];

// Cloud, hosting and consumer-VPN operators as they appear in ASN org names.
const ASN_HINTS: &[&str] = &[
    "m247",
    "ovh",
    "digitalocean",
    "linode",
    "choopa",
    "contabo",
    "hetzner",
    "leaseweb",
    "vultr",
    "azure",
    "amazon",
    "aws",
    "google",
    "gcp",
    "cloudflare",
    "warp",
    "mullvad",
    "proton",
    "surfshark",
    "windscribe",
    "airvpn",
    "privateinternetaccess",
    "hivelocity",
    "nocix",
    "colo",
];

const RDNS_HINTS: &[&str] = &[
    "vpn",
    "proxy",
    "m247",
    "ovh",
    "aws",
    "amazonaws",
    "compute",
    "google",
    "gcp",
    "cloud",
    "azure",
    "linode",
    "digitalocean",
    "mullvad",
    "proton",
    "surfshark",
    "windscribe",
    "airvpn",
    "piavpn",
    "leaseweb",
    "contabo",
    "choopa",
    "colo",
    "nocix",
];

const TIMEZONE_MISMATCH_POINTS: u32 = 20;
const NON_ENGLISH_IN_REFERENCE_POINTS: u32 = 10;
const ENGLISH_ABROAD_POINTS: u32 = 5;
const ASN_POINTS: u32 = 35;
const RDNS_POINTS: u32 = 35;

pub const MEDIUM_THRESHOLD: u8 = 35;
pub const HIGH_THRESHOLD: u8 = 70;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Tier {
    Low,
    Medium,
    High,
}

impl Tier {
    pub fn from_score(score: u8) -> Self {
        if score >= HIGH_THRESHOLD {
            Tier::High
        } else if score >= MEDIUM_THRESHOLD {
            Tier::Medium
        } else {
            Tier::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Low => "Low",
            Tier::Medium => "Medium",
            Tier::High => "High",
        }
    }
}

/// Proxy/VPN likelihood attached to an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScoreResult {
    /// 0..=100.
    pub score: u8,
    pub tier: Tier,
    /// Contributing factors in evaluation order.
    pub reasons: Vec<String>,
    /// Empty when the lookup failed, timed out, or found nothing.
    pub reverse_dns_hostname: String,
    pub asn: String,
}

/// Apply the additive rule set to one event.
///
/// Pure: identical inputs (including `hostname`) always yield an identical
/// result. Each rule only ever adds points; the total is clamped to 100.
pub fn evaluate(geo: &Geo, signals: &ClientSignals, hostname: &str) -> ScoreResult {
    let mut score = 0_u32;
    let mut reasons: Vec<String> = Vec::new();
    let mut bump = |points: u32, reason: String| {
        score += points;
        reasons.push(reason);
    };

    let country = geo.country_code.trim().to_ascii_uppercase();
    let in_reference_country = country == REFERENCE_COUNTRY;

    let timezone = signals.timezone.as_deref().unwrap_or_default().trim();
    if !timezone.is_empty() && !country.is_empty() {
        let reference_zone = REFERENCE_TIMEZONES.contains(&timezone);
        if reference_zone != in_reference_country {
            bump(
                TIMEZONE_MISMATCH_POINTS,
                "Timezone vs country mismatch".to_string(),
            );
        }
    }

    let language = signals.language.trim().to_lowercase();
    if !language.is_empty() && !country.is_empty() {
        let speaks_reference = language.starts_with(REFERENCE_LANGUAGE);
        if in_reference_country && !speaks_reference {
            bump(
                NON_ENGLISH_IN_REFERENCE_POINTS,
                "Non-EN language in US".to_string(),
            );
        }
        if !in_reference_country
            && speaks_reference
            && !ENGLISH_DOMINANT_COUNTRIES.contains(&country.as_str())
        {
            bump(
                ENGLISH_ABROAD_POINTS,
                "English outside EN-dominant country".to_string(),
            );
        }
    }

    if contains_any(&geo.asn, ASN_HINTS) {
        bump(ASN_POINTS, format!("ASN: {}", geo.asn));
    }

    if contains_any(hostname, RDNS_HINTS) {
        bump(RDNS_POINTS, format!("rDNS: {hostname}"));
    }

    let score = score.min(100) as u8;
    ScoreResult {
        score,
        tier: Tier::from_score(score),
        reasons,
        reverse_dns_hostname: hostname.to_string(),
        asn: geo.asn.clone(),
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    if haystack.is_empty() {
        return false;
    }
    let lowered = haystack.to_lowercase();
    needles.iter().any(|needle| lowered.contains(needle))
}
