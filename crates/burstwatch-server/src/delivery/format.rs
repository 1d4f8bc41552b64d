use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde_json::{json, Value};

use burstwatch_core::{burst::BurstSnapshot, event::Geo};

pub const EMBED_TITLE: &str = "New Visit (aggregated)";
pub const EMBED_COLOR: u32 = 0x00A3FF;
pub const FALLBACK_MESSAGE: &str = "⚠️ Alert too large; sent minimal summary.";

/// Webhook limit for a single embed field value, in characters.
pub const FIELD_VALUE_MAX_CHARS: usize = 1024;

const TRIM_MARKER: &str = "\n…trimmed…";
const TRIM_HEADROOM: usize = 100;
const EMPTY: &str = "—";

/// Primary message: one embed summarizing the burst.
pub fn summary_payload(snapshot: &BurstSnapshot, display_tz: Tz) -> Value {
    let event = &snapshot.latest_event;
    let identity = &event.identity;
    let signals = &event.signals;
    let score = &snapshot.latest_score;

    let mut fields = Fields::default();
    fields.push("Count (deduped)", snapshot.count.to_string(), true);
    fields.push(
        "When",
        format!(
            "{} → {}",
            format_local(snapshot.first_seen_at, display_tz),
            format_local(snapshot.last_seen_at, display_tz)
        ),
        false,
    );
    fields.push(
        "VPN/Proxy",
        format!("{} ({}/100)", score.tier.as_str(), score.score),
        true,
    );
    fields.push(
        "VPN hints",
        if score.reasons.is_empty() {
            EMPTY.to_string()
        } else {
            score.reasons.join(" • ")
        },
        false,
    );
    fields.push(
        "Device / OS / Browser",
        format!("{} / {} / {}", identity.device, signals.os, identity.browser),
        false,
    );
    fields.push("Approx Location", approx_location(&event.geo), false);
    fields.push("IP", identity.ip.clone(), true);
    fields.push("Path", or_default(&identity.path, "/"), true);
    fields.push("Referrer", or_default(&signals.referrer, "none"), true);

    let languages = signals
        .languages
        .as_ref()
        .map(|all| format!(" ({})", all.join(", ")))
        .unwrap_or_default();
    fields.push(
        "Lang / TZ",
        format!(
            "{}{} / {}",
            signals.language,
            languages,
            signals.timezone.as_deref().unwrap_or(EMPTY)
        ),
        false,
    );
    fields.push(
        "TZ offset (min)",
        signals
            .timezone_offset_min
            .map(|m| m.to_string())
            .unwrap_or_else(|| EMPTY.to_string()),
        true,
    );
    fields.push(
        "FP Hash",
        identity.fp_hash.clone().unwrap_or_else(|| EMPTY.to_string()),
        true,
    );
    fields.push(
        "Click ID",
        identity.click_id.clone().unwrap_or_else(|| EMPTY.to_string()),
        true,
    );

    if let Some(extra) = &signals.extra {
        fields.push(
            "Platform/Vendor",
            format!(
                "{} / {}",
                extra.platform.as_deref().unwrap_or("-"),
                extra.vendor.as_deref().unwrap_or("-")
            ),
            true,
        );
        fields.push(
            "Touch/Cookies/DNT",
            format!(
                "touch={} • cookies={} • dnt={}",
                number(extra.max_touch_points.or(Some(0.0))),
                if extra.cookie_enabled.unwrap_or(false) { "on" } else { "off" },
                extra.do_not_track.as_deref().unwrap_or("n/a")
            ),
            false,
        );
        if let Some(hints) = &extra.user_agent_data {
            fields.push(
                "UA-CH",
                format!(
                    "{} • {} • {}",
                    hints.platform.as_deref().unwrap_or("-"),
                    if hints.mobile.unwrap_or(false) { "mobile" } else { "desktop" },
                    hints.brands.as_deref().unwrap_or_default().join(", ")
                ),
                false,
            );
        }
    }

    if let Some(color) = &signals.color {
        fields.push(
            "Color/Prefs",
            format!(
                "{} • gamut={} • hdr={} • motion={} • contrast={}",
                color.scheme.as_deref().unwrap_or("-"),
                color.gamut.as_deref().unwrap_or("-"),
                color.hdr.as_deref().unwrap_or("-"),
                color.prefers_reduced_motion.as_deref().unwrap_or("-"),
                color.prefers_contrast.as_deref().unwrap_or("-")
            ),
            false,
        );
    }

    if let Some(screen) = &signals.screen {
        fields.push(
            "Screen",
            format!(
                "{}×{} ({}-bit) • dpr={} • avail={}×{} • inner={}×{}",
                number(screen.w),
                number(screen.h),
                number(screen.color_depth),
                number(screen.dpr),
                number(screen.avail_w),
                number(screen.avail_h),
                number(screen.inner_w),
                number(screen.inner_h)
            ),
            false,
        );
    }

    if let Some(hw) = &signals.hw {
        fields.push(
            "Hardware",
            format!("{} cores • {} GB RAM", number(hw.cores), number(hw.memory_gb)),
            true,
        );
    }

    if let Some(net) = &signals.net {
        fields.push(
            "Network",
            format!(
                "{} • {} Mb/s",
                net.kind.as_deref().unwrap_or("-"),
                number(net.downlink)
            ),
            true,
        );
    }

    if let Some(battery) = &signals.battery {
        let percent = (battery.level.unwrap_or(0.0) * 100.0).round();
        fields.push(
            "Battery",
            format!(
                "{}% • {}",
                number(Some(percent)),
                if battery.charging.unwrap_or(false) { "⚡ charging" } else { "idle" }
            ),
            true,
        );
    }

    if let Some(gpu) = &signals.gpu {
        fields.push(
            "GPU",
            format!(
                "{} • maxTex={} • exts={}",
                gpu.renderer
                    .as_deref()
                    .or(gpu.vendor.as_deref())
                    .unwrap_or("-"),
                number(gpu.max_texture_size),
                gpu.extensions
                    .as_ref()
                    .map(|exts| exts.join(", "))
                    .unwrap_or_else(|| "-".to_string())
            ),
            false,
        );
    }

    if !score.reverse_dns_hostname.is_empty() {
        fields.push("rDNS", score.reverse_dns_hostname.clone(), false);
    }
    if !score.asn.is_empty() {
        fields.push("ASN", score.asn.clone(), false);
    }

    json!({
        "embeds": [{
            "title": EMBED_TITLE,
            "color": EMBED_COLOR,
            "fields": fields.0,
            "timestamp": snapshot.last_seen_at.to_rfc3339(),
        }]
    })
}

/// Secondary message: request headers, body and raw UA as a JSON code block.
pub fn debug_payload(snapshot: &BurstSnapshot, max_chars: usize) -> Value {
    let event = &snapshot.latest_event;
    let blob = json!({
        "headers": event.raw_headers,
        "body": event.raw_body,
        "rawUa": event.user_agent,
    });
    let pretty = serde_json::to_string_pretty(&blob).unwrap_or_else(|_| blob.to_string());
    json!({ "content": format!("```json\n{}\n```", trim_with_marker(&pretty, max_chars)) })
}

/// Sent once, in place of the remaining payloads, when the sink rejects one.
pub fn fallback_payload() -> Value {
    json!({ "content": FALLBACK_MESSAGE })
}

/// Keep `text` as is when it fits in `max_chars`; otherwise keep the first
/// `max_chars - 100` characters and append a trim marker.
pub fn trim_with_marker(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_chars.saturating_sub(TRIM_HEADROOM)).collect();
    format!("{kept}{TRIM_MARKER}")
}

/// `M/D/YYYY, h:mm:ss AM` in `tz`.
pub fn format_local(at: DateTime<Utc>, tz: Tz) -> String {
    at.with_timezone(&tz)
        .format("%-m/%-d/%Y, %-I:%M:%S %p")
        .to_string()
}

/// Regional-indicator flag for an ISO 3166-1 alpha-2 code; empty otherwise.
pub fn flag_emoji(country_code: &str) -> String {
    let code = country_code.trim();
    if code.len() != 2 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return String::new();
    }
    code.to_ascii_uppercase()
        .chars()
        .filter_map(|c| char::from_u32(0x1F1E6 + (c as u32 - 'A' as u32)))
        .collect()
}

fn approx_location(geo: &Geo) -> String {
    if geo.city.is_empty() && geo.region.is_empty() && geo.country_code.is_empty() {
        return "Unknown".to_string();
    }
    let mut out = String::new();
    for part in [&geo.city, &geo.region] {
        if !part.is_empty() {
            out.push_str(part);
            out.push_str(", ");
        }
    }
    out.push_str(&geo.country_code);
    let flag = flag_emoji(&geo.country_code);
    if !flag.is_empty() {
        out.push(' ');
        out.push_str(&flag);
    }
    if !geo.latitude.is_empty() && !geo.longitude.is_empty() {
        out.push_str(&format!(" ({}, {})", geo.latitude, geo.longitude));
    }
    out
}

fn or_default(value: &str, default: &str) -> String {
    if value.is_empty() {
        default.to_string()
    } else {
        value.to_string()
    }
}

/// Integral values print without a fractional part, as the browser sent them.
fn number(value: Option<f64>) -> String {
    match value {
        Some(v) if v.fract() == 0.0 && v.abs() < 1e15 => format!("{}", v as i64),
        Some(v) => v.to_string(),
        None => "-".to_string(),
    }
}

#[derive(Default)]
struct Fields(Vec<Value>);

impl Fields {
    fn push(&mut self, name: &str, value: String, inline: bool) {
        let value = if value.chars().count() > FIELD_VALUE_MAX_CHARS {
            let mut capped: String = value.chars().take(FIELD_VALUE_MAX_CHARS - 1).collect();
            capped.push('…');
            capped
        } else if value.is_empty() {
            EMPTY.to_string()
        } else {
            value
        };
        self.0.push(json!({ "name": name, "value": value, "inline": inline }));
    }
}
