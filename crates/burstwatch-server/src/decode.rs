use axum::http::{header, HeaderMap, Uri};
use chrono::Utc;
use serde_json::{Map, Value};
use url::Url;

use burstwatch_core::event::{BeaconPayload, ClientSignals, Event, IdentitySeed};

use crate::geo::{self, GeoIpDb};

/// Build a normalized [`Event`] from one beacon request.
///
/// Never fails: every field the client or the edge omitted gets a default.
/// Values from the beacon body take precedence over values derived from
/// request headers.
pub fn decode_event(
    headers: &HeaderMap,
    uri: &Uri,
    body: Value,
    geoip: Option<&GeoIpDb>,
) -> Event {
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    let ua = classify_user_agent(&user_agent);
    let payload = BeaconPayload::from_value(&body);
    let ip = extract_client_ip(headers);

    let path = match payload.path.as_deref() {
        Some(p) => normalize_path(p),
        None => normalize_path(uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/")),
    };

    let referrer = payload
        .referrer
        .clone()
        .or_else(|| header_value(headers, header::REFERER.as_str()))
        .unwrap_or_else(|| "none".to_string());

    let language = payload
        .language
        .clone()
        .or_else(|| {
            header_value(headers, header::ACCEPT_LANGUAGE.as_str())
                .and_then(|v| v.split(',').next().map(|s| s.trim().to_string()))
                .filter(|s| !s.is_empty())
        })
        .unwrap_or_else(|| "unknown".to_string());

    let mut geo = geo::from_edge_headers(headers);
    if let Some(db) = geoip {
        if geo::lacks_location(&geo) {
            db.fill(&ip, &mut geo);
        }
    }

    Event {
        identity: IdentitySeed {
            ip,
            device: payload.device.clone().unwrap_or(ua.device),
            browser: payload.browser.clone().unwrap_or(ua.browser),
            path,
            fp_hash: payload.fp_hash.clone(),
            click_id: payload.click_id.clone(),
        },
        received_at: Utc::now(),
        geo,
        signals: ClientSignals {
            os: payload.os.clone().unwrap_or(ua.os),
            language,
            languages: payload.languages,
            timezone: payload.timezone,
            timezone_offset_min: payload.timezone_offset_min,
            referrer,
            extra: payload.extra,
            color: payload.color,
            screen: payload.screen,
            hw: payload.hw,
            net: payload.net,
            battery: payload.battery,
            gpu: payload.gpu,
        },
        user_agent,
        raw_headers: headers_to_json(headers),
        raw_body: body,
    }
}

/// Extract the client IP: first `X-Forwarded-For` entry, then `X-Real-IP`.
///
/// Falls back to `"unknown"` when neither header is present.
pub fn extract_client_ip(headers: &HeaderMap) -> String {
    header_value(headers, "x-forwarded-for")
        .and_then(|s| s.split(',').next().map(|s| s.trim().to_string()))
        .filter(|s| !s.is_empty())
        .or_else(|| header_value(headers, "x-real-ip"))
        .unwrap_or_else(|| "unknown".to_string())
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Coarse client classes used in the identity key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UaClass {
    pub browser: String,
    pub os: String,
    pub device: String,
}

/// Classify a `User-Agent` string via the `woothee` crate.
///
/// Device classes: `"Android"`, `"iPhone"` (any iOS device), `"Mobile"`
/// (other handsets and tablets) and `"PC"`. Unknown UAs classify as
/// `Unknown` / `Unknown` / `PC`.
pub fn classify_user_agent(user_agent: &str) -> UaClass {
    let unknown = UaClass {
        browser: "Unknown".to_string(),
        os: "Unknown".to_string(),
        device: "PC".to_string(),
    };
    if user_agent.trim().is_empty() {
        return unknown;
    }
    let Some(result) = woothee::parser::Parser::new().parse(user_agent) else {
        return unknown;
    };

    // woothee reports "UNKNOWN" for fields it could not determine.
    let known = |value: &str| {
        if value.is_empty() || value == "UNKNOWN" {
            "Unknown".to_string()
        } else {
            value.to_string()
        }
    };

    let os = known(result.os);
    let device = match result.category {
        "smartphone" | "mobilephone" | "tablet" => {
            if os.contains("Android") {
                "Android"
            } else if ["iPhone", "iPad", "iPod", "iOS"].iter().any(|ios| os.contains(ios)) {
                "iPhone"
            } else {
                "Mobile"
            }
        }
        _ => "PC",
    }
    .to_string();

    UaClass {
        browser: known(result.name),
        os,
        device,
    }
}

/// Reduce a path or URL to its pathname: query and fragment are dropped and
/// absolute URLs lose their origin. Relative segments are resolved.
pub fn normalize_path(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return "/".to_string();
    }
    let resolved = Url::parse("https://collector.invalid/")
        .and_then(|base| base.join(trimmed))
        .map(|url| url.path().to_string());
    match resolved {
        Ok(path) if !path.is_empty() => path,
        _ => {
            let without_query = trimmed.split(['?', '#']).next().unwrap_or(trimmed);
            if without_query.is_empty() {
                "/".to_string()
            } else {
                without_query.to_string()
            }
        }
    }
}

/// Headers as a JSON object for the diagnostic payload. Repeated headers are
/// joined with `", "`; non-UTF-8 values are decoded lossily.
pub fn headers_to_json(headers: &HeaderMap) -> Value {
    let mut map = Map::new();
    for name in headers.keys() {
        let joined = headers
            .get_all(name)
            .iter()
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
            .collect::<Vec<_>>()
            .join(", ");
        map.insert(name.as_str().to_string(), Value::String(joined));
    }
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;
    use serde_json::json;

    use super::*;

    const CHROME_WINDOWS: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
        (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
    const SAFARI_IPHONE: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) \
        AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1";
    const CHROME_ANDROID: &str = "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 \
        (KHTML, like Gecko) Chrome/120.0.0.0 Mobile Safari/537.36";

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn client_ip_prefers_first_forwarded_entry() {
        let h = headers(&[
            ("x-forwarded-for", "203.0.113.7, 10.0.0.1"),
            ("x-real-ip", "198.51.100.2"),
        ]);
        assert_eq!(extract_client_ip(&h), "203.0.113.7");

        let h = headers(&[("x-real-ip", "198.51.100.2")]);
        assert_eq!(extract_client_ip(&h), "198.51.100.2");

        assert_eq!(extract_client_ip(&HeaderMap::new()), "unknown");
    }

    #[test]
    fn user_agents_map_to_device_classes() {
        let desktop = classify_user_agent(CHROME_WINDOWS);
        assert_eq!(desktop.browser, "Chrome");
        assert_eq!(desktop.device, "PC");

        assert_eq!(classify_user_agent(SAFARI_IPHONE).device, "iPhone");
        assert_eq!(classify_user_agent(CHROME_ANDROID).device, "Android");

        let empty = classify_user_agent("");
        assert_eq!(empty.browser, "Unknown");
        assert_eq!(empty.os, "Unknown");
        assert_eq!(empty.device, "PC");
    }

    #[test]
    fn paths_keep_only_the_pathname() {
        assert_eq!(normalize_path("/pricing?utm_source=x#top"), "/pricing");
        assert_eq!(normalize_path("https://example.com/blog/post?id=1"), "/blog/post");
        assert_eq!(normalize_path(""), "/");
        assert_eq!(normalize_path("/a/../b"), "/b");
        assert_eq!(normalize_path("/Case/Kept"), "/Case/Kept");
    }

    #[test]
    fn body_values_override_header_derivations() {
        let h = headers(&[
            ("user-agent", "Mozilla/5.0 (Windows NT 10.0; Win64; x64) Chrome/120.0.0.0"),
            ("x-forwarded-for", "203.0.113.7"),
            ("accept-language", "fr-FR,fr;q=0.9"),
            ("referer", "https://news.example/"),
            ("x-vercel-ip-country", "fr"),
        ]);
        let body = json!({
            "path": "/landing?x=1",
            "browser": "Brave",
            "device": "Tablet",
            "fpHash": "abc123",
            "click_id": "c-9",
            "timezone": "Europe/Paris",
            "ref": "https://twitter.example/"
        });
        let uri: Uri = "/api/alert".parse().expect("uri");

        let event = decode_event(&h, &uri, body.clone(), None);
        assert_eq!(event.identity.ip, "203.0.113.7");
        assert_eq!(event.identity.browser, "Brave");
        assert_eq!(event.identity.device, "Tablet");
        assert_eq!(event.identity.path, "/landing");
        assert_eq!(event.identity.fp_hash.as_deref(), Some("abc123"));
        assert_eq!(event.identity.click_id.as_deref(), Some("c-9"));
        assert_eq!(event.signals.language, "fr-FR");
        assert_eq!(event.signals.referrer, "https://twitter.example/");
        assert_eq!(event.signals.timezone.as_deref(), Some("Europe/Paris"));
        assert_eq!(event.geo.country_code, "FR");
        assert_eq!(event.raw_body, body);
        assert_eq!(event.raw_headers["x-forwarded-for"], "203.0.113.7");
    }

    #[test]
    fn empty_request_gets_defaults() {
        let uri: Uri = "/api/alert?foo=bar".parse().expect("uri");
        let event = decode_event(&HeaderMap::new(), &uri, json!({}), None);
        assert_eq!(event.identity.ip, "unknown");
        assert_eq!(event.identity.path, "/api/alert");
        assert_eq!(event.identity.device, "PC");
        assert_eq!(event.identity.browser, "Unknown");
        assert_eq!(event.identity.fp_hash, None);
        assert_eq!(event.signals.language, "unknown");
        assert_eq!(event.signals.referrer, "none");
        assert_eq!(event.identity.key(), "unknown|PC|Unknown|/api/alert|-|-");
    }

    #[test]
    fn repeated_headers_are_joined() {
        let h = headers(&[("x-test", "a"), ("x-test", "b")]);
        assert_eq!(headers_to_json(&h), json!({ "x-test": "a, b" }));
    }
}
