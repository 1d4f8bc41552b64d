use std::net::IpAddr;
use std::path::Path;
use std::str::FromStr;

use axum::http::HeaderMap;

use burstwatch_core::event::Geo;

// Edge headers set by the hosting platform in front of the collector.
const CITY_HEADER: &str = "x-vercel-ip-city";
const REGION_HEADERS: &[&str] = &["x-vercel-ip-country-region", "x-vercel-ip-region"];
const COUNTRY_HEADER: &str = "x-vercel-ip-country";
const ASN_HEADER: &str = "x-vercel-ip-asn";
const LATITUDE_HEADER: &str = "x-vercel-ip-latitude";
const LONGITUDE_HEADER: &str = "x-vercel-ip-longitude";

/// Read location facts from upstream edge headers. Missing headers leave the
/// corresponding field empty; the country code is upper-cased.
pub fn from_edge_headers(headers: &HeaderMap) -> Geo {
    Geo {
        city: header(headers, CITY_HEADER),
        region: REGION_HEADERS
            .iter()
            .map(|name| header(headers, name))
            .find(|v| !v.is_empty())
            .unwrap_or_default(),
        country_code: header(headers, COUNTRY_HEADER).to_ascii_uppercase(),
        asn: header(headers, ASN_HEADER),
        latitude: header(headers, LATITUDE_HEADER),
        longitude: header(headers, LONGITUDE_HEADER),
    }
}

fn header(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

/// MaxMind City database, opened once at startup.
///
/// Only consulted when the edge supplied no city, region or country, e.g.
/// when the collector runs behind a plain reverse proxy.
pub struct GeoIpDb {
    reader: maxminddb::Reader<Vec<u8>>,
}

impl GeoIpDb {
    /// Returns `None` if the file is absent or unreadable. Non-fatal: events
    /// then carry whatever the edge headers provided.
    pub fn open(path: &str) -> Option<Self> {
        if !Path::new(path).exists() {
            return None;
        }
        match maxminddb::Reader::open_readfile(path) {
            Ok(reader) => Some(Self { reader }),
            Err(e) => {
                tracing::warn!(geoip_path = %path, error = %e, "Failed to open GeoIP database");
                None
            }
        }
    }

    /// Fill city/region/country (and coordinates, if empty) for `ip`.
    pub fn fill(&self, ip: &str, geo: &mut Geo) {
        let Ok(ip_addr) = IpAddr::from_str(ip) else {
            return;
        };
        let Ok(record) = self.reader.lookup::<maxminddb::geoip2::City>(ip_addr) else {
            return;
        };

        if let Some(code) = record.country.as_ref().and_then(|c| c.iso_code) {
            geo.country_code = code.to_ascii_uppercase();
        }

        if let Some(region) = record
            .subdivisions
            .as_ref()
            .and_then(|subs| subs.first())
            .and_then(|sub| sub.names.as_ref())
            .and_then(|names| names.get("en"))
        {
            geo.region = region.to_string();
        }

        if let Some(city) = record
            .city
            .as_ref()
            .and_then(|c| c.names.as_ref())
            .and_then(|names| names.get("en"))
        {
            geo.city = city.to_string();
        }

        if geo.latitude.is_empty() && geo.longitude.is_empty() {
            if let Some(location) = record.location.as_ref() {
                if let (Some(lat), Some(lon)) = (location.latitude, location.longitude) {
                    geo.latitude = lat.to_string();
                    geo.longitude = lon.to_string();
                }
            }
        }
    }
}

/// True when the edge provided none of city, region or country.
pub fn lacks_location(geo: &Geo) -> bool {
    geo.city.is_empty() && geo.region.is_empty() && geo.country_code.is_empty()
}
