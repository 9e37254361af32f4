//! Client address extraction and MaxMind City enrichment for ingested events.

use std::net::IpAddr;
use std::sync::Arc;

use axum::http::HeaderMap;
use maxminddb::Reader;
use tracing::{info, trace, warn};

use pulsetrack_core::event::GeoAttributes;

/// Client IP from `X-Forwarded-For` (first entry), then `X-Real-IP`.
pub fn extract_client_ip(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty());
    let real_ip = || {
        headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    };
    forwarded.or_else(real_ip).map(str::to_string)
}

/// Shared City database reader; `None` when no database is installed.
#[derive(Clone, Default)]
pub struct GeoLookup {
    reader: Option<Arc<Reader<Vec<u8>>>>,
}

impl GeoLookup {
    /// A missing or unreadable database disables enrichment instead of failing startup.
    pub fn open(path: &str) -> Self {
        if !std::path::Path::new(path).exists() {
            warn!(
                geoip_path = %path,
                "GeoIP database not found. Events stored with NULL geo fields."
            );
            return Self::disabled();
        }
        match Reader::open_readfile(path) {
            Ok(reader) => {
                info!(geoip_path = %path, "GeoIP database loaded");
                Self {
                    reader: Some(Arc::new(reader)),
                }
            }
            Err(e) => {
                warn!(geoip_path = %path, error = %e, "GeoIP database unreadable");
                Self::disabled()
            }
        }
    }

    pub fn disabled() -> Self {
        Self { reader: None }
    }

    /// Geo attributes for `ip`. `ip_address` is always carried through;
    /// location fields stay `None` when the lookup cannot resolve them.
    pub fn attributes(&self, ip: Option<&str>) -> GeoAttributes {
        let mut geo = GeoAttributes {
            ip_address: ip.map(str::to_string),
            ..GeoAttributes::default()
        };
        let (Some(reader), Some(ip)) = (self.reader.as_ref(), ip) else {
            return geo;
        };
        let Ok(ip_addr) = ip.parse::<IpAddr>() else {
            return geo;
        };
        let Ok(result) = reader.lookup(ip_addr) else {
            return geo;
        };
        let city: maxminddb::geoip2::City = match result.decode() {
            Ok(Some(city)) => city,
            _ => return geo,
        };

        geo.ip_country = city.country.iso_code.map(String::from);
        geo.ip_region = city
            .subdivisions
            .first()
            .and_then(|sub| sub.names.english)
            .map(String::from);
        geo.ip_city = city.city.names.english.map(String::from);
        geo.ip_timezone = city.location.time_zone.map(String::from);
        geo.ip_latitude = city.location.latitude;
        geo.ip_longitude = city.location.longitude;
        trace!(ip = %ip, country = ?geo.ip_country, city = ?geo.ip_city, "GeoIP lookup");
        geo
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forwarded_for_wins_over_real_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", "198.51.100.2".parse().expect("header"));
        assert_eq!(extract_client_ip(&headers).as_deref(), Some("198.51.100.2"));

        headers.insert(
            "x-forwarded-for",
            "203.0.113.7, 10.0.0.1".parse().expect("header"),
        );
        assert_eq!(extract_client_ip(&headers).as_deref(), Some("203.0.113.7"));
        assert_eq!(extract_client_ip(&HeaderMap::new()), None);
    }

    #[test]
    fn disabled_lookup_keeps_only_the_address() {
        let geo = GeoLookup::disabled().attributes(Some("203.0.113.7"));
        assert_eq!(geo.ip_address.as_deref(), Some("203.0.113.7"));
        assert_eq!(geo.ip_country, None);
        assert_eq!(geo.ip_org, None);

        let missing = GeoLookup::open("/nonexistent/GeoLite2-City.mmdb");
        assert_eq!(missing.attributes(None), GeoAttributes::default());
    }
}
