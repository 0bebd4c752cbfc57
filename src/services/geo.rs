//! IP geolocation and address-family helpers

use std::fmt;
use std::net::IpAddr;
use std::path::Path;

use maxminddb::{geoip2, Reader};
use serde::Serialize;

use crate::error::{AppError, Result};

/// Databases older than this are reported at startup
const MAX_DATABASE_AGE_SECS: u64 = 90 * 24 * 3600;

/// Where an address is located. Unknown addresses carry empty fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Location {
    pub known: bool,
    pub continent: String,
    pub country: String,
    pub region: String,
    pub longitude: f64,
    pub latitude: f64,
}

impl Location {
    pub fn unknown() -> Self {
        Self::default()
    }
}

/// Maps an IP address to a location
pub trait LocationResolver: Send + Sync {
    fn locate(&self, ip: IpAddr) -> Location;
}

/// Resolver backed by a MaxMind City database
pub struct GeoIpResolver {
    reader: Reader<Vec<u8>>,
}

impl GeoIpResolver {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let reader = Reader::open_readfile(path).map_err(|e| {
            AppError::Config(format!(
                "Failed to open geo database {}: {}",
                path.display(),
                e
            ))
        })?;

        Ok(Self { reader })
    }

    /// Build time of the database in epoch seconds
    pub fn build_epoch(&self) -> u64 {
        self.reader.metadata.build_epoch
    }

    /// Log a warning when the database is older than 90 days
    pub fn check_age(&self) {
        let now = chrono::Utc::now().timestamp().max(0) as u64;
        let built = self.build_epoch();
        if now > built + MAX_DATABASE_AGE_SECS {
            let built_at = chrono::DateTime::from_timestamp(built as i64, 0)
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| built.to_string());
            tracing::warn!("Geo database is older than 90 days (built at {})", built_at);
        }
    }
}

impl LocationResolver for GeoIpResolver {
    fn locate(&self, ip: IpAddr) -> Location {
        let city: geoip2::City = match self.reader.lookup(ip.to_canonical()) {
            Ok(city) => city,
            Err(e) => {
                tracing::debug!(%ip, "No location: {}", e);
                return Location::unknown();
            }
        };

        let region = city
            .subdivisions
            .as_ref()
            .and_then(|s| s.first())
            .and_then(|s| s.iso_code)
            .unwrap_or_default();
        let (latitude, longitude) = city
            .location
            .as_ref()
            .map(|l| (l.latitude.unwrap_or(0.0), l.longitude.unwrap_or(0.0)))
            .unwrap_or((0.0, 0.0));

        Location {
            known: true,
            continent: city
                .continent
                .and_then(|c| c.code)
                .unwrap_or_default()
                .to_string(),
            country: city
                .country
                .and_then(|c| c.iso_code)
                .unwrap_or_default()
                .to_string(),
            region: region.to_string(),
            longitude,
            latitude,
        }
    }
}

/// IP protocol version of a client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpVersion {
    V4,
    V6,
}

impl IpVersion {
    /// IPv4-mapped IPv6 addresses count as version 4
    pub fn of(ip: IpAddr) -> Self {
        match ip.to_canonical() {
            IpAddr::V4(_) => IpVersion::V4,
            IpAddr::V6(_) => IpVersion::V6,
        }
    }
}

impl fmt::Display for IpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpVersion::V4 => write!(f, "4"),
            IpVersion::V6 => write!(f, "6"),
        }
    }
}

/// Client address as given by the socket or the `ip` override
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientAddr {
    Parsed(IpAddr),
    /// Override that did not parse; treated as IPv6 with unknown location
    Unparsable,
}

impl ClientAddr {
    pub fn parse(value: &str) -> Self {
        value
            .trim()
            .parse::<IpAddr>()
            .map(ClientAddr::Parsed)
            .unwrap_or(ClientAddr::Unparsable)
    }

    pub fn version(&self) -> IpVersion {
        match self {
            ClientAddr::Parsed(ip) => IpVersion::of(*ip),
            ClientAddr::Unparsable => IpVersion::V6,
        }
    }

    pub fn locate(&self, resolver: &dyn LocationResolver) -> Location {
        match self {
            ClientAddr::Parsed(ip) => resolver.locate(*ip),
            ClientAddr::Unparsable => Location::unknown(),
        }
    }
}

/// Address families a host can be reached on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IpFamilies {
    pub ipv4: bool,
    pub ipv6: bool,
}

impl IpFamilies {
    pub fn of(addrs: &[IpAddr]) -> Self {
        Self {
            ipv4: addrs.iter().any(|a| a.is_ipv4()),
            ipv6: addrs.iter().any(|a| a.is_ipv6()),
        }
    }
}

/// Resolve a hostname. Lookup failures yield an empty list.
pub async fn resolve_host(name: &str) -> Vec<IpAddr> {
    match tokio::net::lookup_host((name, 0)).await {
        Ok(addrs) => addrs.map(|a| a.ip()).collect(),
        Err(e) => {
            tracing::warn!("Failed to resolve {}: {}", name, e);
            Vec::new()
        }
    }
}
