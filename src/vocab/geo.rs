//! Geospatial helpers for the proximity search.

/// Default search radius in kilometres.
pub const DEFAULT_RADIUS_KM: f64 = 25.0;
/// Radius bounds; values outside are clamped, not rejected.
pub const MIN_RADIUS_KM: f64 = 0.1;
pub const MAX_RADIUS_KM: f64 = 500.0;
/// Kilometres per degree of latitude.
const KM_PER_DEGREE: f64 = 111.0;

/// A geocoded point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

/// A latitude/longitude window used to pre-cull candidates before the exact
/// haversine pass.
#[derive(Debug, Clone, Copy)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

/// Great-circle distance in kilometres.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    const EARTH_RADIUS_KM: f64 = 6371.0;
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().atan2((1.0 - a).sqrt())
}

impl GeoPoint {
    pub fn distance_km(&self, other: &GeoPoint) -> f64 {
        haversine_km(self.lat, self.lon, other.lat, other.lon)
    }

    /// Bounding box for `radius_km` around this point. The longitude delta
    /// widens with latitude; near the poles the box degenerates to the full
    /// longitude range.
    pub fn bounding_box(&self, radius_km: f64) -> BoundingBox {
        let lat_delta = radius_km / KM_PER_DEGREE;
        let cos_lat = self.lat.to_radians().cos().abs();
        let lon_delta = if cos_lat < 1e-6 {
            180.0
        } else {
            radius_km / (KM_PER_DEGREE * cos_lat)
        };
        BoundingBox {
            min_lat: self.lat - lat_delta,
            max_lat: self.lat + lat_delta,
            min_lon: self.lon - lon_delta,
            max_lon: self.lon + lon_delta,
        }
    }
}

/// Clamp a requested radius into the supported window; `None` means default.
pub fn effective_radius(requested: Option<f64>) -> f64 {
    match requested {
        None => DEFAULT_RADIUS_KM,
        Some(r) => r.clamp(MIN_RADIUS_KM, MAX_RADIUS_KM),
    }
}

/// Round a distance to one decimal for result annotation.
pub fn round_km(km: f64) -> f64 {
    (km * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    const AMSTERDAM: GeoPoint = GeoPoint {
        lat: 52.3731,
        lon: 4.8922,
    };
    const HAARLEM: GeoPoint = GeoPoint {
        lat: 52.3874,
        lon: 4.6462,
    };

    #[test]
    fn haversine_known_distance() {
        let d = AMSTERDAM.distance_km(&HAARLEM);
        assert!((15.0..20.0).contains(&d), "Amsterdam-Haarlem was {d} km");
    }

    #[test]
    fn haversine_zero_for_identical_points() {
        assert!(AMSTERDAM.distance_km(&AMSTERDAM) < 1e-9);
    }

    #[test]
    fn bounding_box_contains_radius() {
        let bbox = AMSTERDAM.bounding_box(25.0);
        // Anything inside the radius must be inside the box
        assert!(bbox.min_lat <= HAARLEM.lat && HAARLEM.lat <= bbox.max_lat);
        assert!(bbox.min_lon <= HAARLEM.lon && HAARLEM.lon <= bbox.max_lon);
        // The box is a superset: a corner point is farther than the radius
        let corner = GeoPoint {
            lat: bbox.max_lat,
            lon: bbox.max_lon,
        };
        assert!(AMSTERDAM.distance_km(&corner) >= 25.0);
    }

    #[test]
    fn radius_is_clamped() {
        assert_eq!(effective_radius(None), DEFAULT_RADIUS_KM);
        assert_eq!(effective_radius(Some(0.0)), MIN_RADIUS_KM);
        assert_eq!(effective_radius(Some(9000.0)), MAX_RADIUS_KM);
        assert_eq!(effective_radius(Some(12.5)), 12.5);
    }

    #[test]
    fn rounding_to_one_decimal() {
        assert_eq!(round_km(17.3456), 17.3);
        assert_eq!(round_km(17.35), 17.4);
    }
}
