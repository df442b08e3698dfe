use serde::{Deserialize, Serialize};

const EARTH_RADIUS_KM: f64 = 6_371.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    let central_angle = 2.0 * haversine.sqrt().asin();

    EARTH_RADIUS_KM * central_angle
}

/// Extra distance, as a fraction of the direct leg, of travelling
/// `origin -> pickup -> dropoff -> destination` instead of `origin -> destination`.
///
/// A zero-length direct leg yields `0.0` when the parcel is also zero-length
/// and `1.0` otherwise.
pub fn detour_fraction(
    origin: &GeoPoint,
    destination: &GeoPoint,
    pickup: &GeoPoint,
    dropoff: &GeoPoint,
) -> f64 {
    let direct = haversine_km(origin, destination);
    let via = haversine_km(origin, pickup)
        + haversine_km(pickup, dropoff)
        + haversine_km(dropoff, destination);

    if direct <= f64::EPSILON {
        return if via <= f64::EPSILON { 0.0 } else { 1.0 };
    }

    ((via - direct) / direct).max(0.0)
}
