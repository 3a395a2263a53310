pub mod routing;

use crate::models::provider::GeoPoint;

const EARTH_RADIUS_KM: f64 = 6_371.0;

pub fn haversine(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lng = (lon2 - lon1).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + phi1.cos() * phi2.cos() * sin_lng * sin_lng;
    let central_angle = 2.0 * haversine.sqrt().min(1.0).asin();

    EARTH_RADIUS_KM * central_angle
}

pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    haversine(a.lat, a.lng, b.lat, b.lng)
}
