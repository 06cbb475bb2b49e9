//! Geometry primitives: bounding-box aggregation and the two terrain
//! coordinate helpers the core treats as pure functions (§4.1).

use std::f64::consts::{PI, SQRT_2};

/// Mean earth radius in meters, used by both terrain projections below.
const EARTH_RADIUS_M: f64 = 6_378_137.0;

/// Canonical "home" location used to seed `min_dist_for_zoom` (Open Question 3).
/// Only the ratio between zoom levels matters, not the absolute location.
pub const HOME_LAT: f64 = 40.0;
pub const HOME_LON: f64 = -105.0;

/// Axis-aligned bounding box in degrees.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BBox {
    pub lat_t: f64,
    pub lon_l: f64,
    pub lat_b: f64,
    pub lon_r: f64,
}

impl BBox {
    pub fn from_point(lat: f64, lon: f64) -> BBox {
        BBox { lat_t: lat, lat_b: lat, lon_l: lon, lon_r: lon }
    }

    pub fn add_point(&mut self, lat: f64, lon: f64) {
        if lat > self.lat_t {
            self.lat_t = lat;
        }
        if lat < self.lat_b {
            self.lat_b = lat;
        }
        if lon < self.lon_l {
            self.lon_l = lon;
        }
        if lon > self.lon_r {
            self.lon_r = lon;
        }
    }

    pub fn add_bbox(&mut self, other: &BBox) {
        self.add_point(other.lat_t, other.lon_l);
        self.add_point(other.lat_b, other.lon_r);
    }

    pub fn contains_point(&self, lat: f64, lon: f64) -> bool {
        lat <= self.lat_t && lat >= self.lat_b && lon >= self.lon_l && lon <= self.lon_r
    }

    pub fn center(&self) -> (f64, f64) {
        ((self.lat_t + self.lat_b) / 2.0, (self.lon_l + self.lon_r) / 2.0)
    }

    /// Expands the box by `frac` of its own extent on each side. Used for
    /// overscan (tile-ref expansion, §4.6) and clip-bbox widening (§4.9).
    pub fn expand(&self, frac: f64) -> BBox {
        let lat_pad = (self.lat_t - self.lat_b) * frac;
        let lon_pad = (self.lon_r - self.lon_l) * frac;
        // A degenerate point bbox still needs a nonzero pad to overscan.
        let lat_pad = if lat_pad == 0.0 { frac } else { lat_pad };
        let lon_pad = if lon_pad == 0.0 { frac } else { lon_pad };
        BBox {
            lat_t: self.lat_t + lat_pad,
            lat_b: self.lat_b - lat_pad,
            lon_l: self.lon_l - lon_pad,
            lon_r: self.lon_r + lon_pad,
        }
    }
}

/// Incremental bounding-box aggregation over an `Option<BBox>` accumulator:
/// the first point initializes the box, subsequent points widen it
/// (spec §4.1 `bbox_init`/`bbox_add_point`).
pub fn bbox_add_point(acc: &mut Option<BBox>, lat: f64, lon: f64) {
    match acc {
        None => *acc = Some(BBox::from_point(lat, lon)),
        Some(b) => b.add_point(lat, lon),
    }
}

/// `bbox_add_way`/`bbox_add_relation`: widen by an already-computed child bbox.
pub fn bbox_add_bbox(acc: &mut Option<BBox>, other: &BBox) {
    match acc {
        None => *acc = Some(*other),
        Some(b) => b.add_bbox(other),
    }
}

/// Spherical-mercator fractional tile coordinates at a given zoom. The web
/// mercator projection keeps the same horizontal scale at every latitude,
/// so this is used for tile addressing (it must partition the globe into
/// a uniform `2^zoom x 2^zoom` grid).
pub fn coord_to_tile(lat: f64, lon: f64, zoom: u8) -> (f64, f64) {
    let (lat_rad, lon_rad) = (lat.to_radians(), lon.to_radians());
    let x = (lon_rad + PI) / (2.0 * PI);
    let y = (PI - ((PI / 4.0) + (lat_rad / 2.0)).tan().ln()) / (2.0 * PI);
    let tiles = (1u64 << zoom) as f64;
    (x * tiles, y * tiles)
}

/// Integer `(zoom, x, y)` tile coordinate containing `(lat, lon)`.
pub fn tile_xy_at_zoom(lat: f64, lon: f64, zoom: u8) -> (i64, i64) {
    let (x, y) = coord_to_tile(lat, lon, zoom);
    (x.floor() as i64, y.floor() as i64)
}

/// Inverse of [`coord_to_tile`]: the lat/lon of tile coordinate `(x, y)`'s
/// northwest corner at `zoom`.
pub fn tile_to_coord(x: f64, y: f64, zoom: u8) -> (f64, f64) {
    let tiles = (1u64 << zoom) as f64;
    let lon = x / tiles * 2.0 * PI - PI;
    let y_angle = PI - (y / tiles) * 2.0 * PI;
    let lat = (2.0 * y_angle.exp().atan()) - PI / 2.0;
    (lat.to_degrees(), lon.to_degrees())
}

/// The geographic bounding box covered by tile `(zoom, x, y)`.
pub fn tile_bounds(zoom: u8, x: i64, y: i64) -> BBox {
    let (lat_t, lon_l) = tile_to_coord(x as f64, y as f64, zoom);
    let (lat_b, lon_r) = tile_to_coord(x as f64 + 1.0, y as f64 + 1.0, zoom);
    BBox { lat_t, lon_l, lat_b, lon_r }
}

/// Local planar projection in meters, anchored near [`HOME_LAT`]/[`HOME_LON`]
/// (a simple equirectangular tangent-plane projection). Used only for
/// distance/angle computations during way joining and zoom sampling — never
/// for tile addressing, where [`coord_to_tile`] is authoritative.
pub fn coord_to_xy(lat: f64, lon: f64) -> (f64, f64) {
    let x = lon.to_radians() * EARTH_RADIUS_M * HOME_LAT.to_radians().cos();
    let y = lat.to_radians() * EARTH_RADIUS_M;
    (x, y)
}

/// Minimum planar distance (in the [`coord_to_xy`] projection) below which
/// consecutive nds are redundant at a given zoom (§4.8.2). Derived by
/// projecting a representative tile at the canonical home location and
/// scaling by 1/8 of its diagonal extent, divided by `sqrt(2) * 256`
/// (one "pixel" at that zoom, amortized over the 3-zoom ladder step).
pub fn min_dist_for_zoom(zoom: u8) -> f64 {
    let tiles_across = (1u64 << zoom) as f64;
    let lon_span_deg = 360.0 / tiles_across;
    let (x0, y0) = coord_to_xy(HOME_LAT, HOME_LON);
    let (x1, y1) = coord_to_xy(HOME_LAT, HOME_LON + lon_span_deg);
    let tile_side = ((x1 - x0).powi(2) + (y1 - y0).powi(2)).sqrt();
    let diagonal = tile_side * SQRT_2;
    (diagonal / 8.0) / (SQRT_2 * 256.0)
}

/// The four tile-corner quadrants used by quadrant clipping (§4.8.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quadrant {
    Top,
    Left,
    Bottom,
    Right,
}

/// Classifies `(lat, lon)`'s quadrant relative to a tile's center, using the
/// dot products against unit vectors toward the tile's top-left/top-right
/// corners (§4.8.3).
pub fn quadrant_of(lat: f64, lon: f64, bbox: &BBox) -> Quadrant {
    let (center_lat, center_lon) = bbox.center();
    let (cx, cy) = coord_to_xy(center_lat, center_lon);
    let (px, py) = coord_to_xy(lat, lon);
    let (tlx, tly) = coord_to_xy(bbox.lat_t, bbox.lon_l);
    let (trx, try_) = coord_to_xy(bbox.lat_t, bbox.lon_r);

    let to_point = (px - cx, py - cy);
    let normalize = |(vx, vy): (f64, f64)| {
        let len = (vx * vx + vy * vy).sqrt();
        if len == 0.0 {
            (0.0, 0.0)
        } else {
            (vx / len, vy / len)
        }
    };
    let to_tl = normalize((tlx - cx, tly - cy));
    let to_tr = normalize((trx - cx, try_ - cy));

    let dot = |(ax, ay): (f64, f64), (bx, by): (f64, f64)| ax * bx + ay * by;
    let dtl = dot(to_point, to_tl);
    let dtr = dot(to_point, to_tr);

    if dtl > 0.0 && dtr > 0.0 {
        Quadrant::Top
    } else if dtl > 0.0 && dtr <= 0.0 {
        Quadrant::Left
    } else if dtl <= 0.0 && dtr <= 0.0 {
        Quadrant::Bottom
    } else {
        Quadrant::Right
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bbox_widens_from_first_point() {
        let mut acc = None;
        bbox_add_point(&mut acc, 10.0, 20.0);
        let b = acc.unwrap();
        assert_eq!((b.lat_t, b.lat_b, b.lon_l, b.lon_r), (10.0, 10.0, 20.0, 20.0));

        bbox_add_point(&mut acc, 12.0, 18.0);
        let b = acc.unwrap();
        assert_eq!((b.lat_t, b.lat_b, b.lon_l, b.lon_r), (12.0, 10.0, 18.0, 20.0));
    }

    #[test]
    fn min_dist_shrinks_as_zoom_increases() {
        let coarse = min_dist_for_zoom(5);
        let fine = min_dist_for_zoom(15);
        assert!(fine < coarse);
        assert!(fine > 0.0);
    }

    #[test]
    fn tile_xy_is_monotonic_in_longitude() {
        let (x1, _) = coord_to_tile(0.0, -180.0, 4);
        let (x2, _) = coord_to_tile(0.0, 0.0, 4);
        assert!(x2 > x1);
    }

    #[test]
    fn tile_bounds_round_trips_through_coord_to_tile() {
        let zoom = 10;
        let (x, y) = tile_xy_at_zoom(HOME_LAT, HOME_LON, zoom);
        let bbox = tile_bounds(zoom, x, y);
        assert!(bbox.contains_point(HOME_LAT, HOME_LON));
    }
}
