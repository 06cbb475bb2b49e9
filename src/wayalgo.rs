//! Way-processing algorithms run during tile production (§4.8): joining
//! head-to-tail way segments that belong to the same feature, decimating
//! a joined line to the zoom level's resolution, and clipping a line
//! against a tile's bounding box by quadrant.
//!
//! The endpoint-indexed join is grounded in `denisbog-osm-tile/src/utils.rs`'s
//! `extract_loops_to_render`, which threads way segments into closed rings
//! by indexing segments by their endpoint node id; this generalizes that
//! to open polylines and adds the angle-rejection and tag-equality guards
//! the spec requires before two segments may be spliced.

use std::collections::HashMap;

use crate::entity::Way;
use crate::geo::{coord_to_xy, min_dist_for_zoom, quadrant_of, BBox, Quadrant};

/// Maximum angle, in degrees, between two segments' end directions for them
/// to be considered a continuation of the same line (§4.8.1).
const MAX_JOIN_ANGLE_DEG: f64 = 30.0;

/// Two ways are join-compatible only if every comparison field matches
/// (§4.8.1, rules 5-6): same class, the same line-style flags including
/// `layer`, and either both names are unset or both are set and equal.
fn joinable(a: &Way, b: &Way) -> bool {
    a.class == b.class
        && a.layer == b.layer
        && a.oneway == b.oneway
        && a.bridge == b.bridge
        && a.tunnel == b.tunnel
        && a.cutting == b.cutting
        && a.name == b.name
}

/// Angle in degrees between the last segment of `tail` and the first
/// segment of `head`, both expressed in the planar projection. Returns
/// `180.0` (maximally rejecting) if either way is too short to have a
/// direction.
fn join_angle_deg(tail: &[(f64, f64)], head: &[(f64, f64)]) -> f64 {
    if tail.len() < 2 || head.len() < 2 {
        return 180.0;
    }
    let (ax0, ay0) = tail[tail.len() - 2];
    let (ax1, ay1) = tail[tail.len() - 1];
    let (bx0, by0) = head[0];
    let (bx1, by1) = head[1];

    let v1 = (ax1 - ax0, ay1 - ay0);
    let v2 = (bx1 - bx0, by1 - by0);
    let len1 = (v1.0 * v1.0 + v1.1 * v1.1).sqrt();
    let len2 = (v2.0 * v2.0 + v2.1 * v2.1).sqrt();
    if len1 == 0.0 || len2 == 0.0 {
        return 180.0;
    }
    let cos_theta = ((v1.0 * v2.0 + v1.1 * v2.1) / (len1 * len2)).clamp(-1.0, 1.0);
    cos_theta.acos().to_degrees()
}

/// One already-joined polyline plus the attributes carried over from the
/// way that started it (class/flags/name are representative of the whole
/// joined chain, since `joinable` requires them to match). `id`/`layer`
/// are the seed way's own — per §4.8.1, a successful join keeps `a`'s
/// identity; an unjoined passthrough way is its own one-member chain, so
/// this is simply that way's id either way.
pub struct JoinedLine {
    pub id: i64,
    pub nds: Vec<i64>,
    pub class: i32,
    pub layer: i8,
    pub name: Option<String>,
    pub abrev: Option<String>,
    pub oneway: bool,
    pub bridge: bool,
    pub tunnel: bool,
    pub cutting: bool,
}

/// `true` if `w` is a join candidate for `chain` at `pivot`: compatible
/// fields, at least 2 nds, not already a closed loop, and `pivot` is one
/// of its two endpoints.
fn is_join_candidate(chain: &Way, w: &Way, pivot: i64) -> bool {
    if w.nds.len() < 2 || w.is_loop() || !joinable(chain, w) {
        return false;
    }
    w.nds.first() == Some(&pivot) || w.nds.last() == Some(&pivot)
}

/// Joins a set of ways head-to-tail where endpoints coincide, compatible
/// fields match, and the turn angle is within [`MAX_JOIN_ANGLE_DEG`]
/// (§4.8.1). `coords` supplies the lat/lon for every node id referenced by
/// `ways`. A chain grows from both its ends — not just the one it most
/// recently grew from — since an endpoint the chain arrived at is just as
/// eligible a pivot as the one it started from (§4.9 step 6: "for each
/// endpoint with ≥2 ways, try to join them").
pub fn join_ways(ways: &[Way], coords: &HashMap<i64, (f64, f64)>) -> Vec<JoinedLine> {
    let mut remaining: Vec<Way> = ways.to_vec();
    let mut joined = Vec::new();

    while !remaining.is_empty() {
        let mut chain = remaining.swap_remove(0);
        // Rule 2: ways with fewer than 2 nds or that are already closed
        // loops never participate in joining — leave `chain` as-is.
        if chain.nds.len() >= 2 && !chain.is_loop() {
            loop {
                let mut progressed = false;

                let tail_id = *chain.nds.last().unwrap();
                if let Some(idx) = remaining.iter().position(|w| is_join_candidate(&chain, w, tail_id)) {
                    let mut candidate = remaining.swap_remove(idx);
                    if candidate.nds.last() == Some(&tail_id) {
                        candidate.nds.reverse();
                    }
                    let chain_planar = planar_points(&chain.nds, coords);
                    let candidate_planar = planar_points(&candidate.nds, coords);
                    if join_angle_deg(&chain_planar, &candidate_planar) <= MAX_JOIN_ANGLE_DEG {
                        chain.nds.extend(candidate.nds.into_iter().skip(1));
                        progressed = true;
                    } else {
                        remaining.push(candidate);
                    }
                }

                if chain.is_loop() {
                    break;
                }

                let head_id = *chain.nds.first().unwrap();
                if let Some(idx) = remaining.iter().position(|w| is_join_candidate(&chain, w, head_id)) {
                    let mut candidate = remaining.swap_remove(idx);
                    if candidate.nds.first() == Some(&head_id) {
                        candidate.nds.reverse();
                    }
                    // `candidate` now ends at `head_id`; prepend it, dropping
                    // its duplicated pivot node.
                    let candidate_planar = planar_points(&candidate.nds, coords);
                    let chain_planar = planar_points(&chain.nds, coords);
                    if join_angle_deg(&candidate_planar, &chain_planar) <= MAX_JOIN_ANGLE_DEG {
                        let mut new_nds = candidate.nds;
                        new_nds.pop();
                        new_nds.extend(chain.nds.drain(..));
                        chain.nds = new_nds;
                        progressed = true;
                    } else {
                        remaining.push(candidate);
                    }
                }

                if !progressed || chain.is_loop() {
                    break;
                }
            }
        }

        joined.push(JoinedLine {
            id: chain.id,
            nds: chain.nds,
            class: chain.class,
            layer: chain.layer,
            name: chain.name,
            abrev: chain.abrev,
            oneway: chain.oneway,
            bridge: chain.bridge,
            tunnel: chain.tunnel,
            cutting: chain.cutting,
        });
    }

    joined
}

fn planar_points(nds: &[i64], coords: &HashMap<i64, (f64, f64)>) -> Vec<(f64, f64)> {
    nds.iter()
        .filter_map(|id| coords.get(id).map(|&(lat, lon)| coord_to_xy(lat, lon)))
        .collect()
}

/// Decimates a node-id polyline to the resolution appropriate for `zoom`
/// (§4.8.2): walks the line keeping a node only once it is at least
/// [`min_dist_for_zoom`] away (in the planar projection) from the last kept
/// node; the first and last nodes are always kept.
pub fn sample_for_zoom(nds: &[i64], coords: &HashMap<i64, (f64, f64)>, zoom: u8) -> Vec<i64> {
    if nds.len() <= 2 {
        return nds.to_vec();
    }
    let min_dist = min_dist_for_zoom(zoom);
    let mut kept = vec![nds[0]];
    let mut last_xy = coords.get(&nds[0]).copied();

    for &id in &nds[1..nds.len() - 1] {
        let Some((lat, lon)) = coords.get(&id).copied() else { continue };
        let xy = coord_to_xy(lat, lon);
        let far_enough = match last_xy {
            None => true,
            Some((lx, ly)) => {
                let (dx, dy) = (xy.0 - lx, xy.1 - ly);
                (dx * dx + dy * dy).sqrt() >= min_dist
            }
        };
        if far_enough {
            kept.push(id);
            last_xy = Some(xy);
        }
    }

    kept.push(*nds.last().unwrap());
    kept
}

#[derive(Clone, Copy, PartialEq)]
enum Classification {
    Inside,
    Outside(Quadrant),
}

/// Clips a polyline against `bbox` (§4.8.3): classifies every node as
/// inside `bbox` or outside in one of four quadrants, then collapses each
/// maximal run of consecutive same-quadrant outside nodes down to just its
/// first and last member — the interior of such a run contributes nothing
/// the tile's viewport could ever show. A node whose coordinate is missing
/// is kept as-is and does not participate in the classification (§3 —
/// readers tolerate missing refs silently); only `bbox` membership, not
/// coordinate lookup, can remove a node.
pub fn clip_by_quadrant(nds: &[i64], coords: &HashMap<i64, (f64, f64)>, bbox: &BBox) -> Vec<i64> {
    if nds.len() < 3 {
        return nds.to_vec();
    }
    let is_loop = nds.first() == nds.last();

    let classes: Vec<Option<Classification>> = nds
        .iter()
        .map(|id| {
            coords.get(id).map(|&(lat, lon)| {
                if bbox.contains_point(lat, lon) {
                    Classification::Inside
                } else {
                    Classification::Outside(quadrant_of(lat, lon, bbox))
                }
            })
        })
        .collect();

    let n = nds.len();
    let mut keep = vec![true; n];

    let mut i = 0;
    while i < n {
        let Some(Classification::Outside(q)) = classes[i] else {
            i += 1;
            continue;
        };
        let run_start = i;
        let mut j = i + 1;
        while j < n && classes[j] == Some(Classification::Outside(q)) {
            j += 1;
        }
        let run_end = j - 1;
        for slot in keep.iter_mut().take(run_end).skip(run_start + 1) {
            *slot = false;
        }
        i = j;
    }

    if !is_loop {
        // The first nd is always preserved for an open polyline.
        keep[0] = true;
        // The last nd is dropped, rather than preserved, when its quadrant
        // matches the immediately preceding node's.
        if let (Some(Classification::Outside(last_q)), Some(Some(prev))) = (classes[n - 1], classes.get(n - 2).copied()) {
            if prev == Classification::Outside(last_q) {
                keep[n - 1] = false;
            }
        }
    } else {
        // The first nd of a loop is treated as interior (§4.8.3), so it is
        // eligible for removal just like any other node. `nds[0]` and
        // `nds[n-1]` are the same point (ring closure), so the run-collapse
        // pass above can only ever have anchored a run *at* index 0 (never
        // swallowed it as an interior member) — the seam between the run
        // ending at `n-2` (the point just before closure) and the run
        // starting at 0 is a single run wrapping through the closing point.
        // Drop index 0 when it is interior to that wrapped run.
        if let (Some(Classification::Outside(q_first)), Some(Classification::Outside(q_before_seam))) =
            (classes[0], classes[n - 2])
        {
            if q_first == q_before_seam {
                keep[0] = false;
            }
        }
    }

    nds.iter().zip(keep).filter_map(|(&id, k)| k.then_some(id)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Way;

    fn way(id: i64, nds: Vec<i64>) -> Way {
        Way {
            id,
            class: 1,
            layer: 0,
            name: None,
            abrev: None,
            oneway: false,
            bridge: false,
            tunnel: false,
            cutting: false,
            nds,
            bbox: BBox::from_point(0.0, 0.0),
        }
    }

    #[test]
    fn collinear_ways_join_into_one_chain() {
        let mut coords = HashMap::new();
        coords.insert(1, (0.0, 0.0));
        coords.insert(2, (0.0, 1.0));
        coords.insert(3, (0.0, 2.0));

        let ways = vec![way(1, vec![1, 2]), way(2, vec![2, 3])];
        let joined = join_ways(&ways, &coords);
        assert_eq!(joined.len(), 1);
        assert_eq!(joined[0].nds, vec![1, 2, 3]);
    }

    #[test]
    fn candidate_with_all_nds_cropped_does_not_panic() {
        // `3` is the shared pivot; `4` and `5` (candidate `b`'s other nds)
        // were cropped upstream, so `coords` has no entry for either —
        // `planar_points` then yields an empty `candidate_planar`. Joining
        // must reject this candidate (angle undefined) rather than panic.
        let mut coords = HashMap::new();
        coords.insert(1, (0.0, 0.0));
        coords.insert(2, (0.0, 1.0));
        coords.insert(3, (0.0, 2.0));

        let ways = vec![way(1, vec![1, 2, 3]), way(2, vec![3, 4, 5])];
        let joined = join_ways(&ways, &coords);
        assert_eq!(joined.len(), 2);
    }

    #[test]
    fn sharp_turn_is_not_joined() {
        let mut coords = HashMap::new();
        coords.insert(1, (0.0, 0.0));
        coords.insert(2, (0.0, 1.0));
        coords.insert(3, (1.0, 1.0)); // 90 degree turn

        let ways = vec![way(1, vec![1, 2]), way(2, vec![2, 3])];
        let joined = join_ways(&ways, &coords);
        assert_eq!(joined.len(), 2);
    }

    #[test]
    fn sampling_keeps_endpoints() {
        let mut coords = HashMap::new();
        for i in 0..10 {
            coords.insert(i, (0.0, i as f64 * 0.0001));
        }
        let nds: Vec<i64> = (0..10).collect();
        let sampled = sample_for_zoom(&nds, &coords, 3);
        assert_eq!(sampled.first(), nds.first());
        assert_eq!(sampled.last(), nds.last());
        assert!(sampled.len() <= nds.len());
    }

    #[test]
    fn clipping_never_removes_a_node_inside_the_bbox() {
        let bbox = BBox { lat_t: 1.0, lon_l: -1.0, lat_b: -1.0, lon_r: 1.0 };
        let mut coords = HashMap::new();
        coords.insert(1, (0.0, 0.0)); // inside
        coords.insert(2, (0.5, 0.5)); // inside
        coords.insert(3, (0.0, 0.0)); // inside
        let nds = vec![1, 2, 3];
        let clipped = clip_by_quadrant(&nds, &coords, &bbox);
        assert_eq!(clipped, nds);
    }

    #[test]
    fn clipping_collapses_a_redundant_outside_run() {
        let bbox = BBox { lat_t: 1.0, lon_l: -1.0, lat_b: -1.0, lon_r: 1.0 };
        let mut coords = HashMap::new();
        coords.insert(1, (0.0, 0.0)); // inside, anchors the run start
        coords.insert(2, (5.0, 5.0)); // outside, top-right quadrant
        coords.insert(3, (6.0, 6.0)); // outside, same quadrant — redundant
        coords.insert(4, (7.0, 7.0)); // outside, same quadrant — redundant
        coords.insert(5, (0.0, 0.0)); // inside again
        let nds = vec![1, 2, 3, 4, 5];
        let clipped = clip_by_quadrant(&nds, &coords, &bbox);
        assert_eq!(clipped, vec![1, 2, 4, 5]);
    }

    #[test]
    fn clipping_treats_a_loops_first_nd_as_interior() {
        // A closed ring (first id == last id) whose opening vertex sits in
        // the same outside quadrant as the vertex just before ring closure:
        // the two form one run wrapping through the seam, so the opening
        // vertex is interior to it and must be dropped, not preserved like
        // an open polyline's first nd would be.
        let bbox = BBox { lat_t: 1.0, lon_l: -1.0, lat_b: -1.0, lon_r: 1.0 };
        let mut coords = HashMap::new();
        coords.insert(1, (5.0, 5.0)); // outside, same quadrant as node 3 below
        coords.insert(2, (0.0, 0.0)); // inside
        coords.insert(3, (5.0, 5.0)); // outside, same quadrant as node 1
        let nds = vec![1, 2, 3, 1]; // ring: 1 -> 2 -> 3 -> 1
        let clipped = clip_by_quadrant(&nds, &coords, &bbox);
        assert_eq!(clipped, vec![2, 3, 1]);
    }

    #[test]
    fn clipping_is_idempotent() {
        let bbox = BBox { lat_t: 1.0, lon_l: -1.0, lat_b: -1.0, lon_r: 1.0 };
        let mut coords = HashMap::new();
        coords.insert(1, (0.0, 0.0));
        coords.insert(2, (5.0, 5.0));
        coords.insert(3, (6.0, 6.0));
        coords.insert(4, (0.0, 0.0));
        let nds = vec![1, 2, 3, 4];
        let once = clip_by_quadrant(&nds, &coords, &bbox);
        let twice = clip_by_quadrant(&once, &coords, &bbox);
        assert_eq!(once, twice);
    }

    #[test]
    fn a_way_extends_a_chain_from_either_end_regardless_of_input_order() {
        // X=[2,3], Y=[1,2], Z=[3,4], one continuous road n1->n2->n3->n4.
        // X is picked as the seed chain and grows forward onto Z first;
        // Y can only attach at the chain's head, not its tail.
        let mut coords = HashMap::new();
        coords.insert(1, (0.0, 0.0));
        coords.insert(2, (0.0, 1.0));
        coords.insert(3, (0.0, 2.0));
        coords.insert(4, (0.0, 3.0));

        let ways = vec![way(2, vec![2, 3]), way(1, vec![1, 2]), way(3, vec![3, 4])];
        let joined = join_ways(&ways, &coords);
        assert_eq!(joined.len(), 1);
        assert_eq!(joined[0].nds, vec![1, 2, 3, 4]);
    }

    #[test]
    fn joined_chain_carries_the_seed_ways_id_and_layer() {
        let mut coords = HashMap::new();
        coords.insert(1, (0.0, 0.0));
        coords.insert(2, (0.0, 1.0));
        coords.insert(3, (0.0, 2.0));

        let mut a = way(7, vec![1, 2]);
        a.layer = 2;
        let mut b = way(8, vec![2, 3]);
        b.layer = 2;
        let joined = join_ways(&[a, b], &coords);
        assert_eq!(joined.len(), 1);
        assert_eq!(joined[0].id, 7);
        assert_eq!(joined[0].layer, 2);
    }
}
