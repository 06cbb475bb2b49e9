//! Index façade (§4.6): the single entry point tying the chunk store, the
//! tile store, and the way algorithms together. Ingest tools call
//! `add`/`add_node`/`add_way`/`add_relation`/`add_tile_ref`; the tile
//! builder calls `make_tile` (§4.9).

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::entity::{EntityRecord, MemberKind, Node, Relation, StorageKind, Way};
use crate::error::Result;
use crate::geo::{bbox_add_bbox, bbox_add_point, coord_to_tile, tile_bounds, BBox};
use crate::chunk::ChunkStore;
use crate::stats::Stats;
use crate::tilestore::TileStore;
use crate::wayalgo;
use crate::xml::{self, NodeXml, RelationXml, TileDocumentXml, WayXml};

/// Fixed ladder of zoom levels at which tile references are maintained (§3).
pub const ZOOM_LADDER: [u8; 7] = [3, 5, 7, 9, 11, 13, 15];

/// Fractional tile overscan applied when expanding a range into covered
/// tiles, to absorb the non-zero visual width of drawn features (§4.6).
const OVERSCAN: f64 = 1.0 / 16.0;

/// Fractional expansion of a tile's own bounds used as its clip boundary
/// during production (§4.9, step 8).
const TILE_CLIP_OVERSCAN: f64 = 1.0 / 16.0;

/// Recommended chunk-store byte budget (§3 invariants).
pub const DEFAULT_CHUNK_BUDGET: usize = 400 * 1024 * 1024;

/// Recommended tile-store byte budget (§3 invariants).
pub const DEFAULT_TILE_BUDGET: usize = 100 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    Node,
    Way,
    Relation,
}

pub struct Index {
    chunks: ChunkStore,
    tiles: TileStore,
}

impl Index {
    pub fn open(base: impl Into<PathBuf>, chunk_budget: usize, tile_budget: usize) -> Index {
        let base = base.into();
        Index {
            chunks: ChunkStore::new(base.clone(), chunk_budget),
            tiles: TileStore::new(base.join("tile"), tile_budget),
        }
    }

    /// Routes an entity to its chunk by `(kind, split_id(id).upper)`,
    /// relying on the chunk store's first-writer-wins semantics to
    /// implement the "dedup by find-first, drop duplicates" contract.
    pub fn add(&mut self, kind: StorageKind, record: EntityRecord) -> bool {
        self.chunks.add(kind, record)
    }

    pub fn find(&mut self, kind: StorageKind, id: i64) -> Option<&EntityRecord> {
        self.chunks.find(kind, id)
    }

    pub fn iter(&mut self, kind: StorageKind) -> crate::chunk::ChunkIter<'_> {
        self.chunks.iter(kind)
    }

    /// Expands `range` into all tiles at `zoom` that overlap, plus every
    /// coarser rung of [`ZOOM_LADDER`], calling the tile store's set-insert
    /// for each (§4.6).
    pub fn add_tile_ref(&mut self, range: &BBox, zoom: u8, kind: RefKind, id: i64) {
        for &z in ZOOM_LADDER.iter().filter(|&&z| z <= zoom) {
            let (x0, y0) = coord_to_tile(range.lat_t, range.lon_l, z);
            let (x1, y1) = coord_to_tile(range.lat_b, range.lon_r, z);
            let x_min = (x0.min(x1) - OVERSCAN).floor() as i64;
            let x_max = (x0.max(x1) + OVERSCAN).floor() as i64;
            let y_min = (y0.min(y1) - OVERSCAN).floor() as i64;
            let y_max = (y0.max(y1) + OVERSCAN).floor() as i64;

            for x in x_min..=x_max {
                for y in y_min..=y_max {
                    match kind {
                        RefKind::Node => {
                            self.tiles.add_node(z, x, y, id);
                        }
                        RefKind::Way => {
                            self.tiles.add_way(z, x, y, id);
                        }
                        RefKind::Relation => {
                            self.tiles.add_relation(z, x, y, id);
                        }
                    }
                }
            }
        }
    }

    /// Stores a node as `NODE` or `CTR_NODE` and, if `selected`, emits tile
    /// refs for its (degenerate, single-point) range (§4.6).
    pub fn add_node(&mut self, node: Node, zoom: u8, center: bool, selected: bool) -> bool {
        if selected {
            let range = BBox::from_point(node.lat, node.lon);
            self.add_tile_ref(&range, zoom, RefKind::Node, node.id);
        }
        let kind = if center { StorageKind::CtrNode } else { StorageKind::Node };
        self.chunks.add(kind, EntityRecord::Node(Box::new(node)))
    }

    fn node_coord(&mut self, id: i64) -> Option<(f64, f64)> {
        self.chunks
            .find(StorageKind::Node, id)
            .and_then(|e| e.as_node())
            .map(|n| (n.lat, n.lon))
            .or_else(|| self.chunks.find(StorageKind::CtrNode, id).and_then(|e| e.as_node()).map(|n| (n.lat, n.lon)))
    }

    /// Aggregates a range from `way.nds`, updates `way.bbox`, optionally
    /// discards `nds` for a center form, and — if the range is empty — drops
    /// the way entirely (§4.6, §8 "a way with zero nds: dropped").
    pub fn add_way(&mut self, mut way: Way, zoom: u8, center: bool, selected: bool) -> bool {
        let mut range: Option<BBox> = None;
        for &nd in &way.nds {
            if let Some((lat, lon)) = self.node_coord(nd) {
                bbox_add_point(&mut range, lat, lon);
            }
        }
        let Some(range) = range else { return false };
        way.bbox = range;

        if center {
            way.nds.clear();
        }
        if selected {
            self.add_tile_ref(&way.bbox, zoom, RefKind::Way, way.id);
        }
        // §4.6: "there is no CTR_WAY in the tiled form" — center-style ways
        // are always stored under WAY, distinguished by their empty nds.
        self.chunks.add(StorageKind::Way, EntityRecord::Way(Box::new(way)))
    }

    /// Analogous to [`Index::add_way`]: ranges over member ways' bboxes and,
    /// for center relations, member nodes; drops relations with no points.
    pub fn add_relation(&mut self, mut relation: Relation, zoom: u8, center: bool) -> bool {
        let mut range: Option<BBox> = None;
        for member in relation.members.clone() {
            match member.kind {
                MemberKind::Way => {
                    if let Some(bbox) = self.chunks.find(StorageKind::Way, member.id).and_then(|e| e.as_way()).map(|w| w.bbox) {
                        bbox_add_bbox(&mut range, &bbox);
                    }
                }
                MemberKind::Node => {
                    if center {
                        if let Some((lat, lon)) = self.node_coord(member.id) {
                            bbox_add_point(&mut range, lat, lon);
                        }
                    }
                }
            }
        }
        let Some(range) = range else { return false };
        relation.bbox = range;

        if center {
            relation.members.clear();
        }
        self.add_tile_ref(&relation.bbox, zoom, RefKind::Relation, relation.id);
        self.chunks.add(StorageKind::Relation, EntityRecord::Relation(Box::new(relation)))
    }

    /// Cumulative sticky error flag across the chunk and tile stores (§7).
    pub fn error_flag(&self) -> bool {
        self.chunks.error_flag || self.tiles.error_flag
    }

    pub fn close(self) -> (Stats, Stats, bool) {
        let mut chunks = self.chunks;
        let mut tiles = self.tiles;
        let error_flag = chunks.error_flag || tiles.error_flag;
        chunks.close();
        tiles.close();
        (chunks.stats, tiles.stats, error_flag)
    }

    fn clone_node_xml(&mut self, id: i64) -> Option<NodeXml> {
        self.chunks.find(StorageKind::Node, id).and_then(|e| e.as_node()).map(NodeXml::from)
    }

    fn clone_way_xml(&mut self, id: i64) -> Option<WayXml> {
        self.chunks.find(StorageKind::Way, id).and_then(|e| e.as_way()).map(WayXml::from)
    }

    fn clone_relation_xml(&mut self, id: i64) -> Option<RelationXml> {
        self.chunks.find(StorageKind::Relation, id).and_then(|e| e.as_relation()).map(RelationXml::from)
    }

    /// Tile production (§4.9): gathers every entity the tile references,
    /// joins/samples/clips the non-relation ways, and writes a
    /// self-contained tile document to `out_path`.
    pub fn make_tile(&mut self, zoom: u8, x: i64, y: i64, out_path: &Path) -> Result<()> {
        let tile_nodes: Vec<i64> = self.tiles.find(zoom, x, y).nodes.iter().copied().collect();
        let tile_ways: Vec<i64> = self.tiles.find(zoom, x, y).ways.iter().copied().collect();
        let tile_relations: Vec<i64> = self.tiles.find(zoom, x, y).relations.iter().copied().collect();

        let mut emitted_nodes: HashSet<i64> = HashSet::new();
        let mut emitted_ways: HashSet<i64> = HashSet::new();
        let mut node_docs: Vec<NodeXml> = Vec::new();
        let mut way_docs: Vec<WayXml> = Vec::new();
        let mut relation_docs: Vec<RelationXml> = Vec::new();

        // Step 3: directly-referenced nodes.
        for id in &tile_nodes {
            if emitted_nodes.insert(*id) {
                if let Some(xml_node) = self.clone_node_xml(*id) {
                    node_docs.push(xml_node);
                }
            }
        }

        // Step 4: relations, their direct node members, and a non-join
        // fast path for their way members (preserves exact polygon shape).
        for rel_id in &tile_relations {
            let Some(relation) = self.chunks.find(StorageKind::Relation, *rel_id).and_then(|e| e.as_relation()).cloned() else {
                continue;
            };
            for member in &relation.members {
                match member.kind {
                    MemberKind::Node => {
                        if emitted_nodes.insert(member.id) {
                            if let Some(xml_node) = self.clone_node_xml(member.id) {
                                node_docs.push(xml_node);
                            }
                        }
                    }
                    MemberKind::Way => {
                        if emitted_ways.insert(member.id) {
                            if let Some(xml_way) = self.clone_way_xml(member.id) {
                                for nd in &xml_way.nd {
                                    if emitted_nodes.insert(nd.reference) {
                                        if let Some(xml_node) = self.clone_node_xml(nd.reference) {
                                            node_docs.push(xml_node);
                                        }
                                    }
                                }
                                way_docs.push(xml_way);
                            }
                        }
                    }
                }
            }
            relation_docs.push(RelationXml::from(&relation));
        }

        // Step 5: ways not already pulled in by a relation.
        let mut working_ways: Vec<Way> = Vec::new();
        for way_id in &tile_ways {
            if emitted_ways.contains(way_id) {
                continue;
            }
            if let Some(way) = self.chunks.find(StorageKind::Way, *way_id).and_then(|e| e.as_way()).cloned() {
                working_ways.push(way);
            }
        }

        // Resolve coordinates for every nd referenced by the working ways,
        // once, up front (missing refs are tolerated silently, §3).
        let mut coords: HashMap<i64, (f64, f64)> = HashMap::new();
        for way in &working_ways {
            for &nd in &way.nds {
                if !coords.contains_key(&nd) {
                    if let Some(coord) = self.node_coord(nd) {
                        coords.insert(nd, coord);
                    }
                }
            }
        }

        // Steps 6-8: join, sample, clip.
        let joined = wayalgo::join_ways(&working_ways, &coords);
        let clip_bbox = tile_bounds(zoom, x, y).expand(TILE_CLIP_OVERSCAN);

        for line in joined {
            let sampled = wayalgo::sample_for_zoom(&line.nds, &coords, zoom);
            let clipped = wayalgo::clip_by_quadrant(&sampled, &coords, &clip_bbox);
            if clipped.is_empty() {
                continue;
            }

            // Step 9: emit any nds not already emitted, then the way itself.
            for &nd in &clipped {
                if emitted_nodes.insert(nd) {
                    if let Some(xml_node) = self.clone_node_xml(nd) {
                        node_docs.push(xml_node);
                    }
                }
            }

            // §8: the emitted bbox must enclose the way's own nds, not the
            // tile's clip boundary.
            let mut way_bbox: Option<BBox> = None;
            for &nd in &clipped {
                if let Some(&(lat, lon)) = coords.get(&nd) {
                    bbox_add_point(&mut way_bbox, lat, lon);
                }
            }
            let way_bbox = way_bbox.unwrap_or(clip_bbox);

            way_docs.push(WayXml {
                id: line.id,
                class: line.class,
                layer: line.layer,
                name: line.name,
                abrev: line.abrev,
                oneway: line.oneway,
                bridge: line.bridge,
                tunnel: line.tunnel,
                cutting: line.cutting,
                lat_t: way_bbox.lat_t,
                lon_l: way_bbox.lon_l,
                lat_b: way_bbox.lat_b,
                lon_r: way_bbox.lon_r,
                nd: clipped.into_iter().map(|reference| xml::NdXml { reference }).collect(),
            });
        }

        let doc = TileDocumentXml { node: node_docs, way: way_docs, relation: relation_docs };
        xml::write_tile_document(out_path, &doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Node, Way};
    use crate::geo::BBox;

    fn node(id: i64, lat: f64, lon: f64) -> Node {
        Node { id, lat, lon, class: 1, name: None, abrev: None, ele: None, st: 0, refcount: 0 }
    }

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
    fn single_node_round_trips_through_close_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut index = Index::open(dir.path(), usize::MAX, usize::MAX);
            assert!(index.add_node(node(42, 40.0, -105.0), 15, false, true));
            index.close();
        }
        let mut index = Index::open(dir.path(), usize::MAX, usize::MAX);
        let found = index.find(StorageKind::Node, 42).unwrap().as_node().unwrap();
        assert_eq!(found.name, None);
        assert_eq!(found.lat, 40.0);
    }

    #[test]
    fn tile_ref_expansion_covers_the_whole_ladder() {
        let mut index = Index::open(tempfile::tempdir().unwrap().path(), usize::MAX, usize::MAX);
        index.add_node(node(7, 0.0, 0.0), 15, false, true);
        for &z in &ZOOM_LADDER {
            let (x, y) = crate::geo::tile_xy_at_zoom(0.0, 0.0, z);
            let tile = index.tiles.find(z, x, y);
            assert!(tile.nodes.contains(&7), "zoom {z} missing ref");
        }
    }

    #[test]
    fn way_with_no_resolvable_nds_is_dropped() {
        let mut index = Index::open(tempfile::tempdir().unwrap().path(), usize::MAX, usize::MAX);
        let way = Way {
            id: 1,
            class: 1,
            layer: 0,
            name: None,
            abrev: None,
            oneway: false,
            bridge: false,
            tunnel: false,
            cutting: false,
            nds: vec![999], // never added as a node
            bbox: BBox::from_point(0.0, 0.0),
        };
        assert!(!index.add_way(way, 15, false, true));
    }

    #[test]
    fn a_way_is_not_dropped_when_its_id_collides_with_a_relation_id() {
        // Way ids and relation ids are independent spaces in OSM and overlap
        // routinely; a tile referencing both relation 100 and way 100 must
        // still emit way 100 (it must not be mistaken for the relation's own
        // way members, which are tracked separately).
        let dir = tempfile::tempdir().unwrap();
        let mut index = Index::open(dir.path(), usize::MAX, usize::MAX);

        index.add_node(node(1, 0.0, 0.0), 15, false, false);
        index.add_node(node(2, 0.0, 0.0), 15, false, false);

        // The relation's own way member (200) is pulled in only through
        // relation traversal, never through the tile's way-ref set.
        index.add_way(way(200, vec![1, 2]), 15, false, false);
        let relation = Relation {
            id: 100,
            class: 1,
            rel_type: 0,
            name: None,
            abrev: None,
            members: vec![crate::entity::Member { kind: MemberKind::Way, id: 200, role: crate::entity::Role::Outer }],
            bbox: BBox::from_point(0.0, 0.0),
        };
        assert!(index.add_relation(relation, 15, false));

        // A *way* that happens to share id 100 with the relation above, and
        // is tile-referenced directly (not through any relation).
        assert!(index.add_way(way(100, vec![1, 2]), 15, false, true));

        let (x, y) = crate::geo::tile_xy_at_zoom(0.0, 0.0, 15);
        let out_path = dir.path().join("out.xml.gz");
        index.make_tile(15, x, y, &out_path).unwrap();

        let doc = xml::read_tile_document(&out_path).unwrap();
        assert!(doc.way.iter().any(|w| w.id == 100), "way 100 missing from emitted tile");
    }
}
