//! Gzipped-XML codec shared by the chunk store and the tile store (§6).
//!
//! Follows the teacher's own parsing idiom
//! (`quick_xml::de::from_reader` / `quick_xml::se::to_string` over
//! `#[derive(Serialize, Deserialize)]` structs with `@attr` renames),
//! wrapped in a gzip stream the way `stadiamaps-pmtiles-rs`'s writer
//! wraps its tile bytes in a `flate2::write::GzEncoder`.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};

use crate::entity::{EntityRecord, Member, MemberKind, Node, Relation, Role, Shape, Way};
use crate::error::{IndexError, Result};
use crate::geo::BBox;

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct NodeXml {
    #[serde(rename = "@id")]
    pub id: i64,
    #[serde(rename = "@lat")]
    pub lat: f64,
    #[serde(rename = "@lon")]
    pub lon: f64,
    #[serde(rename = "@class")]
    pub class: i32,
    #[serde(rename = "@name", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "@abrev", skip_serializing_if = "Option::is_none")]
    pub abrev: Option<String>,
    #[serde(rename = "@ele", skip_serializing_if = "Option::is_none")]
    pub ele: Option<i32>,
    #[serde(rename = "@st")]
    pub st: u8,
    #[serde(rename = "@refcount")]
    pub refcount: u32,
}

impl From<&Node> for NodeXml {
    fn from(n: &Node) -> Self {
        NodeXml {
            id: n.id,
            lat: n.lat,
            lon: n.lon,
            class: n.class,
            name: n.name.clone(),
            abrev: n.abrev.clone(),
            ele: n.ele,
            st: n.st,
            refcount: n.refcount,
        }
    }
}

impl From<NodeXml> for Node {
    fn from(x: NodeXml) -> Self {
        Node {
            id: x.id,
            lat: x.lat,
            lon: x.lon,
            class: x.class,
            name: x.name,
            abrev: x.abrev,
            ele: x.ele,
            st: x.st,
            refcount: x.refcount,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct NdXml {
    #[serde(rename = "@ref")]
    pub reference: i64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct WayXml {
    #[serde(rename = "@id")]
    pub id: i64,
    #[serde(rename = "@class")]
    pub class: i32,
    #[serde(rename = "@layer")]
    pub layer: i8,
    #[serde(rename = "@name", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "@abrev", skip_serializing_if = "Option::is_none")]
    pub abrev: Option<String>,
    #[serde(rename = "@oneway")]
    pub oneway: bool,
    #[serde(rename = "@bridge")]
    pub bridge: bool,
    #[serde(rename = "@tunnel")]
    pub tunnel: bool,
    #[serde(rename = "@cutting")]
    pub cutting: bool,
    #[serde(rename = "@latT")]
    pub lat_t: f64,
    #[serde(rename = "@lonL")]
    pub lon_l: f64,
    #[serde(rename = "@latB")]
    pub lat_b: f64,
    #[serde(rename = "@lonR")]
    pub lon_r: f64,
    #[serde(rename = "nd", default)]
    pub nd: Vec<NdXml>,
}

impl From<&Way> for WayXml {
    fn from(w: &Way) -> Self {
        WayXml {
            id: w.id,
            class: w.class,
            layer: w.layer,
            name: w.name.clone(),
            abrev: w.abrev.clone(),
            oneway: w.oneway,
            bridge: w.bridge,
            tunnel: w.tunnel,
            cutting: w.cutting,
            lat_t: w.bbox.lat_t,
            lon_l: w.bbox.lon_l,
            lat_b: w.bbox.lat_b,
            lon_r: w.bbox.lon_r,
            nd: w.nds.iter().map(|&reference| NdXml { reference }).collect(),
        }
    }
}

impl From<WayXml> for Way {
    fn from(x: WayXml) -> Self {
        Way {
            id: x.id,
            class: x.class,
            layer: x.layer,
            name: x.name,
            abrev: x.abrev,
            oneway: x.oneway,
            bridge: x.bridge,
            tunnel: x.tunnel,
            cutting: x.cutting,
            nds: x.nd.into_iter().map(|n| n.reference).collect(),
            bbox: BBox { lat_t: x.lat_t, lon_l: x.lon_l, lat_b: x.lat_b, lon_r: x.lon_r },
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct MemberXml {
    #[serde(rename = "@type")]
    pub member_type: String,
    #[serde(rename = "@ref")]
    pub reference: i64,
    #[serde(rename = "@role")]
    pub role: i32,
}

impl From<&Member> for MemberXml {
    fn from(m: &Member) -> Self {
        MemberXml {
            member_type: match m.kind {
                MemberKind::Node => "node".to_string(),
                MemberKind::Way => "way".to_string(),
            },
            reference: m.id,
            role: m.role.to_code(),
        }
    }
}

impl MemberXml {
    fn into_member(self) -> Option<Member> {
        let kind = match self.member_type.as_str() {
            "node" => MemberKind::Node,
            "way" => MemberKind::Way,
            _ => return None,
        };
        Some(Member { kind, id: self.reference, role: Role::from_code(self.role) })
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct RelationXml {
    #[serde(rename = "@id")]
    pub id: i64,
    #[serde(rename = "@class")]
    pub class: i32,
    #[serde(rename = "@type")]
    pub rel_type: i32,
    #[serde(rename = "@name", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "@abrev", skip_serializing_if = "Option::is_none")]
    pub abrev: Option<String>,
    #[serde(rename = "@latT")]
    pub lat_t: f64,
    #[serde(rename = "@lonL")]
    pub lon_l: f64,
    #[serde(rename = "@latB")]
    pub lat_b: f64,
    #[serde(rename = "@lonR")]
    pub lon_r: f64,
    #[serde(rename = "member", default)]
    pub member: Vec<MemberXml>,
}

impl From<&Relation> for RelationXml {
    fn from(r: &Relation) -> Self {
        RelationXml {
            id: r.id,
            class: r.class,
            rel_type: r.rel_type,
            name: r.name.clone(),
            abrev: r.abrev.clone(),
            lat_t: r.bbox.lat_t,
            lon_l: r.bbox.lon_l,
            lat_b: r.bbox.lat_b,
            lon_r: r.bbox.lon_r,
            member: r.members.iter().map(MemberXml::from).collect(),
        }
    }
}

impl From<RelationXml> for Relation {
    fn from(x: RelationXml) -> Self {
        Relation {
            id: x.id,
            class: x.class,
            rel_type: x.rel_type,
            name: x.name,
            abrev: x.abrev,
            members: x.member.into_iter().filter_map(MemberXml::into_member).collect(),
            bbox: BBox { lat_t: x.lat_t, lon_l: x.lon_l, lat_b: x.lat_b, lon_r: x.lon_r },
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct RefXml {
    #[serde(rename = "@id")]
    pub id: i64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename = "osmdb")]
pub struct NodeChunkXml {
    #[serde(rename = "node", default)]
    pub node: Vec<NodeXml>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename = "osmdb")]
pub struct WayChunkXml {
    #[serde(rename = "way", default)]
    pub way: Vec<WayXml>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename = "osmdb")]
pub struct RelationChunkXml {
    #[serde(rename = "relation", default)]
    pub relation: Vec<RelationXml>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename = "osmdb")]
pub struct RefChunkXml {
    #[serde(rename = "ref", default)]
    pub r#ref: Vec<RefXml>,
}

/// The emitted tile document (§6): root `<osmdb>` with gathered nodes, then
/// joined/sampled/clipped ways, then relations.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename = "osmdb")]
pub struct TileDocumentXml {
    #[serde(rename = "node", default)]
    pub node: Vec<NodeXml>,
    #[serde(rename = "way", default)]
    pub way: Vec<WayXml>,
    #[serde(rename = "relation", default)]
    pub relation: Vec<RelationXml>,
}

/// The on-disk tile reference file (§4.4, §6): `<n ref>`, `<w ref>`, `<r ref>`.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename = "osmdb")]
pub struct TileRefXml {
    #[serde(rename = "n", default)]
    pub n: Vec<RefXml>,
    #[serde(rename = "w", default)]
    pub w: Vec<RefXml>,
    #[serde(rename = "r", default)]
    pub r: Vec<RefXml>,
}

fn write_gz_xml<T: Serialize>(path: &Path, doc: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let xml = quick_xml::se::to_string(doc).map_err(|e| IndexError::Xml(e.to_string()))?;
    let file = File::create(path)?;
    let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
    encoder.write_all(xml.as_bytes())?;
    encoder.finish()?;
    Ok(())
}

fn read_gz_xml<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let file = File::open(path)?;
    let mut decoder = GzDecoder::new(BufReader::new(file));
    let mut xml = String::new();
    decoder.read_to_string(&mut xml)?;
    quick_xml::de::from_str(&xml).map_err(|e| IndexError::Xml(e.to_string()))
}

/// Serializes the entities of a single chunk (all of the same [`Shape`])
/// to a gzipped XML document at `path`.
pub fn write_chunk(path: &Path, shape: Shape, entities: &[&EntityRecord]) -> Result<()> {
    match shape {
        Shape::Node => {
            let doc = NodeChunkXml { node: entities.iter().filter_map(|e| e.as_node()).map(NodeXml::from).collect() };
            write_gz_xml(path, &doc)
        }
        Shape::Way => {
            let doc = WayChunkXml { way: entities.iter().filter_map(|e| e.as_way()).map(WayXml::from).collect() };
            write_gz_xml(path, &doc)
        }
        Shape::Relation => {
            let doc = RelationChunkXml {
                relation: entities.iter().filter_map(|e| e.as_relation()).map(RelationXml::from).collect(),
            };
            write_gz_xml(path, &doc)
        }
        Shape::Ref => {
            let doc = RefChunkXml { r#ref: entities.iter().map(|e| RefXml { id: e.id() }).collect() };
            write_gz_xml(path, &doc)
        }
    }
}

/// Reads a chunk file back into entity records, keyed by nothing in
/// particular — the caller re-keys by id-lower.
pub fn read_chunk(path: &Path, shape: Shape) -> Result<Vec<EntityRecord>> {
    match shape {
        Shape::Node => {
            let doc: NodeChunkXml = read_gz_xml(path)?;
            Ok(doc.node.into_iter().map(|x| EntityRecord::Node(Box::new(x.into()))).collect())
        }
        Shape::Way => {
            let doc: WayChunkXml = read_gz_xml(path)?;
            Ok(doc.way.into_iter().map(|x| EntityRecord::Way(Box::new(x.into()))).collect())
        }
        Shape::Relation => {
            let doc: RelationChunkXml = read_gz_xml(path)?;
            Ok(doc.relation.into_iter().map(|x| EntityRecord::Relation(Box::new(x.into()))).collect())
        }
        Shape::Ref => {
            let doc: RefChunkXml = read_gz_xml(path)?;
            Ok(doc.r#ref.into_iter().map(|x| EntityRecord::Ref(x.id)).collect())
        }
    }
}

pub fn write_tile_refs(path: &Path, nodes: &[i64], ways: &[i64], relations: &[i64]) -> Result<()> {
    let doc = TileRefXml {
        n: nodes.iter().map(|&id| RefXml { id }).collect(),
        w: ways.iter().map(|&id| RefXml { id }).collect(),
        r: relations.iter().map(|&id| RefXml { id }).collect(),
    };
    write_gz_xml(path, &doc)
}

pub fn read_tile_refs(path: &Path) -> Result<(Vec<i64>, Vec<i64>, Vec<i64>)> {
    let doc: TileRefXml = read_gz_xml(path)?;
    Ok((
        doc.n.into_iter().map(|r| r.id).collect(),
        doc.w.into_iter().map(|r| r.id).collect(),
        doc.r.into_iter().map(|r| r.id).collect(),
    ))
}

pub fn write_tile_document(path: &Path, doc: &TileDocumentXml) -> Result<()> {
    write_gz_xml(path, doc)
}

/// Reads back a document in the same node/way/relation shape used both for
/// emitted tiles and for the parser's intermediate `prefix-*.xml.gz` files.
pub fn read_tile_document(path: &Path) -> Result<TileDocumentXml> {
    read_gz_xml(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Node;

    #[test]
    fn node_chunk_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("0.xml.gz");
        let node = Node {
            id: 42,
            lat: 40.0,
            lon: -105.0,
            class: 3,
            name: Some("X".to_string()),
            abrev: None,
            ele: Some(1600),
            st: 8,
            refcount: 0,
        };
        let record = EntityRecord::Node(Box::new(node.clone()));
        write_chunk(&path, Shape::Node, &[&record]).unwrap();

        let read_back = read_chunk(&path, Shape::Node).unwrap();
        assert_eq!(read_back.len(), 1);
        assert_eq!(read_back[0].as_node().unwrap(), &node);
    }

    #[test]
    fn tile_refs_round_trip_exactly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tile.xml.gz");
        write_tile_refs(&path, &[1, 2, 3], &[10], &[]).unwrap();
        let (n, w, r) = read_tile_refs(&path).unwrap();
        assert_eq!(n, vec![1, 2, 3]);
        assert_eq!(w, vec![10]);
        assert!(r.is_empty());
    }
}
