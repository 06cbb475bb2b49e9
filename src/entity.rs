//! Entity model (§3, §4.2): node/way/relation value types, constructed from
//! an attribute map the way the out-of-scope SAX layer would hand them to
//! the core, plus the storage-kind enumeration used to address chunks.

use std::collections::HashMap;
use std::mem;

use serde::{Deserialize, Serialize};

use crate::error::{IndexError, Result};
use crate::geo::BBox;

/// Attributes as handed down by the (out-of-scope) XML SAX layer.
pub type AttrMap = HashMap<String, String>;

fn get_required(attrs: &AttrMap, key: &str) -> Result<String> {
    attrs
        .get(key)
        .cloned()
        .ok_or_else(|| IndexError::InvalidAttr(format!("missing `{key}`")))
}

fn parse_required<T: std::str::FromStr>(attrs: &AttrMap, key: &str) -> Result<T> {
    get_required(attrs, key)?
        .parse()
        .map_err(|_| IndexError::InvalidAttr(format!("bad `{key}`")))
}

fn parse_optional<T: std::str::FromStr>(attrs: &AttrMap, key: &str) -> Result<Option<T>> {
    match attrs.get(key) {
        None => Ok(None),
        Some(v) => v
            .parse()
            .map(Some)
            .map_err(|_| IndexError::InvalidAttr(format!("bad `{key}`"))),
    }
}

fn parse_bool_flag(attrs: &AttrMap, key: &str) -> bool {
    attrs.get(key).map(|v| v == "1" || v == "true" || v == "yes").unwrap_or(false)
}

/// A node (§3): a point with optional name/elevation/state-code tags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: i64,
    pub lat: f64,
    pub lon: f64,
    pub class: i32,
    pub name: Option<String>,
    pub abrev: Option<String>,
    pub ele: Option<i32>,
    /// US-state code, 1..59, or 0 when unset.
    pub st: u8,
    pub refcount: u32,
}

impl Node {
    pub fn from_attrs(attrs: &AttrMap) -> Result<Node> {
        Ok(Node {
            id: parse_required(attrs, "id")?,
            lat: parse_required(attrs, "lat")?,
            lon: parse_required(attrs, "lon")?,
            class: parse_optional(attrs, "class")?.unwrap_or(0),
            name: attrs.get("name").cloned(),
            abrev: attrs.get("abrev").cloned(),
            ele: parse_optional(attrs, "ele")?,
            st: parse_optional(attrs, "st")?.unwrap_or(0),
            refcount: parse_optional(attrs, "refcount")?.unwrap_or(0),
        })
    }

    /// Estimated resident byte size, used for chunk LRU accounting (§4.2).
    pub fn size_of(&self) -> usize {
        mem::size_of::<Node>()
            + self.name.as_ref().map_or(0, |s| s.len())
            + self.abrev.as_ref().map_or(0, |s| s.len())
    }
}

/// A way (§3): an ordered sequence of node ids plus line/area attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Way {
    pub id: i64,
    pub class: i32,
    pub layer: i8,
    pub name: Option<String>,
    pub abrev: Option<String>,
    pub oneway: bool,
    pub bridge: bool,
    pub tunnel: bool,
    pub cutting: bool,
    pub nds: Vec<i64>,
    pub bbox: BBox,
}

impl Way {
    pub fn from_attrs(attrs: &AttrMap) -> Result<Way> {
        Ok(Way {
            id: parse_required(attrs, "id")?,
            class: parse_optional(attrs, "class")?.unwrap_or(0),
            layer: parse_optional(attrs, "layer")?.unwrap_or(0),
            name: attrs.get("name").cloned(),
            abrev: attrs.get("abrev").cloned(),
            oneway: parse_bool_flag(attrs, "oneway"),
            bridge: parse_bool_flag(attrs, "bridge"),
            tunnel: parse_bool_flag(attrs, "tunnel"),
            cutting: parse_bool_flag(attrs, "cutting"),
            nds: Vec::new(),
            bbox: BBox::from_point(0.0, 0.0),
        })
    }

    pub fn push_nd(&mut self, node_id: i64) {
        self.nds.push(node_id);
    }

    pub fn is_loop(&self) -> bool {
        self.nds.len() >= 2 && self.nds.first() == self.nds.last()
    }

    pub fn size_of(&self) -> usize {
        mem::size_of::<Way>()
            + self.name.as_ref().map_or(0, |s| s.len())
            + self.abrev.as_ref().map_or(0, |s| s.len())
            + self.nds.len() * mem::size_of::<i64>()
    }
}

/// The kind of entity a relation member refers to. Relation-of-relation
/// members are discarded at construction time (§3, non-goal: "members
/// that are themselves relations are ignored").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemberKind {
    Node,
    Way,
}

/// Bijective role code table (Open Question 5). `Other` carries the
/// original numeric code for roles outside this fixed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Outer,
    Inner,
    Unset,
    Other(i32),
}

impl Role {
    pub fn to_code(self) -> i32 {
        match self {
            Role::Outer => 0,
            Role::Inner => 1,
            Role::Unset => 2,
            Role::Other(code) => code,
        }
    }

    pub fn from_code(code: i32) -> Role {
        match code {
            0 => Role::Outer,
            1 => Role::Inner,
            2 => Role::Unset,
            other => Role::Other(other),
        }
    }

    pub fn from_str_role(role: &str) -> Role {
        match role {
            "outer" => Role::Outer,
            "inner" => Role::Inner,
            "" => Role::Unset,
            _ => Role::Other(3),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub kind: MemberKind,
    pub id: i64,
    pub role: Role,
}

/// A relation (§3): ordered members plus an aggregated bbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    pub id: i64,
    pub class: i32,
    pub rel_type: i32,
    pub name: Option<String>,
    pub abrev: Option<String>,
    pub members: Vec<Member>,
    pub bbox: BBox,
}

impl Relation {
    pub fn from_attrs(attrs: &AttrMap) -> Result<Relation> {
        Ok(Relation {
            id: parse_required(attrs, "id")?,
            class: parse_optional(attrs, "class")?.unwrap_or(0),
            rel_type: parse_optional(attrs, "type")?.unwrap_or(0),
            name: attrs.get("name").cloned(),
            abrev: attrs.get("abrev").cloned(),
            members: Vec::new(),
            bbox: BBox::from_point(0.0, 0.0),
        })
    }

    /// Appends a member, discarding relation-kind members per the
    /// one-level-deep membership resolution non-goal (§1, §3).
    pub fn push_member(&mut self, kind: Option<MemberKind>, id: i64, role: Role) {
        if let Some(kind) = kind {
            self.members.push(Member { kind, id, role });
        }
    }

    pub fn size_of(&self) -> usize {
        mem::size_of::<Relation>()
            + self.name.as_ref().map_or(0, |s| s.len())
            + self.abrev.as_ref().map_or(0, |s| s.len())
            + self.members.len() * mem::size_of::<Member>()
    }
}

/// The ten storage kinds the chunk store addresses entities/refs by (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StorageKind {
    Node,
    Way,
    Relation,
    CtrNode,
    CtrWay,
    CtrRelation,
    NodeRef,
    WayRef,
    CtrNodeRef,
    CtrWayRef,
}

/// Which payload shape a storage kind holds — used to pick the right XML
/// wrapper document when reading/writing a chunk (§4.3, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Node,
    Way,
    Relation,
    Ref,
}

impl StorageKind {
    /// Stable, bijective, lowercase on-disk directory name (§4.3, §6).
    pub fn as_str(self) -> &'static str {
        match self {
            StorageKind::Node => "node",
            StorageKind::Way => "way",
            StorageKind::Relation => "relation",
            StorageKind::CtrNode => "ctr_node",
            StorageKind::CtrWay => "ctr_way",
            StorageKind::CtrRelation => "ctr_relation",
            StorageKind::NodeRef => "node_ref",
            StorageKind::WayRef => "way_ref",
            StorageKind::CtrNodeRef => "ctr_node_ref",
            StorageKind::CtrWayRef => "ctr_way_ref",
        }
    }

    pub fn shape(self) -> Shape {
        match self {
            StorageKind::Node | StorageKind::CtrNode => Shape::Node,
            StorageKind::Way | StorageKind::CtrWay => Shape::Way,
            StorageKind::Relation | StorageKind::CtrRelation => Shape::Relation,
            StorageKind::NodeRef | StorageKind::WayRef | StorageKind::CtrNodeRef | StorageKind::CtrWayRef => {
                Shape::Ref
            }
        }
    }

    pub fn all() -> [StorageKind; 10] {
        [
            StorageKind::Node,
            StorageKind::Way,
            StorageKind::Relation,
            StorageKind::CtrNode,
            StorageKind::CtrWay,
            StorageKind::CtrRelation,
            StorageKind::NodeRef,
            StorageKind::WayRef,
            StorageKind::CtrNodeRef,
            StorageKind::CtrWayRef,
        ]
    }
}

/// One record resident in a chunk, tagged by its payload shape so that
/// chunks of every storage kind can share a single recency list (§4.5).
#[derive(Debug, Clone, PartialEq)]
pub enum EntityRecord {
    Node(Box<Node>),
    Way(Box<Way>),
    Relation(Box<Relation>),
    Ref(i64),
}

impl EntityRecord {
    pub fn id(&self) -> i64 {
        match self {
            EntityRecord::Node(n) => n.id,
            EntityRecord::Way(w) => w.id,
            EntityRecord::Relation(r) => r.id,
            EntityRecord::Ref(id) => *id,
        }
    }

    pub fn size_of(&self) -> usize {
        match self {
            EntityRecord::Node(n) => n.size_of(),
            EntityRecord::Way(w) => w.size_of(),
            EntityRecord::Relation(r) => r.size_of(),
            EntityRecord::Ref(_) => mem::size_of::<i64>(),
        }
    }

    pub fn as_node(&self) -> Option<&Node> {
        match self {
            EntityRecord::Node(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_way(&self) -> Option<&Way> {
        match self {
            EntityRecord::Way(w) => Some(w),
            _ => None,
        }
    }

    pub fn as_relation(&self) -> Option<&Relation> {
        match self {
            EntityRecord::Relation(r) => Some(r),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_from_attrs_reads_required_and_optional_fields() {
        let mut attrs = AttrMap::new();
        attrs.insert("id".into(), "42".into());
        attrs.insert("lat".into(), "40.0".into());
        attrs.insert("lon".into(), "-105.0".into());
        attrs.insert("name".into(), "X".into());

        let node = Node::from_attrs(&attrs).unwrap();
        assert_eq!(node.id, 42);
        assert_eq!(node.lat, 40.0);
        assert_eq!(node.lon, -105.0);
        assert_eq!(node.name.as_deref(), Some("X"));
        assert_eq!(node.st, 0);
    }

    #[test]
    fn relation_discards_relation_kind_members() {
        let mut attrs = AttrMap::new();
        attrs.insert("id".into(), "1".into());
        let mut rel = Relation::from_attrs(&attrs).unwrap();
        rel.push_member(Some(MemberKind::Way), 10, Role::Outer);
        rel.push_member(None, 11, Role::Unset); // would-be relation member
        assert_eq!(rel.members.len(), 1);
        assert_eq!(rel.members[0].id, 10);
    }

    #[test]
    fn storage_kind_strings_are_bijective() {
        let kinds = StorageKind::all();
        let mut strs: Vec<&str> = kinds.iter().map(|k| k.as_str()).collect();
        let len_before = strs.len();
        strs.sort_unstable();
        strs.dedup();
        assert_eq!(strs.len(), len_before);
    }
}
