//! Filter & style adapter (§4.7): a read-only class→{min_zoom, flags,
//! geometry} lookup, parsed once from a plain (non-gzipped) XML
//! configuration file and then shared immutably across the ingest tools.
//!
//! Parsing follows the teacher's own `quick_xml::de::from_reader` idiom
//! (`denisbog-osm-tile/src/main.rs`), applied here to a small attribute-only
//! document instead of an OSM export.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{IndexError, Result};

/// Per-class lookup result (§4.7).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassInfo {
    /// Coarsest (lowest) zoom at which this class is kept; it remains kept
    /// at every finer (higher-numbered) zoom from there on.
    pub min_zoom: i32,
    pub center: bool,
    pub named: bool,
    pub point: bool,
    pub line: bool,
    pub poly: bool,
}

impl ClassInfo {
    pub fn kept_at_zoom(&self, zoom: i32) -> bool {
        zoom >= self.min_zoom
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ClassEntryXml {
    #[serde(rename = "@code")]
    code: i32,
    #[serde(rename = "@min_zoom")]
    min_zoom: i32,
    #[serde(rename = "@center", default)]
    center: bool,
    #[serde(rename = "@named", default)]
    named: bool,
    #[serde(rename = "@point", default)]
    point: bool,
    #[serde(rename = "@line", default)]
    line: bool,
    #[serde(rename = "@poly", default)]
    poly: bool,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename = "filter")]
struct FilterXml {
    #[serde(rename = "class", default)]
    class: Vec<ClassEntryXml>,
}

/// Immutable class table, computed once and cheaply cloned (`Arc` inside) so
/// every ingest worker can hold its own handle without re-parsing (§4.7).
#[derive(Clone)]
pub struct FilterConfig {
    classes: Arc<HashMap<i32, ClassInfo>>,
}

impl FilterConfig {
    pub fn load(path: &Path) -> Result<FilterConfig> {
        let file = File::open(path)?;
        let doc: FilterXml =
            quick_xml::de::from_reader(BufReader::new(file)).map_err(|e| IndexError::Xml(e.to_string()))?;
        let classes = doc
            .class
            .into_iter()
            .map(|c| {
                (
                    c.code,
                    ClassInfo {
                        min_zoom: c.min_zoom,
                        center: c.center,
                        named: c.named,
                        point: c.point,
                        line: c.line,
                        poly: c.poly,
                    },
                )
            })
            .collect();
        Ok(FilterConfig { classes: Arc::new(classes) })
    }

    pub fn lookup(&self, class: i32) -> Option<ClassInfo> {
        self.classes.get(&class).copied()
    }

    /// A class absent from the table is treated as unfiltered, i.e. dropped
    /// at every zoom — the filter file is the sole authority on what survives.
    pub fn selected(&self, class: i32, zoom: i32, has_name: bool) -> bool {
        match self.lookup(class) {
            None => false,
            Some(info) => info.kept_at_zoom(zoom) && (!info.named || has_name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_class_table_and_answers_selected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("filter.xml");
        let mut file = File::create(&path).unwrap();
        write!(
            file,
            r#"<filter><class code="1" min_zoom="5" named="true" line="true"/></filter>"#
        )
        .unwrap();

        let config = FilterConfig::load(&path).unwrap();
        assert!(config.selected(1, 10, true));
        assert!(!config.selected(1, 10, false)); // named required
        assert!(!config.selected(1, 3, true)); // too coarse
        assert!(!config.selected(99, 10, true)); // unknown class
    }
}
