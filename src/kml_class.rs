//! Fixed KML tag → core class-code table (Open Question 4): the KML
//! importer reuses OSM class codes via a set of embedded string-match
//! rules rather than a configuration file. These codes are otherwise
//! opaque integers to the core (§3 "class is a small integer code") — this
//! module is the one place that assigns them symbolic names.

pub const CLASS_WILDERNESS: i32 = 900;
pub const CLASS_NATIONAL_PARK: i32 = 901;
pub const CLASS_STATE_PARK: i32 = 902;
pub const CLASS_NATIONAL_FOREST: i32 = 903;
pub const CLASS_WILDLIFE_REFUGE: i32 = 904;
pub const CLASS_COUNTY_BOUNDARY: i32 = 905;
pub const CLASS_CITY_BOUNDARY: i32 = 906;
pub const CLASS_UNKNOWN_BOUNDARY: i32 = 999;

/// Matches a KML `<name>` or folder label against the fixed rule set,
/// falling back to [`CLASS_UNKNOWN_BOUNDARY`] (never `None` — an unmatched
/// KML boundary is still indexed, just uncategorized).
pub fn classify_kml_tag(tag: &str) -> i32 {
    let lower = tag.to_lowercase();
    if lower.contains("wilderness") {
        CLASS_WILDERNESS
    } else if lower.contains("national park") {
        CLASS_NATIONAL_PARK
    } else if lower.contains("state park") {
        CLASS_STATE_PARK
    } else if lower.contains("national forest") {
        CLASS_NATIONAL_FOREST
    } else if lower.contains("wildlife refuge") {
        CLASS_WILDLIFE_REFUGE
    } else if lower.contains("county") {
        CLASS_COUNTY_BOUNDARY
    } else if lower.contains("city") || lower.contains("municipal") {
        CLASS_CITY_BOUNDARY
    } else {
        CLASS_UNKNOWN_BOUNDARY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_known_tags() {
        assert_eq!(classify_kml_tag("Indian Peaks Wilderness"), CLASS_WILDERNESS);
        assert_eq!(classify_kml_tag("Rocky Mountain National Park"), CLASS_NATIONAL_PARK);
        assert_eq!(classify_kml_tag("Boulder County"), CLASS_COUNTY_BOUNDARY);
    }

    #[test]
    fn unmatched_tag_falls_back_to_unknown() {
        assert_eq!(classify_kml_tag("Some Random Folder"), CLASS_UNKNOWN_BOUNDARY);
    }
}
