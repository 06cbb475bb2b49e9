//! Fixed US-postal-style abbreviation table (Open Question 4): name
//! normalization applied at ingest time so the core never recomputes
//! `abrev` (§4.2 — "abrev is derived there and never recomputed by the
//! core"). Only the last word of a name is substituted, matching the
//! common USPS street-suffix convention.

/// `(full word, abbreviation)`, matched case-insensitively against a name's
/// final word. Order does not matter — lookups are by exact word match.
const SUFFIXES: &[(&str, &str)] = &[
    ("street", "St"),
    ("avenue", "Ave"),
    ("boulevard", "Blvd"),
    ("drive", "Dr"),
    ("court", "Ct"),
    ("lane", "Ln"),
    ("road", "Rd"),
    ("place", "Pl"),
    ("square", "Sq"),
    ("terrace", "Ter"),
    ("parkway", "Pkwy"),
    ("highway", "Hwy"),
    ("trail", "Trl"),
    ("circle", "Cir"),
    ("mountain", "Mtn"),
    ("mountains", "Mtns"),
    ("creek", "Crk"),
    ("canyon", "Cyn"),
    ("junction", "Jct"),
    ("fork", "Frk"),
    ("crossing", "Xing"),
    ("heights", "Hts"),
    ("national", "Natl"),
    ("wilderness", "Wldrns"),
];

/// Abbreviates `name`'s final word via [`SUFFIXES`]. Returns `None` when no
/// word matches, so the caller can leave `abrev` unset rather than storing a
/// copy identical to `name`.
pub fn abbreviate(name: &str) -> Option<String> {
    let last_word = name.rsplit(' ').next()?;
    let lower = last_word.to_lowercase();
    let (_, replacement) = SUFFIXES.iter().find(|(full, _)| *full == lower)?;

    let prefix_len = name.len() - last_word.len();
    Some(format!("{}{}", &name[..prefix_len], replacement))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abbreviates_known_suffix() {
        assert_eq!(abbreviate("Pearl Street").as_deref(), Some("Pearl St"));
        assert_eq!(abbreviate("Flagstaff Mountain").as_deref(), Some("Flagstaff Mtn"));
    }

    #[test]
    fn leaves_unknown_suffix_alone() {
        assert_eq!(abbreviate("Chautauqua Park"), None);
    }

    #[test]
    fn single_word_name_is_checked_whole() {
        assert_eq!(abbreviate("Wilderness").as_deref(), Some("Wldrns"));
    }
}
