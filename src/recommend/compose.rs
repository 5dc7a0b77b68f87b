//! Canonical text composition for embedding input.
//!
//! Every item is reduced to two strings before embedding: the free-text
//! overview and a structured feature line. Both pipelines call into this
//! module, so the rendered text is byte-identical between catalog builds and
//! query time; any formatting drift here changes the embedding space and
//! desyncs relevance.

use crate::catalog::MovieFeatures;

/// Substituted for a missing or blank overview.
pub const OVERVIEW_SENTINEL: &str = "No overview available";

/// Rendered in place of an absent director.
pub const ABSENT_FIELD: &str = "None";

/// The two canonical strings derived from one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedText {
    pub semantic: String,
    pub feature: String,
}

/// Compose both embedding inputs for an item.
pub fn compose(features: &MovieFeatures) -> ComposedText {
    ComposedText {
        semantic: semantic_text(features.overview.as_deref()),
        feature: feature_text(
            &features.genres,
            &features.cast,
            features.director.as_deref(),
        ),
    }
}

/// The overview, trimmed; blank or missing overviews collapse to the
/// sentinel so they all map to the same embedding.
pub fn semantic_text(overview: Option<&str>) -> String {
    match overview.map(str::trim) {
        Some(text) if !text.is_empty() => text.to_string(),
        _ => OVERVIEW_SENTINEL.to_string(),
    }
}

/// The structured feature line: `Genres: {genres}. Cast: {cast}.
/// Director: {director}.` Lists render comma-separated in catalog order.
pub fn feature_text(genres: &[String], cast: &[String], director: Option<&str>) -> String {
    let director = match director.map(str::trim) {
        Some(name) if !name.is_empty() => name,
        _ => ABSENT_FIELD,
    };

    format!(
        "Genres: {}. Cast: {}. Director: {}.",
        genres.join(", "),
        cast.join(", "),
        director
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_semantic_text_passes_through_trimmed() {
        assert_eq!(semantic_text(Some("  A heist goes wrong.  ")), "A heist goes wrong.");
    }

    #[test]
    fn test_semantic_text_sentinel_for_all_blank_forms() {
        // null, empty and whitespace-only overviews must embed identically
        assert_eq!(semantic_text(None), OVERVIEW_SENTINEL);
        assert_eq!(semantic_text(Some("")), OVERVIEW_SENTINEL);
        assert_eq!(semantic_text(Some("   ")), OVERVIEW_SENTINEL);
        assert_eq!(semantic_text(Some("\t\n")), OVERVIEW_SENTINEL);
    }

    #[test]
    fn test_feature_text_exact_format() {
        let text = feature_text(
            &strings(&["Action", "Sci-Fi"]),
            &strings(&["Keanu Reeves", "Carrie-Anne Moss"]),
            Some("Lana Wachowski"),
        );
        assert_eq!(
            text,
            "Genres: Action, Sci-Fi. Cast: Keanu Reeves, Carrie-Anne Moss. Director: Lana Wachowski."
        );
    }

    #[test]
    fn test_feature_text_absent_director() {
        let text = feature_text(&strings(&["Drama"]), &strings(&["A"]), None);
        assert_eq!(text, "Genres: Drama. Cast: A. Director: None.");

        let blank = feature_text(&strings(&["Drama"]), &strings(&["A"]), Some("  "));
        assert_eq!(blank, text);
    }

    #[test]
    fn test_feature_text_empty_lists() {
        let text = feature_text(&[], &[], None);
        assert_eq!(text, "Genres: . Cast: . Director: None.");
    }

    #[test]
    fn test_compose_is_deterministic() {
        let features = crate::catalog::MovieFeatures {
            overview: Some("A computer hacker learns the truth.".into()),
            genres: strings(&["Action"]),
            cast: strings(&["Keanu Reeves"]),
            director: Some("Lana Wachowski".into()),
        };

        let a = compose(&features);
        let b = compose(&features);
        assert_eq!(a, b);
        assert_eq!(a.semantic, "A computer hacker learns the truth.");
    }
}
