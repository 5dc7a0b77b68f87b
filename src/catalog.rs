//! Catalog item types and dataset loading.
//!
//! The catalog is produced by the external metadata collaborator as a JSON
//! map of movie id -> record (`movie_dataset.json`). Items are immutable once
//! loaded; a catalog refresh replaces the whole collection and requires a
//! full snapshot rebuild.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Maximum number of cast members kept per item.
pub const MAX_CAST: usize = 5;

/// A catalog item as supplied by the metadata collaborator.
///
/// `overview`, `genres`, `cast` and `director` feed the embedding pipelines;
/// the remaining fields are carried through for display only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Movie {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub overview: Option<String>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub cast: Vec<String>,
    #[serde(default)]
    pub director: Option<String>,
    #[serde(default, alias = "poster")]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub rating: Option<f64>,
}

impl Movie {
    /// Extract the embedding-relevant fields as an ephemeral query record.
    pub fn features(&self) -> MovieFeatures {
        MovieFeatures {
            overview: self.overview.clone(),
            genres: self.genres.clone(),
            cast: self.cast.iter().take(MAX_CAST).cloned().collect(),
            director: self.director.clone(),
        }
    }
}

/// The per-request query record: same shape as a catalog item minus
/// `id`/`title`. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MovieFeatures {
    #[serde(default)]
    pub overview: Option<String>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub cast: Vec<String>,
    #[serde(default)]
    pub director: Option<String>,
}

/// Errors from the external metadata collaborator, both the dataset file and
/// the online lookup service. Surfaced to the caller; never retried here.
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("failed to read dataset: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed dataset: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("dataset key {0:?} is not a numeric movie id")]
    InvalidId(String),

    #[error("catalog is empty")]
    EmptyCatalog,

    #[error("metadata request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("metadata service returned status {0}")]
    Api(reqwest::StatusCode),

    #[error("no movie found for title {0:?}")]
    NotFound(String),

    #[error("TMDB_API_TOKEN is not set")]
    MissingToken,
}

/// Record shape inside the dataset file; the movie id is the map key.
#[derive(Debug, Deserialize)]
struct DatasetRecord {
    title: String,
    #[serde(default)]
    overview: Option<String>,
    #[serde(default)]
    genres: Vec<String>,
    #[serde(default)]
    cast: Vec<String>,
    #[serde(default)]
    director: Option<String>,
    #[serde(default, alias = "poster")]
    poster_path: Option<String>,
    #[serde(default)]
    release_date: Option<String>,
    #[serde(default)]
    rating: Option<f64>,
}

/// Load the full catalog from a dataset file.
///
/// Items are ordered by ascending numeric id so that a rebuild from the same
/// file always produces the same ordinal mapping, regardless of JSON key
/// order.
pub fn load_dataset(path: &Path) -> Result<Vec<Movie>, MetadataError> {
    let raw = std::fs::read_to_string(path)?;
    let records: HashMap<String, DatasetRecord> = serde_json::from_str(&raw)?;

    let mut movies = Vec::with_capacity(records.len());
    for (key, record) in records {
        let id: u64 = key.parse().map_err(|_| MetadataError::InvalidId(key))?;
        movies.push(Movie {
            id,
            title: record.title,
            overview: record.overview,
            genres: record.genres,
            cast: record.cast.into_iter().take(MAX_CAST).collect(),
            director: record.director,
            poster_path: record.poster_path,
            release_date: record.release_date,
            rating: record.rating,
        });
    }

    if movies.is_empty() {
        return Err(MetadataError::EmptyCatalog);
    }

    movies.sort_by_key(|m| m.id);
    log::info!("loaded {} movies from {}", movies.len(), path.display());

    Ok(movies)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_dataset(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_dataset_orders_by_id() {
        let file = write_dataset(
            r#"{
                "603": {"title": "The Matrix", "genres": ["Action"], "cast": [], "director": "Lana Wachowski"},
                "27": {"title": "9 Songs", "genres": ["Drama"], "cast": []},
                "155": {"title": "The Dark Knight", "genres": ["Crime"], "cast": []}
            }"#,
        );

        let movies = load_dataset(file.path()).unwrap();
        let ids: Vec<u64> = movies.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![27, 155, 603]);
        assert_eq!(movies[2].title, "The Matrix");
    }

    #[test]
    fn test_load_dataset_poster_alias() {
        let file = write_dataset(
            r#"{"1": {"title": "A", "poster": "/a.jpg", "rating": 7.5}}"#,
        );

        let movies = load_dataset(file.path()).unwrap();
        assert_eq!(movies[0].poster_path.as_deref(), Some("/a.jpg"));
        assert_eq!(movies[0].rating, Some(7.5));
    }

    #[test]
    fn test_load_dataset_caps_cast() {
        let file = write_dataset(
            r#"{"1": {"title": "A", "cast": ["a", "b", "c", "d", "e", "f", "g"]}}"#,
        );

        let movies = load_dataset(file.path()).unwrap();
        assert_eq!(movies[0].cast.len(), MAX_CAST);
        assert_eq!(movies[0].cast[4], "e");
    }

    #[test]
    fn test_load_dataset_empty_is_error() {
        let file = write_dataset("{}");
        let result = load_dataset(file.path());
        assert!(matches!(result, Err(MetadataError::EmptyCatalog)));
    }

    #[test]
    fn test_load_dataset_bad_id_is_error() {
        let file = write_dataset(r#"{"not-a-number": {"title": "A"}}"#);
        let result = load_dataset(file.path());
        assert!(matches!(result, Err(MetadataError::InvalidId(_))));
    }

    #[test]
    fn test_features_truncates_cast() {
        let movie = Movie {
            id: 1,
            title: "A".into(),
            overview: Some("plot".into()),
            genres: vec!["Action".into()],
            cast: vec![
                "a".into(),
                "b".into(),
                "c".into(),
                "d".into(),
                "e".into(),
                "f".into(),
            ],
            director: None,
            poster_path: None,
            release_date: None,
            rating: None,
        };

        let features = movie.features();
        assert_eq!(features.cast.len(), MAX_CAST);
        assert_eq!(features.overview.as_deref(), Some("plot"));
    }
}
