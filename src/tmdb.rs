//! TMDB lookup client — the external metadata collaborator.
//!
//! Resolves a title to the raw item record (overview, genres, cast,
//! director) that the query pipeline embeds. Failures surface as
//! `MetadataError`; nothing here is retried by the core.

use std::time::Duration;

use serde::Deserialize;

use crate::catalog::{MetadataError, Movie, MAX_CAST};

const API_BASE: &str = "https://api.themoviedb.org/3";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct TmdbClient {
    client: reqwest::blocking::Client,
    token: String,
    api_base: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    results: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct MovieDetails {
    id: u64,
    title: String,
    #[serde(default)]
    overview: Option<String>,
    #[serde(default)]
    poster_path: Option<String>,
    #[serde(default)]
    release_date: Option<String>,
    #[serde(default)]
    popularity: Option<f64>,
    #[serde(default)]
    genres: Vec<Genre>,
    #[serde(default)]
    credits: Credits,
}

#[derive(Debug, Deserialize)]
struct Genre {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct Credits {
    #[serde(default)]
    cast: Vec<CastMember>,
    #[serde(default)]
    crew: Vec<CrewMember>,
}

#[derive(Debug, Deserialize)]
struct CastMember {
    name: String,
}

#[derive(Debug, Deserialize)]
struct CrewMember {
    name: String,
    #[serde(default)]
    job: Option<String>,
}

impl TmdbClient {
    pub fn new(token: String) -> Result<Self, MetadataError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            token,
            api_base: API_BASE.to_string(),
        })
    }

    /// Read the bearer token from `TMDB_API_TOKEN`.
    pub fn from_env() -> Result<Self, MetadataError> {
        let token = std::env::var("TMDB_API_TOKEN").map_err(|_| MetadataError::MissingToken)?;
        Self::new(token)
    }

    /// Point the client at a different endpoint (tests, proxies).
    pub fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }

    /// Resolve a title to its full item record: search, take the best
    /// match, fetch details with credits.
    pub fn lookup(&self, title: &str) -> Result<Movie, MetadataError> {
        let id = self.search(title)?;
        self.details(id)
    }

    fn search(&self, title: &str) -> Result<u64, MetadataError> {
        let mut url = url::Url::parse(&format!("{}/search/movie", self.api_base))
            .map_err(|_| MetadataError::NotFound(title.to_string()))?;
        url.query_pairs_mut().append_pair("query", title);

        log::debug!("searching TMDB for {:?}", title);
        let response = self.client.get(url).bearer_auth(&self.token).send()?;
        if !response.status().is_success() {
            return Err(MetadataError::Api(response.status()));
        }

        let parsed: SearchResponse = response.json()?;
        parsed
            .results
            .first()
            .map(|hit| hit.id)
            .ok_or_else(|| MetadataError::NotFound(title.to_string()))
    }

    fn details(&self, id: u64) -> Result<Movie, MetadataError> {
        let url = format!("{}/movie/{}?append_to_response=credits", self.api_base, id);

        let response = self.client.get(&url).bearer_auth(&self.token).send()?;
        if !response.status().is_success() {
            return Err(MetadataError::Api(response.status()));
        }

        let details: MovieDetails = response.json()?;
        Ok(details.into())
    }
}

impl From<MovieDetails> for Movie {
    fn from(details: MovieDetails) -> Self {
        let director = details
            .credits
            .crew
            .iter()
            .find(|member| member.job.as_deref() == Some("Director"))
            .map(|member| member.name.clone());

        Movie {
            id: details.id,
            title: details.title,
            overview: details.overview,
            genres: details.genres.into_iter().map(|g| g.name).collect(),
            cast: details
                .credits
                .cast
                .into_iter()
                .take(MAX_CAST)
                .map(|member| member.name)
                .collect(),
            director,
            poster_path: details.poster_path,
            release_date: details.release_date,
            rating: details.popularity,
        }
    }
}
