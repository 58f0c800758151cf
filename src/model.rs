//! Entity records as handed to the import engine: validated, typed, and
//! still carrying *external* (source) identifiers. Foreign keys are
//! rewritten to surrogate keys later, by the resolver, never here.

use std::fmt;

use chrono::NaiveDate;
use serde::Deserialize;

/// Source-side identifier of a record: stable across import runs and
/// unique within one entity kind. Integer for tmdb-keyed entities,
/// text for entities the source keys by name (jobs, keywords).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ExternalId {
    Int(i64),
    Text(String),
}

impl fmt::Display for ExternalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExternalId::Int(v) => write!(f, "{v}"),
            ExternalId::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for ExternalId {
    fn from(v: i64) -> Self {
        ExternalId::Int(v)
    }
}

impl From<&str> for ExternalId {
    fn from(s: &str) -> Self {
        ExternalId::Text(s.to_string())
    }
}

/// TMDB numeric gender convention: 1 = female, 2 = male, 3 = non-binary,
/// 0 / anything else = unspecified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gender {
    Female,
    Male,
    NonBinary,
}

impl Gender {
    pub fn from_tmdb(code: i64) -> Option<Self> {
        match code {
            1 => Some(Gender::Female),
            2 => Some(Gender::Male),
            3 => Some(Gender::NonBinary),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Gender::Female => "female",
            Gender::Male => "male",
            Gender::NonBinary => "non-binary",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Genre {
    pub tmdb_id: i64,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct Country {
    pub tmdb_id: i64,
    pub name: String,
    pub iso_3166_1: String,
}

#[derive(Debug, Clone)]
pub struct Company {
    pub tmdb_id: i64,
    pub name: String,
    /// External country id; nullable in the source.
    pub country_tmdb_id: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct Job {
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct Keyword {
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct Collection {
    pub tmdb_id: i64,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct Person {
    pub tmdb_id: i64,
    pub name: String,
    pub birth_date: Option<NaiveDate>,
    pub profile_image_url: Option<String>,
    pub popularity: Option<f32>,
    pub gender: Option<Gender>,
    pub birth_country_tmdb_id: Option<i64>,
}

/// One cast entry inside a movie's `cast_jobs` JSON column. `id` is the
/// person's tmdb id; the job arrives as a name and is resolved against
/// the job batch.
#[derive(Debug, Clone, Deserialize)]
pub struct CastCredit {
    #[serde(rename = "id")]
    pub person_tmdb_id: i64,
    pub job: String,
    pub character_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CrewCredit {
    #[serde(rename = "id")]
    pub person_tmdb_id: i64,
    pub job: String,
}

#[derive(Debug, Clone)]
pub struct Movie {
    pub tmdb_id: i64,
    pub title: String,
    pub adult: Option<bool>,
    pub overview: Option<String>,
    pub tagline: Option<String>,
    pub budget: Option<i64>,
    pub revenue: Option<i64>,
    pub runtime: Option<i16>,
    pub release_date: Option<NaiveDate>,
    pub homepage: Option<String>,
    pub poster_url: Option<String>,
    pub vote_count: Option<i32>,
    pub avg_vote: Option<f32>,
    pub popularity: Option<f32>,
    pub collection_tmdb_id: Option<i64>,
    // Nested link data; becomes link-table rows once the parents are mapped.
    pub genre_tmdb_ids: Vec<i64>,
    pub company_tmdb_ids: Vec<i64>,
    pub keywords: Vec<String>,
    pub cast: Vec<CastCredit>,
    pub crew: Vec<CrewCredit>,
}

/// Everything one import run writes, one batch per entity kind. Batch
/// order is insertion order and is preserved through the executor.
#[derive(Debug, Clone, Default)]
pub struct ImportBatches {
    pub genres: Vec<Genre>,
    pub countries: Vec<Country>,
    pub keywords: Vec<Keyword>,
    pub jobs: Vec<Job>,
    pub collections: Vec<Collection>,
    pub companies: Vec<Company>,
    pub people: Vec<Person>,
    pub movies: Vec<Movie>,
}

impl Default for Movie {
    fn default() -> Self {
        Movie {
            tmdb_id: 0,
            title: String::new(),
            adult: None,
            overview: None,
            tagline: None,
            budget: None,
            revenue: None,
            runtime: None,
            release_date: None,
            homepage: None,
            poster_url: None,
            vote_count: None,
            avg_vote: None,
            popularity: None,
            collection_tmdb_id: None,
            genre_tmdb_ids: Vec::new(),
            company_tmdb_ids: Vec::new(),
            keywords: Vec::new(),
            cast: Vec::new(),
            crew: Vec::new(),
        }
    }
}
