//! CSV extraction adapter: reads the five source files from a base
//! directory into typed entity batches. Flat columns go through serde,
//! date columns are ISO-8601, and the nested movie columns (`genres`,
//! `companies`, `keywords`, `cast_jobs`, `crew_jobs`, `collection`) are
//! JSON-encoded in their cells. The job, keyword, and collection batches
//! are derived here from the movie rows, order-preserving and deduped,
//! so the engine receives one batch per entity kind.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use indexmap::{IndexMap, IndexSet};
use serde::Deserialize;
use tracing::{info, instrument};

use crate::model::{
    CastCredit, Collection, Company, Country, CrewCredit, Gender, Genre, ImportBatches, Job,
    Keyword, Movie, Person,
};

pub const GENRES_CSV: &str = "genres.csv";
pub const COUNTRIES_CSV: &str = "countries.csv";
pub const COMPANIES_CSV: &str = "companies.csv";
pub const PEOPLE_CSV: &str = "people.csv";
pub const MOVIES_CSV: &str = "movies.csv";

#[derive(Debug, Deserialize)]
struct GenreRow {
    tmdb_id: i64,
    name: String,
}

#[derive(Debug, Deserialize)]
struct CountryRow {
    tmdb_id: i64,
    name: String,
    iso_3166_1: String,
}

#[derive(Debug, Deserialize)]
struct CompanyRow {
    tmdb_id: i64,
    name: String,
    country_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct PersonRow {
    tmdb_id: i64,
    name: String,
    birth_date: Option<String>,
    profile_image_url: Option<String>,
    popularity: Option<f32>,
    gender: Option<i64>,
    birth_country_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct MovieRow {
    tmdb_id: i64,
    title: String,
    adult: Option<bool>,
    overview: Option<String>,
    tagline: Option<String>,
    budget: Option<i64>,
    revenue: Option<i64>,
    runtime: Option<i16>,
    release_date: Option<String>,
    homepage: Option<String>,
    poster_url: Option<String>,
    vote_count: Option<i32>,
    avg_vote: Option<f32>,
    popularity: Option<f32>,
    collection: Option<String>,
    keywords: Option<String>,
    companies: Option<String>,
    genres: Option<String>,
    crew_jobs: Option<String>,
    cast_jobs: Option<String>,
}

/// The `collection` cell: a JSON object carrying the collection's own
/// external id alongside its name.
#[derive(Debug, Deserialize)]
struct CollectionRef {
    id: i64,
    name: String,
}

fn parse_date(raw: Option<&str>, file: &str, row: usize, column: &str) -> Result<Option<NaiveDate>> {
    match raw {
        None => Ok(None),
        Some(s) if s.trim().is_empty() => Ok(None),
        Some(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map(Some)
            .with_context(|| format!("{file} row {row}: bad date in column {column}: {s:?}")),
    }
}

fn parse_json_cell<T: serde::de::DeserializeOwned>(
    raw: Option<&str>,
    file: &str,
    row: usize,
    column: &str,
) -> Result<Option<T>> {
    match raw {
        None => Ok(None),
        Some(s) if s.trim().is_empty() => Ok(None),
        Some(s) => serde_json::from_str(s)
            .map(Some)
            .with_context(|| format!("{file} row {row}: bad JSON in column {column}")),
    }
}

fn open_reader(base: &Path, file: &str) -> Result<csv::Reader<std::fs::File>> {
    let path = base.join(file);
    csv::Reader::from_path(&path).with_context(|| format!("opening {}", path.display()))
}

pub fn read_genres(base: &Path) -> Result<Vec<Genre>> {
    let mut reader = open_reader(base, GENRES_CSV)?;
    let mut out = Vec::new();
    for (row, record) in reader.deserialize::<GenreRow>().enumerate() {
        let r = record.with_context(|| format!("{GENRES_CSV} row {row}"))?;
        out.push(Genre {
            tmdb_id: r.tmdb_id,
            name: r.name,
        });
    }
    Ok(out)
}

pub fn read_countries(base: &Path) -> Result<Vec<Country>> {
    let mut reader = open_reader(base, COUNTRIES_CSV)?;
    let mut out = Vec::new();
    for (row, record) in reader.deserialize::<CountryRow>().enumerate() {
        let r = record.with_context(|| format!("{COUNTRIES_CSV} row {row}"))?;
        out.push(Country {
            tmdb_id: r.tmdb_id,
            name: r.name,
            iso_3166_1: r.iso_3166_1,
        });
    }
    Ok(out)
}

pub fn read_companies(base: &Path) -> Result<Vec<Company>> {
    let mut reader = open_reader(base, COMPANIES_CSV)?;
    let mut out = Vec::new();
    for (row, record) in reader.deserialize::<CompanyRow>().enumerate() {
        let r = record.with_context(|| format!("{COMPANIES_CSV} row {row}"))?;
        out.push(Company {
            tmdb_id: r.tmdb_id,
            name: r.name,
            country_tmdb_id: r.country_id,
        });
    }
    Ok(out)
}

pub fn read_people(base: &Path) -> Result<Vec<Person>> {
    let mut reader = open_reader(base, PEOPLE_CSV)?;
    let mut out = Vec::new();
    for (row, record) in reader.deserialize::<PersonRow>().enumerate() {
        let r = record.with_context(|| format!("{PEOPLE_CSV} row {row}"))?;
        let birth_date = parse_date(r.birth_date.as_deref(), PEOPLE_CSV, row, "birth_date")?;
        out.push(Person {
            tmdb_id: r.tmdb_id,
            name: r.name,
            birth_date,
            profile_image_url: r.profile_image_url,
            popularity: r.popularity,
            gender: r.gender.and_then(Gender::from_tmdb),
            birth_country_tmdb_id: r.birth_country_id,
        });
    }
    Ok(out)
}

pub fn read_movies(base: &Path) -> Result<Vec<Movie>> {
    Ok(read_movies_and_collections(base)?.0)
}

/// Movies plus the collection batch their `collection` cells reference
/// (first occurrence of an id wins); one pass over the file.
pub fn read_movies_and_collections(base: &Path) -> Result<(Vec<Movie>, Vec<Collection>)> {
    let mut reader = open_reader(base, MOVIES_CSV)?;
    let mut out = Vec::new();
    let mut collections: IndexMap<i64, String> = IndexMap::new();
    for (row, record) in reader.deserialize::<MovieRow>().enumerate() {
        let r = record.with_context(|| format!("{MOVIES_CSV} row {row}"))?;
        let release_date = parse_date(r.release_date.as_deref(), MOVIES_CSV, row, "release_date")?;
        let collection: Option<CollectionRef> =
            parse_json_cell(r.collection.as_deref(), MOVIES_CSV, row, "collection")?;
        let keywords: Vec<String> =
            parse_json_cell(r.keywords.as_deref(), MOVIES_CSV, row, "keywords")?.unwrap_or_default();
        let company_tmdb_ids: Vec<i64> =
            parse_json_cell(r.companies.as_deref(), MOVIES_CSV, row, "companies")?
                .unwrap_or_default();
        let genre_tmdb_ids: Vec<i64> =
            parse_json_cell(r.genres.as_deref(), MOVIES_CSV, row, "genres")?.unwrap_or_default();
        let crew: Vec<CrewCredit> =
            parse_json_cell(r.crew_jobs.as_deref(), MOVIES_CSV, row, "crew_jobs")?
                .unwrap_or_default();
        let cast: Vec<CastCredit> =
            parse_json_cell(r.cast_jobs.as_deref(), MOVIES_CSV, row, "cast_jobs")?
                .unwrap_or_default();

        if let Some(c) = &collection {
            collections.entry(c.id).or_insert_with(|| c.name.clone());
        }

        out.push(Movie {
            tmdb_id: r.tmdb_id,
            title: r.title,
            adult: r.adult,
            overview: r.overview,
            tagline: r.tagline,
            budget: r.budget,
            revenue: r.revenue,
            runtime: r.runtime,
            release_date,
            homepage: r.homepage,
            poster_url: r.poster_url,
            vote_count: r.vote_count,
            avg_vote: r.avg_vote,
            popularity: r.popularity,
            collection_tmdb_id: collection.as_ref().map(|c| c.id),
            genre_tmdb_ids,
            company_tmdb_ids,
            keywords,
            cast,
            crew,
        });
    }
    let collections = collections
        .into_iter()
        .map(|(tmdb_id, name)| Collection { tmdb_id, name })
        .collect();
    Ok((out, collections))
}

fn derive_keywords(movies: &[Movie]) -> Vec<Keyword> {
    let mut names: IndexSet<&str> = IndexSet::new();
    for movie in movies {
        for name in &movie.keywords {
            names.insert(name.as_str());
        }
    }
    names
        .into_iter()
        .map(|name| Keyword { name: name.to_string() })
        .collect()
}

fn derive_jobs(movies: &[Movie]) -> Vec<Job> {
    let mut names: IndexSet<&str> = IndexSet::new();
    for movie in movies {
        for credit in &movie.cast {
            names.insert(credit.job.as_str());
        }
        for credit in &movie.crew {
            names.insert(credit.job.as_str());
        }
    }
    names
        .into_iter()
        .map(|name| Job { name: name.to_string() })
        .collect()
}

/// Reads all five source files and assembles the per-entity batches for
/// one import run.
#[instrument(skip(base), fields(base = %base.as_ref().display()))]
pub fn read_import_batches(base: impl AsRef<Path>) -> Result<ImportBatches> {
    let base = base.as_ref();
    let genres = read_genres(base)?;
    let countries = read_countries(base)?;
    let companies = read_companies(base)?;
    let people = read_people(base)?;
    let (movies, collections) = read_movies_and_collections(base)?;
    let keywords = derive_keywords(&movies);
    let jobs = derive_jobs(&movies);

    info!(
        genres = genres.len(),
        countries = countries.len(),
        companies = companies.len(),
        people = people.len(),
        movies = movies.len(),
        collections = collections.len(),
        keywords = keywords.len(),
        jobs = jobs.len(),
        "extracted csv batches"
    );

    Ok(ImportBatches {
        genres,
        countries,
        keywords,
        jobs,
        collections,
        companies,
        people,
        movies,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_fixture(dir: &TempDir) {
        fs::write(
            dir.path().join(GENRES_CSV),
            "tmdb_id,name\n18,Drama\n80,Crime\n",
        )
        .unwrap();
        fs::write(
            dir.path().join(COUNTRIES_CSV),
            "tmdb_id,name,iso_3166_1\n840,United States,US\n",
        )
        .unwrap();
        fs::write(
            dir.path().join(COMPANIES_CSV),
            "tmdb_id,name,country_id\n7,Studio A,840\n8,Studio B,\n",
        )
        .unwrap();
        fs::write(
            dir.path().join(PEOPLE_CSV),
            "tmdb_id,name,birth_date,profile_image_url,popularity,gender,birth_country_id\n\
             55,Al Pacino,1940-04-25,,9.5,2,840\n\
             56,Unknown Person,,,,,\n",
        )
        .unwrap();
        // One quoted JSON cell per nested column; the second movie leaves
        // everything optional empty.
        fs::write(
            dir.path().join(MOVIES_CSV),
            concat!(
                "tmdb_id,title,adult,overview,tagline,budget,revenue,runtime,release_date,",
                "homepage,poster_url,vote_count,avg_vote,popularity,collection,keywords,",
                "companies,genres,crew_jobs,cast_jobs\n",
                "949,Heat,false,A heist film,,60000000,187000000,170,1995-12-15,,,5000,8.2,40.5,",
                "\"{\"\"id\"\": 90, \"\"name\"\": \"\"Heat Collection\"\"}\",",
                "\"[\"\"heist\"\", \"\"los angeles\"\"]\",",
                "\"[7, 8]\",",
                "\"[18, 80]\",",
                "\"[{\"\"id\"\": 55, \"\"job\"\": \"\"Director\"\"}]\",",
                "\"[{\"\"id\"\": 55, \"\"job\"\": \"\"Actor\"\", \"\"character_name\"\": \"\"Neil\"\"}]\"\n",
                "950,Bare Movie,,,,,,,,,,,,,,,,,,\n",
            ),
        )
        .unwrap();
    }

    #[test]
    fn reads_all_batches() {
        let dir = TempDir::new().unwrap();
        write_fixture(&dir);
        let batches = read_import_batches(dir.path()).unwrap();

        assert_eq!(batches.genres.len(), 2);
        assert_eq!(batches.countries[0].iso_3166_1, "US");
        assert_eq!(batches.companies[1].country_tmdb_id, None);
        assert_eq!(batches.people.len(), 2);
        assert_eq!(batches.movies.len(), 2);

        let heat = &batches.movies[0];
        assert_eq!(heat.tmdb_id, 949);
        assert_eq!(heat.collection_tmdb_id, Some(90));
        assert_eq!(heat.genre_tmdb_ids, vec![18, 80]);
        assert_eq!(heat.company_tmdb_ids, vec![7, 8]);
        assert_eq!(heat.keywords, vec!["heist", "los angeles"]);
        assert_eq!(heat.cast[0].character_name, "Neil");
        assert_eq!(heat.crew[0].job, "Director");
        assert_eq!(
            heat.release_date,
            NaiveDate::from_ymd_opt(1995, 12, 15)
        );

        let bare = &batches.movies[1];
        assert_eq!(bare.collection_tmdb_id, None);
        assert!(bare.keywords.is_empty() && bare.cast.is_empty());
    }

    #[test]
    fn derives_deduped_batches_in_first_seen_order() {
        let dir = TempDir::new().unwrap();
        write_fixture(&dir);
        let batches = read_import_batches(dir.path()).unwrap();

        let job_names: Vec<&str> = batches.jobs.iter().map(|j| j.name.as_str()).collect();
        assert_eq!(job_names, vec!["Actor", "Director"]);

        let keyword_names: Vec<&str> =
            batches.keywords.iter().map(|k| k.name.as_str()).collect();
        assert_eq!(keyword_names, vec!["heist", "los angeles"]);

        assert_eq!(batches.collections.len(), 1);
        assert_eq!(batches.collections[0].tmdb_id, 90);
        assert_eq!(batches.collections[0].name, "Heat Collection");
    }

    #[test]
    fn person_gender_decodes_tmdb_codes() {
        let dir = TempDir::new().unwrap();
        write_fixture(&dir);
        let people = read_people(dir.path()).unwrap();
        assert_eq!(people[0].gender, Some(Gender::Male));
        assert_eq!(people[1].gender, None);
    }

    #[test]
    fn bad_json_cell_names_file_row_and_column() {
        let dir = TempDir::new().unwrap();
        write_fixture(&dir);
        fs::write(
            dir.path().join(MOVIES_CSV),
            concat!(
                "tmdb_id,title,adult,overview,tagline,budget,revenue,runtime,release_date,",
                "homepage,poster_url,vote_count,avg_vote,popularity,collection,keywords,",
                "companies,genres,crew_jobs,cast_jobs\n",
                "949,Heat,,,,,,,,,,,,,,\"not json\",,,,\n",
            ),
        )
        .unwrap();
        let err = read_movies(dir.path()).unwrap_err();
        let msg = format!("{err:#}");
        assert!(msg.contains("movies.csv"), "{msg}");
        assert!(msg.contains("row 0"), "{msg}");
        assert!(msg.contains("keywords"), "{msg}");
    }

    #[test]
    fn bad_date_is_an_error() {
        let dir = TempDir::new().unwrap();
        write_fixture(&dir);
        fs::write(
            dir.path().join(PEOPLE_CSV),
            "tmdb_id,name,birth_date,profile_image_url,popularity,gender,birth_country_id\n\
             55,Al Pacino,not-a-date,,,,\n",
        )
        .unwrap();
        let err = read_people(dir.path()).unwrap_err();
        assert!(format!("{err:#}").contains("birth_date"));
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let err = read_import_batches(dir.path()).unwrap_err();
        assert!(format!("{err:#}").contains(GENRES_CSV));
    }
}
