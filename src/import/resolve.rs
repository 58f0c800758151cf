//! Foreign-key resolution: rewrites the external-id references inside a
//! batch into surrogate keys using the run's [`IdMap`], ahead of the
//! upsert. A null source reference stays null; a non-null reference with
//! no mapping fails the run (dangling references are never written).

use crate::model::{Company, ExternalId, Movie, Person};

use super::error::ImportError;
use super::id_map::IdMap;
use super::order::EntityKind;

#[derive(Debug)]
pub struct ResolvedCompany<'a> {
    pub company: &'a Company,
    pub country_id: Option<i64>,
}

#[derive(Debug)]
pub struct ResolvedPerson<'a> {
    pub person: &'a Person,
    pub birth_country_id: Option<i64>,
}

#[derive(Debug)]
pub struct ResolvedMovie<'a> {
    pub movie: &'a Movie,
    pub collection_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovieGenreRow {
    pub movie_id: i64,
    pub genre_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovieKeywordRow {
    pub movie_id: i64,
    pub keyword_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovieCompanyRow {
    pub movie_id: i64,
    pub company_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CastCreditRow {
    pub movie_id: i64,
    pub person_id: i64,
    pub job_id: i64,
    pub character_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrewCreditRow {
    pub movie_id: i64,
    pub person_id: i64,
    pub job_id: i64,
}

fn lookup(
    ids: &IdMap,
    parent: EntityKind,
    external_id: ExternalId,
    entity: EntityKind,
    row: usize,
    field: &'static str,
) -> Result<i64, ImportError> {
    ids.resolve(parent, &external_id)
        .ok_or(ImportError::Referential {
            entity,
            row,
            field,
            parent,
            external_id,
        })
}

/// Resolves an optional reference; `None` in the source stays `None`.
fn lookup_opt(
    ids: &IdMap,
    parent: EntityKind,
    external_id: Option<i64>,
    entity: EntityKind,
    row: usize,
    field: &'static str,
) -> Result<Option<i64>, ImportError> {
    external_id
        .map(|ext| lookup(ids, parent, ExternalId::Int(ext), entity, row, field))
        .transpose()
}

pub fn resolve_companies<'a>(
    ids: &IdMap,
    companies: &'a [Company],
) -> Result<Vec<ResolvedCompany<'a>>, ImportError> {
    companies
        .iter()
        .enumerate()
        .map(|(row, company)| {
            let country_id = lookup_opt(
                ids,
                EntityKind::Country,
                company.country_tmdb_id,
                EntityKind::Company,
                row,
                "country_tmdb_id",
            )?;
            Ok(ResolvedCompany { company, country_id })
        })
        .collect()
}

pub fn resolve_people<'a>(
    ids: &IdMap,
    people: &'a [Person],
) -> Result<Vec<ResolvedPerson<'a>>, ImportError> {
    people
        .iter()
        .enumerate()
        .map(|(row, person)| {
            let birth_country_id = lookup_opt(
                ids,
                EntityKind::Country,
                person.birth_country_tmdb_id,
                EntityKind::Person,
                row,
                "birth_country_tmdb_id",
            )?;
            Ok(ResolvedPerson {
                person,
                birth_country_id,
            })
        })
        .collect()
}

pub fn resolve_movies<'a>(
    ids: &IdMap,
    movies: &'a [Movie],
) -> Result<Vec<ResolvedMovie<'a>>, ImportError> {
    movies
        .iter()
        .enumerate()
        .map(|(row, movie)| {
            let collection_id = lookup_opt(
                ids,
                EntityKind::Collection,
                movie.collection_tmdb_id,
                EntityKind::Movie,
                row,
                "collection_tmdb_id",
            )?;
            Ok(ResolvedMovie {
                movie,
                collection_id,
            })
        })
        .collect()
}

/// All link-table rows for one run, derived from the movie batch after
/// movies (and their parents) are mapped.
#[derive(Debug, Default)]
pub struct MovieLinks {
    pub genres: Vec<MovieGenreRow>,
    pub keywords: Vec<MovieKeywordRow>,
    pub companies: Vec<MovieCompanyRow>,
    pub cast: Vec<CastCreditRow>,
    pub crew: Vec<CrewCreditRow>,
    /// Surrogate keys of every movie in the batch; the full-replace
    /// delete covers these even when a movie's new link set is empty.
    pub movie_ids: Vec<i64>,
}

pub fn build_movie_links(ids: &IdMap, movies: &[Movie]) -> Result<MovieLinks, ImportError> {
    let mut links = MovieLinks::default();
    for (row, movie) in movies.iter().enumerate() {
        // The movie itself was upserted in the step before this one; a
        // missing mapping here is an ordering bug, reported the same way.
        let movie_id = lookup(
            ids,
            EntityKind::Movie,
            ExternalId::Int(movie.tmdb_id),
            EntityKind::MovieGenre,
            row,
            "tmdb_id",
        )?;
        links.movie_ids.push(movie_id);

        for ext in &movie.genre_tmdb_ids {
            let genre_id = lookup(
                ids,
                EntityKind::Genre,
                ExternalId::Int(*ext),
                EntityKind::MovieGenre,
                row,
                "genre_tmdb_ids",
            )?;
            links.genres.push(MovieGenreRow { movie_id, genre_id });
        }
        for name in &movie.keywords {
            let keyword_id = lookup(
                ids,
                EntityKind::Keyword,
                ExternalId::Text(name.clone()),
                EntityKind::MovieKeyword,
                row,
                "keywords",
            )?;
            links.keywords.push(MovieKeywordRow { movie_id, keyword_id });
        }
        for ext in &movie.company_tmdb_ids {
            let company_id = lookup(
                ids,
                EntityKind::Company,
                ExternalId::Int(*ext),
                EntityKind::MovieCompany,
                row,
                "company_tmdb_ids",
            )?;
            links.companies.push(MovieCompanyRow { movie_id, company_id });
        }
        for credit in &movie.cast {
            let person_id = lookup(
                ids,
                EntityKind::Person,
                ExternalId::Int(credit.person_tmdb_id),
                EntityKind::CastCredit,
                row,
                "cast_jobs",
            )?;
            let job_id = lookup(
                ids,
                EntityKind::Job,
                ExternalId::Text(credit.job.clone()),
                EntityKind::CastCredit,
                row,
                "cast_jobs",
            )?;
            links.cast.push(CastCreditRow {
                movie_id,
                person_id,
                job_id,
                character_name: credit.character_name.clone(),
            });
        }
        for credit in &movie.crew {
            let person_id = lookup(
                ids,
                EntityKind::Person,
                ExternalId::Int(credit.person_tmdb_id),
                EntityKind::CrewCredit,
                row,
                "crew_jobs",
            )?;
            let job_id = lookup(
                ids,
                EntityKind::Job,
                ExternalId::Text(credit.job.clone()),
                EntityKind::CrewCredit,
                row,
                "crew_jobs",
            )?;
            links.crew.push(CrewCreditRow {
                movie_id,
                person_id,
                job_id,
            });
        }
    }
    Ok(links)
}
