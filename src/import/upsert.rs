//! Insert-or-update execution against Postgres. Every upsert is
//! `INSERT ... ON CONFLICT ... DO UPDATE ... RETURNING id, (xmax = 0)`,
//! run row-by-row inside the caller's transaction so the returned keys
//! line up positionally with the input batch; `xmax = 0` tells a fresh
//! insert apart from an update of an existing row. Link tables are the
//! exception: full replace, deleted per movie then bulk-inserted with
//! `QueryBuilder::push_values`.

use sqlx::{PgConnection, Postgres, QueryBuilder};
use tracing::instrument;

use crate::model::{Collection, Country, Genre, Job, Keyword};

use super::error::ImportError;
use super::order::EntityKind;
use super::resolve::{
    CastCreditRow, CrewCreditRow, MovieCompanyRow, MovieGenreRow, MovieKeywordRow,
    ResolvedCompany, ResolvedMovie, ResolvedPerson,
};

/// Per-row upsert outcome, tagged so callers (and tests) can tell an
/// insert from an update; the mapper only needs the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOutcome {
    Inserted(i64),
    Updated(i64),
}

impl RowOutcome {
    pub fn id(self) -> i64 {
        match self {
            RowOutcome::Inserted(id) | RowOutcome::Updated(id) => id,
        }
    }

    fn from_row((id, inserted): (i64, bool)) -> Self {
        if inserted {
            RowOutcome::Inserted(id)
        } else {
            RowOutcome::Updated(id)
        }
    }
}

/// Store-level rejections (unique/non-null/type violations) carry the
/// failing row; anything else is a transport-level failure.
fn row_error(entity: EntityKind, row: usize, err: sqlx::Error) -> ImportError {
    match err {
        sqlx::Error::Database(_) => ImportError::Constraint {
            entity,
            row,
            source: err,
        },
        other => ImportError::Store(other),
    }
}

#[instrument(skip(conn, genres), fields(rows = genres.len()))]
pub async fn upsert_genres(
    conn: &mut PgConnection,
    genres: &[Genre],
) -> Result<Vec<RowOutcome>, ImportError> {
    // DO UPDATE instead of DO NOTHING so RETURNING yields the existing
    // key on conflict; the only attribute is the natural key itself.
    let mut outcomes = Vec::with_capacity(genres.len());
    for (row, genre) in genres.iter().enumerate() {
        let out: (i64, bool) = sqlx::query_as(
            "INSERT INTO genre (name) VALUES ($1)
             ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
             RETURNING id, (xmax = 0)",
        )
        .bind(&genre.name)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| row_error(EntityKind::Genre, row, e))?;
        outcomes.push(RowOutcome::from_row(out));
    }
    Ok(outcomes)
}

#[instrument(skip(conn, countries), fields(rows = countries.len()))]
pub async fn upsert_countries(
    conn: &mut PgConnection,
    countries: &[Country],
) -> Result<Vec<RowOutcome>, ImportError> {
    let mut outcomes = Vec::with_capacity(countries.len());
    for (row, country) in countries.iter().enumerate() {
        let out: (i64, bool) = sqlx::query_as(
            "INSERT INTO country (name, iso_3166_1) VALUES ($1, $2)
             ON CONFLICT (iso_3166_1) DO UPDATE SET name = EXCLUDED.name
             RETURNING id, (xmax = 0)",
        )
        .bind(&country.name)
        .bind(&country.iso_3166_1)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| row_error(EntityKind::Country, row, e))?;
        outcomes.push(RowOutcome::from_row(out));
    }
    Ok(outcomes)
}

#[instrument(skip(conn, keywords), fields(rows = keywords.len()))]
pub async fn upsert_keywords(
    conn: &mut PgConnection,
    keywords: &[Keyword],
) -> Result<Vec<RowOutcome>, ImportError> {
    let mut outcomes = Vec::with_capacity(keywords.len());
    for (row, keyword) in keywords.iter().enumerate() {
        let out: (i64, bool) = sqlx::query_as(
            "INSERT INTO keyword (name) VALUES ($1)
             ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
             RETURNING id, (xmax = 0)",
        )
        .bind(&keyword.name)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| row_error(EntityKind::Keyword, row, e))?;
        outcomes.push(RowOutcome::from_row(out));
    }
    Ok(outcomes)
}

#[instrument(skip(conn, jobs), fields(rows = jobs.len()))]
pub async fn upsert_jobs(
    conn: &mut PgConnection,
    jobs: &[Job],
) -> Result<Vec<RowOutcome>, ImportError> {
    let mut outcomes = Vec::with_capacity(jobs.len());
    for (row, job) in jobs.iter().enumerate() {
        let out: (i64, bool) = sqlx::query_as(
            "INSERT INTO job (name) VALUES ($1)
             ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
             RETURNING id, (xmax = 0)",
        )
        .bind(&job.name)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| row_error(EntityKind::Job, row, e))?;
        outcomes.push(RowOutcome::from_row(out));
    }
    Ok(outcomes)
}

#[instrument(skip(conn, collections), fields(rows = collections.len()))]
pub async fn upsert_collections(
    conn: &mut PgConnection,
    collections: &[Collection],
) -> Result<Vec<RowOutcome>, ImportError> {
    let mut outcomes = Vec::with_capacity(collections.len());
    for (row, collection) in collections.iter().enumerate() {
        let out: (i64, bool) = sqlx::query_as(
            "INSERT INTO collection (tmdb_id, name) VALUES ($1, $2)
             ON CONFLICT (tmdb_id) DO UPDATE SET name = EXCLUDED.name
             RETURNING id, (xmax = 0)",
        )
        .bind(collection.tmdb_id)
        .bind(&collection.name)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| row_error(EntityKind::Collection, row, e))?;
        outcomes.push(RowOutcome::from_row(out));
    }
    Ok(outcomes)
}

#[instrument(skip(conn, companies), fields(rows = companies.len()))]
pub async fn upsert_companies(
    conn: &mut PgConnection,
    companies: &[ResolvedCompany<'_>],
) -> Result<Vec<RowOutcome>, ImportError> {
    let mut outcomes = Vec::with_capacity(companies.len());
    for (row, resolved) in companies.iter().enumerate() {
        let out: (i64, bool) = sqlx::query_as(
            "INSERT INTO company (tmdb_id, name, country_id) VALUES ($1, $2, $3)
             ON CONFLICT (tmdb_id) DO UPDATE
                 SET name = EXCLUDED.name,
                     country_id = EXCLUDED.country_id
             RETURNING id, (xmax = 0)",
        )
        .bind(resolved.company.tmdb_id)
        .bind(&resolved.company.name)
        .bind(resolved.country_id)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| row_error(EntityKind::Company, row, e))?;
        outcomes.push(RowOutcome::from_row(out));
    }
    Ok(outcomes)
}

#[instrument(skip(conn, people), fields(rows = people.len()))]
pub async fn upsert_people(
    conn: &mut PgConnection,
    people: &[ResolvedPerson<'_>],
) -> Result<Vec<RowOutcome>, ImportError> {
    let mut outcomes = Vec::with_capacity(people.len());
    for (row, resolved) in people.iter().enumerate() {
        let p = resolved.person;
        let out: (i64, bool) = sqlx::query_as(
            "INSERT INTO person
                 (tmdb_id, name, birth_date, profile_image_url, popularity, gender, birth_country_id)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (tmdb_id) DO UPDATE
                 SET name = EXCLUDED.name,
                     birth_date = EXCLUDED.birth_date,
                     profile_image_url = EXCLUDED.profile_image_url,
                     popularity = EXCLUDED.popularity,
                     gender = EXCLUDED.gender,
                     birth_country_id = EXCLUDED.birth_country_id
             RETURNING id, (xmax = 0)",
        )
        .bind(p.tmdb_id)
        .bind(&p.name)
        .bind(p.birth_date)
        .bind(p.profile_image_url.as_deref())
        .bind(p.popularity)
        .bind(p.gender.map(|g| g.as_str()))
        .bind(resolved.birth_country_id)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| row_error(EntityKind::Person, row, e))?;
        outcomes.push(RowOutcome::from_row(out));
    }
    Ok(outcomes)
}

#[instrument(skip(conn, movies), fields(rows = movies.len()))]
pub async fn upsert_movies(
    conn: &mut PgConnection,
    movies: &[ResolvedMovie<'_>],
) -> Result<Vec<RowOutcome>, ImportError> {
    let mut outcomes = Vec::with_capacity(movies.len());
    for (row, resolved) in movies.iter().enumerate() {
        let m = resolved.movie;
        let out: (i64, bool) = sqlx::query_as(
            "INSERT INTO movie
                 (tmdb_id, title, adult, overview, tagline, budget, revenue, runtime,
                  release_date, homepage, poster_url, vote_count, avg_vote, popularity,
                  collection_id)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
             ON CONFLICT (tmdb_id) DO UPDATE
                 SET title = EXCLUDED.title,
                     adult = EXCLUDED.adult,
                     overview = EXCLUDED.overview,
                     tagline = EXCLUDED.tagline,
                     budget = EXCLUDED.budget,
                     revenue = EXCLUDED.revenue,
                     runtime = EXCLUDED.runtime,
                     release_date = EXCLUDED.release_date,
                     homepage = EXCLUDED.homepage,
                     poster_url = EXCLUDED.poster_url,
                     vote_count = EXCLUDED.vote_count,
                     avg_vote = EXCLUDED.avg_vote,
                     popularity = EXCLUDED.popularity,
                     collection_id = EXCLUDED.collection_id
             RETURNING id, (xmax = 0)",
        )
        .bind(m.tmdb_id)
        .bind(&m.title)
        .bind(m.adult)
        .bind(m.overview.as_deref())
        .bind(m.tagline.as_deref())
        .bind(m.budget)
        .bind(m.revenue)
        .bind(m.runtime)
        .bind(m.release_date)
        .bind(m.homepage.as_deref())
        .bind(m.poster_url.as_deref())
        .bind(m.vote_count)
        .bind(m.avg_vote)
        .bind(m.popularity)
        .bind(resolved.collection_id)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| row_error(EntityKind::Movie, row, e))?;
        outcomes.push(RowOutcome::from_row(out));
    }
    Ok(outcomes)
}

async fn clear_links(
    conn: &mut PgConnection,
    entity: EntityKind,
    table: &str,
    movie_ids: &[i64],
) -> Result<(), ImportError> {
    sqlx::query(&format!("DELETE FROM {table} WHERE movie_id = ANY($1)"))
        .bind(movie_ids)
        .execute(&mut *conn)
        .await
        .map_err(|e| ImportError::LinkReplace { entity, source: e })?;
    Ok(())
}

// Link tables are full-replace per movie: the old rows for every movie
// in the batch are deleted (even when the new set is empty) and the new
// set is bulk-inserted with push_values. Each table is one ordered step.

#[instrument(skip(conn, movie_ids, rows), fields(movies = movie_ids.len(), rows = rows.len()))]
pub async fn replace_movie_genres(
    conn: &mut PgConnection,
    movie_ids: &[i64],
    rows: &[MovieGenreRow],
) -> Result<(), ImportError> {
    let entity = EntityKind::MovieGenre;
    if movie_ids.is_empty() {
        return Ok(());
    }
    clear_links(conn, entity, "movie_genre", movie_ids).await?;
    if rows.is_empty() {
        return Ok(());
    }
    let mut qb: QueryBuilder<'_, Postgres> =
        QueryBuilder::new("INSERT INTO movie_genre (movie_id, genre_id) ");
    qb.push_values(rows, |mut b, r| {
        b.push_bind(r.movie_id).push_bind(r.genre_id);
    });
    qb.build()
        .execute(&mut *conn)
        .await
        .map_err(|e| ImportError::LinkReplace { entity, source: e })?;
    Ok(())
}

#[instrument(skip(conn, movie_ids, rows), fields(movies = movie_ids.len(), rows = rows.len()))]
pub async fn replace_movie_keywords(
    conn: &mut PgConnection,
    movie_ids: &[i64],
    rows: &[MovieKeywordRow],
) -> Result<(), ImportError> {
    let entity = EntityKind::MovieKeyword;
    if movie_ids.is_empty() {
        return Ok(());
    }
    clear_links(conn, entity, "movie_keyword", movie_ids).await?;
    if rows.is_empty() {
        return Ok(());
    }
    let mut qb: QueryBuilder<'_, Postgres> =
        QueryBuilder::new("INSERT INTO movie_keyword (movie_id, keyword_id) ");
    qb.push_values(rows, |mut b, r| {
        b.push_bind(r.movie_id).push_bind(r.keyword_id);
    });
    qb.build()
        .execute(&mut *conn)
        .await
        .map_err(|e| ImportError::LinkReplace { entity, source: e })?;
    Ok(())
}

#[instrument(skip(conn, movie_ids, rows), fields(movies = movie_ids.len(), rows = rows.len()))]
pub async fn replace_movie_companies(
    conn: &mut PgConnection,
    movie_ids: &[i64],
    rows: &[MovieCompanyRow],
) -> Result<(), ImportError> {
    let entity = EntityKind::MovieCompany;
    if movie_ids.is_empty() {
        return Ok(());
    }
    clear_links(conn, entity, "movie_company", movie_ids).await?;
    if rows.is_empty() {
        return Ok(());
    }
    let mut qb: QueryBuilder<'_, Postgres> =
        QueryBuilder::new("INSERT INTO movie_company (movie_id, company_id) ");
    qb.push_values(rows, |mut b, r| {
        b.push_bind(r.movie_id).push_bind(r.company_id);
    });
    qb.build()
        .execute(&mut *conn)
        .await
        .map_err(|e| ImportError::LinkReplace { entity, source: e })?;
    Ok(())
}

#[instrument(skip(conn, movie_ids, rows), fields(movies = movie_ids.len(), rows = rows.len()))]
pub async fn replace_cast_credits(
    conn: &mut PgConnection,
    movie_ids: &[i64],
    rows: &[CastCreditRow],
) -> Result<(), ImportError> {
    let entity = EntityKind::CastCredit;
    if movie_ids.is_empty() {
        return Ok(());
    }
    clear_links(conn, entity, "cast_credit", movie_ids).await?;
    if rows.is_empty() {
        return Ok(());
    }
    let mut qb: QueryBuilder<'_, Postgres> =
        QueryBuilder::new("INSERT INTO cast_credit (movie_id, person_id, job_id, character_name) ");
    qb.push_values(rows, |mut b, r| {
        b.push_bind(r.movie_id)
            .push_bind(r.person_id)
            .push_bind(r.job_id)
            .push_bind(&r.character_name);
    });
    qb.build()
        .execute(&mut *conn)
        .await
        .map_err(|e| ImportError::LinkReplace { entity, source: e })?;
    Ok(())
}

#[instrument(skip(conn, movie_ids, rows), fields(movies = movie_ids.len(), rows = rows.len()))]
pub async fn replace_crew_credits(
    conn: &mut PgConnection,
    movie_ids: &[i64],
    rows: &[CrewCreditRow],
) -> Result<(), ImportError> {
    let entity = EntityKind::CrewCredit;
    if movie_ids.is_empty() {
        return Ok(());
    }
    clear_links(conn, entity, "crew_credit", movie_ids).await?;
    if rows.is_empty() {
        return Ok(());
    }
    let mut qb: QueryBuilder<'_, Postgres> =
        QueryBuilder::new("INSERT INTO crew_credit (movie_id, person_id, job_id) ");
    qb.push_values(rows, |mut b, r| {
        b.push_bind(r.movie_id)
            .push_bind(r.person_id)
            .push_bind(r.job_id);
    });
    qb.build()
        .execute(&mut *conn)
        .await
        .map_err(|e| ImportError::LinkReplace { entity, source: e })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_collapses_to_key() {
        assert_eq!(RowOutcome::Inserted(4).id(), 4);
        assert_eq!(RowOutcome::Updated(9).id(), 9);
    }

    #[test]
    fn outcome_tag_follows_xmax_probe() {
        assert_eq!(RowOutcome::from_row((1, true)), RowOutcome::Inserted(1));
        assert_eq!(RowOutcome::from_row((1, false)), RowOutcome::Updated(1));
    }
}
