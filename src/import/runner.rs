//! The import run itself: one transaction, one fresh id map, the entity
//! kinds driven strictly in [`UPSERT_ORDER`]. Any failure at any step
//! rolls the whole run back; readers never see a partial import.

use std::collections::BTreeMap;
use std::fmt;

use sqlx::PgConnection;
use tracing::{info, instrument};

use crate::db::Db;
use crate::model::{ExternalId, ImportBatches};

use super::error::ImportError;
use super::id_map::IdMap;
use super::order::{verify_upsert_order, EntityKind, UPSERT_ORDER};
use super::resolve::{
    build_movie_links, resolve_companies, resolve_movies, resolve_people, MovieLinks,
};
use super::upsert::{
    replace_cast_credits, replace_crew_credits, replace_movie_companies, replace_movie_genres,
    replace_movie_keywords, upsert_collections, upsert_companies, upsert_countries, upsert_genres,
    upsert_jobs, upsert_keywords, upsert_movies, upsert_people, RowOutcome,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepCounts {
    pub inserted: usize,
    pub updated: usize,
}

/// Per-entity-kind tally of what one committed run wrote. Link-table
/// rows count as inserted (the prior set is deleted wholesale first).
#[derive(Debug, Default)]
pub struct ImportReport {
    counts: BTreeMap<EntityKind, StepCounts>,
}

impl ImportReport {
    fn add_outcomes(&mut self, entity: EntityKind, outcomes: &[RowOutcome]) {
        let entry = self.counts.entry(entity).or_default();
        for outcome in outcomes {
            match outcome {
                RowOutcome::Inserted(_) => entry.inserted += 1,
                RowOutcome::Updated(_) => entry.updated += 1,
            }
        }
    }

    fn add_links(&mut self, entity: EntityKind, rows: usize) {
        self.counts.entry(entity).or_default().inserted += rows;
    }

    pub fn counts(&self, entity: EntityKind) -> StepCounts {
        self.counts.get(&entity).copied().unwrap_or_default()
    }

    pub fn total_rows(&self) -> usize {
        self.counts
            .values()
            .map(|c| c.inserted + c.updated)
            .sum()
    }
}

impl fmt::Display for ImportReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (entity, counts) in &self.counts {
            writeln!(
                f,
                "{entity}: {} inserted, {} updated",
                counts.inserted, counts.updated
            )?;
        }
        Ok(())
    }
}

/// Runs one full import: begin, upsert every batch in dependency order,
/// commit. On any failure the transaction is rolled back and the error
/// names the failing entity kind (and row, when one applies); if the
/// rollback itself fails both errors surface together.
#[instrument(skip(db, batches))]
pub async fn run_import(db: &Db, batches: &ImportBatches) -> Result<ImportReport, ImportError> {
    verify_upsert_order()?;

    let mut tx = db.pool.begin().await?;
    let mut ids = IdMap::new();

    match drive(&mut tx, &mut ids, batches).await {
        Ok(report) => {
            tx.commit().await?;
            info!(rows = report.total_rows(), "import committed");
            Ok(report)
        }
        Err(cause) => match tx.rollback().await {
            Ok(()) => Err(cause),
            Err(rollback) => Err(ImportError::RollbackFailed {
                cause: Box::new(cause),
                rollback,
            }),
        },
    }
}

async fn drive(
    conn: &mut PgConnection,
    ids: &mut IdMap,
    batches: &ImportBatches,
) -> Result<ImportReport, ImportError> {
    let mut report = ImportReport::default();
    // Link rows are derived once, after movies are mapped, and shared by
    // the five link steps.
    let mut links: Option<MovieLinks> = None;

    for kind in UPSERT_ORDER {
        match kind {
            EntityKind::Genre => {
                let outcomes = upsert_genres(&mut *conn, &batches.genres).await?;
                for (genre, outcome) in batches.genres.iter().zip(&outcomes) {
                    ids.record(kind, ExternalId::Int(genre.tmdb_id), outcome.id())?;
                }
                report.add_outcomes(kind, &outcomes);
            }
            EntityKind::Country => {
                let outcomes = upsert_countries(&mut *conn, &batches.countries).await?;
                for (country, outcome) in batches.countries.iter().zip(&outcomes) {
                    ids.record(kind, ExternalId::Int(country.tmdb_id), outcome.id())?;
                }
                report.add_outcomes(kind, &outcomes);
            }
            EntityKind::Keyword => {
                let outcomes = upsert_keywords(&mut *conn, &batches.keywords).await?;
                for (keyword, outcome) in batches.keywords.iter().zip(&outcomes) {
                    ids.record(kind, ExternalId::Text(keyword.name.clone()), outcome.id())?;
                }
                report.add_outcomes(kind, &outcomes);
            }
            EntityKind::Job => {
                let outcomes = upsert_jobs(&mut *conn, &batches.jobs).await?;
                for (job, outcome) in batches.jobs.iter().zip(&outcomes) {
                    ids.record(kind, ExternalId::Text(job.name.clone()), outcome.id())?;
                }
                report.add_outcomes(kind, &outcomes);
            }
            EntityKind::Collection => {
                let outcomes = upsert_collections(&mut *conn, &batches.collections).await?;
                for (collection, outcome) in batches.collections.iter().zip(&outcomes) {
                    ids.record(kind, ExternalId::Int(collection.tmdb_id), outcome.id())?;
                }
                report.add_outcomes(kind, &outcomes);
            }
            EntityKind::Company => {
                let resolved = resolve_companies(ids, &batches.companies)?;
                let outcomes = upsert_companies(&mut *conn, &resolved).await?;
                for (company, outcome) in batches.companies.iter().zip(&outcomes) {
                    ids.record(kind, ExternalId::Int(company.tmdb_id), outcome.id())?;
                }
                report.add_outcomes(kind, &outcomes);
            }
            EntityKind::Person => {
                let resolved = resolve_people(ids, &batches.people)?;
                let outcomes = upsert_people(&mut *conn, &resolved).await?;
                for (person, outcome) in batches.people.iter().zip(&outcomes) {
                    ids.record(kind, ExternalId::Int(person.tmdb_id), outcome.id())?;
                }
                report.add_outcomes(kind, &outcomes);
            }
            EntityKind::Movie => {
                let resolved = resolve_movies(ids, &batches.movies)?;
                let outcomes = upsert_movies(&mut *conn, &resolved).await?;
                for (movie, outcome) in batches.movies.iter().zip(&outcomes) {
                    ids.record(kind, ExternalId::Int(movie.tmdb_id), outcome.id())?;
                }
                report.add_outcomes(kind, &outcomes);
            }
            EntityKind::MovieGenre => {
                let l = link_rows(&mut links, ids, batches)?;
                replace_movie_genres(&mut *conn, &l.movie_ids, &l.genres).await?;
                report.add_links(kind, l.genres.len());
            }
            EntityKind::MovieKeyword => {
                let l = link_rows(&mut links, ids, batches)?;
                replace_movie_keywords(&mut *conn, &l.movie_ids, &l.keywords).await?;
                report.add_links(kind, l.keywords.len());
            }
            EntityKind::MovieCompany => {
                let l = link_rows(&mut links, ids, batches)?;
                replace_movie_companies(&mut *conn, &l.movie_ids, &l.companies).await?;
                report.add_links(kind, l.companies.len());
            }
            EntityKind::CastCredit => {
                let l = link_rows(&mut links, ids, batches)?;
                replace_cast_credits(&mut *conn, &l.movie_ids, &l.cast).await?;
                report.add_links(kind, l.cast.len());
            }
            EntityKind::CrewCredit => {
                let l = link_rows(&mut links, ids, batches)?;
                replace_crew_credits(&mut *conn, &l.movie_ids, &l.crew).await?;
                report.add_links(kind, l.crew.len());
            }
        }
    }

    Ok(report)
}

fn link_rows<'a>(
    links: &'a mut Option<MovieLinks>,
    ids: &IdMap,
    batches: &ImportBatches,
) -> Result<&'a MovieLinks, ImportError> {
    if links.is_none() {
        *links = Some(build_movie_links(ids, &batches.movies)?);
    }
    Ok(links.as_ref().unwrap())
}
