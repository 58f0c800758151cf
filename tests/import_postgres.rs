//! Integration tests against a local PostgreSQL.
//!
//! Run with `cargo test --features postgres-tests` and a `DATABASE_URL`
//! pointing at a scratch database. The tests own their tables: every
//! test drops and recreates them, serialized through a global lock.
#![cfg(feature = "postgres-tests")]

use std::sync::OnceLock;

use tokio::sync::{Mutex, MutexGuard};

use moviedb_import::db::Db;
use moviedb_import::import::{run_import, EntityKind, ImportError, RowOutcome};
use moviedb_import::model::{
    CastCredit, Collection, Company, Country, CrewCredit, Genre, ImportBatches, Movie,
};
use moviedb_import::util::env as env_util;

fn db_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

const SCHEMA_SQL: &str = r#"
    DROP TABLE IF EXISTS crew_credit, cast_credit, movie_company, movie_keyword,
        movie_genre, movie, person, company, collection, job, keyword, country,
        genre CASCADE;

    CREATE TABLE genre (
        id BIGSERIAL PRIMARY KEY,
        name TEXT NOT NULL UNIQUE
    );
    CREATE TABLE country (
        id BIGSERIAL PRIMARY KEY,
        name TEXT NOT NULL,
        iso_3166_1 TEXT NOT NULL UNIQUE
    );
    CREATE TABLE keyword (
        id BIGSERIAL PRIMARY KEY,
        name TEXT NOT NULL UNIQUE
    );
    CREATE TABLE job (
        id BIGSERIAL PRIMARY KEY,
        name TEXT NOT NULL UNIQUE
    );
    CREATE TABLE collection (
        id BIGSERIAL PRIMARY KEY,
        tmdb_id BIGINT NOT NULL UNIQUE,
        name TEXT NOT NULL
    );
    CREATE TABLE company (
        id BIGSERIAL PRIMARY KEY,
        tmdb_id BIGINT NOT NULL UNIQUE,
        name TEXT NOT NULL,
        country_id BIGINT REFERENCES country(id)
    );
    CREATE TABLE person (
        id BIGSERIAL PRIMARY KEY,
        tmdb_id BIGINT NOT NULL UNIQUE,
        name TEXT NOT NULL,
        birth_date DATE,
        profile_image_url TEXT,
        popularity REAL,
        gender TEXT,
        birth_country_id BIGINT REFERENCES country(id)
    );
    CREATE TABLE movie (
        id BIGSERIAL PRIMARY KEY,
        tmdb_id BIGINT NOT NULL UNIQUE,
        title TEXT NOT NULL CHECK (title <> ''),
        adult BOOLEAN,
        overview TEXT,
        tagline TEXT,
        budget BIGINT,
        revenue BIGINT,
        runtime SMALLINT,
        release_date DATE,
        homepage TEXT,
        poster_url TEXT,
        vote_count INTEGER,
        avg_vote REAL,
        popularity REAL,
        collection_id BIGINT REFERENCES collection(id)
    );
    CREATE TABLE movie_genre (
        movie_id BIGINT NOT NULL REFERENCES movie(id),
        genre_id BIGINT NOT NULL REFERENCES genre(id),
        PRIMARY KEY (movie_id, genre_id)
    );
    CREATE TABLE movie_keyword (
        movie_id BIGINT NOT NULL REFERENCES movie(id),
        keyword_id BIGINT NOT NULL REFERENCES keyword(id),
        PRIMARY KEY (movie_id, keyword_id)
    );
    CREATE TABLE movie_company (
        movie_id BIGINT NOT NULL REFERENCES movie(id),
        company_id BIGINT NOT NULL REFERENCES company(id),
        PRIMARY KEY (movie_id, company_id)
    );
    CREATE TABLE cast_credit (
        movie_id BIGINT NOT NULL REFERENCES movie(id),
        person_id BIGINT NOT NULL REFERENCES person(id),
        job_id BIGINT NOT NULL REFERENCES job(id),
        character_name TEXT NOT NULL,
        PRIMARY KEY (movie_id, person_id, job_id, character_name)
    );
    CREATE TABLE crew_credit (
        movie_id BIGINT NOT NULL REFERENCES movie(id),
        person_id BIGINT NOT NULL REFERENCES person(id),
        job_id BIGINT NOT NULL REFERENCES job(id),
        PRIMARY KEY (movie_id, person_id, job_id)
    );
"#;

async fn test_db() -> (Db, MutexGuard<'static, ()>) {
    let guard = db_lock().lock().await;
    let url = env_util::db_url().expect("postgres-tests need DATABASE_URL");
    let db = Db::connect(&url, 2).await.expect("connect");
    sqlx::raw_sql(SCHEMA_SQL)
        .execute(&db.pool)
        .await
        .expect("provision test schema");
    (db, guard)
}

async fn count(db: &Db, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT count(*) FROM {table}"))
        .fetch_one(&db.pool)
        .await
        .unwrap()
}

fn us() -> Country {
    Country {
        tmdb_id: 840,
        name: "United States".into(),
        iso_3166_1: "US".into(),
    }
}

fn studio_a() -> Company {
    Company {
        tmdb_id: 7,
        name: "Studio A".into(),
        country_tmdb_id: Some(840),
    }
}

fn full_batches() -> ImportBatches {
    use moviedb_import::model::{Job, Keyword, Person};
    ImportBatches {
        genres: vec![
            Genre { tmdb_id: 18, name: "Drama".into() },
            Genre { tmdb_id: 80, name: "Crime".into() },
        ],
        countries: vec![us()],
        keywords: vec![Keyword { name: "heist".into() }],
        jobs: vec![Job { name: "Actor".into() }, Job { name: "Director".into() }],
        collections: vec![Collection { tmdb_id: 90, name: "Heat Collection".into() }],
        companies: vec![studio_a()],
        people: vec![Person {
            tmdb_id: 55,
            name: "Al Pacino".into(),
            birth_date: None,
            profile_image_url: None,
            popularity: Some(9.5),
            gender: None,
            birth_country_tmdb_id: Some(840),
        }],
        movies: vec![Movie {
            tmdb_id: 949,
            title: "Heat".into(),
            budget: Some(60_000_000),
            collection_tmdb_id: Some(90),
            genre_tmdb_ids: vec![18, 80],
            company_tmdb_ids: vec![7],
            keywords: vec!["heist".into()],
            cast: vec![CastCredit {
                person_tmdb_id: 55,
                job: "Actor".into(),
                character_name: "Vincent".into(),
            }],
            crew: vec![CrewCredit {
                person_tmdb_id: 55,
                job: "Director".into(),
            }],
            ..Movie::default()
        }],
    }
}

#[tokio::test]
async fn country_and_company_round_trip() {
    let (db, _guard) = test_db().await;

    let batches = ImportBatches {
        countries: vec![us()],
        companies: vec![studio_a()],
        ..ImportBatches::default()
    };

    let report = run_import(&db, &batches).await.unwrap();
    assert_eq!(report.counts(EntityKind::Country).inserted, 1);
    assert_eq!(report.counts(EntityKind::Company).inserted, 1);

    // The company's FK is the country's surrogate key, not the tmdb id.
    let (company_country, country_id): (i64, i64) = sqlx::query_as(
        "SELECT c.country_id, co.id FROM company c JOIN country co ON TRUE
         WHERE c.tmdb_id = 7 AND co.iso_3166_1 = 'US'",
    )
    .fetch_one(&db.pool)
    .await
    .unwrap();
    assert_eq!(company_country, country_id);

    // Re-running the identical batches changes nothing and adds nothing.
    let report = run_import(&db, &batches).await.unwrap();
    assert_eq!(report.counts(EntityKind::Country).updated, 1);
    assert_eq!(report.counts(EntityKind::Company).updated, 1);
    assert_eq!(count(&db, "country").await, 1);
    assert_eq!(count(&db, "company").await, 1);
}

#[tokio::test]
async fn upsert_returns_keys_in_input_order() {
    let (db, _guard) = test_db().await;

    let first = vec![
        Genre { tmdb_id: 1, name: "Drama".into() },
        Genre { tmdb_id: 2, name: "Crime".into() },
    ];
    let mut tx = db.pool.begin().await.unwrap();
    let outcomes = moviedb_import::import::upsert::upsert_genres(&mut *tx, &first)
        .await
        .unwrap();
    assert_eq!(outcomes.len(), 2);
    let drama_id = match outcomes[0] {
        RowOutcome::Inserted(id) => id,
        other => panic!("expected insert, got {other:?}"),
    };

    // Overlapping second batch: position 0 updates the existing row and
    // returns its unchanged key, position 1 is a fresh insert.
    let second = vec![
        Genre { tmdb_id: 1, name: "Drama".into() },
        Genre { tmdb_id: 3, name: "Thriller".into() },
    ];
    let outcomes = moviedb_import::import::upsert::upsert_genres(&mut *tx, &second)
        .await
        .unwrap();
    assert_eq!(outcomes[0], RowOutcome::Updated(drama_id));
    assert!(matches!(outcomes[1], RowOutcome::Inserted(_)));
    tx.commit().await.unwrap();
}

#[tokio::test]
async fn full_import_is_idempotent() {
    let (db, _guard) = test_db().await;
    let batches = full_batches();

    run_import(&db, &batches).await.unwrap();
    let after_first: Vec<i64> = table_counts(&db).await;
    run_import(&db, &batches).await.unwrap();
    let after_second: Vec<i64> = table_counts(&db).await;

    assert_eq!(after_first, after_second);
    assert_eq!(count(&db, "movie_genre").await, 2);
    assert_eq!(count(&db, "cast_credit").await, 1);
    assert_eq!(count(&db, "crew_credit").await, 1);
}

async fn table_counts(db: &Db) -> Vec<i64> {
    let mut counts = Vec::new();
    for table in [
        "genre",
        "country",
        "keyword",
        "job",
        "collection",
        "company",
        "person",
        "movie",
        "movie_genre",
        "movie_keyword",
        "movie_company",
        "cast_credit",
        "crew_credit",
    ] {
        counts.push(count(db, table).await);
    }
    counts
}

#[tokio::test]
async fn link_reimport_is_full_replace() {
    let (db, _guard) = test_db().await;
    let mut batches = full_batches();
    run_import(&db, &batches).await.unwrap();
    assert_eq!(count(&db, "movie_genre").await, 2);
    assert_eq!(count(&db, "crew_credit").await, 1);

    // Re-import with a strict subset of the links: the store must end up
    // with exactly the new subset, no stale rows.
    batches.movies[0].genre_tmdb_ids = vec![18];
    batches.movies[0].crew = vec![];
    run_import(&db, &batches).await.unwrap();

    assert_eq!(count(&db, "movie_genre").await, 1);
    assert_eq!(count(&db, "crew_credit").await, 0);
    let genre_name: String = sqlx::query_scalar(
        "SELECT g.name FROM movie_genre mg JOIN genre g ON g.id = mg.genre_id",
    )
    .fetch_one(&db.pool)
    .await
    .unwrap();
    assert_eq!(genre_name, "Drama");
}

#[tokio::test]
async fn reimport_updates_mutable_attributes_in_place() {
    let (db, _guard) = test_db().await;
    let mut batches = full_batches();
    run_import(&db, &batches).await.unwrap();
    let movie_id: i64 = sqlx::query_scalar("SELECT id FROM movie WHERE tmdb_id = 949")
        .fetch_one(&db.pool)
        .await
        .unwrap();

    batches.movies[0].budget = Some(61_000_000);
    batches.movies[0].title = "Heat (1995)".into();
    run_import(&db, &batches).await.unwrap();

    let (id, title, budget): (i64, String, i64) =
        sqlx::query_as("SELECT id, title, budget FROM movie WHERE tmdb_id = 949")
            .fetch_one(&db.pool)
            .await
            .unwrap();
    // Surrogate key survives the correction.
    assert_eq!(id, movie_id);
    assert_eq!(title, "Heat (1995)");
    assert_eq!(budget, 61_000_000);
}

#[tokio::test]
async fn dangling_reference_rolls_back_everything() {
    let (db, _guard) = test_db().await;

    // Country batch is present but the company points at an id that is
    // not in it: referential failure, and the already-upserted countries
    // must not survive the rollback.
    let batches = ImportBatches {
        countries: vec![us()],
        companies: vec![Company {
            tmdb_id: 7,
            name: "Studio A".into(),
            country_tmdb_id: Some(999),
        }],
        ..ImportBatches::default()
    };

    let err = run_import(&db, &batches).await.unwrap_err();
    match &err {
        ImportError::Referential { entity, row, .. } => {
            assert_eq!(*entity, EntityKind::Company);
            assert_eq!(*row, 0);
        }
        other => panic!("expected referential error, got {other:?}"),
    }
    assert_eq!(count(&db, "country").await, 0);
    assert_eq!(count(&db, "company").await, 0);
}

#[tokio::test]
async fn constraint_violation_rolls_back_earlier_steps() {
    let (db, _guard) = test_db().await;

    let mut batches = full_batches();
    // Violates the movie title CHECK after every earlier entity kind has
    // been written inside the transaction.
    batches.movies[0].title = String::new();

    let err = run_import(&db, &batches).await.unwrap_err();
    match &err {
        ImportError::Constraint { entity, row, .. } => {
            assert_eq!(*entity, EntityKind::Movie);
            assert_eq!(*row, 0);
        }
        other => panic!("expected constraint error, got {other:?}"),
    }
    for table in ["genre", "country", "collection", "company", "person", "movie"] {
        assert_eq!(count(&db, table).await, 0, "{table} not rolled back");
    }
}
