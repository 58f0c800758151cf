//! Fixed upsert ordering over the entity kinds. The foreign-key graph is
//! known at compile time, so the order is a declared constant checked
//! once at startup instead of a runtime topological sort.

use std::fmt;

use super::error::ImportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    Genre,
    Country,
    Keyword,
    Job,
    Collection,
    Company,
    Person,
    Movie,
    MovieGenre,
    MovieKeyword,
    MovieCompany,
    CastCredit,
    CrewCredit,
}

impl EntityKind {
    pub const ALL: [EntityKind; 13] = [
        EntityKind::Genre,
        EntityKind::Country,
        EntityKind::Keyword,
        EntityKind::Job,
        EntityKind::Collection,
        EntityKind::Company,
        EntityKind::Person,
        EntityKind::Movie,
        EntityKind::MovieGenre,
        EntityKind::MovieKeyword,
        EntityKind::MovieCompany,
        EntityKind::CastCredit,
        EntityKind::CrewCredit,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Genre => "genre",
            EntityKind::Country => "country",
            EntityKind::Keyword => "keyword",
            EntityKind::Job => "job",
            EntityKind::Collection => "collection",
            EntityKind::Company => "company",
            EntityKind::Person => "person",
            EntityKind::Movie => "movie",
            EntityKind::MovieGenre => "movie_genre",
            EntityKind::MovieKeyword => "movie_keyword",
            EntityKind::MovieCompany => "movie_company",
            EntityKind::CastCredit => "cast_credit",
            EntityKind::CrewCredit => "crew_credit",
        }
    }

    /// Entity kinds whose surrogate keys must already be mapped before
    /// this kind may be upserted. Exhaustive on purpose: a new kind does
    /// not compile until its edges are declared here.
    pub fn dependencies(self) -> &'static [EntityKind] {
        match self {
            EntityKind::Genre
            | EntityKind::Country
            | EntityKind::Keyword
            | EntityKind::Job
            | EntityKind::Collection => &[],
            EntityKind::Company => &[EntityKind::Country],
            EntityKind::Person => &[EntityKind::Country],
            EntityKind::Movie => &[EntityKind::Collection],
            EntityKind::MovieGenre => &[EntityKind::Movie, EntityKind::Genre],
            EntityKind::MovieKeyword => &[EntityKind::Movie, EntityKind::Keyword],
            EntityKind::MovieCompany => &[EntityKind::Movie, EntityKind::Company],
            EntityKind::CastCredit => {
                &[EntityKind::Movie, EntityKind::Person, EntityKind::Job]
            }
            EntityKind::CrewCredit => {
                &[EntityKind::Movie, EntityKind::Person, EntityKind::Job]
            }
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The one order every run uses: lookup tables, then externally-keyed
/// parents, then movies, then the link tables.
pub const UPSERT_ORDER: [EntityKind; 13] = [
    EntityKind::Genre,
    EntityKind::Country,
    EntityKind::Keyword,
    EntityKind::Job,
    EntityKind::Collection,
    EntityKind::Company,
    EntityKind::Person,
    EntityKind::Movie,
    EntityKind::MovieGenre,
    EntityKind::MovieKeyword,
    EntityKind::MovieCompany,
    EntityKind::CastCredit,
    EntityKind::CrewCredit,
];

/// Startup assertion over [`UPSERT_ORDER`]: every kind appears exactly
/// once and only after all of its dependencies. Runs before any row is
/// written; a failure is a configuration error, not a data error.
pub fn verify_upsert_order() -> Result<(), ImportError> {
    for kind in EntityKind::ALL {
        let occurrences = UPSERT_ORDER.iter().filter(|k| **k == kind).count();
        if occurrences != 1 {
            return Err(ImportError::Config(format!(
                "entity kind {kind} appears {occurrences} times in the upsert order (want exactly 1)"
            )));
        }
    }
    for (pos, kind) in UPSERT_ORDER.iter().enumerate() {
        for dep in kind.dependencies() {
            let dep_pos = UPSERT_ORDER
                .iter()
                .position(|k| k == dep)
                .ok_or_else(|| {
                    ImportError::Config(format!(
                        "entity kind {dep} (dependency of {kind}) has no place in the upsert order"
                    ))
                })?;
            if dep_pos >= pos {
                return Err(ImportError::Config(format!(
                    "upsert order places {kind} before its dependency {dep}"
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declared_order_is_valid() {
        verify_upsert_order().unwrap();
    }

    #[test]
    fn lookup_tables_come_first() {
        let movie_pos = UPSERT_ORDER
            .iter()
            .position(|k| *k == EntityKind::Movie)
            .unwrap();
        for kind in [EntityKind::Genre, EntityKind::Country, EntityKind::Collection] {
            let pos = UPSERT_ORDER.iter().position(|k| *k == kind).unwrap();
            assert!(pos < movie_pos, "{kind} must precede movie");
        }
    }

    #[test]
    fn link_tables_come_last() {
        let movie_pos = UPSERT_ORDER
            .iter()
            .position(|k| *k == EntityKind::Movie)
            .unwrap();
        for kind in [
            EntityKind::MovieGenre,
            EntityKind::MovieKeyword,
            EntityKind::MovieCompany,
            EntityKind::CastCredit,
            EntityKind::CrewCredit,
        ] {
            let pos = UPSERT_ORDER.iter().position(|k| *k == kind).unwrap();
            assert!(pos > movie_pos, "{kind} must follow movie");
        }
    }

    #[test]
    fn every_kind_is_ordered() {
        assert_eq!(UPSERT_ORDER.len(), EntityKind::ALL.len());
    }
}
