use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use serde::Deserialize;

use crate::db::{queries, Database};
use crate::models::{Advisor, ProgramLevel, Student};

/// Advisor and student lookups the booking flow depends on.
pub trait Directory: Send + Sync {
    fn list_advisors(&self, level: ProgramLevel) -> anyhow::Result<Vec<Advisor>>;

    fn get_advisor(&self, advisor_id: &str) -> anyhow::Result<Option<Advisor>>;

    fn get_student(&self, student_id: &str) -> anyhow::Result<Option<Student>>;
}

pub struct SqliteDirectory {
    db: Arc<Database>,
}

impl SqliteDirectory {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

impl Directory for SqliteDirectory {
    fn list_advisors(&self, level: ProgramLevel) -> anyhow::Result<Vec<Advisor>> {
        self.db.read(|conn| queries::list_advisors(conn, level))
    }

    fn get_advisor(&self, advisor_id: &str) -> anyhow::Result<Option<Advisor>> {
        self.db.read(|conn| queries::get_advisor(conn, advisor_id))
    }

    fn get_student(&self, student_id: &str) -> anyhow::Result<Option<Student>> {
        self.db.read(|conn| queries::get_student(conn, student_id))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct DirectorySeed {
    #[serde(default)]
    pub advisors: Vec<Advisor>,
    #[serde(default)]
    pub students: Vec<Student>,
}

impl DirectorySeed {
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        serde_json::from_str(json).context("invalid directory seed")
    }
}

/// Upserts every advisor and student in the seed file in one transaction.
pub fn load_seed(db: &Database, path: &Path) -> anyhow::Result<(usize, usize)> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read seed file {}", path.display()))?;
    apply_seed(db, &DirectorySeed::from_json(&raw)?)
}

pub fn apply_seed(db: &Database, seed: &DirectorySeed) -> anyhow::Result<(usize, usize)> {
    db.transaction(|tx| {
        for advisor in &seed.advisors {
            queries::save_advisor(tx, advisor)?;
        }
        for student in &seed.students {
            queries::save_student(tx, student)?;
        }
        Ok::<_, anyhow::Error>(())
    })?;

    tracing::info!(
        advisors = seed.advisors.len(),
        students = seed.students.len(),
        "directory seed applied"
    );
    Ok((seed.advisors.len(), seed.students.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    const SEED: &str = r#"{
        "advisors": [
            {"advisor_id": "a1@example.edu", "name": "Ada Lovelace", "email": "a1@example.edu",
             "phone": null, "title": "Senior Advisor", "program_level": "undergraduate",
             "office_location": "Hall 2"},
            {"advisor_id": "g1@example.edu", "name": "Grace Hopper", "email": "g1@example.edu",
             "phone": null, "title": null, "program_level": "graduate", "office_location": null}
        ],
        "students": [
            {"student_id": "S1", "email": "s1@example.edu", "name": "Sam", "program_level": "undergraduate"}
        ]
    }"#;

    #[test]
    fn test_seed_populates_directory() {
        let db = Arc::new(Database::new(db::init_db(":memory:").unwrap()));
        let seed = DirectorySeed::from_json(SEED).unwrap();
        assert_eq!(apply_seed(&db, &seed).unwrap(), (2, 1));
        // re-applying is an upsert, not a duplicate
        apply_seed(&db, &seed).unwrap();

        let directory = SqliteDirectory::new(db);
        let undergrad = directory.list_advisors(ProgramLevel::Undergraduate).unwrap();
        assert_eq!(undergrad.len(), 1);
        assert_eq!(undergrad[0].name, "Ada Lovelace");
        assert!(directory.get_advisor("g1@example.edu").unwrap().is_some());
        assert!(directory.get_student("S1").unwrap().is_some());
        assert!(directory.get_student("S2").unwrap().is_none());
    }

    #[test]
    fn test_invalid_seed_is_error() {
        assert!(DirectorySeed::from_json("{\"advisors\": [{}]}").is_err());
    }
}
