//! Knowledge case storage

use super::vectors::{bytes_to_embedding, embedding_to_bytes};
use super::Database;
use crate::error::{ClinragError, Result};
use crate::knowledge::KnowledgeCase;
use chrono::Utc;
use rusqlite::{params, OptionalExtension};

/// Summary of the stored knowledge base
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct CaseStoreInfo {
    pub case_count: usize,
    pub model: Option<String>,
    pub dimensions: Option<usize>,
    /// When the knowledge base was last loaded; `None` if it never was
    pub loaded_at: Option<String>,
}

impl Database {
    /// Replace the whole knowledge base in one transaction
    pub fn replace_cases(&self, cases: &[KnowledgeCase], model: &str) -> Result<usize> {
        let now = Utc::now().to_rfc3339();

        self.with_immediate(|| {
            self.conn.execute("DELETE FROM knowledge_cases", [])?;
            let mut stmt = self.conn.prepare(
                "INSERT INTO knowledge_cases
                 (case_id, position, narrative, diagnosis, outcome, embedding, model, dimensions, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?;
            for (position, case) in cases.iter().enumerate() {
                stmt.execute(params![
                    case.id,
                    position as i64,
                    case.narrative,
                    case.diagnosis,
                    case.outcome,
                    embedding_to_bytes(&case.embedding),
                    model,
                    case.embedding.len() as i64,
                    now,
                ])?;
            }
            self.conn.execute(
                "INSERT OR REPLACE INTO knowledge_base_state (id, loaded_at, model, dimensions)
                 VALUES (1, ?1, ?2, ?3)",
                params![
                    now,
                    model,
                    cases.first().map(|c| c.embedding.len()).unwrap_or(0) as i64
                ],
            )?;
            Ok(cases.len())
        })
    }

    /// Append one case after the current last position
    pub fn append_case(&self, case: &KnowledgeCase, model: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();

        self.with_immediate(|| {
            let exists: bool = self.conn.query_row(
                "SELECT COUNT(*) > 0 FROM knowledge_cases WHERE case_id = ?1",
                params![case.id],
                |row| row.get(0),
            )?;
            if exists {
                return Err(ClinragError::InvalidInput(format!(
                    "duplicate case id: {}",
                    case.id
                )));
            }

            self.conn.execute(
                "INSERT INTO knowledge_cases
                 (case_id, position, narrative, diagnosis, outcome, embedding, model, dimensions, created_at)
                 VALUES (?1, (SELECT COALESCE(MAX(position), -1) + 1 FROM knowledge_cases),
                         ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    case.id,
                    case.narrative,
                    case.diagnosis,
                    case.outcome,
                    embedding_to_bytes(&case.embedding),
                    model,
                    case.embedding.len() as i64,
                    now,
                ],
            )?;
            Ok(())
        })
    }

    /// All cases in insertion order
    pub fn list_cases(&self) -> Result<Vec<KnowledgeCase>> {
        let mut stmt = self.conn.prepare(
            "SELECT case_id, narrative, diagnosis, outcome, embedding
             FROM knowledge_cases ORDER BY position",
        )?;

        let results = stmt
            .query_map([], |row| {
                let embedding_bytes: Vec<u8> = row.get(4)?;
                Ok(KnowledgeCase {
                    id: row.get(0)?,
                    narrative: row.get(1)?,
                    diagnosis: row.get(2)?,
                    outcome: row.get(3)?,
                    embedding: bytes_to_embedding(&embedding_bytes),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(results)
    }

    pub fn get_case(&self, case_id: &str) -> Result<KnowledgeCase> {
        self.conn
            .query_row(
                "SELECT case_id, narrative, diagnosis, outcome, embedding
                 FROM knowledge_cases WHERE case_id = ?1",
                params![case_id],
                |row| {
                    let embedding_bytes: Vec<u8> = row.get(4)?;
                    Ok(KnowledgeCase {
                        id: row.get(0)?,
                        narrative: row.get(1)?,
                        diagnosis: row.get(2)?,
                        outcome: row.get(3)?,
                        embedding: bytes_to_embedding(&embedding_bytes),
                    })
                },
            )
            .optional()?
            .ok_or_else(|| ClinragError::CaseNotFound(case_id.to_string()))
    }

    /// Count and encoder of the stored knowledge base
    pub fn case_store_info(&self) -> Result<CaseStoreInfo> {
        let case_count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM knowledge_cases", [], |row| row.get(0))?;

        let model_row: Option<(String, i64)> = self
            .conn
            .query_row(
                "SELECT model, dimensions FROM knowledge_cases ORDER BY position LIMIT 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let loaded_at: Option<String> = self
            .conn
            .query_row(
                "SELECT loaded_at FROM knowledge_base_state WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .optional()?;

        Ok(CaseStoreInfo {
            case_count: case_count as usize,
            model: model_row.as_ref().map(|(m, _)| m.clone()),
            dimensions: model_row.map(|(_, d)| d as usize),
            loaded_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn case(id: &str, embedding: Vec<f32>) -> KnowledgeCase {
        KnowledgeCase {
            id: id.to_string(),
            narrative: format!("narrative {}", id),
            diagnosis: format!("diagnosis {}", id),
            outcome: None,
            embedding,
        }
    }

    fn setup() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        db
    }

    #[test]
    fn test_replace_preserves_order() {
        let db = setup();
        db.replace_cases(
            &[case("B", vec![1.0, 0.0]), case("A", vec![0.0, 1.0])],
            "m",
        )
        .unwrap();

        let cases = db.list_cases().unwrap();
        assert_eq!(cases[0].id, "B");
        assert_eq!(cases[1].id, "A");
        assert_eq!(cases[1].embedding, vec![0.0, 1.0]);

        db.replace_cases(&[case("C", vec![1.0, 1.0])], "m").unwrap();
        assert_eq!(db.list_cases().unwrap().len(), 1);
    }

    #[test]
    fn test_append_and_duplicate() {
        let db = setup();
        db.replace_cases(&[case("A", vec![1.0])], "m").unwrap();
        db.append_case(&case("B", vec![0.5]), "m").unwrap();

        let ids: Vec<String> = db.list_cases().unwrap().into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec!["A", "B"]);

        assert!(matches!(
            db.append_case(&case("A", vec![1.0]), "m"),
            Err(ClinragError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_store_info_and_lookup() {
        let db = setup();
        let empty = db.case_store_info().unwrap();
        assert_eq!(empty.case_count, 0);
        assert!(empty.loaded_at.is_none());

        db.replace_cases(&[case("A", vec![1.0, 2.0, 3.0])], "hash-3").unwrap();
        let info = db.case_store_info().unwrap();
        assert_eq!(info.case_count, 1);
        assert_eq!(info.model.as_deref(), Some("hash-3"));
        assert_eq!(info.dimensions, Some(3));
        assert!(info.loaded_at.is_some());

        assert_eq!(db.get_case("A").unwrap().diagnosis, "diagnosis A");
        assert!(matches!(db.get_case("Z"), Err(ClinragError::CaseNotFound(_))));
    }

    #[test]
    fn test_empty_load_is_recorded() {
        let db = setup();
        db.replace_cases(&[], "m").unwrap();

        let info = db.case_store_info().unwrap();
        assert_eq!(info.case_count, 0);
        assert!(info.loaded_at.is_some());
    }
}
