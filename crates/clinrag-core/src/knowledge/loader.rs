//! Encoding, persisting and indexing the knowledge base

use super::{validate_records, CaseRecord, KnowledgeCase};
use crate::db::Database;
use crate::error::{ClinragError, Result};
use crate::index::VectorIndex;
use crate::llm::Embedder;
use serde::Serialize;

const ENCODE_BATCH_SIZE: usize = 64;

/// What a load or restore did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadStats {
    pub cases: usize,
    pub model: String,
    pub dimensions: usize,
    /// Stored vectors came from a different encoder and were recomputed
    pub reencoded: bool,
}

/// Encode every case, replace the stored knowledge base and rebuild the index
pub async fn load_knowledge_base(
    db: &Database,
    embedder: &dyn Embedder,
    index: &VectorIndex,
    records: Vec<CaseRecord>,
) -> Result<LoadStats> {
    validate_records(&records)?;

    let texts: Vec<String> = records.iter().map(|r| r.narrative.clone()).collect();
    let total_batches = texts.len().div_ceil(ENCODE_BATCH_SIZE);
    let mut embeddings = Vec::with_capacity(texts.len());

    for (idx, batch) in texts.chunks(ENCODE_BATCH_SIZE).enumerate() {
        tracing::debug!("Encoding batch {}/{}", idx + 1, total_batches);
        embeddings.extend(embedder.embed_batch(batch).await?);
    }

    if embeddings.len() != records.len() {
        return Err(ClinragError::Encoding(format!(
            "encoder returned {} vectors for {} cases",
            embeddings.len(),
            records.len()
        )));
    }
    if let Some(bad) = embeddings
        .iter()
        .position(|e| e.len() != embedder.dimensions())
    {
        return Err(ClinragError::Encoding(format!(
            "case {} encoded to {} dimensions, expected {}",
            records[bad].id,
            embeddings[bad].len(),
            embedder.dimensions()
        )));
    }

    let cases: Vec<KnowledgeCase> = records
        .into_iter()
        .zip(embeddings)
        .map(|(record, embedding)| KnowledgeCase::from_record(record, embedding))
        .collect();

    let count = db.replace_cases(&cases, embedder.model_name())?;
    index.build(cases)?;

    tracing::info!(
        "Loaded {} knowledge cases with {} ({} dims)",
        count,
        embedder.model_name(),
        embedder.dimensions()
    );

    Ok(LoadStats {
        cases: count,
        model: embedder.model_name().to_string(),
        dimensions: embedder.dimensions(),
        reencoded: false,
    })
}

/// Encode one case and append it to a restored knowledge base.
///
/// The index must already reflect the store, so restore first. The new case
/// takes the last insertion position in both.
pub async fn add_case(
    db: &Database,
    embedder: &dyn Embedder,
    index: &VectorIndex,
    record: CaseRecord,
) -> Result<KnowledgeCase> {
    validate_records(std::slice::from_ref(&record))?;

    let info = db.case_store_info()?;
    if info.case_count > 0 && info.model.as_deref() != Some(embedder.model_name()) {
        return Err(ClinragError::InvalidInput(format!(
            "knowledge base was encoded with {:?}, not {}",
            info.model,
            embedder.model_name()
        )));
    }

    let embedding = embedder.embed(&record.narrative).await?;
    let case = KnowledgeCase::from_record(record, embedding);

    db.append_case(&case, embedder.model_name())?;
    index.add(case.clone())?;

    tracing::info!("Added knowledge case {} ({} total)", case.id, index.len());
    Ok(case)
}

/// Rebuild the index from stored cases.
///
/// Cases encoded by another model or dimension are re-encoded first. A
/// store that was never loaded leaves the index unbuilt; a loaded but empty
/// one builds an empty index.
pub async fn restore_knowledge_base(
    db: &Database,
    embedder: &dyn Embedder,
    index: &VectorIndex,
) -> Result<LoadStats> {
    let info = db.case_store_info()?;
    if info.case_count == 0 {
        if info.loaded_at.is_some() {
            index.build(Vec::new())?;
        } else {
            tracing::debug!("Knowledge base never loaded, index left unbuilt");
        }
        return Ok(LoadStats {
            cases: 0,
            model: embedder.model_name().to_string(),
            dimensions: embedder.dimensions(),
            reencoded: false,
        });
    }

    let cases = db.list_cases()?;
    let same_encoder = info.model.as_deref() == Some(embedder.model_name())
        && info.dimensions == Some(embedder.dimensions());

    if !same_encoder {
        tracing::info!(
            "Stored cases were encoded with {:?}, re-encoding with {}",
            info.model,
            embedder.model_name()
        );
        let records = cases
            .into_iter()
            .map(|c| CaseRecord {
                id: c.id,
                narrative: c.narrative,
                diagnosis: c.diagnosis,
                outcome: c.outcome,
            })
            .collect();
        let mut stats = load_knowledge_base(db, embedder, index, records).await?;
        stats.reencoded = true;
        return Ok(stats);
    }

    let count = cases.len();
    index.build(cases)?;
    Ok(LoadStats {
        cases: count,
        model: embedder.model_name().to_string(),
        dimensions: embedder.dimensions(),
        reencoded: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::sample_cases;
    use crate::llm::HashEmbedder;

    fn setup() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        db
    }

    #[tokio::test]
    async fn test_load_sample_builds_index() {
        let db = setup();
        let index = VectorIndex::new();
        let embedder = HashEmbedder::default();

        let stats = load_knowledge_base(&db, &embedder, &index, sample_cases().unwrap())
            .await
            .unwrap();
        assert_eq!(stats.cases, 12);
        assert_eq!(index.len(), 12);
        assert_eq!(db.case_store_info().unwrap().case_count, 12);
    }

    #[tokio::test]
    async fn test_restore_reencodes_on_model_change() {
        let db = setup();
        let small = HashEmbedder::new(64).unwrap();
        load_knowledge_base(&db, &small, &VectorIndex::new(), sample_cases().unwrap())
            .await
            .unwrap();

        let index = VectorIndex::new();
        let stats = restore_knowledge_base(&db, &small, &index).await.unwrap();
        assert!(!stats.reencoded);
        assert_eq!(index.snapshot().unwrap().dimensions(), 64);

        let large = HashEmbedder::default();
        let stats = restore_knowledge_base(&db, &large, &index).await.unwrap();
        assert!(stats.reencoded);
        assert_eq!(index.snapshot().unwrap().dimensions(), 384);
        assert_eq!(db.case_store_info().unwrap().dimensions, Some(384));
    }

    #[tokio::test]
    async fn test_restore_empty_store_leaves_index_unbuilt() {
        let db = setup();
        let index = VectorIndex::new();
        let stats = restore_knowledge_base(&db, &HashEmbedder::default(), &index)
            .await
            .unwrap();
        assert_eq!(stats.cases, 0);
        assert!(!index.is_built());
    }

    #[tokio::test]
    async fn test_restore_after_empty_load_builds_empty_index() {
        let db = setup();
        let embedder = HashEmbedder::default();
        load_knowledge_base(&db, &embedder, &VectorIndex::new(), Vec::new())
            .await
            .unwrap();

        // A later process restoring the same store
        let index = VectorIndex::new();
        restore_knowledge_base(&db, &embedder, &index).await.unwrap();
        assert!(index.is_built());
        assert!(index.is_empty());
        assert!(index.search(&embedder.encode("chest pain").unwrap(), 5).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_add_case_appends_to_store_and_index() {
        let db = setup();
        let embedder = HashEmbedder::default();
        load_knowledge_base(&db, &embedder, &VectorIndex::new(), sample_cases().unwrap())
            .await
            .unwrap();

        let index = VectorIndex::new();
        restore_knowledge_base(&db, &embedder, &index).await.unwrap();
        let version = index.version();

        let record = CaseRecord {
            id: "LOCAL-001".to_string(),
            narrative: "Painless jaundice, weight loss and palpable gallbladder".to_string(),
            diagnosis: "Pancreatic adenocarcinoma".to_string(),
            outcome: None,
        };
        add_case(&db, &embedder, &index, record.clone()).await.unwrap();

        assert_eq!(index.len(), 13);
        assert_eq!(index.version(), version + 1);
        assert_eq!(db.get_case("LOCAL-001").unwrap().diagnosis, record.diagnosis);
        assert_eq!(db.list_cases().unwrap().last().unwrap().id, "LOCAL-001");

        let hits = index
            .search(&embedder.encode(&record.narrative).unwrap(), 1)
            .unwrap();
        assert_eq!(hits[0].case.id, "LOCAL-001");

        assert!(matches!(
            add_case(&db, &embedder, &index, record).await,
            Err(ClinragError::InvalidInput(_))
        ));
        assert_eq!(index.len(), 13);
    }

    #[tokio::test]
    async fn test_add_case_rejects_other_encoder() {
        let db = setup();
        let small = HashEmbedder::new(64).unwrap();
        let index = VectorIndex::new();
        load_knowledge_base(&db, &small, &index, sample_cases().unwrap())
            .await
            .unwrap();

        let record = CaseRecord {
            id: "LOCAL-002".to_string(),
            narrative: "Fever and neck stiffness".to_string(),
            diagnosis: "Meningitis".to_string(),
            outcome: None,
        };
        assert!(matches!(
            add_case(&db, &HashEmbedder::default(), &index, record).await,
            Err(ClinragError::InvalidInput(_))
        ));
    }
}
