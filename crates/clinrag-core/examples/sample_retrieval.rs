// Retrieval example using clinrag as a library

use clinrag_core::knowledge::{load_knowledge_base, sample_cases};
use clinrag_core::{
    CaseRetriever, ClinicalSummary, Database, HashEmbedder, PatientSnapshot, VectorIndex, Vitals,
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> clinrag_core::Result<()> {
    println!("Clinrag Sample Retrieval Example\n");

    let db = Database::open_in_memory()?;
    db.initialize()?;

    // Encode and index the bundled cases
    let embedder = Arc::new(HashEmbedder::default());
    let index = Arc::new(VectorIndex::new());
    let stats = load_knowledge_base(&db, embedder.as_ref(), &index, sample_cases()?).await?;
    println!("Loaded {} cases with {}\n", stats.cases, stats.model);

    let patient = PatientSnapshot {
        age: 34,
        sex: "F".to_string(),
        chief_complaint: "Shortness of breath".to_string(),
        symptoms: "Sudden onset dyspnea, sharp chest pain worse with breathing, recent long flight"
            .to_string(),
        past_medical_history: Some("Oral contraceptives".to_string()),
        medications: None,
        clinical_notes: None,
        vitals: Some(Vitals {
            heart_rate: Some(118),
            oxygen_saturation: Some(90.0),
            ..Default::default()
        }),
        labs: Some("D-dimer elevated".to_string()),
    };

    let summary = ClinicalSummary::generate(&patient, embedder.as_ref()).await?;
    println!("{}\n", summary.text);

    let retriever = CaseRetriever::new(embedder, index);
    let result = retriever.retrieve(&summary, 3, 0.0)?;

    println!("Most similar cases:");
    for case in result.iter() {
        println!("  {:.3}  {}  {}", case.similarity, case.case_id, case.diagnosis);
    }

    Ok(())
}
