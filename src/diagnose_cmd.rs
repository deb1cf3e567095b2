//! `krca diagnose`: run one diagnosis from the command line.

use anyhow::{anyhow, Result};

use kube_rca_core::diagnose::{DiagnoseRequest, Orchestrator};
use kube_rca_core::error::DiagnoseError;

use crate::config::Config;
use crate::embedding::create_embedder;
use crate::inference::HttpInference;
use crate::sqlite_store::open_store;

pub async fn run_diagnose(config: &Config, request: &DiagnoseRequest, json: bool) -> Result<()> {
    let selector = request.selector(config.diagnosis.default_k)?;

    let store = open_store(config).await?;
    let embedder = create_embedder(&config.embedding)?;
    let inference = HttpInference::new(&config.inference)?;

    let result = Orchestrator::new(&store, embedder.as_deref(), &inference)
        .with_evidence_budget(config.diagnosis.evidence_budget)
        .diagnose(&selector)
        .await;
    store.close().await;

    let result = match result {
        Ok(r) => r,
        Err(DiagnoseError::EmptyResult { raw }) => {
            eprintln!("raw response: {}", raw);
            return Err(anyhow!(
                "[{}] inference returned empty output; the model may still be loading",
                kube_rca_core::error::Stage::EmptyOutput
            ));
        }
        Err(e) => return Err(anyhow!("[{}] {}", e.stage(), e)),
    };

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "diagnosis": result.diagnosis_text,
                "evidence": result.evidence,
                "matched": result.matched_count,
            }))?
        );
        return Ok(());
    }

    println!("Diagnosis ({} evidence chunks)", result.matched_count);
    println!("================================");
    println!();
    println!("{}", result.diagnosis_text.trim());
    println!();
    println!("Evidence:");
    for chunk in &result.evidence {
        println!(
            "  - {}  [{}/{}]  severity {}",
            chunk.id,
            chunk.namespace,
            chunk.pod.as_deref().unwrap_or("-"),
            chunk.severity_hint
        );
    }
    Ok(())
}
