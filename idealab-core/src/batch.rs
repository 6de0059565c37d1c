//! Batch driver: run all three research services and save their results.
//!
//! The services run as separate tokio tasks. A task that panics or returns
//! an error envelope is listed in `failed_tasks`, and every file is still
//! written.

use crate::envelope::ResearchEnvelope;
use crate::error::ResearchError;
use crate::persistence;
use crate::service::ResearchEngine;
use crate::types::ResearchRequest;
use chrono::{DateTime, Local};
use serde::Serialize;
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinError;
use tracing::{error, info, warn};

pub const INPUTS_FILE: &str = "inputs.json";
pub const MARKET_FILE: &str = "market_data.json";
pub const COMPETITION_FILE: &str = "competition.json";
pub const PROBLEM_FILE: &str = "problem.json";

/// Where a batch run wrote its results.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutcome {
    pub output_dir: PathBuf,
    pub files: Vec<PathBuf>,
    pub failed_tasks: Vec<String>,
}

/// The problem statement used when the caller gives none.
pub fn default_problem_statement(request: &ResearchRequest) -> String {
    format!(
        "difficulty finding or accessing {} {}",
        request.industry, request.product_type
    )
}

/// `./data/<first word of the idea>_<YYYYmmdd_HHMMSS>`.
pub fn default_output_dir(business_idea: &str, now: DateTime<Local>) -> PathBuf {
    let slug = business_idea
        .split_whitespace()
        .next()
        .unwrap_or("research")
        .to_lowercase();
    PathBuf::from("data").join(format!("{}_{}", slug, now.format("%Y%m%d_%H%M%S")))
}

/// Run market sizing, competition and problem validation concurrently and
/// write `inputs.json`, `market_data.json`, `competition.json` and
/// `problem.json` into `output_dir`.
pub async fn save_research_data(
    engine: Arc<ResearchEngine>,
    mut request: ResearchRequest,
    output_dir: Option<PathBuf>,
) -> Result<BatchOutcome, ResearchError> {
    if request.problem().trim().is_empty() {
        let problem = default_problem_statement(&request);
        info!(problem = %problem, "Using default problem statement");
        request.problem_statement = Some(problem);
    }
    let output_dir = output_dir.unwrap_or_else(|| {
        let dir = default_output_dir(&request.business_idea, Local::now());
        warn!(dir = %dir.display(), "No output directory given, using default");
        dir
    });
    std::fs::create_dir_all(&output_dir)?;

    let started = Instant::now();
    let market = tokio::spawn({
        let (engine, request) = (Arc::clone(&engine), request.clone());
        async move { engine.research_market_size(&request).await }
    });
    let competition = tokio::spawn({
        let (engine, request) = (Arc::clone(&engine), request.clone());
        async move { engine.analyze_competition(&request).await }
    });
    let problem = tokio::spawn({
        let (engine, request) = (Arc::clone(&engine), request.clone());
        async move { engine.validate_problem(&request).await }
    });
    let (market, competition, problem) = tokio::join!(market, competition, problem);
    info!(elapsed_secs = started.elapsed().as_secs_f64(), "Batch research finished");

    let mut failed_tasks = Vec::new();
    let market = task_output("market_sizing", market, &mut failed_tasks);
    let competition = task_output("competitive_analysis", competition, &mut failed_tasks);
    let problem = task_output("problem_validation", problem, &mut failed_tasks);

    let inputs = json!({
        "business_idea": request.business_idea,
        "industry": request.industry,
        "product_type": request.product_type,
        "problem_statement": request.problem_statement,
        "timestamp": Local::now().to_rfc3339(),
        "failed_tasks": failed_tasks,
    });

    let mut files = Vec::new();
    for (name, value) in [
        (INPUTS_FILE, &inputs),
        (MARKET_FILE, &market),
        (COMPETITION_FILE, &competition),
        (PROBLEM_FILE, &problem),
    ] {
        files.push(write(&output_dir, name, value)?);
    }
    info!(dir = %output_dir.display(), failed = failed_tasks.len(), "Research data saved");

    Ok(BatchOutcome {
        output_dir,
        files,
        failed_tasks,
    })
}

/// The JSON to save for one task, recording it as failed when it errored.
fn task_output<R: Serialize>(
    name: &str,
    joined: Result<ResearchEnvelope<R>, JoinError>,
    failed_tasks: &mut Vec<String>,
) -> Value {
    match joined {
        Ok(envelope) => {
            if envelope.is_error() {
                warn!(task = name, error = ?envelope.error, "Research task returned an error");
                failed_tasks.push(name.to_string());
            }
            serde_json::to_value(&envelope).unwrap_or_else(|e| json!({"error": e.to_string()}))
        }
        Err(e) => {
            error!(task = name, error = %e, "Research task aborted");
            failed_tasks.push(name.to_string());
            json!({"error": e.to_string()})
        }
    }
}

fn write(dir: &Path, name: &str, value: &Value) -> Result<PathBuf, ResearchError> {
    let path = dir.join(name);
    persistence::atomic_write_json(&path, value)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_problem_statement() {
        let request = ResearchRequest::new("Dog walking app", "Pet Services", "Mobile App");
        assert_eq!(
            default_problem_statement(&request),
            "difficulty finding or accessing Pet Services Mobile App"
        );
    }

    #[test]
    fn test_default_output_dir_uses_first_word_and_timestamp() {
        let now = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(
            default_output_dir("Dog walking app", now),
            PathBuf::from("data").join("dog_20240309_140507")
        );
    }
}
