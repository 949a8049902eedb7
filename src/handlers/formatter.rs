//! Results Formatter step handler, per §4.7 step 4: assembles the Plan Executor's
//! accumulated step output into a single artifact. Chunking (§4.8) is decided afterward by
//! the Chunked Result Streamer, not here — this handler only classifies the shape of the
//! data and emits headers.

use serde_json::Value;

use super::{HandlerOutcome, HandlerResult};
use crate::models::{Artifact, DisplayType};

/// Headers for a uniform array of JSON objects, taken from the first row's key order.
fn table_headers(rows: &[Value]) -> Option<Vec<String>> {
    let first = rows.first()?.as_object()?;
    Some(first.keys().cloned().collect())
}

fn is_uniform_object_array(rows: &[Value]) -> bool {
    !rows.is_empty() && rows.iter().all(|r| r.is_object())
}

/// Merge every data step's output rows into one artifact.
pub async fn run(rows: Vec<Value>) -> HandlerResult {
    let (display_type, headers) = if is_uniform_object_array(&rows) {
        (DisplayType::Table, table_headers(&rows))
    } else if rows.is_empty() {
        (DisplayType::Json, None)
    } else {
        (DisplayType::Json, None)
    };

    let record_count = rows.len() as u64;
    let content = Value::Array(rows.clone());

    let artifact = Artifact {
        display_type,
        content,
        headers: headers.unwrap_or_default(),
    };

    let mut outcome = HandlerOutcome::artifact(artifact);
    outcome.rows = rows;
    outcome.record_count = record_count;
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn uniform_objects_produce_table_with_headers() {
        let rows = vec![json!({"id": 1, "name": "a"}), json!({"id": 2, "name": "b"})];
        let outcome = run(rows).await.unwrap();
        let artifact = outcome.artifact.unwrap();
        assert_eq!(artifact.display_type, DisplayType::Table);
        assert_eq!(artifact.headers, vec!["id".to_string(), "name".to_string()]);
    }

    #[tokio::test]
    async fn empty_rows_produce_json_with_no_headers() {
        let outcome = run(Vec::new()).await.unwrap();
        let artifact = outcome.artifact.unwrap();
        assert_eq!(artifact.display_type, DisplayType::Json);
        assert!(artifact.headers.is_empty());
    }
}
