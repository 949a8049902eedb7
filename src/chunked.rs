//! Chunked Result Streamer, per §4.8: splits a large tabular result across `METADATA` + N
//! `BATCH` events + a terminal `COMPLETE`; small or non-tabular results go out as a single
//! inline `COMPLETE`.

use std::sync::Arc;

use serde_json::Value;

use crate::bus::EventBus;
use crate::models::{Artifact, DisplayType, ExecutionEvent, Plan};

/// Stream `artifact` onto `bus`, chunking it if it is a table at or past `batch_threshold`.
pub async fn stream_result(
    bus: &Arc<EventBus>,
    artifact: &Artifact,
    batch_size: usize,
    batch_threshold: usize,
    plan: Option<&Plan>,
) {
    let rows = match &artifact.content {
        Value::Array(rows) => rows.clone(),
        _ => Vec::new(),
    };

    let should_chunk =
        artifact.display_type == DisplayType::Table && rows.len() >= batch_threshold;

    if !should_chunk {
        bus.publish(ExecutionEvent::Complete {
            display_type: wire_display_type(artifact.display_type),
            content: artifact.content.clone(),
            results: None,
            headers: Some(artifact.headers.clone()),
            count: Some(rows.len() as u64),
            metadata: None,
        })
        .await;
        return;
    }

    let total_records = rows.len();
    let batch_size = batch_size.max(1);
    let total_batches = total_records.div_ceil(batch_size);

    bus.publish(ExecutionEvent::Metadata {
        display_type: wire_display_type(artifact.display_type),
        total_records: total_records as u64,
        total_batches: total_batches as u64,
        headers: Some(artifact.headers.clone()),
        execution_plan: plan.cloned(),
    })
    .await;

    for (i, chunk) in rows.chunks(batch_size).enumerate() {
        let batch_number = (i + 1) as u64;
        bus.publish(ExecutionEvent::Batch {
            batch_number,
            total_batches: total_batches as u64,
            results: chunk.to_vec(),
            is_final: batch_number == total_batches as u64,
        })
        .await;
    }

    bus.publish(ExecutionEvent::Complete {
        display_type: wire_display_type(artifact.display_type),
        content: Value::Array(Vec::new()),
        results: None,
        headers: None,
        count: None,
        metadata: Some(serde_json::json!({ "chunked": true })),
    })
    .await;
}

fn wire_display_type(display_type: DisplayType) -> String {
    match display_type {
        DisplayType::Table => "table",
        DisplayType::Markdown => "markdown",
        DisplayType::Text => "text",
        DisplayType::Json => "json",
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn drain(bus: &Arc<EventBus>) -> Vec<ExecutionEvent> {
        let mut sub = bus.subscribe();
        let mut events = Vec::new();
        while let Some(event) = sub.recv().await {
            let is_terminal = matches!(event, ExecutionEvent::Complete { .. });
            events.push(event);
            if is_terminal {
                break;
            }
        }
        events
    }

    #[tokio::test]
    async fn small_table_emits_single_complete_no_batches() {
        let bus = Arc::new(EventBus::new(16));
        let rows: Vec<Value> = (0..5).map(|i| json!({"id": i})).collect();
        let artifact = Artifact {
            display_type: DisplayType::Table,
            content: Value::Array(rows),
            headers: vec!["id".into()],
        };
        let events = drain(&bus);
        stream_result(&bus, &artifact, 500, 500, None).await;
        let events = events.await;
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], ExecutionEvent::Complete { .. }));
    }

    #[tokio::test]
    async fn large_table_chunks_with_metadata_and_final_batch() {
        let bus = Arc::new(EventBus::new(64));
        let rows: Vec<Value> = (0..1250).map(|i| json!({"id": i})).collect();
        let artifact = Artifact {
            display_type: DisplayType::Table,
            content: Value::Array(rows),
            headers: vec!["id".into()],
        };

        let events_fut = drain(&bus);
        stream_result(&bus, &artifact, 500, 500, None).await;
        let events = events_fut.await;

        assert!(matches!(events[0], ExecutionEvent::Metadata { total_batches: 3, .. }));
        let batches: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, ExecutionEvent::Batch { .. }))
            .collect();
        assert_eq!(batches.len(), 3);
        let total_rows: usize = batches
            .iter()
            .map(|e| match e {
                ExecutionEvent::Batch { results, .. } => results.len(),
                _ => 0,
            })
            .sum();
        assert_eq!(total_rows, 1250);
        assert!(matches!(events.last().unwrap(), ExecutionEvent::Complete { .. }));
        let is_final_flags: Vec<bool> = batches
            .iter()
            .map(|e| match e {
                ExecutionEvent::Batch { is_final, .. } => *is_final,
                _ => false,
            })
            .collect();
        assert_eq!(is_final_flags, vec![false, false, true]);
    }
}
