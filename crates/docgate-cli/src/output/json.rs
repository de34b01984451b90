//! JSON output formatter

use anyhow::Result;
use docgate_core::AnswerEnvelope;

/// The envelope exactly as API callers receive it
pub fn format_answer(envelope: &AnswerEnvelope) -> Result<String> {
    Ok(serde_json::to_string_pretty(envelope)? + "\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use docgate_core::AnswerStatus;

    #[test]
    fn test_status_is_snake_case() {
        let envelope = AnswerEnvelope::message(AnswerStatus::NoContext, "nothing");
        let output = format_answer(&envelope).unwrap();
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["status"], "no_context");
        assert!(value.get("correlation_id").is_none());
        assert_eq!(value["sources"].as_array().unwrap().len(), 0);
    }
}
