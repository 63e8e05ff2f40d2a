//! 评审结论解析
//!
//! 先取 ```json 代码块，其次任意代码块，否则整段文本；JSON 解析失败时走关键词启发式，结果总是三种 Decision 之一。

use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

use crate::review::{Decision, ReviewVerdict, VerdictSource};

#[derive(Error, Debug, PartialEq)]
pub enum ReviewParseError {
    #[error("invalid review JSON: {0}")]
    Json(String),

    #[error("unknown decision '{0}'")]
    UnknownDecision(String),
}

#[derive(Deserialize)]
struct ReviewPayload {
    decision: Option<String>,
    feedback: Option<String>,
    #[serde(default)]
    suggestions: Vec<String>,
    reasoning: Option<String>,
}

const HEURISTIC_FEEDBACK: &str = "Review parsing failed, but content seems acceptable";

fn fence_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```(json)?[^\n]*\n?(.*?)```").ok())
        .as_ref()
}

/// 提取 JSON 载荷：优先 ```json，其次第一个代码块
pub fn extract_payload(text: &str) -> &str {
    let Some(re) = fence_regex() else {
        return text.trim();
    };
    let mut first: Option<&str> = None;
    for caps in re.captures_iter(text) {
        let body = caps.get(2).map(|m| m.as_str().trim()).unwrap_or("");
        if caps.get(1).is_some() {
            return body;
        }
        first.get_or_insert(body);
    }
    first.unwrap_or_else(|| text.trim())
}

/// 严格解析；缺少 decision 时视为 approve
pub fn parse_strict(text: &str) -> Result<ReviewVerdict, ReviewParseError> {
    let payload: ReviewPayload = serde_json::from_str(extract_payload(text))
        .map_err(|e| ReviewParseError::Json(e.to_string()))?;
    let decision = match payload.decision.as_deref() {
        None => Decision::Approve,
        Some(raw) => {
            Decision::parse(raw).ok_or_else(|| ReviewParseError::UnknownDecision(raw.to_string()))?
        }
    };
    Ok(ReviewVerdict {
        decision,
        feedback: payload
            .feedback
            .unwrap_or_else(|| "No specific feedback provided".to_string()),
        suggestions: payload.suggestions,
        reasoning: payload.reasoning,
        source: VerdictSource::Parsed,
    })
}

/// 关键词启发式
pub fn heuristic_decision(text: &str) -> Decision {
    let lower = text.to_lowercase();
    let has_any = |words: &[&str]| words.iter().any(|w| lower.contains(w));
    if has_any(&["reject", "major", "revision", "significant"]) {
        Decision::NeedsMajorRevision
    } else if has_any(&["change", "improve", "fix", "should"]) {
        Decision::RequestChanges
    } else {
        Decision::Approve
    }
}

/// 解析评审回复，失败时回退到启发式（记录 warn）
pub fn parse_verdict(text: &str) -> ReviewVerdict {
    match parse_strict(text) {
        Ok(verdict) => verdict,
        Err(e) => {
            let decision = heuristic_decision(text);
            tracing::warn!(error = %e, decision = %decision, "Review payload unparseable, using keyword heuristic");
            tracing::debug!(content = %text, "Unparsed review content");
            ReviewVerdict {
                decision,
                feedback: HEURISTIC_FEEDBACK.to_string(),
                suggestions: Vec::new(),
                reasoning: None,
                source: VerdictSource::Heuristic,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_fenced_json() {
        let text = "Here is my review:\n```json\n{\"decision\": \"request_changes\", \"feedback\": \"Add tests\", \"suggestions\": [\"Cover errors\"], \"reasoning\": \"r\"}\n```\nThanks";
        let v = parse_verdict(text);
        assert_eq!(v.decision, Decision::RequestChanges);
        assert_eq!(v.feedback, "Add tests");
        assert_eq!(v.suggestions, vec!["Cover errors".to_string()]);
        assert_eq!(v.source, VerdictSource::Parsed);
    }

    #[test]
    fn test_parses_bare_and_plain_fence() {
        let v = parse_verdict(r#"{"decision": "APPROVE", "feedback": "ok"}"#);
        assert_eq!(v.decision, Decision::Approve);
        let v = parse_verdict("```\n{\"decision\": \"needs_major_revision\"}\n```");
        assert_eq!(v.decision, Decision::NeedsMajorRevision);
        assert_eq!(v.feedback, "No specific feedback provided");
    }

    #[test]
    fn test_missing_decision_defaults_to_approve() {
        let v = parse_verdict(r#"{"feedback": "fine"}"#);
        assert_eq!(v.decision, Decision::Approve);
        assert_eq!(v.source, VerdictSource::Parsed);
    }

    #[test]
    fn test_malformed_payload_with_major_needs_revision() {
        let v = parse_verdict("This has a major design flaw in the auth layer.");
        assert_eq!(v.decision, Decision::NeedsMajorRevision);
        assert_eq!(v.source, VerdictSource::Heuristic);
    }

    #[test]
    fn test_heuristic_ordering() {
        assert_eq!(heuristic_decision("You should rename this"), Decision::RequestChanges);
        assert_eq!(heuristic_decision("Looks good to me"), Decision::Approve);
        let v = parse_verdict(r#"{"decision": "maybe"}"#);
        assert_eq!(v.source, VerdictSource::Heuristic);
    }
}
