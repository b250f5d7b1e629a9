//! Distraction verdicts and classifier-response normalization.
//!
//! Vision models rarely return exactly the JSON they were asked for.  They
//! wrap it in Markdown fences, add a sentence of prose, quote numbers, or
//! score outside the requested range.  [`normalize`] turns whatever came
//! back into a [`DistractionVerdict`] and never fails.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Upper bound of the productivity and goal-relevance scores.
pub const MAX_SCORE: u8 = 10;

/// The classifier's judgement of a single screenshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistractionVerdict {
    pub is_distracted: bool,
    pub description: String,
    /// 0 to [`MAX_SCORE`].
    pub productivity_score: u8,
    /// 0 to [`MAX_SCORE`].
    pub goal_relevance: u8,
    /// `false` when the response was not a JSON object and this verdict is
    /// the conservative fallback.
    pub parsed: bool,
}

impl DistractionVerdict {
    /// A parsed verdict with no distraction and zeroed scores.
    pub fn focused(description: impl Into<String>) -> Self {
        Self {
            is_distracted: false,
            description: description.into(),
            productivity_score: 0,
            goal_relevance: 0,
            parsed: true,
        }
    }

    /// A parsed verdict flagging a distraction.
    pub fn distracted(description: impl Into<String>) -> Self {
        Self {
            is_distracted: true,
            ..Self::focused(description)
        }
    }

    fn unparsed(raw: &str) -> Self {
        Self {
            is_distracted: false,
            description: raw.trim().to_owned(),
            productivity_score: 0,
            goal_relevance: 0,
            parsed: false,
        }
    }
}

/// The instruction sent alongside each screenshot.
pub fn distraction_prompt(goal: &str) -> String {
    format!(
        "Analyze this screenshot in the context of the goal: {goal}\n\
         Respond with a single JSON object and nothing else, using this structure:\n\
         {{\n  \
           \"isDistracted\": boolean,\n  \
           \"distractionDescription\": string,\n  \
           \"productivityScore\": number,\n  \
           \"goalRelevance\": number\n\
         }}\n\
         isDistracted is whether the user is distracted from the goal. \
         distractionDescription describes what on screen indicates distraction or focus. \
         productivityScore and goalRelevance are integers from 0 to {MAX_SCORE}.\n\
         Be concise and objective, and base the judgement on visual cues."
    )
}

/// Normalize a raw classifier response into a verdict.
///
/// Anything that does not contain a JSON object becomes a non-distracted
/// verdict with `parsed == false` and the raw text as its description.
pub fn normalize(raw: &str) -> DistractionVerdict {
    let body = strip_code_fence(raw.trim());

    let Some(map) = parse_object(body) else {
        tracing::warn!(
            response_len = raw.len(),
            "classifier response is not a JSON object, treating as focused"
        );
        return DistractionVerdict::unparsed(raw);
    };

    DistractionVerdict {
        is_distracted: map.get("isDistracted").is_some_and(truthy),
        description: map
            .get("distractionDescription")
            .and_then(Value::as_str)
            .map(|s| s.trim().to_owned())
            .unwrap_or_default(),
        productivity_score: score(map.get("productivityScore")),
        goal_relevance: score(map.get("goalRelevance")),
        parsed: true,
    }
}

fn parse_object(body: &str) -> Option<Map<String, Value>> {
    if let Ok(Value::Object(map)) = serde_json::from_str(body) {
        return Some(map);
    }

    // Prose around an object: take the outermost braces.
    let start = body.find('{')?;
    let end = body.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str(&body[start..=end]) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

fn strip_code_fence(s: &str) -> &str {
    let Some(rest) = s.strip_prefix("```") else {
        return s;
    };
    // Drop the info string (`json`, `JSON`, ...) on the opening line.
    let rest = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

fn truthy(v: &Value) -> bool {
    match v {
        Value::Bool(b) => *b,
        Value::String(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "yes" | "1"),
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        _ => false,
    }
}

fn score(v: Option<&Value>) -> u8 {
    let n = match v {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    n.filter(|f| f.is_finite())
        .map(|f| f.round().clamp(0.0, f64::from(MAX_SCORE)) as u8)
        .unwrap_or(0)
}
