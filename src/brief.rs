//! The analysis brief: the minimal input that kicks off a pipeline run.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Brief {
    pub segment: String,
    pub product: String,
    pub audience: String,
    /// Free-text framing for what the run should emphasize; absent when
    /// the caller just wants the default, unguided analysis.
    pub objective: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn brief_round_trips_through_json() {
        let brief = Brief {
            segment: "fintech".into(),
            product: "budgeting app".into(),
            audience: "gen z".into(),
            objective: Some("assess churn risk".into()),
        };
        let json = serde_json::to_string(&brief).unwrap();
        let back: Brief = serde_json::from_str(&json).unwrap();
        assert_eq!(back.segment, brief.segment);
        assert_eq!(back.objective.as_deref(), Some("assess churn risk"));
    }
}
