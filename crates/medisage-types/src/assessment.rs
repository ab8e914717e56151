//! Risk assessment types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Structured form input, kept as the client submitted it.
pub type AssessmentForm = Map<String, Value>;

/// The supported heart assessment questionnaires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TestVariant {
    #[serde(rename = "heart-test-1")]
    HeartTest1,
    #[serde(rename = "heart-test-2")]
    HeartTest2,
}

impl TestVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestVariant::HeartTest1 => "heart-test-1",
            TestVariant::HeartTest2 => "heart-test-2",
        }
    }
}

impl std::fmt::Display for TestVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TestVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "heart-test-1" | "test-1" | "variant1" => Ok(TestVariant::HeartTest1),
            "heart-test-2" | "test-2" | "variant2" => Ok(TestVariant::HeartTest2),
            other => Err(format!("unsupported test variant: '{}'", other)),
        }
    }
}

/// Categorical risk derived from a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskLabel {
    Low,
    Moderate,
    High,
}

impl RiskLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLabel::Low => "Low",
            RiskLabel::Moderate => "Moderate",
            RiskLabel::High => "High",
        }
    }
}

impl std::str::FromStr for RiskLabel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Low" => Ok(RiskLabel::Low),
            "Moderate" => Ok(RiskLabel::Moderate),
            "High" => Ok(RiskLabel::High),
            other => Err(format!("unknown risk label: {}", other)),
        }
    }
}

/// Output of the rule-based scorer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskScore {
    pub score: i32,
    pub risk_label: RiskLabel,
}

/// A scored form submission. Written once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskAssessmentRecord {
    pub test_id: Uuid,
    pub owner_id: String,
    pub test_variant: TestVariant,
    pub input_form: AssessmentForm,
    pub score: i32,
    pub risk_label: RiskLabel,
    pub created_at: DateTime<Utc>,
}
