//! Rule-based heart risk scorer.
//!
//! A pure function of the test variant and the submitted form. Fields that
//! are missing or do not parse simply do not fire their rule.

use medisage_types::{AssessmentForm, RiskLabel, RiskScore, TestVariant};
use serde_json::Value;

pub const HIGH_THRESHOLD: i32 = 10;
pub const MODERATE_THRESHOLD: i32 = 5;

/// Form field names for one questionnaire.
struct FieldNames {
    age: &'static str,
    chest_pain: &'static str,
    resting_bp: &'static str,
    cholesterol: &'static str,
    fasting_sugar: &'static str,
    resting_ecg: &'static str,
    max_heart_rate: &'static str,
    exercise_angina: &'static str,
    st_depression: &'static str,
    major_vessels: &'static str,
    /// Resting ECG code that counts as abnormal.
    abnormal_ecg: i64,
}

const HEART_TEST_1: FieldNames = FieldNames {
    age: "age",
    chest_pain: "cp",
    resting_bp: "trestbps",
    cholesterol: "chol",
    fasting_sugar: "fbs",
    resting_ecg: "restecg",
    max_heart_rate: "thalach",
    exercise_angina: "exang",
    st_depression: "oldpeak",
    major_vessels: "ca",
    abnormal_ecg: 2,
};

const HEART_TEST_2: FieldNames = FieldNames {
    age: "age",
    chest_pain: "chestpain",
    resting_bp: "restingBP",
    cholesterol: "serumcholestrol",
    fasting_sugar: "fastingbloodsugar",
    resting_ecg: "restingrelectro",
    max_heart_rate: "maxheartrate",
    exercise_angina: "exerciseangia",
    st_depression: "oldpeak",
    major_vessels: "noofmajorvessels",
    abnormal_ecg: 1,
};

fn fields_for(variant: TestVariant) -> &'static FieldNames {
    match variant {
        TestVariant::HeartTest1 => &HEART_TEST_1,
        TestVariant::HeartTest2 => &HEART_TEST_2,
    }
}

/// Map a score onto its label.
pub fn label_for(score: i32) -> RiskLabel {
    if score >= HIGH_THRESHOLD {
        RiskLabel::High
    } else if score >= MODERATE_THRESHOLD {
        RiskLabel::Moderate
    } else {
        RiskLabel::Low
    }
}

/// Score a form for the given variant.
pub fn score(variant: TestVariant, form: &AssessmentForm) -> RiskScore {
    let f = fields_for(variant);
    let int = |name: &str| form.get(name).and_then(as_int);
    let mut total = 0;

    total += match int(f.age) {
        Some(age) if age > 60 => 3,
        Some(age) if age > 45 => 2,
        Some(age) if age > 30 => 1,
        _ => 0,
    };

    if matches!(int(f.chest_pain), Some(2 | 3)) {
        total += 2;
    }
    if int(f.resting_bp).is_some_and(|bp| bp > 140) {
        total += 2;
    }
    if int(f.cholesterol).is_some_and(|chol| chol > 240) {
        total += 2;
    }
    if form.get(f.fasting_sugar).is_some_and(is_set) {
        total += 1;
    }
    if int(f.resting_ecg) == Some(f.abnormal_ecg) {
        total += 1;
    }
    if int(f.max_heart_rate).is_some_and(|rate| rate < 120) {
        total += 2;
    }
    if form.get(f.exercise_angina).is_some_and(is_set) {
        total += 2;
    }
    if form
        .get(f.st_depression)
        .and_then(as_float)
        .is_some_and(|st| st > 2.0)
    {
        total += 2;
    }

    total += match int(f.major_vessels) {
        Some(3) => 3,
        Some(2) => 2,
        Some(1) => 1,
        _ => 0,
    };

    RiskScore {
        score: total,
        risk_label: label_for(total),
    }
}

/// Leading integer of a number or numeric string (`"65.7"` reads as 65).
fn as_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => {
            let s = s.trim();
            let sign_len = usize::from(s.starts_with(['-', '+']));
            let digits = s[sign_len..]
                .bytes()
                .take_while(u8::is_ascii_digit)
                .count();
            if digits == 0 {
                return None;
            }
            s[..sign_len + digits].parse().ok()
        }
        _ => None,
    }
}

fn as_float(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let s = s.trim();
            s[..float_prefix_len(s)].parse::<f64>().ok().filter(|f| f.is_finite())
        }
        _ => None,
    }
}

/// Length of the leading `[+-]digits[.digits][e[+-]digits]` run.
fn float_prefix_len(s: &str) -> usize {
    let bytes = s.as_bytes();
    let digits_from = |start: usize| {
        start
            + bytes[start..]
                .iter()
                .take_while(|b| b.is_ascii_digit())
                .count()
    };

    let mut end = usize::from(s.starts_with(['-', '+']));
    let int_end = digits_from(end);
    let mut mantissa_digits = int_end - end;
    end = int_end;
    if bytes.get(end) == Some(&b'.') {
        let frac_end = digits_from(end + 1);
        mantissa_digits += frac_end - end - 1;
        if mantissa_digits > 0 {
            end = frac_end;
        }
    }
    if mantissa_digits == 0 {
        return 0;
    }

    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exp = end + 1;
        if matches!(bytes.get(exp), Some(b'-' | b'+')) {
            exp += 1;
        }
        let exp_end = digits_from(exp);
        if exp_end > exp {
            end = exp_end;
        }
    }
    end
}

/// Flag fields fire on `"1"`, `1`, or `true`.
fn is_set(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_i64() == Some(1),
        Value::String(s) => s.trim() == "1",
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn form(value: Value) -> AssessmentForm {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_high_risk_golden_value() {
        let f = form(json!({
            "age": 65, "cp": 3, "trestbps": 150, "chol": 250, "fbs": "1",
            "restecg": "2", "thalach": 100, "exang": "1", "oldpeak": 3.0, "ca": "3"
        }));
        let result = score(TestVariant::HeartTest1, &f);
        assert_eq!(result.score, 20);
        assert_eq!(result.risk_label, RiskLabel::High);
    }

    #[test]
    fn test_empty_form_is_low() {
        let result = score(TestVariant::HeartTest1, &AssessmentForm::new());
        assert_eq!(result.score, 0);
        assert_eq!(result.risk_label, RiskLabel::Low);

        let result = score(TestVariant::HeartTest2, &AssessmentForm::new());
        assert_eq!(result.score, 0);
    }

    #[test]
    fn test_age_buckets() {
        let age = |a: Value| score(TestVariant::HeartTest1, &form(json!({ "age": a }))).score;
        assert_eq!(age(json!(30)), 0);
        assert_eq!(age(json!(31)), 1);
        assert_eq!(age(json!("45")), 1);
        assert_eq!(age(json!(46)), 2);
        assert_eq!(age(json!(60)), 2);
        assert_eq!(age(json!("61")), 3);
        assert_eq!(age(json!("sixty")), 0);
    }

    #[test]
    fn test_variant_two_field_names() {
        let f = form(json!({
            "age": "50", "chestpain": "2", "restingBP": "145", "serumcholestrol": "260",
            "fastingbloodsugar": "1", "restingrelectro": "1", "maxheartrate": "110",
            "exerciseangia": "1", "oldpeak": "2.5", "noofmajorvessels": "1"
        }));
        let result = score(TestVariant::HeartTest2, &f);
        assert_eq!(result.score, 2 + 2 + 2 + 2 + 1 + 1 + 2 + 2 + 2 + 1);
        assert_eq!(result.risk_label, RiskLabel::High);

        // Same answers under variant-one names score nothing beyond age and oldpeak.
        let result = score(TestVariant::HeartTest1, &f);
        assert_eq!(result.score, 2 + 2);
    }

    #[test]
    fn test_ecg_code_is_variant_specific() {
        let ecg1 = form(json!({"restecg": "1"}));
        assert_eq!(score(TestVariant::HeartTest1, &ecg1).score, 0);
        let ecg2 = form(json!({"restecg": "2"}));
        assert_eq!(score(TestVariant::HeartTest1, &ecg2).score, 1);
    }

    #[test]
    fn test_thresholds() {
        assert_eq!(label_for(4), RiskLabel::Low);
        assert_eq!(label_for(5), RiskLabel::Moderate);
        assert_eq!(label_for(9), RiskLabel::Moderate);
        assert_eq!(label_for(10), RiskLabel::High);
    }

    #[test]
    fn test_oldpeak_with_unit_suffix() {
        let st = |v: Value| score(TestVariant::HeartTest2, &form(json!({ "oldpeak": v }))).score;
        assert_eq!(st(json!("2.5 mm")), 2);
        assert_eq!(st(json!("2.5 mm")), st(json!(2.5)));
        assert_eq!(st(json!("1.5mm")), 0);
    }

    #[test]
    fn test_unparseable_fields_do_not_fire() {
        let f = form(json!({
            "age": null, "cp": "two", "trestbps": [150], "chol": {}, "fbs": "yes",
            "thalach": "", "exang": 0, "oldpeak": "NaN", "ca": "4"
        }));
        assert_eq!(score(TestVariant::HeartTest1, &f).score, 0);
    }

    #[test]
    fn test_value_readers() {
        assert_eq!(as_int(&json!("65.7")), Some(65));
        assert_eq!(as_int(&json!(" 42 ")), Some(42));
        assert_eq!(as_int(&json!("-3")), Some(-3));
        assert_eq!(as_int(&json!(61.9)), Some(61));
        assert_eq!(as_int(&json!("x1")), None);
        assert_eq!(as_float(&json!("2.5 mm")), Some(2.5));
        assert_eq!(as_float(&json!(" 3.")), Some(3.0));
        assert_eq!(as_float(&json!(".5")), Some(0.5));
        assert_eq!(as_float(&json!("1e1x")), Some(10.0));
        assert_eq!(as_float(&json!("2e")), Some(2.0));
        assert_eq!(as_float(&json!("-1.5")), Some(-1.5));
        assert_eq!(as_float(&json!(".")), None);
        assert_eq!(as_float(&json!("NaN")), None);
        assert_eq!(as_float(&json!("mm 2.5")), None);
        assert!(is_set(&json!(true)));
        assert!(is_set(&json!(1)));
        assert!(!is_set(&json!("0")));
    }

    proptest! {
        #[test]
        fn scoring_is_deterministic(
            age in 0i64..100,
            cp in 0i64..4,
            bp in 80i64..200,
            ca in 0i64..4,
            oldpeak in 0.0f64..6.0,
        ) {
            let f = form(json!({
                "age": age.to_string(), "cp": cp.to_string(), "trestbps": bp,
                "ca": ca.to_string(), "oldpeak": oldpeak
            }));
            let first = score(TestVariant::HeartTest1, &f);
            let second = score(TestVariant::HeartTest1, &f);
            prop_assert_eq!(first, second);
            prop_assert!(first.score >= 0 && first.score <= 12);
            prop_assert_eq!(first.risk_label, label_for(first.score));
        }
    }
}
