use std::fmt::Write;

use crate::models::{PredictionReport, SubjectPrediction};

pub fn format_prediction(prediction: &SubjectPrediction) -> String {
    let mut output = String::new();

    let _ = writeln!(
        output,
        "{} ({}): {:.1}% success, {} risk [{}]",
        prediction.subject_name,
        prediction.subject_code,
        prediction.success_probability * 100.0,
        prediction.risk_level,
        prediction.prediction_method
    );
    let _ = writeln!(
        output,
        "  weighted prerequisite GPA {:.2}, rule-based {:.1}%",
        prediction.weighted_prereq_gpa,
        prediction.rule_probability * 100.0
    );

    if let (Some(probability), Some(confidence)) =
        (prediction.ml_probability, prediction.ml_confidence)
    {
        let _ = writeln!(
            output,
            "  model {:.1}% (confidence {:.0}%)",
            probability * 100.0,
            confidence * 100.0
        );
    }

    if let Some(factors) = &prediction.top_factors {
        let labels: Vec<&str> = factors.iter().map(|factor| factor.label.as_str()).collect();
        if !labels.is_empty() {
            let _ = writeln!(output, "  top factors: {}", labels.join(", "));
        }
    }

    let _ = writeln!(output, "  {}", prediction.explanation);
    let _ = writeln!(output, "  {}", prediction.recommendation);
    output
}

pub fn build_report(report: &PredictionReport) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Subject Success Forecast");
    let _ = writeln!(
        output,
        "Generated for student {} (current GPA {:.2})",
        report.student_id, report.current_gpa
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Recommended Order");

    for (position, code) in report.recommended_order.iter().enumerate() {
        let probability = report
            .predictions
            .iter()
            .find(|prediction| &prediction.subject_code == code)
            .map_or(0.0, |prediction| prediction.success_probability);
        let _ = writeln!(
            output,
            "{}. {} ({:.1}% success)",
            position + 1,
            code,
            probability * 100.0
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## High Risk Subjects");

    if report.high_risk_subjects.is_empty() {
        let _ = writeln!(output, "No high risk subjects in this plan.");
    } else {
        for code in &report.high_risk_subjects {
            let _ = writeln!(output, "- {code}");
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Subject Detail");

    for prediction in &report.predictions {
        let _ = writeln!(output);
        let _ = writeln!(
            output,
            "### {} ({})",
            prediction.subject_name, prediction.subject_code
        );
        let _ = writeln!(
            output,
            "- Success probability: {:.1}% ({} risk, {})",
            prediction.success_probability * 100.0,
            prediction.risk_level,
            prediction.prediction_method
        );
        let _ = writeln!(
            output,
            "- Weighted prerequisite GPA: {:.2}",
            prediction.weighted_prereq_gpa
        );
        if let Some(pass_rate) = prediction.cohort_pass_rate {
            let _ = writeln!(output, "- Cohort pass rate: {:.1}%", pass_rate * 100.0);
        }
        if !prediction.missing_prereqs.is_empty() {
            let _ = writeln!(
                output,
                "- Missing prerequisites: {}",
                prediction.missing_prereqs.join(", ")
            );
        }
        if let Some(factors) = &prediction.top_factors {
            for factor in factors {
                let _ = writeln!(output, "- Factor: {} ({:.3})", factor.label, factor.contribution);
            }
        }
        let _ = writeln!(output, "- {}", prediction.recommendation);
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PredictionMethod, RiskLevel, TopFactor};

    fn prediction(code: &str, probability: f64, risk_level: RiskLevel) -> SubjectPrediction {
        SubjectPrediction {
            subject_code: code.to_string(),
            subject_name: format!("{code} name"),
            risk_level,
            success_probability: probability,
            rule_probability: probability,
            weighted_prereq_gpa: 2.4,
            prereq_performance: Vec::new(),
            missing_prereqs: vec!["CSC1024".to_string()],
            cohort_pass_rate: Some(0.64),
            cohort_avg_score: None,
            ml_probability: Some(0.55),
            ml_confidence: Some(0.1),
            top_factors: Some(vec![TopFactor {
                label: "Current GPA".to_string(),
                contribution: 0.9,
            }]),
            explanation: "Weighted prerequisite GPA 2.40.".to_string(),
            recommendation: "Plan extra study time.".to_string(),
            prediction_method: PredictionMethod::Hybrid,
        }
    }

    #[test]
    fn report_lists_order_and_high_risk() {
        let report = PredictionReport {
            student_id: 42,
            current_gpa: 2.85,
            predictions: vec![
                prediction("PRG2104", 0.81, RiskLevel::Low),
                prediction("CSC3206", 0.35, RiskLevel::VeryHigh),
            ],
            high_risk_subjects: vec!["CSC3206".to_string()],
            recommended_order: vec!["PRG2104".to_string(), "CSC3206".to_string()],
        };
        let output = build_report(&report);

        assert!(output.contains("student 42 (current GPA 2.85)"));
        assert!(output.contains("1. PRG2104 (81.0% success)"));
        assert!(output.contains("2. CSC3206 (35.0% success)"));
        assert!(output.contains("- CSC3206\n"));
        assert!(output.contains("very_high risk, hybrid"));
        assert!(output.contains("Missing prerequisites: CSC1024"));
    }

    #[test]
    fn single_prediction_mentions_model_output() {
        let output = format_prediction(&prediction("PRG2104", 0.6, RiskLevel::Medium));
        assert!(output.contains("60.0% success, medium risk [hybrid]"));
        assert!(output.contains("model 55.0% (confidence 10%)"));
        assert!(output.contains("top factors: Current GPA"));
    }
}
