//! Prediction orchestrator: one history fetch, one snapshot, one classifier
//! batch, then rule analysis and fusion per subject.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::cache::StudentPerformanceCache;
use crate::catalog::PrerequisiteCatalog;
use crate::classifier::ModelArtifacts;
use crate::cohort::CohortStatsTable;
use crate::config::EngineConfig;
use crate::error::{PredictionError, Result};
use crate::features::{self, FeatureVector};
use crate::hybrid::{self, MlResult};
use crate::models::{
    CohortStat, PredictionReport, PrerequisiteChain, StudentHistory, SubjectPrediction,
    SubjectRecord,
};
use crate::rules;

pub trait HistoryProvider: Send + Sync {
    /// Chronologically ordered history, or `StudentNotFound`.
    fn history(&self, student_id: i64) -> Result<StudentHistory>;
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryHistory {
    students: HashMap<i64, StudentHistory>,
}

impl InMemoryHistory {
    pub fn new(students: HashMap<i64, StudentHistory>) -> Self {
        Self { students }
    }

    pub fn insert(&mut self, student_id: i64, history: StudentHistory) {
        self.students.insert(student_id, history);
    }

    pub fn len(&self) -> usize {
        self.students.len()
    }

    pub fn is_empty(&self) -> bool {
        self.students.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &SubjectRecord> {
        self.students.values().flat_map(|history| history.records.iter())
    }
}

impl HistoryProvider for InMemoryHistory {
    fn history(&self, student_id: i64) -> Result<StudentHistory> {
        self.students
            .get(&student_id)
            .cloned()
            .ok_or(PredictionError::StudentNotFound(student_id))
    }
}

/// Input order of subject codes, stably sorted by descending probability.
pub fn recommended_order(predictions: &[SubjectPrediction]) -> Vec<String> {
    let mut ranked: Vec<&SubjectPrediction> = predictions.iter().collect();
    ranked.sort_by(|a, b| b.success_probability.total_cmp(&a.success_probability));
    ranked
        .into_iter()
        .map(|prediction| prediction.subject_code.clone())
        .collect()
}

pub struct PredictionEngine<H> {
    history: H,
    catalog: PrerequisiteCatalog,
    cohort_stats: CohortStatsTable,
    artifacts: ModelArtifacts,
    cache: StudentPerformanceCache,
    config: EngineConfig,
}

impl<H: HistoryProvider> PredictionEngine<H> {
    pub fn new(
        history: H,
        catalog: PrerequisiteCatalog,
        cohort_stats: CohortStatsTable,
        artifacts: ModelArtifacts,
        cache: StudentPerformanceCache,
        config: EngineConfig,
    ) -> Self {
        Self {
            history,
            catalog,
            cohort_stats,
            artifacts,
            cache,
            config,
        }
    }

    pub fn cache(&self) -> &StudentPerformanceCache {
        &self.cache
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn ml_available(&self) -> bool {
        self.artifacts.classifier.is_available()
    }

    pub fn predict_one(&self, student_id: i64, subject_code: &str) -> Result<SubjectPrediction> {
        let report = self.predict_many(student_id, &[subject_code])?;
        report
            .predictions
            .into_iter()
            .next()
            .ok_or_else(|| PredictionError::InvalidRequest("no prediction produced".to_string()))
    }

    pub fn predict_many<S: AsRef<str>>(
        &self,
        student_id: i64,
        subject_codes: &[S],
    ) -> Result<PredictionReport> {
        if subject_codes.is_empty() {
            return Err(PredictionError::InvalidRequest(
                "no subject codes provided".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for code in subject_codes {
            if !seen.insert(code.as_ref()) {
                return Err(PredictionError::InvalidRequest(format!(
                    "subject {} requested more than once",
                    code.as_ref()
                )));
            }
        }

        let history = self.history.history(student_id)?;
        let snapshot = self.cache.get_or_compute(student_id, &history.records);

        let contexts: Vec<_> = subject_codes
            .iter()
            .map(|code| {
                features::build(
                    &snapshot,
                    &history.profile,
                    code.as_ref(),
                    &self.catalog,
                    &self.cohort_stats,
                    &self.artifacts.encoders,
                )
            })
            .collect();

        let vectors: Vec<FeatureVector> = contexts.iter().map(|context| context.vector).collect();
        let classifier = &self.artifacts.classifier;
        let ml_rows = classifier.predict_batch(&vectors);
        let importances = classifier.feature_importances();

        debug!(
            student_id,
            subjects = subject_codes.len(),
            ml = ml_rows.is_some(),
            "scored subject batch"
        );

        let predictions: Vec<SubjectPrediction> = contexts
            .iter()
            .enumerate()
            .map(|(index, context)| {
                let rule = rules::analyze(context, &self.config);
                let ml = match (&ml_rows, importances) {
                    (Some(rows), Some(importances)) => Some(MlResult {
                        probabilities: rows[index],
                        importances,
                    }),
                    _ => None,
                };
                hybrid::combine(context, ml, rule, &self.config)
            })
            .collect();

        let high_risk_subjects = predictions
            .iter()
            .filter(|prediction| prediction.risk_level.is_high())
            .map(|prediction| prediction.subject_code.clone())
            .collect();

        Ok(PredictionReport {
            student_id,
            current_gpa: snapshot.current_gpa,
            recommended_order: recommended_order(&predictions),
            high_risk_subjects,
            predictions,
        })
    }

    pub fn cohort_stat(&self, subject_code: &str) -> Result<&CohortStat> {
        self.cohort_stats
            .get(subject_code)
            .ok_or_else(|| PredictionError::SubjectNotFound(subject_code.to_string()))
    }

    pub fn cohort_stats(&self) -> &CohortStatsTable {
        &self.cohort_stats
    }

    pub fn prerequisite_chain(&self, subject_code: &str) -> Result<PrerequisiteChain> {
        if !self.catalog.contains(subject_code) && self.cohort_stats.get(subject_code).is_none() {
            return Err(PredictionError::SubjectNotFound(subject_code.to_string()));
        }
        Ok(self.catalog.chain(subject_code, |code| {
            self.cohort_stats
                .subject_name(code)
                .unwrap_or(code)
                .to_string()
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use chrono::NaiveDate;

    use super::*;
    use crate::catalog::default_catalog;
    use crate::classifier::tests::sample_adapter;
    use crate::classifier::{Classifier, ClassifierAdapter};
    use crate::features::{CategoricalEncoders, FEATURE_COUNT};
    use crate::models::{PredictionMethod, RiskLevel, StudentProfile};

    fn record(code: &str, grade: &str, month: u32) -> SubjectRecord {
        SubjectRecord {
            subject_code: code.to_string(),
            subject_name: format!("{code} name"),
            grade: grade.to_string(),
            overall_pct: Some(68.0),
            coursework_pct: Some(74.0),
            exam_date: NaiveDate::from_ymd_opt(2023, month, 15).expect("valid date"),
        }
    }

    fn histories() -> InMemoryHistory {
        let mut history = InMemoryHistory::default();
        history.insert(
            42,
            StudentHistory::new(
                StudentProfile {
                    programme_code: Some("BCS".to_string()),
                    gender: Some("F".to_string()),
                    cohort_year: Some(2022),
                    has_financial_aid: false,
                },
                vec![
                    record("CSC1024", "A-", 1),
                    record("PRG1203", "B", 5),
                    record("SEG1201", "C", 5),
                    record("MTH1114", "D", 9),
                ],
            ),
        );
        history.insert(7, StudentHistory::new(StudentProfile::default(), Vec::new()));
        history
    }

    fn cohort_table(history: &InMemoryHistory) -> CohortStatsTable {
        let mut records: Vec<SubjectRecord> = history.records().cloned().collect();
        records.push(record("PRG2104", "B", 2));
        records.push(record("PRG2104", "F", 2));
        records.push(record("CSC2103", "A", 2));
        CohortStatsTable::from_records(&records)
    }

    fn engine_with(classifier: ClassifierAdapter) -> PredictionEngine<InMemoryHistory> {
        let history = histories();
        let cohort_stats = cohort_table(&history);
        PredictionEngine::new(
            history,
            default_catalog(),
            cohort_stats,
            ModelArtifacts {
                classifier,
                encoders: CategoricalEncoders::default(),
            },
            StudentPerformanceCache::new(16, 0.2),
            EngineConfig::default(),
        )
    }

    struct CountingClassifier {
        calls: Arc<AtomicUsize>,
        importances: FeatureVector,
    }

    impl Classifier for CountingClassifier {
        fn predict_proba(&self, rows: &[FeatureVector]) -> Vec<[f64; 2]> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            rows.iter().map(|_| [0.25, 0.75]).collect()
        }

        fn feature_importances(&self) -> &FeatureVector {
            &self.importances
        }
    }

    #[test]
    fn degrades_to_rules_when_model_unavailable() {
        let engine = engine_with(ClassifierAdapter::unavailable());
        let prediction = engine.predict_one(42, "X").expect("prediction");

        assert_eq!(prediction.prediction_method, PredictionMethod::RuleBased);
        assert!((0.0..=1.0).contains(&prediction.success_probability));
        assert_eq!(prediction.risk_level, RiskLevel::Low);
        assert!(prediction.ml_probability.is_none());
    }

    #[test]
    fn batches_classifier_once_per_request() {
        let calls = Arc::new(AtomicUsize::new(0));
        let engine = engine_with(ClassifierAdapter::new(CountingClassifier {
            calls: Arc::clone(&calls),
            importances: [0.05; FEATURE_COUNT],
        }));

        let report = engine
            .predict_many(42, &["PRG2104", "CSC2103", "SEG2102", "CSC3206"])
            .expect("report");

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(report.predictions.len(), 4);
        for prediction in &report.predictions {
            assert_eq!(prediction.prediction_method, PredictionMethod::Hybrid);
            assert_eq!(prediction.ml_probability, Some(0.75));
            assert_eq!(prediction.top_factors.as_ref().map(Vec::len), Some(5));
        }
    }

    #[test]
    fn predictions_keep_input_order() {
        let engine = engine_with(sample_adapter());
        let codes = ["SEG2102", "PRG2104", "NET2201"];
        let report = engine.predict_many(42, &codes).expect("report");
        let returned: Vec<&str> = report
            .predictions
            .iter()
            .map(|prediction| prediction.subject_code.as_str())
            .collect();
        assert_eq!(returned, codes);
    }

    #[test]
    fn warm_cache_returns_identical_predictions() {
        let engine = engine_with(sample_adapter());
        let codes = ["PRG2104", "CSC2103", "CSC3206", "NET2201"];

        let cold = engine.predict_many(42, &codes).expect("cold");
        let warm = engine.predict_many(42, &codes).expect("warm");
        assert_eq!(cold, warm);
        assert_eq!(engine.cache().stats().hits, 1);

        engine.cache().clear();
        let cleared = engine.predict_many(42, &codes).expect("cleared");
        assert_eq!(cold, cleared);
    }

    #[test]
    fn probabilities_stay_in_bounds() {
        for classifier in [ClassifierAdapter::unavailable(), sample_adapter()] {
            let engine = engine_with(classifier);
            for student_id in [42, 7] {
                let report = engine
                    .predict_many(student_id, &["PRG2104", "CSC2103", "X", "PRJ3223", "CSC1024"])
                    .expect("report");
                for prediction in &report.predictions {
                    assert!((0.0..=1.0).contains(&prediction.success_probability));
                    assert!((0.0..=0.95).contains(&prediction.rule_probability));
                }
            }
        }
    }

    #[test]
    fn missing_cohort_degrades_only_that_subject() {
        let engine = engine_with(ClassifierAdapter::unavailable());
        let report = engine
            .predict_many(42, &["PRG2104", "SEG2102"])
            .expect("report");

        let with_cohort = &report.predictions[0];
        let without_cohort = &report.predictions[1];
        assert!(with_cohort.cohort_pass_rate.is_some());
        assert!(without_cohort.cohort_pass_rate.is_none());
        // SEG2102 <- SEG1201 (C = 2.0), no cohort term.
        assert!((without_cohort.rule_probability - 0.5).abs() < 1e-12);
    }

    #[test]
    fn unknown_student_is_not_found() {
        let engine = engine_with(sample_adapter());
        let err = engine.predict_many(9999, &["PRG2104"]).unwrap_err();
        assert!(matches!(err, PredictionError::StudentNotFound(9999)));
        assert!(engine.cache().is_empty());
    }

    #[test]
    fn rejects_empty_and_duplicate_requests() {
        let engine = engine_with(sample_adapter());
        let empty: [&str; 0] = [];
        assert!(matches!(
            engine.predict_many(42, &empty),
            Err(PredictionError::InvalidRequest(_))
        ));
        assert!(matches!(
            engine.predict_many(42, &["PRG2104", "PRG2104"]),
            Err(PredictionError::InvalidRequest(_))
        ));
    }

    #[test]
    fn report_flags_high_risk_subjects() {
        let engine = engine_with(ClassifierAdapter::unavailable());
        // CSC3206 <- CSC2103 (missing), MTH1114 (D): weighted 1.0 -> high.
        let report = engine
            .predict_many(42, &["CSC3206", "PRG2104"])
            .expect("report");

        assert_eq!(report.high_risk_subjects, vec!["CSC3206".to_string()]);
        assert_eq!(report.recommended_order, vec!["PRG2104", "CSC3206"]);
        assert!(report.current_gpa > 0.0);
    }

    #[test]
    fn recommended_order_breaks_ties_by_input_order() {
        let engine = engine_with(ClassifierAdapter::unavailable());
        let template = engine.predict_one(42, "X").expect("prediction");
        let with = |code: &str, probability: f64| SubjectPrediction {
            subject_code: code.to_string(),
            success_probability: probability,
            ..template.clone()
        };

        let predictions = vec![with("A", 0.91), with("B", 0.60), with("C", 0.91)];
        assert_eq!(recommended_order(&predictions), vec!["A", "C", "B"]);
    }

    #[test]
    fn evicted_students_are_served_correctly() {
        let mut history = histories();
        for student_id in 100..120 {
            history.insert(
                student_id,
                StudentHistory::new(StudentProfile::default(), vec![record("CSC1024", "B", 3)]),
            );
        }
        let cohort_stats = cohort_table(&history);
        let engine = PredictionEngine::new(
            history,
            default_catalog(),
            cohort_stats,
            ModelArtifacts::default(),
            StudentPerformanceCache::new(5, 0.2),
            EngineConfig::default(),
        );

        let before = engine.predict_many(42, &["PRG2104"]).expect("before");
        for student_id in 100..120 {
            engine.predict_one(student_id, "PRG1203").expect("prediction");
        }
        assert!(!engine.cache().contains(42));
        let after = engine.predict_many(42, &["PRG2104"]).expect("after");
        assert_eq!(before, after);
    }

    #[test]
    fn prerequisite_chain_and_cohort_lookup() {
        let engine = engine_with(ClassifierAdapter::unavailable());
        let chain = engine.prerequisite_chain("PRG2104").expect("chain");
        assert_eq!(chain.direct_prerequisites.len(), 2);
        assert_eq!(chain.direct_prerequisites[0].subject_name, "PRG1203 name");

        assert!(engine.cohort_stat("PRG2104").is_ok());
        assert!(matches!(
            engine.cohort_stat("NOPE000"),
            Err(PredictionError::SubjectNotFound(_))
        ));
        assert!(engine.prerequisite_chain("NOPE000").is_err());
    }
}
