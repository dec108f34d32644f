use std::collections::BTreeMap;

use crate::grades;
use crate::models::{CohortStat, SubjectRecord};

#[derive(Debug, Default)]
struct Accumulator {
    subject_name: String,
    attempts: usize,
    passed: usize,
    score_total: f64,
    score_count: usize,
    gpa_total: f64,
    gpa_count: usize,
}

/// Historical outcomes per subject, computed once and then only read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CohortStatsTable {
    stats: BTreeMap<String, CohortStat>,
}

impl CohortStatsTable {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a SubjectRecord>) -> Self {
        let mut map: BTreeMap<String, Accumulator> = BTreeMap::new();

        for record in records {
            if grades::is_ungraded(&record.grade) {
                continue;
            }

            let entry = map
                .entry(record.subject_code.clone())
                .or_insert_with(|| Accumulator {
                    subject_name: record.subject_name.clone(),
                    ..Accumulator::default()
                });
            entry.attempts += 1;
            if grades::is_passing(&record.grade) {
                entry.passed += 1;
            }
            if let Some(score) = record.overall_pct {
                entry.score_total += score;
                entry.score_count += 1;
            }
            if let Some(points) = grades::grade_points(&record.grade) {
                entry.gpa_total += points;
                entry.gpa_count += 1;
            }
        }

        let stats = map
            .into_iter()
            .map(|(subject_code, acc)| {
                let stat = CohortStat {
                    subject_code: subject_code.clone(),
                    subject_name: acc.subject_name,
                    pass_rate: acc.passed as f64 / acc.attempts as f64,
                    avg_score: mean(acc.score_total, acc.score_count),
                    avg_gpa: mean(acc.gpa_total, acc.gpa_count),
                    sample_size: acc.attempts,
                };
                (subject_code, stat)
            })
            .collect();

        Self { stats }
    }

    pub fn from_stats(stats: impl IntoIterator<Item = CohortStat>) -> Self {
        Self {
            stats: stats
                .into_iter()
                .map(|stat| (stat.subject_code.clone(), stat))
                .collect(),
        }
    }

    pub fn get(&self, subject_code: &str) -> Option<&CohortStat> {
        self.stats.get(subject_code)
    }

    pub fn subject_name(&self, subject_code: &str) -> Option<&str> {
        self.get(subject_code).map(|stat| stat.subject_name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &CohortStat> {
        self.stats.values()
    }

    pub fn len(&self) -> usize {
        self.stats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }
}

fn mean(total: f64, count: usize) -> Option<f64> {
    if count == 0 {
        None
    } else {
        Some(total / count as f64)
    }
}
