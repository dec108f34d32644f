//! Per-student performance snapshots and the bounded cache that holds them.
//!
//! The cache evicts in *insertion* order: when full it drops the oldest
//! fraction of entries (20% by default) in one sweep before inserting. Reads
//! do not refresh an entry's position, so this is not an LRU.

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::config::{CACHE_CAPACITY, CACHE_EVICTION_FRACTION};
use crate::grades;
use crate::models::{CompletedSubject, StudentPerformanceSnapshot, SubjectRecord};

const TREND_WINDOW: usize = 3;

/// Derive the snapshot from a chronologically ordered history.
pub fn compute_snapshot(student_id: i64, records: &[SubjectRecord]) -> StudentPerformanceSnapshot {
    let current_gpa = records_gpa(records);
    // Windows are taken over all records; ungraded ones just add no points.
    let gpa_trend_last_3 = if records.len() >= TREND_WINDOW * 2 {
        let split = records.len() - TREND_WINDOW;
        records_gpa(&records[split..]) - records_gpa(&records[split - TREND_WINDOW..split])
    } else {
        0.0
    };

    let num_fails = records
        .iter()
        .filter(|record| grades::is_failing(&record.grade))
        .count();
    let fail_rate = if records.is_empty() {
        0.0
    } else {
        num_fails as f64 / records.len() as f64
    };

    let overall: Vec<f64> = records.iter().filter_map(|record| record.overall_pct).collect();
    let coursework: Vec<f64> = records
        .iter()
        .filter_map(|record| record.coursework_pct)
        .collect();

    let mut completed = BTreeMap::new();
    for record in records {
        completed.insert(
            record.subject_code.clone(),
            CompletedSubject {
                subject_name: record.subject_name.clone(),
                grade: record.grade.clone(),
                grade_points: grades::grade_points(&record.grade),
            },
        );
    }

    StudentPerformanceSnapshot {
        student_id,
        current_gpa,
        subjects_completed: records.len(),
        num_fails,
        fail_rate,
        gpa_trend_last_3,
        avg_overall_pct: average(&overall),
        avg_coursework_pct: average(&coursework),
        completed,
        fingerprint: fingerprint(records),
    }
}

fn records_gpa(records: &[SubjectRecord]) -> f64 {
    let points: Vec<f64> = records
        .iter()
        .filter_map(|record| grades::grade_points(&record.grade))
        .collect();
    average(&points)
}

fn average(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Cheap identity of a history, used to notice that it changed between requests.
pub fn fingerprint(records: &[SubjectRecord]) -> u64 {
    let mut hasher = DefaultHasher::new();
    records.len().hash(&mut hasher);
    for record in records {
        record.subject_code.hash(&mut hasher);
        record.subject_name.hash(&mut hasher);
        record.grade.hash(&mut hasher);
        record.overall_pct.map(f64::to_bits).hash(&mut hasher);
        record.coursework_pct.map(f64::to_bits).hash(&mut hasher);
        record.exam_date.hash(&mut hasher);
    }
    hasher.finish()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub insertions: u64,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<i64, Arc<StudentPerformanceSnapshot>>,
    order: VecDeque<i64>,
    stats: CacheStats,
}

#[derive(Debug)]
pub struct StudentPerformanceCache {
    capacity: usize,
    evict_count: usize,
    inner: Mutex<Inner>,
}

impl Default for StudentPerformanceCache {
    fn default() -> Self {
        Self::new(CACHE_CAPACITY, CACHE_EVICTION_FRACTION)
    }
}

impl StudentPerformanceCache {
    pub fn new(capacity: usize, eviction_fraction: f64) -> Self {
        let capacity = capacity.max(1);
        let evict_count = ((capacity as f64) * eviction_fraction).ceil() as usize;
        Self {
            capacity,
            evict_count: evict_count.clamp(1, capacity),
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Return the cached snapshot, computing and storing it when absent or
    /// when `records` no longer match what it was computed from.
    pub fn get_or_compute(
        &self,
        student_id: i64,
        records: &[SubjectRecord],
    ) -> Arc<StudentPerformanceSnapshot> {
        let current = fingerprint(records);
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        if let Some(snapshot) = inner.entries.get(&student_id) {
            if snapshot.fingerprint == current {
                let snapshot = Arc::clone(snapshot);
                inner.stats.hits += 1;
                return snapshot;
            }
        }

        inner.stats.misses += 1;
        let snapshot = Arc::new(compute_snapshot(student_id, records));

        if let Some(existing) = inner.entries.get_mut(&student_id) {
            *existing = Arc::clone(&snapshot);
            return snapshot;
        }

        if inner.entries.len() >= self.capacity {
            let evicted = self.evict_oldest(inner);
            debug!(evicted, capacity = self.capacity, "student cache full, evicted oldest entries");
        }

        inner.entries.insert(student_id, Arc::clone(&snapshot));
        inner.order.push_back(student_id);
        inner.stats.insertions += 1;
        snapshot
    }

    fn evict_oldest(&self, inner: &mut Inner) -> usize {
        let mut evicted = 0;
        while evicted < self.evict_count {
            let Some(oldest) = inner.order.pop_front() else {
                break;
            };
            inner.entries.remove(&oldest);
            evicted += 1;
        }
        inner.stats.evictions += evicted as u64;
        evicted
    }

    pub fn contains(&self, student_id: i64) -> bool {
        self.inner.lock().entries.contains_key(&student_id)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.lock().stats
    }

    /// Drop every entry and reset the counters.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.order.clear();
        inner.stats = CacheStats::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn record(code: &str, grade: &str, month: u32) -> SubjectRecord {
        SubjectRecord {
            subject_code: code.to_string(),
            subject_name: format!("{code} name"),
            grade: grade.to_string(),
            overall_pct: Some(60.0 + month as f64),
            coursework_pct: Some(70.0),
            exam_date: NaiveDate::from_ymd_opt(2024, month, 1).expect("valid date"),
        }
    }

    fn history() -> Vec<SubjectRecord> {
        vec![
            record("CSC1024", "C", 1),
            record("MTH1114", "C+", 2),
            record("SEG1201", "D", 3),
            record("PRG1203", "B", 4),
            record("NET1014", "B+", 5),
            record("CSC1202", "A", 6),
            record("MPU3113", "P", 7),
        ]
    }

    #[test]
    fn snapshot_derives_performance_fields() {
        let snapshot = compute_snapshot(7, &history());
        let graded = [2.0, 2.3, 1.0, 3.0, 3.3, 4.0];

        assert_eq!(snapshot.student_id, 7);
        assert_eq!(snapshot.subjects_completed, 7);
        assert_eq!(snapshot.num_fails, 1);
        assert!((snapshot.fail_rate - 1.0 / 7.0).abs() < 1e-9);
        assert!((snapshot.current_gpa - graded.iter().sum::<f64>() / 6.0).abs() < 1e-9);
        // Last three records are B+, A, P; the three before are C+, D, B.
        let expected_trend = (3.3 + 4.0) / 2.0 - (2.3 + 1.0 + 3.0) / 3.0;
        assert!((snapshot.gpa_trend_last_3 - expected_trend).abs() < 1e-9);
        assert!((snapshot.avg_coursework_pct - 70.0).abs() < 1e-9);
        assert_eq!(snapshot.completed["MPU3113"].grade_points, None);
        assert_eq!(snapshot.completed["PRG1203"].grade_points, Some(3.0));
    }

    #[test]
    fn empty_history_yields_zeroes() {
        let snapshot = compute_snapshot(1, &[]);
        assert_eq!(snapshot.subjects_completed, 0);
        assert_eq!(snapshot.current_gpa, 0.0);
        assert_eq!(snapshot.fail_rate, 0.0);
        assert_eq!(snapshot.gpa_trend_last_3, 0.0);
        assert!(snapshot.completed.is_empty());
    }

    #[test]
    fn short_history_has_flat_trend() {
        let records = history()[..4].to_vec();
        assert_eq!(compute_snapshot(1, &records).gpa_trend_last_3, 0.0);
    }

    #[test]
    fn trend_needs_six_records_not_six_grades() {
        let records = vec![
            record("CSC1024", "C", 1),
            record("MTH1114", "P", 2),
            record("SEG1201", "EX", 3),
            record("PRG1203", "B", 4),
            record("NET1014", "W", 5),
            record("CSC1202", "A", 6),
        ];
        let snapshot = compute_snapshot(1, &records);
        let expected_trend = (3.0 + 4.0) / 2.0 - 2.0;
        assert!((snapshot.gpa_trend_last_3 - expected_trend).abs() < 1e-9);
    }

    #[test]
    fn lower_case_fails_are_counted() {
        let records = vec![record("CSC1024", "f", 1), record("MTH1114", "A", 2)];
        let snapshot = compute_snapshot(1, &records);
        assert_eq!(snapshot.num_fails, 1);
        assert!((snapshot.fail_rate - 0.5).abs() < 1e-9);
    }

    #[test]
    fn renamed_subject_invalidates_entry() {
        let cache = StudentPerformanceCache::new(10, 0.2);
        let mut records = history();
        cache.get_or_compute(1, &records);
        records[0].subject_name = "Programming Principles".to_string();
        let after = cache.get_or_compute(1, &records);

        assert_eq!(after.completed["CSC1024"].subject_name, "Programming Principles");
        assert_eq!(cache.stats().misses, 2);
    }

    #[test]
    fn retake_uses_latest_attempt() {
        let records = vec![record("CSC1024", "F", 1), record("CSC1024", "B", 6)];
        let snapshot = compute_snapshot(1, &records);
        assert_eq!(snapshot.completed["CSC1024"].grade, "B");
    }

    #[test]
    fn second_lookup_is_a_hit() {
        let cache = StudentPerformanceCache::new(10, 0.2);
        let first = cache.get_or_compute(1, &history());
        let second = cache.get_or_compute(1, &history());

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn changed_history_is_recomputed() {
        let cache = StudentPerformanceCache::new(10, 0.2);
        let mut records = history();
        let before = cache.get_or_compute(1, &records);
        records.push(record("PRG2104", "F", 8));
        let after = cache.get_or_compute(1, &records);

        assert_eq!(after.subjects_completed, before.subjects_completed + 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().misses, 2);
    }

    #[test]
    fn overflow_evicts_oldest_fifth() {
        let cache = StudentPerformanceCache::new(500, 0.2);
        let records = history();
        for student_id in 0..501 {
            cache.get_or_compute(student_id, &records);
        }

        assert_eq!(cache.len(), 401);
        assert_eq!(cache.stats().evictions, 100);
        for student_id in 0..100 {
            assert!(!cache.contains(student_id));
        }
        for student_id in 100..501 {
            assert!(cache.contains(student_id));
        }
    }

    #[test]
    fn evicted_student_is_recomputed_identically() {
        let cache = StudentPerformanceCache::new(5, 0.2);
        let records = history();
        let original = cache.get_or_compute(0, &records);
        for student_id in 1..6 {
            cache.get_or_compute(student_id, &records);
        }
        assert!(!cache.contains(0));

        let recomputed = cache.get_or_compute(0, &records);
        assert_eq!(*original, *recomputed);
    }

    #[test]
    fn reads_do_not_refresh_eviction_order() {
        // Insertion order, not access recency, decides who goes first.
        let cache = StudentPerformanceCache::new(3, 0.2);
        let records = history();
        for student_id in 0..3 {
            cache.get_or_compute(student_id, &records);
        }
        cache.get_or_compute(0, &records);
        cache.get_or_compute(3, &records);

        assert!(!cache.contains(0));
        assert!(cache.contains(1));
        assert!(cache.contains(3));
    }

    #[test]
    fn clear_empties_the_cache() {
        let cache = StudentPerformanceCache::default();
        cache.get_or_compute(1, &history());
        cache.get_or_compute(1, &history());
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.stats(), CacheStats::default());
        assert_eq!(cache.capacity(), 500);
    }
}
