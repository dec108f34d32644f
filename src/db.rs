use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use chrono::NaiveDate;
use serde::Deserialize;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::engine::InMemoryHistory;
use crate::models::{StudentHistory, StudentProfile, SubjectRecord};

/// One line of a results export; student columns repeat on every line.
#[derive(Debug, Clone, Deserialize)]
pub struct CsvRow {
    pub student_id: i64,
    pub subject_code: String,
    pub subject_name: String,
    pub grade: String,
    pub overall_percentage: Option<f64>,
    pub coursework_percentage: Option<f64>,
    pub exam_date: NaiveDate,
    pub programme_code: Option<String>,
    pub gender: Option<String>,
    pub cohort: Option<i32>,
    pub has_financial_aid: Option<bool>,
    pub source_key: Option<String>,
}

impl CsvRow {
    fn profile(&self) -> StudentProfile {
        StudentProfile {
            programme_code: non_empty(self.programme_code.as_deref()),
            gender: non_empty(self.gender.as_deref()),
            cohort_year: self.cohort,
            has_financial_aid: self.has_financial_aid.unwrap_or(false),
        }
    }

    fn record(&self) -> SubjectRecord {
        SubjectRecord {
            subject_code: self.subject_code.trim().to_string(),
            subject_name: self.subject_name.trim().to_string(),
            grade: self.grade.trim().to_string(),
            overall_pct: self.overall_percentage,
            coursework_pct: self.coursework_percentage,
            exam_date: self.exam_date,
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

pub fn read_csv(csv_path: &Path) -> anyhow::Result<Vec<CsvRow>> {
    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut rows = Vec::new();
    for (line, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result.with_context(|| format!("invalid row {} in {}", line + 2, csv_path.display()))?;
        rows.push(row);
    }
    Ok(rows)
}

/// Group export rows per student. The last row seen for a student wins for
/// profile fields.
pub fn history_from_rows(rows: &[CsvRow]) -> InMemoryHistory {
    let mut grouped: HashMap<i64, (StudentProfile, Vec<SubjectRecord>)> = HashMap::new();
    for row in rows {
        let entry = grouped
            .entry(row.student_id)
            .or_insert_with(|| (row.profile(), Vec::new()));
        entry.0 = row.profile();
        entry.1.push(row.record());
    }

    InMemoryHistory::new(
        grouped
            .into_iter()
            .map(|(id, (profile, records))| (id, StudentHistory::new(profile, records)))
            .collect(),
    )
}

pub fn load_csv_history(csv_path: &Path) -> anyhow::Result<InMemoryHistory> {
    let rows = read_csv(csv_path)?;
    Ok(history_from_rows(&rows))
}

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn fetch_history(pool: &PgPool) -> anyhow::Result<InMemoryHistory> {
    let rows = sqlx::query(
        r#"
        SELECT s.id, s.programme_code, s.gender, s.cohort, s.has_financial_aid,
               r.subject_code, r.subject_name, r.grade,
               r.overall_percentage, r.coursework_percentage, r.exam_date
        FROM subject_forecast.students s
        LEFT JOIN subject_forecast.subject_results r ON r.student_id = s.id
        ORDER BY s.id, r.exam_date
        "#,
    )
    .fetch_all(pool)
    .await
    .context("failed to load student history")?;

    let mut grouped: HashMap<i64, (StudentProfile, Vec<SubjectRecord>)> = HashMap::new();
    for row in rows {
        let student_id: i64 = row.get("id");
        let entry = grouped.entry(student_id).or_insert_with(|| {
            (
                StudentProfile {
                    programme_code: row.get("programme_code"),
                    gender: row.get("gender"),
                    cohort_year: row.get("cohort"),
                    has_financial_aid: row.get("has_financial_aid"),
                },
                Vec::new(),
            )
        });

        let subject_code: Option<String> = row.get("subject_code");
        let exam_date: Option<NaiveDate> = row.get("exam_date");
        if let (Some(subject_code), Some(exam_date)) = (subject_code, exam_date) {
            entry.1.push(SubjectRecord {
                subject_code,
                subject_name: row.get("subject_name"),
                grade: row.get("grade"),
                overall_pct: row.get("overall_percentage"),
                coursework_pct: row.get("coursework_percentage"),
                exam_date,
            });
        }
    }

    Ok(InMemoryHistory::new(
        grouped
            .into_iter()
            .map(|(id, (profile, records))| (id, StudentHistory::new(profile, records)))
            .collect(),
    ))
}

async fn upsert_student(pool: &PgPool, student_id: i64, profile: &StudentProfile) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO subject_forecast.students (id, programme_code, gender, cohort, has_financial_aid)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (id) DO UPDATE
        SET programme_code = EXCLUDED.programme_code,
            gender = EXCLUDED.gender,
            cohort = EXCLUDED.cohort,
            has_financial_aid = EXCLUDED.has_financial_aid
        "#,
    )
    .bind(student_id)
    .bind(&profile.programme_code)
    .bind(&profile.gender)
    .bind(profile.cohort_year)
    .bind(profile.has_financial_aid)
    .execute(pool)
    .await?;
    Ok(())
}

async fn insert_result(
    pool: &PgPool,
    student_id: i64,
    record: &SubjectRecord,
    source_key: &str,
) -> anyhow::Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO subject_forecast.subject_results
        (id, student_id, subject_code, subject_name, grade,
         overall_percentage, coursework_percentage, exam_date, source_key)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        ON CONFLICT (source_key) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(student_id)
    .bind(&record.subject_code)
    .bind(&record.subject_name)
    .bind(&record.grade)
    .bind(record.overall_pct)
    .bind(record.coursework_pct)
    .bind(record.exam_date)
    .bind(source_key)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let students = vec![
        (9897587_i64, "BCS", "F", 2021, false),
        (2733926_i64, "BCS", "M", 2022, true),
        (2721492_i64, "BIT", "M", 2022, false),
    ];

    for (id, programme, gender, cohort, aid) in &students {
        let profile = StudentProfile {
            programme_code: Some((*programme).to_string()),
            gender: Some((*gender).to_string()),
            cohort_year: Some(*cohort),
            has_financial_aid: *aid,
        };
        upsert_student(pool, *id, &profile).await?;
    }

    let results = vec![
        (9897587_i64, "CSC1024", "Programming Principles", "A-", 81.0, (2021, 5)),
        (9897587, "MTH1114", "Computer Mathematics", "B", 68.0, (2021, 5)),
        (9897587, "PRG1203", "Object-Oriented Programming Fundamentals", "B+", 74.0, (2021, 9)),
        (9897587, "CSC2103", "Data Structure and Algorithms", "B", 70.0, (2022, 5)),
        (2733926, "NET1014", "Networking Principles", "C+", 58.0, (2022, 5)),
        (2733926, "CSC1202", "Computer Organisation", "C", 52.0, (2022, 5)),
        (2733926, "CSC1024", "Programming Principles", "D", 44.0, (2022, 9)),
        (2733926, "NET2201", "Computer Networks", "C", 51.0, (2023, 1)),
        (2721492, "CSC1024", "Programming Principles", "B-", 63.0, (2022, 5)),
        (2721492, "PRG1203", "Object-Oriented Programming Fundamentals", "C", 55.0, (2022, 9)),
        (2721492, "SEG1201", "Database Fundamentals", "A", 88.0, (2022, 9)),
    ];

    for (student_id, code, name, grade, overall, (year, month)) in results {
        let record = SubjectRecord {
            subject_code: code.to_string(),
            subject_name: name.to_string(),
            grade: grade.to_string(),
            overall_pct: Some(overall),
            coursework_pct: Some(overall + 4.0),
            exam_date: NaiveDate::from_ymd_opt(year, month, 1).context("invalid date")?,
        };
        let source_key = format!("seed-{student_id}-{code}");
        insert_result(pool, student_id, &record, &source_key).await?;
    }

    Ok(())
}

pub async fn import_csv(pool: &PgPool, csv_path: &Path) -> anyhow::Result<usize> {
    let rows = read_csv(csv_path)?;
    let mut inserted = 0usize;

    for row in &rows {
        upsert_student(pool, row.student_id, &row.profile()).await?;

        let source_key = row
            .source_key
            .clone()
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));

        if insert_result(pool, row.student_id, &row.record(), &source_key).await? {
            inserted += 1;
        }
    }

    Ok(inserted)
}
