//! Letter grade scale shared by the snapshot, cohort and rule code.

pub const PASSING_GRADES: [&str; 8] = ["A+", "A", "A-", "B+", "B", "B-", "C+", "C"];
pub const FAILING_GRADES: [&str; 6] = ["D+", "D", "D-", "E", "F", "F*"];

/// Grades that mark an attempt without a letter outcome.
pub const UNGRADED_MARKS: [&str; 5] = ["P", "EX", "INC", "W", "-"];

/// Trimmed, upper-cased form every classification below works on.
pub fn normalize(grade: &str) -> String {
    grade.trim().to_ascii_uppercase()
}

pub fn grade_points(grade: &str) -> Option<f64> {
    let grade = normalize(grade);
    if grade.is_empty() {
        return None;
    }

    lookup(&grade).or_else(|| lookup(grade.trim_end_matches('*')))
}

fn lookup(grade: &str) -> Option<f64> {
    match grade {
        "A+" | "A" => Some(4.0),
        "A-" => Some(3.7),
        "B+" => Some(3.3),
        "B" => Some(3.0),
        "B-" => Some(2.7),
        "C+" => Some(2.3),
        "C" => Some(2.0),
        "C-" => Some(1.7),
        "D+" => Some(1.3),
        "D" => Some(1.0),
        "D-" => Some(0.7),
        "E" => Some(0.5),
        "F" | "F*" => Some(0.0),
        _ => None,
    }
}

pub fn is_passing(grade: &str) -> bool {
    PASSING_GRADES.contains(&normalize(grade).as_str())
}

pub fn is_failing(grade: &str) -> bool {
    FAILING_GRADES.contains(&normalize(grade).as_str())
}

pub fn is_ungraded(grade: &str) -> bool {
    let grade = normalize(grade);
    grade.is_empty() || UNGRADED_MARKS.contains(&grade.as_str())
}
