use std::collections::{BTreeMap, HashSet};

use crate::error::{PredictionError, Result};
use crate::models::{ChainLink, PrerequisiteChain, PrerequisiteEdge};

const MAX_CHAIN_DEPTH: usize = 5;

/// Target subject code with its weighted prerequisites.
const DEFAULT_PREREQUISITES: &[(&str, &[(&str, f64)])] = &[
    // Databases
    ("SEG2102", &[("SEG1201", 0.9)]),
    ("CSC3064", &[("SEG2102", 0.8), ("SEG1201", 0.5)]),
    ("BIS2216", &[("SEG1201", 0.6)]),
    ("BIS3216", &[("BIS2216", 0.8), ("SEG1201", 0.4)]),
    // Programming
    ("PRG1203", &[("CSC1024", 0.9)]),
    ("PRG2104", &[("PRG1203", 0.9), ("CSC1024", 0.4)]),
    ("CSC2103", &[("PRG1203", 0.8), ("CSC1024", 0.5)]),
    ("CSC2044", &[("PRG2104", 0.7), ("PRG1203", 0.5)]),
    ("PRG2205", &[("PRG2104", 0.7), ("CSC2103", 0.5)]),
    ("PRG2214", &[("PRG1203", 0.7), ("CSC1024", 0.5)]),
    // Software engineering
    ("SEG2202", &[("PRG1203", 0.6), ("SEG1201", 0.5)]),
    ("CSC3209", &[("SEG2202", 0.8), ("PRG2104", 0.6)]),
    ("PRG3014", &[("SEG2202", 0.5), ("CSC3024", 0.6)]),
    // AI and vision
    ("CSC3206", &[("CSC2103", 0.7), ("MTH1114", 0.5)]),
    ("CSC3034", &[("CSC3206", 0.8), ("CSC2103", 0.4)]),
    ("CSC3014", &[("CSC2014", 0.7), ("CSC3206", 0.5)]),
    ("CSC2014", &[("MTH1114", 0.5), ("CSC1024", 0.4)]),
    // Networking
    ("NET2201", &[("NET1014", 0.9)]),
    ("NET2102", &[("NET1014", 0.8)]),
    ("NET2103", &[("NET2201", 0.7), ("CSC2104", 0.5)]),
    ("NET3014", &[("NET2201", 0.8), ("NET2102", 0.5)]),
    ("NET3106", &[("NET2201", 0.7), ("CSC3044", 0.6)]),
    ("NET3204", &[("NET2201", 0.7), ("CSC2104", 0.5)]),
    ("NET3207", &[("NET2201", 0.8), ("NET2103", 0.6)]),
    ("MMD3105", &[("NET2201", 0.6)]),
    // Security
    ("CSC3044", &[("NET2201", 0.6), ("CSC2104", 0.5)]),
    ("SEC3024", &[("CSC3044", 0.8), ("NET2201", 0.5)]),
    ("SEC3014", &[("NET3106", 0.8), ("CSC3044", 0.5)]),
    ("SEC3034", &[("SEC3024", 0.7), ("CSC3044", 0.6)]),
    ("SEC3044", &[("CSC3044", 0.8), ("SEC3024", 0.6)]),
    // Operating systems
    ("CSC2104", &[("CSC1202", 0.7), ("CSC1024", 0.5)]),
    ("OSS1014", &[("CSC1202", 0.7), ("CSC1024", 0.5)]),
    // Web
    ("WEB2202", &[("WEB1201", 0.9), ("PRG1203", 0.5)]),
    // Mathematics and statistics
    ("MTH2103", &[("MTH1114", 0.8), ("IST1024", 0.5)]),
    ("IST2024", &[("IST1024", 0.7), ("MTH1114", 0.4)]),
    // Analytics
    ("IST2334", &[("SEG1201", 0.5), ("NET1014", 0.4)]),
    ("IST2134", &[("IST1024", 0.5)]),
    ("IST2234", &[("IST1024", 0.6), ("IST2034", 0.5)]),
    ("IST3134", &[("SEG2102", 0.6), ("IST2024", 0.5)]),
    ("IST3144", &[("IST2024", 0.7)]),
    ("IST3244", &[("IST2024", 0.8), ("IST2234", 0.5)]),
    ("BIS3218", &[("BIS2216", 0.7), ("SEG2102", 0.5)]),
    // Capstone
    ("PRJ3213", &[("SEG2202", 0.6), ("PRG2104", 0.5)]),
    ("PRJ3223", &[("PRJ3213", 0.9)]),
    // HCI
    ("CSC3024", &[("SEG2202", 0.4), ("PRG1203", 0.4)]),
];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrerequisiteCatalog {
    entries: BTreeMap<String, Vec<(String, f64)>>,
}

impl PrerequisiteCatalog {
    pub fn from_edges(edges: impl IntoIterator<Item = PrerequisiteEdge>) -> Result<Self> {
        let mut entries: BTreeMap<String, Vec<(String, f64)>> = BTreeMap::new();

        for edge in edges {
            if !(edge.weight > 0.0 && edge.weight <= 1.0) {
                return Err(PredictionError::InvalidRequest(format!(
                    "prerequisite weight {} for {} -> {} is outside (0, 1]",
                    edge.weight, edge.prereq_code, edge.subject_code
                )));
            }
            let list = entries.entry(edge.subject_code).or_default();
            if list.iter().any(|(code, _)| *code == edge.prereq_code) {
                continue;
            }
            list.push((edge.prereq_code, edge.weight));
        }

        Ok(Self { entries })
    }

    pub fn prerequisites(&self, subject_code: &str) -> &[(String, f64)] {
        self.entries
            .get(subject_code)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn contains(&self, subject_code: &str) -> bool {
        self.entries.contains_key(subject_code)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Direct prerequisites plus every transitive one up to a fixed depth.
    /// A subject already visited is not expanded again, so cycles terminate.
    pub fn chain(&self, subject_code: &str, name_of: impl Fn(&str) -> String) -> PrerequisiteChain {
        let mut chain = PrerequisiteChain {
            subject_code: subject_code.to_string(),
            subject_name: name_of(subject_code),
            direct_prerequisites: Vec::new(),
            full_chain: Vec::new(),
        };
        let mut visited = HashSet::new();
        self.walk(subject_code, 0, &name_of, &mut visited, &mut chain);
        chain
    }

    fn walk(
        &self,
        code: &str,
        depth: usize,
        name_of: &impl Fn(&str) -> String,
        visited: &mut HashSet<String>,
        chain: &mut PrerequisiteChain,
    ) {
        if depth > MAX_CHAIN_DEPTH || !visited.insert(code.to_string()) {
            return;
        }

        for (prereq_code, weight) in self.prerequisites(code) {
            let link = ChainLink {
                subject_code: prereq_code.clone(),
                subject_name: name_of(prereq_code),
                weight: *weight,
                depth: depth + 1,
            };
            if depth == 0 {
                chain.direct_prerequisites.push(link.clone());
            }
            chain.full_chain.push(link);
            self.walk(prereq_code, depth + 1, name_of, visited, chain);
        }
    }
}

pub fn default_catalog() -> PrerequisiteCatalog {
    let mut entries = BTreeMap::new();
    for (subject, prereqs) in DEFAULT_PREREQUISITES {
        let list = prereqs
            .iter()
            .map(|(code, weight)| ((*code).to_string(), *weight))
            .collect();
        entries.insert((*subject).to_string(), list);
    }
    PrerequisiteCatalog { entries }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(subject: &str, prereq: &str, weight: f64) -> PrerequisiteEdge {
        PrerequisiteEdge {
            subject_code: subject.to_string(),
            prereq_code: prereq.to_string(),
            weight,
        }
    }

    #[test]
    fn default_catalog_weights_are_in_range() {
        let catalog = default_catalog();
        assert!(!catalog.is_empty());
        for (_, prereqs) in &catalog.entries {
            for (_, weight) in prereqs {
                assert!(*weight > 0.0 && *weight <= 1.0);
            }
        }
        assert_eq!(
            catalog.prerequisites("PRG2104"),
            &[("PRG1203".to_string(), 0.9), ("CSC1024".to_string(), 0.4)]
        );
    }

    #[test]
    fn unknown_subject_has_no_prerequisites() {
        let catalog = default_catalog();
        assert!(catalog.prerequisites("XYZ9999").is_empty());
        assert!(!catalog.contains("XYZ9999"));
    }

    #[test]
    fn rejects_out_of_range_weights() {
        assert!(PrerequisiteCatalog::from_edges(vec![edge("B", "A", 0.0)]).is_err());
        assert!(PrerequisiteCatalog::from_edges(vec![edge("B", "A", 1.5)]).is_err());
        assert!(PrerequisiteCatalog::from_edges(vec![edge("B", "A", 1.0)]).is_ok());
    }

    #[test]
    fn chain_walks_transitive_prerequisites() {
        let catalog = default_catalog();
        let chain = catalog.chain("PRJ3223", |code| code.to_string());
        assert_eq!(chain.direct_prerequisites.len(), 1);
        assert_eq!(chain.direct_prerequisites[0].subject_code, "PRJ3213");
        assert!(chain
            .full_chain
            .iter()
            .any(|link| link.subject_code == "CSC1024" && link.depth > 2));
    }

    #[test]
    fn chain_terminates_on_cycles() {
        let catalog = PrerequisiteCatalog::from_edges(vec![
            edge("A", "B", 0.5),
            edge("B", "A", 0.5),
        ])
        .expect("valid edges");
        let chain = catalog.chain("A", |code| code.to_lowercase());
        assert_eq!(chain.subject_name, "a");
        assert_eq!(chain.full_chain.len(), 2);
    }
}
