//! Built-in ICD-10 / CPT lookup table.
//!
//! A small fixed catalog for manual code lookup alongside model suggestions.
//! Matching is a case-insensitive substring test against code or description.

use crate::suggest::error::CodingError;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IcdEntry {
    pub code: &'static str,
    pub description: &'static str,
    pub category: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CptEntry {
    pub code: &'static str,
    pub description: &'static str,
    pub category: &'static str,
    pub modifiers: &'static [&'static str],
    pub units: &'static str,
}

const ICD_CODES: &[IcdEntry] = &[
    IcdEntry {
        code: "J45.909",
        description: "Unspecified asthma without exacerbation",
        category: "Respiratory",
    },
    IcdEntry {
        code: "J45.20",
        description: "Mild intermittent asthma, uncomplicated",
        category: "Respiratory",
    },
    IcdEntry {
        code: "I10",
        description: "Essential (primary) hypertension",
        category: "Cardiovascular",
    },
    IcdEntry {
        code: "E11.9",
        description: "Type 2 diabetes mellitus without complications",
        category: "Endocrine",
    },
];

const CPT_CODES: &[CptEntry] = &[
    CptEntry {
        code: "99213",
        description: "Office visit, est patient, 10-19 min",
        category: "Evaluation and Management",
        modifiers: &["25", "59"],
        units: "1",
    },
    CptEntry {
        code: "99214",
        description: "Office visit, est patient, 20-29 min",
        category: "Evaluation and Management",
        modifiers: &["25", "59"],
        units: "1",
    },
    CptEntry {
        code: "96372",
        description: "Therapeutic injection, SC/IM",
        category: "Medicine",
        modifiers: &["59"],
        units: "1",
    },
    CptEntry {
        code: "93000",
        description: "Electrocardiogram, routine ECG with at least 12 leads",
        category: "Cardiovascular",
        modifiers: &[],
        units: "1",
    },
];

fn normalize_query(query: &str) -> Result<String, CodingError> {
    let query = query.trim();
    if query.is_empty() {
        return Err(CodingError::InvalidInput("Search query is required".to_string()));
    }
    Ok(query.to_lowercase())
}

fn matches(query: &str, code: &str, description: &str) -> bool {
    code.to_lowercase().contains(query) || description.to_lowercase().contains(query)
}

pub fn search_icd(query: &str) -> Result<Vec<IcdEntry>, CodingError> {
    let query = normalize_query(query)?;
    Ok(ICD_CODES
        .iter()
        .filter(|entry| matches(&query, entry.code, entry.description))
        .copied()
        .collect())
}

pub fn search_cpt(query: &str) -> Result<Vec<CptEntry>, CodingError> {
    let query = normalize_query(query)?;
    Ok(CPT_CODES
        .iter()
        .filter(|entry| matches(&query, entry.code, entry.description))
        .copied()
        .collect())
}
