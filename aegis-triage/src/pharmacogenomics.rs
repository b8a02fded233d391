//! Curated drug-gene interaction table consulted by the genomic precision
//! stage.

use tracing::warn;

use crate::models::{GenomicReview, OverallRecommendation, RiskLevel};
use crate::validator::FieldIssue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrugGeneInteraction {
    /// Lower-case names and aliases of the drugs in this row
    pub drugs: &'static [&'static str],
    /// Genes a review of these drugs has to address
    pub genes: &'static [&'static str],
    /// Genes worth mentioning but not required
    pub secondary_genes: &'static [&'static str],
}

pub const DRUG_GENE_TABLE: &[DrugGeneInteraction] = &[
    DrugGeneInteraction {
        drugs: &["warfarin"],
        genes: &["CYP2C9", "VKORC1"],
        secondary_genes: &["CYP4F2"],
    },
    DrugGeneInteraction {
        drugs: &["clopidogrel"],
        genes: &["CYP2C19"],
        secondary_genes: &[],
    },
    DrugGeneInteraction {
        drugs: &["codeine", "tramadol"],
        genes: &["CYP2D6"],
        secondary_genes: &[],
    },
    DrugGeneInteraction {
        drugs: &["tamoxifen"],
        genes: &["CYP2D6"],
        secondary_genes: &[],
    },
    DrugGeneInteraction {
        drugs: &[
            "azathioprine",
            "mercaptopurine",
            "6-mercaptopurine",
            "6-mp",
            "thioguanine",
        ],
        genes: &["TPMT", "NUDT15"],
        secondary_genes: &[],
    },
    DrugGeneInteraction {
        drugs: &["fluorouracil", "5-fluorouracil", "5-fu", "capecitabine"],
        genes: &["DPYD"],
        secondary_genes: &[],
    },
    DrugGeneInteraction {
        drugs: &["carbamazepine", "phenytoin"],
        genes: &["HLA-B*15:02", "CYP2C9"],
        secondary_genes: &[],
    },
    DrugGeneInteraction {
        drugs: &["abacavir"],
        genes: &["HLA-B*57:01"],
        secondary_genes: &[],
    },
    DrugGeneInteraction {
        drugs: &["allopurinol"],
        genes: &["HLA-B*58:01"],
        secondary_genes: &[],
    },
];

/// True when `term` occurs in `text` with no letter or digit on either side.
fn contains_term(text: &str, term: &str) -> bool {
    let is_word = |c: char| c.is_ascii_alphanumeric();
    text.match_indices(term).any(|(start, _)| {
        let before = text[..start].chars().next_back();
        let after = text[start + term.len()..].chars().next();
        !before.is_some_and(is_word) && !after.is_some_and(is_word)
    })
}

/// Curated row for a medication such as "Clopidogrel 75 mg daily".
pub fn lookup(medication: &str) -> Option<&'static DrugGeneInteraction> {
    let medication = medication.trim().to_lowercase();
    DRUG_GENE_TABLE
        .iter()
        .find(|row| row.drugs.iter().any(|drug| contains_term(&medication, drug)))
}

/// Whether a review written for `reviewed` covers the proposed `medication`.
pub fn same_medication(reviewed: &str, medication: &str) -> bool {
    let reviewed = reviewed.trim().to_lowercase();
    let medication = medication.trim().to_lowercase();
    if reviewed.is_empty() || medication.is_empty() {
        return false;
    }
    contains_term(&reviewed, &medication)
        || contains_term(&medication, &reviewed)
        || match (lookup(&reviewed), lookup(&medication)) {
            (Some(a), Some(b)) => {
                a == b
                    && a.drugs
                        .iter()
                        .any(|d| contains_term(&reviewed, d) && contains_term(&medication, d))
            }
            _ => false,
        }
}

/// Reference rows rendered for the genomic precision prompt.
pub fn reference_interactions(medications: &[String]) -> String {
    medications
        .iter()
        .map(|medication| match lookup(medication) {
            Some(row) if row.secondary_genes.is_empty() => {
                format!("- {medication}: {}", row.genes.join(", "))
            }
            Some(row) => format!(
                "- {medication}: {} (also consider {})",
                row.genes.join(", "),
                row.secondary_genes.join(", ")
            ),
            None => format!(
                "- {medication}: no curated interaction on record (report metabolism as \"unknown\" if none is established)"
            ),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Check model reviews against the proposed medications and the table.
pub fn coverage_issues(reviews: &[GenomicReview], medications: &[String]) -> Vec<FieldIssue> {
    let mut issues = Vec::new();
    for medication in medications {
        let Some(row) = lookup(medication) else {
            continue;
        };
        let review = reviews
            .iter()
            .enumerate()
            .find(|(_, review)| same_medication(&review.medication, medication));
        match review {
            None => issues.push(FieldIssue::rule(
                "reviews",
                format!("missing review for proposed medication {medication}"),
            )),
            Some((index, review)) => {
                let text = review.text().to_uppercase();
                let missing: Vec<&str> = row
                    .genes
                    .iter()
                    .copied()
                    .filter(|gene| !text.contains(gene))
                    .collect();
                if !missing.is_empty() {
                    issues.push(FieldIssue::rule(
                        format!("reviews[{index}]"),
                        format!(
                            "review of {medication} must address {}",
                            missing.join(", ")
                        ),
                    ));
                }
            }
        }
    }
    issues
}

/// Review recorded for a medication with no curated interaction that the
/// model left out.
pub fn unknown_metabolism_review(medication: &str) -> GenomicReview {
    GenomicReview {
        medication: medication.to_string(),
        metabolism: "unknown".to_string(),
        genetic_considerations: Vec::new(),
        dose_adjustment: None,
        alternative_medications: Vec::new(),
        risk_level: RiskLevel::Low,
        summary: format!(
            "No curated drug-gene interaction is on record for {medication}; no pharmacogenomic adjustment identified."
        ),
        overall_recommendation: OverallRecommendation::ProceedWithAdjustments,
    }
}

/// Values like "NULL" or "none" mean no adjustment.
pub fn normalize_dose_adjustment(review: &mut GenomicReview) {
    let empty = review.dose_adjustment.as_deref().is_some_and(|dose| {
        matches!(
            dose.trim().to_lowercase().as_str(),
            "" | "null" | "none" | "n/a" | "na" | "no adjustment" | "no adjustment needed"
        )
    });
    if empty {
        review.dose_adjustment = None;
    }
}

/// Bring the model's reviews in line with the proposed medications, in
/// proposal order. A review covering several spellings of one drug is used for
/// each of them. Only medications absent from the table get the "unknown"
/// review; curated ones are guaranteed a model review by [`coverage_issues`].
pub fn complete_reviews(mut reviews: Vec<GenomicReview>, medications: &[String]) -> Vec<GenomicReview> {
    for review in &mut reviews {
        normalize_dose_adjustment(review);
    }
    let mut ordered = Vec::with_capacity(medications.len());
    for medication in medications {
        let reviewed = reviews
            .iter()
            .find(|review| same_medication(&review.medication, medication));
        match reviewed {
            Some(review) => ordered.push(review.clone()),
            None if lookup(medication).is_none() => {
                ordered.push(unknown_metabolism_review(medication))
            }
            None => warn!(
                medication = %medication,
                "Curated medication left without a review"
            ),
        }
    }
    ordered
}
