use std::sync::OnceLock;

use regex::Regex;
use shared::{
    domain::{CandidateClass, Format, ImportCandidate},
    error::WorkflowError,
};
use tracing::{debug, info};

const SCOPE_MARKERS: [&str; 3] = ["SCOPE", "_S_", "-S-"];
const FLAT_MARKERS: [&str; 3] = ["FLAT", "_F_", "-F-"];
const FALLBACK_MARKERS: [&str; 3] = ["_FR", "-FR", "FR-"];
const DEFAULT_FILM_NAME: &str = "Film";

/// Technical suffixes found in distributor package names, stripped when the
/// leading word of a label is too short to be a title.
const TECHNICAL_SUFFIXES: [&str; 13] = [
    r"(?i)[_-]TLR.*$",
    r"(?i)[_-]FTR.*$",
    r"(?i)[_-]TSR.*$",
    r"(?i)[_-]QFC.*$",
    r"(?i)[_-]DCP.*$",
    r"(?i)[_-]\d+[_-].*$",
    r"(?i)[_-][SF][_-].*$",
    r"(?i)[_-]SMPTE.*$",
    r"(?i)[_-]CCAP.*$",
    r"(?i)[_-]OCAP.*$",
    r"(?i)[_-]OV$",
    r"(?i)[_-]\d{8}.*$",
    r"(?i)[_-]\d+K.*$",
];

fn technical_suffixes() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        TECHNICAL_SUFFIXES
            .iter()
            .filter_map(|pattern| Regex::new(pattern).ok())
            .collect()
    })
}

fn volume_marker() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"[_-](51|71)[_-]").ok())
        .as_ref()
}

/// The candidate chosen for import together with what was inferred from its label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedImport {
    pub candidate: ImportCandidate,
    pub format: Format,
    pub film_name: String,
}

pub fn classify_label(label: &str) -> Option<CandidateClass> {
    let upper = label.to_uppercase();
    if upper.contains("QFC") {
        Some(CandidateClass::Primary)
    } else if FALLBACK_MARKERS.iter().any(|marker| upper.contains(marker)) {
        Some(CandidateClass::Fallback)
    } else {
        None
    }
}

fn rank_label(label: &str) -> u8 {
    let upper = label.to_uppercase();
    let closed_captions = upper.contains("CCAP") && !upper.contains("OCAP");
    let volume = volume_marker().is_some_and(|re| re.is_match(&upper));
    match (closed_captions, volume) {
        (true, true) => 0,
        (false, true) => 1,
        _ => 2,
    }
}

/// Turns raw media labels into import candidates, keeping discovery order and
/// dropping labels that are neither QFC nor FR packages.
pub fn discover_candidates<I, S>(labels: I) -> Vec<ImportCandidate>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    labels
        .into_iter()
        .filter_map(|label| {
            let label = label.as_ref().trim();
            let class = classify_label(label)?;
            Some(ImportCandidate {
                label: label.to_string(),
                class,
                rank: rank_label(label),
            })
        })
        .collect()
}

/// Primary beats fallback; inside a class the better rank wins; ties go to the
/// first discovered.
pub fn select_candidate(
    candidates: &[ImportCandidate],
) -> Result<&ImportCandidate, WorkflowError> {
    candidates
        .iter()
        .enumerate()
        .min_by_key(|(index, candidate)| (candidate.class, candidate.rank, *index))
        .map(|(_, candidate)| candidate)
        .ok_or(WorkflowError::NoImportAvailable)
}

pub fn infer_format(label: &str) -> Result<Format, WorkflowError> {
    let upper = label.to_uppercase();
    if SCOPE_MARKERS.iter().any(|marker| upper.contains(marker)) {
        return Ok(Format::Scope);
    }
    if FLAT_MARKERS.iter().any(|marker| upper.contains(marker)) {
        return Ok(Format::Flat);
    }
    Err(WorkflowError::UnrecognizedFormat {
        label: label.to_string(),
    })
}

pub fn detect_import(candidates: &[ImportCandidate]) -> Result<DetectedImport, WorkflowError> {
    let candidate = select_candidate(candidates)?;
    let format = infer_format(&candidate.label)?;
    let film_name = extract_film_name(&candidate.label);
    info!(
        label = %candidate.label,
        class = ?candidate.class,
        rank = candidate.rank,
        %format,
        %film_name,
        "planner: import candidate selected"
    );
    Ok(DetectedImport {
        candidate: candidate.clone(),
        format,
        film_name,
    })
}

/// Extracts the title from a package label, e.g.
/// `Mercy_TLR-1-IMMINA_S_QFC-QFC-CCAP_CA_51_4K_MGM_20251001_DLX_SMPTE_OV` gives `Mercy`.
pub fn extract_film_name(label: &str) -> String {
    let text = label.trim().lines().next().unwrap_or_default().trim();

    let leading: String = text
        .chars()
        .take_while(|ch| ch.is_ascii_alphanumeric())
        .collect();
    if leading.len() >= 3 {
        return title_case(&leading);
    }

    let mut stripped = text.to_string();
    for pattern in technical_suffixes() {
        stripped = pattern.replace(&stripped, "").into_owned();
    }

    let first_segment = stripped.split(['_', '-']).next().unwrap_or_default();
    if first_segment.chars().count() >= 2 {
        return title_case(first_segment);
    }

    let spaced = stripped.replace(['_', '-'], " ");
    if let Some(word) = spaced.split_whitespace().next() {
        return title_case(word);
    }

    debug!(%label, "planner: no usable title in label");
    DEFAULT_FILM_NAME.to_string()
}

fn title_case(word: &str) -> String {
    let mut out = String::with_capacity(word.len());
    let mut previous_cased = false;
    for ch in word.chars() {
        if ch.is_alphabetic() {
            if previous_cased {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
            previous_cased = true;
        } else {
            out.push(ch);
            previous_cased = false;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_candidate_wins_when_both_present() {
        let candidates = discover_candidates(["FILM_QFC", "FILM_FR"]);
        assert_eq!(candidates.len(), 2);
        let chosen = select_candidate(&candidates).expect("candidate");
        assert_eq!(chosen.label, "FILM_QFC");
        assert_eq!(chosen.class, CandidateClass::Primary);
    }

    #[test]
    fn primary_wins_even_when_listed_after_fallback() {
        let candidates = discover_candidates(["FILM_FR", "FILM_QFC"]);
        let chosen = select_candidate(&candidates).expect("candidate");
        assert_eq!(chosen.label, "FILM_QFC");
    }

    #[test]
    fn fallback_is_used_when_alone() {
        let candidates = discover_candidates(["FILM_FR"]);
        let chosen = select_candidate(&candidates).expect("candidate");
        assert_eq!(chosen.label, "FILM_FR");
        assert_eq!(chosen.class, CandidateClass::Fallback);
    }

    #[test]
    fn no_candidate_fails_with_no_import_available() {
        let candidates = discover_candidates(["README.txt", "TRAILER_PACK"]);
        assert!(candidates.is_empty());
        assert_eq!(
            select_candidate(&candidates).expect_err("nothing to import"),
            WorkflowError::NoImportAvailable
        );
    }

    #[test]
    fn captions_and_volume_rank_first_within_class() {
        let candidates = discover_candidates([
            "Norvege_FTR_S_QFC-OCAP_CA_51_4K",
            "Norvege_FTR_S_QFC-CCAP_CA_71_4K",
            "Norvege_FTR_S_QFC-CCAP_CA_4K",
        ]);
        assert_eq!(
            candidates.iter().map(|c| c.rank).collect::<Vec<_>>(),
            vec![1, 0, 2]
        );
        let chosen = select_candidate(&candidates).expect("candidate");
        assert_eq!(chosen.label, "Norvege_FTR_S_QFC-CCAP_CA_71_4K");
    }

    #[test]
    fn equal_candidates_keep_discovery_order() {
        let candidates = discover_candidates(["First_S_QFC", "Second_S_QFC"]);
        let chosen = select_candidate(&candidates).expect("candidate");
        assert_eq!(chosen.label, "First_S_QFC");
    }

    #[test]
    fn format_markers_are_case_insensitive() {
        assert_eq!(infer_format("mercy_tlr_s_qfc").expect("scope"), Format::Scope);
        assert_eq!(infer_format("Film-F-QFC").expect("flat"), Format::Flat);
        assert_eq!(infer_format("Big_Scope_FR").expect("scope"), Format::Scope);
        assert_eq!(infer_format("FLAT_FR").expect("flat"), Format::Flat);
    }

    #[test]
    fn unknown_format_is_surfaced() {
        let err = infer_format("FILM_QFC").expect_err("no marker");
        assert_eq!(
            err,
            WorkflowError::UnrecognizedFormat {
                label: "FILM_QFC".into()
            }
        );
    }

    #[test]
    fn detect_import_reports_format_and_title() {
        let candidates = discover_candidates([
            "Mercy_TLR-1-IMMINA_S_QFC-QFC-CCAP_CA_51_4K_MGM_20251001_DLX_SMPTE_OV",
        ]);
        let detected = detect_import(&candidates).expect("detected");
        assert_eq!(detected.format, Format::Scope);
        assert_eq!(detected.film_name, "Mercy");
    }

    #[test]
    fn detect_import_does_not_default_format() {
        let candidates = discover_candidates(["FILM_QFC"]);
        assert!(matches!(
            detect_import(&candidates),
            Err(WorkflowError::UnrecognizedFormat { .. })
        ));
    }

    #[test]
    fn film_name_uses_leading_word_title_cased() {
        assert_eq!(extract_film_name("NORVEGE_FTR_F_QFC"), "Norvege");
        assert_eq!(extract_film_name("wicked-TLR-2_S_FR"), "Wicked");
        assert_eq!(extract_film_name("  Dune2_FTR\nsecond line"), "Dune2");
    }

    #[test]
    fn film_name_falls_back_to_stripped_segment() {
        assert_eq!(extract_film_name("Up_FTR_S_QFC"), "Up");
        assert_eq!(extract_film_name("__"), "Film");
        assert_eq!(extract_film_name(""), "Film");
    }
}
