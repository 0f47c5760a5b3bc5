// ChapterSleuth - core/optimizer.rs
//
// Global boundary selection: choose exactly N boundaries from the scored
// candidate pool under a minimum-spacing constraint, by greedy descent
// over combined scores. When N boundaries do not fit, the spacing is
// halved a bounded number of times before the shortfall is reported.
// Pure combinatorial code; no I/O, no oracle.

use crate::core::model::Boundary;
use crate::core::structural::HeaderCandidate;
use crate::util::constants;

/// Result of a selection pass.
#[derive(Debug)]
pub struct OptimizerOutcome {
    /// Selected boundaries in position order. May be shorter than the
    /// expected count; see `shortfall`.
    pub boundaries: Vec<Boundary>,
    /// expected - selected. Zero on success.
    pub shortfall: usize,
    /// The spacing actually used by the final pass, after any halvings.
    pub spacing: usize,
}

/// Combined candidate score: oracle-weighted when an AI score exists,
/// structural alone otherwise (including when scoring was skipped).
pub fn combined_score(candidate: &HeaderCandidate) -> f64 {
    match candidate.ai_score {
        Some(ai) => {
            constants::OPTIMIZER_AI_WEIGHT * ai
                + constants::OPTIMIZER_STRUCTURAL_WEIGHT * candidate.structural_score
        }
        None => candidate.structural_score,
    }
}

/// Select exactly `expected` boundaries from `candidates`.
///
/// Spacing starts at max(avg_chapter_bytes / 4, 2000) and is halved up to
/// `OPTIMIZER_MAX_RELAXATIONS` times when the pool cannot seat the full
/// count. Ties on score break on proximity to the ideal stride
/// `file_len / expected`.
pub fn select_boundaries(
    file_len: usize,
    candidates: &[HeaderCandidate],
    expected: usize,
) -> OptimizerOutcome {
    if expected == 0 || candidates.is_empty() {
        return OptimizerOutcome {
            boundaries: Vec::new(),
            shortfall: expected,
            spacing: 0,
        };
    }

    let initial_spacing = (file_len / expected / constants::OPTIMIZER_SPACING_DIVISOR)
        .max(constants::OPTIMIZER_SPACING_FLOOR_BYTES);
    let ideal_stride = (file_len / expected).max(1);

    // Score-descending order with the stride tie-break, computed once.
    let mut ranked: Vec<&HeaderCandidate> = candidates.iter().collect();
    ranked.sort_by(|a, b| {
        combined_score(b)
            .partial_cmp(&combined_score(a))
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                stride_distance(a.byte_offset, ideal_stride)
                    .cmp(&stride_distance(b.byte_offset, ideal_stride))
            })
            .then_with(|| a.line_num.cmp(&b.line_num))
    });

    let mut spacing = initial_spacing;
    let mut best: Vec<&HeaderCandidate> = Vec::new();

    for relaxation in 0..=constants::OPTIMIZER_MAX_RELAXATIONS {
        let picked = greedy_pick(&ranked, expected, spacing);
        if picked.len() > best.len() {
            best = picked;
        }
        if best.len() >= expected {
            break;
        }
        if relaxation < constants::OPTIMIZER_MAX_RELAXATIONS {
            spacing = (spacing / 2).max(1);
            tracing::debug!(
                spacing,
                have = best.len(),
                expected,
                "Spacing halved; retrying selection"
            );
        }
    }

    let shortfall = expected.saturating_sub(best.len());
    if shortfall > 0 {
        tracing::warn!(
            selected = best.len(),
            expected,
            "Optimizer could not seat the full boundary count"
        );
    }

    best.sort_by_key(|c| c.line_num);
    let boundaries = best
        .into_iter()
        .map(|c| Boundary {
            line_num: c.line_num,
            byte_offset: c.byte_offset,
            text: c.text.clone(),
            score: Some(combined_score(c)),
            source: c.source,
        })
        .collect();

    OptimizerOutcome {
        boundaries,
        shortfall,
        spacing,
    }
}

fn greedy_pick<'c>(
    ranked: &[&'c HeaderCandidate],
    expected: usize,
    spacing: usize,
) -> Vec<&'c HeaderCandidate> {
    let mut picked: Vec<&HeaderCandidate> = Vec::with_capacity(expected);
    for candidate in ranked {
        if picked.len() >= expected {
            break;
        }
        let conflicts = picked
            .iter()
            .any(|p| candidate.byte_offset.abs_diff(p.byte_offset) < spacing);
        if !conflicts {
            picked.push(candidate);
        }
    }
    picked
}

/// Distance from an offset to the nearest multiple of the ideal stride.
fn stride_distance(offset: usize, ideal_stride: usize) -> usize {
    let rem = offset % ideal_stride;
    rem.min(ideal_stride - rem)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::BoundarySource;

    fn candidate(line_num: usize, byte_offset: usize, structural: f64, ai: Option<f64>) -> HeaderCandidate {
        HeaderCandidate {
            line_num,
            byte_offset,
            text: format!("후보 {line_num}"),
            structural_score: structural,
            ai_score: ai,
            source: BoundarySource::Structural,
        }
    }

    #[test]
    fn test_combined_score_weights() {
        let c = candidate(0, 0, 0.4, Some(0.8));
        assert!((combined_score(&c) - (0.7 * 0.8 + 0.3 * 0.4)).abs() < 1e-9);
        let unscored = candidate(0, 0, 0.4, None);
        assert!((combined_score(&unscored) - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_exact_selection() {
        // 10 well-spaced strong candidates for 10 chapters.
        let candidates: Vec<_> = (0..10)
            .map(|i| candidate(i * 100, i * 50_000, 0.6, Some(0.9)))
            .collect();
        let outcome = select_boundaries(500_000, &candidates, 10);
        assert_eq!(outcome.boundaries.len(), 10);
        assert_eq!(outcome.shortfall, 0);
        for pair in outcome.boundaries.windows(2) {
            assert!(pair[0].line_num < pair[1].line_num);
            assert!(pair[1].byte_offset - pair[0].byte_offset >= outcome.spacing);
        }
    }

    #[test]
    fn test_spacing_rejects_clustered_candidates() {
        // Two strong candidates 100 bytes apart; only one can be seated at
        // the initial spacing, and the stronger must win.
        let candidates = vec![
            candidate(0, 10_000, 0.5, Some(0.95)),
            candidate(1, 10_100, 0.5, Some(0.90)),
            candidate(2, 60_000, 0.5, Some(0.80)),
        ];
        let outcome = select_boundaries(120_000, &candidates, 2);
        assert_eq!(outcome.boundaries.len(), 2);
        assert_eq!(outcome.boundaries[0].line_num, 0);
        assert_eq!(outcome.boundaries[1].line_num, 2);
    }

    #[test]
    fn test_spacing_halves_until_feasible() {
        // avg = 100_000/4 = 25_000 -> spacing 6_250. Candidates sit 2_000
        // apart, so two halvings (1_562) are needed to seat all four.
        let candidates: Vec<_> = (0..4)
            .map(|i| candidate(i, 10_000 + i * 2_000, 0.9, None))
            .collect();
        let outcome = select_boundaries(100_000, &candidates, 4);
        assert_eq!(outcome.boundaries.len(), 4);
        assert_eq!(outcome.shortfall, 0);
        assert!(outcome.spacing < 6_250);
    }

    #[test]
    fn test_shortfall_reported_when_infeasible() {
        let candidates = vec![candidate(0, 10_000, 0.9, Some(0.9))];
        let outcome = select_boundaries(100_000, &candidates, 5);
        assert_eq!(outcome.boundaries.len(), 1);
        assert_eq!(outcome.shortfall, 4);
    }

    #[test]
    fn test_tie_breaks_on_stride_proximity() {
        // Equal scores; the ideal stride for one chapter in 100 000 bytes
        // puts grid points at 0 and 100 000. The candidate nearest a grid
        // point must win the single slot.
        let near_grid = candidate(1, 95_000, 0.8, None);
        let mid_file = candidate(2, 50_000, 0.8, None);
        let outcome = select_boundaries(100_000, &[mid_file, near_grid], 1);
        assert_eq!(outcome.boundaries.len(), 1);
        assert_eq!(outcome.boundaries[0].line_num, 1);
    }

    #[test]
    fn test_empty_pool() {
        let outcome = select_boundaries(100_000, &[], 3);
        assert!(outcome.boundaries.is_empty());
        assert_eq!(outcome.shortfall, 3);
    }
}
