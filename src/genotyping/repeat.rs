//! # Repeat-length genotyping
//!
//! Maximum-likelihood estimation of one or two repeat allele sizes from the
//! align matrix, with confidence intervals found by walking the likelihood
//! surface away from the mode.
use std::collections::{BTreeSet, HashMap};

use ndarray::Array2;

use crate::genotyping::log_sum;
use crate::karyotype::AlleleCount;
use crate::stralign::{AlignMatrix, StrAlign, StrAlignKind};

const MISMAP_PRIOR: f64 = 0.001;
const CI_LIKELIHOOD_RATIO_STOP: f64 = 0.01;
const CI_MAX_INTERVAL_WIDTH: i32 = 750;
const CI_COLLAPSE_MASS: f64 = 0.95;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepeatAllele {
    pub size: i32,
    pub ci_lower: i32,
    pub ci_upper: i32,
}

/// One- or two-allele repeat genotype in motif units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepeatGenotype {
    motif_length: i32,
    alleles: Vec<RepeatAllele>,
}

impl RepeatGenotype {
    pub fn new(motif_length: i32, allele_sizes: &[i32]) -> Self {
        let alleles = allele_sizes
            .iter()
            .map(|&size| RepeatAllele {
                size,
                ci_lower: size,
                ci_upper: size,
            })
            .collect();
        let genotype = RepeatGenotype {
            motif_length,
            alleles,
        };
        genotype.assert_validity();
        genotype
    }

    fn assert_validity(&self) {
        assert!(
            !self.alleles.is_empty() && self.alleles.len() <= 2,
            "{} is not a valid number of alleles",
            self.alleles.len()
        );
        assert!(
            self.short_allele_size() <= self.long_allele_size(),
            "Allele sizes are not ordered"
        );
        for allele in &self.alleles {
            assert!(
                allele.ci_lower <= allele.size && allele.size <= allele.ci_upper,
                "({}, {}) is an invalid CI for repeat of size {}",
                allele.ci_lower,
                allele.ci_upper,
                allele.size
            );
        }
    }

    pub fn motif_length(&self) -> i32 {
        self.motif_length
    }

    pub fn num_alleles(&self) -> usize {
        self.alleles.len()
    }

    pub fn short_allele(&self) -> RepeatAllele {
        self.alleles[0]
    }

    pub fn long_allele(&self) -> RepeatAllele {
        *self.alleles.last().unwrap()
    }

    pub fn short_allele_size(&self) -> i32 {
        self.alleles[0].size
    }

    pub fn long_allele_size(&self) -> i32 {
        self.alleles.last().unwrap().size
    }

    pub fn set_short_allele_ci(&mut self, lower: i32, upper: i32) {
        self.alleles[0].ci_lower = lower;
        self.alleles[0].ci_upper = upper;
        self.assert_validity();
    }

    pub fn set_long_allele_ci(&mut self, lower: i32, upper: i32) {
        let last = self.alleles.len() - 1;
        self.alleles[last].ci_lower = lower;
        self.alleles[last].ci_upper = upper;
        self.assert_validity();
    }
}

/// Cache of per-fragment log-likelihoods over allele-size hypotheses.
pub struct FragLogliks<'m> {
    motif_length: i32,
    read_length: i32,
    fragment_length: i32,
    align_matrix: &'m AlignMatrix,
    logliks_by_size: HashMap<(usize, i32), f64>,
}

impl<'m> FragLogliks<'m> {
    pub fn new(
        motif_length: i32,
        read_length: i32,
        fragment_length: i32,
        align_matrix: &'m AlignMatrix,
    ) -> Self {
        assert!(align_matrix.num_reads() % 2 == 0);
        FragLogliks {
            motif_length,
            read_length,
            fragment_length,
            align_matrix,
            logliks_by_size: HashMap::new(),
        }
    }

    pub fn num_frags(&self) -> usize {
        self.align_matrix.num_reads() / 2
    }

    pub fn loglik(&mut self, frag_index: usize, allele_motif_count: i32) -> f64 {
        if let Some(&loglik) = self.logliks_by_size.get(&(frag_index, allele_motif_count)) {
            return loglik;
        }

        let read_index = 2 * frag_index;
        let mate_index = read_index + 1;
        assert!(mate_index < self.align_matrix.num_reads());
        let read_align = self.align_matrix.align(read_index, allele_motif_count);
        let mate_align = self.align_matrix.align(mate_index, allele_motif_count);

        let loglik = self.compute_loglik(&read_align, &mate_align, allele_motif_count);
        self.logliks_by_size
            .insert((frag_index, allele_motif_count), loglik);
        loglik
    }

    fn compute_loglik(
        &self,
        read_align: &StrAlign,
        mate_align: &StrAlign,
        allele_motif_count: i32,
    ) -> f64 {
        let num_possible_starts = (allele_motif_count * self.motif_length
            + self.fragment_length
            + 1) as i64;
        let num_possible_origins = num_possible_starts * num_possible_starts / 2;
        let mut num_origins_for_this_frag: i64 = 1;

        let read_in_repeat = read_align.kind() == StrAlignKind::InRepeat;
        let mate_in_repeat = mate_align.kind() == StrAlignKind::InRepeat;
        if !read_in_repeat && mate_in_repeat {
            if mate_align.num_motifs() < allele_motif_count {
                num_origins_for_this_frag += (allele_motif_count - mate_align.num_motifs()) as i64;
            }
        } else if read_in_repeat && !mate_in_repeat {
            if read_align.num_motifs() < allele_motif_count {
                num_origins_for_this_frag += (allele_motif_count - read_align.num_motifs()) as i64;
            }
        } else if read_in_repeat && mate_in_repeat && read_align.num_motifs() < allele_motif_count {
            let num_read_origins = (allele_motif_count - read_align.num_motifs()) as i64;
            num_origins_for_this_frag += num_read_origins * num_read_origins / 2;
        }

        let base_penalty = 2.0 * self.read_length as f64 * 2.0f64.ln();
        let read_align_loglik = read_align.score() as f64 * 1.3f64.ln() - base_penalty;
        let mate_align_loglik = mate_align.score() as f64 * 1.3f64.ln() - base_penalty;

        (num_origins_for_this_frag as f64).ln() - (num_possible_origins as f64).ln()
            + read_align_loglik
            + mate_align_loglik
    }
}

/// Allele sizes worth evaluating: every spanning size, the longest
/// non-spanning size when it exceeds them, and expansion guesses scaled by
/// the in-repeat read count when the evidence suggests an expansion.
pub fn allele_size_candidates(
    read_length: i32,
    motif_length: i32,
    align_matrix: &AlignMatrix,
) -> Vec<i32> {
    let mut candidates: BTreeSet<i32> = BTreeSet::new();

    let mut num_in_repeat_reads = 0;
    let mut num_flanking_reads = 0;
    let mut longest_flanking_size = 0;

    for read_index in 0..align_matrix.num_reads() {
        let top_align = align_matrix.best_align(read_index);
        match top_align.kind() {
            StrAlignKind::Spanning => {
                candidates.insert(top_align.num_motifs());
                num_flanking_reads += 2;
            }
            StrAlignKind::Flanking => {
                longest_flanking_size = longest_flanking_size.max(top_align.num_motifs());
                num_flanking_reads += 1;
            }
            StrAlignKind::InRepeat => {
                num_in_repeat_reads += 1;
            }
            StrAlignKind::Outside => {}
        }
    }

    if candidates.is_empty() || *candidates.iter().next_back().unwrap() < longest_flanking_size {
        candidates.insert(longest_flanking_size);
    }

    if num_flanking_reads > 0 && num_in_repeat_reads > 0 {
        candidates.insert(read_length / motif_length);
        let depth = num_flanking_reads as f64 / 2.0;
        let medium_expansion =
            read_length as f64 + (num_in_repeat_reads * read_length) as f64 / depth;
        candidates.insert((medium_expansion / motif_length as f64) as i32);
        let long_expansion =
            read_length as f64 + (2 * num_in_repeat_reads * read_length) as f64 / depth;
        candidates.insert((long_expansion / motif_length as f64) as i32);
    }

    candidates.into_iter().collect()
}

/// Best achievable log-likelihood per fragment across the candidate sizes;
/// the mismap arm of the mixture.
pub fn top_frag_logliks(frag_logliks: &mut FragLogliks, candidates: &[i32]) -> Vec<f64> {
    let mut top_logliks = vec![f64::MIN; frag_logliks.num_frags()];
    for frag_index in 0..frag_logliks.num_frags() {
        for &allele_size in candidates {
            let loglik = frag_logliks.loglik(frag_index, allele_size);
            if loglik > top_logliks[frag_index] {
                top_logliks[frag_index] = loglik;
            }
        }
    }
    top_logliks
}

fn mixture_loglik(loglik_given_rightmap: f64, loglik_given_mismap: f64) -> f64 {
    let mismap_prior = MISMAP_PRIOR.ln();
    let rightmap_prior = (1.0 - MISMAP_PRIOR).ln();
    log_sum(
        mismap_prior + loglik_given_mismap,
        rightmap_prior + loglik_given_rightmap,
    )
}

fn one_allele_loglik(
    motif_count: i32,
    top_frag_logliks: &[f64],
    frag_logliks: &mut FragLogliks,
) -> f64 {
    if motif_count < 0 {
        return f64::MIN;
    }

    let mut genotype_loglik = 0.0;
    for frag_index in 0..frag_logliks.num_frags() {
        let frag_loglik = frag_logliks.loglik(frag_index, motif_count);
        genotype_loglik += mixture_loglik(frag_loglik, top_frag_logliks[frag_index]);
    }
    genotype_loglik
}

fn short_and_long_allele_loglik(
    short_allele_size: i32,
    long_allele_size: i32,
    motif_length: i32,
    fragment_length: i32,
    top_frag_logliks: &[f64],
    frag_logliks: &mut FragLogliks,
) -> f64 {
    if short_allele_size < 0 || long_allele_size < 0 || short_allele_size > long_allele_size {
        return f64::MIN;
    }

    let short_allele_length = (short_allele_size * motif_length + fragment_length + 1) as f64;
    let long_allele_length = (long_allele_size * motif_length + fragment_length + 1) as f64;
    let short_allele_frac = short_allele_length / (short_allele_length + long_allele_length);

    let mut genotype_loglik = 0.0;
    for frag_index in 0..frag_logliks.num_frags() {
        let frag_loglik_short = frag_logliks.loglik(frag_index, short_allele_size);
        let frag_loglik_long = frag_logliks.loglik(frag_index, long_allele_size);

        let short_allele_term = short_allele_frac.ln() + frag_loglik_short;
        let long_allele_term = (1.0 - short_allele_frac).ln() + frag_loglik_long;

        let loglik_given_rightmap = log_sum(short_allele_term, long_allele_term);
        genotype_loglik += mixture_loglik(loglik_given_rightmap, top_frag_logliks[frag_index]);
    }
    genotype_loglik
}

struct CiCandidate {
    start_size: i32,
    end_size: i32,
    loglik: f64,
}

/// Expands an interval around `best_x`, at each step taking whichever shift
/// improves the local likelihood, and collapses it back to the smallest
/// stretch still holding the bulk of the posterior mass.
fn confidence_interval(best_x: &mut i32, eval: &mut dyn FnMut(i32) -> f64) -> (i32, i32) {
    let mut x_from = *best_x;
    let mut x_to = *best_x;

    let mut candidates: Vec<CiCandidate> = Vec::new();
    let mut top_loglik = eval(*best_x);
    let mut total_loglik = top_loglik;
    candidates.push(CiCandidate {
        start_size: x_from,
        end_size: x_to,
        loglik: total_loglik,
    });

    let mut likelihood_ratio = 1.0;
    while likelihood_ratio >= CI_LIKELIHOOD_RATIO_STOP && x_to - x_from <= CI_MAX_INTERVAL_WIDTH {
        let loglik_shift_left = eval(x_from - 1);
        let loglik_shift_right = eval(x_to + 1);

        let step_loglik;
        if loglik_shift_left >= loglik_shift_right {
            x_from -= 1;
            step_loglik = eval(x_from);
            if step_loglik > top_loglik {
                top_loglik = step_loglik;
                *best_x = x_from;
            }
        } else {
            x_to += 1;
            step_loglik = eval(x_to);
            if step_loglik > top_loglik {
                top_loglik = step_loglik;
                *best_x = x_to;
            }
        }

        total_loglik = log_sum(total_loglik, step_loglik);
        candidates.push(CiCandidate {
            start_size: x_from,
            end_size: x_to,
            loglik: total_loglik,
        });
        likelihood_ratio = (step_loglik - top_loglik).exp();
    }

    let mut chosen = candidates.len() - 1;
    while chosen > 0 {
        let narrower = &candidates[chosen - 1];
        if (narrower.loglik - total_loglik).exp() >= CI_COLLAPSE_MASS {
            chosen -= 1;
        } else {
            break;
        }
    }

    (candidates[chosen].start_size, candidates[chosen].end_size)
}

/// Same walk along x while the orthogonal coordinate drifts by at most one
/// per step to capture coupled uncertainty.
fn confidence_interval_with_drift(
    best_x: i32,
    best_y: i32,
    eval: &mut dyn FnMut(i32, i32) -> f64,
) -> (i32, i32) {
    let mut x_from = best_x;
    let mut x_to = best_x;
    let mut y_from = best_y;
    let mut y_to = best_y;

    let mut candidates: Vec<CiCandidate> = Vec::new();
    let top_initial = eval(best_x, best_y);
    let mut top_loglik = top_initial;
    let mut total_loglik = top_initial;
    candidates.push(CiCandidate {
        start_size: x_from,
        end_size: x_to,
        loglik: total_loglik,
    });

    let mut likelihood_ratio = 1.0;
    while likelihood_ratio >= CI_LIKELIHOOD_RATIO_STOP && x_to - x_from <= CI_MAX_INTERVAL_WIDTH {
        let left_down = eval(x_from - 1, y_from - 1);
        let left_same = eval(x_from - 1, y_from);
        let left_up = eval(x_from - 1, y_from + 1);
        let left_best = left_down.max(left_same).max(left_up);

        let right_up = eval(x_to + 1, y_to + 1);
        let right_same = eval(x_to + 1, y_to);
        let right_down = eval(x_to + 1, y_to - 1);
        let right_best = right_up.max(right_same).max(right_down);

        let step_loglik;
        if left_best >= right_best {
            x_from -= 1;
            if left_down > left_same && left_down > left_up {
                y_from -= 1;
            } else if left_up > left_down && left_up > left_same {
                y_from += 1;
            }
            step_loglik = eval(x_from, y_from);
        } else {
            x_to += 1;
            if right_up > right_same && right_up > right_down {
                y_to += 1;
            } else if right_down > right_up && right_down > right_same {
                y_to -= 1;
            }
            step_loglik = eval(x_to, y_to);
        }

        if step_loglik > top_loglik {
            top_loglik = step_loglik;
        }

        total_loglik = log_sum(total_loglik, step_loglik);
        candidates.push(CiCandidate {
            start_size: x_from,
            end_size: x_to,
            loglik: total_loglik,
        });
        likelihood_ratio = (step_loglik - top_loglik).exp();
    }

    let mut chosen = candidates.len() - 1;
    while chosen > 0 {
        let narrower = &candidates[chosen - 1];
        if (narrower.loglik - total_loglik).exp() >= CI_COLLAPSE_MASS {
            chosen -= 1;
        } else {
            break;
        }
    }

    (candidates[chosen].start_size, candidates[chosen].end_size)
}

fn genotype_one_allele(
    motif_length: i32,
    top_logliks: &[f64],
    frag_logliks: &mut FragLogliks,
    candidates: &[i32],
) -> RepeatGenotype {
    let mut best_size = 0;
    let mut max_loglik = f64::MIN;
    for &motif_count in candidates {
        let loglik = one_allele_loglik(motif_count, top_logliks, frag_logliks);
        if max_loglik < loglik {
            max_loglik = loglik;
            best_size = motif_count;
        }
    }

    let mut eval = |motif_count: i32| one_allele_loglik(motif_count, top_logliks, frag_logliks);
    let ci = confidence_interval(&mut best_size, &mut eval);

    let mut genotype = RepeatGenotype::new(motif_length, &[best_size]);
    // The walk may move the mode; the interval must keep covering it.
    genotype.set_short_allele_ci(ci.0.min(best_size), ci.1.max(best_size));
    genotype
}

fn genotype_two_alleles(
    motif_length: i32,
    fragment_length: i32,
    top_logliks: &[f64],
    frag_logliks: &mut FragLogliks,
    candidates: &[i32],
) -> RepeatGenotype {
    // Likelihood surface over ordered candidate pairs; the upper triangle
    // stays at the sentinel.
    let mut surface = Array2::<f64>::from_elem((candidates.len(), candidates.len()), f64::MIN);
    for (short_index, &short_size) in candidates.iter().enumerate() {
        for (long_index, &long_size) in candidates.iter().enumerate() {
            if short_size > long_size {
                continue;
            }
            surface[(short_index, long_index)] = short_and_long_allele_loglik(
                short_size,
                long_size,
                motif_length,
                fragment_length,
                top_logliks,
                frag_logliks,
            );
        }
    }

    let mut best_short = 0;
    let mut best_long = 0;
    let mut max_loglik = f64::MIN;
    for (short_index, &short_size) in candidates.iter().enumerate() {
        for (long_index, &long_size) in candidates.iter().enumerate() {
            if short_size > long_size {
                continue;
            }
            let loglik = surface[(short_index, long_index)];
            if max_loglik < loglik {
                max_loglik = loglik;
                best_short = short_size;
                best_long = long_size;
            }
        }
    }

    let mut eval_short_long = |short: i32, long: i32| {
        short_and_long_allele_loglik(
            short,
            long,
            motif_length,
            fragment_length,
            top_logliks,
            frag_logliks,
        )
    };
    let short_ci = confidence_interval_with_drift(best_short, best_long, &mut eval_short_long);

    let mut eval_long_short = |long: i32, short: i32| {
        short_and_long_allele_loglik(
            short,
            long,
            motif_length,
            fragment_length,
            top_logliks,
            frag_logliks,
        )
    };
    let long_ci = confidence_interval_with_drift(best_long, best_short, &mut eval_long_short);

    let mut genotype = RepeatGenotype::new(motif_length, &[best_short, best_long]);
    genotype.set_short_allele_ci(short_ci.0, short_ci.1);
    genotype.set_long_allele_ci(long_ci.0, long_ci.1);
    genotype
}

/// Genotypes the repeat summarized by `align_matrix`. Returns `None` when no
/// informative reads remain.
pub fn genotype_repeat(
    allele_count: AlleleCount,
    motif_length: i32,
    read_length: i32,
    fragment_length: i32,
    align_matrix: &mut AlignMatrix,
) -> Option<RepeatGenotype> {
    align_matrix.remove_outside_pairs();
    if align_matrix.num_reads() == 0 {
        return None;
    }

    let candidates = allele_size_candidates(read_length, motif_length, align_matrix);
    if candidates.is_empty() {
        return None;
    }

    let mut frag_logliks = FragLogliks::new(motif_length, read_length, fragment_length, align_matrix);
    let top_logliks = top_frag_logliks(&mut frag_logliks, &candidates);

    let genotype = match allele_count {
        AlleleCount::Two => genotype_two_alleles(
            motif_length,
            fragment_length,
            &top_logliks,
            &mut frag_logliks,
            &candidates,
        ),
        AlleleCount::One => {
            genotype_one_allele(motif_length, &top_logliks, &mut frag_logliks, &candidates)
        }
    };
    Some(genotype)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::operations::decode_graph_alignment;
    use crate::blueprint::{decode_features, make_graph};
    use crate::graph::Graph;

    fn make_str_graph() -> Graph {
        make_graph(&decode_features("ATTCGA(C)*ATGTCG").unwrap())
    }

    fn spanning_pair(graph: &Graph, matrix: &mut AlignMatrix, copies: usize) {
        let middle = "1[1M]".repeat(copies);
        let read = decode_graph_alignment(3, &format!("0[3M]{middle}2[4M]"), graph).unwrap();
        let mate = decode_graph_alignment(4, &format!("0[2M]{middle}2[5M]"), graph).unwrap();
        matrix.add_pair(&read, &mate);
    }

    #[test]
    fn candidates_cover_spanning_sizes_and_long_flanking_reads() {
        let graph = make_str_graph();
        let mut matrix = AlignMatrix::new(1);
        spanning_pair(&graph, &mut matrix, 3);
        spanning_pair(&graph, &mut matrix, 1);

        assert_eq!(vec![1, 3], allele_size_candidates(10, 1, &matrix));
    }

    #[test]
    fn candidates_include_expansion_guesses_when_irrs_exist() {
        let graph = make_str_graph();
        let mut matrix = AlignMatrix::new(1);

        let in_repeat = decode_graph_alignment(0, "1[1M]".repeat(8).as_str(), &graph).unwrap();
        let flanking = decode_graph_alignment(3, "0[3M]1[1M]1[1M]1[1M]1[1M]1[1M]", &graph).unwrap();
        matrix.add_pair(&in_repeat, &flanking);

        let candidates = allele_size_candidates(8, 1, &matrix);
        // read_len / motif_len and the two expansion guesses:
        // 8 + 1*8/0.5 = 24 and 8 + 2*8/0.5 = 40, plus the longest flanking size.
        assert_eq!(vec![5, 8, 24, 40], candidates);
    }

    #[test]
    fn homozygous_spanning_evidence_yields_a_tight_genotype() {
        let graph = make_str_graph();
        let mut matrix = AlignMatrix::new(1);
        for _ in 0..5 {
            spanning_pair(&graph, &mut matrix, 3);
        }

        let genotype = genotype_repeat(AlleleCount::Two, 1, 10, 15, &mut matrix).unwrap();
        assert_eq!(3, genotype.short_allele_size());
        assert_eq!(3, genotype.long_allele_size());
        assert!(genotype.short_allele().ci_lower <= 3 && 3 <= genotype.short_allele().ci_upper);
    }

    #[test]
    fn heterozygous_spanning_evidence_separates_the_alleles() {
        let graph = make_str_graph();
        let mut matrix = AlignMatrix::new(1);
        for _ in 0..4 {
            spanning_pair(&graph, &mut matrix, 1);
            spanning_pair(&graph, &mut matrix, 3);
        }

        let genotype = genotype_repeat(AlleleCount::Two, 1, 10, 15, &mut matrix).unwrap();
        assert_eq!(1, genotype.short_allele_size());
        assert_eq!(3, genotype.long_allele_size());
        assert!(genotype.short_allele().ci_lower <= 1);
        assert!(genotype.long_allele().ci_upper >= 3);
    }

    #[test]
    fn haploid_genotyping_returns_one_allele() {
        let graph = make_str_graph();
        let mut matrix = AlignMatrix::new(1);
        for _ in 0..5 {
            spanning_pair(&graph, &mut matrix, 2);
        }

        let genotype = genotype_repeat(AlleleCount::One, 1, 10, 15, &mut matrix).unwrap();
        assert_eq!(1, genotype.num_alleles());
        assert_eq!(2, genotype.short_allele_size());
    }

    #[test]
    fn empty_matrix_produces_no_genotype() {
        let mut matrix = AlignMatrix::new(1);
        assert!(genotype_repeat(AlleleCount::Two, 1, 10, 15, &mut matrix).is_none());
    }

    #[test]
    fn genotypes_keep_alleles_ordered() {
        let genotype = RepeatGenotype::new(3, &[2, 5]);
        assert_eq!(2, genotype.short_allele_size());
        assert_eq!(5, genotype.long_allele_size());
    }
}
