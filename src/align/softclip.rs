//! # Softclipping of uncertain alignment flanks
//!
//! The outermost stretch of an alignment is only trustworthy if no other
//! walk through the graph explains the same query bases almost equally
//! well. The affix under scrutiny is realigned along every alternative walk
//! of the same reference length; the alignment is then clipped back to the
//! point where the well-scoring walks agree.
use crate::align::linear::gapless_score;
use crate::align::operations::{AlignmentScores, GraphAlignment};
use crate::graph::Path;

/// Softclips the alignment prefix covering `reference_length` bases when
/// alternative graph walks make it ambiguous.
pub fn shrink_uncertain_prefix(reference_length: usize, query: &str, alignment: &mut GraphAlignment) {
    let scores = AlignmentScores::default();

    let mut shrunk_path = alignment.path().clone();
    shrink_prefix_until_node_boundary(&mut shrunk_path, reference_length);
    let prefix_reference_length = alignment.reference_length() - shrunk_path.length();
    if prefix_reference_length == 0 {
        return;
    }

    let removed_nodes = alignment.path().node_count() - shrunk_path.node_count();
    let prefix_query_length = query_length_up_to_node(alignment, removed_nodes);

    // The query is too short to respell the prefix along another walk.
    if prefix_query_length < prefix_reference_length {
        alignment.shrink_start(prefix_reference_length);
        return;
    }

    let trimmed_query_prefix =
        &query[prefix_query_length - prefix_reference_length..prefix_query_length];

    let alternate_prefixes = compute_alternate_prefixes(&shrunk_path, prefix_reference_length);
    let cutoff = (prefix_reference_length as i32 / 2) * scores.match_score;
    let high_scoring: Vec<&Path> = alternate_prefixes
        .iter()
        .filter(|path| gapless_score(&path.seq(), 0, trimmed_query_prefix, &scores) >= cutoff)
        .collect();

    if high_scoring.is_empty() {
        alignment.shrink_start(prefix_reference_length);
        return;
    }

    let shared_length = common_suffix_length(&high_scoring);
    alignment.shrink_start(prefix_reference_length - shared_length);
}

/// Counterpart of [`shrink_uncertain_prefix`] for alignment suffixes.
pub fn shrink_uncertain_suffix(reference_length: usize, query: &str, alignment: &mut GraphAlignment) {
    let scores = AlignmentScores::default();

    let mut shrunk_path = alignment.path().clone();
    shrink_suffix_until_node_boundary(&mut shrunk_path, reference_length);
    let suffix_reference_length = alignment.reference_length() - shrunk_path.length();
    if suffix_reference_length == 0 {
        return;
    }

    let prefix_query_length = query_length_up_to_node(alignment, shrunk_path.node_count());
    let suffix_query_length = alignment.query_length() - prefix_query_length;

    if suffix_query_length < suffix_reference_length {
        alignment.shrink_end(suffix_reference_length);
        return;
    }

    let trimmed_query_suffix =
        &query[prefix_query_length..prefix_query_length + suffix_reference_length];

    let alternate_suffixes = compute_alternate_suffixes(&shrunk_path, suffix_reference_length);
    let cutoff = (suffix_reference_length as i32 / 2) * scores.match_score;
    let high_scoring: Vec<&Path> = alternate_suffixes
        .iter()
        .filter(|path| gapless_score(&path.seq(), 0, trimmed_query_suffix, &scores) >= cutoff)
        .collect();

    if high_scoring.is_empty() {
        alignment.shrink_end(suffix_reference_length);
        return;
    }

    let shared_length = common_prefix_length(&high_scoring);
    alignment.shrink_end(suffix_reference_length - shared_length);
}

fn shrink_prefix_until_node_boundary(path: &mut Path, max_shrink_length: usize) {
    let mut accumulated = 0;
    while path.node_count() > 1 && accumulated + path.node_overlap_length(0) <= max_shrink_length {
        accumulated += path.node_overlap_length(0);
        path.remove_start_node();
    }
}

fn shrink_suffix_until_node_boundary(path: &mut Path, max_shrink_length: usize) {
    let mut accumulated = 0;
    while path.node_count() > 1 {
        let last_overlap = path.node_overlap_length(path.node_count() - 1);
        if accumulated + last_overlap > max_shrink_length {
            break;
        }
        accumulated += last_overlap;
        path.remove_end_node();
    }
}

/// Walks of exactly `length` bases ending where `path` starts.
fn compute_alternate_prefixes<'g>(path: &Path<'g>, length: usize) -> Vec<Path<'g>> {
    let mut point = path.clone();
    point.shrink_end_by(point.length());
    point
        .extend_start_by(length)
        .into_iter()
        .filter(|extension| extension.length() == length)
        .collect()
}

/// Walks of exactly `length` bases starting where `path` ends.
fn compute_alternate_suffixes<'g>(path: &Path<'g>, length: usize) -> Vec<Path<'g>> {
    let mut point = path.clone();
    point.shrink_start_by(point.length());
    point
        .extend_end_by(length)
        .into_iter()
        .filter(|extension| extension.length() == length)
        .collect()
}

fn query_length_up_to_node(alignment: &GraphAlignment, terminal_node_index: usize) -> usize {
    alignment.node_alignments()[..terminal_node_index]
        .iter()
        .map(|node_alignment| node_alignment.query_length())
        .sum()
}

fn common_suffix_length(paths: &[&Path]) -> usize {
    let min_node_count = paths.iter().map(|path| path.node_count()).min().unwrap();
    let first = paths[0];

    let mut shared = 0;
    for index in 0..min_node_count {
        let first_reverse_index = first.node_count() - index - 1;
        let node = first.node_id(first_reverse_index);
        for path in paths {
            let reverse_index = path.node_count() - index - 1;
            if path.node_id(reverse_index) != node {
                return shared;
            }
        }
        shared += first.node_overlap_length(first_reverse_index);
    }
    shared
}

fn common_prefix_length(paths: &[&Path]) -> usize {
    let min_node_count = paths.iter().map(|path| path.node_count()).min().unwrap();
    let first = paths[0];

    let mut shared = 0;
    for index in 0..min_node_count {
        let node = first.node_id(index);
        for path in paths {
            if path.node_id(index) != node {
                return shared;
            }
        }
        shared += first.node_overlap_length(index);
    }
    shared
}
