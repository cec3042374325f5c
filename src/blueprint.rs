//! # Locus blueprint
//!
//! Compiles a locus structure expression such as `ATTCGA(C)*ATGTCG` into a
//! list of typed features and from there into the locus graph. The first
//! and last features must be plain sequence and become the flanks; repeats
//! get self-loops; skippable features are bridged by extra edges.
use anyhow::{bail, ensure, Result};

use crate::graph::{Graph, NodeId};

const BASE_SYMBOLS: &str = "ACGTBDHKMNSRVWY";
const COUNT_QUANTIFIERS: &str = "*+?";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureKind {
    LeftFlank,
    RightFlank,
    SkippableRepeat,
    UnskippableRepeat,
    InsertionOrDeletion,
    Swap,
    Interruption,
}

impl FeatureKind {
    pub fn is_skippable(self) -> bool {
        matches!(
            self,
            FeatureKind::SkippableRepeat | FeatureKind::InsertionOrDeletion
        )
    }

    pub fn defines_variant(self) -> bool {
        matches!(
            self,
            FeatureKind::SkippableRepeat
                | FeatureKind::UnskippableRepeat
                | FeatureKind::InsertionOrDeletion
                | FeatureKind::Swap
        )
    }

    pub fn is_repeat(self) -> bool {
        matches!(
            self,
            FeatureKind::SkippableRepeat | FeatureKind::UnskippableRepeat
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feature {
    pub kind: FeatureKind,
    pub sequences: Vec<String>,
    pub nodes: Vec<NodeId>,
}

pub type Blueprint = Vec<Feature>;

/// Splits a structure expression into feature tokens.
pub fn tokenize(structure: &str) -> Vec<String> {
    let symbols: Vec<char> = structure.chars().collect();
    let mut tokens = Vec::new();
    let mut token = String::new();

    for (index, &symbol) in symbols.iter().enumerate() {
        token.push(symbol);

        let at_last_symbol = index + 1 == symbols.len();
        let next_symbol = symbols.get(index + 1);
        let terminates = at_last_symbol
            || COUNT_QUANTIFIERS.contains(symbol)
            || (symbol == ')' && !COUNT_QUANTIFIERS.contains(*next_symbol.unwrap()))
            || *next_symbol.unwrap() == '(';

        if terminates {
            tokens.push(std::mem::take(&mut token));
        }
    }

    tokens
}

fn is_plain_sequence(text: &str) -> bool {
    !text.is_empty() && text.chars().all(|symbol| BASE_SYMBOLS.contains(symbol))
}

/// Parses one token into its feature kind and allele sequences.
fn parse_token(token: &str) -> Result<(FeatureKind, Vec<String>)> {
    if is_plain_sequence(token) {
        return Ok((FeatureKind::Interruption, vec![token.to_string()]));
    }

    if let Some(quantified) = token.strip_prefix('(') {
        if let Some(sequence) = quantified.strip_suffix(")*") {
            ensure!(is_plain_sequence(sequence), "Could not parse the token {token}");
            return Ok((FeatureKind::SkippableRepeat, vec![sequence.to_string()]));
        }
        if let Some(sequence) = quantified.strip_suffix(")+") {
            ensure!(is_plain_sequence(sequence), "Could not parse the token {token}");
            return Ok((FeatureKind::UnskippableRepeat, vec![sequence.to_string()]));
        }
        if let Some(sequence) = quantified.strip_suffix(")?") {
            ensure!(is_plain_sequence(sequence), "Could not parse the token {token}");
            return Ok((FeatureKind::InsertionOrDeletion, vec![sequence.to_string()]));
        }
        if let Some(alleles) = quantified.strip_suffix(')') {
            let parts: Vec<&str> = alleles.split('|').collect();
            ensure!(
                parts.len() == 2 && parts.iter().all(|part| is_plain_sequence(part)),
                "Could not parse the token {token}"
            );
            return Ok((
                FeatureKind::Swap,
                parts.iter().map(|part| part.to_string()).collect(),
            ));
        }
    }

    bail!("Could not parse the token {token}")
}

/// Decodes a full structure expression into a blueprint with node ids
/// assigned in feature order.
pub fn decode_features(structure: &str) -> Result<Blueprint> {
    let tokens = tokenize(structure);
    ensure!(
        tokens.len() >= 2,
        "Structure {structure} must contain at least both flanks"
    );

    let mut blueprint = Blueprint::new();
    let mut next_node: NodeId = 0;

    for (index, token) in tokens.iter().enumerate() {
        let (mut kind, sequences) = parse_token(token)?;

        if index == 0 {
            ensure!(
                kind == FeatureKind::Interruption,
                "Structure {structure} must begin with a plain sequence"
            );
            kind = FeatureKind::LeftFlank;
        } else if index == tokens.len() - 1 {
            ensure!(
                kind == FeatureKind::Interruption,
                "Structure {structure} must end with a plain sequence"
            );
            kind = FeatureKind::RightFlank;
        }

        let nodes: Vec<NodeId> = (0..sequences.len())
            .map(|offset| next_node + offset as NodeId)
            .collect();
        next_node += sequences.len() as NodeId;

        blueprint.push(Feature {
            kind,
            sequences,
            nodes,
        });
    }

    ensure!(
        blueprint.iter().any(|feature| feature.kind.defines_variant()),
        "Structure {structure} defines no variant"
    );

    Ok(blueprint)
}

/// Builds the locus graph described by a blueprint.
pub fn make_graph(blueprint: &Blueprint) -> Graph {
    assert!(blueprint.first().map(|feature| feature.kind) == Some(FeatureKind::LeftFlank));
    assert!(blueprint.last().map(|feature| feature.kind) == Some(FeatureKind::RightFlank));

    let node_count: usize = blueprint.iter().map(|feature| feature.sequences.len()).sum();
    let mut graph = Graph::new(node_count);

    for feature in blueprint {
        for (sequence, &node) in feature.sequences.iter().zip(&feature.nodes) {
            graph.set_node_sequence(node, sequence);
        }
        if feature.kind.is_repeat() {
            let node = feature.nodes[0];
            graph.add_edge(node, node);
        }
    }

    for index in 0..blueprint.len() - 1 {
        connect_to_downstream_features(blueprint, index, &mut graph);
    }

    graph
}

/// Connects a feature to the next feature and across any run of skippable
/// features that follows it.
fn connect_to_downstream_features(blueprint: &Blueprint, index: usize, graph: &mut Graph) {
    let source = &blueprint[index];
    let mut downstream_index = index + 1;

    while blueprint[downstream_index].kind.is_skippable() {
        connect_features(source, &blueprint[downstream_index], graph);
        downstream_index += 1;
    }

    connect_features(source, &blueprint[downstream_index], graph);
}

fn connect_features(source: &Feature, sink: &Feature, graph: &mut Graph) {
    for &from in &source.nodes {
        for &to in &sink.nodes {
            graph.add_edge(from, to);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structures_split_into_feature_tokens() {
        let tokens = tokenize("ATGC(CAG)+GTCG(AAA|TTT)(AGTC)?(CAG)*");
        let expected = vec!["ATGC", "(CAG)+", "GTCG", "(AAA|TTT)", "(AGTC)?", "(CAG)*"];
        assert_eq!(expected, tokens);
    }

    #[test]
    fn typical_tokens_are_parsed() {
        assert_eq!(
            (FeatureKind::InsertionOrDeletion, vec!["AGTC".to_string()]),
            parse_token("(AGTC)?").unwrap()
        );
        assert_eq!(
            (FeatureKind::SkippableRepeat, vec!["CAG".to_string()]),
            parse_token("(CAG)*").unwrap()
        );
        assert_eq!(
            (FeatureKind::UnskippableRepeat, vec!["CAG".to_string()]),
            parse_token("(CAG)+").unwrap()
        );
        assert_eq!(
            (FeatureKind::Interruption, vec!["GTCG".to_string()]),
            parse_token("GTCG").unwrap()
        );
        assert_eq!(
            (FeatureKind::Swap, vec!["AAA".to_string(), "TTT".to_string()]),
            parse_token("(AAA|TTT)").unwrap()
        );
        assert!(parse_token("(CAG)!").is_err());
        assert!(parse_token("(C A G)*").is_err());
    }

    #[test]
    fn single_unit_str_graph_is_constructed() {
        let blueprint = decode_features("ATTCGA(C)*ATGTCG").unwrap();
        let graph = make_graph(&blueprint);

        assert_eq!(3, graph.node_count());
        assert_eq!("ATTCGA", graph.node_sequence(0));
        assert_eq!("C", graph.node_sequence(1));
        assert_eq!("ATGTCG", graph.node_sequence(2));

        assert!(graph.has_edge(0, 1));
        assert!(graph.has_edge(1, 1));
        assert!(graph.has_edge(1, 2));
    }

    #[test]
    fn multi_unit_str_graph_is_constructed() {
        let blueprint = decode_features("AAAATT(AGG)*ATG(CG)*GGGGCC").unwrap();
        let graph = make_graph(&blueprint);

        assert_eq!(5, graph.node_count());
        assert_eq!(8, graph.edge_count());

        assert_eq!("AAAATT", graph.node_sequence(0));
        assert_eq!("AGG", graph.node_sequence(1));
        assert_eq!("ATG", graph.node_sequence(2));
        assert_eq!("CG", graph.node_sequence(3));
        assert_eq!("GGGGCC", graph.node_sequence(4));

        assert!(graph.has_edge(0, 1));
        assert!(graph.has_edge(0, 2));
        assert!(graph.has_edge(1, 1));
        assert!(graph.has_edge(1, 2));
        assert!(graph.has_edge(2, 3));
        assert!(graph.has_edge(2, 4));
        assert!(graph.has_edge(3, 3));
        assert!(graph.has_edge(3, 4));
    }

    #[test]
    fn swap_and_optional_features_share_edges() {
        let blueprint = decode_features("AC(T|G)CT(CA)?TGTGT").unwrap();
        let graph = make_graph(&blueprint);

        assert_eq!(6, graph.node_count());
        assert!(graph.has_edge(0, 1));
        assert!(graph.has_edge(0, 2));
        assert!(graph.has_edge(1, 3));
        assert!(graph.has_edge(2, 3));
        assert!(graph.has_edge(3, 4));
        assert!(graph.has_edge(3, 5));
        assert!(graph.has_edge(4, 5));
        assert!(!graph.has_edge(1, 2));
    }

    #[test]
    fn malformed_structures_are_rejected() {
        assert!(decode_features("(C)*ATGTCG").is_err());
        assert!(decode_features("ATTCGA(C)*").is_err());
        assert!(decode_features("ATTCGAATGTCG").is_err());
        assert!(decode_features("ATT(C)*AT(GT").is_err());
    }
}
