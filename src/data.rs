use std::fmt;

use crate::error::ExtractError;
use crate::model::VectorLookup;

/// Assigns a categorical label to a node identifier.
pub trait Classifier {
    fn classify(&self, id: &str) -> String;
}

impl<F> Classifier for F
where
    F: Fn(&str) -> String,
{
    fn classify(&self, id: &str) -> String {
        self(id)
    }
}

/// The two node kinds present in the chemical/protein graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeCategory {
    Chemical,
    Protein,
}

impl NodeCategory {
    /// PubChem compound identifiers carry this prefix.
    pub const CHEMICAL_PREFIX: &'static str = "CID";

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeCategory::Chemical => "Chemical",
            NodeCategory::Protein => "Protein",
        }
    }
}

impl fmt::Display for NodeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// "CID..." is a chemical, everything else a protein.
pub fn classify_node(id: &str) -> NodeCategory {
    if id.starts_with(NodeCategory::CHEMICAL_PREFIX) {
        NodeCategory::Chemical
    } else {
        NodeCategory::Protein
    }
}

/// Labels ids by a literal prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixClassifier {
    pub prefix: String,
    pub matched: String,
    pub unmatched: String,
}

impl PrefixClassifier {
    pub fn new(
        prefix: impl Into<String>,
        matched: impl Into<String>,
        unmatched: impl Into<String>,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            matched: matched.into(),
            unmatched: unmatched.into(),
        }
    }
}

impl Default for PrefixClassifier {
    fn default() -> Self {
        Self::new(
            NodeCategory::CHEMICAL_PREFIX,
            NodeCategory::Chemical.as_str(),
            NodeCategory::Protein.as_str(),
        )
    }
}

impl Classifier for PrefixClassifier {
    fn classify(&self, id: &str) -> String {
        if id.starts_with(&self.prefix) {
            self.matched.clone()
        } else {
            self.unmatched.clone()
        }
    }
}

/// Dense vectors and labels, both parallel to `ids`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedData {
    pub ids: Vec<String>,
    pub matrix: Vec<Vec<f64>>,
    pub labels: Vec<String>,
}

impl ExtractedData {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Columns per row (0 for an empty matrix).
    pub fn dimensions(&self) -> usize {
        self.matrix.first().map_or(0, Vec::len)
    }
}

/// Build the `[n, d]` matrix and the label of every node, in `ids` order.
pub fn extract<L, C>(ids: &[String], lookup: &L, classifier: &C) -> Result<ExtractedData, ExtractError>
where
    L: VectorLookup + ?Sized,
    C: Classifier + ?Sized,
{
    let mut matrix = Vec::with_capacity(ids.len());
    let mut labels = Vec::with_capacity(ids.len());
    let mut expected_dim = None;

    for id in ids {
        let vector = lookup
            .vector(id)
            .ok_or_else(|| ExtractError::MissingVector(id.clone()))?;

        let expected = *expected_dim.get_or_insert(vector.len());
        if vector.len() != expected {
            return Err(ExtractError::DimensionMismatch {
                id: id.clone(),
                expected,
                found: vector.len(),
            });
        }

        matrix.push(vector.iter().map(|&v| v as f64).collect());
        labels.push(classifier.classify(id));
    }

    Ok(ExtractedData {
        ids: ids.to_vec(),
        matrix,
        labels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn ids(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    fn lookup(entries: &[(&str, Vec<f32>)]) -> HashMap<String, Vec<f32>> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_classify_node_by_prefix() {
        assert_eq!(classify_node("CID12345"), NodeCategory::Chemical);
        assert_eq!(classify_node("P53_HUMAN"), NodeCategory::Protein);
        // Prefix match is case sensitive and anchored at the start.
        assert_eq!(classify_node("cid1"), NodeCategory::Protein);
        assert_eq!(classify_node("XCID1"), NodeCategory::Protein);
        assert_eq!(classify_node(""), NodeCategory::Protein);
    }

    #[test]
    fn test_prefix_classifier_agrees_with_category_rule() {
        let classifier = PrefixClassifier::default();
        for id in ["CID1", "CID", "PROT1", "9606.ENSP0000", "C1D"] {
            assert_eq!(classifier.classify(id), classify_node(id).to_string());
        }
    }

    #[test]
    fn test_extract_rows_follow_id_order() {
        let ids = ids(&["PROT1", "CID1", "CID2"]);
        let vectors = lookup(&[
            ("CID1", vec![1.0, 2.0]),
            ("CID2", vec![3.0, 4.0]),
            ("PROT1", vec![5.0, 6.0]),
        ]);

        let data = extract(&ids, &vectors, &PrefixClassifier::default()).unwrap();

        assert_eq!(data.len(), 3);
        assert_eq!(data.dimensions(), 2);
        assert_eq!(data.matrix[0], vec![5.0, 6.0]);
        assert_eq!(data.matrix[2], vec![3.0, 4.0]);
        assert_eq!(data.labels, vec!["Protein", "Chemical", "Chemical"]);
    }

    #[test]
    fn test_missing_vector_is_fatal() {
        let ids = ids(&["CID1", "PROT404"]);
        let vectors = lookup(&[("CID1", vec![1.0])]);

        let err = extract(&ids, &vectors, &PrefixClassifier::default()).unwrap_err();
        assert_eq!(err, ExtractError::MissingVector("PROT404".to_string()));
    }

    #[test]
    fn test_dimension_mismatch_is_fatal() {
        let ids = ids(&["CID1", "PROT1"]);
        let vectors = lookup(&[("CID1", vec![1.0, 2.0]), ("PROT1", vec![1.0])]);

        let err = extract(&ids, &vectors, &PrefixClassifier::default()).unwrap_err();
        assert_eq!(
            err,
            ExtractError::DimensionMismatch {
                id: "PROT1".to_string(),
                expected: 2,
                found: 1,
            }
        );
    }

    #[test]
    fn test_closure_classifier() {
        let ids = ids(&["GENE_A", "CID1"]);
        let vectors = lookup(&[("GENE_A", vec![0.0]), ("CID1", vec![1.0])]);
        let by_length = |id: &str| format!("len{}", id.len());

        let data = extract(&ids, &vectors, &by_length).unwrap();
        assert_eq!(data.labels, vec!["len6", "len4"]);
    }

    #[test]
    fn test_empty_ids_produce_empty_matrix() {
        let data = extract(&[], &lookup(&[]), &PrefixClassifier::default()).unwrap();
        assert!(data.is_empty());
        assert_eq!(data.dimensions(), 0);
    }
}
