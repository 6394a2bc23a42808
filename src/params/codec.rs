//! params::codec — flat/hierarchical parameter conversion with a fixed skeleton.
//!
//! The first parameter value a caller supplies defines the skeleton: the
//! names, nesting and sequence lengths. Every later conversion in either
//! direction is checked against that skeleton, so the index order never
//! depends on the value being converted.
//!
//! Canonical names follow the nesting: top-level scalars keep their name,
//! sequence elements are `name[i]` (0-based) and group members are
//! `group.member`. Flat vectors are named `x0, x1, ...`.
use crate::{
    errors::{CalibError, CalibResult},
    types::Theta,
};
use serde::{Deserialize, Serialize};

/// One entry of a named parameter structure.
///
/// `None` marks a missing initial value (resolved later from bounds).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParameterNode {
    Scalar(Option<f64>),
    Sequence(Vec<Option<f64>>),
    Group(Vec<(String, ParameterNode)>),
}

impl ParameterNode {
    pub fn scalar(value: f64) -> Self {
        ParameterNode::Scalar(Some(value))
    }

    pub fn missing() -> Self {
        ParameterNode::Scalar(None)
    }

    pub fn sequence(values: &[f64]) -> Self {
        ParameterNode::Sequence(values.iter().copied().map(Some).collect())
    }

    pub fn group(members: Vec<(&str, ParameterNode)>) -> Self {
        ParameterNode::Group(members.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
    }
}

/// User-facing parameter representation: a flat ordered sequence or a named
/// hierarchical structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParameterVector {
    Flat(Vec<Option<f64>>),
    Named(Vec<(String, ParameterNode)>),
}

impl ParameterVector {
    /// Flat vector with every value present.
    pub fn flat(values: &[f64]) -> Self {
        ParameterVector::Flat(values.iter().copied().map(Some).collect())
    }

    /// Flat vector where `None` entries are missing initial values.
    pub fn flat_with_missing(values: Vec<Option<f64>>) -> Self {
        ParameterVector::Flat(values)
    }

    pub fn named(members: Vec<(&str, ParameterNode)>) -> Self {
        ParameterVector::Named(members.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
    }

    /// Look up a top-level member of a named structure.
    pub fn get(&self, name: &str) -> Option<&ParameterNode> {
        match self {
            ParameterVector::Flat(_) => None,
            ParameterVector::Named(members) => {
                members.iter().find(|(k, _)| k == name).map(|(_, v)| v)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum SkeletonNode {
    Scalar,
    Sequence(usize),
    Group(Vec<(String, SkeletonNode)>),
}

#[derive(Debug, Clone, PartialEq)]
enum Skeleton {
    Flat(usize),
    Named(Vec<(String, SkeletonNode)>),
}

/// ParameterCodec — stable mapping between a [`ParameterVector`] and a flat
/// canonical vector of length `n`.
///
/// Construction captures the skeleton from the caller's initial value; the
/// skeleton is never re-inferred afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterCodec {
    skeleton: Skeleton,
    names: Vec<String>,
}

impl ParameterCodec {
    /// Capture the skeleton of `initial`.
    ///
    /// # Errors
    /// - [`CalibError::Structure`] if a group repeats a member name or a name
    ///   is empty.
    pub fn from_initial(initial: &ParameterVector) -> CalibResult<Self> {
        let mut names = Vec::new();
        let skeleton = match initial {
            ParameterVector::Flat(values) => {
                names.extend((0..values.len()).map(|i| format!("x{i}")));
                Skeleton::Flat(values.len())
            }
            ParameterVector::Named(members) => {
                Skeleton::Named(capture_members(members, "", &mut names)?)
            }
        };
        Ok(Self { skeleton, names })
    }

    /// Total number of scalar parameters `n`.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Canonical names in index order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Flatten a value that follows the captured skeleton.
    ///
    /// # Errors
    /// - [`CalibError::Shape`] if a flat vector has the wrong length.
    /// - [`CalibError::Structure`] if a named value deviates from the skeleton
    ///   (different names, order, kinds, or sequence lengths).
    pub fn flatten(&self, par: &ParameterVector) -> CalibResult<Vec<Option<f64>>> {
        let mut out = Vec::with_capacity(self.len());
        match (&self.skeleton, par) {
            (Skeleton::Flat(n), ParameterVector::Flat(values)) => {
                if values.len() != *n {
                    return Err(CalibError::Shape {
                        what: "parameter vector",
                        expected: *n,
                        found: values.len(),
                    });
                }
                out.extend_from_slice(values);
            }
            (Skeleton::Named(skel), ParameterVector::Named(members)) => {
                flatten_members(skel, members, "", &mut out)?;
            }
            _ => {
                return Err(CalibError::Structure {
                    path: String::new(),
                    reason: "flat and named representations cannot be mixed",
                });
            }
        }
        Ok(out)
    }

    /// Re-expand a canonical vector into the caller's original structure.
    ///
    /// # Errors
    /// - [`CalibError::Shape`] if `theta.len() != self.len()`.
    pub fn unflatten(&self, theta: &Theta) -> CalibResult<ParameterVector> {
        if theta.len() != self.len() {
            return Err(CalibError::Shape {
                what: "parameter vector",
                expected: self.len(),
                found: theta.len(),
            });
        }
        let mut values = theta.iter().copied();
        Ok(match &self.skeleton {
            Skeleton::Flat(_) => ParameterVector::Flat(values.map(Some).collect()),
            Skeleton::Named(skel) => ParameterVector::Named(rebuild_members(skel, &mut values)),
        })
    }
}

// ---- Helper methods ----

fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() { name.to_string() } else { format!("{prefix}.{name}") }
}

fn capture_members(
    members: &[(String, ParameterNode)], prefix: &str, names: &mut Vec<String>,
) -> CalibResult<Vec<(String, SkeletonNode)>> {
    let mut skel = Vec::with_capacity(members.len());
    for (i, (name, node)) in members.iter().enumerate() {
        let path = join_path(prefix, name);
        if name.is_empty() {
            return Err(CalibError::Structure { path, reason: "member names must be non-empty" });
        }
        if members[..i].iter().any(|(other, _)| other == name) {
            return Err(CalibError::Structure { path, reason: "duplicate member name" });
        }
        let node_skel = match node {
            ParameterNode::Scalar(_) => {
                names.push(path);
                SkeletonNode::Scalar
            }
            ParameterNode::Sequence(values) => {
                names.extend((0..values.len()).map(|j| format!("{path}[{j}]")));
                SkeletonNode::Sequence(values.len())
            }
            ParameterNode::Group(inner) => {
                SkeletonNode::Group(capture_members(inner, &path, names)?)
            }
        };
        skel.push((name.clone(), node_skel));
    }
    Ok(skel)
}

fn flatten_members(
    skel: &[(String, SkeletonNode)], members: &[(String, ParameterNode)], prefix: &str,
    out: &mut Vec<Option<f64>>,
) -> CalibResult<()> {
    if skel.len() != members.len() {
        return Err(CalibError::Structure {
            path: prefix.to_string(),
            reason: "number of members differs from the skeleton",
        });
    }
    for ((skel_name, skel_node), (name, node)) in skel.iter().zip(members) {
        let path = join_path(prefix, name);
        if skel_name != name {
            return Err(CalibError::Structure { path, reason: "member name or order differs" });
        }
        match (skel_node, node) {
            (SkeletonNode::Scalar, ParameterNode::Scalar(v)) => out.push(*v),
            (SkeletonNode::Sequence(n), ParameterNode::Sequence(values)) => {
                if values.len() != *n {
                    return Err(CalibError::Structure { path, reason: "sequence length differs" });
                }
                out.extend_from_slice(values);
            }
            (SkeletonNode::Group(inner_skel), ParameterNode::Group(inner)) => {
                flatten_members(inner_skel, inner, &path, out)?;
            }
            _ => return Err(CalibError::Structure { path, reason: "member kind differs" }),
        }
    }
    Ok(())
}

fn rebuild_members(
    skel: &[(String, SkeletonNode)], values: &mut impl Iterator<Item = f64>,
) -> Vec<(String, ParameterNode)> {
    skel.iter()
        .map(|(name, node)| {
            let rebuilt = match node {
                SkeletonNode::Scalar => ParameterNode::Scalar(values.next()),
                SkeletonNode::Sequence(n) => {
                    ParameterNode::Sequence(values.by_ref().take(*n).map(Some).collect())
                }
                SkeletonNode::Group(inner) => ParameterNode::Group(rebuild_members(inner, values)),
            };
            (name.clone(), rebuilt)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use proptest::prelude::*;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Canonical naming and ordering for flat and nested structures.
    // - Skeleton enforcement on flatten/unflatten.
    //
    // They intentionally DO NOT cover:
    // - Bounds or phase alignment (validated in the calibration layer).
    // -------------------------------------------------------------------------

    fn predator_prey() -> ParameterVector {
        ParameterVector::named(vec![
            ("alpha", ParameterNode::scalar(0.5)),
            ("rates", ParameterNode::sequence(&[1.0, 2.0, 3.0])),
            (
                "init",
                ParameterNode::group(vec![
                    ("prey", ParameterNode::scalar(10.0)),
                    ("predator", ParameterNode::missing()),
                ]),
            ),
        ])
    }

    #[test]
    // Purpose
    // -------
    // Nested structures flatten depth-first in declaration order with
    // path-style names.
    fn named_structure_defines_stable_order_and_names() {
        let par = predator_prey();

        let codec = ParameterCodec::from_initial(&par).unwrap();
        let flat = codec.flatten(&par).unwrap();

        assert_eq!(
            codec.names(),
            &["alpha", "rates[0]", "rates[1]", "rates[2]", "init.prey", "init.predator"]
        );
        assert_eq!(flat, vec![Some(0.5), Some(1.0), Some(2.0), Some(3.0), Some(10.0), None]);
        assert_eq!(codec.index_of("init.prey"), Some(4));
    }

    #[test]
    fn unflatten_restores_original_shape() {
        let par = predator_prey();
        let codec = ParameterCodec::from_initial(&par).unwrap();

        let rebuilt = codec.unflatten(&array![9.0, 8.0, 7.0, 6.0, 5.0, 4.0]).unwrap();

        assert_eq!(rebuilt.get("rates"), Some(&ParameterNode::sequence(&[8.0, 7.0, 6.0])));
        assert_eq!(
            rebuilt.get("init"),
            Some(&ParameterNode::group(vec![
                ("prey", ParameterNode::scalar(5.0)),
                ("predator", ParameterNode::scalar(4.0)),
            ]))
        );
    }

    #[test]
    // Purpose
    // -------
    // A vector whose length differs from the skeleton must be rejected
    // with a shape error rather than silently truncated.
    fn unflatten_length_mismatch_is_shape_error() {
        let codec = ParameterCodec::from_initial(&ParameterVector::flat(&[1.0, 2.0])).unwrap();

        let err = codec.unflatten(&array![1.0, 2.0, 3.0]).unwrap_err();

        assert_eq!(err, CalibError::Shape { what: "parameter vector", expected: 2, found: 3 });
    }

    #[test]
    fn flatten_rejects_values_that_break_the_skeleton() {
        let codec = ParameterCodec::from_initial(&predator_prey()).unwrap();
        let reordered = ParameterVector::named(vec![
            ("rates", ParameterNode::sequence(&[1.0, 2.0, 3.0])),
            ("alpha", ParameterNode::scalar(0.5)),
            ("init", ParameterNode::group(vec![])),
        ]);

        assert!(matches!(codec.flatten(&reordered), Err(CalibError::Structure { .. })));
        assert!(matches!(
            codec.flatten(&ParameterVector::flat(&[1.0])),
            Err(CalibError::Structure { .. })
        ));
    }

    #[test]
    fn duplicate_member_names_are_rejected() {
        let par = ParameterVector::named(vec![
            ("a", ParameterNode::scalar(1.0)),
            ("a", ParameterNode::scalar(2.0)),
        ]);

        let err = ParameterCodec::from_initial(&par).unwrap_err();

        assert!(matches!(err, CalibError::Structure { reason: "duplicate member name", .. }));
    }

    proptest! {
        #[test]
        fn flat_unflatten_then_flatten_is_identity(values in prop::collection::vec(-1e6f64..1e6, 0..16)) {
            let par = ParameterVector::flat(&values);
            let codec = ParameterCodec::from_initial(&par).unwrap();

            let rebuilt = codec.unflatten(&Theta::from(values.clone())).unwrap();

            prop_assert_eq!(codec.flatten(&rebuilt).unwrap(), values.into_iter().map(Some).collect::<Vec<_>>());
        }
    }
}
