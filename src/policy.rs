//! Subdivision policy: a pure function of `Context -> Decision` deciding how
//! a newly inserted entity affects node structure (spec.md §4.3).

use crate::key::Vec3;

/// Everything the policy needs to decide, gathered by the hierarchical index
/// before consulting it. `existing_entities` is only inspected by rule 5/6
/// to test whether `entity_bounds` fits a single child or spans several.
pub struct Context<'a> {
    pub level: u8,
    pub current_entity_count: usize,
    pub target_capacity: usize,
    pub bulk_mode: bool,
    pub entity_bounds: Option<(Vec3, Vec3)>,
    pub existing_entities: &'a [Vec3],
    pub max_depth: u8,
}

/// A child index with the fraction of the context's bound that wound up in
/// it, for callers that want both the target and the overlap.
pub type ChildTarget = u8;

#[derive(Clone, Debug, PartialEq)]
pub enum Decision {
    InsertInParent,
    CreateSingleChild(ChildTarget),
    SplitToChildren(Vec<ChildTarget>),
    ForceSubdivision,
    DeferSubdivision,
}

pub struct Outcome {
    pub decision: Decision,
    pub reason: &'static str,
}

/// `{min-entities-for-split, overload-factor, spanning-threshold}` (spec.md
/// §4.3). The three named presets are `balanced` (4/0.75/0.5),
/// `dense_point_clouds` (8/0.9/0.1), `large_entities` (2/0.5/0.7).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SubdivisionPolicy {
    pub min_entities_for_split: usize,
    pub overload_factor: f64,
    pub spanning_threshold: f64,
}

impl SubdivisionPolicy {
    pub fn balanced() -> Self {
        SubdivisionPolicy {
            min_entities_for_split: 4,
            overload_factor: 0.75,
            spanning_threshold: 0.5,
        }
    }

    pub fn dense_point_clouds() -> Self {
        SubdivisionPolicy {
            min_entities_for_split: 8,
            overload_factor: 0.9,
            spanning_threshold: 0.1,
        }
    }

    pub fn large_entities() -> Self {
        SubdivisionPolicy {
            min_entities_for_split: 2,
            overload_factor: 0.5,
            spanning_threshold: 0.7,
        }
    }

    /// Which of the 8 children a bound fits entirely inside, if exactly one.
    /// `mid` is the cell's midpoint along each axis; a bound spans a child
    /// boundary whenever its min and max fall on opposite sides of `mid[i]`.
    fn single_child_fit(bounds: (Vec3, Vec3), mid: Vec3) -> Option<u8> {
        let (lo, hi) = bounds;
        let mut index = 0u8;
        for i in 0..3 {
            if lo[i] >= mid[i] {
                index |= 1 << i;
            } else if hi[i] > mid[i] {
                return None;
            }
        }
        Some(index)
    }

    fn intersected_children(bounds: (Vec3, Vec3), mid: Vec3) -> Vec<u8> {
        let (lo, hi) = bounds;
        let mut out = Vec::with_capacity(8);
        for child in 0..8u8 {
            let fits = (0..3).all(|i| {
                if child & (1 << i) != 0 {
                    hi[i] >= mid[i]
                } else {
                    lo[i] <= mid[i]
                }
            });
            if fits {
                out.push(child);
            }
        }
        out
    }

    /// Rules evaluated in order per spec.md §4.3. `cell_mid` is the
    /// midpoint of the node's cell, needed only when `entity_bounds` is
    /// `Some`.
    pub fn decide(&self, ctx: &Context, cell_mid: Vec3) -> Outcome {
        if ctx.level == ctx.max_depth {
            return Outcome {
                decision: Decision::InsertInParent,
                reason: "max depth",
            };
        }
        if ctx.current_entity_count + 1 < self.min_entities_for_split {
            return Outcome {
                decision: Decision::InsertInParent,
                reason: "below minimum entities for split",
            };
        }
        if ctx.bulk_mode {
            return Outcome {
                decision: Decision::DeferSubdivision,
                reason: "bulk mode",
            };
        }
        let overload_limit = ctx.target_capacity as f64 * (1.0 + self.overload_factor);
        if ctx.current_entity_count as f64 > overload_limit {
            return Outcome {
                decision: Decision::ForceSubdivision,
                reason: "entity count exceeds overload factor",
            };
        }
        if let Some(bounds) = ctx.entity_bounds {
            if let Some(child) = Self::single_child_fit(bounds, cell_mid) {
                return Outcome {
                    decision: Decision::CreateSingleChild(child),
                    reason: "bounds fit a single child",
                };
            }
            let children = Self::intersected_children(bounds, cell_mid);
            if children.len() as f64 / 8.0 > self.spanning_threshold {
                return Outcome {
                    decision: Decision::SplitToChildren(children),
                    reason: "bounds span more children than the spanning threshold",
                };
            }
        }
        if self.estimated_benefit(ctx) > 0.0 {
            Outcome {
                decision: Decision::CreateSingleChild(0),
                reason: "positive estimated benefit from splitting",
            }
        } else {
            Outcome {
                decision: Decision::InsertInParent,
                reason: "no benefit from splitting",
            }
        }
    }

    /// Cheap heuristic: benefit grows with how far occupancy exceeds target
    /// capacity, since a fuller-than-target node has more to gain from being
    /// split. Negative below capacity.
    fn estimated_benefit(&self, ctx: &Context) -> f64 {
        (ctx.current_entity_count as f64 - ctx.target_capacity as f64) / ctx.target_capacity.max(1) as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx<'a>(level: u8, count: usize, target: usize, existing: &'a [Vec3]) -> Context<'a> {
        Context {
            level,
            current_entity_count: count,
            target_capacity: target,
            bulk_mode: false,
            entity_bounds: None,
            existing_entities: existing,
            max_depth: 21,
        }
    }

    #[test]
    fn presets_match_spec_constants() {
        let b = SubdivisionPolicy::balanced();
        assert_eq!((b.min_entities_for_split, b.overload_factor, b.spanning_threshold), (4, 0.75, 0.5));
        let d = SubdivisionPolicy::dense_point_clouds();
        assert_eq!((d.min_entities_for_split, d.overload_factor, d.spanning_threshold), (8, 0.9, 0.1));
        let l = SubdivisionPolicy::large_entities();
        assert_eq!((l.min_entities_for_split, l.overload_factor, l.spanning_threshold), (2, 0.5, 0.7));
    }

    #[test]
    fn max_depth_always_inserts_in_parent() {
        let policy = SubdivisionPolicy::balanced();
        let c = Context { level: 21, max_depth: 21, ..ctx(21, 1000, 10, &[]) };
        assert_eq!(policy.decide(&c, [0.5, 0.5, 0.5]).decision, Decision::InsertInParent);
    }

    #[test]
    fn below_min_entities_inserts_in_parent() {
        let policy = SubdivisionPolicy::balanced();
        let c = ctx(1, 2, 10, &[]);
        assert_eq!(policy.decide(&c, [0.5, 0.5, 0.5]).decision, Decision::InsertInParent);
    }

    #[test]
    fn bulk_mode_defers() {
        let policy = SubdivisionPolicy::balanced();
        let c = Context { bulk_mode: true, ..ctx(1, 10, 10, &[]) };
        assert_eq!(policy.decide(&c, [0.5, 0.5, 0.5]).decision, Decision::DeferSubdivision);
    }

    #[test]
    fn overload_forces_subdivision() {
        let policy = SubdivisionPolicy::balanced();
        let c = ctx(1, 20, 10, &[]);
        assert_eq!(policy.decide(&c, [0.5, 0.5, 0.5]).decision, Decision::ForceSubdivision);
    }

    #[test]
    fn bounds_in_single_child_creates_single_child() {
        let policy = SubdivisionPolicy::balanced();
        let mut c = ctx(1, 5, 10, &[]);
        c.entity_bounds = Some(([0.6, 0.6, 0.6], [0.9, 0.9, 0.9]));
        let outcome = policy.decide(&c, [0.5, 0.5, 0.5]);
        assert_eq!(outcome.decision, Decision::CreateSingleChild(0b111));
    }

    #[test]
    fn bounds_spanning_all_children_splits() {
        let policy = SubdivisionPolicy::balanced();
        let mut c = ctx(1, 5, 10, &[]);
        c.entity_bounds = Some(([0.0, 0.0, 0.0], [1.0, 1.0, 1.0]));
        let outcome = policy.decide(&c, [0.5, 0.5, 0.5]);
        match outcome.decision {
            Decision::SplitToChildren(children) => assert_eq!(children.len(), 8),
            other => panic!("expected SplitToChildren, got {other:?}"),
        }
    }
}
