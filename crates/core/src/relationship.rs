//! Relationship groups between annotations
//!
//! A relation references its member annotations by id only. Deleting an
//! annotation never touches relations directly; instead the owner runs
//! [`on_annotation_removed`] and applies the returned plan in one step.
//!
//! Invariant: a relation with an empty source or target side is invalid and
//! is always deleted, never kept one-sided.

use crate::id::{AnnotationId, LabelId, RelationId};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationGroup {
    pub id: RelationId,
    /// Set semantics, order irrelevant
    pub source_ids: BTreeSet<AnnotationId>,
    /// Set semantics, order irrelevant
    pub target_ids: BTreeSet<AnnotationId>,
    pub label: LabelId,
    #[serde(default)]
    pub structural: bool,
}

impl RelationGroup {
    /// New relation with a fresh local id
    pub fn new(
        label: LabelId,
        source_ids: impl IntoIterator<Item = AnnotationId>,
        target_ids: impl IntoIterator<Item = AnnotationId>,
    ) -> Self {
        Self {
            id: RelationId::local(),
            source_ids: source_ids.into_iter().collect(),
            target_ids: target_ids.into_iter().collect(),
            label,
            structural: false,
        }
    }

    pub fn with_id(mut self, id: RelationId) -> Self {
        self.id = id;
        self
    }

    pub fn references(&self, annotation_id: &AnnotationId) -> bool {
        self.source_ids.contains(annotation_id) || self.target_ids.contains(annotation_id)
    }

    /// Both sides hold at least one member
    pub fn is_valid(&self) -> bool {
        !self.source_ids.is_empty() && !self.target_ids.is_empty()
    }

    /// Every annotation id on either side
    pub fn members(&self) -> impl Iterator<Item = &AnnotationId> {
        self.source_ids.iter().chain(self.target_ids.iter())
    }

    /// Copy with `annotation_id` removed from both sides
    pub fn without_member(&self, annotation_id: &AnnotationId) -> Self {
        let mut next = self.clone();
        next.source_ids.remove(annotation_id);
        next.target_ids.remove(annotation_id);
        next
    }

    /// Copy with `from` replaced by `to` on whichever side holds it
    pub fn with_member_renamed(&self, from: &AnnotationId, to: &AnnotationId) -> Self {
        let mut next = self.clone();
        if next.source_ids.remove(from) {
            next.source_ids.insert(to.clone());
        }
        if next.target_ids.remove(from) {
            next.target_ids.insert(to.clone());
        }
        next
    }
}

/// Which side of a relation a member sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationSide {
    Source,
    Target,
}

/// Outcome of removing an annotation from every relation referencing it
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemovalPlan {
    /// Relations left one-sided; must be deleted
    pub to_delete: Vec<RelationGroup>,
    /// Relations still two-sided, holding the filtered member sets
    pub to_update: Vec<RelationGroup>,
}

impl RemovalPlan {
    pub fn is_empty(&self) -> bool {
        self.to_delete.is_empty() && self.to_update.is_empty()
    }

    pub fn delete_ids(&self) -> Vec<RelationId> {
        self.to_delete.iter().map(|r| r.id.clone()).collect()
    }

    /// Apply the plan to a relation list, keeping the original order
    pub fn apply(&self, relations: &[RelationGroup]) -> Vec<RelationGroup> {
        relations
            .iter()
            .filter(|r| !self.to_delete.iter().any(|d| d.id == r.id))
            .map(|r| self.to_update.iter().find(|u| u.id == r.id).unwrap_or(r).clone())
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DetachAction {
    Delete,
    Update,
    NoChange,
}

/// Outcome of detaching one annotation from one named relation
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct DetachOutcome {
    /// The relation to delete, or its updated state; `None` for `NoChange`
    pub relation: Option<RelationGroup>,
    pub action: DetachAction,
}

impl DetachOutcome {
    fn no_change() -> Self {
        Self { relation: None, action: DetachAction::NoChange }
    }
}

/// Classify every relation referencing `annotation_id`
///
/// A relation appears in at most one of the two lists.
pub fn on_annotation_removed(relations: &[RelationGroup], annotation_id: &AnnotationId) -> RemovalPlan {
    let mut plan = RemovalPlan::default();

    for relation in relations.iter().filter(|r| r.references(annotation_id)) {
        let remaining = relation.without_member(annotation_id);
        if remaining.is_valid() {
            plan.to_update.push(remaining);
        } else {
            plan.to_delete.push(relation.clone());
        }
    }

    tracing::debug!(
        annotation = %annotation_id,
        delete = plan.to_delete.len(),
        update = plan.to_update.len(),
        "relation cleanup planned"
    );

    plan
}

/// Apply the one-sided deletion rule to a single named relation
///
/// An unknown relation id, or an annotation that is not a member, yields
/// `NoChange`: the relation may already have been removed server-side.
pub fn on_explicit_detach(
    relations: &[RelationGroup],
    annotation_id: &AnnotationId,
    relation_id: &RelationId,
) -> DetachOutcome {
    let Some(relation) = relations.iter().find(|r| &r.id == relation_id) else {
        return DetachOutcome::no_change();
    };

    if !relation.references(annotation_id) {
        return DetachOutcome::no_change();
    }

    let remaining = relation.without_member(annotation_id);
    if remaining.is_valid() {
        DetachOutcome { relation: Some(remaining), action: DetachAction::Update }
    } else {
        DetachOutcome { relation: Some(relation.clone()), action: DetachAction::Delete }
    }
}

/// Copy of `relation` with `ids` merged into `side`
pub fn add_members(
    relation: &RelationGroup,
    ids: impl IntoIterator<Item = AnnotationId>,
    side: RelationSide,
) -> RelationGroup {
    let mut next = relation.clone();
    match side {
        RelationSide::Source => next.source_ids.extend(ids),
        RelationSide::Target => next.target_ids.extend(ids),
    }
    next
}

/// Members of the selected relations; they render regardless of filters
pub fn forced_visible(
    relations: &[RelationGroup],
    selected: &BTreeSet<RelationId>,
) -> BTreeSet<AnnotationId> {
    relations
        .iter()
        .filter(|r| selected.contains(&r.id))
        .flat_map(|r| r.members().cloned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(list: &[&str]) -> Vec<AnnotationId> {
        list.iter().map(|id| AnnotationId::from(*id)).collect()
    }

    fn set(list: &[&str]) -> BTreeSet<AnnotationId> {
        ids(list).into_iter().collect()
    }

    fn relation(id: &str, sources: &[&str], targets: &[&str]) -> RelationGroup {
        RelationGroup::new(LabelId::from("REL"), ids(sources), ids(targets)).with_id(RelationId::from(id))
    }

    #[test]
    fn test_removing_sole_source_deletes_relation() {
        let relations = vec![relation("r", &["a"], &["b", "c"])];

        let outcome = on_explicit_detach(&relations, &"a".into(), &"r".into());
        assert_eq!(outcome.action, DetachAction::Delete);
        assert_eq!(outcome.relation.unwrap().id, RelationId::from("r"));
    }

    #[test]
    fn test_removing_one_of_many_targets_updates_relation() {
        let relations = vec![relation("r", &["a"], &["b", "c"])];

        let outcome = on_explicit_detach(&relations, &"b".into(), &"r".into());
        assert_eq!(outcome.action, DetachAction::Update);

        let updated = outcome.relation.unwrap();
        assert_eq!(updated.target_ids, set(&["c"]));
        assert_eq!(updated.source_ids, set(&["a"]));
        assert_eq!(updated.label, LabelId::from("REL"));
    }

    #[test]
    fn test_detach_from_unknown_relation_is_no_change() {
        let relations = vec![relation("r", &["a"], &["b"])];

        let missing = on_explicit_detach(&relations, &"a".into(), &"gone".into());
        assert_eq!(missing, DetachOutcome { relation: None, action: DetachAction::NoChange });

        let not_member = on_explicit_detach(&relations, &"z".into(), &"r".into());
        assert_eq!(not_member.action, DetachAction::NoChange);
    }

    #[test]
    fn test_removal_splits_into_delete_and_update() {
        let relations = vec![
            relation("r1", &["x"], &["y"]),
            relation("r2", &["x", "w"], &["y"]),
            relation("r3", &["p"], &["q"]),
        ];

        let plan = on_annotation_removed(&relations, &"x".into());

        assert_eq!(plan.delete_ids(), vec![RelationId::from("r1")]);
        assert_eq!(plan.to_update.len(), 1);
        assert_eq!(plan.to_update[0].id, RelationId::from("r2"));
        assert_eq!(plan.to_update[0].source_ids, set(&["w"]));

        for deleted in &plan.to_delete {
            assert!(plan.to_update.iter().all(|u| u.id != deleted.id));
        }
    }

    #[test]
    fn test_annotation_on_both_sides_empties_relation() {
        let relations = vec![relation("r", &["a"], &["a"])];
        let plan = on_annotation_removed(&relations, &"a".into());

        assert_eq!(plan.delete_ids(), vec![RelationId::from("r")]);
        assert!(plan.to_update.is_empty());
    }

    #[test]
    fn test_plan_apply_keeps_order_and_drops_deleted() {
        let relations = vec![
            relation("r1", &["x"], &["y"]),
            relation("r2", &["x", "w"], &["y"]),
            relation("r3", &["p"], &["q"]),
        ];
        let plan = on_annotation_removed(&relations, &"x".into());
        let applied = plan.apply(&relations);

        let order: Vec<&str> = applied.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(order, vec!["r2", "r3"]);
        assert!(!applied[0].references(&"x".into()));
    }

    #[test]
    fn test_add_members_has_set_semantics() {
        let base = relation("r", &["a"], &["b"]);
        let grown = add_members(&base, ids(&["b", "c", "c"]), RelationSide::Target);

        assert_eq!(grown.target_ids, set(&["b", "c"]));
        assert_eq!(grown.id, base.id);
    }

    #[test]
    fn test_forced_visible_collects_selected_members() {
        let relations = vec![relation("r1", &["a"], &["b"]), relation("r2", &["c"], &["d"])];
        let selected: BTreeSet<RelationId> = [RelationId::from("r2")].into_iter().collect();

        let forced = forced_visible(&relations, &selected);
        assert_eq!(forced, set(&["c", "d"]));
    }
}
