//! Per-page render visibility
//!
//! Checks run in a fixed order and the first decisive one wins:
//!
//! 1. forced (member of a selected relation) → visible
//! 2. selected-only mode and not selected → hidden
//! 3. structural while structural display is off → hidden
//! 4. label filter active and label not in it → hidden
//! 5. otherwise visible
//!
//! Forced visibility beats every filter, and hidden structural annotations
//! are never label-checked.

use crate::annotation::Annotation;
use crate::id::{AnnotationId, LabelId};
use std::collections::BTreeSet;

/// UI filter settings relevant to rendering
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisibilitySettings {
    /// Show structural (layout) annotations
    pub show_structural_only: bool,
    /// Only show annotations in the current selection
    pub show_selected_only: bool,
    /// `None` or empty disables label filtering
    pub label_filter: Option<BTreeSet<LabelId>>,
}

impl VisibilitySettings {
    fn label_filter_active(&self) -> Option<&BTreeSet<LabelId>> {
        self.label_filter.as_ref().filter(|labels| !labels.is_empty())
    }
}

/// Why an annotation is or is not rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Forced,
    HiddenNotSelected,
    HiddenStructural,
    HiddenByLabel,
    Visible,
}

impl Visibility {
    pub fn is_visible(self) -> bool {
        matches!(self, Visibility::Forced | Visibility::Visible)
    }
}

/// Decide whether a single annotation renders
pub fn classify(
    annotation: &Annotation,
    settings: &VisibilitySettings,
    selected: &BTreeSet<AnnotationId>,
    forced: &BTreeSet<AnnotationId>,
) -> Visibility {
    if forced.contains(&annotation.id) {
        return Visibility::Forced;
    }
    if settings.show_selected_only && !selected.contains(&annotation.id) {
        return Visibility::HiddenNotSelected;
    }
    if !settings.show_structural_only && annotation.structural {
        return Visibility::HiddenStructural;
    }
    if let Some(labels) = settings.label_filter_active() {
        if !labels.contains(&annotation.label.id) {
            return Visibility::HiddenByLabel;
        }
    }
    Visibility::Visible
}

/// Annotations on `page` that should render, in input order
pub fn visible_on<'a>(
    page: u32,
    annotations: &'a [Annotation],
    settings: &VisibilitySettings,
    selected: &BTreeSet<AnnotationId>,
    forced: &BTreeSet<AnnotationId>,
) -> Vec<&'a Annotation> {
    annotations
        .iter()
        .filter(|a| a.is_on_page(page))
        .filter(|a| classify(a, settings, selected, forced).is_visible())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::{Label, PageSpan};
    use crate::bounds::DocBox;
    use std::collections::BTreeMap;

    fn annotation(id: &str, label: &str, page: u32, structural: bool) -> Annotation {
        let mut pages = BTreeMap::new();
        pages.insert(page, PageSpan { token_ids: vec![0], bounding_box: DocBox::new(0.0, 0.0, 1.0, 1.0) });
        Annotation::token_aligned(Label::span(label, label), pages, "")
            .with_id(AnnotationId::from(id))
            .with_structural(structural)
    }

    fn set(ids: &[&str]) -> BTreeSet<AnnotationId> {
        ids.iter().map(|id| AnnotationId::from(*id)).collect()
    }

    fn labels(ids: &[&str]) -> Option<BTreeSet<LabelId>> {
        Some(ids.iter().map(|id| LabelId::from(*id)).collect())
    }

    #[test]
    fn test_forced_wins_over_every_filter() {
        let a = annotation("a", "L2", 1, true);
        let settings = VisibilitySettings {
            show_structural_only: false,
            show_selected_only: true,
            label_filter: labels(&["L1"]),
        };

        let visibility = classify(&a, &settings, &set(&[]), &set(&["a"]));
        assert_eq!(visibility, Visibility::Forced);
        assert!(visibility.is_visible());
    }

    #[test]
    fn test_selected_only_hides_unselected() {
        let a = annotation("a", "L1", 1, false);
        let settings = VisibilitySettings { show_selected_only: true, ..Default::default() };

        assert_eq!(classify(&a, &settings, &set(&[]), &set(&[])), Visibility::HiddenNotSelected);
        assert_eq!(classify(&a, &settings, &set(&["a"]), &set(&[])), Visibility::Visible);
    }

    #[test]
    fn test_structural_checked_before_label() {
        let a = annotation("a", "L2", 1, true);
        let settings = VisibilitySettings { label_filter: labels(&["L1"]), ..Default::default() };

        assert_eq!(classify(&a, &settings, &set(&[]), &set(&[])), Visibility::HiddenStructural);

        let shown = VisibilitySettings { show_structural_only: true, ..settings };
        assert_eq!(classify(&a, &shown, &set(&[]), &set(&[])), Visibility::HiddenByLabel);
    }

    #[test]
    fn test_empty_label_filter_is_inactive() {
        let a = annotation("a", "L2", 1, false);
        let settings = VisibilitySettings { label_filter: labels(&[]), ..Default::default() };

        assert_eq!(classify(&a, &settings, &set(&[]), &set(&[])), Visibility::Visible);
    }

    #[test]
    fn test_visible_on_filters_by_page_and_settings() {
        let annotations = vec![
            annotation("a", "L1", 1, false),
            annotation("b", "L2", 1, false),
            annotation("c", "L1", 2, false),
            annotation("d", "L1", 1, true),
        ];
        let settings = VisibilitySettings { label_filter: labels(&["L1"]), ..Default::default() };

        let visible: Vec<&str> = visible_on(1, &annotations, &settings, &set(&[]), &set(&["b"]))
            .into_iter()
            .map(|a| a.id.as_str())
            .collect();

        assert_eq!(visible, vec!["a", "b"]);
    }
}
