//! Pure rules for keeping a learning history aligned with its deck and for
//! applying swipes to a single card interaction.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::db::operations::{CardInteraction, FlashcardHistory};

/// Result of aligning a history with the deck's current items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub history: FlashcardHistory,
    /// Entries added by this pass, already present at the tail of `history.interactions`.
    pub appended: Vec<CardInteraction>,
}

impl Reconciliation {
    pub fn first_appended_position(&self) -> usize {
        self.history.interactions.len() - self.appended.len()
    }
}

/// Appends a fresh interaction for every current item the history lacks.
///
/// Existing entries keep their order and flags, and nothing is ever removed:
/// entries for deleted cards are pruned by the deletion itself.
pub fn reconcile(mut history: FlashcardHistory, current_item_ids: &[String]) -> Reconciliation {
    let mut seen: HashSet<String> = history
        .interactions
        .iter()
        .map(|interaction| interaction.card_id.clone())
        .collect();

    let mut appended = Vec::new();
    for card_id in current_item_ids {
        if seen.insert(card_id.clone()) {
            let fresh = CardInteraction::fresh(card_id.clone());
            history.interactions.push(fresh.clone());
            appended.push(fresh);
        }
    }

    Reconciliation { history, appended }
}

pub fn is_in_sync(interactions: &[CardInteraction], current_item_ids: &[String]) -> bool {
    let recorded: HashSet<&str> = interactions
        .iter()
        .map(|interaction| interaction.card_id.as_str())
        .collect();
    current_item_ids
        .iter()
        .all(|card_id| recorded.contains(card_id.as_str()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwipeDirection {
    /// Marks the card learned.
    Left,
    /// Marks the card known and counts a view.
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwipeEffect {
    pub counts_view: bool,
}

impl SwipeDirection {
    /// Flags only ever move from false to true.
    pub fn apply(self, interaction: &mut CardInteraction) -> SwipeEffect {
        match self {
            SwipeDirection::Left => {
                interaction.is_learned = true;
                SwipeEffect { counts_view: false }
            }
            SwipeDirection::Right => {
                interaction.is_known = true;
                SwipeEffect { counts_view: true }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn history_with(interactions: Vec<CardInteraction>) -> FlashcardHistory {
        FlashcardHistory {
            id: "history-1".to_string(),
            student_id: "student-1".to_string(),
            flashcard_id: "flashcard-1".to_string(),
            interactions,
            created_at: "2024-01-01T00:00:00.000Z".to_string(),
            updated_at: "2024-01-01T00:00:00.000Z".to_string(),
        }
    }

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn test_empty_history_is_filled_with_every_item() {
        let result = reconcile(history_with(Vec::new()), &ids(&["a", "b", "c"]));
        assert_eq!(result.appended.len(), 3);
        assert_eq!(result.first_appended_position(), 0);
        assert!(result
            .history
            .interactions
            .iter()
            .all(|entry| !entry.is_known && !entry.is_learned));
    }

    #[test]
    fn test_missing_items_are_appended_after_existing_progress() {
        let existing = vec![CardInteraction {
            card_id: "a".to_string(),
            is_known: true,
            is_learned: false,
        }];
        let result = reconcile(history_with(existing), &ids(&["a", "b"]));

        assert_eq!(result.appended, vec![CardInteraction::fresh("b")]);
        assert_eq!(result.first_appended_position(), 1);
        assert!(result.history.interaction("a").unwrap().is_known);
        assert_eq!(result.history.interactions[1].card_id, "b");
    }

    #[test]
    fn test_stale_entries_are_not_removed() {
        let existing = vec![CardInteraction::fresh("gone"), CardInteraction::fresh("a")];
        let result = reconcile(history_with(existing.clone()), &ids(&["a"]));
        assert!(result.appended.is_empty());
        assert_eq!(result.history.interactions, existing);
    }

    #[test]
    fn test_duplicate_current_ids_are_appended_once() {
        let result = reconcile(history_with(Vec::new()), &ids(&["a", "a", "b"]));
        assert_eq!(result.history.interactions.len(), 2);
    }

    #[test]
    fn test_is_in_sync() {
        let interactions = vec![CardInteraction::fresh("a"), CardInteraction::fresh("b")];
        assert!(is_in_sync(&interactions, &ids(&["b", "a"])));
        assert!(is_in_sync(&interactions, &ids(&["a"])));
        assert!(!is_in_sync(&interactions, &ids(&["a", "c"])));
    }

    #[test]
    fn test_right_swipe_marks_known_and_counts_view() {
        let mut interaction = CardInteraction::fresh("a");
        let effect = SwipeDirection::Right.apply(&mut interaction);
        assert!(effect.counts_view);
        assert!(interaction.is_known);
        assert!(!interaction.is_learned);
    }

    #[test]
    fn test_left_swipe_marks_learned_only() {
        let mut interaction = CardInteraction::fresh("a");
        let effect = SwipeDirection::Left.apply(&mut interaction);
        assert!(!effect.counts_view);
        assert!(interaction.is_learned);
        assert!(!interaction.is_known);
    }

    #[test]
    fn test_swipe_direction_wire_format() {
        let direction: SwipeDirection = serde_json::from_str(r#""right""#).unwrap();
        assert_eq!(direction, SwipeDirection::Right);
        assert!(serde_json::from_str::<SwipeDirection>(r#""up""#).is_err());
    }

    fn arb_interactions() -> impl Strategy<Value = Vec<CardInteraction>> {
        proptest::collection::btree_map("[a-h]", (any::<bool>(), any::<bool>()), 0..6).prop_map(
            |entries| {
                entries
                    .into_iter()
                    .map(|(card_id, (is_known, is_learned))| CardInteraction {
                        card_id,
                        is_known,
                        is_learned,
                    })
                    .collect()
            },
        )
    }

    fn arb_item_ids() -> impl Strategy<Value = Vec<String>> {
        proptest::collection::btree_set("[a-h]", 0..8).prop_map(|ids| ids.into_iter().collect())
    }

    proptest! {
        #[test]
        fn prop_reconciled_history_covers_every_item(
            existing in arb_interactions(),
            current in arb_item_ids(),
        ) {
            let result = reconcile(history_with(existing), &current);
            prop_assert!(is_in_sync(&result.history.interactions, &current));
        }

        #[test]
        fn prop_reconcile_keeps_existing_prefix_and_has_no_duplicates(
            existing in arb_interactions(),
            current in arb_item_ids(),
        ) {
            let result = reconcile(history_with(existing.clone()), &current);
            prop_assert_eq!(&result.history.interactions[..existing.len()], &existing[..]);

            let unique: HashSet<&str> = result
                .history
                .interactions
                .iter()
                .map(|entry| entry.card_id.as_str())
                .collect();
            prop_assert_eq!(unique.len(), result.history.interactions.len());
        }

        #[test]
        fn prop_reconcile_is_idempotent(
            existing in arb_interactions(),
            current in arb_item_ids(),
        ) {
            let once = reconcile(history_with(existing), &current);
            let twice = reconcile(once.history.clone(), &current);
            prop_assert!(twice.appended.is_empty());
            prop_assert_eq!(twice.history, once.history);
        }

        #[test]
        fn prop_swipes_never_clear_flags(
            is_known in any::<bool>(),
            is_learned in any::<bool>(),
            swipes in proptest::collection::vec(any::<bool>(), 0..10),
        ) {
            let mut interaction = CardInteraction { card_id: "a".to_string(), is_known, is_learned };
            let mut views = 0;
            for right in &swipes {
                let direction = if *right { SwipeDirection::Right } else { SwipeDirection::Left };
                let before = interaction.clone();
                if direction.apply(&mut interaction).counts_view {
                    views += 1;
                }
                prop_assert!(interaction.is_known >= before.is_known);
                prop_assert!(interaction.is_learned >= before.is_learned);
            }
            prop_assert_eq!(views, swipes.iter().filter(|right| **right).count());
        }
    }
}
