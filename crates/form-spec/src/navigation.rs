//! Section-to-section navigation.
//!
//! A session is either showing one section or has reached the terminal
//! [`Position::End`]. Advancing consults the jump rules of the current section
//! in authoring order; retreating undoes the last advance from the history
//! stack without recomputing jumps.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::fields::{FieldStore, answers_match};
use crate::index::{JumpRule, SchemaIndex};
use crate::spec::{Destination, QuestionType};

/// Invoked when the form is finished, either by an `end` jump or an explicit
/// submission. What it does (PDF population, upload) is up to the host.
pub trait Finalizer {
    fn finalize(&mut self);
}

impl<F: FnMut()> Finalizer for F {
    fn finalize(&mut self) {
        self()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Position {
    Section(u32),
    End,
}

impl Position {
    pub fn section(self) -> Option<u32> {
        match self {
            Position::Section(id) => Some(id),
            Position::End => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transition {
    Moved { from: Position, to: Position },
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationState {
    pub current: Position,
    #[serde(default)]
    pub history: Vec<u32>,
}

impl Default for NavigationState {
    fn default() -> Self {
        Self {
            current: Position::Section(1),
            history: Vec::new(),
        }
    }
}

impl NavigationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Position {
        self.current
    }

    pub fn history(&self) -> &[u32] {
        &self.history
    }

    pub fn is_finished(&self) -> bool {
        self.current == Position::End
    }

    /// Brings a deserialized state back into `1..=section_count`.
    pub fn normalized(mut self, section_count: u32) -> Self {
        let upper = section_count.max(1);
        if let Position::Section(id) = self.current {
            self.current = Position::Section(id.clamp(1, upper));
        }
        self.history.retain(|id| (1..=upper).contains(id));
        self
    }

    /// Moves to the next section. An `end` jump calls `finalizer` and enters
    /// [`Position::End`].
    pub fn advance(
        &mut self,
        index: &SchemaIndex,
        fields: &FieldStore,
        finalizer: &mut dyn Finalizer,
    ) -> Transition {
        let Position::Section(current) = self.current else {
            return Transition::Unchanged;
        };

        let to = match next_section(index, fields, current) {
            Destination::End => {
                finalizer.finalize();
                Position::End
            }
            Destination::Section(next) if next == current => {
                debug!(section = current, "advance clamped to the current section");
                return Transition::Unchanged;
            }
            Destination::Section(next) => Position::Section(next),
        };

        self.history.push(current);
        self.current = to;
        debug!(from = current, to = ?to, "advanced");
        Transition::Moved {
            from: Position::Section(current),
            to,
        }
    }

    pub fn retreat(&mut self) -> Transition {
        let Position::Section(current) = self.current else {
            return Transition::Unchanged;
        };
        let previous = match self.history.pop() {
            Some(previous) => previous,
            None if current > 1 => current - 1,
            None => return Transition::Unchanged,
        };
        self.current = Position::Section(previous);
        debug!(from = current, to = previous, "retreated");
        Transition::Moved {
            from: Position::Section(current),
            to: self.current,
        }
    }

    /// Shows exactly `section` (clamped into range) without touching history.
    pub fn go_to(&mut self, index: &SchemaIndex, section: u32) -> Transition {
        if self.is_finished() {
            return Transition::Unchanged;
        }
        let to = Position::Section(section.clamp(1, index.section_count().max(1)));
        if to == self.current {
            return Transition::Unchanged;
        }
        let from = std::mem::replace(&mut self.current, to);
        Transition::Moved { from, to }
    }
}

/// Destination of an advance from `current`: the first matching jump rule of
/// the section, otherwise the following section. Sections are clamped into
/// `1..=N`.
pub fn next_section(index: &SchemaIndex, fields: &FieldStore, current: u32) -> Destination {
    let last = index.section_count().max(1);
    let destination = index
        .jump_rules(current)
        .iter()
        .filter(|rule| jump_matches(index, fields, rule))
        .find_map(|rule| {
            let destination = rule.target.destination();
            if destination.is_none() {
                debug!(question = %rule.question_id, target = ?rule.target, "jump target not understood; rule skipped");
            }
            destination
        })
        .unwrap_or(Destination::Section(current.saturating_add(1)));

    match destination {
        Destination::Section(next) => Destination::Section(next.clamp(1, last)),
        Destination::End => Destination::End,
    }
}

/// Whether the owning question's answer fires the jump.
pub fn jump_matches(index: &SchemaIndex, fields: &FieldStore, rule: &JumpRule) -> bool {
    let Some(question) = index.question(&rule.question_id) else {
        return false;
    };
    if rule.question_type == QuestionType::CheckboxGroup {
        fields
            .checked_values(question)
            .any(|value| answers_match(value, &rule.trigger))
    } else {
        let answer = fields.answer_text(question);
        !answer.is_empty() && answers_match(&answer, &rule.trigger)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::FormSchema;
    use serde_json::json;

    fn index() -> SchemaIndex {
        let schema: FormSchema = serde_json::from_value(json!({
            "id": "f", "title": "F",
            "sections": [
                { "id": 1, "name": "One", "questions": [] },
                { "id": 2, "name": "Two", "questions": [
                    { "id": "q7", "type": "single-choice", "text": "Continue?",
                      "options": [{ "label": "Skip" }, { "label": "Stop" }, { "label": "Later" }],
                      "jump": [
                          { "trigger": "skip", "target": 4 },
                          { "trigger": "Stop", "target": "end" },
                          { "trigger": "Later", "target": "someday" },
                          { "trigger": "Later", "target": 9 }
                      ] }
                ]},
                { "id": 3, "name": "Three", "questions": [
                    { "id": "q9", "type": "single-choice", "text": "Again?",
                      "options": [{ "label": "Yes" }, { "label": "No" }],
                      "jump": [{ "trigger": "Yes", "target": 3 }] }
                ]},
                { "id": 4, "name": "Four", "questions": [
                    { "id": "extras", "type": "checkbox-group", "text": "Extras",
                      "options": [{ "label": "A" }, { "label": "B" }],
                      "jump": [{ "trigger": "b", "target": 2 }] }
                ]}
            ]
        }))
        .expect("schema");
        SchemaIndex::build(schema).expect("index")
    }

    fn at(section: u32) -> NavigationState {
        NavigationState {
            current: Position::Section(section),
            history: Vec::new(),
        }
    }

    #[test]
    fn jump_skips_ahead_and_retreat_undoes_it() {
        let index = index();
        let mut fields = FieldStore::from_index(&index);
        fields.set_text("continue", "Skip").expect("option");
        let mut state = at(2);
        let mut finalized = 0;
        let mut finalize = || finalized += 1;

        let transition = state.advance(&index, &fields, &mut finalize);
        assert_eq!(
            transition,
            Transition::Moved {
                from: Position::Section(2),
                to: Position::Section(4)
            }
        );
        assert_eq!(state.retreat(), Transition::Moved {
            from: Position::Section(4),
            to: Position::Section(2)
        });
        assert_eq!(finalized, 0);
    }

    #[test]
    fn end_jump_finalizes_once_and_is_terminal() {
        let index = index();
        let mut fields = FieldStore::from_index(&index);
        fields.set_text("continue", "stop").expect("option");
        let mut state = at(2);
        let mut finalized = 0;
        {
            let mut finalize = || finalized += 1;
            state.advance(&index, &fields, &mut finalize);
            assert_eq!(state.advance(&index, &fields, &mut finalize), Transition::Unchanged);
        }
        assert_eq!(finalized, 1);
        assert!(state.is_finished());
        assert_eq!(state.retreat(), Transition::Unchanged);
    }

    #[test]
    fn unknown_markers_fall_through_to_later_rules_and_clamp() {
        let index = index();
        let mut fields = FieldStore::from_index(&index);
        fields.set_text("continue", "Later").expect("option");
        assert_eq!(next_section(&index, &fields, 2), Destination::Section(4));
    }

    #[test]
    fn checkbox_jumps_match_any_checked_option() {
        let index = index();
        let mut fields = FieldStore::from_index(&index);
        assert_eq!(next_section(&index, &fields, 4), Destination::Section(4));
        fields.set_checked("extras_b", true).expect("checkbox");
        assert_eq!(next_section(&index, &fields, 4), Destination::Section(2));
    }

    #[test]
    fn last_section_without_jump_stays_put() {
        let index = index();
        let fields = FieldStore::from_index(&index);
        let mut state = at(4);
        let mut finalize = || {};
        assert_eq!(state.advance(&index, &fields, &mut finalize), Transition::Unchanged);
        assert!(state.history().is_empty());
    }

    #[test]
    fn jump_to_own_section_leaves_history_alone() {
        let index = index();
        let mut fields = FieldStore::from_index(&index);
        fields.set_text("again", "yes").expect("option");
        let mut state = NavigationState {
            current: Position::Section(3),
            history: vec![1],
        };
        let mut finalize = || {};
        assert_eq!(state.advance(&index, &fields, &mut finalize), Transition::Unchanged);
        assert_eq!(state.current(), Position::Section(3));
        assert_eq!(state.history(), &[1]);

        fields.set_text("again", "No").expect("option");
        assert!(matches!(state.advance(&index, &fields, &mut finalize), Transition::Moved { .. }));
        assert_eq!(state.history(), &[1, 3]);
    }

    #[test]
    fn retreat_without_history_steps_down_to_one() {
        let mut state = at(3);
        state.retreat();
        assert_eq!(state.current(), Position::Section(2));
        state.retreat();
        state.retreat();
        assert_eq!(state.current(), Position::Section(1));
    }

    #[test]
    fn go_to_is_idempotent() {
        let index = index();
        let mut state = NavigationState::new();
        assert!(matches!(state.go_to(&index, 3), Transition::Moved { .. }));
        assert_eq!(state.go_to(&index, 3), Transition::Unchanged);
        assert_eq!(state.current(), Position::Section(3));
        assert!(state.history().is_empty());
    }

    #[test]
    fn normalized_clamps_foreign_state() {
        let state = NavigationState {
            current: Position::Section(12),
            history: vec![1, 7, 2],
        }
        .normalized(4);
        assert_eq!(state.current, Position::Section(4));
        assert_eq!(state.history, vec![1, 2]);
    }
}
