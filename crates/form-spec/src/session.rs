//! One fill-time session over a shared [`SchemaIndex`].
//!
//! Every value change runs the same pipeline: synchronizer propagation, then
//! visibility re-checks of the dependents of each touched control, then a
//! calculation refresh when a touched control feeds a calculation term.
//! Navigation runs only on explicit advance/retreat, with calculations
//! refreshed on both sides of an advance.

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::debug;

use crate::calc;
use crate::error::FormError;
use crate::expr;
use crate::fields::{FieldSnapshot, FieldStore, parse_flag};
use crate::index::SchemaIndex;
use crate::navigation::{Finalizer, NavigationState, Position, Transition};
use crate::resolve::TermResolver;
use crate::sync::{SyncWarning, Synchronizer};
use crate::visibility::{VisibilityChange, VisibilityEvaluator, VisibilityMap};

/// What a single change did to the session.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChangeReport {
    pub changed: bool,
    pub touched: Vec<String>,
    pub visibility: Vec<VisibilityChange>,
    pub recalculated: Vec<String>,
}

pub struct FormSession<'a> {
    index: &'a SchemaIndex,
    fields: FieldStore,
    visibility: VisibilityEvaluator,
    navigation: NavigationState,
    sync: Synchronizer,
    resolver: TermResolver,
    finalizer: Box<dyn Finalizer + 'a>,
    calc_watch: BTreeSet<String>,
}

impl<'a> FormSession<'a> {
    /// Session with a finalizer that does nothing.
    pub fn start(index: &'a SchemaIndex) -> Self {
        Self::with_finalizer(index, || {})
    }

    pub fn with_finalizer(index: &'a SchemaIndex, finalizer: impl Finalizer + 'a) -> Self {
        let mut session = Self {
            index,
            fields: FieldStore::from_index(index),
            visibility: VisibilityEvaluator::default(),
            navigation: NavigationState::new(),
            sync: Synchronizer::new(),
            resolver: TermResolver::default(),
            finalizer: Box::new(finalizer),
            calc_watch: BTreeSet::new(),
        };
        session.sync.remirror(index, &mut session.fields);
        session.refresh_calc_watch();
        calc::run_all(index, &mut session.fields, &session.resolver);
        session.visibility = VisibilityEvaluator::initialize(index, &session.fields);
        debug!(form = %index.schema().id, controls = session.fields.len(), "session started");
        session
    }

    /// Session resumed from a persisted snapshot and navigation state.
    pub fn restore(
        index: &'a SchemaIndex,
        snapshot: &FieldSnapshot,
        navigation: NavigationState,
    ) -> Self {
        let mut session = Self::start(index);
        session.resume(snapshot, navigation);
        session
    }

    /// Replaces values and position with persisted ones.
    pub fn resume(&mut self, snapshot: &FieldSnapshot, navigation: NavigationState) -> usize {
        let skipped = self.rehydrate(snapshot);
        self.navigation = navigation.normalized(self.index.section_count());
        skipped
    }

    pub fn with_resolver(mut self, resolver: TermResolver) -> Self {
        self.resolver = resolver;
        self.refresh_calc_watch();
        calc::run_all(self.index, &mut self.fields, &self.resolver);
        self.visibility.refresh_all(self.index, &self.fields);
        self
    }

    pub fn index(&self) -> &'a SchemaIndex {
        self.index
    }

    pub fn fields(&self) -> &FieldStore {
        &self.fields
    }

    pub fn value(&self, control: &str) -> Option<&str> {
        self.fields.text(control)
    }

    pub fn navigation(&self) -> &NavigationState {
        &self.navigation
    }

    pub fn current_section(&self) -> Position {
        self.navigation.current()
    }

    pub fn is_finished(&self) -> bool {
        self.navigation.is_finished()
    }

    pub fn is_visible(&self, question_id: &str) -> bool {
        self.visibility.is_visible(question_id)
    }

    pub fn visibility(&self) -> &VisibilityMap {
        self.visibility.map()
    }

    pub fn warnings(&self) -> &[SyncWarning] {
        self.sync.warnings()
    }

    pub fn take_warnings(&mut self) -> Vec<SyncWarning> {
        self.sync.take_warnings()
    }

    /// Sets a text or select control. Checkbox controls accept a loose flag
    /// (`"true"`, `"yes"`, `"1"`, ...).
    pub fn set_value(&mut self, control: &str, value: &str) -> Result<ChangeReport, FormError> {
        let changed = match self.fields.is_checked(control) {
            Some(_) => self.fields.set_checked(control, parse_flag(value))?,
            None => self.fields.set_text(control, value)?,
        };
        Ok(self.after_change(control, changed))
    }

    pub fn set_checked(&mut self, control: &str, checked: bool) -> Result<ChangeReport, FormError> {
        let changed = self.fields.set_checked(control, checked)?;
        Ok(self.after_change(control, changed))
    }

    fn after_change(&mut self, origin: &str, changed: bool) -> ChangeReport {
        if !changed {
            return ChangeReport::default();
        }
        let touched = self.sync.propagate(self.index, &mut self.fields, origin);
        let mut visibility = self.notify_all(&touched);

        let recalculated = if touched.iter().any(|name| self.calc_watch.contains(name)) {
            let recalculated = calc::run_all(self.index, &mut self.fields, &self.resolver);
            visibility.extend(self.notify_all(&recalculated));
            recalculated
        } else {
            Vec::new()
        };

        ChangeReport {
            changed,
            touched,
            visibility,
            recalculated,
        }
    }

    fn notify_all(&mut self, controls: &[String]) -> Vec<VisibilityChange> {
        controls
            .iter()
            .flat_map(|control| self.visibility.notify(self.index, &self.fields, control))
            .collect()
    }

    fn recalculate(&mut self) -> Vec<String> {
        let recalculated = calc::run_all(self.index, &mut self.fields, &self.resolver);
        self.notify_all(&recalculated);
        recalculated
    }

    /// Advances with calculations refreshed immediately before and after.
    pub fn advance(&mut self) -> Transition {
        self.recalculate();
        let transition = self
            .navigation
            .advance(self.index, &self.fields, self.finalizer.as_mut());
        self.recalculate();
        transition
    }

    pub fn retreat(&mut self) -> Transition {
        self.navigation.retreat()
    }

    pub fn go_to(&mut self, section: u32) -> Transition {
        self.navigation.go_to(self.index, section)
    }

    /// Explicit submission: calls the finalizer regardless of position.
    pub fn submit(&mut self) {
        self.recalculate();
        debug!(form = %self.index.schema().id, "form submitted");
        self.finalizer.finalize();
    }

    pub fn snapshot(&self) -> FieldSnapshot {
        self.fields.snapshot()
    }

    /// Applies a snapshot without per-field propagation, then refreshes
    /// mirrors, calculations and visibility once. Returns the number of
    /// entries that did not fit a live control. Materialized options are
    /// re-derived from their dropdown rather than read back.
    pub fn rehydrate(&mut self, snapshot: &FieldSnapshot) -> usize {
        let unplaced = snapshot
            .values
            .iter()
            .filter(|(name, value)| !self.fields.apply_raw(name, value))
            .map(|(name, _)| name.as_str())
            .collect::<Vec<_>>();
        self.sync.remirror(self.index, &mut self.fields);
        let skipped = unplaced
            .iter()
            .filter(|name| !self.fields.contains(name))
            .count();
        calc::run_all(self.index, &mut self.fields, &self.resolver);
        self.visibility.refresh_all(self.index, &self.fields);
        debug!(entries = snapshot.values.len(), skipped, "snapshot rehydrated");
        skipped
    }

    /// `$$expr$$` substitution against the live values.
    pub fn substitute(&self, text: &str) -> String {
        expr::substitute(text, |reference| {
            self.resolver.value(reference, &self.fields, self.index)
        })
    }

    fn refresh_calc_watch(&mut self) {
        let mut watch = BTreeSet::new();
        for target in self.index.calculation_targets() {
            for rule in &target.rules {
                for term in &rule.terms {
                    watch.extend(
                        self.resolver
                            .watched_controls(&term.field, &self.fields, self.index),
                    );
                }
            }
        }
        self.calc_watch = watch;
    }
}
