use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use regex::Regex;

static NON_ALNUM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("[^a-z0-9]+").expect("static pattern is valid"));

/// Canonical identifier for free-form text: lower-cased, every run of
/// non-alphanumeric characters collapsed to `_`, outer underscores stripped.
pub fn slugify(text: &str) -> String {
    let lowered = text.to_lowercase();
    NON_ALNUM
        .replace_all(&lowered, "_")
        .trim_matches('_')
        .to_string()
}

/// Same substitution as [`slugify`] but keeps leading/trailing underscores.
/// Option-derived control names have always been built this way.
pub fn sanitize_untrimmed(text: &str) -> String {
    let lowered = text.to_lowercase();
    NON_ALNUM.replace_all(&lowered, "_").into_owned()
}

/// Fallback identifier for a question whose text yields no slug.
pub fn fallback_slug(question_id: &str) -> String {
    let id = slugify(question_id);
    if id.is_empty() {
        "question".to_string()
    } else {
        format!("question_{id}")
    }
}

/// Assigns every question one unique slug, once, in schema order.
#[derive(Debug, Clone, Default)]
pub struct SlugRegistry {
    by_question: BTreeMap<String, String>,
    taken: BTreeSet<String>,
}

impl SlugRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `question_id` and returns its slug. Calling it again for the
    /// same question returns the slug assigned the first time.
    pub fn assign(&mut self, question_id: &str, text: &str) -> String {
        if let Some(existing) = self.by_question.get(question_id) {
            return existing.clone();
        }

        let mut base = slugify(text);
        if base.is_empty() {
            base = fallback_slug(question_id);
        }

        let mut candidate = base.clone();
        let mut counter = 2;
        while self.taken.contains(&candidate) {
            candidate = format!("{base}_{counter}");
            counter += 1;
        }

        self.taken.insert(candidate.clone());
        self.by_question
            .insert(question_id.to_string(), candidate.clone());
        candidate
    }

    pub fn get(&self, question_id: &str) -> Option<&str> {
        self.by_question.get(question_id).map(String::as_str)
    }

    /// Question id owning `slug`, if any.
    pub fn question_for(&self, slug: &str) -> Option<&str> {
        self.by_question
            .iter()
            .find(|(_, value)| value.as_str() == slug)
            .map(|(id, _)| id.as_str())
    }

    /// Builds the generated name of one control owned by `question_id`.
    ///
    /// A non-empty `raw_name_hint` wins over `option_label`. The question slug
    /// is prepended exactly once; hints that already carry it are kept as is.
    pub fn control_name(&self, question_id: &str, raw_name_hint: &str, option_label: &str) -> String {
        let slug = self
            .get(question_id)
            .map(str::to_string)
            .unwrap_or_else(|| fallback_slug(question_id));

        let hint = raw_name_hint.trim();
        let suffix = if hint.is_empty() {
            sanitize_untrimmed(option_label)
        } else {
            hint.to_string()
        };

        if suffix.is_empty() || suffix.chars().all(|ch| ch == '_') {
            return slug;
        }
        if suffix == slug || suffix.starts_with(&format!("{slug}_")) {
            return suffix;
        }
        if suffix.starts_with('_') {
            format!("{slug}{suffix}")
        } else {
            format!("{slug}_{suffix}")
        }
    }

    pub fn len(&self) -> usize {
        self.by_question.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_question.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn slugify_collapses_punctuation_runs() {
        assert_eq!(slugify("  What is your Name?? "), "what_is_your_name");
        assert_eq!(slugify("A -- B"), "a_b");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn registry_disambiguates_collisions() {
        let mut registry = SlugRegistry::new();
        assert_eq!(registry.assign("1", "Income"), "income");
        assert_eq!(registry.assign("2", "income!"), "income_2");
        assert_eq!(registry.assign("3", "Income?"), "income_3");
        assert_eq!(registry.assign("1", "ignored"), "income");
    }

    #[test]
    fn registry_falls_back_for_textless_questions() {
        let mut registry = SlugRegistry::new();
        assert_eq!(registry.assign("7", "???"), "question_7");
        assert_eq!(registry.assign("8", ""), "question_8");
    }

    #[test]
    fn control_name_prepends_slug_once() {
        let mut registry = SlugRegistry::new();
        registry.assign("q1", "Pets owned");
        assert_eq!(registry.control_name("q1", "", "Dog"), "pets_owned_dog");
        assert_eq!(
            registry.control_name("q1", "pets_owned_cat", "Cat"),
            "pets_owned_cat"
        );
        assert_eq!(registry.control_name("q1", "", " Big dog "), "pets_owned_big_dog_");
        assert_eq!(registry.control_name("q1", "", ""), "pets_owned");
    }

    #[test]
    fn control_name_uses_fallback_for_unknown_question() {
        let registry = SlugRegistry::new();
        assert_eq!(registry.control_name("9", "", "Yes"), "question_9_yes");
        assert_eq!(registry.control_name("9", "", ""), "question_9");
    }

    proptest! {
        #[test]
        fn slugify_is_idempotent(text in ".*") {
            let once = slugify(&text);
            prop_assert_eq!(slugify(&once), once);
        }

        #[test]
        fn slugify_keeps_alphanumeric_input_non_empty(text in "[ -~]*[a-zA-Z0-9][ -~]*") {
            prop_assert!(!slugify(&text).is_empty());
        }
    }
}
