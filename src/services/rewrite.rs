use crate::services::nlp::GuidelineRewriter;
use std::sync::Arc;

/// Misspellings and agreement slips corrected when guidelines mention
/// "grammar"/"grammatical". Containment is checked against the lowercased
/// text; replacement is a raw global substring replace.
const GRAMMAR_FIXES: &[(&str, &str)] = &[
    ("there is", "there are"),
    ("was", "were"),
    ("its", "it's"),
    ("your", "you're"),
    ("then", "than"),
    ("affect", "effect"),
    ("loose", "lose"),
    ("alot", "a lot"),
    ("recieve", "receive"),
    ("seperate", "separate"),
    ("definately", "definitely"),
    ("occured", "occurred"),
];

/// Contraction expansions applied when guidelines mention "formal".
const FORMAL_FIXES: &[(&str, &str)] = &[
    ("don't", "do not"),
    ("won't", "will not"),
    ("can't", "cannot"),
    ("isn't", "is not"),
    ("aren't", "are not"),
    ("wasn't", "was not"),
    ("weren't", "were not"),
    ("haven't", "have not"),
    ("hasn't", "has not"),
    ("hadn't", "had not"),
    ("wouldn't", "would not"),
    ("couldn't", "could not"),
    ("shouldn't", "should not"),
];

/// Filler words and wordy phrases stripped when guidelines mention "concise".
const CONCISE_FIXES: &[(&str, &str)] = &[
    (" very ", " "),
    (" really ", " "),
    (" quite ", " "),
    (" rather ", " "),
    (" extremely ", " "),
    (" absolutely ", " "),
    ("in order to", "to"),
    ("due to the fact that", "because"),
    ("at this point in time", "now"),
    ("for the purpose of", "for"),
];

/// Result of a rewrite pass. `text` is the rewritten body; the formatted
/// human-readable report is a separate value, see [`RewriteOutcome::report`].
#[derive(Debug, Clone, PartialEq)]
pub struct RewriteOutcome {
    pub text: String,
    pub changed: bool,
    pub changes: Vec<String>,
}

impl RewriteOutcome {
    /// Formats the change report: header naming the guidelines, then either
    /// the change list and final text or a no-changes notice.
    pub fn report(&self, guidelines: &str) -> String {
        let mut report = format!("GUIDELINES APPLIED: {}\n\n", guidelines);
        if self.changed {
            report.push_str("CHANGES MADE:\n");
            for change in &self.changes {
                report.push_str(&format!("- {}\n", change));
            }
            report.push_str("\nMODIFIED TEXT:\n");
            report.push_str(&self.text);
        } else {
            report.push_str("NO CHANGES NEEDED - Document already meets guidelines\n\n");
            report.push_str("ORIGINAL TEXT:\n");
            report.push_str(&self.text);
        }
        report
    }
}

/// Guideline-driven text rewriter. The deterministic rule tables are the
/// floor; an optional LLM capability rewrites first when configured.
pub struct RewriteEngine {
    model: Option<Arc<dyn GuidelineRewriter>>,
}

impl RewriteEngine {
    pub fn new(model: Option<Arc<dyn GuidelineRewriter>>) -> Self {
        Self { model }
    }

    /// Rewrites `text` per `guidelines`. Never fails: provider faults fall
    /// back to the rule pass, rule-pass faults degrade to an error-prefixed
    /// outcome with the original text preserved.
    pub async fn rewrite(&self, text: &str, guidelines: &str) -> RewriteOutcome {
        if let Some(model) = &self.model {
            match model.rewrite(text, guidelines).await {
                Ok(rewritten) => {
                    let changed = rewritten != text;
                    let changes = if changed {
                        vec![format!("Rewritten by {}", model.name())]
                    } else {
                        Vec::new()
                    };
                    return RewriteOutcome {
                        text: rewritten,
                        changed,
                        changes,
                    };
                }
                Err(e) => {
                    tracing::warn!(
                        "{} rewrite failed, falling back to rule pass: {}",
                        model.name(),
                        e
                    );
                }
            }
        }

        apply_rules(text, guidelines)
    }
}

/// Applies the three rule tables in fixed order (grammar, formal, concise),
/// each pass feeding the next. Infallible: an internal panic is reported as
/// a `[MODIFICATION ERROR: ...]` outcome with `changed = false`.
pub fn apply_rules(text: &str, guidelines: &str) -> RewriteOutcome {
    match std::panic::catch_unwind(|| apply_rules_inner(text, guidelines)) {
        Ok(outcome) => outcome,
        Err(panic) => {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown".to_string());
            tracing::error!("Modification error: {}", reason);
            RewriteOutcome {
                text: format!("[MODIFICATION ERROR: {}]\n\n{}", reason, text),
                changed: false,
                changes: Vec::new(),
            }
        }
    }
}

fn apply_rules_inner(text: &str, guidelines: &str) -> RewriteOutcome {
    let wants = |keywords: &[&str]| {
        let lowered = guidelines.to_lowercase();
        keywords.iter().any(|k| lowered.contains(k))
    };

    let mut current = text.to_string();
    let mut changes = Vec::new();
    let mut changed = false;

    if wants(&["grammar", "grammatical"]) {
        for (wrong, correct) in GRAMMAR_FIXES {
            if current.to_lowercase().contains(wrong) {
                let next = current.replace(wrong, correct);
                if next != current {
                    changed = true;
                    changes.push(format!("Fixed '{}' to '{}'", wrong, correct));
                    current = next;
                }
            }
        }
    }

    if wants(&["formal"]) {
        for (informal, formal) in FORMAL_FIXES {
            if current.contains(informal) {
                let next = current.replace(informal, formal);
                if next != current {
                    changed = true;
                    changes.push(format!("Made formal: '{}' to '{}'", informal, formal));
                    current = next;
                }
            }
        }
    }

    if wants(&["concise"]) {
        for (wordy, concise) in CONCISE_FIXES {
            if current.contains(wordy) {
                let next = current.replace(wordy, concise);
                if next != current {
                    changed = true;
                    changes.push(format!("Made concise: removed '{}'", wordy.trim()));
                    current = next;
                }
            }
        }
    }

    RewriteOutcome {
        text: current,
        changed,
        changes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grammar_fixes() {
        let outcome = apply_rules("We recieve alot of feedback.", "fix grammar");
        assert!(outcome.changed);
        assert!(outcome.text.contains("receive"));
        assert!(outcome.text.contains("a lot"));
    }

    #[test]
    fn test_formal_expands_contractions() {
        let outcome = apply_rules("This document don't have proper grammar.", "make it formal");
        assert!(outcome.changed);
        assert!(outcome.text.contains("do not"));
        assert!(!outcome.text.contains("don't"));
    }

    #[test]
    fn test_no_changes_needed() {
        let outcome = apply_rules("This is a perfect sentence.", "fix grammar");
        assert!(!outcome.changed);
        assert_eq!(outcome.text, "This is a perfect sentence.");
        assert!(outcome.changes.is_empty());
    }

    #[test]
    fn test_untriggered_guidelines_leave_text_alone() {
        let text = "We recieve alot of feedback and don't like it.";
        let outcome = apply_rules(text, "translate to French");
        assert!(!outcome.changed);
        assert_eq!(outcome.text, text);
    }

    #[test]
    fn test_rule_order_grammar_then_formal_then_concise() {
        let outcome = apply_rules(
            "We recieve feedback but don't act due to the fact that we are busy.",
            "fix grammar, make it formal and concise",
        );
        assert!(outcome.changed);
        assert!(outcome.text.contains("receive"));
        assert!(outcome.text.contains("do not"));
        assert!(outcome.text.contains("because"));
        // Change log reflects sequential table order
        let grammar_idx = outcome
            .changes
            .iter()
            .position(|c| c.starts_with("Fixed"))
            .unwrap();
        let formal_idx = outcome
            .changes
            .iter()
            .position(|c| c.starts_with("Made formal"))
            .unwrap();
        let concise_idx = outcome
            .changes
            .iter()
            .position(|c| c.starts_with("Made concise"))
            .unwrap();
        assert!(grammar_idx < formal_idx);
        assert!(formal_idx < concise_idx);
    }

    #[test]
    fn test_global_replace_logged_once() {
        let outcome = apply_rules("I don't know and I don't care.", "formal please");
        assert!(outcome.changed);
        assert!(!outcome.text.contains("don't"));
        let entries = outcome
            .changes
            .iter()
            .filter(|c| c.contains("don't"))
            .count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn test_all_contractions_in_table_expand() {
        let text = "They haven't tried, hasn't helped, wouldn't work, shouldn't matter.";
        let outcome = apply_rules(text, "formal");
        assert!(outcome.changed);
        for expanded in ["have not", "has not", "would not", "should not"] {
            assert!(outcome.text.contains(expanded), "missing '{expanded}'");
        }
    }

    #[test]
    fn test_report_lists_changes() {
        let outcome = apply_rules("We recieve alot of mail.", "grammar");
        let report = outcome.report("grammar");
        assert!(report.starts_with("GUIDELINES APPLIED: grammar\n\n"));
        assert!(report.contains("CHANGES MADE:\n"));
        assert!(report.contains("- Fixed 'recieve' to 'receive'"));
        assert!(report.contains("\nMODIFIED TEXT:\n"));
    }

    #[test]
    fn test_report_no_changes_notice() {
        let outcome = apply_rules("Pristine copy.", "concise");
        let report = outcome.report("concise");
        assert!(report.contains("NO CHANGES NEEDED - Document already meets guidelines"));
        assert!(report.contains("ORIGINAL TEXT:\nPristine copy."));
    }

    #[tokio::test]
    async fn test_engine_without_model_uses_rules() {
        let engine = RewriteEngine::new(None);
        let outcome = engine.rewrite("We can't stop.", "be formal").await;
        assert!(outcome.changed);
        assert!(outcome.text.contains("cannot"));
    }
}
