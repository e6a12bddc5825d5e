//! Post-processing of fired events
//!
//! Two passes run in order:
//! - Cooldown filter: drop events whose rule fired too recently for the user
//! - Conflict resolver: keep the highest ranked events under per-category and
//!   global daily caps

use chrono::NaiveDate;
use std::collections::HashMap;

use crate::providers::{days_before, AuditSink};
use crate::types::{RecommendationEvent, Rule};

/// Suppresses events inside their rule's cooldown window
#[derive(Debug, Clone, Copy, Default)]
pub struct CooldownFilter;

impl CooldownFilter {
    /// Keep events whose rule has not fired for the user in
    /// `[target - cooldown_days, target - 1]`.
    ///
    /// Events whose rule is not in `rules` are dropped.
    pub fn apply(
        &self,
        events: Vec<RecommendationEvent>,
        rules: &[Rule],
        audits: &dyn AuditSink,
        target_date: NaiveDate,
    ) -> Vec<RecommendationEvent> {
        let cooldowns: HashMap<&str, u32> = rules
            .iter()
            .map(|r| (r.id.as_str(), r.cooldown_days))
            .collect();

        events
            .into_iter()
            .filter(|event| {
                let Some(&cooldown) = cooldowns.get(event.rule_id.as_str()) else {
                    tracing::debug!(rule_id = %event.rule_id, "dropping event for unknown rule");
                    return false;
                };
                if cooldown == 0 {
                    return true;
                }

                let since = days_before(target_date, cooldown);
                let until = days_before(target_date, 1);
                let cooling = audits.was_rule_fired_recently(&event.user_id, &event.rule_id, since, until);
                if cooling {
                    tracing::debug!(
                        rule_id = %event.rule_id,
                        user_id = %event.user_id,
                        cooldown_days = cooldown,
                        "event suppressed by cooldown"
                    );
                }
                !cooling
            })
            .collect()
    }
}

/// Applies daily caps to ranked events
#[derive(Debug, Clone, Copy)]
pub struct ConflictResolver {
    /// 0 means unlimited
    pub max_per_day: usize,
    /// 0 means unlimited
    pub max_per_category_per_day: usize,
}

impl ConflictResolver {
    pub fn new(max_per_day: usize, max_per_category_per_day: usize) -> Self {
        Self {
            max_per_day,
            max_per_category_per_day,
        }
    }

    /// Rank by priority then severity (both descending, stable) and admit
    /// greedily. A category at its cap skips the event; a full global cap ends
    /// the scan.
    pub fn resolve(&self, mut events: Vec<RecommendationEvent>) -> Vec<RecommendationEvent> {
        events.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| b.severity.cmp(&a.severity))
        });

        let mut admitted = Vec::new();
        let mut per_category: HashMap<String, usize> = HashMap::new();

        for event in events {
            let in_category = per_category.get(&event.category).copied().unwrap_or(0);
            if self.max_per_category_per_day > 0 && in_category >= self.max_per_category_per_day {
                tracing::debug!(rule_id = %event.rule_id, category = %event.category, "category cap reached");
                continue;
            }
            if self.max_per_day > 0 && admitted.len() >= self.max_per_day {
                tracing::debug!(rule_id = %event.rule_id, "daily cap reached");
                break;
            }

            *per_category.entry(event.category.clone()).or_insert(0) += 1;
            admitted.push(event);
        }

        admitted
    }
}

/// Cooldown filter followed by conflict resolution
#[derive(Debug, Clone, Copy)]
pub struct PostProcessor {
    cooldown: CooldownFilter,
    resolver: ConflictResolver,
}

impl PostProcessor {
    pub fn new(resolver: ConflictResolver) -> Self {
        Self {
            cooldown: CooldownFilter,
            resolver,
        }
    }

    pub fn process(
        &self,
        events: Vec<RecommendationEvent>,
        rules: &[Rule],
        audits: &dyn AuditSink,
        target_date: NaiveDate,
    ) -> Vec<RecommendationEvent> {
        let cooled = self.cooldown.apply(events, rules, audits, target_date);
        self.resolver.resolve(cooled)
    }
}
