//! Weighted message selection with anti-repetition

use chrono::NaiveDate;
use rand::Rng;

use crate::providers::{days_before, AuditSink};
use crate::types::{Message, Rule};

/// Picks one active message of a fired rule
#[derive(Debug, Clone, Copy)]
pub struct MessageSelector {
    anti_repeat_days: u32,
}

impl MessageSelector {
    pub fn new(anti_repeat_days: u32) -> Self {
        Self { anti_repeat_days }
    }

    /// Select a message for `rule` on `date`.
    ///
    /// Messages fired for this user and rule within the anti-repeat window
    /// `[date - window, date)` are skipped unless that leaves nothing, in which
    /// case every active message is a candidate again. Returns `None` only when
    /// the rule has no active message.
    pub fn select<'r, R>(
        &self,
        rule: &'r Rule,
        user_id: &str,
        date: NaiveDate,
        audits: &dyn AuditSink,
        rng: &mut R,
    ) -> Option<&'r Message>
    where
        R: Rng + ?Sized,
    {
        let active: Vec<&Message> = rule.active_messages().collect();
        if active.is_empty() {
            tracing::warn!(rule_id = %rule.id, "rule has no active messages");
            return None;
        }

        let candidates = if self.anti_repeat_days > 0 {
            let since = days_before(date, self.anti_repeat_days);
            let fresh: Vec<&Message> = active
                .iter()
                .copied()
                .filter(|m| !audits.was_message_fired_recently(user_id, &rule.id, m.id, since, date))
                .collect();
            if fresh.is_empty() {
                active
            } else {
                fresh
            }
        } else {
            active
        };

        weighted_choice(&candidates, rng)
    }
}

fn weighted_choice<'r, R>(candidates: &[&'r Message], rng: &mut R) -> Option<&'r Message>
where
    R: Rng + ?Sized,
{
    match candidates {
        [] => None,
        [only] => Some(*only),
        _ => {
            let total: u64 = candidates.iter().map(|m| u64::from(m.weight)).sum();
            if total == 0 {
                return Some(candidates[rng.gen_range(0..candidates.len())]);
            }

            let draw = rng.gen_range(0..total);
            let mut cumulative = 0u64;
            for message in candidates {
                cumulative += u64::from(message.weight);
                if draw < cumulative {
                    return Some(*message);
                }
            }
            candidates.last().copied()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::InMemoryAuditLog;
    use crate::types::AuditEntry;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::json;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn rule() -> Rule {
        Rule::new("r1", "activity", json!({"all": []}))
            .with_message(Message::new(1, "light").with_weight(1))
            .with_message(Message::new(2, "heavy").with_weight(3))
    }

    #[test]
    fn test_weighted_distribution() {
        let rule = rule();
        let audits = InMemoryAuditLog::new();
        let selector = MessageSelector::new(0);
        let mut rng = StdRng::seed_from_u64(7);

        let draws = 20_000;
        let heavy = (0..draws)
            .filter(|_| {
                selector
                    .select(&rule, "u1", date("2024-05-01"), &audits, &mut rng)
                    .unwrap()
                    .id
                    == 2
            })
            .count();

        let share = heavy as f64 / draws as f64;
        assert!((0.72..0.78).contains(&share), "share was {share}");
    }

    #[test]
    fn test_anti_repeat_excludes_recent_message() {
        let rule = rule();
        let audits = InMemoryAuditLog::new();
        audits.record(AuditEntry::new("default", "u1", date("2024-04-28"), "r1", true, Some(2)));

        let selector = MessageSelector::new(7);
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..50 {
            let message = selector
                .select(&rule, "u1", date("2024-05-01"), &audits, &mut rng)
                .unwrap();
            assert_eq!(message.id, 1);
        }
    }

    #[test]
    fn test_anti_repeat_window_bounds() {
        let rule = rule();
        let audits = InMemoryAuditLog::new();
        // Outside the window, and on the target date itself
        audits.record(AuditEntry::new("default", "u1", date("2024-04-23"), "r1", true, Some(2)));
        audits.record(AuditEntry::new("default", "u1", date("2024-05-01"), "r1", true, Some(2)));

        let selector = MessageSelector::new(7);
        let mut rng = StdRng::seed_from_u64(3);
        let picked_heavy = (0..200)
            .filter(|_| {
                selector
                    .select(&rule, "u1", date("2024-05-01"), &audits, &mut rng)
                    .unwrap()
                    .id
                    == 2
            })
            .count();
        assert!(picked_heavy > 0);
    }

    #[test]
    fn test_falls_back_when_all_recent() {
        let rule = rule();
        let audits = InMemoryAuditLog::new();
        audits.record(AuditEntry::new("default", "u1", date("2024-04-29"), "r1", true, Some(1)));
        audits.record(AuditEntry::new("default", "u1", date("2024-04-30"), "r1", true, Some(2)));

        let selector = MessageSelector::new(7);
        let mut rng = StdRng::seed_from_u64(5);
        assert!(selector
            .select(&rule, "u1", date("2024-05-01"), &audits, &mut rng)
            .is_some());
    }

    #[test]
    fn test_no_active_messages() {
        let rule = Rule::new("r1", "activity", json!({"all": []}))
            .with_message(Message::new(1, "off").inactive());
        let audits = InMemoryAuditLog::new();
        let mut rng = StdRng::seed_from_u64(5);

        assert!(MessageSelector::new(7)
            .select(&rule, "u1", date("2024-05-01"), &audits, &mut rng)
            .is_none());
    }

    #[test]
    fn test_zero_weights_pick_uniformly() {
        let rule = Rule::new("r1", "activity", json!({"all": []}))
            .with_message(Message::new(1, "a").with_weight(0))
            .with_message(Message::new(2, "b").with_weight(0));
        let audits = InMemoryAuditLog::new();
        let selector = MessageSelector::new(0);
        let mut rng = StdRng::seed_from_u64(11);

        let mut seen = [false, false];
        for _ in 0..100 {
            let id = selector
                .select(&rule, "u1", date("2024-05-01"), &audits, &mut rng)
                .unwrap()
                .id;
            seen[(id - 1) as usize] = true;
        }
        assert_eq!(seen, [true, true]);
    }
}
