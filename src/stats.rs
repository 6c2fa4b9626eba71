//! Stats Aggregator
//!
//! Rollups over a snapshot. Everything here is a pure function of the leads
//! and an explicit `now`; nothing reads the clock.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::config::StatsConfig;
use crate::leads::{ConversationEntry, Lead};

/// Status bucket for leads without a status
pub const UNKNOWN_STATUS: &str = "unknown";

/// Window for "new this week"
pub fn week() -> Duration {
    Duration::days(7)
}

/// Headline counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct LeadStats {
    pub total: usize,
    /// Created within the last 7 days, boundary included
    pub new_this_week: usize,
    /// Conversation entries written by the agent role
    pub agent_messages: usize,
    pub appointments_booked: usize,
}

/// Compute the headline counters
pub fn compute_stats(leads: &[Lead], now: DateTime<Utc>, agent_role: &str) -> LeadStats {
    let week_start = now - week();

    LeadStats {
        total: leads.len(),
        new_this_week: leads.iter().filter(|l| l.created_at >= week_start).count(),
        agent_messages: leads.iter().map(|l| l.messages_from(agent_role)).sum(),
        appointments_booked: leads.iter().filter(|l| l.is_appointment_booked()).count(),
    }
}

/// Leads per status value
pub fn status_breakdown(leads: &[Lead]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for lead in leads {
        let key = lead
            .status
            .as_ref()
            .map(|s| s.as_str().to_string())
            .unwrap_or_else(|| UNKNOWN_STATUS.to_string());
        *counts.entry(key).or_insert(0) += 1;
    }
    counts
}

/// Leads created on one UTC day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DailyCount {
    pub date: NaiveDate,
    pub count: usize,
}

/// Leads created per UTC day over the 7 days ending on `now`'s day, oldest first
pub fn daily_counts(leads: &[Lead], now: DateTime<Utc>) -> Vec<DailyCount> {
    let today = now.date_naive();
    let mut days: Vec<DailyCount> = (0..7)
        .rev()
        .map(|offset| DailyCount {
            date: today - Duration::days(offset),
            count: 0,
        })
        .collect();

    for lead in leads {
        let date = lead.created_at.date_naive();
        if let Some(day) = days.iter_mut().find(|d| d.date == date) {
            day.count += 1;
        }
    }
    days
}

/// One line of the activity feed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityItem {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub status: Option<String>,
    pub message_count: usize,
    pub last_message: Option<ConversationEntry>,
}

/// The `limit` most recent leads with their latest message
///
/// Expects the snapshot order (newest first).
pub fn recent_activity(leads: &[Lead], limit: usize) -> Vec<ActivityItem> {
    leads
        .iter()
        .take(limit)
        .map(|lead| ActivityItem {
            id: lead.id.to_string(),
            created_at: lead.created_at,
            status: lead.status.as_ref().map(|s| s.to_string()),
            message_count: lead.conversation.len(),
            last_message: lead.conversation.last().cloned(),
        })
        .collect()
}

/// Everything a dashboard shows, computed in one pass over a snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsReport {
    pub computed_at: DateTime<Utc>,
    #[serde(flatten)]
    pub stats: LeadStats,
    pub by_status: BTreeMap<String, usize>,
    pub daily: Vec<DailyCount>,
    pub recent_activity: Vec<ActivityItem>,
}

impl StatsReport {
    pub fn compute(leads: &[Lead], now: DateTime<Utc>, config: &StatsConfig) -> Self {
        Self {
            computed_at: now,
            stats: compute_stats(leads, now, &config.agent_role),
            by_status: status_breakdown(leads),
            daily: daily_counts(leads, now),
            recent_activity: recent_activity(leads, config.recent_activity_limit),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leads::LeadSchema;
    use chrono::TimeZone;
    use serde_json::{json, Value};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap()
    }

    fn lead(id: i64, created_at: DateTime<Utc>, extra: Value) -> Lead {
        let mut row = json!({"id": id, "created_at": created_at.to_rfc3339()});
        if let (Some(row), Some(extra)) = (row.as_object_mut(), extra.as_object()) {
            row.extend(extra.clone());
        }
        Lead::from_row(row, &LeadSchema::default()).unwrap()
    }

    #[test]
    fn test_compute_stats() {
        let leads = vec![
            lead(
                1,
                now() - Duration::days(1),
                json!({
                    "statut": "rdv_pris",
                    "historique_conversation": [
                        {"role": "user", "content": "Bonjour"},
                        {"role": "agent", "content": "Bonjour !"},
                        {"role": "agent", "content": "Quand êtes-vous disponible ?"}
                    ]
                }),
            ),
            lead(
                2,
                now() - Duration::days(30),
                json!({
                    "statut": "nouveau",
                    "historique_conversation": "[{\"role\":\"agent\",\"content\":\"Hi\"}]"
                }),
            ),
        ];

        let stats = compute_stats(&leads, now(), "agent");
        assert_eq!(
            stats,
            LeadStats {
                total: 2,
                new_this_week: 1,
                agent_messages: 3,
                appointments_booked: 1,
            }
        );
    }

    #[test]
    fn test_week_boundary_is_inclusive() {
        let exactly = lead(1, now() - week(), json!({}));
        let older = lead(2, now() - week() - Duration::milliseconds(1), json!({}));

        assert_eq!(compute_stats(&[exactly], now(), "agent").new_this_week, 1);
        assert_eq!(compute_stats(&[older], now(), "agent").new_this_week, 0);
    }

    #[test]
    fn test_invalid_history_counts_zero() {
        let leads = vec![lead(
            1,
            now(),
            json!({"historique_conversation": "not valid json"}),
        )];
        let stats = compute_stats(&leads, now(), "agent");
        assert_eq!(stats.agent_messages, 0);
        assert_eq!(stats.total, 1);
    }

    #[test]
    fn test_compute_is_deterministic() {
        let leads = vec![
            lead(1, now() - Duration::hours(3), json!({"statut": "rdv_pris"})),
            lead(2, now() - Duration::days(9), json!({})),
        ];
        let config = StatsConfig::default();

        let first = StatsReport::compute(&leads, now(), &config);
        let second = StatsReport::compute(&leads, now(), &config);
        assert_eq!(first, second);
    }

    #[test]
    fn test_status_breakdown() {
        let leads = vec![
            lead(1, now(), json!({"statut": "rdv_pris"})),
            lead(2, now(), json!({"statut": "rdv_pris"})),
            lead(3, now(), json!({"statut": "relance"})),
            lead(4, now(), json!({})),
        ];

        let counts = status_breakdown(&leads);
        assert_eq!(counts.get("rdv_pris"), Some(&2));
        assert_eq!(counts.get("relance"), Some(&1));
        assert_eq!(counts.get(UNKNOWN_STATUS), Some(&1));
    }

    #[test]
    fn test_daily_counts() {
        let leads = vec![
            lead(1, now(), json!({})),
            lead(2, now() - Duration::hours(1), json!({})),
            lead(3, now() - Duration::days(6), json!({})),
            lead(4, now() - Duration::days(7), json!({})),
        ];

        let days = daily_counts(&leads, now());
        assert_eq!(days.len(), 7);
        assert_eq!(days[0].date, NaiveDate::from_ymd_opt(2024, 3, 4).unwrap());
        assert_eq!(days[0].count, 1);
        assert_eq!(days[6].date, NaiveDate::from_ymd_opt(2024, 3, 10).unwrap());
        assert_eq!(days[6].count, 2);
        assert_eq!(days.iter().map(|d| d.count).sum::<usize>(), 3);
    }

    #[test]
    fn test_recent_activity() {
        let leads = vec![
            lead(
                2,
                now(),
                json!({"historique_conversation": [
                    {"role": "user", "content": "Bonjour"},
                    {"role": "agent", "content": "À bientôt"}
                ]}),
            ),
            lead(1, now() - Duration::days(1), json!({})),
        ];

        let items = recent_activity(&leads, 1);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "2");
        assert_eq!(items[0].message_count, 2);
        assert_eq!(
            items[0].last_message.as_ref().map(|m| m.content.as_str()),
            Some("À bientôt")
        );
    }

    #[test]
    fn test_report_serializes_flat_counters() {
        let report = StatsReport::compute(&[], now(), &StatsConfig::default());
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["total"], 0);
        assert_eq!(json["new_this_week"], 0);
        assert_eq!(json["daily"].as_array().unwrap().len(), 7);
    }
}
