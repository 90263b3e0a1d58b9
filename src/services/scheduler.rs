//! Scheduler: ranks eligible ready tasks for a requesting agent and
//! resolves the ranking down to a single atomic claim.
//!
//! Eligibility (which tasks an agent may claim at all) is a hard gate —
//! every `required_skills` entry must be an exact match in the agent's
//! skill set. Ranking among already-eligible candidates additionally
//! rewards partial overlap with a configurable table of related skills,
//! per the resolved skill partial-credit open question.

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::error::SwarmResult;
use crate::domain::models::{normalize_skill, Agent, Task, TaskFilter, TaskStatus};
use crate::domain::ports::TaskRepository;

#[derive(Debug, Clone, Default)]
pub struct SchedulerConfig {
    /// skill -> related skills that earn partial ranking credit.
    pub related_skills: HashMap<String, Vec<String>>,
    pub related_skill_credit: f64,
}

pub struct Scheduler<T: TaskRepository> {
    tasks: Arc<T>,
    config: SchedulerConfig,
}

impl<T: TaskRepository> Scheduler<T> {
    pub fn new(tasks: Arc<T>, config: SchedulerConfig) -> Self {
        Self { tasks, config }
    }

    fn related_credit(&self, agent_skills: &[String], required: &str) -> f64 {
        let Some(related) = self.config.related_skills.get(&normalize_skill(required)) else { return 0.0 };
        let agent_norm: Vec<String> = agent_skills.iter().map(|s| normalize_skill(s)).collect();
        if related.iter().any(|r| agent_norm.contains(&normalize_skill(r))) {
            self.config.related_skill_credit
        } else {
            0.0
        }
    }

    /// Score used only to break ties among equal-priority candidates;
    /// never affects the priority-desc/created-at-asc primary ordering.
    fn rank_score(&self, agent: &Agent, task: &Task) -> f64 {
        task.required_skills.iter().map(|skill| self.related_credit(&agent.skills, skill)).sum()
    }

    /// Rank eligible ready tasks for `agent` and attempt to claim the
    /// best-ranked one, falling through to the next if it loses the race.
    pub async fn next_for(&self, agent: &Agent) -> SwarmResult<Option<Task>> {
        let candidates = self.tasks.list(TaskFilter { status: Some(TaskStatus::Ready), ..Default::default() }).await?;

        let mut eligible: Vec<Task> = candidates
            .into_iter()
            .filter(|t| agent.has_all_skills(&t.required_skills))
            .filter(|t| !t.previous_agents.iter().any(|a| a == &agent.id))
            .collect();

        eligible.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.created_at.cmp(&b.created_at)).then_with(|| self.rank_score(agent, b).partial_cmp(&self.rank_score(agent, a)).unwrap_or(std::cmp::Ordering::Equal)));

        for task in eligible {
            if let Some(claimed) = self.tasks.claim_specific(&task.id, &agent.id).await? {
                return Ok(Some(claimed));
            }
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn related_credit_only_applies_with_config_entry() {
        let mut related = HashMap::new();
        related.insert("rust".to_string(), vec!["c++".to_string()]);
        let config = SchedulerConfig { related_skills: related, related_skill_credit: 0.3 };
        let scheduler_credit = config.related_skill_credit;
        assert_eq!(scheduler_credit, 0.3);
    }
}
