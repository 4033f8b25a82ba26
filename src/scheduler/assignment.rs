//! Story → condition assignment for one participant session.

use serde::Serialize;

use super::playback_target::MusicCondition;
use crate::config::ExperimentConfig;

/// One trial to run, in presentation order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedTrial {
    pub story_id: String,
    pub condition: MusicCondition,
}

/// Demo mode replays the configured assignments as declared. Otherwise the
/// study stories are shuffled, the three conditions are shuffled, and they are
/// paired in order (cycling conditions if there are more than three stories).
pub fn plan_trials(config: &ExperimentConfig, rng: &mut fastrand::Rng) -> Vec<PlannedTrial> {
    if config.demo {
        return config
            .demo_assignments
            .iter()
            .map(|a| PlannedTrial {
                story_id: a.story_id.clone(),
                condition: a.condition,
            })
            .collect();
    }

    let mut stories = config.study_stories.clone();
    let mut conditions = MusicCondition::ALL;
    rng.shuffle(&mut stories);
    rng.shuffle(&mut conditions);

    let plan: Vec<PlannedTrial> = stories
        .into_iter()
        .zip(conditions.iter().cycle())
        .map(|(story_id, &condition)| PlannedTrial { story_id, condition })
        .collect();
    log::info!(
        "Study assignment: {}",
        plan.iter()
            .map(|t| format!("{}={}", t.story_id, t.condition))
            .collect::<Vec<_>>()
            .join(", ")
    );
    plan
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_mode_keeps_declared_order() {
        let config = ExperimentConfig::default();
        let plan = plan_trials(&config, &mut fastrand::Rng::with_seed(1));
        let got: Vec<(&str, MusicCondition)> =
            plan.iter().map(|t| (t.story_id.as_str(), t.condition)).collect();
        assert_eq!(
            got,
            vec![
                ("carnival_packed_away", MusicCondition::Regular),
                ("starling_five", MusicCondition::CrossFadedClusters),
                ("lantern", MusicCondition::AveragedMusic),
            ]
        );
    }

    #[test]
    fn study_mode_uses_each_story_and_condition_once() {
        let config = ExperimentConfig { demo: false, ..ExperimentConfig::default() };
        for seed in 0..20 {
            let plan = plan_trials(&config, &mut fastrand::Rng::with_seed(seed));
            assert_eq!(plan.len(), 3);

            let mut stories: Vec<&str> = plan.iter().map(|t| t.story_id.as_str()).collect();
            stories.sort_unstable();
            assert_eq!(stories, ["carnival_packed_away", "starling_five", "window_blue_curtain"]);

            for c in MusicCondition::ALL {
                assert_eq!(plan.iter().filter(|t| t.condition == c).count(), 1, "seed {seed}");
            }
        }
    }

    #[test]
    fn same_seed_same_plan() {
        let config = ExperimentConfig { demo: false, ..ExperimentConfig::default() };
        let a = plan_trials(&config, &mut fastrand::Rng::with_seed(42));
        let b = plan_trials(&config, &mut fastrand::Rng::with_seed(42));
        assert_eq!(a, b);
    }

    #[test]
    fn extra_stories_cycle_conditions() {
        let config = ExperimentConfig {
            demo: false,
            study_stories: (0..5).map(|i| format!("s{i}")).collect(),
            ..ExperimentConfig::default()
        };
        let plan = plan_trials(&config, &mut fastrand::Rng::with_seed(7));
        assert_eq!(plan.len(), 5);
        assert_eq!(plan[0].condition, plan[3].condition);
        assert_eq!(plan[1].condition, plan[4].condition);
    }
}
