use chrono::{DateTime, Utc};

use super::summary::TrialSummary;
use crate::{
    audio::MusicSink,
    config::ClusterLoopOverride,
    error::TrialError,
    render::{mark_sentences, SentenceMark},
    scheduler::{MusicCondition, PartitionSequencer, TargetResolver, Transition},
    story::{PreparedStory, Sentence},
};

/// Where a trial sits in the participant's sequence, and its condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrialPlan {
    pub story_number: usize,
    pub total_stories: usize,
    pub condition: MusicCondition,
}

/// One reader working through one story under one condition.
///
/// Owns the sequencer and target resolver and drives a [`MusicSink`]. Music is
/// stopped on `finish`, `abort` or drop, whichever comes first.
pub struct TrialSession<S: MusicSink> {
    story_id: String,
    title: String,
    sentences: Vec<Sentence>,
    plan: TrialPlan,
    sequencer: PartitionSequencer,
    resolver: TargetResolver,
    sink: S,
    started_at: Option<DateTime<Utc>>,
    stopped: bool,
    audio_failures: usize,
}

impl<S: MusicSink> TrialSession<S> {
    pub fn new(prepared: &PreparedStory, plan: TrialPlan, overrides: &[ClusterLoopOverride], sink: S) -> Self {
        let story = &prepared.story;
        Self {
            story_id: story.id.clone(),
            title: story.title.clone(),
            sentences: story.sentences.clone(),
            plan,
            sequencer: PartitionSequencer::new(prepared.index.clone()),
            resolver: TargetResolver::new(plan.condition, &story.id, overrides),
            sink,
            started_at: None,
            stopped: false,
            audio_failures: 0,
        }
    }

    /// Show the first partition and issue the entry target. Repeated calls
    /// change nothing.
    pub fn start(&mut self) {
        if self.started_at.is_some() {
            return;
        }
        self.started_at = Some(Utc::now());
        log::info!(
            "Trial {}/{}: '{}' under {}",
            self.plan.story_number,
            self.plan.total_stories,
            self.story_id,
            self.plan.condition
        );
        self.issue_target();
    }

    /// One advance event: move one partition forward and switch music if the
    /// target changed.
    pub fn advance(&mut self) -> Transition {
        if self.started_at.is_none() || self.stopped {
            return Transition::Ignored;
        }
        let transition = self.sequencer.advance();
        match transition {
            Transition::Moved | Transition::EnteredAdditional => self.issue_target(),
            Transition::Completed => {
                log::info!("Trial '{}' reached the end of the text", self.story_id)
            }
            Transition::Ignored => {}
        }
        transition
    }

    pub fn is_complete(&self) -> bool {
        self.sequencer.is_complete()
    }

    pub fn marks(&self) -> Vec<SentenceMark> {
        mark_sentences(&self.sentences, self.sequencer.highlighted())
    }

    /// Count a failed track. Returns `true` for the first failure only.
    pub fn record_audio_failure(&mut self) -> bool {
        self.audio_failures += 1;
        self.audio_failures == 1
    }

    pub fn finish(&mut self) -> Result<TrialSummary, TrialError> {
        if !self.is_complete() {
            return Err(TrialError::NotComplete);
        }
        self.stop_music();
        let summary = self.summary(true);
        log::info!(
            "Trial '{}' finished: {} partitions, {} clusters, {} additional, {} ms",
            summary.story_id,
            summary.counts.total_partitions,
            summary.counts.total_clusters,
            summary.counts.additional_partitions_shown,
            summary.reading_time_ms
        );
        Ok(summary)
    }

    pub fn abort(&mut self) -> TrialSummary {
        self.stop_music();
        log::warn!("Trial '{}' aborted", self.story_id);
        self.summary(false)
    }

    pub fn story_id(&self) -> &str {
        &self.story_id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn sentences(&self) -> &[Sentence] {
        &self.sentences
    }

    pub fn plan(&self) -> TrialPlan {
        self.plan
    }

    pub fn sequencer(&self) -> &PartitionSequencer {
        &self.sequencer
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    // ── Private helpers ───────────────────────────────────────────────────

    fn issue_target(&mut self) {
        if let Some(track) = self.resolver.next_switch(&self.sequencer) {
            log::info!("'{}': music → {track}", self.story_id);
            self.sink.switch_to(&track);
        }
    }

    fn stop_music(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.sink.stop();
        }
    }

    fn summary(&self, completed: bool) -> TrialSummary {
        let finished_at = Utc::now();
        let started_at = self.started_at.unwrap_or(finished_at);
        TrialSummary {
            story_id: self.story_id.clone(),
            story_title: self.title.clone(),
            story_number: self.plan.story_number,
            music_condition: self.plan.condition,
            counts: self.sequencer.counts(),
            completed,
            started_at,
            finished_at,
            reading_time_ms: (finished_at - started_at).num_milliseconds(),
            audio_failures: self.audio_failures,
        }
    }
}

impl<S: MusicSink> Drop for TrialSession<S> {
    fn drop(&mut self) {
        self.stop_music();
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use super::*;
    use crate::{
        render::Emphasis,
        scheduler::{SegmentIndex, Track},
        story::{AlignmentMapping, Story},
    };

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Switch(String),
        Stop,
    }

    /// Shares its call list so it can be inspected after the session drops.
    #[derive(Debug, Clone, Default)]
    struct RecordingSink(Rc<RefCell<Vec<Call>>>);

    impl RecordingSink {
        fn calls(&self) -> Vec<Call> {
            self.0.borrow().clone()
        }

        fn switches(&self) -> Vec<String> {
            self.calls()
                .into_iter()
                .filter_map(|c| match c {
                    Call::Switch(name) => Some(name),
                    Call::Stop => None,
                })
                .collect()
        }
    }

    impl MusicSink for RecordingSink {
        fn switch_to(&mut self, track: &Track) {
            self.0.borrow_mut().push(Call::Switch(track.name()));
        }

        fn stop(&mut self) {
            self.0.borrow_mut().push(Call::Stop);
        }
    }

    fn prepared() -> PreparedStory {
        let story = Story {
            id: "carnival_packed_away".into(),
            title: "The Carnival Packed Away".into(),
            sentences: (0..6).map(|id| Sentence::new(id, format!("Sentence {id}."))).collect(),
            midi_mapping: AlignmentMapping::from_pairs([("A", vec!["10,11", "12,13,14"])]),
            midi_dir_name: None,
        };
        let index = SegmentIndex::build(&story).unwrap();
        PreparedStory { story, index }
    }

    fn session(condition: MusicCondition, sink: RecordingSink) -> TrialSession<RecordingSink> {
        let plan = TrialPlan { story_number: 1, total_stories: 3, condition };
        TrialSession::new(&prepared(), plan, &[], sink)
    }

    fn highlighted(session: &TrialSession<RecordingSink>) -> Vec<i64> {
        session
            .marks()
            .into_iter()
            .filter(|m| m.emphasis == Emphasis::Highlighted)
            .map(|m| m.id)
            .collect()
    }

    #[test]
    fn regular_scenario_end_to_end() {
        let sink = RecordingSink::default();
        let mut s = session(MusicCondition::Regular, sink.clone());
        s.start();
        assert_eq!(highlighted(&s), vec![0, 1]);
        assert_eq!(sink.switches(), vec!["A_partition1"]);

        assert_eq!(s.advance(), Transition::Moved);
        assert_eq!(highlighted(&s), vec![2, 3, 4]);
        assert_eq!(sink.switches(), vec!["A_partition1", "A_partition2"]);

        assert_eq!(s.advance(), Transition::EnteredAdditional);
        assert_eq!(highlighted(&s), vec![5]);
        assert_eq!(sink.switches().last().map(String::as_str), Some("cluster_4"));

        assert_eq!(s.advance(), Transition::Completed);
        assert_eq!(highlighted(&s), vec![5]);
        assert_eq!(sink.switches().len(), 3, "completion issues no switch");

        let summary = s.finish().unwrap();
        assert!(summary.completed);
        assert_eq!(summary.counts.total_partitions, 2);
        assert_eq!(summary.counts.total_clusters, 1);
        assert_eq!(summary.counts.additional_partitions_shown, 1);
        assert_eq!(sink.calls().last(), Some(&Call::Stop));
    }

    #[test]
    fn finish_before_complete_is_rejected() {
        let sink = RecordingSink::default();
        let mut s = session(MusicCondition::AveragedMusic, sink.clone());
        s.start();
        assert_eq!(s.finish(), Err(TrialError::NotComplete));
        assert!(!sink.calls().contains(&Call::Stop));
    }

    #[test]
    fn averaged_issues_one_switch_per_trial() {
        let sink = RecordingSink::default();
        let mut s = session(MusicCondition::AveragedMusic, sink.clone());
        s.start();
        while s.advance() != Transition::Completed {}
        assert_eq!(sink.switches(), vec!["cluster_avg"]);
    }

    #[test]
    fn advance_before_start_or_after_stop_is_ignored() {
        let sink = RecordingSink::default();
        let mut s = session(MusicCondition::Regular, sink.clone());
        assert_eq!(s.advance(), Transition::Ignored);
        assert!(sink.calls().is_empty());

        s.start();
        s.start();
        assert_eq!(sink.switches().len(), 1);

        let summary = s.abort();
        assert!(!summary.completed);
        assert_eq!(s.advance(), Transition::Ignored);
        assert_eq!(sink.calls(), vec![Call::Switch("A_partition1".into()), Call::Stop]);
    }

    #[test]
    fn drop_stops_music_exactly_once() {
        let sink = RecordingSink::default();
        {
            let mut s = session(MusicCondition::CrossFadedClusters, sink.clone());
            s.start();
            s.advance();
        }
        assert_eq!(sink.calls().iter().filter(|c| **c == Call::Stop).count(), 1);

        let sink = RecordingSink::default();
        {
            let mut s = session(MusicCondition::CrossFadedClusters, sink.clone());
            s.start();
            s.abort();
        }
        assert_eq!(sink.calls().iter().filter(|c| **c == Call::Stop).count(), 1);
    }

    #[test]
    fn sessions_do_not_share_playback_state() {
        let first = RecordingSink::default();
        let second = RecordingSink::default();
        let mut a = session(MusicCondition::CrossFadedClusters, first.clone());
        a.start();
        while a.advance() != Transition::Completed {}
        a.finish().unwrap();

        let mut b = session(MusicCondition::CrossFadedClusters, second.clone());
        b.start();
        // A fresh trial switches at entry even though the last one ended on
        // the same cluster track.
        assert_eq!(second.switches(), vec!["cluster_1"]);
    }

    #[test]
    fn first_audio_failure_is_flagged_once() {
        let mut s = session(MusicCondition::Regular, RecordingSink::default());
        assert!(s.record_audio_failure());
        assert!(!s.record_audio_failure());
        assert_eq!(s.abort().audio_failures, 2);
    }
}
