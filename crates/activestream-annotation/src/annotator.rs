//! Annotation loop
//!
//! Each round selects one record, presents it on the annotation channel,
//! waits for the oracle's verdict and commits it:
//!
//! - **Select**: normal rounds take the unlabelled record closest to the
//!   decision boundary; evaluation rounds take a random scored one
//! - **Present**: publish the record id and the model's guess, unless the
//!   same text was already judged
//! - **Await**: wait for a verdict in short slices so shutdown is observed
//! - **Commit**: store the label, update confusion and label counts, and
//!   raise the retrain trigger when the schedule says so

use crate::config::AnnotationConfig;
use crate::memo::VerdictMemo;
use crate::schedule::RetrainSchedule;
use activestream_core::{
    retry_transient, sleep_or_stop, Error, Event, EventBus, Filter, Mailbox, ManualLabel,
    ModelStamp, OutboundEvent, Query, Record, RecordId, RecordUpdate, Result, SharedKeywords,
    SharedStore, SortField, StopToken, Verdict,
};
use activestream_telemetry::{ConfusionCounters, PipelineStats};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// What a single round ended with
#[derive(Debug, Clone, PartialEq)]
pub enum RoundOutcome {
    /// Nothing was eligible for review
    Idle,
    /// A label was stored
    Committed {
        record_id: RecordId,
        verdict: Verdict,
        evaluation: bool,
        /// Taken from an earlier verdict on identical text
        from_memo: bool,
    },
    /// Refresh requested or the verdict was not understood
    Refreshed,
    /// Stop requested mid-round
    Stopped,
}

pub struct Annotator {
    store: SharedStore,
    bus: Arc<EventBus>,
    verdicts: Arc<Mailbox<String>>,
    trigger: Arc<Event>,
    confusion: Arc<ConfusionCounters>,
    keywords: Option<SharedKeywords>,
    stats: PipelineStats,
    config: AnnotationConfig,
    schedule: RetrainSchedule,
    memo: VerdictMemo,
    rng: StdRng,
    positives: usize,
    negatives: usize,
    waiting_sent: bool,
}

impl Annotator {
    pub fn new(
        store: SharedStore,
        bus: Arc<EventBus>,
        verdicts: Arc<Mailbox<String>>,
        trigger: Arc<Event>,
        config: AnnotationConfig,
        stats: PipelineStats,
    ) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            store,
            bus,
            verdicts,
            trigger,
            confusion: Arc::new(ConfusionCounters::new()),
            keywords: None,
            stats,
            schedule: RetrainSchedule::new(config.base_threshold),
            config,
            memo: VerdictMemo::new(),
            rng,
            positives: 0,
            negatives: 0,
            waiting_sent: false,
        }
    }

    /// Share confusion counters with the monitor
    pub fn with_confusion(mut self, confusion: Arc<ConfusionCounters>) -> Self {
        self.confusion = confusion;
        self
    }

    /// Credit verdicts to the tracked keywords found in the text
    pub fn with_keywords(mut self, keywords: SharedKeywords) -> Self {
        self.keywords = Some(keywords);
        self
    }

    /// Positive and negative labels committed so far
    pub fn label_counts(&self) -> (usize, usize) {
        (self.positives, self.negatives)
    }

    pub fn schedule(&self) -> &RetrainSchedule {
        &self.schedule
    }

    /// Seed the label counts from the store so a restart keeps its schedule
    pub async fn resume(&mut self) -> Result<()> {
        let (positives, negatives) = self.stored_label_counts().await?;
        self.adopt_counts(positives, negatives);
        Ok(())
    }

    async fn stored_label_counts(&self) -> Result<(usize, usize)> {
        let positives = self
            .store
            .count(&Filter::label(ManualLabel::Relevant))
            .await?;
        let negatives = self
            .store
            .count(&Filter::label(ManualLabel::Irrelevant))
            .await?;
        Ok((positives, negatives))
    }

    /// Raises the trigger if the stored labels already warrant a model
    fn adopt_counts(&mut self, positives: usize, negatives: usize) {
        self.positives = positives;
        self.negatives = negatives;
        if self.schedule.observe(positives, negatives) {
            self.trigger.set();
        }
        info!(positives, negatives, "Resumed label counts");
    }

    /// Run one select, present, await, commit cycle
    pub async fn run_round(&mut self, stop: &StopToken) -> Result<RoundOutcome> {
        let evaluation = self.rng.gen_bool(self.config.evaluation_probability.clamp(0.0, 1.0));
        let Some(record) = self.select(evaluation).await? else {
            if !self.waiting_sent {
                self.bus.publish(OutboundEvent::Waiting);
                self.waiting_sent = true;
            }
            return Ok(RoundOutcome::Idle);
        };

        let Some(probability) = record.probability_relevant else {
            error!(
                record_id = %record.id,
                model_version = %record.model_version,
                priority = ?record.annotation_priority,
                "Record reached annotation without a probability"
            );
            return Err(Error::invariant(format!(
                "record {} selected for annotation has no probability",
                record.id
            )));
        };

        if let Some(verdict) = self.memo.get(&record.text) {
            debug!(record_id = %record.id, verdict = verdict.as_str(), "Reusing verdict for duplicate text");
            return self.commit(stop, &record, verdict, evaluation, true).await;
        }

        self.present(&record, probability, evaluation);
        let verdict = match self.await_verdict(stop).await {
            Some(verdict) => verdict,
            None => return Ok(RoundOutcome::Stopped),
        };
        if verdict == Verdict::Refresh {
            debug!(record_id = %record.id, "Round refreshed");
            return Ok(RoundOutcome::Refreshed);
        }
        self.commit(stop, &record, verdict, evaluation, false).await
    }

    async fn select(&mut self, evaluation: bool) -> Result<Option<Record>> {
        let eligible = Filter::unlabelled().scored(true);
        if evaluation {
            // Uniform over every eligible record, not just the oldest
            let total = self.store.count(&eligible).await?;
            if total == 0 {
                return Ok(None);
            }
            let offset = self.rng.gen_range(0..total);
            let mut picked = self
                .store
                .find(&Query::new(eligible).skip(offset).limit(1))
                .await?;
            Ok(picked.pop())
        } else {
            let mut best = self
                .store
                .find(
                    &Query::new(eligible)
                        .sort_by(SortField::AnnotationPriority)
                        .limit(1),
                )
                .await?;
            Ok(best.pop())
        }
    }

    fn present(&mut self, record: &Record, probability: f64, evaluation: bool) {
        // Verdicts sent before this record was on display belong to no one
        if let Some(stale) = self.verdicts.take() {
            debug!(verdict = %stale, "Discarding verdict received between rounds");
        }
        self.bus.publish(OutboundEvent::DisplayItem {
            id: record.id.clone(),
            guess: (probability * 1000.0).round() / 1000.0,
            is_evaluation: evaluation,
        });
        if evaluation {
            self.bus.publish(OutboundEvent::Notice {
                message: "Evaluation round: this label measures the current model".to_string(),
            });
        }
        self.waiting_sent = false;
        debug!(record_id = %record.id, probability, evaluation, "Presented record");
    }

    /// Wait for a verdict. Unrecognized input counts as a refresh.
    /// Returns `None` once stopped.
    async fn await_verdict(&self, stop: &StopToken) -> Option<Verdict> {
        let timeout = self.config.response_timeout();
        loop {
            let raw = tokio::select! {
                _ = stop.cancelled() => return None,
                raw = self.verdicts.recv_timeout(timeout) => raw,
            };
            let Some(raw) = raw else {
                continue;
            };
            return match raw.parse::<Verdict>() {
                Ok(verdict) => Some(verdict),
                Err(e) => {
                    warn!(error = %e, "Ignoring verdict");
                    self.bus.publish(OutboundEvent::Notice {
                        message: format!("Unrecognized verdict '{}', showing the next record", raw),
                    });
                    Some(Verdict::Refresh)
                }
            };
        }
    }

    async fn commit(
        &mut self,
        stop: &StopToken,
        record: &Record,
        verdict: Verdict,
        evaluation: bool,
        from_memo: bool,
    ) -> Result<RoundOutcome> {
        let label = match verdict {
            Verdict::Relevant => ManualLabel::Relevant,
            Verdict::Irrelevant => ManualLabel::Irrelevant,
            Verdict::Skip => ManualLabel::Skipped,
            Verdict::Refresh => return Ok(RoundOutcome::Refreshed),
        };

        let update = RecordUpdate::annotation(label, evaluation);
        let stored = retry_transient(stop, "annotate", || self.store.update(&record.id, &update)).await?;
        match stored {
            None => return Ok(RoundOutcome::Stopped),
            Some(false) => warn!(record_id = %record.id, "Annotated record no longer in store"),
            Some(true) => {}
        }
        self.stats.record_annotation(verdict.as_str());
        self.memo.remember(&record.text, verdict);

        if let Some(truth) = label.target() {
            if truth {
                self.positives += 1;
            } else {
                self.negatives += 1;
            }
            if let Some(keywords) = &self.keywords {
                keywords.write().record_verdict(&record.text, truth);
            }
            // Only a trained model's guess says anything about live quality
            if evaluation && record.model_version >= ModelStamp::Version(1) {
                if let Some(guess) = record.guess() {
                    self.confusion.record(truth, guess);
                }
            }
            if self.schedule.observe(self.positives, self.negatives) {
                info!(
                    positives = self.positives,
                    negatives = self.negatives,
                    triggers = self.schedule.triggers(),
                    next_threshold = self.schedule.next_threshold(),
                    "Retrain threshold reached"
                );
                self.trigger.set();
            }
        }

        debug!(
            record_id = %record.id,
            verdict = verdict.as_str(),
            evaluation,
            from_memo,
            "Committed label"
        );
        Ok(RoundOutcome::Committed {
            record_id: record.id.clone(),
            verdict,
            evaluation,
            from_memo,
        })
    }

    pub async fn run(mut self, stop: StopToken) -> Result<()> {
        info!(
            base_threshold = self.config.base_threshold,
            evaluation_probability = self.config.evaluation_probability,
            "Annotator ready"
        );
        match retry_transient(&stop, "resume", || self.stored_label_counts()).await? {
            Some((positives, negatives)) => self.adopt_counts(positives, negatives),
            None => return Ok(()),
        }
        let idle_pause = self.config.idle_pause();

        while !stop.is_cancelled() {
            match self.run_round(&stop).await {
                Ok(RoundOutcome::Idle) => {
                    if sleep_or_stop(&stop, idle_pause).await {
                        break;
                    }
                }
                Ok(RoundOutcome::Stopped) => break,
                Ok(_) => {}
                Err(e) if e.is_transient() => {
                    warn!(error = %e, "Annotation round failed, retrying");
                    if sleep_or_stop(&stop, idle_pause).await {
                        break;
                    }
                }
                Err(e) => {
                    error!(error = %e, "Annotator failed");
                    return Err(e);
                }
            }
        }
        info!(
            positives = self.positives,
            negatives = self.negatives,
            "Annotator stopped"
        );
        Ok(())
    }
}
