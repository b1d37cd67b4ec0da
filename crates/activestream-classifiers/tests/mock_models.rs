//! Mock models for exercising the classifier service and trainer
//!
//! Provides configurable implementations of the model traits so worker
//! behavior can be checked without fitting real models.

use activestream_classifiers::{
    ClassifierConfig, ClassifierService, FeatureMatrix, ModelSnapshot, ModelTrainer,
    RelevanceModel, Trainer, TrainerConfig,
};
use activestream_core::{
    DocumentStore, Error, Event, KeywordSet, Mailbox, ManualLabel, MemoryStore, ModelStamp,
    Origin, Record, Result, SharedStore, StopToken, Vocabulary,
};
use activestream_telemetry::PipelineStats;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Answers a fixed probability and records the widths it was asked to score
#[derive(Debug)]
pub struct MockModel {
    width: usize,
    probability: f64,
    weights: Vec<f64>,
    seen_widths: Mutex<Vec<usize>>,
}

impl MockModel {
    pub fn new(width: usize, probability: f64) -> Self {
        Self {
            width,
            probability,
            weights: vec![0.0; width],
            seen_widths: Mutex::new(Vec::new()),
        }
    }

    pub fn with_weights(mut self, weights: Vec<f64>) -> Self {
        self.width = weights.len();
        self.weights = weights;
        self
    }

    pub fn seen_widths(&self) -> Vec<usize> {
        self.seen_widths.lock().clone()
    }
}

impl RelevanceModel for MockModel {
    fn name(&self) -> &str {
        "mock"
    }

    fn width(&self) -> usize {
        self.width
    }

    fn predict_proba(&self, features: &FeatureMatrix) -> Result<Vec<f64>> {
        self.seen_widths.lock().push(features.width());
        Ok(vec![self.probability; features.n_rows()])
    }

    fn weights(&self) -> &[f64] {
        &self.weights
    }
}

/// Returns fewer probabilities than rows
#[derive(Debug)]
pub struct ShortModel;

impl RelevanceModel for ShortModel {
    fn name(&self) -> &str {
        "short"
    }

    fn width(&self) -> usize {
        0
    }

    fn predict_proba(&self, _features: &FeatureMatrix) -> Result<Vec<f64>> {
        Ok(Vec::new())
    }

    fn weights(&self) -> &[f64] {
        &[]
    }
}

/// Fits a [`MockModel`] as wide as the training matrix and counts calls
pub struct MockTrainer {
    calls: AtomicU32,
    fail_with: Option<String>,
}

impl MockTrainer {
    pub fn new() -> Self {
        Self {
            calls: AtomicU32::new(0),
            fail_with: None,
        }
    }

    pub fn with_error(mut self, message: &str) -> Self {
        self.fail_with = Some(message.to_string());
        self
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ModelTrainer for MockTrainer {
    fn fit(&self, features: &FeatureMatrix, targets: &[bool]) -> Result<Arc<dyn RelevanceModel>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.fail_with {
            return Err(Error::classifier(message.clone()));
        }
        assert_eq!(features.n_rows(), targets.len());
        let weights = (0..features.width()).map(|i| i as f64).collect();
        Ok(Arc::new(MockModel::new(0, 0.8).with_weights(weights)))
    }
}

fn extracted(id: &str, bag: &[(u32, u32)], vocab_size: usize) -> Record {
    let mut record = Record::new(id, id, Origin::Tracked);
    record.bag = bag.iter().copied().collect();
    record.vocab_size_at_extraction = vocab_size;
    record
}

fn labelled(id: &str, label: ManualLabel, bag: &[(u32, u32)]) -> Record {
    let mut record = extracted(id, bag, 3);
    record.manual_relevant = Some(label);
    record.model_version = ModelStamp::GroundTruth;
    record
}

async fn store_with(records: Vec<Record>) -> SharedStore {
    let store = MemoryStore::shared();
    for record in records {
        store.insert(record).await.unwrap();
    }
    store
}

fn snapshot(version: u64, model: Arc<dyn RelevanceModel>) -> ModelSnapshot {
    ModelSnapshot {
        version,
        model,
        ..ModelSnapshot::baseline()
    }
}

#[tokio::test]
async fn test_batches_are_aligned_to_model_width() {
    let store = store_with(vec![
        extracted("narrow", &[(0, 1)], 1),
        extracted("wide", &[(0, 1), (5, 2)], 6),
    ])
    .await;
    let models = Arc::new(Mailbox::new());
    let model = Arc::new(MockModel::new(3, 0.25));
    models.publish(snapshot(1, model.clone()));

    let mut service = ClassifierService::new(
        Arc::clone(&store),
        Arc::clone(&models),
        ClassifierConfig::default(),
        PipelineStats::new(),
    );
    assert!(service.adopt_pending());
    assert_eq!(service.classify_pending().await.unwrap(), 2);
    assert_eq!(model.seen_widths(), vec![3]);

    let wide = store.get("wide").await.unwrap().unwrap();
    assert_eq!(wide.probability_relevant, Some(0.25));
    assert_eq!(wide.classifier_relevant, Some(false));
    assert_eq!(wide.model_version, ModelStamp::Version(1));
}

#[tokio::test]
async fn test_batch_size_limits_each_cycle() {
    let records = (0..5)
        .map(|i| extracted(&format!("r{}", i), &[], 0))
        .collect();
    let store = store_with(records).await;
    let service = ClassifierService::new(
        Arc::clone(&store),
        Arc::new(Mailbox::new()),
        ClassifierConfig {
            batch_size: 2,
            ..Default::default()
        },
        PipelineStats::new(),
    );

    assert_eq!(service.classify_pending().await.unwrap(), 2);
    assert_eq!(service.classify_pending().await.unwrap(), 2);
    assert_eq!(service.classify_pending().await.unwrap(), 1);
    assert_eq!(service.classify_pending().await.unwrap(), 0);
}

#[tokio::test]
async fn test_contract_violation_stops_the_service() {
    let store = store_with(vec![extracted("a", &[], 0)]).await;
    let models = Arc::new(Mailbox::new());
    models.publish(snapshot(1, Arc::new(ShortModel)));
    let service = ClassifierService::new(
        store,
        models,
        ClassifierConfig::default(),
        PipelineStats::new(),
    );

    let result = service.run(StopToken::new()).await;
    assert!(matches!(result, Err(Error::Invariant(_))));
}

#[tokio::test]
async fn test_service_adopts_models_while_running() {
    let store = store_with(vec![extracted("a", &[(0, 1)], 1)]).await;
    let models = Arc::new(Mailbox::new());
    let stats = PipelineStats::new();
    let service = ClassifierService::new(
        Arc::clone(&store),
        Arc::clone(&models),
        ClassifierConfig {
            poll_interval_ms: 10,
            ..Default::default()
        },
        stats.clone(),
    );
    let stop = StopToken::new();
    let handle = tokio::spawn(service.run(stop.clone()));

    models.publish(snapshot(1, Arc::new(MockModel::new(1, 0.9))));
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let record = store.get("a").await.unwrap().unwrap();
            if record.model_version == ModelStamp::Version(1) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    stop.cancel();
    handle.await.unwrap().unwrap();
    assert_eq!(stats.model_version(), 1);
    assert_eq!(
        store.get("a").await.unwrap().unwrap().probability_relevant,
        Some(0.9)
    );
}

fn trainer_for(
    store: SharedStore,
    fitter: Arc<MockTrainer>,
    trigger: Arc<Event>,
    models: Arc<Mailbox<ModelSnapshot>>,
) -> Trainer {
    let vocabulary = Vocabulary::shared();
    for term in ["vote", "rain", "merkel"] {
        vocabulary.lookup_or_insert(term);
    }
    Trainer::new(
        store,
        vocabulary,
        KeywordSet::from_seed(["vote"]).into_shared(),
        trigger,
        models,
        TrainerConfig {
            poll_interval_ms: 10,
            ..Default::default()
        },
        PipelineStats::new(),
    )
    .with_fitter(fitter)
}

#[tokio::test]
async fn test_train_once_uses_labelled_records_only() {
    let store = store_with(vec![
        labelled("p", ManualLabel::Relevant, &[(0, 1)]),
        labelled("n", ManualLabel::Irrelevant, &[(1, 1)]),
        labelled("s", ManualLabel::Skipped, &[(2, 1)]),
        extracted("u", &[(2, 1)], 3),
    ])
    .await;
    let fitter = Arc::new(MockTrainer::new());
    let models = Arc::new(Mailbox::new());
    let features = Arc::new(Mailbox::new());
    let mut trainer = trainer_for(
        store,
        Arc::clone(&fitter),
        Arc::new(Event::new()),
        Arc::clone(&models),
    )
    .with_feature_board(Arc::clone(&features));

    let snapshot = trainer.train_once().await.unwrap();
    assert_eq!(snapshot.version, 1);
    assert_eq!(snapshot.trained_on, 2);
    assert_eq!(snapshot.model.width(), 3);
    // Weights rise with the term id; the tracked keyword is never reported
    assert_eq!(snapshot.top_features, vec!["merkel", "rain"]);
    assert_eq!(features.take(), Some(vec!["merkel".to_string(), "rain".to_string()]));
    assert_eq!(models.take().map(|s| s.version), Some(1));
    assert_eq!(fitter.call_count(), 1);
}

#[tokio::test]
async fn test_trigger_runs_training_and_failures_are_survivable() {
    let store = store_with(vec![
        labelled("p", ManualLabel::Relevant, &[(0, 1)]),
        labelled("n", ManualLabel::Irrelevant, &[(1, 1)]),
    ])
    .await;
    let fitter = Arc::new(MockTrainer::new().with_error("one class only"));
    let trigger = Arc::new(Event::new());
    let models = Arc::new(Mailbox::new());
    let trainer = trainer_for(store, Arc::clone(&fitter), Arc::clone(&trigger), Arc::clone(&models));

    let stop = StopToken::new();
    let handle = tokio::spawn(trainer.run(stop.clone()));
    trigger.set();

    tokio::time::timeout(Duration::from_secs(5), async {
        while fitter.call_count() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    stop.cancel();
    handle.await.unwrap().unwrap();
    assert!(!trigger.is_set());
    assert!(!models.is_full());
}
