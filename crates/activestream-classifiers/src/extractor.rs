//! Feature extractor worker

use crate::config::ExtractorConfig;
use crate::text::TextProcessor;
use activestream_core::{
    retry_transient, Record, Result, SharedStore, SharedVocabulary, StopToken,
};
use activestream_telemetry::PipelineStats;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Vectorizes incoming records and hands them to the store
pub struct FeatureExtractor {
    processor: TextProcessor,
    vocabulary: SharedVocabulary,
    store: SharedStore,
    stats: PipelineStats,
}

impl FeatureExtractor {
    pub fn new(
        config: &ExtractorConfig,
        vocabulary: SharedVocabulary,
        store: SharedStore,
        stats: PipelineStats,
    ) -> Result<Self> {
        Ok(Self {
            processor: TextProcessor::new(&config.extra_stopwords, config.min_token_chars)?,
            vocabulary,
            store,
            stats,
        })
    }

    /// Attach the bag of terms and the vocabulary size after resolution
    pub fn extract(&self, record: &mut Record) {
        let terms = self.processor.terms(record);
        let (bag, vocab_size) = self.vocabulary.doc_to_bag(&terms);
        record.bag = bag;
        record.vocab_size_at_extraction = vocab_size;
    }

    pub async fn run(self, mut input: mpsc::Receiver<Record>, stop: StopToken) -> Result<()> {
        info!("Feature extractor ready");
        loop {
            let mut record = tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                received = input.recv() => match received {
                    Some(record) => record,
                    None => {
                        debug!("Extractor input closed");
                        break;
                    }
                },
            };

            self.extract(&mut record);
            let vocab_size = record.vocab_size_at_extraction;
            let record_id = record.id.clone();
            let inserted =
                retry_transient(&stop, "insert", || self.store.insert(record.clone())).await?;
            match inserted {
                Some(true) => {
                    debug!(record_id = %record_id, vocab_size, "Record stored");
                    self.stats.record_extracted(vocab_size);
                }
                Some(false) => debug!(record_id = %record_id, "Duplicate record ignored"),
                None => break,
            }
        }
        info!("Feature extractor stopped");
        Ok(())
    }
}
