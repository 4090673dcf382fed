//! Fan-out of samples to every registered sink
//!
//! Sinks are called in registration order. A failing sink is logged and
//! skipped; it never stops other sinks from receiving the sample or the
//! flush.

use super::types::Sample;
use crate::exporter::MetricSink;
use std::sync::Arc;

pub struct SinkDispatch {
    sinks: Vec<Arc<dyn MetricSink>>,
}

impl SinkDispatch {
    pub fn new(sinks: Vec<Arc<dyn MetricSink>>) -> Self {
        Self { sinks }
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Sink types in registration order
    pub fn sink_types(&self) -> Vec<&'static str> {
        self.sinks.iter().map(|s| s.sink_type()).collect()
    }

    /// Add a sample to every sink's batch. Returns the number of sinks that failed.
    pub fn add(&self, sample: &Sample) -> usize {
        let mut failures = 0;
        for sink in &self.sinks {
            if let Err(e) =
                sink.add_to_batch(&sample.device, &sample.field, sample.value, sample.timestamp)
            {
                failures += 1;
                log::warn!(
                    "⚠️  {} sink rejected sample ({} / {}): {}",
                    sink.sink_type(),
                    sample.device,
                    sample.field,
                    e
                );
            }
        }
        failures
    }

    /// Flush every sink. Returns the number of sinks that failed.
    pub async fn flush(&self) -> usize {
        let mut failures = 0;
        for sink in &self.sinks {
            if let Err(e) = sink.flush().await {
                failures += 1;
                log::error!("❌ Failed to flush {} batch: {}", sink.sink_type(), e);
            }
        }
        failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exporter::SinkError;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::sync::Mutex;

    /// Sink that records calls into a shared journal
    struct JournalSink {
        name: &'static str,
        fail_add: bool,
        fail_flush: bool,
        journal: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl MetricSink for JournalSink {
        fn add_to_batch(
            &self,
            _device: &str,
            field: &str,
            _value: f64,
            _timestamp: DateTime<Utc>,
        ) -> Result<(), SinkError> {
            self.journal
                .lock()
                .unwrap()
                .push(format!("{}:add:{}", self.name, field));
            if self.fail_add {
                return Err(SinkError::Rejected("add".to_string()));
            }
            Ok(())
        }

        async fn flush(&self) -> Result<(), SinkError> {
            self.journal.lock().unwrap().push(format!("{}:flush", self.name));
            if self.fail_flush {
                return Err(SinkError::Rejected("flush".to_string()));
            }
            Ok(())
        }

        fn sink_type(&self) -> &'static str {
            self.name
        }
    }

    fn sample(field: &str) -> Sample {
        Sample {
            device: "GPU1".to_string(),
            field: field.to_string(),
            value: 1.0,
            timestamp: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    fn dispatch_with(
        behaviours: &[(&'static str, bool, bool)],
    ) -> (SinkDispatch, Arc<Mutex<Vec<String>>>) {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let sinks = behaviours
            .iter()
            .map(|(name, fail_add, fail_flush)| {
                Arc::new(JournalSink {
                    name: *name,
                    fail_add: *fail_add,
                    fail_flush: *fail_flush,
                    journal: journal.clone(),
                }) as Arc<dyn MetricSink>
            })
            .collect();
        (SinkDispatch::new(sinks), journal)
    }

    #[tokio::test]
    async fn test_calls_sinks_in_registration_order() {
        let (dispatch, journal) = dispatch_with(&[("a", false, false), ("b", false, false)]);

        assert_eq!(dispatch.add(&sample("temp")), 0);
        assert_eq!(dispatch.add(&sample("load")), 0);
        assert_eq!(dispatch.flush().await, 0);

        assert_eq!(
            *journal.lock().unwrap(),
            vec!["a:add:temp", "b:add:temp", "a:add:load", "b:add:load", "a:flush", "b:flush"]
        );
    }

    #[tokio::test]
    async fn test_failing_add_does_not_affect_other_sinks() {
        let (dispatch, journal) = dispatch_with(&[("a", true, false), ("b", false, false)]);

        assert_eq!(dispatch.add(&sample("temp")), 1);
        assert_eq!(dispatch.flush().await, 0);

        assert_eq!(
            *journal.lock().unwrap(),
            vec!["a:add:temp", "b:add:temp", "a:flush", "b:flush"]
        );
    }

    #[tokio::test]
    async fn test_failing_flush_does_not_skip_later_sinks() {
        let (dispatch, journal) =
            dispatch_with(&[("a", false, true), ("b", false, true), ("c", false, false)]);

        assert_eq!(dispatch.flush().await, 2);
        assert_eq!(*journal.lock().unwrap(), vec!["a:flush", "b:flush", "c:flush"]);
        assert_eq!(dispatch.sink_types(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_empty_dispatch() {
        let dispatch = SinkDispatch::new(Vec::new());
        assert!(dispatch.is_empty());
        assert_eq!(dispatch.add(&sample("temp")), 0);
        assert_eq!(dispatch.flush().await, 0);
    }
}
