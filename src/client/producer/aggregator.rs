//! Batching strategy used by [`super::BatchProducer`].
//!
//! Splitting this out as a trait lets a caller batch by record count, byte
//! size, or some application-specific grouping (e.g. one batch per user)
//! without [`super::BatchProducer`] knowing anything about the policy.

use std::error::Error as StdError;

use crate::record::Record;

/// Outcome of offering a single input to an [`Aggregator`].
#[derive(Debug)]
pub enum TryPush<T, Tag> {
    /// The input was absorbed into the pending batch. The tag is handed back
    /// to the caller once the batch this input ends up in is flushed.
    Aggregated(Tag),

    /// The pending batch has no room left for this input; the input is
    /// handed back so the caller can flush first and retry.
    NoCapacity(T),
}

/// Decides how individual inputs are grouped into [`Record`] batches before
/// [`super::BatchProducer`] hands them to a
/// [`crate::client::partition::PartitionClient`].
pub trait Aggregator: std::fmt::Debug + Send + Sync + 'static {
    /// What callers pass to [`super::BatchProducer::produce`].
    type Input: Send;

    /// Per-input data threaded back through [`Self::flush`], used to
    /// correlate a flushed record with whoever pushed it.
    type Tag: Send;

    /// Offers `input` to the current batch.
    fn try_push(
        &mut self,
        input: Self::Input,
    ) -> Result<TryPush<Self::Input, Self::Tag>, Box<dyn StdError + Send + Sync>>;

    /// Drains the current batch, in the order inputs were pushed.
    fn flush(&mut self) -> (Vec<Record>, Vec<Self::Tag>);
}

/// The default aggregator: buffers [`Record`]s, in arrival order, up to an
/// approximate byte budget (see [`Record::approximate_size`]).
#[derive(Debug)]
pub struct RecordAggregator {
    max_batch_size: usize,
    batch: Vec<Record>,
    batch_size: usize,
}

impl RecordAggregator {
    /// `max_batch_size` bounds the sum of [`Record::approximate_size`] across
    /// one batch.
    pub fn new(max_batch_size: usize) -> Self {
        Self {
            max_batch_size,
            batch: Vec::new(),
            batch_size: 0,
        }
    }
}

impl Aggregator for RecordAggregator {
    type Input = Record;
    type Tag = ();

    fn try_push(
        &mut self,
        record: Record,
    ) -> Result<TryPush<Record, ()>, Box<dyn StdError + Send + Sync>> {
        let record_size = record.approximate_size();

        if !self.batch.is_empty() && self.batch_size + record_size > self.max_batch_size {
            return Ok(TryPush::NoCapacity(record));
        }

        self.batch.push(record);
        self.batch_size += record_size;
        Ok(TryPush::Aggregated(()))
    }

    fn flush(&mut self) -> (Vec<Record>, Vec<()>) {
        let records = std::mem::take(&mut self.batch);
        self.batch_size = 0;
        let tags = vec![(); records.len()];
        (records, tags)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::Utc;

    use super::*;

    fn record(value: &str) -> Record {
        Record {
            key: None,
            value: Some(value.as_bytes().to_vec()),
            headers: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn accepts_records_until_budget_exhausted() {
        let mut agg = RecordAggregator::new(64);

        assert!(matches!(
            agg.try_push(record("a")).unwrap(),
            TryPush::Aggregated(())
        ));
        assert!(matches!(
            agg.try_push(record("b")).unwrap(),
            TryPush::Aggregated(())
        ));

        let big = record(&"x".repeat(128));
        match agg.try_push(big).unwrap() {
            TryPush::NoCapacity(returned) => assert_eq!(returned.value.unwrap().len(), 128),
            TryPush::Aggregated(_) => panic!("expected NoCapacity"),
        }
    }

    #[test]
    fn first_record_is_always_accepted_regardless_of_size() {
        let mut agg = RecordAggregator::new(1);
        let r = record("this alone already exceeds the budget");
        assert!(matches!(agg.try_push(r).unwrap(), TryPush::Aggregated(())));
    }

    #[test]
    fn flush_drains_in_order_and_resets() {
        let mut agg = RecordAggregator::new(1024);
        agg.try_push(record("1")).unwrap();
        agg.try_push(record("2")).unwrap();

        let (records, tags) = agg.flush();
        assert_eq!(records.len(), 2);
        assert_eq!(tags.len(), 2);
        assert_eq!(records[0].value, Some(b"1".to_vec()));
        assert_eq!(records[1].value, Some(b"2".to_vec()));

        let (records, _) = agg.flush();
        assert!(records.is_empty());
    }
}
