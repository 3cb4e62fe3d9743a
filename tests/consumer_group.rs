
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use rskafka_core::client::consumer::{Autocommit, ConsumerBuilder, StartOffset};
use rskafka_core::client::partition::UnknownTopicHandling;
use rskafka_core::client::producer::aggregator::RecordAggregator;
use rskafka_core::client::producer::BatchProducerBuilder;
use rskafka_core::client::ClientBuilder;
use rskafka_core::record::Record;
use tracing::info;

use crate::test_helpers::maybe_start_logging;

const TOPIC: &str = "test_consumer_group";
const GROUP: &str = "rskafka-integration-tests";

#[ignore]
#[tokio::test]
async fn produce() {
    maybe_start_logging();

    let test_cfg = crate::test_helpers::maybe_skip_kafka_integration!();
    let client = ClientBuilder::new(test_cfg.bootstrap_brokers)
        .build()
        .await
        .unwrap();

    let controller = client.controller_client().unwrap();
    let _ = controller.create_topic(TOPIC, 2, 1, 5_000).await;

    let pc = Arc::new(
        client
            .partition_client(TOPIC, 0, UnknownTopicHandling::Retry)
            .await
            .unwrap(),
    );
    let producer = BatchProducerBuilder::new(pc)
        .with_linger(Duration::from_millis(100))
        .build(RecordAggregator::new(1024))
        .unwrap();

    for i in 0..100 {
        let record = Record {
            key: None,
            value: Some(format!("message {i}").into_bytes()),
            headers: BTreeMap::new(),
            timestamp: Utc::now(),
        };
        producer.produce(record).await.unwrap();
    }
}

#[ignore]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn consumer_group() {
    maybe_start_logging();

    let test_cfg = crate::test_helpers::maybe_skip_kafka_integration!();
    let client = ClientBuilder::new(test_cfg.bootstrap_brokers)
        .build()
        .await
        .unwrap();

    let controller = client.controller_client().unwrap();
    let _ = controller.create_topic(TOPIC, 2, 1, 5_000).await;

    let client = Arc::new(client);
    let topics = client
        .list_topics()
        .await
        .unwrap()
        .into_iter()
        .filter(|t| t.name == TOPIC)
        .collect();

    let (consumer, mut messages) = ConsumerBuilder::new(client, GROUP.to_string(), topics)
        .with_start_offset(StartOffset::Earliest)
        .with_autocommit(Autocommit::Interval(Duration::from_secs(1)))
        .build()
        .await
        .unwrap();

    let mut seen = 0;
    while let Some(message) = messages.next().await {
        let message = message.unwrap();
        info!(
            "consumed {}/{}/{}",
            message.topic, message.partition, message.offset
        );
        seen += 1;
        if seen >= 100 {
            break;
        }
    }

    consumer.close(true).await.unwrap();
}
