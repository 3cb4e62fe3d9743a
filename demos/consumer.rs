use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use rskafka::client::consumer::{Autocommit, ConsumerBuilder, StartOffset};
use rskafka::client::ClientBuilder;

const TOPIC: &str = "test";
const GROUP: &str = "demo-group";

#[tokio::main]
async fn main() {
    let brokers = vec!["localhost:9010".to_string(), "localhost:9011".to_string()];
    let client = ClientBuilder::new(brokers).build().await.unwrap();

    let cc = client.controller_client().unwrap();
    let _ = cc.create_topic(TOPIC, 3, 2, 1000).await;

    let client = Arc::new(client);
    let topics = client
        .list_topics()
        .await
        .unwrap()
        .into_iter()
        .filter(|t| t.name == TOPIC)
        .collect();

    let (consumer, mut messages) = ConsumerBuilder::new(client, GROUP.to_string(), topics)
        .with_start_offset(StartOffset::Committed)
        .with_autocommit(Autocommit::Interval(Duration::from_secs(5)))
        .build()
        .await
        .unwrap();

    while let Some(message) = messages.next().await {
        match message {
            Ok(message) => {
                let value = message
                    .record
                    .value
                    .as_deref()
                    .map(String::from_utf8_lossy)
                    .unwrap_or_default();

                println!(
                    "{}/{}/{} -- {value}",
                    message.topic, message.partition, message.offset
                );
            }
            Err(err) => {
                println!("consume failed: {err}");
            }
        }
    }

    consumer.close(true).await.unwrap();
}
