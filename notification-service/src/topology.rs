use anyhow::Result;
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication, TopicResult};
use rdkafka::client::DefaultClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::types::RDKafkaErrorCode;
use tracing::info;

pub type Admin = AdminClient<DefaultClientContext>;

pub fn admin_client(brokers: &str) -> Result<Admin> {
    let admin = ClientConfig::new()
        .set("bootstrap.servers", brokers)
        .create()?;
    Ok(admin)
}

/// Declares `topics` if they are missing. Safe to call from every worker on
/// every start.
pub async fn ensure_topics(
    admin: &Admin,
    topics: &[&str],
    partitions: i32,
    replication: i32,
) -> Result<()> {
    let new_topics: Vec<NewTopic<'_>> = topics
        .iter()
        .map(|name| NewTopic::new(name, partitions, TopicReplication::Fixed(replication)))
        .collect();

    let results = admin
        .create_topics(&new_topics, &AdminOptions::new())
        .await?;
    check_results(results)
}

fn check_results(results: Vec<TopicResult>) -> Result<()> {
    for result in results {
        match result {
            Ok(topic) => info!(topic = %topic, "Topic created"),
            Err((topic, RDKafkaErrorCode::TopicAlreadyExists)) => {
                info!(topic = %topic, "Topic already exists")
            }
            Err((topic, code)) => anyhow::bail!("Failed to create topic {}: {}", topic, code),
        }
    }
    Ok(())
}
