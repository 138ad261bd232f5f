
use assert_matches::assert_matches;
use kafka_lag::client::error::{Error, ProtocolError};
use kafka_lag::client::ClientBuilder;
use kafka_lag::lag;

use crate::test_helpers::{
    commit, create_topic, join_group, maybe_start_logging, produce, random_name,
};

#[ignore]
#[tokio::test]
async fn connect_and_list_brokers() {
    maybe_start_logging();

    let test_cfg = maybe_skip_kafka_integration!();
    let client = lag::connect(ClientBuilder::new(test_cfg.bootstrap_brokers))
        .await
        .unwrap();

    assert!(!client.brokers().is_empty());
    client.close().await;
}

#[ignore]
#[tokio::test]
async fn unknown_topic_is_not_created() {
    maybe_start_logging();

    let test_cfg = maybe_skip_kafka_integration!();
    let client = ClientBuilder::new(test_cfg.bootstrap_brokers)
        .build()
        .await
        .unwrap();

    let topic = random_name("topic");
    for _ in 0..2 {
        let err = client.fetch_metadata(&topic).await.unwrap_err();
        assert_matches!(
            err,
            Error::ServerError {
                protocol_error: ProtocolError::UnknownTopicOrPartition,
                ..
            }
        );
    }

    client.close().await;
}

#[ignore]
#[tokio::test]
async fn report_for_unknown_group_is_empty() {
    maybe_start_logging();

    let test_cfg = maybe_skip_kafka_integration!();
    let client = lag::connect(ClientBuilder::new(test_cfg.bootstrap_brokers))
        .await
        .unwrap();
    let group = client.group_client(random_name("group"));

    // brokers describe groups they never saw as "Dead" rather than failing
    let report = lag::generate(&client, &group).await.unwrap();
    assert_eq!(report.state, "Dead");
    assert!(report.records.is_empty());

    client.close().await;
}

#[ignore]
#[tokio::test]
async fn report_lag_of_empty_group() {
    maybe_start_logging();

    let test_cfg = maybe_skip_kafka_integration!();
    let brokers = test_cfg.bootstrap_brokers;
    let topic = random_name("topic");
    let group = random_name("group");

    create_topic(&brokers, &topic, 1).await;
    produce(&brokers, &topic, 10).await;
    commit(&brokers, &group, &topic, 4);

    let client = lag::connect(ClientBuilder::new(brokers)).await.unwrap();
    let report = lag::generate(&client, &client.group_client(&group))
        .await
        .unwrap();

    assert_eq!(report.state, "Empty");
    assert!(report.warnings.is_empty(), "{:?}", report.warnings);
    let lines: Vec<_> = report.records.iter().map(ToString::to_string).collect();
    assert_eq!(lines, vec![format!("{group} {topic} 0 4 10 6 - -")]);

    client.close().await;
}

#[ignore]
#[tokio::test]
async fn report_lag_and_owner_of_active_group() {
    maybe_start_logging();

    let test_cfg = maybe_skip_kafka_integration!();
    let brokers = test_cfg.bootstrap_brokers;
    let topic = random_name("topic");
    let group = random_name("group");

    create_topic(&brokers, &topic, 2).await;
    produce(&brokers, &topic, 10).await;
    commit(&brokers, &group, &topic, 7);
    let member = join_group(&brokers, &group, "lag-test-member", &topic);

    let client = lag::connect(ClientBuilder::new(brokers)).await.unwrap();
    let report = lag::generate(&client, &client.group_client(&group))
        .await
        .unwrap();

    assert_eq!(report.state, "Stable");
    assert!(report.warnings.is_empty(), "{:?}", report.warnings);
    assert_eq!(report.records.len(), 2);

    let first = &report.records[0];
    assert_eq!(
        (first.partition, first.committed, first.produced, first.lag),
        (0, 7, 10, 3)
    );
    let second = &report.records[1];
    assert_eq!(
        (second.partition, second.committed, second.produced, second.lag),
        (1, -1, 0, 1)
    );

    // a single member owns every partition
    for record in &report.records {
        let owner = record.owner.as_ref().unwrap();
        assert_eq!(owner.id, "lag-test-member");
        assert!(!owner.host.is_empty());
    }

    drop(member);
    client.close().await;
}

#[tokio::test]
async fn unreachable_bootstrap_broker() {
    maybe_start_logging();

    // nothing listens on the discard port of localhost in CI
    let err = lag::connect(ClientBuilder::new(vec!["127.0.0.1:9".to_owned()]))
        .await
        .unwrap_err();
    assert_matches!(err, lag::Error::Connection(_));
}

#[tokio::test]
async fn no_bootstrap_brokers() {
    let err = lag::connect(ClientBuilder::new(vec![]))
        .await
        .unwrap_err();
    assert_matches!(
        err,
        lag::Error::Connection(Error::Connection(_))
    );
}
