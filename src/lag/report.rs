use std::borrow::Cow;
use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::{
    decode_members, fetch_offsets, ClusterMetadata, Error, GroupCoordinator, OffsetPair,
    OwnershipMap, PartitionOwner, Result, TopicPartitions, Warning,
};

/// Placeholder for owner fields of partitions nobody consumes.
pub const NO_OWNER: &str = "-";

/// Placeholder for a field the broker reported as empty, e.g. a member without client ID.
pub const EMPTY_FIELD: &str = "?";

/// Render a free-form value as exactly one whitespace separated field.
pub(crate) fn line_field(value: &str) -> Cow<'_, str> {
    if value.is_empty() {
        Cow::Borrowed(EMPTY_FIELD)
    } else if value.contains(char::is_whitespace) {
        Cow::Owned(value.replace(char::is_whitespace, "_"))
    } else {
        Cow::Borrowed(value)
    }
}

/// Lag of one partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LagRecord {
    pub group: String,
    pub topic: String,
    pub partition: i32,
    pub committed: i64,
    pub produced: i64,
    pub lag: i64,

    /// `None` if no member is assigned the partition right now.
    pub owner: Option<PartitionOwner>,
}

impl LagRecord {
    pub fn new(
        group: &str,
        topic: &str,
        partition: i32,
        offsets: OffsetPair,
        owner: Option<PartitionOwner>,
    ) -> Self {
        Self {
            group: group.to_string(),
            topic: topic.to_string(),
            partition,
            committed: offsets.committed,
            produced: offsets.produced,
            lag: offsets.lag(),
            owner,
        }
    }
}

/// `group topic partition committed produced lag ownerId ownerHost`
///
/// Always eight fields, empty or blank-containing values are replaced.
impl Display for LagRecord {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} {} {} {} {} ",
            line_field(&self.group),
            self.topic,
            self.partition,
            self.committed,
            self.produced,
            self.lag
        )?;
        match &self.owner {
            Some(owner) => write!(f, "{owner}"),
            None => write!(f, "{NO_OWNER} {NO_OWNER}"),
        }
    }
}

#[derive(Debug)]
pub struct LagReport {
    pub group: String,
    pub state: String,

    /// When the report was started. All figures are best-effort as of slightly later instants.
    pub generated_at: DateTime<Utc>,

    /// Ordered by topic, then partition.
    pub records: Vec<LagRecord>,

    /// Everything that was left out of `records`.
    pub warnings: Vec<Warning>,
}

/// Build the lag report of the coordinator's group.
///
/// Only coordinator and describe failures abort. Undecodable members, unlistable topics and unavailable offsets end
/// up in [`LagReport::warnings`].
pub async fn generate(
    cluster: &dyn ClusterMetadata,
    coordinator: &dyn GroupCoordinator,
) -> Result<LagReport> {
    let generated_at = Utc::now();
    let group_name = coordinator.group().to_string();

    coordinator
        .resolve()
        .await
        .map_err(|source| Error::Coordinator {
            group: group_name.clone(),
            source,
        })?;

    let group = coordinator
        .describe_group()
        .await
        .map_err(|source| Error::GroupDescribe {
            group: group_name.clone(),
            source,
        })?;
    info!(
        group = %group.name,
        state = %group.state,
        members = group.members.len(),
        "Described group",
    );

    let mut warnings = vec![];

    let (decoded, failures) = decode_members(&group);
    warnings.extend(failures.into_iter().map(Warning::from));
    let ownership = OwnershipMap::build(&decoded);
    debug!(owned_partitions = ownership.len(), "Built ownership map");

    let mut topics: BTreeSet<String> = ownership.topics().map(str::to_string).collect();
    match coordinator.committed_topics().await {
        Ok(committed) => topics.extend(committed),
        Err(e) => {
            warn!(group = %group_name, %e, "Cannot list topics with committed offsets");
            warnings.push(Warning::CommittedTopics(e));
        }
    }

    let mut topic_partitions = TopicPartitions::new();
    for topic in topics {
        match cluster.partitions(&topic).await {
            Ok(partitions) => {
                info!(%topic, ?partitions, "Found partitions");
                topic_partitions.insert(topic, partitions.into_iter().collect());
            }
            Err(source) => {
                warn!(%topic, %source, "Skipping topic, cannot list partitions");
                warnings.push(Warning::Partitions { topic, source });
            }
        }
    }

    let mut records = vec![];
    for (topic, partitions) in &topic_partitions {
        for partition in partitions {
            match fetch_offsets(cluster, coordinator, topic, *partition).await {
                Ok(offsets) => records.push(LagRecord::new(
                    &group_name,
                    topic,
                    *partition,
                    offsets,
                    ownership.owner(topic, *partition).cloned(),
                )),
                Err(e) => {
                    warn!(%e, "Skipping partition");
                    warnings.push(Warning::Offset(e));
                }
            }
        }
    }

    Ok(LagReport {
        group: group_name,
        state: group.state,
        generated_at,
        records,
        warnings,
    })
}
