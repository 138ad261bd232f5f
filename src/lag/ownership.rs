use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use tracing::debug;

use super::report::line_field;
use super::DecodedAssignment;

/// The member consuming a partition, as shown in the report.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PartitionOwner {
    /// Client ID of the member.
    pub id: String,

    /// Host the member connected from, usually an IP address.
    pub host: String,
}

impl Display for PartitionOwner {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", line_field(&self.id), line_field(&self.host))
    }
}

/// At most one owner per partition.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OwnershipMap {
    owners: BTreeMap<String, BTreeMap<i32, PartitionOwner>>,
}

impl OwnershipMap {
    /// Fold the assignments in the given order.
    ///
    /// A partition claimed by several members belongs to the last one.
    pub fn build<'a, I>(decoded: I) -> Self
    where
        I: IntoIterator<Item = &'a DecodedAssignment>,
    {
        let mut map = Self::default();

        for member in decoded {
            for (topic, partitions) in &member.assignment {
                for partition in partitions {
                    if let Some(previous) = map.insert(topic, *partition, member.owner.clone()) {
                        debug!(
                            topic = %topic,
                            partition,
                            previous = %previous,
                            owner = %member.owner,
                            "Partition claimed by more than one member",
                        );
                    }
                }
            }
        }

        map
    }

    /// Set the owner of a partition, returning the one it replaced.
    pub fn insert(
        &mut self,
        topic: &str,
        partition: i32,
        owner: PartitionOwner,
    ) -> Option<PartitionOwner> {
        match self.owners.get_mut(topic) {
            Some(partitions) => partitions.insert(partition, owner),
            None => {
                self.owners
                    .insert(topic.to_string(), BTreeMap::from([(partition, owner)]));
                None
            }
        }
    }

    pub fn owner(&self, topic: &str, partition: i32) -> Option<&PartitionOwner> {
        self.owners.get(topic)?.get(&partition)
    }

    /// Topics with at least one owned partition, ascending.
    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.owners.keys().map(String::as_str)
    }

    /// Number of owned partitions.
    pub fn len(&self) -> usize {
        self.owners.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::lag::Assignment;

    fn decoded(id: &str, host: &str, topics: &[(&str, &[i32])]) -> DecodedAssignment {
        DecodedAssignment {
            member_id: format!("{id}-member"),
            owner: PartitionOwner {
                id: id.to_string(),
                host: host.to_string(),
            },
            assignment: topics
                .iter()
                .map(|(t, p)| (t.to_string(), p.to_vec()))
                .collect::<Assignment>(),
        }
    }

    #[test]
    fn single_owners() {
        let members = [
            decoded("m1", "10.0.0.1", &[("t", &[0])]),
            decoded("m2", "10.0.0.2", &[("t", &[1]), ("u", &[0])]),
        ];
        let map = OwnershipMap::build(&members);

        assert_eq!(map.owner("t", 0), Some(&members[0].owner));
        assert_eq!(map.owner("t", 1), Some(&members[1].owner));
        assert_eq!(map.owner("u", 0), Some(&members[1].owner));
        assert_eq!(map.owner("u", 1), None);
        assert_eq!(map.owner("v", 0), None);
        assert_eq!(map.topics().collect::<Vec<_>>(), vec!["t", "u"]);
        assert_eq!(map.len(), 3);
    }

    #[test]
    fn last_claim_wins() {
        let members = [
            decoded("m1", "10.0.0.1", &[("t", &[0, 1])]),
            decoded("m2", "10.0.0.2", &[("t", &[1])]),
        ];
        let map = OwnershipMap::build(&members);

        assert_eq!(map.owner("t", 0).map(|o| o.id.as_str()), Some("m1"));
        assert_eq!(map.owner("t", 1).map(|o| o.id.as_str()), Some("m2"));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn empty() {
        let map = OwnershipMap::build(&Vec::<DecodedAssignment>::new());
        assert!(map.is_empty());
        assert_eq!(map.len(), 0);
    }

    #[test]
    fn owner_display() {
        let owner = PartitionOwner {
            id: "m1".to_string(),
            host: "/10.0.0.1".to_string(),
        };
        assert_eq!(owner.to_string(), "m1 /10.0.0.1");

        let anonymous = PartitionOwner {
            id: String::new(),
            host: "/10.0.0.1".to_string(),
        };
        assert_eq!(anonymous.to_string(), "? /10.0.0.1");
    }

    proptest! {
        #[test]
        fn every_claim_has_exactly_the_last_owner(
            claims in prop::collection::vec(prop::collection::btree_set(0i32..8, 0..8), 0..6)
        ) {
            let members: Vec<_> = claims
                .iter()
                .enumerate()
                .map(|(i, partitions)| {
                    let partitions: Vec<i32> = partitions.iter().copied().collect();
                    decoded(&format!("m{i}"), "h", &[("t", partitions.as_slice())])
                })
                .collect();
            let map = OwnershipMap::build(&members);

            for partition in 0..8 {
                let last = claims.iter().rposition(|c| c.contains(&partition));
                let want = last.map(|i| format!("m{i}"));
                prop_assert_eq!(map.owner("t", partition).map(|o| o.id.clone()), want);
            }
        }
    }
}
