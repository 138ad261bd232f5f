#![no_main]
use libfuzzer_sys::fuzz_target;

use kafka_lag::lag::{decode_assignment, CONSUMER_PROTOCOL_TYPE};

fuzz_target!(|data: &[u8]| {
    if let Ok(assignment) = decode_assignment(CONSUMER_PROTOCOL_TYPE, data) {
        for partitions in assignment.values() {
            assert!(partitions.windows(2).all(|w| w[0] < w[1]));
        }
    }
});
