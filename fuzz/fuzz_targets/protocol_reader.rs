#![no_main]
use std::io::Cursor;

use libfuzzer_sys::fuzz_target;

use kafka_lag::protocol::{
    api_key::ApiKey,
    api_version::ApiVersion,
    messages::{
        ApiVersionsRequest, ApiVersionsResponse, DescribeGroupsRequest, DescribeGroupsResponse,
        FindCoordinatorRequest, FindCoordinatorResponse, ListOffsetsRequest, ListOffsetsResponse,
        MetadataRequest, MetadataResponse, OffsetFetchRequest, OffsetFetchResponse,
        ReadVersionedType, RequestBody, ResponseHeader,
    },
};

fuzz_target!(|data: &[u8]| {
    let Some((head, body)) = data.split_first_chunk::<4>() else {
        return;
    };
    let api_key = ApiKey::from(i16::from_be_bytes([head[0], head[1]]));
    let api_version = ApiVersion(i16::from_be_bytes([head[2], head[3]]));

    match api_key {
        ApiKey::ApiVersions => read::<ApiVersionsRequest, ApiVersionsResponse>(body, api_version),
        ApiKey::DescribeGroups => {
            read::<DescribeGroupsRequest, DescribeGroupsResponse>(body, api_version)
        }
        ApiKey::FindCoordinator => {
            read::<FindCoordinatorRequest, FindCoordinatorResponse>(body, api_version)
        }
        ApiKey::ListOffsets => read::<ListOffsetsRequest, ListOffsetsResponse>(body, api_version),
        ApiKey::Metadata => read::<MetadataRequest, MetadataResponse>(body, api_version),
        ApiKey::OffsetFetch => read::<OffsetFetchRequest, OffsetFetchResponse>(body, api_version),
        _ => {}
    }
});

/// Decode a response header and body the way the messenger would.
fn read<Req, Resp>(data: &[u8], api_version: ApiVersion)
where
    Req: RequestBody<ResponseBody = Resp>,
    Resp: ReadVersionedType<Cursor<Vec<u8>>>,
{
    // decoders assert on versions they do not know, stay inside the supported range
    let range = Req::API_VERSION_RANGE;
    if api_version < range.min() || api_version > range.max() {
        return;
    }

    let header_version = if api_version >= Req::FIRST_TAGGED_FIELD_IN_RESPONSE_VERSION {
        ApiVersion(1)
    } else {
        ApiVersion(0)
    };

    let mut cursor = Cursor::new(data.to_vec());
    if ResponseHeader::read_versioned(&mut cursor, header_version).is_err() {
        return;
    }
    let _ = Resp::read_versioned(&mut cursor, api_version);
}
