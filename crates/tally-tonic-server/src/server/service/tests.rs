use super::handler::StoreService;
use crate::server::config::ServerConfig;
use tally_tonic_core::{
    ERROR_KIND_KEY,
    proto::{
        self, CheckAndPutRequest, CreateTableRequest, GetRequest, IncrementRequest,
        RowExistsRequest, TableExistsRequest, counter_store_server::CounterStore,
    },
    tally::{COUNTER_COLUMN, COUNTER_TABLE, TableDescriptor, encode_counter},
};
use tonic::{Code, Request};

const ROW: &[u8] = b"orders";

fn service(sync_writes: bool) -> StoreService {
    StoreService::new(&ServerConfig {
        sync_writes,
        ..ServerConfig::temporary()
    })
    .unwrap()
}

async fn with_counter_table(sync_writes: bool) -> StoreService {
    let service = service(sync_writes);
    service
        .create_table(Request::new(CreateTableRequest {
            descriptor: Some((&TableDescriptor::counter_table()).into()),
        }))
        .await
        .unwrap();
    service
}

fn increment_request(row: &[u8], amount: i64) -> Request<IncrementRequest> {
    Request::new(IncrementRequest {
        table: COUNTER_TABLE.to_string(),
        row: row.to_vec(),
        family: COUNTER_COLUMN.family.to_string(),
        qualifier: COUNTER_COLUMN.qualifier.to_string(),
        amount,
    })
}

fn seed_request(row: &[u8], expected: Option<i64>, value: i64) -> Request<CheckAndPutRequest> {
    Request::new(CheckAndPutRequest {
        table: COUNTER_TABLE.to_string(),
        row: row.to_vec(),
        family: COUNTER_COLUMN.family.to_string(),
        qualifier: COUNTER_COLUMN.qualifier.to_string(),
        expected: expected.map(|v| encode_counter(v).to_vec()),
        value: encode_counter(value).to_vec(),
    })
}

#[tokio::test]
async fn create_table_then_exists() {
    let service = service(false);
    let exists = |service: &StoreService| {
        let service = service.clone();
        async move {
            service
                .table_exists(Request::new(TableExistsRequest {
                    table: COUNTER_TABLE.to_string(),
                }))
                .await
                .unwrap()
                .into_inner()
                .exists
        }
    };

    assert!(!exists(&service).await);
    service
        .create_table(Request::new(CreateTableRequest {
            descriptor: Some((&TableDescriptor::counter_table()).into()),
        }))
        .await
        .unwrap();
    assert!(exists(&service).await);

    let status = service
        .create_table(Request::new(CreateTableRequest {
            descriptor: Some((&TableDescriptor::counter_table()).into()),
        }))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::AlreadyExists);
    assert!(status.metadata().get(ERROR_KIND_KEY).is_some());
}

#[tokio::test]
async fn create_table_validates_descriptor() {
    let service = service(false);

    let missing = service
        .create_table(Request::new(CreateTableRequest { descriptor: None }))
        .await
        .unwrap_err();
    assert_eq!(missing.code(), Code::InvalidArgument);

    let no_families = service
        .create_table(Request::new(CreateTableRequest {
            descriptor: Some(proto::TableDescriptor {
                name: "empty".to_string(),
                families: vec![],
            }),
        }))
        .await
        .unwrap_err();
    assert_eq!(no_families.code(), Code::InvalidArgument);
}

#[tokio::test]
async fn seeded_counter_increments_from_zero() {
    let service = with_counter_table(true).await;

    let row_exists = service
        .row_exists(Request::new(RowExistsRequest {
            table: COUNTER_TABLE.to_string(),
            row: ROW.to_vec(),
        }))
        .await
        .unwrap()
        .into_inner();
    assert!(!row_exists.exists);

    let seeded = service.check_and_put(seed_request(ROW, None, 0)).await.unwrap();
    assert!(seeded.into_inner().applied);
    let reseeded = service.check_and_put(seed_request(ROW, None, 0)).await.unwrap();
    assert!(!reseeded.into_inner().applied);

    for expected in 1..=3 {
        let resp = service.increment(increment_request(ROW, 1)).await.unwrap();
        assert_eq!(resp.into_inner().value, expected);
    }

    let stored = service
        .get(Request::new(GetRequest {
            table: COUNTER_TABLE.to_string(),
            row: ROW.to_vec(),
            family: COUNTER_COLUMN.family.to_string(),
            qualifier: COUNTER_COLUMN.qualifier.to_string(),
        }))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(stored.value, Some(encode_counter(3).to_vec()));
}

#[tokio::test]
async fn store_errors_map_to_status_codes() {
    let service = with_counter_table(false).await;

    let missing_table = service
        .increment(Request::new(IncrementRequest {
            table: "missing".to_string(),
            ..increment_request(ROW, 1).into_inner()
        }))
        .await
        .unwrap_err();
    assert_eq!(missing_table.code(), Code::NotFound);

    let bad_family = service
        .increment(Request::new(IncrementRequest {
            family: "other".to_string(),
            ..increment_request(ROW, 1).into_inner()
        }))
        .await
        .unwrap_err();
    assert_eq!(bad_family.code(), Code::InvalidArgument);

    service
        .check_and_put(Request::new(CheckAndPutRequest {
            value: b"abc".to_vec(),
            ..seed_request(b"text", None, 0).into_inner()
        }))
        .await
        .unwrap();
    let not_counter = service
        .increment(increment_request(b"text", 1))
        .await
        .unwrap_err();
    assert_eq!(not_counter.code(), Code::FailedPrecondition);

    service
        .check_and_put(seed_request(b"full", None, i64::MAX))
        .await
        .unwrap();
    let overflow = service
        .increment(increment_request(b"full", 1))
        .await
        .unwrap_err();
    assert_eq!(overflow.code(), Code::OutOfRange);

    let empty_row = service
        .increment(increment_request(b"", 1))
        .await
        .unwrap_err();
    assert_eq!(empty_row.code(), Code::InvalidArgument);
}

#[tokio::test]
async fn shutdown_rejects_new_requests() {
    let service = with_counter_table(true).await;
    service.increment(increment_request(ROW, 1)).await.unwrap();

    service.shutdown().await.unwrap();

    let status = service
        .increment(increment_request(ROW, 1))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::Unavailable);
}
