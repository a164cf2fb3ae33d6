//! Engine tests for single execs against a scripted server.

mod common;

use common::{int4_cell, pg_type_lookup_response, text_cell, Kind, MockServer, Scripted};
use duplex_postgres::types::ToWireValue;
use duplex_postgres::{Connection, Error, OidMap, ResultStatus};

#[derive(Debug, PartialEq, Eq)]
struct Point {
    x: i32,
    y: i32,
}

duplex_postgres::composite_type!(Point, "point_xy", { x: i32, y: i32 });

async fn connected(server: &MockServer) -> Connection {
    let conn = Connection::new();
    conn.connect(&server.uri()).await.unwrap();
    conn
}

#[tokio::test]
async fn test_simple_exec() {
    let server = MockServer::spawn(vec![Scripted::rows(
        vec![("?column?", 23)],
        vec![vec![int4_cell(1)]],
        "SELECT 1",
    )])
    .await;
    let conn = connected(&server).await;

    let result = tokio::select! {
        _ = conn.run() => panic!("run terminated"),
        r = conn.exec("SELECT 1;", ()) => r.unwrap(),
    };

    assert_eq!(result.status(), ResultStatus::RowsReturned);
    assert_eq!(result.columns().len(), 1);
    assert_eq!(result.columns()[0].name, "?column?");
    assert_eq!(result.columns()[0].type_oid, 23);

    let row = result.row(0).unwrap();
    assert_eq!(row.get(0), Some(Some(&1_i32.to_be_bytes()[..])));
    let (value,): (i32,) = row.decode(&conn.oid_map()).unwrap();
    assert_eq!(value, 1);

    assert_eq!(server.queries(), ["SELECT 1;"]);
}

#[tokio::test]
async fn test_exec_with_params() {
    let server = MockServer::spawn(vec![Scripted::rows(
        vec![("greeting", 25)],
        vec![vec![text_cell("hello")]],
        "SELECT 1",
    )])
    .await;
    let conn = connected(&server).await;

    let result = tokio::select! {
        _ = conn.run() => panic!("run terminated"),
        r = conn.exec("SELECT $1::text", ("hello",)) => r.unwrap(),
    };

    let (greeting,): (String,) = result.row(0).unwrap().decode(&conn.oid_map()).unwrap();
    assert_eq!(greeting, "hello");

    // The parameter travelled as raw UTF-8 bytes.
    assert_eq!(server.binds()[0][0].as_deref(), Some(&b"hello"[..]));
}

#[tokio::test]
async fn test_concurrent_execs_complete_in_submission_order() {
    let server = MockServer::spawn(vec![
        Scripted::rows(vec![("n", 23)], vec![vec![int4_cell(1)]], "SELECT 1").after_ms(30),
        Scripted::rows(vec![("n", 23)], vec![vec![int4_cell(2)]], "SELECT 1"),
    ])
    .await;
    let conn = connected(&server).await;

    let (first, second) = tokio::select! {
        _ = conn.run() => panic!("run terminated"),
        pair = async {
            tokio::join!(conn.exec("SELECT 1", ()), conn.exec("SELECT 2", ()))
        } => pair,
    };

    let map = conn.oid_map();
    let (a,): (i32,) = first.unwrap().row(0).unwrap().decode(&map).unwrap();
    let (b,): (i32,) = second.unwrap().row(0).unwrap().decode(&map).unwrap();
    assert_eq!((a, b), (1, 2));
    assert_eq!(server.queries(), ["SELECT 1", "SELECT 2"]);
}

#[tokio::test]
async fn test_server_error_is_a_result_not_an_error() {
    let server = MockServer::spawn(vec![Scripted::sql_error("42P01", "relation does not exist")])
        .await;
    let conn = connected(&server).await;

    let result = tokio::select! {
        _ = conn.run() => panic!("run terminated"),
        r = conn.exec("SELECT * FROM missing", ()) => r.unwrap(),
    };

    assert_eq!(result.status(), ResultStatus::FatalError);
    let error = result.error().unwrap();
    assert_eq!(error.sqlstate(), Some("42P01"));
    assert_eq!(error.message(), Some("relation does not exist"));
}

#[tokio::test]
async fn test_empty_query() {
    let server = MockServer::spawn(vec![Scripted::empty_query()]).await;
    let conn = connected(&server).await;

    let result = tokio::select! {
        _ = conn.run() => panic!("run terminated"),
        r = conn.exec("", ()) => r.unwrap(),
    };
    assert_eq!(result.status(), ResultStatus::EmptyQuery);
}

#[tokio::test]
async fn test_composite_resolved_and_round_tripped() {
    // Pre-compute the record bytes the scripted server echoes back.
    let mut map = OidMap::new();
    map.register("point_xy", 600_001, 600_002);
    let mut cell = Vec::new();
    Point { x: 3, y: 4 }.serialize(&map, &mut cell).unwrap();

    let server = MockServer::spawn(vec![
        pg_type_lookup_response(&[("point_xy", 600_001, 600_002)]),
        Scripted::rows(vec![("p", 600_001)], vec![vec![Some(cell.clone())]], "SELECT 1"),
    ])
    .await;
    let conn = connected(&server).await;

    let result = tokio::select! {
        _ = conn.run() => panic!("run terminated"),
        r = conn.exec("SELECT $1::point_xy", (Point { x: 3, y: 4 },)) => r.unwrap(),
    };

    let (point,): (Point,) = result.row(0).unwrap().decode(&conn.oid_map()).unwrap();
    assert_eq!(point, Point { x: 3, y: 4 });

    // One lookup round-trip preceded the query, and the parameter went out
    // in the composite wire layout.
    let queries = server.queries();
    assert_eq!(queries.len(), 2);
    assert!(queries[0].contains("pg_type"));
    assert_eq!(server.binds()[1][0].as_deref(), Some(&cell[..]));
}

#[tokio::test]
async fn test_registered_type_skips_lookup() {
    let mut map = OidMap::new();
    map.register("point_xy", 600_001, 600_002);
    let mut cell = Vec::new();
    Point { x: 5, y: 6 }.serialize(&map, &mut cell).unwrap();

    let server = MockServer::spawn(vec![Scripted::rows(
        vec![("p", 600_001)],
        vec![vec![Some(cell)]],
        "SELECT 1",
    )])
    .await;
    let conn = connected(&server).await;
    conn.register_type("point_xy", 600_001, 600_002);

    let result = tokio::select! {
        _ = conn.run() => panic!("run terminated"),
        r = conn.exec("SELECT $1::point_xy", (Point { x: 5, y: 6 },)) => r.unwrap(),
    };

    let (point,): (Point,) = result.row(0).unwrap().decode(&conn.oid_map()).unwrap();
    assert_eq!(point, Point { x: 5, y: 6 });
    assert_eq!(server.queries().len(), 1);
}

#[tokio::test]
async fn test_unknown_type_fails_the_exec() {
    // The lookup comes back empty: the name does not exist server-side.
    let server = MockServer::spawn(vec![
        common::Scripted {
            delay_ms: 0,
            kind: Kind::Rows {
                columns: vec![("typname", 19), ("oid", 26), ("typarray", 26)],
                rows: vec![],
                tag: "SELECT 0",
            },
        },
        Scripted::rows(vec![("n", 23)], vec![vec![int4_cell(1)]], "SELECT 1"),
    ])
    .await;
    let conn = connected(&server).await;

    let (error, later) = tokio::select! {
        _ = conn.run() => panic!("run terminated"),
        out = async {
            let error = conn
                .exec("SELECT $1::point_xy", (Point { x: 1, y: 2 },))
                .await
                .unwrap_err();
            // The connection stays usable after a failed resolution.
            let later = conn.exec("SELECT 1", ()).await.unwrap();
            (error, later)
        } => out,
    };

    assert!(matches!(error, Error::UnknownOid(name) if name == "point_xy"));
    assert_eq!(later.status(), ResultStatus::RowsReturned);
}

#[tokio::test]
async fn test_int4_array_round_trip() {
    let map = OidMap::new();
    let values = vec![10_i32, 20, 30];
    let mut cell = Vec::new();
    values.serialize(&map, &mut cell).unwrap();

    let server = MockServer::spawn(vec![Scripted::rows(
        vec![("a", 1007)],
        vec![vec![Some(cell.clone())]],
        "SELECT 1",
    )])
    .await;
    let conn = connected(&server).await;

    let result = tokio::select! {
        _ = conn.run() => panic!("run terminated"),
        r = conn.exec("SELECT $1", (values.clone(),)) => r.unwrap(),
    };

    let (back,): (Vec<i32>,) = result.row(0).unwrap().decode(&conn.oid_map()).unwrap();
    assert_eq!(back, values);
    assert_eq!(server.binds()[0][0].as_deref(), Some(&cell[..]));
}

#[tokio::test]
async fn test_null_param_and_null_cell() {
    let server = MockServer::spawn(vec![Scripted::rows(
        vec![("v", 23)],
        vec![vec![None]],
        "SELECT 1",
    )])
    .await;
    let conn = connected(&server).await;

    let result = tokio::select! {
        _ = conn.run() => panic!("run terminated"),
        r = conn.exec("SELECT $1::int", (Option::<i32>::None,)) => r.unwrap(),
    };

    assert_eq!(server.binds()[0][0], None);
    let (value,): (Option<i32>,) = result.row(0).unwrap().decode(&conn.oid_map()).unwrap();
    assert_eq!(value, None);
}

#[tokio::test]
async fn test_exec_before_connect_is_rejected() {
    let conn = Connection::new();
    assert!(matches!(
        conn.exec("SELECT 1", ()).await,
        Err(Error::InvalidUsage(_))
    ));
}

#[tokio::test]
async fn test_connect_twice_is_rejected() {
    let server = MockServer::spawn(vec![]).await;
    let conn = connected(&server).await;
    assert!(matches!(
        conn.connect(&server.uri()).await,
        Err(Error::InvalidUsage(_))
    ));
}
