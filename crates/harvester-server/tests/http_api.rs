mod common;

use common::{build_test_context, build_with, get, post, post_json, Options};
use harvester_common::codec::{gunzip, gzip, Codec, SigningKey, SymmetricKey, SIGNATURE_HEADER};
use harvester_common::handshake::{
    generate_key_pair, private_key_from_pem, public_key_from_pem, seal_symmetric_key,
};
use harvester_common::Metric;
use harvester_server::persistence;
use harvester_storage::{MemStorage, SnapshotFile, StorageEngine};
use serde_json::json;

fn batch() -> Vec<Metric> {
    vec![
        Metric::gauge("Alloc", 2048.0),
        Metric::counter("PollCount", 3),
        Metric::gauge("RandomValue", 0.5),
        Metric::counter("PollCount", 2),
    ]
}

#[tokio::test]
async fn counter_updates_are_summed() {
    let ctx = build_test_context().await;
    assert_eq!(post(&ctx.app, "/update/counter/hits/5", &[], "").await.status, 200);
    assert_eq!(post(&ctx.app, "/update/counter/hits/7", &[], "").await.status, 200);

    let resp = get(&ctx.app, "/value/counter/hits").await;
    assert_eq!(resp.status, 200);
    assert_eq!(resp.text(), "12");
}

#[tokio::test]
async fn gauge_keeps_last_value() {
    let ctx = build_test_context().await;
    post(&ctx.app, "/update/gauge/temp/1.5", &[], "").await;
    post(&ctx.app, "/update/gauge/temp/2.75", &[], "").await;

    let resp = get(&ctx.app, "/value/gauge/temp").await;
    assert_eq!(resp.status, 200);
    assert_eq!(resp.text(), "2.75");
}

#[tokio::test]
async fn batch_deltas_are_summed_in_one_request() {
    for sql in [false, true] {
        let ctx = build_with(Options {
            sql,
            ..Options::default()
        })
        .await;
        let resp = post_json(
            &ctx.app,
            "/updates/",
            json!([
                {"id": "a", "type": "counter", "delta": 1},
                {"id": "a", "type": "counter", "delta": 2}
            ]),
        )
        .await;
        assert_eq!(resp.status, 200, "sql={sql}");

        let resp = post_json(&ctx.app, "/value/", json!({"id": "a", "type": "counter"})).await;
        assert_eq!(resp.status, 200, "sql={sql}");
        let metric: Metric = serde_json::from_slice(&resp.body).unwrap();
        assert_eq!(metric, Metric::counter("a", 3));
    }
}

#[tokio::test]
async fn plain_and_encrypted_batches_store_the_same_values() {
    let plain = build_test_context().await;
    let body = Codec::default().encode(&batch()).unwrap();
    let resp = post(
        &plain.app,
        "/updates/",
        &[("Content-Type", "application/json"), ("Content-Encoding", "gzip")],
        body.body,
    )
    .await;
    assert_eq!(resp.status, 200);

    let pair = generate_key_pair(1024).unwrap();
    let encrypted = build_with(Options {
        private_key: Some(private_key_from_pem(&pair.private_pem).unwrap()),
        ..Options::default()
    })
    .await;
    let key = SymmetricKey::generate().unwrap();
    let public_key = public_key_from_pem(&pair.public_pem).unwrap();
    let sealed = seal_symmetric_key(&public_key, &key).unwrap();
    assert_eq!(post(&encrypted.app, "/key/", &[], sealed).await.status, 200);

    let body = Codec::new(Some(key), None).encode(&batch()).unwrap();
    let resp = post(
        &encrypted.app,
        "/updates/",
        &[("Content-Type", "application/json"), ("Content-Encoding", "gzip")],
        body.body,
    )
    .await;
    assert_eq!(resp.status, 200);

    let expected = vec![
        Metric::gauge("Alloc", 2048.0),
        Metric::counter("PollCount", 5),
        Metric::gauge("RandomValue", 0.5),
    ];
    assert_eq!(plain.state.storage.get_all_metrics().await.unwrap(), expected);
    assert_eq!(encrypted.state.storage.get_all_metrics().await.unwrap(), expected);
}

#[tokio::test]
async fn second_key_exchange_conflicts() {
    let pair = generate_key_pair(1024).unwrap();
    let ctx = build_with(Options {
        private_key: Some(private_key_from_pem(&pair.private_pem).unwrap()),
        ..Options::default()
    })
    .await;
    let public_key = public_key_from_pem(&pair.public_pem).unwrap();

    let first = seal_symmetric_key(&public_key, &SymmetricKey::generate().unwrap()).unwrap();
    assert_eq!(post(&ctx.app, "/key/", &[], first).await.status, 200);
    let second = seal_symmetric_key(&public_key, &SymmetricKey::generate().unwrap()).unwrap();
    assert_eq!(post(&ctx.app, "/key/", &[], second).await.status, 409);
}

#[tokio::test]
async fn key_exchange_without_private_key_is_rejected() {
    let ctx = build_test_context().await;
    let resp = post(&ctx.app, "/key/", &[], vec![1u8, 2, 3]).await;
    assert_eq!(resp.status, 400);
    assert!(ctx.state.symmetric_key.get().is_none());
}

#[tokio::test]
async fn malformed_input_is_a_client_error() {
    let ctx = build_test_context().await;
    assert_eq!(post(&ctx.app, "/update/histogram/x/1", &[], "").await.status, 400);
    assert_eq!(post(&ctx.app, "/update/counter/x/1.5", &[], "").await.status, 400);
    assert_eq!(post(&ctx.app, "/update/gauge/x/abc", &[], "").await.status, 400);
    assert_eq!(get(&ctx.app, "/value/histogram/x").await.status, 400);

    let resp = post(
        &ctx.app,
        "/updates/",
        &[("Content-Type", "application/json")],
        "[{\"id\":",
    )
    .await;
    assert_eq!(resp.status, 400);

    let resp = post_json(&ctx.app, "/update/", json!({"id": "x", "type": "counter", "value": 1.0})).await;
    assert_eq!(resp.status, 400);

    let resp = post(
        &ctx.app,
        "/updates/",
        &[("Content-Encoding", "gzip")],
        "not gzip at all",
    )
    .await;
    assert_eq!(resp.status, 400);

    assert!(ctx.state.storage.get_all_metrics().await.unwrap().is_empty());
}

#[tokio::test]
async fn unknown_metric_is_not_found() {
    let ctx = build_test_context().await;
    assert_eq!(get(&ctx.app, "/value/gauge/missing").await.status, 404);
    let resp = post_json(&ctx.app, "/value/", json!({"id": "missing", "type": "counter"})).await;
    assert_eq!(resp.status, 404);

    post(&ctx.app, "/update/counter/hits/1", &[], "").await;
    assert_eq!(get(&ctx.app, "/value/gauge/hits").await.status, 404);
}

#[tokio::test]
async fn json_update_echoes_stored_value() {
    let ctx = build_test_context().await;
    post_json(&ctx.app, "/update/", json!({"id": "c", "type": "counter", "delta": 4})).await;
    let resp = post_json(&ctx.app, "/update/", json!({"id": "c", "type": "counter", "delta": 6})).await;
    assert_eq!(resp.status, 200);
    let metric: Metric = serde_json::from_slice(&resp.body).unwrap();
    assert_eq!(metric, Metric::counter("c", 10));
}

#[tokio::test]
async fn listing_is_sorted_html() {
    let ctx = build_test_context().await;
    post(&ctx.app, "/update/gauge/zeta/1", &[], "").await;
    post(&ctx.app, "/update/counter/alpha/2", &[], "").await;
    post(&ctx.app, "/update/gauge/mid/3.5", &[], "").await;

    let resp = get(&ctx.app, "/").await;
    assert_eq!(resp.status, 200);
    let content_type = resp.headers["content-type"].to_str().unwrap();
    assert!(content_type.starts_with("text/html"));
    let page = resp.text();
    let alpha = page.find("<li>alpha: 2</li>").unwrap();
    let mid = page.find("<li>mid: 3.5</li>").unwrap();
    let zeta = page.find("<li>zeta: 1</li>").unwrap();
    assert!(alpha < mid && mid < zeta);
}

#[tokio::test]
async fn ping_reports_database_availability() {
    let memory = build_test_context().await;
    assert_eq!(get(&memory.app, "/ping").await.status, 500);

    let sql = build_with(Options {
        sql: true,
        ..Options::default()
    })
    .await;
    let resp = get(&sql.app, "/ping").await;
    assert_eq!(resp.status, 200);
    assert_eq!(resp.text(), "OK");
}

#[tokio::test]
async fn tampered_body_is_rejected_without_mutation() {
    let ctx = build_with(Options {
        key: Some("shared-secret".to_string()),
        ..Options::default()
    })
    .await;
    let codec = Codec::new(None, Some(SigningKey::new("shared-secret")));
    let encoded = codec.encode(&batch()).unwrap();
    let signature = encoded.signature.clone().unwrap();

    let mut tampered = encoded.body.clone();
    let last = tampered.len() - 1;
    tampered[last] ^= 0x01;
    let resp = post(
        &ctx.app,
        "/updates/",
        &[("Content-Encoding", "gzip"), (SIGNATURE_HEADER, signature.as_str())],
        tampered,
    )
    .await;
    assert_eq!(resp.status, 400);
    assert!(ctx.state.storage.get_all_metrics().await.unwrap().is_empty());

    let resp = post(
        &ctx.app,
        "/updates/",
        &[("Content-Encoding", "gzip"), (SIGNATURE_HEADER, signature.as_str())],
        encoded.body,
    )
    .await;
    assert_eq!(resp.status, 200);
    assert_eq!(ctx.state.storage.get_all_metrics().await.unwrap().len(), 3);
}

#[tokio::test]
async fn responses_are_signed_over_compressed_body() {
    let ctx = build_with(Options {
        key: Some("shared-secret".to_string()),
        ..Options::default()
    })
    .await;
    for i in 0..20 {
        post(&ctx.app, &format!("/update/gauge/metric{i:02}/{i}.25"), &[], "").await;
    }

    let req = axum::http::Request::builder()
        .method("GET")
        .uri("/")
        .header("Accept-Encoding", "gzip")
        .body(axum::body::Body::empty())
        .unwrap();
    let resp = common::send(&ctx.app, req).await;
    assert_eq!(resp.status, 200);
    assert_eq!(resp.headers["content-encoding"], "gzip");

    let signature = resp.headers[SIGNATURE_HEADER].to_str().unwrap();
    SigningKey::new("shared-secret")
        .verify(&resp.body, signature)
        .unwrap();

    let page = String::from_utf8(gunzip(&resp.body).unwrap()).unwrap();
    assert!(page.contains("<li>metric00: 0.25</li>"));
    assert!(page.contains("<li>metric19: 19.25</li>"));

    let resp = get(&ctx.app, "/value/gauge/absent").await;
    assert_eq!(resp.status, 404);
    assert!(resp.headers.contains_key(SIGNATURE_HEADER));
}

#[tokio::test]
async fn gzipped_json_update_is_accepted() {
    let ctx = build_test_context().await;
    let body = gzip(br#"{"id":"g","type":"gauge","value":9.5}"#).unwrap();
    let resp = post(
        &ctx.app,
        "/update/",
        &[("Content-Type", "application/json"), ("Content-Encoding", "gzip")],
        body,
    )
    .await;
    assert_eq!(resp.status, 200);
    assert_eq!(get(&ctx.app, "/value/gauge/g").await.text(), "9.5");
}

#[tokio::test]
async fn snapshot_carries_metrics_across_restart() {
    let ctx = build_test_context().await;
    post(&ctx.app, "/update/counter/hits/5", &[], "").await;
    post(&ctx.app, "/update/gauge/temp/36.6", &[], "").await;

    let snapshot = SnapshotFile::new(ctx.temp_dir.path().join("metrics.json"));
    persistence::final_flush(ctx.state.storage.as_ref(), &snapshot).await;

    let restarted = MemStorage::new();
    persistence::bootstrap(&restarted, &snapshot, true)
        .await
        .unwrap();
    assert_eq!(
        restarted.get_all_metrics().await.unwrap(),
        ctx.state.storage.get_all_metrics().await.unwrap()
    );
}

async fn both_backends() -> [common::TestContext; 2] {
    [
        build_test_context().await,
        build_with(Options {
            sql: true,
            ..Options::default()
        })
        .await,
    ]
}

#[tokio::test]
async fn non_finite_gauges_are_rejected_and_restart_still_works() {
    for ctx in both_backends().await {
        assert_eq!(post(&ctx.app, "/update/gauge/temp/1.5", &[], "").await.status, 200);
        for raw in ["NaN", "inf", "-inf", "+Infinity"] {
            let resp = post(&ctx.app, &format!("/update/gauge/temp/{raw}"), &[], "").await;
            assert_eq!(resp.status, 400, "{raw}");
        }
        let resp = post(
            &ctx.app,
            "/updates/",
            &[("Content-Type", "application/json")],
            r#"[{"id":"temp","type":"gauge","value":1e999}]"#,
        )
        .await;
        assert_eq!(resp.status, 400);

        let resp = post_json(&ctx.app, "/value/", json!({"id": "temp", "type": "gauge"})).await;
        assert_eq!(resp.status, 200);
        assert_eq!(
            serde_json::from_slice::<serde_json::Value>(&resp.body).unwrap(),
            json!({"id": "temp", "type": "gauge", "value": 1.5})
        );
        assert_eq!(get(&ctx.app, "/").await.status, 200);

        let snapshot = SnapshotFile::new(ctx.temp_dir.path().join("metrics.json"));
        persistence::final_flush(ctx.state.storage.as_ref(), &snapshot).await;
        let restarted = MemStorage::new();
        persistence::bootstrap(&restarted, &snapshot, true)
            .await
            .unwrap();
        assert_eq!(
            restarted.get_all_metrics().await.unwrap(),
            vec![Metric::gauge("temp", 1.5)]
        );
    }
}

#[tokio::test]
async fn counter_overflow_is_rejected_on_every_backend() {
    for ctx in both_backends().await {
        let max = i64::MAX.to_string();
        let resp = post(&ctx.app, &format!("/update/counter/c/{max}"), &[], "").await;
        assert_eq!(resp.status, 200);
        assert_eq!(post(&ctx.app, "/update/counter/c/1", &[], "").await.status, 400);

        let resp = post_json(
            &ctx.app,
            "/updates/",
            json!([
                {"id": "fresh", "type": "counter", "delta": 1},
                {"id": "c", "type": "counter", "delta": 1}
            ]),
        )
        .await;
        assert_eq!(resp.status, 400);

        let resp = get(&ctx.app, "/value/counter/c").await;
        assert_eq!(resp.status, 200);
        assert_eq!(resp.text(), max);
        assert_eq!(get(&ctx.app, "/value/counter/fresh").await.status, 404);
        assert_eq!(get(&ctx.app, "/").await.status, 200);
    }
}

#[tokio::test]
async fn oversized_gzip_body_is_rejected() {
    let ctx = build_test_context().await;
    let bomb = gzip(&vec![b' '; harvester_common::codec::MAX_DECODED_BYTES + 1]).unwrap();
    let resp = post(
        &ctx.app,
        "/updates/",
        &[("Content-Type", "application/json"), ("Content-Encoding", "gzip")],
        bomb,
    )
    .await;
    assert_eq!(resp.status, 400);
    assert!(ctx.state.storage.get_all_metrics().await.unwrap().is_empty());
}

#[tokio::test]
async fn every_response_carries_a_trace_id() {
    let ctx = build_test_context().await;
    let ok = get(&ctx.app, "/").await;
    let rejected = post(&ctx.app, "/update/histogram/x/1", &[], "").await;
    assert_eq!(rejected.status, 400);

    let ids: Vec<String> = [ok, rejected]
        .iter()
        .map(|resp| {
            resp.headers[harvester_server::logging::TRACE_ID_HEADER]
                .to_str()
                .unwrap()
                .to_string()
        })
        .collect();
    for id in &ids {
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }
    assert_ne!(ids[0], ids[1]);
}
