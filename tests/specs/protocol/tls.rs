// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! StartTLS against a daemon with and without credentials.

use tempfile::TempDir;

use crate::prelude::*;

struct Credentials {
    _dir: TempDir,
    tls: TlsConfig,
    client: TlsClientOptions,
}

fn credentials() -> Credentials {
    let dir = tempfile::tempdir().unwrap();
    let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    let cert = dir.path().join("cert.pem");
    let key = dir.path().join("key.pem");
    std::fs::write(&cert, certified.cert.pem()).unwrap();
    std::fs::write(&key, certified.key_pair.serialize_pem()).unwrap();
    let client = TlsClientOptions::trusting([certified.cert.der().clone()], "localhost").unwrap();
    Credentials { _dir: dir, tls: TlsConfig { cert, key }, client }
}

async fn tls_daemon(credentials: &Credentials) -> TestDaemon {
    TestDaemon::with_config(Config { tls: Some(credentials.tls.clone()), ..Config::default() })
        .await
}

#[tokio::test]
async fn calls_continue_over_tls() {
    let credentials = credentials();
    let daemon = tls_daemon(&credentials).await;
    let client = daemon.client().await;

    client.start_tls(credentials.client.clone()).await.unwrap();
    assert!(client.is_tls_active());
    assert!(client.peer_certificates().is_some_and(|certs| !certs.is_empty()));

    let result = client.call_remote(&responders::sum(), &sum_args(13, 81)).await.unwrap();
    assert_eq!(result.i64("total"), Some(94));

    daemon.stop().await;
}

#[tokio::test]
async fn tls_starts_at_most_once() {
    let credentials = credentials();
    let daemon = tls_daemon(&credentials).await;
    let client = daemon.client().await;

    client.start_tls(credentials.client.clone()).await.unwrap();
    let again = client.start_tls(credentials.client.clone()).await;
    assert!(matches!(again, Err(CallError::Send(SendError::OnlyOneTls))));

    daemon.stop().await;
}

#[tokio::test]
async fn calls_made_during_the_handshake_go_out_encrypted() {
    let credentials = credentials();
    let daemon = tls_daemon(&credentials).await;
    let client = daemon.client().await;

    let upgrade = client.start_tls(credentials.client.clone());
    let held = client.call_remote(&responders::echo(), &Values::new().with("text", "held"));
    upgrade.await.unwrap();
    assert_eq!(held.await.unwrap().text("text"), Some("held"));

    daemon.stop().await;
}

#[tokio::test]
async fn daemons_without_credentials_refuse_tls() {
    let credentials = credentials();
    let daemon = TestDaemon::start().await;
    let client = daemon.client().await;

    let err = client.start_tls(credentials.client.clone()).await.unwrap_err();
    assert_eq!(err.code(), Some(&b"TLS_ERROR"[..]));
    assert!(!client.is_tls_active());

    let result = client.call_remote(&responders::sum(), &sum_args(1, 1)).await.unwrap();
    assert_eq!(result.i64("total"), Some(2));

    daemon.stop().await;
}
