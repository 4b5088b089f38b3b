// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Key and value length limits.

use crate::prelude::*;

#[tokio::test]
async fn oversized_values_fail_before_sending() {
    let daemon = TestDaemon::start().await;
    let client = daemon.client().await;

    let text = "x".repeat(0x10000);
    let err = client.call_remote(&responders::echo(), &Values::new().with("text", text)).await;
    assert!(err.is_err());

    // Nothing reached the wire; the connection still works.
    let ok = "y".repeat(0xffff);
    let result =
        client.call_remote(&responders::echo(), &Values::new().with("text", ok.as_str())).await;
    assert_eq!(result.unwrap().text("text"), Some(ok.as_str()));

    daemon.stop().await;
}

#[tokio::test]
async fn oversized_keys_from_the_peer_drop_the_connection() {
    let daemon = TestDaemon::start().await;
    let mut raw = daemon.raw().await;

    // Key length prefix 0x0100 is one past the limit.
    raw.write(&[0x01, 0x00]).await;
    raw.write(&[b'k'; 256]).await;
    assert!(raw.recv().await.is_none());

    daemon.stop().await;
}
