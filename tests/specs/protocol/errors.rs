// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error boxes: declared codes, unknown commands, protocol violations.

use crate::prelude::*;

#[tokio::test]
async fn division_by_zero_maps_to_zero_div() {
    let daemon = TestDaemon::start().await;
    let client = daemon.client().await;

    let args = Values::new().with("numerator", 1).with("denominator", 0);
    let err = client.call_remote(&responders::divide(), &args).await.unwrap_err();
    assert_eq!(err.code(), Some(&b"ZERO_DIV"[..]));
    assert!(err.remote::<responders::ZeroDivision>().is_some());

    // A declared error leaves the connection usable.
    let result = client.call_remote(&responders::sum(), &sum_args(2, 2)).await.unwrap();
    assert_eq!(result.i64("total"), Some(4));

    daemon.stop().await;
}

#[tokio::test]
async fn zero_div_on_the_wire() {
    let daemon = TestDaemon::start().await;
    let mut raw = daemon.raw().await;

    raw.send([("_command", "Divide"), ("_ask", "a"), ("numerator", "1"), ("denominator", "0")])
        .await;
    let error = raw.recv().await.unwrap();
    assert_eq!(error.get(b"_error"), Some(&b"a"[..]));
    assert_eq!(error.get(b"_error_code"), Some(&b"ZERO_DIV"[..]));
    assert!(error.get(b"_error_description").is_some());

    daemon.stop().await;
}

#[tokio::test]
async fn unknown_commands_answer_unhandled() {
    let daemon = TestDaemon::start().await;
    let mut raw = daemon.raw().await;

    raw.send([("_command", "Multiply"), ("_ask", "1")]).await;
    let error = raw.recv().await.unwrap();
    assert_eq!(error.get(b"_error"), Some(&b"1"[..]));
    assert_eq!(error.get(b"_error_code"), Some(&b"UNHANDLED"[..]));
    assert_eq!(error.get(b"_error_description"), Some(&b"Unhandled Command: Multiply"[..]));

    // Still connected.
    raw.send([("_command", "Echo"), ("_ask", "2"), ("text", "ok")]).await;
    assert_eq!(raw.recv().await.unwrap().get(b"_answer"), Some(&b"2"[..]));

    daemon.stop().await;
}

#[tokio::test]
async fn typed_callers_see_unhandled_command() {
    let daemon = TestDaemon::start().await;
    let client = daemon.client().await;

    let multiply = Command::builder("Multiply").build();
    let err = client.call_remote(&multiply, &Values::new()).await.unwrap_err();
    assert_eq!(err.code(), Some(&b"UNHANDLED"[..]));
    assert!(err.remote::<amp_core::UnhandledCommand>().is_some());

    daemon.stop().await;
}

#[tokio::test]
async fn answers_to_unknown_tags_drop_the_connection() {
    let daemon = TestDaemon::start().await;
    let mut raw = daemon.raw().await;

    raw.send([("_answer", "99"), ("total", "1")]).await;
    assert!(raw.recv().await.is_none());

    daemon.stop().await;
}

#[tokio::test]
async fn boxes_without_a_marker_drop_the_connection() {
    let daemon = TestDaemon::start().await;
    let mut raw = daemon.raw().await;

    raw.send([("a", "1")]).await;
    assert!(raw.recv().await.is_none());

    daemon.stop().await;
}
