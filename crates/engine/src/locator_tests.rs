// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use amp_core::Argument;

use super::*;

fn named(name: &str) -> Command {
    Command::builder(name).argument("a", Argument::integer()).build()
}

fn answer_with(label: &'static str) -> impl Fn(Values, &AmpHandle) -> ResponderOutput + Send + Sync + 'static {
    move |_, _| ResponderOutput::ok(Values::new().with("from", label))
}

fn is_typed(found: Option<LocatedResponder>) -> bool {
    matches!(found, Some(LocatedResponder::Typed { .. }))
}

#[test]
fn typed_responders_are_found_by_wire_name() {
    let locator = Locator::builder().responder(&named("Sum"), answer_with("sum")).build();
    match locator.locate(b"Sum") {
        Some(LocatedResponder::Typed { command, .. }) => assert_eq!(command.name(), "Sum"),
        _ => panic!("expected a typed responder"),
    }
    assert!(locator.locate(b"sum").is_none());
    assert_eq!(locator.len(), 1);
}

#[test]
fn typed_responders_win_over_raw_ones() {
    let locator = Locator::builder()
        .raw("Sum", |_, _| ResponderOutput::ok(AmpBox::new()))
        .responder(&named("Sum"), answer_with("typed"))
        .build();
    assert!(is_typed(locator.locate(b"Sum")));
}

#[test]
fn raw_responders_are_found_when_no_typed_one_exists() {
    let locator = Locator::builder().raw("Echo", |b, _| ResponderOutput::ok(b)).build();
    assert!(matches!(locator.locate(b"Echo"), Some(LocatedResponder::Raw(_))));
}

#[test]
fn extending_keeps_the_child_definition() {
    let parent = Locator::builder()
        .responder(&named("Shared"), answer_with("parent"))
        .responder(&named("ParentOnly"), answer_with("parent"))
        .build();
    let child = Locator::builder()
        .responder(&Command::builder("Shared").build(), answer_with("child"))
        .extend(&parent)
        .build();

    assert_eq!(child.len(), 2);
    assert!(child.locate(b"ParentOnly").is_some());
    match child.locate(b"Shared") {
        Some(LocatedResponder::Typed { command, .. }) => assert!(command.arguments().is_empty()),
        _ => panic!("expected the child's responder"),
    }
}

#[test]
fn later_registration_replaces_earlier() {
    let locator = Locator::builder()
        .responder(&named("Sum"), answer_with("first"))
        .responder(&Command::builder("Sum").build(), answer_with("second"))
        .build();
    match locator.locate(b"Sum") {
        Some(LocatedResponder::Typed { command, .. }) => assert!(command.arguments().is_empty()),
        _ => panic!("expected a typed responder"),
    }
}

#[test]
fn results_convert_into_outputs() {
    let ok: ResponderOutput = Ok::<_, std::io::Error>(Values::new()).into();
    assert!(matches!(ok, ResponderOutput::Ready(Ok(Reply::Values(_)))));

    let err: ResponderOutput = Err::<Values, _>(std::io::Error::other("boom")).into();
    assert!(matches!(err, ResponderOutput::Ready(Err(_))));

    let pending = ResponderOutput::pending(async { Ok::<_, DynError>(Reply::Box(AmpBox::new())) });
    assert!(matches!(pending, ResponderOutput::Pending(_)));
}
