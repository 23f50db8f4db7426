//! Event builders for integration tests.

use buildvis_rs::model::{
    BuildDescriptor, BuildEvent, EventKind, EventResult, Failure, FilePosition, MessageSeverity,
};

/// The `StartBuild` event for a build whose root occurrence id is
/// `"<build_id>:root"`.
pub fn start_build(build_id: &str, title: &str, working_dir: &str) -> BuildEvent {
    let descriptor = BuildDescriptor::new(build_id, title, working_dir);
    BuildEvent::new(
        format!("{build_id}:root").as_str(),
        title,
        EventKind::StartBuild(descriptor),
    )
    .at(1_000)
}

pub fn finish_build(build_id: &str, title: &str, result: EventResult) -> BuildEvent {
    BuildEvent::new(
        format!("{build_id}:root").as_str(),
        title,
        EventKind::FinishBuild { result },
    )
    .at(60_000)
}

pub fn start(id: &str, parent: &str, name: &str) -> BuildEvent {
    BuildEvent::new(id, name, EventKind::Start)
        .with_parent(parent)
        .at(2_000)
}

pub fn finish(id: &str, name: &str, result: EventResult) -> BuildEvent {
    BuildEvent::new(id, name, EventKind::Finish { result }).at(5_000)
}

pub fn message(id: &str, parent: &str, text: &str, severity: MessageSeverity) -> BuildEvent {
    BuildEvent::new(
        id,
        text,
        EventKind::Message {
            severity,
            file_position: None,
        },
    )
    .with_parent(parent)
    .at(3_000)
}

pub fn file_message(
    id: &str,
    parent: &str,
    text: &str,
    severity: MessageSeverity,
    file: &str,
    line: i64,
) -> BuildEvent {
    BuildEvent::new(
        id,
        text,
        EventKind::Message {
            severity,
            file_position: Some(FilePosition::new(file, line, 0)),
        },
    )
    .with_parent(parent)
    .at(3_000)
}

pub fn output(id: &str, parent: &str, text: &str) -> BuildEvent {
    BuildEvent::new(id, text, EventKind::Output { stdout: true })
        .with_parent(parent)
        .at(4_000)
}

pub fn failure(message: &str) -> Failure {
    Failure::new(message)
}
