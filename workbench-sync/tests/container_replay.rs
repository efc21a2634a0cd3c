mod common;

use common::{drain, Call, Harness};
use workbench_core::{Delta, HotReload, NodeKind, NodePath};
use workbench_sync::channel::{ContainerEntry, ContainerRemoval, ContainerUpdate};
use workbench_sync::{Command, ContainerInbound, NoticeLevel, WorkspaceEvent};

const FILES: &[(&str, &str)] = &[("app/index.js", "old"), ("README.md", "# demo")];

fn container(event: ContainerInbound) -> WorkspaceEvent {
    WorkspaceEvent::Container(event)
}

async fn open(h: &mut Harness, path: &str) {
    h.workspace
        .execute(Command::Select {
            path: NodePath::from(path),
        })
        .await
        .expect("select");
}

#[tokio::test]
async fn docker_add_creates_exactly_one_storage_object() {
    let mut h = Harness::new(FILES, HotReload::IfClean).await;
    let mut container_rx = h.connect_container().await;

    h.workspace
        .handle(container(ContainerInbound::DockerAdd(ContainerEntry {
            path: "/home/runner/s3-code/app/main.js".into(),
            kind: NodeKind::File,
            content: Some("x".into()),
        })))
        .await;

    assert_eq!(
        h.log.mutations(),
        vec![Call::Add {
            path: "app/main.js".into(),
            kind: NodeKind::File,
            content: Some("x".into()),
        }]
    );
    assert!(drain(&mut container_rx).is_empty());
    assert!(workbench_core::tree::contains(
        h.workspace.store().forest(),
        &NodePath::from("app/main.js")
    ));
}

#[tokio::test]
async fn docker_add_folder_carries_no_content() {
    let mut h = Harness::new(FILES, HotReload::IfClean).await;
    h.workspace
        .handle(container(ContainerInbound::DockerAdd(ContainerEntry {
            path: "/w/s3-code/dist".into(),
            kind: NodeKind::Folder,
            content: None,
        })))
        .await;
    assert_eq!(
        h.log.mutations(),
        vec![Call::Add {
            path: "dist".into(),
            kind: NodeKind::Folder,
            content: None,
        }]
    );
}

#[tokio::test]
async fn docker_add_outside_project_root_is_ignored() {
    let mut h = Harness::new(FILES, HotReload::IfClean).await;
    h.workspace
        .handle(container(ContainerInbound::DockerAdd(ContainerEntry {
            path: "/tmp/scratch.txt".into(),
            kind: NodeKind::File,
            content: None,
        })))
        .await;
    assert!(h.log.calls().is_empty());
}

#[tokio::test]
async fn docker_add_conflict_becomes_notice() {
    let mut h = Harness::new(FILES, HotReload::IfClean).await;
    let mut notices = h.workspace.subscribe_notices();
    h.workspace
        .handle(container(ContainerInbound::DockerAdd(ContainerEntry {
            path: "/w/s3-code/README.md".into(),
            kind: NodeKind::File,
            content: Some(String::new()),
        })))
        .await;
    let notice = notices.try_recv().expect("notice");
    assert_eq!(notice.level, NoticeLevel::Error);
}

#[tokio::test]
async fn docker_remove_deletes_from_storage_only() {
    let mut h = Harness::new(FILES, HotReload::IfClean).await;
    open(&mut h, "app/index.js").await;
    h.log.clear();

    h.workspace
        .handle(container(ContainerInbound::DockerRemove(ContainerRemoval {
            path: "/w/s3-code/app".into(),
            kind: NodeKind::Folder,
        })))
        .await;

    assert_eq!(
        h.log.mutations(),
        vec![Call::Delete {
            path: "app".into(),
            kind: NodeKind::Folder,
        }]
    );
    assert!(h.workspace.store().selected().is_none());
}

#[tokio::test]
async fn docker_update_saves_and_reloads_clean_buffer() {
    let mut h = Harness::new(FILES, HotReload::IfClean).await;
    open(&mut h, "app/index.js").await;
    h.log.clear();

    h.workspace
        .handle(container(ContainerInbound::DockerUpdate(ContainerUpdate {
            path: "/w/s3-code/app/index.js".into(),
            content: "new".into(),
        })))
        .await;

    assert_eq!(
        h.log.mutations(),
        vec![Call::Save {
            path: "app/index.js".into(),
            content: "new".into(),
        }]
    );
    assert_eq!(h.workspace.store().buffer().content, "new");
    assert!(!h.workspace.store().buffer().dirty);
}

#[tokio::test]
async fn docker_update_keeps_dirty_buffer_and_warns() {
    let mut h = Harness::new(FILES, HotReload::IfClean).await;
    let mut notices = h.workspace.subscribe_notices();
    open(&mut h, "app/index.js").await;
    h.workspace
        .execute(Command::Edit {
            deltas: vec![Delta::insert(3, "!")],
        })
        .await
        .expect("edit");

    h.workspace
        .handle(container(ContainerInbound::DockerUpdate(ContainerUpdate {
            path: "/w/s3-code/app/index.js".into(),
            content: "new".into(),
        })))
        .await;

    let buffer = h.workspace.store().buffer();
    assert_eq!(buffer.content, "old!");
    assert!(buffer.dirty);
    assert_eq!(h.storage.content("app/index.js").as_deref(), Some("new"));
    let notice = notices.try_recv().expect("notice");
    assert_eq!(notice.level, NoticeLevel::Warning);
}

#[tokio::test]
async fn docker_update_without_hot_reload_leaves_buffer() {
    let mut h = Harness::new(FILES, HotReload::Never).await;
    open(&mut h, "app/index.js").await;

    h.workspace
        .handle(container(ContainerInbound::DockerUpdate(ContainerUpdate {
            path: "/w/s3-code/app/index.js".into(),
            content: "new".into(),
        })))
        .await;

    assert_eq!(h.workspace.store().buffer().content, "old");
    assert_eq!(h.storage.content("app/index.js").as_deref(), Some("new"));
}

#[tokio::test]
async fn terminal_output_reaches_attached_viewers() {
    let mut h = Harness::new(FILES, HotReload::IfClean).await;
    let mut output = h.workspace.subscribe_terminal();
    h.workspace
        .handle(container(ContainerInbound::TerminalData("total 0\r\n".into())))
        .await;
    assert_eq!(output.try_recv().expect("chunk"), "total 0\r\n");
    assert!(h.log.calls().is_empty());
}
