//! End-to-end pipeline tests: in-memory queue and store, real input
//! staging, and a stub renderer binary standing in for the animation model.

#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use motionforge_core::{OutputFormat, Task, TaskId, TaskPayload, TaskStatus};
use motionforge_infra::{InMemoryTaskStore, RetryCoordinator, TaskStore};
use motionforge_messaging::{InMemoryQueue, TaskQueue};
use motionforge_worker::{Config, RenderExecutor};

/// Checks its prompt file exists, then drops a fake artifact where the
/// worker expects one.
const STUB_RENDERER: &str = r#"#!/bin/sh
while [ $# -gt 0 ]; do
    case "$1" in
        --prompt-config) prompt="$2"; shift 2 ;;
        --format) fmt="$2"; shift 2 ;;
        --output-name) name="$2"; shift 2 ;;
        --output-folder) out="$2"; shift 2 ;;
        *) shift ;;
    esac
done
test -f "$prompt" || exit 3
printf 'GIF89a' > "$out/$name.$fmt"
"#;

fn write_stub(dir: &Path, body: &str) -> String {
    let path = dir.join("render-stub.sh");
    fs::write(&path, body).unwrap();

    let mut perms = fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).unwrap();

    path.to_string_lossy().into_owned()
}

fn config_in(dir: &Path, render_cmd: &str) -> Config {
    let config = Config::from_lookup(|name| match name {
        "RENDER_CMD" => Some(render_cmd.to_string()),
        "INPUTS_DIR" => Some(dir.join("inputs").to_string_lossy().into_owned()),
        "OUTPUTS_DIR" => Some(dir.join("outputs").to_string_lossy().into_owned()),
        _ => None,
    })
    .unwrap();

    fs::create_dir_all(&config.inputs_dir).unwrap();
    fs::create_dir_all(&config.outputs_dir).unwrap();
    config
}

fn payload(prompt: &str) -> TaskPayload {
    TaskPayload {
        prompt: prompt.to_string(),
        image_b64: "aGVsbG8=".to_string(),
        format: OutputFormat::Gif,
        params: serde_json::Map::new(),
    }
}

#[test]
fn tasks_flow_from_queue_to_completed_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let render_cmd = write_stub(dir.path(), STUB_RENDERER);
    let config = config_in(dir.path(), &render_cmd);

    let store = InMemoryTaskStore::arc();
    let queue = InMemoryQueue::new();
    for (id, prompt) in [("t-1", "a red panda"), ("t-2", "a slow tide")] {
        store
            .insert(&Task::new(TaskId::from(id), payload(prompt)))
            .unwrap();
        queue.publish(&TaskId::from(id)).unwrap();
    }

    let coordinator = RetryCoordinator::new(store.clone(), RenderExecutor::new(&config))
        .with_max_attempts(config.max_attempts);
    queue.consume(&coordinator).unwrap();

    for id in ["t-1", "t-2"] {
        let stored = store.fetch(&TaskId::from(id)).unwrap();
        assert_eq!(stored.status, TaskStatus::Complete);
        assert_eq!(stored.num_attempts, 1);
        assert_eq!(stored.result.as_deref(), Some(b"GIF89a".as_slice()));
        assert!(stored.errors.is_empty());
    }
    assert!(queue.is_empty());
}

#[test]
fn a_broken_renderer_exhausts_the_attempt_budget() {
    let dir = tempfile::tempdir().unwrap();
    let render_cmd = write_stub(dir.path(), "#!/bin/sh\nexit 7\n");
    let config = config_in(dir.path(), &render_cmd);

    let store = InMemoryTaskStore::arc();
    let queue = InMemoryQueue::new();
    store
        .insert(&Task::new(TaskId::from("t-doomed"), payload("never renders")))
        .unwrap();
    queue.publish(&TaskId::from("t-doomed")).unwrap();

    let coordinator = RetryCoordinator::new(store.clone(), RenderExecutor::new(&config))
        .with_max_attempts(config.max_attempts);
    queue.consume(&coordinator).unwrap();

    let stored = store.fetch(&TaskId::from("t-doomed")).unwrap();
    assert_eq!(stored.status, TaskStatus::Failed);
    assert_eq!(stored.num_attempts, 3);
    assert_eq!(stored.errors.len(), 3);
    assert!(stored.errors.iter().all(|e| e.contains("exited")));
    assert!(stored.result.is_none());
    assert!(queue.is_empty());
}
