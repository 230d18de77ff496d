//! Process-mode directory handling touches the process working directory,
//! so it lives in its own test binary and every test holds `CWD_LOCK`.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use dovetail_core::{
    BuildContext, Dependencies, DirectoryMode, Processor, ProcessorConfig, Task, TaskState,
};

static CWD_LOCK: Mutex<()> = Mutex::new(());

#[test]
fn test_process_directory_follows_tasks_and_is_restored() {
    let _guard = CWD_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let temp_dir = tempfile::tempdir().unwrap();
    let root = temp_dir.path().canonicalize().unwrap();
    std::fs::create_dir_all(root.join("outer").join("inner")).unwrap();

    let original = std::env::current_dir().unwrap();
    std::env::set_current_dir(&root).unwrap();

    let seen: Arc<Mutex<Vec<(String, PathBuf)>>> = Arc::new(Mutex::new(Vec::new()));
    let record = |name: &'static str| {
        let seen = Arc::clone(&seen);
        move |_: &BuildContext| -> anyhow::Result<()> {
            let cwd = std::env::current_dir()?;
            seen.lock().unwrap().push((name.to_string(), cwd));
            Ok(())
        }
    };

    let dependencies = Dependencies::from_tasks([
        Task::new("outer")
            .in_directory("outer")
            .depends_on(["inner", "broken"])
            .with_body(record("outer")),
        Task::new("inner")
            .in_directory("inner")
            .with_body(record("inner")),
        Task::new("broken")
            .in_directory(root.join("outer").join("inner"))
            .with_body(|_| anyhow::bail!("boom")),
        Task::new("lost").in_directory("does-not-exist"),
    ])
    .unwrap();

    let config = ProcessorConfig {
        directory_mode: DirectoryMode::Process,
        initial_directory: None,
    };

    let result = Processor::new(&dependencies, config.clone())
        .unwrap()
        .build_named(&["outer"])
        .unwrap();
    let after_build = std::env::current_dir().unwrap();

    let missing = Processor::new(&dependencies, config)
        .unwrap()
        .build_named(&["lost"])
        .unwrap();
    let after_missing = std::env::current_dir().unwrap();

    std::env::set_current_dir(&original).unwrap();

    assert_eq!(after_build, root);
    assert_eq!(after_missing, root);

    let seen = seen.lock().unwrap();
    assert_eq!(
        *seen,
        vec![("inner".to_string(), root.join("outer").join("inner"))]
    );
    assert_eq!(result.report("outer").unwrap().state, TaskState::Aborted);
    assert_eq!(result.report("broken").unwrap().state, TaskState::Failed);
    assert_eq!(missing.report("lost").unwrap().state, TaskState::Failed);
}

#[test]
fn test_body_changing_process_directory_is_undone() {
    let _guard = CWD_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let temp_dir = tempfile::tempdir().unwrap();
    let root = temp_dir.path().canonicalize().unwrap();
    let build = root.join("build");
    let elsewhere = root.join("elsewhere");
    std::fs::create_dir_all(&build).unwrap();
    std::fs::create_dir_all(&elsewhere).unwrap();

    let original = std::env::current_dir().unwrap();
    std::env::set_current_dir(&root).unwrap();

    let top_cwd: Arc<Mutex<Option<PathBuf>>> = Arc::new(Mutex::new(None));
    let top_seen = Arc::clone(&top_cwd);
    let wander_to = elsewhere.clone();
    let stray_to = elsewhere.clone();

    let dependencies = Dependencies::from_tasks([
        Task::new("top")
            .in_directory(build.clone())
            .depends_on(["wander"])
            .with_body(move |_| {
                *top_seen.lock().unwrap() = Some(std::env::current_dir()?);
                Ok(())
            }),
        Task::new("wander").with_body(move |_| {
            std::env::set_current_dir(&wander_to)?;
            Ok(())
        }),
        Task::new("stray").with_body(move |_| {
            std::env::set_current_dir(&stray_to)?;
            Ok(())
        }),
    ])
    .unwrap();

    let result = Processor::new(
        &dependencies,
        ProcessorConfig {
            directory_mode: DirectoryMode::Process,
            initial_directory: None,
        },
    )
    .unwrap()
    .build_named(&["top", "stray"])
    .unwrap();
    let after_build = std::env::current_dir().unwrap();

    std::env::set_current_dir(&original).unwrap();

    assert!(result.success, "{:?}", result.failed);
    assert_eq!(top_cwd.lock().unwrap().as_deref(), Some(build.as_path()));
    assert_eq!(after_build, root);
}
