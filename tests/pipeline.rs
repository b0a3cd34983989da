use std::time::Duration;

use pipekit::{
    build_command, run_pipeline, Cancellation, Command, CommandOption, ExecError, Pipeline,
    PipelineError,
};
use tempfile::TempDir;

fn commands(lines: &[&str]) -> Vec<Command> {
    lines.iter().map(|line| line.parse().unwrap()).collect()
}

#[tokio::test]
async fn printf_into_sort() {
    let output = run_pipeline(commands(&[r"printf 'b\na\n'", "sort"]))
        .await
        .unwrap();

    assert_eq!(output.stdout, b"a\nb\n");
    assert!(output.stderr.is_empty());
}

#[tokio::test]
async fn single_stage() {
    let output = Pipeline::parse(&["echo only"], &[]).unwrap().run().await.unwrap();
    assert_eq!(output.stdout_lossy(), "only\n");
}

#[tokio::test]
async fn three_stages() {
    let output = Pipeline::parse(&[r"printf 'c\nb\na\n'", "sort", "head -n 2"], &[])
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(output.stdout, b"a\nb\n");
}

#[tokio::test]
async fn large_stream_through_every_stage() {
    let output = Pipeline::parse(&["seq 1 200000", "cat", "wc -l"], &[])
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(output.stdout_lossy().trim(), "200000");
}

#[tokio::test]
async fn stderr_of_every_stage_is_merged() {
    let output = Pipeline::parse(
        &["sh -c 'echo one >&2; echo data'", "sh -c 'cat; echo two >&2'"],
        &[],
    )
    .unwrap()
    .run()
    .await
    .unwrap();

    assert_eq!(output.stdout, b"data\n");
    let stderr = output.stderr_lossy();
    assert!(stderr.contains("one\n"), "{stderr:?}");
    assert!(stderr.contains("two\n"), "{stderr:?}");
}

#[tokio::test]
async fn streamed_stages_are_not_kept() {
    let err = Pipeline::parse(
        &[r"printf 'b\na\n'", "sh -c 'sort; echo done >&2; exit 2'"],
        &[CommandOption::StreamOutput],
    )
    .unwrap()
    .run()
    .await
    .unwrap_err();

    let PipelineError::Failed { first, output, .. } = err else {
        panic!("unexpected error");
    };

    assert!(output.stdout.is_empty());
    assert!(output.stderr.is_empty());
    // the failing stage still carries what it printed
    assert_eq!(first.stage, 1);
    let kept = String::from_utf8_lossy(first.error.output().unwrap()).into_owned();
    assert!(kept.contains("a\nb\n"), "{kept:?}");
    assert!(kept.contains("done\n"), "{kept:?}");
}

#[tokio::test]
async fn unstartable_first_stage_starts_nothing() {
    let dir = TempDir::new().unwrap();
    let marker = dir.path().join("marker");

    let pipeline = Pipeline::new(vec![
        build_command("/nonexistent/pipekit-test-binary", &[]).unwrap(),
        Command::from_argv(vec!["touch".into(), marker.display().to_string()], &[]).unwrap(),
    ])
    .unwrap();

    let err = pipeline.run().await.unwrap_err();

    let PipelineError::Failed { first, rest, .. } = &err else {
        panic!("unexpected error: {err}");
    };
    assert_eq!(first.stage, 0);
    assert!(matches!(first.error, ExecError::Spawn { .. }));
    assert!(rest.is_empty());
    assert!(!marker.exists());
}

#[tokio::test]
async fn unstartable_middle_stage_lets_upstream_finish() {
    let err = Pipeline::parse(&["seq 1 100000", "/nonexistent/pipekit-test-binary", "cat"], &[])
        .unwrap()
        .run()
        .await
        .unwrap_err();

    let failures = err.failures().collect::<Vec<_>>();
    assert!(failures
        .iter()
        .any(|failure| failure.stage == 1 && matches!(failure.error, ExecError::Spawn { .. })));
    // nothing reads from `seq` any more, so it stops on a broken pipe and is
    // still reported, first
    assert_eq!(failures[0].stage, 0);
    assert!(failures.iter().all(|failure| failure.stage < 2));
}

#[tokio::test]
async fn failing_middle_stage() {
    let err = Pipeline::parse(
        &["printf 'a\\n'", "sh -c 'cat >/dev/null; echo broken >&2; exit 4'", "cat"],
        &[],
    )
    .unwrap()
    .run()
    .await
    .unwrap_err();

    let PipelineError::Failed { first, rest, output } = err else {
        panic!("unexpected error");
    };

    assert_eq!(first.stage, 1);
    assert_eq!(first.error.exit_code(), Some(4));
    assert_eq!(first.error.output(), Some(&b"broken\n"[..]));
    assert!(rest.is_empty());
    assert!(output.stdout.is_empty());
    assert_eq!(output.stderr, b"broken\n");
}

#[tokio::test]
async fn early_exit_downstream_does_not_hang() {
    let err = Pipeline::parse(&["yes", "head -n 1"], &[])
        .unwrap()
        .run()
        .await
        .unwrap_err();

    let PipelineError::Failed { first, output, .. } = err else {
        panic!("unexpected error");
    };

    // `yes` is stopped by the closed pipe
    assert_eq!(first.stage, 0);
    assert!(matches!(first.error, ExecError::Exit { .. }));
    assert_eq!(output.stdout, b"y\n");
}

#[tokio::test]
async fn timeout_stops_every_stage() {
    let err = Pipeline::parse(&["sleep 30", "cat"], &[])
        .unwrap()
        .run_with(&Cancellation::timeout(Duration::from_millis(200)))
        .await
        .unwrap_err();

    let failures = err.failures().collect::<Vec<_>>();
    assert!(!failures.is_empty());
    assert!(failures
        .iter()
        .all(|failure| matches!(failure.error, ExecError::TimedOut { .. })));
}

#[tokio::test]
async fn timeout_keeps_earlier_exit_status() {
    let err = Pipeline::parse(&["sh -c 'exit 5'", "sleep 30"], &[])
        .unwrap()
        .run_with(&Cancellation::timeout(Duration::from_millis(500)))
        .await
        .unwrap_err();

    let failures = err.failures().collect::<Vec<_>>();
    assert_eq!(failures.len(), 2);

    assert_eq!(failures[0].stage, 0);
    assert!(matches!(failures[0].error, ExecError::Exit { code: 5, .. }));

    assert_eq!(failures[1].stage, 1);
    assert!(matches!(failures[1].error, ExecError::TimedOut { .. }));
}
