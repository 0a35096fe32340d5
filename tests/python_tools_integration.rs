//! Runs the real pylint and pytest adapters. Requires `python3` with both
//! packages installed; enabled by `SWARM_INTEGRATION`.

mod common;

use std::time::Duration;

use refactor_swarm::judge::{Judge, JudgeRequest, PytestJudge, Verdict};
use refactor_swarm::lint::{Linter, PylintLinter};

use common::write_file;

fn integration_enabled() -> bool {
    std::env::var("SWARM_INTEGRATION").is_ok()
}

const TIMEOUT: Option<Duration> = Some(Duration::from_secs(120));

#[tokio::test]
async fn pylint_scores_undocumented_module() {
    if !integration_enabled() {
        return;
    }
    let tmp = tempfile::tempdir().unwrap();
    let path = write_file(tmp.path(), "calc.py", "def add(a,b):\n    return a+b\n");

    let linter = PylintLinter::new("python3".to_string(), TIMEOUT);
    let report = linter
        .lint(&path, "def add(a,b):\n    return a+b\n")
        .await
        .unwrap();

    let score = report.score.expect("pylint should print a score");
    assert!(score < 10.0, "unexpected score {score}");
    assert!(report.diagnostics.iter().any(|d| d.code == "C0116"));
}

#[tokio::test]
async fn pylint_reads_content_not_disk() {
    if !integration_enabled() {
        return;
    }
    let tmp = tempfile::tempdir().unwrap();
    let path = write_file(tmp.path(), "calc.py", "this is not python\n");

    let linter = PylintLinter::new("python3".to_string(), TIMEOUT);
    let content = "\"\"\"Arithmetic.\"\"\"\n\n\ndef add(left, right):\n    \"\"\"Sum.\"\"\"\n    return left + right\n";
    let report = linter.lint(&path, content).await.unwrap();

    assert_eq!(report.score, Some(10.0));
    assert!(report.diagnostics.is_empty());
}

#[tokio::test]
async fn pytest_passing_suite() {
    if !integration_enabled() {
        return;
    }
    let tmp = tempfile::tempdir().unwrap();
    let file = write_file(tmp.path(), "calc.py", "def add(a, b):\n    return a + b\n");
    write_file(
        tmp.path(),
        "test_calc.py",
        "from calc import add\n\n\ndef test_add():\n    assert add(2, 3) == 5\n",
    );

    let judge = PytestJudge::new("python3".to_string(), TIMEOUT);
    let result = judge
        .judge(&JudgeRequest {
            project_root: tmp.path(),
            file: &file,
        })
        .await
        .unwrap();

    assert_eq!(result.verdict, Verdict::Pass);
    assert_eq!(result.exit_code, 0);
    assert!(result.output.contains("1 passed"));
}

#[tokio::test]
async fn pytest_failing_suite_is_retryable() {
    if !integration_enabled() {
        return;
    }
    let tmp = tempfile::tempdir().unwrap();
    let file = write_file(tmp.path(), "calc.py", "def add(a, b):\n    return a - b\n");
    write_file(
        tmp.path(),
        "test_calc.py",
        "from calc import add\n\n\ndef test_add():\n    assert add(2, 3) == 5\n",
    );

    let judge = PytestJudge::new("python3".to_string(), TIMEOUT);
    let result = judge
        .judge(&JudgeRequest {
            project_root: tmp.path(),
            file: &file,
        })
        .await
        .unwrap();

    assert_eq!(result.verdict, Verdict::FailRetry);
    assert_eq!(result.exit_code, 1);
    assert!(result.output.contains("test_add"));
}

#[tokio::test]
async fn pytest_no_tests_collected_is_retryable() {
    if !integration_enabled() {
        return;
    }
    let tmp = tempfile::tempdir().unwrap();
    let file = write_file(tmp.path(), "calc.py", "def add(a, b):\n    return a + b\n");

    let judge = PytestJudge::new("python3".to_string(), TIMEOUT);
    let result = judge
        .judge(&JudgeRequest {
            project_root: tmp.path(),
            file: &file,
        })
        .await
        .unwrap();

    assert_eq!(result.exit_code, 5);
    assert_eq!(result.verdict, Verdict::FailRetry);
}
