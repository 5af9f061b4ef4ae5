use std::error::Error;
use std::fs;
use std::path::Path;
use std::process::Command;

use chrono::{Duration, Utc};
use driftwatch_analysis::{
    FreshnessAnalyzer, FreshnessBaselineSource, FreshnessEvaluation, FreshnessRequest,
    JsonSidecarStore, SidecarEntry, SidecarRecord, SidecarStore, update_from_index,
};
use driftwatch_analysis::sidecar::format_timestamp;
use driftwatch_config::FreshnessConfig;
use driftwatch_core::content_digest;
use tempfile::tempdir;

const GOALS: &str = "context/current-goals.md";
const GOALS_BODY: &str = "# Current goals\n\n- ship the beta\n";

#[test]
fn new_decision_record_triggers_watch_root() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let workspace = temp.path();
    init_repo(workspace)?;
    write_file(workspace, GOALS, GOALS_BODY)?;
    commit_all(workspace, "goals")?;

    let now = Utc::now();
    write_sidecar(
        workspace,
        format_timestamp(now - Duration::days(1)),
        content_digest(GOALS_BODY.as_bytes()),
    )?;
    write_file(
        workspace,
        "docs/decisions/003-queue.md",
        &"decision line\n".repeat(50),
    )?;

    let analyzer = FreshnessAnalyzer::with_config(workspace, FreshnessConfig::default());
    let report = analyzer.report_at(FreshnessRequest::default(), now + Duration::seconds(5));
    let goals = evaluation(&report.files, GOALS)?;

    assert!(goals.ok);
    assert!(goals.recommended);
    assert_eq!(goals.score, 3);
    assert_eq!(goals.baseline_source, Some(FreshnessBaselineSource::Sidecar));
    assert_eq!(goals.age_days, Some(1));
    assert!(
        goals
            .reasons
            .iter()
            .any(|reason| reason == "New/updated decisions artifacts since last update (1 shown)")
    );
    assert_eq!(
        goals.changes.get("decisions"),
        Some(&vec!["docs/decisions/003-queue.md".to_owned()])
    );
    assert!(!goals.changes.contains_key("context"));
    assert_eq!(goals.signals.get("gitDirty"), Some(&serde_json::json!(true)));
    assert!(report.recommended);
    Ok(())
}

#[test]
fn sidecar_hash_mismatch_adds_fixed_penalty() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let workspace = temp.path();
    init_repo(workspace)?;
    write_file(workspace, GOALS, GOALS_BODY)?;
    commit_all(workspace, "goals")?;

    let now = Utc::now() + Duration::minutes(1);
    write_sidecar(workspace, format_timestamp(now), "0".repeat(64))?;

    let analyzer = FreshnessAnalyzer::with_config(workspace, FreshnessConfig::default());
    let report = analyzer.report_at(FreshnessRequest::default(), now);
    let goals = evaluation(&report.files, GOALS)?;

    assert_eq!(goals.score, 3);
    assert!(goals.recommended);
    assert_eq!(
        goals.reasons,
        vec![
            "Freshness sidecar is out of sync with file content (run git commit hook to refresh)"
                .to_owned()
        ]
    );
    Ok(())
}

#[test]
fn missing_documents_and_missing_baselines_are_penalized() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let workspace = temp.path();
    write_file(workspace, GOALS, GOALS_BODY)?;

    let analyzer = FreshnessAnalyzer::with_config(workspace, FreshnessConfig::default());
    let report = analyzer.report_at(FreshnessRequest::default(), Utc::now() + Duration::minutes(1));

    let goals = evaluation(&report.files, GOALS)?;
    assert!(goals.ok);
    assert_eq!(goals.baseline_source, None);
    assert!(goals.reasons[0].starts_with("No freshness baseline found"));
    assert!(!goals.signals.contains_key("gitDirty"));
    assert!(goals.recommended);

    let constraints = evaluation(&report.files, "context/constraints.md")?;
    assert!(!constraints.ok);
    assert_eq!(constraints.score, 3);
    assert_eq!(
        constraints.reasons,
        vec!["Missing file at context/constraints.md".to_owned()]
    );

    assert!(report.ok);
    assert!(report.warnings.iter().any(|warning| warning.contains("version control unavailable")));
    Ok(())
}

#[test]
fn document_marker_is_the_fallback_baseline_and_ages() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let workspace = temp.path();
    write_file(workspace, GOALS, "# Goals\n\nLast updated: 2024-01-01\n")?;

    let now = Utc::now() + Duration::minutes(1);
    let analyzer = FreshnessAnalyzer::with_config(workspace, FreshnessConfig::default());

    let report = analyzer.report_at(FreshnessRequest::default(), now);
    let goals = evaluation(&report.files, GOALS)?;
    assert_eq!(goals.baseline_source, Some(FreshnessBaselineSource::DocumentMarker));
    assert_eq!(goals.last_updated.as_deref(), Some("2024-01-01"));
    assert!(!goals.has_time);
    assert!(goals.reasons.iter().any(|reason| reason.starts_with("Freshness baseline is ")));

    let strict = analyzer.report_at(
        FreshnessRequest {
            require_sidecar: Some(true),
            ..FreshnessRequest::default()
        },
        now,
    );
    let goals = evaluation(&strict.files, GOALS)?;
    assert_eq!(goals.baseline_source, None);
    assert!(goals.reasons[0].starts_with("No freshness baseline found"));
    Ok(())
}

#[test]
fn corrupt_sidecar_is_treated_as_absent() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let workspace = temp.path();
    write_file(workspace, GOALS, "# Goals\n\nLast updated: 2024-01-01T08:00:00Z\n")?;
    write_file(workspace, "context/.freshness.json", "{not json")?;

    let analyzer = FreshnessAnalyzer::with_config(workspace, FreshnessConfig::default());
    let report = analyzer.report_at(FreshnessRequest::default(), Utc::now());
    let goals = evaluation(&report.files, GOALS)?;

    assert_eq!(goals.baseline_source, Some(FreshnessBaselineSource::DocumentMarker));
    assert!(goals.has_time);
    assert!(report.warnings.iter().any(|warning| warning.contains("corrupt")));
    Ok(())
}

#[test]
fn touch_rewrites_markers_of_recommended_documents() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let workspace = temp.path();
    write_file(workspace, GOALS, "# Goals\n\n- ship\n")?;
    write_file(workspace, "context/constraints.md", "# Constraints\n\nLast updated: 2024-01-01\n")?;

    let now = Utc::now() + Duration::minutes(1);
    let analyzer = FreshnessAnalyzer::with_config(workspace, FreshnessConfig::default());
    let report = analyzer.report_at(FreshnessRequest::default(), now);
    let outcomes = analyzer.touch(&report.files, false, now);

    let today = now.date_naive().format("%Y-%m-%d").to_string();
    assert!(outcomes.iter().all(|outcome| outcome.file != "context/decisions.md" || !outcome.touched));
    assert_eq!(
        fs::read_to_string(workspace.join(GOALS))?,
        format!("# Goals\n\nLast updated: {today}\n\n- ship\n")
    );
    assert_eq!(
        fs::read_to_string(workspace.join("context/constraints.md"))?,
        format!("# Constraints\n\nLast updated: {today}\n")
    );
    Ok(())
}

#[test]
fn sidecar_update_records_staged_documents_and_stages_itself() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let workspace = temp.path();
    init_repo(workspace)?;
    write_file(workspace, GOALS, GOALS_BODY)?;
    write_file(workspace, "context/constraints.md", "# Constraints\n")?;
    commit_all(workspace, "initial")?;

    let staged_body = "# Current goals\n\n- ship the beta\n- hire\n";
    write_file(workspace, GOALS, staged_body)?;
    run_git(workspace, &["add", GOALS])?;
    // Unstaged edits on top of the staged ones are not what gets committed.
    write_file(workspace, GOALS, "# Current goals\n\nscratch\n")?;

    let config = FreshnessConfig::default();
    let now = Utc::now();
    let update = update_from_index(workspace, &config, now)?;

    assert_eq!(update.updated, vec![GOALS.to_owned()]);
    assert!(update.written);
    assert!(update.staged);

    let record = JsonSidecarStore::for_workspace(workspace, &config)
        .read()?
        .ok_or("expected sidecar")?;
    let entry = record.files.get(GOALS).ok_or("expected goals entry")?;
    assert_eq!(
        entry.content_hash.as_deref(),
        Some(content_digest(staged_body.as_bytes()).as_str())
    );
    assert!(!record.files.contains_key("context/constraints.md"));

    let staged = run_git(workspace, &["diff", "--cached", "--name-only"])?;
    assert!(staged.lines().any(|line| line == config.sidecar));

    let again = update_from_index(workspace, &config, now + Duration::minutes(5))?;
    assert!(again.updated.is_empty());
    assert!(!again.written);
    Ok(())
}

#[test]
fn sidecar_update_outside_repository_is_a_no_op() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let update = update_from_index(temp.path(), &FreshnessConfig::default(), Utc::now())?;

    assert!(!update.written);
    assert!(!update.warnings.is_empty());
    assert!(!temp.path().join("context/.freshness.json").exists());
    Ok(())
}

#[test]
fn subdirectory_analyzer_reads_documents_from_the_root() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let workspace = temp.path();
    init_repo(workspace)?;
    write_file(workspace, GOALS, GOALS_BODY)?;
    commit_all(workspace, "goals")?;

    let now = Utc::now();
    write_sidecar(
        workspace,
        format_timestamp(now - Duration::hours(2)),
        content_digest(GOALS_BODY.as_bytes()),
    )?;

    let analyzer =
        FreshnessAnalyzer::with_config(workspace.join("context"), FreshnessConfig::default());
    let report = analyzer.report_at(FreshnessRequest::default(), now);
    let goals = evaluation(&report.files, GOALS)?;

    assert!(goals.ok);
    assert_eq!(goals.baseline_source, Some(FreshnessBaselineSource::Sidecar));
    assert!(!goals.reasons.iter().any(|reason| reason.contains("out of sync")));
    Ok(())
}

fn evaluation<'a>(
    files: &'a [FreshnessEvaluation],
    path: &str,
) -> Result<&'a FreshnessEvaluation, Box<dyn Error>> {
    Ok(files
        .iter()
        .find(|file| file.file == path)
        .ok_or_else(|| format!("missing evaluation for {path}"))?)
}

fn write_sidecar(
    workspace: &Path,
    reviewed_at: String,
    content_hash: String,
) -> Result<(), Box<dyn Error>> {
    let mut record = SidecarRecord::default();
    record.files.insert(
        GOALS.to_owned(),
        SidecarEntry {
            reviewed_at: Some(reviewed_at),
            content_hash: Some(content_hash),
        },
    );
    JsonSidecarStore::for_workspace(workspace, &FreshnessConfig::default()).write(&record)?;
    Ok(())
}

fn write_file(workspace: &Path, relative: &str, content: &str) -> Result<(), Box<dyn Error>> {
    let path = workspace.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)?;
    Ok(())
}

fn run_git(workspace: &Path, args: &[&str]) -> Result<String, Box<dyn Error>> {
    let output = Command::new("git")
        .args(args)
        .current_dir(workspace)
        .output()?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!("git {:?} failed: {}", args, stderr.trim()).into());
    }

    Ok(String::from_utf8(output.stdout)?.trim().to_owned())
}

fn init_repo(workspace: &Path) -> Result<(), Box<dyn Error>> {
    run_git(workspace, &["init"])?;
    run_git(workspace, &["config", "user.name", "Driftwatch Test"])?;
    run_git(
        workspace,
        &["config", "user.email", "driftwatch-test@example.com"],
    )?;
    run_git(workspace, &["config", "commit.gpgsign", "false"])?;
    Ok(())
}

fn commit_all(workspace: &Path, message: &str) -> Result<String, Box<dyn Error>> {
    run_git(workspace, &["add", "."])?;
    run_git(workspace, &["commit", "-m", message])?;
    run_git(workspace, &["rev-parse", "--verify", "HEAD"])
}
