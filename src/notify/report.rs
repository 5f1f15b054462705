//! Run report rendering
//!
//! Builds the subject and body delivered to the operator after every
//! terminal state: run id, outcome, drift summary, candidate vs incumbent
//! metrics, and the failed stage with error detail when the run aborted.

use std::fmt::Write as FmtWrite;

use crate::pipeline::TrainingRun;
use crate::promote::Verdict;

/// Render the notification (subject, body) for a finished run
pub fn render_report(run: &TrainingRun) -> (String, String) {
    let subject = format!("[reentrenar] run {}: {}", run.id, run.outcome);

    let mut body = String::new();
    let _ = writeln!(
        body,
        "═══════════════════════════════════════════════════════════════"
    );
    let _ = writeln!(body, "                    RETRAINING RUN REPORT");
    let _ = writeln!(
        body,
        "═══════════════════════════════════════════════════════════════"
    );
    let _ = writeln!(body);
    let _ = writeln!(body, "Run ID:   {}", run.id);
    let _ = writeln!(body, "Outcome:  {}", run.outcome);
    let _ = writeln!(body, "Stage:    {}", run.stage_reached);
    if let Some(fp) = &run.input_fingerprint {
        let _ = writeln!(body, "Input:    {fp}");
    }
    let _ = writeln!(body, "Started:  {}", run.started_at.to_rfc3339());
    let _ = writeln!(body, "Finished: {}", run.finished_at.to_rfc3339());

    if let Some(reason) = &run.skip_reason {
        let _ = writeln!(body);
        let _ = writeln!(body, "Skipped: {reason}");
    }

    if let Some(drift) = &run.drift {
        let _ = writeln!(body);
        let _ = writeln!(
            body,
            "─── Drift ──────────────────────────────────────────────────────"
        );
        body.push_str(&drift.format_report());
    }

    if let Some(decision) = &run.decision {
        let _ = writeln!(body);
        let _ = writeln!(
            body,
            "─── Promotion ──────────────────────────────────────────────────"
        );
        let _ = writeln!(body, "Verdict: {}", decision.verdict);
        let _ = writeln!(body, "Rule:    {}", decision.rule);
        let c = &decision.candidate;
        let _ = writeln!(
            body,
            "Candidate:  MAE {:.4}  RMSE {:.4}  R² {:.4}  ({} holdout rows)",
            c.mae, c.rmse, c.r2, c.n_holdout_rows
        );
        match &decision.incumbent {
            Some(i) => {
                let _ = writeln!(
                    body,
                    "Incumbent:  MAE {:.4}  RMSE {:.4}  R² {:.4}",
                    i.mae, i.rmse, i.r2
                );
            }
            None => {
                let _ = writeln!(body, "Incumbent:  none (first promotion)");
            }
        }
        if decision.verdict == Verdict::Reject {
            let _ = writeln!(body, "Prior model and reference dataset remain authoritative.");
        }
    }

    if let Some(error) = &run.error {
        let _ = writeln!(body);
        let _ = writeln!(
            body,
            "─── Failure ────────────────────────────────────────────────────"
        );
        let _ = writeln!(body, "Kind:    {}", error.kind);
        let _ = writeln!(body, "Detail:  {}", error.message);
    }

    let _ = writeln!(body);
    let _ = writeln!(
        body,
        "═══════════════════════════════════════════════════════════════"
    );

    (subject, body)
}
