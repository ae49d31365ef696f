use std::fmt::Write as _;

use nsx_core::ExportOutcome;

/// Overall batch verdict for the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    Success,
    PartialFailure,
    TotalFailure,
}

pub fn classify(outcomes: &[ExportOutcome]) -> BatchStatus {
    let succeeded = outcomes.iter().filter(|o| o.succeeded()).count();
    if succeeded == outcomes.len() {
        BatchStatus::Success
    } else if succeeded > 0 {
        BatchStatus::PartialFailure
    } else {
        BatchStatus::TotalFailure
    }
}

/// Human-readable per-report summary.
pub fn render(outcomes: &[ExportOutcome]) -> String {
    let succeeded = outcomes.iter().filter(|o| o.succeeded()).count();
    let mut out = format!("exported {succeeded}/{} reports\n", outcomes.len());
    for outcome in outcomes {
        match (&outcome.file, &outcome.error) {
            (Some(file), _) => {
                let _ = writeln!(out, "  ok   {} -> {}", outcome.url, file.display());
            }
            (None, Some(error)) => {
                let _ = writeln!(out, "  fail {} ({error})", outcome.url);
            }
            (None, None) => {
                let _ = writeln!(out, "  fail {}", outcome.url);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use nsx_core::TargetKind;

    use super::*;

    fn outcome(url: &str, file: Option<&str>) -> ExportOutcome {
        ExportOutcome {
            url: url.to_string(),
            kind: TargetKind::SavedSearch,
            file: file.map(PathBuf::from),
            error: if file.is_none() {
                Some("no export control produced a download".to_string())
            } else {
                None
            },
        }
    }

    #[test]
    fn classify_covers_all_verdicts() {
        assert_eq!(classify(&[]), BatchStatus::Success);
        assert_eq!(
            classify(&[outcome("a", Some("a.csv")), outcome("b", Some("b.csv"))]),
            BatchStatus::Success
        );
        assert_eq!(
            classify(&[outcome("a", Some("a.csv")), outcome("b", None)]),
            BatchStatus::PartialFailure
        );
        assert_eq!(classify(&[outcome("a", None)]), BatchStatus::TotalFailure);
    }

    #[test]
    fn render_lists_every_report() {
        let text = render(&[outcome("https://x/search", Some("a.csv")), outcome("https://x/report", None)]);
        assert!(text.starts_with("exported 1/2 reports"));
        assert!(text.contains("ok   https://x/search -> a.csv"));
        assert!(text.contains("fail https://x/report"));
    }
}
