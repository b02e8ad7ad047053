//! Formatted terminal output: per-slice fit reports, result tables, run summary.
//!
//! Formatting lives here so the fitting code stays free of presentation.

use crate::domain::{EfficiencyResult, EfficiencySpec, FitFunction, FitSummary};
use crate::fit::SliceEvaluation;
use crate::sequence::SequenceReport;

/// Human-readable fit report for one slice: fit quality, parameters, yields, efficiency.
pub fn format_slice_report(spec: &EfficiencySpec, model: FitFunction, slice: &SliceEvaluation) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "--- {} = {} / {} | {} | slice {} [{:.3}, {:.3}) ---\n",
        spec.output,
        spec.numerator,
        spec.denominator,
        model,
        slice.index,
        slice.low,
        slice.high
    ));

    match &slice.outcome {
        Ok(fit) => {
            let v = &fit.value;
            out.push_str(&format_fit("denominator", &v.denominator_fit));
            out.push_str(&format_fit("numerator", &v.numerator_fit));
            out.push_str(&format!(
                "yields: num={:.1} den={:.1} | window=[{:.2}, {:.2}]\n",
                v.numerator_yield, v.denominator_yield, spec.bundle.signal_range_low, spec.bundle.signal_range_high
            ));
            out.push_str(&format!("efficiency: {:.4} ± {:.4}\n", v.efficiency, v.error));
        }
        Err(e) => {
            out.push_str(&format!("failed: {e}\n"));
        }
    }
    out
}

fn format_fit(role: &str, fit: &FitSummary) -> String {
    let mut out = format!(
        "{role:<12} chi2/ndf={:.2}/{} ({:.3}) iter={} peak={:.1}\n",
        fit.chi2,
        fit.ndf,
        fit.chi2_per_ndf(),
        fit.iterations,
        fit.peak_yield
    );
    for p in &fit.params {
        let err = match p.error {
            Some(e) => format!("± {e:.4}"),
            None => "± n/a".to_string(),
        };
        out.push_str(&format!("  {:<10} {:>12.4} {err}\n", p.name, p.value));
    }
    out
}

/// Table of one stored efficiency result.
pub fn format_result_table(result: &EfficiencyResult) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{} = {} / {} ({})\n",
        result.name, result.numerator, result.denominator, result.fit_function
    ));

    out.push_str(format!("{:>10} {:>10} {:>10} {:>10} {:<32}", "low", "high", "eff", "error", "note").trim_end());
    out.push('\n');
    out.push_str(format!("{:-<10} {:-<10} {:-<10} {:-<10} {:-<32}", "", "", "", "", "").trim_end());
    out.push('\n');

    for bin in &result.bins {
        let row = match (&bin.value, &bin.failure) {
            (Some(v), _) => format!(
                "{:>10.3} {:>10.3} {:>10.4} {:>10.4}",
                bin.low, bin.high, v.efficiency, v.error
            ),
            (None, failure) => format!(
                "{:>10.3} {:>10.3} {:>10} {:>10} {:<32}",
                bin.low,
                bin.high,
                "-",
                "-",
                truncate(failure.as_deref().unwrap_or("invalid"), 32)
            ),
        };
        out.push_str(row.trim_end());
        out.push('\n');
    }
    out
}

/// Summary of one sequence pass: each module and what it published.
pub fn format_run_summary(report: &SequenceReport) -> String {
    let mut out = String::new();
    out.push_str("=== tnp - tag-and-probe efficiency run ===\n");
    out.push_str(&format!(
        "Modules: {} run | {} ok | {} failed\n\n",
        report.outcomes.len(),
        report.succeeded(),
        report.failed()
    ));

    for outcome in &report.outcomes {
        match &outcome.result {
            Ok(summary) => {
                out.push_str(&format!(
                    "ok     {:<28} wrote [{}]\n",
                    outcome.label,
                    summary.written.join(", ")
                ));
                for (output, reason) in &summary.failed {
                    out.push_str(&format!("         skipped {output}: {reason}\n"));
                }
            }
            Err(e) => {
                out.push_str(&format!("FAILED {:<28} {e}\n", outcome.label));
            }
        }
    }
    out
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('.');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Axis, Histogram, ParameterBundle};
    use crate::error::TnpError;
    use crate::fit::{FitOptions, evaluate_efficiency};
    use crate::sequence::{ClientSummary, ModuleOutcome};

    fn spec() -> EfficiencySpec {
        EfficiencySpec {
            numerator: "TightIDElectrons".to_string(),
            denominator: "tracks".to_string(),
            output: "effTight".to_string(),
            bundle: ParameterBundle {
                mass_dimension: 1,
                ..ParameterBundle::default()
            },
        }
    }

    fn flat(entries: f64) -> Histogram {
        Histogram::from_contents(Axis::new(50, 65.0, 115.0).unwrap(), vec![entries / 50.0; 50]).unwrap()
    }

    #[test]
    fn slice_report_lists_parameters_and_efficiency() {
        let spec = spec();
        let eval = evaluate_efficiency(
            &spec,
            FitFunction::GaussianPlusLinear,
            &flat(750.0),
            &flat(1000.0),
            &FitOptions::default(),
        )
        .unwrap();
        let text = format_slice_report(&spec, eval.model, &eval.slices[0]);
        assert!(text.contains("effTight = TightIDElectrons / tracks"));
        assert!(text.contains("chi2/ndf="));
        assert!(text.contains("amplitude"));
        assert!(text.contains("efficiency: 0.7500"));
    }

    #[test]
    fn slice_report_shows_failure_reason() {
        let slice = SliceEvaluation {
            index: 2,
            low: 0.5,
            high: 1.5,
            outcome: Err(TnpError::DegenerateYield { yield_: 0.0 }),
        };
        let text = format_slice_report(&spec(), FitFunction::GaussianPlusLinear, &slice);
        assert!(text.contains("slice 2"));
        assert!(text.contains("failed:"));
    }

    #[test]
    fn run_summary_counts_modules() {
        let report = SequenceReport {
            outcomes: vec![
                ModuleOutcome {
                    label: "egHLTOffDQMClient".to_string(),
                    result: Err(TnpError::ModuleUnavailable("egHLTOffDQMClient".to_string())),
                },
                ModuleOutcome {
                    label: "dqmGenericTnPClientEG".to_string(),
                    result: Ok(ClientSummary {
                        written: vec!["effTight".to_string()],
                        failed: vec![("effLoose".to_string(), "missing".to_string())],
                    }),
                },
            ],
        };
        let text = format_run_summary(&report);
        assert!(text.contains("2 run | 1 ok | 1 failed"));
        assert!(text.contains("FAILED egHLTOffDQMClient"));
        assert!(text.contains("wrote [effTight]"));
        assert!(text.contains("skipped effLoose: missing"));
    }

    #[test]
    fn truncate_marks_cut_text() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghijkl", 5), "abcd.");
    }
}
