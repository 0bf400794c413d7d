//! Verify command implementation.

use super::CliResult;
use serde_json::Value;
use shadowdb_core::{IntegrityReport, IntegrityStatus, ShadowContext};

/// Checks each type, optionally repairing drifted entities.
///
/// Fails when drift remains after the run.
pub fn run(ctx: &ShadowContext, types: &[String], sample: usize, repair: bool) -> CliResult<Vec<IntegrityReport>> {
    let checker = ctx.integrity();
    let mut reports = Vec::with_capacity(types.len());
    let mut drifted = false;

    for entity_type in types {
        let report = checker.check(entity_type, sample)?;
        print_report(entity_type, &report);

        if report.status == IntegrityStatus::IssuesFound {
            if repair {
                for id in report.issues.keys() {
                    checker.repair_entity(*id, entity_type)?;
                    println!("    repaired {id}");
                }
                drifted |= report.issues.len() < report.issues_count;
            } else {
                drifted = true;
            }
        }
        reports.push(report);
    }

    println!();
    if drifted {
        println!("✗ Verification failed");
        Err("Verification failed".into())
    } else {
        println!("✓ Verification passed");
        Ok(reports)
    }
}

fn print_report(entity_type: &str, report: &IntegrityReport) {
    match report.status {
        IntegrityStatus::NoTable => println!("  {entity_type}: shadow table does not exist"),
        IntegrityStatus::Empty => println!("  {entity_type}: shadow table is empty"),
        IntegrityStatus::Ok => println!("  {entity_type}: {} checked, no issues", report.checked),
        IntegrityStatus::IssuesFound => {
            println!(
                "  {entity_type}: {} checked, {} with issues",
                report.checked, report.issues_count
            );
            for (id, mismatches) in &report.issues {
                for (key, mismatch) in mismatches {
                    println!(
                        "    {id} {key}: shadow={} source={}",
                        compact(&mismatch.shadow),
                        compact(&mismatch.source)
                    );
                }
            }
        }
    }
}

fn compact(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_default()
}
