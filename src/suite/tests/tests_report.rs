//! Assertion context and report bookkeeping.

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::StoreError;
    use crate::suite::{Assert, Collector, Sink, Summary, TracingSink};

    #[test]
    fn report_passes_when_plan_is_met() {
        let mut t = Assert::new("s", 2);
        t.ok(true, "a");
        t.not_ok(false, "b");
        let report = t.finish();
        assert!(report.passed());
        assert_eq!(report.failures().count(), 0);
    }

    #[test]
    fn short_plan_fails() {
        let mut t = Assert::new("s", 3);
        t.ok(true, "a");
        assert!(!t.finish().passed());
    }

    #[test]
    fn extra_assertions_fail() {
        let mut t = Assert::new("s", 1);
        t.ok(true, "a");
        t.ok(true, "b");
        assert!(!t.finish().passed());
    }

    #[test]
    fn unexpected_errors_fail_an_otherwise_clean_report() {
        let mut t = Assert::new("s", 1);
        t.ok(true, "a");
        t.unexpected("close", StoreError::Closed);
        let report = t.finish();
        assert!(!report.passed());
        assert_eq!(report.unexpected, vec!["close: handle is closed".to_string()]);
    }

    /// # Scenario
    /// `error` accepts `Ok` and records the message of an `Err`.
    #[test]
    fn error_records_failure_detail() {
        let mut t = Assert::new("s", 2);
        t.error(&Ok::<_, StoreError>(()), "fine");
        t.error(&Err::<(), _>(StoreError::NotFound("k".into())), "broken");
        let report = t.finish();

        let failures: Vec<_> = report.failures().collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].description, "broken");
        assert_eq!(failures[0].detail.as_deref(), Some("key not found: k"));
    }

    /// # Scenario
    /// Exact equality versus structural equality.
    ///
    /// # Expected behavior
    /// `is` accepts equal scalars but never containers; `deep_equal`
    /// accepts equal containers. Both fail on an error result.
    #[test]
    fn is_and_deep_equal_differ_on_containers() {
        let object = json!({ "test": true });
        let mut t = Assert::new("s", 5);
        t.is(&Ok(json!("value")), &json!("value"), "scalar is");
        t.is(&Ok(object.clone()), &object, "object is");
        t.deep_equal(&Ok(object.clone()), &object, "object deep");
        t.deep_equal(&Ok(json!("[object Object]")), &object, "text deep");
        t.is(&Err(StoreError::NotOpen), &json!("value"), "error is");

        let report = t.finish();
        let passed: Vec<bool> = report.outcomes.iter().map(|o| o.passed).collect();
        assert_eq!(passed, vec![true, false, true, false, false]);
    }

    #[test]
    fn outcome_display_reads_like_tap() {
        let mut t = Assert::new("s", 2);
        t.ok(true, "first");
        t.ok(false, "second");
        let report = t.finish();
        assert_eq!(report.outcomes[0].to_string(), "ok - first");
        assert_eq!(
            report.outcomes[1].to_string(),
            "not ok - second (expected true)"
        );
    }

    #[test]
    fn collector_and_summary_track_reports() {
        let mut passing = Assert::new("good", 1);
        passing.ok(true, "a");
        let passing = passing.finish();
        let failing = Assert::new("bad", 1).finish();

        let mut collector = Collector::default();
        let mut summary = Summary::default();
        for report in [&passing, &failing] {
            collector.report(report);
            TracingSink.report(report);
            summary.record(report);
        }

        assert_eq!(collector.reports().len(), 2);
        assert!(collector.get("good").unwrap().passed());
        assert!(!collector.get("bad").unwrap().passed());
        assert_eq!(summary.total(), 2);
        assert!(!summary.all_passed());
        assert_eq!(summary.failures, vec!["bad".to_string()]);
    }
}
