//! Test report parsing and log synthesis.
//!
//! Reports are XML documents of `<test>` elements with `name`, `result`
//! and `duration` attributes and an optional nested
//! `<failure><message>/<stack-trace>` pair. A malformed document is not
//! fatal: the job still completes, with zero counts.

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::models::test_result::TestStatus;

#[derive(Debug, Clone)]
pub struct ParsedTest {
    pub name: String,
    pub status: TestStatus,
    pub duration_seconds: f64,
    pub error_message: Option<String>,
    pub stack_trace: Option<String>,
}

#[derive(Debug, Default)]
pub struct ParsedReport {
    pub tests: Vec<ParsedTest>,
}

impl ParsedReport {
    pub fn passed(&self) -> i32 {
        self.count(TestStatus::Passed)
    }

    pub fn failed(&self) -> i32 {
        self.count(TestStatus::Failed)
    }

    pub fn skipped(&self) -> i32 {
        self.count(TestStatus::Skipped)
    }

    pub fn unknown(&self) -> i32 {
        self.count(TestStatus::Unknown)
    }

    fn count(&self, status: TestStatus) -> i32 {
        self.tests.iter().filter(|t| t.status == status).count() as i32
    }
}

#[derive(Clone, Copy, PartialEq)]
enum FailureField {
    Message,
    StackTrace,
}

fn test_from_attributes(e: &quick_xml::events::BytesStart<'_>) -> ParsedTest {
    let mut test = ParsedTest {
        name: String::new(),
        status: TestStatus::Unknown,
        duration_seconds: 0.0,
        error_message: None,
        stack_trace: None,
    };
    for attr in e.attributes().flatten() {
        let value = match attr.unescape_value() {
            Ok(v) => v.into_owned(),
            Err(_) => continue,
        };
        match attr.key.as_ref() {
            b"name" => test.name = value,
            b"result" => test.status = TestStatus::normalize(&value),
            b"duration" => test.duration_seconds = value.parse().unwrap_or(0.0),
            _ => {}
        }
    }
    test
}

/// Parse a test report. Never fails: a document that cannot be parsed
/// yields an empty report and a logged warning.
pub fn parse_test_results(xml: &str) -> ParsedReport {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut report = ParsedReport::default();
    let mut current: Option<ParsedTest> = None;
    let mut in_failure = false;
    let mut capture: Option<FailureField> = None;

    loop {
        match reader.read_event() {
            // Self-closing <test .../> has no matching end event.
            Ok(Event::Empty(e)) => {
                if e.name().as_ref() == b"test" {
                    report.tests.push(test_from_attributes(&e));
                }
            }
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"test" => current = Some(test_from_attributes(&e)),
                b"failure" if current.is_some() => in_failure = true,
                b"message" if in_failure => capture = Some(FailureField::Message),
                b"stack-trace" if in_failure => capture = Some(FailureField::StackTrace),
                _ => {}
            },
            Ok(Event::Text(t)) => {
                if let (Some(test), Some(field)) = (current.as_mut(), capture) {
                    if let Ok(text) = t.unescape() {
                        let slot = match field {
                            FailureField::Message => &mut test.error_message,
                            FailureField::StackTrace => &mut test.stack_trace,
                        };
                        match slot {
                            Some(existing) => existing.push_str(&text),
                            None => *slot = Some(text.into_owned()),
                        }
                    }
                }
            }
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"test" => {
                    if let Some(test) = current.take() {
                        report.tests.push(test);
                    }
                }
                b"failure" => in_failure = false,
                b"message" | b"stack-trace" => capture = None,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("Test report XML parse failed: {e}");
                return ParsedReport::default();
            }
        }
    }

    report
}

/// Synthesize the human-readable companion log stored next to the raw
/// report: summary header, then one block per test.
pub fn synthesize_full_log(
    job_id: &uuid::Uuid,
    status: &str,
    report: &ParsedReport,
) -> String {
    let mut out = String::new();
    out.push_str(&format!("Test execution report for job {job_id}\n"));
    out.push_str(&format!("Status: {status}\n"));
    out.push_str(&format!(
        "Totals: {} passed, {} failed, {} skipped\n\n",
        report.passed(),
        report.failed(),
        report.skipped()
    ));

    for test in &report.tests {
        out.push_str(&format!(
            "[{}] {} ({:.3}s)\n",
            test.status.as_str(),
            test.name,
            test.duration_seconds
        ));
        if let Some(message) = &test.error_message {
            out.push_str(&format!("  message: {message}\n"));
        }
        if let Some(trace) = &test.stack_trace {
            for line in trace.lines() {
                out.push_str(&format!("  {line}\n"));
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "<tests>\
        <test name='t1' result='Passed' duration='0.5'/>\
        <test name='t2' result='Failed' duration='1.2'>\
            <failure><message>boom</message><stack-trace>at Foo.Bar()</stack-trace></failure>\
        </test>\
        <test name='t3' result='Skipped' duration='0'/>\
    </tests>";

    #[test]
    fn parses_results_and_counts() {
        let report = parse_test_results(SAMPLE);
        assert_eq!(report.tests.len(), 3);
        assert_eq!(report.passed(), 1);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.skipped(), 1);

        let failed = &report.tests[1];
        assert_eq!(failed.name, "t2");
        assert_eq!(failed.status, TestStatus::Failed);
        assert_eq!(failed.duration_seconds, 1.2);
        assert_eq!(failed.error_message.as_deref(), Some("boom"));
        assert_eq!(failed.stack_trace.as_deref(), Some("at Foo.Bar()"));
    }

    #[test]
    fn malformed_xml_yields_empty_report() {
        let report = parse_test_results("<not xml");
        assert!(report.tests.is_empty());
        assert_eq!(report.passed(), 0);
        assert_eq!(report.failed(), 0);
        assert_eq!(report.skipped(), 0);
    }

    #[test]
    fn unknown_results_and_bad_durations_are_tolerated() {
        let xml = "<tests><test name='t1' result='flaky' duration='soon'/></tests>";
        let report = parse_test_results(xml);
        assert_eq!(report.tests.len(), 1);
        assert_eq!(report.tests[0].status, TestStatus::Unknown);
        assert_eq!(report.tests[0].duration_seconds, 0.0);
    }

    #[test]
    fn result_matching_is_case_insensitive() {
        let xml = "<tests>\
            <test name='a' result='PASS' duration='1'/>\
            <test name='b' result='ignored' duration='1'/>\
        </tests>";
        let report = parse_test_results(xml);
        assert_eq!(report.passed(), 1);
        assert_eq!(report.skipped(), 1);
    }

    #[test]
    fn empty_document_has_zero_counts() {
        let report = parse_test_results("<tests></tests>");
        assert!(report.tests.is_empty());
    }

    #[test]
    fn full_log_contains_header_and_blocks() {
        let report = parse_test_results(SAMPLE);
        let job_id = uuid::Uuid::new_v4();
        let log = synthesize_full_log(&job_id, "Succeeded", &report);

        assert!(log.contains(&job_id.to_string()));
        assert!(log.contains("1 passed, 1 failed, 1 skipped"));
        assert!(log.contains("[Failed] t2"));
        assert!(log.contains("message: boom"));
    }
}
