//! Streaming parser for Robot Framework `output.xml`.
//!
//! Handles the result shapes written by Robot Framework 3 through 7:
//!
//! - test tags as `<tags><tag>` (RF 3) or bare `<tag>` children (RF 4+)
//! - suite metadata as `<metadata><item>` (RF 3) or `<meta>` (RF 4+)
//! - status times as `starttime`/`endtime` (RF < 7) or `start`/`elapsed` (RF 7)
//!
//! Keyword-level `<tag>`, `<doc>` and `<status>` elements are ignored; only
//! direct children of `<test>` and `<suite>` contribute to the run.

use std::path::{Path, PathBuf};

use chrono::{Duration, NaiveDateTime};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use rqm_import_core::{LogSource, Metadata, Run, TestCase, TestStatus};

use crate::error::{LogError, Result};

const LEGACY_FORMAT: &str = "%Y%m%d %H:%M:%S%.f";
const ISO_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";
const ISO_SPACE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Parse one result file into a run.
pub fn parse_file(path: &Path) -> Result<Run> {
    parse_files(&[path.to_path_buf()])
}

/// Parse several result files and combine them into one run.
///
/// Multiple files are placed under a synthetic root suite in the given order,
/// so run-level metadata comes from the first file.
pub fn parse_files(paths: &[PathBuf]) -> Result<Run> {
    let mut roots = Vec::with_capacity(paths.len());
    let mut sources = Vec::with_capacity(paths.len());

    for path in paths {
        let data = std::fs::read(path).map_err(|e| LogError::io(path, e))?;
        let root = parse_document(path, &data)?;
        tracing::debug!(file = %path.display(), suite = %root.name, "parsed result file");
        roots.push(root);
        sources.push(LogSource::from_bytes(path.display().to_string(), &data));
    }

    let root = match roots.len() {
        0 => return Err(LogError::NoResultFiles(PathBuf::new())),
        1 => roots.remove(0),
        _ => SuiteNode {
            name: roots
                .iter()
                .map(|s| s.name.as_str())
                .collect::<Vec<_>>()
                .join(" & "),
            suites: roots,
            ..SuiteNode::default()
        },
    };

    let run = build_run(root).with_sources(sources);
    tracing::info!(files = paths.len(), tests = run.tests.len(), "loaded test run");
    Ok(run)
}

// ---------------------------------------------------------------------------
// Suite tree
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct SuiteNode {
    name: String,
    /// Metadata declared on this suite only.
    metadata: Metadata,
    tests: Vec<TestCase>,
    suites: Vec<SuiteNode>,
}

fn build_run(root: SuiteNode) -> Run {
    let metadata = run_metadata(&root, Metadata::defaults());
    let mut tests = Vec::new();
    collect_tests(root, &Metadata::new(), &mut tests);
    Run::new(metadata, tests)
}

/// Defaults, then the first child chain, then the suite itself: outer suites win.
fn run_metadata(suite: &SuiteNode, base: Metadata) -> Metadata {
    let base = match suite.suites.first() {
        Some(first) => run_metadata(first, base),
        None => base,
    };
    base.overlay(&suite.metadata)
}

fn collect_tests(suite: SuiteNode, inherited: &Metadata, out: &mut Vec<TestCase>) {
    let effective = suite.metadata.inherit_from(inherited);
    for mut test in suite.tests {
        test.metadata = effective.clone();
        out.push(test);
    }
    for child in suite.suites {
        collect_tests(child, &effective, out);
    }
}

// ---------------------------------------------------------------------------
// Event handling
// ---------------------------------------------------------------------------

enum Capture {
    TestTag,
    TestDoc,
    TestMessage,
    Meta(String),
}

struct DocumentParser<'a> {
    path: &'a Path,
    elements: Vec<Vec<u8>>,
    suites: Vec<SuiteNode>,
    test: Option<TestCase>,
    /// Element text being collected and the stack depth it was opened at.
    capture: Option<(Capture, usize, String)>,
    roots: Vec<SuiteNode>,
}

fn parse_document(path: &Path, data: &[u8]) -> Result<SuiteNode> {
    let mut reader = Reader::from_reader(data);
    reader.config_mut().trim_text(true);

    let mut parser = DocumentParser {
        path,
        elements: Vec::new(),
        suites: Vec::new(),
        test: None,
        capture: None,
        roots: Vec::new(),
    };
    let xml_error = |source| LogError::Xml {
        path: path.to_path_buf(),
        source,
    };

    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf).map_err(xml_error)? {
            Event::Start(e) => {
                parser.open(&e)?;
                parser.elements.push(e.local_name().as_ref().to_vec());
            }
            Event::Empty(e) => {
                parser.open(&e)?;
                parser.close(e.local_name().as_ref());
            }
            Event::End(_) => {
                if let Some(name) = parser.elements.pop() {
                    parser.close(&name);
                }
            }
            Event::Text(e) => {
                if parser.capture.is_some() {
                    let text = e.unescape().map_err(xml_error)?;
                    parser.push_text(&text);
                }
            }
            Event::CData(e) => {
                if parser.capture.is_some() {
                    let raw = e.into_inner();
                    parser.push_text(&String::from_utf8_lossy(&raw));
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    let mut roots = parser.roots;
    match roots.len() {
        0 => Err(LogError::Empty(path.to_path_buf())),
        1 => Ok(roots.remove(0)),
        _ => Ok(SuiteNode {
            name: path.display().to_string(),
            suites: roots,
            ..SuiteNode::default()
        }),
    }
}

impl DocumentParser<'_> {
    fn open(&mut self, e: &BytesStart<'_>) -> Result<()> {
        let depth = self.elements.len();
        let parent = self.elements.last().cloned();
        let grandparent = depth
            .checked_sub(2)
            .and_then(|i| self.elements.get(i))
            .cloned();
        let local = e.local_name();

        match (local.as_ref(), parent.as_deref(), grandparent.as_deref()) {
            (b"suite", None | Some(b"robot") | Some(b"suite"), _) => {
                let name = self.attr(e, b"name")?.unwrap_or_default();
                self.suites.push(SuiteNode {
                    name,
                    ..SuiteNode::default()
                });
            }
            (b"test", Some(b"suite"), _) => {
                let name = self.attr(e, b"name")?.unwrap_or_default();
                self.test = Some(TestCase::new(name, TestStatus::Unknown));
            }
            (b"tag", Some(b"test"), _) | (b"tag", Some(b"tags"), Some(b"test")) => {
                self.begin(Capture::TestTag, depth)
            }
            (b"doc", Some(b"test"), _) => self.begin(Capture::TestDoc, depth),
            (b"status", Some(b"test"), _) => {
                self.apply_status(e)?;
                self.begin(Capture::TestMessage, depth);
            }
            (b"meta", Some(b"suite"), _) | (b"item", Some(b"metadata"), Some(b"suite")) => {
                let key = self.attr(e, b"name")?.unwrap_or_default();
                self.begin(Capture::Meta(key), depth);
            }
            _ => {}
        }
        Ok(())
    }

    /// Called once an element is fully read; `elements` no longer holds it.
    fn close(&mut self, name: &[u8]) {
        let depth = self.elements.len();
        if matches!(&self.capture, Some((_, d, _)) if *d == depth) {
            if let Some((capture, _, text)) = self.capture.take() {
                self.finish(capture, text);
            }
            return;
        }

        let parent = self.elements.last().map(Vec::as_slice);
        match name {
            b"suite" if matches!(parent, None | Some(b"robot") | Some(b"suite")) => {
                if let Some(done) = self.suites.pop() {
                    match self.suites.last_mut() {
                        Some(parent) => parent.suites.push(done),
                        None => self.roots.push(done),
                    }
                }
            }
            b"test" if parent == Some(&b"suite"[..]) => {
                if let (Some(mut test), Some(suite)) = (self.test.take(), self.suites.last_mut()) {
                    test.suite = suite.name.clone();
                    suite.tests.push(test);
                }
            }
            _ => {}
        }
    }

    fn begin(&mut self, capture: Capture, depth: usize) {
        self.capture = Some((capture, depth, String::new()));
    }

    fn push_text(&mut self, text: &str) {
        if let Some((_, _, buf)) = self.capture.as_mut() {
            buf.push_str(text);
        }
    }

    fn finish(&mut self, capture: Capture, text: String) {
        match capture {
            Capture::TestTag => {
                if let Some(test) = self.test.as_mut() {
                    if !text.is_empty() {
                        test.tags.push(text);
                    }
                }
            }
            Capture::TestDoc => {
                if let Some(test) = self.test.as_mut() {
                    test.documentation = text;
                }
            }
            Capture::TestMessage => {
                if let Some(test) = self.test.as_mut() {
                    test.message = text;
                }
            }
            Capture::Meta(key) => {
                if let Some(suite) = self.suites.last_mut() {
                    if !key.is_empty() {
                        suite.metadata.insert(&key, text);
                    }
                }
            }
        }
    }

    fn apply_status(&mut self, e: &BytesStart<'_>) -> Result<()> {
        let status = self.attr(e, b"status")?.unwrap_or_default();
        let (start, end) = self.status_times(e)?;
        if let Some(test) = self.test.as_mut() {
            test.status = TestStatus::from_runner(&status);
            test.start_time = start;
            test.end_time = end;
        }
        Ok(())
    }

    fn status_times(
        &self,
        e: &BytesStart<'_>,
    ) -> Result<(Option<NaiveDateTime>, Option<NaiveDateTime>)> {
        if let Some(start) = self.attr(e, b"start")? {
            let start = parse_timestamp(self.path, &start)?;
            let end = match (start, self.attr(e, b"elapsed")?) {
                (Some(start), Some(elapsed)) => {
                    let end = start
                        .checked_add_signed(parse_elapsed(self.path, &elapsed)?)
                        .ok_or_else(|| invalid_timestamp(self.path, &elapsed))?;
                    Some(end)
                }
                _ => None,
            };
            return Ok((start, end));
        }

        let start = match self.attr(e, b"starttime")? {
            Some(v) => parse_timestamp(self.path, &v)?,
            None => None,
        };
        let end = match self.attr(e, b"endtime")? {
            Some(v) => parse_timestamp(self.path, &v)?,
            None => None,
        };
        Ok((start, end))
    }

    fn attr(&self, e: &BytesStart<'_>, name: &[u8]) -> Result<Option<String>> {
        for attr in e.attributes().flatten() {
            if attr.key.local_name().as_ref() == name {
                let value = attr.unescape_value().map_err(|source| LogError::Xml {
                    path: self.path.to_path_buf(),
                    source,
                })?;
                return Ok(Some(value.into_owned()));
            }
        }
        Ok(None)
    }
}

/// Runner timestamp; `N/A` and blank mean "not recorded".
fn parse_timestamp(path: &Path, value: &str) -> Result<Option<NaiveDateTime>> {
    let value = value.trim();
    if value.is_empty() || value.eq_ignore_ascii_case("N/A") {
        return Ok(None);
    }
    [LEGACY_FORMAT, ISO_FORMAT, ISO_SPACE_FORMAT]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(Some)
        .ok_or_else(|| invalid_timestamp(path, value))
}

/// RF 7 `elapsed` attribute: seconds with a fractional part.
fn parse_elapsed(path: &Path, value: &str) -> Result<Duration> {
    let secs: f64 = value
        .trim()
        .parse()
        .map_err(|_| invalid_timestamp(path, value))?;
    let millis = (secs * 1000.0).round();
    if !millis.is_finite() || millis < 0.0 || millis >= i64::MAX as f64 {
        return Err(invalid_timestamp(path, value));
    }
    Duration::try_milliseconds(millis as i64).ok_or_else(|| invalid_timestamp(path, value))
}

fn invalid_timestamp(path: &Path, value: &str) -> LogError {
    LogError::InvalidTimestamp {
        path: path.to_path_buf(),
        value: value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rqm_import_core::keys;

    fn parse(xml: &str) -> Result<Run> {
        parse_document(Path::new("inline.xml"), xml.as_bytes()).map(build_run)
    }

    const RF3: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<robot generator="Robot 3.2.2 (Python 3.8.10 on linux)" generated="20230108 10:00:00.000">
<suite id="s1" name="Suite">
<test id="s1-t1" name="Login">
<kw name="Log" library="BuiltIn">
<doc>Logs the given message.</doc>
<arguments><arg>hi</arg></arguments>
<status status="PASS" starttime="20230108 10:00:00.100" endtime="20230108 10:00:00.200"></status>
</kw>
<doc>Checks login</doc>
<tags>
<tag>tcid-1001</tag>
<tag>fid-77</tag>
</tags>
<status status="PASS" starttime="20230108 10:00:00.000" endtime="20230108 10:00:02.000" critical="yes"></status>
</test>
<metadata>
<item name="version_sw">SW_1.0</item>
</metadata>
<status status="PASS" starttime="20230108 10:00:00.000" endtime="20230108 10:00:02.000"></status>
</suite>
</robot>"#;

    const RF7: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<robot generator="Robot 7.0 (Python 3.11.4 on linux)" generated="2024-01-08T10:00:00.000000" rpa="false" schemaversion="5">
<suite id="s1" name="Smoke" source="/tmp/smoke.robot">
<test id="s1-t1" name="Logout" line="4">
<kw name="Fail" owner="BuiltIn">
<msg time="2024-01-08T10:00:00.100000" level="FAIL">boom</msg>
<arg>boom</arg>
<tag>robot:flatten</tag>
<status status="FAIL" start="2024-01-08T10:00:00.100000" elapsed="0.001"/>
</kw>
<tag>tcid-1002</tag>
<status status="FAIL" start="2024-01-08T10:00:00.000000" elapsed="1.500">boom &amp; bust</status>
</test>
<meta name="project">ROBFW</meta>
<status status="FAIL" start="2024-01-08T10:00:00.000000" elapsed="1.600"/>
</suite>
<statistics>
<tag>
<stat pass="0" fail="1" skip="0">tcid-1002</stat>
</tag>
<suite>
<stat pass="0" fail="1" skip="0" id="s1" name="Smoke">Smoke</stat>
</suite>
</statistics>
<errors/>
</robot>"#;

    #[test]
    fn test_rf3_shape() {
        let run = parse(RF3).unwrap();
        assert_eq!(run.tests.len(), 1);

        let test = &run.tests[0];
        assert_eq!(test.name, "Login");
        assert_eq!(test.suite, "Suite");
        assert_eq!(test.documentation, "Checks login");
        assert_eq!(test.tags, vec!["tcid-1001", "fid-77"]);
        assert_eq!(test.status, TestStatus::Passed);
        assert_eq!(test.message, "");
        assert_eq!(test.duration_ms(), Some(2000));
        assert_eq!(run.version_sw(), Some("SW_1.0"));
    }

    #[test]
    fn test_rf7_shape_ignores_keyword_elements() {
        let run = parse(RF7).unwrap();
        let test = &run.tests[0];
        assert_eq!(test.tags, vec!["tcid-1002"]);
        assert_eq!(test.status, TestStatus::Failed);
        assert_eq!(test.message, "boom & bust");
        assert_eq!(test.documentation, "");
        assert_eq!(test.duration_ms(), Some(1500));
        assert_eq!(run.project(), Some("ROBFW"));
    }

    #[test]
    fn test_metadata_resolution_across_suite_levels() {
        let xml = r#"<robot>
<suite name="Top">
  <suite name="A">
    <suite name="A1">
      <test name="t1"><status status="PASS"/></test>
      <meta name="version_sw">SW_deep</meta>
      <meta name="machine">rig-1</meta>
    </suite>
    <meta name="version_sw">SW_A</meta>
    <meta name="component">login</meta>
  </suite>
  <suite name="B">
    <test name="t2"><status status="SKIP"/></test>
    <meta name="tester">alice</meta>
  </suite>
  <meta name="project">PRJ</meta>
</suite>
</robot>"#;
        let run = parse(xml).unwrap();

        assert_eq!(run.metadata.get(keys::PROJECT), Some("PRJ"));
        assert_eq!(run.metadata.get(keys::VERSION_SW), Some("SW_A"));
        assert_eq!(run.metadata.get(keys::MACHINE), Some("rig-1"));
        assert_eq!(run.metadata.get(keys::COMPONENT), Some("login"));
        assert_eq!(run.metadata.get(keys::TESTER), Some(""));

        let t1 = &run.tests[0];
        assert_eq!(t1.suite, "A1");
        assert_eq!(t1.metadata.get(keys::VERSION_SW), Some("SW_deep"));
        assert_eq!(t1.metadata.get(keys::COMPONENT), Some("login"));
        assert_eq!(t1.metadata.get(keys::PROJECT), Some("PRJ"));

        let t2 = &run.tests[1];
        assert_eq!(t2.status, TestStatus::Unknown);
        assert_eq!(t2.metadata.get(keys::TESTER), Some("alice"));
        assert!(!t2.metadata.contains_key(keys::VERSION_SW));
        assert_eq!(t2.start_time, None);
    }

    #[test]
    fn test_defaults_without_metadata() {
        let run = parse(r#"<robot><suite name="S"><test name="t"/></suite></robot>"#).unwrap();
        assert_eq!(run.project(), Some("ROBFW"));
        assert_eq!(run.metadata.get(keys::COMPONENT), Some("unknown"));
        assert_eq!(run.version_sw(), None);
        assert_eq!(run.tests[0].status, TestStatus::Unknown);
    }

    #[test]
    fn test_not_available_times_are_none() {
        let xml = r#"<robot><suite name="S"><test name="t">
<status status="NOT RUN" starttime="N/A" endtime="N/A"/></test></suite></robot>"#;
        let run = parse(xml).unwrap();
        assert_eq!(run.tests[0].start_time, None);
        assert_eq!(run.tests[0].duration_ms(), None);
    }

    #[test]
    fn test_invalid_timestamp_is_reported() {
        let xml = r#"<robot><suite name="S"><test name="t">
<status status="PASS" starttime="yesterday" endtime="today"/></test></suite></robot>"#;
        let err = parse(xml).unwrap_err();
        assert!(matches!(err, LogError::InvalidTimestamp { ref value, .. } if value == "yesterday"));
    }

    #[test]
    fn test_document_without_suite_is_empty() {
        assert!(matches!(parse("<robot></robot>"), Err(LogError::Empty(_))));
    }

    #[test]
    fn test_mismatched_tags_are_xml_errors() {
        let err = parse(r#"<robot><suite name="x"></robot>"#).unwrap_err();
        assert!(matches!(err, LogError::Xml { .. }));
    }

    #[test]
    fn test_elapsed_must_be_non_negative() {
        assert!(parse_elapsed(Path::new("x"), "-1").is_err());
        assert_eq!(
            parse_elapsed(Path::new("x"), "0.25").unwrap(),
            Duration::milliseconds(250)
        );
    }

    #[test]
    fn test_huge_elapsed_is_invalid_timestamp() {
        assert!(parse_elapsed(Path::new("x"), "1e16").is_err());

        for elapsed in ["1e16", "1e14"] {
            let xml = format!(
                r#"<robot><suite name="S"><test name="t">
<status status="PASS" start="2024-01-08T10:00:00.000000" elapsed="{elapsed}"/></test></suite></robot>"#
            );
            let err = parse(&xml).unwrap_err();
            assert!(
                matches!(err, LogError::InvalidTimestamp { ref value, .. } if value == elapsed),
                "{elapsed}: {err:?}"
            );
        }
    }
}
