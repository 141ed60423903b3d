//! Project file classification: is this a test project, and what does it build?

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::EngineError;

/// Package identifiers whose presence in a dependency declaration marks a test project.
pub const TEST_FRAMEWORK_MARKERS: &[&str] = &["Microsoft.NET.Test.Sdk", "TestPlatform.TestFramework"];

/// Project type identifier of classic test projects.
pub const TEST_PROJECT_TYPE_GUID: &str = "3AC096D0-A1C2-E12C-1390-A8335801FDAB";

/// What one project file declares about itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectDescriptor {
    /// Path to the project file.
    pub file_path: PathBuf,
    /// Whether the project produces a test assembly.
    pub is_test_project: bool,
    /// Declared assembly name, or the project file stem.
    pub assembly_name: String,
}

impl ProjectDescriptor {
    /// Directory containing the project file.
    pub fn project_dir(&self) -> &Path {
        self.file_path.parent().unwrap_or_else(|| Path::new("."))
    }
}

#[derive(Debug, Default)]
struct Signals {
    assembly_name: Option<String>,
    test_dependency: bool,
    test_project_type: bool,
}

impl Signals {
    fn visit_element(&mut self, element: &BytesStart<'_>) -> Result<(), String> {
        for attribute in element.attributes() {
            let attribute = attribute.map_err(|e| e.to_string())?;
            if attribute.key.local_name().as_ref() == b"Include" {
                let include = attribute.unescape_value().map_err(|e| e.to_string())?;
                if references_test_framework(&include) {
                    self.test_dependency = true;
                }
            }
        }
        Ok(())
    }

    fn visit_text(&mut self, element: &[u8], text: &str) {
        match element {
            b"AssemblyName" => {
                let name = text.trim();
                if !name.is_empty() {
                    self.assembly_name = Some(name.to_owned());
                }
            }
            b"ProjectTypeGuids" => {
                if lists_test_project_type(text) {
                    self.test_project_type = true;
                }
            }
            _ => {}
        }
    }
}

/// Stream and classify the project file at `path`.
///
/// # Errors
/// Returns an error if the file cannot be read or is not well-formed XML.
pub fn classify(path: &Path) -> Result<ProjectDescriptor, EngineError> {
    let file = File::open(path).map_err(|source| EngineError::Io {
        path: path.display().to_string(),
        source,
    })?;
    classify_reader(path, BufReader::new(file))
}

/// Classify project file `content` that was read from `path`.
///
/// # Errors
/// Returns an error if `content` is not well-formed XML.
pub fn classify_str(path: &Path, content: &str) -> Result<ProjectDescriptor, EngineError> {
    classify_reader(path, content.as_bytes())
}

/// Classify a project file streamed from `source`, one event at a time.
///
/// Every element is visited: the assembly name may be declared before or
/// after the test markers.
///
/// # Errors
/// Returns an error if `source` cannot be read or is not well-formed XML.
pub fn classify_reader<R: BufRead>(
    path: &Path,
    mut source: R,
) -> Result<ProjectDescriptor, EngineError> {
    let malformed = |message: String| EngineError::ProjectFile {
        path: path.display().to_string(),
        message,
    };
    skip_byte_order_mark(&mut source).map_err(|source| EngineError::Io {
        path: path.display().to_string(),
        source,
    })?;

    let mut reader = Reader::from_reader(source);
    reader.config_mut().trim_text(true);

    let mut signals = Signals::default();
    let mut open: Vec<Vec<u8>> = Vec::new();
    let mut seen_root = false;
    let mut buf = Vec::new();
    loop {
        match reader
            .read_event_into(&mut buf)
            .map_err(|e| malformed(e.to_string()))?
        {
            Event::Start(element) => {
                seen_root = true;
                signals.visit_element(&element).map_err(malformed)?;
                open.push(element.local_name().as_ref().to_vec());
            }
            Event::Empty(element) => {
                seen_root = true;
                signals.visit_element(&element).map_err(malformed)?;
            }
            Event::Text(text) => {
                if let Some(element) = open.last() {
                    let text = text.unescape().map_err(|e| malformed(e.to_string()))?;
                    signals.visit_text(element, &text);
                }
            }
            Event::End(_) => {
                open.pop();
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if let Some(element) = open.last() {
        return Err(malformed(format!(
            "unexpected end of file inside <{}>",
            String::from_utf8_lossy(element)
        )));
    }
    if !seen_root {
        return Err(malformed("no root element".to_owned()));
    }

    let assembly_name = match signals.assembly_name {
        Some(name) => name,
        None => file_stem(path),
    };

    Ok(ProjectDescriptor {
        file_path: path.to_path_buf(),
        is_test_project: signals.test_dependency || signals.test_project_type,
        assembly_name,
    })
}

fn skip_byte_order_mark<R: BufRead>(source: &mut R) -> std::io::Result<()> {
    const BOM: &[u8] = b"\xEF\xBB\xBF";
    if source.fill_buf()?.starts_with(BOM) {
        source.consume(BOM.len());
    }
    Ok(())
}

fn references_test_framework(include: &str) -> bool {
    TEST_FRAMEWORK_MARKERS
        .iter()
        .any(|marker| include.contains(marker))
}

/// `ProjectTypeGuids` holds `{guid};{guid};...`.
fn lists_test_project_type(guids: &str) -> bool {
    guids
        .split(';')
        .map(|g| g.trim().trim_start_matches('{').trim_end_matches('}'))
        .any(|g| g.eq_ignore_ascii_case(TEST_PROJECT_TYPE_GUID))
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}
