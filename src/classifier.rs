mod outline;
mod scanner;

pub use outline::{Outline, TypeDecl, TypeKind, outline};

use std::collections::HashSet;
use std::path::PathBuf;

use serde::Serialize;

use crate::error::{ClassificationError, GroupError};

/// Name of the class synthesized around bare statements
pub const SYNTHESIZED_CLASS_NAME: &str = "Main";

/// A classified snippet, ready to be materialized into a workspace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUnit {
    pub id: String,
    pub raw_text: String,
    /// Text written to disk: `raw_text` itself, or the synthesized wrapper
    pub source: String,
    pub declared_package: Option<String>,
    pub class_name: String,
    pub has_entry_point: bool,
    pub synthesized: bool,
}

impl SourceUnit {
    pub fn fully_qualified_name(&self) -> String {
        match &self.declared_package {
            Some(package) => format!("{package}.{}", self.class_name),
            None => self.class_name.clone(),
        }
    }

    /// Path of the source file relative to the workspace root
    pub fn relative_path(&self) -> PathBuf {
        let mut path = PathBuf::new();
        if let Some(package) = &self.declared_package {
            path.extend(package.split('.'));
        }
        path.push(format!("{}.java", self.class_name));
        path
    }
}

/// Classifies one snippet.
///
/// A snippet with exactly one public top-level type is used verbatim. One that
/// declares no type at all is treated as a sequence of statements and wrapped
/// in a synthesized `public class Main`; its leading package and import
/// declarations stay above the wrapper. Declared types are never rewritten,
/// even without a `main` or a `public` modifier.
pub fn classify(id: &str, raw_text: &str) -> Result<SourceUnit, ClassificationError> {
    if raw_text.trim().is_empty() {
        return Err(ClassificationError::EmptySource);
    }

    let outline = outline(raw_text);
    if outline.misplaced_package {
        return Err(ClassificationError::MisplacedPackage);
    }

    let public: Vec<&TypeDecl> = outline.public_types().collect();
    match public.as_slice() {
        [decl] => Ok(SourceUnit {
            id: id.to_string(),
            raw_text: raw_text.to_string(),
            source: raw_text.to_string(),
            declared_package: outline.package.clone(),
            class_name: decl.name.clone(),
            has_entry_point: decl.has_entry_point,
            synthesized: false,
        }),
        [] if outline.types.is_empty() => Ok(SourceUnit {
            id: id.to_string(),
            raw_text: raw_text.to_string(),
            source: synthesize_main(raw_text, outline.header_end),
            declared_package: outline.package.clone(),
            class_name: SYNTHESIZED_CLASS_NAME.to_string(),
            has_entry_point: true,
            synthesized: true,
        }),
        [] => Err(ClassificationError::NoPublicType(
            outline.types.iter().map(|t| t.name.clone()).collect(),
        )),
        _ => Err(ClassificationError::MultiplePublicTypes(
            public.iter().map(|t| t.name.clone()).collect(),
        )),
    }
}

fn synthesize_main(raw_text: &str, header_end: usize) -> String {
    let (header, body) = raw_text.split_at(header_end);
    let mut wrapped = String::with_capacity(raw_text.len() + 128);

    if !header.trim().is_empty() {
        wrapped.push_str(header.trim());
        wrapped.push_str("\n\n");
    }
    wrapped.push_str("public class Main {\n");
    wrapped.push_str("    public static void main(String[] args) throws Exception {\n");
    wrapped.push_str(body);
    wrapped.push_str("\n    }\n}\n");
    wrapped
}

/// The units of one execution, in compilation order, and the one to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRequest {
    pub units: Vec<SourceUnit>,
    pub entry_unit_id: String,
}

impl ExecutionRequest {
    /// Picks the last unit with an entry point as the one to run
    pub fn compose(units: Vec<SourceUnit>) -> Result<Self, GroupError> {
        if units.is_empty() {
            return Err(GroupError::EmptyGroup);
        }

        let mut seen = HashSet::with_capacity(units.len());
        if let Some(duplicate) = units
            .iter()
            .map(SourceUnit::fully_qualified_name)
            .find(|fqn| !seen.insert(fqn.clone()))
        {
            return Err(GroupError::DuplicateFullyQualifiedName(duplicate));
        }

        let entry_unit_id = units
            .iter()
            .rev()
            .find(|u| u.has_entry_point)
            .map(|u| u.id.clone())
            .ok_or(GroupError::NoEntryPoint)?;

        Ok(Self {
            units,
            entry_unit_id,
        })
    }

    pub fn entry_unit(&self) -> Option<&SourceUnit> {
        self.units.iter().find(|u| u.id == self.entry_unit_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub class_name: Option<String>,
    pub has_entry_point: bool,
    pub auto_wrap_applied: bool,
    pub errors: Vec<String>,
}

/// Runs the classifier alone, without compiling or running anything
pub fn validate(code: &str) -> ValidationReport {
    match classify("validate", code) {
        Ok(unit) => ValidationReport {
            valid: true,
            class_name: Some(unit.class_name),
            has_entry_point: unit.has_entry_point,
            auto_wrap_applied: unit.synthesized,
            errors: Vec::new(),
        },
        Err(e) => ValidationReport {
            valid: false,
            class_name: None,
            has_entry_point: false,
            auto_wrap_applied: false,
            errors: vec![e.to_string()],
        },
    }
}
