use thiserror::Error;

/// Why a snippet could not be turned into a [`SourceUnit`](crate::classifier::SourceUnit)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassificationError {
    #[error("empty source")]
    EmptySource,

    /// Carries the names of every public top-level type that was found
    #[error("multiple public types")]
    MultiplePublicTypes(Vec<String>),

    /// Types were declared but none is public; carries their names
    #[error("no public type among declared types: {}", .0.join(", "))]
    NoPublicType(Vec<String>),

    #[error("package declaration must be the first statement")]
    MisplacedPackage,
}

/// Errors composing, materializing or scheduling a multi-unit request,
/// plus the registry operations that maintain groups
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GroupError {
    #[error("duplicate fully qualified name: {0}")]
    DuplicateFullyQualifiedName(String),

    #[error("group has no cells to execute")]
    EmptyGroup,

    #[error("no entry point: no unit declares `public static void main(String[])`")]
    NoEntryPoint,

    #[error("cells {cell_a} and {cell_b} already belong to different groups")]
    AlreadyInDifferentGroup { cell_a: String, cell_b: String },

    #[error("cannot connect cell {0} to itself")]
    SameCell(String),

    #[error("cell {0} is not in a group")]
    NotGrouped(String),

    #[error("group {0} not found")]
    UnknownGroup(String),

    #[error("no source supplied for cell {0}")]
    MissingCellSource(String),

    #[error("group {0} is already executing")]
    GroupBusy(String),
}

/// Anything that stops a request before it produces a compiler or runtime outcome
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("cell {cell}: {source}")]
    Classification {
        cell: String,
        #[source]
        source: ClassificationError,
    },

    #[error(transparent)]
    Group(#[from] GroupError),

    #[error("workspace: {0}")]
    Workspace(#[from] std::io::Error),

    #[error("failed to launch {program}: {reason}")]
    Launch { program: String, reason: String },
}

impl EngineError {
    /// Label of the error record this error is rendered as
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Classification { .. } => "ClassificationError",
            Self::Group(_) => "GroupError",
            Self::Workspace(_) | Self::Launch { .. } => "SystemError",
        }
    }
}
