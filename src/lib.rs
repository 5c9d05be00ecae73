pub mod build;
pub mod dependencies;
pub mod detect;
pub mod error;
pub mod instrument;
pub mod languages;
pub mod model;

pub use build::{BuildError, BuildOutcome, BuildRunner};
pub use dependencies::{Classpath, Dependency, DependencyResolver, MavenResolver, ProjectInfo, Scope};
pub use detect::{
    DetectionEvent, DetectionListener, Detector, DetectorCatalog, EntryLoggerListener, EventKind,
    ListenerHandle, MethodDetector,
};
pub use error::{InjectorError, Result};
pub use instrument::config::ConfigError;
pub use instrument::{
    Configuration, ConfigurationBuilder, IdMap, Injection, InstrumentReport, Instrumenter,
    InstrumenterOptions,
};
pub use languages::LanguageRegistry;
pub use model::{
    ClasspathIndex, ClasspathMode, CompilationUnit, ModelBuilder, SourceModel, SourceUnit,
    TreeSitterModelBuilder, UnitEdits,
};
