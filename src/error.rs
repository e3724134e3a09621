use thiserror::Error;

/// Errors raised while validating runtime configuration
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// A numeric setting was zero or out of its allowed range
    #[error("Invalid value for {field}: {message}")]
    InvalidValue {
        field: &'static str,
        message: String,
    },

    /// A configuration file could not be parsed
    #[error("Failed to parse configuration: {0}")]
    Parse(String),
}

/// Errors in tiling geometry
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    /// The data-to-scene transform has no inverse
    #[error("Transform is not invertible (determinant {determinant})")]
    NonInvertibleTransform { determinant: f64 },

    /// Tiles must have a positive edge length
    #[error("Block size must be greater than 0")]
    ZeroBlockSize,
}

/// Errors in constructing a slice projection
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProjectionError {
    /// An axis index is outside the data dimensionality
    #[error("Axis {axis} is out of range for {ndim}-dimensional data")]
    AxisOutOfRange { axis: usize, ndim: usize },

    /// An axis appears more than once across abscissa, ordinate and along
    #[error("Axis {0} is used more than once")]
    DuplicateAxis(usize),

    /// An axis is neither displayed nor fixed
    #[error("Axis {0} is not covered by the projection")]
    MissingAxis(usize),

    /// The data source dimensionality does not match the projection
    #[error("Projection expects {expected}-dimensional data, source has {actual}")]
    Dimensionality { expected: usize, actual: usize },

    /// The number of through values does not match the along axes
    #[error("Expected {expected} through values, got {actual}")]
    ThroughLength { expected: usize, actual: usize },

    /// A through index is outside the along axes
    #[error("Through index {index} is out of range ({len} along axes)")]
    ThroughIndex { index: usize, len: usize },
}

/// Errors in the layer / image source bookkeeping
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    /// The layer already has an image source
    #[error("Layer {0} is already registered")]
    AlreadyRegistered(u64),

    /// The layer has no image source
    #[error("Layer {0} is not registered")]
    NotRegistered(u64),

    /// The layer is not a member of the layer stack
    #[error("Layer {0} is not in the layer stack")]
    NotInStack(u64),

    /// A layer kind was given the wrong number of slice sources
    #[error("Layer kind {kind} expects {expected} slice sources, got {actual}")]
    SourceCount {
        kind: &'static str,
        expected: usize,
        actual: usize,
    },
}

/// Errors reported by data sources
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DataError {
    /// The source cannot answer right now; it will emit a dirty notification later
    #[error("Data source is in an indeterminate state")]
    Indeterminate,

    /// The requested slicing does not fit the source
    #[error("Slicing {slicing} is out of bounds for shape {shape:?}")]
    OutOfBounds { slicing: String, shape: Vec<usize> },

    /// The slicing has the wrong number of axes
    #[error("Expected a {expected}-dimensional slicing, got {actual}")]
    Dimensionality { expected: usize, actual: usize },

    /// Array data did not match its declared shape
    #[error("Array shape mismatch: {0}")]
    Shape(String),

    /// The fetch task was dropped before completing
    #[error("Request was cancelled")]
    Cancelled,

    /// Projection failed while building a request
    #[error("Projection error: {0}")]
    Projection(#[from] ProjectionError),
}

/// Errors produced by the tile provider itself
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Invalid runtime configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The worker runtime could not be started
    #[error("Failed to start worker threads: {0}")]
    Runtime(#[from] std::io::Error),

    /// The provider has been shut down
    #[error("Tile provider has been shut down")]
    ShutDown,
}
